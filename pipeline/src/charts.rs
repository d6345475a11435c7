//! Diagnostic charts, drawn with plotters into in-memory frames.
//!
//! Each chart function returns a [`Frame`]; the caller encodes it and hands
//! it to the artifact sink. Captions, tick labels and the labelled mesh are
//! only drawn with the `fonts` feature; without it panels get a plain frame.

use crate::artifacts::Frame;
use crate::error::{chart_err, Result};
use bayeslm_core::diagnostics::{hdi, median};
use ndarray::{s, Array3};
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;

pub const SKYBLUE: RGBColor = RGBColor(135, 206, 235);

/// Predictive draws, observed data, predictive mean.
pub const PPC_COLOURS: [RGBColor; 3] = [SKYBLUE, BLACK, BLUE];

const CHAIN_COLOURS: [RGBColor; 10] = [
    RGBColor(31, 119, 180),  // Blue
    RGBColor(255, 127, 14),  // Orange
    RGBColor(44, 160, 44),   // Green
    RGBColor(214, 39, 40),   // Red
    RGBColor(148, 103, 189), // Purple
    RGBColor(140, 86, 75),   // Brown
    RGBColor(227, 119, 194), // Pink
    RGBColor(127, 127, 127), // Gray
    RGBColor(188, 189, 34),  // Olive
    RGBColor(23, 190, 207),  // Cyan
];

const PRIOR_COLOUR: RGBColor = CHAIN_COLOURS[1];
const POSTERIOR_COLOUR: RGBColor = CHAIN_COLOURS[0];

/// Predictive draws drawn as individual curves.
const MAX_PPC_LINES: usize = 100;
const KDE_GRID: usize = 256;
const ECDF_POINTS: usize = 400;

/// Whether plotters has a font backend that can draw text.
const DRAW_TEXT: bool = cfg!(feature = "fonts");

type Panel<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Gaussian kernel density estimate on a regular grid.
#[derive(Debug, Clone)]
pub struct Density {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Density {
    pub fn max(&self) -> f64 {
        self.y.iter().copied().fold(0.0, f64::max)
    }

    fn points(&self) -> Vec<(f64, f64)> {
        self.x.iter().copied().zip(self.y.iter().copied()).collect()
    }
}

/// KDE with Scott's bandwidth. The grid never extends below `lower`.
///
/// Values are linearly binned onto the grid first, so the cost does not
/// grow with the product of sample size and grid size.
pub fn kde(values: &[f64], lower: Option<f64>) -> Density {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let n = finite.len();
    if n == 0 {
        return Density {
            x: Vec::new(),
            y: Vec::new(),
        };
    }
    let (min, max) = bounds(&finite);
    let mean = finite.iter().sum::<f64>() / n as f64;
    let sd = (finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
    let mut bw = 1.059 * sd * (n as f64).powf(-0.2);
    if !(bw > 0.0) {
        bw = 1e-3 * mean.abs().max(1.0);
    }

    let mut lo = min - 3.0 * bw;
    if let Some(bound) = lower {
        lo = lo.max(bound);
    }
    let hi = max + 3.0 * bw;
    let dx = (hi - lo) / (KDE_GRID - 1) as f64;

    let mut counts = vec![0.0f64; KDE_GRID];
    for &v in &finite {
        let pos = ((v - lo) / dx).clamp(0.0, (KDE_GRID - 1) as f64);
        let i = pos.floor() as usize;
        let frac = pos - i as f64;
        counts[i] += 1.0 - frac;
        if i + 1 < KDE_GRID {
            counts[i + 1] += frac;
        }
    }

    let kernel: Vec<f64> = (0..KDE_GRID)
        .map(|d| (-0.5 * (d as f64 * dx / bw).powi(2)).exp())
        .collect();
    let norm = 1.0 / (n as f64 * bw * (2.0 * std::f64::consts::PI).sqrt());

    let x: Vec<f64> = (0..KDE_GRID).map(|j| lo + j as f64 * dx).collect();
    let y: Vec<f64> = (0..KDE_GRID)
        .map(|j| {
            counts
                .iter()
                .enumerate()
                .filter(|&(_, &c)| c > 0.0)
                .map(|(k, &c)| c * kernel[j.abs_diff(k)])
                .sum::<f64>()
                * norm
        })
        .collect();
    Density { x, y }
}

/// Empirical CDF as a staircase, thinned to at most `max_points` steps.
pub fn ecdf(values: &[f64], max_points: usize) -> Vec<(f64, f64)> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n == 0 {
        return Vec::new();
    }
    let stride = n.div_ceil(max_points.max(1));
    let mut points = Vec::with_capacity(2 * (n / stride + 2));
    let mut prev = 0.0;
    let mut i = stride - 1;
    loop {
        let idx = i.min(n - 1);
        let p = (idx + 1) as f64 / n as f64;
        points.push((sorted[idx], prev));
        points.push((sorted[idx], p));
        prev = p;
        if idx == n - 1 {
            break;
        }
        i += stride;
    }
    points
}

fn bounds(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

/// Widen degenerate or empty ranges so plotters gets a usable axis.
fn padded((lo, hi): (f64, f64)) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo < 1e-12 {
        return (lo - 0.5, hi + 0.5);
    }
    let pad = 0.02 * (hi - lo);
    (lo - pad, hi + pad)
}

fn render<F>(width: u32, height: u32, draw: F) -> Result<Frame>
where
    F: FnOnce(&DrawingArea<BitMapBackend<'_>, Shift>) -> Result<()>,
{
    let mut frame = Frame::new(width, height);
    {
        let root = BitMapBackend::with_buffer(&mut frame.rgb, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;
        draw(&root)?;
        root.present().map_err(chart_err)?;
    }
    Ok(frame)
}

fn panel<'a, DB: DrawingBackend>(
    area: &'a DrawingArea<DB, Shift>,
    caption: &str,
    x: (f64, f64),
    y: (f64, f64),
) -> Result<Panel<'a, DB>> {
    let (x0, x1) = padded(x);
    let (y0, y1) = padded(y);
    let mut builder = ChartBuilder::on(area);
    builder.margin(8);
    if DRAW_TEXT {
        builder
            .caption(caption, ("sans-serif", 16))
            .x_label_area_size(24)
            .y_label_area_size(36);
    }
    let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1).map_err(chart_err)?;
    if DRAW_TEXT {
        chart
            .configure_mesh()
            .max_light_lines(2)
            .draw()
            .map_err(chart_err)?;
    } else {
        // The naive font backend errors on any text, so outline the panel instead.
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(x0, y0), (x1, y1)],
                BLACK.mix(0.6).stroke_width(1),
            )))
            .map_err(chart_err)?;
    }
    Ok(chart)
}

fn draw_density<DB: DrawingBackend>(
    chart: &mut Panel<'_, DB>,
    density: &Density,
    colour: RGBColor,
    fill: bool,
) -> Result<()> {
    if fill {
        chart
            .draw_series(
                AreaSeries::new(density.points(), 0.0, colour.mix(0.3).filled())
                    .border_style(colour.stroke_width(2)),
            )
            .map_err(chart_err)?;
    } else {
        chart
            .draw_series(LineSeries::new(density.points(), colour.stroke_width(2)))
            .map_err(chart_err)?;
    }
    Ok(())
}

/// Cumulative predictive check: one ECDF per predictive draw, the ECDF of
/// all predictive values pooled, and the observed ECDF when given.
///
/// `predictive` is shaped `(chain, draw, observation)`.
pub fn ppc_cumulative(
    predictive: &Array3<f64>,
    observed: Option<&[f64]>,
    title: &str,
) -> Result<Frame> {
    let (n_chains, n_draws, _) = predictive.dim();
    let total = n_chains * n_draws;
    let stride = total.div_ceil(MAX_PPC_LINES).max(1);
    let curves: Vec<Vec<(f64, f64)>> = (0..total)
        .step_by(stride)
        .map(|i| {
            let row = predictive.slice(s![i / n_draws, i % n_draws, ..]).to_vec();
            ecdf(&row, ECDF_POINTS)
        })
        .collect();
    let pooled: Vec<f64> = predictive.iter().copied().collect();
    let mean_curve = ecdf(&pooled, ECDF_POINTS);
    let observed_curve = observed.map(|o| ecdf(o, ECDF_POINTS));

    let mut x_range = bounds(&pooled);
    if let Some(o) = observed {
        let (lo, hi) = bounds(o);
        x_range = (x_range.0.min(lo), x_range.1.max(hi));
    }
    let [pred_colour, obs_colour, mean_colour] = PPC_COLOURS;

    render(800, 600, |root| {
        let mut chart = panel(root, title, x_range, (0.0, 1.0))?;
        for curve in curves {
            chart
                .draw_series(LineSeries::new(curve, pred_colour.mix(0.4).stroke_width(1)))
                .map_err(chart_err)?;
        }
        if let Some(curve) = observed_curve {
            chart
                .draw_series(LineSeries::new(curve, obs_colour.stroke_width(2)))
                .map_err(chart_err)?;
        }
        chart
            .draw_series(LineSeries::new(mean_curve, mean_colour.stroke_width(2)))
            .map_err(chart_err)?;
        Ok(())
    })
}

/// One scalar quantity traced over chains: `chains[chain][draw]`.
#[derive(Debug, Clone)]
pub struct TraceSeries {
    pub name: String,
    pub chains: Vec<Vec<f64>>,
    pub lower_bound: Option<f64>,
}

/// Compact trace plot: per parameter a per-chain density panel and a
/// per-chain trace panel. Divergent draws are ticked along the bottom of
/// the trace. `diverging` is `[chain][draw]`.
pub fn trace_plot(series: &[TraceSeries], diverging: Option<&[Vec<bool>]>) -> Result<Frame> {
    let rows = series.len().max(1);
    render(1200, 260 * rows as u32, |root| {
        let areas = root.split_evenly((rows, 2));
        for (i, s) in series.iter().enumerate() {
            let densities: Vec<Density> =
                s.chains.iter().map(|c| kde(c, s.lower_bound)).collect();
            let all: Vec<f64> = s.chains.concat();
            let value_range = bounds(&all);
            let d_max = densities.iter().map(Density::max).fold(0.0, f64::max);

            let mut dens = panel(&areas[2 * i], &s.name, value_range, (0.0, d_max))?;
            for (c, d) in densities.iter().enumerate() {
                draw_density(&mut dens, d, CHAIN_COLOURS[c % CHAIN_COLOURS.len()], false)?;
            }

            let n_draws = s.chains.first().map_or(0, Vec::len);
            let mut trace = panel(
                &areas[2 * i + 1],
                &s.name,
                (0.0, n_draws.saturating_sub(1) as f64),
                value_range,
            )?;
            for (c, chain) in s.chains.iter().enumerate() {
                let colour = CHAIN_COLOURS[c % CHAIN_COLOURS.len()];
                trace
                    .draw_series(LineSeries::new(
                        chain.iter().enumerate().map(|(d, &v)| (d as f64, v)),
                        colour.mix(0.7).stroke_width(1),
                    ))
                    .map_err(chart_err)?;
            }
            if let Some(div) = diverging {
                let (lo, hi) = padded(value_range);
                let tick = 0.05 * (hi - lo);
                let marks: Vec<usize> = (0..n_draws)
                    .filter(|&d| div.iter().any(|chain| chain.get(d).copied().unwrap_or(false)))
                    .collect();
                trace
                    .draw_series(marks.into_iter().map(|d| {
                        PathElement::new(
                            vec![(d as f64, lo), (d as f64, lo + tick)],
                            BLACK.stroke_width(1),
                        )
                    }))
                    .map_err(chart_err)?;
            }
        }
        Ok(())
    })
}

/// Posterior densities with the median marked and the HDI as a bar.
pub fn posterior_plot(series: &[TraceSeries], hdi_prob: f64) -> Result<Frame> {
    let cols = series.len().max(1);
    render(400 * cols as u32, 400, |root| {
        let areas = root.split_evenly((1, cols));
        for (s, area) in series.iter().zip(&areas) {
            let all = s.chains.concat();
            let density = kde(&all, s.lower_bound);
            let med = median(&all);
            let (h_lo, h_hi) = hdi(&all, hdi_prob);
            let top = density.max();
            let caption = format!(
                "{}  median {:.2}  {:.0}% HDI [{:.2}, {:.2}]",
                s.name,
                med,
                hdi_prob * 100.0,
                h_lo,
                h_hi
            );
            let x_range = (
                density.x.first().copied().unwrap_or(0.0),
                density.x.last().copied().unwrap_or(1.0),
            );
            let mut chart = panel(area, &caption, x_range, (0.0, top * 1.05))?;
            draw_density(&mut chart, &density, POSTERIOR_COLOUR, true)?;
            chart
                .draw_series(std::iter::once(PathElement::new(
                    vec![(med, 0.0), (med, top)],
                    BLACK.stroke_width(2),
                )))
                .map_err(chart_err)?;
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(h_lo, 0.0), (h_hi, top * 0.03)],
                    BLACK.filled(),
                )))
                .map_err(chart_err)?;
        }
        Ok(())
    })
}

/// Prior and posterior draws of one quantity, pooled over chains.
#[derive(Debug, Clone)]
pub struct DistPair {
    pub name: String,
    pub prior: Vec<f64>,
    pub posterior: Vec<f64>,
    pub lower_bound: Option<f64>,
}

/// Prior-vs-posterior comparison: per quantity the prior, the posterior,
/// and both overlaid.
pub fn dist_comparison(pairs: &[DistPair]) -> Result<Frame> {
    let rows = pairs.len().max(1);
    render(1200, 260 * rows as u32, |root| {
        let areas = root.split_evenly((rows, 3));
        for (i, p) in pairs.iter().enumerate() {
            let prior = kde(&p.prior, p.lower_bound);
            let posterior = kde(&p.posterior, p.lower_bound);

            let own_range = |d: &Density| {
                (
                    d.x.first().copied().unwrap_or(0.0),
                    d.x.last().copied().unwrap_or(1.0),
                )
            };
            let mut left = panel(
                &areas[3 * i],
                &format!("{} (prior)", p.name),
                own_range(&prior),
                (0.0, prior.max() * 1.05),
            )?;
            draw_density(&mut left, &prior, PRIOR_COLOUR, true)?;

            let mut middle = panel(
                &areas[3 * i + 1],
                &format!("{} (posterior)", p.name),
                own_range(&posterior),
                (0.0, posterior.max() * 1.05),
            )?;
            draw_density(&mut middle, &posterior, POSTERIOR_COLOUR, true)?;

            let joint = (
                own_range(&prior).0.min(own_range(&posterior).0),
                own_range(&prior).1.max(own_range(&posterior).1),
            );
            let mut right = panel(
                &areas[3 * i + 2],
                &p.name,
                joint,
                (0.0, prior.max().max(posterior.max()) * 1.05),
            )?;
            draw_density(&mut right, &prior, PRIOR_COLOUR, false)?;
            draw_density(&mut right, &posterior, POSTERIOR_COLOUR, false)?;
        }
        Ok(())
    })
}

/// Scatter of two parameters with divergent draws in red.
pub fn pair_plot(
    names: (&str, &str),
    x: &[f64],
    y: &[f64],
    diverging: &[bool],
    correlation: f64,
) -> Result<Frame> {
    let caption = format!("{} vs {}  (r = {:.2})", names.0, names.1, correlation);
    render(640, 640, |root| {
        let mut chart = panel(root, &caption, bounds(x), bounds(y))?;
        let good = x
            .iter()
            .zip(y)
            .zip(diverging.iter().chain(std::iter::repeat(&false)))
            .filter(|&(_, &d)| !d)
            .map(|((&a, &b), _)| Circle::new((a, b), 2, POSTERIOR_COLOUR.mix(0.35).filled()));
        chart.draw_series(good).map_err(chart_err)?;
        let bad = x
            .iter()
            .zip(y)
            .zip(diverging)
            .filter(|&(_, &d)| d)
            .map(|((&a, &b), _)| Circle::new((a, b), 3, RED.filled()));
        chart.draw_series(bad).map_err(chart_err)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kde_integrates_to_one() {
        let values: Vec<f64> = (0..2000).map(|i| ((i as f64) * 0.37).sin() * 2.0).collect();
        let d = kde(&values, None);
        let dx = d.x[1] - d.x[0];
        let area: f64 = d.y.iter().sum::<f64>() * dx;
        assert!((area - 1.0).abs() < 0.05, "area = {}", area);
    }

    #[test]
    fn test_kde_respects_lower_bound() {
        let values: Vec<f64> = (1..500).map(|i| i as f64 / 500.0).collect();
        let d = kde(&values, Some(0.0));
        assert!(d.x[0] >= 0.0);
    }

    #[test]
    fn test_kde_constant_values() {
        let d = kde(&[2.0; 10], None);
        assert_eq!(d.x.len(), KDE_GRID);
        assert!(d.y.iter().all(|v| v.is_finite()));
        assert!(kde(&[], None).x.is_empty());
    }

    #[test]
    fn test_ecdf_is_monotone_and_ends_at_one() {
        let values: Vec<f64> = (0..1000).map(|i| (i * 7 % 1000) as f64).collect();
        let pts = ecdf(&values, 50);
        assert!(pts.len() <= 2 * 51);
        assert!(pts.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1));
        assert_eq!(pts.last().unwrap().1, 1.0);
    }

    #[test]
    fn test_panel_renders_with_default_features() {
        let frame = render(200, 100, |root| {
            panel(root, "caption", (0.0, 1.0), (0.0, 1.0))?;
            Ok(())
        })
        .unwrap();
        // Either the mesh or the outline leaves non-white pixels.
        assert!(frame.rgb.iter().any(|&b| b != 255));
    }

    #[test]
    fn test_charts_render_to_frames() {
        let chains = vec![
            (0..50).map(|i| (i as f64 * 0.3).sin()).collect::<Vec<_>>(),
            (0..50).map(|i| (i as f64 * 0.7).cos()).collect::<Vec<_>>(),
        ];
        let series = vec![TraceSeries {
            name: "alpha".into(),
            chains: chains.clone(),
            lower_bound: None,
        }];
        let mut div = vec![vec![false; 50]; 2];
        div[1][10] = true;

        let frame = trace_plot(&series, Some(&div)).unwrap();
        assert_eq!((frame.width, frame.height), (1200, 260));
        // Something other than the white background was drawn.
        assert!(frame.rgb.iter().any(|&b| b != 255));

        let frame = posterior_plot(&series, 0.9).unwrap();
        assert_eq!(frame.rgb.len(), 400 * 400 * 3);

        let predictive = Array3::from_shape_fn((2, 5, 20), |(c, d, o)| (c + d + o) as f64);
        let frame = ppc_cumulative(&predictive, Some(&[1.0, 2.0, 3.0]), "check").unwrap();
        assert!(frame.to_png().is_ok());

        let pairs = vec![DistPair {
            name: "sigma".into(),
            prior: chains[0].iter().map(|v| v.abs()).collect(),
            posterior: chains[1].iter().map(|v| v.abs()).collect(),
            lower_bound: Some(0.0),
        }];
        assert!(dist_comparison(&pairs).is_ok());

        let flags: Vec<bool> = (0..50).map(|i| i == 3).collect();
        assert!(pair_plot(("alpha", "beta"), &chains[0], &chains[1], &flags, 0.1).is_ok());
    }
}
