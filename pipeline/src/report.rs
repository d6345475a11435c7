//! Reporting stage: summary table and diagnostic charts.

use crate::artifacts::{Artifact, Frame};
use crate::charts::{self, DistPair, TraceSeries};
use crate::error::Result;
use crate::model::Y_KEY;
use bayeslm_core::{GroupKind, InferenceData, ModelSpec, Summary};
use tracing::{info, warn};

/// Median-focused summary of the posterior at `ci_prob`, logged as a table.
///
/// Parameters failing the convergence checks are reported, not rejected.
pub fn summarize(idata: &InferenceData, ci_prob: f64) -> Result<Summary> {
    let summary = Summary::from_inference_data(idata, ci_prob)?;
    info!("posterior summary\n{}", summary.to_table());
    for row in summary.flagged() {
        warn!(
            parameter = %row.name,
            r_hat = row.r_hat,
            ess_median = row.ess_median,
            ess_tail = row.ess_tail,
            "convergence check failed"
        );
    }
    Ok(summary)
}

/// The summary as CSV: a `parameter` column, then the statistics with
/// three decimals.
pub fn summary_csv(summary: &Summary) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(summary.header())?;
    for record in summary.records() {
        writer.write_record(&record)?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(writer.get_ref().clone())
}

/// Pearson correlation of two equally long samples.
pub fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    sxy / (sxx * syy).sqrt()
}

fn lower_bound(spec: &ModelSpec, name: &str) -> Option<f64> {
    spec.priors()
        .iter()
        .find(|p| p.name == name)
        .filter(|p| p.prior.is_positive())
        .map(|_| 0.0)
}

/// Divergence flags `[chain][draw]` from `sample_stats`.
fn divergences(idata: &InferenceData) -> Option<Vec<Vec<bool>>> {
    let chains = idata.group(GroupKind::SampleStats)?.chains("diverging", 0)?;
    Some(
        chains
            .into_iter()
            .map(|c| c.into_iter().map(|d| d > 0.0).collect())
            .collect(),
    )
}

/// Trace, posterior, prior-vs-posterior and pair charts.
pub fn render_charts(
    idata: &InferenceData,
    spec: &ModelSpec,
    ci_prob: f64,
) -> Result<Vec<(Artifact, Frame)>> {
    let posterior = idata.require(GroupKind::Posterior)?;
    let prior = idata.require(GroupKind::Prior)?;
    let diverging = divergences(idata);

    let series: Vec<TraceSeries> = posterior
        .names()
        .into_iter()
        .filter_map(|name| {
            Some(TraceSeries {
                name: name.to_string(),
                chains: posterior.chains(name, 0)?,
                lower_bound: lower_bound(spec, name),
            })
        })
        .collect();

    let mut frames = Vec::new();
    frames.push((
        Artifact::TracePlot,
        charts::trace_plot(&series, diverging.as_deref())?,
    ));
    frames.push((Artifact::Posteriors, charts::posterior_plot(&series, ci_prob)?));

    let mut pairs: Vec<DistPair> = Vec::new();
    for name in posterior.names() {
        pairs.push(DistPair {
            name: name.to_string(),
            prior: prior.variable(name)?.iter().copied().collect(),
            posterior: posterior.variable(name)?.iter().copied().collect(),
            lower_bound: lower_bound(spec, name),
        });
    }
    if let (Some(pp), Some(post_pp)) = (
        idata.group(GroupKind::PriorPredictive),
        idata.group(GroupKind::PosteriorPredictive),
    ) {
        if let (Some(a), Some(b)) = (pp.flat(Y_KEY), post_pp.flat(Y_KEY)) {
            pairs.push(DistPair {
                name: Y_KEY.to_string(),
                prior: a,
                posterior: b,
                lower_bound: None,
            });
        }
    }
    frames.push((
        Artifact::DistributionComparison,
        charts::dist_comparison(&pairs)?,
    ));

    let alpha = posterior.variable("alpha")?.iter().copied().collect::<Vec<_>>();
    let beta = posterior.variable("beta")?.iter().copied().collect::<Vec<_>>();
    let flags: Vec<bool> = diverging
        .map(|d| d.concat())
        .unwrap_or_else(|| vec![false; alpha.len()]);
    let r = correlation(&alpha, &beta);
    info!(correlation = r, "alpha/beta posterior correlation");
    frames.push((
        Artifact::PairPlot,
        charts::pair_plot(("alpha", "beta"), &alpha, &beta, &flags, r)?,
    ));

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bayeslm_core::Group;

    fn summary_idata() -> InferenceData {
        let mut idata = InferenceData::new();
        let mut posterior = Group::new(GroupKind::Posterior);
        let chain = |offset: f64| -> Vec<f64> {
            (0..200).map(|i| offset + ((i * 37 % 200) as f64 / 100.0)).collect()
        };
        posterior
            .insert_chains("alpha", &[chain(0.0), chain(0.01)])
            .unwrap();
        idata.extend(posterior).unwrap();
        idata
    }

    #[test]
    fn test_summary_csv_layout() {
        let summary = summarize(&summary_idata(), 0.9).unwrap();
        let csv = String::from_utf8(summary_csv(&summary).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "parameter,median,mad,eti_5%,eti_95%,mcse_median,ess_median,ess_tail,r_hat"
        );
        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row[0], "alpha");
        assert_eq!(row.len(), 9);
        // Every statistic carries exactly three decimals.
        for cell in &row[1..] {
            let decimals = cell.split('.').nth(1).map_or(0, str::len);
            assert!(decimals == 3 || *cell == "NaN", "cell {}", cell);
        }
    }

    #[test]
    fn test_summary_needs_posterior() {
        assert!(summarize(&InferenceData::new(), 0.9).is_err());
    }

    #[test]
    fn test_correlation() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!((correlation(&x, &[2.0, 4.0, 6.0, 8.0]) - 1.0).abs() < 1e-12);
        assert!((correlation(&x, &[8.0, 6.0, 4.0, 2.0]) + 1.0).abs() < 1e-12);
        assert!(correlation(&[1.0], &[1.0]).is_nan());
    }
}
