//! MCMC diagnostic computations: R-hat, ESS, MCSE, quantiles, intervals.
//!
//! All algorithms follow the definitions in:
//!   Vehtari et al. (2021) "Rank-normalization, folding, and localization:
//!   An improved R-hat for assessing convergence of MCMC"

use crate::error::Result;
use crate::inference_data::{GroupKind, InferenceData};
use statrs::distribution::{Beta, ContinuousCDF, Normal};

/// R-hat above this marks a parameter as not converged.
pub const R_HAT_THRESHOLD: f64 = 1.05;
/// ESS below this marks a parameter as under-sampled.
pub const MIN_ESS: f64 = 400.0;

/// Per-parameter summary row, median-focused.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub name: String,
    pub median: f64,
    /// Median absolute deviation around the median.
    pub mad: f64,
    pub eti_low: f64,
    pub eti_high: f64,
    pub mcse_median: f64,
    pub ess_median: f64,
    pub ess_tail: f64,
    pub r_hat: f64,
}

impl SummaryRow {
    pub fn is_flagged(&self) -> bool {
        !self.r_hat.is_finite()
            || self.r_hat > R_HAT_THRESHOLD
            || !(self.ess_median >= MIN_ESS)
            || !(self.ess_tail >= MIN_ESS)
    }
}

/// Summary of a posterior: one row per scalar parameter element.
#[derive(Debug, Clone)]
pub struct Summary {
    pub rows: Vec<SummaryRow>,
    pub ci_prob: f64,
    pub num_chains: usize,
    pub num_draws: usize,
    pub divergences: usize,
    pub mean_accept_rate: f64,
}

impl Summary {
    /// Summarise `[(name, chains[chain][draw])]` at the given interval mass.
    pub fn from_chains(params: &[(String, Vec<Vec<f64>>)], ci_prob: f64) -> Self {
        let rows = params
            .iter()
            .map(|(name, chains)| summarize_param(name, chains, ci_prob))
            .collect();
        let (num_chains, num_draws) = params
            .first()
            .map_or((0, 0), |(_, c)| (c.len(), c.first().map_or(0, Vec::len)));
        Self {
            rows,
            ci_prob,
            num_chains,
            num_draws,
            divergences: 0,
            mean_accept_rate: f64::NAN,
        }
    }

    /// Summarise the posterior group, pulling divergences and acceptance
    /// from `sample_stats` when present.
    pub fn from_inference_data(idata: &InferenceData, ci_prob: f64) -> Result<Self> {
        let posterior = idata.require(GroupKind::Posterior)?;
        let mut params = Vec::new();
        for (name, values) in posterior.variables() {
            let n_elem = values.dim().2;
            for e in 0..n_elem {
                let label = if n_elem == 1 {
                    name.clone()
                } else {
                    format!("{}[{}]", name, e)
                };
                if let Some(chains) = posterior.chains(name, e) {
                    params.push((label, chains));
                }
            }
        }
        let mut summary = Self::from_chains(&params, ci_prob);

        if let Some(stats) = idata.group(GroupKind::SampleStats) {
            if let Some(div) = stats.get("diverging") {
                summary.divergences = div.iter().filter(|&&d| d > 0.0).count();
            }
            if let Some(acc) = stats.get("acceptance_rate") {
                if !acc.is_empty() {
                    summary.mean_accept_rate = acc.sum() / acc.len() as f64;
                }
            }
        }
        Ok(summary)
    }

    /// Column labels of the equal-tailed interval, e.g. `eti_5%`, `eti_95%`.
    pub fn eti_labels(&self) -> (String, String) {
        let lo = (1.0 - self.ci_prob) / 2.0 * 100.0;
        let hi = 100.0 - lo;
        (format!("eti_{}%", pct_label(lo)), format!("eti_{}%", pct_label(hi)))
    }

    pub fn header(&self) -> Vec<String> {
        let (lo, hi) = self.eti_labels();
        vec![
            "parameter".to_string(),
            "median".to_string(),
            "mad".to_string(),
            lo,
            hi,
            "mcse_median".to_string(),
            "ess_median".to_string(),
            "ess_tail".to_string(),
            "r_hat".to_string(),
        ]
    }

    /// Rows as 3-decimal strings, aligned with [`Summary::header`].
    pub fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| {
                let mut rec = vec![r.name.clone()];
                rec.extend(
                    [
                        r.median,
                        r.mad,
                        r.eti_low,
                        r.eti_high,
                        r.mcse_median,
                        r.ess_median,
                        r.ess_tail,
                        r.r_hat,
                    ]
                    .iter()
                    .map(|v| format!("{:.3}", v)),
                );
                rec
            })
            .collect()
    }

    pub fn flagged(&self) -> Vec<&SummaryRow> {
        self.rows.iter().filter(|r| r.is_flagged()).collect()
    }

    pub fn row(&self, name: &str) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    /// Render the summary as a formatted table string.
    pub fn to_table(&self) -> String {
        let header = self.header();
        let mut lines = Vec::new();
        lines.push(format!(
            "{} chains × {} draws per chain",
            self.num_chains, self.num_draws
        ));
        lines.push(String::new());
        lines.push(format!(
            "{:<12} {:>8} {:>8} {:>9} {:>9} {:>11} {:>10} {:>9} {:>7}",
            header[0], header[1], header[2], header[3], header[4], header[5], header[6],
            header[7], header[8]
        ));
        lines.push("─".repeat(92));

        for rec in self.records() {
            lines.push(format!(
                "{:<12} {:>8} {:>8} {:>9} {:>9} {:>11} {:>10} {:>9} {:>7}",
                rec[0], rec[1], rec[2], rec[3], rec[4], rec[5], rec[6], rec[7], rec[8]
            ));
        }

        lines.push("─".repeat(92));
        lines.push(format!(
            "Mean accept rate: {:.2}  │  Divergences: {}",
            self.mean_accept_rate, self.divergences
        ));

        let any_bad_rhat = self
            .rows
            .iter()
            .any(|p| p.r_hat > R_HAT_THRESHOLD || !p.r_hat.is_finite());
        let any_low_ess = self
            .rows
            .iter()
            .any(|p| !(p.ess_median >= MIN_ESS) || !(p.ess_tail >= MIN_ESS));

        if any_bad_rhat {
            lines.push(
                "⚠  Some R-hat values > 1.05; chains may not have converged.".to_string(),
            );
        }
        if any_low_ess {
            lines.push(
                "⚠  Some ESS values < 400; consider increasing draws or tuning.".to_string(),
            );
        }
        if self.divergences > 0 {
            lines.push(format!(
                "⚠  {} divergent transitions; results may be unreliable.",
                self.divergences
            ));
        }

        lines.join("\n")
    }
}

fn pct_label(v: f64) -> String {
    let s = format!("{:.1}", v);
    match s.strip_suffix(".0") {
        Some(whole) => whole.to_string(),
        None => s,
    }
}

fn summarize_param(name: &str, chains: &[Vec<f64>], ci_prob: f64) -> SummaryRow {
    let sorted = sorted_values(chains);
    let median = quantile_sorted(&sorted, 0.5);
    let tail = (1.0 - ci_prob) / 2.0;
    SummaryRow {
        name: name.to_string(),
        median,
        mad: mad(&sorted, median),
        eti_low: quantile_sorted(&sorted, tail),
        eti_high: quantile_sorted(&sorted, 1.0 - tail),
        mcse_median: mcse_quantile(chains, 0.5),
        ess_median: ess_quantile(chains, 0.5),
        ess_tail: ess_tail(chains),
        r_hat: r_hat(chains),
    }
}

// ── Public estimators ───────────────────────────────────────────────

/// Median of arbitrary values.
pub fn median(values: &[f64]) -> f64 {
    let mut s = values.to_vec();
    sort_f64(&mut s);
    quantile_sorted(&s, 0.5)
}

/// Equal-tailed interval holding `prob` of the mass.
pub fn eti(values: &[f64], prob: f64) -> (f64, f64) {
    let mut s = values.to_vec();
    sort_f64(&mut s);
    let tail = (1.0 - prob) / 2.0;
    (quantile_sorted(&s, tail), quantile_sorted(&s, 1.0 - tail))
}

/// Narrowest interval holding `prob` of the draws.
pub fn hdi(values: &[f64], prob: f64) -> (f64, f64) {
    let mut s = values.to_vec();
    sort_f64(&mut s);
    let n = s.len();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    let width = ((prob * n as f64).floor() as usize).clamp(1, n);
    let mut best = (s[0], s[n - 1]);
    let mut best_len = f64::INFINITY;
    for i in 0..=(n - width) {
        let hi = s[i + width - 1];
        let len = hi - s[i];
        if len < best_len {
            best_len = len;
            best = (s[i], hi);
        }
    }
    best
}

/// Rank-normalized split R-hat: the larger of the bulk and folded values.
pub fn r_hat(chains: &[Vec<f64>]) -> f64 {
    if !valid_chains(chains) {
        return f64::NAN;
    }
    let bulk = r_hat_split(&rank_normalize(chains));
    let med = median(&chains.concat());
    let folded: Vec<Vec<f64>> = chains
        .iter()
        .map(|c| c.iter().map(|&x| (x - med).abs()).collect())
        .collect();
    let tail = r_hat_split(&rank_normalize(&folded));
    bulk.max(tail)
}

/// Bulk ESS using rank-normalized values (Vehtari et al. 2021).
pub fn ess_bulk(chains: &[Vec<f64>]) -> f64 {
    if !valid_chains(chains) {
        return f64::NAN;
    }
    ess_raw(&rank_normalize(chains))
}

/// ESS of the indicator `x <= q_prob`.
pub fn ess_quantile(chains: &[Vec<f64>], prob: f64) -> f64 {
    if !valid_chains(chains) {
        return f64::NAN;
    }
    let q = quantile_sorted(&sorted_values(chains), prob);
    let indicator: Vec<Vec<f64>> = chains
        .iter()
        .map(|c| c.iter().map(|&x| if x <= q { 1.0 } else { 0.0 }).collect())
        .collect();
    ess_raw(&indicator)
}

/// Tail ESS: minimum of the 5% and 95% quantile ESS.
pub fn ess_tail(chains: &[Vec<f64>]) -> f64 {
    let lo = ess_quantile(chains, 0.05);
    let hi = ess_quantile(chains, 0.95);
    if lo.is_nan() || hi.is_nan() {
        return f64::NAN;
    }
    lo.min(hi)
}

/// Monte-Carlo standard error of a quantile, from the Beta posterior of the
/// indicator's ESS.
pub fn mcse_quantile(chains: &[Vec<f64>], prob: f64) -> f64 {
    let ess = ess_quantile(chains, prob);
    if !ess.is_finite() {
        return f64::NAN;
    }
    let beta = match Beta::new(ess * prob + 1.0, ess * (1.0 - prob) + 1.0) {
        Ok(b) => b,
        Err(_) => return f64::NAN,
    };
    // ±1 standard deviation of a normal, as probabilities.
    let p_lo = beta.inverse_cdf(0.158_655_3);
    let p_hi = beta.inverse_cdf(0.841_344_7);
    let sorted = sorted_values(chains);
    let size = sorted.len();
    let last = (size - 1) as f64;
    let i_lo = (p_lo * size as f64 - 1.0).clamp(0.0, last).round() as usize;
    let i_hi = (p_hi * size as f64 - 1.0).clamp(0.0, last).round() as usize;
    (sorted[i_hi] - sorted[i_lo]) / 2.0
}

// ── Internal helpers ────────────────────────────────────────────────

fn valid_chains(chains: &[Vec<f64>]) -> bool {
    !chains.is_empty()
        && chains[0].len() >= 4
        && chains.iter().all(|c| c.len() == chains[0].len())
        && chains.iter().flatten().all(|v| v.is_finite())
}

fn sort_f64(v: &mut [f64]) {
    v.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

fn sorted_values(chains: &[Vec<f64>]) -> Vec<f64> {
    let mut all = chains.concat();
    sort_f64(&mut all);
    all
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let idx = q * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    let frac = idx - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi.min(sorted.len() - 1)] * frac
}

fn mad(sorted: &[f64], median: f64) -> f64 {
    let mut dev: Vec<f64> = sorted.iter().map(|x| (x - median).abs()).collect();
    sort_f64(&mut dev);
    quantile_sorted(&dev, 0.5)
}

/// Split R-hat: split each chain in half, treat as 2M chains, compute R-hat.
fn r_hat_split(chains: &[Vec<f64>]) -> f64 {
    let split = split_chains(chains);
    let m = split.len() as f64;
    let n = split[0].len() as f64;

    let chain_means: Vec<f64> = split.iter().map(|c| mean(c)).collect();
    let grand_mean = chain_means.iter().sum::<f64>() / m;

    // Between-chain variance B
    let b = n / (m - 1.0)
        * chain_means
            .iter()
            .map(|&cm| (cm - grand_mean).powi(2))
            .sum::<f64>();

    // Within-chain variance W
    let w = within_chain_variance(&split, &chain_means);

    if w < 1e-30 {
        return f64::NAN;
    }

    let var_hat = (n - 1.0) / n * w + b / n;
    (var_hat / w).sqrt()
}

fn within_chain_variance(split: &[Vec<f64>], chain_means: &[f64]) -> f64 {
    let n = split[0].len() as f64;
    split
        .iter()
        .zip(chain_means)
        .map(|(c, &cm)| c.iter().map(|&x| (x - cm).powi(2)).sum::<f64>() / (n - 1.0))
        .sum::<f64>()
        / split.len() as f64
}

/// Rank-normalize: replace values with their normal scores.
fn rank_normalize(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n_chains = chains.len();
    let n_per = chains[0].len();
    let total = n_chains * n_per;

    // Collect (value, chain_idx, draw_idx)
    let mut indexed: Vec<(f64, usize, usize)> = Vec::with_capacity(total);
    for (ci, chain) in chains.iter().enumerate() {
        for (di, &v) in chain.iter().enumerate() {
            indexed.push((v, ci, di));
        }
    }
    indexed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    // Assign ranks (average ties)
    let mut ranks = vec![0.0f64; total];
    let mut i = 0;
    while i < total {
        let mut j = i;
        while j < total && indexed[j].0 == indexed[i].0 {
            j += 1;
        }
        let avg_rank = (i + j + 1) as f64 / 2.0;
        for r in ranks.iter_mut().take(j).skip(i) {
            *r = avg_rank;
        }
        i = j;
    }

    // Normal scores: Φ⁻¹((rank - 3/8) / (N + 1/4))
    let std_normal = Normal::new(0.0, 1.0).ok();
    let n_f = total as f64;
    let mut result = vec![vec![0.0; n_per]; n_chains];
    for (idx, &(_, ci, di)) in indexed.iter().enumerate() {
        let p = (ranks[idx] - 0.375) / (n_f + 0.25);
        result[ci][di] = std_normal.as_ref().map_or(f64::NAN, |d| d.inverse_cdf(p));
    }
    result
}

/// ESS from split chains, Geyer's initial monotone sequence estimator.
fn ess_raw(chains: &[Vec<f64>]) -> f64 {
    let split = split_chains(chains);
    let m = split.len();
    let n = split[0].len();
    if n < 4 {
        return f64::NAN;
    }

    let chain_means: Vec<f64> = split.iter().map(|c| mean(c)).collect();
    let m_f = m as f64;
    let n_f = n as f64;

    let w = within_chain_variance(&split, &chain_means);
    if w < 1e-30 {
        return f64::NAN;
    }
    let grand_mean = chain_means.iter().sum::<f64>() / m_f;
    let b_over_n = chain_means
        .iter()
        .map(|&cm| (cm - grand_mean).powi(2))
        .sum::<f64>()
        / (m_f - 1.0);
    let var_plus = w * (n_f - 1.0) / n_f + b_over_n;

    // Mean over chains of the biased autocovariance at a lag.
    let acov = |lag: usize| -> f64 {
        let mut gamma = 0.0f64;
        for (chain, &cm) in split.iter().zip(&chain_means) {
            for t in 0..(n - lag) {
                gamma += (chain[t] - cm) * (chain[t + lag] - cm);
            }
        }
        gamma / (m_f * n_f)
    };
    let rho = |lag: usize| 1.0 - (w - acov(lag)) / var_plus;

    let mut rho_hat = vec![0.0f64; n];
    rho_hat[0] = 1.0;
    let mut rho_even = 1.0;
    let mut rho_odd = rho(1);
    rho_hat[1] = rho_odd;

    // Initial positive sequence over pairs of lags.
    let mut t = 1usize;
    while t < n - 3 && rho_even + rho_odd > 0.0 {
        rho_even = rho(t + 1);
        rho_odd = rho(t + 2);
        if rho_even + rho_odd >= 0.0 {
            rho_hat[t + 1] = rho_even;
            rho_hat[t + 2] = rho_odd;
        }
        t += 2;
    }
    let max_t = t - 1;
    if rho_even > 0.0 && max_t < n {
        rho_hat[max_t] = rho_even;
    }

    // Initial monotone sequence.
    let mut t = 1usize;
    while t + 2 < max_t {
        let prev = rho_hat[t - 1] + rho_hat[t];
        if rho_hat[t + 1] + rho_hat[t + 2] > prev {
            rho_hat[t + 1] = prev / 2.0;
            rho_hat[t + 2] = prev / 2.0;
        }
        t += 2;
    }

    let total = m_f * n_f;
    let tau = -1.0 + 2.0 * rho_hat[..max_t].iter().sum::<f64>() + rho_hat[max_t.min(n - 1)];
    total / tau.max(1.0 / total.log10())
}

fn split_chains(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut split = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        // Odd lengths drop the middle draw so both halves match.
        let half = chain.len() / 2;
        split.push(chain[..half].to_vec());
        split.push(chain[chain.len() - half..].to_vec());
    }
    split
}

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference_data::Group;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, StandardNormal};

    fn iid_chains(n_chains: usize, n_draws: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n_chains)
            .map(|_| (0..n_draws).map(|_| StandardNormal.sample(&mut rng)).collect())
            .collect()
    }

    #[test]
    fn test_r_hat_converged() {
        let chains = iid_chains(4, 1000, 1);
        let rh = r_hat(&chains);
        assert!(rh < 1.01, "R-hat should be near 1.0 for iid chains, got {}", rh);
    }

    #[test]
    fn test_r_hat_diverged() {
        // Two chains at very different locations
        let chain1: Vec<f64> = (0..500).map(|i| 0.0 + (i as f64 * 0.001)).collect();
        let chain2: Vec<f64> = (0..500).map(|i| 100.0 + (i as f64 * 0.001)).collect();
        let rh = r_hat(&[chain1, chain2]);
        assert!(rh > 1.5, "R-hat should be large for diverged chains, got {}", rh);
    }

    #[test]
    fn test_ess_iid_close_to_sample_size() {
        let chains = iid_chains(4, 1000, 2);
        let ess = ess_bulk(&chains);
        assert!(ess > 2500.0 && ess < 6000.0, "ess_bulk = {}", ess);
        let ess_med = ess_quantile(&chains, 0.5);
        assert!(ess_med > 2000.0, "ess_median = {}", ess_med);
    }

    #[test]
    fn test_ess_autocorrelated_is_small() {
        // AR(1) with coefficient 0.95 has an integrated time of ~39.
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let chains: Vec<Vec<f64>> = (0..4)
            .map(|_| {
                let mut x = 0.0f64;
                (0..1000)
                    .map(|_| {
                        let z: f64 = StandardNormal.sample(&mut rng);
                        x = 0.95 * x + z;
                        x
                    })
                    .collect()
            })
            .collect();
        let ess = ess_bulk(&chains);
        assert!(ess < 400.0, "ess_bulk = {}", ess);
    }

    #[test]
    fn test_constant_chains_give_nan() {
        let chains = vec![vec![1.0; 100]; 2];
        assert!(r_hat(&chains).is_nan());
        assert!(ess_bulk(&chains).is_nan());
    }

    #[test]
    fn test_intervals() {
        let values: Vec<f64> = (0..=100).map(|i| i as f64).collect();
        assert_eq!(median(&values), 50.0);
        let (lo, hi) = eti(&values, 0.9);
        assert!((lo - 5.0).abs() < 1e-12 && (hi - 95.0).abs() < 1e-12);
        let (lo, hi) = hdi(&values, 0.9);
        assert!(hi - lo <= 90.0);
        // A skewed sample pulls the HDI towards the mode.
        let skewed: Vec<f64> = (0..1000).map(|i| (i as f64 / 100.0).powi(3)).collect();
        let (h_lo, _) = hdi(&skewed, 0.9);
        let (e_lo, _) = eti(&skewed, 0.9);
        assert!(h_lo <= e_lo);
    }

    #[test]
    fn test_eti_labels() {
        let mut s = Summary::from_chains(&[], 0.9);
        assert_eq!(s.eti_labels(), ("eti_5%".to_string(), "eti_95%".to_string()));
        s.ci_prob = 0.95;
        assert_eq!(s.eti_labels(), ("eti_2.5%".to_string(), "eti_97.5%".to_string()));
    }

    #[test]
    fn test_summary_rows_are_ordered() {
        let chains = iid_chains(4, 500, 4);
        let summary = Summary::from_chains(&[("mu".to_string(), chains)], 0.9);
        let row = summary.row("mu").unwrap();
        assert!(row.eti_low <= row.median && row.median <= row.eti_high);
        assert!(row.mad > 0.5 && row.mad < 0.85, "mad = {}", row.mad);
        assert!(row.mcse_median > 0.0 && row.mcse_median < 0.1);
        assert!(!row.is_flagged());
        assert_eq!(summary.records()[0].len(), summary.header().len());
        assert_eq!(summary.records()[0][0], "mu");
        assert!(summary.to_table().contains("eti_95%"));
    }

    #[test]
    fn test_summary_from_inference_data() {
        let mut idata = InferenceData::new();
        let mut posterior = Group::new(GroupKind::Posterior);
        posterior.insert_chains("alpha", &iid_chains(2, 100, 5)).unwrap();
        idata.extend(posterior).unwrap();
        let mut stats = Group::new(GroupKind::SampleStats);
        stats
            .insert_chains("diverging", &[vec![0.0; 100], {
                let mut v = vec![0.0; 100];
                v[7] = 1.0;
                v
            }])
            .unwrap();
        stats
            .insert_chains("acceptance_rate", &[vec![0.8; 100], vec![0.9; 100]])
            .unwrap();
        idata.extend(stats).unwrap();

        let s = Summary::from_inference_data(&idata, 0.9).unwrap();
        assert_eq!(s.rows.len(), 1);
        assert_eq!(s.divergences, 1);
        assert!((s.mean_accept_rate - 0.85).abs() < 1e-12);
        assert_eq!((s.num_chains, s.num_draws), (2, 100));
        // 200 total draws fall short of the ESS threshold.
        assert_eq!(s.flagged().len(), 1);
    }

    #[test]
    fn test_summary_requires_posterior() {
        assert!(Summary::from_inference_data(&InferenceData::new(), 0.9).is_err());
    }
}
