//! Posterior stage: NUTS sampling, then posterior predictive draws.

use crate::artifacts::Frame;
use crate::charts;
use crate::config::PipelineConfig;
use crate::error::Result;
use bayeslm_core::hmc::DrawStats;
use bayeslm_core::{sample, Group, GroupKind, InferenceData, ModelSpec, SampleResult};
use ndarray::Array3;
use rand::Rng;
use tracing::{info, warn};

/// Fit the model and add the `posterior` and `sample_stats` groups.
pub fn sample_posterior(
    spec: &ModelSpec,
    config: &PipelineConfig,
    idata: &mut InferenceData,
) -> Result<SampleResult> {
    let graph = spec.compile()?;
    let sampler = config.sampler_config();
    info!(
        chains = sampler.num_chains,
        draws = sampler.num_draws,
        warmup = sampler.num_warmup,
        kind = ?sampler.kind,
        "sampling posterior"
    );
    let result = sample(&graph, &sampler)?;

    let mut posterior = Group::new(GroupKind::Posterior);
    for (i, name) in result.param_names.iter().enumerate() {
        posterior.insert_chains(name, &result.param_chains(i))?;
    }

    let mut stats = Group::new(GroupKind::SampleStats);
    stats.insert_chains("lp", &stat_chains(&result, |s| s.lp))?;
    stats.insert_chains("acceptance_rate", &stat_chains(&result, |s| s.accept_stat))?;
    stats.insert_chains(
        "diverging",
        &stat_chains(&result, |s| if s.diverging { 1.0 } else { 0.0 }),
    )?;
    stats.insert_chains("tree_depth", &stat_chains(&result, |s| s.tree_depth as f64))?;
    stats.insert_chains("n_steps", &stat_chains(&result, |s| s.n_steps as f64))?;

    idata.extend(posterior)?;
    idata.extend(stats)?;

    let divergences = result.total_divergences();
    if divergences > 0 {
        warn!(divergences, "divergent transitions after tuning");
    } else {
        info!("no divergent transitions");
    }
    Ok(result)
}

fn stat_chains(result: &SampleResult, f: impl Fn(&DrawStats) -> f64) -> Vec<Vec<f64>> {
    result
        .stats
        .iter()
        .map(|chain| chain.iter().map(&f).collect())
        .collect()
}

/// Simulate one response vector per posterior draw and add the
/// `posterior_predictive` group. Draws are visited chain by chain.
pub fn sample_posterior_predictive<R: Rng + ?Sized>(
    spec: &ModelSpec,
    result: &SampleResult,
    rng: &mut R,
    idata: &mut InferenceData,
) -> Result<()> {
    let (n_chains, n_draws) = (result.num_chains(), result.num_draws());
    let mut group = Group::new(GroupKind::PosteriorPredictive);

    // sims[likelihood][chain * n_draws + draw][observation]
    let mut sims: Vec<Vec<Vec<f64>>> =
        vec![Vec::with_capacity(n_chains * n_draws); spec.likelihoods().len()];
    for chain in &result.samples {
        for draw in chain {
            for (l, y) in spec.simulate(draw, rng).into_iter().enumerate() {
                sims[l].push(y);
            }
        }
    }

    for (lik, rows) in spec.likelihoods().iter().zip(&sims) {
        let n_obs = spec.n_obs(lik);
        let values = Array3::from_shape_fn((n_chains, n_draws, n_obs), |(c, d, o)| {
            rows[c * n_draws + d][o]
        });
        group.insert(&lik.name, values)?;
    }

    idata.extend(group)?;
    info!(draws = n_chains * n_draws, "sampled posterior predictive");
    Ok(())
}

/// Cumulative posterior predictive check against the observed responses.
pub fn posterior_check(idata: &InferenceData, var: &str) -> Result<Frame> {
    let predictive = idata.require(GroupKind::PosteriorPredictive)?.variable(var)?;
    let observed = idata.require(GroupKind::ObservedData)?.variable(var)?;
    let observed: Vec<f64> = observed.iter().copied().collect();
    charts::ppc_cumulative(predictive, Some(&observed), "posterior predictive check")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::data::Observations;
    use crate::model::build_model;
    use crate::prior::sample_prior;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn small_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.sampling.chains = 2;
        config.sampling.draws = 200;
        config.sampling.warmup = 200;
        config
    }

    #[test]
    fn test_posterior_groups_and_predictive() {
        let config = small_config();
        let obs = Observations::generate(&config.data, &mut ChaCha8Rng::seed_from_u64(1));
        let spec = build_model(&config.priors, &obs).unwrap();
        let mut idata = sample_prior(&spec, 50, &mut ChaCha8Rng::seed_from_u64(2)).unwrap();

        let result = sample_posterior(&spec, &config, &mut idata).unwrap();
        let posterior = idata.group(GroupKind::Posterior).unwrap();
        assert_eq!(posterior.names(), vec!["alpha", "beta", "sigma"]);
        assert_eq!((posterior.n_chains(), posterior.n_draws()), (2, 200));
        let stats = idata.group(GroupKind::SampleStats).unwrap();
        assert_eq!(
            stats.names(),
            vec!["lp", "acceptance_rate", "diverging", "tree_depth", "n_steps"]
        );

        sample_posterior_predictive(&spec, &result, &mut ChaCha8Rng::seed_from_u64(3), &mut idata)
            .unwrap();
        let pp = idata.group(GroupKind::PosteriorPredictive).unwrap();
        assert_eq!(pp.get("y").unwrap().dim(), (2, 200, 100));
        assert!(posterior_check(&idata, "y").is_ok());

        // The stage extends the container once; a second run is refused.
        assert!(sample_posterior(&spec, &config, &mut idata).is_err());
    }
}
