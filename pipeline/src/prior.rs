//! Prior stage: prior and prior-predictive draws.

use crate::artifacts::Frame;
use crate::charts;
use crate::error::Result;
use bayeslm_core::{Group, GroupKind, InferenceData, ModelSpec};
use ndarray::Array3;
use rand::Rng;

/// Stack `rows[draw][observation]` of one chain into `(1, draw, observation)`.
pub(crate) fn single_chain(rows: &[Vec<f64>], n_obs: usize) -> Array3<f64> {
    Array3::from_shape_fn((1, rows.len(), n_obs), |(_, d, o)| rows[d][o])
}

/// Draw `draws` samples from the priors and one simulated response vector
/// per draw, and start a fresh container with the `prior`,
/// `prior_predictive` and `observed_data` groups.
///
/// Observed responses are copied into `observed_data` only; they play no
/// part in the draws.
pub fn sample_prior<R: Rng + ?Sized>(
    spec: &ModelSpec,
    draws: usize,
    rng: &mut R,
) -> Result<InferenceData> {
    let samples = spec.sample_prior(draws, rng);

    let mut prior = Group::new(GroupKind::Prior);
    for (name, values) in spec.param_names().iter().zip(samples.params) {
        prior.insert_chains(name, &[values])?;
    }

    let mut predictive = Group::new(GroupKind::PriorPredictive);
    let mut observed = Group::new(GroupKind::ObservedData);
    for (lik, rows) in spec.likelihoods().iter().zip(&samples.predictive) {
        let n_obs = spec.n_obs(lik);
        predictive.insert(&lik.name, single_chain(rows, n_obs))?;
        if let Some(obs) = spec.data(&lik.observed_key) {
            observed.insert(&lik.name, single_chain(&[obs.to_vec()], n_obs))?;
        }
    }

    let mut idata = InferenceData::new();
    idata.extend(prior)?;
    idata.extend(predictive)?;
    idata.extend(observed)?;
    tracing::info!(draws, "sampled prior predictive");
    Ok(idata)
}

/// Cumulative prior predictive check, without the observed curve.
pub fn prior_check(idata: &InferenceData, var: &str) -> Result<Frame> {
    let group = idata.require(GroupKind::PriorPredictive)?;
    let predictive = group.variable(var)?;
    charts::ppc_cumulative(predictive, None, "prior predictive check")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataConfig, PriorsConfig};
    use crate::data::Observations;
    use crate::model::build_model;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn prior_idata() -> InferenceData {
        let obs = Observations::generate(&DataConfig::default(), &mut ChaCha8Rng::seed_from_u64(1));
        let spec = build_model(&PriorsConfig::default(), &obs).unwrap();
        sample_prior(&spec, 200, &mut ChaCha8Rng::seed_from_u64(2)).unwrap()
    }

    #[test]
    fn test_prior_groups() {
        let idata = prior_idata();
        let prior = idata.group(GroupKind::Prior).unwrap();
        assert_eq!(prior.names(), vec!["alpha", "beta", "sigma"]);
        assert_eq!((prior.n_chains(), prior.n_draws()), (1, 200));
        assert!(prior.flat("sigma").unwrap().iter().all(|&s| s > 0.0));

        let pp = idata.group(GroupKind::PriorPredictive).unwrap();
        assert_eq!(pp.get("y").unwrap().dim(), (1, 200, 100));
        let observed = idata.group(GroupKind::ObservedData).unwrap();
        assert_eq!(observed.get("y").unwrap().dim(), (1, 1, 100));
        assert!(!idata.has_group(GroupKind::Posterior));
    }

    #[test]
    fn test_prior_predictive_differs_from_observed() {
        let idata = prior_idata();
        let observed = idata.group(GroupKind::ObservedData).unwrap().flat("y").unwrap();
        let pp = idata.group(GroupKind::PriorPredictive).unwrap();
        for draw in pp.get("y").unwrap().outer_iter().next().unwrap().outer_iter() {
            assert_ne!(draw.to_vec(), observed);
        }
    }

    #[test]
    fn test_prior_check_renders() {
        let idata = prior_idata();
        assert!(prior_check(&idata, "y").is_ok());
        assert!(prior_check(&idata, "nope").is_err());
    }
}
