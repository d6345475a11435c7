use crate::error::{CoreError, Result};
use crate::graph::Graph;
use crate::hmc::{self, ChainResult, DrawStats, HmcConfig};
use crate::nuts::{self, NutsConfig};
use crate::progress::{spawn_progress_thread, ProgressState};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which transition kernel drives each chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    #[default]
    Nuts,
    Hmc,
}

/// Configuration for the multi-chain sampler.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub num_chains: usize,
    pub num_draws: usize,
    pub num_warmup: usize,
    /// Initial step size; 0 means find one heuristically.
    pub step_size: f64,
    /// Trajectory length for static HMC. Ignored by NUTS.
    pub num_leapfrog_steps: usize,
    pub max_tree_depth: usize,
    pub target_accept: f64,
    pub kind: SamplerKind,
    /// Chains start from Uniform(lo, hi) on the unconstrained scale.
    pub init_jitter: (f64, f64),
    pub seed: u64,
    /// Number of threads. 0 means use Rayon's default (all cores).
    pub num_threads: usize,
    /// Render a live progress bar on stderr.
    pub progress: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            num_chains: 4,
            num_draws: 1000,
            num_warmup: 1000,
            step_size: 0.0,
            num_leapfrog_steps: 15,
            max_tree_depth: 10,
            target_accept: 0.8,
            kind: SamplerKind::Nuts,
            init_jitter: (-1.0, 1.0),
            seed: 42,
            num_threads: 0,
            progress: false,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_chains == 0 {
            return Err(CoreError::InvalidConfig("num_chains must be at least 1".into()));
        }
        if self.num_draws == 0 {
            return Err(CoreError::InvalidConfig("num_draws must be at least 1".into()));
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(CoreError::InvalidConfig(format!(
                "target_accept must lie in (0, 1), got {}",
                self.target_accept
            )));
        }
        if self.step_size < 0.0 || !self.step_size.is_finite() {
            return Err(CoreError::InvalidConfig(format!(
                "step_size must be finite and non-negative, got {}",
                self.step_size
            )));
        }
        if self.max_tree_depth == 0 {
            return Err(CoreError::InvalidConfig("max_tree_depth must be at least 1".into()));
        }
        let (lo, hi) = self.init_jitter;
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
            return Err(CoreError::InvalidConfig(format!(
                "init_jitter bounds ({}, {}) are not an interval",
                lo, hi
            )));
        }
        Ok(())
    }
}

/// Result of sampling across all chains.
#[derive(Debug, Clone)]
pub struct SampleResult {
    /// samples[chain][draw][param], on the constrained scale.
    pub samples: Vec<Vec<Vec<f64>>>,
    /// stats[chain][draw]
    pub stats: Vec<Vec<DrawStats>>,
    pub accept_rates: Vec<f64>,
    pub step_sizes: Vec<f64>,
    pub divergences: Vec<usize>,
    pub param_names: Vec<String>,
}

impl SampleResult {
    pub fn num_chains(&self) -> usize {
        self.samples.len()
    }

    pub fn num_draws(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    pub fn total_divergences(&self) -> usize {
        self.divergences.iter().sum()
    }

    /// Draws of one parameter, split by chain.
    pub fn param_chains(&self, index: usize) -> Vec<Vec<f64>> {
        self.samples
            .iter()
            .map(|chain| chain.iter().map(|draw| draw[index]).collect())
            .collect()
    }
}

/// Run parallel chains on the given graph.
///
/// The graph is shared read-only across all chains. Each chain gets a
/// deterministic RNG seeded from `config.seed + chain_index` (wrapping), so
/// results do not depend on thread scheduling.
pub fn sample(graph: &Graph, config: &SamplerConfig) -> Result<SampleResult> {
    config.validate()?;
    if graph.param_count == 0 {
        return Err(CoreError::EmptyModel);
    }

    let progress = config.progress.then(|| {
        Arc::new(ProgressState::new(
            config.num_chains,
            config.num_draws,
            config.num_warmup,
        ))
    });
    let handle = progress.clone().map(spawn_progress_thread);

    let results = if config.num_threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build()
            .map_err(|e| CoreError::InvalidConfig(format!("thread pool: {}", e)))?;
        pool.install(|| run_chains(graph, config, progress.as_deref()))
    } else {
        run_chains(graph, config, progress.as_deref())
    };

    if let (Some(state), Some(handle)) = (progress, handle) {
        state.finish();
        let _ = handle.join();
    }

    for (chain, r) in results.iter().enumerate() {
        tracing::debug!(
            chain,
            step_size = r.step_size,
            accept_rate = r.accept_rate,
            divergences = r.divergences,
            "chain finished"
        );
    }

    let samples = results
        .iter()
        .map(|r| r.samples.iter().map(|raw| graph.constrain(raw)).collect())
        .collect();

    Ok(SampleResult {
        samples,
        stats: results.iter().map(|r| r.stats.clone()).collect(),
        accept_rates: results.iter().map(|r| r.accept_rate).collect(),
        step_sizes: results.iter().map(|r| r.step_size).collect(),
        divergences: results.iter().map(|r| r.divergences).collect(),
        param_names: graph.param_names.clone(),
    })
}

fn run_chains(
    graph: &Graph,
    config: &SamplerConfig,
    progress: Option<&ProgressState>,
) -> Vec<ChainResult> {
    (0..config.num_chains)
        .into_par_iter()
        .map(|chain_idx| {
            let seed = config.seed.wrapping_add(chain_idx as u64);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (lo, hi) = config.init_jitter;
            let init: Vec<f64> = (0..graph.param_count)
                .map(|_| if hi > lo { rng.gen_range(lo..hi) } else { lo })
                .collect();

            match config.kind {
                SamplerKind::Nuts => {
                    let nuts_config = NutsConfig {
                        step_size: config.step_size,
                        max_tree_depth: config.max_tree_depth,
                        num_draws: config.num_draws,
                        num_warmup: config.num_warmup,
                        target_accept: config.target_accept,
                    };
                    nuts::run_chain(graph, &nuts_config, &mut rng, Some(init), progress)
                }
                SamplerKind::Hmc => {
                    let hmc_config = HmcConfig {
                        step_size: config.step_size,
                        num_leapfrog_steps: config.num_leapfrog_steps,
                        num_draws: config.num_draws,
                        num_warmup: config.num_warmup,
                    };
                    hmc::run_chain(graph, &hmc_config, &mut rng, Some(init), progress)
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{Exponential, Normal};

    fn scale_model() -> Graph {
        let mut g = Graph::new();
        Normal::prior(&mut g, "m", 0.0, 1.0);
        Exponential::prior(&mut g, "s", 1.0);
        g
    }

    #[test]
    fn test_sample_shapes_and_constraints() {
        let g = scale_model();
        let config = SamplerConfig {
            num_chains: 3,
            num_draws: 200,
            num_warmup: 200,
            ..SamplerConfig::default()
        };
        let result = sample(&g, &config).unwrap();
        assert_eq!(result.num_chains(), 3);
        assert_eq!(result.num_draws(), 200);
        assert_eq!(result.stats[0].len(), 200);
        assert_eq!(result.param_names, vec!["m".to_string(), "s".to_string()]);
        // The exp transform keeps the scale parameter positive.
        assert!(result
            .samples
            .iter()
            .flatten()
            .all(|draw| draw[1] > 0.0));
        assert_eq!(result.param_chains(1).len(), 3);
    }

    #[test]
    fn test_sample_is_reproducible_across_thread_counts() {
        let g = scale_model();
        let base = SamplerConfig {
            num_chains: 2,
            num_draws: 50,
            num_warmup: 50,
            ..SamplerConfig::default()
        };
        let single = SamplerConfig {
            num_threads: 1,
            ..base.clone()
        };
        let a = sample(&g, &base).unwrap();
        let b = sample(&g, &single).unwrap();
        assert_eq!(a.samples, b.samples);
    }

    #[test]
    fn test_hmc_kind_runs() {
        let g = scale_model();
        let config = SamplerConfig {
            num_chains: 1,
            num_draws: 100,
            num_warmup: 100,
            kind: SamplerKind::Hmc,
            num_leapfrog_steps: 8,
            ..SamplerConfig::default()
        };
        let result = sample(&g, &config).unwrap();
        assert_eq!(result.samples[0].len(), 100);
        assert!(result.stats[0].iter().all(|s| s.tree_depth == 0));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let g = scale_model();
        let config = SamplerConfig {
            num_chains: 0,
            ..SamplerConfig::default()
        };
        assert!(matches!(
            sample(&g, &config),
            Err(CoreError::InvalidConfig(_))
        ));
        let config = SamplerConfig {
            target_accept: 1.5,
            ..SamplerConfig::default()
        };
        assert!(sample(&g, &config).is_err());
    }

    #[test]
    fn test_mass_adaptation_handles_unequal_scales() {
        let mut g = Graph::new();
        Normal::prior(&mut g, "tiny", 0.0, 0.01);
        Normal::prior(&mut g, "wide", 0.0, 10.0);
        let config = SamplerConfig {
            num_chains: 2,
            ..SamplerConfig::default()
        };
        let result = sample(&g, &config).unwrap();

        for (i, truth) in [(0, 0.01), (1, 10.0)] {
            let chains = result.param_chains(i);
            let all: Vec<f64> = chains.concat();
            let mean = all.iter().sum::<f64>() / all.len() as f64;
            let sd = (all.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / all.len() as f64)
                .sqrt();
            assert!((sd / truth - 1.0).abs() < 0.1, "param {} sd = {}", i, sd);
            let ess = crate::diagnostics::ess_bulk(&chains);
            assert!(ess > 300.0, "param {} ess = {}", i, ess);
        }
        // The adapted metric absorbs the scales, so the step size stays O(1).
        assert!(result.step_sizes.iter().all(|&e| e > 0.1), "{:?}", result.step_sizes);
    }

    #[test]
    fn test_seed_near_max_does_not_overflow() {
        let g = scale_model();
        let config = SamplerConfig {
            num_chains: 3,
            num_draws: 10,
            num_warmup: 10,
            seed: u64::MAX,
            ..SamplerConfig::default()
        };
        let result = sample(&g, &config).unwrap();
        assert_eq!(result.num_chains(), 3);
        assert_ne!(result.samples[0], result.samples[1]);
    }

    #[test]
    fn test_empty_graph_is_rejected() {
        let g = Graph::new();
        assert_eq!(
            sample(&g, &SamplerConfig::default()).unwrap_err(),
            CoreError::EmptyModel
        );
    }
}
