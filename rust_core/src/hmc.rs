use crate::autodiff::Evaluator;
use crate::graph::Graph;
use crate::nuts::{find_initial_step_size, MAX_DELTA_H};
use crate::progress::ProgressState;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Configuration for the static-trajectory HMC sampler.
#[derive(Debug, Clone)]
pub struct HmcConfig {
    /// Initial step size; 0 means find one heuristically.
    pub step_size: f64,
    pub num_leapfrog_steps: usize,
    pub num_draws: usize,
    pub num_warmup: usize,
}

impl Default for HmcConfig {
    fn default() -> Self {
        Self {
            step_size: 0.0,
            num_leapfrog_steps: 20,
            num_draws: 1000,
            num_warmup: 500,
        }
    }
}

/// Per-draw sampler statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrawStats {
    /// Log-density (unconstrained scale, Jacobian included) of the kept draw.
    pub lp: f64,
    /// Mean Metropolis acceptance probability of the transition.
    pub accept_stat: f64,
    pub diverging: bool,
    pub tree_depth: usize,
    pub n_steps: usize,
}

/// Result of a single chain run. Draws are on the unconstrained scale.
#[derive(Debug, Clone)]
pub struct ChainResult {
    pub samples: Vec<Vec<f64>>,
    pub stats: Vec<DrawStats>,
    pub accept_rate: f64,
    pub step_size: f64,
    pub divergences: usize,
}

/// Run a single HMC chain.
///
/// The graph is read-only during sampling.
/// Each chain gets its own RNG for reproducibility.
pub fn run_chain(
    graph: &Graph,
    config: &HmcConfig,
    rng: &mut ChaCha8Rng,
    init: Option<Vec<f64>>,
    progress: Option<&ProgressState>,
) -> ChainResult {
    let dim = graph.param_count;
    let mut q = init.unwrap_or_else(|| vec![0.0; dim]);
    let total_iters = config.num_warmup + config.num_draws;
    let unit_mass = vec![1.0f64; dim];
    let n_steps = config.num_leapfrog_steps.max(1);

    let mut evaluator = Evaluator::new(graph);
    let mut samples = Vec::with_capacity(config.num_draws);
    let mut stats = Vec::with_capacity(config.num_draws);
    let mut sum_accept = 0.0f64;
    let mut divergences = 0usize;

    let mut step_size = if config.step_size > 0.0 {
        config.step_size
    } else {
        find_initial_step_size(graph, &mut evaluator, &q, &unit_mass, &unit_mass, rng)
    };

    // Dual-averaging step-size adaptation during warmup
    let target_accept = 0.65;
    let mu = (10.0 * step_size).ln();
    let gamma = 0.05;
    let t0 = 10.0;
    let kappa = 0.75;
    let mut log_eps_bar = 0.0f64;
    let mut h_bar = 0.0f64;

    evaluator.compute(graph, &q);
    let mut logp_current = evaluator.total_logp;
    let mut grad_current = evaluator.grad.clone();

    for iter in 0..total_iters {
        let is_warmup = iter < config.num_warmup;

        let p: Vec<f64> = (0..dim).map(|_| StandardNormal.sample(rng)).collect();

        let mut q_prop = q.clone();
        let mut p_prop = p.clone();
        let mut grad = grad_current.clone();

        // Half step for momentum
        for i in 0..dim {
            p_prop[i] += 0.5 * step_size * grad[i];
        }

        for step in 0..n_steps {
            for i in 0..dim {
                q_prop[i] += step_size * p_prop[i];
            }

            evaluator.compute(graph, &q_prop);
            grad.copy_from_slice(&evaluator.grad);

            // Full step for momentum (except at end)
            if step < n_steps - 1 {
                for i in 0..dim {
                    p_prop[i] += step_size * grad[i];
                }
            }
        }
        let logp_prop = evaluator.total_logp;

        for i in 0..dim {
            p_prop[i] += 0.5 * step_size * grad[i];
        }

        let ke_current: f64 = p.iter().map(|pi| 0.5 * pi * pi).sum();
        let ke_prop: f64 = p_prop.iter().map(|pi| 0.5 * pi * pi).sum();
        let h_current = -logp_current + ke_current;
        let h_prop = -logp_prop + ke_prop;
        let log_accept_ratio = h_current - h_prop;
        let diverging = !log_accept_ratio.is_finite() || -log_accept_ratio > MAX_DELTA_H;
        let accept_prob = if diverging {
            0.0
        } else {
            log_accept_ratio.min(0.0).exp()
        };

        if !diverging && rng.gen::<f64>().ln() < log_accept_ratio {
            q = q_prop;
            logp_current = logp_prop;
            grad_current = grad;
        }

        if let Some(pr) = progress {
            pr.record(is_warmup, n_steps, diverging);
        }

        if is_warmup {
            let m = (iter + 1) as f64;
            let w = 1.0 / (m + t0);
            h_bar = (1.0 - w) * h_bar + w * (target_accept - accept_prob);
            let log_eps = mu - (m.sqrt() / gamma) * h_bar;
            step_size = log_eps.exp();
            let m_pow = m.powf(-kappa);
            log_eps_bar = m_pow * log_eps + (1.0 - m_pow) * log_eps_bar;
        }

        // After warmup, fix step size
        if iter == config.num_warmup.saturating_sub(1) && config.num_warmup > 0 {
            step_size = log_eps_bar.exp();
        }

        if !is_warmup {
            sum_accept += accept_prob;
            if diverging {
                divergences += 1;
            }
            samples.push(q.clone());
            stats.push(DrawStats {
                lp: logp_current,
                accept_stat: accept_prob,
                diverging,
                tree_depth: 0,
                n_steps,
            });
        }
    }

    ChainResult {
        samples,
        stats,
        accept_rate: if config.num_draws > 0 {
            sum_accept / config.num_draws as f64
        } else {
            0.0
        },
        step_size,
        divergences,
    }
}
