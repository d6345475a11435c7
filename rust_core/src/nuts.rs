//! No-U-Turn Sampler (NUTS), Hoffman & Gelman (2014), with multinomial
//! sampling (Betancourt 2017).
//!
//! This follows the same algorithm used by PyMC and Stan:
//!   - Iterative tree doubling (extend trajectory forward or backward)
//!   - U-turn criterion on subtrees and on the full trajectory
//!   - Multinomial candidate selection weighted by exp(-H)
//!   - Divergence detection via energy error threshold
//!   - Max tree depth cap (default 10)

use crate::autodiff::Evaluator;
use crate::graph::Graph;
use crate::hmc::{ChainResult, DrawStats};
use crate::progress::ProgressState;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Energy error above which a transition counts as divergent.
pub const MAX_DELTA_H: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct NutsConfig {
    /// Initial step size; 0 means find one heuristically.
    pub step_size: f64,
    pub max_tree_depth: usize,
    pub num_draws: usize,
    pub num_warmup: usize,
    /// Dual-averaging target for the mean acceptance statistic.
    pub target_accept: f64,
}

impl Default for NutsConfig {
    fn default() -> Self {
        Self {
            step_size: 0.0,
            max_tree_depth: 10,
            num_draws: 1000,
            num_warmup: 500,
            target_accept: 0.8,
        }
    }
}

/// A point on the Hamiltonian trajectory: (position, momentum, gradient, log-probability).
#[derive(Clone)]
struct PhasePoint {
    q: Vec<f64>,
    p: Vec<f64>,
    grad: Vec<f64>,
    logp: f64,
}

impl PhasePoint {
    fn energy(&self, inv_mass: &[f64]) -> f64 {
        let ke: f64 = self
            .p
            .iter()
            .zip(inv_mass.iter())
            .map(|(&pi, &im)| 0.5 * pi * pi * im)
            .sum();
        -self.logp + ke
    }
}

/// Result of building one subtree during the doubling process.
struct TreeResult {
    left: PhasePoint,
    right: PhasePoint,
    /// The candidate sample (multinomial-selected from valid leaves).
    proposal: PhasePoint,
    /// Log of the sum of weights (for multinomial combining).
    log_sum_weight: f64,
    n_leapfrog: usize,
    /// Sum over leaves of min(1, exp(-ΔH)).
    sum_accept_prob: f64,
    turning: bool,
    diverging: bool,
}

struct TreeStats {
    diverging: bool,
    mean_accept_prob: f64,
    depth: usize,
    n_leapfrog: usize,
}

/// Run a single NUTS chain with diagonal mass matrix adaptation.
///
/// Warmup:
///   Phase 1 (15%): step-size adaptation, identity mass matrix
///   Phase 2 (75%): estimate the posterior variance of each coordinate and
///                  use it as the diagonal inverse metric
///   Phase 3 (10%): step-size adaptation with the adapted mass matrix
pub fn run_chain(
    graph: &Graph,
    config: &NutsConfig,
    rng: &mut ChaCha8Rng,
    init: Option<Vec<f64>>,
    progress: Option<&ProgressState>,
) -> ChainResult {
    let dim = graph.param_count;
    let total_iters = config.num_warmup + config.num_draws;

    let mut evaluator = Evaluator::new(graph);
    let q = init.unwrap_or_else(|| vec![0.0; dim]);
    let mut samples = Vec::with_capacity(config.num_draws);
    let mut stats = Vec::with_capacity(config.num_draws);
    let mut n_divergences = 0usize;
    let mut sum_accept_prob = 0.0f64;

    let mut inv_mass_diag = vec![1.0f64; dim];
    let mut mass_sqrt = vec![1.0f64; dim];

    let phase1_end = config.num_warmup * 15 / 100;
    let phase2_end = config.num_warmup * 90 / 100;
    let mut warmup_q_sum = vec![0.0f64; dim];
    let mut warmup_q_sq_sum = vec![0.0f64; dim];
    let mut warmup_count = 0usize;

    let mut step_size = if config.step_size > 0.0 {
        config.step_size
    } else {
        find_initial_step_size(graph, &mut evaluator, &q, &inv_mass_diag, &mass_sqrt, rng)
    };

    // Dual averaging
    let target_accept = config.target_accept;
    let mut da_mu = (10.0 * step_size).ln();
    let da_gamma = 0.05;
    let da_t0 = 10.0;
    let da_kappa = 0.75;
    let mut log_eps_bar = step_size.ln();
    let mut h_bar = 0.0f64;
    let mut adapt_count = 0u64;

    evaluator.compute(graph, &q);
    let mut current = PhasePoint {
        q,
        p: vec![0.0; dim],
        grad: evaluator.grad.clone(),
        logp: evaluator.total_logp,
    };

    for iter in 0..total_iters {
        let is_warmup = iter < config.num_warmup;

        for i in 0..dim {
            let z: f64 = StandardNormal.sample(rng);
            current.p[i] = z * mass_sqrt[i];
        }

        let h0 = current.energy(&inv_mass_diag);

        let (proposal, tree_stats) = build_tree_iterative(
            graph,
            &mut evaluator,
            &current,
            step_size,
            &inv_mass_diag,
            h0,
            config.max_tree_depth,
            rng,
        );

        // The proposal never comes from a divergent or turning subtree, so it
        // is always a valid state.
        current.q.copy_from_slice(&proposal.q);
        current.grad.copy_from_slice(&proposal.grad);
        current.logp = proposal.logp;

        let accept_stat = tree_stats.mean_accept_prob;

        if let Some(p) = progress {
            p.record(is_warmup, tree_stats.n_leapfrog, tree_stats.diverging);
        }

        if is_warmup {
            adapt_count += 1;
            let m = adapt_count as f64;
            let w = 1.0 / (m + da_t0);
            h_bar = (1.0 - w) * h_bar + w * (target_accept - accept_stat);
            let log_eps = da_mu - (m.sqrt() / da_gamma) * h_bar;
            step_size = log_eps.exp();
            let m_pow = m.powf(-da_kappa);
            log_eps_bar = m_pow * log_eps + (1.0 - m_pow) * log_eps_bar;

            if iter >= phase1_end && iter < phase2_end {
                for i in 0..dim {
                    warmup_q_sum[i] += current.q[i];
                    warmup_q_sq_sum[i] += current.q[i] * current.q[i];
                }
                warmup_count += 1;
            }

            if iter == phase2_end && warmup_count > 10 {
                let n = warmup_count as f64;
                for i in 0..dim {
                    let mean = warmup_q_sum[i] / n;
                    let var = (warmup_q_sq_sum[i] / n - mean * mean).max(0.0);
                    // Shrink towards unit scale, as Stan does.
                    let var = (n / (n + 5.0)) * var + 1e-3 * (5.0 / (n + 5.0));
                    inv_mass_diag[i] = var;
                    mass_sqrt[i] = 1.0 / var.sqrt();
                }
                let new_eps = find_initial_step_size(
                    graph,
                    &mut evaluator,
                    &current.q,
                    &inv_mass_diag,
                    &mass_sqrt,
                    rng,
                );
                step_size = new_eps;
                da_mu = (10.0 * new_eps).ln();
                log_eps_bar = new_eps.ln();
                h_bar = 0.0;
                adapt_count = 0;

                evaluator.compute(graph, &current.q);
                current.logp = evaluator.total_logp;
                current.grad.copy_from_slice(&evaluator.grad);
            }
        }

        if iter == config.num_warmup.saturating_sub(1) && config.num_warmup > 0 {
            step_size = log_eps_bar.exp();
        }

        if !is_warmup {
            if tree_stats.diverging {
                n_divergences += 1;
            }
            sum_accept_prob += accept_stat;
            samples.push(current.q.clone());
            stats.push(DrawStats {
                lp: current.logp,
                accept_stat,
                diverging: tree_stats.diverging,
                tree_depth: tree_stats.depth,
                n_steps: tree_stats.n_leapfrog,
            });
        }
    }

    let accept_rate = if config.num_draws > 0 {
        sum_accept_prob / config.num_draws as f64
    } else {
        0.0
    };

    ChainResult {
        samples,
        stats,
        accept_rate,
        step_size,
        divergences: n_divergences,
    }
}

/// Build the NUTS tree iteratively by doubling depth.
///
/// At each depth j, the new subtree has 2^j leaves. We randomly choose to
/// extend the trajectory forward (+ε) or backward (-ε). After extending, we
/// check the U-turn criterion across the full tree. If a U-turn is detected
/// or a divergence occurs, we stop and return the current candidate.
#[allow(clippy::too_many_arguments)]
fn build_tree_iterative(
    graph: &Graph,
    evaluator: &mut Evaluator,
    initial: &PhasePoint,
    eps: f64,
    inv_mass: &[f64],
    h0: f64,
    max_depth: usize,
    rng: &mut ChaCha8Rng,
) -> (PhasePoint, TreeStats) {
    let mut left = initial.clone();
    let mut right = initial.clone();
    let mut proposal = initial.clone();
    // The initial point has ΔH = 0, hence weight exp(0).
    let mut log_sum_weight = 0.0f64;
    let mut depth = 0;
    let mut n_leapfrog = 0usize;
    let mut sum_accept = 0.0f64;
    let mut diverging = false;

    while depth < max_depth {
        let forward = rng.gen::<bool>();

        let subtree = if forward {
            build_subtree(graph, evaluator, &right, eps, inv_mass, h0, depth, rng)
        } else {
            build_subtree(graph, evaluator, &left, -eps, inv_mass, h0, depth, rng)
        };

        n_leapfrog += subtree.n_leapfrog;
        sum_accept += subtree.sum_accept_prob;
        depth += 1;

        if subtree.diverging {
            diverging = true;
            break;
        }
        if subtree.turning {
            break;
        }

        // Biased progressive sampling: prefer the new subtree's proposal.
        let accept_prob = (subtree.log_sum_weight - log_sum_weight).min(0.0).exp();
        if rng.gen::<f64>() < accept_prob {
            proposal = subtree.proposal;
        }
        log_sum_weight = log_sum_exp(log_sum_weight, subtree.log_sum_weight);

        if forward {
            right = subtree.right;
        } else {
            left = subtree.left;
        }

        if check_uturn(&left, &right, inv_mass) {
            break;
        }
    }

    let mean_accept = if n_leapfrog > 0 {
        (sum_accept / n_leapfrog as f64).min(1.0)
    } else {
        0.0
    };

    (
        proposal,
        TreeStats {
            diverging,
            mean_accept_prob: mean_accept,
            depth,
            n_leapfrog,
        },
    )
}

/// Recursively build a balanced binary subtree of given depth.
///
/// depth=0: take a single leapfrog step.
/// depth=j: build two subtrees of depth j-1 and combine.
#[allow(clippy::too_many_arguments)]
fn build_subtree(
    graph: &Graph,
    evaluator: &mut Evaluator,
    point: &PhasePoint,
    eps: f64,
    inv_mass: &[f64],
    h0: f64,
    depth: usize,
    rng: &mut ChaCha8Rng,
) -> TreeResult {
    if depth == 0 {
        let next = leapfrog(graph, evaluator, point, eps, inv_mass);
        let delta_h = next.energy(inv_mass) - h0;
        let diverging = delta_h > MAX_DELTA_H || !delta_h.is_finite();
        let (log_weight, accept) = if diverging {
            (f64::NEG_INFINITY, 0.0)
        } else {
            (-delta_h, (-delta_h).exp().min(1.0))
        };

        return TreeResult {
            left: next.clone(),
            right: next.clone(),
            proposal: next,
            log_sum_weight: log_weight,
            n_leapfrog: 1,
            sum_accept_prob: accept,
            turning: false,
            diverging,
        };
    }

    let inner = build_subtree(graph, evaluator, point, eps, inv_mass, h0, depth - 1, rng);
    if inner.diverging || inner.turning {
        return inner;
    }

    let start_point = if eps > 0.0 { &inner.right } else { &inner.left };
    let outer = build_subtree(graph, evaluator, start_point, eps, inv_mass, h0, depth - 1, rng);

    let n_leapfrog = inner.n_leapfrog + outer.n_leapfrog;
    let sum_accept_prob = inner.sum_accept_prob + outer.sum_accept_prob;

    if outer.diverging || outer.turning {
        return TreeResult {
            n_leapfrog,
            sum_accept_prob,
            turning: outer.turning,
            diverging: outer.diverging,
            ..inner
        };
    }

    // Uniform multinomial combination inside a subtree.
    let log_sum = log_sum_exp(inner.log_sum_weight, outer.log_sum_weight);
    let accept_outer = (outer.log_sum_weight - log_sum).exp();
    let proposal = if rng.gen::<f64>() < accept_outer {
        outer.proposal
    } else {
        inner.proposal
    };

    // Inner is closer to the start, outer is farther along the direction.
    let (left, right) = if eps > 0.0 {
        (inner.left, outer.right)
    } else {
        (outer.left, inner.right)
    };

    let turning = check_uturn(&left, &right, inv_mass);

    TreeResult {
        left,
        right,
        proposal,
        log_sum_weight: log_sum,
        n_leapfrog,
        sum_accept_prob,
        turning,
        diverging: false,
    }
}

/// Single leapfrog step (half-step momentum, full-step position, half-step momentum).
fn leapfrog(
    graph: &Graph,
    evaluator: &mut Evaluator,
    point: &PhasePoint,
    eps: f64,
    inv_mass: &[f64],
) -> PhasePoint {
    let dim = point.q.len();
    let mut p_new = vec![0.0; dim];
    let mut q_new = vec![0.0; dim];

    for i in 0..dim {
        p_new[i] = point.p[i] + 0.5 * eps * point.grad[i];
    }
    for i in 0..dim {
        q_new[i] = point.q[i] + eps * inv_mass[i] * p_new[i];
    }
    evaluator.compute(graph, &q_new);
    let logp_new = evaluator.total_logp;
    let grad_new = evaluator.grad.clone();
    for i in 0..dim {
        p_new[i] += 0.5 * eps * grad_new[i];
    }

    PhasePoint {
        q: q_new,
        p: p_new,
        grad: grad_new,
        logp: logp_new,
    }
}

/// U-turn check: the trajectory is turning if the momentum at either end
/// would decrease the distance between the endpoints.
///
///   (q_right - q_left) · (M⁻¹ p_left) < 0  OR
///   (q_right - q_left) · (M⁻¹ p_right) < 0
fn check_uturn(left: &PhasePoint, right: &PhasePoint, inv_mass: &[f64]) -> bool {
    let mut dot_left = 0.0f64;
    let mut dot_right = 0.0f64;
    for i in 0..left.q.len() {
        let dq = right.q[i] - left.q[i];
        dot_left += dq * (inv_mass[i] * left.p[i]);
        dot_right += dq * (inv_mass[i] * right.p[i]);
    }
    dot_left < 0.0 || dot_right < 0.0
}

fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY && b == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Heuristic initial step size: double or halve ε until a single leapfrog
/// step crosses an acceptance probability of 1/2.
pub(crate) fn find_initial_step_size(
    graph: &Graph,
    evaluator: &mut Evaluator,
    q: &[f64],
    inv_mass_diag: &[f64],
    mass_sqrt: &[f64],
    rng: &mut ChaCha8Rng,
) -> f64 {
    evaluator.compute(graph, q);
    let initial_point = PhasePoint {
        q: q.to_vec(),
        p: mass_sqrt
            .iter()
            .map(|&ms| {
                let z: f64 = StandardNormal.sample(rng);
                z * ms
            })
            .collect(),
        grad: evaluator.grad.clone(),
        logp: evaluator.total_logp,
    };
    let h0 = initial_point.energy(inv_mass_diag);
    let threshold = (0.5_f64).ln();

    let mut eps = 1.0;
    let first = leapfrog(graph, evaluator, &initial_point, eps, inv_mass_diag);
    let log_ratio = h0 - first.energy(inv_mass_diag);
    let direction = if log_ratio > threshold { 1.0 } else { -1.0 };

    for _ in 0..50 {
        let t = leapfrog(graph, evaluator, &initial_point, eps, inv_mass_diag);
        let lr = h0 - t.energy(inv_mass_diag);
        if !lr.is_finite() {
            eps *= 0.5;
            if direction > 0.0 {
                break;
            }
            continue;
        }
        if direction > 0.0 && lr < threshold {
            break;
        }
        if direction < 0.0 && lr > threshold {
            break;
        }
        eps *= 2.0_f64.powf(direction);
    }

    eps.clamp(1e-10, 1e3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn correlated_gaussian() -> Graph {
        // y ~ N(2 + 3x, 0.5) with a wide prior on the coefficients.
        let mut g = Graph::new();
        let a = g.add_param("a");
        let b = g.add_param("b");
        let zero = g.add_constant(0.0);
        let ten = g.add_constant(10.0);
        g.normal_logp(a, zero, ten);
        g.normal_logp(b, zero, ten);
        let x: Vec<f64> = (0..20).map(|i| i as f64 / 10.0).collect();
        let y: Vec<f64> = x.iter().map(|xi| 2.0 + 3.0 * xi).collect();
        let di = g.store_data_vec(x);
        let mu = g.fused_linear_mu(vec![b], vec![di], Some(a));
        let half = g.add_constant(0.5);
        let obs = g.add_obs_data(y);
        g.normal_obs_logp(mu, half, obs);
        g
    }

    #[test]
    fn test_nuts_recovers_linear_coefficients() {
        let g = correlated_gaussian();
        let config = NutsConfig {
            num_draws: 800,
            num_warmup: 400,
            ..NutsConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let result = run_chain(&g, &config, &mut rng, None, None);

        assert_eq!(result.samples.len(), 800);
        let n = result.samples.len() as f64;
        let a_mean = result.samples.iter().map(|s| s[0]).sum::<f64>() / n;
        let b_mean = result.samples.iter().map(|s| s[1]).sum::<f64>() / n;
        assert!((a_mean - 2.0).abs() < 0.3, "a = {}", a_mean);
        assert!((b_mean - 3.0).abs() < 0.3, "b = {}", b_mean);
        assert!(result.accept_rate > 0.5, "accept = {}", result.accept_rate);
        assert!(result.stats.iter().all(|s| s.n_steps >= 1));
    }

    #[test]
    fn test_nuts_is_deterministic_for_a_seed() {
        let g = correlated_gaussian();
        let config = NutsConfig {
            num_draws: 50,
            num_warmup: 50,
            ..NutsConfig::default()
        };
        let a = run_chain(&g, &config, &mut ChaCha8Rng::seed_from_u64(5), None, None);
        let b = run_chain(&g, &config, &mut ChaCha8Rng::seed_from_u64(5), None, None);
        assert_eq!(a.samples, b.samples);
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn test_log_sum_exp_handles_empty_weights() {
        assert_eq!(
            log_sum_exp(f64::NEG_INFINITY, f64::NEG_INFINITY),
            f64::NEG_INFINITY
        );
        assert!((log_sum_exp(0.0, 0.0) - 2.0_f64.ln()).abs() < 1e-12);
    }
}
