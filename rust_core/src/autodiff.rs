use crate::graph::{Graph, Op};

const LN_2: f64 = std::f64::consts::LN_2;

/// Value produced by evaluating a node. Scalars and vectors are tracked
/// separately so the graph can mix element-wise data operations with
/// scalar parameter operations without unnecessary heap allocation for
/// the common scalar case.
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    pub fn as_scalar(&self) -> f64 {
        match self {
            Value::Scalar(v) => *v,
            Value::Vector(_) => panic!("expected scalar, got vector"),
        }
    }

    pub fn as_vector(&self) -> &[f64] {
        match self {
            Value::Vector(v) => v,
            Value::Scalar(_) => panic!("expected vector, got scalar"),
        }
    }
}

/// Reusable forward/reverse evaluator.
///
/// Holds the per-node value and adjoint buffers so repeated gradient
/// evaluations inside a sampler chain do not reallocate them. One evaluator
/// per chain; the graph itself stays shared and read-only.
pub struct Evaluator {
    values: Vec<Value>,
    adj_scalar: Vec<f64>,
    adj_vector: Vec<Option<Vec<f64>>>,
    /// Gradient of the total log-density w.r.t. the raw parameters.
    pub grad: Vec<f64>,
    /// Total log-density at the last computed position.
    pub total_logp: f64,
}

impl Evaluator {
    pub fn new(graph: &Graph) -> Self {
        let n = graph.nodes.len();
        Self {
            values: Vec::with_capacity(n),
            adj_scalar: vec![0.0; n],
            adj_vector: vec![None; n],
            grad: vec![0.0; graph.param_count],
            total_logp: 0.0,
        }
    }

    /// Evaluate log-density and gradient at `params`.
    pub fn compute(&mut self, graph: &Graph, params: &[f64]) {
        forward_into(graph, params, &mut self.values);
        let values = &self.values;

        self.total_logp = graph
            .logp_terms
            .iter()
            .map(|id| values[id.0].as_scalar())
            .sum();

        let adj_scalar = &mut self.adj_scalar;
        let adj_vector = &mut self.adj_vector;
        adj_scalar.iter_mut().for_each(|a| *a = 0.0);
        adj_vector.iter_mut().for_each(|a| *a = None);

        // Seed: d(total_logp)/d(logp_term) = 1.0
        for &id in &graph.logp_terms {
            adj_scalar[id.0] += 1.0;
        }

        for node in graph.nodes.iter().rev() {
            let idx = node.id.0;
            let a_s = adj_scalar[idx];

            match &node.op {
                Op::Param(_) | Op::Constant(_) | Op::Data(_) => {}

                Op::Add(a, b) => {
                    adj_scalar[a.0] += a_s;
                    adj_scalar[b.0] += a_s;
                }
                Op::Exp(a) => {
                    let va = values[a.0].as_scalar().exp();
                    adj_scalar[a.0] += a_s * va;
                }
                Op::ScalarMulData(scalar, data) => {
                    let d = values[data.0].as_vector();
                    // Data is constant, only the scalar receives a gradient.
                    if let Some(uv) = adj_vector[idx].take() {
                        let ds: f64 = uv.iter().zip(d.iter()).map(|(u, di)| u * di).sum();
                        adj_scalar[scalar.0] += ds;
                    }
                }
                Op::VectorAdd(a, b) => {
                    if let Some(uv) = adj_vector[idx].take() {
                        merge_vec_adj(&mut adj_vector[a.0], &uv);
                        merge_vec_adj(&mut adj_vector[b.0], &uv);
                    }
                }
                Op::ScalarBroadcastAdd(scalar, vec) => {
                    if let Some(uv) = adj_vector[idx].take() {
                        adj_scalar[scalar.0] += uv.iter().sum::<f64>();
                        merge_vec_adj(&mut adj_vector[vec.0], &uv);
                    }
                }
                Op::FusedLinearMu {
                    param_nodes,
                    data_indices,
                    intercept,
                } => {
                    if let Some(uv) = adj_vector[idx].take() {
                        for (pn, &di) in param_nodes.iter().zip(data_indices.iter()) {
                            let data = &graph.data_vectors[di];
                            let ds: f64 = uv.iter().zip(data.iter()).map(|(u, x)| u * x).sum();
                            adj_scalar[pn.0] += ds;
                        }
                        if let Some(ic) = intercept {
                            adj_scalar[ic.0] += uv.iter().sum::<f64>();
                        }
                    }
                }
                Op::NormalLogP { x, mu, sigma } => {
                    let xv = values[x.0].as_scalar();
                    let mv = values[mu.0].as_scalar();
                    let sv = values[sigma.0].as_scalar();
                    let diff = xv - mv;
                    let s2 = sv * sv;
                    // d logp / d x = -(x - mu) / sigma^2
                    adj_scalar[x.0] += a_s * (-diff / s2);
                    adj_scalar[mu.0] += a_s * (diff / s2);
                    // d logp / d sigma = (x - mu)^2 / sigma^3 - 1/sigma
                    adj_scalar[sigma.0] += a_s * (diff * diff / (s2 * sv) - 1.0 / sv);
                }
                Op::HalfNormalLogP { x, sigma } => {
                    let xv = values[x.0].as_scalar();
                    let sv = values[sigma.0].as_scalar();
                    let s2 = sv * sv;
                    adj_scalar[x.0] += a_s * (-xv / s2);
                    adj_scalar[sigma.0] += a_s * (xv * xv / (s2 * sv) - 1.0 / sv);
                }
                Op::ExponentialLogP { x, lam } => {
                    let xv = values[x.0].as_scalar();
                    let lv = values[lam.0].as_scalar();
                    adj_scalar[x.0] += a_s * (-lv);
                    adj_scalar[lam.0] += a_s * (1.0 / lv - xv);
                }
                Op::NormalObsLogP {
                    mu_vec,
                    sigma,
                    obs_data_idx,
                } => {
                    let mu = values[mu_vec.0].as_vector();
                    let sv = values[sigma.0].as_scalar();
                    let obs = &graph.obs_vectors[*obs_data_idx];
                    let s2 = sv * sv;

                    let dmu: Vec<f64> = mu
                        .iter()
                        .zip(obs.iter())
                        .map(|(m, o)| a_s * (o - m) / s2)
                        .collect();
                    merge_vec_adj(&mut adj_vector[mu_vec.0], &dmu);

                    let dsigma: f64 = mu
                        .iter()
                        .zip(obs.iter())
                        .map(|(m, o)| {
                            let diff = o - m;
                            diff * diff / (s2 * sv) - 1.0 / sv
                        })
                        .sum::<f64>();
                    adj_scalar[sigma.0] += a_s * dsigma;
                }
            }
        }

        for node in &graph.nodes {
            if let Op::Param(pidx) = node.op {
                self.grad[pidx] = adj_scalar[node.id.0];
            }
        }
    }
}

/// Forward-evaluate every node in the graph and return the per-node values.
pub fn forward(graph: &Graph, params: &[f64]) -> Vec<Value> {
    let mut values = Vec::with_capacity(graph.nodes.len());
    forward_into(graph, params, &mut values);
    values
}

fn forward_into(graph: &Graph, params: &[f64], values: &mut Vec<Value>) {
    values.clear();

    for node in &graph.nodes {
        let val = match &node.op {
            Op::Param(idx) => Value::Scalar(params[*idx]),
            Op::Constant(c) => Value::Scalar(*c),
            Op::Data(idx) => Value::Vector(graph.data_vectors[*idx].clone()),
            Op::Add(a, b) => Value::Scalar(values[a.0].as_scalar() + values[b.0].as_scalar()),
            Op::Exp(a) => Value::Scalar(values[a.0].as_scalar().exp()),
            Op::ScalarMulData(scalar, data) => {
                let s = values[scalar.0].as_scalar();
                let d = values[data.0].as_vector();
                Value::Vector(d.iter().map(|x| s * x).collect())
            }
            Op::VectorAdd(a, b) => {
                let va = values[a.0].as_vector();
                let vb = values[b.0].as_vector();
                Value::Vector(va.iter().zip(vb.iter()).map(|(x, y)| x + y).collect())
            }
            Op::ScalarBroadcastAdd(scalar, vec) => {
                let s = values[scalar.0].as_scalar();
                let v = values[vec.0].as_vector();
                Value::Vector(v.iter().map(|x| s + x).collect())
            }
            Op::FusedLinearMu {
                param_nodes,
                data_indices,
                intercept,
            } => {
                let n = data_indices
                    .first()
                    .map(|&di| graph.data_vectors[di].len())
                    .unwrap_or(0);
                let base = intercept.map(|ic| values[ic.0].as_scalar()).unwrap_or(0.0);
                let mut mu = vec![base; n];
                for (pn, &di) in param_nodes.iter().zip(data_indices.iter()) {
                    let coef = values[pn.0].as_scalar();
                    for (m, x) in mu.iter_mut().zip(graph.data_vectors[di].iter()) {
                        *m += coef * x;
                    }
                }
                Value::Vector(mu)
            }
            Op::NormalLogP { x, mu, sigma } => Value::Scalar(normal_logp_scalar(
                values[x.0].as_scalar(),
                values[mu.0].as_scalar(),
                values[sigma.0].as_scalar(),
            )),
            Op::HalfNormalLogP { x, sigma } => Value::Scalar(half_normal_logp_scalar(
                values[x.0].as_scalar(),
                values[sigma.0].as_scalar(),
            )),
            Op::ExponentialLogP { x, lam } => {
                let lv = values[lam.0].as_scalar();
                Value::Scalar(lv.ln() - lv * values[x.0].as_scalar())
            }
            Op::NormalObsLogP {
                mu_vec,
                sigma,
                obs_data_idx,
            } => {
                let mu = values[mu_vec.0].as_vector();
                let sv = values[sigma.0].as_scalar();
                let obs = &graph.obs_vectors[*obs_data_idx];
                Value::Scalar(normal_obs_logp_sum(mu, sv, obs))
            }
        };
        values.push(val);
    }
}

/// Compute the total log-probability (sum of all logp_terms).
pub fn eval_logp(graph: &Graph, params: &[f64]) -> f64 {
    let values = forward(graph, params);
    graph
        .logp_terms
        .iter()
        .map(|id| values[id.0].as_scalar())
        .sum()
}

/// Reverse-mode autodiff: compute gradient of total log-probability w.r.t. params.
pub fn grad_logp(graph: &Graph, params: &[f64]) -> (f64, Vec<f64>) {
    let mut evaluator = Evaluator::new(graph);
    evaluator.compute(graph, params);
    (evaluator.total_logp, evaluator.grad)
}

fn merge_vec_adj(slot: &mut Option<Vec<f64>>, incoming: &[f64]) {
    match slot {
        Some(ref mut existing) => {
            for (e, i) in existing.iter_mut().zip(incoming.iter()) {
                *e += i;
            }
        }
        None => {
            *slot = Some(incoming.to_vec());
        }
    }
}

fn normal_logp_scalar(x: f64, mu: f64, sigma: f64) -> f64 {
    let diff = x - mu;
    -0.5 * (diff * diff) / (sigma * sigma) - sigma.ln() - 0.5 * std::f64::consts::TAU.ln()
}

fn half_normal_logp_scalar(x: f64, sigma: f64) -> f64 {
    LN_2 + normal_logp_scalar(x, 0.0, sigma)
}

fn normal_obs_logp_sum(mu: &[f64], sigma: f64, obs: &[f64]) -> f64 {
    let s2 = sigma * sigma;
    let log_norm = -0.5 * std::f64::consts::TAU.ln() - sigma.ln();
    let n = obs.len() as f64;
    let sum_sq: f64 = mu
        .iter()
        .zip(obs.iter())
        .map(|(m, o)| {
            let d = o - m;
            d * d
        })
        .sum();
    n * log_norm - 0.5 * sum_sq / s2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, ParamTransform};

    fn assert_grad_matches_finite_diff(g: &Graph, params: &[f64]) {
        let (_, grad) = grad_logp(g, params);
        let eps = 1e-6;
        for i in 0..params.len() {
            let mut plus = params.to_vec();
            let mut minus = params.to_vec();
            plus[i] += eps;
            minus[i] -= eps;
            let numerical = (eval_logp(g, &plus) - eval_logp(g, &minus)) / (2.0 * eps);
            assert!(
                (grad[i] - numerical).abs() < 1e-4,
                "param {}: analytic={}, numerical={}",
                i,
                grad[i],
                numerical
            );
        }
    }

    #[test]
    fn test_normal_logp_gradient() {
        let mut g = Graph::new();
        let x = g.add_param("x");
        let mu = g.add_constant(0.0);
        let sigma = g.add_constant(1.0);
        g.normal_logp(x, mu, sigma);

        let (logp, grad) = grad_logp(&g, &[1.5]);

        // logp = -0.5 * 1.5^2 - 0.5*ln(2pi)
        assert!((logp - (-0.5 * 1.5_f64.powi(2) - 0.5 * std::f64::consts::TAU.ln())).abs() < 1e-10);
        assert!((grad[0] - (-1.5)).abs() < 1e-10);
    }

    #[test]
    fn test_gradient_finite_diff_unfused() {
        let mut g = Graph::new();
        let alpha = g.add_param("alpha");
        let beta = g.add_param("beta");
        let zero = g.add_constant(0.0);
        let one = g.add_constant(1.0);
        g.normal_logp(alpha, zero, one);
        g.normal_logp(beta, zero, one);

        let x_data = g.add_data("x", vec![1.0, 2.0, 3.0]);
        let slope = g.scalar_mul_data(beta, x_data);
        let mu_vec = g.scalar_broadcast_add(alpha, slope);
        let obs_idx = g.add_obs_data(vec![2.5, 5.0, 7.5]);
        g.normal_obs_logp(mu_vec, one, obs_idx);

        assert_grad_matches_finite_diff(&g, &[0.3, 2.4]);
    }

    #[test]
    fn test_fused_matches_unfused() {
        let x = vec![-1.0, 0.5, 2.0, 3.5];
        let y = vec![-0.8, 2.1, 5.2, 7.9];

        let build = |fused: bool| {
            let mut g = Graph::new();
            let alpha = g.add_param("alpha");
            let beta = g.add_param("beta");
            let one = g.add_constant(1.0);
            let mu = if fused {
                let di = g.store_data_vec(x.clone());
                g.fused_linear_mu(vec![beta], vec![di], Some(alpha))
            } else {
                let xd = g.add_data("x", x.clone());
                let bx = g.scalar_mul_data(beta, xd);
                g.scalar_broadcast_add(alpha, bx)
            };
            let obs = g.add_obs_data(y.clone());
            g.normal_obs_logp(mu, one, obs);
            g
        };

        let params = [0.7, 1.9];
        let (lp_f, grad_f) = grad_logp(&build(true), &params);
        let (lp_u, grad_u) = grad_logp(&build(false), &params);
        assert!((lp_f - lp_u).abs() < 1e-12);
        for (a, b) in grad_f.iter().zip(grad_u.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_positive_scale_priors_with_jacobian() {
        let mut g = Graph::new();
        let raw_s = g.add_param_with_transform("sigma", ParamTransform::Exp);
        let s = g.exp(raw_s);
        let lam = g.add_constant(1.0);
        g.exponential_logp(s, lam);
        g.add_logp_term(raw_s);

        let raw_t = g.add_param_with_transform("tau", ParamTransform::Exp);
        let t = g.exp(raw_t);
        let scale = g.add_constant(2.0);
        g.half_normal_logp(t, scale);
        g.add_logp_term(raw_t);

        let di = g.store_data_vec(vec![0.1, -0.4, 1.2]);
        let zero = g.add_constant(0.0);
        let mu = g.fused_linear_mu(vec![zero], vec![di], None);
        let obs = g.add_obs_data(vec![0.3, -0.2, 0.9]);
        g.normal_obs_logp(mu, s, obs);

        assert_grad_matches_finite_diff(&g, &[-0.3, 0.4]);
    }

    #[test]
    fn test_evaluator_reuse_is_stateless() {
        let mut g = Graph::new();
        let x = g.add_param("x");
        let mu = g.add_constant(1.0);
        let sigma = g.add_constant(2.0);
        g.normal_logp(x, mu, sigma);

        let mut ev = Evaluator::new(&g);
        ev.compute(&g, &[3.0]);
        let first = (ev.total_logp, ev.grad.clone());
        ev.compute(&g, &[-1.0]);
        ev.compute(&g, &[3.0]);
        assert_eq!(first.0, ev.total_logp);
        assert_eq!(first.1, ev.grad);
    }
}
