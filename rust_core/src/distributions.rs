use crate::graph::{Graph, NodeId, ParamTransform};

// ── Normal (unconstrained) ──────────────────────────────────────────

pub struct Normal;

impl Normal {
    pub fn prior(graph: &mut Graph, name: &str, mu: f64, sigma: f64) -> NodeId {
        let param = graph.add_param(name);
        let mu_node = graph.add_constant(mu);
        let sigma_node = graph.add_constant(sigma);
        graph.normal_logp(param, mu_node, sigma_node);
        param
    }

    /// Likelihood of an observed vector with a (possibly sampled) scale node.
    pub fn observed(graph: &mut Graph, mu_vec: NodeId, sigma: NodeId, obs: Vec<f64>) -> NodeId {
        let obs_idx = graph.add_obs_data(obs);
        graph.normal_obs_logp(mu_vec, sigma, obs_idx)
    }
}

// ── HalfNormal (x > 0, log-transform) ──────────────────────────────

pub struct HalfNormal;

impl HalfNormal {
    /// Samples raw on (-∞, +∞), transforms via x = exp(raw).
    /// Jacobian: log|dx/draw| = raw.
    pub fn prior(graph: &mut Graph, name: &str, sigma: f64) -> NodeId {
        let raw = graph.add_param_with_transform(name, ParamTransform::Exp);
        let x = graph.exp(raw);
        let sigma_node = graph.add_constant(sigma);
        graph.half_normal_logp(x, sigma_node);
        graph.add_logp_term(raw);
        graph.bind_name(name, x);
        x
    }
}

// ── Exponential (x > 0, log-transform) ─────────────────────────────

pub struct Exponential;

impl Exponential {
    /// Samples raw on (-∞, +∞), transforms via x = exp(raw).
    /// Jacobian: log|dx/draw| = raw.
    pub fn prior(graph: &mut Graph, name: &str, lam: f64) -> NodeId {
        let raw = graph.add_param_with_transform(name, ParamTransform::Exp);
        let x = graph.exp(raw);
        let lam_node = graph.add_constant(lam);
        graph.exponential_logp(x, lam_node);
        graph.add_logp_term(raw);
        graph.bind_name(name, x);
        x
    }
}
