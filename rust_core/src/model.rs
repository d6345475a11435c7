//! Declarative model specification.
//!
//! A model is a set of named priors, named data vectors and Normal
//! likelihoods whose mean is a linear expression over parameters and data.
//! [`ModelBuilder::build`] validates the declaration once; after that the
//! spec can be compiled onto a [`Graph`] for gradient-based sampling, or
//! simulated forward for prior and posterior predictive draws.

use crate::distributions::{Exponential, HalfNormal, Normal};
use crate::error::{CoreError, Result};
use crate::graph::{Graph, NodeId};
use rand::Rng;
use rand_distr::{Distribution, Exp1, StandardNormal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::ops::Add;

/// Prior distribution of a scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dist", rename_all = "snake_case")]
pub enum Prior {
    Normal { mu: f64, sigma: f64 },
    HalfNormal { sigma: f64 },
    Exponential { lam: f64 },
}

impl Prior {
    fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: &str| {
            Err(CoreError::InvalidPrior {
                name: name.to_string(),
                reason: reason.to_string(),
            })
        };
        match *self {
            Prior::Normal { mu, sigma } => {
                if !mu.is_finite() {
                    return invalid("mu must be finite");
                }
                if !(sigma.is_finite() && sigma > 0.0) {
                    return invalid("sigma must be positive");
                }
            }
            Prior::HalfNormal { sigma } => {
                if !(sigma.is_finite() && sigma > 0.0) {
                    return invalid("sigma must be positive");
                }
            }
            Prior::Exponential { lam } => {
                if !(lam.is_finite() && lam > 0.0) {
                    return invalid("lam must be positive");
                }
            }
        }
        Ok(())
    }

    /// Draw one value from the prior.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Prior::Normal { mu, sigma } => {
                let z: f64 = StandardNormal.sample(rng);
                mu + sigma * z
            }
            Prior::HalfNormal { sigma } => {
                let z: f64 = StandardNormal.sample(rng);
                sigma * z.abs()
            }
            Prior::Exponential { lam } => {
                let e: f64 = Exp1.sample(rng);
                e / lam
            }
        }
    }

    /// Whether the parameter is restricted to positive values.
    pub fn is_positive(&self) -> bool {
        !matches!(self, Prior::Normal { .. })
    }

    fn add_to_graph(&self, graph: &mut Graph, name: &str) -> NodeId {
        match *self {
            Prior::Normal { mu, sigma } => Normal::prior(graph, name, mu, sigma),
            Prior::HalfNormal { sigma } => HalfNormal::prior(graph, name, sigma),
            Prior::Exponential { lam } => Exponential::prior(graph, name, lam),
        }
    }
}

impl std::fmt::Display for Prior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prior::Normal { mu, sigma } => write!(f, "Normal(mu={}, sigma={})", mu, sigma),
            Prior::HalfNormal { sigma } => write!(f, "HalfNormal(sigma={})", sigma),
            Prior::Exponential { lam } => write!(f, "Exponential(lam={})", lam),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriorSpec {
    pub name: String,
    pub prior: Prior,
}

/// Expression tree for a likelihood mean, compiled to graph nodes at
/// sampling time.
#[derive(Debug, Clone, PartialEq)]
pub enum MuExpr {
    ParamTimesData {
        param_name: String,
        data_key: String,
    },
    /// Element-wise sum of two expressions.
    Add(Box<MuExpr>, Box<MuExpr>),
    /// Bare parameter broadcast-added to a vector expression.
    Param(String),
}

impl MuExpr {
    fn is_scalar(&self) -> bool {
        match self {
            MuExpr::Param(_) => true,
            MuExpr::ParamTimesData { .. } => false,
            MuExpr::Add(a, b) => a.is_scalar() && b.is_scalar(),
        }
    }

    fn visit<'a>(&'a self, params: &mut Vec<&'a str>, data_keys: &mut Vec<&'a str>) {
        match self {
            MuExpr::ParamTimesData {
                param_name,
                data_key,
            } => {
                params.push(param_name);
                data_keys.push(data_key);
            }
            MuExpr::Add(a, b) => {
                a.visit(params, data_keys);
                b.visit(params, data_keys);
            }
            MuExpr::Param(name) => params.push(name),
        }
    }

    /// Accumulate this expression into `out` (which starts at zero).
    fn accumulate(
        &self,
        values: &HashMap<&str, f64>,
        data: &BTreeMap<String, Vec<f64>>,
        out: &mut [f64],
    ) {
        match self {
            MuExpr::ParamTimesData {
                param_name,
                data_key,
            } => {
                let coef = values[param_name.as_str()];
                for (o, x) in out.iter_mut().zip(data[data_key].iter()) {
                    *o += coef * x;
                }
            }
            MuExpr::Add(a, b) => {
                a.accumulate(values, data, out);
                b.accumulate(values, data, out);
            }
            MuExpr::Param(name) => {
                let v = values[name.as_str()];
                out.iter_mut().for_each(|o| *o += v);
            }
        }
    }
}

/// Handle to a declared parameter, used to build mean expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRef {
    name: String,
}

impl ParamRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `param * data[data_key]`, element-wise.
    pub fn times(&self, data_key: &str) -> Expr {
        Expr {
            inner: MuExpr::ParamTimesData {
                param_name: self.name.clone(),
                data_key: data_key.to_string(),
            },
        }
    }
}

/// A mean expression under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    inner: MuExpr,
}

impl Expr {
    pub fn as_mu_expr(&self) -> &MuExpr {
        &self.inner
    }
}

impl From<ParamRef> for Expr {
    fn from(p: ParamRef) -> Self {
        Expr {
            inner: MuExpr::Param(p.name),
        }
    }
}

impl<R: Into<Expr>> Add<R> for Expr {
    type Output = Expr;

    fn add(self, rhs: R) -> Expr {
        Expr {
            inner: MuExpr::Add(Box::new(self.inner), Box::new(rhs.into().inner)),
        }
    }
}

impl<R: Into<Expr>> Add<R> for ParamRef {
    type Output = Expr;

    fn add(self, rhs: R) -> Expr {
        Expr::from(self) + rhs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodSpec {
    pub name: String,
    pub mu_expr: MuExpr,
    pub sigma_param: String,
    pub observed_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    priors: Vec<PriorSpec>,
    likelihoods: Vec<LikelihoodSpec>,
    data: BTreeMap<String, Vec<f64>>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prior(&mut self, name: &str, prior: Prior) -> ParamRef {
        self.priors.push(PriorSpec {
            name: name.to_string(),
            prior,
        });
        ParamRef {
            name: name.to_string(),
        }
    }

    pub fn normal(&mut self, name: &str, mu: f64, sigma: f64) -> ParamRef {
        self.prior(name, Prior::Normal { mu, sigma })
    }

    pub fn half_normal(&mut self, name: &str, sigma: f64) -> ParamRef {
        self.prior(name, Prior::HalfNormal { sigma })
    }

    pub fn exponential(&mut self, name: &str, lam: f64) -> ParamRef {
        self.prior(name, Prior::Exponential { lam })
    }

    /// Register a named data vector (predictor or observed response).
    pub fn data(&mut self, key: &str, values: Vec<f64>) -> &mut Self {
        self.data.insert(key.to_string(), values);
        self
    }

    pub fn normal_likelihood(
        &mut self,
        name: &str,
        mu: impl Into<Expr>,
        sigma: &ParamRef,
        observed_key: &str,
    ) -> &mut Self {
        self.likelihoods.push(LikelihoodSpec {
            name: name.to_string(),
            mu_expr: mu.into().inner,
            sigma_param: sigma.name.clone(),
            observed_key: observed_key.to_string(),
        });
        self
    }

    /// Validate the declaration and freeze it.
    pub fn build(&self) -> Result<ModelSpec> {
        if self.priors.is_empty() {
            return Err(CoreError::EmptyModel);
        }

        let mut seen = HashSet::new();
        for p in &self.priors {
            if !seen.insert(p.name.as_str()) {
                return Err(CoreError::DuplicateParam(p.name.clone()));
            }
            p.prior.validate(&p.name)?;
        }

        for lik in &self.likelihoods {
            if !seen.insert(lik.name.as_str()) {
                return Err(CoreError::DuplicateParam(lik.name.clone()));
            }
            if lik.mu_expr.is_scalar() {
                return Err(CoreError::ScalarMean(lik.name.clone()));
            }

            let obs = self
                .data
                .get(&lik.observed_key)
                .ok_or_else(|| CoreError::MissingData(lik.observed_key.clone()))?;

            let mut params = Vec::new();
            let mut data_keys = Vec::new();
            lik.mu_expr.visit(&mut params, &mut data_keys);
            params.push(lik.sigma_param.as_str());

            for name in params {
                if !self.priors.iter().any(|p| p.name == name) {
                    return Err(CoreError::UnknownParam(name.to_string()));
                }
            }
            for key in data_keys {
                let values = self
                    .data
                    .get(key)
                    .ok_or_else(|| CoreError::MissingData(key.to_string()))?;
                if values.len() != obs.len() {
                    return Err(CoreError::LengthMismatch {
                        key: key.to_string(),
                        expected: obs.len(),
                        actual: values.len(),
                    });
                }
            }
        }

        Ok(ModelSpec {
            priors: self.priors.clone(),
            likelihoods: self.likelihoods.clone(),
            data: self.data.clone(),
        })
    }
}

/// Draws from the priors and the matching simulated responses.
#[derive(Debug, Clone)]
pub struct PriorSamples {
    /// values[param][draw], in prior declaration order.
    pub params: Vec<Vec<f64>>,
    /// predictive[likelihood][draw][observation]
    pub predictive: Vec<Vec<Vec<f64>>>,
}

/// A validated model.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    priors: Vec<PriorSpec>,
    likelihoods: Vec<LikelihoodSpec>,
    data: BTreeMap<String, Vec<f64>>,
}

impl ModelSpec {
    pub fn priors(&self) -> &[PriorSpec] {
        &self.priors
    }

    pub fn likelihoods(&self) -> &[LikelihoodSpec] {
        &self.likelihoods
    }

    pub fn data(&self, key: &str) -> Option<&[f64]> {
        self.data.get(key).map(|v| v.as_slice())
    }

    pub fn param_names(&self) -> Vec<String> {
        self.priors.iter().map(|p| p.name.clone()).collect()
    }

    /// Number of responses produced by a likelihood.
    pub fn n_obs(&self, likelihood: &LikelihoodSpec) -> usize {
        self.data.get(&likelihood.observed_key).map_or(0, |v| v.len())
    }

    /// Lower the model onto a computation graph.
    pub fn compile(&self) -> Result<Graph> {
        let mut graph = Graph::new();

        for p in &self.priors {
            p.prior.add_to_graph(&mut graph, &p.name);
        }

        for lik in &self.likelihoods {
            let mu_node = build_mu_expr(&mut graph, &lik.mu_expr, &self.data)?;
            let sigma_node = graph
                .node_by_name(&lik.sigma_param)
                .ok_or_else(|| CoreError::UnknownParam(lik.sigma_param.clone()))?;
            let obs = self
                .data
                .get(&lik.observed_key)
                .ok_or_else(|| CoreError::MissingData(lik.observed_key.clone()))?
                .clone();
            Normal::observed(&mut graph, mu_node, sigma_node, obs);
        }

        Ok(graph)
    }

    /// Simulate one response vector per likelihood for the given parameter
    /// values (prior declaration order). Only predictor data is read.
    pub fn simulate<R: Rng + ?Sized>(&self, params: &[f64], rng: &mut R) -> Vec<Vec<f64>> {
        let values: HashMap<&str, f64> = self
            .priors
            .iter()
            .map(|p| p.name.as_str())
            .zip(params.iter().copied())
            .collect();

        self.likelihoods
            .iter()
            .map(|lik| {
                let mut mu = vec![0.0; self.n_obs(lik)];
                lik.mu_expr.accumulate(&values, &self.data, &mut mu);
                let sigma = values[lik.sigma_param.as_str()];
                mu.iter()
                    .map(|m| {
                        let z: f64 = StandardNormal.sample(rng);
                        m + sigma * z
                    })
                    .collect()
            })
            .collect()
    }

    /// Draw `draws` independent samples from the priors and push each one
    /// through the likelihood. Observed responses are never consulted.
    pub fn sample_prior<R: Rng + ?Sized>(&self, draws: usize, rng: &mut R) -> PriorSamples {
        let mut params = vec![Vec::with_capacity(draws); self.priors.len()];
        let mut predictive = vec![Vec::with_capacity(draws); self.likelihoods.len()];
        let mut point = vec![0.0; self.priors.len()];

        for _ in 0..draws {
            for (i, p) in self.priors.iter().enumerate() {
                point[i] = p.prior.sample(rng);
                params[i].push(point[i]);
            }
            for (l, y) in self.simulate(&point, rng).into_iter().enumerate() {
                predictive[l].push(y);
            }
        }

        PriorSamples { params, predictive }
    }

    /// Graphviz source for the model's dependency structure:
    /// priors → mean → likelihood ← scale, with the observed plate.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph model {{");
        let _ = writeln!(out, "    rankdir=TB;");
        for p in &self.priors {
            let _ = writeln!(
                out,
                "    \"{}\" [label=\"{}\\n~\\n{}\" shape=ellipse];",
                p.name, p.name, p.prior
            );
        }
        for lik in &self.likelihoods {
            let mut params = Vec::new();
            let mut data_keys = Vec::new();
            lik.mu_expr.visit(&mut params, &mut data_keys);
            let mu_id = format!("mu_{}", lik.name);

            let _ = writeln!(out, "    subgraph \"cluster_{}\" {{", lik.name);
            let _ = writeln!(out, "        label=\"{}\";", self.n_obs(lik));
            for key in &data_keys {
                let _ = writeln!(
                    out,
                    "        \"{}\" [label=\"{}\\n~\\nData\" shape=box style=rounded];",
                    key, key
                );
            }
            let _ = writeln!(
                out,
                "        \"{}\" [label=\"mu\\n~\\nDeterministic\" shape=box];",
                mu_id
            );
            let _ = writeln!(
                out,
                "        \"{}\" [label=\"{}\\n~\\nNormal\" shape=ellipse style=filled fillcolor=gray];",
                lik.name, lik.name
            );
            let _ = writeln!(out, "    }}");

            let mut linked = HashSet::new();
            for src in params.iter().chain(data_keys.iter()) {
                if linked.insert(*src) {
                    let _ = writeln!(out, "    \"{}\" -> \"{}\";", src, mu_id);
                }
            }
            let _ = writeln!(out, "    \"{}\" -> \"{}\";", mu_id, lik.name);
            let _ = writeln!(out, "    \"{}\" -> \"{}\";", lik.sigma_param, lik.name);
        }
        let _ = writeln!(out, "}}");
        out
    }
}

/// Try to decompose a MuExpr tree into a flat linear combination:
/// ([(param_name, data_key), ...], optional_intercept_param_name)
fn try_extract_linear(expr: &MuExpr) -> Option<(Vec<(String, String)>, Option<String>)> {
    let mut terms = Vec::new();
    let mut intercept: Option<String> = None;

    fn walk(e: &MuExpr, terms: &mut Vec<(String, String)>, intercept: &mut Option<String>) -> bool {
        match e {
            MuExpr::ParamTimesData {
                param_name,
                data_key,
            } => {
                terms.push((param_name.clone(), data_key.clone()));
                true
            }
            MuExpr::Add(a, b) => walk(a, terms, intercept) && walk(b, terms, intercept),
            MuExpr::Param(name) => {
                if intercept.is_none() {
                    *intercept = Some(name.clone());
                    true
                } else {
                    false
                }
            }
        }
    }

    if walk(expr, &mut terms, &mut intercept) && !terms.is_empty() {
        Some((terms, intercept))
    } else {
        None
    }
}

fn param_node(graph: &Graph, name: &str) -> Result<NodeId> {
    graph
        .node_by_name(name)
        .ok_or_else(|| CoreError::UnknownParam(name.to_string()))
}

fn data_vec(data: &BTreeMap<String, Vec<f64>>, key: &str) -> Result<Vec<f64>> {
    data.get(key)
        .cloned()
        .ok_or_else(|| CoreError::MissingData(key.to_string()))
}

/// Compile a MuExpr tree into graph nodes.
///
/// When the tree is a pure linear combination (Σ βₖ xₖ + optional intercept),
/// this emits a single FusedLinearMu op instead of individual
/// ScalarMulData / VectorAdd / ScalarBroadcastAdd nodes.
fn build_mu_expr(graph: &mut Graph, expr: &MuExpr, data: &BTreeMap<String, Vec<f64>>) -> Result<NodeId> {
    if let Some((terms, intercept_name)) = try_extract_linear(expr) {
        let mut param_nodes = Vec::with_capacity(terms.len());
        let mut data_indices = Vec::with_capacity(terms.len());

        for (param_name, data_key) in &terms {
            param_nodes.push(param_node(graph, param_name)?);
            let values = data_vec(data, data_key)?;
            data_indices.push(graph.store_data_vec(values));
        }

        let intercept_node = match intercept_name {
            Some(ref name) => Some(param_node(graph, name)?),
            None => None,
        };

        return Ok(graph.fused_linear_mu(param_nodes, data_indices, intercept_node));
    }

    match expr {
        MuExpr::ParamTimesData {
            param_name,
            data_key,
        } => {
            let p = param_node(graph, param_name)?;
            let values = data_vec(data, data_key)?;
            let data_node = graph.add_data(data_key, values);
            Ok(graph.scalar_mul_data(p, data_node))
        }
        MuExpr::Param(name) => param_node(graph, name),
        MuExpr::Add(a, b) => {
            let na = build_mu_expr(graph, a, data)?;
            let nb = build_mu_expr(graph, b, data)?;
            match (a.is_scalar(), b.is_scalar()) {
                (true, false) => Ok(graph.scalar_broadcast_add(na, nb)),
                (false, true) => Ok(graph.scalar_broadcast_add(nb, na)),
                (false, false) => Ok(graph.vector_add(na, nb)),
                (true, true) => Ok(graph.add(na, nb)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::eval_logp;
    use crate::graph::Op;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn linear_builder() -> (ModelBuilder, ParamRef, ParamRef, ParamRef) {
        let mut b = ModelBuilder::new();
        let alpha = b.normal("alpha", 0.0, 0.5);
        let beta = b.normal("beta", 0.0, 1.0);
        let sigma = b.exponential("sigma", 1.0);
        b.data("X", vec![-1.0, 0.0, 1.0, 2.0])
            .data("y", vec![-1.2, 0.9, 3.1, 5.2]);
        (b, alpha, beta, sigma)
    }

    #[test]
    fn test_linear_model_compiles_to_fused_op() {
        let (mut b, alpha, beta, sigma) = linear_builder();
        let mu = alpha + beta.times("X");
        assert_eq!(
            mu.as_mu_expr(),
            &MuExpr::Add(
                Box::new(MuExpr::Param("alpha".into())),
                Box::new(MuExpr::ParamTimesData {
                    param_name: "beta".into(),
                    data_key: "X".into(),
                }),
            )
        );
        b.normal_likelihood("y", mu, &sigma, "y");
        let spec = b.build().unwrap();
        let graph = spec.compile().unwrap();

        assert_eq!(graph.param_names, vec!["alpha", "beta", "sigma"]);
        assert!(graph
            .nodes
            .iter()
            .any(|n| matches!(n.op, Op::FusedLinearMu { .. })));
        assert!(eval_logp(&graph, &[1.0, 2.0, 0.0]).is_finite());
    }

    #[test]
    fn test_two_intercepts_break_fusion_at_top_level() {
        let mut b = ModelBuilder::new();
        let a = b.normal("a", 0.0, 1.0);
        let c = b.normal("c", 0.0, 1.0);
        let s = b.half_normal("s", 1.0);
        b.data("X", vec![1.0, 2.0]).data("y", vec![1.0, 2.0]);
        b.normal_likelihood("y_obs", (a + c) + s.times("X"), &s, "y");
        let graph = b.build().unwrap().compile().unwrap();

        assert!(graph.nodes.iter().any(|n| matches!(n.op, Op::Add(..))));
        assert!(graph
            .nodes
            .iter()
            .any(|n| matches!(n.op, Op::ScalarBroadcastAdd(..))));
        assert!(eval_logp(&graph, &[0.1, 0.2, 0.0]).is_finite());
    }

    #[test]
    fn test_build_rejects_invalid_declarations() {
        let (mut b, alpha, beta, sigma) = linear_builder();
        b.normal("alpha", 0.0, 1.0);
        b.normal_likelihood("y", alpha.clone() + beta.times("X"), &sigma, "y");
        assert_eq!(
            b.build().unwrap_err(),
            CoreError::DuplicateParam("alpha".to_string())
        );

        let (mut b, alpha, _, sigma) = linear_builder();
        let ghost = ParamRef {
            name: "gamma".to_string(),
        };
        b.normal_likelihood("y", alpha + ghost.times("X"), &sigma, "y");
        assert_eq!(
            b.build().unwrap_err(),
            CoreError::UnknownParam("gamma".to_string())
        );

        let (mut b, alpha, beta, sigma) = linear_builder();
        b.normal_likelihood("y", alpha + beta.times("Z"), &sigma, "y");
        assert_eq!(b.build().unwrap_err(), CoreError::MissingData("Z".to_string()));

        let (mut b, alpha, beta, sigma) = linear_builder();
        b.data("X", vec![1.0]);
        b.normal_likelihood("y", alpha + beta.times("X"), &sigma, "y");
        assert!(matches!(
            b.build().unwrap_err(),
            CoreError::LengthMismatch { .. }
        ));

        let (mut b, alpha, _, sigma) = linear_builder();
        b.normal_likelihood("y", alpha, &sigma, "y");
        assert_eq!(b.build().unwrap_err(), CoreError::ScalarMean("y".to_string()));

        let mut b = ModelBuilder::new();
        b.exponential("sigma", -1.0);
        assert!(matches!(
            b.build().unwrap_err(),
            CoreError::InvalidPrior { .. }
        ));

        assert_eq!(ModelBuilder::new().build().unwrap_err(), CoreError::EmptyModel);
    }

    #[test]
    fn test_sample_prior_ignores_observed_values() {
        let (mut b, alpha, beta, sigma) = linear_builder();
        b.normal_likelihood("y", alpha + beta.times("X"), &sigma, "y");
        let spec = b.build().unwrap();

        let mut other = spec.clone();
        other.data.insert("y".to_string(), vec![100.0, 200.0, 300.0, 400.0]);

        let a = spec.sample_prior(50, &mut ChaCha8Rng::seed_from_u64(7));
        let c = other.sample_prior(50, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(a.params, c.params);
        assert_eq!(a.predictive, c.predictive);
        assert_eq!(a.params.len(), 3);
        assert_eq!(a.predictive[0].len(), 50);
        assert_eq!(a.predictive[0][0].len(), 4);
        assert!(a.params[2].iter().all(|&s| s > 0.0));
    }

    #[test]
    fn test_simulate_with_zero_noise_limit() {
        let (mut b, alpha, beta, sigma) = linear_builder();
        b.normal_likelihood("y", alpha + beta.times("X"), &sigma, "y");
        let spec = b.build().unwrap();
        let y = spec.simulate(&[1.0, 2.0, 1e-12], &mut ChaCha8Rng::seed_from_u64(1));
        for (yi, xi) in y[0].iter().zip([-1.0, 0.0, 1.0, 2.0]) {
            assert!((yi - (1.0 + 2.0 * xi)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_dot_lists_every_edge() {
        let (mut b, alpha, beta, sigma) = linear_builder();
        b.normal_likelihood("y", alpha + beta.times("X"), &sigma, "y");
        let dot = b.build().unwrap().to_dot();
        assert!(dot.starts_with("digraph model {"));
        for edge in [
            "\"alpha\" -> \"mu_y\"",
            "\"beta\" -> \"mu_y\"",
            "\"X\" -> \"mu_y\"",
            "\"mu_y\" -> \"y\"",
            "\"sigma\" -> \"y\"",
        ] {
            assert!(dot.contains(edge), "missing {}", edge);
        }
        assert!(dot.contains("label=\"4\""));
    }

    #[test]
    fn test_prior_serde_tagging() {
        let p: Prior = toml::from_str("dist = \"exponential\"\nlam = 1.5").unwrap();
        assert_eq!(p, Prior::Exponential { lam: 1.5 });
    }
}
