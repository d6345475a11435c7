//! The linear regression model and its graph rendering.

use crate::config::PriorsConfig;
use crate::data::Observations;
use crate::error::Result;
use bayeslm_core::{ModelBuilder, ModelSpec};
use std::io::Write;
use std::process::{Command, Stdio};

/// Predictor data key.
pub const X_KEY: &str = "X";
/// Observed response key, also the likelihood name.
pub const Y_KEY: &str = "y";

/// `y ~ Normal(alpha + beta * X, sigma)` observed on the generated data.
pub fn build_model(priors: &PriorsConfig, obs: &Observations) -> Result<ModelSpec> {
    let mut m = ModelBuilder::new();
    let alpha = m.prior("alpha", priors.alpha);
    let beta = m.prior("beta", priors.beta);
    let sigma = m.prior("sigma", priors.sigma);
    m.data(X_KEY, obs.x().to_vec())
        .data(Y_KEY, obs.y().to_vec())
        .normal_likelihood(Y_KEY, alpha + beta.times(X_KEY), &sigma, Y_KEY);
    Ok(m.build()?)
}

/// Render the model DAG to PNG with Graphviz.
///
/// Returns `None` when `dot` is missing or fails; the caller carries on
/// without the graph.
pub fn render_dag(spec: &ModelSpec) -> Option<Vec<u8>> {
    match run_dot(&spec.to_dot()) {
        Ok(png) => Some(png),
        Err(reason) => {
            tracing::warn!(%reason, "skipping model graph");
            None
        }
    }
}

fn run_dot(source: &str) -> std::result::Result<Vec<u8>, String> {
    let mut child = Command::new("dot")
        .arg("-Tpng")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("cannot start graphviz `dot`: {}", e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(source.as_bytes())
            .map_err(|e| format!("writing to `dot` failed: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("`dot` did not finish: {}", e))?;
    if !output.status.success() {
        return Err(format!(
            "`dot` exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    if output.stdout.is_empty() {
        return Err("`dot` produced no output".to_string());
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataConfig;
    use bayeslm_core::graph::Op;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn observations() -> Observations {
        Observations::generate(&DataConfig::default(), &mut ChaCha8Rng::seed_from_u64(0))
    }

    #[test]
    fn test_model_declares_three_parameters() {
        let spec = build_model(&PriorsConfig::default(), &observations()).unwrap();
        assert_eq!(spec.param_names(), vec!["alpha", "beta", "sigma"]);
        assert_eq!(spec.likelihoods().len(), 1);
        assert_eq!(spec.n_obs(&spec.likelihoods()[0]), 100);
    }

    #[test]
    fn test_model_compiles_to_fused_mean() {
        let spec = build_model(&PriorsConfig::default(), &observations()).unwrap();
        let graph = spec.compile().unwrap();
        assert_eq!(graph.param_count, 3);
        assert!(graph
            .nodes
            .iter()
            .any(|n| matches!(n.op, Op::FusedLinearMu { .. })));
    }

    #[test]
    fn test_dag_source_links_parameters_to_response() {
        let spec = build_model(&PriorsConfig::default(), &observations()).unwrap();
        let dot = spec.to_dot();
        assert!(dot.contains("\"alpha\" -> \"mu_y\""));
        assert!(dot.contains("\"X\" -> \"mu_y\""));
        assert!(dot.contains("\"sigma\" -> \"y\""));
        assert!(dot.contains("label=\"100\""));
    }

    #[test]
    fn test_bad_dot_source_is_reported_not_fatal() {
        // Either `dot` is absent or it rejects the input; both are errors.
        assert!(run_dot("this is not graphviz {").is_err());
    }
}
