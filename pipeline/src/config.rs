//! Configuration loading from linear_model.toml
//!
//! Every setting has a default equal to the canonical run: 100 observations
//! from `y = 1 + 2x + e`, five NUTS chains of 1000 draws and a 90% summary.
//! A `linear_model.toml` is discovered by walking up from the current
//! directory; any section or field it omits keeps its default.

use crate::error::{PipelineError, Result};
use bayeslm_core::{Prior, SamplerConfig, SamplerKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up by [`PipelineConfig::discover`].
pub const CONFIG_FILE: &str = "linear_model.toml";

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root seed; every stage derives its own stream from it
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub priors: PriorsConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            data: DataConfig::default(),
            priors: PriorsConfig::default(),
            sampling: SamplingConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

fn default_seed() -> u64 {
    42
}

/// Synthetic data generation: `y = intercept + slope * x + noise * e`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_n_obs")]
    pub n_obs: usize,
    #[serde(default = "default_intercept")]
    pub intercept: f64,
    #[serde(default = "default_slope")]
    pub slope: f64,
    /// Standard deviation of the additive noise
    #[serde(default = "default_noise")]
    pub noise: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            n_obs: default_n_obs(),
            intercept: default_intercept(),
            slope: default_slope(),
            noise: default_noise(),
        }
    }
}

fn default_n_obs() -> usize {
    100
}
fn default_intercept() -> f64 {
    1.0
}
fn default_slope() -> f64 {
    2.0
}
fn default_noise() -> f64 {
    1.0
}

/// Priors of the three model parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorsConfig {
    #[serde(default = "default_alpha")]
    pub alpha: Prior,
    #[serde(default = "default_beta")]
    pub beta: Prior,
    #[serde(default = "default_sigma")]
    pub sigma: Prior,
}

impl Default for PriorsConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            beta: default_beta(),
            sigma: default_sigma(),
        }
    }
}

fn default_alpha() -> Prior {
    Prior::Normal {
        mu: 0.0,
        sigma: 0.5,
    }
}
fn default_beta() -> Prior {
    Prior::Normal {
        mu: 0.0,
        sigma: 1.0,
    }
}
fn default_sigma() -> Prior {
    Prior::Exponential { lam: 1.0 }
}

/// Prior and posterior sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_chains")]
    pub chains: usize,
    /// Kept draws per chain
    #[serde(default = "default_draws")]
    pub draws: usize,
    /// Tuning iterations per chain, discarded
    #[serde(default = "default_warmup")]
    pub warmup: usize,
    /// Independent prior and prior-predictive draws
    #[serde(default = "default_prior_draws")]
    pub prior_draws: usize,
    /// "nuts" or "hmc"
    #[serde(default)]
    pub sampler: SamplerKind,
    #[serde(default = "default_target_accept")]
    pub target_accept: f64,
    #[serde(default = "default_max_tree_depth")]
    pub max_tree_depth: usize,
    /// Static HMC trajectory length
    #[serde(default = "default_leapfrog_steps")]
    pub num_leapfrog_steps: usize,
    /// Half-width of the uniform jitter around zero for initial points
    #[serde(default = "default_init_jitter")]
    pub init_jitter: f64,
    /// Worker threads for the chains (0 = all cores)
    #[serde(default)]
    pub num_threads: usize,
    /// Draw a live progress bar on stderr
    #[serde(default)]
    pub progress: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            draws: default_draws(),
            warmup: default_warmup(),
            prior_draws: default_prior_draws(),
            sampler: SamplerKind::default(),
            target_accept: default_target_accept(),
            max_tree_depth: default_max_tree_depth(),
            num_leapfrog_steps: default_leapfrog_steps(),
            init_jitter: default_init_jitter(),
            num_threads: 0,
            progress: false,
        }
    }
}

fn default_chains() -> usize {
    5
}
fn default_draws() -> usize {
    1000
}
fn default_warmup() -> usize {
    1000
}
fn default_prior_draws() -> usize {
    500
}
fn default_target_accept() -> f64 {
    0.8
}
fn default_max_tree_depth() -> usize {
    10
}
fn default_leapfrog_steps() -> usize {
    15
}
fn default_init_jitter() -> f64 {
    1.0
}

/// Summary and chart output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Credible-interval mass for the summary and posterior plots
    #[serde(default = "default_ci_prob")]
    pub ci_prob: f64,
    /// Directory the artifacts are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Pipe the model graph through Graphviz `dot`
    #[serde(default = "default_render_dag")]
    pub render_dag: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            ci_prob: default_ci_prob(),
            output_dir: default_output_dir(),
            render_dag: default_render_dag(),
        }
    }
}

fn default_ci_prob() -> f64 {
    0.9
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_render_dag() -> bool {
    true
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Walk up from the current directory looking for `linear_model.toml`.
    pub fn discover() -> Result<Option<Self>> {
        let dir = std::env::current_dir().map_err(|e| PipelineError::io(".", e))?;
        Self::discover_from(&dir)
    }

    /// Walk up from `start` looking for `linear_model.toml`.
    ///
    /// A file that exists but fails to parse is an error, not a silent
    /// fallback to defaults.
    pub fn discover_from(start: &Path) -> Result<Option<Self>> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.is_file() {
                tracing::info!(path = %config_path.display(), "loading configuration");
                return Self::load(&config_path).map(Some);
            }
            if !dir.pop() {
                return Ok(None);
            }
        }
    }

    /// Reject settings that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(PipelineError::Config(msg));
        if self.data.n_obs == 0 {
            return bad("data.n_obs must be at least 1".into());
        }
        if !(self.data.noise.is_finite() && self.data.noise >= 0.0) {
            return bad(format!("data.noise must be non-negative, got {}", self.data.noise));
        }
        if !(self.data.intercept.is_finite() && self.data.slope.is_finite()) {
            return bad("data.intercept and data.slope must be finite".into());
        }
        if self.sampling.chains == 0 {
            return bad("sampling.chains must be at least 1".into());
        }
        if self.sampling.draws < 4 {
            return bad(format!(
                "sampling.draws must be at least 4, got {}",
                self.sampling.draws
            ));
        }
        if self.sampling.prior_draws == 0 {
            return bad("sampling.prior_draws must be at least 1".into());
        }
        if !(self.sampling.init_jitter.is_finite() && self.sampling.init_jitter >= 0.0) {
            return bad(format!(
                "sampling.init_jitter must be non-negative, got {}",
                self.sampling.init_jitter
            ));
        }
        if !(self.report.ci_prob > 0.0 && self.report.ci_prob < 1.0) {
            return bad(format!(
                "report.ci_prob must lie in (0, 1), got {}",
                self.report.ci_prob
            ));
        }
        for (name, prior) in [
            ("alpha", &self.priors.alpha),
            ("beta", &self.priors.beta),
            ("sigma", &self.priors.sigma),
        ] {
            let scale = match *prior {
                Prior::Normal { sigma, .. } | Prior::HalfNormal { sigma } => sigma,
                Prior::Exponential { lam } => lam,
            };
            if !(scale.is_finite() && scale > 0.0) {
                return bad(format!("priors.{} must have a positive scale", name));
            }
        }
        if matches!(self.priors.sigma, Prior::Normal { .. }) {
            return bad("priors.sigma must be a positive distribution".into());
        }
        self.sampler_config().validate()?;
        Ok(())
    }

    /// Sampler settings for the posterior stage.
    pub fn sampler_config(&self) -> SamplerConfig {
        let s = &self.sampling;
        SamplerConfig {
            num_chains: s.chains,
            num_draws: s.draws,
            num_warmup: s.warmup,
            step_size: 0.0,
            num_leapfrog_steps: s.num_leapfrog_steps,
            max_tree_depth: s.max_tree_depth,
            target_accept: s.target_accept,
            kind: s.sampler,
            init_jitter: (-s.init_jitter, s.init_jitter),
            seed: self.seed,
            num_threads: s.num_threads,
            progress: s.progress,
        }
    }
}
