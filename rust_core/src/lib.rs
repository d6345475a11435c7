pub mod autodiff;
pub mod diagnostics;
pub mod distributions;
pub mod error;
pub mod graph;
pub mod hmc;
pub mod inference_data;
pub mod model;
pub mod nuts;
pub mod progress;
pub mod sampler;

pub use diagnostics::{Summary, SummaryRow};
pub use error::{CoreError, Result};
pub use inference_data::{Group, GroupKind, InferenceData};
pub use model::{ModelBuilder, ModelSpec, Prior};
pub use sampler::{sample, SampleResult, SamplerConfig, SamplerKind};
