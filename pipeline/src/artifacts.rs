//! Artifact naming and output sinks.
//!
//! Every table and chart the pipeline produces is handed to an
//! [`ArtifactSink`] as encoded bytes. [`FsSink`] writes files into a
//! directory; [`MemorySink`] keeps them in memory for tests.

use crate::error::{PipelineError, Result};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The artifacts of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Artifact {
    Data,
    ModelGraph,
    PriorCheck,
    PosteriorCheck,
    Summary,
    TracePlot,
    Posteriors,
    DistributionComparison,
    PairPlot,
}

impl Artifact {
    pub const ALL: [Artifact; 9] = [
        Artifact::Data,
        Artifact::ModelGraph,
        Artifact::PriorCheck,
        Artifact::PosteriorCheck,
        Artifact::Summary,
        Artifact::TracePlot,
        Artifact::Posteriors,
        Artifact::DistributionComparison,
        Artifact::PairPlot,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Data => "df.csv",
            Artifact::ModelGraph => "lm_DAG.png",
            Artifact::PriorCheck => "lm_prior_check.png",
            Artifact::PosteriorCheck => "lm_posterior_check.png",
            Artifact::Summary => "lm_summary.csv",
            Artifact::TracePlot => "traceplot.png",
            Artifact::Posteriors => "lm_posteriors.png",
            Artifact::DistributionComparison => "distribution_comparisons.png",
            Artifact::PairPlot => "pairplot_alpha_beta.png",
        }
    }
}

/// Destination for encoded artifacts.
pub trait ArtifactSink {
    /// Store `bytes` under the artifact's name, replacing any previous
    /// content, and return where it went.
    fn write(&mut self, artifact: Artifact, bytes: &[u8]) -> Result<PathBuf>;
}

/// Writes artifacts as files in one directory.
#[derive(Debug, Clone)]
pub struct FsSink {
    dir: PathBuf,
}

impl FsSink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for FsSink {
    fn write(&mut self, artifact: Artifact, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(artifact.file_name());
        std::fs::write(&path, bytes).map_err(|e| PipelineError::io(&path, e))?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "wrote artifact");
        Ok(path)
    }
}

/// Keeps artifacts in memory, keyed by artifact.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: BTreeMap<Artifact, Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, artifact: Artifact) -> Option<&[u8]> {
        self.files.get(&artifact).map(Vec::as_slice)
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.files.keys().copied().collect()
    }
}

impl ArtifactSink for MemorySink {
    fn write(&mut self, artifact: Artifact, bytes: &[u8]) -> Result<PathBuf> {
        self.files.insert(artifact, bytes.to_vec());
        Ok(PathBuf::from(artifact.file_name()))
    }
}

/// An RGB raster that charts draw into.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl Frame {
    /// A white frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgb: vec![255; width as usize * height as usize * 3],
        }
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out).write_image(&self.rgb, self.width, self.height, ColorType::Rgb8)?;
        Ok(out)
    }
}
