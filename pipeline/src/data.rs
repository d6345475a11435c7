//! Synthetic observations for the regression.

use crate::config::DataConfig;
use crate::error::{PipelineError, Result};
use bayeslm_core::CoreError;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// One CSV row. The predictor column is headed `X`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Row {
    #[serde(rename = "X")]
    x: f64,
    y: f64,
}

/// Paired predictor and response vectors. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Observations {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(CoreError::LengthMismatch {
                key: "y".to_string(),
                expected: x.len(),
                actual: y.len(),
            }
            .into());
        }
        Ok(Self { x, y })
    }

    /// `x ~ N(0, 1)`, then `y = intercept + slope * x + noise * e` with
    /// `e ~ N(0, 1)`. All predictors are drawn before any noise.
    pub fn generate<R: Rng + ?Sized>(config: &DataConfig, rng: &mut R) -> Self {
        let x: Vec<f64> = (0..config.n_obs)
            .map(|_| StandardNormal.sample(rng))
            .collect();
        let y = x
            .iter()
            .map(|&xi| {
                let e: f64 = StandardNormal.sample(rng);
                config.intercept + config.slope * xi + config.noise * e
            })
            .collect();
        Self { x, y }
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Encode as CSV with an `X,y` header.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for (&x, &y) in self.x.iter().zip(&self.y) {
            writer.serialize(Row { x, y })?;
        }
        writer.into_inner().map_err(|e| {
            let source = std::io::Error::new(e.error().kind(), e.to_string());
            PipelineError::io("df.csv", source)
        })
    }

    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut x = Vec::new();
        let mut y = Vec::new();
        for row in reader.deserialize() {
            let row: Row = row?;
            x.push(row.x);
            y.push(row.y);
        }
        Ok(Self { x, y })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_csv(file)
    }
}
