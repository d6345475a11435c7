//! Grouped container for prior, posterior and predictive draws.
//!
//! Every variable is stored as an `Array3<f64>` shaped
//! `(chain, draw, element)`. Scalar parameters have a single element.
//! Groups are only ever added, never replaced.

use crate::error::{CoreError, Result};
use ndarray::{s, Array3};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKind {
    Prior,
    PriorPredictive,
    Posterior,
    PosteriorPredictive,
    ObservedData,
    SampleStats,
}

impl GroupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupKind::Prior => "prior",
            GroupKind::PriorPredictive => "prior_predictive",
            GroupKind::Posterior => "posterior",
            GroupKind::PosteriorPredictive => "posterior_predictive",
            GroupKind::ObservedData => "observed_data",
            GroupKind::SampleStats => "sample_stats",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named variables sharing the same chain and draw dimensions.
#[derive(Debug, Clone)]
pub struct Group {
    kind: GroupKind,
    variables: Vec<(String, Array3<f64>)>,
}

impl Group {
    pub fn new(kind: GroupKind) -> Self {
        Self {
            kind,
            variables: Vec::new(),
        }
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    /// Add a variable. Its chain and draw dimensions must match the
    /// variables already present.
    pub fn insert(&mut self, name: &str, values: Array3<f64>) -> Result<()> {
        if self.get(name).is_some() {
            return Err(CoreError::DuplicateVariable {
                group: self.kind.to_string(),
                name: name.to_string(),
            });
        }
        if let Some((_, first)) = self.variables.first() {
            let (c, d, _) = first.dim();
            let (vc, vd, _) = values.dim();
            if vc != c {
                return Err(CoreError::LengthMismatch {
                    key: format!("{}.{} chains", self.kind, name),
                    expected: c,
                    actual: vc,
                });
            }
            if vd != d {
                return Err(CoreError::LengthMismatch {
                    key: format!("{}.{} draws", self.kind, name),
                    expected: d,
                    actual: vd,
                });
            }
        }
        self.variables.push((name.to_string(), values));
        Ok(())
    }

    /// Add a scalar variable from `chains[chain][draw]`.
    pub fn insert_chains(&mut self, name: &str, chains: &[Vec<f64>]) -> Result<()> {
        let n_draws = chains.first().map_or(0, Vec::len);
        if let Some(bad) = chains.iter().find(|c| c.len() != n_draws) {
            return Err(CoreError::LengthMismatch {
                key: name.to_string(),
                expected: n_draws,
                actual: bad.len(),
            });
        }
        let values = Array3::from_shape_fn((chains.len(), n_draws, 1), |(c, d, _)| chains[c][d]);
        self.insert(name, values)
    }

    /// Builder-style [`Group::insert`].
    pub fn with_variable(mut self, name: &str, values: Array3<f64>) -> Result<Self> {
        self.insert(name, values)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Array3<f64>> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Like [`Group::get`] but a missing variable is an error.
    pub fn variable(&self, name: &str) -> Result<&Array3<f64>> {
        self.get(name).ok_or_else(|| CoreError::MissingVariable {
            group: self.kind.to_string(),
            name: name.to_string(),
        })
    }

    /// Variable names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.variables.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn variables(&self) -> &[(String, Array3<f64>)] {
        &self.variables
    }

    pub fn n_chains(&self) -> usize {
        self.variables.first().map_or(0, |(_, v)| v.dim().0)
    }

    pub fn n_draws(&self) -> usize {
        self.variables.first().map_or(0, |(_, v)| v.dim().1)
    }

    /// One element of a variable, split by chain.
    pub fn chains(&self, name: &str, element: usize) -> Option<Vec<Vec<f64>>> {
        let values = self.get(name)?;
        if element >= values.dim().2 {
            return None;
        }
        Some(
            values
                .slice(s![.., .., element])
                .outer_iter()
                .map(|chain| chain.to_vec())
                .collect(),
        )
    }

    /// Every value of a variable, pooled over chains, draws and elements.
    pub fn flat(&self, name: &str) -> Option<Vec<f64>> {
        self.get(name).map(|v| v.iter().copied().collect())
    }
}

/// The shared container threaded through the pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct InferenceData {
    groups: BTreeMap<GroupKind, Group>,
}

impl InferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group. An existing group of the same kind is never overwritten.
    pub fn extend(&mut self, group: Group) -> Result<()> {
        if self.groups.contains_key(&group.kind) {
            return Err(CoreError::GroupExists(group.kind.to_string()));
        }
        self.groups.insert(group.kind, group);
        Ok(())
    }

    pub fn group(&self, kind: GroupKind) -> Option<&Group> {
        self.groups.get(&kind)
    }

    /// Like [`InferenceData::group`] but a missing group is an error.
    pub fn require(&self, kind: GroupKind) -> Result<&Group> {
        self.group(kind)
            .ok_or_else(|| CoreError::MissingGroup(kind.to_string()))
    }

    pub fn has_group(&self, kind: GroupKind) -> bool {
        self.groups.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<GroupKind> {
        self.groups.keys().copied().collect()
    }
}
