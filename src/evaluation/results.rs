//! The persisted results document: one record per variant, checkpointed
//! after every variant.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::metric::Metric;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    pub question_index: usize,
    pub user_input: String,
    pub reference: String,
    pub response: String,
    pub retrieved_contexts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub scores: BTreeMap<Metric, Option<f64>>,
    pub per_sample: BTreeMap<Metric, Vec<Option<f64>>>,
    pub samples: Vec<SampleResult>,
}

impl ResultRecord {
    pub fn new(per_sample: BTreeMap<Metric, Vec<Option<f64>>>, samples: Vec<SampleResult>) -> Self {
        let scores = recalculate_scores(&per_sample);
        Self {
            scores,
            per_sample,
            samples,
        }
    }

    pub fn recompute_scores(&mut self) {
        self.scores = recalculate_scores(&self.per_sample);
    }

    /// Whether every metric has one value per question and every question
    /// has a sample. Undefined values still count as present.
    pub fn is_complete(&self, metrics: &[Metric], question_count: usize) -> bool {
        self.samples.len() == question_count
            && metrics.iter().all(|m| {
                self.per_sample
                    .get(m)
                    .is_some_and(|values| values.len() == question_count)
            })
    }
}

/// Variant key → record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultsStore {
    records: BTreeMap<String, ResultRecord>,
}

impl ResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, variant: &str) -> Option<&ResultRecord> {
        self.records.get(variant)
    }

    pub fn get_mut(&mut self, variant: &str) -> Option<&mut ResultRecord> {
        self.records.get_mut(variant)
    }

    pub fn contains(&self, variant: &str) -> bool {
        self.records.contains_key(variant)
    }

    pub fn insert(&mut self, variant: impl Into<String>, record: ResultRecord) {
        self.records.insert(variant.into(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ResultRecord> {
        self.records.iter()
    }
}

/// Location of the results document on disk.
#[derive(Debug, Clone)]
pub struct ResultsFile {
    path: PathBuf,
}

impl ResultsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// An absent document is an empty store; a present but malformed one is
    /// an error.
    pub fn load(&self) -> Result<ResultsStore> {
        if !self.path.exists() {
            return Ok(ResultsStore::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|source| Error::CorruptData {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the document with `store`. The new content goes to a temp file
    /// in the same directory first and is renamed over the old document.
    pub fn save(&self, store: &ResultsStore) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, store)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        info!("Results written to {}", self.path.display());
        Ok(())
    }
}

/// NaN and infinities become undefined.
pub fn sanitize(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Per-metric mean of the defined values; undefined when none are defined.
pub fn recalculate_scores(
    per_sample: &BTreeMap<Metric, Vec<Option<f64>>>,
) -> BTreeMap<Metric, Option<f64>> {
    per_sample
        .iter()
        .map(|(metric, values)| {
            let valid: Vec<f64> = values.iter().flatten().copied().collect();
            let mean = if valid.is_empty() {
                None
            } else {
                Some(valid.iter().sum::<f64>() / valid.len() as f64)
            };
            (*metric, mean)
        })
        .collect()
}
