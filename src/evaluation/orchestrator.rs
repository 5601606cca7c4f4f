use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::dataset::{build_dataset, default_questions, EvalSample, Question};
use super::metric::Metric;
use super::oracle::{OracleOutput, RunConfig, ScoringOracle};
use super::report::format_score;
use super::results::{sanitize, ResultRecord, ResultsFile, ResultsStore, SampleResult};
use crate::error::{Error, Result};
use crate::query::EngineFactory;
use crate::variant::{all_variants, Variant};

/// How a run reconciles with the results already on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Discard existing results and score every variant.
    Fresh,
    /// Score only variants without a complete record.
    Resume,
    /// Re-score the given question indices of every stored variant.
    Patch(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub scored: Vec<String>,
    pub skipped: Vec<String>,
    pub store: ResultsStore,
}

pub struct Orchestrator {
    oracle: Arc<dyn ScoringOracle>,
    engines: Arc<dyn EngineFactory>,
    questions: Vec<Question>,
    metrics: Vec<Metric>,
    run_config: RunConfig,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(oracle: Arc<dyn ScoringOracle>, engines: Arc<dyn EngineFactory>) -> Self {
        Self {
            oracle,
            engines,
            questions: default_questions(),
            metrics: Metric::ALL.to_vec(),
            run_config: RunConfig::default(),
            top_k: 5,
        }
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub async fn run(&self, mode: RunMode, file: &ResultsFile) -> Result<RunSummary> {
        let start = Instant::now();
        let question_count = self.questions.len();

        let (mut store, patch) = match mode {
            RunMode::Fresh => (ResultsStore::new(), None),
            RunMode::Resume => (file.load()?, None),
            RunMode::Patch(indices) => {
                let indices = self.normalize_indices(indices)?;
                (load_for_patch(file)?, Some(indices))
            }
        };

        info!(
            questions = question_count,
            patch = ?patch,
            existing = store.len(),
            "Starting evaluation run"
        );

        let mut summary_scored = Vec::new();
        let mut summary_skipped = Vec::new();

        for variant in all_variants() {
            let key = variant.key();

            match &patch {
                None => {
                    if let Some(record) = store.get(&key) {
                        if record.is_complete(&self.metrics, question_count) {
                            info!(variant = %key, "Skipping, already evaluated");
                            summary_skipped.push(key);
                            continue;
                        }
                        warn!(variant = %key, "Stored record is incomplete, re-scoring");
                    }
                    info!(variant = %key, "Evaluating");
                    let (dataset, output) = self.score(variant, None).await?;
                    store.insert(key.clone(), self.full_record(&dataset, output));
                }
                Some(indices) => {
                    let Some(record) = store.get_mut(&key) else {
                        warn!(variant = %key, "Skipping, not in results");
                        summary_skipped.push(key);
                        continue;
                    };
                    if !record.is_complete(&self.metrics, question_count) {
                        return Err(Error::InconsistentRecord {
                            variant: key,
                            detail: format!(
                                "expected {} samples per metric, cannot patch in place",
                                question_count
                            ),
                        });
                    }
                    info!(variant = %key, indices = ?indices, "Patching");
                    let (dataset, output) = self.score(variant, Some(indices.as_slice())).await?;
                    self.merge(record, &dataset, output);
                }
            }

            file.save(&store)?;
            if let Some(record) = store.get(&key) {
                log_scores(&key, record);
            }
            summary_scored.push(key);
        }

        info!(
            scored = summary_scored.len(),
            skipped = summary_skipped.len(),
            elapsed_secs = start.elapsed().as_secs(),
            "Evaluation run finished"
        );

        Ok(RunSummary {
            scored: summary_scored,
            skipped: summary_skipped,
            store,
        })
    }

    /// Ascending, deduplicated, in range.
    fn normalize_indices(&self, mut indices: Vec<usize>) -> Result<Vec<usize>> {
        if indices.is_empty() {
            return Err(Error::Usage("patch needs at least one question index".to_string()));
        }
        indices.sort_unstable();
        indices.dedup();
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.questions.len()) {
            return Err(Error::Usage(format!(
                "question index {} out of range (have {} questions)",
                bad,
                self.questions.len()
            )));
        }
        Ok(indices)
    }

    async fn score(
        &self,
        variant: Variant,
        indices: Option<&[usize]>,
    ) -> Result<(Vec<EvalSample>, OracleOutput)> {
        let dataset = build_dataset(&self.questions, indices)?;
        let engine = self.engines.engine(variant, self.top_k).await?;
        let output = self
            .oracle
            .score(&dataset, engine.as_ref(), &self.metrics, &self.run_config)
            .await?;
        self.check_output(variant, &dataset, &output)?;
        Ok((dataset, output))
    }

    fn check_output(&self, variant: Variant, dataset: &[EvalSample], output: &OracleOutput) -> Result<()> {
        if output.samples.len() != dataset.len() {
            return Err(Error::Oracle(format!(
                "{}: {} samples for {} rows",
                variant,
                output.samples.len(),
                dataset.len()
            )));
        }
        for metric in &self.metrics {
            match output.scores.get(metric) {
                Some(values) if values.len() != dataset.len() => {
                    return Err(Error::Oracle(format!(
                        "{}: {} {} values for {} rows",
                        variant,
                        values.len(),
                        metric,
                        dataset.len()
                    )));
                }
                Some(_) => {}
                None => warn!(variant = %variant, metric = %metric, "Oracle returned no values"),
            }
        }
        Ok(())
    }

    /// Sanitized values of `metric`, one per row; all undefined if the oracle
    /// left the metric out.
    fn column(&self, output: &OracleOutput, metric: Metric, rows: usize) -> Vec<Option<f64>> {
        match output.scores.get(&metric) {
            Some(values) => values.iter().map(|v| sanitize(*v)).collect(),
            None => vec![None; rows],
        }
    }

    fn full_record(&self, dataset: &[EvalSample], output: OracleOutput) -> ResultRecord {
        let per_sample: BTreeMap<Metric, Vec<Option<f64>>> = self
            .metrics
            .iter()
            .map(|m| (*m, self.column(&output, *m, dataset.len())))
            .collect();
        let samples = dataset
            .iter()
            .zip(output.samples)
            .map(|(row, generated)| SampleResult {
                question_index: row.question_index,
                user_input: row.user_input.clone(),
                reference: row.reference.clone(),
                response: generated.response,
                retrieved_contexts: generated.retrieved_contexts,
            })
            .collect();
        ResultRecord::new(per_sample, samples)
    }

    /// Overwrite the patched positions and recompute aggregates over the
    /// whole sequence.
    fn merge(&self, record: &mut ResultRecord, dataset: &[EvalSample], output: OracleOutput) {
        for metric in &self.metrics {
            let column = self.column(&output, *metric, dataset.len());
            if let Some(existing) = record.per_sample.get_mut(metric) {
                for (row, value) in dataset.iter().zip(column) {
                    existing[row.question_index] = value;
                }
            }
        }
        for (row, generated) in dataset.iter().zip(output.samples) {
            record.samples[row.question_index] = SampleResult {
                question_index: row.question_index,
                user_input: row.user_input.clone(),
                reference: row.reference.clone(),
                response: generated.response,
                retrieved_contexts: generated.retrieved_contexts,
            };
        }
        record.recompute_scores();
    }
}

/// Existing results to patch into. A missing or empty document is a usage
/// error.
pub fn load_for_patch(file: &ResultsFile) -> Result<ResultsStore> {
    if !file.exists() {
        return Err(Error::Usage(format!(
            "no results at {}; run a full evaluation before patching",
            file.path().display()
        )));
    }
    let store = file.load()?;
    if store.is_empty() {
        return Err(Error::Usage(format!(
            "results at {} are empty; run a full evaluation before patching",
            file.path().display()
        )));
    }
    Ok(store)
}

fn log_scores(key: &str, record: &ResultRecord) {
    let line = record
        .scores
        .iter()
        .map(|(metric, score)| format!("{}={}", metric, format_score(*score)))
        .collect::<Vec<_>>()
        .join(" ");
    info!(variant = %key, "Scores: {}", line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::oracle::GeneratedSample;
    use crate::query::{EngineResponse, QueryEngine, SourceNode};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with the variant key so the oracle output is traceable.
    struct KeyedEngine {
        key: String,
    }

    #[async_trait]
    impl QueryEngine for KeyedEngine {
        async fn query(&self, question: &str) -> Result<EngineResponse> {
            Ok(EngineResponse {
                answer: format!("{}: {}", self.key, question),
                sources: vec![SourceNode {
                    text: format!("context for {}", self.key),
                    score: Some(0.9),
                }],
            })
        }
    }

    struct KeyedFactory;

    #[async_trait]
    impl EngineFactory for KeyedFactory {
        async fn engine(&self, variant: Variant, _top_k: usize) -> Result<Arc<dyn QueryEngine>> {
            Ok(Arc::new(KeyedEngine { key: variant.key() }))
        }
    }

    /// Scores row `i` as `base + i / 100`.
    struct FakeOracle {
        base: f64,
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
        nan_metric: Option<Metric>,
        drop_metric: Option<Metric>,
        short_output: bool,
        seen: Mutex<Vec<Vec<usize>>>,
    }

    impl FakeOracle {
        fn new(base: f64) -> Self {
            Self {
                base,
                calls: AtomicUsize::new(0),
                fail_on_call: None,
                nan_metric: None,
                drop_metric: None,
                short_output: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScoringOracle for FakeOracle {
        async fn score(
            &self,
            dataset: &[EvalSample],
            engine: &dyn QueryEngine,
            metrics: &[Metric],
            _config: &RunConfig,
        ) -> Result<OracleOutput> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_call == Some(call) {
                return Err(Error::Oracle("retries exhausted".to_string()));
            }
            self.seen
                .lock()
                .push(dataset.iter().map(|r| r.question_index).collect());

            let mut output = OracleOutput::default();
            for row in dataset {
                let response = engine.query(&row.user_input).await?;
                output.samples.push(GeneratedSample {
                    retrieved_contexts: response.contexts(),
                    response: response.answer,
                });
            }
            for metric in metrics {
                if self.drop_metric == Some(*metric) {
                    continue;
                }
                let values = dataset
                    .iter()
                    .map(|row| {
                        if self.nan_metric == Some(*metric) {
                            f64::NAN
                        } else {
                            self.base + row.question_index as f64 / 100.0
                        }
                    })
                    .collect();
                output.scores.insert(*metric, values);
            }
            if self.short_output {
                output.samples.pop();
            }
            Ok(output)
        }
    }

    fn orchestrator(oracle: Arc<FakeOracle>) -> Orchestrator {
        Orchestrator::new(oracle, Arc::new(KeyedFactory))
    }

    fn results_file(dir: &Path) -> ResultsFile {
        ResultsFile::new(dir.join("eval").join("results.json"))
    }

    fn assert_aggregates_consistent(store: &ResultsStore) {
        for (key, record) in store.iter() {
            let mut expected = record.clone();
            expected.recompute_scores();
            assert_eq!(record.scores, expected.scores, "{}", key);
        }
    }

    #[tokio::test]
    async fn test_fresh_run_scores_every_variant() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        let oracle = Arc::new(FakeOracle::new(0.5));

        let summary = orchestrator(oracle.clone())
            .run(RunMode::Fresh, &file)
            .await
            .unwrap();

        assert_eq!(oracle.calls(), 9);
        assert_eq!(summary.scored.len(), 9);
        assert!(summary.skipped.is_empty());
        assert_eq!(summary.store.len(), 9);
        for variant in all_variants() {
            let record = summary.store.get(&variant.key()).unwrap();
            assert!(record.is_complete(&Metric::ALL, 8));
            assert_eq!(record.scores.len(), 4);
            assert!(record.samples[3].response.starts_with(&variant.key()));
        }
        assert_aggregates_consistent(&summary.store);
        assert_eq!(file.load().unwrap(), summary.store);
    }

    #[tokio::test]
    async fn test_fresh_discards_existing_results() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        orchestrator(Arc::new(FakeOracle::new(0.1)))
            .run(RunMode::Fresh, &file)
            .await
            .unwrap();

        let oracle = Arc::new(FakeOracle::new(0.7));
        let summary = orchestrator(oracle.clone())
            .run(RunMode::Fresh, &file)
            .await
            .unwrap();
        assert_eq!(oracle.calls(), 9);
        let record = summary.store.get("fixed_voyage_3_large").unwrap();
        assert_eq!(record.per_sample[&Metric::Faithfulness][0], Some(0.7));
    }

    #[tokio::test]
    async fn test_resume_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        orchestrator(Arc::new(FakeOracle::new(0.5)))
            .run(RunMode::Fresh, &file)
            .await
            .unwrap();
        let before = std::fs::read_to_string(file.path()).unwrap();

        let oracle = Arc::new(FakeOracle::new(0.9));
        let summary = orchestrator(oracle.clone())
            .run(RunMode::Resume, &file)
            .await
            .unwrap();

        assert_eq!(oracle.calls(), 0);
        assert!(summary.scored.is_empty());
        assert_eq!(summary.skipped.len(), 9);
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_crash_then_resume_scores_only_the_rest() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());

        let crashing = Arc::new(FakeOracle {
            fail_on_call: Some(4),
            ..FakeOracle::new(0.2)
        });
        let err = orchestrator(crashing.clone())
            .run(RunMode::Fresh, &file)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Oracle(_)));
        let checkpoint = file.load().unwrap();
        assert_eq!(checkpoint.len(), 4);

        let oracle = Arc::new(FakeOracle::new(0.8));
        let summary = orchestrator(oracle.clone())
            .run(RunMode::Resume, &file)
            .await
            .unwrap();

        assert_eq!(oracle.calls(), 5);
        assert_eq!(summary.scored.len(), 5);
        assert_eq!(summary.store.len(), 9);
        for (key, record) in checkpoint.iter() {
            assert_eq!(summary.store.get(key), Some(record), "{} changed", key);
        }
    }

    #[tokio::test]
    async fn test_resume_rescores_incomplete_record() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        let summary = orchestrator(Arc::new(FakeOracle::new(0.5)))
            .run(RunMode::Fresh, &file)
            .await
            .unwrap();

        let mut store = summary.store;
        let record = store.get_mut("semantic_voyage_3_5").unwrap();
        record.per_sample.get_mut(&Metric::ContextRecall).unwrap().truncate(3);
        file.save(&store).unwrap();

        let oracle = Arc::new(FakeOracle::new(0.5));
        let summary = orchestrator(oracle.clone())
            .run(RunMode::Resume, &file)
            .await
            .unwrap();
        assert_eq!(oracle.calls(), 1);
        assert_eq!(summary.scored, vec!["semantic_voyage_3_5".to_string()]);
        assert!(summary
            .store
            .get("semantic_voyage_3_5")
            .unwrap()
            .is_complete(&Metric::ALL, 8));
    }

    #[tokio::test]
    async fn test_patch_touches_only_requested_indices() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        let before = orchestrator(Arc::new(FakeOracle::new(0.0)))
            .run(RunMode::Fresh, &file)
            .await
            .unwrap()
            .store;

        let oracle = Arc::new(FakeOracle::new(1.0));
        let summary = orchestrator(oracle.clone())
            .run(RunMode::Patch(vec![5, 2, 2]), &file)
            .await
            .unwrap();

        assert_eq!(oracle.calls(), 9);
        assert!(oracle.seen.lock().iter().all(|rows| rows == &vec![2, 5]));

        for (key, old) in before.iter() {
            let new = summary.store.get(key).unwrap();
            for metric in Metric::ALL {
                let (old_vals, new_vals) = (&old.per_sample[&metric], &new.per_sample[&metric]);
                for i in 0..8 {
                    if i == 2 || i == 5 {
                        assert_eq!(new_vals[i], Some(1.0 + i as f64 / 100.0));
                    } else {
                        assert_eq!(new_vals[i], old_vals[i], "{} {} [{}]", key, metric, i);
                    }
                }
            }
            for i in 0..8 {
                if i != 2 && i != 5 {
                    assert_eq!(new.samples[i], old.samples[i]);
                }
            }
            assert_eq!(new.samples[5].question_index, 5);
            assert_ne!(new.scores, old.scores);
        }
        assert_aggregates_consistent(&summary.store);
        assert_eq!(file.load().unwrap(), summary.store);
    }

    #[tokio::test]
    async fn test_patch_keeps_untouched_floats_exact() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        let value = 0.9856906946328695_f64;

        let mut store = ResultsStore::new();
        for variant in all_variants() {
            let per_sample = Metric::ALL
                .iter()
                .map(|m| (*m, vec![Some(value); 8]))
                .collect();
            let samples = (0..8)
                .map(|i| SampleResult {
                    question_index: i,
                    user_input: format!("q{}", i),
                    reference: format!("r{}", i),
                    response: format!("a{}", i),
                    retrieved_contexts: vec![format!("c{}", i)],
                })
                .collect();
            store.insert(variant.key(), ResultRecord::new(per_sample, samples));
        }
        file.save(&store).unwrap();

        orchestrator(Arc::new(FakeOracle::new(0.0)))
            .run(RunMode::Patch(vec![2]), &file)
            .await
            .unwrap();

        let reloaded = file.load().unwrap();
        for (key, record) in reloaded.iter() {
            for metric in Metric::ALL {
                for (i, v) in record.per_sample[&metric].iter().enumerate() {
                    if i == 2 {
                        assert_eq!(*v, Some(0.02));
                    } else {
                        assert_eq!(v.map(f64::to_bits), Some(value.to_bits()), "{} {} [{}]", key, metric, i);
                    }
                }
            }
        }
        assert_aggregates_consistent(&reloaded);
    }

    #[test]
    fn test_load_for_patch_requires_results() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        assert!(matches!(load_for_patch(&file), Err(Error::Usage(_))));

        file.save(&ResultsStore::new()).unwrap();
        assert!(matches!(load_for_patch(&file), Err(Error::Usage(_))));
    }

    #[tokio::test]
    async fn test_patch_without_results_is_usage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        let oracle = Arc::new(FakeOracle::new(0.5));

        let err = orchestrator(oracle.clone())
            .run(RunMode::Patch(vec![2]), &file)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        assert_eq!(oracle.calls(), 0);
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_patch_on_empty_results_is_usage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        file.save(&ResultsStore::new()).unwrap();
        let oracle = Arc::new(FakeOracle::new(0.5));

        let err = orchestrator(oracle.clone())
            .run(RunMode::Patch(vec![0]), &file)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_patch_rejects_bad_indices_before_scoring() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        orchestrator(Arc::new(FakeOracle::new(0.5)))
            .run(RunMode::Fresh, &file)
            .await
            .unwrap();

        let oracle = Arc::new(FakeOracle::new(0.5));
        for indices in [vec![8], vec![]] {
            let err = orchestrator(oracle.clone())
                .run(RunMode::Patch(indices), &file)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Usage(_)));
        }
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_patch_skips_variants_not_in_results() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        let crashing = Arc::new(FakeOracle {
            fail_on_call: Some(2),
            ..FakeOracle::new(0.0)
        });
        let _ = orchestrator(crashing).run(RunMode::Fresh, &file).await;
        assert_eq!(file.load().unwrap().len(), 2);

        let oracle = Arc::new(FakeOracle::new(1.0));
        let summary = orchestrator(oracle.clone())
            .run(RunMode::Patch(vec![0]), &file)
            .await
            .unwrap();
        assert_eq!(oracle.calls(), 2);
        assert_eq!(summary.scored, vec!["fixed_voyage_3_large", "fixed_voyage_3_5"]);
        assert_eq!(summary.skipped.len(), 7);
        assert_eq!(summary.store.len(), 2);
    }

    #[tokio::test]
    async fn test_patch_into_short_record_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        let mut store = orchestrator(Arc::new(FakeOracle::new(0.5)))
            .run(RunMode::Fresh, &file)
            .await
            .unwrap()
            .store;
        store.get_mut("fixed_voyage_3_large").unwrap().samples.truncate(4);
        file.save(&store).unwrap();

        let err = orchestrator(Arc::new(FakeOracle::new(0.5)))
            .run(RunMode::Patch(vec![6]), &file)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentRecord { .. }));
    }

    #[tokio::test]
    async fn test_nan_scores_are_stored_as_null() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        let oracle = Arc::new(FakeOracle {
            nan_metric: Some(Metric::ContextPrecision),
            ..FakeOracle::new(0.5)
        });
        let summary = orchestrator(oracle).run(RunMode::Fresh, &file).await.unwrap();

        let record = summary.store.get("hierarchical_voyage_law_2").unwrap();
        assert!(record.per_sample[&Metric::ContextPrecision]
            .iter()
            .all(Option::is_none));
        assert_eq!(record.scores[&Metric::ContextPrecision], None);
        assert!(record.scores[&Metric::Faithfulness].is_some());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert!(raw["hierarchical_voyage_law_2"]["scores"]["context_precision"].is_null());
    }

    #[tokio::test]
    async fn test_missing_metric_is_all_undefined() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        let oracle = Arc::new(FakeOracle {
            drop_metric: Some(Metric::AnswerRelevancy),
            ..FakeOracle::new(0.5)
        });
        let summary = orchestrator(oracle).run(RunMode::Fresh, &file).await.unwrap();
        let record = summary.store.get("fixed_voyage_law_2").unwrap();
        assert_eq!(record.per_sample[&Metric::AnswerRelevancy], vec![None; 8]);
        assert_eq!(record.scores[&Metric::AnswerRelevancy], None);
    }

    #[tokio::test]
    async fn test_short_oracle_output_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let file = results_file(tmp.path());
        let oracle = Arc::new(FakeOracle {
            short_output: true,
            ..FakeOracle::new(0.5)
        });
        let err = orchestrator(oracle).run(RunMode::Fresh, &file).await.unwrap_err();
        assert!(matches!(err, Error::Oracle(_)));
        assert!(!file.exists());
    }
}
