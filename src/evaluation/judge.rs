//! LLM-graded implementation of the scoring oracle.
//!
//! Every dataset row is answered by the engine under test, then graded by an
//! evaluator LLM (and, for answer relevancy, an evaluator embedder). Rows run
//! concurrently up to `RunConfig::max_workers`; every external call goes
//! through [`with_retries`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::dataset::EvalSample;
use super::metric::Metric;
use super::oracle::{with_retries, GeneratedSample, OracleOutput, RunConfig, ScoringOracle};
use crate::chunk::split_sentences;
use crate::embed::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::llm::Llm;
use crate::query::QueryEngine;

pub struct LlmJudge {
    llm: Arc<dyn Llm>,
    embedder: Arc<dyn Embedder>,
    questions_per_answer: usize,
}

#[derive(Deserialize)]
struct StatementVerdicts {
    statements: Vec<StatementVerdict>,
}

#[derive(Deserialize)]
struct StatementVerdict {
    #[allow(dead_code)]
    statement: String,
    supported: bool,
}

#[derive(Deserialize)]
struct GeneratedQuestions {
    questions: Vec<String>,
    #[serde(default)]
    noncommittal: bool,
}

#[derive(Deserialize)]
struct ContextVerdicts {
    verdicts: Vec<bool>,
}

#[derive(Deserialize)]
struct Attributions {
    classifications: Vec<Attribution>,
}

#[derive(Deserialize)]
struct Attribution {
    #[allow(dead_code)]
    sentence: String,
    attributed: bool,
}

impl LlmJudge {
    pub fn new(llm: Arc<dyn Llm>, embedder: Arc<dyn Embedder>, questions_per_answer: usize) -> Self {
        Self {
            llm,
            embedder,
            questions_per_answer: questions_per_answer.max(1),
        }
    }

    async fn ask<T: DeserializeOwned>(&self, prompt: &str, config: &RunConfig) -> Result<Option<T>> {
        let reply = with_retries(config, "evaluator llm", || self.llm.complete(prompt)).await?;
        let parsed = extract_json(&reply);
        if parsed.is_none() {
            warn!(model = %self.llm.model_name(), "Unparsable judge reply");
        }
        Ok(parsed)
    }

    async fn score_row(
        &self,
        row: &EvalSample,
        engine: &dyn QueryEngine,
        metrics: &[Metric],
        config: &RunConfig,
    ) -> Result<(GeneratedSample, Vec<f64>)> {
        let response = with_retries(config, "query engine", || engine.query(&row.user_input)).await?;
        let sample = GeneratedSample {
            retrieved_contexts: response.contexts(),
            response: response.answer,
        };

        let mut values = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let value = match metric {
                Metric::Faithfulness => self.faithfulness(row, &sample, config).await?,
                Metric::AnswerRelevancy => self.answer_relevancy(row, &sample, config).await?,
                Metric::ContextPrecision => self.context_precision(row, &sample, config).await?,
                Metric::ContextRecall => self.context_recall(row, &sample, config).await?,
            };
            debug!(question = row.question_index, metric = %metric, value, "Scored sample");
            values.push(value);
        }
        Ok((sample, values))
    }

    async fn faithfulness(&self, row: &EvalSample, sample: &GeneratedSample, config: &RunConfig) -> Result<f64> {
        let prompt = format!(
            "Break the answer below into its individual factual statements and decide, for each \
             statement, whether it can be directly inferred from the context.\n\n\
             Question: {}\n\nAnswer: {}\n\nContext:\n{}\n\n\
             Respond with JSON only, in the form \
             {{\"statements\": [{{\"statement\": \"...\", \"supported\": true}}]}}",
            row.user_input,
            sample.response,
            numbered(&sample.retrieved_contexts)
        );
        let Some(verdicts) = self.ask::<StatementVerdicts>(&prompt, config).await? else {
            return Ok(f64::NAN);
        };
        let supported = verdicts.statements.iter().filter(|s| s.supported).count();
        Ok(ratio(supported, verdicts.statements.len()))
    }

    async fn answer_relevancy(&self, row: &EvalSample, sample: &GeneratedSample, config: &RunConfig) -> Result<f64> {
        let prompt = format!(
            "Write {} distinct questions that the answer below would be a direct answer to. \
             Also state whether the answer is noncommittal (evasive, vague or \"I don't know\").\n\n\
             Answer: {}\n\n\
             Respond with JSON only, in the form \
             {{\"questions\": [\"...\"], \"noncommittal\": false}}",
            self.questions_per_answer, sample.response
        );
        let Some(generated) = self.ask::<GeneratedQuestions>(&prompt, config).await? else {
            return Ok(f64::NAN);
        };
        if generated.noncommittal {
            return Ok(0.0);
        }
        if generated.questions.is_empty() {
            return Ok(f64::NAN);
        }

        let original =
            with_retries(config, "evaluator embedder", || self.embedder.embed_query(&row.user_input)).await?;
        let candidates = with_retries(config, "evaluator embedder", || {
            self.embedder.embed_documents(&generated.questions)
        })
        .await?;
        let total: f64 = candidates
            .iter()
            .map(|c| cosine_similarity(&original, c))
            .sum();
        Ok(total / candidates.len() as f64)
    }

    async fn context_precision(&self, row: &EvalSample, sample: &GeneratedSample, config: &RunConfig) -> Result<f64> {
        if sample.retrieved_contexts.is_empty() {
            return Ok(f64::NAN);
        }
        let prompt = format!(
            "For each numbered context below, decide whether it was useful in arriving at the \
             reference answer to the question.\n\n\
             Question: {}\n\nReference answer: {}\n\nContexts:\n{}\n\n\
             Respond with JSON only: {{\"verdicts\": [true, false, ...]}} with exactly one \
             verdict per context, in order.",
            row.user_input,
            row.reference,
            numbered(&sample.retrieved_contexts)
        );
        let Some(parsed) = self.ask::<ContextVerdicts>(&prompt, config).await? else {
            return Ok(f64::NAN);
        };
        if parsed.verdicts.len() != sample.retrieved_contexts.len() {
            warn!(
                expected = sample.retrieved_contexts.len(),
                got = parsed.verdicts.len(),
                "Judge returned wrong number of context verdicts"
            );
            return Ok(f64::NAN);
        }
        Ok(average_precision(&parsed.verdicts))
    }

    async fn context_recall(&self, row: &EvalSample, sample: &GeneratedSample, config: &RunConfig) -> Result<f64> {
        let sentences = split_sentences(&row.reference);
        if sentences.is_empty() {
            return Ok(f64::NAN);
        }
        let listed: Vec<String> = sentences.iter().map(|s| s.to_string()).collect();
        let prompt = format!(
            "For each numbered sentence of the reference answer, decide whether it can be \
             attributed to the context.\n\n\
             Question: {}\n\nContext:\n{}\n\nReference sentences:\n{}\n\n\
             Respond with JSON only, in the form \
             {{\"classifications\": [{{\"sentence\": \"...\", \"attributed\": true}}]}}",
            row.user_input,
            numbered(&sample.retrieved_contexts),
            numbered(&listed)
        );
        let Some(parsed) = self.ask::<Attributions>(&prompt, config).await? else {
            return Ok(f64::NAN);
        };
        let attributed = parsed.classifications.iter().filter(|c| c.attributed).count();
        Ok(ratio(attributed, parsed.classifications.len()))
    }
}

#[async_trait]
impl ScoringOracle for LlmJudge {
    async fn score(
        &self,
        dataset: &[EvalSample],
        engine: &dyn QueryEngine,
        metrics: &[Metric],
        config: &RunConfig,
    ) -> Result<OracleOutput> {
        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));

        let rows = dataset.iter().map(|row| {
            let sem = Arc::clone(&semaphore);
            async move {
                let _permit = sem
                    .acquire()
                    .await
                    .map_err(|_| Error::Oracle("Semaphore closed".to_string()))?;
                self.score_row(row, engine, metrics, config).await
            }
        });
        let scored = try_join_all(rows).await?;

        let mut output = OracleOutput::default();
        for metric in metrics {
            output.scores.insert(*metric, Vec::with_capacity(scored.len()));
        }
        for (sample, values) in scored {
            for (metric, value) in metrics.iter().zip(values) {
                if let Some(column) = output.scores.get_mut(metric) {
                    column.push(value);
                }
            }
            output.samples.push(sample);
        }
        Ok(output)
    }
}

fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{}. {}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn ratio(hits: usize, total: usize) -> f64 {
    if total == 0 {
        f64::NAN
    } else {
        hits as f64 / total as f64
    }
}

/// Mean of precision@k over the ranks holding a useful context.
pub fn average_precision(verdicts: &[bool]) -> f64 {
    let mut useful = 0usize;
    let mut sum = 0.0;
    for (rank, &verdict) in verdicts.iter().enumerate() {
        if verdict {
            useful += 1;
            sum += useful as f64 / (rank + 1) as f64;
        }
    }
    if useful == 0 {
        0.0
    } else {
        sum / useful as f64
    }
}

/// Parse the outermost `{...}` span of an LLM reply.
pub fn extract_json<T: DeserializeOwned>(reply: &str) -> Option<T> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}
