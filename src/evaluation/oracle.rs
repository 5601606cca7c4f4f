//! The scoring-oracle seam and the run configuration handed to it.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::dataset::EvalSample;
use super::metric::Metric;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::query::QueryEngine;

/// Concurrency, timeout and retry policy for one oracle invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub max_workers: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            timeout: Duration::from_secs(300),
            max_retries: 15,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RunConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.eval_max_workers.max(1),
            timeout: Duration::from_secs(config.eval_timeout_secs),
            max_retries: config.eval_max_retries,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// What the engine produced for one dataset row.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSample {
    pub response: String,
    pub retrieved_contexts: Vec<String>,
}

/// Raw oracle output: one value per dataset row for each metric (NaN
/// allowed) and the generated sample for each row, in dataset order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleOutput {
    pub scores: HashMap<Metric, Vec<f64>>,
    pub samples: Vec<GeneratedSample>,
}

#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn score(
        &self,
        dataset: &[EvalSample],
        engine: &dyn QueryEngine,
        metrics: &[Metric],
        config: &RunConfig,
    ) -> Result<OracleOutput>;
}

/// Run `op` under the configured timeout, retrying transient failures with
/// exponential backoff.
pub async fn with_retries<T, F, Fut>(config: &RunConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(config.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} after {}s",
                what,
                config.timeout.as_secs()
            ))),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.backoff(attempt);
                warn!(
                    what,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
