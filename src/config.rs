use std::path::PathBuf;

use crate::error::{Error, Result};

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_RESULTS_FILE: &str = "eval/results.json";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_POSTGRES_HOST: &str = "localhost";
const DEFAULT_POSTGRES_PORT: u16 = 5432;
const DEFAULT_EMBED_DIM: usize = 1024;
const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_EVALUATOR_MODEL: &str = "claude-haiku-4-5-20251001";
const DEFAULT_EVALUATOR_EMBED_MODEL: &str = "voyage-3.5";
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_EVAL_MAX_WORKERS: usize = 2;
const DEFAULT_EVAL_TIMEOUT: u64 = 300;
const DEFAULT_EVAL_MAX_RETRIES: u32 = 15;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub mock_mode: bool,
    pub results_file: PathBuf,
    pub data_dir: PathBuf,
    pub postgres_host: String,
    pub postgres_port: u16,
    pub postgres_db: Option<String>,
    pub postgres_user: Option<String>,
    pub postgres_password: Option<String>,
    pub embed_dim: usize,
    pub voyage_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub llm_model: String,
    pub evaluator_model: String,
    pub evaluator_embed_model: String,
    pub default_top_k: usize,
    pub eval_max_workers: usize,
    pub eval_timeout_secs: u64,
    pub eval_max_retries: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            mock_mode: env_flag("MOCK_MODE"),
            results_file: PathBuf::from(env_string("RESULTS_FILE", DEFAULT_RESULTS_FILE)),
            data_dir: PathBuf::from(env_string("DATA_DIR", DEFAULT_DATA_DIR)),
            postgres_host: env_string("POSTGRES_HOST", DEFAULT_POSTGRES_HOST),
            postgres_port: env_parse("POSTGRES_PORT", DEFAULT_POSTGRES_PORT),
            postgres_db: std::env::var("POSTGRES_DB").ok(),
            postgres_user: std::env::var("POSTGRES_USER").ok(),
            postgres_password: std::env::var("POSTGRES_PASSWORD").ok(),
            embed_dim: env_parse("EMBED_DIM", DEFAULT_EMBED_DIM),
            voyage_api_key: std::env::var("VOYAGE_API_KEY").ok(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            llm_model: env_string("LLM_MODEL", DEFAULT_LLM_MODEL),
            evaluator_model: env_string("EVALUATOR_MODEL", DEFAULT_EVALUATOR_MODEL),
            evaluator_embed_model: env_string(
                "EVALUATOR_EMBED_MODEL",
                DEFAULT_EVALUATOR_EMBED_MODEL,
            ),
            default_top_k: env_parse("DEFAULT_TOP_K", DEFAULT_TOP_K),
            eval_max_workers: env_parse("EVAL_MAX_WORKERS", DEFAULT_EVAL_MAX_WORKERS),
            eval_timeout_secs: env_parse("EVAL_TIMEOUT_SECS", DEFAULT_EVAL_TIMEOUT),
            eval_max_retries: env_parse("EVAL_MAX_RETRIES", DEFAULT_EVAL_MAX_RETRIES),
        }
    }

    /// Connection string for the pgvector database. Fails if any of the
    /// required credentials are unset.
    pub fn database_url(&self) -> Result<String> {
        let db = self
            .postgres_db
            .as_deref()
            .ok_or(Error::MissingConfig("POSTGRES_DB"))?;
        let user = self
            .postgres_user
            .as_deref()
            .ok_or(Error::MissingConfig("POSTGRES_USER"))?;
        let password = self
            .postgres_password
            .as_deref()
            .ok_or(Error::MissingConfig("POSTGRES_PASSWORD"))?;
        Ok(format!(
            "postgres://{}:{}@{}:{}/{}",
            user, password, self.postgres_host, self.postgres_port, db
        ))
    }

    pub fn voyage_api_key(&self) -> Result<&str> {
        self.voyage_api_key
            .as_deref()
            .ok_or(Error::MissingConfig("VOYAGE_API_KEY"))
    }

    pub fn anthropic_api_key(&self) -> Result<&str> {
        self.anthropic_api_key
            .as_deref()
            .ok_or(Error::MissingConfig("ANTHROPIC_API_KEY"))
    }

    pub fn print_banner(&self) {
        tracing::info!("╔══════════════════════════════════════════════════╗");
        tracing::info!("║           rag-matrix v{}                      ║", env!("CARGO_PKG_VERSION"));
        tracing::info!("╠══════════════════════════════════════════════════╣");
        tracing::info!("║  Port:              {:<28}║", self.port);
        tracing::info!("║  Mode:              {:<28}║", if self.mock_mode { "mock" } else { "live" });
        tracing::info!("║  Results file:      {:<28}║", self.results_file.display());
        tracing::info!("║  Data dir:          {:<28}║", self.data_dir.display());
        tracing::info!("║  Postgres:          {:<28}║", format!("{}:{}", self.postgres_host, self.postgres_port));
        tracing::info!("║  Embed dim:         {:<28}║", self.embed_dim);
        tracing::info!("║  Answer LLM:        {:<28}║", self.llm_model);
        tracing::info!("║  Evaluator LLM:     {:<28}║", self.evaluator_model);
        tracing::info!("║  Eval workers:      {:<28}║", self.eval_max_workers);
        tracing::info!("║  Eval timeout:      {:<27}s║", self.eval_timeout_secs);
        tracing::info!("║  Eval retries:      {:<28}║", self.eval_max_retries);
        tracing::info!("╚══════════════════════════════════════════════════╝");
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
}
