use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The caller asked for something the current state cannot satisfy.
    #[error("usage error: {0}")]
    Usage(String),

    /// The results document exists but is not a well-formed results store.
    #[error("results document {} is malformed: {source}", path.display())]
    CorruptData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A results record does not have the shape the orchestrator needs.
    #[error("results record {variant} is inconsistent: {detail}")]
    InconsistentRecord { variant: String, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned HTTP {status}: {body}")]
    Provider {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("scoring oracle error: {0}")]
    Oracle(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document error: {0}")]
    Document(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing configuration: {0} is not set")]
    MissingConfig(&'static str),
}

impl Error {
    /// Failures worth retrying: provider throttling, provider-side faults,
    /// network hiccups and timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Provider { status, .. } => *status == 429 || *status >= 500,
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
