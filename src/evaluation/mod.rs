pub mod dataset;
pub mod judge;
pub mod metric;
pub mod oracle;
pub mod orchestrator;
pub mod report;
pub mod results;

pub use judge::LlmJudge;
pub use metric::Metric;
pub use oracle::RunConfig;
pub use orchestrator::{Orchestrator, RunMode};
pub use results::ResultsFile;
