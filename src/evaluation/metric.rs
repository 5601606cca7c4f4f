use std::fmt;

use serde::{Deserialize, Serialize};

/// A scoring dimension. Declaration order is the canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Faithfulness,
    AnswerRelevancy,
    ContextPrecision,
    ContextRecall,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Faithfulness,
        Metric::AnswerRelevancy,
        Metric::ContextPrecision,
        Metric::ContextRecall,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Faithfulness => "faithfulness",
            Metric::AnswerRelevancy => "answer_relevancy",
            Metric::ContextPrecision => "context_precision",
            Metric::ContextRecall => "context_recall",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Faithfulness => "Faithfulness",
            Metric::AnswerRelevancy => "Answer Relevancy",
            Metric::ContextPrecision => "Context Precision",
            Metric::ContextRecall => "Context Recall",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
