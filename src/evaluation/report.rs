//! Plain-text renderings of the results store.

use super::metric::Metric;
use super::results::ResultsStore;
use crate::variant::{variant_key, ChunkStrategy, EmbedModel};

/// Three decimals, or `NaN` when undefined.
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(v) => format!("{:.3}", v),
        None => "NaN".to_string(),
    }
}

/// One tab-separated row per variant in key order, one column per metric.
pub fn render_table(store: &ResultsStore) -> String {
    let mut out = String::from("variant");
    for metric in Metric::ALL {
        out.push('\t');
        out.push_str(metric.name());
    }
    out.push('\n');

    for (key, record) in store.iter() {
        out.push_str(key);
        for metric in Metric::ALL {
            out.push('\t');
            out.push_str(&format_score(record.scores.get(&metric).copied().flatten()));
        }
        out.push('\n');
    }
    out
}

/// Strategy × model grid of one metric.
pub fn render_matrix(store: &ResultsStore, metric: Metric) -> String {
    let mut out = format!("{}\nstrategy", metric.label());
    for model in EmbedModel::ALL {
        out.push('\t');
        out.push_str(model.as_str());
    }
    out.push('\n');

    for strategy in ChunkStrategy::ALL {
        out.push_str(strategy.as_str());
        for model in EmbedModel::ALL {
            let score = store
                .get(&variant_key(strategy, model))
                .and_then(|r| r.scores.get(&metric).copied().flatten());
            out.push('\t');
            out.push_str(&format_score(score));
        }
        out.push('\n');
    }
    out
}
