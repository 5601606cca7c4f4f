use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::variant::{all_variants, Variant};

/// Answered and failed queries for one strategy/model pair.
#[derive(Debug, Default)]
pub struct VariantCounters {
    pub answered: AtomicU64,
    pub failed: AtomicU64,
    pub duration_sum_ms: AtomicU64,
}

#[derive(Debug)]
pub struct Metrics {
    pub queries_active: AtomicU64,
    pub queries_mock: AtomicU64,
    pub by_variant: DashMap<Variant, VariantCounters>,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queries_active: AtomicU64::new(0),
            queries_mock: AtomicU64::new(0),
            by_variant: DashMap::new(),
        })
    }

    pub fn start_query(&self) {
        self.queries_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish_query(&self, variant: Variant, ok: bool, duration_ms: u64) {
        self.queries_active.fetch_sub(1, Ordering::Relaxed);
        let counters = self.by_variant.entry(variant).or_default();
        counters
            .duration_sum_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        if ok {
            counters.answered.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_mock(&self) {
        self.queries_mock.fetch_add(1, Ordering::Relaxed);
    }

    /// Queries answered or failed by real engines, across all variants.
    pub fn queries_total(&self) -> u64 {
        self.by_variant
            .iter()
            .map(|c| c.answered.load(Ordering::Relaxed) + c.failed.load(Ordering::Relaxed))
            .sum()
    }

    pub fn render_prometheus(&self) -> String {
        let mut out = format!(
            "# HELP rag_matrix_queries_active Queries currently being answered.\n\
             # TYPE rag_matrix_queries_active gauge\n\
             rag_matrix_queries_active {}\n\
             # HELP rag_matrix_queries_mock Queries answered with the canned response.\n\
             # TYPE rag_matrix_queries_mock counter\n\
             rag_matrix_queries_mock {}\n",
            self.queries_active.load(Ordering::Relaxed),
            self.queries_mock.load(Ordering::Relaxed),
        );

        let families: [(&str, &str, &str, fn(&VariantCounters) -> u64); 3] = [
            (
                "rag_matrix_queries_total",
                "Queries answered per strategy and embedding model.",
                "counter",
                |c| c.answered.load(Ordering::Relaxed),
            ),
            (
                "rag_matrix_queries_failed",
                "Queries whose engine call failed.",
                "counter",
                |c| c.failed.load(Ordering::Relaxed),
            ),
            (
                "rag_matrix_query_duration_ms_sum",
                "Sum of engine query durations in ms.",
                "counter",
                |c| c.duration_sum_ms.load(Ordering::Relaxed),
            ),
        ];

        for (name, help, kind, read) in families {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} {}", name, kind);
            for variant in all_variants() {
                let value = self.by_variant.get(&variant).map(|c| read(c.value())).unwrap_or(0);
                let _ = writeln!(
                    out,
                    "{}{{strategy=\"{}\",model=\"{}\"}} {}",
                    name,
                    variant.strategy.as_str(),
                    variant.embed_model.as_str(),
                    value
                );
            }
        }
        out
    }
}
