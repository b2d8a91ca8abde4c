//! Query metrics exported through the `metrics` facade.
//!
//! Names:
//! - `vsearch_embed_seconds` / `vsearch_search_seconds` (histograms)
//! - `vsearch_embed_total` / `vsearch_search_total` (counters, `outcome` label)
//! - `vsearch_search_hits` (histogram of hits returned per query)

use embed::EmbedError;
use index::IndexError;
use std::time::Duration;
use vsearch::QueryMetrics;

/// [`QueryMetrics`] implementation feeding the global metrics recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderMetrics;

impl QueryMetrics for RecorderMetrics {
    fn record_embed(&self, latency: Duration, result: Result<(), EmbedError>) {
        metrics::histogram!("vsearch_embed_seconds").record(latency.as_secs_f64());
        metrics::counter!("vsearch_embed_total", "outcome" => outcome(&result)).increment(1);
    }

    fn record_search(&self, latency: Duration, result: Result<usize, IndexError>) {
        metrics::histogram!("vsearch_search_seconds").record(latency.as_secs_f64());
        metrics::counter!("vsearch_search_total", "outcome" => outcome(&result)).increment(1);
        if let Ok(hits) = result {
            metrics::histogram!("vsearch_search_hits").record(hits as f64);
        }
    }
}

fn outcome<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "error"
    }
}
