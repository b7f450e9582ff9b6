// src/metrics.rs
//! Series emitted through the `metrics` facade. Installing a recorder
//! (Prometheus or otherwise) is left to the embedding process.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metric descriptions, so series carry help text once a
/// recorder is installed.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_requests_total", "Outbound HTTP attempts, retries included.");
        describe_counter!("fetch_retries_total", "Attempts repeated after a retryable failure.");
        describe_counter!(
            "fetch_failures_total",
            "Requests given up on (terminal error or retries exhausted)."
        );
        describe_counter!("parse_item_errors_total", "List entries skipped as malformed.");
        describe_counter!("crawl_pages_total", "List pages fetched and parsed.");
        describe_counter!("crawl_site_failures_total", "Sites that ended a run failed.");
        describe_counter!("detail_failures_total", "Detail fetches that fell back to list fields.");
        describe_counter!(
            "curation_dropped_total",
            "Records removed by curation, labelled by reason."
        );
        describe_counter!("curation_kept_total", "Records surviving curation.");
        describe_histogram!("pipeline_run_ms", "Wall time of one pipeline run in milliseconds.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the pipeline last finished.");
    });
}
