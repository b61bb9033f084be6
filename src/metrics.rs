use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, TextEncoder};

lazy_static! {
    // Posting engine metrics
    pub static ref POSTINGS_COMMITTED: IntCounterVec = IntCounterVec::new(
        Opts::new("postings_committed_total", "Committed double-entry postings"),
        &["purpose"]
    ).expect("metric can be created");

    // Reconciliation metrics
    pub static ref RECONCILIATION_RUNS: IntCounter = IntCounter::new(
        "reconciliation_runs_total",
        "Total wallet reconciliation runs"
    ).expect("metric can be created");

    pub static ref RECONCILIATION_MISMATCHES: IntCounter = IntCounter::new(
        "reconciliation_mismatches_total",
        "Reconciliation runs that detected a balance mismatch"
    ).expect("metric can be created");
}

/// Register all metrics with the default registry. Called once at startup.
pub fn register_metrics() {
    let registry = prometheus::default_registry();

    let _ = registry.register(Box::new(POSTINGS_COMMITTED.clone()));
    let _ = registry.register(Box::new(RECONCILIATION_RUNS.clone()));
    let _ = registry.register(Box::new(RECONCILIATION_MISMATCHES.clone()));
}

/// Gather and text-encode all registered metrics.
pub fn metrics_handler() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
