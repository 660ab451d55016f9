use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all worker metrics
const PREFIX: &str = "series_worker";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref TICKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ticks_total"), "Scheduler ticks by outcome"),
        &["outcome"]
    ).expect("Failed to create ticks_total metric");

    pub static ref JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_total"), "Processed jobs by outcome"),
        &["outcome"]
    ).expect("Failed to create jobs_total metric");

    pub static ref OCCURRENCES_INSERTED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_occurrences_inserted_total"),
        "Generated occurrences written to the store"
    ).expect("Failed to create occurrences_inserted_total metric");

    pub static ref OCCURRENCES_DUPLICATE_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_occurrences_duplicate_total"),
        "Generated occurrences skipped because they already existed"
    ).expect("Failed to create occurrences_duplicate_total metric");

    pub static ref JOB_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Time spent processing a single job"
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0])
    ).expect("Failed to create job_duration_seconds metric");
}

/// Register all metrics with the registry. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(TICKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(OCCURRENCES_INSERTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(OCCURRENCES_DUPLICATE_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));

    tracing::debug!("Metrics registered");
}

pub fn record_tick(outcome: &str) {
    TICKS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_job(outcome: &str, duration: Duration) {
    JOBS_TOTAL.with_label_values(&[outcome]).inc();
    JOB_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn record_occurrences(inserted: usize, duplicates: usize) {
    OCCURRENCES_INSERTED_TOTAL.inc_by(inserted as f64);
    OCCURRENCES_DUPLICATE_TOTAL.inc_by(duplicates as f64);
}

/// Render the registry in the Prometheus text exposition format.
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
