use prometheus::{Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};
use lazy_static::lazy_static;
use std::sync::OnceLock;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static BACKGROUND_TASKS: OnceLock<IntCounterVec> = OnceLock::new();
static COMPACTED_SESSIONS: OnceLock<IntCounter> = OnceLock::new();
static CONTRADICTIONS: OnceLock<IntCounter> = OnceLock::new();

/// Counters are no-ops until this has run.
pub fn init_metrics() {
    let req_counter = REQ_COUNTER.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("requests_total", "Total requests per route"),
            &["route", "status"],
        )
        .expect("valid requests_total definition")
    });

    let background_tasks = BACKGROUND_TASKS.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("background_tasks_total", "Background tasks by kind and outcome"),
            &["task", "status"],
        )
        .expect("valid background_tasks_total definition")
    });

    let compacted = COMPACTED_SESSIONS.get_or_init(|| {
        IntCounter::new("compacted_sessions_total", "Sessions folded into summaries")
            .expect("valid compacted_sessions_total definition")
    });

    let contradictions = CONTRADICTIONS.get_or_init(|| {
        IntCounter::new("detected_contradictions_total", "Candidate facts quarantined as contradictions")
            .expect("valid detected_contradictions_total definition")
    });

    REGISTRY.register(Box::new(req_counter.clone())).ok();
    REGISTRY.register(Box::new(background_tasks.clone())).ok();
    REGISTRY.register(Box::new(compacted.clone())).ok();
    REGISTRY.register(Box::new(contradictions.clone())).ok();
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

pub fn inc_background_task(task: &str, status: &str) {
    if let Some(counter) = BACKGROUND_TASKS.get() {
        counter.with_label_values(&[task, status]).inc();
    }
}

pub fn inc_compacted(count: u64) {
    if let Some(counter) = COMPACTED_SESSIONS.get() {
        counter.inc_by(count);
    }
}

pub fn inc_contradictions(count: u64) {
    if let Some(counter) = CONTRADICTIONS.get() {
        counter.inc_by(count);
    }
}

/// Text exposition of every registered metric.
pub fn encode_metrics() -> anyhow::Result<Vec<u8>> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}
