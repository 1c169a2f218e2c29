use lazy_static::lazy_static;
use prometheus::{
    Counter, Histogram, IntCounterVec, IntGaugeVec, register_counter, register_histogram,
    register_int_counter_vec, register_int_gauge_vec,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("portal_requests_total", "Total number of requests").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "portal_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref SUBMISSIONS: IntCounterVec = register_int_counter_vec!(
        "portal_submissions_total",
        "Rate-limited submissions by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref MIRROR_EVENTS: IntCounterVec = register_int_counter_vec!(
        "portal_mirror_events_total",
        "Live mirror events by kind (notification, fallback, failure, retry)",
        &["kind"]
    )
    .unwrap();
    pub static ref MIRRORED_ITEMS: IntGaugeVec = register_int_gauge_vec!(
        "portal_mirrored_items",
        "Current number of items in each live list",
        &["list"]
    )
    .unwrap();
}
