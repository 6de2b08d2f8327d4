use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, GaugeVec, Histogram, register_counter, register_counter_vec,
    register_gauge_vec, register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of guarded requests").unwrap();
    pub static ref AUTH_FAILURES: Counter =
        register_counter!("gateway_auth_failures_total", "Requests rejected as unauthorized")
            .unwrap();
    pub static ref RATE_LIMIT_ADMITTED: CounterVec = register_counter_vec!(
        "gateway_rate_limit_admitted_total",
        "Events admitted per policy",
        &["policy"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_REJECTED: CounterVec = register_counter_vec!(
        "gateway_rate_limit_rejected_total",
        "Events rejected per policy",
        &["policy"]
    )
    .unwrap();
    pub static ref TRACKED_IDENTITIES: GaugeVec = register_gauge_vec!(
        "gateway_rate_limit_identities",
        "Identities holding a rate window; grows on admission, shrinks on sweep",
        &["policy"]
    )
    .unwrap();
    pub static ref GUARD_LATENCY: Histogram = register_histogram!(
        "gateway_guard_latency_seconds",
        "Time spent in authentication and admission"
    )
    .unwrap();
}
