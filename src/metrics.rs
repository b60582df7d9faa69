//! Metrics instrumentation for kube-gateway-dns.
//!
//! All metrics are prefixed with `kube_gateway.`

use hickory_proto::rr::RecordType;
use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// How a query was answered, for the `result` label.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Answered authoritatively.
    Success,
    /// Name does not exist in the zone.
    NxDomain,
    /// Handed to the next handler (no zone match or fall-through).
    Delegated,
    /// Indexer not synced yet (SERVFAIL).
    NotReady,
}

impl QueryResult {
    fn label(self) -> &'static str {
        match self {
            QueryResult::Success => "success",
            QueryResult::NxDomain => "nxdomain",
            QueryResult::Delegated => "delegated",
            QueryResult::NotReady => "not_ready",
        }
    }
}

/// Record one served query.
pub fn record_query(qtype: RecordType, result: QueryResult, duration: Duration) {
    let qtype = qtype.to_string();
    counter!("kube_gateway.query.count", "type" => qtype.clone(), "result" => result.label())
        .increment(1);
    histogram!("kube_gateway.query.duration.seconds", "type" => qtype)
        .record(duration.as_secs_f64());
}

/// Record a failed CNAME chain resolution.
pub fn record_cname_failure(reason: &'static str) {
    counter!("kube_gateway.cname.failure.count", "reason" => reason).increment(1);
}

/// Record a zone transfer request.
pub fn record_transfer(kind: &'static str) {
    counter!("kube_gateway.transfer.count", "kind" => kind).increment(1);
}

/// Record the SOA serial number.
pub fn record_serial(serial: u32) {
    gauge!("kube_gateway.soa.serial").set(serial as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
