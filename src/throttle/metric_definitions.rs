//! Throttle metric names and their descriptions for the installed recorder
//!
//! Gauges count free slots: they start at the configured limit, drop on
//! acquire and rise on release.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

pub const BACKLOG_QUEUE_SIZE: &str = "throttle.backlog_queue_size";
pub const IN_FLIGHT_QUEUE_SIZE: &str = "throttle.in_flight_queue_size";
pub const REJECTED: &str = "throttle.rejected.total";
pub const QUEUE_WAIT: &str = "throttle.queue_wait.seconds";

pub const TENANT_LABEL: &str = "tenant_id";
pub const REASON_LABEL: &str = "reason";

pub fn describe_metrics() {
    describe_gauge!(
        BACKLOG_QUEUE_SIZE,
        Unit::Count,
        "Number of free backlog slots shared by all tenants"
    );

    describe_gauge!(
        IN_FLIGHT_QUEUE_SIZE,
        Unit::Count,
        "Number of free in-flight slots per tenant"
    );

    describe_counter!(
        REJECTED,
        Unit::Count,
        "Number of requests rejected by the throttle"
    );

    describe_histogram!(
        QUEUE_WAIT,
        Unit::Seconds,
        "Time admitted requests waited for an in-flight slot"
    );
}
