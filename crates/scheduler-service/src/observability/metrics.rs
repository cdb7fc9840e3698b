//! Metrics definitions for the scheduler.
//!
//! All metrics follow Prometheus naming conventions:
//! - `scheduler_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `operation`: lifecycle operations and store queries, fixed by code
//! - `status`: success or error
//! - `error_code`: bounded by `SchedulerError::code()`
//! - `policy`: padded or strict

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Install the global Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from inside a Tokio runtime.
///
/// # Errors
///
/// Returns the exporter's build error if a recorder is already installed or
/// the listener cannot be bound.
pub fn init_metrics_recorder(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}

// ============================================================================
// Lifecycle Metrics
// ============================================================================

/// Record a lifecycle operation outcome.
///
/// Metric: `scheduler_lifecycle_operations_total`, `scheduler_lifecycle_operation_duration_seconds`
/// Labels: `operation`, `status`, `error_code`
pub fn record_lifecycle_operation(operation: &str, error_code: Option<&str>, duration: Duration) {
    let status = if error_code.is_some() { "error" } else { "success" };

    histogram!("scheduler_lifecycle_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("scheduler_lifecycle_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string(),
        "error_code" => error_code.unwrap_or("none").to_string()
    )
    .increment(1);
}

/// Record a conflict check.
///
/// Metric: `scheduler_conflict_checks_total`
/// Labels: `policy`, `result`
pub fn record_conflict_check(policy: &str, conflicted: bool) {
    let result = if conflicted { "conflict" } else { "clear" };

    counter!("scheduler_conflict_checks_total",
        "policy" => policy.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

// ============================================================================
// Start Notifier Metrics
// ============================================================================

/// Record one notifier tick.
///
/// Metric: `scheduler_notifier_tick_duration_seconds`, `scheduler_notifier_due_meetings`
pub fn record_notifier_tick(due_meetings: usize, duration: Duration) {
    histogram!("scheduler_notifier_tick_duration_seconds").record(duration.as_secs_f64());

    #[allow(clippy::cast_precision_loss)]
    gauge!("scheduler_notifier_due_meetings").set(due_meetings as f64);
}

/// Record the outcome of processing one due meeting.
///
/// Metric: `scheduler_start_notifications_total`
/// Labels: `outcome` (`notified`, `already_claimed`, `provision_failed`, `skipped`, `error`)
pub fn record_start_notification(outcome: &str) {
    counter!("scheduler_start_notifications_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a failed delivery to a single participant.
///
/// Metric: `scheduler_notification_failures_total`
/// Labels: `kind`
pub fn record_notification_failure(kind: &str) {
    counter!("scheduler_notification_failures_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution.
///
/// Metric: `scheduler_db_query_duration_seconds`, `scheduler_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("scheduler_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("scheduler_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording against the default no-op recorder must not panic.

    #[test]
    fn test_record_lifecycle_operation() {
        record_lifecycle_operation("request", None, Duration::from_millis(4));
        record_lifecycle_operation("accept", Some("TIME_CONFLICT"), Duration::from_millis(2));
    }

    #[test]
    fn test_record_conflict_check() {
        record_conflict_check("padded", true);
        record_conflict_check("strict", false);
    }

    #[test]
    fn test_record_notifier_metrics() {
        record_notifier_tick(3, Duration::from_millis(12));
        record_start_notification("notified");
        record_start_notification("provision_failed");
        record_notification_failure("meeting_starting");
    }

    #[test]
    fn test_record_db_query() {
        record_db_query("insert_unless_conflict", "success", Duration::from_millis(3));
        record_db_query("find_due_for_start", "error", Duration::from_millis(50));
    }
}
