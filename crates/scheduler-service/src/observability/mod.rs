//! Observability for the scheduler.
//!
//! Provides metrics definitions and the Prometheus exporter bootstrap.

pub mod metrics;
