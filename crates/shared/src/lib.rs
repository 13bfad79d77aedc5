//! Shared infrastructure
//!
//! Layered configuration and observability (logging and Prometheus metrics)
//! used by the insight binaries.

pub mod config;
pub mod observability;
