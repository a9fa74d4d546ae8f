//! Binary-side wiring around the `callgate` core.
//!
//! - [`config`] - CLI / environment configuration.
//! - [`service`] - The tonic `Echo` service and its callgate handlers.
//! - [`telemetry`] - Logging, tracing and metrics setup.

pub mod config;
pub mod service;
pub mod telemetry;
