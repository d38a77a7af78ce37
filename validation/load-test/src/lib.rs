//! Parallel load client for the convolution front service.
//!
//! This crate provides tools to:
//! - Resolve the client configuration from flags and the environment
//! - Build convolution requests from generated or typed-in matrices
//! - Fire many requests concurrently and time each round-trip
//! - Log per-request results and summarize the run

pub mod config;
pub mod generator;
pub mod manual;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::{Args, ClientConfig, DispatchSettings, OutputFormat, ValueMode};
pub use generator::{BuiltRequest, RequestBuilder};
pub use manual::ManualInput;
pub use metrics::{MetricsCollector, RunSummary};
pub use report::ResultsReport;
pub use runner::{Dispatcher, LifecycleOutcome, LifecycleStatus, RunResults};
pub use transport::{ConvolutionService, HttpFrontClient};
