//! HTTP adapters for the worker surface and the metric endpoint.

pub mod metric_source;
pub mod worker_client;

pub use metric_source::HttpMetricSource;
pub use worker_client::HttpWorkerClient;
