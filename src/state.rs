//! # Application State Management
//!
//! Shared state handed to every HTTP handler through `web::Data<AppState>`.
//!
//! ## What lives here:
//! - **config**: Immutable after startup, so a plain `Arc` is enough
//! - **jobs**: The job registry (internally an `Arc<RwLock<..>>`)
//! - **runner**: Starts background jobs against the shared pipeline
//! - **pipeline**: Transcriber, HTTP client and admission slots, shared by sync requests
//!   and background jobs alike
//! - **metrics**: Request counters updated by the metrics middleware
//!
//! ## Arc<RwLock<T>> Pattern
//! Every field is cheap to clone: actix builds one `App` per worker thread and each gets
//! a clone of the state, but all clones point at the same registry, pipeline and metrics.

use crate::config::AppConfig;
use crate::jobs::{JobRegistry, JobRunner};
use crate::pipeline::Pipeline;
use crate::transcription::Transcriber;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jobs: JobRegistry,
    pub runner: JobRunner,
    pub pipeline: Arc<Pipeline>,
    /// Updated on every request by `MetricsMiddleware`
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub start_time: Instant,
}

/// Request metrics collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    /// Keyed by method and route pattern, e.g. "GET /status/{job_id}"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Build the state around an already initialized transcriber.
    ///
    /// One HTTP client is shared by every download and upload so connections are pooled.
    pub fn new(config: AppConfig, transcriber: Arc<dyn Transcriber>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let jobs = JobRegistry::new();
        let pipeline = Arc::new(Pipeline::new(transcriber, client, &config));
        let runner = JobRunner::new(jobs.clone(), pipeline.clone());

        Ok(Self {
            config: Arc::new(config),
            jobs,
            runner,
            pipeline,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        })
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.error_count += 1;
    }

    /// Record one finished request against its endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Copy of the current metrics, so no lock is held while serializing a response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::testing::ScriptedTranscriber;

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default(), Arc::new(ScriptedTranscriber::succeeding())).unwrap();
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let health = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(health.request_count, 2);
        assert_eq!(health.average_duration_ms(), 20.0);
        assert_eq!(health.error_rate(), 0.5);
    }

    #[test]
    fn test_empty_metric_rates() {
        let metric = EndpointMetric::default();
        assert_eq!(metric.average_duration_ms(), 0.0);
        assert_eq!(metric.error_rate(), 0.0);
    }
}
