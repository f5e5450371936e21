//! # Application State Management
//!
//! Shared state handed to every request handler through `web::Data`.
//!
//! ## Key Pieces:
//! - **config**: `Arc<RwLock<AppConfig>>`, readable by many requests at once
//!   and replaceable at runtime through `PUT /api/v1/config`
//! - **metrics**: request counters, per-endpoint timings, events per channel
//!   and failures per error code
//! - **orchestrator** / **user_contexts**: the domain services, shared
//!   behind `Arc` since handlers move them onto the blocking pool
//!
//! ## Lock Poisoning:
//! A handler that panics while holding a lock poisons it. The data behind
//! these locks stays consistent after any single write, so a poisoned lock
//! is recovered with `PoisonError::into_inner` instead of taking the whole
//! service down.

use crate::audio::Channel;
use crate::config::AppConfig;
use crate::context::UserContextService;
use crate::error::ErrorCode;
use crate::ingest::Orchestrator;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    pub metrics: Arc<RwLock<AppMetrics>>,

    pub orchestrator: Arc<Orchestrator>,

    pub user_contexts: Arc<UserContextService>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests and ingested events.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of requests answered with a 4xx or 5xx status
    pub error_count: u64,

    /// Key: endpoint name (e.g., "POST /api/v1/events")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,

    /// Successfully ingested events, keyed by channel name
    pub events_by_channel: HashMap<String, u64>,

    /// Failed ingestions, keyed by error code (e.g., "AUDIO_003")
    pub failures_by_code: HashMap<String, u64>,
}

/// Timing and error counts for one endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        orchestrator: Arc<Orchestrator>,
        user_contexts: Arc<UserContextService>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            orchestrator,
            user_contexts,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately so writers are not blocked
    /// while the caller works with the copy.
    pub fn get_config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> anyhow::Result<()> {
        new_config.validate()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = new_config;
        Ok(())
    }

    pub fn increment_request_count(&self) {
        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .error_count += 1;
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

    /// Record the outcome of one ingested event.
    ///
    /// Successes count toward their channel, failures toward their error
    /// code. Events that never got a channel (detection failed) only show up
    /// under their code.
    pub fn record_ingest_outcome(&self, channel: Option<Channel>, error_code: Option<ErrorCode>) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        match (channel, error_code) {
            (_, Some(code)) => {
                *metrics
                    .failures_by_code
                    .entry(code.as_str().to_string())
                    .or_insert(0) += 1;
            }
            (Some(channel), None) => {
                *metrics
                    .events_by_channel
                    .entry(channel.as_str().to_string())
                    .or_insert(0) += 1;
            }
            (None, None) => {}
        }
    }

    /// Consistent copy of the metrics, taken under a single read lock.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
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

    /// Fraction of requests that failed, between 0.0 and 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
