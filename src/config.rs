//! Configuration for screenshot normalization and job orchestration.
//!
//! Every knob lives in [`AnalysisConfig`], built via [`AnalysisConfigBuilder`].
//! The defaults are the limits the remote service enforces; change them only
//! when pointing at a deployment with different ceilings.

use crate::error::AnalysisError;
use crate::pipeline::status::JobStatusSource;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Encoded-image ceiling in bytes.
pub const DEFAULT_MAX_ENCODED_BYTES: usize = 250_000;
/// Base64 wire-payload ceiling in bytes. Kept below the service's 262 144
/// hard limit to leave room for the JSON envelope.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 262_000;
/// Bounded-resize cap applied to both dimensions.
pub const DEFAULT_MAX_DIMENSION: u32 = 500;
/// Aggressive-compression caps, tried in order.
pub const DEFAULT_FALLBACK_DIMENSIONS: [u32; 3] = [400, 300, 200];
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;

/// Environment variable consulted for the status endpoint when none is configured.
pub const STATUS_ENDPOINT_ENV: &str = "SHOT_INSIGHT_STATUS_ENDPOINT";

/// The pair of byte ceilings no payload may exceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBudget {
    /// Maximum size of the encoded PNG.
    pub encoded: usize,
    /// Maximum size of the base64 payload sent over the wire.
    pub payload: usize,
}

impl Default for SizeBudget {
    fn default() -> Self {
        Self {
            encoded: DEFAULT_MAX_ENCODED_BYTES,
            payload: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Configuration for one analysis request.
///
/// # Example
/// ```rust
/// use screenshot_insight::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .submit_endpoint("https://example.com/prod/track")
///     .status_endpoint("https://example.com/prod/status")
///     .max_poll_attempts(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_poll_attempts, 10);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Job-launching endpoint (HTTP POST). Required for `analyze*`.
    pub submit_endpoint: Option<String>,

    /// Job-status endpoint used to build an
    /// [`HttpStatusSource`](crate::pipeline::status::HttpStatusSource).
    pub status_endpoint: Option<String>,

    /// Pre-constructed status source. Takes precedence over `status_endpoint`.
    pub status_source: Option<Arc<dyn JobStatusSource>>,

    /// Encoded-image and wire-payload ceilings.
    pub budget: SizeBudget,

    /// Bounded-resize cap (both dimensions). Default: 500.
    pub max_dimension: u32,

    /// Aggressive-compression caps, strictly decreasing. Default: 400, 300, 200.
    pub fallback_dimensions: Vec<u32>,

    /// Fixed delay between status queries. Default: 2000 ms.
    pub poll_interval_ms: u64,

    /// Status queries before giving up on a running job. Default: 30.
    ///
    /// The longest a request can wait is roughly
    /// `max_poll_attempts × poll_interval_ms` plus request latency.
    pub max_poll_attempts: u32,

    /// Per-HTTP-request timeout. Default: 30 s.
    pub request_timeout_secs: u64,

    /// Optional lifecycle observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            submit_endpoint: None,
            status_endpoint: None,
            status_source: None,
            budget: SizeBudget::default(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            fallback_dimensions: DEFAULT_FALLBACK_DIMENSIONS.to_vec(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            request_timeout_secs: 30,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("submit_endpoint", &self.submit_endpoint)
            .field("status_endpoint", &self.status_endpoint)
            .field(
                "status_source",
                &self.status_source.as_ref().map(|_| "<dyn JobStatusSource>"),
            )
            .field("budget", &self.budget)
            .field("max_dimension", &self.max_dimension)
            .field("fallback_dimensions", &self.fallback_dimensions)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn submit_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.submit_endpoint = Some(url.into());
        self
    }

    pub fn status_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.status_endpoint = Some(url.into());
        self
    }

    pub fn status_source(mut self, source: Arc<dyn JobStatusSource>) -> Self {
        self.config.status_source = Some(source);
        self
    }

    pub fn max_encoded_bytes(mut self, n: usize) -> Self {
        self.config.budget.encoded = n;
        self
    }

    pub fn max_payload_bytes(mut self, n: usize) -> Self {
        self.config.budget.payload = n;
        self
    }

    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = px;
        self
    }

    pub fn fallback_dimensions(mut self, caps: impl Into<Vec<u32>>) -> Self {
        self.config.fallback_dimensions = caps.into();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn max_poll_attempts(mut self, n: u32) -> Self {
        self.config.max_poll_attempts = n;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, AnalysisError> {
        let c = &self.config;
        if c.budget.encoded == 0 || c.budget.payload == 0 {
            return Err(AnalysisError::InvalidConfig(
                "Size budgets must be ≥ 1 byte".into(),
            ));
        }
        if c.max_dimension == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_dimension must be ≥ 1".into(),
            ));
        }
        if c.fallback_dimensions.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "At least one fallback dimension is required".into(),
            ));
        }
        let mut prev = c.max_dimension;
        for &cap in &c.fallback_dimensions {
            if cap == 0 || cap >= prev {
                return Err(AnalysisError::InvalidConfig(format!(
                    "Fallback dimensions must be strictly decreasing and below {}, got {:?}",
                    c.max_dimension, c.fallback_dimensions
                )));
            }
            prev = cap;
        }
        if c.max_poll_attempts == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_poll_attempts must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_limits() {
        let c = AnalysisConfig::default();
        assert_eq!(c.budget.encoded, 250_000);
        assert_eq!(c.budget.payload, 262_000);
        assert_eq!(c.max_dimension, 500);
        assert_eq!(c.fallback_dimensions, vec![400, 300, 200]);
        assert_eq!(c.max_poll_attempts, 30);
        assert_eq!(c.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn rejects_non_decreasing_fallbacks() {
        let err = AnalysisConfig::builder()
            .fallback_dimensions(vec![300, 400])
            .build()
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_fallback_at_max_dimension() {
        assert!(AnalysisConfig::builder()
            .max_dimension(400)
            .fallback_dimensions(vec![400, 200])
            .build()
            .is_err());
    }

    #[test]
    fn rejects_zero_attempts() {
        assert!(AnalysisConfig::builder().max_poll_attempts(0).build().is_err());
    }

    #[test]
    fn debug_hides_trait_objects() {
        let dbg = format!("{:?}", AnalysisConfig::default());
        assert!(dbg.contains("max_poll_attempts"));
        assert!(dbg.contains("status_source: None"));
    }
}
