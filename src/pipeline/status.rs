//! Job-status queries.
//!
//! The status service is reached out of band from submission, keyed by the
//! job handle. [`JobStatusSource`] is the seam: production code uses
//! [`HttpStatusSource`], tests plug in a scripted source.

use crate::error::AnalysisError;
use crate::output::{JobHandle, RemoteStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One status observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: RemoteStatus,
    /// JSON-encoded workflow output, present on success.
    #[serde(default)]
    pub output: Option<String>,
    /// Error name, present on failure.
    #[serde(default)]
    pub error: Option<String>,
    /// Longer failure explanation, when the service provides one.
    #[serde(default)]
    pub cause: Option<String>,
}

impl StatusReport {
    pub fn running() -> Self {
        Self {
            status: RemoteStatus::Running,
            output: None,
            error: None,
            cause: None,
        }
    }

    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Succeeded,
            output: Some(output.into()),
            ..Self::running()
        }
    }

    pub fn failed(status: RemoteStatus, error: Option<String>) -> Self {
        Self {
            status,
            error,
            ..Self::running()
        }
    }

    /// Failure detail: `error`, `cause`, or both; "Unknown error" if neither.
    pub fn error_detail(&self) -> String {
        match (self.error.as_deref(), self.cause.as_deref()) {
            (Some(e), Some(c)) if !c.is_empty() => format!("{e}: {c}"),
            (Some(e), _) => e.to_string(),
            (None, Some(c)) => c.to_string(),
            (None, None) => "Unknown error".to_string(),
        }
    }
}

/// Anything that can report the status of a job by handle.
///
/// An `Err` means the status could not be determined (network failure,
/// malformed response); the poll loop treats it as terminal.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn describe(&self, handle: &JobHandle) -> Result<StatusReport, AnalysisError>;
}

/// Request body sent to the status endpoint.
#[derive(Debug, Serialize)]
struct DescribeRequest<'a> {
    #[serde(rename = "executionArn")]
    execution_arn: &'a str,
}

/// Status source backed by an HTTP endpoint.
///
/// POSTs `{"executionArn": "<handle>"}` and expects a JSON body with
/// `status`, and optionally `output`, `error` and `cause`.
pub struct HttpStatusSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStatusSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl JobStatusSource for HttpStatusSource {
    async fn describe(&self, handle: &JobHandle) -> Result<StatusReport, AnalysisError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&DescribeRequest {
                execution_arn: handle.as_str(),
            })
            .send()
            .await
            .map_err(|e| AnalysisError::StatusQuery {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::StatusQuery {
                detail: format!("HTTP {status}: {body}"),
            });
        }

        let report: StatusReport =
            response
                .json()
                .await
                .map_err(|e| AnalysisError::StatusQuery {
                    detail: format!("unreadable status response: {e}"),
                })?;
        debug!("Job {} status {:?}", handle, report.status);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    #[test]
    fn error_detail_defaults_to_unknown() {
        let report = StatusReport::failed(RemoteStatus::Failed, None);
        assert_eq!(report.error_detail(), "Unknown error");
    }

    #[test]
    fn error_detail_joins_error_and_cause() {
        let mut report = StatusReport::failed(RemoteStatus::Failed, Some("Lambda.Unknown".into()));
        report.cause = Some("Task timed out".into());
        assert_eq!(report.error_detail(), "Lambda.Unknown: Task timed out");
    }

    #[tokio::test]
    async fn http_source_parses_report() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/status"))
            .and(matchers::body_json(json!({ "executionArn": "arn:1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "SUCCEEDED",
                "output": "{\"visual_analysis\":{}}"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source =
            HttpStatusSource::new(format!("{}/status", server.uri()), Duration::from_secs(5))
                .unwrap();
        let report = source.describe(&JobHandle::new("arn:1")).await.unwrap();
        assert_eq!(report.status, RemoteStatus::Succeeded);
        assert_eq!(report.output.as_deref(), Some("{\"visual_analysis\":{}}"));
    }

    #[tokio::test]
    async fn http_source_maps_server_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let source = HttpStatusSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = source.describe(&JobHandle::new("arn:1")).await.unwrap_err();
        match err {
            AnalysisError::StatusQuery { detail } => {
                assert!(detail.contains("503"), "got {detail}");
                assert!(detail.contains("unavailable"));
            }
            other => panic!("expected StatusQuery, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_source_rejects_garbage_body() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let source = HttpStatusSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            source.describe(&JobHandle::new("arn:1")).await,
            Err(AnalysisError::StatusQuery { .. })
        ));
    }
}
