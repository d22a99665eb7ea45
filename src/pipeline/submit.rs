//! Job submission: POST the payload to the job-launching endpoint.
//!
//! The endpoint expects `{"input": "<json-string>"}` where the inner string
//! is itself the JSON document `{"image_data": "<base64>"}`. A 2xx response
//! must carry an `executionArn`; without one the job is unreachable and the
//! submission counts as failed.

use crate::error::AnalysisError;
use crate::output::JobHandle;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "executionArn")]
    execution_arn: Option<String>,
}

/// Build the request body for a base64 payload.
pub fn build_request_body(image_base64: &str) -> Value {
    let input = json!({ "image_data": image_base64 }).to_string();
    json!({ "input": input })
}

/// Submit a validated payload and return the job handle.
///
/// # Errors
/// * [`AnalysisError::Submission`]: network failure or non-2xx response
/// * [`AnalysisError::MissingJobHandle`]: 2xx without an `executionArn`
pub async fn submit_job(
    client: &reqwest::Client,
    endpoint: &str,
    image_base64: &str,
) -> Result<JobHandle, AnalysisError> {
    debug!("Submitting {} byte payload to {}", image_base64.len(), endpoint);

    let response = client
        .post(endpoint)
        .json(&build_request_body(image_base64))
        .send()
        .await
        .map_err(|e| AnalysisError::Submission {
            detail: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AnalysisError::Submission {
            detail: format!("API Error: HTTP {status}\nResponse: {body}"),
        });
    }

    let body: SubmitResponse = response
        .json()
        .await
        .map_err(|e| AnalysisError::Submission {
            detail: format!("unreadable submission response: {e}"),
        })?;

    match body.execution_arn {
        Some(arn) if !arn.is_empty() => {
            info!("Analysis started: {}", arn);
            Ok(JobHandle::new(arn))
        }
        _ => Err(AnalysisError::MissingJobHandle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    #[test]
    fn request_body_double_encodes_input() {
        let body = build_request_body("aGVsbG8=");
        let input = body["input"].as_str().expect("input is a string");
        assert_eq!(input, r#"{"image_data":"aGVsbG8="}"#);
    }

    #[tokio::test]
    async fn returns_handle_on_success() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/prod/track"))
            .and(matchers::header("content-type", "application/json"))
            .and(matchers::body_json(build_request_body("QUJD")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "executionArn": "arn:exec:1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let handle = submit_job(&client, &format!("{}/prod/track", server.uri()), "QUJD")
            .await
            .unwrap();
        assert_eq!(handle.as_str(), "arn:exec:1");
    }

    #[tokio::test]
    async fn missing_arn_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = submit_job(&reqwest::Client::new(), &server.uri(), "QUJD")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingJobHandle), "got {err:?}");
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(413).set_body_string("Request Entity Too Large"))
            .mount(&server)
            .await;

        let err = submit_job(&reqwest::Client::new(), &server.uri(), "QUJD")
            .await
            .unwrap_err();
        match err {
            AnalysisError::Submission { detail } => {
                assert!(detail.contains("413"), "got {detail}");
                assert!(detail.contains("Request Entity Too Large"));
            }
            other => panic!("expected Submission, got {other:?}"),
        }
    }
}
