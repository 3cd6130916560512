//! Client for the hosted chest x-ray classification endpoint.

use copilot_flow::RetryPolicy;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::Classification;

/// Positional output labels of the model and the condition each one stands for.
pub const LABEL_MAPPING: [(&str, &str); 5] = [
    ("LABEL_0", "Cardiomegaly"),
    ("LABEL_1", "Edema"),
    ("LABEL_2", "Consolidation"),
    ("LABEL_3", "Pneumonia"),
    ("LABEL_4", "No Finding"),
];

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("CLASSIFIER_API_KEY not set")]
    MissingApiKey,

    #[error("Request to classifier failed: {0}")]
    Transport(String),

    #[error("Classifier answered with status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid response from classifier: {0}")]
    InvalidBody(String),

    #[error("No valid findings in classifier output")]
    NoValidFindings,
}

impl ClassifierError {
    pub fn code(&self) -> &'static str {
        match self {
            ClassifierError::MissingApiKey => "missing_api_key",
            ClassifierError::Transport(_) => "transport",
            ClassifierError::HttpStatus { .. } => "http_status",
            ClassifierError::InvalidBody(_) => "invalid_body",
            ClassifierError::NoValidFindings => "no_valid_findings",
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "error": self.code(), "detail": self.to_string() })
    }
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoreBody {
    List(Vec<LabelScore>),
    Map(HashMap<String, f64>),
}

/// Raw answer of one POST, before interpretation.
struct RawResponse {
    status: StatusCode,
    body: String,
}

pub struct ImageClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl ImageClassifier {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key,
            retry: RetryPolicy::cold_start(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Score an image and map the model's labels to condition names.
    pub async fn classify(&self, image_url: &str) -> Result<Classification, ClassifierError> {
        let api_key = self.api_key.as_deref().ok_or(ClassifierError::MissingApiKey)?;
        let payload = json!({ "inputs": image_url });

        info!(image_url = %image_url, "Requesting image classification");

        let outcome = self
            .retry
            .run_while(
                "image_classification",
                |attempt| {
                    let request = self
                        .http
                        .post(&self.endpoint)
                        .bearer_auth(api_key)
                        .header("Accept", "application/json")
                        .json(&payload);
                    async move {
                        let response = request.send().await.map_err(|e| {
                            warn!(attempt, error = %e, "Classifier request failed");
                            ClassifierError::Transport(e.to_string())
                        })?;
                        let status = response.status();
                        let body = response
                            .text()
                            .await
                            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
                        Ok::<_, ClassifierError>(RawResponse { status, body })
                    }
                },
                |result: &Result<RawResponse, ClassifierError>| {
                    matches!(result, Ok(raw) if raw.status == StatusCode::SERVICE_UNAVAILABLE)
                },
            )
            .await;

        let raw = outcome.value?;
        info!(
            status = raw.status.as_u16(),
            attempts = outcome.attempts,
            "Classifier responded"
        );

        if !raw.status.is_success() {
            return Err(ClassifierError::HttpStatus {
                status: raw.status.as_u16(),
                body: raw.body,
            });
        }

        let parsed: ScoreBody = serde_json::from_str(&raw.body)
            .map_err(|_| ClassifierError::InvalidBody(raw.body.clone()))?;
        remap_labels(parsed)
    }
}

fn condition_for(label: &str) -> Option<&'static str> {
    LABEL_MAPPING
        .iter()
        .find(|(raw, _)| *raw == label)
        .map(|(_, name)| *name)
}

/// Unknown labels are dropped; nothing recognised is an error, not an empty map.
fn remap_labels(body: ScoreBody) -> Result<Classification, ClassifierError> {
    let pairs: Vec<(String, f64)> = match body {
        ScoreBody::List(items) => items.into_iter().map(|i| (i.label, i.score)).collect(),
        ScoreBody::Map(map) => map.into_iter().collect(),
    };

    let classification: Classification = pairs
        .into_iter()
        .filter_map(|(label, score)| condition_for(&label).map(|name| (name.to_string(), score)))
        .collect();

    if classification.is_empty() {
        Err(ClassifierError::NoValidFindings)
    } else {
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn classifier(server: &MockServer, key: Option<&str>) -> ImageClassifier {
        ImageClassifier::new(reqwest::Client::new(), server.uri(), key.map(str::to_string))
            .with_retry(RetryPolicy::fixed(12, Duration::from_millis(5)))
    }

    #[tokio::test]
    async fn test_retries_while_warming_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer hf_test"))
            .and(body_json(json!({ "inputs": "https://img/1.jpg" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "label": "LABEL_3", "score": 0.9 }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = classifier(&server, Some("hf_test"))
            .classify("https://img/1.jpg")
            .await
            .unwrap();

        assert_eq!(result, Classification::from([("Pneumonia".to_string(), 0.9)]));
    }

    #[tokio::test]
    async fn test_gives_up_and_surfaces_last_503() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("still loading"))
            .expect(3)
            .mount(&server)
            .await;

        let err = classifier(&server, Some("k"))
            .with_retry(RetryPolicy::fixed(3, Duration::ZERO))
            .classify("https://img/1.jpg")
            .await
            .unwrap_err();

        assert!(matches!(err, ClassifierError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_only_unknown_labels_is_no_valid_findings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "label": "LABEL_9", "score": 0.4 },
                { "label": "pneumothorax", "score": 0.8 }
            ])))
            .mount(&server)
            .await;

        let err = classifier(&server, Some("k"))
            .classify("https://img/1.jpg")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "no_valid_findings");
    }

    #[tokio::test]
    async fn test_map_body_and_unknown_labels_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "LABEL_0": 0.61, "LABEL_4": 0.12, "LABEL_7": 0.99
            })))
            .mount(&server)
            .await;

        let result = classifier(&server, Some("k"))
            .classify("https://img/2.jpg")
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result["Cardiomegaly"], 0.61);
        assert_eq!(result["No Finding"], 0.12);
    }

    #[tokio::test]
    async fn test_error_status_and_non_json_are_tagged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;
        let err = classifier(&server, Some("k")).classify("u").await.unwrap_err();
        assert_eq!(err.code(), "invalid_body");

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;
        let err = classifier(&server, Some("k")).classify("u").await.unwrap_err();
        assert!(matches!(err, ClassifierError::HttpStatus { status: 401, .. }));
        assert_eq!(err.to_json()["error"], "http_status");
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = classifier(&server, None).classify("u").await.unwrap_err();
        assert!(matches!(err, ClassifierError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let classifier = ImageClassifier::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/unreachable",
            Some("k".into()),
        )
        .with_retry(RetryPolicy::once());
        let err = classifier.classify("u").await.unwrap_err();
        assert_eq!(err.code(), "transport");
    }
}
