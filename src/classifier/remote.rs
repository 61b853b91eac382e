//! Remote (cloud) classification endpoint.

use crate::gesture::LandmarkVector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A classification returned by the remote endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteClassification {
    pub label: String,
    pub confidence: f64,
    pub suggestions: Vec<String>,
}

/// A cloud classifier the router can race against its timeout.
///
/// Any `Err` (transport, status, decode) makes the router fall back to the
/// offline classifier.
#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, vector: &LandmarkVector) -> anyhow::Result<RemoteClassification>;
}

/// Request body: the vector as a single landmark row.
#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    landmarks: [&'a [f64]; 1],
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(alias = "gesture")]
    label: String,
    confidence: f64,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// JSON-over-HTTP remote classifier.
pub struct HttpRemoteClassifier {
    endpoint: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl HttpRemoteClassifier {
    /// Create a client for `endpoint`. `request_timeout` bounds the whole
    /// request independently of the router's own race.
    pub fn new(endpoint: &str, api_token: Option<&str>, request_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_token: api_token.map(str::to_string),
            client: reqwest::Client::builder()
                .timeout(request_timeout)
                .connect_timeout(request_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteClassifier for HttpRemoteClassifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn classify(&self, vector: &LandmarkVector) -> anyhow::Result<RemoteClassification> {
        let body = ClassifyRequest {
            landmarks: [vector.as_slice()],
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("Remote classifier returned status {}", resp.status());
        }

        let parsed: ClassifyResponse = resp.json().await?;
        if !(0.0..=1.0).contains(&parsed.confidence) {
            anyhow::bail!(
                "Remote classifier returned out-of-range confidence {}",
                parsed.confidence
            );
        }
        if parsed.label.trim().is_empty() {
            anyhow::bail!("Remote classifier returned an empty label");
        }

        Ok(RemoteClassification {
            label: parsed.label,
            confidence: parsed.confidence,
            suggestions: parsed.suggestions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vector() -> LandmarkVector {
        LandmarkVector::new(vec![0.25, 0.75]).unwrap()
    }

    #[tokio::test]
    async fn posts_landmarks_and_parses_label() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "label": "more",
                "confidence": 0.92,
                "suggestions": ["more please"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let remote = HttpRemoteClassifier::new(
            &format!("{}/classify", server.uri()),
            Some("secret"),
            Duration::from_secs(5),
        );
        let result = remote.classify(&vector()).await.unwrap();
        assert_eq!(result.label, "more");
        assert!((result.confidence - 0.92).abs() < f64::EPSILON);
        assert_eq!(result.suggestions, vec!["more please".to_string()]);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body, serde_json::json!({ "landmarks": [[0.25, 0.75]] }));
    }

    #[tokio::test]
    async fn accepts_gesture_field_alias() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "gesture": "eat", "confidence": 0.4 })),
            )
            .mount(&server)
            .await;

        let remote = HttpRemoteClassifier::new(&server.uri(), None, Duration::from_secs(5));
        let result = remote.classify(&vector()).await.unwrap();
        assert_eq!(result.label, "eat");
        assert!(result.suggestions.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let remote = HttpRemoteClassifier::new(&server.uri(), None, Duration::from_secs(5));
        let err = remote.classify(&vector()).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "label": "eat", "confidence": 7.0 })),
            )
            .mount(&server)
            .await;

        let remote = HttpRemoteClassifier::new(&server.uri(), None, Duration::from_secs(5));
        assert!(remote.classify(&vector()).await.is_err());
    }
}
