use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use twiga_common::{Error, Result};

const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// OpenAI `/v1/embeddings` provider. Any API speaking the same protocol
/// (Together, local servers) works through `base_url`.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEmbeddingProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }

    fn build_request_body(&self, texts: &[String]) -> EmbeddingRequest {
        EmbeddingRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
            encoding_format: "float".to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.build_request_body(texts))
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "embedding request failed: status={status}, body={body}"
            )));
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("failed to decode embedding response: {e}")))?;

        payload.into_vectors(texts.len())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let texts = vec![text.to_string()];
        let mut embeddings = self.embed_documents(&texts).await?;
        embeddings
            .pop()
            .ok_or_else(|| Error::Embedding("no embedding returned for query".into()))
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    encoding_format: String,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    /// Vectors in input order. The API may return entries out of order.
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Vec<f32>>> {
        if self.data.len() != expected {
            return Err(Error::Embedding(format!(
                "expected {expected} embeddings, got {}",
                self.data.len()
            )));
        }
        self.data.sort_by_key(|d| d.index);
        Ok(self.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn builds_expected_request_shape() {
        let provider = OpenAiEmbeddingProvider::new("test-key", None, None);
        let body = provider.build_request_body(&["hello".to_string(), "world".to_string()]);
        assert_eq!(body.model, DEFAULT_MODEL);
        assert_eq!(body.encoding_format, "float");
        assert_eq!(body.input.len(), 2);
    }

    #[test]
    fn response_is_reordered_by_index() {
        let payload: EmbeddingResponse = serde_json::from_value(json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        }))
        .expect("json should parse");

        let vectors = payload.into_vectors(2).expect("two vectors");
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn count_mismatch_is_an_error() {
        let payload: EmbeddingResponse =
            serde_json::from_value(json!({ "data": [] })).expect("json should parse");
        assert!(payload.into_vectors(1).is_err());
    }

    #[test]
    fn endpoint_is_normalized_without_double_slashes() {
        let provider =
            OpenAiEmbeddingProvider::new("k", None, Some("https://api.example.com/".into()));
        assert_eq!(provider.endpoint(), "https://api.example.com/v1/embeddings");
    }

    #[tokio::test]
    async fn embed_query_calls_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({ "input": ["rivers"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "index": 0, "embedding": [0.25, 0.5, 0.25] }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiEmbeddingProvider::new("test-key", None, Some(server.uri()));
        let vector = provider.embed_query("rivers").await.expect("embedding");
        assert_eq!(vector, vec![0.25, 0.5, 0.25]);
    }

    #[tokio::test]
    async fn api_error_maps_to_embedding_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider = OpenAiEmbeddingProvider::new("k", None, Some(server.uri()));
        let err = provider.embed_query("x").await.expect_err("should fail");
        assert!(matches!(err, Error::Embedding(ref m) if m.contains("429")));
    }
}
