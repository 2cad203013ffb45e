// src/core/model/http.rs

//! HTTP clients for OpenAI-compatible embedding and chat-completion
//! endpoints. Transport failures surface as [`RagError::Http`]; individual
//! calls are not retried automatically.

use crate::core::common::{RagError, Result};
use crate::core::model::{Embedder, Reasoner};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Embedding client posting to `{base_url}/embeddings`.
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    /// Creates a client for the given endpoint and model. Every returned
    /// vector is checked against `dimension`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        batch
            .pop()
            .ok_or_else(|| RagError::Serialization("embeddings response was empty".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingsRequest { model: &self.model, input: texts };
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingsResponse>()
            .await?;

        if response.data.len() != texts.len() {
            return Err(RagError::Serialization(format!(
                "embeddings response had {} vectors for {} inputs",
                response.data.len(),
                texts.len()
            )));
        }

        let mut items = response.data;
        items.sort_by_key(|item| item.index);

        let mut vectors = Vec::with_capacity(items.len());
        for item in items {
            if item.embedding.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: item.embedding.len(),
                });
            }
            vectors.push(item.embedding);
        }
        Ok(vectors)
    }
}

/// Reasoning client posting chat completions with a JSON response format.
pub struct HttpReasoner {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl HttpReasoner {
    /// Creates a client for the given endpoint and model.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.0,
        }
    }

    /// Overrides the sampling temperature (defaults to 0.0 for extraction
    /// stability).
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn extract(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: self.temperature,
            response_format: ResponseFormat { format_type: "json_object" },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RagError::Serialization("chat response had no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let embedder = HttpEmbedder::new("http://localhost:8080/v1/", "key", "embed-model", 384);
        assert_eq!(embedder.base_url, "http://localhost:8080/v1");
        assert_eq!(embedder.dimension(), 384);

        let reasoner = HttpReasoner::new("http://localhost:8080/v1/", "key", "chat-model");
        assert_eq!(reasoner.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_embeddings_response_parsing() {
        let raw = r#"{"data": [
            {"index": 1, "embedding": [0.3, 0.4]},
            {"index": 0, "embedding": [0.1, 0.2]}
        ]}"#;
        let mut response: EmbeddingsResponse = serde_json::from_str(raw).unwrap();
        response.data.sort_by_key(|item| item.index);
        assert_eq!(response.data[0].embedding, vec![0.1, 0.2]);
        assert_eq!(response.data[1].embedding, vec![0.3, 0.4]);
    }

    #[test]
    fn test_chat_response_parsing() {
        let raw = r#"{"choices": [{"message": {"content": "{\"entities\": []}"}}]}"#;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.choices[0].message.content, "{\"entities\": []}");
    }

    #[tokio::test]
    async fn test_empty_batch_short_circuits() {
        // No server needed: an empty input returns before any request.
        let embedder = HttpEmbedder::new("http://localhost:1", "key", "embed-model", 4);
        let vectors = embedder.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
