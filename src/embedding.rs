//! Embedding client.
//!
//! [`Embedder`] is the seam ingestion and retrieval depend on;
//! [`HttpEmbedder`] implements it for both backends selected by
//! [`provider::resolve_embedding`](crate::provider::resolve_embedding):
//!
//! - **Local**: `POST <local_url>` with `{ "text": ... }`, expects
//!   `{ "embedding": [...] }`.
//! - **Remote**: `POST <base>/embeddings` with `{ "input", "model" }` and a
//!   bearer credential, expects `{ "data": [{ "embedding": [...] }] }`.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry
//! - Other non-2xx → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5), up to `max_retries`

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::provider::{self, ProviderKind};

/// Provider failures, shared shape with the chat client.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider unavailable at {endpoint} (status {status:?}): {detail}")]
    ProviderUnavailable {
        endpoint: String,
        status: Option<u16>,
        detail: String,
    },
    #[error("malformed embedding response from {endpoint}: {detail}")]
    MalformedResponse { endpoint: String, detail: String },
    #[error("embedding provider misconfigured: {0}")]
    Config(String),
}

/// Something that turns text into a vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Model identifier as sent to the provider.
    fn model_name(&self) -> &str;
}

#[derive(Deserialize)]
struct RemoteResponse {
    data: Vec<RemoteDatum>,
}

#[derive(Deserialize)]
struct RemoteDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct LocalResponse {
    embedding: Vec<f32>,
}

/// HTTP embedding client for the local and remote backends.
pub struct HttpEmbedder {
    client: reqwest::Client,
    kind: ProviderKind,
    model: String,
    api_key: Option<String>,
    site_url: String,
    site_name: String,
    max_retries: u32,
}

impl HttpEmbedder {
    /// Resolve the backend from `config` and build the client.
    ///
    /// A missing API key is not an error here; remote calls fail with
    /// [`EmbeddingError::Config`] instead, so a server can still start and
    /// degrade to answering without context.
    pub fn from_config(config: &Config) -> Result<Self, EmbeddingError> {
        let kind = provider::resolve_embedding(config);
        let model = kind.embedding_model(&config.embedding.model);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.embedding.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Config(format!("failed to build HTTP client: {}", e)))?;

        tracing::debug!(?kind, model = %model, "embedding provider resolved");

        Ok(Self {
            client,
            kind,
            model,
            api_key: config.embedding.api_key.clone(),
            site_url: config.chat.site_url.clone(),
            site_name: config.chat.site_name.clone(),
            max_retries: config.embedding.max_retries,
        })
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    fn request(&self, endpoint: &str, text: &str) -> Result<reqwest::RequestBuilder, EmbeddingError> {
        if self.kind.is_local() {
            return Ok(self
                .client
                .post(endpoint)
                .json(&serde_json::json!({ "text": text })));
        }

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            EmbeddingError::Config("EMBEDDING_API_KEY (or CHAT_API_KEY) not set".to_string())
        })?;

        Ok(self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.site_name)
            .json(&serde_json::json!({
                "input": text,
                "model": self.model,
            })))
    }

    async fn parse(&self, endpoint: &str, response: reqwest::Response) -> Result<Vec<f32>, EmbeddingError> {
        let malformed = |detail: String| EmbeddingError::MalformedResponse {
            endpoint: endpoint.to_string(),
            detail,
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| malformed(format!("failed to read body: {}", e)))?;

        if !content_type.contains("application/json") {
            return Err(malformed(format!(
                "non-JSON content-type '{}': {}",
                content_type,
                snippet(&body, 300)
            )));
        }

        let embedding = if self.kind.is_local() {
            serde_json::from_str::<LocalResponse>(&body)
                .map_err(|e| malformed(e.to_string()))?
                .embedding
        } else {
            serde_json::from_str::<RemoteResponse>(&body)
                .map_err(|e| malformed(e.to_string()))?
                .data
                .into_iter()
                .next()
                .ok_or_else(|| malformed("empty data array".to_string()))?
                .embedding
        };

        if embedding.is_empty() {
            return Err(malformed("empty embedding vector".to_string()));
        }
        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let endpoint = self.kind.embeddings_endpoint();
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.request(&endpoint, text)?.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return self.parse(&endpoint, response).await;
                    }

                    let detail = match response.text().await {
                        Ok(body) => snippet(&body, 300),
                        Err(e) => format!("failed to read body: {}", e),
                    };
                    let err = EmbeddingError::ProviderUnavailable {
                        endpoint: endpoint.clone(),
                        status: Some(status.as_u16()),
                        detail,
                    };

                    // Rate limited or server error; retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, attempt, "embedding request failed, retrying");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let detail = if e.is_timeout() {
                        "request timed out".to_string()
                    } else {
                        e.to_string()
                    };
                    last_err = Some(EmbeddingError::ProviderUnavailable {
                        endpoint: endpoint.clone(),
                        status: None,
                        detail,
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| EmbeddingError::ProviderUnavailable {
            endpoint,
            status: None,
            detail: "embedding failed after retries".to_string(),
        }))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// First `max` characters of a provider body, for error messages.
pub(crate) fn snippet(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}

/// Serves one response whose body stops short of its `content-length`.
#[cfg(test)]
pub(crate) async fn truncated_body_server(status_line: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        // Drain the whole request so closing the socket is a clean FIN.
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            if let Some(head_end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&request[..head_end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= head_end + 4 + length {
                    break;
                }
            }
        }
        let head = format!(
            "{}\r\ncontent-type: application/json\r\ncontent-length: 500\r\n\r\n{{\"choices\":",
            status_line
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{}", addr)
}
