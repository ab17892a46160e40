//! Chat completion client.
//!
//! Sends an OpenAI-compatible `POST <base>/chat/completions` request built
//! from a persona system prompt, the retrieved context, prior turns, and
//! the new user message, and returns `choices[0].message.content`.
//!
//! Chat calls are not retried: a reply is user-facing and the caller
//! decides how to surface a failure.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::{ChatConfig, Config};
use crate::embedding::snippet;
use crate::models::{ChatTurn, Role};
use crate::provider::{self, ProviderKind};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat provider unavailable at {endpoint} (status {status:?}): {detail}")]
    ProviderUnavailable {
        endpoint: String,
        status: Option<u16>,
        detail: String,
    },
    #[error("malformed chat response from {endpoint}: {detail}")]
    MalformedResponse { endpoint: String, detail: String },
    #[error("chat provider misconfigured: {0}")]
    Config(String),
}

/// Produces a reply grounded in `context`.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(
        &self,
        message: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> Result<String, ChatError>;
}

/// One message in the wire request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
}

impl WireMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Instructions that keep the model on the persona's own material.
pub fn system_prompt(persona: &str, refusal: &str) -> String {
    format!(
        "You are the personal website chatbot for {persona}. Answer ONLY using the provided CONTEXT \
         (from {persona}'s resume and site content). If a question is outside {persona}'s professional \
         background or cannot be answered from CONTEXT, politely refuse with a brief message such as: \
         '{refusal}' Never use outside knowledge and never speculate. Default to very brief answers: \
         2-4 sentences or up to 3 short bullets. Do not quote or copy sentences verbatim from CONTEXT; \
         paraphrase and synthesize key points in your own words. Use a friendly, professional, \
         conversational tone. Expand with more detail ONLY if the user explicitly asks. If asked for a \
         photo or headshot, return the direct link found in CONTEXT."
    )
}

/// Assemble the message list in request order.
///
/// Only the most recent `max_history` turns are kept.
pub fn build_messages(
    config: &ChatConfig,
    message: &str,
    context: &str,
    history: &[ChatTurn],
) -> Vec<WireMessage> {
    let skip = history.len().saturating_sub(config.max_history);
    let mut messages = Vec::with_capacity(history.len() - skip + 3);

    messages.push(WireMessage::new(
        "system",
        system_prompt(&config.persona, &config.refusal),
    ));
    messages.push(WireMessage::new("system", format!("CONTEXT:\n{}", context)));
    for turn in &history[skip..] {
        messages.push(WireMessage::new(role_name(turn.role), turn.content.clone()));
    }
    messages.push(WireMessage::new("user", message));
    messages
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for OpenAI-compatible chat completion endpoints.
pub struct HttpChatClient {
    client: reqwest::Client,
    kind: ProviderKind,
    model: String,
    config: ChatConfig,
}

impl HttpChatClient {
    pub fn from_config(config: &Config) -> Result<Self, ChatError> {
        let kind = provider::resolve_chat(config);
        let model = kind.chat_model(&config.chat.model);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.chat.timeout_secs))
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;

        tracing::debug!(?kind, model = %model, "chat provider resolved");

        Ok(Self {
            client,
            kind,
            model,
            config: config.chat.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatCompleter for HttpChatClient {
    async fn complete(
        &self,
        message: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> Result<String, ChatError> {
        let endpoint = self.kind.chat_endpoint();
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            ChatError::Config("CHAT_API_KEY (or OPENAI_API_KEY) not set".to_string())
        })?;

        let body = ChatRequest {
            model: &self.model,
            messages: build_messages(&self.config, message, context, history),
            temperature: self.config.temperature,
            frequency_penalty: self.config.frequency_penalty,
            presence_penalty: self.config.presence_penalty,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.config.site_url)
            .header("X-Title", &self.config.site_name)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::ProviderUnavailable {
                endpoint: endpoint.clone(),
                status: None,
                detail: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return Err(ChatError::ProviderUnavailable {
                    endpoint,
                    status: Some(status.as_u16()),
                    detail: format!("failed to read body: {}", e),
                });
            }
        };

        if !status.is_success() {
            return Err(ChatError::ProviderUnavailable {
                endpoint,
                status: Some(status.as_u16()),
                detail: snippet(&text, 300),
            });
        }

        let malformed = |detail: String| ChatError::MalformedResponse {
            endpoint: endpoint.clone(),
            detail,
        };

        if !content_type.contains("application/json") {
            return Err(malformed(format!(
                "non-JSON content-type '{}': {}",
                content_type,
                snippet(&text, 300)
            )));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| malformed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| malformed("no choices[0].message.content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn test_config(base_url: String) -> Config {
        let mut cfg = Config::default();
        cfg.chat.base_url = base_url;
        cfg.chat.api_key = Some("sk-chat".to_string());
        cfg.chat.persona = "Sam".to_string();
        cfg
    }

    #[test]
    fn test_message_order() {
        let cfg = ChatConfig::default();
        let history = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello!")];
        let messages = build_messages(&cfg, "what do you do?", "Source: a\n-----\nx", &history);

        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "system", "user", "assistant", "user"]);
        assert!(messages[0].content.contains(&cfg.persona));
        assert_eq!(messages[1].content, "CONTEXT:\nSource: a\n-----\nx");
        assert_eq!(messages[4].content, "what do you do?");
    }

    #[test]
    fn test_history_truncated_to_most_recent() {
        let mut cfg = ChatConfig::default();
        cfg.max_history = 2;
        let history: Vec<ChatTurn> = (0..5).map(|i| ChatTurn::user(format!("turn {}", i))).collect();
        let messages = build_messages(&cfg, "now", "", &history);
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[2].content, "turn 3");
        assert_eq!(messages[3].content, "turn 4");
    }

    #[test]
    fn test_empty_context_still_sent() {
        let messages = build_messages(&ChatConfig::default(), "q", "", &[]);
        assert_eq!(messages[1].content, "CONTEXT:\n");
    }

    #[tokio::test]
    async fn test_completion_request_and_reply() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/chat/completions")
                    .header("Authorization", "Bearer sk-chat")
                    .body_contains("\"model\":\"openrouter/auto\"")
                    .body_contains("\"max_tokens\":250")
                    .body_contains("CONTEXT:\\nctx");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(
                        json!({ "choices": [{ "message": { "role": "assistant", "content": "I build things." } }] })
                            .to_string(),
                    );
            })
            .await;

        let client = HttpChatClient::from_config(&test_config(server.url("/api/v1"))).unwrap();
        let reply = client.complete("what do you do?", "ctx", &[]).await.unwrap();
        assert_eq!(reply, "I build things.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_base_normalizes_model() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/chat/completions")
                    .body_contains("\"model\":\"gpt-4o-mini\"");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(json!({ "choices": [{ "message": { "content": "ok" } }] }).to_string());
            })
            .await;

        let client = HttpChatClient::from_config(&test_config(server.url("/openai"))).unwrap();
        assert_eq!(client.model(), "gpt-4o-mini");
        assert_eq!(client.complete("q", "", &[]).await.unwrap(), "ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upstream_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500).body("upstream exploded");
            })
            .await;

        let client = HttpChatClient::from_config(&test_config(server.url("/v1"))).unwrap();
        let err = client.complete("q", "", &[]).await.unwrap_err();
        match err {
            ChatError::ProviderUnavailable { status, detail, .. } => {
                assert_eq!(status, Some(500));
                assert_eq!(detail, "upstream exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_truncated_reply_is_provider_error() {
        let base = crate::embedding::truncated_body_server("HTTP/1.1 200 OK").await;
        let client = HttpChatClient::from_config(&test_config(format!("{}/v1", base))).unwrap();
        match client.complete("q", "", &[]).await.unwrap_err() {
            ChatError::ProviderUnavailable { status, detail, .. } => {
                assert_eq!(status, Some(200));
                assert!(detail.starts_with("failed to read body"), "{}", detail);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_html_reply_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200)
                    .header("content-type", "text/html")
                    .body("<html></html>");
            })
            .await;

        let client = HttpChatClient::from_config(&test_config(server.url("/v1"))).unwrap();
        let err = client.complete("q", "", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_missing_choices_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(json!({ "choices": [] }).to_string());
            })
            .await;

        let client = HttpChatClient::from_config(&test_config(server.url("/v1"))).unwrap();
        let err = client.complete("q", "", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let mut cfg = test_config("http://127.0.0.1:9/v1".to_string());
        cfg.chat.api_key = None;
        let client = HttpChatClient::from_config(&cfg).unwrap();
        let err = client.complete("q", "", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }
}
