//! Provider selection for embedding and chat calls.
//!
//! The backend is resolved once from configuration into a [`ProviderKind`],
//! and every per-vendor rule (base URL derivation, model id normalization)
//! hangs off that variant. Ingestion and query-time retrieval both go
//! through [`resolve_embedding`], so they always land in the same
//! embedding space for a given configuration.
//!
//! | Variant | Selected when | Model ids |
//! |---------|---------------|-----------|
//! | `Local` | local URL set and host is loopback | sent as `{ text }`, no model |
//! | `OpenAi` | base URL is `api.openai.com` or a gateway `/openai` route | `openai/` prefix stripped |
//! | `OpenRouter` | base URL mentions `openrouter` | passed through |
//! | `Generic` | anything else | passed through |

use reqwest::Url;

use crate::config::Config;

/// Chat alias substituted when an OpenRouter-only model id reaches OpenAI.
pub const OPENAI_CHAT_FALLBACK_MODEL: &str = "gpt-4o-mini";

const CLOUDFLARE_GATEWAY_HOST: &str = "gateway.ai.cloudflare.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// Local embedding service on a loopback host.
    Local { url: String },
    OpenAi { base_url: String },
    OpenRouter { base_url: String },
    Generic { base_url: String },
}

impl ProviderKind {
    /// Classify a remote base URL by vendor.
    pub fn remote(base_url: &str) -> Self {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let lower = base_url.to_lowercase();
        if lower.contains("api.openai.com") || has_path_segment(&lower, "openai") {
            ProviderKind::OpenAi { base_url }
        } else if lower.contains("openrouter") {
            ProviderKind::OpenRouter { base_url }
        } else {
            ProviderKind::Generic { base_url }
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ProviderKind::Local { .. })
    }

    /// URL the embedding request is POSTed to.
    pub fn embeddings_endpoint(&self) -> String {
        match self {
            ProviderKind::Local { url } => url.clone(),
            ProviderKind::OpenAi { base_url }
            | ProviderKind::OpenRouter { base_url }
            | ProviderKind::Generic { base_url } => format!("{}/embeddings", base_url),
        }
    }

    /// URL the chat request is POSTed to. Chat never targets `Local`.
    pub fn chat_endpoint(&self) -> String {
        match self {
            ProviderKind::Local { url } => url.clone(),
            ProviderKind::OpenAi { base_url }
            | ProviderKind::OpenRouter { base_url }
            | ProviderKind::Generic { base_url } => format!("{}/chat/completions", base_url),
        }
    }

    pub fn embedding_model(&self, model: &str) -> String {
        match self {
            ProviderKind::OpenAi { .. } => strip_vendor_prefix(model).to_string(),
            _ => model.to_string(),
        }
    }

    pub fn chat_model(&self, model: &str) -> String {
        match self {
            ProviderKind::OpenAi { .. } if model.starts_with("openrouter/") => {
                OPENAI_CHAT_FALLBACK_MODEL.to_string()
            }
            ProviderKind::OpenAi { .. } => strip_vendor_prefix(model).to_string(),
            _ => model.to_string(),
        }
    }
}

fn strip_vendor_prefix(model: &str) -> &str {
    model.strip_prefix("openai/").unwrap_or(model)
}

fn has_path_segment(url: &str, segment: &str) -> bool {
    url.split('/').skip(3).any(|s| s == segment)
}

/// `true` when `url` parses and its host is `localhost`, `127.0.0.1`, or `::1`.
pub fn is_loopback_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Pick the embedding backend.
///
/// A local URL is only honoured on a loopback host; anything else is
/// ignored with a warning so query embeddings are never sent to a
/// non-local endpoint that merely claims to be local. Without an explicit
/// embedding base URL the chat base URL is reused, rewriting a Cloudflare
/// AI Gateway `/openrouter` route to its `/openai` sibling.
pub fn resolve_embedding(config: &Config) -> ProviderKind {
    if let Some(local) = config.embedding.local_url.as_deref() {
        if is_loopback_url(local) {
            return ProviderKind::Local {
                url: local.trim().to_string(),
            };
        }
        tracing::warn!(
            url = local,
            "ignoring local embedding URL: host is not loopback; using remote provider"
        );
    }

    let base = match config.embedding.base_url.as_deref() {
        Some(explicit) => explicit.to_string(),
        None => derive_embedding_base(&config.chat.base_url),
    };
    ProviderKind::remote(&base)
}

fn derive_embedding_base(chat_base: &str) -> String {
    if chat_base.contains(CLOUDFLARE_GATEWAY_HOST) && chat_base.contains("/openrouter") {
        chat_base.replace("/openrouter", "/openai")
    } else {
        chat_base.to_string()
    }
}

pub fn resolve_chat(config: &Config) -> ProviderKind {
    ProviderKind::remote(&config.chat.base_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback_url("http://localhost:8000/embed"));
        assert!(is_loopback_url("http://127.0.0.1:8000/embed"));
        assert!(is_loopback_url("http://[::1]:8000/embed"));
        assert!(!is_loopback_url("http://localhost.evil.example/embed"));
        assert!(!is_loopback_url("http://10.0.0.5:8000/embed"));
        assert!(!is_loopback_url("not a url"));
    }

    #[test]
    fn test_remote_classification() {
        assert!(matches!(
            ProviderKind::remote("https://api.openai.com/v1"),
            ProviderKind::OpenAi { .. }
        ));
        assert!(matches!(
            ProviderKind::remote("https://gateway.ai.cloudflare.com/v1/acct/gw/openai"),
            ProviderKind::OpenAi { .. }
        ));
        assert!(matches!(
            ProviderKind::remote("https://openrouter.ai/api/v1"),
            ProviderKind::OpenRouter { .. }
        ));
        assert!(matches!(
            ProviderKind::remote("https://llm.internal.example/v1"),
            ProviderKind::Generic { .. }
        ));
    }

    #[test]
    fn test_trailing_slash_removed() {
        let kind = ProviderKind::remote("https://api.openai.com/v1/");
        assert_eq!(
            kind.embeddings_endpoint(),
            "https://api.openai.com/v1/embeddings"
        );
    }

    #[test]
    fn test_model_normalization() {
        let openai = ProviderKind::remote("https://api.openai.com/v1");
        assert_eq!(
            openai.embedding_model("openai/text-embedding-3-small"),
            "text-embedding-3-small"
        );
        assert_eq!(openai.chat_model("openai/gpt-4o"), "gpt-4o");
        assert_eq!(openai.chat_model("openrouter/auto"), OPENAI_CHAT_FALLBACK_MODEL);

        let router = ProviderKind::remote("https://openrouter.ai/api/v1");
        assert_eq!(
            router.embedding_model("openai/text-embedding-3-small"),
            "openai/text-embedding-3-small"
        );
        assert_eq!(router.chat_model("openrouter/auto"), "openrouter/auto");
    }

    #[test]
    fn test_local_url_must_be_loopback() {
        let mut cfg = Config::default();
        cfg.embedding.local_url = Some("http://127.0.0.1:8000/embed".to_string());
        assert_eq!(
            resolve_embedding(&cfg),
            ProviderKind::Local {
                url: "http://127.0.0.1:8000/embed".to_string()
            }
        );

        cfg.embedding.local_url = Some("http://embed.example.com/embed".to_string());
        assert!(!resolve_embedding(&cfg).is_local());
    }

    #[test]
    fn test_embedding_base_falls_back_to_chat_base() {
        let cfg = Config::default();
        assert_eq!(
            resolve_embedding(&cfg),
            ProviderKind::OpenRouter {
                base_url: "https://openrouter.ai/api/v1".to_string()
            }
        );
    }

    #[test]
    fn test_gateway_openrouter_route_rewritten_for_embeddings() {
        let mut cfg = Config::default();
        cfg.chat.base_url =
            "https://gateway.ai.cloudflare.com/v1/acct/gw/openrouter".to_string();
        let kind = resolve_embedding(&cfg);
        assert_eq!(
            kind,
            ProviderKind::OpenAi {
                base_url: "https://gateway.ai.cloudflare.com/v1/acct/gw/openai".to_string()
            }
        );
        assert!(matches!(resolve_chat(&cfg), ProviderKind::OpenRouter { .. }));
    }

    #[test]
    fn test_explicit_embedding_base_wins() {
        let mut cfg = Config::default();
        cfg.embedding.base_url = Some("https://api.openai.com/v1".to_string());
        assert!(matches!(resolve_embedding(&cfg), ProviderKind::OpenAi { .. }));
    }
}
