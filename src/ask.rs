//! Chat orchestration: retrieve, gate, and answer.
//!
//! [`Assistant::answer`] is the single path behind both `folio ask` and
//! `POST /api/chat`:
//!
//! 1. Load the index (lazily, once per process).
//! 2. Retrieve the top-k entries for the message.
//! 3. If results exist but the best score is below `min_score`, return the
//!    configured refusal without calling the chat model.
//! 4. Otherwise format the results as context blocks and ask the model.
//!
//! Retrieval failures never fail the request; the model is simply asked
//! with an empty context.

use serde::Serialize;
use std::sync::Arc;

use crate::chat::{ChatCompleter, ChatError};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::index_store::IndexStore;
use crate::models::{ChatTurn, ScoredEntry};
use crate::search::{best_score, is_out_of_scope, search_scored, SearchParams};

/// Outcome of a chat turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Nothing relevant was retrieved; the model was not consulted.
    OutOfScope { reply: String },
    Grounded { reply: String, sources: Vec<String> },
}

impl Answer {
    pub fn reply(&self) -> &str {
        match self {
            Answer::OutOfScope { reply } | Answer::Grounded { reply, .. } => reply,
        }
    }

    pub fn sources(&self) -> &[String] {
        match self {
            Answer::OutOfScope { .. } => &[],
            Answer::Grounded { sources, .. } => sources,
        }
    }
}

/// Wire form of an [`Answer`].
#[derive(Debug, Serialize)]
pub struct AnswerBody {
    pub reply: String,
    pub sources: Vec<String>,
}

impl From<Answer> for AnswerBody {
    fn from(answer: Answer) -> Self {
        match answer {
            Answer::OutOfScope { reply } => AnswerBody {
                reply,
                sources: Vec::new(),
            },
            Answer::Grounded { reply, sources } => AnswerBody { reply, sources },
        }
    }
}

/// Render results as `Source: <source>\n-----\n<text>` blocks separated by
/// blank lines.
pub fn format_context(results: &[ScoredEntry]) -> String {
    results
        .iter()
        .map(|r| format!("Source: {}\n-----\n{}", r.entry.source, r.entry.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Distinct sources in result order.
fn distinct_sources(results: &[ScoredEntry]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for r in results {
        if !sources.contains(&r.entry.source) {
            sources.push(r.entry.source.clone());
        }
    }
    sources
}

pub struct Assistant {
    index: Arc<IndexStore>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatCompleter>,
    params: SearchParams,
    min_score: f64,
    refusal: String,
}

impl Assistant {
    pub fn new(
        config: &Config,
        index: Arc<IndexStore>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatCompleter>,
    ) -> Self {
        Self {
            index,
            embedder,
            chat,
            params: SearchParams::from_config(&config.retrieval),
            min_score: config.retrieval.min_score,
            refusal: config.chat.refusal.clone(),
        }
    }

    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Scored retrieval against the shared index.
    pub async fn retrieve(&self, query: &str, k: usize) -> Vec<ScoredEntry> {
        let index = self.index.load().await;
        let params = self.params.clone().with_k(k);
        search_scored(&index, query, self.embedder.as_ref(), &params).await
    }

    pub async fn answer(&self, message: &str, history: &[ChatTurn]) -> Result<Answer, ChatError> {
        let results = self.retrieve(message, self.params.k).await;

        if is_out_of_scope(&results, self.min_score) {
            tracing::info!(
                best = best_score(&results).unwrap_or_default(),
                min_score = self.min_score,
                "question out of scope; refusing without model call"
            );
            return Ok(Answer::OutOfScope {
                reply: self.refusal.clone(),
            });
        }

        let context = format_context(&results);
        tracing::debug!(
            results = results.len(),
            context_chars = context.chars().count(),
            "asking chat model"
        );

        let reply = self.chat.complete(message, &context, history).await?;
        Ok(Answer::Grounded {
            reply,
            sources: distinct_sources(&results),
        })
    }
}
