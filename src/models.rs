//! Core data models shared by ingestion, retrieval, and chat.

use serde::{Deserialize, Serialize};

/// One embedded chunk in the persisted index.
///
/// `id` is `<source basename>:<chunk ordinal>`; `source` is the path the
/// chunk was read from. All entries written by one ingestion run share
/// the embedding dimensionality of the model that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// An [`IndexEntry`] with its ranking score. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    #[serde(flatten)]
    pub entry: IndexEntry,
    pub score: f64,
}

impl ScoredEntry {
    pub fn into_entry(self) -> IndexEntry {
        self.entry
    }
}

/// A document read from the content directory, before chunking.
#[derive(Debug, Clone)]
pub struct SourceItem {
    /// Path relative to the content root, `/`-separated.
    pub relative_path: String,
    /// Path recorded on index entries.
    pub source: String,
    /// File name used as the entry id prefix.
    pub basename: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A prior conversation turn supplied by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
