//! Ingestion pipeline orchestration.
//!
//! Coordinates the offline build: scan content → chunk → embed → write
//! index. Embedding is sequential and the first provider failure aborts
//! the run before anything is written, so a previous index is never
//! replaced by a partial one.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::connector_fs;
use crate::embedding::Embedder;
use crate::models::{IndexEntry, SourceItem};

/// Counts reported by an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
    /// Where the index was written; `None` for a dry run.
    pub output: Option<PathBuf>,
}

/// Chunk every source item into entries with `<basename>:<ordinal>` ids.
/// Embeddings are left empty.
pub fn chunk_items(config: &Config, items: &[SourceItem]) -> Vec<IndexEntry> {
    let mut out = Vec::new();
    for item in items {
        let chunks = chunk_text(&item.body, config.chunking.chunk_size, config.chunking.overlap);
        for (i, text) in chunks.into_iter().enumerate() {
            out.push(IndexEntry {
                id: format!("{}:{}", item.basename, i),
                text,
                source: item.source.clone(),
                embedding: Vec::new(),
            });
        }
    }
    out
}

pub async fn run_ingest(config: &Config, embedder: &dyn Embedder, dry_run: bool) -> Result<IngestReport> {
    let root = &config.content.root;
    if !root.exists() {
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create content directory: {}", root.display()))?;
        tracing::info!(root = %root.display(), "created empty content directory");
    }

    let items = connector_fs::scan_content(&config.content)?;
    if items.is_empty() {
        println!(
            "No files found in '{}'. Add .md, .mdx, .txt or .json files and re-run.",
            root.display()
        );
    }

    let pending = chunk_items(config, &items);

    if dry_run {
        println!("ingest (dry-run)");
        println!("  files found: {}", items.len());
        println!("  chunks: {}", pending.len());
        return Ok(IngestReport {
            files: items.len(),
            chunks: pending.len(),
            output: None,
        });
    }

    let mut index = pending;
    for entry in index.iter_mut() {
        entry.embedding = embedder
            .embed(&entry.text)
            .await
            .with_context(|| format!("Failed to embed chunk {}", entry.id))?;
        tracing::debug!(id = %entry.id, dims = entry.embedding.len(), "embedded chunk");
    }

    let out_path = &config.index.path;
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&index)?;
    std::fs::write(out_path, json)
        .with_context(|| format!("Failed to write index: {}", out_path.display()))?;

    println!("ingest");
    println!("  files: {}", items.len());
    println!("  chunks embedded: {}", index.len());
    println!("  model: {}", embedder.model_name());
    println!("  wrote: {}", out_path.display());
    println!("ok");

    Ok(IngestReport {
        files: items.len(),
        chunks: index.len(),
        output: Some(out_path.clone()),
    })
}
