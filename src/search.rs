//! Brute-force semantic search over the in-memory index.
//!
//! # Ranking Algorithm
//!
//! 1. Embed the query with the same [`Embedder`] used for ingestion.
//! 2. Drop entries whose dimensionality differs from the query vector
//!    (stale index built with another model); logged, never fatal.
//! 3. Score each remaining entry by cosine similarity.
//! 4. Add each matching anchor's fixed boost to the score.
//! 5. Stable sort by score, descending; ties keep index order.
//! 6. Diversify: at most `ceil(k / 2)` (minimum 1) results per source.
//! 7. Backfill with the best unselected entries if fewer than `k` remain.
//! 8. Guarantee each anchor source a slot: if none of its entries was
//!    selected, its best entry replaces the lowest-scored non-anchor
//!    result when the set is full, or is appended when there is room.
//!
//! A query that cannot be embedded yields no results rather than an
//! error, so a chat request can still be answered without context.

use serde::Serialize;
use std::collections::HashMap;

use crate::config::{AnchorConfig, RetrievalConfig};
use crate::embedding::Embedder;
use crate::models::{IndexEntry, ScoredEntry};

/// Added to the norm product so zero vectors score 0 instead of NaN.
const COSINE_EPSILON: f64 = 1e-8;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub k: usize,
    /// Boosted and guaranteed sources, primary first.
    pub anchors: Vec<AnchorConfig>,
}

impl SearchParams {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            k: config.top_k,
            anchors: config.anchors.clone(),
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }
}

/// A scored result as returned over HTTP and printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub id: String,
    pub source: String,
    pub score: f64,
    pub text: String,
}

impl From<&ScoredEntry> for SearchResultItem {
    fn from(s: &ScoredEntry) -> Self {
        Self {
            id: s.entry.id.clone(),
            source: s.entry.source.clone(),
            score: s.score,
            text: s.entry.text.clone(),
        }
    }
}

/// Cosine similarity with an epsilon-guarded denominator.
///
/// ```text
///              a · b
/// cos(θ) = ─────────────
///          ‖a‖ × ‖b‖ + ε
/// ```
///
/// Only the shared prefix is compared; callers filter by length first.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt() + COSINE_EPSILON)
}

fn matches_anchor(source: &str, anchor: &AnchorConfig) -> bool {
    source.to_lowercase().contains(&anchor.source.to_lowercase())
}

fn is_any_anchor(source: &str, anchors: &[AnchorConfig]) -> bool {
    anchors.iter().any(|a| matches_anchor(source, a))
}

/// A scored borrow of an index entry; only the final picks are cloned.
struct Candidate<'a> {
    entry: &'a IndexEntry,
    score: f64,
}

/// Score, diversify, and anchor-complete `index` against a query vector.
///
/// This is the pure ranking step behind [`search_scored`]; it performs no
/// I/O and is deterministic for a given input. `k` larger than the number
/// of comparable entries returns all of them.
pub fn rank(index: &[IndexEntry], query_vec: &[f32], params: &SearchParams) -> Vec<ScoredEntry> {
    if params.k == 0 || query_vec.is_empty() {
        return Vec::new();
    }

    let qdim = query_vec.len();
    let mut scored: Vec<Candidate<'_>> = index
        .iter()
        .filter(|e| e.embedding.len() == qdim)
        .map(|e| {
            let bonus: f64 = params
                .anchors
                .iter()
                .filter(|a| matches_anchor(&e.source, a))
                .map(|a| a.boost)
                .sum();
            Candidate {
                entry: e,
                score: cosine_similarity(query_vec, &e.embedding) + bonus,
            }
        })
        .collect();
    if scored.len() != index.len() {
        tracing::warn!(
            skipped = index.len() - scored.len(),
            query_dims = qdim,
            "index embeddings skipped due to dimension mismatch; re-ingest with the same embedding provider and model"
        );
    }

    // `sort_by` is stable, so equal scores keep index order.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let k = params.k.min(scored.len());
    let mut taken = diversify(&scored, k);
    ensure_anchors(&scored, &mut taken, k, &params.anchors);

    taken
        .into_iter()
        .map(|i| ScoredEntry {
            entry: scored[i].entry.clone(),
            score: scored[i].score,
        })
        .collect()
}

/// Positions into `scored` chosen under the per-source cap, then backfilled.
/// `k` must not exceed `scored.len()`.
fn diversify(scored: &[Candidate<'_>], k: usize) -> Vec<usize> {
    let max_per_source = k.div_ceil(2).max(1);
    let mut taken: Vec<usize> = Vec::with_capacity(k);
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for (i, s) in scored.iter().enumerate() {
        if taken.len() >= k {
            break;
        }
        let count = counts.entry(s.entry.source.as_str()).or_insert(0);
        if *count >= max_per_source {
            continue;
        }
        *count += 1;
        taken.push(i);
    }

    if taken.len() < k {
        for i in 0..scored.len() {
            if taken.len() >= k {
                break;
            }
            if !taken.contains(&i) {
                taken.push(i);
            }
        }
    }

    taken
}

fn ensure_anchors(scored: &[Candidate<'_>], taken: &mut Vec<usize>, k: usize, anchors: &[AnchorConfig]) {
    for anchor in anchors {
        let present = taken
            .iter()
            .any(|&i| matches_anchor(&scored[i].entry.source, anchor));
        if present {
            continue;
        }

        let Some(candidate) = scored
            .iter()
            .position(|s| matches_anchor(&s.entry.source, anchor))
        else {
            continue;
        };

        if taken.len() < k {
            taken.push(candidate);
            continue;
        }

        let lowest_non_anchor = (0..taken.len())
            .filter(|&slot| !is_any_anchor(&scored[taken[slot]].entry.source, anchors))
            .min_by(|&a, &b| {
                scored[taken[a]]
                    .score
                    .partial_cmp(&scored[taken[b]].score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        if let Some(slot) = lowest_non_anchor {
            tracing::debug!(
                anchor = %anchor.source,
                replaced = %scored[taken[slot]].entry.id,
                "anchor source guaranteed a result slot"
            );
            taken[slot] = candidate;
        }
    }
}

/// Embed `query` and rank the index, keeping scores.
///
/// Embedding failures are logged and produce an empty result.
pub async fn search_scored(
    index: &[IndexEntry],
    query: &str,
    embedder: &dyn Embedder,
    params: &SearchParams,
) -> Vec<ScoredEntry> {
    if query.trim().is_empty() {
        return Vec::new();
    }

    let query_vec = match embedder.embed(query).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "retrieval disabled: failed to embed query; proceeding without context");
            return Vec::new();
        }
    };

    rank(index, &query_vec, params)
}

/// [`search_scored`] with scores stripped.
pub async fn search(
    index: &[IndexEntry],
    query: &str,
    embedder: &dyn Embedder,
    params: &SearchParams,
) -> Vec<IndexEntry> {
    search_scored(index, query, embedder, params)
        .await
        .into_iter()
        .map(ScoredEntry::into_entry)
        .collect()
}

/// Highest score in a result set.
pub fn best_score(results: &[ScoredEntry]) -> Option<f64> {
    results.iter().map(|r| r.score).reduce(f64::max)
}

/// `true` when results exist but none reaches `min_score`.
///
/// An empty result set is not out of scope: it means retrieval was
/// unavailable, and the caller proceeds without context.
pub fn is_out_of_scope(results: &[ScoredEntry], min_score: f64) -> bool {
    best_score(results).is_some_and(|best| best < min_score)
}
