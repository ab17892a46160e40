//! Content directory scanner.
//!
//! Walks `[content].root` and returns every file matching the include
//! globs and none of the exclude globs, sorted by relative path. Version
//! control, build output, and dependency directories are always excluded.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::ContentConfig;
use crate::models::SourceItem;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Collect source documents under the content root.
///
/// A missing root yields an empty list; the caller decides whether to
/// create it. Files that cannot be read as UTF-8 text are skipped with a
/// warning.
pub fn scan_content(config: &ContentConfig) -> Result<Vec<SourceItem>> {
    let root = &config.root;
    if !root.exists() {
        return Ok(Vec::new());
    }

    let include_set = build_globset(config.include_globs.iter().map(String::as_str))?;
    let exclude_set = build_globset(
        DEFAULT_EXCLUDES
            .iter()
            .copied()
            .chain(config.exclude_globs.iter().map(String::as_str)),
    )?;

    let mut items = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = to_slash(relative);

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        let body = match std::fs::read_to_string(path) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| rel_str.clone());

        items.push(SourceItem {
            source: format!("{}/{}", to_slash(root).trim_end_matches('/'), rel_str),
            relative_path: rel_str,
            basename,
            body,
        });
    }

    // Sort for deterministic ordering
    items.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok(items)
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn build_globset<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
