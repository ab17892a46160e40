//! Heading- and paragraph-aware text chunker.
//!
//! Splits a document into chunks of at most `chunk_size` characters,
//! preferring the largest semantic unit that fits:
//!
//! 1. Sections, split at `##` / `###` heading lines. A section starts at
//!    its heading and runs to the next heading or end of document.
//! 2. Blank-line separated paragraphs, greedily packed into a buffer.
//! 3. A fixed-width character window for a single oversized paragraph,
//!    stepping by `chunk_size - overlap` (always at least one character).
//!
//! Sizes count Unicode scalar values, so a window never splits a
//! character. Every returned chunk is trimmed and non-empty, in document
//! order. The function is pure and deterministic.

pub const DEFAULT_CHUNK_SIZE: usize = 1200;
pub const DEFAULT_OVERLAP: usize = 150;

/// Split `text` into trimmed, non-empty chunks of at most `chunk_size`
/// characters.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();

    for section in split_sections(text) {
        if char_len(&section) <= chunk_size {
            chunks.push(section);
        } else {
            pack_paragraphs(&section, chunk_size, overlap, &mut chunks);
        }
    }

    chunks.retain(|c| !c.is_empty());
    chunks
}

/// `## ` and `### ` start a section; `#` and `####` and deeper do not.
fn is_section_heading(line: &str) -> bool {
    line.strip_prefix("###")
        .or_else(|| line.strip_prefix("##"))
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

fn split_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if is_section_heading(line) {
            push_section(&mut current, &mut sections);
        }
        current.push(line);
    }
    push_section(&mut current, &mut sections);

    if sections.is_empty() {
        sections.push(text.trim().to_string());
    }
    sections
}

fn push_section(current: &mut Vec<&str>, sections: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let section = current.join("\n");
    let trimmed = section.trim();
    if !trimmed.is_empty() {
        sections.push(trimmed.to_string());
    }
    current.clear();
}

fn pack_paragraphs(section: &str, chunk_size: usize, overlap: usize, out: &mut Vec<String>) {
    let mut buf = String::new();
    let mut buf_len = 0usize;

    for block in section.split("\n\n").map(str::trim) {
        if block.is_empty() {
            continue;
        }
        let block_len = char_len(block);

        let would_be = if buf.is_empty() {
            block_len
        } else {
            buf_len + 2 + block_len // +2 for the "\n\n" separator
        };

        if would_be <= chunk_size {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(block);
            buf_len = would_be;
            continue;
        }

        flush(&mut buf, &mut buf_len, out);

        if block_len <= chunk_size {
            buf.push_str(block);
            buf_len = block_len;
        } else {
            sliding_window(block, chunk_size, overlap, out);
        }
    }

    flush(&mut buf, &mut buf_len, out);
}

fn flush(buf: &mut String, buf_len: &mut usize, out: &mut Vec<String>) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    buf.clear();
    *buf_len = 0;
}

fn sliding_window(block: &str, chunk_size: usize, overlap: usize, out: &mut Vec<String>) {
    let chars: Vec<char> = block.chars().collect();
    let back = overlap.min(chunk_size - 1);
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        if end >= chars.len() {
            break;
        }
        start = (end - back).max(start + 1);
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1200, 150);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(chunk_text("", 1200, 150).is_empty());
        assert!(chunk_text("  \n\n \t\n", 1200, 150).is_empty());
    }

    #[test]
    fn test_splits_on_section_headings() {
        let text = "Intro line\n## Experience\nBuilt things.\n### Acme\nShipped stuff.\n## Education\nSchool.";
        let chunks = chunk_text(text, 1200, 150);
        assert_eq!(
            chunks,
            vec![
                "Intro line".to_string(),
                "## Experience\nBuilt things.".to_string(),
                "### Acme\nShipped stuff.".to_string(),
                "## Education\nSchool.".to_string(),
            ]
        );
    }

    #[test]
    fn test_other_heading_levels_do_not_split() {
        let text = "# Title\nbody\n#### Deep\nmore\n##NoSpace";
        let chunks = chunk_text(text, 1200, 150);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("# Title"));
        assert!(chunks[0].ends_with("##NoSpace"));
    }

    #[test]
    fn test_crlf_headings() {
        let text = "## One\r\nfirst\r\n## Two\r\nsecond\r\n";
        let chunks = chunk_text(text, 1200, 150);
        assert_eq!(chunks, vec!["## One\nfirst".to_string(), "## Two\nsecond".to_string()]);
    }

    #[test]
    fn test_paragraphs_packed_up_to_limit() {
        // Each paragraph is 10 chars; two fit in 22 (10 + 2 + 10), three do not.
        let text = "aaaaaaaaaa\n\nbbbbbbbbbb\n\ncccccccccc\n\ndddddddddd";
        let chunks = chunk_text(text, 22, 0);
        assert_eq!(
            chunks,
            vec![
                "aaaaaaaaaa\n\nbbbbbbbbbb".to_string(),
                "cccccccccc\n\ndddddddddd".to_string(),
            ]
        );
    }

    #[test]
    fn test_extra_blank_lines_between_paragraphs() {
        let text = "aaaaaaaaaa\n\n\n\nbbbbbbbbbb\n\n\ncccccccccc";
        let chunks = chunk_text(text, 15, 0);
        assert_eq!(chunks, vec!["aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc"]);
    }

    #[test]
    fn test_oversized_paragraph_uses_window() {
        let para: String = ('a'..='z').cycle().take(100).collect();
        let chunks = chunk_text(&para, 30, 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 30);
        }
        // Window step is 20, so chunk n starts at char 20n.
        assert_eq!(chunks[0], para[0..30]);
        assert_eq!(chunks[1], para[20..50]);
        assert!(para.ends_with(chunks.last().unwrap().as_str()));
    }

    #[test]
    fn test_window_advances_when_overlap_exceeds_size() {
        let para = "x".repeat(50);
        let chunks = chunk_text(&para, 10, 500);
        // Step clamps to one character: windows start at 0, 1, ..., 40.
        assert_eq!(chunks.len(), 41);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_window_counts_characters_not_bytes() {
        let para = "é".repeat(25);
        let chunks = chunk_text(&para, 10, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 10);
        assert_eq!(chunks[2].chars().count(), 5);
    }

    #[test]
    fn test_buffer_flushed_before_oversized_paragraph() {
        let text = format!("short one\n\n{}\n\nshort two", "y".repeat(40));
        let chunks = chunk_text(&text, 20, 0);
        assert_eq!(chunks.first().unwrap(), "short one");
        assert_eq!(chunks.last().unwrap(), "short two");
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn test_chunks_trimmed_non_empty_and_ordered() {
        let text = (0..40)
            .map(|i| format!("## Section {}\n\n  Paragraph number {} with some words.  ", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunk_text(&text, 25, 5);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.is_empty());
            assert_eq!(c.trim(), c);
        }
        let joined = chunks.join(" ");
        let p3 = joined.find("Section 3").unwrap();
        let p30 = joined.find("Section 30").unwrap();
        assert!(p3 < p30);
    }

    #[test]
    fn test_deterministic() {
        let text = "## A\n\nAlpha\n\nBeta\n\n## B\n\nGamma\n\nDelta";
        assert_eq!(chunk_text(text, 8, 2), chunk_text(text, 8, 2));
    }
}
