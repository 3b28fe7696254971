//! Stream Splitter
//!
//! Partitions a growing buffer into a stable prefix, rendered as Markdown
//! and then left alone, and a volatile suffix shown as plain text while the
//! model keeps typing. Nothing is ever dropped: `stable + volatile` is
//! always the input.

use crate::constants::render::{SENTENCE_SPLIT_THRESHOLD, SHORT_CONTENT_THRESHOLD};

use super::blocks::math_block_closer;
use super::oracle::{is_fence_line, is_safe_boundary, SafetyScan};

/// Result of splitting a streaming buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSplit {
    pub stable: String,
    pub volatile: String,
}

impl StreamSplit {
    fn all_volatile(text: &str) -> Self {
        Self {
            stable: String::new(),
            volatile: text.to_string(),
        }
    }

    /// Whether no prefix was judged stable
    pub fn is_all_volatile(&self) -> bool {
        self.stable.is_empty()
    }
}

/// Split `full_text` into its stable prefix and volatile suffix
pub fn split(full_text: &str) -> StreamSplit {
    let char_count = full_text.chars().count();
    if char_count < SHORT_CONTENT_THRESHOLD {
        return StreamSplit::all_volatile(full_text);
    }

    let mut boundary = stable_prefix_by_lines(full_text);
    if boundary == 0 && char_count > SENTENCE_SPLIT_THRESHOLD {
        boundary = stable_prefix_by_sentences(full_text);
    }
    if boundary == 0 {
        return StreamSplit::all_volatile(full_text);
    }

    let (stable, volatile) = full_text.split_at(boundary);
    if !is_safe_boundary(stable) || !is_safe_boundary(volatile) {
        tracing::trace!("splitter: unsafe half at byte {}, all volatile", boundary);
        return StreamSplit::all_volatile(full_text);
    }

    StreamSplit {
        stable: stable.to_string(),
        volatile: volatile.to_string(),
    }
}

/// Byte length of the longest stable run of whole lines from the start
fn stable_prefix_by_lines(text: &str) -> usize {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let count = lines.len();
    // The last two lines may still be extended by upcoming tokens.
    let in_tail = |index: usize| index + 2 >= count;

    // Safety of the prefix so far, advanced one unit at a time.
    let mut scan = SafetyScan::default();
    let mut end = 0;
    let mut i = 0;
    while i < count {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            scan.push_line(line);
            end += line.len();
            i += 1;
            continue;
        }
        if in_tail(i) {
            break;
        }

        let unit_end = if is_fence_line(line) {
            // A fenced block is frozen as a whole, and only once closed.
            match (i + 1..count).find(|&j| is_fence_line(lines[j])) {
                Some(close) if !in_tail(close) => close,
                _ => break,
            }
        } else if let Some(closer) = math_block_closer(trimmed) {
            match (i + 1..count).find(|&j| lines[j].contains(closer.as_str())) {
                Some(close) if !in_tail(close) => close,
                _ => break,
            }
        } else if is_block_marker(trimmed) || ends_with_terminal(trimmed) {
            i
        } else {
            break;
        };

        let unit = &lines[i..=unit_end];
        for unit_line in unit {
            scan.push_line(unit_line);
        }
        if !scan.is_safe() {
            break;
        }
        end += unit.iter().map(|l| l.len()).sum::<usize>();
        i = unit_end + 1;
    }

    // Trailing blank lines alone are not worth freezing.
    if text[..end].trim().is_empty() {
        0
    } else {
        end
    }
}

/// Byte offset keeping all but the last two sentences
fn stable_prefix_by_sentences(text: &str) -> usize {
    let mut ends = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let mut saw_space = false;
        while let Some(&(_, next)) = chars.peek() {
            if !next.is_whitespace() {
                break;
            }
            saw_space = true;
            chars.next();
        }
        let offset = chars.peek().map(|(idx, _)| *idx).unwrap_or(text.len());
        if saw_space || offset == text.len() {
            ends.push(offset);
        }
    }

    let trailing = usize::from(ends.last().map_or(true, |end| *end < text.len()));
    let sentences = ends.len() + trailing;
    if sentences < 3 {
        return 0;
    }
    ends[sentences - 3]
}

/// Headers, list items and blockquotes count as complete once a newer line
/// follows them
fn is_block_marker(trimmed: &str) -> bool {
    trimmed.starts_with('#')
        || trimmed.starts_with("- ")
        || trimmed.starts_with("* ")
        || trimmed.starts_with('>')
}

fn ends_with_terminal(trimmed: &str) -> bool {
    trimmed.ends_with(['.', '!', '?', ':', ';'])
}
