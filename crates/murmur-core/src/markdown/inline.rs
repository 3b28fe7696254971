//! Inline-Span Protector
//!
//! Inline formatting (bold, italic, strikethrough, links) is regex based.
//! Math and code spans are lifted out into a placeholder table before any
//! substitution runs and put back verbatim afterwards, so `a*b*c` inside
//! `$...$` or backticks never turns into emphasis.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::escape::escape_html;
use super::oracle::find_closing_run;

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E000}(\\d+)\u{E001}").expect("valid placeholder regex"));
static BOLD_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").expect("valid bold regex"));
static BOLD_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__([^_\n]+?)__").expect("valid bold regex"));
static ITALIC_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*\s](?:[^*\n]*[^*\s])?)\*").expect("valid italic regex"));
static ITALIC_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_([^_\s](?:[^_\n]*[^_\s])?)_").expect("valid italic regex"));
static STRIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"~~([^~\n]+?)~~").expect("valid strikethrough regex"));
static IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]\n]*)\]\(([^)\s]+)\)").expect("valid image regex"));
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").expect("valid link regex"));
/// The `](target)` half of a link or image
static LINK_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\]\(([^)\s]+)\)").expect("valid link target regex"));

/// Span placeholder table, alive for one formatting call
struct SpanTable {
    spans: Vec<String>,
}

impl SpanTable {
    fn new() -> Self {
        Self { spans: Vec::new() }
    }

    /// Store rendered markup and return the token standing in for it
    fn protect(&mut self, html: String) -> String {
        let token = format!("{PLACEHOLDER_OPEN}{}{PLACEHOLDER_CLOSE}", self.spans.len());
        self.spans.push(html);
        token
    }

    /// Protected content behind a bare token, or the text itself
    fn resolve<'a>(&'a self, token: &'a str) -> &'a str {
        token
            .strip_prefix(PLACEHOLDER_OPEN)
            .and_then(|rest| rest.strip_suffix(PLACEHOLDER_CLOSE))
            .and_then(|idx| idx.parse::<usize>().ok())
            .and_then(|idx| self.spans.get(idx))
            .map_or(token, String::as_str)
    }

    fn restore(&self, text: &str) -> String {
        PLACEHOLDER
            .replace_all(text, |caps: &Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| self.spans.get(idx))
                    .cloned()
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

/// Apply inline Markdown formatting to one line of text, producing HTML
pub fn format_inline(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != PLACEHOLDER_OPEN && *c != PLACEHOLDER_CLOSE)
        .collect();

    let mut table = SpanTable::new();
    let shielded = protect_spans(&cleaned, &mut table);

    let mut html = escape_html(&shielded);
    // Link targets are lifted out too, so `__init__` in a URL stays put.
    html = LINK_TARGET
        .replace_all(&html, |caps: &Captures| {
            format!("]({})", table.protect(caps[1].to_string()))
        })
        .into_owned();
    html = BOLD_STAR
        .replace_all(&html, "<strong>$1</strong>")
        .into_owned();
    html = BOLD_UNDERSCORE
        .replace_all(&html, "<strong>$1</strong>")
        .into_owned();
    html = replace_flanked(&ITALIC_STAR, &html, '*');
    html = replace_flanked(&ITALIC_UNDERSCORE, &html, '_');
    html = STRIKE.replace_all(&html, "<del>$1</del>").into_owned();
    html = IMAGE
        .replace_all(&html, |caps: &Captures| {
            if is_unsafe_url(table.resolve(&caps[2])) {
                caps[1].to_string()
            } else {
                format!(r#"<img alt="{}" src="{}">"#, &caps[1], &caps[2])
            }
        })
        .into_owned();
    html = LINK
        .replace_all(&html, |caps: &Captures| {
            if is_unsafe_url(table.resolve(&caps[2])) {
                caps[1].to_string()
            } else {
                format!(r#"<a href="{}">{}</a>"#, &caps[2], &caps[1])
            }
        })
        .into_owned();

    table.restore(&html)
}

/// Emphasis only when the delimiters are not glued to word characters or
/// other delimiters on the outside (`2*3*4` and `snake_case_name` stay put)
fn replace_flanked(re: &Regex, html: &str, delimiter: char) -> String {
    re.replace_all(html, |caps: &Captures| {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => return String::new(),
        };
        let before = html[..whole.start()].chars().next_back();
        let after = html[whole.end()..].chars().next();
        let glued = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == delimiter);
        if glued(before) || glued(after) {
            whole.as_str().to_string()
        } else {
            format!("<em>{}</em>", &caps[1])
        }
    })
    .into_owned()
}

fn is_unsafe_url(url: &str) -> bool {
    let lowered = url.trim().to_ascii_lowercase();
    ["javascript:", "data:", "vbscript:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
}

/// Replace every code span, math span and LaTeX environment with a
/// placeholder token
fn protect_spans(text: &str, table: &mut SpanTable) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch == '`' {
            let run_start = i;
            while i < chars.len() && chars[i] == '`' {
                i += 1;
            }
            let run_len = i - run_start;
            if let Some(close_end) = find_closing_run(&chars, i, run_len) {
                let code: String = chars[i..close_end - run_len].iter().collect();
                out.push_str(&table.protect(format!("<code>{}</code>", escape_html(&code))));
                i = close_end;
            } else {
                out.extend(&chars[run_start..i]);
            }
            continue;
        }

        if ch == '\\' {
            if let Some((end, class)) = bracket_math_end(&chars, i) {
                let tex: String = chars[i..end].iter().collect();
                out.push_str(&table.protect(math_span(&tex, class)));
                i = end;
                continue;
            }
            if let Some(end) = environment_end(&chars, i) {
                let tex: String = chars[i..end].iter().collect();
                out.push_str(&table.protect(math_span(&tex, MathClass::Display)));
                i = end;
                continue;
            }
            if chars.get(i + 1) == Some(&'$') {
                out.push('$');
                i += 2;
                continue;
            }
            out.push(ch);
            i += 1;
            continue;
        }

        if ch == '$' {
            if chars.get(i + 1) == Some(&'$') {
                if let Some(close) = find_display_close(&chars, i + 2) {
                    let tex: String = chars[i..close + 2].iter().collect();
                    out.push_str(&table.protect(math_span(&tex, MathClass::Display)));
                    i = close + 2;
                    continue;
                }
                out.push_str("$$");
                i += 2;
                continue;
            }
            if let Some(close) = find_inline_close(&chars, i + 1) {
                let inner: String = chars[i + 1..close].iter().collect();
                let followed_by_digit = chars.get(close + 1).is_some_and(|c| c.is_ascii_digit());
                if looks_like_math(&inner) && !followed_by_digit {
                    let tex: String = chars[i..=close].iter().collect();
                    out.push_str(&table.protect(math_span(&tex, MathClass::Inline)));
                    i = close + 1;
                    continue;
                }
            }
            out.push('$');
            i += 1;
            continue;
        }

        out.push(ch);
        i += 1;
    }

    out
}

#[derive(Debug, Clone, Copy)]
enum MathClass {
    Inline,
    Display,
}

fn math_span(tex: &str, class: MathClass) -> String {
    let class = match class {
        MathClass::Inline => "math math-inline",
        MathClass::Display => "math math-display",
    };
    format!(r#"<span class="{class}">{}</span>"#, escape_html(tex))
}

/// Candidate `$...$` content that reads as math rather than prices:
/// no padding whitespace inside the delimiters, and at least one digit,
/// letter, operator or TeX control character
fn looks_like_math(inner: &str) -> bool {
    if inner.is_empty()
        || inner.starts_with(char::is_whitespace)
        || inner.ends_with(char::is_whitespace)
    {
        return false;
    }
    inner.chars().any(|c| {
        c.is_alphanumeric()
            || matches!(
                c,
                '+' | '-' | '*' | '/' | '=' | '<' | '>' | '^' | '_' | '\\' | '{' | '}'
            )
    })
}

/// Index of the closing unescaped single `$`
fn find_inline_close(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '$' if chars.get(i + 1) == Some(&'$') => return None,
            '$' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Index of the closing `$$`
fn find_display_close(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '\\' {
            i += 2;
            continue;
        }
        if chars[i] == '$' && chars[i + 1] == '$' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// End (exclusive) of a `\[...\]` or `\(...\)` span starting at `start`
fn bracket_math_end(chars: &[char], start: usize) -> Option<(usize, MathClass)> {
    let (close, class) = match chars.get(start + 1) {
        Some('[') => (']', MathClass::Display),
        Some('(') => (')', MathClass::Inline),
        _ => return None,
    };
    let mut i = start + 2;
    while i + 1 < chars.len() {
        if chars[i] == '\\' && chars[i + 1] == close {
            return Some((i + 2, class));
        }
        i += 1;
    }
    None
}

/// End (exclusive) of a `\begin{name}...\end{name}` environment at `start`
fn environment_end(chars: &[char], start: usize) -> Option<usize> {
    const BEGIN: &str = "\\begin{";
    let rest: String = chars[start..].iter().collect();
    if !rest.starts_with(BEGIN) {
        return None;
    }
    let name_end = rest[BEGIN.len()..].find('}')?;
    let name = &rest[BEGIN.len()..BEGIN.len() + name_end];
    let closing = format!("\\end{{{name}}}");
    let close_at = rest.find(&closing)?;
    let end_bytes = close_at + closing.len();
    Some(start + rest[..end_bytes].chars().count())
}
