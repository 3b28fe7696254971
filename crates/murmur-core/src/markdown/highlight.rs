//! Code block syntax highlighting
//!
//! Uses syntect's bundled syntaxes and themes and emits inline-styled spans so
//! the host needs no stylesheet. Languages syntect does not know are emitted
//! as escaped plain text.

use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::html::{styled_line_to_highlighted_html, IncludeBackground};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use super::cache::HighlightCache;
use super::config::ColorTheme;
use super::escape::escape_html;
use crate::error::RenderError;

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

/// Highlight `code` into the body of a `<code>` element.
///
/// Returns the escaped plain text when the language is unknown or absent.
pub fn highlight_code(
    code: &str,
    language: Option<&str>,
    theme: ColorTheme,
) -> Result<String, RenderError> {
    let syntax = match language.and_then(|l| SYNTAX_SET.find_syntax_by_token(l)) {
        Some(syntax) => syntax,
        None => return Ok(escape_html(code)),
    };
    let Some(theme) = THEME_SET.themes.get(theme.syntect_theme()) else {
        return Ok(escape_html(code));
    };

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut out = String::with_capacity(code.len() * 4);
    for line in LinesWithEndings::from(code) {
        let ranges = highlighter
            .highlight_line(line, &SYNTAX_SET)
            .map_err(|e| RenderError::Highlight(e.to_string()))?;
        let html = styled_line_to_highlighted_html(&ranges, IncludeBackground::No)
            .map_err(|e| RenderError::Highlight(e.to_string()))?;
        out.push_str(&html);
    }
    Ok(out)
}

/// Memoizing front end over [`highlight_code`]
#[derive(Default)]
pub struct Highlighter {
    cache: HighlightCache,
}

impl Highlighter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn highlight(
        &mut self,
        code: &str,
        language: Option<&str>,
        theme: ColorTheme,
    ) -> Result<String, RenderError> {
        let hash = HighlightCache::content_hash(language, code);
        let html = self
            .cache
            .get_or_render(hash, theme, || highlight_code(code, language, theme))?;
        Ok(html.as_str().to_owned())
    }

    pub fn cache(&self) -> &HighlightCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_language_is_escaped_plain_text() {
        let html = highlight_code("a < b && c", Some("no-such-lang"), ColorTheme::Dark).unwrap();
        assert_eq!(html, "a &lt; b &amp;&amp; c");
        let html = highlight_code("x > 1", None, ColorTheme::Light).unwrap();
        assert_eq!(html, "x &gt; 1");
    }

    #[test]
    fn test_known_language_emits_styled_spans() {
        let html = highlight_code("fn main() {}", Some("rust"), ColorTheme::Dark).unwrap();
        assert!(html.contains("<span style=\""));
        assert!(html.contains("main"));
        assert!(!html.contains("background-color"));
    }

    #[test]
    fn test_highlighted_output_escapes_markup() {
        let html = highlight_code("if a < b { }", Some("rs"), ColorTheme::Light).unwrap();
        assert!(html.contains("&lt;"));
        assert!(!html.contains(" < "));
    }

    #[test]
    fn test_highlighter_memoizes() {
        let mut highlighter = Highlighter::new();
        let first = highlighter
            .highlight("print(1)", Some("python"), ColorTheme::Dark)
            .unwrap();
        let second = highlighter
            .highlight("print(1)", Some("python"), ColorTheme::Dark)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(highlighter.cache().stats(), (1, 1));
    }
}
