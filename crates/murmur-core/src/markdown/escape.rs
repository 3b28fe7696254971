//! HTML escaping
//!
//! Every piece of user or model text reaches the markup through exactly one
//! call to [`escape_html`], which is what keeps code blocks from being
//! double-escaped.

/// Escape `&`, `<`, `>`, `"` and `'` for use in element content or a
/// double-quoted attribute
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escaped text with newlines turned into `<br>`, used for the volatile
/// region and the plain-text fallback
pub fn escape_plain_text(text: &str) -> String {
    escape_html(text).replace('\n', "<br>\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_escape_plain_text_breaks_lines() {
        assert_eq!(escape_plain_text("a<b\nc"), "a&lt;b<br>\nc");
    }
}
