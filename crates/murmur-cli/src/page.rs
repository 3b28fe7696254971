//! Standalone HTML page around rendered message markup

use murmur_core::markdown::{ColorTheme, RenderConfig};

/// Wrap rendered markup in a page that typesets math with KaTeX
pub fn standalone_page(body: &str, config: &RenderConfig) -> String {
    let (background, foreground, code_bg) = match config.theme {
        ColorTheme::Light => ("#ffffff", "#1f2328", "#f6f8fa"),
        ColorTheme::Dark => ("#1e1f22", "#dcdfe4", "#2b303b"),
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.css">
<script defer src="https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.js"></script>
<script defer src="https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/contrib/auto-render.min.js"
  onload="document.querySelectorAll('.math').forEach(function (el) {{ renderMathInElement(el, {{throwOnError: false}}); }});"></script>
<style>
body {{ background: {background}; color: {foreground}; font: {font_size}px/1.5 -apple-system, sans-serif; max-width: {width}px; margin: 2em auto; }}
pre {{ background: {code_bg}; padding: 12px; border-radius: 6px; overflow-x: auto; }}
.code-block {{ position: relative; }}
.copy-code {{ position: absolute; top: 6px; right: 6px; }}
.math-display {{ display: block; text-align: center; margin: 1em 0; }}
table {{ border-collapse: collapse; }}
th, td {{ border: 1px solid #888; padding: 4px 8px; }}
</style>
</head>
<body>
{body}
</body>
</html>
"#,
        font_size = config.font_size,
        width = config.content_width,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_embeds_body() {
        let page = standalone_page("<p>hi</p>", &RenderConfig::default());
        assert!(page.contains("<body>\n<p>hi</p>\n</body>"));
        assert!(page.starts_with("<!DOCTYPE html>"));
    }
}
