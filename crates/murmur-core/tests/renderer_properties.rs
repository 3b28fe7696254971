//! Renderer properties checked through the public API

use murmur_core::markdown::{render, Highlighter, RenderConfig, RenderState};
use murmur_core::{is_safe_boundary, split, to_blocks, DisplayInstruction, RenderPipeline};

const SAMPLES: &[&str] = &[
    "",
    "plain words",
    "Intro line.\n\nSecond paragraph here.\nThird line.\n",
    "# Heading\n- item one\n- item two\n\nDone.\n",
    "Price is $5 and $6.\n",
    "Some \\frac{a}{b} in prose.\n",
    "| a | b |\n|---|---|\n| 1 | 2 |\n",
    "Ends in a literal backslash \\\\",
    "Closed `code` here",
];

const COMPLETE_CONSTRUCTS: &[&str] = &[
    "$x + 1$",
    "$$\\int_0^1 x\\,dx$$",
    "\n```rust\nfn main() {}\n```\n",
    "\\begin{align}a &= b\\end{align}",
    "\\frac{1}{2}",
    "`inline $ code`",
];

#[test]
fn test_safe_text_stays_safe_after_complete_construct() {
    for text in SAMPLES {
        assert!(is_safe_boundary(text), "sample should be safe: {text:?}");
        for construct in COMPLETE_CONSTRUCTS {
            let combined = format!("{text}{construct}");
            assert!(
                is_safe_boundary(&combined),
                "appending {construct:?} to {text:?} broke safety"
            );
        }
    }
}

#[test]
fn test_dangling_escape_and_open_backtick_are_unsafe() {
    for text in ["Price \\", "a `", "Escaped \\\\\\"] {
        assert!(!is_safe_boundary(text), "should be unsafe: {text:?}");
    }
    assert!(is_safe_boundary("a `b`"));
}

#[test]
fn test_split_reconstructs_input() {
    let long = "First sentence is here. Second one follows! Third asks why? \
                Fourth keeps going on and on. Fifth is still being typ";
    let inputs = [
        "short",
        "This first sentence is done.\nSecond.\nThird line xy",
        "Line one is complete.\nLine two is complete.\nLine three ends.\ntail a\ntail b",
        "Intro.\n\n```python\ndef f():\n    return 1\n```\n\nAfter the code.\nMore\nlast",
        "Crossing lines.\r\nWindows endings here.\r\nAnd more text to pad it out.\r\nx\r\ny",
        long,
    ];
    for input in inputs {
        let parts = split(input);
        assert_eq!(format!("{}{}", parts.stable, parts.volatile), input);
    }
}

#[test]
fn test_short_content_boundary() {
    let at_49 = "This first sentence is done.\nSecond.\nThird line x";
    let at_50 = "This first sentence is done.\nSecond.\nThird line xy";
    assert_eq!(at_49.chars().count(), 49);
    assert_eq!(at_50.chars().count(), 50);
    assert_eq!(split(at_49).stable, "");
    assert_eq!(split(at_50).stable, "This first sentence is done.\n");
}

#[test]
fn test_full_render_is_idempotent() {
    let text = "# Title\n\nSome **bold** and $e^{i\\pi} + 1 = 0$.\n\n```rust\nlet x = 1 < 2;\n```\n";
    let config = RenderConfig::default();
    let mut highlighter = Highlighter::new();
    let (_, first) = render(text, false, &RenderState::default(), &config, &mut highlighter);
    let (_, second) = render(text, false, &RenderState::default(), &config, &mut highlighter);
    assert_eq!(first, second);

    let mut pipeline: RenderPipeline<u8> = RenderPipeline::default();
    let a = pipeline.render(&0, text, false);
    let b = pipeline.render(&0, text, false);
    assert_eq!(a.html, b.html);
    assert_eq!(a.html, first.html);
}

#[test]
fn test_code_block_escaped_exactly_once() {
    let html = to_blocks("```\nif a < b && c > d { x }\n```");
    assert!(html.contains("if a &lt; b &amp;&amp; c &gt; d { x }"));
    assert!(!html.contains("&amp;lt;"));
    assert!(!html.contains("&amp;amp;"));
    assert!(!html.contains(" < "));
}

#[test]
fn test_python_block_is_verbatim() {
    let html = to_blocks("```python\ndef f():\n    return 1\n```");
    assert!(
        html.contains("<pre><code class=\"language-python\">def f():\n    return 1</code></pre>")
    );

    let html = to_blocks("```\n**not bold** _nor this_\n```");
    assert!(html.contains("**not bold** _nor this_"));
    assert!(!html.contains("<strong>"));
}

#[test]
fn test_streamed_inline_math_scenario() {
    let mut pipeline: RenderPipeline<u8> = RenderPipeline::default();

    let first = "The answer is $x = ";
    assert!(!is_safe_boundary(first));
    let output = pipeline.render(&0, first, true);
    assert!(output.html.contains("The answer is $x = "));
    assert!(!output.html.contains("math-inline"));
    assert_eq!(pipeline.state(&0).unwrap().volatile_text, first);

    let second = "The answer is $x = 5$.";
    assert!(is_safe_boundary(second));
    let output = pipeline.render(&0, second, false);
    assert_eq!(output.instruction, DisplayInstruction::Reload);
    assert!(output
        .html
        .contains("<span class=\"math math-inline\">$x = 5$</span>"));
    assert_eq!(output.typeset_blocks, vec![0]);
}

#[test]
fn test_stable_math_is_not_retypeset_while_streaming() {
    let mut pipeline: RenderPipeline<u8> = RenderPipeline::default();
    let base = "Euler wrote $e^{i\\pi} + 1 = 0$ once.\nThen more prose follows here.\n";
    pipeline.render(&0, &format!("{base}still\ntyping"), true);
    let output = pipeline.render(&0, &format!("{base}still\ntyping more"), true);
    assert!(matches!(output.instruction, DisplayInstruction::Stream { stable: None, .. }));
    assert!(output.typeset_blocks.is_empty());
}
