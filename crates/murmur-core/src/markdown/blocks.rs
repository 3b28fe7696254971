//! Block Classifier
//!
//! A single forward pass over lines turning Markdown into block-level HTML.
//! This is a pragmatic, non-recursive converter: no nested blocks, one
//! block per dispatch. The only carried state is an open code block, an
//! open display-math block, an open table and the paragraph being built.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::render::MAX_RENDER_CHARS;
use crate::error::RenderError;

use super::escape::escape_html;
use super::inline::format_inline;
use super::oracle::{find_closing_run, is_fence_line};

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#+)(?:\s+(.*))?$").expect("valid heading regex"));
static ORDERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.\s+(.*)$").expect("valid ordered item regex"));
static BEGIN_ENV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\\begin\{([^{}]+)\}").expect("valid environment regex"));

/// Flavour of a list item, which decides the wrapping list element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Unordered,
    Ordered,
    Task,
}

/// A fenced code block's raw content, kept for highlighting and copying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    Rule,
    Quote,
    /// A run of list items, already wrapped in `<ul>`/`<ol>`
    List(ListKind),
    Table,
    Code(CodeBlock),
    Math,
}

/// One top-level node of the rendered document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub html: String,
    first_line: usize,
}

impl Block {
    pub(crate) fn new(kind: BlockKind, html: String) -> Self {
        Self {
            kind,
            html,
            first_line: 0,
        }
    }

    fn starting_at(mut self, line: usize) -> Self {
        self.first_line = line;
        self
    }

    /// Index of the source line the block starts on
    pub fn first_line(&self) -> usize {
        self.first_line
    }

    /// Whether the host has math to typeset inside this block
    pub fn has_math(&self) -> bool {
        matches!(self.kind, BlockKind::Math) || self.html.contains("class=\"math ")
    }

    pub fn code(&self) -> Option<&CodeBlock> {
        match &self.kind {
            BlockKind::Code(code) => Some(code),
            _ => None,
        }
    }
}

/// Convert Markdown to HTML. Oversized input yields a placeholder.
pub fn to_blocks(markdown: &str) -> String {
    match classify(markdown) {
        Ok(blocks) => join_blocks(&blocks),
        Err(err) => {
            tracing::warn!("Block classifier skipped input: {}", err);
            format!(
                "<p class=\"render-placeholder\">{}</p>",
                escape_html(&err.to_string())
            )
        }
    }
}

/// Concatenate block markup the way [`to_blocks`] does
pub fn join_blocks(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|block| block.html.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classify Markdown into top-level blocks
pub fn classify(markdown: &str) -> Result<Vec<Block>, RenderError> {
    let len = markdown.chars().count();
    if len > MAX_RENDER_CHARS {
        return Err(RenderError::InputTooLarge {
            len,
            limit: MAX_RENDER_CHARS,
        });
    }

    let mut classifier = Classifier::default();
    for (index, line) in markdown.lines().enumerate() {
        classifier.line = index;
        classifier.push_line(line);
    }
    Ok(classifier.finish())
}

/// Closing delimiter for a line that opens a multi-line display-math block
pub(crate) fn math_block_closer(trimmed: &str) -> Option<String> {
    if let Some(rest) = trimmed.strip_prefix("$$") {
        return (!rest.contains("$$")).then(|| "$$".to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("\\[") {
        return (!rest.contains("\\]")).then(|| "\\]".to_string());
    }
    if let Some(caps) = BEGIN_ENV.captures(trimmed) {
        let closer = format!("\\end{{{}}}", &caps[1]);
        return (!trimmed.contains(&closer)).then_some(closer);
    }
    None
}

struct OpenCode {
    start: usize,
    language: Option<String>,
    lines: Vec<String>,
}

struct OpenMath {
    start: usize,
    closer: String,
    lines: Vec<String>,
}

struct OpenTable {
    start: usize,
    header_done: bool,
    head: Vec<String>,
    body: Vec<String>,
}

enum Item {
    Block(Block),
    /// Kind, ordinal, markup and source line of one list entry
    ListItem(ListKind, Option<u64>, String, usize),
}

#[derive(Default)]
struct Classifier {
    /// Index of the line being pushed
    line: usize,
    items: Vec<Item>,
    code: Option<OpenCode>,
    math: Option<OpenMath>,
    table: Option<OpenTable>,
    paragraph: Vec<String>,
    paragraph_start: usize,
}

impl Classifier {
    fn push_line(&mut self, line: &str) {
        // 1-2: code fences and code content
        if let Some(code) = self.code.as_mut() {
            if is_fence_line(line) {
                self.close_code();
            } else {
                code.lines.push(line.to_string());
            }
            return;
        }
        if is_fence_line(line) {
            self.flush_paragraph();
            self.close_table();
            let info = line.trim_start().trim_start_matches('`').trim();
            let language = info
                .split_whitespace()
                .next()
                .filter(|lang| !lang.is_empty())
                .map(str::to_string);
            self.code = Some(OpenCode {
                start: self.line,
                language,
                lines: Vec::new(),
            });
            return;
        }

        // Display-math blocks spanning lines
        if let Some(math) = self.math.as_mut() {
            math.lines.push(line.to_string());
            if line.contains(math.closer.as_str()) {
                self.close_math();
            }
            return;
        }

        let trimmed = line.trim();

        if let Some(closer) = math_block_closer(trimmed) {
            self.flush_paragraph();
            self.close_table();
            self.math = Some(OpenMath {
                start: self.line,
                closer,
                lines: vec![line.to_string()],
            });
            return;
        }

        // 3: tables
        if is_table_row(trimmed) {
            self.flush_paragraph();
            self.push_table_row(trimmed);
            return;
        }
        self.close_table();

        // 4: blank line ends the paragraph
        if trimmed.is_empty() {
            self.flush_paragraph();
            return;
        }

        if let Some(block) = single_line_block(trimmed) {
            self.flush_paragraph();
            self.items.push(Item::Block(block.starting_at(self.line)));
            return;
        }

        if let Some((kind, number, html)) = list_item(trimmed) {
            self.flush_paragraph();
            self.items.push(Item::ListItem(kind, number, html, self.line));
            return;
        }

        // 10: paragraph text
        if self.paragraph.is_empty() {
            self.paragraph_start = self.line;
        }
        self.paragraph.push(format_inline(trimmed));
    }

    fn push_table_row(&mut self, trimmed: &str) {
        let start = self.line;
        let table = self.table.get_or_insert_with(|| OpenTable {
            start,
            header_done: false,
            head: Vec::new(),
            body: Vec::new(),
        });

        if is_separator_row(trimmed) {
            table.header_done = true;
            return;
        }

        let tag = if table.header_done { "td" } else { "th" };
        let cells: String = trimmed
            .split('|')
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .map(|cell| format!("<{tag}>{}</{tag}>", format_inline(cell)))
            .collect();
        let row = format!("<tr>{cells}</tr>");
        if table.header_done {
            table.body.push(row);
        } else {
            table.head.push(row);
        }
    }

    fn flush_paragraph(&mut self) {
        if self.paragraph.is_empty() {
            return;
        }
        let html = format!("<p>{}</p>", self.paragraph.join("<br>\n"));
        self.paragraph.clear();
        let block = Block::new(BlockKind::Paragraph, html).starting_at(self.paragraph_start);
        self.items.push(Item::Block(block));
    }

    fn close_code(&mut self) {
        let Some(code) = self.code.take() else {
            return;
        };
        let raw = code.lines.join("\n");
        let class = code
            .language
            .as_deref()
            .map(|lang| format!(" class=\"language-{}\"", escape_html(lang)))
            .unwrap_or_default();
        let html = format!("<pre><code{class}>{}</code></pre>", escape_html(&raw));
        let kind = BlockKind::Code(CodeBlock {
            language: code.language,
            code: raw,
        });
        self.items.push(Item::Block(Block::new(kind, html).starting_at(code.start)));
    }

    fn close_math(&mut self) {
        let Some(math) = self.math.take() else {
            return;
        };
        let html = format!(
            "<div class=\"math math-display\">{}</div>",
            escape_html(&math.lines.join("\n"))
        );
        let block = Block::new(BlockKind::Math, html).starting_at(math.start);
        self.items.push(Item::Block(block));
    }

    fn close_table(&mut self) {
        let Some(table) = self.table.take() else {
            return;
        };
        let mut html = String::from("<table>");
        if !table.head.is_empty() {
            html.push_str("<thead>");
            html.push_str(&table.head.concat());
            html.push_str("</thead>");
        }
        if !table.body.is_empty() {
            html.push_str("<tbody>");
            html.push_str(&table.body.concat());
            html.push_str("</tbody>");
        }
        html.push_str("</table>");
        let block = Block::new(BlockKind::Table, html).starting_at(table.start);
        self.items.push(Item::Block(block));
    }

    /// Force-close anything still open and wrap list runs
    fn finish(mut self) -> Vec<Block> {
        self.flush_paragraph();
        self.close_code();
        self.close_math();
        self.close_table();
        wrap_lists(self.items)
    }
}

/// Headings, rules and blockquotes
fn single_line_block(trimmed: &str) -> Option<Block> {
    if let Some(caps) = HEADING.captures(trimmed) {
        let level = caps[1].len().min(6);
        let text = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let html = format!("<h{level}>{}</h{level}>", format_inline(text.trim()));
        return Some(Block::new(BlockKind::Heading(level as u8), html));
    }

    if is_rule(trimmed) {
        return Some(Block::new(BlockKind::Rule, "<hr>".to_string()));
    }

    if let Some(rest) = trimmed.strip_prefix('>') {
        let html = format!("<blockquote>{}</blockquote>", format_inline(rest.trim()));
        return Some(Block::new(BlockKind::Quote, html));
    }

    None
}

fn list_item(trimmed: &str) -> Option<(ListKind, Option<u64>, String)> {
    for (marker, checked) in [("- [ ] ", false), ("- [x] ", true), ("- [X] ", true)] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            let checkbox = if checked {
                "<input type=\"checkbox\" disabled checked>"
            } else {
                "<input type=\"checkbox\" disabled>"
            };
            let html = format!(
                "<li class=\"task-item\">{checkbox} {}</li>",
                format_inline(rest.trim())
            );
            return Some((ListKind::Task, None, html));
        }
    }

    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            let html = format!("<li>{}</li>", format_inline(rest.trim()));
            return Some((ListKind::Unordered, None, html));
        }
    }

    let caps = ORDERED_ITEM.captures(trimmed)?;
    let number = caps[1].parse::<u64>().ok();
    let html = format!("<li>{}</li>", format_inline(caps[2].trim()));
    Some((ListKind::Ordered, number, html))
}

fn is_rule(trimmed: &str) -> bool {
    matches!(trimmed, "---" | "***" | "___")
}

/// A line with a `|` outside code and math spans
fn is_table_row(trimmed: &str) -> bool {
    if !trimmed.contains('|') {
        return false;
    }
    let chars: Vec<char> = trimmed.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '|' => return true,
            '`' => {
                let start = i;
                while i < chars.len() && chars[i] == '`' {
                    i += 1;
                }
                if let Some(end) = find_closing_run(&chars, i, i - start) {
                    i = end;
                }
            }
            '$' => match chars[i + 1..].iter().position(|c| *c == '$') {
                Some(offset) => i += offset + 2,
                None => i += 1,
            },
            _ => i += 1,
        }
    }
    false
}

fn is_separator_row(trimmed: &str) -> bool {
    trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| matches!(c, '-' | ':' | '|' | ' ' | '\t'))
}

struct ListRun {
    kind: ListKind,
    start: Option<u64>,
    first_line: usize,
    entries: Vec<String>,
}

/// Wrap consecutive list items of one flavour in a single list element
fn wrap_lists(items: Vec<Item>) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(items.len());
    let mut run: Option<ListRun> = None;

    let flush = |run: &mut Option<ListRun>, blocks: &mut Vec<Block>| {
        if let Some(ListRun {
            kind,
            start,
            first_line,
            entries,
        }) = run.take()
        {
            let open = match (kind, start) {
                (ListKind::Ordered, Some(n)) if n != 1 => format!("<ol start=\"{n}\">"),
                (ListKind::Ordered, _) => "<ol>".to_string(),
                (ListKind::Task, _) => "<ul class=\"task-list\">".to_string(),
                (ListKind::Unordered, _) => "<ul>".to_string(),
            };
            let close = if kind == ListKind::Ordered { "</ol>" } else { "</ul>" };
            let html = format!("{open}\n{}\n{close}", entries.join("\n"));
            blocks.push(Block::new(BlockKind::List(kind), html).starting_at(first_line));
        }
    };

    for item in items {
        match item {
            Item::ListItem(kind, number, html, line) => match run.as_mut() {
                Some(open) if open.kind == kind => open.entries.push(html),
                _ => {
                    flush(&mut run, &mut blocks);
                    run = Some(ListRun {
                        kind,
                        start: number,
                        first_line: line,
                        entries: vec![html],
                    });
                }
            },
            Item::Block(block) => {
                flush(&mut run, &mut blocks);
                blocks.push(block);
            }
        }
    }
    flush(&mut run, &mut blocks);
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_code_block_verbatim() {
        let html = to_blocks("```python\ndef f():\n    return 1\n```");
        assert!(html.contains(
            "<pre><code class=\"language-python\">def f():\n    return 1</code></pre>"
        ));
    }

    #[test]
    fn test_code_is_escaped_exactly_once() {
        let html = to_blocks("```\nif a < b && c > d { \"&amp;\" }\n```");
        assert_eq!(
            html,
            "<pre><code>if a &lt; b &amp;&amp; c &gt; d { &quot;&amp;amp;&quot; }</code></pre>"
        );
    }

    #[test]
    fn test_no_inline_formatting_inside_code() {
        let html = to_blocks("```\n**not bold** and $x$\n```");
        assert!(html.contains("**not bold** and $x$"));
        assert!(!html.contains("<strong>"));
    }

    #[test]
    fn test_unterminated_code_is_force_closed() {
        let blocks = classify("```rust\nfn main() {").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].code(),
            Some(&CodeBlock {
                language: Some("rust".into()),
                code: "fn main() {".into()
            })
        );
    }

    #[test]
    fn test_headings() {
        assert_eq!(to_blocks("# One"), "<h1>One</h1>");
        assert_eq!(to_blocks("###### Six"), "<h6>Six</h6>");
        assert_eq!(to_blocks("######## Capped"), "<h6>Capped</h6>");
        assert_eq!(to_blocks("#hashtag"), "<p>#hashtag</p>");
    }

    #[test]
    fn test_rules_quotes_and_paragraphs() {
        let html = to_blocks("first line\nsecond **line**\n\n---\n> quoted *text*");
        assert_eq!(
            html,
            "<p>first line<br>\nsecond <strong>line</strong></p>\n<hr>\n<blockquote>quoted <em>text</em></blockquote>"
        );
    }

    #[test]
    fn test_lists_are_wrapped_and_merged() {
        let html = to_blocks("- a\n* b\n\n+ c\n1. one\n2. two\n- [ ] todo\n- [x] done");
        assert_eq!(
            html,
            "<ul>\n<li>a</li>\n<li>b</li>\n<li>c</li>\n</ul>\n\
             <ol>\n<li>one</li>\n<li>two</li>\n</ol>\n\
             <ul class=\"task-list\">\n\
             <li class=\"task-item\"><input type=\"checkbox\" disabled> todo</li>\n\
             <li class=\"task-item\"><input type=\"checkbox\" disabled checked> done</li>\n</ul>"
        );
    }

    #[test]
    fn test_ordered_list_start() {
        assert_eq!(
            to_blocks("3. three\n4. four"),
            "<ol start=\"3\">\n<li>three</li>\n<li>four</li>\n</ol>"
        );
    }

    #[test]
    fn test_table() {
        let html = to_blocks("| Name | Qty |\n|---|:-:|\n| apple | 3 |\n| pear | |\ntext");
        assert_eq!(
            html,
            "<table><thead><tr><th>Name</th><th>Qty</th></tr></thead>\
             <tbody><tr><td>apple</td><td>3</td></tr><tr><td>pear</td></tr></tbody></table>\n\
             <p>text</p>"
        );
    }

    #[test]
    fn test_blocks_remember_their_first_line() {
        let blocks =
            classify("Intro.\n\n- a\n- b\n\n```\nx\n```\n$$\ny\n$$\n| a |\ntext\n# End")
                .unwrap();
        let lines: Vec<usize> = blocks.iter().map(Block::first_line).collect();
        assert_eq!(lines, vec![0, 2, 5, 8, 11, 12, 13]);
    }

    #[test]
    fn test_pipes_inside_math_or_code_are_not_tables() {
        assert!(!to_blocks("norm $|x|$ here").contains("<table>"));
        assert!(!to_blocks("run `a | b` now").contains("<table>"));
    }

    #[test]
    fn test_display_math_block() {
        let blocks = classify("Before\n$$\n\\frac{a}{b} < 1\n$$\nAfter").unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1].kind, BlockKind::Math);
        assert_eq!(
            blocks[1].html,
            "<div class=\"math math-display\">$$\n\\frac{a}{b} &lt; 1\n$$</div>"
        );
        assert!(blocks[1].has_math());
        assert!(!blocks[0].has_math());
    }

    #[test]
    fn test_environment_block() {
        let blocks = classify("\\begin{align}\na &= b \\\\\nc &= d\n\\end{align}").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Math);
    }

    #[test]
    fn test_oversized_input_placeholder() {
        let big = "a".repeat(MAX_RENDER_CHARS + 1);
        assert!(matches!(
            classify(&big),
            Err(RenderError::InputTooLarge { .. })
        ));
        assert!(to_blocks(&big).starts_with("<p class=\"render-placeholder\">"));
    }
}
