//! Render Pipeline
//!
//! Turns the full text of one message into markup and decides how the host
//! should bring its surface up to date: reload everything, patch a range of
//! blocks, or update a live stream (frozen stable blocks plus a plain-text
//! volatile tail).
//!
//! Decision order for a render call:
//! 1. first content for the message: full render
//! 2. structural fingerprint moved materially: full render
//! 3. streaming: split, re-render the stable region only when it changed
//! 4. otherwise: block-level patch, falling back to a full render
//!
//! Any rendering error degrades to an escaped plain-text rendition.

use std::collections::HashMap;
use std::hash::Hash;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace, warn};

use super::blocks::{classify, join_blocks, Block, BlockKind, CodeBlock};
use super::config::RenderConfig;
use super::escape::{escape_html, escape_plain_text};
use super::fingerprint::Fingerprint;
use super::highlight::Highlighter;
use super::oracle::is_safe_boundary;
use super::splitter::split;
use crate::error::RenderError;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Host clipboard capability, called when the user copies a code block
pub trait ClipboardSink {
    fn write_text(&mut self, text: &str) -> anyhow::Result<()>;
}

/// Replacement of a contiguous range of top-level blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPatch {
    /// Index of the first replaced block
    pub start: usize,
    /// Number of blocks removed at `start`
    pub remove: usize,
    /// Markup of the blocks inserted at `start`
    pub insert: Vec<String>,
}

/// How the host should update what it currently shows for a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayInstruction {
    /// Replace the whole content node with [`RenderOutput::html`]
    Reload,
    /// Replace a range of blocks, keeping the scroll offset
    Patch(BlockPatch),
    /// Live stream update: an optional patch to the stable blocks and the
    /// new markup of the volatile tail (plain text with a cursor)
    Stream {
        stable: Option<BlockPatch>,
        volatile_html: String,
    },
    /// The surface is already up to date
    Unchanged,
}

/// Result of one render call
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub instruction: DisplayInstruction,
    /// Complete markup of the message as it should now look
    pub html: String,
    /// Estimated content height in pixels
    pub height_hint: f32,
    /// Whether the host needs to reflow its layout
    pub height_changed: bool,
    /// Indices of blocks whose math the host must typeset. Blocks already on
    /// the surface are never listed again.
    pub typeset_blocks: Vec<usize>,
}

/// Per-message render memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    pub last_rendered_text: String,
    /// Frozen stable region (the whole text once finalized)
    pub stable_text: String,
    pub stable_html: String,
    /// Tail shown as plain text while streaming
    pub volatile_text: String,
    pub initialized: bool,
    /// Whether the surface currently shows a live stream
    pub streaming: bool,
    pub height_hint: f32,
    blocks: Vec<Block>,
}

impl RenderState {
    /// Blocks currently on the surface (stable region only while streaming)
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Markup of the whole surface as last rendered
    pub fn surface_html(&self) -> String {
        if !self.streaming {
            return self.stable_html.clone();
        }
        let volatile = volatile_html(&self.volatile_text);
        if self.stable_html.is_empty() {
            volatile
        } else {
            format!("{}\n{}", self.stable_html, volatile)
        }
    }
}

/// Render `full_text` against the state of its previous render.
///
/// Pure apart from the highlight memo: the same inputs always produce the
/// same state and output.
pub fn render(
    full_text: &str,
    is_streaming: bool,
    prior: &RenderState,
    config: &RenderConfig,
    highlighter: &mut Highlighter,
) -> (RenderState, RenderOutput) {
    if prior.initialized
        && prior.streaming == is_streaming
        && prior.last_rendered_text == full_text
    {
        trace!("Render pipeline: unchanged ({} bytes)", full_text.len());
        let output = RenderOutput {
            instruction: DisplayInstruction::Unchanged,
            html: prior.surface_html(),
            height_hint: prior.height_hint,
            height_changed: false,
            typeset_blocks: Vec::new(),
        };
        return (prior.clone(), output);
    }

    let reload = !prior.initialized
        || Fingerprint::of(full_text)
            .differs_materially(&Fingerprint::of(&prior.last_rendered_text));

    let mut ctx = Context {
        config,
        highlighter,
    };
    let result = if is_streaming {
        ctx.render_streaming(full_text, prior, reload)
    } else if reload {
        ctx.render_full(full_text)
    } else {
        ctx.render_patch(full_text, prior).or_else(|err| {
            debug!("Render pipeline: {}, doing a full render", err);
            ctx.render_full(full_text)
        })
    };

    let (mut state, mut output) = match result {
        Ok(rendered) => rendered,
        Err(err) => plain_text_fallback(full_text, err),
    };
    state.initialized = true;
    state.last_rendered_text = full_text.to_string();
    state.height_hint = estimate_height(&state.blocks, &state.volatile_text, config);
    output.height_hint = state.height_hint;
    output.height_changed =
        !prior.initialized || (state.height_hint - prior.height_hint).abs() >= 0.5;
    (state, output)
}

struct Context<'a> {
    config: &'a RenderConfig,
    highlighter: &'a mut Highlighter,
}

impl Context<'_> {
    fn render_full(&mut self, text: &str) -> Result<(RenderState, RenderOutput), RenderError> {
        let blocks = self.decorate(classify(text)?);
        let typeset_blocks = math_blocks(&blocks, 0..blocks.len());
        let stable_html = join_blocks(&blocks);
        let output = RenderOutput {
            instruction: DisplayInstruction::Reload,
            html: stable_html.clone(),
            height_hint: 0.0,
            height_changed: false,
            typeset_blocks,
        };
        let state = RenderState {
            stable_text: text.to_string(),
            stable_html,
            blocks,
            ..RenderState::default()
        };
        Ok((state, output))
    }

    fn render_patch(
        &mut self,
        text: &str,
        prior: &RenderState,
    ) -> Result<(RenderState, RenderOutput), RenderError> {
        if prior.streaming {
            return Err(RenderError::Patch(
                "surface still shows a live stream".to_string(),
            ));
        }
        let blocks = self.decorate(classify(text)?);
        let patch = diff_blocks(&prior.blocks, &blocks);
        let typeset_blocks = patch
            .as_ref()
            .map(|p| math_blocks(&blocks, p.start..p.start + p.insert.len()))
            .unwrap_or_default();
        let stable_html = join_blocks(&blocks);
        let output = RenderOutput {
            instruction: patch.map_or(DisplayInstruction::Unchanged, DisplayInstruction::Patch),
            html: stable_html.clone(),
            height_hint: 0.0,
            height_changed: false,
            typeset_blocks,
        };
        let state = RenderState {
            stable_text: text.to_string(),
            stable_html,
            blocks,
            ..RenderState::default()
        };
        Ok((state, output))
    }

    fn render_streaming(
        &mut self,
        text: &str,
        prior: &RenderState,
        reload: bool,
    ) -> Result<(RenderState, RenderOutput), RenderError> {
        let reload = reload || !prior.streaming;
        let mut stable_text = settled_prefix(split(text).stable)?;

        // The stable boundary never moves backwards during a stream.
        if !reload
            && prior.stable_text.len() > stable_text.len()
            && text.starts_with(prior.stable_text.as_str())
        {
            stable_text = prior.stable_text.clone();
        }
        let volatile_text = text[stable_text.len()..].to_string();

        let (blocks, stable_patch, typeset_blocks) =
            if !reload && prior.stable_text == stable_text {
                (prior.blocks.clone(), None, Vec::new())
            } else {
                let blocks = self.decorate(classify(&stable_text)?);
                if reload {
                    let typeset = math_blocks(&blocks, 0..blocks.len());
                    (blocks, None, typeset)
                } else {
                    let patch = diff_blocks(&prior.blocks, &blocks);
                    let typeset = patch
                        .as_ref()
                        .map(|p| math_blocks(&blocks, p.start..p.start + p.insert.len()))
                        .unwrap_or_default();
                    (blocks, patch, typeset)
                }
            };

        trace!(
            "Render pipeline: stream split {} stable / {} volatile bytes",
            stable_text.len(),
            volatile_text.len()
        );

        let state = RenderState {
            stable_html: join_blocks(&blocks),
            stable_text,
            volatile_text,
            streaming: true,
            blocks,
            ..RenderState::default()
        };
        let instruction = if reload {
            DisplayInstruction::Reload
        } else {
            DisplayInstruction::Stream {
                stable: stable_patch,
                volatile_html: volatile_html(&state.volatile_text),
            }
        };
        let output = RenderOutput {
            instruction,
            html: state.surface_html(),
            height_hint: 0.0,
            height_changed: false,
            typeset_blocks,
        };
        Ok((state, output))
    }

    /// Highlight code blocks and give each its copy affordance
    fn decorate(&mut self, blocks: Vec<Block>) -> Vec<Block> {
        let mut code_index = 0;
        blocks
            .into_iter()
            .map(|mut block| {
                if let BlockKind::Code(code) = &block.kind {
                    block.html = self.code_block_html(code, code_index);
                    code_index += 1;
                }
                block
            })
            .collect()
    }

    fn code_block_html(&mut self, code: &CodeBlock, index: usize) -> String {
        let language = code.language.as_deref();
        let body = match self
            .highlighter
            .highlight(&code.code, language, self.config.theme)
        {
            Ok(body) => body,
            Err(err) => {
                warn!("Render pipeline: {}", err);
                escape_html(&code.code)
            }
        };
        let class = language
            .map(|lang| format!(" class=\"language-{}\"", escape_html(lang)))
            .unwrap_or_default();
        format!(
            "<div class=\"code-block\" data-code-index=\"{index}\">\
             <button class=\"copy-code\" data-code-index=\"{index}\">Copy</button>\
             <pre><code{class}>{body}</code></pre></div>"
        )
    }
}

/// Drop trailing blocks that hold math and may still grow. Math on the
/// surface is typeset once, so its block has to be final before freezing.
fn settled_prefix(mut stable: String) -> Result<String, RenderError> {
    let blocks = classify(&stable)?;
    for block in blocks.iter().rev() {
        if !block.has_math() || is_sealed(block, &stable) {
            break;
        }
        let start: usize = stable
            .split_inclusive('\n')
            .take(block.first_line())
            .map(str::len)
            .sum();
        trace!("Render pipeline: holding back open math block at byte {}", start);
        stable.truncate(start);
    }
    if !is_safe_boundary(&stable) {
        stable.clear();
    }
    Ok(stable)
}

/// Whether later lines can no longer change `block`, the last one in `text`
fn is_sealed(block: &Block, text: &str) -> bool {
    if !text.ends_with('\n') {
        return false;
    }
    match block.kind {
        BlockKind::Heading(_)
        | BlockKind::Rule
        | BlockKind::Quote
        | BlockKind::Code(_)
        | BlockKind::Math => true,
        BlockKind::Paragraph | BlockKind::Table => text
            .split_inclusive('\n')
            .last()
            .is_some_and(|line| line.trim().is_empty()),
        // Items after blank lines still join the same list.
        BlockKind::List(_) => false,
    }
}

fn volatile_html(text: &str) -> String {
    format!(
        "<div class=\"volatile\">{}<span class=\"streaming-cursor\"></span></div>",
        escape_plain_text(text)
    )
}

fn plain_text_fallback(text: &str, err: RenderError) -> (RenderState, RenderOutput) {
    warn!("Render pipeline: falling back to plain text: {}", err);
    let html = format!(
        "<div class=\"render-fallback\">{}</div>",
        escape_plain_text(text)
    );
    let output = RenderOutput {
        instruction: DisplayInstruction::Reload,
        html: html.clone(),
        height_hint: 0.0,
        height_changed: false,
        typeset_blocks: Vec::new(),
    };
    let state = RenderState {
        stable_text: text.to_string(),
        stable_html: html.clone(),
        blocks: vec![Block::new(BlockKind::Paragraph, html)],
        ..RenderState::default()
    };
    (state, output)
}

/// Smallest block range turning `old` into `new`, or None if equal
fn diff_blocks(old: &[Block], new: &[Block]) -> Option<BlockPatch> {
    let prefix = old
        .iter()
        .zip(new)
        .take_while(|(a, b)| a.html == b.html)
        .count();
    if prefix == old.len() && prefix == new.len() {
        return None;
    }
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a.html == b.html)
        .count();
    Some(BlockPatch {
        start: prefix,
        remove: old.len() - prefix - suffix,
        insert: new[prefix..new.len() - suffix]
            .iter()
            .map(|block| block.html.clone())
            .collect(),
    })
}

fn math_blocks(blocks: &[Block], range: std::ops::Range<usize>) -> Vec<usize> {
    range.filter(|&i| blocks[i].has_math()).collect()
}

/// Number of display lines `text` wraps to
fn wrapped_lines(text: &str, per_line: usize) -> usize {
    text.lines()
        .map(|line| line.chars().count().max(1).div_ceil(per_line))
        .sum::<usize>()
        .max(1)
}

fn estimate_height(blocks: &[Block], volatile: &str, config: &RenderConfig) -> f32 {
    let line = config.line_height();
    let margin = config.font_size * 0.75;
    let per_line = config.chars_per_line();

    let mut height = 0.0;
    for block in blocks {
        let text = TAG.replace_all(&block.html, "");
        height += match &block.kind {
            BlockKind::Paragraph | BlockKind::Quote => {
                wrapped_lines(&text, per_line) as f32 * line + margin
            }
            BlockKind::Heading(level) => {
                let scale = 1.0 + f32::from(6 - (*level).min(6)) * 0.1;
                wrapped_lines(&text, per_line) as f32 * line * scale + margin
            }
            BlockKind::Rule => margin * 2.0,
            BlockKind::List(_) => {
                let items = block.html.matches("<li").count();
                items.max(wrapped_lines(&text, per_line)) as f32 * line + margin
            }
            BlockKind::Table => block.html.matches("<tr").count() as f32 * line * 1.4 + margin,
            BlockKind::Code(code) => {
                code.code.lines().count().max(1) as f32 * line * 0.95 + 24.0 + margin
            }
            BlockKind::Math => {
                text.lines().count().max(1) as f32 * line * 1.6 + margin
            }
        };
    }
    if !volatile.is_empty() {
        height += wrapped_lines(volatile, per_line) as f32 * line;
    }
    height
}

/// Owns the render state of every displayed message
pub struct RenderPipeline<K = String> {
    config: RenderConfig,
    states: HashMap<K, RenderState>,
    highlighter: Highlighter,
}

impl<K: Eq + Hash + Clone> RenderPipeline<K> {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            highlighter: Highlighter::new(),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Change display settings. Every message reloads on its next render.
    pub fn set_config(&mut self, config: RenderConfig) {
        if config == self.config {
            return;
        }
        self.config = config;
        for state in self.states.values_mut() {
            state.initialized = false;
        }
    }

    /// Render the current text of a message
    pub fn render(&mut self, key: &K, full_text: &str, is_streaming: bool) -> RenderOutput {
        let prior = self.states.remove(key).unwrap_or_default();
        let (state, output) = render(
            full_text,
            is_streaming,
            &prior,
            &self.config,
            &mut self.highlighter,
        );
        self.states.insert(key.clone(), state);
        output
    }

    pub fn state(&self, key: &K) -> Option<&RenderState> {
        self.states.get(key)
    }

    /// Drop the render state of a removed message
    pub fn forget(&mut self, key: &K) {
        self.states.remove(key);
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Forward the raw code of a rendered code block to the host clipboard
    pub fn copy_code(
        &self,
        key: &K,
        index: usize,
        sink: &mut dyn ClipboardSink,
    ) -> Result<(), RenderError> {
        let code = self
            .states
            .get(key)
            .and_then(|state| state.blocks.iter().filter_map(Block::code).nth(index))
            .ok_or(RenderError::UnknownCodeBlock { index })?;
        sink.write_text(&code.code)
            .map_err(|e| RenderError::Clipboard(e.to_string()))
    }
}

impl<K: Eq + Hash + Clone> Default for RenderPipeline<K> {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}
