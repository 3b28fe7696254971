//! Incremental streaming-markdown renderer
//!
//! Leaves first:
//! - [`inline`]: inline formatting with math and code spans protected
//! - [`blocks`]: line-oriented block classifier
//! - [`oracle`]: unterminated-construct detector
//! - [`splitter`]: stable/volatile split of a streaming buffer
//! - [`pipeline`]: per-message render decisions (reload, patch, stream)

pub mod blocks;
pub mod cache;
pub mod config;
pub mod escape;
pub mod fingerprint;
pub mod highlight;
pub mod inline;
pub mod oracle;
pub mod pipeline;
pub mod splitter;

pub use blocks::{classify, to_blocks, Block, BlockKind, CodeBlock, ListKind};
pub use config::{ColorTheme, RenderConfig};
pub use escape::escape_html;
pub use fingerprint::Fingerprint;
pub use highlight::Highlighter;
pub use inline::format_inline;
pub use oracle::is_safe_boundary;
pub use pipeline::{
    render, BlockPatch, ClipboardSink, DisplayInstruction, RenderOutput, RenderPipeline,
    RenderState,
};
pub use splitter::{split, StreamSplit};
