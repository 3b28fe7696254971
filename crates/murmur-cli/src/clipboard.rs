//! System clipboard for copied code blocks

use anyhow::{Context, Result};
use murmur_core::ClipboardSink;

/// Clipboard backed by `arboard`, opened lazily on first copy
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl ClipboardSink for SystemClipboard {
    fn write_text(&mut self, text: &str) -> Result<()> {
        if self.inner.is_none() {
            self.inner = Some(arboard::Clipboard::new().context("clipboard unavailable")?);
        }
        if let Some(clipboard) = self.inner.as_mut() {
            clipboard
                .set_text(text.to_string())
                .context("failed to write clipboard")?;
        }
        Ok(())
    }
}
