//! Host display settings consumed by the renderer

use serde::{Deserialize, Serialize};

use crate::constants::render::{DEFAULT_CONTENT_WIDTH, DEFAULT_FONT_SIZE};

/// Color theme of the display surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTheme {
    Light,
    #[default]
    Dark,
}

impl ColorTheme {
    /// Bundled syntect theme used for code blocks
    pub fn syntect_theme(self) -> &'static str {
        match self {
            ColorTheme::Light => "InspiredGitHub",
            ColorTheme::Dark => "base16-ocean.dark",
        }
    }
}

/// Font size, theme and width of the surface the markup is painted on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Body font size in pixels
    pub font_size: f32,
    pub theme: ColorTheme,
    /// Width available to the message body in pixels
    pub content_width: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            theme: ColorTheme::default(),
            content_width: DEFAULT_CONTENT_WIDTH,
        }
    }
}

impl RenderConfig {
    /// Line height in pixels
    pub fn line_height(&self) -> f32 {
        self.font_size.max(1.0) * 1.5
    }

    /// Rough number of body characters that fit on one line
    pub fn chars_per_line(&self) -> usize {
        let glyph_width = self.font_size.max(1.0) * 0.55;
        ((self.content_width / glyph_width).floor() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chars_per_line_never_zero() {
        let config = RenderConfig {
            font_size: 14.0,
            theme: ColorTheme::Dark,
            content_width: 0.0,
        };
        assert_eq!(config.chars_per_line(), 1);
        assert!(RenderConfig::default().chars_per_line() > 40);
    }
}
