//! Application constants

/// Network defaults for the local inference server
pub mod ai {
    /// Default OpenAI-compatible base URL of the local server
    pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080/v1";
    /// Model id used when none is configured and the server lists none
    pub const FALLBACK_MODEL: &str = "default";
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
    pub const DEFAULT_MAX_TOKENS: u32 = 2048;
    /// Metadata calls (model listing)
    pub const MODELS_TIMEOUT_SECS: u64 = 5;
    /// Whole generation stream
    pub const STREAM_TIMEOUT_SECS: u64 = 300;
    pub const CONNECT_TIMEOUT_SECS: u64 = 5;
    pub const DEFAULT_MAX_RETRIES: u32 = 2;
}

/// Renderer thresholds
pub mod render {
    /// Below this many characters a streaming buffer is entirely volatile
    pub const SHORT_CONTENT_THRESHOLD: usize = 50;
    /// Sentence-level splitting is only attempted above this length
    pub const SENTENCE_SPLIT_THRESHOLD: usize = 150;
    /// Inputs larger than this are not converted
    pub const MAX_RENDER_CHARS: usize = 50_000;
    /// Allowed drift in table pipe count before a reload is forced
    pub const PIPE_COUNT_TOLERANCE: usize = 4;
    /// Length ratio window outside of which a reload is forced
    pub const MIN_LENGTH_RATIO: f64 = 0.5;
    pub const MAX_LENGTH_RATIO: f64 = 1.5;
    pub const DEFAULT_FONT_SIZE: f32 = 14.0;
    pub const DEFAULT_CONTENT_WIDTH: f32 = 640.0;
}

/// Filesystem layout
pub mod ui {
    pub const CONFIG_DIR_NAME: &str = ".murmur";
    pub const CONFIG_FILE_NAME: &str = "config.toml";
    pub const LOG_FILE_NAME: &str = "murmur.log";
}
