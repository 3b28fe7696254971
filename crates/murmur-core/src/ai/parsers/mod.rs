//! SSE parser implementations

mod openai;

pub use openai::OpenAIParser;
