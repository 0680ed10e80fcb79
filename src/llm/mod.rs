pub mod client;
pub mod prompt;
pub mod stream;

pub use client::{GenerationError, GenerationSource, OllamaClient};
pub use prompt::{build_prompt, DEFAULT_INSTRUCTION};
pub use stream::{extract, fix_quote, ChunkStream, ExtractError};
