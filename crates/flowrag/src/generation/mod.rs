//! Prompt rendering and answer generation

pub mod generator;
pub mod ollama;
pub mod prompt;

pub use generator::Generator;
pub use ollama::OllamaClient;
pub use prompt::{PromptBuilder, PromptTemplate, DEFAULT_TEMPLATE};
