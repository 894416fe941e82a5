// Embeddings module
// Capability traits for embedding and chat completion, and the Ollama client that backs both

pub mod ollama;

use crate::Result;
use crate::session::ChatMessage;

pub use ollama::{ModelInfo, OllamaClient};

/// Maps texts to fixed-length vectors, preserving input order
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Generates one completion for an ordered list of role-tagged messages
pub trait ChatCompletion: Send + Sync {
    fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String>;
}

impl<T: Embedder + ?Sized> Embedder for std::sync::Arc<T> {
    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }
}

impl<T: ChatCompletion + ?Sized> ChatCompletion for std::sync::Arc<T> {
    #[inline]
    fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        (**self).chat(model, messages)
    }
}
