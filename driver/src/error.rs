use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    /// The oracle itself failed (tokenizer, tensor or backend error).
    #[error("model failed to complete the prompt: {0}")]
    Oracle(eyre::Report),
}
