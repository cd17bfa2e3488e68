use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Incorrect type {found} for '{name}': expected a float, an int or a list of numbers")]
    IncorrectType { name: String, found: &'static str },

    #[error("Empty list given for '{name}'")]
    EmptyList { name: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Structure '{name}' has no atoms")]
    EmptyStructure { name: String },

    #[error("Cannot collate an empty batch")]
    EmptyBatch,

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}
