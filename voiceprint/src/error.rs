use thiserror::Error;

/// Errors returned by voiceprint operations.
#[derive(Debug, Error)]
pub enum VoiceprintError {
    #[error("audio too short: need at least {min} samples, got {got}")]
    AudioTooShort { min: usize, got: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("model error: {0}")]
    Model(String),
}
