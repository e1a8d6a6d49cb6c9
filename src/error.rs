//! Error types for the tagging pipeline.
//!
//! Construction problems surface as [`ConfigError`] and are fatal to session
//! creation. Everything that goes wrong inside [`Tagger::run`](crate::Tagger::run)
//! is fatal to that call only.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error coming out of an inference backend.
pub type EngineError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum TaggerError {
    /// Bad model or tag paths, malformed metadata, unsupported shapes
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input/output tensor construction failed
    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    /// The inference engine call failed
    #[error("Inference failed: {source}")]
    Inference {
        #[source]
        source: EngineError,
    },

    /// Releasing engine-side resources failed
    #[error("Failed to release session resources: {message}")]
    Resource { message: String },
}

impl TaggerError {
    /// Wrap any backend error as an inference failure without inspecting it.
    pub fn inference(source: impl Into<EngineError>) -> Self {
        Self::Inference {
            source: source.into(),
        }
    }
}

/// Errors raised while building a session.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Model file does not exist
    #[error("Model not found: {0}")]
    ModelNotFound(PathBuf),

    /// The inference backend refused the model
    #[error("Failed to load model {path}: {message}")]
    Model { path: PathBuf, message: String },

    /// Tag metadata could not be read or parsed
    #[error("Failed to read tags from {path}: {source}")]
    Tags {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Declared tensor shapes are not usable for a tagger
    #[error("Unsupported model shape: {message}")]
    Shape { message: String },
}

/// Tensor construction errors inside a run.
#[derive(Error, Debug)]
pub enum TensorError {
    /// Input buffer does not fit the resolved input shape
    #[error("Failed to create input tensor {shape:?}: {message}")]
    Input { shape: Vec<i64>, message: String },

    /// Output buffer does not fit the resolved output shape
    #[error("Failed to create output tensor {shape:?}: {message}")]
    Output { shape: Vec<i64>, message: String },
}

/// Convenience alias for results of this crate.
pub type Result<T> = std::result::Result<T, TaggerError>;
