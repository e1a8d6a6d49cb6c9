//! Splitting image sequences into chunks that fit the model's batch dimension.

use std::num::NonZeroUsize;

use crate::error::ConfigError;

/// Batch contract read from the leading dimension of the model input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchSize {
    /// Symbolic batch dimension (`-1`), any number of images per call.
    Dynamic,
    /// Exactly this many images per call; the last chunk may be shorter and
    /// is padded up to it before inference.
    Fixed(NonZeroUsize),
}

impl BatchSize {
    pub fn from_dim(dim: i64) -> Result<Self, ConfigError> {
        match dim {
            -1 => Ok(Self::Dynamic),
            n if n > 0 => usize::try_from(n)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(Self::Fixed)
                .ok_or_else(|| ConfigError::Shape {
                    message: format!("batch dimension {n} is too large"),
                }),
            n => Err(ConfigError::Shape {
                message: format!("invalid batch dimension {n}"),
            }),
        }
    }

    /// Number of images the engine receives for a chunk of `chunk_len`.
    /// A short final chunk under a fixed batch size is padded up to it.
    pub fn call_len(self, chunk_len: usize) -> usize {
        match self {
            Self::Dynamic => chunk_len,
            Self::Fixed(n) => n.get().max(chunk_len),
        }
    }
}

/// Partition `items` into ordered, non-overlapping chunks.
pub fn plan<T>(items: &[T], batch_size: BatchSize) -> Vec<&[T]> {
    if items.is_empty() {
        return Vec::new();
    }
    match batch_size {
        BatchSize::Dynamic => vec![items],
        BatchSize::Fixed(n) => items.chunks(n.get()).collect(),
    }
}

/// Replace a symbolic leading dimension with the actual chunk length.
pub fn resolve_shape(declared: &[i64], chunk_len: usize) -> Vec<i64> {
    let mut shape = declared.to_vec();
    if let Some(dim) = shape.first_mut() {
        if *dim == -1 {
            *dim = chunk_len as i64;
        }
    }
    shape
}
