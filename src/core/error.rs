//! Typed errors shared by every component of the region.

use thiserror::Error;

/// Errors produced by region components.
#[derive(Debug, Error)]
pub enum RegionError {
    /// A constructor or setter was handed a parameter outside its valid range.
    #[error("invalid parameter `{name}`: {message}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// An input vector did not match the width the component was built for.
    #[error("shape mismatch: expected {expected} bits, got {actual}")]
    ShapeMismatch {
        /// The width the component expects.
        expected: usize,
        /// The width it was given.
        actual: usize,
    },

    /// An index referred past the end of the space it addresses.
    #[error("index {index} out of bounds for size {size}")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// The size of the indexed space.
        size: usize,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RegionError>;
