//! Error types for anchormatch.

use thiserror::Error;

/// Result alias for anchormatch operations.
pub type AnchorMatchResult<T> = std::result::Result<T, AnchorMatchError>;

/// Errors raised by box geometry, anchor generation, and target assignment.
///
/// None of these are transient: every operation in the crate is pure, so a
/// failing call fails identically when repeated.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AnchorMatchError {
    /// A box has non-positive extent or non-finite/inverted coordinates.
    #[error("degenerate box: height {height}, width {width}")]
    DegenerateBox { height: f32, width: f32 },
    /// A score, regression, or proposal array does not line up with the
    /// boxes it is paired with.
    #[error("shape mismatch for {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        expected: usize,
        got: usize,
        context: &'static str,
    },
    /// The anchor configuration was never generated or cannot tile the image.
    #[error("configuration mismatch: {reason}")]
    ConfigurationMismatch { reason: &'static str },
    /// A threshold or count in a configuration struct is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },
}
