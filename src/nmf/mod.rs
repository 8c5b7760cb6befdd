//! Multiplicative-update non-negative matrix factorization.
//!
//! Matrix orientation is fixed across the module: observations are
//! `(bins × frames)`, bases are `(bins × k)` and activations are
//! `(k × frames)`.

pub mod batch;
pub mod cost;
pub mod frame;
pub mod init;
pub mod transcriber;

use ndarray::Array2;
use thiserror::Error;

pub use batch::{factorize, BatchConfig, BatchFactorization, UpdateOrder};
pub use cost::{CostKind, CostModel};
pub use frame::{factorize_frame, FrameConfig, FrameFactorization};
pub use transcriber::{transcribe, transcribe_frame, TranscriptionConfig};

/// Floor applied to every multiplicative-update denominator.
pub const EPSILON: f64 = 1e-12;

/// Convenient alias for results returned by the factorization modules.
pub type Result<T> = std::result::Result<T, NmfError>;

/// Failures raised by the factorizers, the dictionary builder and the
/// transcription analysis helpers.
#[derive(Error, Debug)]
pub enum NmfError {
    /// A supplied matrix does not fit the observation or the requested rank.
    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// A computation produced a non-finite value with no recovery policy.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    /// The cost selector did not name a known cost family.
    #[error("invalid cost kind \"{0}\" (expected frobenius, kld or beta)")]
    InvalidCostKind(String),

    /// A note range whose lower bound exceeds its upper bound.
    #[error("invalid note range {min}..={max}")]
    InvalidRange { min: u8, max: u8 },

    #[error("note table contains no entries")]
    EmptyNoteTable,

    /// A malformed line in a note-info table.
    #[error("note table line {line}: {message}")]
    NoteTable { line: usize, message: String },

    /// The representation collaborator failed for a single note.
    #[error("failed to compute representation for MIDI note {note}: {source}")]
    Representation {
        note: u8,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// `value^exponent`, flooring `value` at `EPSILON` when the exponent is
/// negative so zeros never turn into infinities.
pub(crate) fn floored_pow(value: f64, exponent: f64) -> f64 {
    if exponent < 0.0 {
        value.max(EPSILON).powf(exponent)
    } else {
        value.powf(exponent)
    }
}

/// Ensures `matrix` has exactly the `expected` shape.
pub(crate) fn ensure_shape(
    what: &'static str,
    matrix: &Array2<f64>,
    expected: (usize, usize),
) -> Result<()> {
    if matrix.dim() != expected {
        return Err(NmfError::ShapeMismatch {
            what,
            expected,
            actual: matrix.dim(),
        });
    }
    Ok(())
}
