use ndarray::{Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::debug;

use super::cost::CostKind;
use super::frame::{factorize_frame, FrameConfig, FrameFactorization};
use super::init::derive_seed;
use super::{NmfError, Result};

/// Parameters for [`transcribe`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub frame: FrameConfig,
    /// Solve frames on the rayon thread pool.
    pub parallel: bool,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            parallel: true,
        }
    }
}

impl TranscriptionConfig {
    /// Selects the cost family by name. `beta` overrides the configured
    /// divergence parameter when given.
    pub fn with_cost(mut self, cost: &str, beta: Option<f64>) -> Result<Self> {
        self.frame.cost = cost.parse::<CostKind>()?;
        if let Some(beta) = beta {
            self.frame.beta = beta;
        }
        Ok(self)
    }
}

/// Estimates the activation matrix `(notes × frames)` of `observed`
/// (`bins × frames`) against the fixed `basis` (`bins × notes`), one
/// independent frame solve per column.
pub fn transcribe(
    observed: ArrayView2<'_, f64>,
    basis: ArrayView2<'_, f64>,
    config: &TranscriptionConfig,
) -> Result<Array2<f64>> {
    let (bins, frames) = observed.dim();
    let notes = basis.ncols();
    if basis.nrows() != bins {
        return Err(NmfError::ShapeMismatch {
            what: "basis",
            expected: (bins, notes),
            actual: basis.dim(),
        });
    }

    let solve = |column: usize| -> Result<Array1<f64>> {
        transcribe_frame(observed, basis, column, &config.frame).map(|frame| frame.activations)
    };
    let columns: Vec<Array1<f64>> = if config.parallel {
        (0..frames).into_par_iter().map(solve).collect::<Result<_>>()?
    } else {
        (0..frames).map(solve).collect::<Result<_>>()?
    };

    let mut activations = Array2::zeros((notes, frames));
    for (mut column, solved) in activations.axis_iter_mut(Axis(1)).zip(columns.iter()) {
        column.assign(solved);
    }

    debug!(
        bins,
        frames,
        notes,
        cost = %config.frame.cost,
        beta = config.frame.beta,
        "transcription finished"
    );
    Ok(activations)
}

/// Solves a single column of [`transcribe`]. The column's seed is derived
/// from the configured seed and the column index.
pub fn transcribe_frame(
    observed: ArrayView2<'_, f64>,
    basis: ArrayView2<'_, f64>,
    column: usize,
    config: &FrameConfig,
) -> Result<FrameFactorization> {
    let frame_config = FrameConfig {
        seed: derive_seed(config.seed, column as u64),
        ..config.clone()
    };
    factorize_frame(observed.column(column), basis, None, &frame_config)
}
