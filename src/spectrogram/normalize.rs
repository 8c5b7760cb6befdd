use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::{bail, Error};
use ndarray::{Array2, Axis};

/// Per-bin scaling applied across the time axis of a spectrogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    None,
    /// Divide each bin by its largest magnitude.
    #[default]
    Max,
    /// Divide each bin by its root-mean-square magnitude.
    Rms,
    /// Divide each bin by the sum of its magnitudes.
    Sum,
}

impl Normalization {
    /// Scales every row (frequency bin) of `spectrogram`. Rows with a zero
    /// scale are left unchanged.
    pub fn apply(self, mut spectrogram: Array2<f64>) -> Array2<f64> {
        if self == Normalization::None {
            return spectrogram;
        }
        for mut row in spectrogram.axis_iter_mut(Axis(0)) {
            let scale = match self {
                Normalization::None => 1.0,
                Normalization::Max => row.iter().copied().fold(0.0, f64::max),
                Normalization::Rms => {
                    let len = row.len().max(1) as f64;
                    (row.iter().map(|v| v * v).sum::<f64>() / len).sqrt()
                }
                Normalization::Sum => row.sum(),
            };
            if scale > 0.0 {
                row.mapv_inplace(|v| v / scale);
            }
        }
        spectrogram
    }
}

impl FromStr for Normalization {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Normalization::None),
            "max" => Ok(Normalization::Max),
            "rms" => Ok(Normalization::Rms),
            "sum" => Ok(Normalization::Sum),
            other => bail!("unknown normalization \"{other}\" (expected max, rms, sum or none)"),
        }
    }
}

impl Display for Normalization {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Normalization::None => "none",
            Normalization::Max => "max",
            Normalization::Rms => "rms",
            Normalization::Sum => "sum",
        };
        write!(f, "{name}")
    }
}
