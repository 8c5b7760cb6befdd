//! Magnitude spectrograms of decoded audio, laid out `(bins × frames)`.

mod cqt;
mod normalize;

pub use cqt::{cqt_spectrogram, CqtParams};
pub use normalize::Normalization;

use anyhow::{ensure, Result};
use aus::spectrum;
use aus::WindowType;
use ndarray::Array2;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_HOP_MS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpectrogramParams {
    pub sample_rate: u32,
    pub fft_size: usize,
    /// Hop between frames, in milliseconds.
    pub hop_ms: f64,
}

impl Default for SpectrogramParams {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            fft_size: DEFAULT_FFT_SIZE,
            hop_ms: DEFAULT_HOP_MS,
        }
    }
}

impl SpectrogramParams {
    /// Number of frequency bins, `1 + fft_size / 2`.
    pub fn bins(&self) -> usize {
        1 + self.fft_size / 2
    }

    pub fn hop_size(&self) -> usize {
        ((self.hop_ms * f64::from(self.sample_rate)) / 1000.0)
            .floor()
            .max(1.0) as usize
    }
}

/// Time-frequency representation used for dictionaries and excerpts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpectralTransform {
    Stft(SpectrogramParams),
    Cqt(CqtParams),
}

impl SpectralTransform {
    pub fn bins(&self) -> usize {
        match self {
            Self::Stft(params) => params.bins(),
            Self::Cqt(params) => params.bins(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::Stft(params) => params.sample_rate,
            Self::Cqt(params) => params.sample_rate,
        }
    }

    pub fn compute(&self, samples: &[f64]) -> Result<Array2<f64>> {
        match self {
            Self::Stft(params) => magnitude_spectrogram(samples, params),
            Self::Cqt(params) => cqt_spectrogram(samples, params),
        }
    }
}

/// Hamming-windowed STFT magnitude of `samples`. Signals shorter than one
/// window are zero-padded to a single frame.
pub fn magnitude_spectrogram(samples: &[f64], params: &SpectrogramParams) -> Result<Array2<f64>> {
    ensure!(params.fft_size >= 2, "FFT size must be at least 2");
    ensure!(params.hop_ms > 0.0, "hop length must be positive");

    let mut audio = samples.to_vec();
    if audio.len() < params.fft_size {
        audio.resize(params.fft_size, 0.0);
    }

    let stft = spectrum::rstft(&audio, params.fft_size, params.hop_size(), WindowType::Hamming);
    let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);

    let frames = magnitude.len();
    let bins = params.bins();
    ensure!(
        magnitude.iter().all(|frame| frame.len() == bins),
        "STFT produced frames with an unexpected bin count (expected {bins})"
    );

    let spectrogram = Array2::from_shape_fn((bins, frames), |(bin, frame)| magnitude[frame][bin]);
    debug!(bins, frames, hop = params.hop_size(), "computed magnitude spectrogram");
    Ok(spectrogram)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn hop_size_follows_sample_rate() {
        let params = SpectrogramParams::default();
        assert_eq!(params.hop_size(), 441);
        assert_eq!(params.bins(), 1025);
    }

    #[test]
    fn sine_peaks_near_its_frequency_bin() {
        let params = SpectrogramParams {
            sample_rate: 8_000,
            fft_size: 256,
            hop_ms: 16.0,
        };
        let frequency = 1_000.0;
        let samples: Vec<f64> = (0..4_000)
            .map(|n| (2.0 * PI * frequency * n as f64 / 8_000.0).sin())
            .collect();

        let spectrogram = magnitude_spectrogram(&samples, &params).unwrap();
        assert_eq!(spectrogram.nrows(), 129);
        assert!(spectrogram.ncols() > 1);
        assert!(spectrogram.iter().all(|&v| v >= 0.0));

        let column = spectrogram.column(spectrogram.ncols() / 2);
        let peak = column
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (idx, &v)| if v > best.1 { (idx, v) } else { best })
            .0;
        assert_eq!(peak, 32);
    }

    #[test]
    fn transform_reports_bins_of_its_representation() {
        let stft = SpectralTransform::Stft(SpectrogramParams::default());
        let cqt = SpectralTransform::Cqt(CqtParams::default());
        assert_eq!(stft.bins(), 1025);
        assert_eq!(cqt.bins(), 480);
        assert_eq!(cqt.sample_rate(), DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn short_signals_are_padded_to_a_full_window() {
        let params = SpectrogramParams::default();
        let spectrogram = magnitude_spectrogram(&[0.25; 100], &params).unwrap();
        assert_eq!(spectrogram.nrows(), 1025);
        assert!(spectrogram.ncols() >= 1);
    }
}
