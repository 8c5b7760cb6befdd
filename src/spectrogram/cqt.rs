//! Constant-Q magnitude spectrograms, computed one octave at a time.
//!
//! A single bank of spectral kernels covers the top octave. Each lower octave
//! reuses it on a copy of the signal low-passed and decimated by two, which is
//! why the hop is rounded to a multiple of `2^octaves`.

use std::f64::consts::PI;

use anyhow::{ensure, Result};
use aus::spectrum;
use aus::{generate_window, WindowType};
use ndarray::Array2;
use serde::Deserialize;
use tracing::debug;

use super::{DEFAULT_HOP_MS, DEFAULT_SAMPLE_RATE};

pub const DEFAULT_F_MIN: f64 = 27.5;
pub const DEFAULT_OCTAVES: usize = 8;
pub const DEFAULT_OCTAVE_BINS: usize = 60;

/// Spectral kernel entries below this fraction of the kernel peak are dropped.
const KERNEL_SPARSITY: f64 = 0.0054;
/// Length of the half-band filter applied before each decimation.
const DECIMATION_TAPS: usize = 63;
const MAX_OCTAVES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CqtParams {
    pub sample_rate: u32,
    /// Target hop in milliseconds, before rounding.
    pub hop_ms: f64,
    /// Centre frequency of the lowest bin, in Hz.
    pub f_min: f64,
    pub octaves: usize,
    pub octave_bins: usize,
}

impl Default for CqtParams {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            hop_ms: DEFAULT_HOP_MS,
            f_min: DEFAULT_F_MIN,
            octaves: DEFAULT_OCTAVES,
            octave_bins: DEFAULT_OCTAVE_BINS,
        }
    }
}

impl CqtParams {
    /// Number of bins, `octaves * octave_bins`.
    pub fn bins(&self) -> usize {
        self.octaves * self.octave_bins
    }

    /// Hop in samples: the smallest multiple of `2^octaves` reaching the
    /// target hop.
    pub fn hop_size(&self) -> usize {
        let step = 1usize << self.octaves.min(MAX_OCTAVES);
        let target = (self.hop_ms * f64::from(self.sample_rate) / 1000.0).floor() as usize;
        step * target.div_ceil(step).max(1)
    }

    /// FFT size of the top-octave kernel bank.
    pub fn fft_size(&self) -> usize {
        let longest = self.quality() * f64::from(self.sample_rate) / self.top_octave_f_min();
        (longest.ceil() as usize).next_power_of_two()
    }

    /// Shortest signal giving the lowest octave one full window; shorter
    /// input is zero-padded to this length.
    pub fn min_len(&self) -> usize {
        self.fft_size() << self.octaves.saturating_sub(1).min(MAX_OCTAVES)
    }

    fn quality(&self) -> f64 {
        1.0 / (2f64.powf(1.0 / self.octave_bins as f64) - 1.0)
    }

    fn top_octave_f_min(&self) -> f64 {
        self.f_min * 2f64.powi(self.octaves.saturating_sub(1) as i32)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.sample_rate > 0, "sample rate must be positive");
        ensure!(self.hop_ms > 0.0, "hop length must be positive");
        ensure!(self.f_min > 0.0, "lowest CQT frequency must be positive");
        ensure!(
            (1..=MAX_OCTAVES).contains(&self.octaves),
            "octave count must lie in 1..={MAX_OCTAVES}"
        );
        ensure!(self.octave_bins > 0, "bins per octave must be positive");
        let highest = self.f_min * 2f64.powf((self.bins() - 1) as f64 / self.octave_bins as f64);
        let nyquist = f64::from(self.sample_rate) / 2.0;
        ensure!(
            highest < nyquist,
            "highest CQT bin ({highest:.1} Hz) is not below the Nyquist frequency ({nyquist:.1} Hz)"
        );
        Ok(())
    }
}

/// Sparse conjugated spectral kernel: `(fft bin, re, im)`.
type Kernel = Vec<(usize, f64, f64)>;

/// Constant-Q magnitude of `samples`, laid out `(bins × frames)` with row 0
/// at `f_min`. Frames are centred on multiples of the hop.
pub fn cqt_spectrogram(samples: &[f64], params: &CqtParams) -> Result<Array2<f64>> {
    params.validate()?;

    let mut signal = samples.to_vec();
    if signal.len() < params.min_len() {
        signal.resize(params.min_len(), 0.0);
    }
    let hop = params.hop_size();
    let frames = signal.len() / hop + 1;
    let fft_size = params.fft_size();
    let kernels = kernel_bank(params);
    let filter = half_band_filter();

    let mut cqt = Array2::zeros((params.bins(), frames));
    for octave in 0..params.octaves {
        if octave > 0 {
            signal = decimate(&signal, &filter);
        }
        let octave_hop = hop >> octave;
        let first_row = (params.octaves - 1 - octave) * params.octave_bins;
        for frame in 0..frames {
            let segment = centred_segment(&signal, frame * octave_hop, fft_size);
            let frame_spectrum = spectrum::rfft(&segment, fft_size);
            for (bin, kernel) in kernels.iter().enumerate() {
                let (re, im) = kernel.iter().fold((0.0, 0.0), |(re, im), &(k, kr, ki)| {
                    let x = &frame_spectrum[k];
                    (re + x.re * kr - x.im * ki, im + x.re * ki + x.im * kr)
                });
                cqt[[first_row + bin, frame]] = re.hypot(im);
            }
        }
    }

    debug!(
        bins = params.bins(),
        frames,
        hop,
        fft_size,
        "computed constant-Q spectrogram"
    );
    Ok(cqt)
}

/// Kernels of the top octave, one per bin, each a Hamming-windowed complex
/// exponential of `Q` periods centred in an `fft_size` buffer.
fn kernel_bank(params: &CqtParams) -> Vec<Kernel> {
    let fft_size = params.fft_size();
    let sample_rate = f64::from(params.sample_rate);
    let quality = params.quality();
    let base = params.top_octave_f_min();

    (0..params.octave_bins)
        .map(|bin| {
            let frequency = base * 2f64.powf(bin as f64 / params.octave_bins as f64);
            let length = ((quality * sample_rate / frequency).ceil() as usize).clamp(2, fft_size);
            let window = generate_window(WindowType::Hamming, length);
            let start = (fft_size - length) / 2;

            let mut real = vec![0.0; fft_size];
            let mut imag = vec![0.0; fft_size];
            for (n, w) in window.iter().enumerate() {
                let phase = 2.0 * PI * frequency * n as f64 / sample_rate;
                real[start + n] = w * phase.cos() / length as f64;
                imag[start + n] = w * phase.sin() / length as f64;
            }
            let real_spectrum = spectrum::rfft(&real, fft_size);
            let imag_spectrum = spectrum::rfft(&imag, fft_size);

            // FFT(real + i·imag) over the non-negative frequencies.
            let values: Vec<(f64, f64)> = real_spectrum
                .iter()
                .zip(imag_spectrum.iter())
                .map(|(r, i)| (r.re - i.im, r.im + i.re))
                .collect();
            let peak = values
                .iter()
                .map(|(re, im)| re.hypot(*im))
                .fold(0.0, f64::max);
            let scale = fft_size as f64;
            values
                .into_iter()
                .enumerate()
                .filter(|(_, (re, im))| re.hypot(*im) >= KERNEL_SPARSITY * peak)
                .map(|(k, (re, im))| (k, re / scale, -im / scale))
                .collect()
        })
        .collect()
}

fn centred_segment(signal: &[f64], centre: usize, fft_size: usize) -> Vec<f64> {
    let half = fft_size / 2;
    (0..fft_size)
        .map(|i| {
            (centre + i)
                .checked_sub(half)
                .and_then(|idx| signal.get(idx))
                .copied()
                .unwrap_or(0.0)
        })
        .collect()
}

/// Windowed-sinc low-pass at a quarter of the sample rate, unit DC gain.
fn half_band_filter() -> Vec<f64> {
    let window = generate_window(WindowType::Hamming, DECIMATION_TAPS);
    let middle = (DECIMATION_TAPS / 2) as f64;
    let taps: Vec<f64> = window
        .iter()
        .enumerate()
        .map(|(n, w)| {
            let t = n as f64 - middle;
            let sinc = if t == 0.0 {
                0.5
            } else {
                (PI * t / 2.0).sin() / (PI * t)
            };
            w * sinc
        })
        .collect();
    let gain: f64 = taps.iter().sum();
    taps.into_iter().map(|tap| tap / gain).collect()
}

/// Low-pass filters `signal` and keeps every other sample.
fn decimate(signal: &[f64], filter: &[f64]) -> Vec<f64> {
    let half = filter.len() / 2;
    (0..signal.len().div_ceil(2))
        .map(|n| {
            filter
                .iter()
                .enumerate()
                .filter_map(|(t, tap)| {
                    (2 * n + t)
                        .checked_sub(half)
                        .and_then(|idx| signal.get(idx))
                        .map(|sample| tap * sample)
                })
                .sum()
        })
        .collect()
}
