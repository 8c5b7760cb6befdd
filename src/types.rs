//! Shared data types for the collaborator layers around the factorizers.

/// Decoded audio, mixed down to mono.
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Samples normalized to [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g., 44100).
    pub sample_rate: u32,
}

impl AudioData {
    /// Samples widened to `f64` for spectral analysis.
    pub fn to_f64(&self) -> Vec<f64> {
        self.samples.iter().map(|&s| f64::from(s)).collect()
    }
}
