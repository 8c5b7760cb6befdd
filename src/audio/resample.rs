use anyhow::{ensure, Result};

use crate::types::AudioData;

/// Linearly interpolate `audio` onto `target_rate`.
pub fn linear_resample(audio: &AudioData, target_rate: u32) -> Result<AudioData> {
    ensure!(audio.sample_rate > 0, "source sample rate must be positive");
    ensure!(target_rate > 0, "target sample rate must be positive");
    if audio.samples.is_empty() || audio.sample_rate == target_rate {
        return Ok(AudioData {
            samples: audio.samples.clone(),
            sample_rate: target_rate,
        });
    }

    let ratio = f64::from(target_rate) / f64::from(audio.sample_rate);
    let output_len = ((audio.samples.len() as f64) * ratio).ceil().max(1.0) as usize;
    let last_index = audio.samples.len() - 1;
    let samples = (0..output_len)
        .map(|i| {
            let position = i as f64 / ratio;
            let left = (position.floor() as usize).min(last_index);
            let right = (left + 1).min(last_index);
            let t = (position - left as f64) as f32;
            audio.samples[left] * (1.0 - t) + audio.samples[right] * t
        })
        .collect();

    Ok(AudioData {
        samples,
        sample_rate: target_rate,
    })
}
