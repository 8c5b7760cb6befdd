pub mod decoder;
pub mod resample;

use std::path::Path;

use anyhow::{Context, Result};

use crate::types::AudioData;

/// Decode `path` and bring it to `sample_rate`, mono.
pub fn load_mono<P: AsRef<Path>>(path: P, sample_rate: u32) -> Result<AudioData> {
    let path = path.as_ref();
    let decoded = decoder::decode_audio(path)?;
    resample::linear_resample(&decoded, sample_rate).with_context(|| {
        format!(
            "failed to resample {} from {} Hz to {} Hz",
            path.display(),
            decoded.sample_rate,
            sample_rate
        )
    })
}
