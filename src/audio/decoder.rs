use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::types::AudioData;

/// Selected audio track of an opened container.
struct OpenedTrack {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
}

/// Decodes a note recording or excerpt to mono samples, averaging channels.
pub fn decode_audio<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path = path.as_ref();
    let OpenedTrack {
        mut reader,
        mut decoder,
        track_id,
        sample_rate,
    } = open_track(path)?;

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => {
                return Err(err).with_context(|| format!("reading packets of {}", path.display()))
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(buffer) => mix_to_mono(buffer, &mut samples),
            Err(SymphoniaError::DecodeError(reason)) => {
                skipped += 1;
                warn!(path = %path.display(), reason, "dropping corrupt packet");
            }
            Err(err) => {
                return Err(err).with_context(|| format!("decoding {}", path.display()))
            }
        }
    }

    debug!(
        path = %path.display(),
        samples = samples.len(),
        sample_rate,
        skipped,
        "decoded recording"
    );
    Ok(AudioData {
        samples,
        sample_rate,
    })
}

fn open_track(path: &Path) -> Result<OpenedTrack> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }
    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("unrecognized audio container: {}", path.display()))?;
    let reader = detected.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("{} has no decodable audio track", path.display()))?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("{} does not declare a sample rate", path.display()))?;
    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("unsupported codec in {}", path.display()))?;
    let track_id = track.id;

    Ok(OpenedTrack {
        reader,
        decoder,
        track_id,
        sample_rate,
    })
}

/// Appends the channel average of every frame of `buffer` to `out`.
fn mix_to_mono(buffer: AudioBufferRef<'_>, out: &mut Vec<f32>) {
    let spec = *buffer.spec();
    let channels = spec.channels.count().max(1);
    let mut interleaved = SampleBuffer::<f32>::new(buffer.capacity() as u64, spec);
    interleaved.copy_interleaved_ref(buffer);
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .samples()
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}
