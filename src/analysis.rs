//! Helpers for reading and comparing activation matrices.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::nmf::{NmfError, Result};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Scientific pitch name of a MIDI note, e.g. 60 → "C4".
pub fn midi_to_note_name(midi: u8) -> String {
    let octave = i32::from(midi / 12) - 1;
    format!("{}{}", NOTE_NAMES[usize::from(midi % 12)], octave)
}

/// Most active note of every frame of `activations` (`notes × frames`), or
/// `None` for frames whose activations are all zero.
pub fn dominant_notes(activations: ArrayView2<'_, f64>, min_note: u8) -> Vec<Option<u8>> {
    activations
        .axis_iter(Axis(1))
        .map(|frame| {
            let (index, peak) = frame
                .iter()
                .enumerate()
                .fold((0, 0.0_f64), |best, (idx, &value)| {
                    if value > best.1 {
                        (idx, value)
                    } else {
                        best
                    }
                });
            if peak > 0.0 {
                u8::try_from(index)
                    .ok()
                    .and_then(|offset| min_note.checked_add(offset))
            } else {
                None
            }
        })
        .collect()
}

/// Mean elementwise product of two max-normalized signals.
pub fn correlation(first: ArrayView1<'_, f64>, second: ArrayView1<'_, f64>) -> Result<f64> {
    ensure_same_len(&first, &second)?;
    if first.is_empty() {
        return Ok(0.0);
    }
    let product = (&max_normalized(first) * &max_normalized(second)).sum();
    Ok(product / first.len() as f64)
}

/// Sum of squared differences between two max-normalized signals.
pub fn rmse(first: ArrayView1<'_, f64>, second: ArrayView1<'_, f64>) -> Result<f64> {
    ensure_same_len(&first, &second)?;
    let difference = &max_normalized(first) - &max_normalized(second);
    Ok(difference.mapv(|v| v * v).sum())
}

fn max_normalized(signal: ArrayView1<'_, f64>) -> Array1<f64> {
    let peak = signal.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if peak > 0.0 {
        signal.mapv(|v| v / peak)
    } else {
        signal.to_owned()
    }
}

fn ensure_same_len(first: &ArrayView1<'_, f64>, second: &ArrayView1<'_, f64>) -> Result<()> {
    if first.len() != second.len() {
        return Err(NmfError::ShapeMismatch {
            what: "signal",
            expected: (first.len(), 1),
            actual: (second.len(), 1),
        });
    }
    Ok(())
}
