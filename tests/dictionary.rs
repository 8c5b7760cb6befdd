use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use ndarray::Array2;
use nmf_transcribe::dictionary::{
    BoxError, DictionaryBuilder, NoteEntry, NoteRange, NoteTable,
};
use nmf_transcribe::nmf::{BatchConfig, NmfError, UpdateOrder};
use nmf_transcribe::spectrogram::Normalization;
use nmf_transcribe::store;

const BINS: usize = 6;

/// Rank-one note recording: a harmonic comb shifted by the note number,
/// swelling over `frames` frames.
fn synthetic_note(midi: u8, frames: usize) -> Array2<f64> {
    let root = usize::from(midi) % BINS;
    Array2::from_shape_fn((BINS, frames), |(bin, frame)| {
        let partial = if bin == root {
            1.0
        } else if bin == (root + 2) % BINS {
            0.5
        } else {
            0.05
        };
        partial * (1.0 + frame as f64)
    })
}

fn table(notes: &[u8]) -> NoteTable {
    NoteTable::from_entries(
        notes
            .iter()
            .map(|&midi| NoteEntry {
                midi,
                sample_path: PathBuf::from(format!("notes/{midi}.wav")),
            })
            .collect(),
    )
}

fn training_config() -> BatchConfig {
    BatchConfig {
        update_order: UpdateOrder::Sequential,
        max_iterations: 500,
        seed: Some(17),
        ..BatchConfig::default()
    }
}

#[test]
fn absent_notes_keep_empty_atoms_and_are_never_factorized() -> Result<()> {
    let represented = Mutex::new(Vec::new());
    let representation = |entry: &NoteEntry| -> std::result::Result<Array2<f64>, BoxError> {
        represented.lock().map_err(|e| e.to_string())?.push(entry.midi);
        Ok(synthetic_note(entry.midi, 4))
    };

    let dictionary = DictionaryBuilder::new("oboe")
        .with_range(NoteRange::new(40, 45)?)
        .with_config(training_config())
        .build(&table(&[40, 42, 45]), &representation)?;

    assert_eq!(dictionary.basis.dim(), (BINS, 6));
    assert_eq!(dictionary.min_note, 40);
    assert_eq!(dictionary.max_note(), 45);
    assert_eq!(dictionary.untrained_notes(), vec![41, 43, 44]);
    for midi in [40, 42, 45] {
        let atom = dictionary.atom(midi).expect("note in range");
        assert!(atom.iter().all(|&v| v > 0.0), "atom {midi} should be trained");
    }

    let mut seen = represented.into_inner().expect("mutex not poisoned");
    seen.sort_unstable();
    assert_eq!(seen, vec![40, 42, 45]);
    Ok(())
}

#[test]
fn trained_atom_follows_the_recording_spectrum() -> Result<()> {
    let representation = |entry: &NoteEntry| -> std::result::Result<Array2<f64>, BoxError> {
        Ok(synthetic_note(entry.midi, 5))
    };
    let dictionary = DictionaryBuilder::new("oboe")
        .with_config(training_config())
        .sequential()
        .build(&table(&[60]), &representation)?;

    let atom = dictionary.atom(60).expect("trained note");
    let peak = atom
        .iter()
        .enumerate()
        .fold((0, 0.0), |best, (idx, &v)| if v > best.1 { (idx, v) } else { best })
        .0;
    assert_eq!(peak, 60 % BINS);
    Ok(())
}

#[test]
fn range_defaults_to_table_extent_and_skips_outliers() -> Result<()> {
    let representation = |entry: &NoteEntry| -> std::result::Result<Array2<f64>, BoxError> {
        Ok(synthetic_note(entry.midi, 3))
    };
    let notes = table(&[50, 53, 51]);
    let dictionary = DictionaryBuilder::new("flute")
        .with_config(training_config())
        .build(&notes, &representation)?;
    assert_eq!((dictionary.min_note, dictionary.max_note()), (50, 53));
    assert_eq!(dictionary.untrained_notes(), vec![52]);

    let narrowed = DictionaryBuilder::new("flute")
        .with_range(NoteRange::new(51, 52)?)
        .with_config(training_config())
        .build(&notes, &representation)?;
    assert_eq!(narrowed.note_count(), 2);
    assert_eq!(narrowed.untrained_notes(), vec![52]);
    Ok(())
}

#[test]
fn empty_table_without_range_is_rejected() {
    let representation = |entry: &NoteEntry| -> std::result::Result<Array2<f64>, BoxError> {
        Ok(synthetic_note(entry.midi, 3))
    };
    let result = DictionaryBuilder::new("flute").build(&NoteTable::default(), &representation);
    assert!(matches!(result, Err(NmfError::EmptyNoteTable)));
}

#[test]
fn normalized_dictionary_survives_persistence() -> Result<()> {
    let representation = |entry: &NoteEntry| -> std::result::Result<Array2<f64>, BoxError> {
        Ok(synthetic_note(entry.midi, 4))
    };
    let dictionary = DictionaryBuilder::new("clarinet")
        .with_range(NoteRange::new(60, 62)?)
        .with_config(training_config())
        .with_normalization(|spectrogram| Normalization::Max.apply(spectrogram))
        .build(&table(&[60, 62]), &representation)?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("dictionaries/clarinet.json");
    store::save_dictionary(&path, &dictionary)?;
    let loaded = store::load_dictionary(&path)?;

    assert_eq!(loaded.instrument, "clarinet");
    assert_eq!(loaded.min_note, 60);
    assert_eq!(loaded.basis.dim(), dictionary.basis.dim());
    assert_eq!(loaded.untrained_notes(), vec![61]);
    Ok(())
}
