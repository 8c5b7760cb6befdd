//! Per-instrument note dictionaries trained from isolated note recordings.

pub mod note_table;

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::nmf::batch::{factorize, BatchConfig};
use crate::nmf::init::derive_seed;
use crate::nmf::{NmfError, Result};

pub use note_table::{NoteEntry, NoteRange, NoteTable};

/// Error type returned by representation and normalization collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Produces the `(bins × frames)` representation of one note recording,
/// typically by decoding the sample and computing a magnitude spectrogram.
pub trait NoteRepresentation: Sync {
    fn represent(&self, entry: &NoteEntry) -> std::result::Result<Array2<f64>, BoxError>;
}

impl<F> NoteRepresentation for F
where
    F: Fn(&NoteEntry) -> std::result::Result<Array2<f64>, BoxError> + Sync,
{
    fn represent(&self, entry: &NoteEntry) -> std::result::Result<Array2<f64>, BoxError> {
        self(entry)
    }
}

/// A trained basis: column `i` holds the atom of MIDI note `min_note + i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentDictionary {
    pub instrument: String,
    pub min_note: u8,
    /// `(bins × notes)`.
    pub basis: Array2<f64>,
}

impl InstrumentDictionary {
    pub fn note_count(&self) -> usize {
        self.basis.ncols()
    }

    pub fn bins(&self) -> usize {
        self.basis.nrows()
    }

    pub fn max_note(&self) -> u8 {
        let span = self.note_count().saturating_sub(1);
        self.min_note.saturating_add(u8::try_from(span).unwrap_or(u8::MAX))
    }

    /// Atom of `midi`, if the dictionary covers the note.
    pub fn atom(&self, midi: u8) -> Option<ArrayView1<'_, f64>> {
        let offset = usize::from(midi.checked_sub(self.min_note)?);
        (offset < self.note_count()).then(|| self.basis.column(offset))
    }

    /// Notes whose atom is all zeros, i.e. absent from the training table.
    pub fn untrained_notes(&self) -> Vec<u8> {
        self.basis
            .columns()
            .into_iter()
            .enumerate()
            .filter(|(_, column)| column.iter().all(|&v| v == 0.0))
            .filter_map(|(offset, _)| u8::try_from(offset).ok())
            .map(|offset| self.min_note.saturating_add(offset))
            .collect()
    }
}

type Normalizer<'a> = Box<dyn Fn(Array2<f64>) -> Array2<f64> + Sync + 'a>;

/// Trains one rank-1 atom per note of a [`NoteTable`].
pub struct DictionaryBuilder<'a> {
    instrument: String,
    range: Option<NoteRange>,
    bins: Option<usize>,
    config: BatchConfig,
    normalize: Option<Normalizer<'a>>,
    parallel: bool,
}

impl<'a> DictionaryBuilder<'a> {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            range: None,
            bins: None,
            config: BatchConfig::default(),
            normalize: None,
            parallel: true,
        }
    }

    /// Restricts training to `range`; defaults to the table's own range.
    pub fn with_range(mut self, range: NoteRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Fixes the expected representation height. Without it, the height of
    /// the first trained note is used, and an empty selection yields zero rows.
    pub fn with_bins(mut self, bins: usize) -> Self {
        self.bins = Some(bins);
        self
    }

    /// Factorizer parameters; the rank is always forced to 1.
    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_normalization<F>(mut self, normalize: F) -> Self
    where
        F: Fn(Array2<f64>) -> Array2<f64> + Sync + 'a,
    {
        self.normalize = Some(Box::new(normalize));
        self
    }

    /// Trains notes one after another instead of on the rayon pool.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Builds the dictionary. Notes outside the range are skipped, later
    /// table entries for the same note replace earlier ones, and notes with
    /// no entry keep an all-zero atom without being factorized.
    pub fn build<R>(&self, table: &NoteTable, representation: &R) -> Result<InstrumentDictionary>
    where
        R: NoteRepresentation + ?Sized,
    {
        let range = match self.range {
            Some(range) => range,
            None => table.note_range()?,
        };

        let mut selected: BTreeMap<usize, &NoteEntry> = BTreeMap::new();
        for entry in table.entries() {
            match range.offset(entry.midi) {
                Some(offset) => {
                    selected.insert(offset, entry);
                }
                None => debug!(midi = entry.midi, "note outside dictionary range; skipping"),
            }
        }

        let extract = |(offset, entry): (&usize, &&NoteEntry)| -> Result<(usize, Array1<f64>)> {
            self.extract_atom(entry, representation)
                .map(|atom| (*offset, atom))
        };
        let atoms: Vec<(usize, Array1<f64>)> = if self.parallel {
            selected.par_iter().map(extract).collect::<Result<_>>()?
        } else {
            selected.iter().map(extract).collect::<Result<_>>()?
        };

        let bins = self
            .bins
            .or_else(|| atoms.first().map(|(_, atom)| atom.len()))
            .unwrap_or(0);
        let mut basis = Array2::zeros((bins, range.len()));
        for (offset, atom) in &atoms {
            if atom.len() != bins {
                return Err(NmfError::ShapeMismatch {
                    what: "note representation",
                    expected: (bins, 1),
                    actual: (atom.len(), 1),
                });
            }
            basis.column_mut(*offset).assign(atom);
        }

        info!(
            instrument = %self.instrument,
            min_note = range.min(),
            max_note = range.max(),
            trained = atoms.len(),
            bins,
            "dictionary built"
        );

        Ok(InstrumentDictionary {
            instrument: self.instrument.clone(),
            min_note: range.min(),
            basis,
        })
    }

    fn extract_atom<R>(&self, entry: &NoteEntry, representation: &R) -> Result<Array1<f64>>
    where
        R: NoteRepresentation + ?Sized,
    {
        let representation_error = |source: BoxError| NmfError::Representation {
            note: entry.midi,
            source,
        };

        let mut observed = representation
            .represent(entry)
            .map_err(representation_error)?;
        if observed.ncols() == 0 {
            return Err(representation_error("representation has no frames".into()));
        }
        if let Some(normalize) = &self.normalize {
            observed = normalize(observed);
        }

        let config = BatchConfig {
            rank: 1,
            seed: derive_seed(self.config.seed, u64::from(entry.midi)),
            ..self.config.clone()
        };
        let factorization = factorize(observed.view(), None, None, &config)?;
        debug!(
            midi = entry.midi,
            cost = factorization.cost,
            iterations = factorization.iterations,
            converged = factorization.converged,
            "trained note atom"
        );
        Ok(factorization.basis.column(0).to_owned())
    }
}
