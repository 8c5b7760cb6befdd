use std::path::{Path, PathBuf};

use crate::nmf::{NmfError, Result};

/// One isolated note recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEntry {
    pub midi: u8,
    pub sample_path: PathBuf,
}

/// Inclusive range of MIDI notes covered by a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteRange {
    min: u8,
    max: u8,
}

impl NoteRange {
    pub fn new(min: u8, max: u8) -> Result<Self> {
        if min > max {
            return Err(NmfError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    /// Number of notes, and so of dictionary columns.
    pub fn len(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    /// Column index of `midi`, if the note lies inside the range.
    pub fn offset(&self, midi: u8) -> Option<usize> {
        (self.min..=self.max)
            .contains(&midi)
            .then(|| usize::from(midi - self.min))
    }
}

/// Ordered note-info table: `<midiNoteNumber> <samplePath>` per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteTable {
    entries: Vec<NoteEntry>,
}

impl NoteTable {
    /// Parses note-info text. Blank lines and lines starting with `#` are
    /// skipped; everything after the note number is the sample path.
    pub fn parse(data: &str) -> Result<Self> {
        let mut entries = Vec::new();

        for (idx, line) in data.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (raw_note, raw_path) = trimmed
                .split_once(char::is_whitespace)
                .ok_or_else(|| NmfError::NoteTable {
                    line: idx + 1,
                    message: format!("missing sample path: {trimmed}"),
                })?;

            let midi = raw_note.parse::<u8>().map_err(|err| NmfError::NoteTable {
                line: idx + 1,
                message: format!("invalid MIDI note \"{raw_note}\": {err}"),
            })?;
            if midi > 127 {
                return Err(NmfError::NoteTable {
                    line: idx + 1,
                    message: format!("MIDI note {midi} is outside 0..=127"),
                });
            }

            entries.push(NoteEntry {
                midi,
                sample_path: PathBuf::from(raw_path.trim()),
            });
        }

        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<NoteEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[NoteEntry] {
        &self.entries
    }

    /// Lowest and highest note present in the table.
    pub fn note_range(&self) -> Result<NoteRange> {
        let min = self.entries.iter().map(|entry| entry.midi).min();
        let max = self.entries.iter().map(|entry| entry.midi).max();
        match (min, max) {
            (Some(min), Some(max)) => NoteRange::new(min, max),
            _ => Err(NmfError::EmptyNoteTable),
        }
    }

    /// Joins relative sample paths onto `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        for entry in &mut self.entries {
            if entry.sample_path.is_relative() {
                entry.sample_path = base.join(&entry.sample_path);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entries_in_order() {
        let table = NoteTable::parse("55 violin/G3.wav\n\n# tuned\n57\tviolin/A3 soft.wav\n").unwrap();
        assert_eq!(
            table.entries(),
            &[
                NoteEntry {
                    midi: 55,
                    sample_path: PathBuf::from("violin/G3.wav"),
                },
                NoteEntry {
                    midi: 57,
                    sample_path: PathBuf::from("violin/A3 soft.wav"),
                },
            ]
        );
    }

    #[test]
    fn derives_range_from_min_and_max() {
        let table = NoteTable::parse("50 b.wav\n48 a.wav\n53 c.wav\n").unwrap();
        assert_eq!(table.note_range().unwrap(), NoteRange::new(48, 53).unwrap());
    }

    #[test]
    fn reports_line_of_malformed_entry() {
        let err = NoteTable::parse("40 a.wav\nforty b.wav\n").unwrap_err();
        assert!(matches!(err, NmfError::NoteTable { line: 2, .. }));

        let err = NoteTable::parse("40\n").unwrap_err();
        assert!(matches!(err, NmfError::NoteTable { line: 1, .. }));

        let err = NoteTable::parse("200 a.wav\n").unwrap_err();
        assert!(matches!(err, NmfError::NoteTable { line: 1, .. }));
    }

    #[test]
    fn empty_table_has_no_range() {
        let table = NoteTable::parse("\n# nothing yet\n").unwrap();
        assert!(matches!(table.note_range(), Err(NmfError::EmptyNoteTable)));
    }

    #[test]
    fn range_offsets() {
        let range = NoteRange::new(40, 45).unwrap();
        assert_eq!(range.len(), 6);
        assert_eq!(range.offset(40), Some(0));
        assert_eq!(range.offset(45), Some(5));
        assert_eq!(range.offset(46), None);
        assert_eq!(range.offset(39), None);
        assert!(matches!(
            NoteRange::new(45, 40),
            Err(NmfError::InvalidRange { min: 45, max: 40 })
        ));
    }

    #[test]
    fn full_midi_span_has_no_overflow() {
        let single = NoteRange::new(60, 60).unwrap();
        assert_eq!((single.min(), single.max(), single.len()), (60, 60, 1));
        let full = NoteRange::new(0, u8::MAX).unwrap();
        assert_eq!(full.len(), 256);
        assert_eq!(full.offset(u8::MAX), Some(255));
    }

    #[test]
    fn resolves_relative_paths_against_base() {
        let table = NoteTable::parse("40 a.wav\n").unwrap().resolve_paths(Path::new("/data/audio"));
        assert_eq!(table.entries()[0].sample_path, PathBuf::from("/data/audio/a.wav"));
    }
}
