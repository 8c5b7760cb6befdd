//! JSON persistence for spectrograms, activations and dictionaries.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{ensure, Context, Result};
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dictionary::InstrumentDictionary;

/// Serializes `value` to `path`, creating parent directories as needed.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to deserialize {}", path.display()))
}

pub fn save_matrix(path: &Path, matrix: &Array2<f64>) -> Result<()> {
    save_json(path, matrix)
}

/// Loads a matrix and checks it is non-negative and finite.
pub fn load_matrix(path: &Path) -> Result<Array2<f64>> {
    let matrix: Array2<f64> = load_json(path)?;
    ensure!(
        matrix.iter().all(|&v| v.is_finite() && v >= 0.0),
        "{} contains negative or non-finite entries",
        path.display()
    );
    Ok(matrix)
}

pub fn save_dictionary(path: &Path, dictionary: &InstrumentDictionary) -> Result<()> {
    save_json(path, dictionary)
}

pub fn load_dictionary(path: &Path) -> Result<InstrumentDictionary> {
    let dictionary: InstrumentDictionary = load_json(path)?;
    ensure!(
        dictionary.basis.iter().all(|&v| v.is_finite() && v >= 0.0),
        "dictionary {} contains negative or non-finite atoms",
        path.display()
    );
    Ok(dictionary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn dictionary_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/violin.json");
        let dictionary = InstrumentDictionary {
            instrument: "violin".to_string(),
            min_note: 55,
            basis: array![[0.5, 0.0], [0.25, 0.0], [0.125, 0.0]],
        };
        save_dictionary(&path, &dictionary).unwrap();
        assert_eq!(load_dictionary(&path).unwrap(), dictionary);
    }

    #[test]
    fn rejects_negative_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        save_matrix(&path, &array![[1.0, -1.0]]).unwrap();
        assert!(load_matrix(&path).is_err());
    }
}
