use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

pub const DATA_DIR: &str = "data";
pub const DICTIONARIES_DIR: &str = "dictionaries";
pub const NOTE_TABLES_DIR: &str = "paths";
pub const SPECTROGRAMS_DIR: &str = "spectrograms";
pub const ACTIVATIONS_DIR: &str = "activations";
pub const AUDIO_DIR: &str = "audio";

/// Layout of the on-disk data tree shared by every subcommand.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_root: PathBuf,
}

impl AppConfig {
    /// Uses `path` when given (it must be an existing directory), otherwise
    /// `./data` under the current directory.
    pub fn from_override(path: Option<PathBuf>) -> Result<Self> {
        let root = match path {
            Some(custom) => canonicalize_dir(&custom)?,
            None => default_data_root()?,
        };
        Ok(Self { data_root: root })
    }

    pub fn dictionaries_dir(&self) -> PathBuf {
        self.data_root.join(DICTIONARIES_DIR)
    }

    pub fn note_tables_dir(&self) -> PathBuf {
        self.data_root.join(NOTE_TABLES_DIR)
    }

    pub fn spectrograms_dir(&self) -> PathBuf {
        self.data_root.join(SPECTROGRAMS_DIR)
    }

    pub fn activations_dir(&self) -> PathBuf {
        self.data_root.join(ACTIVATIONS_DIR)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.data_root.join(AUDIO_DIR)
    }

    /// Default note-info table of `instrument`.
    pub fn note_table_path(&self, instrument: &str) -> PathBuf {
        self.note_tables_dir().join(format!("{instrument}.txt"))
    }

    pub fn dictionary_path(&self, instrument: &str) -> PathBuf {
        self.dictionaries_dir().join(format!("{instrument}.json"))
    }
}

/// Finds an existing input file named `name`, trying in order: the name
/// as given, with `extension` appended, inside `dir`, and inside `dir` with
/// `extension` appended.
pub fn resolve_input(name: &Path, dir: &Path, extension: &str) -> Result<PathBuf> {
    let candidates = input_candidates(name, dir, extension);
    if let Some(found) = candidates.iter().find(|candidate| candidate.is_file()) {
        return Ok(found.clone());
    }
    let tried = candidates
        .iter()
        .map(|c| c.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    bail!("could not find {} (tried {tried})", name.display())
}

/// Output path `dir/<stem of name>.json`.
pub fn default_output(name: &Path, dir: &Path) -> Result<PathBuf> {
    let stem = name
        .file_stem()
        .ok_or_else(|| anyhow!("cannot derive an output name from {}", name.display()))?;
    Ok(dir.join(stem).with_extension("json"))
}

fn input_candidates(name: &Path, dir: &Path, extension: &str) -> Vec<PathBuf> {
    let with_extension = |path: &Path| {
        let mut raw = path.as_os_str().to_owned();
        raw.push(".");
        raw.push(extension);
        PathBuf::from(raw)
    };
    vec![
        name.to_path_buf(),
        with_extension(name),
        dir.join(name),
        with_extension(&dir.join(name)),
    ]
}

fn canonicalize_dir(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("failed to resolve data directory at {:?}", path))?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Err(anyhow!("data path {:?} is not a directory", canonical))
    }
}

fn default_data_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("unable to resolve current directory")?;
    Ok(cwd.join(DATA_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn accepts_existing_override() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_override(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.data_root, dir.path().canonicalize().unwrap());
        assert!(config.dictionary_path("violin").ends_with("dictionaries/violin.json"));
        assert!(config.note_table_path("violin").ends_with("paths/violin.txt"));
    }

    #[test]
    fn rejects_missing_override() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::from_override(Some(dir.path().join("absent"))).is_err());
    }

    #[test]
    fn resolves_inputs_in_candidate_order() {
        let dir = tempfile::tempdir().unwrap();
        let spectrograms = dir.path().join("spectrograms");
        fs::create_dir_all(&spectrograms).unwrap();
        fs::write(spectrograms.join("excerpt.json"), "{}").unwrap();

        let found = resolve_input(Path::new("excerpt"), &spectrograms, "json").unwrap();
        assert_eq!(found, spectrograms.join("excerpt.json"));

        let err = resolve_input(Path::new("missing"), &spectrograms, "json").unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn output_uses_input_stem() {
        let out = default_output(Path::new("audio/solo-bassoon.wav"), Path::new("data/spectrograms"))
            .unwrap();
        assert_eq!(out, PathBuf::from("data/spectrograms/solo-bassoon.json"));
    }
}
