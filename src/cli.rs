use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use crate::dictionary::NoteRange;
use crate::nmf::BatchConfig;
use crate::spectrogram::{
    CqtParams, Normalization, SpectralTransform, SpectrogramParams, DEFAULT_HOP_MS,
    DEFAULT_SAMPLE_RATE,
};

#[derive(Parser, Debug)]
#[command(
    name = "nmf-transcribe",
    version,
    about = "Note dictionaries and frame-wise NMF transcription of monophonic recordings"
)]
pub struct Cli {
    /// Override the data directory (defaults to ./data).
    #[arg(long = "data-dir", global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute and store the magnitude spectrogram of an excerpt.
    Spectrogram(SpectrogramArgs),
    /// Train a note dictionary from an instrument's note recordings.
    Train(TrainArgs),
    /// Estimate note activations of an excerpt against a dictionary.
    Transcribe(TranscribeArgs),
    /// Print the dominant note of every frame of stored activations.
    Notes(NotesArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SpectrogramArgs {
    /// Audio file, looked up under <data-dir>/audio when not found.
    #[arg(value_name = "EXCERPT")]
    pub excerpt: PathBuf,
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,
    /// Hop between frames in milliseconds.
    #[arg(long = "hop-ms", default_value_t = DEFAULT_HOP_MS)]
    pub hop_ms: f64,
    /// Compute a constant-Q spectrogram instead of an STFT.
    #[arg(long)]
    pub cqt: bool,
    /// Output file (defaults to <data-dir>/spectrograms/<excerpt>.json).
    #[arg(short = 'd', long = "dest", value_name = "PATH")]
    pub dest: Option<PathBuf>,
}

impl SpectrogramArgs {
    pub fn transform(&self) -> Result<SpectralTransform> {
        ensure!(self.sample_rate > 0, "sample rate must be positive");
        ensure!(self.hop_ms > 0.0, "hop length must be positive");
        Ok(if self.cqt {
            SpectralTransform::Cqt(CqtParams {
                sample_rate: self.sample_rate,
                hop_ms: self.hop_ms,
                ..CqtParams::default()
            })
        } else {
            SpectralTransform::Stft(SpectrogramParams {
                sample_rate: self.sample_rate,
                hop_ms: self.hop_ms,
                ..SpectrogramParams::default()
            })
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Instrument name; also names the default note table and output.
    #[arg(value_name = "INSTRUMENT")]
    pub instrument: String,
    /// Note table (defaults to <data-dir>/paths/<instrument>.txt).
    #[arg(long, value_name = "FILE")]
    pub info: Option<PathBuf>,
    /// Per-bin normalization of each note spectrogram.
    #[arg(long, default_value = "max")]
    pub norm: Normalization,
    #[arg(long = "min-note")]
    pub min_note: Option<u8>,
    #[arg(long = "max-note")]
    pub max_note: Option<u8>,
    /// Build atoms from constant-Q spectrograms instead of STFTs.
    #[arg(long)]
    pub cqt: bool,
    /// Output file (defaults to <data-dir>/dictionaries/<instrument>.json).
    #[arg(short = 'd', long = "dest", value_name = "PATH")]
    pub dest: Option<PathBuf>,
    /// Training parameters as an inline JSON document.
    #[arg(long, value_name = "JSON", conflicts_with = "params_file")]
    pub params_json: Option<String>,
    /// Path to a JSON document of training parameters.
    #[arg(long, value_name = "PATH", conflicts_with = "params_json")]
    pub params_file: Option<PathBuf>,
}

impl TrainArgs {
    /// Explicit training range; `None` means the note table's own range.
    pub fn note_range(&self) -> Result<Option<NoteRange>> {
        match (self.min_note, self.max_note) {
            (Some(min), Some(max)) => Ok(Some(NoteRange::new(min, max)?)),
            (None, None) => Ok(None),
            _ => bail!("provide both min-note and max-note or neither"),
        }
    }

    pub fn training_params(&self) -> Result<TrainingParams> {
        load_params_from_sources(self.params_file.as_deref(), self.params_json.as_deref())
    }
}

/// Tunables accepted by `train` through `--params-json`/`--params-file`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    pub spectrogram: SpectrogramParams,
    /// Used instead of `spectrogram` when training with `--cqt`.
    pub cqt: CqtParams,
    pub factorization: BatchConfig,
}

impl TrainingParams {
    pub fn transform(&self, cqt: bool) -> SpectralTransform {
        if cqt {
            SpectralTransform::Cqt(self.cqt)
        } else {
            SpectralTransform::Stft(self.spectrogram)
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct TranscribeArgs {
    /// Spectrogram JSON or audio file of the excerpt.
    #[arg(value_name = "EXCERPT")]
    pub excerpt: PathBuf,
    /// Dictionary JSON, looked up under <data-dir>/dictionaries.
    #[arg(value_name = "DICTIONARY")]
    pub dictionary: PathBuf,
    #[arg(long, default_value = "max")]
    pub norm: Normalization,
    /// Cost family: frobenius, kld or beta.
    #[arg(long, default_value = "frobenius")]
    pub cost: String,
    /// Beta-divergence parameter.
    #[arg(short = 'b', long, default_value_t = 0.5)]
    pub beta: f64,
    /// Compute a constant-Q spectrogram when the excerpt is audio.
    #[arg(long)]
    pub cqt: bool,
    /// Use one batch factorization with a fixed basis instead of per-frame solves.
    #[arg(long = "no-frame")]
    pub no_frame: bool,
    /// Also refine the basis (only with --no-frame).
    #[arg(long = "update-w", requires = "no_frame")]
    pub update_w: bool,
    /// Seed for activation initialization.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Output file (defaults to <data-dir>/activations/<excerpt>.json).
    #[arg(short = 'd', long = "dest", value_name = "PATH")]
    pub dest: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct NotesArgs {
    #[arg(value_name = "ACTIVATIONS")]
    pub activations: PathBuf,
    #[arg(value_name = "DICTIONARY")]
    pub dictionary: PathBuf,
}

fn load_params_from_sources(path: Option<&Path>, json: Option<&str>) -> Result<TrainingParams> {
    if let Some(p) = path {
        let data = fs::read_to_string(p)
            .with_context(|| format!("failed to read training parameters {:?}", p))?;
        return parse_params(&data);
    }
    match json {
        Some(raw) => parse_params(raw),
        None => Ok(TrainingParams::default()),
    }
}

fn parse_params(raw: &str) -> Result<TrainingParams> {
    serde_json::from_str(raw).context("failed to parse training parameters JSON")
}
