use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use ndarray::Array2;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use nmf_transcribe::analysis::{dominant_notes, midi_to_note_name};
use nmf_transcribe::audio::load_mono;
use nmf_transcribe::cli::{Cli, Command, NotesArgs, SpectrogramArgs, TrainArgs, TranscribeArgs};
use nmf_transcribe::config::{default_output, resolve_input, AppConfig};
use nmf_transcribe::dictionary::{BoxError, DictionaryBuilder, NoteEntry, NoteTable};
use nmf_transcribe::nmf::{factorize, transcribe, BatchConfig, TranscriptionConfig};
use nmf_transcribe::spectrogram::{CqtParams, SpectralTransform, SpectrogramParams};
use nmf_transcribe::store;

/// Convergence threshold of the fixed-basis batch mode.
const BATCH_THRESHOLD: f64 = 1e-3;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_override(cli.data_dir.clone())?;
    match &cli.command {
        Command::Spectrogram(args) => run_spectrogram(&config, args),
        Command::Train(args) => run_train(&config, args),
        Command::Transcribe(args) => run_transcribe(&config, args),
        Command::Notes(args) => run_notes(&config, args),
    }
}

fn run_spectrogram(config: &AppConfig, args: &SpectrogramArgs) -> Result<()> {
    let transform = args.transform()?;
    let audio_path = resolve_input(&args.excerpt, &config.audio_dir(), "wav")?;
    let spectrogram = audio_spectrogram(&audio_path, &transform)?;

    let dest = output_path(args.dest.as_ref(), &args.excerpt, &config.spectrograms_dir())?;
    store::save_matrix(&dest, &spectrogram)?;
    info!(
        bins = spectrogram.nrows(),
        frames = spectrogram.ncols(),
        path = %dest.display(),
        "saved spectrogram"
    );
    Ok(())
}

fn run_train(config: &AppConfig, args: &TrainArgs) -> Result<()> {
    let params = args
        .training_params()
        .context("failed to load training parameters")?;
    let range = args.note_range()?;

    let table_path = match &args.info {
        Some(path) => path.clone(),
        None => config.note_table_path(&args.instrument),
    };
    let raw = fs::read_to_string(&table_path)
        .with_context(|| format!("failed to read note table {}", table_path.display()))?;
    let base = table_path.parent().unwrap_or_else(|| Path::new("."));
    let table = NoteTable::parse(&raw)?.resolve_paths(base);
    info!(
        instrument = %args.instrument,
        notes = table.entries().len(),
        table = %table_path.display(),
        "loaded note table"
    );

    let transform = params.transform(args.cqt);
    let representation = |entry: &NoteEntry| -> std::result::Result<Array2<f64>, BoxError> {
        Ok(audio_spectrogram(&entry.sample_path, &transform)?)
    };
    let norm = args.norm;
    let mut builder = DictionaryBuilder::new(args.instrument.as_str())
        .with_bins(transform.bins())
        .with_config(params.factorization)
        .with_normalization(move |spectrogram| norm.apply(spectrogram));
    if let Some(range) = range {
        builder = builder.with_range(range);
    }
    let dictionary = builder.build(&table, &representation)?;

    let untrained = dictionary.untrained_notes();
    if !untrained.is_empty() {
        info!(notes = ?untrained, "notes without a recording keep empty atoms");
    }

    let dest = args
        .dest
        .clone()
        .unwrap_or_else(|| config.dictionary_path(&args.instrument));
    store::save_dictionary(&dest, &dictionary)?;
    info!(
        instrument = %dictionary.instrument,
        min_note = dictionary.min_note,
        max_note = dictionary.max_note(),
        path = %dest.display(),
        "saved dictionary"
    );
    Ok(())
}

fn run_transcribe(config: &AppConfig, args: &TranscribeArgs) -> Result<()> {
    let frame_config = TranscriptionConfig::default().with_cost(&args.cost, Some(args.beta))?;

    let dictionary_path = resolve_input(&args.dictionary, &config.dictionaries_dir(), "json")?;
    let dictionary = store::load_dictionary(&dictionary_path)?;

    let transform = if args.cqt {
        SpectralTransform::Cqt(CqtParams::default())
    } else {
        SpectralTransform::Stft(SpectrogramParams {
            fft_size: 2 * dictionary.bins().saturating_sub(1),
            ..SpectrogramParams::default()
        })
    };
    let observed = args.norm.apply(load_excerpt(config, &args.excerpt, &transform)?);
    ensure!(
        observed.nrows() == dictionary.bins(),
        "excerpt has {} frequency bins but dictionary {} has {}",
        observed.nrows(),
        dictionary.instrument,
        dictionary.bins()
    );

    let activations = if args.no_frame {
        let batch = BatchConfig {
            rank: dictionary.note_count(),
            threshold: BATCH_THRESHOLD,
            update_w: args.update_w,
            seed: args.seed,
            ..BatchConfig::default()
        };
        let result = factorize(observed.view(), Some(dictionary.basis.clone()), None, &batch)?;
        info!(
            cost = result.cost,
            iterations = result.iterations,
            converged = result.converged,
            "batch transcription finished"
        );
        result.activations
    } else {
        let mut frame_config = frame_config;
        frame_config.frame.seed = args.seed;
        transcribe(observed.view(), dictionary.basis.view(), &frame_config)?
    };

    let dest = output_path(args.dest.as_ref(), &args.excerpt, &config.activations_dir())?;
    store::save_matrix(&dest, &activations)?;
    info!(
        notes = activations.nrows(),
        frames = activations.ncols(),
        path = %dest.display(),
        "saved activations"
    );
    Ok(())
}

fn run_notes(config: &AppConfig, args: &NotesArgs) -> Result<()> {
    let activations_path = resolve_input(&args.activations, &config.activations_dir(), "json")?;
    let activations = store::load_matrix(&activations_path)?;
    let dictionary_path = resolve_input(&args.dictionary, &config.dictionaries_dir(), "json")?;
    let dictionary = store::load_dictionary(&dictionary_path)?;
    ensure!(
        activations.nrows() == dictionary.note_count(),
        "activations cover {} notes but dictionary {} has {}",
        activations.nrows(),
        dictionary.instrument,
        dictionary.note_count()
    );

    for (frame, note) in dominant_notes(activations.view(), dictionary.min_note)
        .into_iter()
        .enumerate()
    {
        match note {
            Some(midi) => println!("{frame}\t{midi}\t{}", midi_to_note_name(midi)),
            None => println!("{frame}\tNone"),
        }
    }
    Ok(())
}

/// Stored spectrogram when `excerpt` resolves to JSON, otherwise the
/// spectrogram of the decoded audio.
fn load_excerpt(
    config: &AppConfig,
    excerpt: &Path,
    transform: &SpectralTransform,
) -> Result<Array2<f64>> {
    if let Ok(path) = resolve_input(excerpt, &config.spectrograms_dir(), "json") {
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            return store::load_matrix(&path);
        }
    }
    let audio_path = resolve_input(excerpt, &config.audio_dir(), "wav")?;
    audio_spectrogram(&audio_path, transform)
}

fn audio_spectrogram(path: &Path, transform: &SpectralTransform) -> Result<Array2<f64>> {
    let audio = load_mono(path, transform.sample_rate())?;
    transform
        .compute(&audio.to_f64())
        .with_context(|| format!("failed to compute spectrogram of {}", path.display()))
}

fn output_path(dest: Option<&PathBuf>, input: &Path, dir: &Path) -> Result<PathBuf> {
    match dest {
        Some(path) => Ok(path.clone()),
        None => default_output(input, dir),
    }
}
