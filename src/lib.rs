pub mod analysis;
pub mod audio;
pub mod cli;
pub mod config;
pub mod dictionary;
pub mod nmf;
pub mod spectrogram;
pub mod store;
pub mod types;
