use symphonia::core::errors::Error as SymphoniaError;
use thiserror::Error;

use crate::audio::types::Variant;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No source registered for variant '{variant}'")]
    UnknownVariant { variant: Variant },
    #[error("Engine configuration has no sources")]
    NoSources,
    #[error("Source location for variant '{variant}' is empty")]
    EmptySource { variant: Variant },
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse engine config: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AudioDecodingError {
    #[error("Failed to open file '{path}': {source}")]
    FileOpenError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Symphonia probe/format error for '{path}': {source}")]
    FormatError {
        path: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("No suitable audio track in '{path}'")]
    NoSuitableTrack { path: String },
    #[error("Sample rate missing in '{path}'")]
    MissingSampleRate { path: String },
    #[error("Channel info missing in '{path}'")]
    MissingChannelInfo { path: String },
    #[error("Failed to create decoder for '{path}': {source}")]
    DecoderCreationError {
        path: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("Symphonia fatal decode error in '{path}': {source}")]
    FatalDecodeError {
        path: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("Symphonia I/O error reading packet for '{path}': {source}")]
    PacketReadIoError {
        path: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("No samples decoded from '{path}'")]
    NoSamplesDecoded { path: String },
}

/// Failure reported by a playback slot implementation.
#[derive(Error, Debug)]
pub enum SlotError {
    #[error("Slot has no source loaded")]
    NotLoaded,
    #[error("No audio output device available")]
    NoOutputDevice,
    #[error("No usable output stream configuration: {0}")]
    NoStreamConfig(String),
    #[error("Failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("Failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("Failed to pause output stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),
    #[error("Decoding failed: {0}")]
    Decode(#[from] AudioDecodingError),
    #[error("Decoding task panicked: {0}")]
    DecodeTaskPanic(String),
    #[error("{0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Engine initialization failed: {0}")]
    Initialization(String),
    #[error("Slot error: {0}")]
    Slot(#[from] SlotError),
    #[error("Engine command queue is full")]
    CommandQueueFull,
    #[error("Engine has stopped")]
    EngineStopped,
    #[error("Failed to receive shutdown confirmation: {0}")]
    ShutdownSignalError(String),
}

// Stringified forms for UI bridges that only carry messages.
impl From<EngineError> for String {
    fn from(err: EngineError) -> String {
        err.to_string()
    }
}
impl From<SlotError> for String {
    fn from(err: SlotError) -> String {
        err.to_string()
    }
}
