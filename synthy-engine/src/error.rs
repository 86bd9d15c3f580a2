//! Error types for the engine and its transport adapters.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("failed to start generation thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(feature = "realtime")]
impl From<cpal::DevicesError> for Error {
    fn from(e: cpal::DevicesError) -> Self {
        Error::Device(e.to_string())
    }
}

#[cfg(feature = "realtime")]
impl From<cpal::DeviceNameError> for Error {
    fn from(e: cpal::DeviceNameError) -> Self {
        Error::Device(e.to_string())
    }
}

#[cfg(feature = "realtime")]
impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        Error::Device(e.to_string())
    }
}

#[cfg(feature = "realtime")]
impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(e: cpal::SupportedStreamConfigsError) -> Self {
        Error::Device(e.to_string())
    }
}

#[cfg(feature = "realtime")]
impl From<cpal::BuildStreamError> for Error {
    fn from(e: cpal::BuildStreamError) -> Self {
        Error::Stream(e.to_string())
    }
}

#[cfg(feature = "realtime")]
impl From<cpal::PlayStreamError> for Error {
    fn from(e: cpal::PlayStreamError) -> Self {
        Error::Stream(e.to_string())
    }
}

#[cfg(feature = "realtime")]
impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::Midi(e.to_string())
    }
}

#[cfg(feature = "realtime")]
impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::Midi(e.to_string())
    }
}

#[cfg(feature = "realtime")]
impl From<midir::PortInfoError> for Error {
    fn from(e: midir::PortInfoError) -> Self {
        Error::Midi(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
