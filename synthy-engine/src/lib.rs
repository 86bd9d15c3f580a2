//! Synthy Engine: voice table + generation thread + block handoff.
//!
//! Crate layout:
//! - [`config`]   : `EngineConfig` defaults and validation
//! - [`error`]    : crate error type
//! - [`midi`]     : channel-voice MIDI decoding
//! - [`voice`]    : per-note voices and the note-on patch
//! - [`handoff`]  : producer/consumer block exchange with the audio callback
//! - [`engine`]   : `Engine<S>` and the cloneable `MidiHandle`
//! - `realtime`   : cpal output / midir input adapters (feature `realtime`)
//!
//! Rendering happens off the audio thread. The realtime callback only copies
//! a finished block out and never allocates.

pub mod config;
pub mod engine;
pub mod error;
pub mod handoff;
pub mod midi;
pub mod voice;

#[cfg(feature = "realtime")]
pub mod realtime;

pub use config::EngineConfig;
pub use engine::{render_block, Engine, MidiHandle};
pub use error::{Error, Result};
pub use handoff::{exchange, BlockConsumer, BlockExchange, Buffer, Completion, Frame, FrameSource};
pub use midi::MidiMessage;
pub use voice::{NotePatch, Voice, VoiceTable};
