//! Voices and the per-note voice table.
//!
//! A voice is the ordered set of generators sounding for one MIDI note; their
//! outputs sum. An empty voice is silent and skipped by the mix. The table has
//! one slot per note number, so note on/off never allocate a map entry.

use synthy_core::filters::LowPass;
use synthy_core::generator::{Combine, Generator};
use synthy_core::dsp::{frequency_for_note, velocity_gain};

use crate::config::EngineConfig;

/// Number of MIDI note numbers.
pub const NOTE_COUNT: usize = 128;

/// Generators summed into one note's signal.
#[derive(Clone, Debug, Default)]
pub struct Voice {
    generators: Vec<Generator>,
}

impl Voice {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline] pub fn is_silent(&self) -> bool { self.generators.is_empty() }
    #[inline] pub fn len(&self) -> usize { self.generators.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.generators.is_empty() }
    #[inline] pub fn generators(&self) -> &[Generator] { &self.generators }
    #[inline] pub fn push(&mut self, g: Generator) { self.generators.push(g); }
    #[inline] pub fn clear(&mut self) { self.generators.clear(); }

    /// Sum of every generator's current sample; each generator advances
    /// right after it is read.
    #[inline]
    pub fn next_sample(&mut self, sample_rate: f64) -> f64 {
        self.generators.iter_mut().fold(0.0, |acc, g| {
            let s = g.sample();
            g.advance(sample_rate);
            acc + s
        })
    }

    /// Add this voice's next `out.len()` samples into `out`.
    #[inline]
    pub fn mix_into(&mut self, out: &mut [f32], sample_rate: f64) {
        for s in out.iter_mut() {
            *s += self.next_sample(sample_rate) as f32;
        }
    }
}

impl From<Vec<Generator>> for Voice {
    fn from(generators: Vec<Generator>) -> Self {
        Self { generators }
    }
}

impl From<Generator> for Voice {
    fn from(g: Generator) -> Self {
        Self { generators: vec![g] }
    }
}

/// One voice slot per MIDI note number.
#[derive(Clone, Debug)]
pub struct VoiceTable {
    voices: Vec<Voice>,
}

impl Default for VoiceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceTable {
    pub fn new() -> Self {
        Self { voices: vec![Voice::new(); NOTE_COUNT] }
    }

    /// `None` for note numbers outside 0..=127.
    #[inline]
    pub fn get(&self, note: u8) -> Option<&Voice> {
        self.voices.get(usize::from(note))
    }

    #[inline]
    pub fn get_mut(&mut self, note: u8) -> Option<&mut Voice> {
        self.voices.get_mut(usize::from(note))
    }

    /// Notes whose voice currently has generators, ascending.
    pub fn active_notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.voices
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_silent())
            .filter_map(|(n, _)| u8::try_from(n).ok())
    }

    /// Voices with at least one generator.
    pub fn sounding_mut(&mut self) -> impl Iterator<Item = &mut Voice> + '_ {
        self.voices.iter_mut().filter(|v| !v.is_silent())
    }

    pub fn clear_all(&mut self) {
        for v in &mut self.voices {
            v.clear();
        }
    }
}

/// The patch a note-on builds: a saw at the note's pitch with an additive
/// sine vibrato and one low-pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NotePatch {
    pub volume: f64,
    pub lowpass_alpha: f64,
    pub vibrato_rate: f64,
    pub vibrato_depth: f64,
}

impl NotePatch {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            volume: config.volume,
            lowpass_alpha: config.lowpass_alpha,
            vibrato_rate: config.vibrato_rate,
            vibrato_depth: config.vibrato_depth,
        }
    }

    pub fn build(&self, note: u8, velocity: u8) -> Generator {
        Generator::saw(frequency_for_note(note), self.volume * velocity_gain(velocity))
            .with_frequency_modulator(
                Combine::Add,
                Generator::sine(self.vibrato_rate, self.vibrato_depth),
            )
            .with_filter(LowPass::new(self.lowpass_alpha))
    }
}

impl Default for NotePatch {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
