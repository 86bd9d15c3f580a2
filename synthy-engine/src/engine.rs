//! The synthesis engine: MIDI-driven voice table plus the generation thread.
//!
//! The engine owns a [`FrameSource`] and one background thread. Per block the
//! thread takes a frame, sums every sounding voice into channel 0 under the
//! voice-table lock, copies channel 0 to the other channels, and publishes
//! the block. MIDI handling runs on whatever thread the transport delivers
//! events on and only touches the voice table.
//!
//! The voice-table lock is held for the whole summing pass, so MIDI handling
//! can wait up to one block's render time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::handoff::{Buffer, FrameSource};
use crate::midi::{MidiMessage, CC_ALL_NOTES_OFF};
use crate::voice::{NotePatch, Voice, VoiceTable};

/// Controller number of "All Sound Off".
const CC_ALL_SOUND_OFF: u8 = 120;

/// Sum every sounding voice into `buffers[0]` and replicate it to the rest.
///
/// Every voice advances by exactly `buffers[0].len()` samples.
pub fn render_block(voices: &mut VoiceTable, buffers: &mut [Buffer], sample_rate: f64) {
    let Some((first, rest)) = buffers.split_first_mut() else { return };
    first.fill(0.0);
    for voice in voices.sounding_mut() {
        voice.mix_into(first, sample_rate);
    }
    for b in rest {
        b.clone_from(first);
    }
}

#[derive(Debug)]
struct Synth {
    voices: Mutex<VoiceTable>,
    patch: NotePatch,
}

/// Cloneable handle for feeding MIDI into a running engine from any thread.
#[derive(Clone, Debug)]
pub struct MidiHandle {
    synth: Arc<Synth>,
}

impl MidiHandle {
    /// Start `note` unless it is already sounding. No retrigger, no stacking.
    pub fn note_on(&self, note: u8, velocity: u8) {
        let generator = self.synth.patch.build(note, velocity);
        let started = match self.synth.voices.lock().get_mut(note) {
            Some(voice) if voice.is_silent() => {
                voice.push(generator);
                true
            }
            _ => false,
        };
        if started {
            debug!(note, velocity, "note on");
        }
    }

    /// Silence `note` immediately.
    pub fn note_off(&self, note: u8) {
        let stopped = match self.synth.voices.lock().get_mut(note) {
            Some(voice) if !voice.is_silent() => {
                voice.clear();
                true
            }
            _ => false,
        };
        if stopped {
            debug!(note, "note off");
        }
    }

    pub fn all_notes_off(&self) {
        self.synth.voices.lock().clear_all();
        debug!("all notes off");
    }

    /// Replace whatever `note` is playing with `voice`.
    pub fn assign(&self, note: u8, voice: Voice) {
        if let Some(slot) = self.synth.voices.lock().get_mut(note) {
            *slot = voice;
        }
    }

    /// Notes currently sounding, ascending.
    pub fn active_notes(&self) -> Vec<u8> {
        self.synth.voices.lock().active_notes().collect()
    }

    /// Generators sounding for `note`.
    pub fn generator_count(&self, note: u8) -> usize {
        self.synth.voices.lock().get(note).map_or(0, Voice::len)
    }

    /// Run `f` against the voice for `note` under the voice-table lock.
    pub fn with_voice<R>(&self, note: u8, f: impl FnOnce(&Voice) -> R) -> Option<R> {
        self.synth.voices.lock().get(note).map(f)
    }

    /// Act on one decoded message. Anything but note on/off and the
    /// all-notes-off controllers is ignored.
    pub fn handle(&self, msg: MidiMessage) {
        match msg {
            MidiMessage::NoteOn { note, velocity, .. } => self.note_on(note, velocity),
            MidiMessage::NoteOff { note, .. } => self.note_off(note),
            MidiMessage::ControlChange { controller: CC_ALL_NOTES_OFF | CC_ALL_SOUND_OFF, .. } => {
                self.all_notes_off();
            }
            other => trace!(?other, "ignored MIDI message"),
        }
    }

    /// Decode and act on a raw status byte plus data bytes. Malformed input is ignored.
    pub fn handle_raw(&self, status: u8, data: &[u8]) {
        if let Some(msg) = MidiMessage::parse(status, data) {
            self.handle(msg);
        }
    }
}

/// Engine that owns a frame source and the generation thread feeding it.
///
/// Dropping the engine stops the thread: the running flag is cleared, the
/// source is closed so a blocked `next_frame` wakes, and the thread is joined
/// after it finishes the block it is rendering.
pub struct Engine<S: FrameSource> {
    midi: MidiHandle,
    source: Arc<S>,
    running: Arc<AtomicBool>,
    job: Option<JoinHandle<()>>,
}

impl<S: FrameSource> Engine<S> {
    /// Validate `config` and start generating blocks for `source`.
    pub fn new(config: &EngineConfig, source: S) -> Result<Self> {
        config.validate()?;

        let midi = MidiHandle {
            synth: Arc::new(Synth {
                voices: Mutex::new(VoiceTable::new()),
                patch: NotePatch::from_config(config),
            }),
        };
        let source = Arc::new(source);
        let running = Arc::new(AtomicBool::new(true));

        let job = {
            let synth = Arc::clone(&midi.synth);
            let source = Arc::clone(&source);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("synthy-generate".into())
                .spawn(move || generate(&*source, &synth, &running))?
        };

        info!(
            sample_rate = config.sample_rate,
            channels = config.channel_count,
            block_size = config.block_size,
            "engine started"
        );
        Ok(Self { midi, source, running, job: Some(job) })
    }

    /// Handle for MIDI delivery threads.
    #[inline] pub fn midi(&self) -> MidiHandle { self.midi.clone() }
    #[inline] pub fn source(&self) -> &S { &self.source }
    #[inline] pub fn is_running(&self) -> bool { self.running.load(Ordering::Acquire) }

    #[inline] pub fn note_on(&self, note: u8, velocity: u8) { self.midi.note_on(note, velocity); }
    #[inline] pub fn note_off(&self, note: u8) { self.midi.note_off(note); }
    #[inline] pub fn all_notes_off(&self) { self.midi.all_notes_off(); }
    #[inline] pub fn assign(&self, note: u8, voice: Voice) { self.midi.assign(note, voice); }
    #[inline] pub fn active_notes(&self) -> Vec<u8> { self.midi.active_notes() }
    #[inline] pub fn handle(&self, msg: MidiMessage) { self.midi.handle(msg); }
    #[inline] pub fn handle_raw(&self, status: u8, data: &[u8]) { self.midi.handle_raw(status, data); }

    /// Stop and join the generation thread. Idempotent.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        self.source.close();
        if let Some(job) = self.job.take() {
            if job.join().is_err() {
                warn!("generation thread panicked");
            }
            self.midi.all_notes_off();
            info!("engine stopped");
        }
    }
}

impl<S: FrameSource> Drop for Engine<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn generate<S: FrameSource>(source: &S, synth: &Synth, running: &AtomicBool) {
    debug!("generation thread running");
    while running.load(Ordering::Acquire) {
        let Some(mut frame) = source.next_frame() else { break };
        let mut buffers = frame.take_buffers();
        let sample_rate = source.sample_rate();
        {
            let mut voices = synth.voices.lock();
            render_block(&mut voices, &mut buffers, sample_rate);
        }
        frame.complete(buffers);
    }
    debug!("generation thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::{exchange, BlockExchange};
    use approx::assert_abs_diff_eq;
    use std::time::Duration;
    use synthy_core::generator::Generator;

    const SR: f64 = 48_000.0;

    fn handle() -> MidiHandle {
        MidiHandle {
            synth: Arc::new(Synth {
                voices: Mutex::new(VoiceTable::new()),
                patch: NotePatch::default(),
            }),
        }
    }

    fn render(midi: &MidiHandle, buffers: &mut [Buffer]) {
        render_block(&mut midi.synth.voices.lock(), buffers, SR);
    }

    #[test]
    fn note_on_twice_keeps_one_generator() {
        let midi = handle();
        midi.note_on(60, 100);
        midi.note_on(60, 90);
        assert_eq!(midi.generator_count(60), 1);
        assert_eq!(midi.active_notes(), vec![60]);
    }

    #[test]
    fn note_off_on_silent_note_is_noop() {
        let midi = handle();
        midi.note_off(42);
        midi.note_off(200);
        assert_eq!(midi.generator_count(42), 0);
        assert!(midi.active_notes().is_empty());
    }

    #[test]
    fn retrigger_starts_from_phase_zero() {
        let midi = handle();
        midi.note_on(60, 100);
        let mut buffers = vec![vec![0.0; 256]; 1];
        render(&midi, &mut buffers);
        let moved = midi.with_voice(60, |v| v.generators()[0].phase()).unwrap_or_default();
        assert!(moved > 0.0);

        midi.note_off(60);
        midi.note_on(60, 100);
        let phase = midi.with_voice(60, |v| v.generators()[0].phase());
        assert_eq!(phase, Some(0.0));
        assert_eq!(midi.generator_count(60), 1);
    }

    #[test]
    fn raw_midi_drives_voices() {
        let midi = handle();
        midi.handle_raw(0x90, &[64, 100]);
        assert_eq!(midi.active_notes(), vec![64]);
        midi.handle_raw(0x90, &[64, 0]);
        assert!(midi.active_notes().is_empty());
        midi.handle_raw(0x91, &[65, 20]);
        midi.handle_raw(0x81, &[65, 20]);
        assert!(midi.active_notes().is_empty());
    }

    #[test]
    fn malformed_and_other_messages_are_ignored() {
        let midi = handle();
        midi.note_on(50, 100);
        midi.handle_raw(0x90, &[]);
        midi.handle_raw(0x12, &[1, 2, 3]);
        midi.handle_raw(0xE0, &[0, 64]);
        midi.handle_raw(0xC0, &[3]);
        assert_eq!(midi.active_notes(), vec![50]);
    }

    #[test]
    fn all_notes_off_controller_clears_everything() {
        let midi = handle();
        midi.note_on(50, 100);
        midi.note_on(52, 100);
        midi.handle_raw(0xB0, &[CC_ALL_NOTES_OFF, 0]);
        assert!(midi.active_notes().is_empty());
    }

    #[test]
    fn render_replicates_channel_zero() {
        let midi = handle();
        midi.assign(10, Voice::from(Generator::saw(0.0, 0.25)));
        midi.assign(11, Voice::from(Generator::saw(0.0, 0.5)));
        let mut buffers = vec![vec![1.0; 4]; 3];
        render(&midi, &mut buffers);
        for s in &buffers[0] {
            assert_abs_diff_eq!(*s, -0.75);
        }
        assert_eq!(buffers[1], buffers[0]);
        assert_eq!(buffers[2], buffers[0]);
    }

    #[test]
    fn render_with_no_voices_is_silent() {
        let midi = handle();
        let mut buffers = vec![vec![0.3; 8]; 2];
        render(&midi, &mut buffers);
        assert!(buffers.iter().flatten().all(|s| *s == 0.0));
    }

    #[test]
    fn render_is_block_size_independent() {
        let a = handle();
        let b = handle();
        a.note_on(57, 110);
        b.note_on(57, 110);

        let mut whole = vec![vec![0.0; 1024]];
        render(&a, &mut whole);

        let mut pieces = Vec::new();
        for size in [100usize, 24, 512, 388] {
            let mut block = vec![vec![0.0; size]];
            render(&b, &mut block);
            pieces.extend_from_slice(&block[0]);
        }
        assert_eq!(pieces, whole[0]);
        assert_eq!(
            a.with_voice(57, |v| v.generators()[0].phase().to_bits()),
            b.with_voice(57, |v| v.generators()[0].phase().to_bits())
        );
    }

    #[test]
    fn engine_fills_blocks_end_to_end() {
        let cfg = EngineConfig::default()
            .with_block_size(4)
            .with_channel_count(2)
            .with_poll_timeout(Duration::from_secs(2));
        let (ex, mut rx) = exchange(&cfg);
        let engine = Engine::new(&cfg, ex).expect("engine");
        engine.assign(60, Voice::from(Generator::sine(0.0, 0.8)));

        let mut left = [1.0f32; 4];
        let mut right = [1.0f32; 4];
        for _ in 0..3 {
            assert!(rx.fill(&mut [&mut left[..], &mut right[..]]));
            assert_eq!(left, [0.0; 4]);
            assert_eq!(right.map(f32::to_bits), left.map(f32::to_bits));
        }
        assert_eq!(engine.active_notes(), vec![60]);
    }

    #[test]
    fn engine_drop_joins_while_producer_is_blocked() {
        let cfg = EngineConfig::default().with_block_size(16);
        let (ex, _rx) = exchange(&cfg);
        let probe: BlockExchange = ex.clone();
        let engine = Engine::new(&cfg, ex).expect("engine");
        // Nobody consumes, so the thread ends up parked in next_frame.
        std::thread::sleep(Duration::from_millis(100));
        assert!(probe.is_in_flight());
        drop(engine);
        assert!(probe.is_closed());
    }

    #[test]
    fn engine_rejects_invalid_config() {
        let cfg = EngineConfig::default().with_channel_count(0);
        let (ex, _rx) = exchange(&EngineConfig::default());
        assert!(Engine::new(&cfg, ex).is_err());
    }
}
