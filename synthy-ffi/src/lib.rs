//! C ABI wrapper for the Synthy engine.
//!
//! For hosts that own the audio and MIDI transport and call back into us
//! (JACK style). The host creates a handle, calls `synthy_process` from its
//! audio callback, `synthy_midi` from its MIDI callback, and the `set_*`
//! functions when the device is reconfigured.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`; declarations live in
//!   `include/synthy.h`.
//! - Opaque handle type: `SynthyEngine` (heap-allocated; you own/delete it).
//! - Null handles and null buffers are ignored.
//!
//! Threading
//! - `synthy_process*` from one audio thread at a time.
//! - `synthy_midi`, `synthy_note_*` and the `set_*` functions from any thread.
//! - `synthy_destroy` once, after the host stopped calling everything else.

use std::ffi::c_int;

use parking_lot::Mutex;
use tracing::warn;

use synthy_engine::{exchange, BlockConsumer, BlockExchange, Engine, EngineConfig, FrameSource};

/// Most channels `synthy_process` writes; extra channel pointers are zeroed.
pub const SYNTHY_MAX_CHANNELS: usize = 32;

/// Opaque engine wrapper we hand to C.
pub struct SynthyEngine {
    engine: Engine<BlockExchange>,
    /// Only the audio thread locks this, so it is never contended.
    consumer: Mutex<BlockConsumer>,
}

impl SynthyEngine {
    fn new(sample_rate: f64, channels: usize, block_size: usize) -> synthy_engine::Result<Self> {
        let config = EngineConfig::default()
            .with_sample_rate(sample_rate)
            .with_channel_count(channels)
            .with_block_size(block_size);
        let (source, consumer) = exchange(&config);
        let engine = Engine::new(&config, source)?;
        Ok(Self { engine, consumer: Mutex::new(consumer) })
    }

    /// Size the next block to what the host just asked for.
    fn follow_host(&self, frames: usize, channels: usize) {
        let source = self.engine.source();
        if frames > 0 && frames != source.sample_count() {
            source.set_sample_count(frames);
        }
        if channels > 0 && channels != source.channel_count() {
            source.set_channel_count(channels);
        }
    }
}

/// Borrow the handle, or `None` for null.
///
/// # Safety
/// `engine` must be null or a live pointer from `synthy_create`.
unsafe fn handle<'a>(engine: *const SynthyEngine) -> Option<&'a SynthyEngine> {
    // SAFETY: guaranteed by the caller.
    unsafe { engine.as_ref() }
}

// --- Creation / destruction -------------------------------------------------------

/// Create an engine and start its generation thread.
/// Returns null if the parameters are invalid or the thread cannot start.
#[no_mangle]
pub extern "C" fn synthy_create(sample_rate: f64, channels: u32, block_size: u32) -> *mut SynthyEngine {
    match SynthyEngine::new(sample_rate, channels as usize, block_size as usize) {
        Ok(e) => Box::into_raw(Box::new(e)),
        Err(e) => {
            warn!(error = %e, "synthy_create failed");
            std::ptr::null_mut()
        }
    }
}

/// Stop the generation thread and free the handle.
///
/// # Safety
/// `engine` must be null or a pointer from `synthy_create` not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn synthy_destroy(engine: *mut SynthyEngine) {
    if !engine.is_null() {
        // SAFETY: pointer came from Box::into_raw in synthy_create.
        drop(unsafe { Box::from_raw(engine) });
    }
}

// --- Rendering -------------------------------------------------------------------

/// Fill `channels` planar buffers of `frames` samples each with the next block.
///
/// Returns 1 if a block was delivered, 0 on underrun or bad arguments (the
/// buffers hold silence in that case).
///
/// # Safety
/// `outputs` must point to `channels` pointers, each null or valid for
/// `frames` writes.
#[no_mangle]
pub unsafe extern "C" fn synthy_process(
    engine: *const SynthyEngine,
    outputs: *const *mut f32,
    channels: u32,
    frames: u32,
) -> c_int {
    if outputs.is_null() {
        return 0;
    }
    let frames = frames as usize;
    // SAFETY: caller provides `channels` pointers.
    let ptrs = unsafe { std::slice::from_raw_parts(outputs, channels as usize) };

    let mut slices: [&mut [f32]; SYNTHY_MAX_CHANNELS] = std::array::from_fn(|_| <&mut [f32]>::default());
    let mut used = 0;
    for &p in ptrs {
        if p.is_null() {
            continue;
        }
        // SAFETY: each non-null pointer is valid for `frames` writes.
        let out = unsafe { std::slice::from_raw_parts_mut(p, frames) };
        if used < SYNTHY_MAX_CHANNELS {
            slices[used] = out;
            used += 1;
        } else {
            out.fill(0.0);
        }
    }

    // SAFETY: guaranteed by the caller.
    let Some(e) = (unsafe { handle(engine) }) else {
        for s in &mut slices[..used] {
            s.fill(0.0);
        }
        return 0;
    };
    e.follow_host(frames, used);
    let Some(mut consumer) = e.consumer.try_lock() else {
        for s in &mut slices[..used] {
            s.fill(0.0);
        }
        return 0;
    };
    c_int::from(consumer.fill(&mut slices[..used]))
}

/// Interleaved variant of `synthy_process`: `frames * channels` samples.
///
/// # Safety
/// `out` must be null or valid for `frames * channels` writes.
#[no_mangle]
pub unsafe extern "C" fn synthy_process_interleaved(
    engine: *const SynthyEngine,
    out: *mut f32,
    frames: u32,
    channels: u32,
) -> c_int {
    if out.is_null() || channels == 0 {
        return 0;
    }
    let (frames, channels) = (frames as usize, channels as usize);
    // SAFETY: caller guarantees the length.
    let out = unsafe { std::slice::from_raw_parts_mut(out, frames * channels) };

    // SAFETY: guaranteed by the caller.
    let Some(e) = (unsafe { handle(engine) }) else {
        out.fill(0.0);
        return 0;
    };
    e.follow_host(frames, channels);
    let Some(mut consumer) = e.consumer.try_lock() else {
        out.fill(0.0);
        return 0;
    };
    c_int::from(consumer.fill_interleaved(out, channels, |s| s))
}

// --- MIDI ------------------------------------------------------------------------

/// Feed one raw MIDI message (`data[0]` is the status byte).
///
/// # Safety
/// `engine` must be null or live; `data` must be null or valid for `len` reads.
#[no_mangle]
pub unsafe extern "C" fn synthy_midi(engine: *const SynthyEngine, data: *const u8, len: usize) {
    if data.is_null() {
        return;
    }
    // SAFETY: guaranteed by the caller.
    let Some(e) = (unsafe { handle(engine) }) else { return };
    // SAFETY: caller guarantees the length.
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };
    if let Some((&status, rest)) = bytes.split_first() {
        e.engine.handle_raw(status, rest);
    }
}

/// # Safety
/// `engine` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn synthy_note_on(engine: *const SynthyEngine, note: u8, velocity: u8) {
    // SAFETY: guaranteed by the caller.
    if let Some(e) = unsafe { handle(engine) } {
        e.engine.note_on(note, velocity);
    }
}

/// # Safety
/// `engine` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn synthy_note_off(engine: *const SynthyEngine, note: u8) {
    // SAFETY: guaranteed by the caller.
    if let Some(e) = unsafe { handle(engine) } {
        e.engine.note_off(note);
    }
}

// --- Reconfiguration -------------------------------------------------------------

/// Host buffer size changed. Applies from the next block.
///
/// # Safety
/// `engine` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn synthy_set_buffer_size(engine: *const SynthyEngine, frames: u32) {
    // SAFETY: guaranteed by the caller.
    if let Some(e) = unsafe { handle(engine) } {
        if frames > 0 {
            e.engine.source().set_sample_count(frames as usize);
        }
    }
}

/// Host sample rate changed. Applies from the next block.
///
/// # Safety
/// `engine` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn synthy_set_sample_rate(engine: *const SynthyEngine, sample_rate: f64) {
    // SAFETY: guaranteed by the caller.
    if let Some(e) = unsafe { handle(engine) } {
        if sample_rate.is_finite() && sample_rate > 0.0 {
            e.engine.source().set_sample_rate(sample_rate);
        }
    }
}
