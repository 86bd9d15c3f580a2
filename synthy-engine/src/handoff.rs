//! Block handoff between the generation thread and the realtime callback.
//!
//! The producer ([`BlockExchange::next_frame`]) may take as long as it likes
//! to render a block. The consumer ([`BlockConsumer`]) runs inside the audio
//! callback: it waits at most a short timeout for the block, copies it out,
//! and hands the buffer memory back so the producer can reuse it.
//!
//! Protocol
//! - At most one block is in flight: from the moment `next_frame` returns
//!   until the consumer has copied that block out.
//! - `next_frame` blocks while a block is in flight.
//! - Each `Frame` carries a [`Completion`]; fulfilling consumes it, so a
//!   block is published exactly once, and the consumer takes it exactly once.
//! - Blocks are consumed in the order they were created.
//! - If the block is not ready before the timeout the consumer outputs
//!   silence for that callback (underrun) and tries again next callback.
//!
//! The consumer path does not allocate: the mailbox lives in the shared
//! state and buffers only move between the mailbox and the recycle slot.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::EngineConfig;

/// One channel of samples.
pub type Buffer = Vec<f32>;

/// What the generation loop needs from an audio transport.
pub trait FrameSource: Send + Sync + 'static {
    /// Current sample rate in Hz.
    fn sample_rate(&self) -> f64;

    /// Current number of output channels.
    fn channel_count(&self) -> usize;

    /// Next block to render. Blocks until the previous block has been consumed.
    /// `None` once the source is closed.
    fn next_frame(&self) -> Option<Frame>;

    /// Wake any blocked `next_frame` and make further calls return `None`.
    fn close(&self);
}

#[derive(Debug, Default)]
struct State {
    /// Sequence number of the block between `next_frame` and consumption.
    in_flight: Option<u64>,
    /// The mailbox: the in-flight block once the producer fulfilled it.
    filled: Option<Vec<Buffer>>,
    /// Buffers the consumer returned, handed to the next frame.
    recycled: Option<Vec<Buffer>>,
    next_seq: u64,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    slot_freed: Condvar,
    slot_filled: Condvar,
    sample_rate_bits: AtomicU64,
    sample_count: AtomicUsize,
    channel_count: AtomicUsize,
    delivered: AtomicU64,
    underruns: AtomicU64,
}

/// Producer side of the handoff. Cheap to clone; all clones share one exchange.
#[derive(Clone, Debug)]
pub struct BlockExchange {
    shared: Arc<Shared>,
}

/// Consumer side of the handoff. There is exactly one per exchange.
#[derive(Debug)]
pub struct BlockConsumer {
    shared: Arc<Shared>,
    timeout: Duration,
}

/// Create a connected producer/consumer pair sized from `config`.
pub fn exchange(config: &EngineConfig) -> (BlockExchange, BlockConsumer) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::default()),
        slot_freed: Condvar::new(),
        slot_filled: Condvar::new(),
        sample_rate_bits: AtomicU64::new(config.sample_rate.to_bits()),
        sample_count: AtomicUsize::new(config.block_size),
        channel_count: AtomicUsize::new(config.channel_count),
        delivered: AtomicU64::new(0),
        underruns: AtomicU64::new(0),
    });
    (
        BlockExchange { shared: Arc::clone(&shared) },
        BlockConsumer { shared, timeout: config.poll_timeout },
    )
}

impl Shared {
    fn set_sample_rate(&self, sr: f64) {
        self.sample_rate_bits.store(sr.to_bits(), Ordering::Relaxed);
    }

    fn set_sample_count(&self, samples: usize) {
        self.sample_count.store(samples, Ordering::Relaxed);
    }

    fn set_channel_count(&self, channels: usize) {
        self.channel_count.store(channels, Ordering::Relaxed);
    }
}

impl BlockExchange {
    #[inline] pub fn sample_count(&self) -> usize { self.shared.sample_count.load(Ordering::Relaxed) }

    /// Takes effect from the next block.
    pub fn set_sample_rate(&self, sr: f64) { self.shared.set_sample_rate(sr); }
    /// Takes effect from the next block.
    pub fn set_sample_count(&self, samples: usize) { self.shared.set_sample_count(samples); }
    /// Takes effect from the next block.
    pub fn set_channel_count(&self, channels: usize) { self.shared.set_channel_count(channels); }

    /// Whether a block is between `next_frame` and consumption.
    pub fn is_in_flight(&self) -> bool {
        self.shared.state.lock().in_flight.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Consumer-side counters, readable off the audio thread.
    #[inline] pub fn delivered(&self) -> u64 { self.shared.delivered.load(Ordering::Relaxed) }
    #[inline] pub fn underruns(&self) -> u64 { self.shared.underruns.load(Ordering::Relaxed) }
}

impl FrameSource for BlockExchange {
    fn sample_rate(&self) -> f64 {
        f64::from_bits(self.shared.sample_rate_bits.load(Ordering::Relaxed))
    }

    fn channel_count(&self) -> usize {
        self.shared.channel_count.load(Ordering::Relaxed)
    }

    fn next_frame(&self) -> Option<Frame> {
        let mut st = self.shared.state.lock();
        while st.in_flight.is_some() && !st.closed {
            self.shared.slot_freed.wait(&mut st);
        }
        if st.closed {
            return None;
        }

        let seq = st.next_seq;
        st.next_seq += 1;
        st.in_flight = Some(seq);
        let recycled_buffers = st.recycled.take().unwrap_or_default();
        drop(st);

        Some(Frame {
            sample_count: self.sample_count(),
            channel_count: self.channel_count(),
            recycled_buffers,
            completion: Completion { shared: Some(Arc::clone(&self.shared)), seq },
        })
    }

    fn close(&self) {
        let mut st = self.shared.state.lock();
        st.closed = true;
        drop(st);
        self.shared.slot_freed.notify_all();
        self.shared.slot_filled.notify_all();
    }
}

/// One block to render.
#[derive(Debug)]
pub struct Frame {
    pub sample_count: usize,
    pub channel_count: usize,
    /// Buffers returned by the consumer since the last frame; reuse them.
    pub recycled_buffers: Vec<Buffer>,
    completion: Completion,
}

impl Frame {
    /// Buffers for this block: `channel_count` channels of `sample_count`
    /// samples each. Reuses the recycled set when its channel count matches;
    /// sample contents are unspecified.
    pub fn take_buffers(&mut self) -> Vec<Buffer> {
        let mut buffers = std::mem::take(&mut self.recycled_buffers);
        if buffers.len() != self.channel_count {
            buffers.resize_with(self.channel_count, Buffer::new);
        }
        for b in &mut buffers {
            b.resize(self.sample_count, 0.0);
        }
        buffers
    }

    /// Sequence number of this block (0 for the first block).
    pub fn seq(&self) -> u64 {
        self.completion.seq
    }

    /// Publish the rendered block.
    pub fn complete(self, buffers: Vec<Buffer>) {
        self.completion.fulfill(buffers);
    }
}

/// Write-once handle for publishing one block.
///
/// Dropping it unfulfilled releases the in-flight block so the producer is
/// not wedged; the consumer sees an underrun for that block.
#[derive(Debug)]
pub struct Completion {
    shared: Option<Arc<Shared>>,
    seq: u64,
}

impl Completion {
    pub fn fulfill(mut self, buffers: Vec<Buffer>) {
        let Some(shared) = self.shared.take() else { return };
        let mut st = shared.state.lock();
        if st.in_flight == Some(self.seq) && st.filled.is_none() {
            st.filled = Some(buffers);
            drop(st);
            shared.slot_filled.notify_one();
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            let mut st = shared.state.lock();
            if st.in_flight == Some(self.seq) && st.filled.is_none() {
                st.in_flight = None;
                drop(st);
                shared.slot_freed.notify_all();
            }
        }
    }
}

impl BlockConsumer {
    #[inline] pub fn timeout(&self) -> Duration { self.timeout }
    #[inline] pub fn set_timeout(&mut self, timeout: Duration) { self.timeout = timeout; }
    #[inline] pub fn sample_count(&self) -> usize { self.shared.sample_count.load(Ordering::Relaxed) }
    #[inline] pub fn channel_count(&self) -> usize { self.shared.channel_count.load(Ordering::Relaxed) }

    /// Blocks copied out so far.
    #[inline] pub fn delivered(&self) -> u64 { self.shared.delivered.load(Ordering::Relaxed) }
    /// Callbacks that found no block before the timeout.
    #[inline] pub fn underruns(&self) -> u64 { self.shared.underruns.load(Ordering::Relaxed) }

    /// Backend reconfiguration: takes effect from the next block.
    pub fn set_sample_rate(&self, sr: f64) { self.shared.set_sample_rate(sr); }
    /// Backend reconfiguration: takes effect from the next block.
    pub fn set_sample_count(&self, samples: usize) { self.shared.set_sample_count(samples); }

    /// Copy the ready block into planar hardware buffers, one slice per channel.
    ///
    /// Each channel receives `min(slice length, block length)` samples; the
    /// rest of the slice and any channel without a block buffer is zeroed.
    /// Returns `false` on underrun, in which case every slice is zeroed.
    pub fn fill(&mut self, outputs: &mut [&mut [f32]]) -> bool {
        let delivered = self.consume(|buffers| {
            for (ch, out) in outputs.iter_mut().enumerate() {
                match buffers.get(ch) {
                    Some(buf) => {
                        let n = out.len().min(buf.len());
                        out[..n].copy_from_slice(&buf[..n]);
                        out[n..].fill(0.0);
                    }
                    None => out.fill(0.0),
                }
            }
        });
        if !delivered {
            for out in outputs.iter_mut() {
                out.fill(0.0);
            }
        }
        delivered
    }

    /// Copy the ready block into an interleaved buffer with `channels`
    /// channels, converting each sample. Same truncation and underrun rules
    /// as [`fill`](Self::fill).
    pub fn fill_interleaved<T: Copy>(
        &mut self,
        out: &mut [T],
        channels: usize,
        convert: impl Fn(f32) -> T,
    ) -> bool {
        let silence = convert(0.0);
        let delivered = self.consume(|buffers| {
            if channels == 0 {
                out.fill(silence);
                return;
            }
            for (i, frame) in out.chunks_mut(channels).enumerate() {
                for (ch, s) in frame.iter_mut().enumerate() {
                    *s = buffers
                        .get(ch)
                        .and_then(|b| b.get(i))
                        .map_or(silence, |&v| convert(v));
                }
            }
        });
        if !delivered {
            out.fill(silence);
        }
        delivered
    }

    /// Wait up to the timeout for the in-flight block, hand it to `copy`, and
    /// recycle it. Everything happens under the one guard taken with the
    /// deadline, so the callback never waits on the lock past the timeout.
    fn consume(&self, copy: impl FnOnce(&[Buffer])) -> bool {
        let deadline = Instant::now() + self.timeout;
        let Some(mut st) = self.shared.state.try_lock_until(deadline) else {
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        while st.filled.is_none() && !st.closed {
            if self.shared.slot_filled.wait_until(&mut st, deadline).timed_out() {
                break;
            }
        }

        let Some(buffers) = st.filled.take() else {
            drop(st);
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        copy(&buffers);
        st.recycled = Some(buffers);
        st.in_flight = None;
        drop(st);

        self.shared.delivered.fetch_add(1, Ordering::Relaxed);
        self.shared.slot_freed.notify_one();
        true
    }
}
