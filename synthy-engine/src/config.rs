//! Engine configuration.
//!
//! One explicit value threaded through `Engine::new` and `handoff::exchange`;
//! there is no process-wide sample rate. The transport may still change the
//! sample rate or block size at runtime through the exchange.

use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Initial sample rate in Hz.
    pub sample_rate: f64,
    /// Output channels; synthesis is mono and replicated to each.
    pub channel_count: usize,
    /// Initial samples per block.
    pub block_size: usize,
    /// Scalar applied to every new voice's amplitude.
    pub volume: f64,
    /// Smoothing factor of the per-voice low-pass, in `(0, 1]`.
    pub lowpass_alpha: f64,
    /// Rate of the per-voice vibrato child (Hz).
    pub vibrato_rate: f64,
    /// Depth of the per-voice vibrato child (Hz added to the note frequency).
    pub vibrato_depth: f64,
    /// How long the consumer waits for a block before giving up on it.
    pub poll_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            channel_count: 2,
            block_size: 512,
            volume: 0.2,
            lowpass_alpha: 0.1,
            vibrato_rate: 1.0,
            vibrato_depth: 100.0,
            poll_timeout: Duration::from_millis(2),
        }
    }
}

impl EngineConfig {
    #[must_use] pub fn with_sample_rate(mut self, sr: f64) -> Self { self.sample_rate = sr; self }
    #[must_use] pub fn with_channel_count(mut self, channels: usize) -> Self { self.channel_count = channels; self }
    #[must_use] pub fn with_block_size(mut self, samples: usize) -> Self { self.block_size = samples; self }
    #[must_use] pub fn with_volume(mut self, volume: f64) -> Self { self.volume = volume; self }
    #[must_use] pub fn with_lowpass_alpha(mut self, alpha: f64) -> Self { self.lowpass_alpha = alpha; self }
    #[must_use] pub fn with_vibrato(mut self, rate_hz: f64, depth_hz: f64) -> Self {
        self.vibrato_rate = rate_hz;
        self.vibrato_depth = depth_hz;
        self
    }
    #[must_use] pub fn with_poll_timeout(mut self, timeout: Duration) -> Self { self.poll_timeout = timeout; self }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(Error::InvalidConfig(format!("sample rate must be positive, got {}", self.sample_rate)));
        }
        if self.channel_count == 0 {
            return Err(Error::InvalidConfig("channel count must be at least 1".into()));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidConfig("block size must be at least 1".into()));
        }
        if !(self.volume.is_finite() && self.volume >= 0.0) {
            return Err(Error::InvalidConfig(format!("volume must be finite and non-negative, got {}", self.volume)));
        }
        if !(self.lowpass_alpha > 0.0 && self.lowpass_alpha <= 1.0) {
            return Err(Error::InvalidConfig(format!("low-pass alpha must be in (0, 1], got {}", self.lowpass_alpha)));
        }
        if !(self.vibrato_rate.is_finite() && self.vibrato_depth.is_finite()) {
            return Err(Error::InvalidConfig("vibrato rate and depth must be finite".into()));
        }
        Ok(())
    }
}
