//! Oscillators and the modulator tree.
//!
//! A [`Generator`] is one oscillator with its own phase. Its effective
//! frequency and amplitude are its base values folded through ordered lists
//! of [`Modulator`]s: each modulator owns a child generator whose live output
//! is combined into the running value with a [`Combine`] operator.
//!
//! Per sample the caller does exactly:
//! 1. [`Generator::sample`] to read the output (amplitude children are sampled,
//!    the filter chain runs once),
//! 2. [`Generator::advance`] to move the phase (frequency children are sampled,
//!    then every child advances by the same sample rate).
//!
//! Calling either more than once per sample detunes the oscillator and
//! double-steps its filters.
//!
//! Ownership is a plain tree: every generator exclusively owns its children,
//! so there are no back references to break. A cycle cannot be built through
//! this API; nothing checks for one at runtime.

use alloc::vec::Vec;
use core::fmt::Debug;

use crate::dsp::{clip, m_floor, m_sin, TAU};
use crate::filters::{self, Filter};

/// Oscillator wave shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wave { Sine, Square, Saw }

impl Wave {
    /// Phase units per full cycle: 2π for the trigonometric shapes, 1 for the ramp.
    #[inline]
    pub fn period(self) -> f64 {
        match self {
            Wave::Sine | Wave::Square => TAU,
            Wave::Saw => 1.0,
        }
    }

    /// One output sample at `phase`, scaled by `amplitude`.
    #[inline]
    pub fn render(self, phase: f64, amplitude: f64) -> f64 {
        match self {
            Wave::Sine => amplitude * clip(m_sin(phase)),
            Wave::Square => {
                if clip(m_sin(phase)) > 0.0 { amplitude } else { -amplitude }
            }
            Wave::Saw => amplitude * (2.0 * (phase - m_floor(phase)) - 1.0),
        }
    }
}

/// Binary operator folding a child's output into a parent parameter.
#[derive(Copy, Clone, Debug)]
pub enum Combine {
    /// `acc + child`
    Add,
    /// `acc * child`
    Multiply,
    /// Any other pure operator.
    Custom(fn(f64, f64) -> f64),
}

impl Combine {
    #[inline]
    pub fn apply(self, acc: f64, child: f64) -> f64 {
        match self {
            Combine::Add => acc + child,
            Combine::Multiply => acc * child,
            Combine::Custom(f) => f(acc, child),
        }
    }
}

/// A child generator plus the operator that folds its output into the parent.
#[derive(Clone, Debug)]
pub struct Modulator {
    pub combine: Combine,
    pub source: Generator,
}

impl Modulator {
    #[inline]
    pub fn new(combine: Combine, source: Generator) -> Self {
        Self { combine, source }
    }
}

/// Single oscillator with optional frequency/amplitude modulation and a filter chain.
#[derive(Clone, Debug)]
pub struct Generator {
    wave: Wave,
    frequency: f64,
    amplitude: f64,
    phase: f64,
    frequency_modulators: Vec<Modulator>,
    amplitude_modulators: Vec<Modulator>,
    filters: Vec<Filter>,
}

impl Generator {
    /// Fresh generator at phase 0 with no modulators or filters.
    pub fn new(wave: Wave, frequency_hz: f64, amplitude: f64) -> Self {
        Self {
            wave,
            frequency: frequency_hz,
            amplitude,
            phase: 0.0,
            frequency_modulators: Vec::new(),
            amplitude_modulators: Vec::new(),
            filters: Vec::new(),
        }
    }

    #[inline] pub fn sine(frequency_hz: f64, amplitude: f64) -> Self { Self::new(Wave::Sine, frequency_hz, amplitude) }
    #[inline] pub fn square(frequency_hz: f64, amplitude: f64) -> Self { Self::new(Wave::Square, frequency_hz, amplitude) }
    #[inline] pub fn saw(frequency_hz: f64, amplitude: f64) -> Self { Self::new(Wave::Saw, frequency_hz, amplitude) }

    #[must_use]
    pub fn with_frequency_modulator(mut self, combine: Combine, source: Generator) -> Self {
        self.frequency_modulators.push(Modulator::new(combine, source));
        self
    }

    #[must_use]
    pub fn with_amplitude_modulator(mut self, combine: Combine, source: Generator) -> Self {
        self.amplitude_modulators.push(Modulator::new(combine, source));
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filters.push(filter.into());
        self
    }

    #[inline] pub fn wave(&self) -> Wave { self.wave }
    #[inline] pub fn period(&self) -> f64 { self.wave.period() }
    #[inline] pub fn phase(&self) -> f64 { self.phase }
    #[inline] pub fn base_frequency(&self) -> f64 { self.frequency }
    #[inline] pub fn base_amplitude(&self) -> f64 { self.amplitude }
    #[inline] pub fn set_base_frequency(&mut self, hz: f64) { self.frequency = hz; }
    #[inline] pub fn set_base_amplitude(&mut self, amplitude: f64) { self.amplitude = amplitude; }
    #[inline] pub fn frequency_modulators(&self) -> &[Modulator] { &self.frequency_modulators }
    #[inline] pub fn amplitude_modulators(&self) -> &[Modulator] { &self.amplitude_modulators }
    #[inline] pub fn filters(&self) -> &[Filter] { &self.filters }

    /// Effective frequency: the base folded through the frequency modulators.
    /// Samples each child once.
    #[inline]
    pub fn frequency(&mut self) -> f64 {
        fold(self.frequency, &mut self.frequency_modulators)
    }

    /// Effective amplitude: the base folded through the amplitude modulators.
    /// Samples each child once.
    #[inline]
    pub fn amplitude(&mut self) -> f64 {
        fold(self.amplitude, &mut self.amplitude_modulators)
    }

    /// Current output: wave at the current phase, scaled by the effective
    /// amplitude, then run through the filter chain. Does not move the phase.
    #[inline]
    pub fn sample(&mut self) -> f64 {
        let amplitude = self.amplitude();
        let raw = self.wave.render(self.phase, amplitude);
        filters::apply(raw, &mut self.filters)
    }

    /// Step one sample forward at `sample_rate`, recursing into every child.
    #[inline]
    pub fn advance(&mut self, sample_rate: f64) {
        let frequency = self.frequency();
        self.phase += (self.period() / sample_rate) * frequency;

        for m in self.frequency_modulators.iter_mut().chain(self.amplitude_modulators.iter_mut()) {
            m.source.advance(sample_rate);
        }
    }

    /// `sample` followed by `advance`.
    #[inline]
    pub fn tick(&mut self, sample_rate: f64) -> f64 {
        let s = self.sample();
        self.advance(sample_rate);
        s
    }

    /// Back to phase 0 with cleared filter state, recursively.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        for f in &mut self.filters {
            f.reset();
        }
        for m in self.frequency_modulators.iter_mut().chain(self.amplitude_modulators.iter_mut()) {
            m.source.reset();
        }
    }
}

#[inline]
fn fold(base: f64, modulators: &mut [Modulator]) -> f64 {
    modulators
        .iter_mut()
        .fold(base, |acc, m| m.combine.apply(acc, m.source.sample()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::LowPass;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    const SR: f64 = 48_000.0;

    #[test]
    fn wave_periods() {
        assert_relative_eq!(Wave::Sine.period(), TAU);
        assert_relative_eq!(Wave::Square.period(), TAU);
        assert_relative_eq!(Wave::Saw.period(), 1.0);
    }

    #[test]
    fn saw_ramps_from_minus_amplitude() {
        assert_abs_diff_eq!(Wave::Saw.render(0.0, 0.5), -0.5);
        assert_abs_diff_eq!(Wave::Saw.render(0.5, 0.5), 0.0);
        assert_abs_diff_eq!(Wave::Saw.render(1.25, 0.5), -0.25);
    }

    #[test]
    fn square_follows_sine_sign() {
        assert_abs_diff_eq!(Wave::Square.render(0.5, 0.3), 0.3);
        assert_abs_diff_eq!(Wave::Square.render(4.0, 0.3), -0.3);
        // sin(0) == 0 is not positive
        assert_abs_diff_eq!(Wave::Square.render(0.0, 0.3), -0.3);
    }

    #[test]
    fn sine_phase_after_one_second() {
        let mut g = Generator::sine(3.0, 1.0);
        for _ in 0..SR as usize {
            g.tick(SR);
        }
        assert_relative_eq!(g.phase(), TAU * 3.0, max_relative = 1e-9);
    }

    #[test]
    fn saw_phase_counts_cycles() {
        let mut g = Generator::saw(100.0, 1.0);
        for _ in 0..480 {
            g.advance(SR);
        }
        assert_relative_eq!(g.phase(), 1.0, max_relative = 1e-9);
    }

    #[test]
    fn phase_is_independent_of_block_split() {
        let mut whole = Generator::sine(441.0, 1.0)
            .with_frequency_modulator(Combine::Add, Generator::sine(1.0, 100.0));
        let mut split = whole.clone();

        for _ in 0..SR as usize {
            whole.tick(SR);
        }
        let mut remaining = SR as usize;
        let mut sizes = [64usize, 128, 1000, 7, 512].into_iter().cycle();
        while remaining > 0 {
            let n = sizes.next().unwrap_or(64).min(remaining);
            for _ in 0..n {
                split.tick(SR);
            }
            remaining -= n;
        }
        assert_eq!(whole.phase().to_bits(), split.phase().to_bits());
    }

    #[test]
    fn zero_frequency_holds_phase() {
        let mut g = Generator::sine(0.0, 0.8);
        for _ in 0..16 {
            assert_abs_diff_eq!(g.tick(SR), 0.0);
        }
        assert_abs_diff_eq!(g.phase(), 0.0);
    }

    #[test]
    fn additive_frequency_modulator_folds_child_output() {
        // Saw at 0 Hz sits at phase 0, so it outputs -amplitude forever.
        let mut g = Generator::sine(440.0, 1.0)
            .with_frequency_modulator(Combine::Add, Generator::saw(0.0, 100.0));
        assert_relative_eq!(g.frequency(), 340.0);
    }

    #[test]
    fn modulators_fold_in_order() {
        let mut g = Generator::sine(10.0, 1.0)
            .with_frequency_modulator(Combine::Add, Generator::saw(0.0, -2.0)) // +2
            .with_frequency_modulator(Combine::Multiply, Generator::saw(0.0, -3.0)); // *3
        assert_relative_eq!(g.frequency(), 36.0);
    }

    #[test]
    fn custom_combine() {
        fn take_max(a: f64, b: f64) -> f64 { a.max(b) }
        let mut g = Generator::saw(0.0, 1.0)
            .with_amplitude_modulator(Combine::Custom(take_max), Generator::saw(0.0, -4.0));
        assert_relative_eq!(g.amplitude(), 4.0);
    }

    #[test]
    fn amplitude_modulator_scales_output() {
        let mut g = Generator::saw(0.0, 0.5)
            .with_amplitude_modulator(Combine::Multiply, Generator::saw(0.0, -2.0));
        // amplitude 0.5 * 2 = 1.0, saw at phase 0 = -1.0
        assert_abs_diff_eq!(g.sample(), -1.0);
    }

    #[test]
    fn children_advance_on_their_own_frequency() {
        let mut g = Generator::sine(0.0, 1.0)
            .with_frequency_modulator(Combine::Add, Generator::saw(100.0, 0.0))
            .with_amplitude_modulator(Combine::Add, Generator::saw(200.0, 0.0));
        for _ in 0..240 {
            g.tick(SR);
        }
        assert_relative_eq!(g.frequency_modulators()[0].source.phase(), 0.5, max_relative = 1e-9);
        assert_relative_eq!(g.amplitude_modulators()[0].source.phase(), 1.0, max_relative = 1e-9);
    }

    #[test]
    fn filters_run_after_amplitude() {
        let mut g = Generator::saw(0.0, 1.0).with_filter(LowPass::new(0.5));
        // raw = -1.0, filtered = 0 + 0.5 * (-1 - 0)
        assert_abs_diff_eq!(g.sample(), -0.5);
        assert_abs_diff_eq!(g.sample(), -0.75);
    }

    #[test]
    fn reset_is_recursive() {
        let mut g = Generator::saw(100.0, 1.0)
            .with_frequency_modulator(Combine::Add, Generator::sine(3.0, 1.0))
            .with_filter(LowPass::new(0.2));
        for _ in 0..100 {
            g.tick(SR);
        }
        g.reset();
        assert_abs_diff_eq!(g.phase(), 0.0);
        assert_abs_diff_eq!(g.frequency_modulators()[0].source.phase(), 0.0);
        // filter memory cleared: first output is α * raw
        assert_abs_diff_eq!(g.sample(), 0.2 * -1.0);
    }
}
