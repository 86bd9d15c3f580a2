#![cfg_attr(not(feature = "std"), no_std)]
//! Synthy Core: no_std-ready oscillators, modulator trees and filters.
//!
//! Features
//! - `std`    : (default) use the Rust standard library
//! - `no-std` : build with `#![no_std]` (plus `alloc`) and use `libm` for math
//!
//! Modules
//! - [`dsp`]       : math backend, pitch helpers, denormal handling
//! - [`filters`]   : one-pole low-pass and the filter chain
//! - [`generator`] : wave shapes, `Generator`, modulators
//!
//! Design
//! - Generator trees are owned values; cloning one clones the whole subtree
//! - No allocation per sample; building a generator allocates its lists once
//! - All signal math in `f64`

extern crate alloc;

pub mod dsp;
pub mod filters;
pub mod generator;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::dsp::{clip, frequency_for_note, kill_denormals, velocity_gain, TAU};
    pub use crate::filters::{Filter, LowPass};
    pub use crate::generator::{Combine, Generator, Modulator, Wave};
}
