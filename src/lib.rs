//! Monophonic keyboard synthesizer: letter keys play scale degrees through
//! an oscillator, a resonant low-pass filter and a linear ADSR envelope.

pub mod controls;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod gain;
pub mod input;
pub mod oscillator;
pub mod output;
pub mod params;
pub mod pitch;
pub mod scope;
