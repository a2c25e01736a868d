//! Stimulus sequence generation for serial-response regularity experiments.
//!
//! A run samples, for every subject, a few position pairs with similar
//! transition times, checks that no pair is overused across the population,
//! and writes per-subject trial files in which those pairs are embedded.

pub mod artifact;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod sampling;
pub mod trials;

pub use error::{Error, GenerationError, GenerationErrorKind, Result};
