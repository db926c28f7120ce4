//! Episode scheduling for envplay.
//!
//! This crate paces an interactive episode against a remote environment:
//! fixed-interval ticks with jitter compensation, input buffering between
//! ticks, and step-result dispatch.

pub mod cadence;
pub mod episode;

pub use episode::{Episode, EpisodeHandler};
