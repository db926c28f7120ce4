//! Shared test fixtures and utilities for envplay crates.
//!
//! Provides a scripted remote environment served over an in-memory
//! transport and a shared recorder for callback-driven assertions.

pub mod fake_env;
pub mod recorder;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fake_env::{FakeEnv, FakeEnvHandle, RecordedRequest, connect_fake_env, spawn_fake_env};
pub use recorder::Recorder;
