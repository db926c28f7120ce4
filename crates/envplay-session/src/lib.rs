//! Session coordination for envplay.
//!
//! - [`state_machine`] - [`SessionStateMachine`], the pure lifecycle table
//! - [`session`] - [`Session`], which drives resets and owns the live episode
//! - [`sink`] - [`RenderSink`], where observations, scores, and errors go

pub mod session;
pub mod sink;
pub mod state_machine;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use session::Session;
pub use sink::RenderSink;
pub use state_machine::{SessionEvent, SessionState, SessionStateMachine, UserAction};

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{RenderSink, Session, SessionState, UserAction};
}
