//! Render/score sink interface.

use envplay_core::error::SessionError;
use envplay_core::types::Observation;

/// Receives everything a session wants displayed.
///
/// Calls are made without any session lock held. Implementations must not
/// block; they run on the tasks that drive the session.
pub trait RenderSink: Send + Sync {
    /// A new frame: the reset observation or a step observation.
    fn on_observation(&self, observation: &Observation);

    /// Cumulative reward of the live episode.
    fn on_reward(&self, cumulative: f64);

    /// The episode terminated.
    fn on_done(&self);

    /// The session entered its error state.
    fn on_error(&self, error: &SessionError);
}
