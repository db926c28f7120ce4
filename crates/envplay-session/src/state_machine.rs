//! Session state machine enforcing valid lifecycle transitions.
//!
//! [`SessionStateMachine`] is a pure transition table: it owns no episode
//! and performs no I/O. [`crate::session::Session`] consults it before every
//! side effect so an illegal user action never touches the episode.

use std::fmt;

use envplay_core::error::SessionError;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// User-facing lifecycle state of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Connection attempt outstanding.
    #[default]
    Initializing,
    /// Connected, no episode yet.
    NeedsReset,
    /// The last episode terminated. Behaves like [`Self::NeedsReset`].
    Done,
    /// Reset call in flight.
    Resetting,
    /// Episode exists, not ticking.
    Paused,
    /// Episode exists, ticking.
    Playing,
    /// Terminal failure. Only a new session recovers.
    Error,
}

impl SessionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::NeedsReset => "needs_reset",
            Self::Done => "done",
            Self::Resetting => "resetting",
            Self::Paused => "paused",
            Self::Playing => "playing",
            Self::Error => "error",
        }
    }

    /// Whether an episode is live in this state.
    pub const fn has_episode(self) -> bool {
        matches!(self, Self::Paused | Self::Playing)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Actions and events
// ---------------------------------------------------------------------------

/// Transition a user may trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UserAction {
    Reset,
    Play,
    Pause,
}

impl UserAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Play => "play",
            Self::Pause => "pause",
        }
    }
}

/// Anything that moves the session between states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// The connection was established.
    Connected,
    /// A user action.
    User(UserAction),
    /// The reset call succeeded and a new episode exists.
    ResetSucceeded,
    /// The live episode terminated.
    EpisodeDone,
    /// Connect, reset, or step failed.
    Failed,
}

impl SessionEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::User(action) => action.as_str(),
            Self::ResetSucceeded => "reset_succeeded",
            Self::EpisodeDone => "episode_done",
            Self::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// SessionStateMachine
// ---------------------------------------------------------------------------

/// Tracks session state and enforces valid transitions.
///
/// # Example
///
/// ```
/// use envplay_session::state_machine::{SessionEvent, SessionState, SessionStateMachine, UserAction};
///
/// let mut sm = SessionStateMachine::new();
/// sm.apply(SessionEvent::Connected).unwrap();
/// assert_eq!(sm.apply(SessionEvent::User(UserAction::Reset)).unwrap(), SessionState::Resetting);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStateMachine {
    state: SessionState,
}

impl SessionStateMachine {
    /// Create a state machine in [`SessionState::Initializing`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SessionState::Initializing,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Validate and apply one event, returning the new state.
    ///
    /// `Failed` moves every state to [`SessionState::Error`]; once there,
    /// further failures are absorbed and everything else is rejected.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionState, SessionError> {
        use SessionEvent as E;
        use SessionState as S;

        let next = match (self.state, event) {
            (S::Initializing, E::Connected) => S::NeedsReset,
            (S::NeedsReset | S::Done | S::Paused | S::Playing, E::User(UserAction::Reset)) => {
                S::Resetting
            }
            (S::Resetting, E::ResetSucceeded) => S::Paused,
            (S::Paused, E::User(UserAction::Play)) => S::Playing,
            (S::Playing, E::User(UserAction::Pause)) => S::Paused,
            // A step already in flight when paused may still end the episode.
            (S::Paused | S::Playing, E::EpisodeDone) => S::Done,
            (_, E::Failed) => S::Error,
            (state, event) => {
                return Err(SessionError::ActionNotAllowed {
                    state: state.as_str(),
                    action: event.as_str(),
                });
            }
        };
        self.state = next;
        Ok(next)
    }

    /// User actions accepted in the current state.
    pub const fn allowed_actions(&self) -> &'static [UserAction] {
        match self.state {
            SessionState::NeedsReset | SessionState::Done => &[UserAction::Reset],
            SessionState::Paused => &[UserAction::Play, UserAction::Reset],
            SessionState::Playing => &[UserAction::Pause, UserAction::Reset],
            SessionState::Initializing | SessionState::Resetting | SessionState::Error => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const RESET: SessionEvent = SessionEvent::User(UserAction::Reset);
    const PLAY: SessionEvent = SessionEvent::User(UserAction::Play);
    const PAUSE: SessionEvent = SessionEvent::User(UserAction::Pause);

    fn sm_in(events: &[SessionEvent]) -> SessionStateMachine {
        let mut sm = SessionStateMachine::new();
        for event in events {
            sm.apply(*event).unwrap();
        }
        sm
    }

    fn paused() -> SessionStateMachine {
        sm_in(&[SessionEvent::Connected, RESET, SessionEvent::ResetSucceeded])
    }

    #[test]
    fn new_starts_initializing() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.state(), SessionState::Initializing);
        assert!(sm.allowed_actions().is_empty());
        assert_eq!(SessionStateMachine::default(), sm);
    }

    #[test]
    fn initializing_rejects_user_actions() {
        let mut sm = SessionStateMachine::new();
        let err = sm.apply(RESET).unwrap_err();
        assert_eq!(
            err,
            SessionError::ActionNotAllowed {
                state: "initializing",
                action: "reset",
            }
        );
        assert_eq!(sm.state(), SessionState::Initializing);
    }

    #[test]
    fn connect_then_reset_to_paused() {
        let mut sm = sm_in(&[SessionEvent::Connected]);
        assert_eq!(sm.state(), SessionState::NeedsReset);
        assert_eq!(sm.allowed_actions(), &[UserAction::Reset]);

        assert_eq!(sm.apply(RESET).unwrap(), SessionState::Resetting);
        assert!(sm.allowed_actions().is_empty());
        assert_eq!(sm.apply(SessionEvent::ResetSucceeded).unwrap(), SessionState::Paused);
    }

    #[test]
    fn resetting_rejects_user_actions() {
        let mut sm = sm_in(&[SessionEvent::Connected, RESET]);
        assert!(sm.apply(PLAY).is_err());
        assert!(sm.apply(RESET).is_err());
        assert_eq!(sm.state(), SessionState::Resetting);
    }

    #[test]
    fn play_pause_cycle() {
        let mut sm = paused();
        assert_eq!(sm.allowed_actions(), &[UserAction::Play, UserAction::Reset]);
        assert_eq!(sm.apply(PLAY).unwrap(), SessionState::Playing);
        assert_eq!(sm.allowed_actions(), &[UserAction::Pause, UserAction::Reset]);
        assert!(sm.apply(PLAY).is_err());
        assert_eq!(sm.apply(PAUSE).unwrap(), SessionState::Paused);
        assert!(sm.apply(PAUSE).is_err());
    }

    #[test]
    fn reset_from_live_episode() {
        let mut sm = paused();
        assert_eq!(sm.apply(RESET).unwrap(), SessionState::Resetting);

        let mut sm = paused();
        sm.apply(PLAY).unwrap();
        assert_eq!(sm.apply(RESET).unwrap(), SessionState::Resetting);
    }

    #[test]
    fn done_allows_only_reset() {
        let mut sm = paused();
        sm.apply(PLAY).unwrap();
        assert_eq!(sm.apply(SessionEvent::EpisodeDone).unwrap(), SessionState::Done);
        assert_eq!(sm.allowed_actions(), &[UserAction::Reset]);
        assert!(sm.apply(PLAY).is_err());
        assert_eq!(sm.apply(RESET).unwrap(), SessionState::Resetting);
    }

    #[test]
    fn episode_done_outside_an_episode_is_rejected() {
        let mut sm = sm_in(&[SessionEvent::Connected]);
        assert!(sm.apply(SessionEvent::EpisodeDone).is_err());
    }

    #[test]
    fn failure_is_terminal_from_any_state() {
        for prefix in [
            &[][..],
            &[SessionEvent::Connected][..],
            &[SessionEvent::Connected, RESET][..],
            &[SessionEvent::Connected, RESET, SessionEvent::ResetSucceeded, PLAY][..],
        ] {
            let mut sm = sm_in(prefix);
            assert_eq!(sm.apply(SessionEvent::Failed).unwrap(), SessionState::Error);
            assert!(sm.allowed_actions().is_empty());
            assert!(sm.apply(RESET).is_err());
            assert!(sm.apply(SessionEvent::Connected).is_err());
            // Later failures are absorbed.
            assert_eq!(sm.apply(SessionEvent::Failed).unwrap(), SessionState::Error);
            assert!(sm.state().is_terminal());
        }
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::NeedsReset.to_string(), "needs_reset");
        assert!(SessionState::Paused.has_episode());
        assert!(!SessionState::Done.has_episode());
    }
}
