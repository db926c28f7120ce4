//! Session coordinator.
//!
//! A [`Session`] owns the connection's [`EnvClient`], at most one live
//! [`Episode`], and the [`SessionStateMachine`]. User actions are validated
//! against the state machine before they touch the episode. Results flow out
//! through a [`RenderSink`].
//!
//! Each reset starts a new generation. Episode callbacks and reset replies
//! carry the generation they were issued under and are dropped once it is
//! no longer current, so a detached episode can never reach the sink.
//!
//! Lock order is session, then episode. The sink is only called with no
//! lock held.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tracing::{debug, error, info};

use envplay_core::config::PlayConfig;
use envplay_core::error::{CallError, LifecycleError, SessionError, TransportError};
use envplay_core::input::RawInputEvent;
use envplay_core::types::Observation;
use envplay_env::episode::{Episode, EpisodeHandler};
use envplay_gym::client::EnvClient;
use envplay_gym::protocol::ResetReply;
use envplay_gym::transport::Transport;

use crate::sink::RenderSink;
use crate::state_machine::{SessionEvent, SessionState, SessionStateMachine, UserAction};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Top-level coordinator for one connection. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

struct SessionShared {
    config: PlayConfig,
    sink: Arc<dyn RenderSink>,
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<SessionState>,
}

struct SessionInner {
    machine: SessionStateMachine,
    client: Option<EnvClient>,
    episode: Option<Episode>,
    generation: u64,
    last_total: f64,
    error: Option<SessionError>,
}

impl Session {
    /// Create a session in [`SessionState::Initializing`].
    pub fn new(config: PlayConfig, sink: Arc<dyn RenderSink>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Initializing);
        Self {
            shared: Arc::new(SessionShared {
                config,
                sink,
                inner: Mutex::new(SessionInner {
                    machine: SessionStateMachine::new(),
                    client: None,
                    episode: None,
                    generation: 0,
                    last_total: 0.0,
                    error: None,
                }),
                state_tx,
            }),
        }
    }

    /// Await a connection attempt and record its outcome.
    ///
    /// # Errors
    ///
    /// [`SessionError::Connect`] if `connect` fails (the session is then in
    /// [`SessionState::Error`]), or [`SessionError::ActionNotAllowed`] if the
    /// session is past initialization.
    pub async fn establish<F>(&self, connect: F) -> Result<(), SessionError>
    where
        F: Future<Output = Result<Transport, TransportError>>,
    {
        match connect.await {
            Ok(transport) => self.connected(EnvClient::spawn(transport)),
            Err(e) => {
                let err = SessionError::Connect(e.to_string());
                self.connect_failed(e.to_string());
                Err(err)
            }
        }
    }

    /// Adopt an already connected client.
    ///
    /// # Errors
    ///
    /// [`SessionError::ActionNotAllowed`] unless initializing.
    pub fn connected(&self, client: EnvClient) -> Result<(), SessionError> {
        let mut inner = self.shared.lock();
        self.shared.transition(&mut inner, SessionEvent::Connected)?;
        inner.client = Some(client);
        Ok(())
    }

    /// Record a failed connection attempt. The session enters
    /// [`SessionState::Error`].
    pub fn connect_failed(&self, reason: impl Into<String>) {
        self.shared.fail(SessionError::Connect(reason.into()));
    }

    /// Close the live episode, if any, and request a fresh one.
    ///
    /// Returns once the reset call is queued; the outcome arrives through
    /// the sink and the state watch. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SessionError::ActionNotAllowed`] unless the state allows a reset.
    pub fn reset(&self) -> Result<(), SessionError> {
        let (client, generation, old) = {
            let mut inner = self.shared.lock();
            let Some(client) = inner.client.clone() else {
                return Err(not_allowed(inner.machine.state(), UserAction::Reset));
            };
            self.shared
                .transition(&mut inner, SessionEvent::User(UserAction::Reset))?;
            inner.generation += 1;
            inner.last_total = 0.0;
            (client, inner.generation, inner.episode.take())
        };
        if let Some(episode) = old {
            episode.close();
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let result = client.reset().await;
            shared.reset_settled(generation, client, result);
        });
        Ok(())
    }

    /// Start ticking the live episode.
    ///
    /// # Errors
    ///
    /// [`SessionError::ActionNotAllowed`] unless paused.
    pub fn play(&self) -> Result<(), SessionError> {
        self.shared.episode_action(UserAction::Play, Episode::play)
    }

    /// Stop ticking the live episode.
    ///
    /// # Errors
    ///
    /// [`SessionError::ActionNotAllowed`] unless playing.
    pub fn pause(&self) -> Result<(), SessionError> {
        self.shared.episode_action(UserAction::Pause, Episode::pause)
    }

    /// Buffer an input event for the live episode. Dropped when there is
    /// none.
    pub fn push_event(&self, event: RawInputEvent) {
        let inner = self.shared.lock();
        match &inner.episode {
            Some(episode) => episode.push_event(event),
            None => debug!(state = %inner.machine.state(), "dropping input event, no live episode"),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().machine.state()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// User actions accepted right now.
    pub fn allowed_actions(&self) -> &'static [UserAction] {
        self.shared.lock().machine.allowed_actions()
    }

    /// Cumulative reward of the live episode, or of the last one.
    pub fn total_reward(&self) -> f64 {
        let inner = self.shared.lock();
        inner
            .episode
            .as_ref()
            .map_or(inner.last_total, Episode::total_reward)
    }

    /// The failure that put the session into [`SessionState::Error`].
    pub fn last_error(&self) -> Option<SessionError> {
        self.shared.lock().error.clone()
    }

    pub fn config(&self) -> &PlayConfig {
        &self.shared.config
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `event` and publish the new state. Called with the lock held
    /// so watchers observe transitions in order.
    fn transition(
        &self,
        inner: &mut SessionInner,
        event: SessionEvent,
    ) -> Result<SessionState, SessionError> {
        let from = inner.machine.state();
        let to = inner.machine.apply(event)?;
        if from != to {
            info!(%from, %to, event = event.as_str(), "session transition");
            self.state_tx.send_replace(to);
        }
        Ok(to)
    }

    fn episode_action(
        &self,
        action: UserAction,
        op: fn(&Episode) -> Result<(), LifecycleError>,
    ) -> Result<(), SessionError> {
        let mut inner = self.lock();
        let mut machine = inner.machine;
        machine.apply(SessionEvent::User(action))?;
        let Some(episode) = &inner.episode else {
            return Err(not_allowed(inner.machine.state(), action));
        };
        op(episode)?;
        self.transition(&mut inner, SessionEvent::User(action))?;
        Ok(())
    }

    fn reset_settled(
        self: &Arc<Self>,
        generation: u64,
        client: EnvClient,
        result: Result<ResetReply, CallError>,
    ) {
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                if self.is_current(generation) {
                    self.fail(SessionError::Call(e));
                } else {
                    debug!(error = %e, "ignoring failed reset of a stale generation");
                }
                return;
            }
        };

        {
            let mut inner = self.lock();
            if inner.generation != generation || inner.machine.state() != SessionState::Resetting {
                debug!(generation, "discarding stale reset reply");
                return;
            }
            let episode = Episode::new(client, &self.config);
            episode.set_handler(Arc::new(EpisodeBridge {
                session: Arc::downgrade(self),
                generation,
            }));
            inner.episode = Some(episode);
            if let Err(e) = self.transition(&mut inner, SessionEvent::ResetSucceeded) {
                debug!(error = %e, "reset reply raced a transition");
                return;
            }
        }
        self.sink.on_observation(&reply.observation);
    }

    fn is_current(&self, generation: u64) -> bool {
        let inner = self.lock();
        inner.generation == generation && !inner.machine.state().is_terminal()
    }

    fn episode_done(&self, generation: u64) {
        let finished = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            if let Err(e) = self.transition(&mut inner, SessionEvent::EpisodeDone) {
                debug!(error = %e, "ignoring episode completion");
                return;
            }
            let finished = inner.episode.take();
            if let Some(episode) = &finished {
                inner.last_total = episode.total_reward();
            }
            finished
        };
        drop(finished);
        self.sink.on_done();
    }

    /// Enter the terminal error state and report `err` once.
    fn fail(&self, err: SessionError) {
        let episode = {
            let mut inner = self.lock();
            if inner.machine.state().is_terminal() {
                debug!(error = %err, "session already failed");
                return;
            }
            // Failed is accepted from every non-terminal state.
            let _ = self.transition(&mut inner, SessionEvent::Failed);
            inner.generation += 1;
            inner.error = Some(err.clone());
            let episode = inner.episode.take();
            if let Some(episode) = &episode {
                inner.last_total = episode.total_reward();
            }
            episode
        };
        if let Some(episode) = episode {
            episode.close();
        }
        error!(error = %err, "session failed");
        self.sink.on_error(&err);
    }
}

fn not_allowed(state: SessionState, action: UserAction) -> SessionError {
    SessionError::ActionNotAllowed {
        state: state.as_str(),
        action: action.as_str(),
    }
}

// ---------------------------------------------------------------------------
// EpisodeBridge
// ---------------------------------------------------------------------------

/// Forwards one episode's results to its session while that episode's
/// generation is current.
struct EpisodeBridge {
    session: Weak<SessionShared>,
    generation: u64,
}

impl EpisodeBridge {
    fn live(&self) -> Option<Arc<SessionShared>> {
        let shared = self.session.upgrade()?;
        shared.is_current(self.generation).then_some(shared)
    }
}

impl EpisodeHandler for EpisodeBridge {
    fn on_observation(&self, observation: &Observation) {
        if let Some(shared) = self.live() {
            shared.sink.on_observation(observation);
        }
    }

    fn on_reward(&self, _reward: f64, total: f64) {
        if let Some(shared) = self.live() {
            shared.sink.on_reward(total);
        }
    }

    fn on_done(&self) {
        if let Some(shared) = self.session.upgrade() {
            shared.episode_done(self.generation);
        }
    }

    fn on_error(&self, error: &CallError) {
        if let Some(shared) = self.live() {
            shared.fail(SessionError::Call(error.clone()));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
