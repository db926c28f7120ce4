//! Episode scheduler.
//!
//! An [`Episode`] is one run of the remote environment from a successful
//! reset until termination or an explicit close. While playing it fires a
//! tick every `interval`, hands the input events buffered since the last
//! tick to one `step` call, and reports the reply to its
//! [`EpisodeHandler`].
//!
//! At most one step call is in flight per episode. The next tick is only
//! scheduled once the previous step has settled, and its delay is shortened
//! by the time already spent since the last tick fired (see
//! [`crate::cadence`]).

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use envplay_core::config::PlayConfig;
use envplay_core::error::{CallError, LifecycleError};
use envplay_core::filter::EventFilter;
use envplay_core::input::{RawInputEvent, actions_for_events};
use envplay_core::types::Observation;
use envplay_gym::client::EnvClient;
use envplay_gym::protocol::StepReply;

use crate::cadence::next_delay;

// ---------------------------------------------------------------------------
// EpisodeHandler
// ---------------------------------------------------------------------------

/// Receives the results of an episode's step calls.
///
/// Callbacks run on the step task, outside the episode's lock, so they may
/// call back into the [`Episode`].
pub trait EpisodeHandler: Send + Sync {
    /// New observation from a successful step.
    fn on_observation(&self, observation: &Observation);

    /// Reward of the step just applied, and the running total.
    fn on_reward(&self, reward: f64, total: f64);

    /// The remote reported termination. The episode is already closed.
    fn on_done(&self);

    /// A step call failed. The episode is already closed.
    fn on_error(&self, error: &CallError);
}

// ---------------------------------------------------------------------------
// Episode
// ---------------------------------------------------------------------------

/// Handle to a live episode. Dropping it closes the episode.
pub struct Episode {
    shared: Arc<EpisodeShared>,
}

struct EpisodeShared {
    client: EnvClient,
    interval: Duration,
    state: Mutex<EpisodeState>,
}

struct EpisodeState {
    playing: bool,
    closed: bool,
    total_reward: f64,
    steps: u64,
    last_tick: Instant,
    events: Vec<RawInputEvent>,
    step_in_flight: bool,
    timer: Option<PendingTick>,
    next_timer_id: u64,
    handler: Option<Arc<dyn EpisodeHandler>>,
    filter: EventFilter,
}

struct PendingTick {
    id: u64,
    handle: JoinHandle<()>,
}

impl Episode {
    /// Create a paused episode that steps through `client`.
    pub fn new(client: EnvClient, config: &PlayConfig) -> Self {
        Self {
            shared: Arc::new(EpisodeShared {
                client,
                interval: config.interval(),
                state: Mutex::new(EpisodeState {
                    playing: false,
                    closed: false,
                    total_reward: 0.0,
                    steps: 0,
                    last_tick: Instant::now(),
                    events: Vec::new(),
                    step_in_flight: false,
                    timer: None,
                    next_timer_id: 0,
                    handler: None,
                    filter: EventFilter::new(config.filter, config.width, config.height),
                }),
            }),
        }
    }

    /// Replace the result handler. Ignored once the episode is closed.
    pub fn set_handler(&self, handler: Arc<dyn EpisodeHandler>) {
        let mut state = self.shared.lock();
        if !state.closed {
            state.handler = Some(handler);
        }
    }

    /// Buffer one input event for the next tick. Valid in any state.
    pub fn push_event(&self, event: RawInputEvent) {
        self.shared.lock().events.push(event);
    }

    /// Start ticking.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::AlreadyPlaying`] if already playing,
    /// [`LifecycleError::Closed`] once closed.
    pub fn play(&self) -> Result<(), LifecycleError> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(LifecycleError::Closed);
        }
        if state.playing {
            return Err(LifecycleError::AlreadyPlaying);
        }
        state.playing = true;
        // A settling step or a pending timer resumes the cadence.
        if state.step_in_flight || state.timer.is_some() {
            debug!("resuming behind in-flight step");
            return Ok(());
        }
        state.last_tick = Instant::now();
        self.shared.schedule(&mut state, self.shared.interval);
        Ok(())
    }

    /// Stop ticking. An in-flight step still settles normally.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NotPlaying`] if not playing.
    pub fn pause(&self) -> Result<(), LifecycleError> {
        let mut state = self.shared.lock();
        if !state.playing {
            return Err(LifecycleError::NotPlaying);
        }
        state.playing = false;
        state.cancel_timer();
        Ok(())
    }

    /// Detach the handler and stop for good. Idempotent.
    ///
    /// An in-flight step is not cancelled; its result is discarded.
    pub fn close(&self) {
        self.shared.lock().close();
    }

    /// Sum of all step rewards applied so far.
    pub fn total_reward(&self) -> f64 {
        self.shared.lock().total_reward
    }

    /// Number of steps applied so far.
    pub fn steps(&self) -> u64 {
        self.shared.lock().steps
    }

    /// Whether ticks are currently being scheduled.
    pub fn is_playing(&self) -> bool {
        self.shared.lock().playing
    }

    /// Whether the episode was closed, explicitly or by a terminal result.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl Drop for Episode {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Episode")
            .field("interval", &self.shared.interval)
            .field("playing", &state.playing)
            .field("closed", &state.closed)
            .field("steps", &state.steps)
            .field("total_reward", &state.total_reward)
            .field("buffered_events", &state.events.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tick machinery
// ---------------------------------------------------------------------------

impl EpisodeShared {
    fn lock(&self) -> MutexGuard<'_, EpisodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the single timer. Spawned under the lock so the tick cannot
    /// observe state older than its own registration.
    fn schedule(self: &Arc<Self>, state: &mut EpisodeState, delay: Duration) {
        debug_assert!(state.timer.is_none() && !state.step_in_flight);
        state.next_timer_id += 1;
        let id = state.next_timer_id;
        let shared = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.tick(id).await;
        });
        state.timer = Some(PendingTick { id, handle });
    }

    async fn tick(self: Arc<Self>, id: u64) {
        let actions = {
            let mut state = self.lock();
            if state.timer.as_ref().map(|t| t.id) != Some(id) {
                return;
            }
            state.timer = None;
            if state.closed || !state.playing {
                return;
            }
            state.last_tick = Instant::now();
            state.step_in_flight = true;
            let events = std::mem::take(&mut state.events);
            let actions = actions_for_events(&events);
            state.filter.apply(actions)
        };
        debug!(actions = actions.len(), "tick");
        let result = self.client.step(actions).await;
        self.settle(result);
    }

    fn settle(self: &Arc<Self>, result: Result<StepReply, CallError>) {
        let (handler, outcome) = {
            let mut state = self.lock();
            state.step_in_flight = false;
            if state.closed {
                debug!(ok = result.is_ok(), "discarding step result of closed episode");
                return;
            }
            let handler = state.handler.clone();
            let outcome = match result {
                Ok(reply) => {
                    state.steps += 1;
                    state.total_reward += reply.reward;
                    let total = state.total_reward;
                    if reply.done {
                        debug!(steps = state.steps, total, "episode done");
                        state.close();
                    } else if state.playing {
                        let delay = next_delay(self.interval, state.last_tick.elapsed());
                        self.schedule(&mut state, delay);
                    }
                    Ok((reply, total))
                }
                Err(err) => {
                    warn!(error = %err, "step failed, closing episode");
                    state.close();
                    Err(err)
                }
            };
            (handler, outcome)
        };

        let Some(handler) = handler else {
            return;
        };
        match outcome {
            Ok((reply, total)) => {
                handler.on_observation(&reply.observation);
                handler.on_reward(reply.reward, total);
                if reply.done {
                    handler.on_done();
                }
            }
            Err(err) => handler.on_error(&err),
        }
    }
}

impl EpisodeState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }

    fn close(&mut self) {
        self.handler = None;
        self.cancel_timer();
        self.playing = false;
        self.closed = true;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use envplay_core::input::KeyKind;
    use envplay_test_utils::{FakeEnv, FakeEnvHandle, Recorder, connect_fake_env};

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Observation(String),
        Reward(f64, f64),
        Done,
        Error(CallError),
    }

    struct RecordingHandler(Recorder<Seen>);

    impl EpisodeHandler for RecordingHandler {
        fn on_observation(&self, observation: &Observation) {
            self.0.push(Seen::Observation(observation.as_str().to_owned()));
        }
        fn on_reward(&self, reward: f64, total: f64) {
            self.0.push(Seen::Reward(reward, total));
        }
        fn on_done(&self) {
            self.0.push(Seen::Done);
        }
        fn on_error(&self, error: &CallError) {
            self.0.push(Seen::Error(error.clone()));
        }
    }

    const fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn episode(script: FakeEnv) -> (Episode, FakeEnvHandle, Recorder<Seen>) {
        let (client, env) = connect_fake_env(script);
        let episode = Episode::new(client, &PlayConfig::default().with_interval_ms(100));
        let seen = Recorder::new();
        episode.set_handler(Arc::new(RecordingHandler(seen.clone())));
        (episode, env, seen)
    }

    fn rewards(seen: &Recorder<Seen>) -> usize {
        seen.events()
            .iter()
            .filter(|s| matches!(s, Seen::Reward(..)))
            .count()
    }

    fn assert_near(actual: Duration, expected: Duration) {
        let diff = actual.abs_diff(expected);
        assert!(diff <= ms(2), "expected ~{expected:?}, got {actual:?}");
    }

    // -- cadence --

    #[tokio::test(start_paused = true)]
    async fn fast_steps_keep_the_nominal_cadence() {
        let (episode, env, seen) = episode(FakeEnv::new().with_latency(ms(30)));
        let start = Instant::now();
        episode.play().unwrap();
        assert!(seen.wait_for(ms(1000), |s| s.len() >= 8).await);

        let steps = env.steps();
        assert_near(steps[0].at - start, ms(100));
        for gap in env.step_gaps() {
            assert_near(gap, ms(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_steps_fire_at_the_floor() {
        let (episode, env, seen) = episode(FakeEnv::new().with_latency(ms(150)));
        episode.play().unwrap();
        assert!(seen.wait_for(ms(2000), |s| s.len() >= 6).await);

        for gap in env.step_gaps() {
            assert_near(gap, ms(151));
        }
    }

    // -- lifecycle --

    #[tokio::test(start_paused = true)]
    async fn lifecycle_violations() {
        let (episode, _env, _seen) = episode(FakeEnv::new());
        assert_eq!(episode.pause(), Err(LifecycleError::NotPlaying));
        episode.play().unwrap();
        assert_eq!(episode.play(), Err(LifecycleError::AlreadyPlaying));
        assert!(episode.is_playing());
        episode.pause().unwrap();
        assert_eq!(episode.pause(), Err(LifecycleError::NotPlaying));

        episode.close();
        episode.close();
        assert!(episode.is_closed());
        assert_eq!(episode.play(), Err(LifecycleError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_play_during_a_step_does_not_double_schedule() {
        let (episode, env, _seen) = episode(FakeEnv::new().with_latency(ms(50)));
        let start = Instant::now();
        episode.play().unwrap();

        // First step is in flight from 100 ms to 150 ms.
        tokio::time::sleep(ms(120)).await;
        episode.pause().unwrap();
        tokio::time::sleep(ms(10)).await;
        episode.play().unwrap();

        tokio::time::sleep(ms(130)).await;
        let times: Vec<_> = env.steps().iter().map(|r| r.at - start).collect();
        assert_eq!(times.len(), 2, "{times:?}");
        assert_near(times[0], ms(100));
        assert_near(times[1], ms(200));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_lets_the_in_flight_step_settle() {
        let (episode, env, seen) = episode(FakeEnv::new().with_rewards([2.0]).with_latency(ms(50)));
        episode.play().unwrap();
        tokio::time::sleep(ms(120)).await;
        episode.pause().unwrap();

        tokio::time::sleep(ms(500)).await;
        assert_eq!(env.steps().len(), 1);
        assert_eq!(rewards(&seen), 1);
        assert_relative_eq!(episode.total_reward(), 2.0);
    }

    // -- rewards and termination --

    #[tokio::test(start_paused = true)]
    async fn total_reward_sums_step_rewards_until_done() {
        let script = FakeEnv::new()
            .with_rewards([1.0, 0.0, 3.0, -1.0])
            .with_done_at(4);
        let (episode, env, seen) = episode(script);
        episode.play().unwrap();
        assert!(seen.wait_for(ms(1000), |s| s.contains(&Seen::Done)).await);

        assert_relative_eq!(episode.total_reward(), 3.0);
        assert_eq!(episode.steps(), 4);
        assert!(episode.is_closed());
        assert!(!episode.is_playing());

        let events = seen.events();
        assert_eq!(
            &events[events.len() - 3..],
            &[
                Seen::Observation("step-4".into()),
                Seen::Reward(-1.0, 3.0),
                Seen::Done,
            ]
        );

        // No tick after termination.
        tokio::time::sleep(ms(500)).await;
        assert_eq!(env.steps().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn close_discards_a_late_result() {
        let (episode, env, seen) = episode(FakeEnv::new().with_rewards([5.0]).with_latency(ms(50)));
        episode.play().unwrap();
        tokio::time::sleep(ms(120)).await;
        episode.close();

        tokio::time::sleep(ms(500)).await;
        assert_eq!(env.steps().len(), 1);
        assert!(seen.is_empty());
        assert_relative_eq!(episode.total_reward(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_connection_reports_one_error_and_closes() {
        let (episode, env, seen) = episode(FakeEnv::new().with_close_at(1));
        episode.play().unwrap();
        assert!(seen.wait_for(ms(500), |s| !s.is_empty()).await);

        tokio::time::sleep(ms(500)).await;
        assert_eq!(seen.events(), vec![Seen::Error(CallError::TransportClosed)]);
        assert!(episode.is_closed());
        assert_eq!(env.steps().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_error_closes_the_episode() {
        let (episode, _env, seen) = episode(FakeEnv::new().with_error_at(2));
        episode.play().unwrap();
        assert!(seen.wait_for(ms(1000), |s| s.iter().any(|e| matches!(e, Seen::Error(_)))).await);

        assert!(episode.is_closed());
        assert_eq!(rewards(&seen), 1);
        assert!(matches!(
            seen.events().last(),
            Some(Seen::Error(CallError::Remote(_)))
        ));
    }

    // -- event buffer --

    #[tokio::test(start_paused = true)]
    async fn buffered_events_ride_on_the_next_tick_only() {
        let (episode, env, seen) = episode(FakeEnv::new());
        episode.push_event(RawInputEvent::key(KeyKind::Down, "a", "KeyA", 65));
        episode.push_event(RawInputEvent::key(KeyKind::Up, "a", "KeyA", 65));
        episode.play().unwrap();
        assert!(seen.wait_for(ms(1000), |_| step_count(&env) >= 2).await);

        let steps = env.steps();
        assert_eq!(steps[0].action_count(), 2);
        assert_eq!(steps[1].action_count(), 0);
        assert_eq!(steps[0].value["actions"][0]["keyEvent"]["type"], "keyDown");
    }

    fn step_count(env: &FakeEnvHandle) -> usize {
        env.steps().len()
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_ticking() {
        let (episode, env, _seen) = episode(FakeEnv::new());
        episode.play().unwrap();
        tokio::time::sleep(ms(150)).await;
        drop(episode);

        tokio::time::sleep(ms(1000)).await;
        assert_eq!(env.steps().len(), 1);
    }
}
