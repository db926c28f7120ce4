//! Scripted remote environment for tests.
//!
//! [`spawn_fake_env`] serves the far end of an in-memory [`Transport`],
//! answering `reset` and `step` requests according to a [`FakeEnv`] script
//! and logging every request it receives with its arrival time.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use envplay_core::types::Observation;
use envplay_gym::client::EnvClient;
use envplay_gym::protocol::Reply;
use envplay_gym::transport::{RemoteEnd, Transport};

// ---------------------------------------------------------------------------
// FakeEnv
// ---------------------------------------------------------------------------

/// Script for a fake remote environment.
///
/// Step numbers are 1-based and restart at every reset. Reset replies carry
/// the observation `reset-<n>`, step replies `step-<n>`.
#[derive(Debug, Clone, Default)]
pub struct FakeEnv {
    /// Reward returned by step `i + 1`; steps past the end yield `0.0`.
    pub rewards: Vec<f64>,
    /// Step that reports `done`.
    pub done_at: Option<usize>,
    /// Delay before each reply.
    pub latency: Duration,
    /// Step answered with an error envelope.
    pub error_at: Option<usize>,
    /// Step answered with text that is not JSON.
    pub malformed_at: Option<usize>,
    /// Step at which the channel closes instead of replying.
    pub close_at: Option<usize>,
}

impl FakeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rewards(mut self, rewards: impl Into<Vec<f64>>) -> Self {
        self.rewards = rewards.into();
        self
    }

    #[must_use]
    pub const fn with_done_at(mut self, step: usize) -> Self {
        self.done_at = Some(step);
        self
    }

    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub const fn with_error_at(mut self, step: usize) -> Self {
        self.error_at = Some(step);
        self
    }

    #[must_use]
    pub const fn with_malformed_at(mut self, step: usize) -> Self {
        self.malformed_at = Some(step);
        self
    }

    #[must_use]
    pub const fn with_close_at(mut self, step: usize) -> Self {
        self.close_at = Some(step);
        self
    }

    fn reward(&self, step: usize) -> f64 {
        self.rewards.get(step - 1).copied().unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Request log
// ---------------------------------------------------------------------------

/// One request as seen by the fake remote.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Arrival time.
    pub at: Instant,
    /// The `type` field.
    pub kind: String,
    /// The full decoded request.
    pub value: Value,
}

impl RecordedRequest {
    /// Number of actions carried by a step request.
    pub fn action_count(&self) -> usize {
        self.value
            .get("actions")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }
}

/// Handle to a running fake environment.
#[derive(Debug)]
pub struct FakeEnvHandle {
    log: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeEnvHandle {
    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Only the step requests.
    pub fn steps(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.kind == "step")
            .collect()
    }

    /// Arrival times of consecutive step requests, as gaps.
    pub fn step_gaps(&self) -> Vec<Duration> {
        let steps = self.steps();
        steps.windows(2).map(|w| w[1].at - w[0].at).collect()
    }
}

/// Serve `remote` according to `script`.
pub fn spawn_fake_env(mut remote: RemoteEnd, script: FakeEnv) -> FakeEnvHandle {
    let log = Arc::new(Mutex::new(Vec::new()));
    let task_log = Arc::clone(&log);
    tokio::spawn(async move {
        let mut resets = 0usize;
        let mut step = 0usize;
        while let Some(text) = remote.recv().await {
            let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            let kind = value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            task_log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(RecordedRequest {
                    at: Instant::now(),
                    kind: kind.clone(),
                    value,
                });

            if !script.latency.is_zero() {
                tokio::time::sleep(script.latency).await;
            }

            match kind.as_str() {
                "reset" => {
                    resets += 1;
                    step = 0;
                    remote.reply(
                        Reply::Reset {
                            observation: Observation::new(format!("reset-{resets}")),
                        }
                        .to_text(),
                    );
                }
                "step" => {
                    step += 1;
                    if script.close_at == Some(step) {
                        remote.close();
                        break;
                    }
                    if script.error_at == Some(step) {
                        remote.reply(Reply::error(format!("step {step} failed")).to_text());
                    } else if script.malformed_at == Some(step) {
                        remote.reply("<<not json>>");
                    } else {
                        remote.reply(
                            Reply::Step {
                                observation: Observation::new(format!("step-{step}")),
                                reward: script.reward(step),
                                done: script.done_at == Some(step),
                            }
                            .to_text(),
                        );
                    }
                }
                other => remote.reply(Reply::error(format!("unknown request {other:?}")).to_text()),
            }
        }
    });
    FakeEnvHandle { log }
}

/// Build a client wired to a fresh fake environment.
pub fn connect_fake_env(script: FakeEnv) -> (EnvClient, FakeEnvHandle) {
    let (transport, remote) = Transport::pair();
    let handle = spawn_fake_env(remote, script);
    (EnvClient::spawn(transport), handle)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
