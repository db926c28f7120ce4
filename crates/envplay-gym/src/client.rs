//! Async client handle for a remote environment.
//!
//! [`EnvClient::spawn`] moves a [`Transport`] into an actor task that owns
//! it exclusively and drives a [`CallSerializer`]. The returned handle is
//! cheap to clone; the session (reset calls) and the live episode (step
//! calls) share one client and therefore one single-flight queue.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use envplay_core::error::CallError;
use envplay_core::input::Action;

use crate::protocol::{Request, ResetReply, StepReply, decode_reply};
use crate::serializer::{CallSerializer, PendingCall};
use crate::transport::{MessageSink, Transport, TransportEvent};

// ---------------------------------------------------------------------------
// EnvClient
// ---------------------------------------------------------------------------

/// Handle to the call-serializer actor.
#[derive(Debug, Clone)]
pub struct EnvClient {
    calls: mpsc::UnboundedSender<PendingCall>,
}

impl EnvClient {
    /// Take ownership of `transport` and start serving calls over it.
    ///
    /// Must be called from within a Tokio runtime. The actor stops once
    /// every handle has been dropped.
    pub fn spawn(transport: Transport) -> Self {
        let (calls, requests) = mpsc::unbounded_channel();
        let (sink, events) = transport.into_parts();
        tokio::spawn(run_actor(CallSerializer::new(sink), requests, events));
        Self { calls }
    }

    /// Issue one call and wait for its reply.
    ///
    /// Calls settle in submission order. Error envelopes become
    /// [`CallError::Remote`]; unparseable replies become
    /// [`CallError::MalformedReply`].
    pub async fn call(&self, request: &Request) -> Result<Value, CallError> {
        let payload = request.encode()?;
        let (call, rx) = PendingCall::new(payload);
        debug!(request = request.type_name(), "submitting call");
        self.calls
            .send(call)
            .map_err(|_| CallError::TransportClosed)?;
        rx.await.unwrap_or(Err(CallError::TransportClosed))
    }

    /// Start a new episode.
    pub async fn reset(&self) -> Result<ResetReply, CallError> {
        decode_reply(self.call(&Request::Reset).await?)
    }

    /// Advance one frame with the given actions.
    pub async fn step(&self, actions: Vec<Action>) -> Result<StepReply, CallError> {
        decode_reply(self.call(&Request::Step { actions }).await?)
    }
}

/// Actor loop: transport events take priority over new submissions so a
/// reply or failure is applied before the next call is considered.
async fn run_actor<S: MessageSink>(
    mut serializer: CallSerializer<S>,
    mut requests: mpsc::UnboundedReceiver<PendingCall>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    let mut events_open = true;
    loop {
        tokio::select! {
            biased;
            event = events.recv(), if events_open => match event {
                Some(event) => serializer.on_event(event),
                None => {
                    events_open = false;
                    serializer.on_event(TransportEvent::Closed);
                }
            },
            call = requests.recv() => match call {
                Some(call) => serializer.submit(call),
                None => break,
            },
        }
    }
    debug!(dispatched = serializer.dispatched(), "call serializer stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
