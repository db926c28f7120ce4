//! Single-flight call serialization.
//!
//! [`CallSerializer`] turns an unordered stream of logical calls into a
//! strictly ordered request/reply exchange over one transport:
//!
//! - at most one request is on the wire at any time (the in-flight call)
//! - later calls wait in a FIFO queue and are dispatched in submission order
//!   as soon as the in-flight call settles, successfully or not
//! - a transport error or close is recorded once as a sticky connection
//!   error; the in-flight call, every queued call and every later call are
//!   rejected with it without touching the transport again
//!
//! The serializer is a plain state object driven by [`submit`] and
//! [`on_event`]; [`crate::client::EnvClient`] runs it inside an actor task.
//!
//! [`submit`]: CallSerializer::submit
//! [`on_event`]: CallSerializer::on_event

use std::collections::VecDeque;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use envplay_core::error::CallError;

use crate::protocol::parse_reply;
use crate::transport::{MessageSink, TransportEvent};

/// Settled result of one call.
pub type CallResult = Result<Value, CallError>;

// ---------------------------------------------------------------------------
// PendingCall
// ---------------------------------------------------------------------------

/// A queued unit of work: the encoded request plus its settlement channel.
#[derive(Debug)]
pub struct PendingCall {
    payload: String,
    reply: oneshot::Sender<CallResult>,
}

impl PendingCall {
    /// Create a call and the receiver its result will be delivered on.
    pub fn new(payload: impl Into<String>) -> (Self, oneshot::Receiver<CallResult>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                payload: payload.into(),
                reply,
            },
            rx,
        )
    }

    fn settle(self, result: CallResult) {
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.reply.send(result);
    }
}

/// The one request currently awaiting a reply.
#[derive(Debug)]
struct InFlightCall {
    seq: u64,
    reply: oneshot::Sender<CallResult>,
}

// ---------------------------------------------------------------------------
// CallSerializer
// ---------------------------------------------------------------------------

/// Single-flight FIFO call serializer over a [`MessageSink`].
#[derive(Debug)]
pub struct CallSerializer<S> {
    sink: S,
    queue: VecDeque<PendingCall>,
    in_flight: Option<InFlightCall>,
    connection_error: Option<CallError>,
    dispatched: u64,
}

impl<S: MessageSink> CallSerializer<S> {
    /// Create an idle serializer that sends through `sink`.
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            queue: VecDeque::new(),
            in_flight: None,
            connection_error: None,
            dispatched: 0,
        }
    }

    /// Accept a call: reject it if the connection is poisoned, dispatch it
    /// if nothing is in flight, otherwise queue it.
    pub fn submit(&mut self, call: PendingCall) {
        if let Some(err) = &self.connection_error {
            debug!(error = %err, "rejecting call on failed connection");
            call.settle(Err(err.clone()));
            return;
        }
        if self.in_flight.is_some() {
            self.queue.push_back(call);
            debug!(queued = self.queue.len(), "call queued behind in-flight request");
            return;
        }
        self.dispatch(call);
        self.drain();
    }

    /// Apply one transport event.
    pub fn on_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(text) => {
                let Some(call) = self.in_flight.take() else {
                    warn!(len = text.len(), "dropping reply with no call in flight");
                    return;
                };
                let result = parse_reply(&text);
                debug!(seq = call.seq, ok = result.is_ok(), "call settled");
                // Caller went away; the reply is still consumed.
                let _ = call.reply.send(result);
                self.drain();
            }
            TransportEvent::Error(reason) => {
                self.fail_connection(CallError::TransportFailure(reason));
            }
            TransportEvent::Closed => self.fail_connection(CallError::TransportClosed),
        }
    }

    /// Whether no call is in flight.
    pub const fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    /// Number of calls waiting behind the in-flight call.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Sticky connection error, once recorded.
    pub const fn connection_error(&self) -> Option<&CallError> {
        self.connection_error.as_ref()
    }

    /// Number of requests handed to the transport so far.
    pub const fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// The sink this serializer sends through.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Send `call` and make it the in-flight call. A failed send rejects
    /// only this call.
    fn dispatch(&mut self, call: PendingCall) {
        debug_assert!(self.in_flight.is_none());
        let PendingCall { payload, reply } = call;
        match self.sink.send_text(payload) {
            Ok(()) => {
                self.dispatched += 1;
                debug!(seq = self.dispatched, "request dispatched");
                self.in_flight = Some(InFlightCall {
                    seq: self.dispatched,
                    reply,
                });
            }
            Err(e) => {
                warn!(error = %e, "send failed");
                let _ = reply.send(Err(CallError::SendFailed(e.to_string())));
            }
        }
    }

    /// Dispatch queued calls until one is in flight or the queue is empty.
    fn drain(&mut self) {
        while self.in_flight.is_none() {
            let Some(next) = self.queue.pop_front() else {
                break;
            };
            if let Some(err) = &self.connection_error {
                next.settle(Err(err.clone()));
            } else {
                self.dispatch(next);
            }
        }
    }

    /// Record a connection-level failure and reject everything outstanding.
    fn fail_connection(&mut self, err: CallError) {
        let sticky = self.connection_error.get_or_insert_with(|| err.clone()).clone();
        if let Some(call) = self.in_flight.take() {
            warn!(seq = call.seq, error = %err, "in-flight call failed");
            let _ = call.reply.send(Err(err));
        }
        for call in self.queue.drain(..) {
            call.settle(Err(sticky.clone()));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
