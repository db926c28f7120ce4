//! Message-oriented duplex transport handle.
//!
//! A [`Transport`] is the client's end of an ordered, full-duplex channel
//! that carries discrete text messages. Outbound text goes through a
//! [`MessageSink`]; inbound traffic arrives as [`TransportEvent`]s. Any
//! concrete channel (TCP via [`crate::tcp`], a WebSocket bridge, the
//! in-memory [`Transport::pair`]) is adapted into this shape.

use tokio::sync::mpsc;

use envplay_core::error::TransportError;

use crate::protocol::MAX_MESSAGE_SIZE;

// ---------------------------------------------------------------------------
// TransportEvent
// ---------------------------------------------------------------------------

/// Something the channel reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text message.
    Message(String),
    /// The channel failed.
    Error(String),
    /// The channel closed.
    Closed,
}

// ---------------------------------------------------------------------------
// MessageSink
// ---------------------------------------------------------------------------

/// Outbound half of a transport.
pub trait MessageSink: Send {
    /// Hand one text message to the channel for delivery.
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

impl MessageSink for Vec<String> {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.push(text);
        Ok(())
    }
}

/// [`MessageSink`] backed by an unbounded channel.
///
/// Messages over [`MAX_MESSAGE_SIZE`] are refused here, so the failure stays
/// with the one send instead of reaching the writer.
#[derive(Debug, Clone)]
pub struct OutboundSink {
    tx: mpsc::UnboundedSender<String>,
}

impl OutboundSink {
    pub const fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl MessageSink for OutboundSink {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: text.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Client end of a duplex text channel.
#[derive(Debug)]
pub struct Transport {
    outbound: OutboundSink,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Transport {
    /// Wrap an outbound sender and an inbound event receiver.
    pub const fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self {
            outbound: OutboundSink::new(outbound),
            inbound,
        }
    }

    /// Create an in-memory transport and the [`RemoteEnd`] that serves it.
    ///
    /// # Example
    ///
    /// ```
    /// use envplay_gym::transport::{MessageSink, Transport};
    ///
    /// let (transport, remote) = Transport::pair();
    /// let (mut sink, _events) = transport.into_parts();
    /// sink.send_text("hello".into()).unwrap();
    /// remote.close();
    /// ```
    pub fn pair() -> (Self, RemoteEnd) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self::new(out_tx, in_rx),
            RemoteEnd {
                requests: out_rx,
                events: in_tx,
            },
        )
    }

    /// Split into the outbound sink and the inbound event stream.
    pub fn into_parts(self) -> (OutboundSink, mpsc::UnboundedReceiver<TransportEvent>) {
        (self.outbound, self.inbound)
    }
}

// ---------------------------------------------------------------------------
// RemoteEnd
// ---------------------------------------------------------------------------

/// Far end of an in-memory [`Transport`].
///
/// Used to bridge a [`Transport`] onto another channel, or to script a
/// remote environment in tests.
#[derive(Debug)]
pub struct RemoteEnd {
    requests: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl RemoteEnd {
    /// Wait for the next message the client sent. `None` once the client
    /// side has been dropped.
    pub async fn recv(&mut self) -> Option<String> {
        self.requests.recv().await
    }

    /// Next message the client sent, if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.requests.try_recv().ok()
    }

    /// Deliver one text message to the client.
    pub fn reply(&self, text: impl Into<String>) {
        // A dropped client simply stops listening.
        let _ = self.events.send(TransportEvent::Message(text.into()));
    }

    /// Report a channel failure to the client.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Error(reason.into()));
    }

    /// Report channel closure to the client.
    pub fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
