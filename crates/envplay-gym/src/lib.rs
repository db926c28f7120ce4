//! Wire protocol, transport, and call serialization for envplay.
//!
//! This crate provides the communication layer between the player and a
//! remote turn-based environment:
//!
//! - [`protocol`] - JSON request/reply types and the error envelope
//! - [`transport`] - [`Transport`] handle over any duplex text channel
//! - [`serializer`] - [`CallSerializer`] enforcing one outstanding call at a time
//! - [`client`] - [`EnvClient`], the async handle driving the serializer
//! - [`framing`] - Length-prefixed wire format (4-byte LE `u32` + payload)
//! - [`tcp`] - TCP adapter built on [`framing`]
//!
//! The remote matches replies to requests purely by order, so every call
//! made through an [`EnvClient`] is queued and dispatched one at a time.

pub mod client;
pub mod framing;
pub mod protocol;
pub mod serializer;
pub mod tcp;
pub mod transport;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use client::EnvClient;
pub use protocol::{Reply, Request, ResetReply, StepReply};
pub use serializer::{CallSerializer, PendingCall};
pub use transport::{MessageSink, RemoteEnd, Transport, TransportEvent};

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        CallSerializer, EnvClient, PendingCall, RemoteEnd, Transport, TransportEvent,
        protocol::{Reply, Request, ResetReply, StepReply},
        transport::MessageSink,
    };
}
