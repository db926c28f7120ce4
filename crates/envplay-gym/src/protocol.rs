//! Environment message protocol.
//!
//! Defines the JSON text messages exchanged with a remote environment.
//!
//! The protocol is a strict command-reply pattern with no request IDs:
//!
//! 1. Client sends a [`Request`] (`reset` or `step`)
//! 2. Remote answers with exactly one reply, either a success envelope
//!    ([`ResetReply`] / [`StepReply`]) or an error envelope
//!    (`{"type":"error","error":...}`)
//!
//! Replies are matched to requests purely by order, so at most one request
//! may be outstanding at a time (see [`crate::serializer`]).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use envplay_core::error::CallError;
use envplay_core::input::Action;
use envplay_core::types::Observation;

/// Maximum size of one framed message (16 MiB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// `type` value of an error envelope.
pub const ERROR_TYPE: &str = "error";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A request from the player to the remote environment.
///
/// # Example
///
/// ```
/// use envplay_gym::protocol::Request;
///
/// let json = serde_json::to_string(&Request::Reset).unwrap();
/// assert_eq!(json, r#"{"type":"reset"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Start a new episode.
    Reset,
    /// Advance the environment by one frame, applying the given actions.
    Step {
        #[serde(default)]
        actions: Vec<Action>,
    },
}

impl Request {
    /// Message type name (matches the serde tag).
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Step { .. } => "step",
        }
    }

    /// Serialise to the text sent over the transport.
    pub fn encode(&self) -> Result<String, CallError> {
        serde_json::to_string(self).map_err(|e| CallError::Encode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Successful reply to [`Request::Reset`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResetReply {
    pub observation: Observation,
}

/// Successful reply to [`Request::Step`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepReply {
    pub observation: Observation,
    #[serde(default)]
    pub reward: f64,
    #[serde(default)]
    pub done: bool,
}

/// Reply envelope as produced by a remote environment.
///
/// Clients never decode into this type (they inspect the raw envelope with
/// [`parse_reply`]); it exists for remotes and test fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Reset {
        observation: Observation,
    },
    Step {
        observation: Observation,
        reward: f64,
        done: bool,
    },
    Error {
        error: String,
    },
}

impl Reply {
    /// Create an error reply.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Serialise to wire text.
    pub fn to_text(&self) -> String {
        // Plain strings, floats and bools; serialisation cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Parse reply text into a JSON value, rejecting error envelopes.
///
/// Returns [`CallError::MalformedReply`] if the text is not JSON and
/// [`CallError::Remote`] if the remote tagged the reply as an error.
pub fn parse_reply(text: &str) -> Result<Value, CallError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| CallError::MalformedReply(e.to_string()))?;
    if value.get("type").and_then(Value::as_str) == Some(ERROR_TYPE) {
        let message = match value.get("error") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "unspecified remote error".to_owned(),
            Some(other) => other.to_string(),
        };
        return Err(CallError::Remote(message));
    }
    Ok(value)
}

/// Decode a parsed reply into a typed success envelope.
pub fn decode_reply<T: DeserializeOwned>(value: Value) -> Result<T, CallError> {
    serde_json::from_value(value).map_err(|e| CallError::MalformedReply(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use envplay_core::input::{KeyKind, RawInputEvent, actions_for_events};

    #[test]
    fn reset_request_wire_format() {
        assert_eq!(Request::Reset.encode().unwrap(), r#"{"type":"reset"}"#);
        assert_eq!(Request::Reset.type_name(), "reset");
    }

    #[test]
    fn step_request_carries_actions() {
        let actions = actions_for_events(&[RawInputEvent::key(KeyKind::Down, "x", "KeyX", 88)]);
        let text = Request::Step { actions }.encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "step");
        assert_eq!(value["actions"][0]["keyEvent"]["code"], "KeyX");
    }

    #[test]
    fn empty_step_request() {
        let text = Request::Step { actions: vec![] }.encode().unwrap();
        assert_eq!(text, r#"{"type":"step","actions":[]}"#);
        let back: Request = serde_json::from_str(r#"{"type":"step"}"#).unwrap();
        assert_eq!(back, Request::Step { actions: vec![] });
    }

    #[test]
    fn parse_step_reply() {
        let value =
            parse_reply(r#"{"type":"step","observation":"abc","reward":1.5,"done":true}"#).unwrap();
        let reply: StepReply = decode_reply(value).unwrap();
        assert_eq!(reply.observation.as_str(), "abc");
        assert!((reply.reward - 1.5).abs() < f64::EPSILON);
        assert!(reply.done);
    }

    #[test]
    fn reset_reply_tolerates_extra_fields() {
        let value =
            parse_reply(r#"{"type":"reset","observation":"abc","reward":0,"done":false}"#).unwrap();
        let reply: ResetReply = decode_reply(value).unwrap();
        assert_eq!(reply.observation.as_str(), "abc");
    }

    #[test]
    fn step_reply_defaults() {
        let value = parse_reply(r#"{"type":"step","observation":"o"}"#).unwrap();
        let reply: StepReply = decode_reply(value).unwrap();
        assert!(reply.reward.abs() < f64::EPSILON);
        assert!(!reply.done);
    }

    #[test]
    fn error_envelope_is_remote_error() {
        let err = parse_reply(r#"{"type":"error","error":"step: cannot step without a reset"}"#)
            .unwrap_err();
        assert_eq!(
            err,
            CallError::Remote("step: cannot step without a reset".into())
        );
    }

    #[test]
    fn structured_error_is_rendered_as_json() {
        let err = parse_reply(r#"{"type":"error","error":{"code":7}}"#).unwrap_err();
        assert_eq!(err, CallError::Remote(r#"{"code":7}"#.into()));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = parse_reply("not json at all").unwrap_err();
        assert!(matches!(err, CallError::MalformedReply(_)));
    }

    #[test]
    fn missing_observation_is_malformed() {
        let value = parse_reply(r#"{"type":"step","reward":1}"#).unwrap();
        let err = decode_reply::<StepReply>(value).unwrap_err();
        assert!(matches!(err, CallError::MalformedReply(_)));
    }

    #[test]
    fn reply_constructors_produce_parseable_text() {
        let text = Reply::Step {
            observation: Observation::new("o"),
            reward: 2.0,
            done: false,
        }
        .to_text();
        let reply: StepReply = decode_reply(parse_reply(&text).unwrap()).unwrap();
        assert!((reply.reward - 2.0).abs() < f64::EPSILON);

        let err = parse_reply(&Reply::error("boom").to_text()).unwrap_err();
        assert_eq!(err, CallError::Remote("boom".into()));
    }
}
