// envplay-core: errors, configuration, observations and input normalization for envplay.

pub mod config;
pub mod error;
pub mod filter;
pub mod input;
pub mod types;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        config::PlayConfig,
        error::{
            CallError, ConfigError, EnvplayError, LifecycleError, SessionError, TransportError,
        },
        filter::{EventFilter, EventFilterKind},
        input::{Action, KeyKind, PointerKind, RawInputEvent, actions_for_events},
        types::Observation,
    };
}
