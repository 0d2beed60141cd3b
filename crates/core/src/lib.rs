//! # murmur core
//!
//! Domain types, traits, and error definitions for the murmur social agent.
//! This crate performs no I/O of its own. It defines the connection
//! contract, the registry that dispatches through it, and the state the
//! agent loop carries between iterations.
//!
//! Concrete connections live in `murmur-connections`; the loop lives in
//! `murmur-agent`.

pub mod connection;
pub mod error;
pub mod event;
pub mod registry;
pub mod request;
pub mod settings;
pub mod state;

// Re-export key types at crate root for ergonomics
pub use connection::{Action, ActionArgs, ActionHandler, ActionParameter, ActionTable, Connection, ParamType};
pub use error::{ActionFailure, ConnectionError, MAX_RETRY_AFTER_SECS, Result};
pub use event::{DomainEvent, EventBus};
pub use registry::ConnectionRegistry;
pub use request::ActionRequest;
pub use settings::ConnectionSettings;
pub use state::AgentState;
