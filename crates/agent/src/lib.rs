//! The murmur agent loop.
//!
//! An [`Agent`] repeatedly:
//!
//! 1. **Replenishes** cached inputs (timeline, room info) that are empty
//! 2. **Selects** one task by weighted random draw, optionally adjusted
//!    for the time of day
//! 3. **Runs** the task's handler against the connection registry
//! 4. **Sleeps** `loop_delay` after success, `fallback_delay` otherwise
//!
//! Failures inside an iteration are logged and never end the loop; only a
//! shutdown request does.

pub mod error;
pub mod handlers;
pub mod prompt;
pub mod runtime;
pub mod selector;

#[cfg(test)]
mod test_helpers;

pub use error::AgentError;
pub use handlers::{TaskContext, TaskHandler, TaskOutcome};
pub use runtime::{Agent, Clock, IterationOutcome, IterationReport, LoopPhase};
pub use selector::{SelectionError, TaskSelector, TimeWeighting, WeightedTask};
