//! Sub-agent orchestration subsystem.
//!
//! Provides the single-flight [`runner::Runner`] that supervises sub-agent
//! processes, the [`types`] shared with the spawn tool and the agent loop,
//! and [`summary`] for turning a finished run into an owner notification.

pub mod runner;
pub mod summary;
pub mod types;

pub use runner::Runner;
pub use types::{LaunchRequest, SubAgentResult, TaskId, RESULT_FILE};
