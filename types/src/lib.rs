//! Core domain types shared across the Crucible worker crates.
//!
//! These types define the message shapes at the host boundary and the
//! values exchanged between the build coordinator and its collaborators.
//! No IO, no async.

mod build;
mod envelope;
mod tool;

pub use build::{BuildRequest, BuildResult, FailingStage};
pub use envelope::{Envelope, Target};
pub use tool::{LAUNCH_FAILURE_CODE, ToolResult};
