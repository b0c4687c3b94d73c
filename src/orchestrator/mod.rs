//! Application-level orchestration of the local node.
//!
//! This module owns the node lifecycle (start/stop/reap) behind a single
//! controller task. CLI layers send commands and read notifications so that
//! no two callers ever mutate the supervisor concurrently.

mod controller;
mod supervisor;

pub(crate) use controller::{run_controller, NodeCommand};
pub(crate) use supervisor::{StartOutcome, Supervisor};
