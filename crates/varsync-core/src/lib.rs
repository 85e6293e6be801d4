//! Bidirectional variable synchronization between a live interpreter kernel
//! and a set of UI components.
//!
//! The engine keeps, per session, a map from UI-facing variable identifiers
//! to interpreter-side expressions, batch-fetches all current values through
//! an interpreter-side handler, diffs each new snapshot against the previous
//! one to notify only the components whose values changed, and serializes
//! UI-originated edits back into interpreter code with an optimistic
//! baseline update. Sessions are fully isolated; the kernel transport is
//! consumed through the `varsync-kernel` trait seam.

pub mod assembler;
pub mod component;
pub mod config;
pub mod engine;
pub mod error;
pub mod listener;
pub mod status;
pub mod store;

pub use assembler::JsonAssembler;
pub use component::VariableComponent;
pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use listener::strip_leading_comment;
pub use status::{StatusEvent, SyncStatus};
pub use store::{VariableEntry, VariableStore};
