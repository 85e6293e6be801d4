//! Kernel transport interface for the varsync engine.
//!
//! The synchronization engine treats the interpreter kernel as an opaque
//! "run code, observe output" capability. This crate defines that seam:
//! the [`KernelClient`] trait a transport must implement, the
//! [`ExecutionHandle`] returned for each submitted execution, and the
//! [`ExecuteInput`] echo event emitted for every execution that runs in a
//! session, whoever issued it.

pub mod client;
pub mod events;
pub mod execution;

pub use client::KernelClient;
pub use events::ExecuteInput;
pub use execution::{ExecutionHandle, ExecutionSink};
