use serde::{Deserialize, Serialize};

/// Input-echo event for one execution in a session.
///
/// Kernels emit one of these for every execution that runs in the session,
/// including executions the synchronization engine did not issue itself.
/// The `code` field carries the text the kernel actually executed, which may
/// include a single leading `#` comment line added by the transport's
/// labelling convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteInput {
    /// Monotonic per-session execution counter.
    pub execution_count: u64,
    /// The executed code, as echoed by the kernel.
    pub code: String,
}
