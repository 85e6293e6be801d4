use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::events::ExecuteInput;
use crate::execution::ExecutionHandle;

/// Transport seam between the synchronization engine and a live kernel.
///
/// Implementors own process spawning, message framing, and the per-session
/// FIFO execution queue. The engine only submits code, watches input echoes,
/// and waits for the queue to drain.
#[async_trait]
pub trait KernelClient: Send + Sync {
    /// Submit `code` for execution on the session's FIFO queue.
    ///
    /// `label` names the execution for diagnostics; transports may prepend a
    /// single `# <label>` comment line to the code they actually execute.
    /// Returns `None` when submission failed outright — a recognized
    /// degenerate case, not an error.
    async fn run_code(&self, session_id: &str, code: &str, label: &str)
        -> Option<ExecutionHandle>;

    /// Subscribe to the session's execute-input echo stream.
    fn execute_inputs(&self, session_id: &str) -> broadcast::Receiver<ExecuteInput>;

    /// Resolves once the session's execution queue is empty.
    async fn queue_drained(&self, session_id: &str);
}
