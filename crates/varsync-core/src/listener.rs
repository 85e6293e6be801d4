//! Change listener: watches a session's execute-input echoes and triggers a
//! fetch after every execution that is not itself a synchronization fetch.

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::engine::SyncEngine;

/// Fetch label used for listener-triggered cycles.
pub(crate) const FETCH_ALL_LABEL: &str = "fetch-all-variables";

/// Strip at most one leading `#` comment line.
///
/// Transports label executions by prepending a comment line, so the echoed
/// code for the engine's own fetch arrives as `# <label>\n<fetch code>`.
/// A lone comment with no trailing newline is left untouched.
pub fn strip_leading_comment(code: &str) -> &str {
    if !code.starts_with('#') {
        return code;
    }
    match code.split_once('\n') {
        Some((_, rest)) => rest,
        None => code,
    }
}

/// Spawn the listener task for one session. The task ends when the kernel
/// closes the echo stream, or when aborted on reset.
pub(crate) fn spawn(engine: SyncEngine, session_id: String) -> JoinHandle<()> {
    let mut events = engine.kernel().execute_inputs(&session_id);
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(input) => {
                    engine.record_execution(&session_id, &input);
                    if strip_leading_comment(&input.code) != engine.fetch_code() {
                        engine.fetch_all(&session_id, FETCH_ALL_LABEL).await;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(
                        session_id = %session_id,
                        missed,
                        "change listener lagged behind the execute-input stream"
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
