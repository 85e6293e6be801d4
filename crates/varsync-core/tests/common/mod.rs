//! Shared test harness: a scriptable in-process kernel and a recording
//! component.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use varsync_core::VariableComponent;
use varsync_kernel::{ExecuteInput, ExecutionHandle, KernelClient};

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub session_id: String,
    pub code: String,
    pub label: String,
}

/// In-process kernel double. Responses are queued per code string and
/// consumed in FIFO order; every submission echoes an [`ExecuteInput`] with
/// the transport's `# <label>` comment convention, the way a live kernel
/// echoes every cell it runs.
pub struct MockKernel {
    responses: Mutex<HashMap<String, Vec<Vec<String>>>>,
    executions: Mutex<Vec<ExecutionRecord>>,
    inputs: Mutex<HashMap<String, broadcast::Sender<ExecuteInput>>>,
    execution_count: AtomicU64,
    refuse_submissions: AtomicBool,
}

impl MockKernel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            executions: Mutex::new(Vec::new()),
            inputs: Mutex::new(HashMap::new()),
            execution_count: AtomicU64::new(0),
            refuse_submissions: AtomicBool::new(false),
        })
    }

    /// Queue one response for `code`, delivered as the given output chunks.
    pub fn respond(&self, code: &str, chunks: &[&str]) {
        self.responses
            .lock()
            .unwrap()
            .entry(code.to_string())
            .or_default()
            .push(chunks.iter().map(|chunk| chunk.to_string()).collect());
    }

    /// Make every subsequent submission fail outright (no handle returned).
    pub fn refuse_submissions(&self) {
        self.refuse_submissions.store(true, Ordering::SeqCst);
    }

    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.executions.lock().unwrap().clone()
    }

    /// Echo an execution the engine did not issue, e.g. a user-run cell.
    pub fn simulate_execution(&self, session_id: &str, code: &str) {
        let count = self.execution_count.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.input_channel(session_id).send(ExecuteInput {
            execution_count: count,
            code: code.to_string(),
        });
    }

    fn input_channel(&self, session_id: &str) -> broadcast::Sender<ExecuteInput> {
        self.inputs
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

#[async_trait]
impl KernelClient for MockKernel {
    async fn run_code(
        &self,
        session_id: &str,
        code: &str,
        label: &str,
    ) -> Option<ExecutionHandle> {
        self.executions.lock().unwrap().push(ExecutionRecord {
            session_id: session_id.to_string(),
            code: code.to_string(),
            label: label.to_string(),
        });
        if self.refuse_submissions.load(Ordering::SeqCst) {
            return None;
        }

        let count = self.execution_count.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.input_channel(session_id).send(ExecuteInput {
            execution_count: count,
            code: format!("# {}\n{}", label, code),
        });

        let (handle, sink) = ExecutionHandle::pair();
        let response = self
            .responses
            .lock()
            .unwrap()
            .get_mut(code)
            .and_then(|queue| {
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0))
                }
            });
        if let Some(chunks) = response {
            for chunk in chunks {
                sink.emit(chunk);
            }
        }
        sink.finish();
        Some(handle)
    }

    fn execute_inputs(&self, session_id: &str) -> broadcast::Receiver<ExecuteInput> {
        self.input_channel(session_id).subscribe()
    }

    async fn queue_drained(&self, _session_id: &str) {}
}

/// Component double that records every view update it receives.
pub struct RecordingComponent {
    identifier: String,
    name: String,
    evaluate: String,
    updates: Mutex<Vec<Value>>,
}

impl RecordingComponent {
    pub fn new(identifier: &str, name: &str, evaluate: &str) -> Arc<Self> {
        Arc::new(Self {
            identifier: identifier.to_string(),
            name: name.to_string(),
            evaluate: evaluate.to_string(),
            updates: Mutex::new(Vec::new()),
        })
    }

    pub fn updates(&self) -> Vec<Value> {
        self.updates.lock().unwrap().clone()
    }
}

impl VariableComponent for RecordingComponent {
    fn variable_identifier(&self) -> &str {
        &self.identifier
    }

    fn variable_name(&self) -> &str {
        &self.name
    }

    fn evaluate_expression(&self) -> String {
        self.evaluate.clone()
    }

    fn update_view(&self, value: Value) {
        self.updates.lock().unwrap().push(value);
    }
}

/// Give spawned listener and idle-confirmation tasks time to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// Opt-in log output for debugging: `RUST_LOG=varsync_core=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
