//! Per-session synchronization state.
//!
//! Storage only; the engine owns all logic. Each session's state is created
//! lazily on first use and cleared (not removed) on reset.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::component::VariableComponent;
use crate::status::SyncStatus;

/// One identifier's entry in a variable snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableEntry {
    /// Whether the interpreter reported the owner name as defined.
    pub defined: bool,
    /// The evaluated value. `Null` when undefined.
    pub value: Value,
}

/// Snapshot of all registered identifiers' values, keyed by identifier.
pub type VariableStore = HashMap<String, VariableEntry>;

/// Buffered capacity of the per-session "changed" stream and the aggregated
/// status stream. Slow subscribers lag rather than block the engine.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// All synchronization state for one session.
pub(crate) struct SessionState {
    /// Registered components, keyed by identifier.
    pub(crate) components: HashMap<String, Arc<dyn VariableComponent>>,
    /// identifier -> owner name. Last registration for an identifier wins.
    pub(crate) identifier_map: BTreeMap<String, String>,
    /// owner name -> evaluation expression. First registration wins. Ordered
    /// so the serialized handler payload is deterministic.
    pub(crate) evaluate_map: BTreeMap<String, String>,
    /// Most recent raw result object from the interpreter-side handler,
    /// keyed by owner name.
    pub(crate) kernel_variables: Value,
    /// Reactive current snapshot.
    pub(crate) variables: watch::Sender<VariableStore>,
    /// Diff baseline. `None` until the first fetch completes; structurally
    /// independent of the reactive snapshot.
    pub(crate) baseline: Option<VariableStore>,
    /// Fires with the whole new snapshot whenever a diff detects any change.
    pub(crate) changed: broadcast::Sender<VariableStore>,
    pub(crate) status: watch::Sender<SyncStatus>,
    /// Counter of the most recently echoed execution.
    pub(crate) execution_count: watch::Sender<Option<u64>>,
    /// Code of the most recently echoed execution.
    pub(crate) last_code: watch::Sender<Option<String>>,
    /// Change-listener task, attached after handler initialization.
    pub(crate) listener: Option<JoinHandle<()>>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        let (variables, _) = watch::channel(VariableStore::new());
        let (changed, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status, _) = watch::channel(SyncStatus::Initial);
        let (execution_count, _) = watch::channel(None);
        let (last_code, _) = watch::channel(None);
        Self {
            components: HashMap::new(),
            identifier_map: BTreeMap::new(),
            evaluate_map: BTreeMap::new(),
            kernel_variables: Value::Null,
            variables,
            baseline: None,
            changed,
            status,
            execution_count,
            last_code,
            listener: None,
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
