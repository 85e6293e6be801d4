//! The synchronization engine: expression registry, fetch-and-diff cycle,
//! push path, and session lifecycle.
//!
//! All mutation happens between suspension points under one lock that is
//! never held across an `await`; ordering across separately issued
//! executions is the kernel queue's responsibility.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use varsync_kernel::{ExecuteInput, KernelClient};

use crate::assembler::JsonAssembler;
use crate::component::VariableComponent;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::listener;
use crate::status::{StatusEvent, SyncStatus};
use crate::store::{SessionState, VariableEntry, VariableStore, EVENT_CHANNEL_CAPACITY};

const INITIALISE_HANDLER_LABEL: &str = "initialise-variable-handler";
const INITIAL_FETCH_LABEL: &str = "initial-fetch-all-variables";

/// Bidirectional variable synchronization between one kernel client and any
/// number of isolated sessions. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    kernel: Arc<dyn KernelClient>,
    config: SyncConfig,
    sessions: Mutex<HashMap<String, SessionState>>,
    status_events: broadcast::Sender<StatusEvent>,
    fetch_code: String,
}

impl SyncEngine {
    pub fn new(kernel: Arc<dyn KernelClient>) -> Self {
        Self::with_config(kernel, SyncConfig::default())
    }

    pub fn with_config(kernel: Arc<dyn KernelClient>, config: SyncConfig) -> Self {
        let (status_events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let fetch_code = format!("exec({}.fetch_code)", config.handler_name);
        Self {
            inner: Arc::new(EngineInner {
                kernel,
                config,
                sessions: Mutex::new(HashMap::new()),
                status_events,
                fetch_code,
            }),
        }
    }

    /// The exact code string a fetch cycle executes. Echoed executions that
    /// match it (after label stripping) never trigger another fetch.
    pub fn fetch_code(&self) -> &str {
        &self.inner.fetch_code
    }

    pub(crate) fn kernel(&self) -> &Arc<dyn KernelClient> {
        &self.inner.kernel
    }

    /// Create the session's synchronization state if it does not exist yet.
    /// Idempotent; every public operation calls this on entry.
    pub fn ensure_session(&self, session_id: &str) {
        let mut sessions = self.inner.sessions.lock().unwrap();
        sessions.entry(session_id.to_string()).or_insert_with(|| {
            info!(session_id, "created synchronization state");
            SessionState::new()
        });
    }

    /// Record a component under its identifier and fold its declarations
    /// into the session maps: identifier -> name overwrites on conflict,
    /// name -> expression keeps the first registration.
    pub fn register_component(&self, session_id: &str, component: Arc<dyn VariableComponent>) {
        self.ensure_session(session_id);
        let identifier = component.variable_identifier().to_string();
        let name = component.variable_name().to_string();
        let evaluate = component.evaluate_expression();

        let mut sessions = self.inner.sessions.lock().unwrap();
        if let Some(state) = sessions.get_mut(session_id) {
            state.components.insert(identifier.clone(), component);
            state.identifier_map.insert(identifier, name.clone());
            state.evaluate_map.entry(name).or_insert(evaluate);
        }
    }

    /// Initialize the interpreter-side handler with the serialized evaluate
    /// map, run one labeled initial fetch, then attach the change listener.
    ///
    /// Resolves once the initial snapshot is published. A missing execution
    /// handle downgrades the whole call to a logged no-op.
    pub async fn initialize_handler(&self, session_id: &str) -> Result<()> {
        self.ensure_session(session_id);
        self.set_status(session_id, SyncStatus::Initialising);

        let payload = {
            let sessions = self.inner.sessions.lock().unwrap();
            let state = sessions
                .get(session_id)
                .ok_or_else(|| SyncError::UnknownSession(session_id.to_string()))?;
            serde_json::to_string(&state.evaluate_map)?
        };
        let code = format!(
            r#"{name} = {class}("""{payload}""", "{name}")"#,
            name = self.inner.config.handler_name,
            class = self.inner.config.handler_class,
        );

        match self
            .inner
            .kernel
            .run_code(session_id, &code, INITIALISE_HANDLER_LABEL)
            .await
        {
            Some(handle) => {
                let _ = handle.done.await;
                // Labeled distinctly from listener-triggered fetches: this
                // one must always run so the session can be declared ready.
                self.fetch_all(session_id, INITIAL_FETCH_LABEL).await;
                self.start_listening(session_id);
                Ok(())
            }
            None => {
                warn!(
                    session_id,
                    "no execution handle returned from handler initialisation"
                );
                Ok(())
            }
        }
    }

    /// Run one batch fetch: execute the fetch code, assemble streamed output
    /// until it parses as one JSON document, install the result, and diff.
    ///
    /// Resolves when the execution signals done, whether or not a parseable
    /// document ever arrived — a cycle without one leaves the snapshot
    /// untouched, which is a silent no-op rather than a failure.
    pub async fn fetch_all(&self, session_id: &str, label: &str) {
        self.ensure_session(session_id);
        self.set_status(session_id, SyncStatus::Fetching);

        let Some(mut handle) = self
            .inner
            .kernel
            .run_code(session_id, &self.inner.fetch_code, label)
            .await
        else {
            warn!(session_id, label, "no execution handle returned for fetch");
            return;
        };

        let mut assembler = JsonAssembler::new(self.inner.config.max_result_bytes);
        while let Some(chunk) = handle.output.recv().await {
            if let Some(document) = assembler.push(&chunk) {
                self.install_result(session_id, document);
                self.check_for_changes(session_id);
            }
        }
        let _ = handle.done.await;
    }

    /// Serialize a UI-originated assignment into interpreter code and run
    /// it. The baseline snapshot is updated optimistically before execution
    /// so the follow-up fetch treats the pushed value as already known
    /// unless the interpreter computed something different.
    ///
    /// Resolves when the execution finishes, or immediately when no handle
    /// was produced.
    pub async fn push(
        &self,
        session_id: &str,
        identifier: &str,
        name: &str,
        value_reference: &str,
    ) {
        self.ensure_session(session_id);
        let code = format!("{} = {}", name, value_reference);

        {
            let mut sessions = self.inner.sessions.lock().unwrap();
            if let Some(state) = sessions.get_mut(session_id) {
                let baseline = state.baseline.get_or_insert_with(VariableStore::new);
                baseline.insert(
                    identifier.to_string(),
                    VariableEntry {
                        defined: true,
                        value: Value::String(value_reference.to_string()),
                    },
                );
            }
        }

        let label = format!("push:{}", identifier);
        match self.inner.kernel.run_code(session_id, &code, &label).await {
            Some(handle) => {
                let _ = handle.done.await;
            }
            None => {
                debug!(session_id, identifier, "no execution handle returned for push");
            }
        }
    }

    /// Clear the session's synchronization state: empty snapshot and
    /// baseline, all maps dropped, listener detached. The session entry
    /// itself persists until the host removes the session.
    pub fn reset(&self, session_id: &str) -> Result<()> {
        {
            let mut sessions = self.inner.sessions.lock().unwrap();
            let state = sessions
                .get_mut(session_id)
                .ok_or_else(|| SyncError::UnknownSession(session_id.to_string()))?;
            state.status.send_replace(SyncStatus::Reset);
            state.variables.send_replace(VariableStore::new());
            state.baseline = Some(VariableStore::new());
            state.components.clear();
            state.identifier_map.clear();
            state.evaluate_map.clear();
            state.kernel_variables = Value::Null;
            if let Some(listener) = state.listener.take() {
                listener.abort();
            }
        }
        let _ = self.inner.status_events.send(StatusEvent {
            session_id: session_id.to_string(),
            status: SyncStatus::Reset,
        });
        info!(session_id, "synchronization state reset");
        Ok(())
    }

    /// Subscribe to the session's reactive snapshot.
    pub fn variables(&self, session_id: &str) -> watch::Receiver<VariableStore> {
        self.ensure_session(session_id);
        let sessions = self.inner.sessions.lock().unwrap();
        sessions[session_id].variables.subscribe()
    }

    /// Subscribe to whole-snapshot change events for the session.
    pub fn changed(&self, session_id: &str) -> broadcast::Receiver<VariableStore> {
        self.ensure_session(session_id);
        let sessions = self.inner.sessions.lock().unwrap();
        sessions[session_id].changed.subscribe()
    }

    /// Subscribe to the session's status slot.
    pub fn status(&self, session_id: &str) -> watch::Receiver<SyncStatus> {
        self.ensure_session(session_id);
        let sessions = self.inner.sessions.lock().unwrap();
        sessions[session_id].status.subscribe()
    }

    /// Subscribe to the counter of the most recently echoed execution.
    pub fn execution_count(&self, session_id: &str) -> watch::Receiver<Option<u64>> {
        self.ensure_session(session_id);
        let sessions = self.inner.sessions.lock().unwrap();
        sessions[session_id].execution_count.subscribe()
    }

    /// Subscribe to the code of the most recently echoed execution.
    pub fn last_code(&self, session_id: &str) -> watch::Receiver<Option<String>> {
        self.ensure_session(session_id);
        let sessions = self.inner.sessions.lock().unwrap();
        sessions[session_id].last_code.subscribe()
    }

    /// Subscribe to the aggregated status stream across all sessions.
    pub fn status_events(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.status_events.subscribe()
    }

    /// Current identifier -> owner-name map, for host introspection.
    pub fn identifier_map(&self, session_id: &str) -> BTreeMap<String, String> {
        self.ensure_session(session_id);
        let sessions = self.inner.sessions.lock().unwrap();
        sessions[session_id].identifier_map.clone()
    }

    /// Current owner-name -> expression map, for host introspection.
    pub fn evaluate_map(&self, session_id: &str) -> BTreeMap<String, String> {
        self.ensure_session(session_id);
        let sessions = self.inner.sessions.lock().unwrap();
        sessions[session_id].evaluate_map.clone()
    }

    /// Most recent raw name-keyed result object from the interpreter-side
    /// handler. `Null` before the first successful fetch.
    pub fn kernel_variables(&self, session_id: &str) -> Value {
        self.ensure_session(session_id);
        let sessions = self.inner.sessions.lock().unwrap();
        sessions[session_id].kernel_variables.clone()
    }

    /// Current diff baseline, for host diagnostics. `None` until the first
    /// fetch or push establishes one.
    pub fn baseline(&self, session_id: &str) -> Option<VariableStore> {
        self.ensure_session(session_id);
        let sessions = self.inner.sessions.lock().unwrap();
        sessions[session_id].baseline.clone()
    }

    fn set_status(&self, session_id: &str, status: SyncStatus) {
        {
            let sessions = self.inner.sessions.lock().unwrap();
            if let Some(state) = sessions.get(session_id) {
                state.status.send_replace(status.clone());
            }
        }
        let _ = self.inner.status_events.send(StatusEvent {
            session_id: session_id.to_string(),
            status,
        });
    }

    /// Install a parsed handler result: keep it as the raw name-keyed
    /// object, then derive and publish the identifier-keyed snapshot.
    /// An identifier whose owner name is absent from the result is published
    /// as `{defined: false, value: null}`.
    fn install_result(&self, session_id: &str, document: Value) {
        let parsed: HashMap<String, VariableEntry> =
            match serde_json::from_value(document.clone()) {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!(
                        session_id,
                        %error,
                        "fetched document is not a name-keyed variable object; ignoring"
                    );
                    return;
                }
            };

        let mut sessions = self.inner.sessions.lock().unwrap();
        let Some(state) = sessions.get_mut(session_id) else {
            return;
        };
        state.kernel_variables = document;

        let mut next = VariableStore::new();
        for (identifier, name) in &state.identifier_map {
            let entry = parsed.get(name).cloned().unwrap_or(VariableEntry {
                defined: false,
                value: Value::Null,
            });
            next.insert(identifier.clone(), entry);
        }
        debug!(session_id, identifiers = next.len(), "installed new snapshot");
        state.variables.send_replace(next);
    }

    /// Diff the current snapshot against the baseline: notify each defined,
    /// changed identifier's component, fire the whole-snapshot changed
    /// stream when anything differs, then confirm idleness once the
    /// execution queue drains — but only if no newer cycle has advanced the
    /// status in the meantime. The baseline is overwritten last.
    fn check_for_changes(&self, session_id: &str) {
        self.set_status(session_id, SyncStatus::CheckingForChanges);

        let (pending, current, store_changed, changed_tx) = {
            let sessions = self.inner.sessions.lock().unwrap();
            let Some(state) = sessions.get(session_id) else {
                return;
            };
            let current = state.variables.borrow().clone();

            let mut pending: Vec<(Arc<dyn VariableComponent>, Value)> = Vec::new();
            for (identifier, component) in &state.components {
                let Some(entry) = current.get(identifier) else {
                    continue;
                };
                if !entry.defined {
                    continue;
                }
                let notify = match &state.baseline {
                    None => true,
                    Some(baseline) => baseline.get(identifier) != Some(entry),
                };
                if notify {
                    pending.push((Arc::clone(component), entry.value.clone()));
                }
            }

            let store_changed = match &state.baseline {
                None => true,
                Some(baseline) => *baseline != current,
            };
            (pending, current, store_changed, state.changed.clone())
        };

        // Deliver outside the lock so a component may re-enter the engine.
        for (component, value) in pending {
            component.update_view(value);
        }

        if store_changed {
            let _ = changed_tx.send(current.clone());
            self.set_status(session_id, SyncStatus::ChangeMade);
        } else {
            self.set_status(session_id, SyncStatus::NoChangeMade);
        }

        let token = Uuid::new_v4();
        self.set_status(session_id, SyncStatus::PreppingForIdle(token));
        let engine = self.clone();
        let session = session_id.to_string();
        tokio::spawn(async move {
            engine.inner.kernel.queue_drained(&session).await;
            let still_prepping = {
                let sessions = engine.inner.sessions.lock().unwrap();
                sessions
                    .get(&session)
                    .map(|state| *state.status.borrow() == SyncStatus::PreppingForIdle(token))
                    .unwrap_or(false)
            };
            if still_prepping {
                engine.set_status(&session, SyncStatus::Idle);
            }
        });

        let mut sessions = self.inner.sessions.lock().unwrap();
        if let Some(state) = sessions.get_mut(session_id) {
            state.baseline = Some(current);
        }
    }

    /// Attach the change listener. Replaces (and aborts) any previous one.
    fn start_listening(&self, session_id: &str) {
        let handle = listener::spawn(self.clone(), session_id.to_string());
        let mut sessions = self.inner.sessions.lock().unwrap();
        match sessions.get_mut(session_id) {
            Some(state) => {
                if let Some(previous) = state.listener.replace(handle) {
                    previous.abort();
                }
            }
            None => handle.abort(),
        }
    }

    pub(crate) fn record_execution(&self, session_id: &str, input: &ExecuteInput) {
        let sessions = self.inner.sessions.lock().unwrap();
        if let Some(state) = sessions.get(session_id) {
            state.execution_count.send_replace(Some(input.execution_count));
            state.last_code.send_replace(Some(input.code.clone()));
        }
    }
}
