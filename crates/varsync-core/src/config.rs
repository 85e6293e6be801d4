use serde::{Deserialize, Serialize};

/// Configuration for the synchronization engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Interpreter-side class constructed during handler initialization.
    /// The surrounding application is responsible for defining it before the
    /// engine initializes a session.
    #[serde(default = "default_handler_class")]
    pub handler_class: String,
    /// Interpreter-side name the handler instance is bound to.
    #[serde(default = "default_handler_name")]
    pub handler_name: String,
    /// Upper bound on accumulated fetch output per execution. Output beyond
    /// this is discarded and the cycle ends without a snapshot update.
    #[serde(default = "default_max_result_bytes")]
    pub max_result_bytes: usize,
}

fn default_handler_class() -> String {
    "_VariableSyncHandler".to_string()
}

fn default_handler_name() -> String {
    "_variable_sync_handler".to_string()
}

fn default_max_result_bytes() -> usize {
    8 * 1024 * 1024
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            handler_class: default_handler_class(),
            handler_name: default_handler_name(),
            max_result_bytes: default_max_result_bytes(),
        }
    }
}
