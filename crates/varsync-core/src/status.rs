//! Synchronization phase reporting.
//!
//! Each session carries its own `watch`-backed status slot; an aggregated
//! broadcast of `(session, status)` events is available for progress UIs
//! that want one merged view across sessions.

use std::fmt;

use uuid::Uuid;

/// Phase of the synchronization state machine for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// No synchronization activity has happened yet.
    Initial,
    /// The interpreter-side handler is being initialized.
    Initialising,
    /// A batch value fetch is in flight.
    Fetching,
    /// A fetched snapshot is being diffed against the baseline.
    CheckingForChanges,
    /// The last diff detected at least one changed value.
    ChangeMade,
    /// The last diff found the snapshot identical to the baseline.
    NoChangeMade,
    /// Waiting for the execution queue to drain before going idle. The token
    /// guards against a newer cycle having already advanced the status.
    PreppingForIdle(Uuid),
    /// The queue drained with no newer cycle in flight.
    Idle,
    /// The session's synchronization state was cleared.
    Reset,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Initial => write!(f, "initial"),
            SyncStatus::Initialising => write!(f, "initialising"),
            SyncStatus::Fetching => write!(f, "fetching"),
            SyncStatus::CheckingForChanges => write!(f, "checking-for-changes"),
            SyncStatus::ChangeMade => write!(f, "a-change-was-made"),
            SyncStatus::NoChangeMade => write!(f, "no-change-was-made"),
            SyncStatus::PreppingForIdle(token) => write!(f, "prepping-for-idle:{}", token),
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Reset => write!(f, "reset"),
        }
    }
}

/// One entry on the aggregated status stream.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub session_id: String,
    pub status: SyncStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_labels_match_protocol_strings() {
        assert_eq!(SyncStatus::Initialising.to_string(), "initialising");
        assert_eq!(SyncStatus::Fetching.to_string(), "fetching");
        assert_eq!(
            SyncStatus::CheckingForChanges.to_string(),
            "checking-for-changes"
        );
        assert_eq!(SyncStatus::ChangeMade.to_string(), "a-change-was-made");
        assert_eq!(SyncStatus::NoChangeMade.to_string(), "no-change-was-made");
        assert_eq!(SyncStatus::Idle.to_string(), "idle");
        assert_eq!(SyncStatus::Reset.to_string(), "reset");
    }

    #[test]
    fn prepping_label_carries_its_token() {
        let token = Uuid::new_v4();
        let label = SyncStatus::PreppingForIdle(token).to_string();
        assert_eq!(label, format!("prepping-for-idle:{}", token));
    }

    #[test]
    fn prepping_equality_is_token_sensitive() {
        let a = SyncStatus::PreppingForIdle(Uuid::new_v4());
        let b = SyncStatus::PreppingForIdle(Uuid::new_v4());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
