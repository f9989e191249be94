//! Presence Tracker
//!
//! Maintains each user's coarse availability and broadcasts transitions
//! to subscribed guild sessions. Only the current state matters: no
//! history, last writer wins, and duplicate delivery of the same state
//! is a safe no-op at every subscriber.

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::entities::{PresenceState, PresenceUpdate};

/// Default broadcast buffer; lagging subscribers drop stale transitions,
/// which is acceptable since the next true transition supersedes them.
const DEFAULT_CAPACITY: usize = 256;

/// Shared presence state for all users known to this process.
pub struct PresenceTracker {
    states: DashMap<i64, PresenceState>,
    tx: broadcast::Sender<PresenceUpdate>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            states: DashMap::new(),
            tx,
        }
    }

    /// Record a transition caused by explicit user action. A repeated
    /// set of the current state broadcasts nothing.
    pub fn set_state(&self, user_id: i64, state: PresenceState) {
        let previous = self.states.insert(user_id, state);
        if previous == Some(state) {
            return;
        }

        debug!(user_id, state = state.as_str(), "presence transition");
        // Other users observe invisible as offline.
        let _ = self.tx.send(PresenceUpdate {
            user_id,
            state: state.observed(),
            at: Utc::now(),
        });
    }

    /// Connection loss, mapped externally to offline.
    pub fn disconnected(&self, user_id: i64) {
        self.set_state(user_id, PresenceState::Offline);
    }

    /// The state as the user set it (themselves included).
    pub fn state_of(&self, user_id: i64) -> PresenceState {
        self.states
            .get(&user_id)
            .map(|entry| *entry)
            .unwrap_or_default()
    }

    /// The state other users observe.
    pub fn observed_state(&self, user_id: i64) -> PresenceState {
        self.state_of(user_id).observed()
    }

    /// Subscribe to every transition; sessions filter by shared
    /// membership on their side.
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceUpdate> {
        self.tx.subscribe()
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}
