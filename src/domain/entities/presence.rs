//! Presence state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's coarse availability, independent of any single server.
///
/// Any state is reachable from any other; transitions come only from
/// explicit user action or connection loss (mapped externally to
/// `Offline`). Last writer wins, no history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Idle,
    Dnd,
    /// Set by the user; other users observe `Offline`
    Invisible,
    #[default]
    Offline,
}

impl PresenceState {
    /// The state other users observe.
    pub const fn observed(&self) -> PresenceState {
        match self {
            PresenceState::Invisible => PresenceState::Offline,
            other => *other,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PresenceState::Online => "online",
            PresenceState::Idle => "idle",
            PresenceState::Dnd => "dnd",
            PresenceState::Invisible => "invisible",
            PresenceState::Offline => "offline",
        }
    }
}

/// One broadcast presence transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub user_id: i64,
    /// Already projected through [`PresenceState::observed`]
    pub state: PresenceState,
    pub at: DateTime<Utc>,
}
