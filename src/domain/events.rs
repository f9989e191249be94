//! Change-feed event types and the subscription port.
//!
//! The change feed is the only path by which committed mutations reach
//! live views: the core never re-runs a query after a write. Delivery is
//! at-least-once, ordered within a scope, with no ordering guarantee
//! across distinct scopes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::entities::{Category, Channel, CustomRole, Member, Message, Server};

/// Row operation carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// The affected row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "table", content = "row", rename_all = "lowercase")]
pub enum ChangeRow {
    Server(Server),
    Category(Category),
    Channel(Channel),
    Member(Member),
    Role(CustomRole),
    Message(Message),
}

/// One event on a subscribed scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub op: ChangeOp,
    pub row: ChangeRow,
}

/// A subscription scope: one table filtered by a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedScope {
    /// The server row itself
    Server(i64),
    /// Categories where server_id = .0
    CategoriesInServer(i64),
    /// Channels where server_id = .0
    ChannelsInServer(i64),
    /// Members (and their role assignments) where server_id = .0
    MembersInServer(i64),
    /// Custom roles where server_id = .0
    RolesInServer(i64),
    /// Messages where channel_id = .0
    MessagesInChannel(i64),
}

impl FeedScope {
    /// Whether `event` belongs to this scope. Adapters that multiplex
    /// several scopes onto one stream use this to filter on delivery.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match (self, &event.row) {
            (FeedScope::Server(id), ChangeRow::Server(s)) => s.id == *id,
            (FeedScope::CategoriesInServer(id), ChangeRow::Category(c)) => c.server_id == *id,
            (FeedScope::ChannelsInServer(id), ChangeRow::Channel(c)) => c.server_id == *id,
            (FeedScope::MembersInServer(id), ChangeRow::Member(m)) => m.server_id == *id,
            (FeedScope::RolesInServer(id), ChangeRow::Role(r)) => r.server_id == *id,
            (FeedScope::MessagesInChannel(id), ChangeRow::Message(m)) => m.channel_id == *id,
            _ => false,
        }
    }
}

/// Subscribe-by-scope port onto the collaborator's change feed.
///
/// A lagged receiver (`broadcast::error::RecvError::Lagged`) means events
/// were dropped; subscribers must treat their view as stale and refetch.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, scope: FeedScope) -> broadcast::Receiver<ChangeEvent>;
}
