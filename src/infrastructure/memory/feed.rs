//! In-memory change feed.
//!
//! One broadcast channel per subscribed scope: delivery is ordered
//! within a scope and unordered across scopes, matching the collaborator
//! contract. Slow subscribers lag rather than block writers.

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::domain::events::{ChangeEvent, ChangeFeed, FeedScope};

const DEFAULT_CAPACITY: usize = 512;

/// Reference change-feed adapter backed by tokio broadcast channels.
pub struct InMemoryFeed {
    capacity: usize,
    senders: DashMap<FeedScope, broadcast::Sender<ChangeEvent>>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            senders: DashMap::new(),
        }
    }

    fn sender(&self, scope: FeedScope) -> broadcast::Sender<ChangeEvent> {
        self.senders
            .entry(scope)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish one committed change to every matching scope.
    pub fn emit(&self, event: ChangeEvent) {
        for entry in self.senders.iter() {
            if entry.key().matches(&event) {
                // No receivers on a scope is not an error.
                let _ = entry.value().send(event.clone());
            }
        }
    }
}

impl ChangeFeed for InMemoryFeed {
    fn subscribe(&self, scope: FeedScope) -> broadcast::Receiver<ChangeEvent> {
        self.sender(scope).subscribe()
    }
}

impl Default for InMemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}
