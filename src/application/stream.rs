//! Message Stream Coordinator
//!
//! Merges locally-issued optimistic messages with the authoritative
//! per-channel feed into a single consistent, causally-ordered view.
//!
//! A channel open runs one bounded historical fetch concurrently with a
//! fresh live subscription; live events arriving before the page lands
//! are buffered and replayed through the same dedup-by-id rule, so no
//! message is lost or duplicated. Once reconciliation completes, the
//! view is always sorted by `(created_at, id)`.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::MessageSettings;
use crate::domain::entities::{Message, MessageDraft};
use crate::domain::events::{ChangeEvent, ChangeOp, ChangeRow};
use crate::shared::error::CoreError;

/// A locally-issued message awaiting its authoritative echo.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    /// Locally generated key, carried end-to-end. Backends that echo it
    /// reconcile exactly; others fall back to the content/author/recency
    /// heuristic.
    pub correlation_id: Uuid,
    pub channel_id: i64,
    pub author_id: i64,
    pub content: String,
    pub queued_at: DateTime<Utc>,
}

/// One row of the local view.
#[derive(Debug, Clone)]
pub enum StreamEntry {
    /// Authoritative, ordered by `(created_at, id)`
    Confirmed(Message),
    /// Optimistic, shown after confirmed rows in send order
    Pending(PendingMessage),
}

enum Phase {
    /// Historical page in flight; live events buffer until it lands
    Loading { buffer: Vec<ChangeEvent> },
    Live,
}

/// Per-channel view state. One coordinator per open channel; closing
/// the channel drops the coordinator and its buffer without affecting
/// other channels.
pub struct MessageStreamCoordinator {
    channel_id: i64,
    self_user_id: i64,
    max_content_length: usize,
    reconcile_window: Duration,
    phase: Phase,
    confirmed: Vec<Message>,
    pending: Vec<PendingMessage>,
    stale: bool,
}

impl MessageStreamCoordinator {
    pub fn new(channel_id: i64, self_user_id: i64, settings: &MessageSettings) -> Self {
        Self {
            channel_id,
            self_user_id,
            max_content_length: settings.max_content_length,
            reconcile_window: Duration::seconds(settings.reconcile_window_secs),
            phase: Phase::Loading { buffer: Vec::new() },
            confirmed: Vec::new(),
            pending: Vec::new(),
            stale: false,
        }
    }

    pub fn channel_id(&self) -> i64 {
        self.channel_id
    }

    /// Whether the historical page is still in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Loading { .. })
    }

    /// Validate content and append a pending entry in send order. The
    /// returned draft is handed to the persistence collaborator by the
    /// caller; on failure the caller must [`abandon`](Self::abandon) the
    /// entry and surface the error (no silent retry).
    pub fn prepare_send(&mut self, content: &str) -> Result<MessageDraft, CoreError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CoreError::validation("message content must not be empty"));
        }
        if content.chars().count() > self.max_content_length {
            return Err(CoreError::validation(format!(
                "message content exceeds {} characters",
                self.max_content_length
            )));
        }

        let pending = PendingMessage {
            correlation_id: Uuid::new_v4(),
            channel_id: self.channel_id,
            author_id: self.self_user_id,
            content: content.to_string(),
            queued_at: Utc::now(),
        };
        let draft = MessageDraft {
            channel_id: self.channel_id,
            author_id: self.self_user_id,
            content: pending.content.clone(),
            reply_to: None,
            thread_id: None,
            correlation_id: pending.correlation_id,
        };
        self.pending.push(pending);
        Ok(draft)
    }

    /// Variant of [`prepare_send`](Self::prepare_send) carrying a reply
    /// reference; the target must be a confirmed message of this channel.
    pub fn prepare_reply(&mut self, content: &str, reply_to: i64) -> Result<MessageDraft, CoreError> {
        if !self.confirmed.iter().any(|m| m.id == reply_to) {
            return Err(CoreError::validation(
                "reply target is not in this channel",
            ));
        }
        let mut draft = self.prepare_send(content)?;
        draft.reply_to = Some(reply_to);
        Ok(draft)
    }

    /// Drop a pending entry whose persistence call failed.
    pub fn abandon(&mut self, correlation_id: Uuid) {
        self.pending.retain(|p| p.correlation_id != correlation_id);
    }

    /// Feed one live event in. Buffered while the historical page is in
    /// flight, applied immediately afterwards.
    pub fn ingest(&mut self, event: ChangeEvent) {
        match &mut self.phase {
            Phase::Loading { buffer } => buffer.push(event),
            Phase::Live => self.apply(event),
        }
    }

    /// Merge the historical page, then replay the buffered live events
    /// through the same dedup rule.
    pub fn complete_initial_load(&mut self, mut history: Vec<Message>) {
        history.sort_by_key(|m| (m.created_at, m.id));
        history.dedup_by_key(|m| m.id);
        self.confirmed = history;

        let buffered = match std::mem::replace(&mut self.phase, Phase::Live) {
            Phase::Loading { buffer } => buffer,
            Phase::Live => Vec::new(),
        };
        debug!(
            channel_id = self.channel_id,
            buffered = buffered.len(),
            "historical page merged, replaying buffer"
        );
        for event in buffered {
            self.apply(event);
        }
        self.stale = false;
    }

    /// Re-enter the loading phase after a feed gap; the current view
    /// stays visible (marked stale) until the fresh page lands.
    pub fn begin_reload(&mut self) {
        self.phase = Phase::Loading { buffer: Vec::new() };
        self.stale = true;
    }

    /// Route the persistence response for our own send through the same
    /// path as a feed insert: whichever arrives first reconciles the
    /// pending entry, the other deduplicates by id.
    pub fn apply_authoritative(&mut self, message: Message) {
        self.reconcile_or_insert(message);
    }

    fn apply(&mut self, event: ChangeEvent) {
        let ChangeRow::Message(message) = event.row else {
            return;
        };
        if message.channel_id != self.channel_id {
            return;
        }

        match event.op {
            ChangeOp::Insert => self.reconcile_or_insert(message),
            // Updates (edits, pin toggles) replace in place and never
            // reorder; an update for an unseen row upserts, since
            // at-least-once delivery may race the historical page.
            ChangeOp::Update => self.reconcile_or_insert(message),
            ChangeOp::Delete => self.confirmed.retain(|m| m.id != message.id),
        }
    }

    fn reconcile_or_insert(&mut self, message: Message) {
        // Dedup by id first: replaces handle edits and at-least-once
        // redelivery without reordering.
        if let Some(existing) = self.confirmed.iter_mut().find(|m| m.id == message.id) {
            *existing = message;
            return;
        }

        if let Some(idx) = self.match_pending(&message) {
            let pending = self.pending.remove(idx);
            trace!(
                channel_id = self.channel_id,
                correlation_id = %pending.correlation_id,
                "pending entry confirmed"
            );
        }

        let at = (message.created_at, message.id);
        let idx = self
            .confirmed
            .partition_point(|m| (m.created_at, m.id) < at);
        self.confirmed.insert(idx, message);
    }

    /// Match an authoritative insert against pending entries: exact by
    /// correlation id when the backend echoes it, otherwise by
    /// (author = self, content, recency window). The heuristic may
    /// mis-merge rapid identical messages; the correlation id removes
    /// that risk wherever the backend supports idempotency keys.
    fn match_pending(&self, message: &Message) -> Option<usize> {
        if let Some(correlation_id) = message.correlation_id {
            return self
                .pending
                .iter()
                .position(|p| p.correlation_id == correlation_id);
        }

        if message.author_id != self.self_user_id {
            return None;
        }
        self.pending.iter().position(|p| {
            p.content == message.content
                && (message.created_at - p.queued_at).abs() <= self.reconcile_window
        })
    }

    /// The local view: confirmed rows in `(created_at, id)` order, then
    /// pending rows in send order.
    pub fn view(&self) -> Vec<StreamEntry> {
        self.confirmed
            .iter()
            .cloned()
            .map(StreamEntry::Confirmed)
            .chain(self.pending.iter().cloned().map(StreamEntry::Pending))
            .collect()
    }

    pub fn confirmed(&self) -> &[Message] {
        &self.confirmed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Feed disconnects degrade to a stale indicator, not an error.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }
}
