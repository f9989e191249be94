//! In-memory persistence adapters.
//!
//! One backend guarded by a single lock, fronted by one small repository
//! adapter per entity (the same shape a database-backed implementation
//! would take). Every committed mutation is published to the in-memory
//! change feed, so live sessions converge exactly as they would against
//! a real backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::domain::entities::{
    Ban, BanRepository, Category, CategoryRepository, Channel, ChannelRepository, CustomRole,
    Invite, InviteRepository, Member, MemberRepository, Message, MessageDraft, MessageRepository,
    RoleRepository, Server, ServerRepository,
};
use crate::domain::events::{ChangeEvent, ChangeOp, ChangeRow};
use crate::shared::error::{CoreError, ResourceKind};
use crate::shared::snowflake::SnowflakeGenerator;

use super::feed::InMemoryFeed;

#[derive(Default)]
struct Tables {
    servers: HashMap<i64, Server>,
    members: HashMap<(i64, i64), Member>,
    roles: HashMap<i64, CustomRole>,
    categories: HashMap<i64, Category>,
    channels: HashMap<i64, Channel>,
    invites: HashMap<String, Invite>,
    messages: HashMap<i64, Message>,
    bans: HashMap<(i64, i64), Ban>,
}

/// Shared state behind every repository adapter.
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    ids: SnowflakeGenerator,
    feed: Arc<InMemoryFeed>,
    /// Whether inserts echo the client correlation id, like a backend
    /// with idempotency-key support. Off by default, matching backends
    /// that drop client-supplied keys.
    echo_correlation: bool,
    /// Pending injected read failures, for exercising retry paths.
    fail_reads: AtomicU32,
    /// Pending injected write failures, for exercising surfaced-error
    /// paths (mutations are never retried by the core).
    fail_writes: AtomicU32,
}

impl MemoryBackend {
    pub fn new(feed: Arc<InMemoryFeed>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            ids: SnowflakeGenerator::new(1),
            feed,
            echo_correlation: false,
            fail_reads: AtomicU32::new(0),
            fail_writes: AtomicU32::new(0),
        }
    }

    pub fn with_correlation_echo(feed: Arc<InMemoryFeed>) -> Self {
        Self {
            echo_correlation: true,
            ..Self::new(feed)
        }
    }

    /// Make the next `count` reads fail with a transient error.
    pub fn inject_read_failures(&self, count: u32) {
        self.fail_reads.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` writes fail with a transient error.
    pub fn inject_write_failures(&self, count: u32) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    fn read_fault(&self) -> Result<(), CoreError> {
        Self::take_fault(&self.fail_reads, "injected read failure")
    }

    fn write_fault(&self) -> Result<(), CoreError> {
        Self::take_fault(&self.fail_writes, "injected write failure")
    }

    fn take_fault(counter: &AtomicU32, label: &str) -> Result<(), CoreError> {
        let remaining = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            n.checked_sub(1)
        });
        match remaining {
            Ok(_) => Err(CoreError::collaborator(label)),
            Err(_) => Ok(()),
        }
    }

    fn emit(&self, op: ChangeOp, row: ChangeRow) {
        self.feed.emit(ChangeEvent { op, row });
    }
}

/// Server rows.
pub struct MemoryServerRepository {
    backend: Arc<MemoryBackend>,
}

impl MemoryServerRepository {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ServerRepository for MemoryServerRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Server>, CoreError> {
        self.backend.read_fault()?;
        Ok(self.backend.tables.lock().servers.get(&id).cloned())
    }

    async fn create(&self, server: &Server) -> Result<Server, CoreError> {
        let mut tables = self.backend.tables.lock();
        if tables.servers.contains_key(&server.id) {
            return Err(CoreError::conflict("server already exists"));
        }
        tables.servers.insert(server.id, server.clone());
        drop(tables);
        self.backend
            .emit(ChangeOp::Insert, ChangeRow::Server(server.clone()));
        Ok(server.clone())
    }

    async fn update(&self, server: &Server) -> Result<Server, CoreError> {
        let mut tables = self.backend.tables.lock();
        if !tables.servers.contains_key(&server.id) {
            return Err(CoreError::NotFound(ResourceKind::Server));
        }
        tables.servers.insert(server.id, server.clone());
        drop(tables);
        self.backend
            .emit(ChangeOp::Update, ChangeRow::Server(server.clone()));
        Ok(server.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let mut tables = self.backend.tables.lock();
        let server = tables
            .servers
            .remove(&id)
            .ok_or(CoreError::NotFound(ResourceKind::Server))?;

        // Everything scoped to the server goes with it.
        let members: Vec<Member> = tables
            .members
            .values()
            .filter(|m| m.server_id == id)
            .cloned()
            .collect();
        tables.members.retain(|_, m| m.server_id != id);
        let roles: Vec<CustomRole> = tables
            .roles
            .values()
            .filter(|r| r.server_id == id)
            .cloned()
            .collect();
        tables.roles.retain(|_, r| r.server_id != id);
        let categories: Vec<Category> = tables
            .categories
            .values()
            .filter(|c| c.server_id == id)
            .cloned()
            .collect();
        tables.categories.retain(|_, c| c.server_id != id);
        let channels: Vec<Channel> = tables
            .channels
            .values()
            .filter(|c| c.server_id == id)
            .cloned()
            .collect();
        tables.channels.retain(|_, c| c.server_id != id);
        let channel_ids: Vec<i64> = channels.iter().map(|c| c.id).collect();
        tables
            .messages
            .retain(|_, m| !channel_ids.contains(&m.channel_id));
        tables.invites.retain(|_, i| i.server_id != id);
        tables.bans.retain(|_, b| b.server_id != id);
        drop(tables);

        for member in members {
            self.backend.emit(ChangeOp::Delete, ChangeRow::Member(member));
        }
        for role in roles {
            self.backend.emit(ChangeOp::Delete, ChangeRow::Role(role));
        }
        for category in categories {
            self.backend
                .emit(ChangeOp::Delete, ChangeRow::Category(category));
        }
        for channel in channels {
            self.backend
                .emit(ChangeOp::Delete, ChangeRow::Channel(channel));
        }
        self.backend.emit(ChangeOp::Delete, ChangeRow::Server(server));
        Ok(())
    }
}

/// Member rows.
pub struct MemoryMemberRepository {
    backend: Arc<MemoryBackend>,
}

impl MemoryMemberRepository {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl MemberRepository for MemoryMemberRepository {
    async fn find(&self, server_id: i64, user_id: i64) -> Result<Option<Member>, CoreError> {
        self.backend.read_fault()?;
        Ok(self
            .backend
            .tables
            .lock()
            .members
            .get(&(server_id, user_id))
            .cloned())
    }

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<Member>, CoreError> {
        self.backend.read_fault()?;
        Ok(self
            .backend
            .tables
            .lock()
            .members
            .values()
            .filter(|m| m.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Member>, CoreError> {
        self.backend.read_fault()?;
        Ok(self
            .backend
            .tables
            .lock()
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn is_member(&self, server_id: i64, user_id: i64) -> Result<bool, CoreError> {
        self.backend.read_fault()?;
        Ok(self
            .backend
            .tables
            .lock()
            .members
            .contains_key(&(server_id, user_id)))
    }

    async fn create(&self, member: &Member) -> Result<Member, CoreError> {
        let key = (member.server_id, member.user_id);
        let mut tables = self.backend.tables.lock();
        if tables.members.contains_key(&key) {
            return Err(CoreError::conflict("membership already exists"));
        }
        tables.members.insert(key, member.clone());
        drop(tables);
        self.backend
            .emit(ChangeOp::Insert, ChangeRow::Member(member.clone()));
        Ok(member.clone())
    }

    async fn update(&self, member: &Member) -> Result<Member, CoreError> {
        let key = (member.server_id, member.user_id);
        let mut tables = self.backend.tables.lock();
        if !tables.members.contains_key(&key) {
            return Err(CoreError::NotFound(ResourceKind::Member));
        }
        tables.members.insert(key, member.clone());
        drop(tables);
        self.backend
            .emit(ChangeOp::Update, ChangeRow::Member(member.clone()));
        Ok(member.clone())
    }

    async fn delete(&self, server_id: i64, user_id: i64) -> Result<(), CoreError> {
        let removed = self
            .backend
            .tables
            .lock()
            .members
            .remove(&(server_id, user_id))
            .ok_or(CoreError::NotFound(ResourceKind::Member))?;
        self.backend
            .emit(ChangeOp::Delete, ChangeRow::Member(removed));
        Ok(())
    }
}

/// Custom role rows.
pub struct MemoryRoleRepository {
    backend: Arc<MemoryBackend>,
}

impl MemoryRoleRepository {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl RoleRepository for MemoryRoleRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<CustomRole>, CoreError> {
        self.backend.read_fault()?;
        Ok(self.backend.tables.lock().roles.get(&id).cloned())
    }

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<CustomRole>, CoreError> {
        self.backend.read_fault()?;
        Ok(self
            .backend
            .tables
            .lock()
            .roles
            .values()
            .filter(|r| r.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn create(&self, role: &CustomRole) -> Result<CustomRole, CoreError> {
        self.backend
            .tables
            .lock()
            .roles
            .insert(role.id, role.clone());
        self.backend
            .emit(ChangeOp::Insert, ChangeRow::Role(role.clone()));
        Ok(role.clone())
    }

    async fn update(&self, role: &CustomRole) -> Result<CustomRole, CoreError> {
        let mut tables = self.backend.tables.lock();
        if !tables.roles.contains_key(&role.id) {
            return Err(CoreError::NotFound(ResourceKind::Role));
        }
        tables.roles.insert(role.id, role.clone());
        drop(tables);
        self.backend
            .emit(ChangeOp::Update, ChangeRow::Role(role.clone()));
        Ok(role.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let removed = self
            .backend
            .tables
            .lock()
            .roles
            .remove(&id)
            .ok_or(CoreError::NotFound(ResourceKind::Role))?;
        self.backend.emit(ChangeOp::Delete, ChangeRow::Role(removed));
        Ok(())
    }
}

/// Category rows.
pub struct MemoryCategoryRepository {
    backend: Arc<MemoryBackend>,
}

impl MemoryCategoryRepository {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl CategoryRepository for MemoryCategoryRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Category>, CoreError> {
        self.backend.read_fault()?;
        Ok(self.backend.tables.lock().categories.get(&id).cloned())
    }

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<Category>, CoreError> {
        self.backend.read_fault()?;
        Ok(self
            .backend
            .tables
            .lock()
            .categories
            .values()
            .filter(|c| c.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn next_position(&self, server_id: i64) -> Result<i32, CoreError> {
        // Single lock makes max(existing) + 1 atomic under concurrent
        // creation; positions are append-only and never reused.
        Ok(self
            .backend
            .tables
            .lock()
            .categories
            .values()
            .filter(|c| c.server_id == server_id)
            .map(|c| c.position)
            .max()
            .map_or(0, |max| max + 1))
    }

    async fn create(&self, category: &Category) -> Result<Category, CoreError> {
        self.backend
            .tables
            .lock()
            .categories
            .insert(category.id, category.clone());
        self.backend
            .emit(ChangeOp::Insert, ChangeRow::Category(category.clone()));
        Ok(category.clone())
    }

    async fn update(&self, category: &Category) -> Result<Category, CoreError> {
        let mut tables = self.backend.tables.lock();
        if !tables.categories.contains_key(&category.id) {
            return Err(CoreError::NotFound(ResourceKind::Category));
        }
        tables.categories.insert(category.id, category.clone());
        drop(tables);
        self.backend
            .emit(ChangeOp::Update, ChangeRow::Category(category.clone()));
        Ok(category.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let removed = self
            .backend
            .tables
            .lock()
            .categories
            .remove(&id)
            .ok_or(CoreError::NotFound(ResourceKind::Category))?;
        self.backend
            .emit(ChangeOp::Delete, ChangeRow::Category(removed));
        Ok(())
    }
}

/// Channel rows.
pub struct MemoryChannelRepository {
    backend: Arc<MemoryBackend>,
}

impl MemoryChannelRepository {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ChannelRepository for MemoryChannelRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Channel>, CoreError> {
        self.backend.read_fault()?;
        Ok(self.backend.tables.lock().channels.get(&id).cloned())
    }

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<Channel>, CoreError> {
        self.backend.read_fault()?;
        Ok(self
            .backend
            .tables
            .lock()
            .channels
            .values()
            .filter(|c| c.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn next_position(
        &self,
        server_id: i64,
        category_id: Option<i64>,
    ) -> Result<i32, CoreError> {
        Ok(self
            .backend
            .tables
            .lock()
            .channels
            .values()
            .filter(|c| c.server_id == server_id && c.category_id == category_id)
            .map(|c| c.position)
            .max()
            .map_or(0, |max| max + 1))
    }

    async fn create(&self, channel: &Channel) -> Result<Channel, CoreError> {
        self.backend
            .tables
            .lock()
            .channels
            .insert(channel.id, channel.clone());
        self.backend
            .emit(ChangeOp::Insert, ChangeRow::Channel(channel.clone()));
        Ok(channel.clone())
    }

    async fn update(&self, channel: &Channel) -> Result<Channel, CoreError> {
        let mut tables = self.backend.tables.lock();
        if !tables.channels.contains_key(&channel.id) {
            return Err(CoreError::NotFound(ResourceKind::Channel));
        }
        tables.channels.insert(channel.id, channel.clone());
        drop(tables);
        self.backend
            .emit(ChangeOp::Update, ChangeRow::Channel(channel.clone()));
        Ok(channel.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let mut tables = self.backend.tables.lock();
        let removed = tables
            .channels
            .remove(&id)
            .ok_or(CoreError::NotFound(ResourceKind::Channel))?;
        tables.messages.retain(|_, m| m.channel_id != id);
        drop(tables);
        self.backend
            .emit(ChangeOp::Delete, ChangeRow::Channel(removed));
        Ok(())
    }
}

/// Invite rows.
pub struct MemoryInviteRepository {
    backend: Arc<MemoryBackend>,
}

impl MemoryInviteRepository {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl InviteRepository for MemoryInviteRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<Invite>, CoreError> {
        self.backend.read_fault()?;
        Ok(self.backend.tables.lock().invites.get(code).cloned())
    }

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<Invite>, CoreError> {
        self.backend.read_fault()?;
        Ok(self
            .backend
            .tables
            .lock()
            .invites
            .values()
            .filter(|i| i.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn code_exists(&self, code: &str) -> Result<bool, CoreError> {
        self.backend.read_fault()?;
        Ok(self.backend.tables.lock().invites.contains_key(code))
    }

    async fn create(&self, invite: &Invite) -> Result<Invite, CoreError> {
        let mut tables = self.backend.tables.lock();
        if tables.invites.contains_key(&invite.code) {
            return Err(CoreError::conflict("invite code already exists"));
        }
        tables.invites.insert(invite.code.clone(), invite.clone());
        Ok(invite.clone())
    }

    async fn claim_use(&self, code: &str) -> Result<Invite, CoreError> {
        // Compare-and-increment under one lock: the counter can never
        // pass max_uses, whatever the interleaving.
        let mut tables = self.backend.tables.lock();
        let invite = tables
            .invites
            .get_mut(code)
            .ok_or(CoreError::NotFound(ResourceKind::Invite))?;
        if invite.is_exhausted() {
            return Err(CoreError::InviteExhausted);
        }
        invite.uses += 1;
        Ok(invite.clone())
    }

    async fn delete(&self, code: &str) -> Result<(), CoreError> {
        self.backend
            .tables
            .lock()
            .invites
            .remove(code)
            .ok_or(CoreError::NotFound(ResourceKind::Invite))?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, CoreError> {
        let now = Utc::now();
        let mut tables = self.backend.tables.lock();
        let before = tables.invites.len();
        tables
            .invites
            .retain(|_, i| !i.expires_at.is_some_and(|at| at < now));
        Ok((before - tables.invites.len()) as u64)
    }
}

/// Message rows. Ids and the authoritative `created_at` are assigned
/// here, on insert.
pub struct MemoryMessageRepository {
    backend: Arc<MemoryBackend>,
}

impl MemoryMessageRepository {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, CoreError> {
        self.backend.read_fault()?;
        Ok(self.backend.tables.lock().messages.get(&id).cloned())
    }

    async fn find_recent(&self, channel_id: i64, limit: usize) -> Result<Vec<Message>, CoreError> {
        self.backend.read_fault()?;
        let mut page: Vec<Message> = self
            .backend
            .tables
            .lock()
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect();
        page.sort_by_key(|m| (m.created_at, m.id));
        let skip = page.len().saturating_sub(limit);
        Ok(page.split_off(skip))
    }

    async fn create(&self, draft: &MessageDraft) -> Result<Message, CoreError> {
        self.backend.write_fault()?;
        let message = Message {
            id: self.backend.ids.generate(),
            channel_id: draft.channel_id,
            author_id: draft.author_id,
            content: draft.content.clone(),
            created_at: Utc::now(),
            edited_at: None,
            reply_to: draft.reply_to,
            thread_id: draft.thread_id,
            pinned: false,
            correlation_id: self
                .backend
                .echo_correlation
                .then_some(draft.correlation_id),
        };
        self.backend
            .tables
            .lock()
            .messages
            .insert(message.id, message.clone());
        self.backend
            .emit(ChangeOp::Insert, ChangeRow::Message(message.clone()));
        Ok(message)
    }

    async fn update_content(&self, id: i64, content: &str) -> Result<Message, CoreError> {
        let mut tables = self.backend.tables.lock();
        let message = tables
            .messages
            .get_mut(&id)
            .ok_or(CoreError::NotFound(ResourceKind::Message))?;
        message.content = content.to_string();
        message.edited_at = Some(Utc::now());
        let updated = message.clone();
        drop(tables);
        self.backend
            .emit(ChangeOp::Update, ChangeRow::Message(updated.clone()));
        Ok(updated)
    }

    async fn set_pinned(&self, id: i64, pinned: bool) -> Result<Message, CoreError> {
        let mut tables = self.backend.tables.lock();
        let message = tables
            .messages
            .get_mut(&id)
            .ok_or(CoreError::NotFound(ResourceKind::Message))?;
        message.pinned = pinned;
        let updated = message.clone();
        drop(tables);
        self.backend
            .emit(ChangeOp::Update, ChangeRow::Message(updated.clone()));
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<(), CoreError> {
        let removed = self
            .backend
            .tables
            .lock()
            .messages
            .remove(&id)
            .ok_or(CoreError::NotFound(ResourceKind::Message))?;
        self.backend
            .emit(ChangeOp::Delete, ChangeRow::Message(removed));
        Ok(())
    }
}

/// Ban rows.
pub struct MemoryBanRepository {
    backend: Arc<MemoryBackend>,
}

impl MemoryBanRepository {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl BanRepository for MemoryBanRepository {
    async fn find(&self, server_id: i64, user_id: i64) -> Result<Option<Ban>, CoreError> {
        self.backend.read_fault()?;
        Ok(self
            .backend
            .tables
            .lock()
            .bans
            .get(&(server_id, user_id))
            .cloned())
    }

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<Ban>, CoreError> {
        self.backend.read_fault()?;
        Ok(self
            .backend
            .tables
            .lock()
            .bans
            .values()
            .filter(|b| b.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn create(&self, ban: &Ban) -> Result<Ban, CoreError> {
        let key = (ban.server_id, ban.user_id);
        let mut tables = self.backend.tables.lock();
        if tables.bans.contains_key(&key) {
            return Err(CoreError::conflict("user is already banned"));
        }
        tables.bans.insert(key, ban.clone());
        Ok(ban.clone())
    }

    async fn delete(&self, server_id: i64, user_id: i64) -> Result<(), CoreError> {
        self.backend
            .tables
            .lock()
            .bans
            .remove(&(server_id, user_id))
            .map(|_| ())
            .ok_or(CoreError::conflict("user is not banned"))
    }
}
