//! Guild Session
//!
//! Binds one connected client identity to one active server context.
//! The session owns its subscription set: attaching to a server
//! subscribes the directory, member-role, and presence feeds; switching
//! servers tears all of them down deterministically and starts over.
//! Channel switches touch only the affected message stream.
//!
//! Retry policy: subscriptions reconnect with exponential backoff,
//! unbounded; one-shot idempotent fetches retry a bounded number of
//! times; non-idempotent mutations (send, redeem) are never silently
//! retried. Feed gaps degrade the affected view to "stale" rather than
//! erroring.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::presence::PresenceTracker;
use crate::application::services::{
    DirectoryService, DirectoryTree, DirectoryView, InviteService, MembershipService,
};
use crate::application::stream::{MessageStreamCoordinator, StreamEntry};
use crate::config::{RetrySettings, Settings};
use crate::domain::entities::{
    BanRepository, CategoryRepository, ChannelRepository, CustomRole, InviteRepository, Member,
    MemberRepository, Message, MessageRepository, PresenceState, RoleRepository, Server,
    ServerRepository,
};
use crate::domain::events::{ChangeEvent, ChangeFeed, ChangeOp, ChangeRow, FeedScope};
use crate::domain::ports::{Identity, UserIdentity};
use crate::domain::services::{AdminPolicy, PermissionService};
use crate::domain::value_objects::Capabilities;
use crate::shared::error::{CoreError, ResourceKind};
use crate::shared::snowflake::SnowflakeGenerator;

pub type SharedMembershipService = MembershipService<
    dyn ServerRepository,
    dyn MemberRepository,
    dyn RoleRepository,
    dyn BanRepository,
>;
pub type SharedInviteService = InviteService<
    dyn InviteRepository,
    dyn ServerRepository,
    dyn MemberRepository,
    dyn RoleRepository,
    dyn BanRepository,
>;
pub type SharedDirectoryService = DirectoryService<
    dyn ServerRepository,
    dyn MemberRepository,
    dyn RoleRepository,
    dyn CategoryRepository,
    dyn ChannelRepository,
>;

/// Collaborator handles a session is constructed over. All ports are
/// shared; sessions never own a connection.
#[derive(Clone)]
pub struct SessionDeps {
    pub servers: Arc<dyn ServerRepository>,
    pub members: Arc<dyn MemberRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub channels: Arc<dyn ChannelRepository>,
    pub invites: Arc<dyn InviteRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub bans: Arc<dyn BanRepository>,
    pub feed: Arc<dyn ChangeFeed>,
    pub presence: Arc<PresenceTracker>,
    pub settings: Arc<Settings>,
    pub admin_policy: Arc<AdminPolicy>,
    pub id_generator: Arc<SnowflakeGenerator>,
}

/// Live replica of the attached server, fed by subscriptions.
struct ActiveServer {
    server: Arc<RwLock<Server>>,
    roles: Arc<RwLock<Vec<CustomRole>>>,
    members: Arc<RwLock<HashMap<i64, Member>>>,
    directory: Arc<RwLock<DirectoryView>>,
    presences: Arc<DashMap<i64, PresenceState>>,
    tasks: Vec<JoinHandle<()>>,
    streams: HashMap<i64, ChannelStream>,
}

struct ChannelStream {
    coordinator: Arc<Mutex<MessageStreamCoordinator>>,
    task: JoinHandle<()>,
}

/// One connected client bound to at most one server at a time.
pub struct GuildSession {
    identity: UserIdentity,
    deps: SessionDeps,
    membership: SharedMembershipService,
    invites: SharedInviteService,
    directory: SharedDirectoryService,
    active: Mutex<Option<ActiveServer>>,
}

impl GuildSession {
    /// Construct a session for an already-resolved identity.
    pub fn new(identity: UserIdentity, deps: SessionDeps) -> Self {
        let membership = MembershipService::new(
            deps.servers.clone(),
            deps.members.clone(),
            deps.roles.clone(),
            deps.bans.clone(),
            deps.id_generator.clone(),
            deps.admin_policy.clone(),
        );
        let invites = InviteService::new(
            deps.invites.clone(),
            deps.servers.clone(),
            deps.members.clone(),
            deps.roles.clone(),
            deps.bans.clone(),
            deps.settings.invite.clone(),
        );
        let directory = DirectoryService::new(
            deps.servers.clone(),
            deps.members.clone(),
            deps.roles.clone(),
            deps.categories.clone(),
            deps.channels.clone(),
            deps.id_generator.clone(),
        );

        Self {
            identity,
            deps,
            membership,
            invites,
            directory,
            active: Mutex::new(None),
        }
    }

    /// Resolve an opaque session token through the identity collaborator
    /// and construct the session.
    pub async fn authenticate(
        token: &str,
        identity: Arc<dyn Identity>,
        deps: SessionDeps,
    ) -> Result<Self, CoreError> {
        let user = identity.resolve(token).await?;
        Ok(Self::new(user, deps))
    }

    pub fn user_id(&self) -> i64 {
        self.identity.user_id
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    /// Membership/moderation operations, permission-checked per call.
    pub fn membership(&self) -> &SharedMembershipService {
        &self.membership
    }

    /// Invite lifecycle operations.
    pub fn invite_manager(&self) -> &SharedInviteService {
        &self.invites
    }

    /// Directory mutations (category/channel administration).
    pub fn directory_manager(&self) -> &SharedDirectoryService {
        &self.directory
    }

    /// Attach to a server: tear down any previous context, load the
    /// replica, and subscribe the directory, roster, and presence feeds.
    pub async fn attach(&self, server_id: i64) -> Result<(), CoreError> {
        self.detach();

        let retry = self.deps.settings.retry.clone();

        let server = retry_fetch(&retry, || {
            let repo = self.deps.servers.clone();
            async move { repo.find_by_id(server_id).await }
        })
        .await?
        .ok_or(CoreError::NotFound(ResourceKind::Server))?;

        let member_rows = retry_fetch(&retry, || {
            let repo = self.deps.members.clone();
            async move { repo.find_by_server(server_id).await }
        })
        .await?;
        if !member_rows.iter().any(|m| m.user_id == self.identity.user_id) {
            return Err(CoreError::NotFound(ResourceKind::Member));
        }

        let roles = retry_fetch(&retry, || {
            let repo = self.deps.roles.clone();
            async move { repo.find_by_server(server_id).await }
        })
        .await?;

        // Subscribe before the loads complete so nothing published in
        // between is missed; the replica applies feed events on top.
        let category_rx = self.deps.feed.subscribe(FeedScope::CategoriesInServer(server_id));
        let channel_rx = self.deps.feed.subscribe(FeedScope::ChannelsInServer(server_id));
        let member_rx = self.deps.feed.subscribe(FeedScope::MembersInServer(server_id));
        let role_rx = self.deps.feed.subscribe(FeedScope::RolesInServer(server_id));

        let (categories, channels) = futures::future::try_join(
            retry_fetch(&retry, || {
                let repo = self.deps.categories.clone();
                async move { repo.find_by_server(server_id).await }
            }),
            retry_fetch(&retry, || {
                let repo = self.deps.channels.clone();
                async move { repo.find_by_server(server_id).await }
            }),
        )
        .await?;

        let mut view = DirectoryView::default();
        view.reset(categories, channels);
        let directory = Arc::new(RwLock::new(view));

        let presences = Arc::new(DashMap::new());
        for member in &member_rows {
            presences.insert(
                member.user_id,
                self.deps.presence.observed_state(member.user_id),
            );
        }

        let members = Arc::new(RwLock::new(
            member_rows
                .into_iter()
                .map(|m| (m.user_id, m))
                .collect::<HashMap<_, _>>(),
        ));
        let roles = Arc::new(RwLock::new(roles));
        let server = Arc::new(RwLock::new(server));

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(run_category_feed(
            self.deps.feed.clone(),
            self.deps.categories.clone(),
            server_id,
            directory.clone(),
            retry.clone(),
            category_rx,
        )));
        tasks.push(tokio::spawn(run_channel_feed(
            self.deps.feed.clone(),
            self.deps.channels.clone(),
            server_id,
            directory.clone(),
            retry.clone(),
            channel_rx,
        )));
        tasks.push(tokio::spawn(run_roster_feed(
            self.deps.feed.clone(),
            self.deps.members.clone(),
            self.deps.roles.clone(),
            server_id,
            members.clone(),
            roles.clone(),
            retry.clone(),
            member_rx,
            role_rx,
        )));
        tasks.push(tokio::spawn(run_presence_feed(
            self.deps.presence.clone(),
            members.clone(),
            presences.clone(),
        )));

        *self.active.lock() = Some(ActiveServer {
            server,
            roles,
            members,
            directory,
            presences,
            tasks,
            streams: HashMap::new(),
        });

        debug!(server_id, user_id = self.identity.user_id, "session attached");
        Ok(())
    }

    /// Switch to another server: identical to [`attach`](Self::attach),
    /// named for intent.
    pub async fn switch_server(&self, server_id: i64) -> Result<(), CoreError> {
        self.attach(server_id).await
    }

    /// Tear down the active server context: aborts every subscription
    /// task and discards all channel streams and their buffers.
    pub fn detach(&self) {
        if let Some(active) = self.active.lock().take() {
            for task in &active.tasks {
                task.abort();
            }
            for stream in active.streams.values() {
                stream.task.abort();
            }
        }
    }

    /// Mark this user offline and drop all subscriptions.
    pub fn disconnect(&self) {
        self.deps.presence.disconnected(self.identity.user_id);
        self.detach();
    }

    /// Publish an explicit presence transition for this user.
    pub fn set_presence(&self, state: PresenceState) {
        self.deps.presence.set_state(self.identity.user_id, state);
    }

    /// The presence another member of the active server is observed in.
    /// Users sharing no membership read as offline.
    pub fn presence_of(&self, user_id: i64) -> PresenceState {
        let guard = self.active.lock();
        let Some(active) = guard.as_ref() else {
            return PresenceState::Offline;
        };
        if !active.members.read().contains_key(&user_id) {
            return PresenceState::Offline;
        }
        active
            .presences
            .get(&user_id)
            .map(|entry| *entry)
            .unwrap_or_default()
    }

    /// Ordered directory snapshot of the active server.
    pub fn directory_tree(&self) -> Result<DirectoryTree, CoreError> {
        let guard = self.active.lock();
        let active = guard.as_ref().ok_or(CoreError::NotFound(ResourceKind::Server))?;
        let tree = active.directory.read().tree();
        Ok(tree)
    }

    /// Current member list of the active server.
    pub fn member_list(&self) -> Result<Vec<Member>, CoreError> {
        let guard = self.active.lock();
        let active = guard.as_ref().ok_or(CoreError::NotFound(ResourceKind::Server))?;
        let members: Vec<Member> = active.members.read().values().cloned().collect();
        Ok(members)
    }

    /// Whether any attached view may lag the feed.
    pub fn is_stale(&self) -> bool {
        let guard = self.active.lock();
        let Some(active) = guard.as_ref() else {
            return false;
        };
        active.directory.read().is_stale()
            || active
                .streams
                .values()
                .any(|s| s.coordinator.lock().is_stale())
    }

    /// Open a channel: start its live subscription, then load the
    /// bounded history page and merge. Reopening an open channel resets
    /// its stream.
    pub async fn open_channel(&self, channel_id: i64) -> Result<(), CoreError> {
        let (server_id, channel) = {
            let guard = self.active.lock();
            let active = guard.as_ref().ok_or(CoreError::NotFound(ResourceKind::Server))?;
            let server_id = active.server.read().id;
            let channel = active.directory.read().channel(channel_id).cloned();
            (server_id, channel)
        };

        let channel = match channel {
            Some(channel) => channel,
            None => self
                .deps
                .channels
                .find_by_id(channel_id)
                .await?
                .filter(|c| c.server_id == server_id)
                .ok_or(CoreError::NotFound(ResourceKind::Channel))?,
        };
        if !channel.kind.is_textual() {
            return Err(CoreError::validation("channel does not carry messages"));
        }

        let settings = &self.deps.settings;
        let coordinator = Arc::new(Mutex::new(MessageStreamCoordinator::new(
            channel_id,
            self.identity.user_id,
            &settings.message,
        )));

        // Live subscription first; the coordinator buffers whatever
        // arrives while the history fetch is in flight.
        let rx = self.deps.feed.subscribe(FeedScope::MessagesInChannel(channel_id));
        let task = tokio::spawn(run_message_feed(
            self.deps.feed.clone(),
            self.deps.messages.clone(),
            channel_id,
            coordinator.clone(),
            settings.message.history_page_size,
            settings.retry.clone(),
            rx,
        ));

        let page_size = settings.message.history_page_size;
        let history = match retry_fetch(&settings.retry, || {
            let repo = self.deps.messages.clone();
            async move { repo.find_recent(channel_id, page_size).await }
        })
        .await
        {
            Ok(history) => history,
            Err(err) => {
                task.abort();
                return Err(err);
            }
        };
        coordinator.lock().complete_initial_load(history);

        let mut guard = self.active.lock();
        let active = guard.as_mut().ok_or(CoreError::NotFound(ResourceKind::Server))?;
        if let Some(previous) = active
            .streams
            .insert(channel_id, ChannelStream { coordinator, task })
        {
            previous.task.abort();
        }
        Ok(())
    }

    /// Close a channel view: cancels its subscription and pending
    /// reconciliation buffer without affecting other channels.
    pub fn close_channel(&self, channel_id: i64) {
        let mut guard = self.active.lock();
        if let Some(active) = guard.as_mut() {
            if let Some(stream) = active.streams.remove(&channel_id) {
                stream.task.abort();
            }
        }
    }

    /// The merged local view of an open channel.
    pub fn channel_view(&self, channel_id: i64) -> Result<Vec<StreamEntry>, CoreError> {
        let guard = self.active.lock();
        let active = guard.as_ref().ok_or(CoreError::NotFound(ResourceKind::Server))?;
        let stream = active
            .streams
            .get(&channel_id)
            .ok_or(CoreError::NotFound(ResourceKind::Channel))?;
        let view = stream.coordinator.lock().view();
        Ok(view)
    }

    fn coordinator(&self, channel_id: i64) -> Result<Arc<Mutex<MessageStreamCoordinator>>, CoreError> {
        let guard = self.active.lock();
        let active = guard.as_ref().ok_or(CoreError::NotFound(ResourceKind::Server))?;
        active
            .streams
            .get(&channel_id)
            .map(|s| s.coordinator.clone())
            .ok_or(CoreError::NotFound(ResourceKind::Channel))
    }

    /// Capability check against the live replica; synchronous on
    /// purpose, so it completes before any mutation is issued.
    fn require_capability(&self, capability: i64) -> Result<(), CoreError> {
        let guard = self.active.lock();
        let active = guard.as_ref().ok_or(CoreError::NotFound(ResourceKind::Server))?;
        let server = active.server.read();
        let members = active.members.read();
        let member = members
            .get(&self.identity.user_id)
            .ok_or(CoreError::PermissionDenied)?;
        let roles = active.roles.read();
        PermissionService::require(member, &server, &roles, capability)
    }

    /// Send a message: checked, appended optimistically, persisted.
    /// Persistence failures abandon the pending entry and surface to
    /// the caller, who must explicitly resend.
    pub async fn send_message(
        &self,
        channel_id: i64,
        content: &str,
    ) -> Result<Uuid, CoreError> {
        self.require_capability(Capabilities::SEND_MESSAGES)?;

        let coordinator = self.coordinator(channel_id)?;
        let draft = coordinator.lock().prepare_send(content)?;
        let correlation_id = draft.correlation_id;

        match self.deps.messages.create(&draft).await {
            Ok(message) => {
                coordinator.lock().apply_authoritative(message);
                Ok(correlation_id)
            }
            Err(err) => {
                coordinator.lock().abandon(correlation_id);
                Err(err)
            }
        }
    }

    /// Reply variant of [`send_message`](Self::send_message).
    pub async fn send_reply(
        &self,
        channel_id: i64,
        content: &str,
        reply_to: i64,
    ) -> Result<Uuid, CoreError> {
        self.require_capability(Capabilities::SEND_MESSAGES)?;

        let coordinator = self.coordinator(channel_id)?;
        let draft = coordinator.lock().prepare_reply(content, reply_to)?;
        let correlation_id = draft.correlation_id;

        match self.deps.messages.create(&draft).await {
            Ok(message) => {
                coordinator.lock().apply_authoritative(message);
                Ok(correlation_id)
            }
            Err(err) => {
                coordinator.lock().abandon(correlation_id);
                Err(err)
            }
        }
    }

    /// Edit own message content. Author-only.
    pub async fn edit_message(
        &self,
        channel_id: i64,
        message_id: i64,
        content: &str,
    ) -> Result<Message, CoreError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CoreError::validation("message content must not be empty"));
        }
        if content.chars().count() > self.deps.settings.message.max_content_length {
            return Err(CoreError::validation(format!(
                "message content exceeds {} characters",
                self.deps.settings.message.max_content_length
            )));
        }

        let message = self.fetch_channel_message(channel_id, message_id).await?;
        if message.author_id != self.identity.user_id {
            return Err(CoreError::PermissionDenied);
        }

        let updated = self.deps.messages.update_content(message_id, content).await?;
        self.apply_local_update(channel_id, updated.clone());
        Ok(updated)
    }

    /// Toggle a message's pinned flag. Author or `manage_channels`.
    pub async fn toggle_pin(
        &self,
        channel_id: i64,
        message_id: i64,
    ) -> Result<Message, CoreError> {
        let message = self.fetch_channel_message(channel_id, message_id).await?;
        if message.author_id != self.identity.user_id {
            self.require_capability(Capabilities::MANAGE_CHANNELS)?;
        }

        let updated = self
            .deps
            .messages
            .set_pinned(message_id, !message.pinned)
            .await?;
        self.apply_local_update(channel_id, updated.clone());
        Ok(updated)
    }

    /// Delete a message. Author, or the moderation capability.
    pub async fn delete_message(
        &self,
        channel_id: i64,
        message_id: i64,
    ) -> Result<(), CoreError> {
        let message = self.fetch_channel_message(channel_id, message_id).await?;
        if message.author_id != self.identity.user_id {
            self.require_capability(Capabilities::KICK_MEMBERS)?;
        }

        self.deps.messages.delete(message_id).await?;
        if let Ok(coordinator) = self.coordinator(channel_id) {
            coordinator.lock().ingest(ChangeEvent {
                op: ChangeOp::Delete,
                row: ChangeRow::Message(message),
            });
        }
        Ok(())
    }

    async fn fetch_channel_message(
        &self,
        channel_id: i64,
        message_id: i64,
    ) -> Result<Message, CoreError> {
        let message = retry_fetch(&self.deps.settings.retry, || {
            let repo = self.deps.messages.clone();
            async move { repo.find_by_id(message_id).await }
        })
        .await?
        .ok_or(CoreError::NotFound(ResourceKind::Message))?;
        if message.channel_id != channel_id {
            return Err(CoreError::NotFound(ResourceKind::Message));
        }
        Ok(message)
    }

    fn apply_local_update(&self, channel_id: i64, message: Message) {
        if let Ok(coordinator) = self.coordinator(channel_id) {
            coordinator.lock().ingest(ChangeEvent {
                op: ChangeOp::Update,
                row: ChangeRow::Message(message),
            });
        }
    }
}

impl Drop for GuildSession {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Exponential backoff with a configured ceiling.
fn backoff_delay(attempt: u32, retry: &RetrySettings) -> StdDuration {
    let shift = attempt.min(16);
    let ms = retry
        .backoff_base_ms
        .saturating_mul(1u64.checked_shl(shift).unwrap_or(u64::MAX));
    StdDuration::from_millis(ms.min(retry.backoff_cap_ms))
}

/// Bounded retry for one-shot idempotent fetches. Only transient
/// collaborator failures are retried; everything else surfaces at once.
async fn retry_fetch<T, Fut>(
    retry: &RetrySettings,
    mut make: impl FnMut() -> Fut,
) -> Result<T, CoreError>
where
    Fut: std::future::Future<Output = Result<T, CoreError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match make().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < retry.fetch_attempts => {
                attempt += 1;
                warn!(attempt, error = %err, "fetch failed, backing off");
                sleep(backoff_delay(attempt, retry)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Reconnect a dropped subscription with unbounded backoff. Returns the
/// fresh receiver plus an event pulled while probing liveness, if any.
async fn reconnect(
    feed: &Arc<dyn ChangeFeed>,
    scope: FeedScope,
    retry: &RetrySettings,
) -> (broadcast::Receiver<ChangeEvent>, Option<ChangeEvent>) {
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        sleep(backoff_delay(attempt, retry)).await;
        let mut rx = feed.subscribe(scope);
        match rx.try_recv() {
            Ok(event) => return (rx, Some(event)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Lagged(_)) => return (rx, None),
            Err(TryRecvError::Closed) => {
                debug!(?scope, attempt, "feed still down, backing off");
            }
        }
    }
}

async fn run_category_feed(
    feed: Arc<dyn ChangeFeed>,
    repo: Arc<dyn CategoryRepository>,
    server_id: i64,
    view: Arc<RwLock<DirectoryView>>,
    retry: RetrySettings,
    mut rx: broadcast::Receiver<ChangeEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => view.write().apply(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(server_id, skipped, "category feed lagged, resyncing");
                resync_categories(&repo, server_id, &view, &retry).await;
            }
            Err(RecvError::Closed) => {
                view.write().mark_stale();
                let (new_rx, pending) =
                    reconnect(&feed, FeedScope::CategoriesInServer(server_id), &retry).await;
                rx = new_rx;
                resync_categories(&repo, server_id, &view, &retry).await;
                if let Some(event) = pending {
                    view.write().apply(&event);
                }
            }
        }
    }
}

async fn resync_categories(
    repo: &Arc<dyn CategoryRepository>,
    server_id: i64,
    view: &Arc<RwLock<DirectoryView>>,
    retry: &RetrySettings,
) {
    view.write().mark_stale();
    let fetched = retry_fetch(retry, || {
        let repo = repo.clone();
        async move { repo.find_by_server(server_id).await }
    })
    .await;
    match fetched {
        Ok(categories) => {
            let mut guard = view.write();
            guard.set_categories(categories);
            guard.clear_stale();
        }
        // Still stale; the next event or gap triggers another resync.
        Err(err) => warn!(server_id, error = %err, "category resync failed"),
    }
}

async fn run_channel_feed(
    feed: Arc<dyn ChangeFeed>,
    repo: Arc<dyn ChannelRepository>,
    server_id: i64,
    view: Arc<RwLock<DirectoryView>>,
    retry: RetrySettings,
    mut rx: broadcast::Receiver<ChangeEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => view.write().apply(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(server_id, skipped, "channel feed lagged, resyncing");
                resync_channels(&repo, server_id, &view, &retry).await;
            }
            Err(RecvError::Closed) => {
                view.write().mark_stale();
                let (new_rx, pending) =
                    reconnect(&feed, FeedScope::ChannelsInServer(server_id), &retry).await;
                rx = new_rx;
                resync_channels(&repo, server_id, &view, &retry).await;
                if let Some(event) = pending {
                    view.write().apply(&event);
                }
            }
        }
    }
}

async fn resync_channels(
    repo: &Arc<dyn ChannelRepository>,
    server_id: i64,
    view: &Arc<RwLock<DirectoryView>>,
    retry: &RetrySettings,
) {
    view.write().mark_stale();
    let fetched = retry_fetch(retry, || {
        let repo = repo.clone();
        async move { repo.find_by_server(server_id).await }
    })
    .await;
    match fetched {
        Ok(channels) => {
            let mut guard = view.write();
            guard.set_channels(channels);
            guard.clear_stale();
        }
        Err(err) => warn!(server_id, error = %err, "channel resync failed"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_roster_feed(
    feed: Arc<dyn ChangeFeed>,
    member_repo: Arc<dyn MemberRepository>,
    role_repo: Arc<dyn RoleRepository>,
    server_id: i64,
    members: Arc<RwLock<HashMap<i64, Member>>>,
    roles: Arc<RwLock<Vec<CustomRole>>>,
    retry: RetrySettings,
    mut member_rx: broadcast::Receiver<ChangeEvent>,
    mut role_rx: broadcast::Receiver<ChangeEvent>,
) {
    loop {
        tokio::select! {
            result = member_rx.recv() => match result {
                Ok(event) => apply_member_event(&members, &event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(server_id, skipped, "member feed lagged, resyncing");
                    resync_members(&member_repo, server_id, &members, &retry).await;
                }
                Err(RecvError::Closed) => {
                    let (new_rx, pending) =
                        reconnect(&feed, FeedScope::MembersInServer(server_id), &retry).await;
                    member_rx = new_rx;
                    resync_members(&member_repo, server_id, &members, &retry).await;
                    if let Some(event) = pending {
                        apply_member_event(&members, &event);
                    }
                }
            },
            result = role_rx.recv() => match result {
                Ok(event) => apply_role_event(&roles, &event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(server_id, skipped, "role feed lagged, resyncing");
                    resync_roles(&role_repo, server_id, &roles, &retry).await;
                }
                Err(RecvError::Closed) => {
                    let (new_rx, pending) =
                        reconnect(&feed, FeedScope::RolesInServer(server_id), &retry).await;
                    role_rx = new_rx;
                    resync_roles(&role_repo, server_id, &roles, &retry).await;
                    if let Some(event) = pending {
                        apply_role_event(&roles, &event);
                    }
                }
            },
        }
    }
}

fn apply_member_event(members: &Arc<RwLock<HashMap<i64, Member>>>, event: &ChangeEvent) {
    let ChangeRow::Member(member) = &event.row else {
        return;
    };
    match event.op {
        ChangeOp::Delete => {
            members.write().remove(&member.user_id);
        }
        _ => {
            members.write().insert(member.user_id, member.clone());
        }
    }
}

fn apply_role_event(roles: &Arc<RwLock<Vec<CustomRole>>>, event: &ChangeEvent) {
    let ChangeRow::Role(role) = &event.row else {
        return;
    };
    let mut guard = roles.write();
    guard.retain(|r| r.id != role.id);
    if event.op != ChangeOp::Delete {
        guard.push(role.clone());
    }
}

async fn resync_members(
    repo: &Arc<dyn MemberRepository>,
    server_id: i64,
    members: &Arc<RwLock<HashMap<i64, Member>>>,
    retry: &RetrySettings,
) {
    let fetched = retry_fetch(retry, || {
        let repo = repo.clone();
        async move { repo.find_by_server(server_id).await }
    })
    .await;
    match fetched {
        Ok(rows) => {
            *members.write() = rows.into_iter().map(|m| (m.user_id, m)).collect();
        }
        Err(err) => warn!(server_id, error = %err, "member resync failed"),
    }
}

async fn resync_roles(
    repo: &Arc<dyn RoleRepository>,
    server_id: i64,
    roles: &Arc<RwLock<Vec<CustomRole>>>,
    retry: &RetrySettings,
) {
    let fetched = retry_fetch(retry, || {
        let repo = repo.clone();
        async move { repo.find_by_server(server_id).await }
    })
    .await;
    match fetched {
        Ok(rows) => *roles.write() = rows,
        Err(err) => warn!(server_id, error = %err, "role resync failed"),
    }
}

async fn run_presence_feed(
    tracker: Arc<PresenceTracker>,
    members: Arc<RwLock<HashMap<i64, Member>>>,
    presences: Arc<DashMap<i64, PresenceState>>,
) {
    let mut rx = tracker.subscribe();
    loop {
        match rx.recv().await {
            // Last write observed wins; duplicates are no-ops by value.
            Ok(update) => {
                presences.insert(update.user_id, update.state);
            }
            Err(RecvError::Lagged(_)) => {
                // Coarse state: heal by snapshotting the tracker.
                let ids: Vec<i64> = members.read().keys().copied().collect();
                for user_id in ids {
                    presences.insert(user_id, tracker.observed_state(user_id));
                }
            }
            Err(RecvError::Closed) => return,
        }
    }
}

async fn run_message_feed(
    feed: Arc<dyn ChangeFeed>,
    repo: Arc<dyn MessageRepository>,
    channel_id: i64,
    coordinator: Arc<Mutex<MessageStreamCoordinator>>,
    page_size: usize,
    retry: RetrySettings,
    mut rx: broadcast::Receiver<ChangeEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => coordinator.lock().ingest(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(channel_id, skipped, "message feed lagged, reloading page");
                reload_stream(&repo, channel_id, &coordinator, page_size, &retry).await;
            }
            Err(RecvError::Closed) => {
                coordinator.lock().mark_stale();
                let (new_rx, pending) =
                    reconnect(&feed, FeedScope::MessagesInChannel(channel_id), &retry).await;
                rx = new_rx;
                reload_stream(&repo, channel_id, &coordinator, page_size, &retry).await;
                if let Some(event) = pending {
                    coordinator.lock().ingest(event);
                }
            }
        }
    }
}

async fn reload_stream(
    repo: &Arc<dyn MessageRepository>,
    channel_id: i64,
    coordinator: &Arc<Mutex<MessageStreamCoordinator>>,
    page_size: usize,
    retry: &RetrySettings,
) {
    coordinator.lock().begin_reload();
    let fetched = retry_fetch(retry, || {
        let repo = repo.clone();
        async move { repo.find_recent(channel_id, page_size).await }
    })
    .await;
    match fetched {
        Ok(history) => coordinator.lock().complete_initial_load(history),
        // Leave the stream stale; pending live events stay buffered
        // until a later reload succeeds.
        Err(err) => warn!(channel_id, error = %err, "history reload failed"),
    }
}
