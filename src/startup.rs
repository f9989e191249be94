//! Platform wiring.
//!
//! Builds the dependency bundle a [`GuildSession`] is constructed over.
//! The in-memory constructors wire the reference adapters; an embedder
//! with a real backend assembles [`SessionDeps`] from its own adapters
//! instead.

use std::sync::Arc;

use crate::application::presence::PresenceTracker;
use crate::application::session::{GuildSession, SessionDeps};
use crate::config::Settings;
use crate::domain::ports::UserIdentity;
use crate::domain::services::AdminPolicy;
use crate::infrastructure::memory::{
    InMemoryFeed, MemoryBackend, MemoryBanRepository, MemoryCategoryRepository,
    MemoryChannelRepository, MemoryInviteRepository, MemoryMemberRepository,
    MemoryMessageRepository, MemoryRoleRepository, MemoryServerRepository,
};
use crate::shared::snowflake::SnowflakeGenerator;

/// A fully wired in-memory core: shared backend, change feed, presence
/// tracker, and settings. Every session minted from one platform
/// observes the same state, so multiple sessions converge through the
/// same feed exactly as the concurrency model requires.
pub struct CorePlatform {
    backend: Arc<MemoryBackend>,
    feed: Arc<InMemoryFeed>,
    presence: Arc<PresenceTracker>,
    settings: Arc<Settings>,
    admin_policy: Arc<AdminPolicy>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl CorePlatform {
    /// In-memory platform with default settings.
    pub fn in_memory() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let feed = Arc::new(InMemoryFeed::new());
        let backend = Arc::new(MemoryBackend::new(feed.clone()));
        Self::assemble(backend, feed, settings)
    }

    /// Variant whose backend echoes client correlation ids, like a
    /// store with idempotency-key support.
    pub fn with_correlation_echo() -> Self {
        let feed = Arc::new(InMemoryFeed::new());
        let backend = Arc::new(MemoryBackend::with_correlation_echo(feed.clone()));
        Self::assemble(backend, feed, Settings::default())
    }

    fn assemble(backend: Arc<MemoryBackend>, feed: Arc<InMemoryFeed>, settings: Settings) -> Self {
        let admin_policy = Arc::new(AdminPolicy::from_settings(&settings.authorization));
        let id_generator = Arc::new(SnowflakeGenerator::new(u64::from(
            settings.snowflake.machine_id,
        )));
        Self {
            backend,
            feed,
            presence: Arc::new(PresenceTracker::new()),
            settings: Arc::new(settings),
            admin_policy,
            id_generator,
        }
    }

    pub fn backend(&self) -> Arc<MemoryBackend> {
        self.backend.clone()
    }

    pub fn feed(&self) -> Arc<InMemoryFeed> {
        self.feed.clone()
    }

    pub fn presence(&self) -> Arc<PresenceTracker> {
        self.presence.clone()
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.clone()
    }

    /// The dependency bundle sessions are constructed over.
    pub fn session_deps(&self) -> SessionDeps {
        SessionDeps {
            servers: Arc::new(MemoryServerRepository::new(self.backend.clone())),
            members: Arc::new(MemoryMemberRepository::new(self.backend.clone())),
            roles: Arc::new(MemoryRoleRepository::new(self.backend.clone())),
            categories: Arc::new(MemoryCategoryRepository::new(self.backend.clone())),
            channels: Arc::new(MemoryChannelRepository::new(self.backend.clone())),
            invites: Arc::new(MemoryInviteRepository::new(self.backend.clone())),
            messages: Arc::new(MemoryMessageRepository::new(self.backend.clone())),
            bans: Arc::new(MemoryBanRepository::new(self.backend.clone())),
            feed: self.feed.clone(),
            presence: self.presence.clone(),
            settings: self.settings.clone(),
            admin_policy: self.admin_policy.clone(),
            id_generator: self.id_generator.clone(),
        }
    }

    /// Mint a session for an already-resolved identity.
    pub fn session(&self, identity: UserIdentity) -> GuildSession {
        GuildSession::new(identity, self.session_deps())
    }
}
