//! In-memory identity and object-storage adapters.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::ports::{Identity, ObjectStorage, UserIdentity};
use crate::shared::error::{CoreError, ResourceKind};

/// Token-to-identity map standing in for the auth collaborator.
#[derive(Default)]
pub struct MemoryIdentity {
    sessions: DashMap<String, UserIdentity>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: impl Into<String>, user: UserIdentity) {
        self.sessions.insert(token.into(), user);
    }
}

#[async_trait]
impl Identity for MemoryIdentity {
    async fn resolve(&self, session_token: &str) -> Result<UserIdentity, CoreError> {
        self.sessions
            .get(session_token)
            .map(|entry| entry.clone())
            .ok_or(CoreError::NotFound(ResourceKind::User))
    }
}

/// Blob store returning `memory://` reference URLs.
#[derive(Default)]
pub struct MemoryObjectStorage {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blob(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.get(key).map(|entry| entry.clone())
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, CoreError> {
        self.blobs.insert(key.to_string(), bytes);
        Ok(format!("memory://{key}"))
    }
}
