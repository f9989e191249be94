//! Identity and object-storage collaborator ports.

use async_trait::async_trait;

use crate::shared::error::CoreError;

/// Stable identity resolved from an opaque session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: i64,
    pub email: String,
}

/// Identity collaborator: session token in, stable user id and email out.
/// The core treats the token as opaque and never issues sessions itself.
#[async_trait]
pub trait Identity: Send + Sync {
    async fn resolve(&self, session_token: &str) -> Result<UserIdentity, CoreError>;
}

/// Object-storage collaborator for avatars, icons, and banners.
///
/// Accepts a binary blob under a key and returns a public reference URL.
/// The core stores only the returned reference, never the blob.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, CoreError>;
}
