//! Directory Service
//!
//! Maintains the ordered category/channel tree per server. Positions are
//! append-only ordering keys: creation takes `max(scope) + 1`, values
//! are never reused after deletion, and reorders are last-writer-wins
//! integer updates. The read side is always a valid total order with
//! ties broken by id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use validator::Validate;

use crate::domain::entities::{
    Category, CategoryRepository, Channel, ChannelRepository, ChannelType, MemberRepository,
    RoleRepository, ServerRepository,
};
use crate::domain::events::{ChangeEvent, ChangeOp, ChangeRow};
use crate::domain::services::PermissionService;
use crate::domain::value_objects::Capabilities;
use crate::shared::error::{CoreError, ResourceKind};
use crate::shared::snowflake::SnowflakeGenerator;
use crate::shared::validation::validation_error;

/// Request payload for creating a channel.
#[derive(Debug, Clone, Validate)]
pub struct CreateChannelPayload {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: String,
    pub kind: ChannelType,
    pub category_id: Option<i64>,
    #[validate(length(max = 1024, message = "must be at most 1024 characters"))]
    pub topic: Option<String>,
}

/// Request payload for renaming a channel or editing its topic.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateChannelPayload {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 1024, message = "must be at most 1024 characters"))]
    pub topic: Option<String>,
}

/// One category with its channels, in display order.
#[derive(Debug, Clone)]
pub struct CategoryNode {
    pub category: Category,
    pub channels: Vec<Channel>,
}

/// The ordered directory of one server.
///
/// Categories sort by `(position, id)`; channels within a category by
/// `(position, id)`; uncategorized channels come after every categorized
/// one, ordered by `(position, id)` among themselves.
#[derive(Debug, Clone, Default)]
pub struct DirectoryTree {
    pub categories: Vec<CategoryNode>,
    pub uncategorized: Vec<Channel>,
}

impl DirectoryTree {
    pub fn build(mut categories: Vec<Category>, channels: Vec<Channel>) -> Self {
        categories.sort_by_key(|c| (c.position, c.id));
        let known: HashMap<i64, usize> = categories
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.id, idx))
            .collect();

        let mut nodes: Vec<CategoryNode> = categories
            .into_iter()
            .map(|category| CategoryNode {
                category,
                channels: Vec::new(),
            })
            .collect();
        let mut uncategorized = Vec::new();

        for channel in channels {
            // A dangling category reference reads as top-level.
            match channel.category_id.and_then(|id| known.get(&id)) {
                Some(&idx) => nodes[idx].channels.push(channel),
                None => uncategorized.push(channel),
            }
        }

        for node in &mut nodes {
            node.channels.sort_by_key(|c| (c.position, c.id));
        }
        uncategorized.sort_by_key(|c| (c.position, c.id));

        Self {
            categories: nodes,
            uncategorized,
        }
    }

    /// All channels in display order.
    pub fn flattened(&self) -> Vec<&Channel> {
        self.categories
            .iter()
            .flat_map(|node| node.channels.iter())
            .chain(self.uncategorized.iter())
            .collect()
    }
}

/// Local replica of one server's directory, kept current by applying
/// change-feed events. No manual refresh path exists: the feed is the
/// only source of updates after the initial load.
#[derive(Debug, Default)]
pub struct DirectoryView {
    categories: HashMap<i64, Category>,
    channels: HashMap<i64, Channel>,
    stale: bool,
}

impl DirectoryView {
    /// Replace the replica wholesale from a fresh load.
    pub fn reset(&mut self, categories: Vec<Category>, channels: Vec<Channel>) {
        self.categories = categories.into_iter().map(|c| (c.id, c)).collect();
        self.channels = channels.into_iter().map(|c| (c.id, c)).collect();
        self.stale = false;
    }

    /// Apply one feed event. Events for other tables are ignored.
    pub fn apply(&mut self, event: &ChangeEvent) {
        match (&event.op, &event.row) {
            (ChangeOp::Delete, ChangeRow::Category(category)) => {
                self.categories.remove(&category.id);
                // Contained channels survive and become top-level.
                for channel in self.channels.values_mut() {
                    if channel.category_id == Some(category.id) {
                        channel.category_id = None;
                    }
                }
            }
            (_, ChangeRow::Category(category)) => {
                self.categories.insert(category.id, category.clone());
            }
            (ChangeOp::Delete, ChangeRow::Channel(channel)) => {
                self.channels.remove(&channel.id);
            }
            (_, ChangeRow::Channel(channel)) => {
                self.channels.insert(channel.id, channel.clone());
            }
            _ => {}
        }
    }

    pub fn channel(&self, id: i64) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn tree(&self) -> DirectoryTree {
        DirectoryTree::build(
            self.categories.values().cloned().collect(),
            self.channels.values().cloned().collect(),
        )
    }

    /// Replace only the category half of the replica (scope resync).
    pub fn set_categories(&mut self, categories: Vec<Category>) {
        self.categories = categories.into_iter().map(|c| (c.id, c)).collect();
    }

    /// Replace only the channel half of the replica (scope resync).
    pub fn set_channels(&mut self, channels: Vec<Channel>) {
        self.channels = channels.into_iter().map(|c| (c.id, c)).collect();
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn clear_stale(&mut self) {
        self.stale = false;
    }

    /// True while the replica may lag the feed (disconnect observed).
    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

/// Category/channel administration.
pub struct DirectoryService<S: ?Sized, M: ?Sized, R: ?Sized, Cat: ?Sized, Ch: ?Sized> {
    server_repo: Arc<S>,
    member_repo: Arc<M>,
    role_repo: Arc<R>,
    category_repo: Arc<Cat>,
    channel_repo: Arc<Ch>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl<S, M, R, Cat, Ch> DirectoryService<S, M, R, Cat, Ch>
where
    S: ServerRepository + ?Sized,
    M: MemberRepository + ?Sized,
    R: RoleRepository + ?Sized,
    Cat: CategoryRepository + ?Sized,
    Ch: ChannelRepository + ?Sized,
{
    pub fn new(
        server_repo: Arc<S>,
        member_repo: Arc<M>,
        role_repo: Arc<R>,
        category_repo: Arc<Cat>,
        channel_repo: Arc<Ch>,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            server_repo,
            member_repo,
            role_repo,
            category_repo,
            channel_repo,
            id_generator,
        }
    }

    async fn require_manage_channels(
        &self,
        server_id: i64,
        actor_id: i64,
    ) -> Result<(), CoreError> {
        let server = self
            .server_repo
            .find_by_id(server_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Server))?;
        let actor = self
            .member_repo
            .find(server_id, actor_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Member))?;
        let roles = self.role_repo.find_by_server(server_id).await?;
        PermissionService::require(&actor, &server, &roles, Capabilities::MANAGE_CHANNELS)
    }

    /// Load one server's full directory. All members see all channels.
    pub async fn load(&self, server_id: i64) -> Result<(Vec<Category>, Vec<Channel>), CoreError> {
        let categories = self.category_repo.find_by_server(server_id).await?;
        let channels = self.channel_repo.find_by_server(server_id).await?;
        Ok((categories, channels))
    }

    /// Create a category at the next append position.
    pub async fn create_category(
        &self,
        server_id: i64,
        actor_id: i64,
        name: String,
    ) -> Result<Category, CoreError> {
        if name.trim().is_empty() || name.len() > 100 {
            return Err(CoreError::validation("name must be 1-100 characters"));
        }
        self.require_manage_channels(server_id, actor_id).await?;

        let position = self.category_repo.next_position(server_id).await?;
        let category = Category {
            id: self.id_generator.generate(),
            server_id,
            name,
            position,
        };
        let category = self.category_repo.create(&category).await?;
        info!(server_id, category_id = category.id, "category created");
        Ok(category)
    }

    pub async fn rename_category(
        &self,
        category_id: i64,
        actor_id: i64,
        name: String,
    ) -> Result<Category, CoreError> {
        if name.trim().is_empty() || name.len() > 100 {
            return Err(CoreError::validation("name must be 1-100 characters"));
        }
        let mut category = self
            .category_repo
            .find_by_id(category_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Category))?;
        self.require_manage_channels(category.server_id, actor_id)
            .await?;

        category.name = name;
        self.category_repo.update(&category).await
    }

    /// Move a category to a new position (last writer wins).
    pub async fn reorder_category(
        &self,
        category_id: i64,
        actor_id: i64,
        position: i32,
    ) -> Result<Category, CoreError> {
        let mut category = self
            .category_repo
            .find_by_id(category_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Category))?;
        self.require_manage_channels(category.server_id, actor_id)
            .await?;

        category.position = position;
        self.category_repo.update(&category).await
    }

    /// Delete a category. Its channels are reparented to top level,
    /// keeping their identity and message history.
    pub async fn delete_category(&self, category_id: i64, actor_id: i64) -> Result<(), CoreError> {
        let category = self
            .category_repo
            .find_by_id(category_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Category))?;
        self.require_manage_channels(category.server_id, actor_id)
            .await?;

        let channels = self.channel_repo.find_by_server(category.server_id).await?;
        for mut channel in channels {
            if channel.category_id == Some(category_id) {
                channel.category_id = None;
                self.channel_repo.update(&channel).await?;
            }
        }

        self.category_repo.delete(category_id).await?;
        info!(category_id, "category deleted, channels reparented");
        Ok(())
    }

    /// Create a channel at the next append position of its scope.
    pub async fn create_channel(
        &self,
        server_id: i64,
        actor_id: i64,
        payload: CreateChannelPayload,
    ) -> Result<Channel, CoreError> {
        payload.validate().map_err(validation_error)?;
        self.require_manage_channels(server_id, actor_id).await?;

        if let Some(category_id) = payload.category_id {
            let category = self
                .category_repo
                .find_by_id(category_id)
                .await?
                .ok_or(CoreError::NotFound(ResourceKind::Category))?;
            if category.server_id != server_id {
                return Err(CoreError::NotFound(ResourceKind::Category));
            }
        }

        let position = self
            .channel_repo
            .next_position(server_id, payload.category_id)
            .await?;
        let channel = Channel {
            id: self.id_generator.generate(),
            server_id,
            category_id: payload.category_id,
            name: payload.name,
            kind: payload.kind,
            position,
            topic: payload.topic,
            created_at: Utc::now(),
        };
        let channel = self.channel_repo.create(&channel).await?;
        info!(server_id, channel_id = channel.id, "channel created");
        Ok(channel)
    }

    pub async fn update_channel(
        &self,
        channel_id: i64,
        actor_id: i64,
        payload: UpdateChannelPayload,
    ) -> Result<Channel, CoreError> {
        payload.validate().map_err(validation_error)?;

        let mut channel = self
            .channel_repo
            .find_by_id(channel_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Channel))?;
        self.require_manage_channels(channel.server_id, actor_id)
            .await?;

        if let Some(name) = payload.name {
            channel.name = name;
        }
        if payload.topic.is_some() {
            channel.topic = payload.topic;
        }
        self.channel_repo.update(&channel).await
    }

    /// Move a channel to a new position within its scope (last writer
    /// wins).
    pub async fn reorder_channel(
        &self,
        channel_id: i64,
        actor_id: i64,
        position: i32,
    ) -> Result<Channel, CoreError> {
        let mut channel = self
            .channel_repo
            .find_by_id(channel_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Channel))?;
        self.require_manage_channels(channel.server_id, actor_id)
            .await?;

        channel.position = position;
        self.channel_repo.update(&channel).await
    }

    /// Move a channel into a (possibly null) category, appending at that
    /// scope's next position.
    pub async fn move_channel(
        &self,
        channel_id: i64,
        actor_id: i64,
        category_id: Option<i64>,
    ) -> Result<Channel, CoreError> {
        let mut channel = self
            .channel_repo
            .find_by_id(channel_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Channel))?;
        self.require_manage_channels(channel.server_id, actor_id)
            .await?;

        if let Some(target) = category_id {
            let category = self
                .category_repo
                .find_by_id(target)
                .await?
                .ok_or(CoreError::NotFound(ResourceKind::Category))?;
            if category.server_id != channel.server_id {
                return Err(CoreError::NotFound(ResourceKind::Category));
            }
        }

        channel.position = self
            .channel_repo
            .next_position(channel.server_id, category_id)
            .await?;
        channel.category_id = category_id;
        self.channel_repo.update(&channel).await
    }

    pub async fn delete_channel(&self, channel_id: i64, actor_id: i64) -> Result<(), CoreError> {
        let channel = self
            .channel_repo
            .find_by_id(channel_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Channel))?;
        self.require_manage_channels(channel.server_id, actor_id)
            .await?;

        self.channel_repo.delete(channel_id).await
    }
}
