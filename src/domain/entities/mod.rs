//! # Domain Entities
//!
//! Core entities of the guild communication core. Each entity file also
//! carries its repository trait; the traits are the persistence port and
//! are implemented by the embedder's storage adapter (an in-memory
//! reference adapter lives in the infrastructure layer).
//!
//! ## Core Entities
//!
//! - **Server**: a tenant containing channels, members, and roles
//! - **Member**: a user's membership in one server (rank + custom roles)
//! - **CustomRole**: a named capability grant scoped to one server
//! - **Category** / **Channel**: the ordered directory tree
//! - **Message**: a text message with authoritative `created_at` ordering
//! - **Invite**: a redeemable token with usage/expiry limits
//! - **Ban**: a moderation record blocking membership
//! - **PresenceState**: coarse availability, tracked in memory only

mod ban;
mod category;
mod channel;
mod invite;
mod member;
mod message;
mod presence;
mod role;
mod server;

pub use ban::{Ban, BanRepository};
pub use category::{Category, CategoryRepository};
pub use channel::{Channel, ChannelRepository, ChannelType};
pub use invite::{Invite, InviteRepository, CODE_ALPHABET};
pub use member::{Member, MemberRepository};
pub use message::{Message, MessageDraft, MessageRepository};
pub use presence::{PresenceState, PresenceUpdate};
pub use role::{CustomRole, RoleRepository};
pub use server::{Server, ServerRepository};
