//! # Application Layer
//!
//! Composes the domain into the running core: membership, invites, and
//! directory services; the presence tracker; the per-channel message
//! stream coordinator; and the guild session that binds one client to
//! one server context.

pub mod presence;
pub mod services;
pub mod session;
pub mod stream;

pub use presence::PresenceTracker;
pub use session::{GuildSession, SessionDeps};
pub use stream::{MessageStreamCoordinator, PendingMessage, StreamEntry};
