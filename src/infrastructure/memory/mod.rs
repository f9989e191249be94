//! In-memory reference adapters for every collaborator port. Used by
//! the test suite and by embedders without a backend of their own.

mod feed;
mod ports;
mod store;

pub use feed::InMemoryFeed;
pub use ports::{MemoryIdentity, MemoryObjectStorage};
pub use store::{
    MemoryBackend, MemoryBanRepository, MemoryCategoryRepository, MemoryChannelRepository,
    MemoryInviteRepository, MemoryMemberRepository, MemoryMessageRepository,
    MemoryRoleRepository, MemoryServerRepository,
};
