//! Application services composing domain logic over the collaborator
//! ports.

mod directory_service;
mod invite_service;
mod membership_service;

pub use directory_service::{
    CategoryNode, CreateChannelPayload, DirectoryService, DirectoryTree, DirectoryView,
    UpdateChannelPayload,
};
pub use invite_service::InviteService;
pub use membership_service::{
    CreateServerPayload, MembershipService, RolePayload, UpdateServerPayload,
};
