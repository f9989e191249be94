//! # Guild Communication Core
//!
//! Storage- and transport-agnostic core of a multi-tenant guild chat
//! platform: permission resolution over ranks and custom roles, invite
//! lifecycle, the ordered category/channel directory, presence, and the
//! optimistic message stream reconciled against an authoritative change
//! feed.
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: entities, value objects, repository traits, and
//!   the permission model
//! - **Application Layer**: membership/invite/directory services, the
//!   presence tracker, the message stream coordinator, and the guild
//!   session composition root
//! - **Infrastructure Layer**: in-memory reference adapters for the
//!   collaborator ports (persistence, change feed, identity, storage)
//!
//! ## Module Structure
//!
//! ```text
//! guild_core/
//! +-- config/         Configuration management
//! +-- domain/         Entities, value objects, ports, permission model
//! +-- application/    Services, presence, stream, guild session
//! +-- infrastructure/ In-memory reference adapters
//! +-- shared/         Errors, snowflake IDs, validation glue
//! ```

// Configuration module
pub mod config;

// Domain layer - core business logic
pub mod domain;

// Application layer - services and the session composition root
pub mod application;

// Infrastructure layer - reference adapters
pub mod infrastructure;

// Shared utilities
pub mod shared;

// Platform wiring
pub mod startup;

// Telemetry and observability
pub mod telemetry;
