//! # Shared Utilities
//!
//! Cross-cutting helpers used by every layer: the core error taxonomy,
//! snowflake ID generation, and validation glue.

pub mod error;
pub mod snowflake;
pub mod validation;

pub use error::{CoreError, ResourceKind};
pub use snowflake::SnowflakeGenerator;
