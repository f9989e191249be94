//! # Value Objects
//!
//! Immutable value types used across the domain: the capability bitfield
//! and the built-in rank union.

mod capabilities;
mod rank;

pub use capabilities::Capabilities;
pub use rank::Rank;
