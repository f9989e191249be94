//! # Infrastructure Layer
//!
//! Adapter implementations of the collaborator ports. Durable storage
//! lives outside this crate; what ships here is the in-memory reference
//! stack.

pub mod memory;
