//! Capability flags.
//!
//! Capabilities are represented as a bitfield where each bit grants one
//! named operation. Custom roles store the full set of bits explicitly,
//! so a role that leaves a bit clear is an explicit revocation of that
//! capability for members holding it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(pub i64);

impl Capabilities {
    /// Allows renaming the server and editing its profile
    pub const MANAGE_SERVER: i64 = 1 << 0;
    /// Allows creating, editing, reordering, and deleting categories and channels
    pub const MANAGE_CHANNELS: i64 = 1 << 1;
    /// Allows editing custom roles and member rank/role assignments
    pub const MANAGE_ROLES: i64 = 1 << 2;
    /// Allows removing members from the server
    pub const KICK_MEMBERS: i64 = 1 << 3;
    /// Allows banning and unbanning members
    pub const BAN_MEMBERS: i64 = 1 << 4;
    /// Allows sending messages in text channels
    pub const SEND_MESSAGES: i64 = 1 << 5;
    /// Allows joining voice channels
    pub const CONNECT_VOICE: i64 = 1 << 6;

    /// All capabilities combined
    pub const ALL: i64 = (1 << 7) - 1;

    /// Defaults held by members with no custom roles
    pub const DEFAULT: i64 = Self::SEND_MESSAGES | Self::CONNECT_VOICE;

    /// Create a new Capabilities instance.
    pub const fn new(bits: i64) -> Self {
        Self(bits)
    }

    /// Create an empty capability set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create a capability set with all flags set.
    pub const fn all() -> Self {
        Self(Self::ALL)
    }

    /// The default grants for a member with no custom roles.
    pub const fn defaults() -> Self {
        Self(Self::DEFAULT)
    }

    /// Check if every bit of `capability` is set.
    pub const fn has(&self, capability: i64) -> bool {
        self.0 & capability == capability
    }

    /// Add a capability.
    pub fn grant(&mut self, capability: i64) {
        self.0 |= capability;
    }

    /// Remove a capability.
    pub fn revoke(&mut self, capability: i64) {
        self.0 &= !capability;
    }

    /// Combine with another set (permissive union).
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Get the raw bits.
    pub const fn bits(&self) -> i64 {
        self.0
    }

    /// Whether no capability is set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Capabilities {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Capabilities> for i64 {
    fn from(caps: Capabilities) -> Self {
        caps.0
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for Capabilities {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}
