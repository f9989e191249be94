//! Platform-admin authorization policy.
//!
//! A prioritized list of predicates evaluated in order: role lookup
//! first, then a configurable email allowlist. The allowlist lives in
//! configuration; no credential is ever embedded in code.

use std::collections::HashSet;

use crate::config::AuthorizationSettings;
use crate::domain::value_objects::Rank;

/// Subject of an admin check. `rank` is whatever role lookup the caller
/// performed (None when the user holds no rank in the relevant scope).
#[derive(Debug, Clone)]
pub struct AdminCandidate {
    pub user_id: i64,
    pub email: String,
    pub rank: Option<Rank>,
}

type AdminPredicate = Box<dyn Fn(&AdminCandidate) -> bool + Send + Sync>;

/// Ordered admin-check strategies.
pub struct AdminPolicy {
    strategies: Vec<AdminPredicate>,
}

impl AdminPolicy {
    /// The standard two-strategy policy: rank lookup, then allowlist.
    pub fn from_settings(settings: &AuthorizationSettings) -> Self {
        let allowlist: HashSet<String> = settings
            .admin_emails
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();

        Self {
            strategies: vec![
                Box::new(|c: &AdminCandidate| c.rank.is_some_and(|r| r >= Rank::Admin)),
                Box::new(move |c: &AdminCandidate| {
                    allowlist.contains(&c.email.to_ascii_lowercase())
                }),
            ],
        }
    }

    /// Append a custom strategy, evaluated after the standard ones.
    pub fn with_strategy(
        mut self,
        predicate: impl Fn(&AdminCandidate) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.strategies.push(Box::new(predicate));
        self
    }

    /// Evaluate strategies in priority order, short-circuiting on the
    /// first match.
    pub fn is_admin(&self, candidate: &AdminCandidate) -> bool {
        self.strategies.iter().any(|check| check(candidate))
    }
}
