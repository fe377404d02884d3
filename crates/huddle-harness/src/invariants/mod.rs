//! Properties every simulated client must satisfy.
//!
//! [`SimWorld::check_invariants`](crate::SimWorld::check_invariants)
//! captures each client into a [`SystemSnapshot`] and the
//! [`InvariantRegistry`] runs its checks against it:
//!
//! - [`UniqueServerIds`]: at-least-once delivery never shows a message twice
//! - [`ConfirmedPrefixFirst`]: provisional and failed sends only occupy the tail
//! - [`NoSelfTyping`]: the local user is never listed as a typist
//! - [`LocalTokensUnique`]: optimistic sends never share a local token

mod checks;
mod snapshot;

pub use checks::{ConfirmedPrefixFirst, LocalTokensUnique, NoSelfTyping, UniqueServerIds};
pub use snapshot::{ClientSnapshot, RoomSnapshot, SystemSnapshot};
use thiserror::Error;

/// Outcome of a single check.
pub type InvariantResult = Result<(), Violation>;

/// A check that failed, with the offending client and room spelled out in
/// `message`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{invariant}: {message}")]
pub struct Violation {
    /// Name of the check.
    pub invariant: &'static str,
    /// What the snapshot showed.
    pub message: String,
}

/// A property of a [`SystemSnapshot`].
pub trait Invariant: Send + Sync {
    /// Stable name, used in violation reports.
    fn name(&self) -> &'static str;

    /// Inspect `state`.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Checks run against every snapshot of a simulation.
#[derive(Default)]
pub struct InvariantRegistry {
    checks: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Registry with no checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// The message and presence checks listed in the module docs.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(UniqueServerIds);
        registry.add(ConfirmedPrefixFirst);
        registry.add(NoSelfTyping);
        registry.add(LocalTokensUnique);
        registry
    }

    /// Register another check.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.checks.push(Box::new(invariant));
    }

    /// Run every check. Collects all violations rather than stopping at the
    /// first.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.checks.iter().filter_map(|check| check.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Run every check and fail the test on any violation.
    ///
    /// # Panics
    ///
    /// Panics listing every violation, prefixed by `context`.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let report: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariant violated {context}:\n  {}", report.join("\n  "));
        }
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether no checks are registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use huddle_core::{RoomId, UserId};

    use super::*;

    fn typing_self() -> SystemSnapshot {
        SystemSnapshot::single(ClientSnapshot {
            id: 3,
            user_id: UserId::new("alice").unwrap(),
            connection: None,
            selected_room: None,
            rooms: BTreeMap::from([(
                RoomId::new("general").unwrap(),
                RoomSnapshot { messages: Vec::new(), self_typing: true },
            )]),
        })
    }

    #[test]
    fn standard_registry_passes_empty_world() {
        let registry = InvariantRegistry::standard();

        assert_eq!(registry.len(), 4);
        assert!(registry.check_all(&SystemSnapshot::empty()).is_ok());
        assert!(InvariantRegistry::new().is_empty());
    }

    #[test]
    fn violations_are_named() {
        let violations = InvariantRegistry::standard().check_all(&typing_self()).unwrap_err();

        assert_eq!(violations.len(), 1);
        assert!(violations[0].to_string().starts_with("no_self_typing: client 3"));
    }

    #[test]
    #[should_panic(expected = "invariant violated after typing")]
    fn assert_all_reports_context() {
        InvariantRegistry::standard().assert_all(&typing_self(), "after typing");
    }
}
