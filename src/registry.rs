//! Session registry: which connection is registered under which name.
//!
//! The registry is plain data with no interior synchronization. Exclusive
//! access is provided by [`Room`](crate::room::Room), the single actor task
//! that owns it — every mutation and every uniqueness check runs on that
//! task, so two racing joins for the same name can never both succeed.

use thiserror::Error;
use uuid::Uuid;

/// Opaque per-connection token, assigned when the transport connection is
/// accepted and retired when it closes.
pub type ConnectionId = Uuid;

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// Another live session already holds this exact name.
    #[error("name already in use")]
    NameTaken,
    /// The connection already has a session; renaming is not supported.
    #[error("connection already registered")]
    AlreadyRegistered,
}

/// One registered participant.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    id: ConnectionId,
    name: String,
}

/// Join-ordered mapping between connections and display names.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Vec<Session>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `id`.
    ///
    /// Names are matched case-sensitively and exactly; the caller trims and
    /// validates length before registering.
    ///
    /// # Errors
    ///
    /// [`RegisterError::NameTaken`] when another live session holds `name`,
    /// [`RegisterError::AlreadyRegistered`] when `id` already has a session.
    /// The registry is unchanged on error.
    pub fn register(&mut self, id: ConnectionId, name: &str) -> Result<(), RegisterError> {
        if self.sessions.iter().any(|s| s.id == id) {
            return Err(RegisterError::AlreadyRegistered);
        }
        if self.sessions.iter().any(|s| s.name == name) {
            return Err(RegisterError::NameTaken);
        }
        self.sessions.push(Session {
            id,
            name: name.to_owned(),
        });
        Ok(())
    }

    /// Remove the session of `id`, returning the freed name, or `None` when
    /// the connection never joined.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<String> {
        let index = self.sessions.iter().position(|s| s.id == id)?;
        Some(self.sessions.remove(index).name)
    }

    /// The name bound to `id`, if any. No mutation.
    pub fn name_of(&self, id: ConnectionId) -> Option<&str> {
        self.sessions
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.as_str())
    }

    /// Snapshot of all registered names in join order.
    pub fn names(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.name.clone()).collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// `true` when no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn id(n: u128) -> ConnectionId {
        Uuid::from_u128(n)
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = Registry::new();
        registry.register(id(1), "alice").unwrap();
        assert_eq!(registry.name_of(id(1)), Some("alice"));
        assert_eq!(registry.name_of(id(2)), None);
    }

    #[test]
    fn duplicate_name_is_refused() {
        let mut registry = Registry::new();
        registry.register(id(1), "alice").unwrap();
        assert_eq!(
            registry.register(id(2), "alice"),
            Err(RegisterError::NameTaken)
        );
        // The loser stays nameless.
        assert_eq!(registry.name_of(id(2)), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut registry = Registry::new();
        registry.register(id(1), "alice").unwrap();
        registry.register(id(2), "Alice").unwrap();
        assert_eq!(registry.names(), vec!["alice", "Alice"]);
    }

    #[test]
    fn second_register_for_same_connection_is_refused() {
        let mut registry = Registry::new();
        registry.register(id(1), "alice").unwrap();
        assert_eq!(
            registry.register(id(1), "other"),
            Err(RegisterError::AlreadyRegistered)
        );
        assert_eq!(registry.name_of(id(1)), Some("alice"));
    }

    #[test]
    fn unregister_frees_the_name_for_reuse() {
        let mut registry = Registry::new();
        registry.register(id(1), "alice").unwrap();
        assert_eq!(registry.unregister(id(1)), Some("alice".to_owned()));
        assert!(registry.is_empty());

        // A different connection can now claim the freed name.
        registry.register(id(2), "alice").unwrap();
        assert_eq!(registry.name_of(id(2)), Some("alice"));
    }

    #[test]
    fn unregister_without_session_is_a_no_op() {
        let mut registry = Registry::new();
        assert_eq!(registry.unregister(id(7)), None);
    }

    #[test]
    fn names_preserve_join_order() {
        let mut registry = Registry::new();
        registry.register(id(3), "carol").unwrap();
        registry.register(id(1), "alice").unwrap();
        registry.register(id(2), "bob").unwrap();
        assert_eq!(registry.names(), vec!["carol", "alice", "bob"]);

        registry.unregister(id(1));
        assert_eq!(registry.names(), vec!["carol", "bob"]);
    }
}
