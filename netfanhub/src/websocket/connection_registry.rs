use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::websocket::connection::{Connection, Identity};

/// Outcome of [`ConnectionRegistry::conditional_remove`].
#[derive(Debug, Clone)]
pub enum Removal {
    /// The expected connection was registered and has been removed.
    Removed,
    /// A different (newer) connection owns the identity; nothing was removed.
    DoesNotMatch(Arc<Connection>),
    /// No connection is registered for the identity.
    AlreadyAbsent,
}

/// Registry of the single live connection per identity.
///
/// Every operation takes the lock exactly once, so operations are atomic with
/// respect to each other.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Identity, Arc<Connection>>>>,
}

impl ConnectionRegistry {
    /// Create a new empty connection registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` for `identity`, replacing whatever was there.
    ///
    /// The replaced connection is returned but left open; its own session is
    /// responsible for closing it.
    pub async fn upsert(
        &self,
        identity: Identity,
        connection: Arc<Connection>,
    ) -> Option<Arc<Connection>> {
        let previous = self
            .connections
            .write()
            .await
            .insert(identity.clone(), connection.clone());
        match &previous {
            Some(prev) if !Arc::ptr_eq(prev, &connection) => {
                tracing::info!(
                    identity = %identity,
                    connection_id = %connection.id(),
                    superseded = %prev.id(),
                    "Connection superseded an earlier one for the same identity"
                );
            }
            Some(_) => {}
            None => {
                tracing::debug!(
                    identity = %identity,
                    connection_id = %connection.id(),
                    "Connection registered"
                );
            }
        }
        previous
    }

    /// Remove the entry for `identity` only if it is exactly `expected`
    /// (pointer identity, not value equality).
    pub async fn conditional_remove(
        &self,
        identity: &Identity,
        expected: &Arc<Connection>,
    ) -> Removal {
        let mut connections = self.connections.write().await;
        match connections.get(identity) {
            Some(current) if Arc::ptr_eq(current, expected) => {
                connections.remove(identity);
                Removal::Removed
            }
            Some(current) => Removal::DoesNotMatch(current.clone()),
            None => Removal::AlreadyAbsent,
        }
    }

    /// Make sure `connection` is still registered for `identity` after a stale
    /// session's teardown.
    ///
    /// The entry is written only while `connection` is open and no connection
    /// accepted after it holds the slot, so a later reconnection is never
    /// displaced and a finished session is never resurrected. The state is
    /// read under the lock: a session marks itself closing before its own
    /// `conditional_remove` can take the lock.
    pub async fn reinstate(&self, identity: &Identity, connection: &Arc<Connection>) -> bool {
        let mut connections = self.connections.write().await;
        if !connection.is_open() {
            return false;
        }
        match connections.entry(identity.clone()) {
            Entry::Occupied(mut slot) => {
                if Arc::ptr_eq(slot.get(), connection) {
                    true
                } else if slot.get().id() < connection.id() {
                    slot.insert(connection.clone());
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(connection.clone());
                true
            }
        }
    }

    /// All registered connections at one consistent point in time.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Get the connection registered for an identity
    pub async fn get(&self, identity: &Identity) -> Option<Arc<Connection>> {
        self.connections.read().await.get(identity).cloned()
    }

    /// Get the count of currently registered connections
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::tests::memory_sink;

    fn connection(identity: &str) -> Arc<Connection> {
        let (sink, _rx) = memory_sink();
        Arc::new(Connection::new(Identity::from(identity), sink))
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_entry_per_identity() {
        let registry = ConnectionRegistry::new();
        let first = connection("u1");
        let second = connection("u1");

        assert!(registry.upsert(Identity::from("u1"), first.clone()).await.is_none());
        let replaced = registry.upsert(Identity::from("u1"), second.clone()).await;

        assert!(Arc::ptr_eq(&replaced.unwrap(), &first));
        assert_eq!(registry.count().await, 1);
        assert!(first.is_open());
        let current = registry.get(&Identity::from("u1")).await.unwrap();
        assert!(Arc::ptr_eq(&current, &second));
    }

    #[tokio::test]
    async fn test_upsert_same_pair_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let conn = connection("u1");

        registry.upsert(Identity::from("u1"), conn.clone()).await;
        registry.upsert(Identity::from("u1"), conn.clone()).await;

        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_conditional_remove_matching() {
        let registry = ConnectionRegistry::new();
        let conn = connection("u1");
        registry.upsert(Identity::from("u1"), conn.clone()).await;

        let removal = registry
            .conditional_remove(&Identity::from("u1"), &conn)
            .await;

        assert!(matches!(removal, Removal::Removed));
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_stale_remove_keeps_newer_connection() {
        let registry = ConnectionRegistry::new();
        let identity = Identity::from("u1");
        let stale = connection("u1");
        let newer = connection("u1");
        registry.upsert(identity.clone(), stale.clone()).await;
        registry.upsert(identity.clone(), newer.clone()).await;

        let removal = registry.conditional_remove(&identity, &stale).await;

        match removal {
            Removal::DoesNotMatch(current) => assert!(Arc::ptr_eq(&current, &newer)),
            other => panic!("unexpected removal outcome: {other:?}"),
        }
        let current = registry.get(&identity).await.unwrap();
        assert!(Arc::ptr_eq(&current, &newer));
    }

    #[tokio::test]
    async fn test_conditional_remove_absent() {
        let registry = ConnectionRegistry::new();
        let conn = connection("u1");

        let removal = registry
            .conditional_remove(&Identity::from("u1"), &conn)
            .await;

        assert!(matches!(removal, Removal::AlreadyAbsent));
    }

    #[tokio::test]
    async fn test_reinstate_never_displaces_a_later_connection() {
        let registry = ConnectionRegistry::new();
        let identity = Identity::from("u1");
        let older = connection("u1");
        let latest = connection("u1");
        registry.upsert(identity.clone(), latest.clone()).await;

        assert!(!registry.reinstate(&identity, &older).await);
        let current = registry.get(&identity).await.unwrap();
        assert!(Arc::ptr_eq(&current, &latest));
    }

    #[tokio::test]
    async fn test_reinstate_restores_overwritten_entry() {
        let registry = ConnectionRegistry::new();
        let identity = Identity::from("u1");
        let stale = connection("u1");
        let newer = connection("u1");
        registry.upsert(identity.clone(), newer.clone()).await;
        registry.upsert(identity.clone(), stale.clone()).await;

        assert!(registry.reinstate(&identity, &newer).await);
        let current = registry.get(&identity).await.unwrap();
        assert!(Arc::ptr_eq(&current, &newer));
    }

    #[tokio::test]
    async fn test_reinstate_skips_closed_connection() {
        let registry = ConnectionRegistry::new();
        let identity = Identity::from("u1");
        let finished = connection("u1");
        finished.mark_closing();

        assert!(!registry.reinstate(&identity, &finished).await);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_reinstate_rechecks_state_under_lock() {
        let registry = ConnectionRegistry::new();
        let identity = Identity::from("u1");
        let newer = connection("u1");

        let guard = registry.connections.write().await;
        let pending = {
            let registry = registry.clone();
            let identity = identity.clone();
            let newer = newer.clone();
            tokio::spawn(async move { registry.reinstate(&identity, &newer).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        // The newer session starts its teardown while the reinstate waits.
        newer.mark_closing();
        drop(guard);

        assert!(!pending.await.unwrap());
        assert!(registry.get(&identity).await.is_none());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_snapshot_has_one_connection_per_identity() {
        let registry = ConnectionRegistry::new();
        for identity in ["u1", "u2", "u1", "u3"] {
            registry
                .upsert(Identity::from(identity), connection(identity))
                .await;
        }

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 3);
    }
}
