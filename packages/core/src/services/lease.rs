//! Single-flight operation leases
//!
//! Push, snapshot, export and import hold a lease on their workspace; pull and
//! restore replace the whole store and hold the store lease, which excludes
//! every workspace lease as well. A second overlapping invocation gets
//! [`ServiceError::Busy`] instead of interleaving.
//!
//! Leases are released when the returned [`LeaseGuard`] drops.

use crate::services::ServiceError;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LeaseScope {
    Store,
    Workspace(String),
}

impl fmt::Display for LeaseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseScope::Store => f.write_str("store"),
            LeaseScope::Workspace(id) => write!(f, "workspace {}", id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperationLeases {
    held: Arc<Mutex<HashSet<LeaseScope>>>,
}

impl OperationLeases {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<LeaseScope>> {
        // A panic while holding the set cannot leave it inconsistent
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn acquire(&self, scope: LeaseScope) -> Result<LeaseGuard, ServiceError> {
        let mut held = self.held();

        let conflict = match &scope {
            LeaseScope::Store => !held.is_empty(),
            LeaseScope::Workspace(_) => held.contains(&LeaseScope::Store) || held.contains(&scope),
        };
        if conflict {
            tracing::warn!(%scope, "Rejected overlapping operation");
            return Err(ServiceError::busy(scope.to_string()));
        }

        held.insert(scope.clone());
        Ok(LeaseGuard {
            held: Arc::clone(&self.held),
            scope,
        })
    }

    pub fn acquire_workspace(&self, workspace_id: &str) -> Result<LeaseGuard, ServiceError> {
        self.acquire(LeaseScope::Workspace(workspace_id.to_string()))
    }

    pub fn is_held(&self, scope: &LeaseScope) -> bool {
        self.held().contains(scope)
    }
}

#[derive(Debug)]
pub struct LeaseGuard {
    held: Arc<Mutex<HashSet<LeaseScope>>>,
    scope: LeaseScope,
}

impl LeaseGuard {
    pub fn scope(&self) -> &LeaseScope {
        &self.scope
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        held.remove(&self.scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_workspace_leases_are_independent() {
        let leases = OperationLeases::new();
        let a = assert_ok!(leases.acquire_workspace("a"));
        let _b = assert_ok!(leases.acquire_workspace("b"));

        assert!(matches!(
            leases.acquire_workspace("a"),
            Err(ServiceError::Busy { .. })
        ));
        drop(a);
        assert_ok!(leases.acquire_workspace("a"));
    }

    #[test]
    fn test_store_lease_excludes_everything() {
        let leases = OperationLeases::new();
        let ws = assert_ok!(leases.acquire_workspace("a"));
        assert_err!(leases.acquire(LeaseScope::Store));
        drop(ws);

        let store = assert_ok!(leases.acquire(LeaseScope::Store));
        assert_err!(leases.acquire_workspace("a"));
        assert!(leases.is_held(store.scope()));
        drop(store);
        assert!(!leases.is_held(&LeaseScope::Store));
    }
}
