//! Containers owned by the running process.

use std::collections::BTreeSet;

use dashmap::DashMap;

use crate::engine::CleanupPolicy;

/// Maps container IDs created by this process to their cleanup policy.
///
/// Safe to share between concurrent lifecycle calls; every operation is a
/// single map access.
#[derive(Debug, Default)]
pub struct OwnershipRegistry {
    records: DashMap<String, CleanupPolicy>,
}

impl OwnershipRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record ownership of `id`, replacing any earlier policy.
    pub fn register(&self, id: impl Into<String>, policy: CleanupPolicy) {
        let id = id.into();
        tracing::debug!(container = %id, ?policy, "Registered container");
        self.records.insert(id, policy);
    }

    /// Forget `id`. Returns the policy it was registered with, if any.
    pub fn unregister(&self, id: &str) -> Option<CleanupPolicy> {
        let removed = self.records.remove(id).map(|(_, policy)| policy);
        if removed.is_some() {
            tracing::debug!(container = %id, "Unregistered container");
        }
        removed
    }

    /// Snapshot of every registered ID.
    #[must_use]
    pub fn list_registered(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }

    /// Snapshot of IDs registered with [`CleanupPolicy::CleanUpOnRemove`].
    #[must_use]
    pub fn cleanup_eligible(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .filter(|r| r.value().is_eligible())
            .map(|r| r.key().clone())
            .collect()
    }

    /// Policy for `id`, if registered.
    #[must_use]
    pub fn policy(&self, id: &str) -> Option<CleanupPolicy> {
        self.records.get(id).map(|r| *r.value())
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Number of registered containers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn register_overwrites() {
        let registry = OwnershipRegistry::new();
        registry.register("a", CleanupPolicy::CleanUpOnRemove);
        registry.register("a", CleanupPolicy::LeaveInPlace);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.policy("a"), Some(CleanupPolicy::LeaveInPlace));
    }

    #[test]
    fn unregister_missing_is_noop() {
        let registry = OwnershipRegistry::new();
        assert_eq!(registry.unregister("nope"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn cleanup_eligible_filters_policy() {
        let registry = OwnershipRegistry::new();
        registry.register("keep", CleanupPolicy::LeaveInPlace);
        registry.register("drop", CleanupPolicy::CleanUpOnRemove);

        assert_eq!(
            registry.list_registered(),
            BTreeSet::from(["drop".to_string(), "keep".to_string()])
        );
        assert_eq!(
            registry.cleanup_eligible(),
            BTreeSet::from(["drop".to_string()])
        );
    }

    #[test]
    fn concurrent_register_and_unregister() {
        let registry = Arc::new(OwnershipRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let id = format!("{worker}-{i}");
                        registry.register(id.clone(), CleanupPolicy::CleanUpOnRemove);
                        if i % 2 == 0 {
                            registry.unregister(&id);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 8 * 250);
        assert!(registry.contains("3-1"));
        assert!(!registry.contains("3-2"));
    }
}
