//! Watcher registry

use std::collections::HashMap;

use crate::models::deployment::{DeploymentId, WatcherId};

/// A client cursor into one deployment's change log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watcher {
    pub id: WatcherId,
    pub deployment_id: DeploymentId,

    /// Index of the next change this watcher has not seen
    pub cursor: usize,
}

/// Issues watcher handles and keeps their cursors.
///
/// Watchers are never removed: clients may simply stop polling.
#[derive(Debug)]
pub struct WatcherRegistry {
    next_id: WatcherId,
    watchers: HashMap<WatcherId, Watcher>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            watchers: HashMap::new(),
        }
    }

    /// Register a watcher on `deployment_id` starting at `cursor`
    pub fn register(&mut self, deployment_id: DeploymentId, cursor: usize) -> WatcherId {
        let id = self.next_id;
        self.next_id += 1;
        self.watchers.insert(
            id,
            Watcher {
                id,
                deployment_id,
                cursor,
            },
        );
        id
    }

    pub fn get(&self, id: WatcherId) -> Option<&Watcher> {
        self.watchers.get(&id)
    }

    /// Move the cursor of a watcher forward to `cursor`.
    ///
    /// Cursors only ever move forward; a smaller value is ignored.
    pub fn advance(&mut self, id: WatcherId, cursor: usize) -> bool {
        match self.watchers.get_mut(&id) {
            Some(watcher) => {
                watcher.cursor = watcher.cursor.max(cursor);
                true
            }
            None => false,
        }
    }
}

impl Default for WatcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_unique_ids() {
        let mut registry = WatcherRegistry::new();
        let a = registry.register(1, 0);
        let b = registry.register(1, 0);
        let c = registry.register(2, 0);

        assert!(a < b && b < c);
        assert_eq!(registry.get(a).unwrap().deployment_id, 1);
        assert_eq!(registry.get(b).unwrap().deployment_id, 1);
        assert_eq!(registry.get(c).unwrap().deployment_id, 2);
    }

    #[test]
    fn test_independent_cursors() {
        let mut registry = WatcherRegistry::new();
        let a = registry.register(1, 0);
        let b = registry.register(1, 0);

        assert!(registry.advance(a, 2));
        assert_eq!(registry.get(a).unwrap().cursor, 2);
        assert_eq!(registry.get(b).unwrap().cursor, 0);
    }

    #[test]
    fn test_cursor_never_moves_back() {
        let mut registry = WatcherRegistry::new();
        let a = registry.register(1, 3);
        registry.advance(a, 1);
        assert_eq!(registry.get(a).unwrap().cursor, 3);
    }

    #[test]
    fn test_unknown_watcher() {
        let mut registry = WatcherRegistry::new();
        assert!(registry.get(99).is_none());
        assert!(!registry.advance(99, 1));
        assert!(registry.get(0).is_none());
    }
}
