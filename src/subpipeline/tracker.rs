//! Parent/child run bookkeeping.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Tracks which child runs belong to which parent.
///
/// Children hold their parent's id, never a pointer to its context; this
/// map is the only place the relationship is materialized, which keeps
/// lifetimes independent.
#[derive(Debug, Default)]
pub struct ChildRunTracker {
    children: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
    parents: RwLock<HashMap<Uuid, Uuid>>,
}

impl ChildRunTracker {
    /// An empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a child under a parent.
    pub fn register(&self, parent_run_id: Uuid, child_run_id: Uuid) {
        self.children
            .write()
            .entry(parent_run_id)
            .or_default()
            .insert(child_run_id);
        self.parents.write().insert(child_run_id, parent_run_id);
    }

    /// Removes a child, cleaning up the parent entry when it empties.
    pub fn unregister(&self, parent_run_id: Uuid, child_run_id: Uuid) {
        let mut children = self.children.write();
        if let Some(set) = children.get_mut(&parent_run_id) {
            set.remove(&child_run_id);
            if set.is_empty() {
                children.remove(&parent_run_id);
            }
        }
        self.parents.write().remove(&child_run_id);
    }

    /// All live children of a parent.
    #[must_use]
    pub fn children_of(&self, parent_run_id: Uuid) -> Vec<Uuid> {
        self.children
            .read()
            .get(&parent_run_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The parent of a child run, while registered.
    #[must_use]
    pub fn parent_of(&self, child_run_id: Uuid) -> Option<Uuid> {
        self.parents.read().get(&child_run_id).copied()
    }

    /// Number of live child registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parents.read().len()
    }

    /// True when no children are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_query() {
        let tracker = ChildRunTracker::new();
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();

        tracker.register(parent, child);
        assert_eq!(tracker.children_of(parent), vec![child]);
        assert_eq!(tracker.parent_of(child), Some(parent));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn unregister_cleans_up_both_sides() {
        let tracker = ChildRunTracker::new();
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();

        tracker.register(parent, child);
        tracker.unregister(parent, child);

        assert!(tracker.is_empty());
        assert!(tracker.children_of(parent).is_empty());
        assert!(tracker.parent_of(child).is_none());
    }

    #[test]
    fn several_children_per_parent() {
        let tracker = ChildRunTracker::new();
        let parent = Uuid::new_v4();
        let kids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for kid in &kids {
            tracker.register(parent, *kid);
        }

        let mut listed = tracker.children_of(parent);
        listed.sort();
        let mut expected = kids.clone();
        expected.sort();
        assert_eq!(listed, expected);
    }
}
