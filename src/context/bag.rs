//! The conflict-detecting shared store and its frozen read-only view.

use crate::errors::{DataConflictError, ImmutableViewError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct BagEntry {
    value: serde_json::Value,
    writer: String,
}

#[derive(Debug, Default)]
struct BagInner {
    entries: HashMap<String, BagEntry>,
    // Insertion order of keys, for deterministic iteration.
    order: Vec<String>,
}

/// Shared per-run key/value store with single-writer-per-key enforcement.
///
/// Each key remembers the stage that first wrote it. The same stage may
/// overwrite its own key; a write from a different stage fails with a
/// [`DataConflictError`] naming both writers. Reads never block writers
/// for long: all operations take one short lock.
#[derive(Debug, Default)]
pub struct ContextBag {
    inner: RwLock<BagInner>,
}

impl ContextBag {
    /// An empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a value, claiming the key for `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`DataConflictError`] when the key is already owned by a
    /// different stage.
    pub fn write(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
        writer: impl Into<String>,
    ) -> Result<(), DataConflictError> {
        let key = key.into();
        let writer = writer.into();
        let mut inner = self.inner.write();

        if let Some(existing) = inner.entries.get(&key) {
            if existing.writer != writer {
                return Err(DataConflictError::new(&key, &existing.writer, &writer));
            }
        } else {
            inner.order.push(key.clone());
        }

        inner.entries.insert(key, BagEntry { value, writer });
        Ok(())
    }

    /// Reads the last committed value for a key.
    #[must_use]
    pub fn read(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().entries.get(key).map(|e| e.value.clone())
    }

    /// The stage owning a key, if the key exists.
    #[must_use]
    pub fn writer_of(&self, key: &str) -> Option<String> {
        self.inner.read().entries.get(key).map(|e| e.writer.clone())
    }

    /// True when the key has been written.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    /// All keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// Number of keys in the bag.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// True when nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// A point-in-time copy of the key/value pairs.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Freezes the current contents into an immutable view for child runs.
    #[must_use]
    pub fn freeze(&self) -> FrozenView {
        FrozenView {
            entries: Arc::new(self.snapshot()),
        }
    }
}

/// Read-only snapshot of a parent run's flattened data, handed to child
/// runs.
///
/// The view is intentionally write-hostile: [`write`](Self::write) exists
/// only to give callers a checked, explicit failure instead of a silent
/// missing mutator.
#[derive(Debug, Clone, Default)]
pub struct FrozenView {
    entries: Arc<HashMap<String, serde_json::Value>>,
}

impl FrozenView {
    /// Reads a value from the frozen data.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    /// True when the key exists in the frozen data.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All frozen keys, unordered.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Number of frozen entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Always fails: parent data is immutable from a child run.
    ///
    /// # Errors
    ///
    /// Returns [`ImmutableViewError`] unconditionally.
    pub fn write(
        &self,
        key: impl Into<String>,
        _value: serde_json::Value,
    ) -> Result<(), ImmutableViewError> {
        Err(ImmutableViewError::new(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let bag = ContextBag::new();
        bag.write("transcript", serde_json::json!("hello"), "stt")
            .unwrap();

        assert_eq!(bag.read("transcript"), Some(serde_json::json!("hello")));
        assert_eq!(bag.writer_of("transcript").as_deref(), Some("stt"));
        assert!(bag.contains_key("transcript"));
        assert!(!bag.contains_key("other"));
    }

    #[test]
    fn same_writer_may_overwrite() {
        let bag = ContextBag::new();
        bag.write("k", serde_json::json!(1), "a").unwrap();
        bag.write("k", serde_json::json!(2), "a").unwrap();
        assert_eq!(bag.read("k"), Some(serde_json::json!(2)));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn second_distinct_writer_conflicts() {
        let bag = ContextBag::new();
        bag.write("shared", serde_json::json!(1), "a").unwrap();

        let err = bag.write("shared", serde_json::json!(2), "b").unwrap_err();
        assert_eq!(err.key, "shared");
        assert_eq!(err.existing_writer, "a");
        assert_eq!(err.new_writer, "b");

        // First writer's value is intact.
        assert_eq!(bag.read("shared"), Some(serde_json::json!(1)));
        assert_eq!(bag.writer_of("shared").as_deref(), Some("a"));
    }

    #[test]
    fn keys_keep_insertion_order() {
        let bag = ContextBag::new();
        for key in ["c", "a", "b"] {
            bag.write(key, serde_json::json!(key), "w").unwrap();
        }
        assert_eq!(bag.keys(), vec!["c", "a", "b"]);
    }

    #[test]
    fn frozen_view_reads_but_never_writes() {
        let bag = ContextBag::new();
        bag.write("k", serde_json::json!(7), "stage").unwrap();

        let view = bag.freeze();
        assert_eq!(view.get("k"), Some(&serde_json::json!(7)));
        assert_eq!(view.len(), 1);

        let err = view.write("k", serde_json::json!(8)).unwrap_err();
        assert_eq!(err.key, "k");

        // Later bag writes do not leak into the frozen view.
        bag.write("later", serde_json::json!(true), "stage").unwrap();
        assert!(!view.contains_key("later"));
    }

    #[test]
    fn concurrent_writers_race_safely() {
        let bag = Arc::new(ContextBag::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let bag = bag.clone();
            handles.push(std::thread::spawn(move || {
                bag.write("contested", serde_json::json!(i), format!("stage-{i}"))
                    .is_ok()
            }));
        }
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|claimed| *claimed)
            .count();
        // Exactly one writer claims the key.
        assert_eq!(wins, 1);
    }
}
