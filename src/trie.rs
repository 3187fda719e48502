//! A persistent, structurally-shared trie.
//!
//! Every mutation returns a *new* [`Trie`] that shares all untouched subtrees
//! with its predecessor: only the nodes along the affected key path are
//! copied. Snapshots are immutable and can be read from any number of threads
//! without locks; the caller decides how to publish a new root.
//!
//! Values are stored type-erased behind `Arc<dyn Any>`, so a single trie can
//! hold values of different types; [`Trie::get`] downcasts and returns `None`
//! on a type mismatch. Move-only value types are supported (values are placed
//! into shared ownership on insert and never copied on lookup).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type TrieValue = Arc<dyn Any + Send + Sync>;

/// An immutable trie node. A node with a value present is a *value node*.
#[derive(Default)]
struct TrieNode {
    children: HashMap<u8, Arc<TrieNode>>,
    value: Option<TrieValue>,
}

impl TrieNode {
    /// Shallow copy: shares every child and the value.
    fn clone_shallow(&self) -> Self {
        Self {
            children: self.children.clone(),
            value: self.value.clone(),
        }
    }
}

/// A persistent key-value trie keyed by byte strings.
///
/// Cloning a `Trie` is cheap: it shares the root.
#[derive(Clone, Default)]
pub struct Trie {
    root: Option<Arc<TrieNode>>,
}

impl Trie {
    /// Creates an empty trie.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the trie holds no nodes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Looks up `key` and returns a reference to its value.
    ///
    /// Returns `None` if no node exists at the key path, the node there holds
    /// no value, or the stored value is not a `T`. The empty key addresses
    /// the root. Runs in O(|key|) and never copies the value.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        let mut node = self.root.as_deref()?;
        for byte in key.bytes() {
            node = node.children.get(&byte)?.as_ref();
        }
        node.value.as_ref()?.downcast_ref::<T>()
    }

    /// Returns a new trie with `value` stored at `key`.
    ///
    /// The previous trie is unchanged. Any node already at the key path keeps
    /// its children; only the path from the root to the terminal is copied.
    #[must_use]
    pub fn put<T: Any + Send + Sync>(&self, key: &str, value: T) -> Trie {
        let value: TrieValue = Arc::new(value);
        let root = Self::put_node(self.root.as_deref(), key.as_bytes(), value);
        Trie {
            root: Some(Arc::new(root)),
        }
    }

    /// Returns a new trie with the value at `key` removed.
    ///
    /// A structural no-op (the root is shared) when the key holds no value.
    /// Nodes left with neither value nor children are pruned bottom-up; a
    /// fully emptied trie has no root.
    #[must_use]
    pub fn remove(&self, key: &str) -> Trie {
        let Some(root) = self.root.as_deref() else {
            return self.clone();
        };
        if !Self::contains_value(root, key.as_bytes()) {
            return self.clone();
        }
        Trie {
            root: Self::remove_node(root, key.as_bytes()).map(Arc::new),
        }
    }

    fn put_node(node: Option<&TrieNode>, key: &[u8], value: TrieValue) -> TrieNode {
        let mut cloned = node.map(TrieNode::clone_shallow).unwrap_or_default();
        match key.split_first() {
            None => {
                cloned.value = Some(value);
            }
            Some((&byte, rest)) => {
                let child = cloned.children.get(&byte).map(Arc::as_ref);
                let new_child = Self::put_node(child, rest, value);
                cloned.children.insert(byte, Arc::new(new_child));
            }
        }
        cloned
    }

    fn contains_value(node: &TrieNode, key: &[u8]) -> bool {
        match key.split_first() {
            None => node.value.is_some(),
            Some((&byte, rest)) => node
                .children
                .get(&byte)
                .is_some_and(|child| Self::contains_value(child, rest)),
        }
    }

    /// Rebuilds the path with the value at `key` dropped; `None` prunes the
    /// node. Only called on paths known to hold a value.
    fn remove_node(node: &TrieNode, key: &[u8]) -> Option<TrieNode> {
        let mut cloned = node.clone_shallow();
        match key.split_first() {
            None => {
                cloned.value = None;
            }
            Some((&byte, rest)) => {
                if let Some(child) = node.children.get(&byte) {
                    match Self::remove_node(child, rest) {
                        Some(new_child) => {
                            cloned.children.insert(byte, Arc::new(new_child));
                        }
                        None => {
                            cloned.children.remove(&byte);
                        }
                    }
                }
            }
        }
        if cloned.value.is_none() && cloned.children.is_empty() {
            None
        } else {
            Some(cloned)
        }
    }
}

impl std::fmt::Debug for Trie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trie")
            .field("empty", &self.is_empty())
            .finish()
    }
}
