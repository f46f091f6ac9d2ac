//! Hierarchical attribute namespace (quark registry)
//!
//! Every logical signal in a trace — a GPU queue's call stack, a memory
//! transfer lane, a thread's API stack — is one *attribute*: a node in a
//! tree keyed by path segments. The first request for a path creates it
//! (get-or-add); from then on the attribute is identified by its *quark*,
//! a stable integer id valid for the lifetime of the store. All interval
//! storage is keyed by quark, so path resolution happens once per handler
//! decision instead of once per query.
//!
//! The tree is an arena: nodes live in a `Vec` indexed by quark, children
//! are quark lists in creation order, and a (parent, label) index makes
//! resolution O(1). Attributes are never deleted.

use crate::errors::{Result, StateError};
use fnv::FnvHashMap;

/// Stable integer id of one attribute
pub type Quark = usize;

/// Quark of the synthetic root. The root has no label and is never
/// returned by path resolution; it exists so "top-level" attributes have
/// a parent like everyone else.
pub const ROOT_QUARK: Quark = 0;

#[derive(Debug, Clone)]
struct AttributeNode {
    label: String,
    parent: Quark,
    children: Vec<Quark>,
}

/// Arena of attribute nodes with get-or-add path resolution
#[derive(Debug, Clone)]
pub struct AttributeTree {
    nodes: Vec<AttributeNode>,
    /// (parent quark, child label) -> child quark
    index: FnvHashMap<(Quark, String), Quark>,
}

impl AttributeTree {
    pub fn new() -> Self {
        AttributeTree {
            nodes: vec![AttributeNode {
                label: String::new(),
                parent: ROOT_QUARK,
                children: Vec::new(),
            }],
            index: FnvHashMap::default(),
        }
    }

    /// Number of attributes, including the synthetic root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root always exists; "empty" means no user attributes.
        self.nodes.len() == 1
    }

    fn check(&self, quark: Quark) -> Result<()> {
        if quark < self.nodes.len() {
            Ok(())
        } else {
            Err(StateError::NotFound { quark })
        }
    }

    /// Get-or-add below a parent known to be valid
    fn resolve_child(&mut self, parent: Quark, label: &str) -> Quark {
        if let Some(&quark) = self.index.get(&(parent, label.to_string())) {
            return quark;
        }
        let quark = self.nodes.len();
        self.nodes.push(AttributeNode {
            label: label.to_string(),
            parent,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(quark);
        self.index.insert((parent, label.to_string()), quark);
        quark
    }

    /// Existing child with `label` under `parent`, or a freshly created
    /// one. Idempotent: the same (parent, label) always yields the same
    /// quark, regardless of intervening unrelated resolutions.
    pub fn quark_relative_and_add(&mut self, parent: Quark, label: &str) -> Result<Quark> {
        self.check(parent)?;
        Ok(self.resolve_child(parent, label))
    }

    /// Resolve a full path from the root, creating missing segments
    pub fn quark_absolute_and_add(&mut self, path: &[&str]) -> Quark {
        let mut quark = ROOT_QUARK;
        for label in path {
            quark = self.resolve_child(quark, label);
        }
        quark
    }

    /// Existing child lookup without creation
    pub fn quark_relative(&self, parent: Quark, label: &str) -> Result<Quark> {
        self.check(parent)?;
        self.index
            .get(&(parent, label.to_string()))
            .copied()
            .ok_or_else(|| StateError::PathNotFound {
                path: label.to_string(),
            })
    }

    /// Existing path lookup without creation
    pub fn quark_absolute(&self, path: &[&str]) -> Result<Quark> {
        let mut quark = ROOT_QUARK;
        for label in path {
            quark = self
                .quark_relative(quark, label)
                .map_err(|_| StateError::PathNotFound {
                    path: path.join("/"),
                })?;
        }
        Ok(quark)
    }

    /// Direct children in creation order
    pub fn children(&self, quark: Quark) -> Result<&[Quark]> {
        self.check(quark)?;
        Ok(&self.nodes[quark].children)
    }

    /// Parent quark; `None` for the root
    pub fn parent(&self, quark: Quark) -> Result<Option<Quark>> {
        self.check(quark)?;
        if quark == ROOT_QUARK {
            Ok(None)
        } else {
            Ok(Some(self.nodes[quark].parent))
        }
    }

    /// Label of this attribute (last path segment)
    pub fn label(&self, quark: Quark) -> Result<&str> {
        self.check(quark)?;
        Ok(&self.nodes[quark].label)
    }

    /// Full path from the root, reconstructed by walking parents
    pub fn path(&self, quark: Quark) -> Result<Vec<&str>> {
        self.check(quark)?;
        let mut labels = Vec::new();
        let mut current = quark;
        while current != ROOT_QUARK {
            labels.push(self.nodes[current].label.as_str());
            current = self.nodes[current].parent;
        }
        labels.reverse();
        Ok(labels)
    }

    /// Every quark under `root` (excluding `root` itself), in creation
    /// order. Used by the query layer for tree listings.
    pub fn sub_tree(&self, root: Quark) -> Result<Vec<Quark>> {
        self.check(root)?;
        let mut out = Vec::new();
        let mut pending = vec![root];
        while let Some(quark) = pending.pop() {
            for &child in self.nodes[quark].children.iter().rev() {
                out.push(child);
                pending.push(child);
            }
        }
        // Quarks are handed out sequentially, so sorted order is global
        // creation order.
        out.sort_unstable();
        Ok(out)
    }
}

impl Default for AttributeTree {
    fn default() -> Self {
        Self::new()
    }
}
