//! OrderedShard: a red-black tree from HashedKey to Locator
//!
//! Nodes live in an arena (`Vec<Node>`) and refer to each other by index, so
//! rotations and splices are plain field updates. Freed slots are reused.
//!
//! Invariants kept after every mutation:
//! - the root is black
//! - a red node never has a red child
//! - every root-to-nil path crosses the same number of black nodes
//! - `leftmost` / `rightmost` point at the min / max key
//!
//! A structural surprise during rebalancing (e.g. a red node without a
//! parent) is reported as `KidError::InvariantViolation` instead of being
//! patched over.

use std::cmp::Ordering;
use std::mem;

use crate::error::{KidError, Result};

use super::{HashedKey, Locator};

type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Debug, Clone)]
struct Node {
    key: HashedKey,
    value: Locator,
    color: Color,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

/// Red-black tree backing one shard of the index
#[derive(Debug)]
pub struct OrderedShard {
    /// Shard number, for diagnostics
    shard: usize,
    nodes: Vec<Node>,
    /// Arena slots of removed nodes, reused by later inserts
    vacant: Vec<NodeId>,
    root: Option<NodeId>,
    leftmost: Option<NodeId>,
    rightmost: Option<NodeId>,
    len: usize,
}

impl OrderedShard {
    /// Create an empty tree with room for `capacity` nodes
    pub fn new(shard: usize, capacity: usize) -> Self {
        Self {
            shard,
            nodes: Vec::with_capacity(capacity),
            vacant: Vec::new(),
            root: None,
            leftmost: None,
            rightmost: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Binary search for `key`
    pub fn get(&self, key: HashedKey) -> Option<Locator> {
        self.find(key).map(|id| self.nodes[id].value)
    }

    /// Smallest entry, O(1)
    pub fn min(&self) -> Option<(HashedKey, Locator)> {
        self.leftmost.map(|id| self.entry(id))
    }

    /// Largest entry, O(1)
    pub fn max(&self) -> Option<(HashedKey, Locator)> {
        self.rightmost.map(|id| self.entry(id))
    }

    /// In-order iteration over all entries
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tree: self,
            next: self.leftmost,
        }
    }

    /// Insert `key`, or overwrite its Locator in place.
    ///
    /// Returns the Locator that was replaced, if any.
    pub fn insert(&mut self, key: HashedKey, value: Locator) -> Result<Option<Locator>> {
        let mut parent = None;
        let mut go_left = false;
        let mut cursor = self.root;

        while let Some(id) = cursor {
            let node = &mut self.nodes[id];
            match key.cmp(&node.key) {
                Ordering::Equal => return Ok(Some(mem::replace(&mut node.value, value))),
                Ordering::Less => {
                    go_left = true;
                    cursor = node.left;
                }
                Ordering::Greater => {
                    go_left = false;
                    cursor = node.right;
                }
            }
            parent = Some(id);
        }

        let id = self.alloc(Node {
            key,
            value,
            color: Color::Red,
            parent,
            left: None,
            right: None,
        });
        match parent {
            None => self.root = Some(id),
            Some(p) if go_left => self.nodes[p].left = Some(id),
            Some(p) => self.nodes[p].right = Some(id),
        }

        if self.leftmost.map_or(true, |m| key < self.nodes[m].key) {
            self.leftmost = Some(id);
        }
        if self.rightmost.map_or(true, |m| key > self.nodes[m].key) {
            self.rightmost = Some(id);
        }
        self.len += 1;

        self.insert_fixup(id)?;
        Ok(None)
    }

    /// Unlink `key`, returning its Locator
    pub fn remove(&mut self, key: HashedKey) -> Result<Option<Locator>> {
        let Some(z) = self.find(key) else {
            return Ok(None);
        };
        let removed = self.nodes[z].value;

        // Two children: pull the in-order successor's entry up into `z` and
        // unlink the successor instead. It has no left child.
        let target = match (self.nodes[z].left, self.nodes[z].right) {
            (Some(_), Some(right)) => {
                let successor = self.subtree_min(right);
                self.nodes[z].key = self.nodes[successor].key;
                self.nodes[z].value = self.nodes[successor].value;
                successor
            }
            _ => z,
        };

        let child = self.nodes[target].left.or(self.nodes[target].right);
        let parent = self.nodes[target].parent;
        if let Some(c) = child {
            self.nodes[c].parent = parent;
        }
        self.replace_child(parent, target, child);

        // The leftmost node has no left child and the rightmost no right
        // child, so the new extreme is in `child`'s subtree or is `parent`.
        if self.leftmost == Some(target) {
            self.leftmost = child.map(|c| self.subtree_min(c)).or(parent);
        }
        if self.rightmost == Some(target) {
            self.rightmost = child.map(|c| self.subtree_max(c)).or(parent);
        }

        let color = self.nodes[target].color;
        self.vacant.push(target);
        self.len -= 1;

        if color == Color::Black {
            self.delete_fixup(child, parent)?;
        }
        Ok(Some(removed))
    }

    /// Number of black nodes on every root-to-nil path
    pub fn black_height(&self) -> usize {
        let mut height = 0;
        let mut cursor = self.root;
        while let Some(id) = cursor {
            if self.nodes[id].color == Color::Black {
                height += 1;
            }
            cursor = self.nodes[id].left;
        }
        height
    }

    /// Walk the whole tree and verify every structural invariant
    pub fn check_invariants(&self) -> Result<()> {
        let Some(root) = self.root else {
            if self.len != 0 || self.leftmost.is_some() || self.rightmost.is_some() {
                return Err(self.violation(HashedKey::from_raw(0), "empty tree with stale bookkeeping"));
            }
            return Ok(());
        };

        let root_key = self.nodes[root].key;
        if self.nodes[root].parent.is_some() {
            return Err(self.violation(root_key, "root has a parent"));
        }
        if self.nodes[root].color == Color::Red {
            return Err(self.violation(root_key, "root is red"));
        }

        let (count, _) = self.check_subtree(root, None, None)?;
        if count != self.len {
            return Err(self.violation(
                root_key,
                &format!("tracked size {} but {} reachable nodes", self.len, count),
            ));
        }
        if self.leftmost != Some(self.subtree_min(root)) {
            return Err(self.violation(root_key, "cached leftmost is not the minimum"));
        }
        if self.rightmost != Some(self.subtree_max(root)) {
            return Err(self.violation(root_key, "cached rightmost is not the maximum"));
        }
        Ok(())
    }

    // =========================================================================
    // Rebalancing
    // =========================================================================

    fn insert_fixup(&mut self, mut z: NodeId) -> Result<()> {
        while let Some(p) = self.nodes[z].parent {
            if self.nodes[p].color == Color::Black {
                break;
            }
            let Some(g) = self.nodes[p].parent else {
                return Err(self.violation(self.nodes[p].key, "red node without a parent"));
            };

            if self.nodes[g].left == Some(p) {
                let uncle = self.nodes[g].right;
                if let Some(u) = uncle.filter(|&u| self.nodes[u].color == Color::Red) {
                    self.nodes[p].color = Color::Black;
                    self.nodes[u].color = Color::Black;
                    self.nodes[g].color = Color::Red;
                    z = g;
                } else {
                    let mut p = p;
                    if self.nodes[p].right == Some(z) {
                        // Inner grandchild: turn it into an outer one
                        self.rotate_left(p)?;
                        mem::swap(&mut z, &mut p);
                    }
                    self.nodes[p].color = Color::Black;
                    self.nodes[g].color = Color::Red;
                    self.rotate_right(g)?;
                }
            } else {
                let uncle = self.nodes[g].left;
                if let Some(u) = uncle.filter(|&u| self.nodes[u].color == Color::Red) {
                    self.nodes[p].color = Color::Black;
                    self.nodes[u].color = Color::Black;
                    self.nodes[g].color = Color::Red;
                    z = g;
                } else {
                    let mut p = p;
                    if self.nodes[p].left == Some(z) {
                        self.rotate_right(p)?;
                        mem::swap(&mut z, &mut p);
                    }
                    self.nodes[p].color = Color::Black;
                    self.nodes[g].color = Color::Red;
                    self.rotate_left(g)?;
                }
            }
        }

        if let Some(root) = self.root {
            self.nodes[root].color = Color::Black;
        }
        Ok(())
    }

    /// Restore black height after a black node was unlinked. `x` is the node
    /// now in the deficient position (`None` for a nil leaf) and `parent`
    /// its parent.
    fn delete_fixup(&mut self, mut x: Option<NodeId>, mut parent: Option<NodeId>) -> Result<()> {
        while x != self.root && !self.is_red(x) {
            let Some(p) = parent else {
                break;
            };

            if self.nodes[p].left == x {
                let mut w = self.sibling(p, self.nodes[p].right)?;
                if self.nodes[w].color == Color::Red {
                    self.nodes[w].color = Color::Black;
                    self.nodes[p].color = Color::Red;
                    self.rotate_left(p)?;
                    w = self.sibling(p, self.nodes[p].right)?;
                }

                let (near, far) = (self.nodes[w].left, self.nodes[w].right);
                if !self.is_red(near) && !self.is_red(far) {
                    self.nodes[w].color = Color::Red;
                    x = Some(p);
                    parent = self.nodes[p].parent;
                } else {
                    if !self.is_red(far) {
                        if let Some(n) = near {
                            self.nodes[n].color = Color::Black;
                        }
                        self.nodes[w].color = Color::Red;
                        self.rotate_right(w)?;
                        w = self.sibling(p, self.nodes[p].right)?;
                    }
                    self.nodes[w].color = self.nodes[p].color;
                    self.nodes[p].color = Color::Black;
                    if let Some(f) = self.nodes[w].right {
                        self.nodes[f].color = Color::Black;
                    }
                    self.rotate_left(p)?;
                    x = self.root;
                    break;
                }
            } else {
                let mut w = self.sibling(p, self.nodes[p].left)?;
                if self.nodes[w].color == Color::Red {
                    self.nodes[w].color = Color::Black;
                    self.nodes[p].color = Color::Red;
                    self.rotate_right(p)?;
                    w = self.sibling(p, self.nodes[p].left)?;
                }

                let (near, far) = (self.nodes[w].right, self.nodes[w].left);
                if !self.is_red(near) && !self.is_red(far) {
                    self.nodes[w].color = Color::Red;
                    x = Some(p);
                    parent = self.nodes[p].parent;
                } else {
                    if !self.is_red(far) {
                        if let Some(n) = near {
                            self.nodes[n].color = Color::Black;
                        }
                        self.nodes[w].color = Color::Red;
                        self.rotate_left(w)?;
                        w = self.sibling(p, self.nodes[p].left)?;
                    }
                    self.nodes[w].color = self.nodes[p].color;
                    self.nodes[p].color = Color::Black;
                    if let Some(f) = self.nodes[w].left {
                        self.nodes[f].color = Color::Black;
                    }
                    self.rotate_right(p)?;
                    x = self.root;
                    break;
                }
            }
        }

        if let Some(x) = x {
            self.nodes[x].color = Color::Black;
        }
        Ok(())
    }

    fn rotate_left(&mut self, x: NodeId) -> Result<()> {
        let Some(y) = self.nodes[x].right else {
            return Err(self.violation(self.nodes[x].key, "left rotation without right child"));
        };

        let inner = self.nodes[y].left;
        self.nodes[x].right = inner;
        if let Some(b) = inner {
            self.nodes[b].parent = Some(x);
        }

        let parent = self.nodes[x].parent;
        self.nodes[y].parent = parent;
        self.replace_child(parent, x, Some(y));

        self.nodes[y].left = Some(x);
        self.nodes[x].parent = Some(y);
        Ok(())
    }

    fn rotate_right(&mut self, x: NodeId) -> Result<()> {
        let Some(y) = self.nodes[x].left else {
            return Err(self.violation(self.nodes[x].key, "right rotation without left child"));
        };

        let inner = self.nodes[y].right;
        self.nodes[x].left = inner;
        if let Some(b) = inner {
            self.nodes[b].parent = Some(x);
        }

        let parent = self.nodes[x].parent;
        self.nodes[y].parent = parent;
        self.replace_child(parent, x, Some(y));

        self.nodes[y].right = Some(x);
        self.nodes[x].parent = Some(y);
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.vacant.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn find(&self, key: HashedKey) -> Option<NodeId> {
        let mut cursor = self.root;
        while let Some(id) = cursor {
            let node = &self.nodes[id];
            cursor = match key.cmp(&node.key) {
                Ordering::Equal => return Some(id),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
        }
        None
    }

    fn entry(&self, id: NodeId) -> (HashedKey, Locator) {
        (self.nodes[id].key, self.nodes[id].value)
    }

    /// Point `parent`'s link to `old` (or the root) at `new`
    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: Option<NodeId>) {
        match parent {
            None => self.root = new,
            Some(p) if self.nodes[p].left == Some(old) => self.nodes[p].left = new,
            Some(p) => self.nodes[p].right = new,
        }
    }

    fn subtree_min(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.nodes[id].left {
            id = left;
        }
        id
    }

    fn subtree_max(&self, mut id: NodeId) -> NodeId {
        while let Some(right) = self.nodes[id].right {
            id = right;
        }
        id
    }

    fn successor(&self, id: NodeId) -> Option<NodeId> {
        if let Some(right) = self.nodes[id].right {
            return Some(self.subtree_min(right));
        }
        let mut child = id;
        let mut parent = self.nodes[id].parent;
        while let Some(p) = parent {
            if self.nodes[p].left == Some(child) {
                return Some(p);
            }
            child = p;
            parent = self.nodes[p].parent;
        }
        None
    }

    /// Nil leaves count as black
    fn is_red(&self, id: Option<NodeId>) -> bool {
        id.is_some_and(|id| self.nodes[id].color == Color::Red)
    }

    /// A deficient position always has a real sibling; a nil one means the
    /// black heights were already unequal.
    fn sibling(&self, parent: NodeId, sibling: Option<NodeId>) -> Result<NodeId> {
        sibling.ok_or_else(|| self.violation(self.nodes[parent].key, "deficient position without sibling"))
    }

    /// Returns `(node count, black height)` of the subtree at `id`, checking
    /// order, parent links and coloring on the way.
    fn check_subtree(
        &self,
        id: NodeId,
        lower: Option<HashedKey>,
        upper: Option<HashedKey>,
    ) -> Result<(usize, usize)> {
        let node = &self.nodes[id];
        if lower.is_some_and(|l| node.key <= l) || upper.is_some_and(|u| node.key >= u) {
            return Err(self.violation(node.key, "key out of order"));
        }

        let mut heights = [1usize; 2];
        let mut count = 1;
        for (slot, child) in [node.left, node.right].into_iter().enumerate() {
            let Some(c) = child else {
                continue;
            };
            if self.nodes[c].parent != Some(id) {
                return Err(self.violation(self.nodes[c].key, "child does not point back to parent"));
            }
            if node.color == Color::Red && self.nodes[c].color == Color::Red {
                return Err(self.violation(self.nodes[c].key, "red node with red parent"));
            }
            let (lower, upper) = if slot == 0 {
                (lower, Some(node.key))
            } else {
                (Some(node.key), upper)
            };
            let (sub_count, sub_height) = self.check_subtree(c, lower, upper)?;
            count += sub_count;
            heights[slot] = sub_height;
        }

        if heights[0] != heights[1] {
            return Err(self.violation(
                node.key,
                &format!("black heights differ: {} vs {}", heights[0], heights[1]),
            ));
        }
        let own = usize::from(node.color == Color::Black);
        Ok((count, heights[0] + own))
    }

    fn violation(&self, key: HashedKey, reason: &str) -> KidError {
        tracing::error!(shard = self.shard, %key, reason, "Red-black invariant violated");
        KidError::InvariantViolation {
            shard: self.shard,
            key: key.raw(),
            reason: reason.to_string(),
        }
    }
}

/// In-order iterator over an OrderedShard
pub struct Iter<'a> {
    tree: &'a OrderedShard,
    next: Option<NodeId>,
}

impl Iterator for Iter<'_> {
    type Item = (HashedKey, Locator);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.successor(id);
        Some(self.tree.entry(id))
    }
}
