//! Balanced channel index
//!
//! A red-black tree threaded through the channel records themselves: every
//! record carries a `Link` (parent, children, color) naming other arena slots.
//! The index owns nothing; removing a node only unlinks it, and freeing the
//! record is left to the arena.
//!
//! Nodes are ordered by the composite key `(hash, id)`. Ids compare byte-wise
//! over their common prefix with the shorter id first on a tie, which is the
//! ordering of `&[u8]`, so hash collisions never break the search property.

use std::cmp::Ordering;

use slab::Slab;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Color {
    #[default]
    Red,
    Black,
}

/// Tree linkage embedded in an indexed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Link {
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
    color: Color,
}

/// A record that can be threaded into the index
pub(crate) trait IndexNode {
    fn link(&self) -> &Link;
    fn link_mut(&mut self) -> &mut Link;
    fn key(&self) -> (u32, &[u8]);
}

/// Order two composite keys
pub(crate) fn compare(a: (u32, &[u8]), b: (u32, &[u8])) -> Ordering {
    a.cmp(&b)
}

#[derive(Debug, Default)]
pub(crate) struct Index {
    root: Option<usize>,
    len: usize,
}

fn link<T: IndexNode>(nodes: &Slab<T>, slot: usize) -> &Link {
    nodes[slot].link()
}

fn link_mut<T: IndexNode>(nodes: &mut Slab<T>, slot: usize) -> &mut Link {
    nodes[slot].link_mut()
}

fn is_red<T: IndexNode>(nodes: &Slab<T>, slot: Option<usize>) -> bool {
    matches!(slot, Some(s) if link(nodes, s).color == Color::Red)
}

fn color_of<T: IndexNode>(nodes: &Slab<T>, slot: Option<usize>) -> Color {
    slot.map_or(Color::Black, |s| link(nodes, s).color)
}

fn set_color<T: IndexNode>(nodes: &mut Slab<T>, slot: Option<usize>, color: Color) {
    if let Some(s) = slot {
        link_mut(nodes, s).color = color;
    }
}

fn set_parent<T: IndexNode>(nodes: &mut Slab<T>, slot: Option<usize>, parent: Option<usize>) {
    if let Some(s) = slot {
        link_mut(nodes, s).parent = parent;
    }
}

fn parent_of<T: IndexNode>(nodes: &Slab<T>, slot: usize) -> usize {
    link(nodes, slot)
        .parent
        .unwrap_or_else(|| panic!("index corrupted: slot {} has no parent", slot))
}

fn minimum<T: IndexNode>(nodes: &Slab<T>, mut slot: usize) -> usize {
    while let Some(left) = link(nodes, slot).left {
        slot = left;
    }
    slot
}

impl Index {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn root(&self) -> Option<usize> {
        self.root
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Child of `slot` on the side a key ordered `ord` against it belongs to
    pub(crate) fn child<T: IndexNode>(nodes: &Slab<T>, slot: usize, ord: Ordering) -> Option<usize> {
        let link = link(nodes, slot);
        match ord {
            Ordering::Less => link.left,
            _ => link.right,
        }
    }

    #[cfg(test)]
    pub(crate) fn search<T: IndexNode>(&self, nodes: &Slab<T>, key: (u32, &[u8])) -> Option<usize> {
        let mut cur = self.root;
        while let Some(slot) = cur {
            match compare(key, nodes[slot].key()) {
                Ordering::Equal => return Some(slot),
                ord => cur = Self::child(nodes, slot, ord),
            }
        }
        None
    }

    /// Lowest-keyed node
    pub(crate) fn first<T: IndexNode>(&self, nodes: &Slab<T>) -> Option<usize> {
        self.root.map(|root| minimum(nodes, root))
    }

    /// In-order successor of `slot`
    pub(crate) fn next<T: IndexNode>(nodes: &Slab<T>, slot: usize) -> Option<usize> {
        if let Some(right) = link(nodes, slot).right {
            return Some(minimum(nodes, right));
        }
        let mut child = slot;
        let mut parent = link(nodes, slot).parent;
        while let Some(p) = parent {
            if link(nodes, p).left == Some(child) {
                return Some(p);
            }
            child = p;
            parent = link(nodes, p).parent;
        }
        None
    }

    /// Link a record that is not yet in the tree
    pub(crate) fn insert<T: IndexNode>(&mut self, nodes: &mut Slab<T>, node: usize) {
        let mut parent = None;
        let mut go_left = false;
        let mut cur = self.root;

        while let Some(slot) = cur {
            let ord = compare(nodes[node].key(), nodes[slot].key());
            debug_assert_ne!(ord, Ordering::Equal, "duplicate key inserted into index");
            parent = Some(slot);
            go_left = ord == Ordering::Less;
            cur = Self::child(nodes, slot, ord);
        }

        *link_mut(nodes, node) = Link {
            parent,
            left: None,
            right: None,
            color: Color::Red,
        };

        match parent {
            None => self.root = Some(node),
            Some(p) if go_left => link_mut(nodes, p).left = Some(node),
            Some(p) => link_mut(nodes, p).right = Some(node),
        }

        self.len += 1;
        self.insert_fixup(nodes, node);
    }

    /// Unlink a record; the record itself stays in the arena
    pub(crate) fn remove<T: IndexNode>(&mut self, nodes: &mut Slab<T>, node: usize) {
        let Link {
            parent: z_parent,
            left: z_left,
            right: z_right,
            color: z_color,
        } = *link(nodes, node);

        let removed_color;
        let x;
        let x_parent;

        match (z_left, z_right) {
            (None, _) => {
                removed_color = z_color;
                x = z_right;
                x_parent = z_parent;
                self.transplant(nodes, node, z_right);
            }
            (Some(_), None) => {
                removed_color = z_color;
                x = z_left;
                x_parent = z_parent;
                self.transplant(nodes, node, z_left);
            }
            (Some(left), Some(right)) => {
                let y = minimum(nodes, right);
                removed_color = link(nodes, y).color;
                x = link(nodes, y).right;

                if link(nodes, y).parent == Some(node) {
                    x_parent = Some(y);
                } else {
                    x_parent = link(nodes, y).parent;
                    self.transplant(nodes, y, x);
                    link_mut(nodes, y).right = Some(right);
                    link_mut(nodes, right).parent = Some(y);
                }

                self.transplant(nodes, node, Some(y));
                link_mut(nodes, y).left = Some(left);
                link_mut(nodes, left).parent = Some(y);
                link_mut(nodes, y).color = z_color;
            }
        }

        *link_mut(nodes, node) = Link::default();
        self.len -= 1;

        if removed_color == Color::Black {
            self.remove_fixup(nodes, x, x_parent);
        }
    }

    fn transplant<T: IndexNode>(&mut self, nodes: &mut Slab<T>, old: usize, new: Option<usize>) {
        let parent = link(nodes, old).parent;
        match parent {
            None => self.root = new,
            Some(p) => {
                let plink = link_mut(nodes, p);
                if plink.left == Some(old) {
                    plink.left = new;
                } else {
                    plink.right = new;
                }
            }
        }
        set_parent(nodes, new, parent);
    }

    fn rotate_left<T: IndexNode>(&mut self, nodes: &mut Slab<T>, x: usize) {
        let y = link(nodes, x)
            .right
            .unwrap_or_else(|| panic!("index corrupted: rotate_left at {} without right child", x));
        let y_left = link(nodes, y).left;

        link_mut(nodes, x).right = y_left;
        set_parent(nodes, y_left, Some(x));

        self.transplant(nodes, x, Some(y));

        link_mut(nodes, y).left = Some(x);
        link_mut(nodes, x).parent = Some(y);
    }

    fn rotate_right<T: IndexNode>(&mut self, nodes: &mut Slab<T>, x: usize) {
        let y = link(nodes, x)
            .left
            .unwrap_or_else(|| panic!("index corrupted: rotate_right at {} without left child", x));
        let y_right = link(nodes, y).right;

        link_mut(nodes, x).left = y_right;
        set_parent(nodes, y_right, Some(x));

        self.transplant(nodes, x, Some(y));

        link_mut(nodes, y).right = Some(x);
        link_mut(nodes, x).parent = Some(y);
    }

    fn insert_fixup<T: IndexNode>(&mut self, nodes: &mut Slab<T>, mut z: usize) {
        while let Some(p) = link(nodes, z).parent {
            if link(nodes, p).color != Color::Red {
                break;
            }
            // a red node is never the root, so the grandparent exists
            let g = parent_of(nodes, p);

            if link(nodes, g).left == Some(p) {
                let uncle = link(nodes, g).right;
                if is_red(nodes, uncle) {
                    set_color(nodes, Some(p), Color::Black);
                    set_color(nodes, uncle, Color::Black);
                    set_color(nodes, Some(g), Color::Red);
                    z = g;
                } else {
                    if link(nodes, p).right == Some(z) {
                        z = p;
                        self.rotate_left(nodes, z);
                    }
                    let p = parent_of(nodes, z);
                    let g = parent_of(nodes, p);
                    set_color(nodes, Some(p), Color::Black);
                    set_color(nodes, Some(g), Color::Red);
                    self.rotate_right(nodes, g);
                }
            } else {
                let uncle = link(nodes, g).left;
                if is_red(nodes, uncle) {
                    set_color(nodes, Some(p), Color::Black);
                    set_color(nodes, uncle, Color::Black);
                    set_color(nodes, Some(g), Color::Red);
                    z = g;
                } else {
                    if link(nodes, p).left == Some(z) {
                        z = p;
                        self.rotate_right(nodes, z);
                    }
                    let p = parent_of(nodes, z);
                    let g = parent_of(nodes, p);
                    set_color(nodes, Some(p), Color::Black);
                    set_color(nodes, Some(g), Color::Red);
                    self.rotate_left(nodes, g);
                }
            }
        }

        set_color(nodes, self.root, Color::Black);
    }

    fn remove_fixup<T: IndexNode>(
        &mut self,
        nodes: &mut Slab<T>,
        mut x: Option<usize>,
        mut x_parent: Option<usize>,
    ) {
        while x != self.root && !is_red(nodes, x) {
            let Some(p) = x_parent else { break };

            if link(nodes, p).left == x {
                let mut w = sibling(p, link(nodes, p).right);
                if is_red(nodes, Some(w)) {
                    set_color(nodes, Some(w), Color::Black);
                    set_color(nodes, Some(p), Color::Red);
                    self.rotate_left(nodes, p);
                    w = sibling(p, link(nodes, p).right);
                }

                if !is_red(nodes, link(nodes, w).left) && !is_red(nodes, link(nodes, w).right) {
                    set_color(nodes, Some(w), Color::Red);
                    x = Some(p);
                    x_parent = link(nodes, p).parent;
                } else {
                    if !is_red(nodes, link(nodes, w).right) {
                        set_color(nodes, link(nodes, w).left, Color::Black);
                        set_color(nodes, Some(w), Color::Red);
                        self.rotate_right(nodes, w);
                        w = sibling(p, link(nodes, p).right);
                    }
                    set_color(nodes, Some(w), color_of(nodes, Some(p)));
                    set_color(nodes, Some(p), Color::Black);
                    set_color(nodes, link(nodes, w).right, Color::Black);
                    self.rotate_left(nodes, p);
                    x = self.root;
                    x_parent = None;
                }
            } else {
                let mut w = sibling(p, link(nodes, p).left);
                if is_red(nodes, Some(w)) {
                    set_color(nodes, Some(w), Color::Black);
                    set_color(nodes, Some(p), Color::Red);
                    self.rotate_right(nodes, p);
                    w = sibling(p, link(nodes, p).left);
                }

                if !is_red(nodes, link(nodes, w).left) && !is_red(nodes, link(nodes, w).right) {
                    set_color(nodes, Some(w), Color::Red);
                    x = Some(p);
                    x_parent = link(nodes, p).parent;
                } else {
                    if !is_red(nodes, link(nodes, w).left) {
                        set_color(nodes, link(nodes, w).right, Color::Black);
                        set_color(nodes, Some(w), Color::Red);
                        self.rotate_left(nodes, w);
                        w = sibling(p, link(nodes, p).left);
                    }
                    set_color(nodes, Some(w), color_of(nodes, Some(p)));
                    set_color(nodes, Some(p), Color::Black);
                    set_color(nodes, link(nodes, w).left, Color::Black);
                    self.rotate_right(nodes, p);
                    x = self.root;
                    x_parent = None;
                }
            }
        }

        set_color(nodes, x, Color::Black);
    }

    /// Check the search-tree and red-black invariants, panicking on the first violation
    #[cfg(test)]
    pub(crate) fn validate<T: IndexNode>(&self, nodes: &Slab<T>) {
        if let Some(root) = self.root {
            assert_eq!(link(nodes, root).parent, None, "index corrupted: root has a parent");
            assert_eq!(link(nodes, root).color, Color::Black, "index corrupted: red root");
        }

        let mut count = 0;
        check_subtree(nodes, self.root, None, &mut count);
        assert_eq!(count, self.len, "index corrupted: length mismatch");

        let mut cur = self.first(nodes);
        let mut prev: Option<usize> = None;
        while let Some(slot) = cur {
            if let Some(prev) = prev {
                assert_eq!(
                    compare(nodes[prev].key(), nodes[slot].key()),
                    Ordering::Less,
                    "index corrupted: keys out of order at slot {}",
                    slot
                );
            }
            prev = Some(slot);
            cur = Self::next(nodes, slot);
        }
    }
}

fn sibling(parent: usize, slot: Option<usize>) -> usize {
    slot.unwrap_or_else(|| panic!("index corrupted: black height broken below slot {}", parent))
}

/// Returns the black height of the subtree
#[cfg(test)]
fn check_subtree<T: IndexNode>(
    nodes: &Slab<T>,
    slot: Option<usize>,
    parent: Option<usize>,
    count: &mut usize,
) -> usize {
    let Some(slot) = slot else { return 1 };
    *count += 1;

    let link = *link(nodes, slot);
    assert_eq!(link.parent, parent, "index corrupted: bad parent link at slot {}", slot);
    if link.color == Color::Red {
        assert!(
            !is_red(nodes, link.left) && !is_red(nodes, link.right),
            "index corrupted: red slot {} has a red child",
            slot
        );
    }

    let left = check_subtree(nodes, link.left, Some(slot), count);
    let right = check_subtree(nodes, link.right, Some(slot), count);
    assert_eq!(left, right, "index corrupted: black height differs below slot {}", slot);

    left + usize::from(link.color == Color::Black)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        hash: u32,
        id: Vec<u8>,
        link: Link,
    }

    impl IndexNode for Node {
        fn link(&self) -> &Link {
            &self.link
        }

        fn link_mut(&mut self) -> &mut Link {
            &mut self.link
        }

        fn key(&self) -> (u32, &[u8]) {
            (self.hash, &self.id)
        }
    }

    fn add(index: &mut Index, nodes: &mut Slab<Node>, hash: u32, id: &[u8]) -> usize {
        let slot = nodes.insert(Node {
            hash,
            id: id.to_vec(),
            link: Link::default(),
        });
        index.insert(nodes, slot);
        index.validate(nodes);
        slot
    }

    fn in_order(index: &Index, nodes: &Slab<Node>) -> Vec<(u32, Vec<u8>)> {
        let mut out = Vec::new();
        let mut cur = index.first(nodes);
        while let Some(slot) = cur {
            out.push((nodes[slot].hash, nodes[slot].id.clone()));
            cur = Index::next(nodes, slot);
        }
        out
    }

    #[test]
    fn test_compare_ties_on_id() {
        assert_eq!(compare((1, &b"b"[..]), (2, &b"a"[..])), Ordering::Less);
        assert_eq!(compare((2, &b"ab"[..]), (2, &b"b"[..])), Ordering::Less);
        assert_eq!(compare((2, &b"ab"[..]), (2, &b"a"[..])), Ordering::Greater);
        assert_eq!(compare((2, &b"a"[..]), (2, &b"ab"[..])), Ordering::Less);
        assert_eq!(compare((2, &b"ab"[..]), (2, &b"ab"[..])), Ordering::Equal);
    }

    #[test]
    fn test_sequential_inserts_stay_balanced() {
        let mut index = Index::new();
        let mut nodes = Slab::new();

        for i in 0..256u32 {
            add(&mut index, &mut nodes, i, b"x");
        }

        assert_eq!(index.len(), 256);
        // red-black height bound: 2 * log2(n + 1)
        let mut depth = 0;
        let mut cur = index.root();
        while let Some(slot) = cur {
            depth += 1;
            cur = nodes[slot].link.left;
        }
        assert!(depth <= 17);
    }

    #[test]
    fn test_collisions_are_ordered_by_id() {
        let mut index = Index::new();
        let mut nodes = Slab::new();

        for id in [&b"delta"[..], b"alpha", b"charlie", b"bravo", b"al"] {
            add(&mut index, &mut nodes, 42, id);
        }
        add(&mut index, &mut nodes, 7, b"zulu");

        let ids: Vec<Vec<u8>> = in_order(&index, &nodes).into_iter().map(|(_, id)| id).collect();
        assert_eq!(
            ids,
            vec![
                b"zulu".to_vec(),
                b"al".to_vec(),
                b"alpha".to_vec(),
                b"bravo".to_vec(),
                b"charlie".to_vec(),
                b"delta".to_vec(),
            ]
        );

        for id in [&b"delta"[..], b"alpha", b"charlie", b"bravo", b"al"] {
            let slot = index.search(&nodes, (42, id)).unwrap();
            assert_eq!(nodes[slot].id, id);
        }
        assert!(index.search(&nodes, (42, &b"echo"[..])).is_none());
        assert!(index.search(&nodes, (43, &b"alpha"[..])).is_none());
    }

    #[test]
    fn test_remove_keeps_invariants() {
        let mut index = Index::new();
        let mut nodes = Slab::new();

        let slots: Vec<usize> = (0..64u32)
            .map(|i| add(&mut index, &mut nodes, i % 8, format!("id{}", i).as_bytes()))
            .collect();

        // remove every third node, then the rest
        for (n, &slot) in slots.iter().enumerate() {
            if n % 3 == 0 {
                index.remove(&mut nodes, slot);
                index.validate(&nodes);
                nodes.remove(slot);
            }
        }
        for (n, &slot) in slots.iter().enumerate() {
            if n % 3 != 0 {
                let key = (nodes[slot].hash, nodes[slot].id.clone());
                assert_eq!(index.search(&nodes, (key.0, key.1.as_slice())), Some(slot));
                index.remove(&mut nodes, slot);
                index.validate(&nodes);
                nodes.remove(slot);
            }
        }

        assert_eq!(index.len(), 0);
        assert!(index.root().is_none());
    }

    #[test]
    fn test_removed_node_is_unlinked() {
        let mut index = Index::new();
        let mut nodes = Slab::new();

        let a = add(&mut index, &mut nodes, 1, b"a");
        let b = add(&mut index, &mut nodes, 2, b"b");
        add(&mut index, &mut nodes, 3, b"c");

        index.remove(&mut nodes, b);
        assert_eq!(nodes[b].link, Link::default());
        assert!(index.search(&nodes, (2, &b"b"[..])).is_none());
        assert_eq!(index.search(&nodes, (1, &b"a"[..])), Some(a));
    }

    #[test]
    #[should_panic(expected = "index corrupted")]
    fn test_validate_detects_bad_parent() {
        let mut index = Index::new();
        let mut nodes = Slab::new();

        add(&mut index, &mut nodes, 1, b"a");
        let b = add(&mut index, &mut nodes, 2, b"b");
        nodes[b].link.parent = None;

        index.validate(&nodes);
    }
}
