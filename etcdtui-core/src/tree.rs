//! Keyspace projection
//!
//! Turns the flat list of keys returned by the store into a navigable tree.
//! A node is identified by its normalized path (`/a/b`), which is what lets
//! cursor and expansion state survive a wholesale rebuild.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::Entry;

pub const ROOT_PATH: &str = "/";

/// A node of the projected keyspace.
///
/// A node carries an entry when its path is a store key, and children when
/// some other key passes through it. Both can be true at once (`/a` next to
/// `/a/b`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeNode {
    name: String,
    path: String,
    entry: Option<Entry>,
    children: BTreeMap<String, TreeNode>,
}

/// The role a node plays in the projection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole<'a> {
    Branch,
    Leaf(&'a Entry),
    BranchAndLeaf(&'a Entry),
}

impl<'a> NodeRole<'a> {
    pub fn entry(&self) -> Option<&'a Entry> {
        match self {
            NodeRole::Branch => None,
            NodeRole::Leaf(e) | NodeRole::BranchAndLeaf(e) => Some(e),
        }
    }
}

impl TreeNode {
    pub fn root() -> Self {
        Self {
            name: String::new(),
            path: ROOT_PATH.to_string(),
            entry: None,
            children: BTreeMap::new(),
        }
    }

    fn branch(name: &str, path: String) -> Self {
        Self {
            name: name.to_string(),
            path,
            entry: None,
            children: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn entry(&self) -> Option<&Entry> {
        self.entry.as_ref()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Children in lexicographic segment order.
    pub fn children(&self) -> impl Iterator<Item = &TreeNode> {
        self.children.values()
    }

    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children.get(name)
    }

    pub fn role(&self) -> NodeRole<'_> {
        match (&self.entry, self.has_children()) {
            (None, _) => NodeRole::Branch,
            (Some(e), false) => NodeRole::Leaf(e),
            (Some(e), true) => NodeRole::BranchAndLeaf(e),
        }
    }

    /// Look a node up by path. Slashes are normalized the same way keys are.
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        let mut node = self;
        for seg in segments(path) {
            node = node.children.get(seg)?;
        }
        Some(node)
    }

    /// Number of nodes in this subtree that carry an entry.
    pub fn leaf_count(&self) -> usize {
        let own = usize::from(self.entry.is_some());
        own + self.children.values().map(TreeNode::leaf_count).sum::<usize>()
    }

    /// Keys of every entry in the subtree, in traversal order.
    pub fn keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_keys(&mut out);
        out
    }

    fn collect_keys(&self, out: &mut Vec<String>) {
        if let Some(e) = &self.entry {
            out.push(e.key.clone());
        }
        for child in self.children.values() {
            child.collect_keys(out);
        }
    }
}

/// Non-empty `/`-separated segments of a key.
pub fn segments(key: &str) -> impl Iterator<Item = &str> {
    key.split('/').filter(|s| !s.is_empty())
}

/// Canonical node path for a key: leading slash, no empty segments.
pub fn normalize_path(key: &str) -> String {
    let mut out = String::new();
    for seg in segments(key) {
        out.push('/');
        out.push_str(seg);
    }
    if out.is_empty() {
        ROOT_PATH.to_string()
    } else {
        out
    }
}

/// Path of the parent node, `None` for the root.
pub fn parent_path(path: &str) -> Option<String> {
    let normalized = normalize_path(path);
    if normalized == ROOT_PATH {
        return None;
    }
    match normalized.rfind('/') {
        Some(0) | None => Some(ROOT_PATH.to_string()),
        Some(idx) => Some(normalized[..idx].to_string()),
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Project a flat set of entries into a tree rooted at `/`.
///
/// Keys with no non-empty segment are skipped. When two records map to the
/// same node, the one with the higher `mod_revision` is kept. A tie between
/// different raw keys goes to the greater key; a repeated key is last write
/// wins.
pub fn project<'a, I>(entries: I) -> TreeNode
where
    I: IntoIterator<Item = &'a Entry>,
{
    let mut root = TreeNode::root();

    for entry in entries {
        let mut parts = segments(&entry.key).peekable();
        if parts.peek().is_none() {
            continue;
        }

        let mut node = &mut root;
        for part in parts {
            let path = child_path(&node.path, part);
            node = node
                .children
                .entry(part.to_string())
                .or_insert_with(|| TreeNode::branch(part, path));
        }

        let replace = match &node.entry {
            None => true,
            Some(existing) => {
                (entry.mod_revision, &entry.key) >= (existing.mod_revision, &existing.key)
            }
        };
        if replace {
            node.entry = Some(entry.clone());
        }
    }

    root
}

/// One visible line of the tree pane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeRow {
    pub path: String,
    pub name: String,
    pub depth: usize,
    pub has_entry: bool,
    pub has_children: bool,
    pub expanded: bool,
}

/// Flatten the tree into rows, descending only into expanded nodes.
pub fn flatten(root: &TreeNode, expanded: &BTreeSet<String>) -> Vec<TreeRow> {
    let mut rows = Vec::new();
    for child in root.children() {
        push_rows(child, 0, expanded, &mut rows);
    }
    rows
}

fn push_rows(node: &TreeNode, depth: usize, expanded: &BTreeSet<String>, rows: &mut Vec<TreeRow>) {
    let is_expanded = node.has_children() && expanded.contains(&node.path);
    rows.push(TreeRow {
        path: node.path.clone(),
        name: node.name.clone(),
        depth,
        has_entry: node.entry.is_some(),
        has_children: node.has_children(),
        expanded: is_expanded,
    });
    if is_expanded {
        for child in node.children() {
            push_rows(child, depth + 1, expanded, rows);
        }
    }
}

/// Cursor and expansion state over a projected tree.
///
/// Both are stored as paths, so a rebuilt tree keeps the operator's place as
/// long as the nodes still exist.
#[derive(Clone, Debug, Default)]
pub struct TreeView {
    expanded: BTreeSet<String>,
    cursor: Option<String>,
}

impl TreeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.expanded.contains(path)
    }

    pub fn rows(&self, root: &TreeNode) -> Vec<TreeRow> {
        flatten(root, &self.expanded)
    }

    pub fn cursor_index(&self, rows: &[TreeRow]) -> Option<usize> {
        let cursor = self.cursor.as_deref()?;
        rows.iter().position(|r| r.path == cursor)
    }

    /// Move the cursor by `delta` visible rows, clamping at both ends.
    /// Returns the new cursor path.
    pub fn move_by(&mut self, root: &TreeNode, delta: isize) -> Option<&str> {
        let rows = self.rows(root);
        if rows.is_empty() {
            self.cursor = None;
            return None;
        }
        let next = match self.cursor_index(&rows) {
            None => 0,
            Some(idx) => {
                let target = idx as isize + delta;
                target.clamp(0, rows.len() as isize - 1) as usize
            }
        };
        self.cursor = Some(rows[next].path.clone());
        self.cursor.as_deref()
    }

    pub fn move_first(&mut self, root: &TreeNode) -> Option<&str> {
        self.cursor = self.rows(root).first().map(|r| r.path.clone());
        self.cursor.as_deref()
    }

    pub fn move_last(&mut self, root: &TreeNode) -> Option<&str> {
        self.cursor = self.rows(root).last().map(|r| r.path.clone());
        self.cursor.as_deref()
    }

    pub fn expand(&mut self, root: &TreeNode, path: &str) {
        if root.find(path).is_some_and(TreeNode::has_children) {
            self.expanded.insert(normalize_path(path));
        }
    }

    /// Collapse `path`. A cursor hidden inside the collapsed subtree moves to
    /// the collapsed node.
    pub fn collapse(&mut self, path: &str) {
        let path = normalize_path(path);
        self.expanded.remove(&path);
        if let Some(cursor) = &self.cursor {
            let prefix = format!("{}/", path);
            if cursor.starts_with(&prefix) {
                self.cursor = Some(path);
            }
        }
    }

    pub fn toggle(&mut self, root: &TreeNode, path: &str) {
        if self.is_expanded(&normalize_path(path)) {
            self.collapse(path);
        } else {
            self.expand(root, path);
        }
    }

    /// Collapse the node under the cursor, or step to its parent when it is
    /// already collapsed.
    pub fn collapse_or_parent(&mut self, root: &TreeNode) -> Option<&str> {
        let cursor = self.cursor.clone()?;
        if self.is_expanded(&cursor) {
            self.collapse(&cursor);
        } else if let Some(parent) = parent_path(&cursor) {
            if parent != ROOT_PATH && root.find(&parent).is_some() {
                self.cursor = Some(parent);
            }
        }
        self.cursor.as_deref()
    }

    /// Expand every ancestor of `path` and put the cursor on it.
    pub fn reveal(&mut self, root: &TreeNode, path: &str) {
        let path = normalize_path(path);
        let mut ancestor = parent_path(&path);
        while let Some(p) = ancestor {
            if p == ROOT_PATH {
                break;
            }
            self.expanded.insert(p.clone());
            ancestor = parent_path(&p);
        }
        if root.find(&path).is_some() {
            self.cursor = Some(path);
        }
    }

    /// Re-anchor the view after the tree was rebuilt.
    ///
    /// Expansion entries for vanished nodes are dropped. A cursor whose node
    /// vanished falls back to its nearest surviving ancestor, then to the
    /// first row.
    pub fn reconcile(&mut self, root: &TreeNode) {
        self.expanded
            .retain(|p| root.find(p).is_some_and(TreeNode::has_children));

        let Some(cursor) = self.cursor.clone() else {
            self.cursor = self.rows(root).first().map(|r| r.path.clone());
            return;
        };

        let mut candidate = Some(cursor);
        while let Some(path) = candidate {
            if path == ROOT_PATH {
                break;
            }
            if root.find(&path).is_some() {
                self.cursor = Some(path);
                return;
            }
            candidate = parent_path(&path);
        }
        self.cursor = self.rows(root).first().map(|r| r.path.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<Entry> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, (k, v))| Entry::new(*k, *v).with_revisions(1, i as i64 + 1, 1))
            .collect()
    }

    #[test]
    fn test_single_nested_key() {
        let tree = project(&entries(&[("/a/b", "v")]));

        let a = tree.child("a").unwrap();
        assert_eq!(a.role(), NodeRole::Branch);
        assert!(a.entry().is_none());
        assert_eq!(a.path(), "/a");

        let b = a.child("b").unwrap();
        match b.role() {
            NodeRole::Leaf(e) => assert_eq!(e.value, "v"),
            other => panic!("expected leaf, got {:?}", other),
        }
        assert_eq!(b.path(), "/a/b");
    }

    #[test]
    fn test_prefix_key_is_branch_and_leaf() {
        let tree = project(&entries(&[("/a", "1"), ("/a/b", "2"), ("/a/b/c", "3")]));

        let a = tree.find("/a").unwrap();
        assert!(matches!(a.role(), NodeRole::BranchAndLeaf(e) if e.value == "1"));
        let b = tree.find("/a/b").unwrap();
        assert!(matches!(b.role(), NodeRole::BranchAndLeaf(e) if e.value == "2"));
        let c = tree.find("/a/b/c").unwrap();
        assert!(matches!(c.role(), NodeRole::Leaf(_)));
    }

    #[test]
    fn test_order_independent_and_idempotent() {
        let base = entries(&[
            ("/services/api/v1/config", "a"),
            ("/services/api/v1/endpoints", "b"),
            ("/services/auth/jwt-secret", "c"),
            ("/config/database-url", "d"),
            ("/config", "e"),
            ("/locks/payment", "f"),
        ]);
        let expected = project(&base);
        assert_eq!(project(&base), expected);

        let mut reversed = base.clone();
        reversed.reverse();
        assert_eq!(project(&reversed), expected);

        let mut rotated = base.clone();
        rotated.rotate_left(2);
        assert_eq!(project(&rotated), expected);
    }

    #[test]
    fn test_leaf_set_matches_input_keys() {
        let input = entries(&[("/x/y", "1"), ("/x", "2"), ("/z", "3"), ("/x/y/w", "4")]);
        let tree = project(&input);

        let mut keys = tree.keys();
        keys.sort();
        let mut expected: Vec<String> = input.iter().map(|e| e.key.clone()).collect();
        expected.sort();
        assert_eq!(keys, expected);
        assert_eq!(tree.leaf_count(), 4);
    }

    #[test]
    fn test_slashes_collapse() {
        let tree = project(&entries(&[("//a///b/", "v")]));
        assert!(tree.find("/a/b").and_then(TreeNode::entry).is_some());
        assert_eq!(normalize_path("//a///b/"), "/a/b");
    }

    #[test]
    fn test_empty_keys_ignored() {
        let tree = project(&entries(&[("", "x"), ("///", "y")]));
        assert!(!tree.has_children());
        assert!(tree.entry().is_none());
    }

    #[test]
    fn test_duplicate_key_last_write_wins() {
        let first = Entry::new("/k", "old").with_revisions(1, 5, 1);
        let second = Entry::new("/k", "new").with_revisions(1, 5, 1);
        let tree = project([&first, &second]);
        assert_eq!(tree.find("/k").unwrap().entry().unwrap().value, "new");
    }

    #[test]
    fn test_colliding_paths_prefer_newer_revision() {
        let newer = Entry::new("/k", "newer").with_revisions(1, 9, 2);
        let older = Entry::new("k/", "older").with_revisions(1, 3, 1);
        let a = project([&newer, &older]);
        let b = project([&older, &newer]);
        assert_eq!(a, b);
        assert_eq!(a.find("/k").unwrap().entry().unwrap().value, "newer");

        let slash_first = Entry::new("/k", "one").with_revisions(1, 7, 1);
        let slash_last = Entry::new("k/", "two").with_revisions(1, 7, 1);
        let a = project([&slash_first, &slash_last]);
        let b = project([&slash_last, &slash_first]);
        assert_eq!(a, b);
        assert_eq!(a.find("/k").unwrap().entry().unwrap().key, "k/");
    }

    #[test]
    fn test_repeated_key_last_write_wins() {
        let first = Entry::new("/k", "first").with_revisions(1, 4, 1);
        let second = Entry::new("/k", "second").with_revisions(1, 4, 1);
        let tree = project([&first, &second]);
        assert_eq!(tree.find("/k").unwrap().entry().unwrap().value, "second");
    }

    #[test]
    fn test_children_sorted() {
        let tree = project(&entries(&[("/c", ""), ("/a", ""), ("/b", "")]));
        let names: Vec<&str> = tree.children().map(TreeNode::name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_flatten_respects_expansion() {
        let tree = project(&entries(&[("/a/b", ""), ("/a/c", ""), ("/d", "")]));
        let mut view = TreeView::new();

        let rows = view.rows(&tree);
        let paths: Vec<&str> = rows.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/d"]);

        view.expand(&tree, "/a");
        let rows = view.rows(&tree);
        let paths: Vec<&str> = rows.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/a/b", "/a/c", "/d"]);
        assert_eq!(rows[1].depth, 1);
    }

    #[test]
    fn test_cursor_survives_rebuild() {
        let tree = project(&entries(&[("/a/b", ""), ("/a/c", ""), ("/d", "")]));
        let mut view = TreeView::new();
        view.reveal(&tree, "/a/c");
        assert_eq!(view.cursor(), Some("/a/c"));

        let rebuilt = project(&entries(&[("/0", ""), ("/a/b", ""), ("/a/c", "")]));
        view.reconcile(&rebuilt);
        assert_eq!(view.cursor(), Some("/a/c"));
        assert!(view.is_expanded("/a"));
    }

    #[test]
    fn test_cursor_falls_back_to_ancestor() {
        let tree = project(&entries(&[("/a/b", ""), ("/a/c", "")]));
        let mut view = TreeView::new();
        view.reveal(&tree, "/a/b");

        let rebuilt = project(&entries(&[("/a/c", "")]));
        view.reconcile(&rebuilt);
        assert_eq!(view.cursor(), Some("/a"));

        let empty = project(&Vec::<Entry>::new());
        view.reconcile(&empty);
        assert_eq!(view.cursor(), None);
    }

    #[test]
    fn test_move_clamps() {
        let tree = project(&entries(&[("/a", ""), ("/b", "")]));
        let mut view = TreeView::new();
        assert_eq!(view.move_by(&tree, 1), Some("/a"));
        assert_eq!(view.move_by(&tree, 5), Some("/b"));
        assert_eq!(view.move_by(&tree, -9), Some("/a"));
    }

    #[test]
    fn test_collapse_moves_hidden_cursor() {
        let tree = project(&entries(&[("/a/b/c", "")]));
        let mut view = TreeView::new();
        view.reveal(&tree, "/a/b/c");
        view.collapse("/a");
        assert_eq!(view.cursor(), Some("/a"));
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/a/b").as_deref(), Some("/a"));
        assert_eq!(parent_path("/a").as_deref(), Some("/"));
        assert_eq!(parent_path("/"), None);
    }
}
