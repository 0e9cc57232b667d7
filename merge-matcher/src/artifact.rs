//! The tree model the matchers operate on.
//!
//! Trees are described by an owned, recursive [`ArtifactNode`] (what a parser
//! or a JSON document produces) and frozen into an arena-backed [`Tree`]
//! before matching starts. Matchers only ever see [`Artifact`] handles, which
//! are `Copy` and carry a reference to their tree, so parent and child
//! navigation needs no lookups.
//!
//! Every tree reserves a contiguous block of identities from a process-wide
//! counter. A [`NodeId`] is therefore unique across all trees, which lets a
//! single map key nodes from both sides of a comparison.

use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, MatchResult};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Reserves `count` consecutive identities and returns the first one.
fn reserve_ids(count: usize) -> usize {
    NEXT_ID.fetch_add(count, Ordering::Relaxed)
}

/// Process-wide unique identity of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Content-equality predicate of a node, independent of its position.
pub trait Label: fmt::Debug + Send + Sync {
    fn matches(&self, other: &Self) -> bool;
}

impl Label for String {
    fn matches(&self, other: &Self) -> bool {
        self == other
    }
}

impl Label for &str {
    fn matches(&self, other: &Self) -> bool {
        self == other
    }
}

/// Label of a concrete syntax tree node: a grammar kind plus, for terminals,
/// the literal text.
///
/// Two labels match when their kinds are identical and their values agree.
/// A terminal never matches a non-terminal of the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CstLabel {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl CstLabel {
    pub fn node(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: None,
        }
    }

    pub fn leaf(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: Some(value.into()),
        }
    }
}

impl Label for CstLabel {
    fn matches(&self, other: &Self) -> bool {
        self.kind == other.kind && self.value == other.value
    }
}

impl fmt::Display for CstLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}({})", self.kind, value),
            None => f.write_str(&self.kind),
        }
    }
}

/// Structural role of a node. Only plain nodes can be matched; choice
/// (variational) and conflict nodes only appear in merge output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMarker {
    #[default]
    Plain,
    Choice,
    Conflict,
}

impl NodeMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeMarker::Plain => "plain",
            NodeMarker::Choice => "choice",
            NodeMarker::Conflict => "conflict",
        }
    }
}

/// Owned description of a (sub)tree, as handed over by a tree builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ArtifactNode<T> {
    pub content: T,
    /// Whether this node's position among its siblings is significant.
    #[serde(default)]
    pub ordered: bool,
    #[serde(default)]
    pub marker: NodeMarker,
    #[serde(default)]
    pub children: Vec<ArtifactNode<T>>,
}

impl<T> ArtifactNode<T> {
    pub fn new(content: T, children: Vec<ArtifactNode<T>>) -> Self {
        Self {
            content,
            ordered: false,
            marker: NodeMarker::Plain,
            children,
        }
    }

    pub fn leaf(content: T) -> Self {
        Self::new(content, Vec::new())
    }

    /// Flags this node as order-significant among its siblings.
    pub fn mark_ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    pub fn with_marker(mut self, marker: NodeMarker) -> Self {
        self.marker = marker;
        self
    }

    /// Total number of nodes in this subtree.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(|c| c.size()).sum::<usize>()
    }
}

#[derive(Debug)]
struct NodeData<T> {
    parent: Option<usize>,
    children: Vec<usize>,
    content: T,
    ordered: bool,
    marker: NodeMarker,
    size: usize,
}

/// A frozen tree. Nodes are stored in pre-order, so every subtree occupies a
/// contiguous index range.
#[derive(Debug)]
pub struct Tree<T> {
    base: usize,
    nodes: Vec<NodeData<T>>,
}

impl<T> Tree<T> {
    pub fn new(root: ArtifactNode<T>) -> Self {
        let count = root.size();
        let base = reserve_ids(count);
        let mut nodes = Vec::with_capacity(count);
        Self::flatten(root, None, &mut nodes);
        Self { base, nodes }
    }

    fn flatten(node: ArtifactNode<T>, parent: Option<usize>, nodes: &mut Vec<NodeData<T>>) -> usize {
        let index = nodes.len();
        let ArtifactNode {
            content,
            ordered,
            marker,
            children,
        } = node;

        nodes.push(NodeData {
            parent,
            children: Vec::with_capacity(children.len()),
            content,
            ordered,
            marker,
            size: 1,
        });

        for child in children {
            let child_index = Self::flatten(child, Some(index), nodes);
            let child_size = nodes[child_index].size;
            let data = &mut nodes[index];
            data.children.push(child_index);
            data.size += child_size;
        }

        index
    }

    pub fn root(&self) -> Artifact<'_, T> {
        Artifact {
            tree: self,
            index: 0,
        }
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 >= self.base && id.0 < self.base + self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> Option<Artifact<'_, T>> {
        self.contains(id).then(|| Artifact {
            tree: self,
            index: id.0 - self.base,
        })
    }

    /// All nodes in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = Artifact<'_, T>> + '_ {
        (0..self.nodes.len()).map(move |index| Artifact { tree: self, index })
    }
}

/// Handle to one node of a [`Tree`].
pub struct Artifact<'t, T> {
    tree: &'t Tree<T>,
    index: usize,
}

impl<T> Clone for Artifact<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Artifact<'_, T> {}

impl<'t, T> Artifact<'t, T> {
    fn data(&self) -> &'t NodeData<T> {
        &self.tree.nodes[self.index]
    }

    fn at(&self, index: usize) -> Artifact<'t, T> {
        Artifact {
            tree: self.tree,
            index,
        }
    }

    pub fn id(&self) -> NodeId {
        NodeId(self.tree.base + self.index)
    }

    pub fn tree(&self) -> &'t Tree<T> {
        self.tree
    }

    pub fn content(&self) -> &'t T {
        &self.data().content
    }

    pub fn is_ordered(&self) -> bool {
        self.data().ordered
    }

    pub fn marker(&self) -> NodeMarker {
        self.data().marker
    }

    /// Fails with [`MatchError::Unsupported`] unless this is a plain node.
    pub fn ensure_plain(&self) -> MatchResult<()> {
        match self.marker() {
            NodeMarker::Plain => Ok(()),
            other => Err(MatchError::Unsupported {
                node: self.id(),
                marker: other.as_str(),
            }),
        }
    }

    pub fn parent(&self) -> Option<Artifact<'t, T>> {
        self.data().parent.map(|index| self.at(index))
    }

    pub fn is_leaf(&self) -> bool {
        self.data().children.is_empty()
    }

    pub fn num_children(&self) -> usize {
        self.data().children.len()
    }

    pub fn child(&self, i: usize) -> Option<Artifact<'t, T>> {
        self.data().children.get(i).map(|&index| self.at(index))
    }

    pub fn children(&self) -> impl ExactSizeIterator<Item = Artifact<'t, T>> + use<'t, T> {
        let tree = self.tree;
        self.data()
            .children
            .iter()
            .map(move |&index| Artifact { tree, index })
    }

    /// Whether `other` is a direct child of this node.
    pub fn has_child(&self, other: &Artifact<'_, T>) -> bool {
        std::ptr::eq(self.tree, other.tree) && other.data().parent == Some(self.index)
    }

    /// Cached number of nodes in the subtree rooted here.
    pub fn tree_size(&self) -> usize {
        self.data().size
    }

    /// Whether `other` lies in the subtree rooted at this node (inclusive).
    pub fn subtree_contains(&self, other: &Artifact<'_, T>) -> bool {
        std::ptr::eq(self.tree, other.tree)
            && other.index >= self.index
            && other.index < self.index + self.tree_size()
    }

    /// The subtree rooted here in pre-order.
    pub fn dfs(&self) -> Vec<Artifact<'t, T>> {
        (self.index..self.index + self.tree_size())
            .map(|index| self.at(index))
            .collect()
    }

    /// The subtree rooted here in breadth-first order.
    pub fn bfs(&self) -> Vec<Artifact<'t, T>> {
        let mut out = Vec::with_capacity(self.tree_size());
        let mut queue = VecDeque::from([*self]);
        while let Some(node) = queue.pop_front() {
            out.push(node);
            queue.extend(node.children());
        }
        out
    }

    /// This node followed by its ancestors, ending with the tree root.
    pub fn path_to_root(&self) -> Vec<Artifact<'t, T>> {
        let mut path = vec![*self];
        let mut current = *self;
        while let Some(parent) = current.parent() {
            path.push(parent);
            current = parent;
        }
        path
    }
}

impl<T: Label> Artifact<'_, T> {
    pub fn matches(&self, other: &Artifact<'_, T>) -> bool {
        self.content().matches(other.content())
    }
}

impl<T> PartialEq for Artifact<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<T> Eq for Artifact<'_, T> {}

impl<T> Hash for Artifact<'_, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Artifact<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{}", self.content(), self.id())
    }
}

impl<T: fmt::Display> fmt::Display for Artifact<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.content(), self.id())
    }
}
