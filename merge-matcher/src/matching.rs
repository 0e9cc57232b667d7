//! Correspondence records produced by the matchers.
//!
//! A [`Matching`] links one node of the left tree to one node of the right
//! tree and carries a score: the number of node pairs in the two subtrees that
//! were matched recursively, counting the pair itself. A score of zero is a
//! negative verdict ("these two were compared and do not correspond"), which
//! lets parents look up the outcome for a child pair uniformly.
//!
//! [`Matchings`] is the insertion-ordered set of such records for one pair of
//! trees, keyed by the (left, right) identity pair.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::artifact::NodeId;

/// Which matcher produced a matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    Equality,
    Ordered,
    Unordered,
    CostModel,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Equality => write!(f, "equality"),
            Algorithm::Ordered => write!(f, "ordered"),
            Algorithm::Unordered => write!(f, "unordered"),
            Algorithm::CostModel => write!(f, "cost-model"),
        }
    }
}

/// Highlight color attached when a matching is stored, for debug output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    #[default]
    Default,
    Red,
    Green,
    Yellow,
    Blue,
}

/// A discovered correspondence between a left and a right node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matching {
    left: NodeId,
    right: NodeId,
    score: usize,
    algorithm: Algorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    runtime: Option<Duration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Matching>,
}

impl Matching {
    pub fn new(left: NodeId, right: NodeId, score: usize, algorithm: Algorithm) -> Self {
        Self {
            left,
            right,
            score,
            algorithm,
            color: None,
            runtime: None,
            children: Vec::new(),
        }
    }

    /// Attaches the matchings of the direct children that make up this
    /// matching's score.
    pub fn with_children(mut self, children: Vec<Matching>) -> Self {
        self.children = children;
        self
    }

    pub fn with_runtime(mut self, runtime: Duration) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn left(&self) -> NodeId {
        self.left
    }

    pub fn right(&self) -> NodeId {
        self.right
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn runtime(&self) -> Option<Duration> {
        self.runtime
    }

    pub fn children(&self) -> &[Matching] {
        &self.children
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.left == node || self.right == node
    }

    /// The partner of `node` in this matching, if `node` is one of its ends.
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if node == self.left {
            Some(self.right)
        } else if node == self.right {
            Some(self.left)
        } else {
            None
        }
    }

    /// Share of the larger of the two subtrees covered by the score.
    pub fn percentage(&self, left_size: usize, right_size: usize) -> f64 {
        let larger = left_size.max(right_size);
        if larger == 0 {
            0.0
        } else {
            self.score as f64 / larger as f64
        }
    }

    /// A copy of this matching without nested children, as kept in the node
    /// annotation table.
    pub fn shallow(&self) -> Self {
        Self {
            children: Vec::new(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Matching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) = {} [{}]",
            self.left, self.right, self.score, self.algorithm
        )
    }
}

/// Insertion-ordered set of matchings over one pair of trees.
#[derive(Debug, Clone, Default)]
pub struct Matchings {
    entries: Vec<Matching>,
    index: HashMap<(NodeId, NodeId), usize>,
}

impl Matchings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(matching: Matching) -> Self {
        let mut matchings = Self::new();
        matchings.add(matching);
        matchings
    }

    /// Adds `matching` unless a matching for the same node pair is present.
    /// Returns whether it was added.
    pub fn add(&mut self, matching: Matching) -> bool {
        let key = (matching.left, matching.right);
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(matching);
        true
    }

    pub fn add_all(&mut self, other: Matchings) {
        for matching in other.entries {
            self.add(matching);
        }
    }

    /// The matching for exactly this node pair.
    pub fn get(&self, left: NodeId, right: NodeId) -> Option<&Matching> {
        self.index.get(&(left, right)).map(|&i| &self.entries[i])
    }

    /// The first matching whose left end is `left`.
    pub fn get_by_left(&self, left: NodeId) -> Option<&Matching> {
        self.entries.iter().find(|m| m.left == left)
    }

    /// The first matching whose right end is `right`.
    pub fn get_by_right(&self, right: NodeId) -> Option<&Matching> {
        self.entries.iter().find(|m| m.right == right)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Matching> {
        self.entries.iter()
    }

    /// Resolves overlaps into a consistent subset: matchings are taken in
    /// descending score order (insertion order among equal scores) as long as
    /// neither end is already used. Score-0 verdicts are dropped.
    pub fn optimized(&self) -> Matchings {
        let mut sorted: Vec<&Matching> = self.entries.iter().filter(|m| m.score > 0).collect();
        sorted.sort_by(|a, b| b.score.cmp(&a.score));

        let mut used_left = HashSet::new();
        let mut used_right = HashSet::new();
        let mut result = Matchings::new();

        for matching in sorted {
            if used_left.contains(&matching.left) || used_right.contains(&matching.right) {
                continue;
            }
            used_left.insert(matching.left);
            used_right.insert(matching.right);
            result.add(matching.shallow());
        }

        result
    }
}

impl IntoIterator for Matchings {
    type Item = Matching;
    type IntoIter = std::vec::IntoIter<Matching>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Matchings {
    type Item = &'a Matching;
    type IntoIter = std::slice::Iter<'a, Matching>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<Matching> for Matchings {
    fn from_iter<I: IntoIterator<Item = Matching>>(iter: I) -> Self {
        let mut matchings = Matchings::new();
        for matching in iter {
            matchings.add(matching);
        }
        matchings
    }
}

/// Side table of matchings attached to nodes, owned by the merge engine.
///
/// Trees stay read-only during matching; the only mutation of node state is
/// recording stored matchings here. A store is single-writer: concurrent
/// stores for the same tree pair must be serialized by the caller.
#[derive(Debug, Default)]
pub struct MatchingStore {
    by_node: HashMap<NodeId, Vec<Matching>>,
}

impl MatchingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `matching` on both of its end nodes.
    pub fn add_matching(&mut self, matching: &Matching) {
        let record = matching.shallow();
        self.by_node
            .entry(matching.left)
            .or_default()
            .push(record.clone());
        self.by_node.entry(matching.right).or_default().push(record);
    }

    pub fn matchings_of(&self, node: NodeId) -> &[Matching] {
        self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_matching(&self, node: NodeId) -> bool {
        !self.matchings_of(node).is_empty()
    }

    /// The node `node` was most recently matched with.
    pub fn partner(&self, node: NodeId) -> Option<NodeId> {
        self.matchings_of(node).last().and_then(|m| m.other(node))
    }

    /// Number of annotated nodes.
    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(l: usize, r: usize, score: usize) -> Matching {
        Matching::new(NodeId(l), NodeId(r), score, Algorithm::Ordered)
    }

    #[test]
    fn test_set_semantics() {
        let mut matchings = Matchings::new();
        assert!(matchings.add(m(1, 10, 3)));
        assert!(!matchings.add(m(1, 10, 5)));
        assert_eq!(matchings.len(), 1);
        assert_eq!(matchings.get(NodeId(1), NodeId(10)).unwrap().score(), 3);
        assert!(matchings.get(NodeId(10), NodeId(1)).is_none());
    }

    #[test]
    fn test_lookup_by_side() {
        let matchings: Matchings = vec![m(1, 10, 2), m(2, 11, 1)].into_iter().collect();
        assert_eq!(matchings.get_by_left(NodeId(2)).unwrap().right(), NodeId(11));
        assert_eq!(matchings.get_by_right(NodeId(10)).unwrap().left(), NodeId(1));
        assert!(matchings.get_by_left(NodeId(10)).is_none());
    }

    #[test]
    fn test_optimized_resolves_overlaps() {
        let matchings: Matchings = vec![m(1, 10, 2), m(1, 11, 5), m(2, 11, 4), m(2, 12, 1), m(3, 13, 0)]
            .into_iter()
            .collect();
        let optimized = matchings.optimized();

        assert_eq!(optimized.len(), 2);
        assert!(optimized.get(NodeId(1), NodeId(11)).is_some());
        assert!(optimized.get(NodeId(2), NodeId(12)).is_some());
        assert!(optimized.get(NodeId(3), NodeId(13)).is_none());
    }

    #[test]
    fn test_store_records_both_ends() {
        let mut store = MatchingStore::new();
        let matching = m(1, 10, 2).with_children(vec![m(2, 11, 1)]);
        store.add_matching(&matching);

        assert_eq!(store.partner(NodeId(1)), Some(NodeId(10)));
        assert_eq!(store.partner(NodeId(10)), Some(NodeId(1)));
        assert!(store.matchings_of(NodeId(1))[0].children().is_empty());
        assert!(!store.has_matching(NodeId(2)));
    }

    #[test]
    fn test_percentage() {
        assert!((m(1, 2, 3).percentage(3, 6) - 0.5).abs() < f64::EPSILON);
        assert_eq!(m(1, 2, 0).percentage(0, 0), 0.0);
    }
}
