//! Fast path for identical subtrees.
//!
//! The equality matcher walks both subtrees in lockstep and matches them
//! only if every aligned pair matches and the shapes agree. It never
//! dispatches through a parent matcher. Pairs proven unequal are remembered
//! so the dispatcher can skip repeating the attempt.

use std::collections::HashSet;
use std::time::Instant;

use tracing::trace;

use crate::artifact::{Artifact, Label, NodeId};
use crate::error::MatchResult;
use crate::matcher::MatcherInterface;
use crate::matching::{Algorithm, Matching, Matchings};

#[derive(Debug, Default)]
pub struct EqualityMatcher {
    did_not_match: HashSet<(NodeId, NodeId)>,
}

/// Unordered pair key.
fn key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl EqualityMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an earlier run found the pair `{a, b}` (in either order) not
    /// to be equal.
    pub fn did_not_match(&self, a: NodeId, b: NodeId) -> bool {
        self.did_not_match.contains(&key(a, b))
    }

    /// Number of pairs known to be unequal.
    pub fn rejected(&self) -> usize {
        self.did_not_match.len()
    }

    pub fn clear(&mut self) {
        self.did_not_match.clear();
    }
}

impl<T: Label> MatcherInterface<T> for EqualityMatcher {
    fn match_nodes(&mut self, left: Artifact<'_, T>, right: Artifact<'_, T>) -> MatchResult<Matchings> {
        let start = Instant::now();
        left.ensure_plain()?;
        right.ensure_plain()?;

        let mut matchings = Matchings::new();
        let mut direct_children = Vec::new();
        let mut all_matched = true;

        for (l, r) in left.children().zip(right.children()) {
            let child_matchings = self.match_nodes(l, r)?;

            match child_matchings.get(l.id(), r.id()) {
                Some(direct) => direct_children.push(direct.shallow()),
                None => all_matched = false,
            }

            matchings.add_all(child_matchings);
        }

        if all_matched && left.num_children() == right.num_children() && left.matches(&right) {
            let score = direct_children.iter().map(Matching::score).sum::<usize>() + 1;
            trace!(left = %left.id(), right = %right.id(), score, "Trees are equal");

            let matching = Matching::new(left.id(), right.id(), score, Algorithm::Equality)
                .with_children(direct_children)
                .with_runtime(start.elapsed());
            matchings.add(matching);
        } else {
            trace!(left = %left.id(), right = %right.id(), "Trees are not equal");
            self.did_not_match.insert(key(left.id(), right.id()));
        }

        Ok(matchings)
    }
}
