//! Ordered child matching.
//!
//! A weighted longest-common-subsequence over the two child sequences
//! (Yang's algorithm): `scores[i][j]` is the best total child score for the
//! first `i` left children and the first `j` right children. Child pair
//! weights come from recursive dispatch through the parent matcher.
//!
//! Time complexity: O(n * m) child comparisons.

use std::time::Instant;

use tracing::trace;

use crate::artifact::{Artifact, Label};
use crate::error::MatchResult;
use crate::matcher::MatcherInterface;
use crate::matching::{Algorithm, Matching, Matchings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Skip a right child.
    Left,
    /// Skip a left child.
    Top,
    Diag,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedMatcher;

impl OrderedMatcher {
    /// Matches `left` and `right`, aligning their children as sequences.
    /// Child pairs are matched through `parent`.
    pub fn match_with<T, M>(&self, parent: &mut M, left: Artifact<'_, T>, right: Artifact<'_, T>) -> MatchResult<Matchings>
    where
        T: Label,
        M: MatcherInterface<T> + ?Sized,
    {
        let start = Instant::now();
        let (l_id, r_id) = (left.id(), right.id());

        // Differing roots still align their children; the pair itself then
        // adds nothing to the score.
        let root = usize::from(left.matches(&right));

        let left_children: Vec<_> = left.children().collect();
        let right_children: Vec<_> = right.children().collect();
        let m = left_children.len();
        let n = right_children.len();

        if m == 0 || n == 0 {
            return Ok(Matchings::of(
                Matching::new(l_id, r_id, root, Algorithm::Ordered).with_runtime(start.elapsed()),
            ));
        }

        let mut scores = vec![vec![0usize; n + 1]; m + 1];
        let mut directions = vec![vec![Direction::Diag; n + 1]; m + 1];
        let mut cells: Vec<Vec<Option<Matchings>>> = (0..m).map(|_| vec![None; n]).collect();

        for i in 1..=m {
            for j in 1..=n {
                let (lc, rc) = (left_children[i - 1], right_children[j - 1]);
                let child = parent.match_nodes(lc, rc)?;
                let weight = child.get(lc.id(), rc.id()).map_or(0, Matching::score);

                let diag = scores[i - 1][j - 1] + weight;
                let top = scores[i - 1][j];
                let skip = scores[i][j - 1];

                // Ties go to the diagonal.
                let (score, direction) = if top > skip {
                    if top > diag { (top, Direction::Top) } else { (diag, Direction::Diag) }
                } else if skip > diag {
                    (skip, Direction::Left)
                } else {
                    (diag, Direction::Diag)
                };

                scores[i][j] = score;
                directions[i][j] = direction;
                cells[i - 1][j - 1] = Some(child);
            }
        }

        let mut direct_children = Vec::new();
        let mut picked = Vec::new();
        let (mut i, mut j) = (m, n);

        while i > 0 && j > 0 {
            match directions[i][j] {
                Direction::Top => i -= 1,
                Direction::Left => j -= 1,
                Direction::Diag => {
                    if scores[i][j] > scores[i - 1][j - 1] {
                        if let Some(child) = cells[i - 1][j - 1].take() {
                            let (lc, rc) = (left_children[i - 1], right_children[j - 1]);
                            if let Some(direct) = child.get(lc.id(), rc.id()) {
                                direct_children.push(direct.shallow());
                            }
                            picked.push(child);
                        }
                    }
                    i -= 1;
                    j -= 1;
                }
            }
        }

        direct_children.reverse();
        let score = scores[m][n] + root;
        trace!(left = %l_id, right = %r_id, score, "Ordered match");

        let mut matchings = Matchings::of(
            Matching::new(l_id, r_id, score, Algorithm::Ordered)
                .with_children(direct_children)
                .with_runtime(start.elapsed()),
        );
        for child in picked.into_iter().rev() {
            matchings.add_all(child);
        }

        Ok(matchings)
    }
}
