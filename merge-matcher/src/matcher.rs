//! Per-node-pair matching dispatch.
//!
//! [`Matcher`] decides for every pair of nodes how their children are
//! compared: if any direct child on either side is order-significant the
//! children are aligned as sequences ([`OrderedMatcher`]), otherwise they are
//! paired as sets ([`UnorderedMatcher`]). Both strategies recurse into child
//! pairs through the same [`MatcherInterface`], so the policy applies at every
//! level. When enabled, the [`EqualityMatcher`] is tried first as a fast path
//! for identical subtrees.

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::artifact::{Artifact, Label, Tree};
use crate::config::MatcherConfig;
use crate::cost_model::CostModelMatcher;
use crate::equality::EqualityMatcher;
use crate::error::MatchResult;
use crate::matching::{Algorithm, Color, Matching, Matchings, MatchingStore};
use crate::ordered::OrderedMatcher;
use crate::unordered::UnorderedMatcher;

/// The capability shared by every matcher: compute the matchings between the
/// subtrees rooted at `left` and `right`.
pub trait MatcherInterface<T: Label> {
    fn match_nodes(&mut self, left: Artifact<'_, T>, right: Artifact<'_, T>) -> MatchResult<Matchings>;
}

/// Diagnostic call counters of a [`Matcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatcherStats {
    /// Dispatches to the ordered or unordered matcher.
    pub calls: usize,
    pub ordered_calls: usize,
    pub unordered_calls: usize,
    pub equality_attempts: usize,
    /// Equality attempts that proved the pair identical.
    pub equality_hits: usize,
}

impl MatcherStats {
    /// Every dispatch goes to exactly one of the two strategies.
    pub fn is_consistent(&self) -> bool {
        self.calls == self.ordered_calls + self.unordered_calls
    }

    pub fn summary(&self) -> String {
        format!(
            "matcher calls (all/ordered/unordered): {}/{}/{}",
            self.calls, self.ordered_calls, self.unordered_calls
        )
    }
}

/// Recursive matcher dispatching between the ordered and unordered
/// strategies.
#[derive(Debug)]
pub struct Matcher {
    config: MatcherConfig,
    stats: MatcherStats,
    equality: EqualityMatcher,
    ordered: OrderedMatcher,
    unordered: UnorderedMatcher,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            stats: MatcherStats::default(),
            equality: EqualityMatcher::new(),
            ordered: OrderedMatcher,
            unordered: UnorderedMatcher,
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn stats(&self) -> MatcherStats {
        self.stats
    }

    /// The equality matcher, whose negative results can be queried with
    /// [`EqualityMatcher::did_not_match`].
    pub fn equality(&self) -> &EqualityMatcher {
        &self.equality
    }

    /// Clears the call counters and the equality matcher's negative results.
    pub fn reset(&mut self) {
        self.stats = MatcherStats::default();
        self.equality.clear();
    }

    /// Matches two whole trees: recursive dispatch on the roots, optionally
    /// refined by the cost-model matcher with the recursive result fixed.
    pub fn match_trees<T: Label>(&mut self, left: &Tree<T>, right: &Tree<T>) -> MatchResult<Matchings> {
        let (l, r) = (left.root(), right.root());
        info!(left = %l.id(), right = %r.id(), "Matching trees");

        let matchings = self.match_nodes(l, r)?;
        debug!("{}", self.stats.summary());

        if !self.config.use_cost_model {
            return Ok(matchings);
        }

        let mut cost_model = CostModelMatcher::new(self.config.cost_model.clone());
        match cost_model.match_with_prefixed(l, r, &matchings) {
            Ok(refined) => Ok(refined),
            Err(e) if self.config.fallback_on_cost_model_error => {
                warn!(error = %e, "Cost model matching failed, keeping recursive matchings");
                Ok(matchings)
            }
            Err(e) => Err(e),
        }
    }

    /// Aligns the children of `left` and `right` as sequences regardless of
    /// their order flags. Deeper levels are dispatched as usual.
    pub fn match_ordered<T: Label>(&mut self, left: Artifact<'_, T>, right: Artifact<'_, T>) -> MatchResult<Matchings> {
        left.ensure_plain()?;
        right.ensure_plain()?;
        self.stats.calls += 1;
        self.stats.ordered_calls += 1;
        let strategy = self.ordered;
        strategy.match_with(self, left, right)
    }

    /// Pairs the children of `left` and `right` as sets regardless of their
    /// order flags. Deeper levels are dispatched as usual.
    pub fn match_unordered<T: Label>(&mut self, left: Artifact<'_, T>, right: Artifact<'_, T>) -> MatchResult<Matchings> {
        left.ensure_plain()?;
        right.ensure_plain()?;
        self.stats.calls += 1;
        self.stats.unordered_calls += 1;
        let strategy = self.unordered;
        unordered_or_no_match(strategy, self, left, right)
    }

    /// Records `matching` and, recursively, its child matchings in `store`.
    /// Only positively scored matchings are recorded, but the children of a
    /// score-0 matching are still visited.
    pub fn store_matching(&self, store: &mut MatchingStore, matching: &Matching, color: Color) {
        if matching.score() > 0 {
            store.add_matching(&matching.shallow().with_color(color));
        }

        for child in matching.children() {
            self.store_matching(store, child, color);
        }
    }

    /// Records every positively scored matching of a flat set in `store`.
    pub fn store_matchings(&self, store: &mut MatchingStore, matchings: &Matchings, color: Color) {
        for matching in matchings.iter().filter(|m| m.score() > 0) {
            store.add_matching(&matching.shallow().with_color(color));
        }
    }
}

/// Runs `strategy` through `parent`, turning an unsolvable assignment into a
/// score-0 matching of the pair.
fn unordered_or_no_match<T, M>(
    strategy: UnorderedMatcher,
    parent: &mut M,
    left: Artifact<'_, T>,
    right: Artifact<'_, T>,
) -> MatchResult<Matchings>
where
    T: Label,
    M: MatcherInterface<T> + ?Sized,
{
    match strategy.match_with(parent, left, right) {
        Err(e) if e.is_local() => {
            warn!(error = %e, "Treating unsolvable assignment as no match");
            Ok(Matchings::of(Matching::new(left.id(), right.id(), 0, Algorithm::Unordered)))
        }
        other => other,
    }
}

impl<T: Label> MatcherInterface<T> for Matcher {
    fn match_nodes(&mut self, left: Artifact<'_, T>, right: Artifact<'_, T>) -> MatchResult<Matchings> {
        left.ensure_plain()?;
        right.ensure_plain()?;

        if self.config.use_equality_matcher {
            let known_unequal =
                self.config.filter_did_not_match && self.equality.did_not_match(left.id(), right.id());

            if !known_unequal {
                self.stats.equality_attempts += 1;
                let trivial = self.equality.match_nodes(left, right)?;

                if trivial.get(left.id(), right.id()).is_some() {
                    self.stats.equality_hits += 1;
                    trace!(left = %left.id(), right = %right.id(), "Subtrees are equal");
                    return Ok(trivial);
                }
            }
        }

        let ordered = left.children().any(|c| c.is_ordered()) || right.children().any(|c| c.is_ordered());

        if ordered {
            self.match_ordered(left, right)
        } else {
            self.match_unordered(left, right)
        }
    }
}
