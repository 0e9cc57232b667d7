//! Per-run parameters and scratch state of the cost model.

use std::sync::Arc;

use dashmap::DashMap;

use super::cover::{CmMatching, CmMatchings};
use crate::artifact::{Artifact, NodeId};
use crate::config::CostModelConfig;
use crate::rng::Rng;

/// Weight functions of the cost terms. Every method except
/// [`no_match`](Weigh::no_match) is only called for pairs of two real nodes.
pub trait Weigh<T>: Send + Sync {
    /// Cost of pairing two nodes whose contents do not match.
    fn renaming(&self, m: Artifact<'_, T>, n: Artifact<'_, T>) -> f32;

    /// Cost of `violations` children whose partners are not children of the
    /// other node.
    fn ancestry(&self, m: Artifact<'_, T>, n: Artifact<'_, T>, violations: f32) -> f32;

    /// Cost of a sibling group breakup ratio.
    fn sibling_breakup(&self, m: Artifact<'_, T>, n: Artifact<'_, T>, ratio: f32) -> f32;

    /// Cost of a sibling order inversion.
    fn ordering(&self, m: Artifact<'_, T>, n: Artifact<'_, T>) -> f32;

    /// Cost of leaving a node unmatched.
    fn no_match(&self) -> f32;
}

/// Constant weights, scaled linearly by the term's quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearWeights {
    pub wr: f32,
    pub wn: f32,
    pub wa: f32,
    pub ws: f32,
    pub wo: f32,
}

impl From<&CostModelConfig> for LinearWeights {
    fn from(config: &CostModelConfig) -> Self {
        Self {
            wr: config.wr,
            wn: config.wn,
            wa: config.wa,
            ws: config.ws,
            wo: config.wo,
        }
    }
}

impl Default for LinearWeights {
    fn default() -> Self {
        Self::from(&CostModelConfig::default())
    }
}

impl<T> Weigh<T> for LinearWeights {
    fn renaming(&self, _m: Artifact<'_, T>, _n: Artifact<'_, T>) -> f32 {
        self.wr
    }

    fn ancestry(&self, _m: Artifact<'_, T>, _n: Artifact<'_, T>, violations: f32) -> f32 {
        self.wa * violations
    }

    fn sibling_breakup(&self, _m: Artifact<'_, T>, _n: Artifact<'_, T>, ratio: f32) -> f32 {
        self.ws * ratio
    }

    fn ordering(&self, _m: Artifact<'_, T>, _n: Artifact<'_, T>) -> f32 {
        self.wo
    }

    fn no_match(&self) -> f32 {
        self.wn
    }
}

type Group<'t, T> = Arc<Vec<Artifact<'t, T>>>;

/// Configuration and memoization state of one cost-model run.
///
/// The caches are keyed by node identity and filled concurrently during the
/// parallel passes. Values are always computed before they are inserted, so
/// no map guard is held across a nested lookup.
pub struct CmParameters<'t, T, W> {
    pub(crate) weights: Arc<W>,
    pub parallel: bool,
    pub rng: Rng,
    siblings: DashMap<NodeId, Group<'t, T>>,
    other_siblings: DashMap<NodeId, Group<'t, T>>,
    lca: DashMap<(NodeId, NodeId), (Artifact<'t, T>, Artifact<'t, T>)>,
    exact_contains: DashMap<NodeId, usize>,
    bound_contains: DashMap<NodeId, Arc<Vec<usize>>>,
}

impl<'t, T, W> CmParameters<'t, T, W> {
    pub fn new(weights: Arc<W>, config: &CostModelConfig) -> Self {
        Self {
            weights,
            parallel: config.parallel,
            rng: Rng::seed_from(config.seed),
            siblings: DashMap::new(),
            other_siblings: DashMap::new(),
            lca: DashMap::new(),
            exact_contains: DashMap::new(),
            bound_contains: DashMap::new(),
        }
    }

    fn clear_structural_caches(&self) {
        self.siblings.clear();
        self.other_siblings.clear();
        self.lca.clear();
    }

    /// Forgets everything derived from the candidate graph of the last
    /// bounding pass.
    pub fn clear_bound_caches(&self) {
        self.bound_contains.clear();
        self.clear_structural_caches();
    }

    /// Forgets everything derived from the cover of the last exact pass.
    pub fn clear_exact_caches(&self) {
        self.exact_contains.clear();
        self.clear_structural_caches();
    }

    /// The sibling group of `node` including itself. The roots of the cover
    /// form groups of their own.
    pub(crate) fn siblings(&self, node: Artifact<'t, T>, cover: &CmMatchings<'t, T>) -> Group<'t, T> {
        if let Some(group) = self.siblings.get(&node.id()) {
            return Arc::clone(group.value());
        }

        let group: Group<'t, T> = match node.parent() {
            Some(parent) if node != cover.left && node != cover.right => Arc::new(parent.children().collect()),
            _ => Arc::new(vec![node]),
        };

        self.siblings.insert(node.id(), Arc::clone(&group));
        group
    }

    /// The sibling group of `node` without itself.
    pub(crate) fn other_siblings(&self, node: Artifact<'t, T>, cover: &CmMatchings<'t, T>) -> Group<'t, T> {
        if let Some(group) = self.other_siblings.get(&node.id()) {
            return Arc::clone(group.value());
        }

        let others: Group<'t, T> = Arc::new(
            self.siblings(node, cover)
                .iter()
                .copied()
                .filter(|s| *s != node)
                .collect(),
        );

        self.other_siblings.insert(node.id(), Arc::clone(&others));
        others
    }

    /// The lowest pair of ancestors of `a` and `b` (each inclusive) that lie
    /// in the same sibling group. If one node is an ancestor of the other,
    /// both positions hold that ancestor.
    pub(crate) fn lca(
        &self,
        a: Artifact<'t, T>,
        b: Artifact<'t, T>,
        cover: &CmMatchings<'t, T>,
    ) -> (Artifact<'t, T>, Artifact<'t, T>) {
        if let Some(pair) = self.lca.get(&(a.id(), b.id())) {
            return *pair.value();
        }
        if let Some(pair) = self.lca.get(&(b.id(), a.id())) {
            let (y, x) = *pair.value();
            return (x, y);
        }

        let pair = if self.siblings(a, cover).contains(&b) {
            (a, b)
        } else {
            let a_path = a.path_to_root();
            let b_path = b.path_to_root();
            let mut a_it = a_path.iter().rev();
            let mut b_it = b_path.iter().rev();
            let mut pair = (a, b);

            while let (Some(&l), Some(&r)) = (a_it.next(), b_it.next()) {
                pair = (l, r);
                if l != r {
                    break;
                }
            }
            pair
        };

        self.lca.insert((a.id(), b.id()), pair);
        pair
    }

    /// Index of the candidate containing `node` in a complete cover.
    pub(crate) fn matching_of<'c>(&self, node: Artifact<'t, T>, cover: &'c CmMatchings<'t, T>) -> Option<&'c CmMatching<'t, T>> {
        let cached = self.exact_contains.get(&node.id()).map(|i| *i.value());
        let index = match cached {
            Some(index) => index,
            None => {
                let index = cover.iter().position(|c| c.contains(node.id()))?;
                self.exact_contains.insert(node.id(), index);
                index
            }
        };
        cover.get(index)
    }

    /// The partner of `node` in a complete cover, `None` if unmatched.
    pub(crate) fn image(&self, node: Artifact<'t, T>, cover: &CmMatchings<'t, T>) -> Option<Artifact<'t, T>> {
        self.matching_of(node, cover).and_then(|c| c.other(node.id()))
    }

    /// Indices of all candidates of a (partial) graph containing `node`.
    pub(crate) fn containing(&self, node: Artifact<'t, T>, graph: &CmMatchings<'t, T>) -> Arc<Vec<usize>> {
        if let Some(indices) = self.bound_contains.get(&node.id()) {
            return Arc::clone(indices.value());
        }

        let indices: Arc<Vec<usize>> = Arc::new(
            graph
                .iter()
                .enumerate()
                .filter(|(_, c)| c.contains(node.id()))
                .map(|(i, _)| i)
                .collect(),
        );

        self.bound_contains.insert(node.id(), Arc::clone(&indices));
        indices
    }
}
