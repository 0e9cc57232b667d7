//! # merge-matcher
//!
//! Tree matching for three-way structured merge: finds which nodes of two
//! revisions of a syntax tree correspond to each other, which the merge
//! phase then uses to decide what changed.
//!
//! ## Approach
//!
//! 1. **Equality fast path**: identical subtrees are recognized in a single
//!    lockstep walk, and pairs proven unequal are remembered.
//!
//! 2. **Ordered matching**: children whose order matters are aligned with a
//!    weighted LCS over the child sequences.
//!    *Based on: Yang, "Identifying Syntactic Differences Between Two
//!    Programs", SPE 1991*
//!
//! 3. **Unordered matching**: children whose order does not matter are
//!    paired by a maximum-weight bipartite assignment (Kuhn-Munkres).
//!    *Based on: Apel, Leßenich et al., "Structured Merge with
//!    Auto-Tuning", ASE 2012*
//!
//! 4. **Cost-model matching**: an optional global refinement that searches
//!    complete node covers for the lowest renaming, ancestry, sibling and
//!    ordering cost with a Metropolis walk.
//!    *Based on: Leßenich, Apel et al., "Renaming and Shifted Code in
//!    Structured Merging: Looking Ahead for Precision and Performance",
//!    ASE 2017*
//!
//! ## Example
//!
//! ```rust
//! use merge_matcher::{ArtifactNode, Matcher, Tree};
//!
//! let left = Tree::new(ArtifactNode::new(
//!     "imports",
//!     vec![ArtifactNode::leaf("std::fmt"), ArtifactNode::leaf("std::io")],
//! ));
//! let right = Tree::new(ArtifactNode::new(
//!     "imports",
//!     vec![ArtifactNode::leaf("std::io"), ArtifactNode::leaf("std::fmt")],
//! ));
//!
//! let mut matcher = Matcher::default();
//! let matchings = matcher.match_trees(&left, &right).unwrap();
//!
//! let root = matchings.get(left.root().id(), right.root().id()).unwrap();
//! assert_eq!(root.score(), 3);
//! ```

pub mod artifact;
pub mod assignment;
pub mod config;
pub mod cost_model;
pub mod equality;
pub mod error;
pub mod matcher;
pub mod matching;
pub mod ordered;
pub mod rng;
pub mod unordered;

// Re-export primary public API
pub use artifact::{Artifact, ArtifactNode, CstLabel, Label, NodeId, NodeMarker, Tree};
pub use config::{CostModelConfig, MatcherConfig};
pub use cost_model::{CostModelMatcher, CostModelReport, LinearWeights, Weigh};
pub use equality::EqualityMatcher;
pub use error::{MatchError, MatchResult};
pub use matcher::{Matcher, MatcherInterface, MatcherStats};
pub use matching::{Algorithm, Color, Matching, Matchings, MatchingStore};
pub use ordered::OrderedMatcher;
pub use unordered::UnorderedMatcher;
