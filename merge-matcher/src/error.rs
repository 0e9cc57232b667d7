//! Error types shared by every matcher.
//!
//! Degenerate inputs (childless nodes, empty trees on one side) are never
//! errors; they produce empty or score-0 results. The variants below are the
//! conditions a caller has to react to.

use thiserror::Error;

use crate::artifact::NodeId;

/// Result alias used throughout the matcher.
pub type MatchResult<T> = Result<T, MatchError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MatchError {
    /// The cost model's working set does not cover every node of both trees
    /// exactly once, or references nodes outside of them.
    #[error("malformed cost model working set: {0}")]
    MalformedWorkingSet(String),

    /// The assignment solver for the children of a node pair did not reach
    /// an optimum.
    #[error("assignment problem for ({left}, {right}) could not be solved: {reason}")]
    Unsolvable {
        left: NodeId,
        right: NodeId,
        reason: String,
    },

    /// A node kind the matchers cannot handle (choice or conflict nodes).
    #[error("matching {marker} node {node} is not supported")]
    Unsupported { node: NodeId, marker: &'static str },

    /// An identity that belongs to neither of the trees being matched.
    #[error("node {0} is not part of the trees being matched")]
    UnknownNode(NodeId),

    /// A configuration value outside of its valid range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl MatchError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        MatchError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Whether this error only concerns a single node pair and may be
    /// downgraded to a "no match" verdict by the dispatcher.
    pub fn is_local(&self) -> bool {
        matches!(self, MatchError::Unsolvable { .. })
    }
}
