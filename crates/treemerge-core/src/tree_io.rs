//! JSON tree documents.
//!
//! A document is one serialized [`ArtifactNode<CstLabel>`]: the root with its
//! `content` (`kind` plus an optional `value`), optional `ordered` and
//! `marker` fields and the nested `children`.

use merge_matcher::{ArtifactNode, CstLabel, Tree};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeIoError {
    #[error("failed to read tree document {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write tree document {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed tree document: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn parse_tree(json: &str) -> Result<Tree<CstLabel>, TreeIoError> {
    let root: ArtifactNode<CstLabel> = serde_json::from_str(json)?;
    Ok(Tree::new(root))
}

pub fn read_tree(path: &Path) -> Result<Tree<CstLabel>, TreeIoError> {
    let content = std::fs::read_to_string(path).map_err(|source| TreeIoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let tree = parse_tree(&content)?;
    tracing::debug!(path = %path.display(), nodes = tree.len(), "Loaded tree document");
    Ok(tree)
}

pub fn write_tree(path: &Path, root: &ArtifactNode<CstLabel>) -> Result<(), TreeIoError> {
    let content = serde_json::to_string_pretty(root)?;
    std::fs::write(path, content).map_err(|source| TreeIoError::Write {
        path: path.to_path_buf(),
        source,
    })
}
