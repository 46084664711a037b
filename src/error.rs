//! Error types for the treezip crate.

use smol_str::SmolStr;
use thiserror::Error;

/// Errors surfaced by the tree front-end.
///
/// Cancelled or failed parses are *not* errors: `Parser::parse` returns
/// `None` for those, since cancellation is a normal outcome. This type covers
/// programmer errors and engine-compatibility failures only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A node type name was requested that was never registered with the
    /// language. This is a programmer error, reported eagerly instead of
    /// handing back a sentinel.
    #[error("unknown node type: {name}")]
    UnknownNodeType { name: SmolStr },

    /// The engine's node layout descriptor does not match the version this
    /// crate was written against. Navigating such a tree would misread
    /// memory, so the language refuses to construct.
    #[error("unsupported node layout version {found} (expected {expected})")]
    LayoutMismatch { expected: u32, found: u32 },

    /// A traversal exceeded its iteration bound. Native trees are acyclic by
    /// construction, so this indicates a corrupted or ABI-incompatible tree,
    /// not recoverable input. Carries the node-type path from the failure
    /// point up to the root.
    #[error("parse tree too deep or cyclic at: {path}")]
    TraversalLimitExceeded { path: String },
}
