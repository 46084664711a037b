//! # treezip
//!
//! Safe front-end over a native incremental parsing engine: immutable parse
//! trees, zipper cursors over the visible node layer, and incremental
//! re-parsing driven by text edits.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! highlight → range-bounded walks for editor highlighting
//!   ↓
//! parser    → parse sessions, cancellation, incremental reuse
//!   ↓
//! zipper    → immutable cursors over the visible layer
//!   ↓
//! tree      → Tree/Node handles, adjust, changed ranges
//!   ↓
//! language  → engine handles, node-type interning
//!   ↓
//! engine    → traits a concrete engine implements
//!   ↓
//! layout    → packed binary node arena, reader and builder
//!   ↓
//! error / text / cancel / cleaner / node_type → primitives
//! ```

// ============================================================================
// MODULES (dependency order: layout → engine → language → tree → zipper →
// parser → highlight)
// ============================================================================

/// Error types
pub mod error;

/// Source-text access: Text trait, Encoding
pub mod text;

/// Cooperative cancellation tokens
pub mod cancel;

/// Deferred resource release on a background worker
mod cleaner;

/// Node type values
pub mod node_type;

/// Packed binary node layout: arena, reader, builder
pub mod layout;

/// Engine seam: Engine/RawParser/ByteReader traits, Edit
pub mod engine;

/// Language handles with node-type interning
pub mod language;

/// Immutable tree and retained subtree handles
pub mod tree;

/// Zipper cursors over the visible node layer
pub mod zipper;

/// Parse sessions with incremental reuse and cancellation
pub mod parser;

/// Range-bounded highlighting walks
pub mod highlight;

// Re-export the public surface
pub use cancel::CancellationToken;
pub use engine::{ByteReader, Edit, Engine, RawParser};
pub use error::Error;
pub use highlight::highlight_syntax;
pub use language::Language;
pub use layout::{
    ERROR_SYMBOL, HeapBuilder, LanguageData, NodeFlags, NodeHeap, NodeLayout, NodeRef, RawTree,
    SubtreeReader, Symbol,
};
pub use node_type::{NodeType, NodeTypeKind};
pub use parser::Parser;
pub use text::{Encoding, Text};
pub use tree::{Node, Tree};
pub use zipper::Zipper;

// Byte ranges are expressed with the text-size crate's types
pub use text_size::{TextRange, TextSize};
