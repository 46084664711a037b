//! The engine seam.
//!
//! Everything grammar-specific lives behind [`Engine`]: symbol tables, the
//! alias table, the node layout descriptor, and parser construction. The rest
//! of the crate is engine-agnostic and only ever sees [`RawTree`] arenas plus
//! the metadata these traits expose.

use std::sync::atomic::AtomicBool;

use smol_str::SmolStr;
use text_size::TextRange;

use crate::layout::{LanguageData, NodeLayout, RawTree, Symbol};
use crate::text::Encoding;

/// One text edit, in byte offsets of the pre-edit document.
///
/// `[start, old_end)` was replaced by text ending at `new_end`. A pure
/// insertion has `old_end == start`; a pure deletion has `new_end == start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub start: u32,
    pub old_end: u32,
    pub new_end: u32,
}

/// Streaming byte source driven by the parser.
///
/// The parser calls [`ByteReader::read`] with arbitrary offsets as it scans
/// and backtracks; an empty slice means end of text.
pub trait ByteReader {
    fn read(&mut self, byte_offset: u32) -> &[u8];
}

/// A single native parse session.
///
/// Sessions hold engine-side state between parses (lexer tables, reusable
/// stacks) and are not thread-safe; `Parser` serializes access to one.
pub trait RawParser: Send {
    /// Run one parse. `prior` enables incremental reuse of unchanged
    /// subtrees. Returns `None` when the parse was abandoned because `cancel`
    /// became true.
    fn parse(
        &mut self,
        reader: &mut dyn ByteReader,
        encoding: Encoding,
        prior: Option<&RawTree>,
        cancel: &AtomicBool,
    ) -> Option<RawTree>;

    /// Discard mid-parse state so the session can be reused.
    fn reset(&mut self);
}

/// A grammar plus the engine machinery to parse and edit its trees.
///
/// Implementations are shared behind `Arc` by `Language` and must be
/// thread-safe.
pub trait Engine: Send + Sync {
    /// Grammar name, e.g. `"go"`.
    fn language_name(&self) -> &str;

    /// The grammar's name for a symbol, `None` if the id is out of range.
    fn symbol_name(&self, symbol: Symbol) -> Option<SmolStr>;

    /// Resolve a node type name to its symbol id.
    fn symbol_for_name(&self, name: &str) -> Option<Symbol>;

    /// Whether a symbol is a terminal (a token, as opposed to a rule).
    fn is_terminal(&self, symbol: Symbol) -> bool;

    /// The grammar's packed alias-sequence table.
    fn language_data(&self) -> &LanguageData;

    /// The node layout trees of this engine use.
    fn node_layout(&self) -> &NodeLayout;

    /// Start a fresh parse session.
    fn new_parser(&self) -> Box<dyn RawParser>;

    /// Duplicate a tree's arena so it can be edited without touching shared
    /// state.
    fn copy_tree(&self, tree: &RawTree) -> RawTree;

    /// Apply an edit to a (freshly copied) tree in place: shift offsets and
    /// mark the nodes whose spans the edit touched.
    fn edit_tree(&self, tree: &mut RawTree, edit: &Edit);

    /// Ranges of the new text whose structure differs from the old tree.
    /// `old` must already carry the edits that produced `new`.
    fn changed_ranges(&self, old: &RawTree, new: &RawTree) -> Vec<TextRange>;
}
