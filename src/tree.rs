//! Immutable parse tree handles.

use std::sync::Arc;

use text_size::TextRange;
use tracing::trace;

use crate::cleaner::ReleaseGuard;
use crate::engine::Edit;
use crate::language::Language;
use crate::layout::{RawTree, SubtreeReader};
use crate::node_type::NodeType;
use crate::zipper::Zipper;

/// An immutable parse tree.
///
/// Cloning is cheap and shares the underlying node arena. A tree is either
/// *actual* (it reflects the text it was parsed from) or *adjusted* (its
/// offsets were shifted by [`Tree::adjust`] to match edited text it has not
/// been re-parsed against). Adjusted trees exist to serve as the `prior` of
/// an incremental parse and as the old side of [`Tree::changed_ranges`].
#[derive(Clone)]
pub struct Tree {
    inner: Arc<TreeInner>,
}

struct TreeInner {
    raw: RawTree,
    language: Language,
    actual: bool,
    // Holds the arena's final release so it happens on the cleaner thread,
    // not on whichever thread drops the last handle.
    _guard: ReleaseGuard,
}

impl Tree {
    pub(crate) fn new(raw: RawTree, language: Language, actual: bool) -> Tree {
        let heap = raw.heap_arc();
        Tree {
            inner: Arc::new(TreeInner {
                raw,
                language,
                actual,
                _guard: ReleaseGuard::new(move || drop(heap)),
            }),
        }
    }

    pub fn language(&self) -> &Language {
        &self.inner.language
    }

    /// The root node.
    pub fn root(&self) -> Node {
        Node {
            node: self.inner.raw.root(),
            alias_symbol: 0,
            tree: self.clone(),
        }
    }

    /// A zipper focused on the root.
    pub fn zipper(&self) -> Zipper {
        Zipper::root(self.clone())
    }

    /// Whether this tree still reflects the text it was parsed from.
    pub fn is_actual(&self) -> bool {
        self.inner.actual
    }

    /// Shift this tree's byte offsets to account for text edits, without
    /// re-parsing.
    ///
    /// Edits are applied in order, each in the coordinates produced by the
    /// previous one. Returns `self` unchanged when `edits` is empty. The
    /// result is not actual; parse the edited text against it to get a tree
    /// that is.
    pub fn adjust(&self, edits: &[Edit]) -> Tree {
        if edits.is_empty() {
            return self.clone();
        }
        trace!(
            language = self.inner.language.name(),
            edits = edits.len(),
            "adjusting tree"
        );
        let engine = self.inner.language.engine();
        let mut raw = engine.copy_tree(&self.inner.raw);
        for edit in edits {
            engine.edit_tree(&mut raw, edit);
        }
        Tree::new(raw, self.inner.language.clone(), false)
    }

    /// Ranges of `new_tree`'s text whose structure differs from this tree.
    ///
    /// `self` must be the adjusted old tree that was passed as the prior of
    /// the parse that produced `new_tree`; its offsets are already in the new
    /// text's coordinates, so the returned ranges are too.
    pub fn changed_ranges(&self, new_tree: &Tree) -> Vec<TextRange> {
        if self.inner.raw.same_heap(&new_tree.inner.raw) {
            return Vec::new();
        }
        self.inner
            .language
            .engine()
            .changed_ranges(&self.inner.raw, &new_tree.inner.raw)
    }

    pub(crate) fn raw(&self) -> &RawTree {
        &self.inner.raw
    }

    pub(crate) fn reader(&self) -> SubtreeReader<'_> {
        SubtreeReader::new(self.inner.raw.heap(), self.inner.language.layout())
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("language", &self.inner.language.name())
            .field("actual", &self.inner.actual)
            .finish()
    }
}

/// A handle to one subtree: the tree's root, or a position retained through
/// [`Zipper::retain_subtree`].
///
/// Holds the arena alive on its own, so it outlives the `Tree` handle it was
/// taken from. Byte offsets of a zipper produced by [`Node::zipper`] are
/// relative to this subtree.
#[derive(Debug, Clone)]
pub struct Node {
    tree: Tree,
    node: crate::layout::NodeRef,
    alias_symbol: crate::layout::Symbol,
}

impl Node {
    pub(crate) fn new(
        tree: Tree,
        node: crate::layout::NodeRef,
        alias_symbol: crate::layout::Symbol,
    ) -> Node {
        Node {
            tree,
            node,
            alias_symbol,
        }
    }

    /// The node's type, under its alias when one applies.
    pub fn node_type(&self) -> NodeType {
        let symbol = if self.alias_symbol != 0 {
            self.alias_symbol
        } else {
            self.tree.reader().symbol(self.node)
        };
        self.tree.language().node_type_for_symbol(symbol)
    }

    /// Content size in bytes, excluding leading padding.
    pub fn byte_size(&self) -> u32 {
        self.tree.reader().byte_size(self.node)
    }

    /// Leading padding (text swallowed before the content starts).
    pub fn byte_padding(&self) -> u32 {
        self.tree.reader().byte_padding(self.node)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// A zipper rooted at this subtree. Offsets are subtree-relative.
    pub fn zipper(&self) -> Zipper {
        Zipper::rooted(self.tree.clone(), self.node, self.alias_symbol)
    }
}

/// Nodes compare as subtree identities within one arena.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.tree.raw().same_heap(other.tree.raw())
    }
}

impl Eq for Node {}
