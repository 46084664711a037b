//! Zipper navigation over the visible node layer.
//!
//! A [`Zipper`] is an immutable cursor: every move allocates a new zipper
//! sharing its ancestor frames with the old one, so callers can keep as many
//! positions alive as they like. Moves operate on the *visible* layer of the
//! tree. Hidden grammar rules are skipped transparently, and a hidden node
//! that a production aliases to a visible name surfaces under the alias.
//!
//! Byte offsets address a node's content start, after its leading padding
//! (whitespace swallowed by the preceding token). A node's first child shares
//! its content start, so `down` keeps the offset; sibling moves add or
//! subtract the sizes and paddings between the two content starts.
//!
//! All traversal loops carry an iteration budget. Native arenas are acyclic
//! by construction, so exhausting the budget means the arena is corrupt or
//! was produced by an incompatible engine; navigation panics with the node
//! path rather than spinning.

use std::sync::Arc;

use text_size::{TextRange, TextSize};
use tracing::error;

use crate::error::Error;
use crate::layout::{LanguageData, NodeRef, SubtreeReader, Symbol};
use crate::tree::Tree;

const TRAVERSAL_LIMIT: u32 = 1_000_000;

/// An immutable cursor over a tree's visible nodes.
#[derive(Clone)]
pub struct Zipper {
    tree: Tree,
    frame: Arc<Frame>,
}

struct Frame {
    parent: Option<Arc<Frame>>,
    node: NodeRef,
    /// Content start in bytes.
    byte_offset: u32,
    /// Position among the parent's concrete children.
    child_index: u32,
    /// Count of non-extra siblings before this node; indexes alias tables.
    structural_index: u32,
    /// Alias assigned by the parent's production, `0` for none.
    alias_symbol: Symbol,
}

impl Zipper {
    pub(crate) fn root(tree: Tree) -> Zipper {
        let node = tree.raw().root();
        Zipper::rooted(tree, node, 0)
    }

    /// A zipper whose root frame is `node`; offsets are relative to that
    /// subtree's padded start.
    pub(crate) fn rooted(tree: Tree, node: NodeRef, alias_symbol: Symbol) -> Zipper {
        let byte_offset = tree.reader().byte_padding(node);
        Zipper {
            frame: Arc::new(Frame {
                parent: None,
                node,
                byte_offset,
                child_index: 0,
                structural_index: 0,
                alias_symbol,
            }),
            tree,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// A standalone handle to the focused subtree. The handle keeps the
    /// arena alive independently of the `Tree` it came from, so a fragment
    /// can be cached across edits.
    pub fn retain_subtree(&self) -> crate::Node {
        crate::Node::new(self.tree.clone(), self.frame.node, self.frame.alias_symbol)
    }

    /// The focused node as a handle.
    pub fn node(&self) -> crate::Node {
        self.retain_subtree()
    }

    /// The alias the parent's production assigns to this position, if any.
    pub fn alias(&self) -> Option<crate::NodeType> {
        if self.frame.alias_symbol == 0 {
            None
        } else {
            Some(
                self.tree
                    .language()
                    .node_type_for_symbol(self.frame.alias_symbol),
            )
        }
    }

    /// Content start in bytes.
    pub fn byte_offset(&self) -> TextSize {
        self.frame.byte_offset.into()
    }

    /// The focused node's type, under its alias when one applies.
    pub fn node_type(&self) -> crate::NodeType {
        let symbol = if self.frame.alias_symbol != 0 {
            self.frame.alias_symbol
        } else {
            self.tree.reader().symbol(self.frame.node)
        };
        self.tree.language().node_type_for_symbol(symbol)
    }

    /// Content size in bytes.
    pub fn byte_size(&self) -> u32 {
        self.tree.reader().byte_size(self.frame.node)
    }

    /// Content span: `[content start, content start + size)`.
    pub fn byte_range(&self) -> TextRange {
        let start = self.frame.byte_offset;
        TextRange::new(start.into(), (start + self.byte_size()).into())
    }

    /// The nearest visible ancestor.
    pub fn up(&self) -> Option<Zipper> {
        let mut nav = self.nav();
        let mut cur = self.frame.parent.clone()?;
        loop {
            if nav.visible(&cur) {
                return Some(self.at(cur));
            }
            nav.tick(&cur);
            cur = cur.parent.clone()?;
        }
    }

    /// The first visible node below the focus, in document order.
    pub fn down(&self) -> Option<Zipper> {
        // Shortcut shared with the sibling scans: no visible descendants
        // means nothing to find.
        if self.tree.reader().visible_child_count(self.frame.node) == 0 {
            return None;
        }
        let mut nav = self.nav();
        nav.first_visible_below(&self.frame).map(|f| self.at(f))
    }

    /// The next visible node at the focus's visible level.
    pub fn right(&self) -> Option<Zipper> {
        let mut nav = self.nav();
        let mut cur = self.frame.clone();
        loop {
            nav.tick(&cur);
            match nav.concrete_right(&cur) {
                None => {
                    // Ran off the end: continue among the siblings of an
                    // invisible parent, which sit at the same visible level.
                    let parent = cur.parent.clone()?;
                    if nav.visible(&parent) {
                        return None;
                    }
                    cur = parent;
                }
                Some(sibling) => {
                    if nav.visible(&sibling) {
                        return Some(self.at(sibling));
                    }
                    if nav.reader.visible_child_count(sibling.node) > 0 {
                        let found = nav.first_visible_below(&sibling)?;
                        return Some(self.at(found));
                    }
                    cur = sibling;
                }
            }
        }
    }

    /// The previous visible node at the focus's visible level.
    pub fn left(&self) -> Option<Zipper> {
        let mut nav = self.nav();
        let mut cur = self.frame.clone();
        loop {
            nav.tick(&cur);
            match nav.concrete_left(&cur) {
                None => {
                    let parent = cur.parent.clone()?;
                    if nav.visible(&parent) {
                        return None;
                    }
                    cur = parent;
                }
                Some(sibling) => {
                    if nav.visible(&sibling) {
                        return Some(self.at(sibling));
                    }
                    if nav.reader.visible_child_count(sibling.node) > 0 {
                        let found = nav.last_visible_below(&sibling)?;
                        return Some(self.at(found));
                    }
                    cur = sibling;
                }
            }
        }
    }

    /// The next visible node in document order that is *not* inside the
    /// focus's subtree.
    pub fn skip(&self) -> Option<Zipper> {
        let mut cur = self.clone();
        let mut fuel = TRAVERSAL_LIMIT;
        loop {
            if fuel == 0 {
                self.traversal_overflow(&cur.frame);
            }
            fuel -= 1;
            if let Some(next) = cur.right() {
                return Some(next);
            }
            cur = cur.up()?;
        }
    }

    /// Preorder successor over visible nodes: first below, else the next
    /// outside this subtree.
    pub fn next(&self) -> Option<Zipper> {
        self.down().or_else(|| self.skip())
    }

    fn at(&self, frame: Arc<Frame>) -> Zipper {
        Zipper {
            tree: self.tree.clone(),
            frame,
        }
    }

    fn nav(&self) -> Nav<'_> {
        Nav {
            reader: self.tree.reader(),
            data: self.tree.language().language_data(),
            fuel: TRAVERSAL_LIMIT,
            origin: self,
        }
    }

    fn traversal_overflow(&self, frame: &Arc<Frame>) -> ! {
        let path = self.describe_path(frame);
        error!(path = %path, "traversal budget exhausted");
        panic!("{}", Error::TraversalLimitExceeded { path });
    }

    fn describe_path(&self, frame: &Arc<Frame>) -> String {
        let reader = self.tree.reader();
        let engine = self.tree.language().engine();
        let mut parts = Vec::new();
        let mut cur = Some(frame);
        while let Some(f) = cur {
            let symbol = reader.symbol(f.node);
            let name = engine
                .symbol_name(symbol)
                .unwrap_or_else(|| smol_str::format_smolstr!("symbol#{symbol}"));
            parts.push(name);
            cur = f.parent.as_ref();
            if parts.len() > 32 {
                parts.push(smol_str::SmolStr::new_static("..."));
                break;
            }
        }
        parts.join(" < ")
    }
}

/// Zippers compare as positions: same node, same slot, same ancestor chain.
///
/// Two distinct leaf tokens can share one inline node word, so the slot
/// indices and the parent chain participate in the comparison, not just the
/// node references.
impl PartialEq for Zipper {
    fn eq(&self, other: &Self) -> bool {
        if !self.tree.raw().same_heap(other.tree.raw()) {
            return false;
        }
        let mut a = Some(&self.frame);
        let mut b = Some(&other.frame);
        while let (Some(x), Some(y)) = (a, b) {
            if x.node != y.node || x.child_index != y.child_index {
                return false;
            }
            a = x.parent.as_ref();
            b = y.parent.as_ref();
        }
        a.is_none() && b.is_none()
    }
}

impl Eq for Zipper {}

impl std::fmt::Debug for Zipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zipper")
            .field("node_type", &self.node_type().name())
            .field("byte_range", &self.byte_range())
            .finish()
    }
}

/// One navigation operation's working state: the arena reader, the alias
/// table and the iteration budget.
struct Nav<'a> {
    reader: SubtreeReader<'a>,
    data: &'a LanguageData,
    fuel: u32,
    origin: &'a Zipper,
}

impl Nav<'_> {
    fn tick(&mut self, frame: &Arc<Frame>) {
        if self.fuel == 0 {
            self.origin.traversal_overflow(frame);
        }
        self.fuel -= 1;
    }

    fn visible(&self, frame: &Frame) -> bool {
        frame.alias_symbol != 0 || self.reader.is_visible(frame.node)
    }

    fn alias_for(&self, parent: &Frame, node: NodeRef, structural_index: u32) -> Symbol {
        let production = self.reader.production_id(parent.node);
        if production == 0 || self.reader.is_extra(node) {
            return 0;
        }
        self.data
            .alias_sequence_for(production)
            .map_or(0, |seq| seq.entry(structural_index))
    }

    fn child_frame(
        &self,
        parent: &Arc<Frame>,
        node: NodeRef,
        byte_offset: u32,
        child_index: u32,
        structural_index: u32,
    ) -> Arc<Frame> {
        let alias_symbol = self.alias_for(parent, node, structural_index);
        Arc::new(Frame {
            parent: Some(parent.clone()),
            node,
            byte_offset,
            child_index,
            structural_index,
            alias_symbol,
        })
    }

    fn first_child(&self, parent: &Arc<Frame>) -> Option<Arc<Frame>> {
        if self.reader.child_count(parent.node) == 0 {
            return None;
        }
        let node = self.reader.child_at(parent.node, 0);
        // The first child's padding is the parent's padding, so both share
        // one content start.
        Some(self.child_frame(parent, node, parent.byte_offset, 0, 0))
    }

    fn concrete_right(&self, frame: &Arc<Frame>) -> Option<Arc<Frame>> {
        let parent = frame.parent.as_ref()?;
        let index = frame.child_index + 1;
        if index >= self.reader.child_count(parent.node) {
            return None;
        }
        let node = self.reader.child_at(parent.node, index);
        let byte_offset =
            frame.byte_offset + self.reader.byte_size(frame.node) + self.reader.byte_padding(node);
        let structural_index =
            frame.structural_index + u32::from(!self.reader.is_extra(frame.node));
        Some(self.child_frame(parent, node, byte_offset, index, structural_index))
    }

    fn concrete_left(&self, frame: &Arc<Frame>) -> Option<Arc<Frame>> {
        let parent = frame.parent.as_ref()?;
        let index = frame.child_index.checked_sub(1)?;
        let node = self.reader.child_at(parent.node, index);
        let byte_offset = frame.byte_offset
            - self.reader.byte_padding(frame.node)
            - self.reader.byte_size(node);
        // The structural index steps back only past non-extra siblings, so
        // it is the sibling's classification that decides, not the focus's.
        let structural_index = frame.structural_index - u32::from(!self.reader.is_extra(node));
        Some(self.child_frame(parent, node, byte_offset, index, structural_index))
    }

    /// First visible node strictly inside `root`'s subtree.
    fn first_visible_below(&mut self, root: &Arc<Frame>) -> Option<Arc<Frame>> {
        let mut cur = self.first_child(root)?;
        loop {
            self.tick(&cur);
            if self.visible(&cur) {
                return Some(cur);
            }
            if self.reader.visible_child_count(cur.node) > 0 {
                cur = self.first_child(&cur)?;
            } else {
                cur = self.concrete_right(&cur)?;
            }
        }
    }

    /// Last visible node strictly inside `root`'s subtree, at the subtree's
    /// outermost visible layer.
    fn last_visible_below(&mut self, root: &Arc<Frame>) -> Option<Arc<Frame>> {
        let mut scope = root.clone();
        loop {
            self.tick(&scope);
            let mut candidate: Option<Arc<Frame>> = None;
            let mut cur = self.first_child(&scope);
            while let Some(frame) = cur {
                self.tick(&frame);
                if self.visible(&frame) || self.reader.visible_child_count(frame.node) > 0 {
                    candidate = Some(frame.clone());
                }
                cur = self.concrete_right(&frame);
            }
            let found = candidate?;
            if self.visible(&found) {
                return Some(found);
            }
            scope = found;
        }
    }
}
