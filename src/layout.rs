//! Packed binary node layout: the subtree memory reader.
//!
//! A parse tree produced by the native engine is a dense arena of node
//! records. Small leaf tokens are packed *inline* into a single pointer-sized
//! word (tagged by the low bit); everything else is a heap record with fields
//! at fixed byte offsets. Those offsets are a compatibility contract with the
//! wrapped engine's internal memory representation — they are pinned in a
//! versioned [`NodeLayout`] descriptor and validated when a language is
//! constructed, never free design choices.
//!
//! All reads go through [`SubtreeReader`]'s bounds-checked accessors. Raw
//! offset arithmetic never leaks above this module.
//!
//! # Panics
//!
//! Accessors panic with a descriptive message when a read falls outside the
//! heap or a child index is out of range. That indicates a corrupted arena or
//! an engine built against a different layout version — an unrecoverable
//! invariant violation, not bad user input.

use std::sync::Arc;

/// Numeric grammar symbol id, scoped to one language.
pub type Symbol = u16;

/// The engine's builtin error symbol (exposed as `-1` by some bindings).
pub const ERROR_SYMBOL: Symbol = u16::MAX;

/// Heap prefix: magic, layout version, root node word.
const HEAP_MAGIC: u32 = u32::from_le_bytes(*b"tznh");
const HEAP_VERSION_OFFSET: usize = 4;
const HEAP_ROOT_OFFSET: usize = 8;
const HEAP_DATA_START: usize = 16;

/// Inline-word flag bits (byte 0 of a tagged word).
const INLINE_TAG: u64 = 1;
const INLINE_VISIBLE: u8 = 1 << 1;
const INLINE_NAMED: u8 = 1 << 2;
const INLINE_EXTRA: u8 = 1 << 3;
const INLINE_HAS_CHANGES: u8 = 1 << 4;

/// Heap-record flag bits (the `flags` byte).
const FLAG_VISIBLE: u8 = 1 << 0;
const FLAG_NAMED: u8 = 1 << 1;
const FLAG_EXTRA: u8 = 1 << 2;
const FLAG_HAS_CHANGES: u8 = 1 << 5;

/// Versioned table of field offsets within a heap node record.
///
/// Offsets are bytes from the start of the record. `padding` and `size` are
/// 12-byte length structs (byte count first, then row/column extent); only
/// the byte count is read here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLayout {
    pub version: u32,
    pub ref_count: u32,
    pub padding: u32,
    pub size: u32,
    pub lookahead_bytes: u32,
    pub error_cost: u32,
    pub child_count: u32,
    pub symbol: u32,
    pub parse_state: u32,
    pub flags: u32,
    pub children: u32,
    pub visible_child_count: u32,
    pub named_child_count: u32,
    pub node_count: u32,
    pub repeat_depth: u32,
    pub dynamic_precedence: u32,
    pub production_id: u32,
    pub record_size: u32,
}

/// The layout version this crate is written against.
pub const SUPPORTED_LAYOUT_VERSION: u32 = 1;

impl NodeLayout {
    /// The version-1 layout of the wrapped engine.
    pub const V1: NodeLayout = NodeLayout {
        version: 1,
        ref_count: 0,
        padding: 4,
        size: 16,
        lookahead_bytes: 28,
        error_cost: 32,
        child_count: 36,
        symbol: 40,
        parse_state: 42,
        flags: 44,
        children: 48,
        visible_child_count: 56,
        named_child_count: 60,
        node_count: 64,
        repeat_depth: 68,
        dynamic_precedence: 72,
        production_id: 76,
        record_size: 80,
    };

    /// Check this descriptor against the version the crate supports.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.version == SUPPORTED_LAYOUT_VERSION {
            Ok(())
        } else {
            Err(crate::Error::LayoutMismatch {
                expected: SUPPORTED_LAYOUT_VERSION,
                found: self.version,
            })
        }
    }
}

/// A reference to one node: either an inline-encoded leaf (low bit set) or
/// the byte offset of a heap record. The zero word is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(u64);

impl NodeRef {
    pub const NULL: NodeRef = NodeRef(0);

    pub fn from_raw(word: u64) -> Self {
        NodeRef(word)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn is_inline(self) -> bool {
        self.0 & INLINE_TAG != 0
    }

    fn inline_byte(self, i: u32) -> u8 {
        (self.0 >> (8 * i)) as u8
    }

    fn with_inline_byte(self, i: u32, value: u8) -> NodeRef {
        let shift = 8 * i;
        NodeRef(self.0 & !(0xFF << shift) | (value as u64) << shift)
    }

    /// This inline word with a new padding, `None` if it no longer fits the
    /// inline encoding.
    pub fn with_inline_padding(self, padding: u32) -> Option<NodeRef> {
        debug_assert!(self.is_inline());
        u8::try_from(padding)
            .ok()
            .map(|p| self.with_inline_byte(2, p))
    }

    /// This inline word with a new size, `None` if it no longer fits.
    pub fn with_inline_size(self, size: u32) -> Option<NodeRef> {
        debug_assert!(self.is_inline());
        u8::try_from(size).ok().map(|s| self.with_inline_byte(3, s))
    }

    fn heap_offset(self) -> usize {
        self.0 as usize
    }
}

/// The packed node arena of one tree.
#[derive(Debug, Clone)]
pub struct NodeHeap {
    bytes: Vec<u8>,
}

impl NodeHeap {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn slice(&self, at: usize, len: usize) -> &[u8] {
        match self.bytes.get(at..at + len) {
            Some(s) => s,
            None => panic!(
                "node heap read out of bounds: {len} bytes at offset {at}, heap size {}",
                self.bytes.len()
            ),
        }
    }

    pub fn read_u8(&self, at: usize) -> u8 {
        self.slice(at, 1)[0]
    }

    pub fn read_u16(&self, at: usize) -> u16 {
        let mut b = [0u8; 2];
        b.copy_from_slice(self.slice(at, 2));
        u16::from_le_bytes(b)
    }

    pub fn read_u32(&self, at: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.slice(at, 4));
        u32::from_le_bytes(b)
    }

    pub fn read_u64(&self, at: usize) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.slice(at, 8));
        u64::from_le_bytes(b)
    }

    fn slice_mut(&mut self, at: usize, len: usize) -> &mut [u8] {
        let heap_len = self.bytes.len();
        match self.bytes.get_mut(at..at + len) {
            Some(s) => s,
            None => panic!(
                "node heap write out of bounds: {len} bytes at offset {at}, heap size {heap_len}"
            ),
        }
    }

    /// Engine-side: overwrite a byte. Used by tree-edit implementations.
    pub fn write_u8(&mut self, at: usize, value: u8) {
        self.slice_mut(at, 1)[0] = value;
    }

    /// Engine-side: overwrite a little-endian u32 field.
    pub fn write_u32(&mut self, at: usize, value: u32) {
        self.slice_mut(at, 4).copy_from_slice(&value.to_le_bytes());
    }

    /// Engine-side: overwrite a node word (a child slot or the root slot).
    pub fn write_word(&mut self, at: usize, word: NodeRef) {
        self.slice_mut(at, 8)
            .copy_from_slice(&word.raw().to_le_bytes());
    }

    /// Engine-side: append a fresh heap leaf record, returning its reference.
    /// Used when an in-place edit outgrows a node's inline encoding.
    pub fn append_leaf(
        &mut self,
        layout: &NodeLayout,
        symbol: Symbol,
        padding: u32,
        size: u32,
        flags: NodeFlags,
    ) -> NodeRef {
        append_record(
            &mut self.bytes,
            layout,
            RecordFields {
                symbol,
                padding,
                size,
                flags,
                child_count: 0,
                children: 0,
                visible_child_count: 0,
                named_child_count: 0,
                node_count: 1,
                production_id: 0,
            },
        )
    }

    /// Byte offset of the root node word within the heap.
    pub fn root_slot(&self) -> usize {
        HEAP_ROOT_OFFSET
    }

    /// Engine-side: set a node's changed flag. Inline nodes are encoded in
    /// their reference, so the caller must store the returned word back into
    /// the node's slot.
    #[must_use]
    pub fn mark_changed(&mut self, layout: &NodeLayout, node: NodeRef) -> NodeRef {
        if node.is_inline() {
            NodeRef::from_raw(node.raw() | INLINE_HAS_CHANGES as u64)
        } else {
            let at = node.heap_offset() + layout.flags as usize;
            let flags = self.read_u8(at) | FLAG_HAS_CHANGES;
            self.write_u8(at, flags);
            node
        }
    }
}

/// A reference-counted handle to one tree's arena.
///
/// Cloning is cheap and shares the arena; [`RawTree::deep_copy`] duplicates
/// it for copy-on-write edits.
#[derive(Debug, Clone)]
pub struct RawTree {
    heap: Arc<NodeHeap>,
}

impl RawTree {
    pub fn new(heap: NodeHeap) -> Self {
        RawTree {
            heap: Arc::new(heap),
        }
    }

    pub fn heap(&self) -> &NodeHeap {
        &self.heap
    }

    /// Shared handle to the arena, for deferred-release bookkeeping.
    pub(crate) fn heap_arc(&self) -> Arc<NodeHeap> {
        self.heap.clone()
    }

    pub(crate) fn same_heap(&self, other: &RawTree) -> bool {
        Arc::ptr_eq(&self.heap, &other.heap)
    }

    /// Exclusive access to the arena. `None` while the arena is shared; edit
    /// implementations call this on a fresh [`RawTree::deep_copy`].
    pub fn heap_mut(&mut self) -> Option<&mut NodeHeap> {
        Arc::get_mut(&mut self.heap)
    }

    /// Duplicate the arena for an edit that must not touch shared state.
    pub fn deep_copy(&self) -> RawTree {
        RawTree::new(NodeHeap {
            bytes: self.heap.bytes.clone(),
        })
    }

    /// The root node recorded in the tree's header.
    pub fn root(&self) -> NodeRef {
        NodeRef::from_raw(self.heap.read_u64(HEAP_ROOT_OFFSET))
    }
}

/// Bounds-checked accessors over one arena.
///
/// Every accessor handles both encodings: inline words answer from their
/// packed bytes, heap records from the layout's field offsets.
#[derive(Clone, Copy)]
pub struct SubtreeReader<'a> {
    heap: &'a NodeHeap,
    layout: &'a NodeLayout,
}

impl<'a> SubtreeReader<'a> {
    pub fn new(heap: &'a NodeHeap, layout: &'a NodeLayout) -> Self {
        SubtreeReader { heap, layout }
    }

    fn field(&self, node: NodeRef, offset: u32) -> usize {
        node.heap_offset() + offset as usize
    }

    pub fn symbol(&self, node: NodeRef) -> Symbol {
        if node.is_inline() {
            node.inline_byte(1) as Symbol
        } else {
            self.heap.read_u16(self.field(node, self.layout.symbol))
        }
    }

    pub fn byte_size(&self, node: NodeRef) -> u32 {
        if node.is_inline() {
            node.inline_byte(3) as u32
        } else {
            self.heap.read_u32(self.field(node, self.layout.size))
        }
    }

    pub fn byte_padding(&self, node: NodeRef) -> u32 {
        if node.is_inline() {
            node.inline_byte(2) as u32
        } else {
            self.heap.read_u32(self.field(node, self.layout.padding))
        }
    }

    pub fn is_visible(&self, node: NodeRef) -> bool {
        if node.is_inline() {
            node.inline_byte(0) & INLINE_VISIBLE != 0
        } else {
            self.heap.read_u8(self.field(node, self.layout.flags)) & FLAG_VISIBLE != 0
        }
    }

    pub fn is_named(&self, node: NodeRef) -> bool {
        if node.is_inline() {
            node.inline_byte(0) & INLINE_NAMED != 0
        } else {
            self.heap.read_u8(self.field(node, self.layout.flags)) & FLAG_NAMED != 0
        }
    }

    pub fn is_extra(&self, node: NodeRef) -> bool {
        if node.is_inline() {
            node.inline_byte(0) & INLINE_EXTRA != 0
        } else {
            self.heap.read_u8(self.field(node, self.layout.flags)) & FLAG_EXTRA != 0
        }
    }

    pub fn has_changes(&self, node: NodeRef) -> bool {
        if node.is_inline() {
            node.inline_byte(0) & INLINE_HAS_CHANGES != 0
        } else {
            self.heap.read_u8(self.field(node, self.layout.flags)) & FLAG_HAS_CHANGES != 0
        }
    }

    pub fn ref_count(&self, node: NodeRef) -> u32 {
        if node.is_inline() {
            // Inline nodes are value-encoded; nothing to count.
            1
        } else {
            self.heap.read_u32(self.field(node, self.layout.ref_count))
        }
    }

    pub fn child_count(&self, node: NodeRef) -> u32 {
        if node.is_inline() {
            0
        } else {
            self.heap
                .read_u32(self.field(node, self.layout.child_count))
        }
    }

    pub fn visible_child_count(&self, node: NodeRef) -> u32 {
        if node.is_inline() {
            0
        } else {
            self.heap
                .read_u32(self.field(node, self.layout.visible_child_count))
        }
    }

    pub fn production_id(&self, node: NodeRef) -> u16 {
        if node.is_inline() {
            0
        } else {
            self.heap
                .read_u16(self.field(node, self.layout.production_id))
        }
    }

    pub fn child_at(&self, node: NodeRef, index: u32) -> NodeRef {
        let count = self.child_count(node);
        if index >= count {
            panic!("child index {index} out of range for node with {count} children");
        }
        NodeRef::from_raw(self.heap.read_u64(self.child_slot(node, index)))
    }

    /// Byte offset of a child's word slot. Engine-side edits write through it.
    pub fn child_slot(&self, node: NodeRef, index: u32) -> usize {
        let base = self.heap.read_u64(self.field(node, self.layout.children)) as usize;
        base + index as usize * 8
    }
}

/// Packed alias-sequence table of one language.
///
/// Stored exactly as the engine lays it out: little-endian u16 symbols, one
/// row of `max_alias_sequence_length` entries per production. Production 0
/// carries no aliases. Entry 0 means "no alias at this position".
#[derive(Debug, Clone)]
pub struct LanguageData {
    alias_sequences: Arc<[u8]>,
    max_alias_sequence_length: u16,
}

impl LanguageData {
    /// Pack a table from rows of symbols. `sequences` is row-major with
    /// `max_alias_sequence_length` entries per production.
    pub fn new(sequences: &[Symbol], max_alias_sequence_length: u16) -> Self {
        let mut bytes = Vec::with_capacity(sequences.len() * 2);
        for symbol in sequences {
            bytes.extend_from_slice(&symbol.to_le_bytes());
        }
        LanguageData {
            alias_sequences: bytes.into(),
            max_alias_sequence_length,
        }
    }

    /// A language with no aliases at all.
    pub fn empty() -> Self {
        LanguageData {
            alias_sequences: Arc::from([]),
            max_alias_sequence_length: 0,
        }
    }

    /// The alias sequence of a production, or `None` when the production
    /// assigns no aliases. Row offsets scale by table elements.
    pub fn alias_sequence_for(&self, production_id: u16) -> Option<AliasSequence<'_>> {
        if production_id == 0 || self.max_alias_sequence_length == 0 {
            return None;
        }
        let row = production_id as usize * self.max_alias_sequence_length as usize * 2;
        let end = row + self.max_alias_sequence_length as usize * 2;
        self.alias_sequences
            .get(row..end)
            .map(|entries| AliasSequence { entries })
    }
}

/// One production's row in the alias table.
#[derive(Debug, Clone, Copy)]
pub struct AliasSequence<'a> {
    entries: &'a [u8],
}

impl AliasSequence<'_> {
    /// The alias symbol assigned at a structural child index, `0` for none.
    pub fn entry(&self, structural_index: u32) -> Symbol {
        let at = structural_index as usize * 2;
        match self.entries.get(at..at + 2) {
            Some(b) => u16::from_le_bytes([b[0], b[1]]),
            None => 0,
        }
    }
}

/// Visibility/classification flags of a node under construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeFlags {
    pub visible: bool,
    pub named: bool,
    pub extra: bool,
}

struct RecordFields {
    symbol: Symbol,
    padding: u32,
    size: u32,
    flags: NodeFlags,
    child_count: u32,
    children: u64,
    visible_child_count: u32,
    named_child_count: u32,
    node_count: u32,
    production_id: u16,
}

fn align8(bytes: &mut Vec<u8>) {
    while bytes.len() % 8 != 0 {
        bytes.push(0);
    }
}

fn append_record(bytes: &mut Vec<u8>, layout: &NodeLayout, fields: RecordFields) -> NodeRef {
    align8(bytes);
    let base = bytes.len();
    bytes.resize(base + layout.record_size as usize, 0);

    let put_u16 = |bytes: &mut Vec<u8>, off: u32, v: u16| {
        bytes[base + off as usize..base + off as usize + 2].copy_from_slice(&v.to_le_bytes());
    };
    let put_u32 = |bytes: &mut Vec<u8>, off: u32, v: u32| {
        bytes[base + off as usize..base + off as usize + 4].copy_from_slice(&v.to_le_bytes());
    };
    let put_u64 = |bytes: &mut Vec<u8>, off: u32, v: u64| {
        bytes[base + off as usize..base + off as usize + 8].copy_from_slice(&v.to_le_bytes());
    };

    put_u32(bytes, layout.ref_count, 1);
    put_u32(bytes, layout.padding, fields.padding);
    put_u32(bytes, layout.size, fields.size);
    put_u32(bytes, layout.child_count, fields.child_count);
    put_u16(bytes, layout.symbol, fields.symbol);
    let mut flag_bits = 0u8;
    if fields.flags.visible {
        flag_bits |= FLAG_VISIBLE;
    }
    if fields.flags.named {
        flag_bits |= FLAG_NAMED;
    }
    if fields.flags.extra {
        flag_bits |= FLAG_EXTRA;
    }
    bytes[base + layout.flags as usize] = flag_bits;
    put_u64(bytes, layout.children, fields.children);
    put_u32(bytes, layout.visible_child_count, fields.visible_child_count);
    put_u32(bytes, layout.named_child_count, fields.named_child_count);
    put_u32(bytes, layout.node_count, fields.node_count);
    put_u16(bytes, layout.production_id, fields.production_id);

    NodeRef::from_raw(base as u64)
}

/// Arena writer: the construction side of the layout, used by engine
/// implementations to serialize parse results.
///
/// Leaves small enough to fit the inline encoding are packed into a tagged
/// word automatically; everything else becomes a heap record.
pub struct HeapBuilder {
    layout: NodeLayout,
    heap: NodeHeap,
}

impl HeapBuilder {
    pub fn new(layout: NodeLayout) -> Self {
        let mut bytes = Vec::with_capacity(256);
        bytes.extend_from_slice(&HEAP_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&layout.version.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        debug_assert_eq!(bytes.len(), HEAP_DATA_START);
        HeapBuilder {
            layout,
            heap: NodeHeap { bytes },
        }
    }

    /// Encode a leaf token.
    pub fn leaf(&mut self, symbol: Symbol, padding: u32, size: u32, flags: NodeFlags) -> NodeRef {
        if symbol <= u8::MAX as Symbol && padding <= u8::MAX as u32 && size <= u8::MAX as u32 {
            let mut b0 = INLINE_TAG as u8;
            if flags.visible {
                b0 |= INLINE_VISIBLE;
            }
            if flags.named {
                b0 |= INLINE_NAMED;
            }
            if flags.extra {
                b0 |= INLINE_EXTRA;
            }
            let word = b0 as u64
                | (symbol as u64) << 8
                | (padding as u64) << 16
                | (size as u64) << 24;
            NodeRef::from_raw(word)
        } else {
            append_record(
                &mut self.heap.bytes,
                &self.layout,
                RecordFields {
                    symbol,
                    padding,
                    size,
                    flags,
                    child_count: 0,
                    children: 0,
                    visible_child_count: 0,
                    named_child_count: 0,
                    node_count: 1,
                    production_id: 0,
                },
            )
        }
    }

    /// Encode an interior node over already-built children.
    ///
    /// Padding, size, visible-child and node counts are derived from the
    /// children; the language's alias table for `production_id` decides which
    /// otherwise-invisible children count as visible.
    pub fn interior(
        &mut self,
        symbol: Symbol,
        production_id: u16,
        flags: NodeFlags,
        children: &[NodeRef],
        language: &LanguageData,
    ) -> NodeRef {
        let mut padding = 0u32;
        let mut total = 0u32;
        let mut visible_children = 0u32;
        let mut named_children = 0u32;
        let mut node_count = 1u32;
        {
            let reader = SubtreeReader::new(&self.heap, &self.layout);
            let aliases = language.alias_sequence_for(production_id);
            let mut structural = 0u32;
            for (i, &child) in children.iter().enumerate() {
                if i == 0 {
                    padding = reader.byte_padding(child);
                }
                total += reader.byte_padding(child) + reader.byte_size(child);
                let extra = reader.is_extra(child);
                let aliased = !extra
                    && aliases.is_some_and(|seq| seq.entry(structural) != 0);
                if reader.is_visible(child) || aliased {
                    visible_children += 1;
                } else {
                    visible_children += reader.visible_child_count(child);
                }
                if reader.is_visible(child) {
                    named_children += 1;
                }
                node_count += if child.is_inline() {
                    1
                } else {
                    self.heap
                        .read_u32(child.heap_offset() + self.layout.node_count as usize)
                };
                if !extra {
                    structural += 1;
                }
            }
        }

        align8(&mut self.heap.bytes);
        let children_base = self.heap.bytes.len() as u64;
        for &child in children {
            self.heap.bytes.extend_from_slice(&child.raw().to_le_bytes());
        }

        append_record(
            &mut self.heap.bytes,
            &self.layout,
            RecordFields {
                symbol,
                padding,
                size: total - padding,
                flags,
                child_count: children.len() as u32,
                children: children_base,
                visible_child_count: visible_children,
                named_child_count: named_children,
                node_count,
                production_id,
            },
        )
    }

    /// Seal the arena with its root node.
    pub fn finish(mut self, root: NodeRef) -> RawTree {
        let slot = HEAP_ROOT_OFFSET;
        self.heap.bytes[slot..slot + 8].copy_from_slice(&root.raw().to_le_bytes());
        RawTree::new(self.heap)
    }
}
