//! A small hand-written Go-like engine used as a test double.
//!
//! It implements the full [`Engine`] seam in safe Rust: a tokenizer and
//! recursive-descent parser that serialize into the packed arena through
//! [`HeapBuilder`], a byte-offset edit algorithm that flags changed nodes,
//! and changed-range extraction. The grammar exercises the interesting tree
//! shapes: hidden wrapper rules, alias productions (including a hidden rule
//! made visible through an alias), comments as extras, and error nodes.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use smol_str::SmolStr;
use text_size::TextRange;

use treezip::{
    ByteReader, ERROR_SYMBOL, Edit, Encoding, Engine, HeapBuilder, Language, LanguageData,
    NodeFlags, NodeHeap, NodeLayout, NodeRef, RawParser, RawTree, SubtreeReader, Symbol, Tree,
};

// Terminals.
pub const FUNC: Symbol = 1;
pub const IDENT: Symbol = 2;
pub const LPAREN: Symbol = 3;
pub const RPAREN: Symbol = 4;
pub const LBRACE: Symbol = 5;
pub const RBRACE: Symbol = 6;
pub const TYPE_KW: Symbol = 7;
pub const EQ: Symbol = 8;
pub const LBRACKET: Symbol = 9;
pub const RBRACKET: Symbol = 10;
pub const COMMENT: Symbol = 11;
pub const STRUCT_KW: Symbol = 12;
pub const RAW_STRING: Symbol = 15;

// Non-terminals. Names starting with `_` are hidden rules.
pub const STATEMENT: Symbol = 13;
pub const DECLARATION: Symbol = 14;
pub const SOURCE_FILE: Symbol = 20;
pub const FUNCTION_DECLARATION: Symbol = 21;
pub const PARAMETER_LIST: Symbol = 22;
pub const BLOCK: Symbol = 23;
pub const CALL_EXPRESSION: Symbol = 24;
pub const ARGUMENT_LIST: Symbol = 25;
pub const TYPE_DECLARATION: Symbol = 26;
pub const TYPE_IDENTIFIER: Symbol = 27;
pub const FIELD_IDENTIFIER: Symbol = 28;
pub const SLICE_TYPE: Symbol = 29;
pub const TYPE_NAME: Symbol = 30;
pub const TYPE_SPEC: Symbol = 31;
pub const STRUCT_TYPE: Symbol = 32;
pub const FIELD_DECLARATION_LIST: Symbol = 33;
pub const FIELD_DECLARATION: Symbol = 34;

fn symbol_name(symbol: Symbol) -> Option<&'static str> {
    Some(match symbol {
        FUNC => "func",
        IDENT => "identifier",
        LPAREN => "(",
        RPAREN => ")",
        LBRACE => "{",
        RBRACE => "}",
        TYPE_KW => "type",
        EQ => "=",
        LBRACKET => "[",
        RBRACKET => "]",
        COMMENT => "comment",
        STRUCT_KW => "struct",
        RAW_STRING => "raw_string_literal",
        STATEMENT => "_statement",
        DECLARATION => "_declaration",
        SOURCE_FILE => "source_file",
        FUNCTION_DECLARATION => "function_declaration",
        PARAMETER_LIST => "parameter_list",
        BLOCK => "block",
        CALL_EXPRESSION => "call_expression",
        ARGUMENT_LIST => "argument_list",
        TYPE_DECLARATION => "type_declaration",
        TYPE_IDENTIFIER => "type_identifier",
        FIELD_IDENTIFIER => "field_identifier",
        SLICE_TYPE => "slice_type",
        TYPE_NAME => "_type_name",
        TYPE_SPEC => "type_spec",
        STRUCT_TYPE => "struct_type",
        FIELD_DECLARATION_LIST => "field_declaration_list",
        FIELD_DECLARATION => "field_declaration",
        _ => return None,
    })
}

/// Alias table:
/// production 1 (`type_spec`) aliases its first structural child to
/// `type_identifier`; production 2 (`slice_type`) aliases its third
/// structural child, the hidden `_type_name`, to `type_identifier`;
/// production 3 (`field_declaration`) aliases its first structural child to
/// `field_identifier`.
fn alias_table() -> LanguageData {
    LanguageData::new(
        &[
            0, 0, 0, // production 0: no aliases
            TYPE_IDENTIFIER, 0, 0, // production 1
            0, 0, TYPE_IDENTIFIER, // production 2
            FIELD_IDENTIFIER, 0, 0, // production 3
        ],
        3,
    )
}

pub const TYPE_SPEC_PRODUCTION: u16 = 1;
pub const SLICE_TYPE_PRODUCTION: u16 = 2;
pub const FIELD_DECLARATION_PRODUCTION: u16 = 3;

struct Shared {
    parse_calls: AtomicUsize,
    // Invoked after a raw parse has built its tree, before it returns.
    after_parse: Mutex<Option<Box<dyn Fn() + Send>>>,
}

pub struct MiniGo {
    layout: NodeLayout,
    data: LanguageData,
    shared: Arc<Shared>,
}

impl MiniGo {
    pub fn new() -> MiniGo {
        MiniGo::with_layout(NodeLayout::V1)
    }

    pub fn with_layout(layout: NodeLayout) -> MiniGo {
        MiniGo {
            layout,
            data: alias_table(),
            shared: Arc::new(Shared {
                parse_calls: AtomicUsize::new(0),
                after_parse: Mutex::new(None),
            }),
        }
    }

    pub fn parse_calls(&self) -> usize {
        self.shared.parse_calls.load(Ordering::SeqCst)
    }

    /// Install a hook that runs inside the raw parse, after the tree is
    /// built. Cancelling the parse's token from it simulates a cancellation
    /// the engine observed too late.
    pub fn on_parse_complete(&self, hook: impl Fn() + Send + 'static) {
        *self.shared.after_parse.lock() = Some(Box::new(hook));
    }
}

impl Engine for MiniGo {
    fn language_name(&self) -> &str {
        "mini-go"
    }

    fn symbol_name(&self, symbol: Symbol) -> Option<SmolStr> {
        symbol_name(symbol).map(SmolStr::new_static)
    }

    fn symbol_for_name(&self, name: &str) -> Option<Symbol> {
        (1..=34).find(|&s| symbol_name(s) == Some(name))
    }

    fn is_terminal(&self, symbol: Symbol) -> bool {
        matches!(symbol, 1..=12 | RAW_STRING | TYPE_IDENTIFIER | FIELD_IDENTIFIER)
    }

    fn language_data(&self) -> &LanguageData {
        &self.data
    }

    fn node_layout(&self) -> &NodeLayout {
        &self.layout
    }

    fn new_parser(&self) -> Box<dyn RawParser> {
        Box::new(MiniGoParser {
            layout: self.layout.clone(),
            data: self.data.clone(),
            shared: self.shared.clone(),
        })
    }

    fn copy_tree(&self, tree: &RawTree) -> RawTree {
        tree.deep_copy()
    }

    fn edit_tree(&self, tree: &mut RawTree, edit: &Edit) {
        let root_slot = tree.heap().root_slot();
        let heap = tree
            .heap_mut()
            .unwrap_or_else(|| panic!("edit_tree called on a shared arena"));
        apply_edit(heap, &self.layout, root_slot, 0, edit);
    }

    fn changed_ranges(&self, old: &RawTree, new: &RawTree) -> Vec<TextRange> {
        let mut out = Vec::new();
        {
            let reader = SubtreeReader::new(old.heap(), &self.layout);
            collect_changes(&reader, old.root(), 0, &mut out);
        }
        out.sort_by_key(|r| (r.start(), r.end()));
        let mut merged: Vec<TextRange> = Vec::new();
        for range in out {
            match merged.last_mut() {
                Some(last) if range.start() <= last.end() => {
                    *last = TextRange::new(last.start(), last.end().max(range.end()));
                }
                _ => merged.push(range),
            }
        }
        let new_reader = SubtreeReader::new(new.heap(), &self.layout);
        let new_root = new.root();
        let new_end = text_size::TextSize::from(
            new_reader.byte_padding(new_root) + new_reader.byte_size(new_root),
        );
        merged.retain(|r| r.start() < new_end);
        merged
    }
}

struct MiniGoParser {
    layout: NodeLayout,
    data: LanguageData,
    shared: Arc<Shared>,
}

impl RawParser for MiniGoParser {
    fn parse(
        &mut self,
        reader: &mut dyn ByteReader,
        _encoding: Encoding,
        _prior: Option<&RawTree>,
        cancel: &AtomicBool,
    ) -> Option<RawTree> {
        self.shared.parse_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.load(Ordering::SeqCst) {
            return None;
        }
        let mut src = Vec::new();
        loop {
            let chunk = reader.read(src.len() as u32);
            if chunk.is_empty() {
                break;
            }
            src.extend_from_slice(chunk);
        }
        let tree = build_tree(&src, self.layout.clone(), &self.data);
        if let Some(hook) = self.shared.after_parse.lock().as_ref() {
            hook();
        }
        Some(tree)
    }

    fn reset(&mut self) {}
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

struct Token {
    symbol: Symbol,
    padding: u32,
    size: u32,
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn punct_symbol(b: u8) -> Option<Symbol> {
    Some(match b {
        b'(' => LPAREN,
        b')' => RPAREN,
        b'{' => LBRACE,
        b'}' => RBRACE,
        b'[' => LBRACKET,
        b']' => RBRACKET,
        b'=' => EQ,
        _ => return None,
    })
}

fn tokenize(src: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut padding = 0u32;
    let mut i = 0usize;
    while i < src.len() {
        let b = src[i];
        if b.is_ascii_whitespace() {
            padding += 1;
            i += 1;
        } else if let Some(symbol) = punct_symbol(b) {
            tokens.push(Token {
                symbol,
                padding,
                size: 1,
            });
            padding = 0;
            i += 1;
        } else if b == b'/' && src.get(i + 1) == Some(&b'/') {
            let start = i;
            while i < src.len() && src[i] != b'\n' {
                i += 1;
            }
            tokens.push(Token {
                symbol: COMMENT,
                padding,
                size: (i - start) as u32,
            });
            padding = 0;
        } else if b == b'`' {
            // Raw string literal, backticks included.
            let start = i;
            i += 1;
            while i < src.len() && src[i] != b'`' {
                i += 1;
            }
            if i < src.len() {
                i += 1;
            }
            tokens.push(Token {
                symbol: RAW_STRING,
                padding,
                size: (i - start) as u32,
            });
            padding = 0;
        } else if is_ident_byte(b) {
            let start = i;
            while i < src.len() && is_ident_byte(src[i]) {
                i += 1;
            }
            let symbol = match &src[start..i] {
                b"func" => FUNC,
                b"type" => TYPE_KW,
                b"struct" => STRUCT_KW,
                _ => IDENT,
            };
            tokens.push(Token {
                symbol,
                padding,
                size: (i - start) as u32,
            });
            padding = 0;
        } else {
            // A run of bytes no rule recognizes. Always consumes at least
            // one byte so the scan makes progress.
            let start = i;
            i += 1;
            while i < src.len() {
                let b = src[i];
                if b.is_ascii_whitespace()
                    || punct_symbol(b).is_some()
                    || is_ident_byte(b)
                    || b == b'/'
                {
                    break;
                }
                i += 1;
            }
            tokens.push(Token {
                symbol: ERROR_SYMBOL,
                padding,
                size: (i - start) as u32,
            });
            padding = 0;
        }
    }
    tokens
}

// ---------------------------------------------------------------------------
// Recursive-descent parser over the token stream
// ---------------------------------------------------------------------------

struct TreeWriter<'a> {
    tokens: Vec<Token>,
    pos: usize,
    builder: HeapBuilder,
    data: &'a LanguageData,
}

fn token_flags(symbol: Symbol) -> NodeFlags {
    match symbol {
        IDENT => NodeFlags {
            visible: true,
            named: true,
            extra: false,
        },
        COMMENT => NodeFlags {
            visible: true,
            named: true,
            extra: true,
        },
        RAW_STRING => NodeFlags {
            visible: true,
            named: true,
            extra: false,
        },
        // Unrecognized byte runs stay hidden inside their error node.
        ERROR_SYMBOL => NodeFlags {
            visible: false,
            named: false,
            extra: false,
        },
        _ => NodeFlags {
            visible: true,
            named: false,
            extra: false,
        },
    }
}

fn rule_flags(symbol: Symbol) -> NodeFlags {
    let hidden = matches!(symbol, STATEMENT | DECLARATION | TYPE_NAME);
    NodeFlags {
        visible: !hidden,
        named: !hidden,
        extra: false,
    }
}

impl TreeWriter<'_> {
    fn peek(&self) -> Option<Symbol> {
        self.tokens.get(self.pos).map(|t| t.symbol)
    }

    fn leaf(&mut self) -> NodeRef {
        let token = &self.tokens[self.pos];
        self.pos += 1;
        self.builder
            .leaf(token.symbol, token.padding, token.size, token_flags(token.symbol))
    }

    fn rule(&mut self, symbol: Symbol, production: u16, children: &[NodeRef]) -> NodeRef {
        self.builder
            .interior(symbol, production, rule_flags(symbol), children, self.data)
    }

    fn error_rule(&mut self, children: &[NodeRef]) -> NodeRef {
        let flags = NodeFlags {
            visible: true,
            named: true,
            extra: false,
        };
        self.builder
            .interior(ERROR_SYMBOL, 0, flags, children, self.data)
    }

    fn source_file(&mut self) -> NodeRef {
        let mut children = Vec::new();
        while let Some(symbol) = self.peek() {
            match symbol {
                COMMENT => {
                    let leaf = self.leaf();
                    children.push(leaf);
                }
                FUNC => {
                    let decl = self.function_declaration();
                    let wrapped = self.rule(DECLARATION, 0, &[decl]);
                    children.push(wrapped);
                }
                TYPE_KW => {
                    let decl = self.type_declaration();
                    let wrapped = self.rule(DECLARATION, 0, &[decl]);
                    children.push(wrapped);
                }
                _ => {
                    let error = self.error_until(&[FUNC, TYPE_KW, COMMENT]);
                    children.push(error);
                }
            }
        }
        self.rule(SOURCE_FILE, 0, &children)
    }

    fn error_until(&mut self, stop: &[Symbol]) -> NodeRef {
        let mut children = Vec::new();
        while let Some(symbol) = self.peek() {
            if stop.contains(&symbol) {
                break;
            }
            let leaf = self.leaf();
            children.push(leaf);
        }
        self.error_rule(&children)
    }

    fn function_declaration(&mut self) -> NodeRef {
        let mut children = vec![self.leaf()];
        if self.peek() == Some(IDENT) {
            let name = self.leaf();
            children.push(name);
        }
        let params = self.parameter_list();
        children.push(params);
        let body = self.block();
        children.push(body);
        self.rule(FUNCTION_DECLARATION, 0, &children)
    }

    fn delimited_pair(&mut self, symbol: Symbol) -> NodeRef {
        let mut children = Vec::new();
        if self.peek() == Some(LPAREN) {
            children.push(self.leaf());
        }
        if self.peek() == Some(RPAREN) {
            let close = self.leaf();
            children.push(close);
        }
        self.rule(symbol, 0, &children)
    }

    fn parameter_list(&mut self) -> NodeRef {
        self.delimited_pair(PARAMETER_LIST)
    }

    fn block(&mut self) -> NodeRef {
        let mut children = Vec::new();
        if self.peek() == Some(LBRACE) {
            children.push(self.leaf());
        }
        loop {
            match self.peek() {
                None => break,
                Some(RBRACE) => {
                    let close = self.leaf();
                    children.push(close);
                    break;
                }
                Some(COMMENT) => {
                    let comment = self.leaf();
                    children.push(comment);
                }
                Some(IDENT) => {
                    let call = self.call_expression();
                    let wrapped = self.rule(STATEMENT, 0, &[call]);
                    children.push(wrapped);
                }
                Some(_) => {
                    let error = self.error_until(&[RBRACE, IDENT, COMMENT]);
                    children.push(error);
                }
            }
        }
        self.rule(BLOCK, 0, &children)
    }

    fn call_expression(&mut self) -> NodeRef {
        let callee = self.leaf();
        let args = self.delimited_pair(ARGUMENT_LIST);
        self.rule(CALL_EXPRESSION, 0, &[callee, args])
    }

    fn type_declaration(&mut self) -> NodeRef {
        let keyword = self.leaf();
        let spec = self.type_spec();
        self.rule(TYPE_DECLARATION, 0, &[keyword, spec])
    }

    fn type_spec(&mut self) -> NodeRef {
        let mut children = Vec::new();
        if self.peek() == Some(IDENT) {
            children.push(self.leaf());
        }
        while self.peek() == Some(COMMENT) {
            let comment = self.leaf();
            children.push(comment);
        }
        if self.peek() == Some(EQ) {
            let eq = self.leaf();
            children.push(eq);
        }
        let ty = self.type_expr();
        children.push(ty);
        self.rule(TYPE_SPEC, TYPE_SPEC_PRODUCTION, &children)
    }

    fn type_expr(&mut self) -> NodeRef {
        if self.peek() == Some(STRUCT_KW) {
            let keyword = self.leaf();
            let fields = self.field_declaration_list();
            self.rule(STRUCT_TYPE, 0, &[keyword, fields])
        } else if self.peek() == Some(LBRACKET) {
            let open = self.leaf();
            let close = if self.peek() == Some(RBRACKET) {
                self.leaf()
            } else {
                NodeRef::NULL
            };
            let element = self.type_name();
            let children: Vec<NodeRef> = [open, close, element]
                .into_iter()
                .filter(|n| !n.is_null())
                .collect();
            self.rule(SLICE_TYPE, SLICE_TYPE_PRODUCTION, &children)
        } else {
            self.type_name()
        }
    }

    fn type_name(&mut self) -> NodeRef {
        let mut children = Vec::new();
        if self.peek() == Some(IDENT) {
            children.push(self.leaf());
        }
        self.rule(TYPE_NAME, 0, &children)
    }

    fn field_declaration_list(&mut self) -> NodeRef {
        let mut children = Vec::new();
        if self.peek() == Some(LBRACE) {
            children.push(self.leaf());
        }
        loop {
            match self.peek() {
                None => break,
                Some(RBRACE) => {
                    let close = self.leaf();
                    children.push(close);
                    break;
                }
                Some(COMMENT) => {
                    let comment = self.leaf();
                    children.push(comment);
                }
                Some(IDENT) => {
                    let field = self.field_declaration();
                    children.push(field);
                }
                Some(_) => {
                    let error = self.error_until(&[RBRACE, IDENT, COMMENT]);
                    children.push(error);
                }
            }
        }
        self.rule(FIELD_DECLARATION_LIST, 0, &children)
    }

    fn field_declaration(&mut self) -> NodeRef {
        let mut children = vec![self.leaf()];
        let ty = self.type_expr();
        children.push(ty);
        if self.peek() == Some(RAW_STRING) {
            let tag = self.leaf();
            children.push(tag);
        }
        self.rule(FIELD_DECLARATION, FIELD_DECLARATION_PRODUCTION, &children)
    }
}

fn build_tree(src: &[u8], layout: NodeLayout, data: &LanguageData) -> RawTree {
    let mut writer = TreeWriter {
        tokens: tokenize(src),
        pos: 0,
        builder: HeapBuilder::new(layout),
        data,
    };
    let root = writer.source_file();
    writer.builder.finish(root)
}

// ---------------------------------------------------------------------------
// Editing and changed ranges
// ---------------------------------------------------------------------------

fn apply_edit(heap: &mut NodeHeap, layout: &NodeLayout, slot: usize, node_start: u32, edit: &Edit) {
    let node = NodeRef::from_raw(heap.read_u64(slot));
    if node.is_null() {
        return;
    }
    let delta = edit.new_end as i64 - edit.old_end as i64;
    let (padding, size, children) = {
        let reader = SubtreeReader::new(&*heap, layout);
        let mut children = Vec::new();
        let mut start = node_start;
        for i in 0..reader.child_count(node) {
            let child = reader.child_at(node, i);
            children.push((reader.child_slot(node, i), start));
            start += reader.byte_padding(child) + reader.byte_size(child);
        }
        (reader.byte_padding(node), reader.byte_size(node), children)
    };
    let content_start = node_start + padding;
    let content_end = content_start + size;

    if edit.old_end <= node_start || edit.start >= content_end {
        return;
    }
    if edit.start >= node_start && edit.old_end <= content_start {
        let new_padding = (padding as i64 + delta) as u32;
        write_padding(heap, layout, slot, node, new_padding);
        return;
    }
    let new_size = (size as i64 + delta) as u32;
    write_size(heap, layout, slot, node, new_size);
    for (child_slot, child_start) in children {
        apply_edit(heap, layout, child_slot, child_start, edit);
    }
}

fn write_padding(heap: &mut NodeHeap, layout: &NodeLayout, slot: usize, node: NodeRef, value: u32) {
    if node.is_inline() {
        match node.with_inline_padding(value) {
            Some(updated) => {
                let updated = heap.mark_changed(layout, updated);
                heap.write_word(slot, updated);
            }
            None => promote_inline(heap, layout, slot, node, Some(value), None),
        }
    } else {
        heap.write_u32(node.raw() as usize + layout.padding as usize, value);
        let _ = heap.mark_changed(layout, node);
    }
}

fn write_size(heap: &mut NodeHeap, layout: &NodeLayout, slot: usize, node: NodeRef, value: u32) {
    if node.is_inline() {
        match node.with_inline_size(value) {
            Some(updated) => {
                let updated = heap.mark_changed(layout, updated);
                heap.write_word(slot, updated);
            }
            None => promote_inline(heap, layout, slot, node, None, Some(value)),
        }
    } else {
        heap.write_u32(node.raw() as usize + layout.size as usize, value);
        let _ = heap.mark_changed(layout, node);
    }
}

/// Re-encode an inline leaf as an appended heap record when an edit pushes a
/// field past the inline encoding's range.
fn promote_inline(
    heap: &mut NodeHeap,
    layout: &NodeLayout,
    slot: usize,
    node: NodeRef,
    new_padding: Option<u32>,
    new_size: Option<u32>,
) {
    let (symbol, padding, size, flags) = {
        let reader = SubtreeReader::new(&*heap, layout);
        (
            reader.symbol(node),
            reader.byte_padding(node),
            reader.byte_size(node),
            NodeFlags {
                visible: reader.is_visible(node),
                named: reader.is_named(node),
                extra: reader.is_extra(node),
            },
        )
    };
    let record = heap.append_leaf(
        layout,
        symbol,
        new_padding.unwrap_or(padding),
        new_size.unwrap_or(size),
        flags,
    );
    let record = heap.mark_changed(layout, record);
    heap.write_word(slot, record);
}

fn collect_changes(
    reader: &SubtreeReader<'_>,
    node: NodeRef,
    node_start: u32,
    out: &mut Vec<TextRange>,
) {
    if !reader.has_changes(node) {
        return;
    }
    let mut start = node_start;
    let mut any_child_changed = false;
    for i in 0..reader.child_count(node) {
        let child = reader.child_at(node, i);
        if reader.has_changes(child) {
            any_child_changed = true;
            collect_changes(reader, child, start, out);
        }
        start += reader.byte_padding(child) + reader.byte_size(child);
    }
    if !any_child_changed {
        let content_start = node_start + reader.byte_padding(node);
        out.push(TextRange::new(
            content_start.into(),
            (content_start + reader.byte_size(node)).into(),
        ));
    }
}

// ---------------------------------------------------------------------------
// Conveniences shared by the integration tests
// ---------------------------------------------------------------------------

/// A fresh engine and the language wrapping it.
pub fn mini_go() -> (Arc<MiniGo>, Language) {
    let engine = Arc::new(MiniGo::new());
    let language = Language::new(engine.clone()).expect("layout is supported");
    (engine, language)
}

/// Visible node type names in preorder.
pub fn visible_types(tree: &Tree) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = Some(tree.zipper());
    while let Some(z) = cursor {
        names.push(z.node_type().name().to_string());
        cursor = z.next();
    }
    names
}
