//! Language handles: a shared engine plus node-type interning.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::engine::Engine;
use crate::error::Error;
use crate::layout::{ERROR_SYMBOL, LanguageData, NodeLayout, Symbol};
use crate::node_type::{NodeType, NodeTypeKind};

/// A parseable language: one engine plus caches mapping between node type
/// names, numeric symbols and [`NodeType`] values.
///
/// Cheap to clone; clones share the engine and the caches. Symbol lookups hit
/// the engine once and are interned thereafter, so hot paths (zipper
/// `node_type`) stay off the engine after warmup.
#[derive(Clone)]
pub struct Language {
    inner: Arc<LanguageInner>,
}

struct LanguageInner {
    engine: Arc<dyn Engine>,
    by_name: RwLock<FxHashMap<SmolStr, Symbol>>,
    by_symbol: RwLock<FxHashMap<Symbol, NodeType>>,
}

impl Language {
    /// Wrap an engine, refusing if its node layout is from a different
    /// version than this crate understands.
    pub fn new(engine: Arc<dyn Engine>) -> Result<Language, Error> {
        engine.node_layout().validate()?;
        let mut by_symbol = FxHashMap::default();
        // The error node is builtin and never appears in the grammar's
        // name table.
        by_symbol.insert(ERROR_SYMBOL, NodeType::error());
        Ok(Language {
            inner: Arc::new(LanguageInner {
                engine,
                by_name: RwLock::new(FxHashMap::default()),
                by_symbol: RwLock::new(by_symbol),
            }),
        })
    }

    pub fn name(&self) -> &str {
        self.inner.engine.language_name()
    }

    /// A fresh parser for this language.
    pub fn parser(&self) -> crate::Parser {
        crate::Parser::new(self)
    }

    /// Resolve a grammar node type by name.
    ///
    /// Unknown names are a programmer error and reported eagerly rather than
    /// deferred to the first tree lookup.
    pub fn node_type(&self, name: &str) -> Result<NodeType, Error> {
        if let Some(&symbol) = self.inner.by_name.read().get(name) {
            return Ok(self.node_type_for_symbol(symbol));
        }
        let symbol = self
            .inner
            .engine
            .symbol_for_name(name)
            .ok_or_else(|| Error::UnknownNodeType {
                name: SmolStr::new(name),
            })?;
        self.inner
            .by_name
            .write()
            .insert(SmolStr::new(name), symbol);
        Ok(self.node_type_for_symbol(symbol))
    }

    /// The numeric symbol of a previously resolved node type.
    pub fn symbol_for(&self, node_type: &NodeType) -> Result<Symbol, Error> {
        if node_type.is_error() {
            return Ok(ERROR_SYMBOL);
        }
        if let Some(&symbol) = self.inner.by_name.read().get(node_type.name()) {
            return Ok(symbol);
        }
        self.node_type(node_type.name())?;
        Ok(self.inner.by_name.read()[node_type.name()])
    }

    /// The interned node type of a symbol read out of a tree.
    ///
    /// # Panics
    ///
    /// Panics if the engine does not recognize the symbol. Symbols come from
    /// trees the same engine produced, so an unknown one means the tree and
    /// the grammar are out of sync.
    pub fn node_type_for_symbol(&self, symbol: Symbol) -> NodeType {
        if let Some(node_type) = self.inner.by_symbol.read().get(&symbol) {
            return node_type.clone();
        }
        let name = match self.inner.engine.symbol_name(symbol) {
            Some(name) => name,
            None => panic!(
                "symbol {symbol} has no name in language {:?}",
                self.inner.engine.language_name()
            ),
        };
        let kind = if self.inner.engine.is_terminal(symbol) {
            NodeTypeKind::Terminal
        } else {
            NodeTypeKind::NonTerminal
        };
        let node_type = NodeType::new(name, kind);
        self.inner
            .by_symbol
            .write()
            .insert(symbol, node_type.clone());
        node_type
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.inner.engine
    }

    pub(crate) fn language_data(&self) -> &LanguageData {
        self.inner.engine.language_data()
    }

    pub(crate) fn layout(&self) -> &NodeLayout {
        self.inner.engine.node_layout()
    }
}

impl std::fmt::Debug for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.name())
            .finish()
    }
}
