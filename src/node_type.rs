//! Node type values.

use smol_str::SmolStr;

/// Classification of a grammar node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTypeKind {
    /// A grammar rule with structure beneath it.
    NonTerminal,
    /// A token.
    Terminal,
    /// The engine's builtin error node, wrapping unparseable text.
    Error,
}

/// An immutable node type: a grammar name plus its kind.
///
/// Values compare by content, so two lookups of the same name from the same
/// language are interchangeable. The numeric symbol id is per-language and
/// kept out of this type; `Language` owns that mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeType {
    name: SmolStr,
    kind: NodeTypeKind,
}

impl NodeType {
    pub(crate) fn new(name: impl Into<SmolStr>, kind: NodeTypeKind) -> Self {
        NodeType {
            name: name.into(),
            kind,
        }
    }

    pub(crate) fn error() -> Self {
        NodeType {
            name: SmolStr::new_static("ERROR"),
            kind: NodeTypeKind::Error,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeTypeKind {
        self.kind
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, NodeTypeKind::Terminal)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, NodeTypeKind::Error)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
