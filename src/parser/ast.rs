//! The intermediate AST produced by the grammar layer, before lowering into elements: block
//! and expression nodes, each carrying a source range.

use crate::source_map::SourceRange;

#[derive(Clone, Debug)]
pub struct Block {
    pub block_type: String,
    pub labels: Vec<String>,
    pub items: Vec<BlockItem>,
    pub range: SourceRange,
}

#[derive(Clone, Debug)]
pub enum BlockItem {
    Attribute { key: String, value: Expr, range: SourceRange },
    Nested(Block),
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Number(f64),
    Boolean(bool),
    Template(Vec<TemplatePart>),
    List(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Reference(Vec<String>),
    Call { name: String, args: Vec<Expr> },
    /// Only produced when the parser session has error-recovery mode enabled.
    Dynamic,
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: SourceRange,
}

/// A fragment of a (possibly interpolated) string: either literal text or a `${...}`
/// reference.
#[derive(Clone, Debug)]
pub enum TemplatePart {
    Literal(String),
    Reference(Vec<String>),
}
