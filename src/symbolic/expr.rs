//! Symbolic expressions, variables and path constraints.

use std::fmt;

use crate::ast::AstRef;
use crate::operand::Register;

/// Where an expression writes to, when it is not volatile.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    /// Bound to memory, byte range `[address; size]`.
    Memory { address: u64, size: u32 },
    /// Bound to a parent register.
    Register(Register),
    /// Not bound to any destination.
    Volatile,
    Undef,
}

#[derive(Clone, Debug)]
pub struct SymbolicExpression {
    id: u64,
    node: AstRef,
    kind: ExprKind,
    comment: String,
    tainted: bool,
}

impl SymbolicExpression {
    pub(crate) fn new(id: u64, node: AstRef, kind: ExprKind, comment: &str) -> Self {
        SymbolicExpression {
            id,
            node,
            kind,
            comment: comment.to_string(),
            tainted: false,
        }
    }

    pub fn get_id(&self) -> u64 {
        self.id
    }

    pub fn get_node(&self) -> AstRef {
        self.node.clone()
    }

    pub(crate) fn set_node(&mut self, node: AstRef) {
        self.node = node;
    }

    pub fn get_kind(&self) -> &ExprKind {
        &self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: ExprKind) {
        self.kind = kind;
    }

    pub fn get_comment(&self) -> &str {
        &self.comment
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.kind, ExprKind::Memory { .. })
    }

    pub fn is_register(&self) -> bool {
        matches!(self.kind, ExprKind::Register(_))
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    pub(crate) fn set_tainted(&mut self, tainted: bool) {
        self.tainted = tainted;
    }
}

impl fmt::Display for SymbolicExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref_{} = {}", self.id, crate::ast::printer::ast_to_string(&self.node, crate::ast::ReprMode::Smt))?;
        if !self.comment.is_empty() {
            write!(f, " ; {}", self.comment)?;
        }
        Ok(())
    }
}

/// Concrete location a variable was introduced from, when any.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VarOrigin {
    Memory(u64),
    Register(Register),
    None,
}

#[derive(Clone, Debug)]
pub struct SymbolicVariable {
    id: u64,
    name: String,
    /// Width in bits.
    size: u32,
    comment: String,
    origin: VarOrigin,
}

impl SymbolicVariable {
    pub(crate) fn new(id: u64, size: u32, comment: &str, origin: VarOrigin) -> Self {
        SymbolicVariable {
            id,
            name: format!("SymVar_{}", id),
            size,
            comment: comment.to_string(),
            origin,
        }
    }

    pub fn get_id(&self) -> u64 {
        self.id
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn get_size(&self) -> u32 {
        self.size
    }

    pub fn get_comment(&self) -> &str {
        &self.comment
    }

    pub fn get_origin(&self) -> VarOrigin {
        self.origin
    }
}

impl fmt::Display for SymbolicVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.size)
    }
}

/// One conditional branch along the trace: the predicate of the branch
/// actually taken and the predicate of the alternative.
#[derive(Clone, Debug)]
pub struct PathConstraint {
    pub address: u64,
    pub taken: AstRef,
    pub alternative: Option<AstRef>,
}
