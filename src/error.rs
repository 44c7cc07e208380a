use crate::ast::AstError;

pub type Result<T> = std::result::Result<T, TaseError>;

#[derive(thiserror::Error, Debug)]
pub enum TaseError {
    #[error("architecture is not initialised")]
    ArchitectureNotInitialised,

    #[error("unsupported architecture id {0}")]
    UnsupportedArchitecture(u32),

    #[error("invalid register: {0}")]
    InvalidRegister(String),

    #[error("invalid memory range [{addr:#x};{size}]")]
    InvalidMemoryRange { addr: u64, size: u32 },

    #[error("AST construction failed: {0}")]
    Ast(#[from] AstError),

    #[error("AST node not found")]
    AstNotFound,

    #[error("symbolic engine is not initialised")]
    SymbolicEngineNotInitialised,

    #[error("unknown symbolic expression id {0}")]
    UnknownSymbolicExpressionId(u64),

    #[error("unknown symbolic variable: {0}")]
    UnknownSymbolicVariable(String),

    #[error("simplification failed: {0}")]
    Simplification(String),

    #[error("solver failed: {0}")]
    Solver(String),

    #[error("callback failed: {0}")]
    Callback(String),

    #[error("taint engine is not initialised")]
    TaintEngineNotInitialised,

    #[error("disassembly failed: {0}")]
    Disassembly(String),
}
