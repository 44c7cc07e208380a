//! tase — dynamic binary analysis in three coupled engines.
//!
//! Per machine instruction the session runs concrete execution against
//! an in-memory CPU/memory model, lifts the instruction into a
//! hash-consed bit-vector expression DAG suitable for SMT reasoning,
//! and propagates taint at register/byte granularity. Everything hangs
//! off one [`Tase`] session object:
//!
//! ```no_run
//! use tase::{ArchId, Instruction, Opcode, Operand, Immediate, Tase};
//!
//! # fn main() -> tase::Result<()> {
//! let mut t = Tase::new();
//! t.set_architecture(ArchId::X86_64)?;
//!
//! let rax = t.get_register_from_name("rax").unwrap();
//! t.taint_register(rax)?;
//!
//! let mut inst = Instruction::new(0x401000)
//!     .with_opcode(Opcode::Add)
//!     .with_operands([Operand::Reg(rax), Operand::Imm(Immediate::new(1, 8))]);
//! assert!(t.processing(&mut inst)?);
//! assert!(t.is_register_tainted(rax)?);
//! # Ok(())
//! # }
//! ```

pub mod arch;
pub mod ast;
pub mod callbacks;
pub mod engine;
pub mod error;
pub mod inst;
pub mod operand;
pub mod semantics;
pub mod solver;
pub mod symbolic;
pub mod taint;

pub use arch::{Arch, ArchId, RegSpec};
pub use ast::{AstBuilder, AstError, AstOp, AstRef, ReprMode, Sort};
pub use callbacks::{CallbackId, CallbackKind, Callbacks};
pub use engine::Tase;
pub use error::{Result, TaseError};
pub use inst::{Disassembler, Instruction, InstructionLifter, Opcode};
pub use operand::{Immediate, MemoryAccess, Operand, Register};
pub use solver::{Solver, SolverModel, Z3Solver};
pub use symbolic::{
    EngineState, PathConstraint, SymOpts, SymbolicEngine, SymbolicExpression, SymbolicVariable,
};
pub use taint::TaintEngine;
