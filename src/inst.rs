//! Decoded instructions and the contracts of the external collaborators
//! that produce and consume them: the disassembler fills opcode and
//! operands from raw bytes, the lifter turns a decoded instruction into
//! symbolic expressions and taint updates.

use crate::ast::AstRef;
use crate::engine::Tase;
use crate::error::Result;
use crate::operand::{Immediate, MemoryAccess, Operand, Register};

/// Opcodes understood by the built-in reference semantics. Anything a
/// custom disassembler cannot express here is `Unsupported` and makes
/// `processing` report the instruction as such.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Mov,
    Movzx,
    Add,
    Sub,
    Xor,
    And,
    Or,
    Cmp,
    Test,
    Inc,
    Dec,
    Push,
    Pop,
    Jmp,
    Jz,
    Jnz,
    Nop,
    Unsupported,
}

#[derive(Clone, Debug)]
pub struct Instruction {
    address: u64,
    bytes: Vec<u8>,
    opcode: Opcode,
    disassembly: String,
    operands: Vec<Operand>,
    /// Outputs: expression ids emitted while lifting.
    symbolic_expressions: Vec<u64>,
    /// Inputs recorded by the two-argument operand builders.
    read_registers: Vec<(Register, AstRef)>,
    read_immediates: Vec<(Immediate, AstRef)>,
    load_accesses: Vec<(MemoryAccess, AstRef)>,
    written_registers: Vec<(Register, AstRef)>,
    store_accesses: Vec<(MemoryAccess, AstRef)>,
    tainted_input: bool,
    branch: bool,
    conditional: bool,
}

impl Instruction {
    pub fn new(address: u64) -> Self {
        Instruction {
            address,
            bytes: Vec::new(),
            opcode: Opcode::Unsupported,
            disassembly: String::new(),
            operands: Vec::new(),
            symbolic_expressions: Vec::new(),
            read_registers: Vec::new(),
            read_immediates: Vec::new(),
            load_accesses: Vec::new(),
            written_registers: Vec::new(),
            store_accesses: Vec::new(),
            tainted_input: false,
            branch: false,
            conditional: false,
        }
    }

    pub fn with_opcode(mut self, opcode: Opcode) -> Self {
        self.opcode = opcode;
        self
    }

    pub fn with_operands(mut self, operands: impl IntoIterator<Item = Operand>) -> Self {
        self.operands = operands.into_iter().collect();
        self
    }

    pub fn with_bytes(mut self, bytes: &[u8]) -> Self {
        self.bytes = bytes.to_vec();
        self
    }

    pub fn get_address(&self) -> u64 {
        self.address
    }

    /// Fallthrough address. Operand-built instructions without raw bytes
    /// count as one byte so the program counter still advances.
    pub fn next_address(&self) -> u64 {
        self.address.wrapping_add(self.bytes.len().max(1) as u64)
    }

    pub fn get_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn get_opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.opcode = opcode;
    }

    pub fn get_disassembly(&self) -> &str {
        &self.disassembly
    }

    pub fn set_disassembly(&mut self, text: &str) {
        self.disassembly = text.to_string();
    }

    pub fn get_operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn set_operands(&mut self, operands: Vec<Operand>) {
        self.operands = operands;
    }

    pub fn is_decoded(&self) -> bool {
        self.opcode != Opcode::Unsupported
    }

    pub fn is_branch(&self) -> bool {
        self.branch
    }

    pub fn is_conditional(&self) -> bool {
        self.conditional
    }

    pub fn set_branch(&mut self, conditional: bool) {
        self.branch = true;
        self.conditional = conditional;
    }

    pub fn get_symbolic_expressions(&self) -> &[u64] {
        &self.symbolic_expressions
    }

    pub(crate) fn add_symbolic_expression(&mut self, id: u64) {
        self.symbolic_expressions.push(id);
    }

    pub fn get_read_registers(&self) -> &[(Register, AstRef)] {
        &self.read_registers
    }

    pub(crate) fn add_read_register(&mut self, reg: Register, node: AstRef) {
        self.read_registers.push((reg, node));
    }

    pub fn get_read_immediates(&self) -> &[(Immediate, AstRef)] {
        &self.read_immediates
    }

    pub(crate) fn add_read_immediate(&mut self, imm: Immediate, node: AstRef) {
        self.read_immediates.push((imm, node));
    }

    pub fn get_load_accesses(&self) -> &[(MemoryAccess, AstRef)] {
        &self.load_accesses
    }

    pub(crate) fn add_load_access(&mut self, mem: MemoryAccess, node: AstRef) {
        self.load_accesses.push((mem, node));
    }

    pub fn get_written_registers(&self) -> &[(Register, AstRef)] {
        &self.written_registers
    }

    pub(crate) fn add_written_register(&mut self, reg: Register, node: AstRef) {
        self.written_registers.push((reg, node));
    }

    pub fn get_store_accesses(&self) -> &[(MemoryAccess, AstRef)] {
        &self.store_accesses
    }

    pub(crate) fn add_store_access(&mut self, mem: MemoryAccess, node: AstRef) {
        self.store_accesses.push((mem, node));
    }

    pub fn has_tainted_input(&self) -> bool {
        self.tainted_input
    }

    pub(crate) fn set_tainted_input(&mut self, flag: bool) {
        self.tainted_input |= flag;
    }

    /// Clears the per-processing records so an instruction object can be
    /// fed through the engines again.
    pub fn reset_semantics(&mut self) {
        self.symbolic_expressions.clear();
        self.read_registers.clear();
        self.read_immediates.clear();
        self.load_accesses.clear();
        self.written_registers.clear();
        self.store_accesses.clear();
        self.tainted_input = false;
        self.branch = false;
        self.conditional = false;
    }
}

/// Decodes raw instruction bytes into opcode and operands.
pub trait Disassembler {
    fn disassemble(&mut self, inst: &mut Instruction) -> Result<()>;
}

/// Builds the semantics of one decoded instruction against the engines.
/// Returns `false` when the opcode is not supported.
pub trait InstructionLifter {
    fn lift(&mut self, core: &mut Tase, inst: &mut Instruction) -> Result<bool>;
}
