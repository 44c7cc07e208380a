//! The session façade.
//!
//! One [`Tase`] owns every engine of an analysis session: the
//! architecture model, the AST builder, the callback registry, the
//! symbolic and taint engines and the solver. All state is composed by
//! value; nothing is process-global, so independent sessions coexist.
//!
//! `processing` routes an instruction through disassembly, the lifter,
//! per-destination expression creation, taint propagation and path
//! constraint collection, in that order.

use std::collections::HashMap;
use std::fmt;

use log::{debug, trace};

use crate::arch::{Arch, ArchId, RegSpec};
use crate::ast::{self, AstBuilder, AstRef, ReprMode};
use crate::callbacks::{
    CallbackId, CallbackKind, Callbacks, MemoryReadHandler, RegisterReadHandler,
    SimplificationHandler,
};
use crate::error::{Result, TaseError};
use crate::inst::{Disassembler, Instruction, InstructionLifter};
use crate::operand::{Immediate, MemoryAccess, Operand, Register};
use crate::semantics;
use crate::solver::{Solver, SolverModel, Z3Solver};
use crate::symbolic::{
    EngineState, ExternalSimplifier, PathConstraint, SymOpts, SymbolicEngine, SymbolicExpression,
    SymbolicVariable, VarOrigin,
};
use crate::taint::TaintEngine;

pub struct Tase {
    arch: Arch,
    ast: AstBuilder,
    callbacks: Callbacks,
    symbolic: Option<SymbolicEngine>,
    taint: Option<TaintEngine>,
    solver: Z3Solver,
    disassembler: Option<Box<dyn Disassembler>>,
    lifter: Option<Box<dyn InstructionLifter>>,
}

impl Default for Tase {
    fn default() -> Self {
        Self::new()
    }
}

impl Tase {
    pub fn new() -> Self {
        Tase {
            arch: Arch::new(),
            ast: AstBuilder::new(),
            callbacks: Callbacks::new(),
            symbolic: None,
            taint: None,
            solver: Z3Solver::new(),
            disassembler: None,
            lifter: None,
        }
    }

    /* Architecture ====================================================== */

    /// Installs an architecture and initialises the engines for it.
    pub fn set_architecture(&mut self, id: ArchId) -> Result<()> {
        self.arch.set_architecture(id);
        self.lifter = semantics::lifter_for(id);
        self.init_engines()?;
        debug!("architecture set to {:?}", id);
        Ok(())
    }

    pub fn get_architecture(&self) -> Option<ArchId> {
        self.arch.get_architecture()
    }

    pub fn is_architecture_valid(&self) -> bool {
        self.arch.is_valid()
    }

    pub fn check_architecture(&self) -> Result<()> {
        self.arch.check()
    }

    /// Clears concrete registers and memory; geometry survives.
    pub fn clear_architecture(&mut self) -> Result<()> {
        self.check_architecture()?;
        self.arch.clear();
        Ok(())
    }

    pub fn is_flag(&self, reg: Register) -> bool {
        self.arch.is_flag(reg)
    }

    pub fn is_register(&self, reg: Register) -> bool {
        self.arch.is_register(reg)
    }

    pub fn is_register_valid(&self, reg: Register) -> bool {
        self.arch.is_register_valid(reg)
    }

    /// `(name, upper, lower, parent)` geometry of a register.
    pub fn get_register_info(&self, reg: Register) -> Result<(String, u32, u32, Register)> {
        self.arch.register_info(reg)
    }

    pub fn get_register_spec(&self, reg: Register) -> Result<&RegSpec> {
        self.arch.get_spec(reg)
    }

    pub fn get_parent_register(&self, reg: Register) -> Result<Register> {
        self.arch.parent_register(reg)
    }

    pub fn get_register_bit_size(&self, reg: Register) -> Result<u32> {
        self.arch.register_bit_size(reg)
    }

    pub fn get_register_from_name(&self, name: &str) -> Option<Register> {
        self.arch.register_from_name(name)
    }

    pub fn get_all_registers(&self) -> Vec<Register> {
        self.arch.registers().collect()
    }

    pub fn get_parent_registers(&self) -> Vec<Register> {
        self.arch.parent_registers().collect()
    }

    pub fn get_pc_register(&self) -> Result<Register> {
        self.arch.pc_register()
    }

    pub fn get_sp_register(&self) -> Result<Register> {
        self.arch.sp_register()
    }

    /* Concrete state ==================================================== */

    /// Concrete byte; fires the memory-read callbacks first so an
    /// embedder can lazily populate the cell.
    pub fn get_concrete_memory_value(&mut self, addr: u64) -> Result<u8> {
        self.check_architecture()?;
        let Tase { arch, callbacks, .. } = self;
        callbacks.process_memory_read(arch, &MemoryAccess::new(addr, 1))?;
        Ok(arch.get_memory_value(addr))
    }

    /// Little-endian value of an access; fires the callbacks once for
    /// the whole access.
    pub fn get_concrete_memory_access_value(&mut self, mem: &MemoryAccess) -> Result<u64> {
        self.check_architecture()?;
        let Tase { arch, callbacks, .. } = self;
        callbacks.process_memory_read(arch, mem)?;
        arch.get_memory_access_value(mem)
    }

    pub fn get_concrete_memory_area_value(&mut self, addr: u64, size: usize) -> Result<Vec<u8>> {
        self.check_architecture()?;
        let Tase { arch, callbacks, .. } = self;
        callbacks.process_memory_read(arch, &MemoryAccess::new(addr, size as u32))?;
        Ok(arch.get_memory_area(addr, size))
    }

    pub fn get_concrete_register_value(&mut self, reg: Register) -> Result<u64> {
        self.check_architecture()?;
        let Tase { arch, callbacks, .. } = self;
        callbacks.process_register_read(arch, &reg)?;
        arch.get_register_value(reg)
    }

    /// Writes a concrete byte. Concrete writes desynchronise the
    /// symbolic state; `concretize_memory` re-syncs on demand.
    pub fn set_concrete_memory_value(&mut self, addr: u64, value: u8) -> Result<()> {
        self.check_architecture()?;
        self.arch.set_memory_value(addr, value);
        Ok(())
    }

    pub fn set_concrete_memory_access_value(&mut self, mem: &MemoryAccess, value: u64) -> Result<()> {
        self.check_architecture()?;
        self.arch.set_memory_access_value(mem, value)
    }

    pub fn set_concrete_memory_area_value(&mut self, addr: u64, values: &[u8]) -> Result<()> {
        self.check_architecture()?;
        self.arch.set_memory_area(addr, values);
        Ok(())
    }

    pub fn set_concrete_register_value(&mut self, reg: Register, value: u64) -> Result<()> {
        self.check_architecture()?;
        self.arch.set_register_value(reg, value)
    }

    pub fn is_memory_mapped(&self, addr: u64, size: usize) -> bool {
        self.arch.is_memory_mapped(addr, size)
    }

    pub fn unmap_memory(&mut self, addr: u64, size: usize) {
        self.arch.unmap_memory(addr, size)
    }

    /* Processing ======================================================== */

    pub fn init_engines(&mut self) -> Result<()> {
        self.check_architecture()?;
        self.symbolic = Some(SymbolicEngine::new());
        self.taint = Some(TaintEngine::new());
        Ok(())
    }

    /// Drops every engine and frees the AST pool. The session is left
    /// with the bare architecture.
    pub fn remove_engines(&mut self) {
        if let Some(sym) = self.symbolic.as_mut() {
            sym.tear_down();
        }
        self.symbolic = None;
        self.taint = None;
        self.callbacks.remove_all_callbacks();
        self.ast.free_all_ast_nodes();
        debug!("engines removed");
    }

    /// Fresh engines and a fresh AST pool; registered callbacks survive.
    pub fn reset_engines(&mut self) -> Result<()> {
        self.check_architecture()?;
        self.symbolic = Some(SymbolicEngine::new());
        self.taint = Some(TaintEngine::new());
        self.ast.free_all_ast_nodes();
        Ok(())
    }

    pub fn set_disassembler(&mut self, disassembler: Box<dyn Disassembler>) {
        self.disassembler = Some(disassembler);
    }

    pub fn set_lifter(&mut self, lifter: Box<dyn InstructionLifter>) {
        self.lifter = Some(lifter);
    }

    /// Decodes the instruction's bytes into opcode and operands.
    /// Pre-decoded instructions pass through untouched when no
    /// disassembler is registered.
    pub fn disassembly(&mut self, inst: &mut Instruction) -> Result<()> {
        self.check_architecture()?;
        match self.disassembler.as_mut() {
            Some(d) => d.disassemble(inst),
            // Pre-decoded instructions pass through; only raw bytes need
            // a decoder.
            None if inst.is_decoded() || inst.get_bytes().is_empty() => Ok(()),
            None => Err(TaseError::Disassembly(format!(
                "no disassembler registered for the bytes at {:#x}",
                inst.get_address()
            ))),
        }
    }

    /// Builds the semantics of a decoded instruction. `Ok(false)` means
    /// the instruction is not supported by the lifter.
    pub fn build_semantics(&mut self, inst: &mut Instruction) -> Result<bool> {
        self.check_architecture()?;
        self.check_symbolic()?;
        self.check_taint()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.mark_running();
        }
        let Some(mut lifter) = self.lifter.take() else {
            return Ok(false);
        };
        let supported = lifter.lift(self, inst);
        self.lifter = Some(lifter);
        supported
    }

    /// Disassembly, lifting, taint propagation and path constraints for
    /// one instruction. `Ok(false)` only means "instruction not
    /// supported"; everything else surfaces as an error.
    pub fn processing(&mut self, inst: &mut Instruction) -> Result<bool> {
        self.check_architecture()?;
        inst.reset_semantics();
        self.disassembly(inst)?;
        trace!("processing {:#x} {:?}", inst.get_address(), inst.get_opcode());
        self.build_semantics(inst)
    }

    /* AST =============================================================== */

    pub fn get_ast_builder(&self) -> &AstBuilder {
        &self.ast
    }

    pub fn record_ast_node(&self, node: AstRef) -> AstRef {
        self.ast.record_ast_node(node)
    }

    pub fn record_variable_ast_node(&self, name: &str, node: AstRef) {
        self.ast.record_variable_ast_node(name, node)
    }

    pub fn get_ast_variable_node(&self, name: &str) -> Option<AstRef> {
        self.ast.get_ast_variable_node(name)
    }

    pub fn get_ast_variable_nodes(&self) -> HashMap<String, AstRef> {
        self.ast.get_ast_variable_nodes()
    }

    pub fn set_ast_variable_nodes(&self, vars: HashMap<String, AstRef>) {
        self.ast.set_ast_variable_nodes(vars)
    }

    pub fn get_allocated_ast_nodes(&self) -> Vec<AstRef> {
        self.ast.get_allocated_ast_nodes()
    }

    pub fn set_allocated_ast_nodes(&self, nodes: &[AstRef]) {
        self.ast.set_allocated_ast_nodes(nodes)
    }

    pub fn extract_unique_ast_nodes(&self, root: &AstRef) -> Vec<AstRef> {
        ast::extract_unique_ast_nodes(root)
    }

    pub fn free_ast_nodes(&self, nodes: &[AstRef]) {
        self.ast.free_ast_nodes(nodes)
    }

    pub fn free_all_ast_nodes(&self) {
        self.ast.free_all_ast_nodes()
    }

    pub fn get_ast_dictionaries_stats(&self) -> HashMap<String, usize> {
        self.ast.get_dictionaries_stats()
    }

    pub fn browse_ast_dictionaries(&self, node: &AstRef) -> Option<AstRef> {
        self.ast.browse_ast_dictionaries(node)
    }

    pub fn get_ast_representation_mode(&self) -> ReprMode {
        self.ast.get_representation_mode()
    }

    pub fn set_ast_representation_mode(&self, mode: ReprMode) {
        self.ast.set_representation_mode(mode)
    }

    /// Writes `node` to `out` in the selected representation mode.
    pub fn print_ast_representation(&self, out: &mut dyn fmt::Write, node: &AstRef) -> fmt::Result {
        ast::printer::print_ast_representation(out, node, self.ast.get_representation_mode())
    }

    /* Callbacks ========================================================= */

    pub fn add_memory_read_callback(&mut self, handler: MemoryReadHandler) -> CallbackId {
        self.callbacks.add_memory_read_callback(handler)
    }

    pub fn add_register_read_callback(&mut self, handler: RegisterReadHandler) -> CallbackId {
        self.callbacks.add_register_read_callback(handler)
    }

    pub fn add_simplification_callback(&mut self, handler: SimplificationHandler) -> CallbackId {
        self.callbacks.add_simplification_callback(handler)
    }

    pub fn remove_callback(&mut self, id: CallbackId) {
        self.callbacks.remove_callback(id)
    }

    pub fn remove_all_callbacks(&mut self) {
        self.callbacks.remove_all_callbacks()
    }

    pub fn count_callbacks(&self, kind: CallbackKind) -> usize {
        self.callbacks.count(kind)
    }

    pub fn process_memory_read_callbacks(&mut self, mem: &MemoryAccess) -> Result<()> {
        let Tase { arch, callbacks, .. } = self;
        callbacks.process_memory_read(arch, mem)
    }

    pub fn process_register_read_callbacks(&mut self, reg: Register) -> Result<()> {
        let Tase { arch, callbacks, .. } = self;
        callbacks.process_register_read(arch, &reg)
    }

    pub fn process_simplification_callbacks(&mut self, node: AstRef) -> Result<AstRef> {
        let Tase { ast, callbacks, .. } = self;
        callbacks.process_simplification(ast, node)
    }

    /* Symbolic ========================================================== */

    pub fn check_symbolic(&self) -> Result<()> {
        match &self.symbolic {
            Some(sym) if sym.get_state() != EngineState::TornDown => Ok(()),
            _ => Err(TaseError::SymbolicEngineNotInitialised),
        }
    }

    fn symbolic_ref(&self) -> Result<&SymbolicEngine> {
        self.check_symbolic()?;
        self.symbolic
            .as_ref()
            .ok_or(TaseError::SymbolicEngineNotInitialised)
    }

    pub fn get_symbolic_engine_state(&self) -> Option<EngineState> {
        self.symbolic.as_ref().map(|s| s.get_state())
    }

    pub fn enable_symbolic_engine(&mut self, flag: bool) -> Result<()> {
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.enable(flag);
        }
        Ok(())
    }

    pub fn is_symbolic_engine_enabled(&self) -> bool {
        self.symbolic.as_ref().map(|s| s.is_enabled()).unwrap_or(false)
    }

    pub fn enable_solver_simplification(&mut self, flag: bool) -> Result<()> {
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.enable_solver_simplification(flag);
        }
        Ok(())
    }

    pub fn is_solver_simplification_enabled(&self) -> bool {
        self.symbolic
            .as_ref()
            .map(|s| s.is_solver_simplification_enabled())
            .unwrap_or(false)
    }

    /// Toggles one symbolic optimisation. `AST_DICTIONARIES` also gates
    /// the interning dictionary of the builder.
    pub fn enable_symbolic_optimization(&mut self, opt: SymOpts, flag: bool) -> Result<()> {
        self.check_symbolic()?;
        if opt.contains(SymOpts::AST_DICTIONARIES) {
            self.ast.enable_dictionaries(flag);
        }
        if let Some(sym) = self.symbolic.as_mut() {
            sym.enable_optimization(opt, flag);
        }
        Ok(())
    }

    pub fn is_symbolic_optimization_enabled(&self, opt: SymOpts) -> bool {
        self.symbolic
            .as_ref()
            .map(|s| s.is_optimization_enabled(opt))
            .unwrap_or(false)
    }

    pub fn build_symbolic_immediate(&mut self, imm: &Immediate) -> Result<AstRef> {
        let sym = self
            .symbolic
            .as_ref()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.build_immediate(&self.ast, imm)
    }

    pub fn build_symbolic_immediate_in(
        &mut self,
        inst: &mut Instruction,
        imm: &Immediate,
    ) -> Result<AstRef> {
        let node = self.build_symbolic_immediate(imm)?;
        inst.add_read_immediate(*imm, node.clone());
        Ok(node)
    }

    pub fn build_symbolic_register(&mut self, reg: Register) -> Result<AstRef> {
        let Tase {
            arch,
            ast,
            callbacks,
            symbolic,
            ..
        } = self;
        let sym = symbolic
            .as_ref()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.build_register(arch, ast, callbacks, reg)
    }

    /// Also records the register as an input of `inst`.
    pub fn build_symbolic_register_in(
        &mut self,
        inst: &mut Instruction,
        reg: Register,
    ) -> Result<AstRef> {
        let node = self.build_symbolic_register(reg)?;
        inst.add_read_register(reg, node.clone());
        if let Some(taint) = &self.taint {
            if taint.is_register_tainted(&self.arch, reg)? {
                inst.set_tainted_input(true);
            }
        }
        Ok(node)
    }

    pub fn build_symbolic_memory(&mut self, mem: &MemoryAccess) -> Result<AstRef> {
        let Tase {
            arch,
            ast,
            callbacks,
            symbolic,
            ..
        } = self;
        let sym = symbolic
            .as_ref()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.build_memory(arch, ast, callbacks, mem)
    }

    /// Also records the access as an input of `inst`.
    pub fn build_symbolic_memory_in(
        &mut self,
        inst: &mut Instruction,
        mem: &MemoryAccess,
    ) -> Result<AstRef> {
        let node = self.build_symbolic_memory(mem)?;
        inst.add_load_access(mem.clone(), node.clone());
        if let Some(taint) = &self.taint {
            if taint.is_memory_access_tainted(mem) {
                inst.set_tainted_input(true);
            }
        }
        Ok(node)
    }

    pub fn build_symbolic_operand(&mut self, op: &Operand) -> Result<AstRef> {
        match op {
            Operand::Imm(imm) => self.build_symbolic_immediate(imm),
            Operand::Reg(reg) => self.build_symbolic_register(*reg),
            Operand::Mem(mem) => self.build_symbolic_memory(mem),
        }
    }

    pub fn build_symbolic_operand_in(
        &mut self,
        inst: &mut Instruction,
        op: &Operand,
    ) -> Result<AstRef> {
        match op {
            Operand::Imm(imm) => self.build_symbolic_immediate_in(inst, imm),
            Operand::Reg(reg) => self.build_symbolic_register_in(inst, *reg),
            Operand::Mem(mem) => self.build_symbolic_memory_in(inst, mem),
        }
    }

    pub fn new_symbolic_expression(&mut self, node: AstRef, comment: &str) -> Result<u64> {
        let Tase {
            ast,
            callbacks,
            symbolic,
            solver,
            ..
        } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.new_symbolic_expression(ast, callbacks, Some(solver), node, comment)
    }

    pub fn create_symbolic_register_expression(
        &mut self,
        inst: &mut Instruction,
        node: AstRef,
        reg: Register,
        comment: &str,
    ) -> Result<Option<u64>> {
        let Tase {
            arch,
            ast,
            callbacks,
            symbolic,
            solver,
            ..
        } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.create_symbolic_register_expression(arch, ast, callbacks, Some(solver), inst, node, reg, comment)
    }

    pub fn create_symbolic_flag_expression(
        &mut self,
        inst: &mut Instruction,
        node: AstRef,
        flag: Register,
        comment: &str,
    ) -> Result<Option<u64>> {
        let Tase {
            arch,
            ast,
            callbacks,
            symbolic,
            solver,
            ..
        } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.create_symbolic_flag_expression(arch, ast, callbacks, Some(solver), inst, node, flag, comment)
    }

    pub fn create_symbolic_memory_expression(
        &mut self,
        inst: &mut Instruction,
        node: AstRef,
        mem: &MemoryAccess,
        comment: &str,
    ) -> Result<Option<u64>> {
        let Tase {
            arch,
            ast,
            callbacks,
            symbolic,
            solver,
            ..
        } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.create_symbolic_memory_expression(arch, ast, callbacks, Some(solver), inst, node, mem, comment)
    }

    pub fn create_symbolic_volatile_expression(
        &mut self,
        inst: &mut Instruction,
        node: AstRef,
        comment: &str,
    ) -> Result<u64> {
        let Tase {
            ast,
            callbacks,
            symbolic,
            solver,
            ..
        } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.create_symbolic_volatile_expression(ast, callbacks, Some(solver), inst, node, comment)
    }

    pub fn create_symbolic_expression(
        &mut self,
        inst: &mut Instruction,
        node: AstRef,
        dst: &Operand,
        comment: &str,
    ) -> Result<Option<u64>> {
        let Tase {
            arch,
            ast,
            callbacks,
            symbolic,
            solver,
            ..
        } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.create_symbolic_expression(arch, ast, callbacks, Some(solver), inst, node, dst, comment)
    }

    pub fn assign_symbolic_expression_to_register(&mut self, expr_id: u64, reg: Register) -> Result<()> {
        let Tase { arch, symbolic, .. } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.assign_symbolic_expression_to_register(arch, expr_id, reg)
    }

    pub fn assign_symbolic_expression_to_memory(&mut self, expr_id: u64, mem: &MemoryAccess) -> Result<()> {
        let Tase {
            ast,
            callbacks,
            symbolic,
            solver,
            ..
        } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.assign_symbolic_expression_to_memory(ast, callbacks, Some(solver), expr_id, mem)
    }

    /// Runs the simplification pipeline: registered callbacks first,
    /// then the solver's simplifier when `use_solver` and the engine
    /// flag allow it.
    pub fn process_simplification(&mut self, node: AstRef, use_solver: bool) -> Result<AstRef> {
        let Tase {
            ast,
            callbacks,
            symbolic,
            solver,
            ..
        } = self;
        let sym = symbolic
            .as_ref()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.process_simplification(
            ast,
            callbacks,
            Some(solver as &dyn ExternalSimplifier),
            node,
            use_solver,
        )
    }

    pub fn remove_symbolic_expression(&mut self, id: u64) -> Result<()> {
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.remove_symbolic_expression(id);
        }
        Ok(())
    }

    pub fn get_symbolic_expression_from_id(&self, id: u64) -> Result<&SymbolicExpression> {
        self.symbolic_ref()?.get_symbolic_expression(id)
    }

    pub fn is_symbolic_expression_id_exists(&self, id: u64) -> bool {
        self.symbolic
            .as_ref()
            .map(|s| s.is_symbolic_expression_id_exists(id))
            .unwrap_or(false)
    }

    pub fn get_symbolic_expressions(&self) -> Result<&HashMap<u64, SymbolicExpression>> {
        Ok(self.symbolic_ref()?.get_symbolic_expressions())
    }

    pub fn get_tainted_symbolic_expressions(&self) -> Result<Vec<&SymbolicExpression>> {
        Ok(self.symbolic_ref()?.get_tainted_symbolic_expressions())
    }

    pub fn get_symbolic_registers(&self) -> Result<HashMap<Register, u64>> {
        Ok(self.symbolic_ref()?.get_symbolic_registers())
    }

    pub fn get_symbolic_memory(&self) -> Result<&HashMap<u64, u64>> {
        Ok(self.symbolic_ref()?.get_symbolic_memory())
    }

    pub fn get_symbolic_register_id(&self, reg: Register) -> Result<Option<u64>> {
        self.symbolic_ref()?.get_symbolic_register_id(&self.arch, reg)
    }

    pub fn get_symbolic_memory_id(&self, addr: u64) -> Result<Option<u64>> {
        Ok(self.symbolic_ref()?.get_symbolic_memory_id(addr))
    }

    /// Concolic value of a register through its binding.
    pub fn get_symbolic_register_value(&self, reg: Register) -> Result<u64> {
        self.symbolic_ref()?.get_symbolic_register_value(&self.arch, reg)
    }

    pub fn get_symbolic_memory_value(&self, addr: u64) -> Result<u8> {
        Ok(self.symbolic_ref()?.get_symbolic_memory_value(&self.arch, addr))
    }

    pub fn get_symbolic_memory_access_value(&self, mem: &MemoryAccess) -> Result<u64> {
        self.symbolic_ref()?.get_symbolic_memory_access_value(&self.arch, mem)
    }

    pub fn get_symbolic_memory_area_value(&self, addr: u64, size: usize) -> Result<Vec<u8>> {
        Ok(self
            .symbolic_ref()?
            .get_symbolic_memory_area_value(&self.arch, addr, size))
    }

    pub fn get_ast_from_id(&self, id: u64) -> Result<AstRef> {
        self.symbolic_ref()?.get_ast_from_id(id)
    }

    pub fn get_full_ast_from_id(&self, id: u64) -> Result<AstRef> {
        self.symbolic_ref()?.get_full_ast_from_id(id)
    }

    pub fn concretize_register(&mut self, reg: Register) -> Result<()> {
        let parent = self.arch.parent_register(reg)?;
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.concretize_register(parent);
        }
        Ok(())
    }

    pub fn concretize_all_register(&mut self) -> Result<()> {
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.concretize_all_register();
        }
        Ok(())
    }

    pub fn concretize_memory(&mut self, addr: u64) -> Result<()> {
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.concretize_memory(addr);
        }
        Ok(())
    }

    pub fn concretize_memory_access(&mut self, mem: &MemoryAccess) -> Result<()> {
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.concretize_memory_access(mem);
        }
        Ok(())
    }

    pub fn concretize_all_memory(&mut self) -> Result<()> {
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.concretize_all_memory();
        }
        Ok(())
    }

    pub fn new_symbolic_variable(&mut self, size: u32, comment: &str) -> Result<u64> {
        let Tase { ast, symbolic, .. } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.new_symbolic_variable(ast, size, comment, VarOrigin::None, 0)
    }

    pub fn convert_expression_to_symbolic_variable(
        &mut self,
        expr_id: u64,
        size: u32,
        comment: &str,
    ) -> Result<u64> {
        let Tase { ast, symbolic, .. } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.convert_expression_to_symbolic_variable(ast, expr_id, size, comment)
    }

    pub fn convert_memory_to_symbolic_variable(
        &mut self,
        mem: &MemoryAccess,
        comment: &str,
    ) -> Result<u64> {
        let Tase {
            arch,
            ast,
            callbacks,
            symbolic,
            solver,
            ..
        } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.convert_memory_to_symbolic_variable(arch, ast, callbacks, Some(solver), mem, comment)
    }

    pub fn convert_register_to_symbolic_variable(
        &mut self,
        reg: Register,
        comment: &str,
    ) -> Result<u64> {
        let Tase {
            arch,
            ast,
            callbacks,
            symbolic,
            solver,
            ..
        } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.convert_register_to_symbolic_variable(arch, ast, callbacks, Some(solver), reg, comment)
    }

    pub fn get_symbolic_variable_from_id(&self, id: u64) -> Result<&SymbolicVariable> {
        self.symbolic_ref()?.get_symbolic_variable_from_id(id)
    }

    pub fn get_symbolic_variable_from_name(&self, name: &str) -> Result<&SymbolicVariable> {
        self.symbolic_ref()?.get_symbolic_variable_from_name(name)
    }

    pub fn get_symbolic_variables(&self) -> Result<&HashMap<u64, SymbolicVariable>> {
        Ok(self.symbolic_ref()?.get_symbolic_variables())
    }

    pub fn get_variables_declaration(&self) -> Result<String> {
        Ok(self.symbolic_ref()?.get_variables_declaration())
    }

    pub fn set_expression_tainted(&mut self, id: u64, tainted: bool) -> Result<()> {
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.set_expression_tainted(id, tainted)?;
        }
        Ok(())
    }

    /// Records the branch predicate of a conditional; `taken` tells
    /// which side the concrete trace followed.
    pub fn add_path_constraint(
        &mut self,
        inst: &Instruction,
        condition: AstRef,
        taken: bool,
    ) -> Result<()> {
        let Tase { ast, symbolic, .. } = self;
        let sym = symbolic
            .as_mut()
            .ok_or(TaseError::SymbolicEngineNotInitialised)?;
        sym.add_path_constraint(ast, inst, condition, taken)
    }

    pub fn get_path_constraints(&self) -> Result<&[PathConstraint]> {
        Ok(self.symbolic_ref()?.get_path_constraints())
    }

    /// Conjunction of the taken predicates since the last clear.
    pub fn get_path_constraints_ast(&self) -> Result<AstRef> {
        self.symbolic_ref()?.get_path_constraints_ast(&self.ast)
    }

    pub fn clear_path_constraints(&mut self) -> Result<()> {
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.clear_path_constraints();
        }
        Ok(())
    }

    pub fn backup_symbolic_engine(&mut self) -> Result<()> {
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.backup();
        }
        Ok(())
    }

    pub fn restore_symbolic_engine(&mut self) -> Result<()> {
        self.check_symbolic()?;
        if let Some(sym) = self.symbolic.as_mut() {
            sym.restore();
        }
        Ok(())
    }

    /* Solver ============================================================ */

    fn models_by_id(&self, named: HashMap<String, u64>) -> Result<HashMap<u64, SolverModel>> {
        let sym = self.symbolic_ref()?;
        let mut out = HashMap::new();
        for (name, value) in named {
            if let Ok(var) = sym.get_symbolic_variable_from_name(&name) {
                out.insert(
                    var.get_id(),
                    SolverModel {
                        id: var.get_id(),
                        name,
                        value,
                    },
                );
            }
        }
        Ok(out)
    }

    /// A model satisfying `node`, keyed by symbolic variable id; empty
    /// when unsatisfiable.
    pub fn get_model(&self, node: &AstRef) -> Result<HashMap<u64, SolverModel>> {
        let named = self.solver.get_model(node)?;
        self.models_by_id(named)
    }

    /// Up to `limit` models distinct on at least one variable.
    pub fn get_models(&self, node: &AstRef, limit: usize) -> Result<Vec<HashMap<u64, SolverModel>>> {
        let named = self.solver.get_models(node, limit)?;
        named.into_iter().map(|m| self.models_by_id(m)).collect()
    }

    /// Concrete value of a variable-free tree, through the solver.
    pub fn evaluate_ast(&self, node: &AstRef) -> Result<u64> {
        self.solver.evaluate(node)
    }

    pub fn is_sat(&self, node: &AstRef) -> Result<bool> {
        self.solver.is_sat(node)
    }

    /* Taint ============================================================= */

    pub fn check_taint(&self) -> Result<()> {
        if self.taint.is_none() {
            return Err(TaseError::TaintEngineNotInitialised);
        }
        Ok(())
    }

    fn taint_ref(&self) -> Result<&TaintEngine> {
        self.taint.as_ref().ok_or(TaseError::TaintEngineNotInitialised)
    }

    fn taint_mut(&mut self) -> Result<(&Arch, &mut TaintEngine)> {
        let Tase { arch, taint, .. } = self;
        let taint = taint.as_mut().ok_or(TaseError::TaintEngineNotInitialised)?;
        Ok((arch, taint))
    }

    pub fn enable_taint_engine(&mut self, flag: bool) -> Result<()> {
        let (_, taint) = self.taint_mut()?;
        taint.enable(flag);
        Ok(())
    }

    pub fn is_taint_engine_enabled(&self) -> bool {
        self.taint.as_ref().map(|t| t.is_enabled()).unwrap_or(false)
    }

    pub fn get_tainted_memory(&self) -> Result<&std::collections::HashSet<u64>> {
        Ok(self.taint_ref()?.get_tainted_memory())
    }

    pub fn get_tainted_registers(&self) -> Result<&std::collections::HashSet<Register>> {
        Ok(self.taint_ref()?.get_tainted_registers())
    }

    pub fn is_tainted(&self, op: &Operand) -> Result<bool> {
        self.taint_ref()?.is_tainted(&self.arch, op)
    }

    pub fn is_memory_tainted(&self, addr: u64, size: u32) -> Result<bool> {
        Ok(self.taint_ref()?.is_memory_tainted(addr, size))
    }

    pub fn is_memory_access_tainted(&self, mem: &MemoryAccess) -> Result<bool> {
        Ok(self.taint_ref()?.is_memory_access_tainted(mem))
    }

    pub fn is_register_tainted(&self, reg: Register) -> Result<bool> {
        self.taint_ref()?.is_register_tainted(&self.arch, reg)
    }

    pub fn set_taint(&mut self, op: &Operand, flag: bool) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.set_taint(arch, op, flag)
    }

    pub fn set_taint_memory(&mut self, mem: &MemoryAccess, flag: bool) -> Result<bool> {
        let (_, taint) = self.taint_mut()?;
        Ok(taint.set_taint_memory(mem, flag))
    }

    pub fn set_taint_register(&mut self, reg: Register, flag: bool) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.set_taint_register(arch, reg, flag)
    }

    pub fn taint_memory(&mut self, addr: u64) -> Result<bool> {
        let (_, taint) = self.taint_mut()?;
        Ok(taint.taint_memory(addr))
    }

    pub fn taint_memory_access(&mut self, mem: &MemoryAccess) -> Result<bool> {
        let (_, taint) = self.taint_mut()?;
        Ok(taint.taint_memory_access(mem))
    }

    pub fn untaint_memory(&mut self, addr: u64) -> Result<bool> {
        let (_, taint) = self.taint_mut()?;
        Ok(taint.untaint_memory(addr))
    }

    pub fn untaint_memory_access(&mut self, mem: &MemoryAccess) -> Result<bool> {
        let (_, taint) = self.taint_mut()?;
        Ok(taint.untaint_memory_access(mem))
    }

    pub fn taint_register(&mut self, reg: Register) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.taint_register(arch, reg)
    }

    pub fn untaint_register(&mut self, reg: Register) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.untaint_register(arch, reg)
    }

    pub fn taint_union(&mut self, dst: &Operand, src: &Operand) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.taint_union(arch, dst, src)
    }

    pub fn taint_assignment(&mut self, dst: &Operand, src: &Operand) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.taint_assignment(arch, dst, src)
    }

    pub fn taint_union_memory_immediate(&mut self, dst: &MemoryAccess) -> Result<bool> {
        let (_, taint) = self.taint_mut()?;
        Ok(taint.taint_union_memory_immediate(dst))
    }

    pub fn taint_union_memory_memory(&mut self, dst: &MemoryAccess, src: &MemoryAccess) -> Result<bool> {
        let (_, taint) = self.taint_mut()?;
        Ok(taint.taint_union_memory_memory(dst, src))
    }

    pub fn taint_union_memory_register(&mut self, dst: &MemoryAccess, src: Register) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.taint_union_memory_register(arch, dst, src)
    }

    pub fn taint_union_register_immediate(&mut self, dst: Register) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.taint_union_register_immediate(arch, dst)
    }

    pub fn taint_union_register_memory(&mut self, dst: Register, src: &MemoryAccess) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.taint_union_register_memory(arch, dst, src)
    }

    pub fn taint_union_register_register(&mut self, dst: Register, src: Register) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.taint_union_register_register(arch, dst, src)
    }

    pub fn taint_assignment_memory_immediate(&mut self, dst: &MemoryAccess) -> Result<bool> {
        let (_, taint) = self.taint_mut()?;
        Ok(taint.taint_assignment_memory_immediate(dst))
    }

    pub fn taint_assignment_memory_memory(&mut self, dst: &MemoryAccess, src: &MemoryAccess) -> Result<bool> {
        let (_, taint) = self.taint_mut()?;
        Ok(taint.taint_assignment_memory_memory(dst, src))
    }

    pub fn taint_assignment_memory_register(&mut self, dst: &MemoryAccess, src: Register) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.taint_assignment_memory_register(arch, dst, src)
    }

    pub fn taint_assignment_register_immediate(&mut self, dst: Register) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.taint_assignment_register_immediate(arch, dst)
    }

    pub fn taint_assignment_register_memory(&mut self, dst: Register, src: &MemoryAccess) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.taint_assignment_register_memory(arch, dst, src)
    }

    pub fn taint_assignment_register_register(&mut self, dst: Register, src: Register) -> Result<bool> {
        let (arch, taint) = self.taint_mut()?;
        taint.taint_assignment_register_register(arch, dst, src)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn engines_require_an_architecture() {
        let mut t = Tase::new();
        assert!(matches!(
            t.init_engines(),
            Err(TaseError::ArchitectureNotInitialised)
        ));
        assert!(matches!(
            t.check_symbolic(),
            Err(TaseError::SymbolicEngineNotInitialised)
        ));
    }

    #[test]
    fn set_architecture_initialises_everything() {
        let mut t = Tase::new();
        t.set_architecture(ArchId::X86_64).unwrap();
        assert!(t.is_architecture_valid());
        assert!(t.check_symbolic().is_ok());
        assert!(t.check_taint().is_ok());
        assert!(t.is_symbolic_engine_enabled());
        assert!(t.is_taint_engine_enabled());
    }

    #[test]
    fn remove_engines_tears_down() {
        let mut t = Tase::new();
        t.set_architecture(ArchId::X86_64).unwrap();
        t.remove_engines();
        assert!(matches!(
            t.check_symbolic(),
            Err(TaseError::SymbolicEngineNotInitialised)
        ));
        assert!(matches!(
            t.check_taint(),
            Err(TaseError::TaintEngineNotInitialised)
        ));
    }

    #[test]
    fn expression_ids_are_monotonic() {
        let mut t = Tase::new();
        t.set_architecture(ArchId::X86_64).unwrap();
        let a = t.get_ast_builder().new_bv(1, 8).unwrap();
        let b = t.get_ast_builder().new_bv(2, 8).unwrap();
        let id1 = t.new_symbolic_expression(a, "").unwrap();
        let id2 = t.new_symbolic_expression(b, "").unwrap();
        assert!(id2 > id1);
        assert!(matches!(
            t.get_symbolic_expression_from_id(id2 + 1),
            Err(TaseError::UnknownSymbolicExpressionId(_))
        ));
    }
}
