//! Symbolic engine.
//!
//! Registers and memory bytes map to symbolic expression ids. Register
//! bindings are kept at parent granularity: writing a sub-register
//! synthesises a parent-wide expression that concatenates the preserved
//! sibling bits around the new value. Memory bindings are kept one byte
//! per entry; multi-byte reads build a concat over the byte expressions,
//! most significant first.
//!
//! Writing concrete state directly desynchronises it from the symbolic
//! bindings; the `concretize_*` operations sever a binding so the next
//! build re-reads the concrete state through the read callbacks.

pub mod expr;

pub use expr::{ExprKind, PathConstraint, SymbolicExpression, SymbolicVariable, VarOrigin};

use std::collections::HashMap;

use bitflags::bitflags;
use log::{debug, trace};

use crate::arch::Arch;
use crate::ast::{AstBuilder, AstError, AstRef, Sort};
use crate::callbacks::Callbacks;
use crate::error::{Result, TaseError};
use crate::inst::Instruction;
use crate::operand::{Immediate, MemoryAccess, Operand, Register};

bitflags! {
    /// Symbolic execution optimisations, individually toggled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymOpts: u32 {
        /// Hash-cons AST nodes through the dictionary.
        const AST_DICTIONARIES   = 0b0001;
        /// Short-circuit multi-byte loads when a contiguous expression
        /// is bound at the same address and size.
        const ALIGNED_MEMORY     = 0b0010;
        /// Skip expression creation when no input is tainted.
        const ONLY_ON_TAINTED    = 0b0100;
        /// Skip expression creation when no input is symbolized.
        const ONLY_ON_SYMBOLIZED = 0b1000;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Initialised,
    Running,
    BackedUp,
    TornDown,
}

/// Hooks the engine calls to push an AST through an external solver's
/// simplifier and back.
pub trait ExternalSimplifier {
    fn simplify(&self, ast: &AstBuilder, node: &AstRef) -> Result<AstRef>;
}

#[derive(Clone)]
pub struct SymbolicEngine {
    state: EngineState,
    enabled: bool,
    solver_simplification: bool,
    opts: SymOpts,
    expressions: HashMap<u64, SymbolicExpression>,
    variables: HashMap<u64, SymbolicVariable>,
    var_names: HashMap<String, u64>,
    /// Byte address to expression id.
    mem_map: HashMap<u64, u64>,
    /// Parent register id to expression id.
    reg_map: HashMap<u16, u64>,
    /// `(address, size)` of whole bound accesses, for `ALIGNED_MEMORY`.
    aligned_mem: HashMap<(u64, u32), u64>,
    next_expr_id: u64,
    next_var_id: u64,
    path_constraints: Vec<PathConstraint>,
    backup: Option<Box<SymbolicEngine>>,
}

impl Default for SymbolicEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolicEngine {
    pub fn new() -> Self {
        SymbolicEngine {
            state: EngineState::Initialised,
            enabled: true,
            solver_simplification: false,
            opts: SymOpts::AST_DICTIONARIES,
            expressions: HashMap::new(),
            variables: HashMap::new(),
            var_names: HashMap::new(),
            mem_map: HashMap::new(),
            reg_map: HashMap::new(),
            aligned_mem: HashMap::new(),
            next_expr_id: 0,
            next_var_id: 0,
            path_constraints: Vec::new(),
            backup: None,
        }
    }

    pub fn get_state(&self) -> EngineState {
        self.state
    }

    pub(crate) fn mark_running(&mut self) {
        self.state = EngineState::Running;
    }

    pub(crate) fn tear_down(&mut self) {
        self.state = EngineState::TornDown;
    }

    pub fn enable(&mut self, flag: bool) {
        self.enabled = flag;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable_solver_simplification(&mut self, flag: bool) {
        self.solver_simplification = flag;
    }

    pub fn is_solver_simplification_enabled(&self) -> bool {
        self.solver_simplification
    }

    pub fn enable_optimization(&mut self, opt: SymOpts, flag: bool) {
        self.opts.set(opt, flag);
    }

    pub fn is_optimization_enabled(&self, opt: SymOpts) -> bool {
        self.opts.contains(opt)
    }

    /* Operand builders ================================================== */

    pub fn build_immediate(&self, ast: &AstBuilder, imm: &Immediate) -> Result<AstRef> {
        Ok(ast.new_bv(imm.value, imm.bit_size())?)
    }

    /// AST currently describing `reg`, extracted to its bit range. An
    /// unbound register fires the concrete-register-read callbacks and
    /// wraps the concrete value as a constant.
    pub fn build_register(
        &self,
        arch: &mut Arch,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        reg: Register,
    ) -> Result<AstRef> {
        let (_, upper, lower, parent) = arch.register_info(reg)?;
        if let Some(&eid) = self.reg_map.get(&parent.0) {
            let node = self.get_symbolic_expression(eid)?.get_node();
            return Ok(ast.new_extract(upper, lower, node)?);
        }
        cbs.process_register_read(arch, &reg)?;
        let value = arch.get_register_value(reg)?;
        let size = arch.register_bit_size(reg)?;
        Ok(ast.new_bv(value, size)?)
    }

    /// `concat(byte_{addr+N-1}, …, byte_addr)` over the bound byte
    /// expressions; unbound bytes fire the concrete-memory-read
    /// callbacks and wrap the concrete byte.
    pub fn build_memory(
        &self,
        arch: &mut Arch,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        mem: &MemoryAccess,
    ) -> Result<AstRef> {
        if mem.size == 0 {
            return Err(TaseError::InvalidMemoryRange {
                addr: mem.address,
                size: mem.size,
            });
        }
        if self.opts.contains(SymOpts::ALIGNED_MEMORY) {
            if let Some(&eid) = self.aligned_mem.get(&(mem.address, mem.size)) {
                trace!("aligned memory hit at {:#x};{}", mem.address, mem.size);
                return Ok(self.get_symbolic_expression(eid)?.get_node());
            }
        }
        let mut node: Option<AstRef> = None;
        for k in (0..u64::from(mem.size)).rev() {
            let addr = mem.address.wrapping_add(k);
            let byte = match self.mem_map.get(&addr) {
                Some(&eid) => self.get_symbolic_expression(eid)?.get_node(),
                None => {
                    cbs.process_memory_read(arch, &MemoryAccess::new(addr, 1))?;
                    ast.new_bv(u64::from(arch.get_memory_value(addr)), 8)?
                }
            };
            node = Some(match node {
                Some(high) => ast.new_concat(high, byte)?,
                None => byte,
            });
        }
        // Unreachable: size is non-zero.
        node.ok_or(TaseError::InvalidMemoryRange {
            addr: mem.address,
            size: mem.size,
        })
    }

    pub fn build_operand(
        &self,
        arch: &mut Arch,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        op: &Operand,
    ) -> Result<AstRef> {
        match op {
            Operand::Imm(imm) => self.build_immediate(ast, imm),
            Operand::Reg(reg) => self.build_register(arch, ast, cbs, *reg),
            Operand::Mem(mem) => self.build_memory(arch, ast, cbs, mem),
        }
    }

    /* Simplification ==================================================== */

    /// Runs the registered simplification passes over `node`, then the
    /// external solver simplifier when `use_external` and the engine
    /// flag both allow it. Pure with respect to `node`.
    pub fn process_simplification(
        &self,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        node: AstRef,
        use_external: bool,
    ) -> Result<AstRef> {
        let with_external = use_external && self.solver_simplification && external.is_some();
        let key = node.get_hash() ^ (with_external as u64);
        if let Some(cached) = cbs.cached_simplification(key) {
            return Ok(cached);
        }
        let mut out = cbs.process_simplification(ast, node)?;
        if with_external {
            if let Some(solver) = external {
                out = solver.simplify(ast, &out)?;
            }
        }
        let out = ast.record_ast_node(out);
        cbs.cache_simplification(key, out.clone());
        Ok(out)
    }

    /* Expression creation =============================================== */

    /// Simplifies `node` and stores it as a fresh volatile expression.
    pub fn new_symbolic_expression(
        &mut self,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        node: AstRef,
        comment: &str,
    ) -> Result<u64> {
        let node = self.process_simplification(ast, cbs, external, node, true)?;
        let id = self.next_expr_id;
        self.next_expr_id += 1;
        self.expressions
            .insert(id, SymbolicExpression::new(id, node, ExprKind::Volatile, comment));
        trace!("new symbolic expression ref_{}", id);
        Ok(id)
    }

    /// Skip gates shared by the destination-bound creators. Concrete
    /// execution still happens for skipped destinations.
    fn skips_creation(&self, node: &AstRef, inst: &Instruction) -> bool {
        if !self.enabled {
            return true;
        }
        if self.opts.contains(SymOpts::ONLY_ON_SYMBOLIZED) && node.is_concretized() {
            return true;
        }
        if self.opts.contains(SymOpts::ONLY_ON_TAINTED) && !inst.has_tainted_input() {
            return true;
        }
        false
    }

    /// Parent-wide expression for writing `node` into `reg`: sibling
    /// bits of the parent are preserved around the written range, except
    /// for ranges the geometry declares zero-extending.
    fn synthesize_parent_write(
        &self,
        arch: &mut Arch,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        node: AstRef,
        reg: Register,
    ) -> Result<AstRef> {
        let (_, upper, lower, parent) = arch.register_info(reg)?;
        let spec_size = upper - lower + 1;
        if node.get_size() != spec_size {
            return Err(AstError::SortIntegrity(Sort::Bitv(spec_size), node.get_sort()).into());
        }
        let parent_size = arch.register_bit_size(parent)?;
        if spec_size == parent_size {
            return Ok(node);
        }
        if arch.get_spec(reg)?.zero_extends {
            return Ok(ast.new_zero_extend(parent_size - spec_size, node)?);
        }
        let parent_ast = self.build_register(arch, ast, cbs, parent)?;
        let mut full = node;
        if upper < parent_size - 1 {
            let high = ast.new_extract(parent_size - 1, upper + 1, parent_ast.clone())?;
            full = ast.new_concat(high, full)?;
        }
        if lower > 0 {
            let low = ast.new_extract(lower - 1, 0, parent_ast)?;
            full = ast.new_concat(full, low)?;
        }
        Ok(full)
    }

    /// Binds `node` (sized to `reg`) to the register and returns the
    /// expression id. Keeps the concrete register in sync while the
    /// value stays concrete.
    fn assign_register(
        &mut self,
        arch: &mut Arch,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        node: AstRef,
        reg: Register,
        comment: &str,
    ) -> Result<u64> {
        let full = self.synthesize_parent_write(arch, ast, cbs, node, reg)?;
        let parent = arch.parent_register(reg)?;
        let id = self.new_symbolic_expression(ast, cbs, external, full, comment)?;
        if let Some(expr) = self.expressions.get_mut(&id) {
            expr.set_kind(ExprKind::Register(parent));
            if expr.get_node().is_concretized() {
                arch.set_register_value(parent, expr.get_node().evaluate())?;
            }
        }
        self.reg_map.insert(parent.0, id);
        Ok(id)
    }

    pub fn create_symbolic_register_expression(
        &mut self,
        arch: &mut Arch,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        inst: &mut Instruction,
        node: AstRef,
        reg: Register,
        comment: &str,
    ) -> Result<Option<u64>> {
        if self.skips_creation(&node, inst) {
            let parent = arch.parent_register(reg)?;
            self.concretize_register(parent);
            if node.is_concretized() {
                arch.set_register_value(reg, node.evaluate())?;
            }
            inst.add_written_register(reg, node);
            return Ok(None);
        }
        let id = self.assign_register(arch, ast, cbs, external, node.clone(), reg, comment)?;
        inst.add_symbolic_expression(id);
        inst.add_written_register(reg, node);
        Ok(Some(id))
    }

    /// Flag registers hold one bit; anything else is rejected.
    pub fn create_symbolic_flag_expression(
        &mut self,
        arch: &mut Arch,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        inst: &mut Instruction,
        node: AstRef,
        flag: Register,
        comment: &str,
    ) -> Result<Option<u64>> {
        if !arch.is_flag(flag) {
            return Err(TaseError::InvalidRegister(format!(
                "id {} is not a flag",
                flag.0
            )));
        }
        self.create_symbolic_register_expression(arch, ast, cbs, external, inst, node, flag, comment)
    }

    fn bind_memory_bytes(
        &mut self,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        node: &AstRef,
        mem: &MemoryAccess,
        root: u64,
    ) -> Result<()> {
        for k in 0..mem.size {
            let addr = mem.address.wrapping_add(u64::from(k));
            let id = if mem.size == 1 {
                root
            } else {
                let byte = ast.new_extract(k * 8 + 7, k * 8, node.clone())?;
                let byte_id = self.new_symbolic_expression(ast, cbs, external, byte, "")?;
                if let Some(expr) = self.expressions.get_mut(&byte_id) {
                    expr.set_kind(ExprKind::Memory { address: addr, size: 1 });
                }
                byte_id
            };
            self.mem_map.insert(addr, id);
        }
        Ok(())
    }

    fn invalidate_aligned(&mut self, mem: &MemoryAccess) {
        let start = mem.address;
        let end = mem.last_address();
        self.aligned_mem
            .retain(|(a, s), _| *a > end || a.wrapping_add(u64::from(*s - 1)) < start);
    }

    pub fn create_symbolic_memory_expression(
        &mut self,
        arch: &mut Arch,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        inst: &mut Instruction,
        node: AstRef,
        mem: &MemoryAccess,
        comment: &str,
    ) -> Result<Option<u64>> {
        if node.get_size() != mem.bit_size() {
            return Err(AstError::SortIntegrity(Sort::Bitv(mem.bit_size()), node.get_sort()).into());
        }
        self.invalidate_aligned(mem);
        if self.skips_creation(&node, inst) {
            self.concretize_memory_access(mem);
            if node.is_concretized() && mem.size <= 8 {
                arch.set_memory_access_value(mem, node.evaluate())?;
            }
            inst.add_store_access(mem.clone(), node);
            return Ok(None);
        }
        let root = self.new_symbolic_expression(ast, cbs, external, node.clone(), comment)?;
        if let Some(expr) = self.expressions.get_mut(&root) {
            expr.set_kind(ExprKind::Memory {
                address: mem.address,
                size: mem.size,
            });
        }
        self.bind_memory_bytes(ast, cbs, external, &node, mem, root)?;
        if self.opts.contains(SymOpts::ALIGNED_MEMORY) {
            self.aligned_mem.insert((mem.address, mem.size), root);
        }
        if node.is_concretized() && mem.size <= 8 {
            arch.set_memory_access_value(mem, node.evaluate())?;
        }
        inst.add_symbolic_expression(root);
        inst.add_store_access(mem.clone(), node);
        Ok(Some(root))
    }

    pub fn create_symbolic_volatile_expression(
        &mut self,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        inst: &mut Instruction,
        node: AstRef,
        comment: &str,
    ) -> Result<u64> {
        let id = self.new_symbolic_expression(ast, cbs, external, node, comment)?;
        inst.add_symbolic_expression(id);
        Ok(id)
    }

    /// Destination-operand dispatch.
    #[allow(clippy::too_many_arguments)]
    pub fn create_symbolic_expression(
        &mut self,
        arch: &mut Arch,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        inst: &mut Instruction,
        node: AstRef,
        dst: &Operand,
        comment: &str,
    ) -> Result<Option<u64>> {
        match dst {
            Operand::Reg(reg) => {
                self.create_symbolic_register_expression(arch, ast, cbs, external, inst, node, *reg, comment)
            }
            Operand::Mem(mem) => {
                self.create_symbolic_memory_expression(arch, ast, cbs, external, inst, node, mem, comment)
            }
            Operand::Imm(_) => Err(TaseError::InvalidMemoryRange { addr: 0, size: 0 }),
        }
    }

    /* Assignment of existing expressions ================================ */

    pub fn assign_symbolic_expression_to_register(
        &mut self,
        arch: &mut Arch,
        expr_id: u64,
        reg: Register,
    ) -> Result<()> {
        let parent = arch.parent_register(reg)?;
        let parent_size = arch.register_bit_size(parent)?;
        let node = self.get_symbolic_expression(expr_id)?.get_node();
        if node.get_size() != parent_size {
            return Err(AstError::SortIntegrity(Sort::Bitv(parent_size), node.get_sort()).into());
        }
        if let Some(expr) = self.expressions.get_mut(&expr_id) {
            expr.set_kind(ExprKind::Register(parent));
            if expr.get_node().is_concretized() {
                arch.set_register_value(parent, expr.get_node().evaluate())?;
            }
        }
        self.reg_map.insert(parent.0, expr_id);
        Ok(())
    }

    pub fn assign_symbolic_expression_to_memory(
        &mut self,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        expr_id: u64,
        mem: &MemoryAccess,
    ) -> Result<()> {
        let node = self.get_symbolic_expression(expr_id)?.get_node();
        if node.get_size() != mem.bit_size() {
            return Err(AstError::SortIntegrity(Sort::Bitv(mem.bit_size()), node.get_sort()).into());
        }
        self.invalidate_aligned(mem);
        if let Some(expr) = self.expressions.get_mut(&expr_id) {
            expr.set_kind(ExprKind::Memory {
                address: mem.address,
                size: mem.size,
            });
        }
        self.bind_memory_bytes(ast, cbs, external, &node, mem, expr_id)?;
        if self.opts.contains(SymOpts::ALIGNED_MEMORY) {
            self.aligned_mem.insert((mem.address, mem.size), expr_id);
        }
        Ok(())
    }

    /* Concretisation ==================================================== */

    pub fn concretize_register(&mut self, reg: Register) {
        self.reg_map.remove(&reg.0);
    }

    pub fn concretize_all_register(&mut self) {
        self.reg_map.clear();
    }

    pub fn concretize_memory(&mut self, addr: u64) {
        self.mem_map.remove(&addr);
        self.invalidate_aligned(&MemoryAccess::new(addr, 1));
    }

    pub fn concretize_memory_access(&mut self, mem: &MemoryAccess) {
        for k in 0..u64::from(mem.size) {
            self.mem_map.remove(&mem.address.wrapping_add(k));
        }
        self.invalidate_aligned(mem);
    }

    pub fn concretize_all_memory(&mut self) {
        self.mem_map.clear();
        self.aligned_mem.clear();
    }

    /* Variables ========================================================= */

    pub fn new_symbolic_variable(
        &mut self,
        ast: &AstBuilder,
        size: u32,
        comment: &str,
        origin: VarOrigin,
        snapshot: u64,
    ) -> Result<u64> {
        let id = self.next_var_id;
        self.next_var_id += 1;
        let var = SymbolicVariable::new(id, size, comment, origin);
        ast.new_var_with_value(Sort::Bitv(size), var.get_name(), snapshot)?;
        self.var_names.insert(var.get_name().to_string(), id);
        self.variables.insert(id, var);
        debug!("new symbolic variable SymVar_{} ({} bits)", id, size);
        Ok(id)
    }

    /// Rewrites the root of expression `expr_id` to a fresh variable.
    /// Every destination binding keeps pointing at the expression id, so
    /// registers and memory bytes bound to it observe the variable.
    pub fn convert_expression_to_symbolic_variable(
        &mut self,
        ast: &AstBuilder,
        expr_id: u64,
        size: u32,
        comment: &str,
    ) -> Result<u64> {
        let (kind, snapshot, node_size) = {
            let expr = self.get_symbolic_expression(expr_id)?;
            (
                expr.get_kind().clone(),
                expr.get_node().evaluate(),
                expr.get_node().get_size(),
            )
        };
        if node_size != size {
            return Err(AstError::SortIntegrity(Sort::Bitv(size), Sort::Bitv(node_size)).into());
        }
        let origin = match kind {
            ExprKind::Memory { address, .. } => VarOrigin::Memory(address),
            ExprKind::Register(reg) => VarOrigin::Register(reg),
            _ => VarOrigin::None,
        };
        let var_id = self.new_symbolic_variable(ast, size, comment, origin, snapshot)?;
        let name = self.variables[&var_id].get_name().to_string();
        let var_node = ast
            .get_ast_variable_node(&name)
            .ok_or(TaseError::UnknownSymbolicVariable(name))?;
        if let Some(expr) = self.expressions.get_mut(&expr_id) {
            expr.set_node(var_node);
        }
        Ok(var_id)
    }

    /// Introduces a fresh variable standing for the current content of a
    /// memory access and binds it there. The concrete bytes are left
    /// untouched.
    pub fn convert_memory_to_symbolic_variable(
        &mut self,
        arch: &mut Arch,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        mem: &MemoryAccess,
        comment: &str,
    ) -> Result<u64> {
        let current = self.build_memory(arch, ast, cbs, mem)?;
        let var_id = self.new_symbolic_variable(
            ast,
            mem.bit_size(),
            comment,
            VarOrigin::Memory(mem.address),
            current.evaluate(),
        )?;
        let name = self.variables[&var_id].get_name().to_string();
        let var_node = ast
            .get_ast_variable_node(&name)
            .ok_or(TaseError::UnknownSymbolicVariable(name))?;
        let root = self.new_symbolic_expression(ast, cbs, external, var_node.clone(), comment)?;
        if let Some(expr) = self.expressions.get_mut(&root) {
            expr.set_kind(ExprKind::Memory {
                address: mem.address,
                size: mem.size,
            });
        }
        self.invalidate_aligned(mem);
        self.bind_memory_bytes(ast, cbs, external, &var_node, mem, root)?;
        Ok(var_id)
    }

    /// Introduces a fresh variable standing for the current content of a
    /// register and binds it there.
    pub fn convert_register_to_symbolic_variable(
        &mut self,
        arch: &mut Arch,
        ast: &AstBuilder,
        cbs: &mut Callbacks,
        external: Option<&dyn ExternalSimplifier>,
        reg: Register,
        comment: &str,
    ) -> Result<u64> {
        let current = self.build_register(arch, ast, cbs, reg)?;
        let var_id = self.new_symbolic_variable(
            ast,
            current.get_size(),
            comment,
            VarOrigin::Register(reg),
            current.evaluate(),
        )?;
        let name = self.variables[&var_id].get_name().to_string();
        let var_node = ast
            .get_ast_variable_node(&name)
            .ok_or(TaseError::UnknownSymbolicVariable(name))?;
        self.assign_register(arch, ast, cbs, external, var_node, reg, comment)?;
        Ok(var_id)
    }

    pub fn get_symbolic_variable_from_id(&self, id: u64) -> Result<&SymbolicVariable> {
        self.variables
            .get(&id)
            .ok_or_else(|| TaseError::UnknownSymbolicVariable(format!("id {}", id)))
    }

    pub fn get_symbolic_variable_from_name(&self, name: &str) -> Result<&SymbolicVariable> {
        self.var_names
            .get(name)
            .and_then(|id| self.variables.get(id))
            .ok_or_else(|| TaseError::UnknownSymbolicVariable(name.to_string()))
    }

    pub fn get_symbolic_variables(&self) -> &HashMap<u64, SymbolicVariable> {
        &self.variables
    }

    /// SMT-LIB2 declarations of every variable, in creation order.
    pub fn get_variables_declaration(&self) -> String {
        let mut ids: Vec<_> = self.variables.keys().copied().collect();
        ids.sort_unstable();
        let mut out = String::new();
        for id in ids {
            let var = &self.variables[&id];
            out.push_str(&format!(
                "(declare-fun {} () (_ BitVec {}))\n",
                var.get_name(),
                var.get_size()
            ));
        }
        out
    }

    /* Queries =========================================================== */

    pub fn get_symbolic_expression(&self, id: u64) -> Result<&SymbolicExpression> {
        self.expressions
            .get(&id)
            .ok_or(TaseError::UnknownSymbolicExpressionId(id))
    }

    pub fn is_symbolic_expression_id_exists(&self, id: u64) -> bool {
        self.expressions.contains_key(&id)
    }

    pub fn set_expression_tainted(&mut self, id: u64, tainted: bool) -> Result<()> {
        self.expressions
            .get_mut(&id)
            .map(|e| e.set_tainted(tainted))
            .ok_or(TaseError::UnknownSymbolicExpressionId(id))
    }

    pub fn get_symbolic_expressions(&self) -> &HashMap<u64, SymbolicExpression> {
        &self.expressions
    }

    pub fn get_tainted_symbolic_expressions(&self) -> Vec<&SymbolicExpression> {
        let mut out: Vec<_> = self.expressions.values().filter(|e| e.is_tainted()).collect();
        out.sort_by_key(|e| e.get_id());
        out
    }

    pub fn get_symbolic_register_id(&self, arch: &Arch, reg: Register) -> Result<Option<u64>> {
        let parent = arch.parent_register(reg)?;
        Ok(self.reg_map.get(&parent.0).copied())
    }

    pub fn get_symbolic_memory_id(&self, addr: u64) -> Option<u64> {
        self.mem_map.get(&addr).copied()
    }

    pub fn get_symbolic_registers(&self) -> HashMap<Register, u64> {
        self.reg_map.iter().map(|(&r, &id)| (Register(r), id)).collect()
    }

    pub fn get_symbolic_memory(&self) -> &HashMap<u64, u64> {
        &self.mem_map
    }

    /// Concolic value of a register: the bound expression's evaluation
    /// restricted to the register's range, or the concrete value when
    /// unbound.
    pub fn get_symbolic_register_value(&self, arch: &Arch, reg: Register) -> Result<u64> {
        let (_, upper, lower, parent) = arch.register_info(reg)?;
        match self.reg_map.get(&parent.0) {
            Some(&eid) => {
                let eval = self.get_symbolic_expression(eid)?.get_node().evaluate();
                Ok((eval >> lower) & crate::ast::bitmask(upper - lower + 1))
            }
            None => arch.get_register_value(reg),
        }
    }

    pub fn get_symbolic_memory_value(&self, arch: &Arch, addr: u64) -> u8 {
        match self.mem_map.get(&addr) {
            Some(&eid) => self
                .expressions
                .get(&eid)
                .map(|e| e.get_node().evaluate() as u8)
                .unwrap_or(0),
            None => arch.get_memory_value(addr),
        }
    }

    pub fn get_symbolic_memory_access_value(&self, arch: &Arch, mem: &MemoryAccess) -> Result<u64> {
        if mem.size == 0 || mem.size > 8 {
            return Err(TaseError::InvalidMemoryRange {
                addr: mem.address,
                size: mem.size,
            });
        }
        let mut value = 0u64;
        for k in (0..u64::from(mem.size)).rev() {
            value = (value << 8)
                | u64::from(self.get_symbolic_memory_value(arch, mem.address.wrapping_add(k)));
        }
        Ok(value)
    }

    pub fn get_symbolic_memory_area_value(&self, arch: &Arch, addr: u64, size: usize) -> Vec<u8> {
        (0..size as u64)
            .map(|k| self.get_symbolic_memory_value(arch, addr.wrapping_add(k)))
            .collect()
    }

    /// Full AST of an expression. Pure: same id yields a structurally
    /// identical tree.
    pub fn get_full_ast_from_id(&self, id: u64) -> Result<AstRef> {
        Ok(self.get_symbolic_expression(id)?.get_node())
    }

    pub fn get_ast_from_id(&self, id: u64) -> Result<AstRef> {
        self.get_full_ast_from_id(id)
    }

    /// Removes an expression and severs every binding pointing at it.
    /// Irreversible.
    pub fn remove_symbolic_expression(&mut self, id: u64) {
        self.expressions.remove(&id);
        self.reg_map.retain(|_, v| *v != id);
        self.mem_map.retain(|_, v| *v != id);
        self.aligned_mem.retain(|_, v| *v != id);
    }

    /* Path constraints ================================================== */

    /// Records the predicate of a conditional branch. `taken` selects
    /// which side the trace followed; the other side becomes the
    /// alternative predicate.
    pub fn add_path_constraint(
        &mut self,
        ast: &AstBuilder,
        inst: &Instruction,
        condition: AstRef,
        taken: bool,
    ) -> Result<()> {
        condition.expect_bool()?;
        let negated = ast.new_lnot(condition.clone())?;
        let (taken_pred, alt) = if taken {
            (condition, negated)
        } else {
            (negated, condition)
        };
        self.path_constraints.push(PathConstraint {
            address: inst.get_address(),
            taken: taken_pred,
            alternative: Some(alt),
        });
        Ok(())
    }

    pub fn get_path_constraints(&self) -> &[PathConstraint] {
        &self.path_constraints
    }

    /// Conjunction of the taken predicates; the empty path is `true`.
    pub fn get_path_constraints_ast(&self, ast: &AstBuilder) -> Result<AstRef> {
        let mut out = ast.new_bool(true);
        for pc in &self.path_constraints {
            out = ast.new_land(out, pc.taken.clone())?;
        }
        Ok(out)
    }

    pub fn clear_path_constraints(&mut self) {
        self.path_constraints.clear();
    }

    /* Backup & restore ================================================== */

    /// Snapshots the engine by value, replacing any previous snapshot.
    pub fn backup(&mut self) {
        let mut snapshot = self.clone();
        snapshot.backup = None;
        self.backup = Some(Box::new(snapshot));
        self.state = EngineState::BackedUp;
        debug!("symbolic engine backed up");
    }

    /// Swaps the snapshot back into the live state; without a snapshot
    /// this is a no-op. The snapshot survives, so restoring is
    /// repeatable.
    pub fn restore(&mut self) {
        if let Some(snapshot) = self.backup.take() {
            *self = (*snapshot).clone();
            self.backup = Some(snapshot);
            self.state = EngineState::Running;
            debug!("symbolic engine restored");
        }
    }
}
