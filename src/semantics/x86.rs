//! x86-64 semantics for a compact opcode subset.
//!
//! Each opcode follows the same pattern: materialise the source
//! operands (recording them as instruction inputs), emit the
//! destination expressions, propagate taint with the matching
//! primitive, update the affected flags and finally the program
//! counter. Conditional branches append exactly one path constraint.

use crate::ast::{AstBuilder, AstRef};
use crate::engine::Tase;
use crate::error::{Result, TaseError};
use crate::inst::{Instruction, InstructionLifter, Opcode};
use crate::operand::{MemoryAccess, Operand, Register};

pub struct X86Semantics;

impl Default for X86Semantics {
    fn default() -> Self {
        Self::new()
    }
}

impl X86Semantics {
    pub fn new() -> Self {
        X86Semantics
    }

    fn flag(t: &Tase, name: &str) -> Result<Register> {
        t.get_register_from_name(name)
            .ok_or_else(|| TaseError::InvalidRegister(name.to_string()))
    }

    fn operand(inst: &Instruction, index: usize) -> Result<Operand> {
        inst.get_operands()
            .get(index)
            .cloned()
            .ok_or_else(|| TaseError::Disassembly(format!("missing operand {}", index)))
    }

    fn operand_bit_size(t: &Tase, op: &Operand) -> Result<u32> {
        Ok(match op {
            Operand::Imm(imm) => imm.bit_size(),
            Operand::Reg(reg) => t.get_register_bit_size(*reg)?,
            Operand::Mem(mem) => mem.bit_size(),
        })
    }

    /// Advances rip to the fallthrough address.
    fn update_pc_next(t: &mut Tase, inst: &mut Instruction) -> Result<()> {
        let ast = t.get_ast_builder().clone();
        let rip = t.get_pc_register()?;
        let next = ast.new_bv(inst.next_address(), 64)?;
        t.create_symbolic_register_expression(inst, next, rip, "program counter")?;
        t.taint_assignment_register_immediate(rip)?;
        Ok(())
    }

    fn set_flag(
        t: &mut Tase,
        inst: &mut Instruction,
        name: &str,
        node: AstRef,
        tainted: bool,
    ) -> Result<()> {
        let flag = Self::flag(t, name)?;
        if let Some(id) = t.create_symbolic_flag_expression(inst, node, flag, name)? {
            t.set_expression_tainted(id, tainted)?;
        }
        t.set_taint_register(flag, tainted)?;
        Ok(())
    }

    fn clear_flag(t: &mut Tase, inst: &mut Instruction, name: &str) -> Result<()> {
        let ast = t.get_ast_builder().clone();
        Self::set_flag(t, inst, name, ast.new_bv(0, 1)?, false)
    }

    fn sf(ast: &AstBuilder, res: &AstRef) -> Result<AstRef> {
        let size = res.get_size();
        Ok(ast.new_extract(size - 1, size - 1, res.clone())?)
    }

    fn zf(ast: &AstBuilder, res: &AstRef) -> Result<AstRef> {
        let zero = ast.new_bv(0, res.get_size())?;
        let one = ast.new_bv(1, 1)?;
        let nil = ast.new_bv(0, 1)?;
        Ok(ast.new_ite(ast.new_equal(res.clone(), zero)?, one, nil)?)
    }

    /// Parity of the low byte: set when the number of ones is even.
    fn pf(ast: &AstBuilder, res: &AstRef) -> Result<AstRef> {
        let mut parity = ast.new_extract(0, 0, res.clone())?;
        for bit in 1..8 {
            parity = ast.new_bvxor(parity, ast.new_extract(bit, bit, res.clone())?)?;
        }
        Ok(ast.new_bvxor(parity, ast.new_bv(1, 1)?)?)
    }

    fn af(ast: &AstBuilder, op1: &AstRef, op2: &AstRef, res: &AstRef) -> Result<AstRef> {
        let mix = ast.new_bvxor(ast.new_bvxor(op1.clone(), op2.clone())?, res.clone())?;
        Ok(ast.new_extract(4, 4, mix)?)
    }

    /// Carry out of `op1 + op2 = res`, computed bitwise so it stays
    /// within the operand width: `(a & b) | ((a | b) & ~r)` at the msb.
    fn carry_of_add(ast: &AstBuilder, op1: &AstRef, op2: &AstRef, res: &AstRef) -> Result<AstRef> {
        let size = res.get_size();
        let both = ast.new_bvand(op1.clone(), op2.clone())?;
        let either = ast.new_bvor(op1.clone(), op2.clone())?;
        let lost = ast.new_bvand(either, ast.new_bvnot(res.clone())?)?;
        let carry = ast.new_bvor(both, lost)?;
        Ok(ast.new_extract(size - 1, size - 1, carry)?)
    }

    fn overflow_of_add(ast: &AstBuilder, op1: &AstRef, op2: &AstRef, res: &AstRef) -> Result<AstRef> {
        let size = res.get_size();
        let mix = ast.new_bvand(
            ast.new_bvxor(op1.clone(), res.clone())?,
            ast.new_bvxor(op2.clone(), res.clone())?,
        )?;
        Ok(ast.new_extract(size - 1, size - 1, mix)?)
    }

    fn carry_of_sub(ast: &AstBuilder, op1: &AstRef, op2: &AstRef) -> Result<AstRef> {
        ast.bool_to_bv(ast.new_bvult(op1.clone(), op2.clone())?)
            .map_err(Into::into)
    }

    fn overflow_of_sub(ast: &AstBuilder, op1: &AstRef, op2: &AstRef, res: &AstRef) -> Result<AstRef> {
        let size = res.get_size();
        let mix = ast.new_bvand(
            ast.new_bvxor(op1.clone(), op2.clone())?,
            ast.new_bvxor(op1.clone(), res.clone())?,
        )?;
        Ok(ast.new_extract(size - 1, size - 1, mix)?)
    }

    fn arithmetic_flags(
        t: &mut Tase,
        inst: &mut Instruction,
        op1: &AstRef,
        op2: &AstRef,
        res: &AstRef,
        subtraction: bool,
        tainted: bool,
    ) -> Result<()> {
        let ast = t.get_ast_builder().clone();
        let (cf, of) = if subtraction {
            (
                Self::carry_of_sub(&ast, op1, op2)?,
                Self::overflow_of_sub(&ast, op1, op2, res)?,
            )
        } else {
            (
                Self::carry_of_add(&ast, op1, op2, res)?,
                Self::overflow_of_add(&ast, op1, op2, res)?,
            )
        };
        Self::set_flag(t, inst, "cf", cf, tainted)?;
        Self::set_flag(t, inst, "of", of, tainted)?;
        Self::set_flag(t, inst, "af", Self::af(&ast, op1, op2, res)?, tainted)?;
        Self::set_flag(t, inst, "sf", Self::sf(&ast, res)?, tainted)?;
        Self::set_flag(t, inst, "zf", Self::zf(&ast, res)?, tainted)?;
        Self::set_flag(t, inst, "pf", Self::pf(&ast, res)?, tainted)?;
        Ok(())
    }

    fn logical_flags(
        t: &mut Tase,
        inst: &mut Instruction,
        res: &AstRef,
        tainted: bool,
    ) -> Result<()> {
        let ast = t.get_ast_builder().clone();
        Self::clear_flag(t, inst, "cf")?;
        Self::clear_flag(t, inst, "of")?;
        Self::set_flag(t, inst, "sf", Self::sf(&ast, res)?, tainted)?;
        Self::set_flag(t, inst, "zf", Self::zf(&ast, res)?, tainted)?;
        Self::set_flag(t, inst, "pf", Self::pf(&ast, res)?, tainted)?;
        Ok(())
    }

    fn mov(&self, t: &mut Tase, inst: &mut Instruction) -> Result<()> {
        let dst = Self::operand(inst, 0)?;
        let src = Self::operand(inst, 1)?;
        let node = t.build_symbolic_operand_in(inst, &src)?;
        let expr = t.create_symbolic_expression(inst, node, &dst, "mov")?;
        let tainted = t.taint_assignment(&dst, &src)?;
        if let Some(id) = expr {
            t.set_expression_tainted(id, tainted)?;
        }
        Self::update_pc_next(t, inst)
    }

    fn movzx(&self, t: &mut Tase, inst: &mut Instruction) -> Result<()> {
        let dst = Self::operand(inst, 0)?;
        let src = Self::operand(inst, 1)?;
        let ast = t.get_ast_builder().clone();
        let dst_size = Self::operand_bit_size(t, &dst)?;
        let node = t.build_symbolic_operand_in(inst, &src)?;
        let node = ast.new_zero_extend(dst_size - node.get_size(), node)?;
        let expr = t.create_symbolic_expression(inst, node, &dst, "movzx")?;
        let tainted = t.taint_assignment(&dst, &src)?;
        if let Some(id) = expr {
            t.set_expression_tainted(id, tainted)?;
        }
        Self::update_pc_next(t, inst)
    }

    fn arithmetic(
        &self,
        t: &mut Tase,
        inst: &mut Instruction,
        subtraction: bool,
    ) -> Result<()> {
        let dst = Self::operand(inst, 0)?;
        let src = Self::operand(inst, 1)?;
        let ast = t.get_ast_builder().clone();
        let op1 = t.build_symbolic_operand_in(inst, &dst)?;
        let op2 = t.build_symbolic_operand_in(inst, &src)?;
        let res = if subtraction {
            ast.new_bvsub(op1.clone(), op2.clone())?
        } else {
            ast.new_bvadd(op1.clone(), op2.clone())?
        };
        let expr = t.create_symbolic_expression(inst, res.clone(), &dst, if subtraction { "sub" } else { "add" })?;
        let tainted = t.taint_union(&dst, &src)?;
        if let Some(id) = expr {
            t.set_expression_tainted(id, tainted)?;
        }
        Self::arithmetic_flags(t, inst, &op1, &op2, &res, subtraction, tainted)?;
        Self::update_pc_next(t, inst)
    }

    fn cmp(&self, t: &mut Tase, inst: &mut Instruction) -> Result<()> {
        let dst = Self::operand(inst, 0)?;
        let src = Self::operand(inst, 1)?;
        let ast = t.get_ast_builder().clone();
        let op1 = t.build_symbolic_operand_in(inst, &dst)?;
        let op2 = t.build_symbolic_operand_in(inst, &src)?;
        let res = ast.new_bvsub(op1.clone(), op2.clone())?;
        t.create_symbolic_volatile_expression(inst, res.clone(), "cmp")?;
        let tainted = t.is_tainted(&dst)? || t.is_tainted(&src)?;
        Self::arithmetic_flags(t, inst, &op1, &op2, &res, true, tainted)?;
        Self::update_pc_next(t, inst)
    }

    fn logical(&self, t: &mut Tase, inst: &mut Instruction, opcode: Opcode) -> Result<()> {
        let dst = Self::operand(inst, 0)?;
        let src = Self::operand(inst, 1)?;
        let ast = t.get_ast_builder().clone();
        let op1 = t.build_symbolic_operand_in(inst, &dst)?;
        let op2 = t.build_symbolic_operand_in(inst, &src)?;
        let res = match opcode {
            Opcode::And | Opcode::Test => ast.new_bvand(op1, op2)?,
            Opcode::Or => ast.new_bvor(op1, op2)?,
            Opcode::Xor => ast.new_bvxor(op1, op2)?,
            _ => return Err(TaseError::Disassembly("not a logical opcode".to_string())),
        };
        let tainted = if opcode == Opcode::Test {
            t.create_symbolic_volatile_expression(inst, res.clone(), "test")?;
            t.is_tainted(&dst)? || t.is_tainted(&src)?
        } else {
            let expr = t.create_symbolic_expression(inst, res.clone(), &dst, "logical")?;
            let tainted = t.taint_union(&dst, &src)?;
            if let Some(id) = expr {
                t.set_expression_tainted(id, tainted)?;
            }
            tainted
        };
        Self::logical_flags(t, inst, &res, tainted)?;
        Self::update_pc_next(t, inst)
    }

    fn step(&self, t: &mut Tase, inst: &mut Instruction, decrement: bool) -> Result<()> {
        let dst = Self::operand(inst, 0)?;
        let ast = t.get_ast_builder().clone();
        let op1 = t.build_symbolic_operand_in(inst, &dst)?;
        let one = ast.new_bv(1, op1.get_size())?;
        let res = if decrement {
            ast.new_bvsub(op1.clone(), one.clone())?
        } else {
            ast.new_bvadd(op1.clone(), one.clone())?
        };
        let expr = t.create_symbolic_expression(inst, res.clone(), &dst, if decrement { "dec" } else { "inc" })?;
        let tainted = t.is_tainted(&dst)?;
        if let Some(id) = expr {
            t.set_expression_tainted(id, tainted)?;
        }
        // inc and dec leave cf untouched.
        let of = if decrement {
            Self::overflow_of_sub(&ast, &op1, &one, &res)?
        } else {
            Self::overflow_of_add(&ast, &op1, &one, &res)?
        };
        Self::set_flag(t, inst, "of", of, tainted)?;
        Self::set_flag(t, inst, "af", Self::af(&ast, &op1, &one, &res)?, tainted)?;
        Self::set_flag(t, inst, "sf", Self::sf(&ast, &res)?, tainted)?;
        Self::set_flag(t, inst, "zf", Self::zf(&ast, &res)?, tainted)?;
        Self::set_flag(t, inst, "pf", Self::pf(&ast, &res)?, tainted)?;
        Self::update_pc_next(t, inst)
    }

    fn push(&self, t: &mut Tase, inst: &mut Instruction) -> Result<()> {
        let src = Self::operand(inst, 0)?;
        let ast = t.get_ast_builder().clone();
        let size = Self::operand_bit_size(t, &src)?;
        let rsp = t.get_sp_register()?;
        let node = t.build_symbolic_operand_in(inst, &src)?;
        let sp_node = t.build_symbolic_register_in(inst, rsp)?;
        let delta = ast.new_bv(u64::from(size / 8), 64)?;
        let new_sp = ast.new_bvsub(sp_node, delta)?;
        let slot = MemoryAccess::new(new_sp.evaluate(), size / 8);
        if let Some(id) = t.create_symbolic_register_expression(inst, new_sp, rsp, "stack pointer")? {
            t.set_expression_tainted(id, t.is_register_tainted(rsp)?)?;
        }
        let expr = t.create_symbolic_memory_expression(inst, node, &slot, "push")?;
        let tainted = t.taint_assignment(&Operand::Mem(slot), &src)?;
        if let Some(id) = expr {
            t.set_expression_tainted(id, tainted)?;
        }
        Self::update_pc_next(t, inst)
    }

    fn pop(&self, t: &mut Tase, inst: &mut Instruction) -> Result<()> {
        let dst = Self::operand(inst, 0)?;
        let ast = t.get_ast_builder().clone();
        let size = Self::operand_bit_size(t, &dst)?;
        let rsp = t.get_sp_register()?;
        let sp_value = t.get_symbolic_register_value(rsp)?;
        let slot = MemoryAccess::new(sp_value, size / 8);
        let node = t.build_symbolic_memory_in(inst, &slot)?;
        let expr = t.create_symbolic_expression(inst, node, &dst, "pop")?;
        let tainted = t.taint_assignment(&dst, &Operand::Mem(slot))?;
        if let Some(id) = expr {
            t.set_expression_tainted(id, tainted)?;
        }
        let sp_node = t.build_symbolic_register_in(inst, rsp)?;
        let delta = ast.new_bv(u64::from(size / 8), 64)?;
        let new_sp = ast.new_bvadd(sp_node, delta)?;
        if let Some(id) = t.create_symbolic_register_expression(inst, new_sp, rsp, "stack pointer")? {
            t.set_expression_tainted(id, t.is_register_tainted(rsp)?)?;
        }
        Self::update_pc_next(t, inst)
    }

    fn jmp(&self, t: &mut Tase, inst: &mut Instruction) -> Result<()> {
        let target = Self::operand(inst, 0)?;
        let rip = t.get_pc_register()?;
        let node = t.build_symbolic_operand_in(inst, &target)?;
        t.create_symbolic_register_expression(inst, node, rip, "program counter")?;
        t.taint_assignment_register_immediate(rip)?;
        inst.set_branch(false);
        Ok(())
    }

    /// jz and jnz: sets rip to an ite over the zero flag and appends
    /// the path constraint of the branch actually taken.
    fn jcc(&self, t: &mut Tase, inst: &mut Instruction, jump_if_zero: bool) -> Result<()> {
        let target = Self::operand(inst, 0)?;
        let ast = t.get_ast_builder().clone();
        let rip = t.get_pc_register()?;
        let zf = Self::flag(t, "zf")?;
        let zf_node = t.build_symbolic_register_in(inst, zf)?;
        let wanted = ast.new_bv(u64::from(jump_if_zero), 1)?;
        let cond = ast.new_equal(zf_node, wanted)?;
        let taken = cond.evaluate_bool();
        let target_node = t.build_symbolic_operand_in(inst, &target)?;
        let next = ast.new_bv(inst.next_address(), 64)?;
        let rip_node = if cond.is_concretized() {
            if taken {
                target_node
            } else {
                next
            }
        } else {
            ast.new_ite(cond.clone(), target_node, next)?
        };
        t.create_symbolic_register_expression(inst, rip_node, rip, "program counter")?;
        t.taint_assignment_register_immediate(rip)?;
        t.add_path_constraint(inst, cond, taken)?;
        inst.set_branch(true);
        Ok(())
    }
}

impl InstructionLifter for X86Semantics {
    fn lift(&mut self, t: &mut Tase, inst: &mut Instruction) -> Result<bool> {
        match inst.get_opcode() {
            Opcode::Mov => self.mov(t, inst)?,
            Opcode::Movzx => self.movzx(t, inst)?,
            Opcode::Add => self.arithmetic(t, inst, false)?,
            Opcode::Sub => self.arithmetic(t, inst, true)?,
            Opcode::Cmp => self.cmp(t, inst)?,
            Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Test => {
                self.logical(t, inst, inst.get_opcode())?
            }
            Opcode::Inc => self.step(t, inst, false)?,
            Opcode::Dec => self.step(t, inst, true)?,
            Opcode::Push => self.push(t, inst)?,
            Opcode::Pop => self.pop(t, inst)?,
            Opcode::Jmp => self.jmp(t, inst)?,
            Opcode::Jz => self.jcc(t, inst, true)?,
            Opcode::Jnz => self.jcc(t, inst, false)?,
            Opcode::Nop => Self::update_pc_next(t, inst)?,
            Opcode::Unsupported => return Ok(false),
        }
        Ok(true)
    }
}
