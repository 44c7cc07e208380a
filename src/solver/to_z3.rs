//! AST to z3 conversion.

use std::cell::RefCell;
use std::collections::HashMap;

use z3::ast::{Ast, Bool, Dynamic, BV};

use crate::ast::{AstOp, AstRef, Sort};
use crate::error::{Result, TaseError};

use super::Z3Solver;

pub struct ToZ3<'ctx> {
    parent: &'ctx Z3Solver,
    /// Conversion cache keyed by structural hash, so shared subtrees of
    /// the DAG convert once.
    cache: RefCell<HashMap<u64, Dynamic<'ctx>>>,
}

impl<'ctx> ToZ3<'ctx> {
    pub fn new(parent: &'ctx Z3Solver) -> Self {
        Self {
            parent,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn ctx(&self) -> &'ctx z3::Context {
        self.parent.get_z3_ctx()
    }

    pub fn variable(&self, name: &str, size: u32) -> BV<'ctx> {
        BV::new_const(self.ctx(), name, size)
    }

    pub fn convert(&self, op: &AstRef) -> Result<Dynamic<'ctx>> {
        if let Some(cached) = self.cache.borrow().get(&op.get_hash()) {
            return Ok(cached.clone());
        }
        let out = self.convert_uncached(op)?;
        self.cache.borrow_mut().insert(op.get_hash(), out.clone());
        Ok(out)
    }

    fn convert_uncached(&self, op: &AstRef) -> Result<Dynamic<'ctx>> {
        Ok(match op.get_op() {
            AstOp::Const => match op.get_sort() {
                Sort::Bool => Bool::from_bool(self.ctx(), op.evaluate_bool()).into(),
                Sort::Bitv(len) if len <= 64 => BV::from_u64(self.ctx(), op.evaluate(), len).into(),
                // Literals carry 64 significant bits at most.
                Sort::Bitv(len) => BV::from_u64(self.ctx(), op.evaluate(), 64)
                    .zero_ext(len - 64)
                    .into(),
            },
            AstOp::Var(name) => match op.get_sort() {
                Sort::Bool => Bool::new_const(self.ctx(), name.as_str()).into(),
                Sort::Bitv(len) => BV::new_const(self.ctx(), name.as_str(), len).into(),
            },
            AstOp::Ite => {
                let cond = self.convert_bool(&op.get_arg(0))?;
                let then = self.convert(&op.get_arg(1))?;
                let otherwise = self.convert(&op.get_arg(2))?;
                cond.ite(&then, &otherwise)
            }
            AstOp::Equal => {
                let x = self.convert_bv(&op.get_arg(0))?;
                let y = self.convert_bv(&op.get_arg(1))?;
                x._eq(&y).into()
            }
            AstOp::Distinct => {
                let x = self.convert_bv(&op.get_arg(0))?;
                let y = self.convert_bv(&op.get_arg(1))?;
                x._eq(&y).not().into()
            }
            AstOp::Lnot => self.convert_bool(&op.get_arg(0))?.not().into(),
            AstOp::Land => {
                let x = self.convert_bool(&op.get_arg(0))?;
                let y = self.convert_bool(&op.get_arg(1))?;
                Bool::and(self.ctx(), &[&x, &y]).into()
            }
            AstOp::Lor => {
                let x = self.convert_bool(&op.get_arg(0))?;
                let y = self.convert_bool(&op.get_arg(1))?;
                Bool::or(self.ctx(), &[&x, &y]).into()
            }
            AstOp::Bvadd => self.bv_binop(op, BV::bvadd)?,
            AstOp::Bvsub => self.bv_binop(op, BV::bvsub)?,
            AstOp::Bvmul => self.bv_binop(op, BV::bvmul)?,
            AstOp::Bvudiv => self.bv_binop(op, BV::bvudiv)?,
            AstOp::Bvsdiv => self.bv_binop(op, BV::bvsdiv)?,
            AstOp::Bvurem => self.bv_binop(op, BV::bvurem)?,
            AstOp::Bvsrem => self.bv_binop(op, BV::bvsrem)?,
            AstOp::Bvand => self.bv_binop(op, BV::bvand)?,
            AstOp::Bvor => self.bv_binop(op, BV::bvor)?,
            AstOp::Bvxor => self.bv_binop(op, BV::bvxor)?,
            AstOp::Bvshl => self.bv_binop(op, BV::bvshl)?,
            AstOp::Bvlshr => self.bv_binop(op, BV::bvlshr)?,
            AstOp::Bvashr => self.bv_binop(op, BV::bvashr)?,
            AstOp::Bvnot => self.convert_bv(&op.get_arg(0))?.bvnot().into(),
            AstOp::Bvneg => self.convert_bv(&op.get_arg(0))?.bvneg().into(),
            AstOp::Bvult => self.bv_cmp(op, BV::bvult)?,
            AstOp::Bvule => self.bv_cmp(op, BV::bvule)?,
            AstOp::Bvugt => self.bv_cmp(op, BV::bvugt)?,
            AstOp::Bvuge => self.bv_cmp(op, BV::bvuge)?,
            AstOp::Bvslt => self.bv_cmp(op, BV::bvslt)?,
            AstOp::Bvsle => self.bv_cmp(op, BV::bvsle)?,
            AstOp::Bvsgt => self.bv_cmp(op, BV::bvsgt)?,
            AstOp::Bvsge => self.bv_cmp(op, BV::bvsge)?,
            AstOp::Concat => {
                let high = self.convert_bv(&op.get_arg(0))?;
                let low = self.convert_bv(&op.get_arg(1))?;
                high.concat(&low).into()
            }
            AstOp::Extract(high, low) => {
                let value = self.convert_bv(&op.get_arg(0))?;
                value.extract(*high, *low).into()
            }
            AstOp::ZeroExt(bits) => {
                let value = self.convert_bv(&op.get_arg(0))?;
                value.zero_ext(*bits).into()
            }
            AstOp::SignExt(bits) => {
                let value = self.convert_bv(&op.get_arg(0))?;
                value.sign_ext(*bits).into()
            }
        })
    }

    fn bv_binop(
        &self,
        op: &AstRef,
        f: impl Fn(&BV<'ctx>, &BV<'ctx>) -> BV<'ctx>,
    ) -> Result<Dynamic<'ctx>> {
        let x = self.convert_bv(&op.get_arg(0))?;
        let y = self.convert_bv(&op.get_arg(1))?;
        Ok(f(&x, &y).into())
    }

    fn bv_cmp(
        &self,
        op: &AstRef,
        f: impl Fn(&BV<'ctx>, &BV<'ctx>) -> Bool<'ctx>,
    ) -> Result<Dynamic<'ctx>> {
        let x = self.convert_bv(&op.get_arg(0))?;
        let y = self.convert_bv(&op.get_arg(1))?;
        Ok(f(&x, &y).into())
    }

    pub fn convert_bool(&self, op: &AstRef) -> Result<Bool<'ctx>> {
        self.convert(op)?
            .as_bool()
            .ok_or_else(|| TaseError::Solver("expected a boolean term".to_string()))
    }

    pub fn convert_bv(&self, op: &AstRef) -> Result<BV<'ctx>> {
        self.convert(op)?
            .as_bv()
            .ok_or_else(|| TaseError::Solver("expected a bit-vector term".to_string()))
    }
}
