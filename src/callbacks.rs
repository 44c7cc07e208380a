//! Callback registry.
//!
//! Three kinds of handlers can be registered: concrete-memory-read and
//! concrete-register-read observers, which may populate the concrete
//! state before the engine wraps it into constants, and symbolic
//! simplification passes, which rewrite ASTs left to right. Handlers of
//! one kind run in insertion order; a failing handler aborts the rest of
//! its chain and surfaces as a callback error.

use log::trace;
use quick_cache::sync::Cache;

use crate::arch::Arch;
use crate::ast::{AstBuilder, AstRef};
use crate::error::{Result, TaseError};
use crate::operand::{MemoryAccess, Register};

pub type MemoryReadHandler = Box<dyn FnMut(&mut Arch, &MemoryAccess) -> Result<()>>;
pub type RegisterReadHandler = Box<dyn FnMut(&mut Arch, &Register) -> Result<()>>;
pub type SimplificationHandler = Box<dyn FnMut(&AstBuilder, AstRef) -> Result<AstRef>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackKind {
    GetConcreteMemoryValue,
    GetConcreteRegisterValue,
    SymbolicSimplification,
}

/// Identity of a registered handler, used for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallbackId(u64);

const SIMPLIFICATION_CACHE_ITEMS: usize = 4096;

pub struct Callbacks {
    mem_read: Vec<(CallbackId, MemoryReadHandler)>,
    reg_read: Vec<(CallbackId, RegisterReadHandler)>,
    simplification: Vec<(CallbackId, SimplificationHandler)>,
    next_id: u64,
    /// Memoised pipeline results; reset whenever the simplification
    /// chain changes.
    simp_cache: Cache<u64, AstRef>,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Callbacks {
            mem_read: Vec::new(),
            reg_read: Vec::new(),
            simplification: Vec::new(),
            next_id: 0,
            simp_cache: Cache::new(SIMPLIFICATION_CACHE_ITEMS),
        }
    }

    fn fresh_id(&mut self) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_memory_read_callback(&mut self, handler: MemoryReadHandler) -> CallbackId {
        let id = self.fresh_id();
        self.mem_read.push((id, handler));
        id
    }

    pub fn add_register_read_callback(&mut self, handler: RegisterReadHandler) -> CallbackId {
        let id = self.fresh_id();
        self.reg_read.push((id, handler));
        id
    }

    pub fn add_simplification_callback(&mut self, handler: SimplificationHandler) -> CallbackId {
        let id = self.fresh_id();
        self.simplification.push((id, handler));
        self.reset_simplification_cache();
        id
    }

    /// Removes one handler by identity; unknown ids are ignored.
    pub fn remove_callback(&mut self, id: CallbackId) {
        self.mem_read.retain(|(i, _)| *i != id);
        self.reg_read.retain(|(i, _)| *i != id);
        let before = self.simplification.len();
        self.simplification.retain(|(i, _)| *i != id);
        if self.simplification.len() != before {
            self.reset_simplification_cache();
        }
    }

    pub fn remove_all_callbacks(&mut self) {
        self.mem_read.clear();
        self.reg_read.clear();
        self.simplification.clear();
        self.reset_simplification_cache();
    }

    pub fn count(&self, kind: CallbackKind) -> usize {
        match kind {
            CallbackKind::GetConcreteMemoryValue => self.mem_read.len(),
            CallbackKind::GetConcreteRegisterValue => self.reg_read.len(),
            CallbackKind::SymbolicSimplification => self.simplification.len(),
        }
    }

    /// Notifies every memory-read handler, in insertion order.
    pub fn process_memory_read(&mut self, arch: &mut Arch, mem: &MemoryAccess) -> Result<()> {
        for (id, handler) in self.mem_read.iter_mut() {
            trace!("memory read callback {:?} at {:#x}", id, mem.address);
            handler(arch, mem).map_err(|e| TaseError::Callback(e.to_string()))?;
        }
        Ok(())
    }

    /// Notifies every register-read handler, in insertion order.
    pub fn process_register_read(&mut self, arch: &mut Arch, reg: &Register) -> Result<()> {
        for (id, handler) in self.reg_read.iter_mut() {
            trace!("register read callback {:?} for id {}", id, reg.0);
            handler(arch, reg).map_err(|e| TaseError::Callback(e.to_string()))?;
        }
        Ok(())
    }

    /// Left-to-right rewrite: each handler sees the previous handler's
    /// output.
    pub fn process_simplification(&mut self, ast: &AstBuilder, node: AstRef) -> Result<AstRef> {
        let mut current = node;
        for (_, handler) in self.simplification.iter_mut() {
            current = handler(ast, current).map_err(|e| TaseError::Callback(e.to_string()))?;
        }
        Ok(current)
    }

    pub fn cached_simplification(&self, key: u64) -> Option<AstRef> {
        self.simp_cache.get(&key)
    }

    pub fn cache_simplification(&self, key: u64, node: AstRef) {
        self.simp_cache.insert(key, node);
    }

    fn reset_simplification_cache(&mut self) {
        self.simp_cache = Cache::new(SIMPLIFICATION_CACHE_ITEMS);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arch::ArchId;
    use crate::ast::{AstOp, Sort};

    #[test]
    fn read_callbacks_run_in_order() {
        let mut cbs = Callbacks::new();
        let mut arch = Arch::new();
        arch.set_architecture(ArchId::X86_64);
        cbs.add_memory_read_callback(Box::new(|arch, mem| {
            arch.set_memory_value(mem.address, 1);
            Ok(())
        }));
        // Later handlers see earlier handlers' writes.
        cbs.add_memory_read_callback(Box::new(|arch, mem| {
            let seen = arch.get_memory_value(mem.address);
            arch.set_memory_value(mem.address, seen + 1);
            Ok(())
        }));
        cbs.process_memory_read(&mut arch, &MemoryAccess::new(0x40, 1)).unwrap();
        assert_eq!(arch.get_memory_value(0x40), 2);
    }

    #[test]
    fn failing_handler_aborts_the_chain() {
        let mut cbs = Callbacks::new();
        let mut arch = Arch::new();
        arch.set_architecture(ArchId::X86_64);
        cbs.add_memory_read_callback(Box::new(|_, _| {
            Err(TaseError::Callback("boom".to_string()))
        }));
        cbs.add_memory_read_callback(Box::new(|arch, mem| {
            arch.set_memory_value(mem.address, 0xff);
            Ok(())
        }));
        let err = cbs.process_memory_read(&mut arch, &MemoryAccess::new(0x40, 1));
        assert!(matches!(err, Err(TaseError::Callback(_))));
        assert_eq!(arch.get_memory_value(0x40), 0);
    }

    #[test]
    fn simplification_chains_left_to_right() {
        let mut cbs = Callbacks::new();
        let ast = AstBuilder::new();
        let x = ast.new_var(Sort::Bitv(8), "x").unwrap();
        // First pass rewrites bvor into its left child, second pass tags
        // nothing; the output of the first is the input of the second.
        cbs.add_simplification_callback(Box::new(|_, node| {
            if let AstOp::Bvor = node.get_op() {
                return Ok(node.get_arg(0));
            }
            Ok(node)
        }));
        cbs.add_simplification_callback(Box::new(|ast, node| {
            if node.is_variable() {
                return ast.new_bvnot(node).map_err(Into::into);
            }
            Ok(node)
        }));
        let y = ast.new_var(Sort::Bitv(8), "y").unwrap();
        let node = ast.new_bvor(x.clone(), y).unwrap();
        let out = cbs.process_simplification(&ast, node).unwrap();
        assert_eq!(*out.get_op(), AstOp::Bvnot);
        assert_eq!(out.get_arg(0), x);
    }

    #[test]
    fn removal_by_identity() {
        let mut cbs = Callbacks::new();
        let id = cbs.add_register_read_callback(Box::new(|_, _| Ok(())));
        assert_eq!(cbs.count(CallbackKind::GetConcreteRegisterValue), 1);
        cbs.remove_callback(id);
        assert_eq!(cbs.count(CallbackKind::GetConcreteRegisterValue), 0);
    }
}
