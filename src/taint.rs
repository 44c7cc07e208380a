//! Taint engine.
//!
//! Registers taint at parent granularity, memory at byte granularity.
//! Propagation primitives cover the cross-product of operand kinds under
//! two policies: union keeps previous taint on the destination,
//! assignment replaces it. Every primitive returns the resulting taint
//! state of its destination so lifters can short-circuit downstream
//! work. With the engine disabled, propagation leaves the sets untouched
//! and reports the last defined state.

use std::collections::HashSet;

use crate::arch::Arch;
use crate::error::Result;
use crate::operand::{MemoryAccess, Operand, Register};

#[derive(Clone, Debug, Default)]
pub struct TaintEngine {
    enabled: bool,
    tainted_memory: HashSet<u64>,
    tainted_registers: HashSet<Register>,
}

impl TaintEngine {
    pub fn new() -> Self {
        TaintEngine {
            enabled: true,
            tainted_memory: HashSet::new(),
            tainted_registers: HashSet::new(),
        }
    }

    pub fn enable(&mut self, flag: bool) {
        self.enabled = flag;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get_tainted_memory(&self) -> &HashSet<u64> {
        &self.tainted_memory
    }

    pub fn get_tainted_registers(&self) -> &HashSet<Register> {
        &self.tainted_registers
    }

    /* Queries =========================================================== */

    pub fn is_memory_tainted(&self, addr: u64, size: u32) -> bool {
        (0..u64::from(size)).any(|k| self.tainted_memory.contains(&addr.wrapping_add(k)))
    }

    pub fn is_memory_access_tainted(&self, mem: &MemoryAccess) -> bool {
        self.is_memory_tainted(mem.address, mem.size)
    }

    pub fn is_register_tainted(&self, arch: &Arch, reg: Register) -> Result<bool> {
        let parent = arch.parent_register(reg)?;
        Ok(self.tainted_registers.contains(&parent))
    }

    /// Immediates are never tainted.
    pub fn is_tainted(&self, arch: &Arch, op: &Operand) -> Result<bool> {
        match op {
            Operand::Imm(_) => Ok(false),
            Operand::Reg(reg) => self.is_register_tainted(arch, *reg),
            Operand::Mem(mem) => Ok(self.is_memory_access_tainted(mem)),
        }
    }

    /* Setters =========================================================== */

    pub fn set_taint_memory(&mut self, mem: &MemoryAccess, flag: bool) -> bool {
        if !self.enabled {
            return self.is_memory_access_tainted(mem);
        }
        for k in 0..u64::from(mem.size) {
            let addr = mem.address.wrapping_add(k);
            if flag {
                self.tainted_memory.insert(addr);
            } else {
                self.tainted_memory.remove(&addr);
            }
        }
        flag
    }

    pub fn set_taint_register(&mut self, arch: &Arch, reg: Register, flag: bool) -> Result<bool> {
        let parent = arch.parent_register(reg)?;
        if !self.enabled {
            return Ok(self.tainted_registers.contains(&parent));
        }
        if flag {
            self.tainted_registers.insert(parent);
        } else {
            self.tainted_registers.remove(&parent);
        }
        Ok(flag)
    }

    pub fn set_taint(&mut self, arch: &Arch, op: &Operand, flag: bool) -> Result<bool> {
        match op {
            Operand::Imm(_) => Ok(false),
            Operand::Reg(reg) => self.set_taint_register(arch, *reg, flag),
            Operand::Mem(mem) => Ok(self.set_taint_memory(mem, flag)),
        }
    }

    pub fn taint_memory(&mut self, addr: u64) -> bool {
        self.set_taint_memory(&MemoryAccess::new(addr, 1), true)
    }

    pub fn taint_memory_access(&mut self, mem: &MemoryAccess) -> bool {
        self.set_taint_memory(mem, true)
    }

    pub fn untaint_memory(&mut self, addr: u64) -> bool {
        self.set_taint_memory(&MemoryAccess::new(addr, 1), false)
    }

    pub fn untaint_memory_access(&mut self, mem: &MemoryAccess) -> bool {
        self.set_taint_memory(mem, false)
    }

    pub fn taint_register(&mut self, arch: &Arch, reg: Register) -> Result<bool> {
        self.set_taint_register(arch, reg, true)
    }

    pub fn untaint_register(&mut self, arch: &Arch, reg: Register) -> Result<bool> {
        self.set_taint_register(arch, reg, false)
    }

    /* Union propagation ================================================= */

    /// Destination keeps its taint; an immediate source adds nothing.
    pub fn taint_union_memory_immediate(&mut self, mem: &MemoryAccess) -> bool {
        self.is_memory_access_tainted(mem)
    }

    pub fn taint_union_memory_memory(&mut self, dst: &MemoryAccess, src: &MemoryAccess) -> bool {
        if self.enabled && self.is_memory_access_tainted(src) {
            return self.set_taint_memory(dst, true);
        }
        self.is_memory_access_tainted(dst)
    }

    pub fn taint_union_memory_register(
        &mut self,
        arch: &Arch,
        dst: &MemoryAccess,
        src: Register,
    ) -> Result<bool> {
        if self.enabled && self.is_register_tainted(arch, src)? {
            return Ok(self.set_taint_memory(dst, true));
        }
        Ok(self.is_memory_access_tainted(dst))
    }

    pub fn taint_union_register_immediate(&mut self, arch: &Arch, dst: Register) -> Result<bool> {
        self.is_register_tainted(arch, dst)
    }

    pub fn taint_union_register_memory(
        &mut self,
        arch: &Arch,
        dst: Register,
        src: &MemoryAccess,
    ) -> Result<bool> {
        if self.enabled && self.is_memory_access_tainted(src) {
            return self.set_taint_register(arch, dst, true);
        }
        self.is_register_tainted(arch, dst)
    }

    pub fn taint_union_register_register(
        &mut self,
        arch: &Arch,
        dst: Register,
        src: Register,
    ) -> Result<bool> {
        if self.enabled && self.is_register_tainted(arch, src)? {
            return self.set_taint_register(arch, dst, true);
        }
        self.is_register_tainted(arch, dst)
    }

    /* Assignment propagation ============================================ */

    /// An immediate source always clears the destination.
    pub fn taint_assignment_memory_immediate(&mut self, dst: &MemoryAccess) -> bool {
        self.set_taint_memory(dst, false);
        false
    }

    pub fn taint_assignment_memory_memory(&mut self, dst: &MemoryAccess, src: &MemoryAccess) -> bool {
        let tainted = self.is_memory_access_tainted(src);
        self.set_taint_memory(dst, tainted)
    }

    pub fn taint_assignment_memory_register(
        &mut self,
        arch: &Arch,
        dst: &MemoryAccess,
        src: Register,
    ) -> Result<bool> {
        let tainted = self.is_register_tainted(arch, src)?;
        Ok(self.set_taint_memory(dst, tainted))
    }

    pub fn taint_assignment_register_immediate(&mut self, arch: &Arch, dst: Register) -> Result<bool> {
        self.set_taint_register(arch, dst, false)?;
        Ok(false)
    }

    pub fn taint_assignment_register_memory(
        &mut self,
        arch: &Arch,
        dst: Register,
        src: &MemoryAccess,
    ) -> Result<bool> {
        let tainted = self.is_memory_access_tainted(src);
        self.set_taint_register(arch, dst, tainted)
    }

    pub fn taint_assignment_register_register(
        &mut self,
        arch: &Arch,
        dst: Register,
        src: Register,
    ) -> Result<bool> {
        let tainted = self.is_register_tainted(arch, src)?;
        self.set_taint_register(arch, dst, tainted)
    }

    /* Abstract dispatch ================================================= */

    pub fn taint_union(&mut self, arch: &Arch, dst: &Operand, src: &Operand) -> Result<bool> {
        match (dst, src) {
            (Operand::Mem(d), Operand::Imm(_)) => Ok(self.taint_union_memory_immediate(d)),
            (Operand::Mem(d), Operand::Mem(s)) => Ok(self.taint_union_memory_memory(d, s)),
            (Operand::Mem(d), Operand::Reg(s)) => self.taint_union_memory_register(arch, d, *s),
            (Operand::Reg(d), Operand::Imm(_)) => self.taint_union_register_immediate(arch, *d),
            (Operand::Reg(d), Operand::Mem(s)) => self.taint_union_register_memory(arch, *d, s),
            (Operand::Reg(d), Operand::Reg(s)) => self.taint_union_register_register(arch, *d, *s),
            (Operand::Imm(_), _) => Ok(false),
        }
    }

    pub fn taint_assignment(&mut self, arch: &Arch, dst: &Operand, src: &Operand) -> Result<bool> {
        match (dst, src) {
            (Operand::Mem(d), Operand::Imm(_)) => Ok(self.taint_assignment_memory_immediate(d)),
            (Operand::Mem(d), Operand::Mem(s)) => Ok(self.taint_assignment_memory_memory(d, s)),
            (Operand::Mem(d), Operand::Reg(s)) => self.taint_assignment_memory_register(arch, d, *s),
            (Operand::Reg(d), Operand::Imm(_)) => self.taint_assignment_register_immediate(arch, *d),
            (Operand::Reg(d), Operand::Mem(s)) => self.taint_assignment_register_memory(arch, *d, s),
            (Operand::Reg(d), Operand::Reg(s)) => {
                self.taint_assignment_register_register(arch, *d, *s)
            }
            (Operand::Imm(_), _) => Ok(false),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arch::ArchId;

    fn setup() -> (Arch, TaintEngine, Register, Register) {
        let mut arch = Arch::new();
        arch.set_architecture(ArchId::X86_64);
        let r1 = arch.register_from_name("rax").unwrap();
        let r2 = arch.register_from_name("rbx").unwrap();
        (arch, TaintEngine::new(), r1, r2)
    }

    #[test]
    fn taint_is_monotonic_per_register() {
        let (arch, mut taint, r1, _) = setup();
        taint.taint_register(&arch, r1).unwrap();
        assert!(taint.is_register_tainted(&arch, r1).unwrap());
        taint.untaint_register(&arch, r1).unwrap();
        assert!(!taint.is_register_tainted(&arch, r1).unwrap());
    }

    #[test]
    fn sub_register_taints_parent() {
        let (arch, mut taint, r1, _) = setup();
        let al = arch.register_from_name("al").unwrap();
        taint.taint_register(&arch, al).unwrap();
        assert!(taint.is_register_tainted(&arch, r1).unwrap());
    }

    #[test]
    fn assignment_from_register_moves_taint() {
        let (arch, mut taint, r1, r2) = setup();
        taint.taint_register(&arch, r1).unwrap();
        assert!(taint.taint_assignment_register_register(&arch, r2, r1).unwrap());
        assert!(taint.is_register_tainted(&arch, r2).unwrap());
        // Assignment from an immediate clears it again.
        assert!(!taint.taint_assignment_register_immediate(&arch, r2).unwrap());
        assert!(!taint.is_register_tainted(&arch, r2).unwrap());
    }

    #[test]
    fn union_with_immediate_reports_destination() {
        let (arch, mut taint, r1, _) = setup();
        assert!(!taint.taint_union_register_immediate(&arch, r1).unwrap());
        taint.taint_register(&arch, r1).unwrap();
        assert!(taint.taint_union_register_immediate(&arch, r1).unwrap());
    }

    #[test]
    fn union_keeps_destination_taint() {
        let (arch, mut taint, r1, r2) = setup();
        taint.taint_register(&arch, r2).unwrap();
        // Clean source, tainted destination: union keeps it.
        assert!(taint.taint_union_register_register(&arch, r2, r1).unwrap());
    }

    #[test]
    fn memory_taints_per_byte() {
        let (_, mut taint, _, _) = setup();
        taint.taint_memory(0x1000);
        assert!(taint.is_memory_tainted(0x1000, 1));
        assert!(!taint.is_memory_tainted(0x1001, 1));
        assert!(taint.is_memory_tainted(0xfff, 4));
        taint.untaint_memory(0x1000);
        assert!(!taint.is_memory_tainted(0x1000, 1));
    }

    #[test]
    fn disabled_engine_reports_last_state() {
        let (arch, mut taint, r1, r2) = setup();
        taint.taint_register(&arch, r1).unwrap();
        taint.enable(false);
        // Propagation no longer mutates.
        assert!(!taint.taint_assignment_register_register(&arch, r2, r1).unwrap());
        assert!(!taint.is_register_tainted(&arch, r2).unwrap());
        taint.enable(true);
        assert!(taint.taint_assignment_register_register(&arch, r2, r1).unwrap());
    }
}
