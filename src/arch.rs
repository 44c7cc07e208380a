//! Architecture model: register geometry and concrete CPU/memory state.
//!
//! Register geometry maps every register id to its bit extent inside a
//! parent register; parents form a forest rooted at the widest registers
//! and flags are 1-bit parents of their own. The concrete state is a
//! sparse register file keyed by parent id and a byte-addressed memory
//! map. Reads never allocate; writes allocate and mark the written range
//! as mapped.

mod aarch64;
mod x86;

use std::collections::HashMap;

use rangemap::RangeSet;

use crate::ast::bitmask;
use crate::error::{Result, TaseError};
use crate::operand::{MemoryAccess, Register};

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchId {
    X86_64,
    AArch64,
}

impl ArchId {
    /// Numeric ids accepted by embedders.
    pub fn from_u32(id: u32) -> Result<Self> {
        match id {
            1 => Ok(ArchId::X86_64),
            2 => Ok(ArchId::AArch64),
            other => Err(TaseError::UnsupportedArchitecture(other)),
        }
    }
}

/// Geometry of one register: bit extent inside its parent.
#[derive(Clone, Debug)]
pub struct RegSpec {
    pub name: String,
    pub upper: u32,
    pub lower: u32,
    pub parent: Register,
    pub flag: bool,
    /// Writing this sub-register clears the sibling bits of its parent
    /// instead of preserving them (e.g. 32-bit GPR writes on x86-64).
    pub zero_extends: bool,
}

impl RegSpec {
    pub fn bit_size(&self) -> u32 {
        self.upper - self.lower + 1
    }

    pub fn byte_size(&self) -> u32 {
        self.bit_size() / 8
    }
}

pub(crate) struct ArchTable {
    pub specs: Vec<RegSpec>,
    pub pc: Register,
    pub sp: Register,
}

pub struct Arch {
    id: Option<ArchId>,
    specs: Vec<RegSpec>,
    by_name: HashMap<String, Register>,
    pc: Register,
    sp: Register,
    /// Concrete register file, keyed by parent id.
    regs: HashMap<u16, u64>,
    /// Concrete memory, one byte per entry.
    mem: HashMap<u64, u8>,
    mapped: RangeSet<u64>,
}

impl Default for Arch {
    fn default() -> Self {
        Self::new()
    }
}

impl Arch {
    pub fn new() -> Self {
        Arch {
            id: None,
            specs: Vec::new(),
            by_name: HashMap::new(),
            pc: Register(0),
            sp: Register(0),
            regs: HashMap::new(),
            mem: HashMap::new(),
            mapped: RangeSet::new(),
        }
    }

    pub fn set_architecture(&mut self, id: ArchId) {
        let table = match id {
            ArchId::X86_64 => x86::register_table(),
            ArchId::AArch64 => aarch64::register_table(),
        };
        self.id = Some(id);
        self.by_name = table
            .specs
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), Register(i as u16)))
            .collect();
        self.specs = table.specs;
        self.pc = table.pc;
        self.sp = table.sp;
        self.clear();
    }

    pub fn get_architecture(&self) -> Option<ArchId> {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.id.is_some()
    }

    pub fn check(&self) -> Result<()> {
        if self.id.is_none() {
            return Err(TaseError::ArchitectureNotInitialised);
        }
        Ok(())
    }

    /// Clears the concrete state, keeping the geometry.
    pub fn clear(&mut self) {
        self.regs.clear();
        self.mem.clear();
        self.mapped = RangeSet::new();
    }

    /// Drops the architecture entirely.
    pub fn invalidate(&mut self) {
        self.clear();
        self.id = None;
        self.specs.clear();
        self.by_name.clear();
    }

    /* Register geometry ================================================= */

    pub fn get_spec(&self, reg: Register) -> Result<&RegSpec> {
        self.check()?;
        self.specs
            .get(reg.0 as usize)
            .ok_or_else(|| TaseError::InvalidRegister(format!("id {}", reg.0)))
    }

    /// `(name, upper, lower, parent)` of a register.
    pub fn register_info(&self, reg: Register) -> Result<(String, u32, u32, Register)> {
        let spec = self.get_spec(reg)?;
        Ok((spec.name.clone(), spec.upper, spec.lower, spec.parent))
    }

    pub fn is_flag(&self, reg: Register) -> bool {
        self.get_spec(reg).map(|s| s.flag).unwrap_or(false)
    }

    pub fn is_register(&self, reg: Register) -> bool {
        self.get_spec(reg).map(|s| !s.flag).unwrap_or(false)
    }

    pub fn is_register_valid(&self, reg: Register) -> bool {
        self.get_spec(reg).is_ok()
    }

    pub fn parent_register(&self, reg: Register) -> Result<Register> {
        Ok(self.get_spec(reg)?.parent)
    }

    pub fn register_bit_size(&self, reg: Register) -> Result<u32> {
        Ok(self.get_spec(reg)?.bit_size())
    }

    pub fn register_from_name(&self, name: &str) -> Option<Register> {
        self.by_name.get(name).copied()
    }

    pub fn number_of_registers(&self) -> usize {
        self.specs.len()
    }

    pub fn registers(&self) -> impl Iterator<Item = Register> + '_ {
        (0..self.specs.len()).map(|i| Register(i as u16))
    }

    pub fn parent_registers(&self) -> impl Iterator<Item = Register> + '_ {
        self.registers()
            .filter(|r| self.specs[r.0 as usize].parent == *r)
    }

    /// Widest general-purpose register size, in bits.
    pub fn gpr_bit_size(&self) -> u32 {
        64
    }

    pub fn pc_register(&self) -> Result<Register> {
        self.check()?;
        Ok(self.pc)
    }

    pub fn sp_register(&self) -> Result<Register> {
        self.check()?;
        Ok(self.sp)
    }

    /* Concrete registers ================================================ */

    pub fn get_register_value(&self, reg: Register) -> Result<u64> {
        let spec = self.get_spec(reg)?;
        let parent = self.regs.get(&spec.parent.0).copied().unwrap_or(0);
        Ok((parent >> spec.lower) & bitmask(spec.bit_size()))
    }

    /// Writes a register; sub-register writes leave the sibling bits of
    /// the parent intact unless the geometry says they zero-extend.
    pub fn set_register_value(&mut self, reg: Register, value: u64) -> Result<()> {
        let spec = self.get_spec(reg)?;
        let parent = spec.parent;
        let mask = bitmask(spec.bit_size());
        let new = if spec.zero_extends {
            value & mask
        } else {
            let old = self.regs.get(&parent.0).copied().unwrap_or(0);
            (old & !(mask << spec.lower)) | ((value & mask) << spec.lower)
        };
        self.regs.insert(parent.0, new);
        Ok(())
    }

    /* Concrete memory =================================================== */

    /// Single byte read; unmapped memory reads as zero and the map is
    /// left untouched.
    pub fn get_memory_value(&self, addr: u64) -> u8 {
        self.mem.get(&addr).copied().unwrap_or(0)
    }

    pub fn set_memory_value(&mut self, addr: u64, value: u8) {
        self.mem.insert(addr, value);
        self.mapped.insert(addr..addr.saturating_add(1));
    }

    pub fn get_memory_area(&self, addr: u64, size: usize) -> Vec<u8> {
        (0..size as u64).map(|k| self.get_memory_value(addr.wrapping_add(k))).collect()
    }

    pub fn set_memory_area(&mut self, addr: u64, values: &[u8]) {
        for (k, v) in values.iter().enumerate() {
            self.set_memory_value(addr.wrapping_add(k as u64), *v);
        }
    }

    /// Little-endian value of a memory access of at most eight bytes.
    pub fn get_memory_access_value(&self, mem: &MemoryAccess) -> Result<u64> {
        if mem.size == 0 || mem.size > 8 {
            return Err(TaseError::InvalidMemoryRange {
                addr: mem.address,
                size: mem.size,
            });
        }
        let mut value = 0u64;
        for k in (0..mem.size as u64).rev() {
            value = (value << 8) | u64::from(self.get_memory_value(mem.address.wrapping_add(k)));
        }
        Ok(value)
    }

    pub fn set_memory_access_value(&mut self, mem: &MemoryAccess, value: u64) -> Result<()> {
        if mem.size == 0 || mem.size > 8 {
            return Err(TaseError::InvalidMemoryRange {
                addr: mem.address,
                size: mem.size,
            });
        }
        for k in 0..mem.size as u64 {
            self.set_memory_value(mem.address.wrapping_add(k), (value >> (k * 8)) as u8);
        }
        Ok(())
    }

    pub fn is_memory_mapped(&self, addr: u64, size: usize) -> bool {
        if size == 0 {
            return false;
        }
        let range = addr..addr.saturating_add(size as u64);
        self.mapped.gaps(&range).next().is_none()
    }

    pub fn unmap_memory(&mut self, addr: u64, size: usize) {
        if size == 0 {
            return;
        }
        let range = addr..addr.saturating_add(size as u64);
        for k in range.clone() {
            self.mem.remove(&k);
        }
        self.mapped.remove(range);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn x86() -> Arch {
        let mut arch = Arch::new();
        arch.set_architecture(ArchId::X86_64);
        arch
    }

    #[test]
    fn rejects_unknown_architecture() {
        assert!(matches!(
            ArchId::from_u32(99),
            Err(TaseError::UnsupportedArchitecture(99))
        ));
    }

    #[test]
    fn geometry_of_sub_registers() {
        let arch = x86();
        let rax = arch.register_from_name("rax").unwrap();
        let ax = arch.register_from_name("ax").unwrap();
        let ah = arch.register_from_name("ah").unwrap();
        let (name, upper, lower, parent) = arch.register_info(ah).unwrap();
        assert_eq!(name, "ah");
        assert_eq!((upper, lower), (15, 8));
        assert_eq!(parent, rax);
        assert_eq!(arch.register_bit_size(ax).unwrap(), 16);
        assert!(arch.is_register(rax));
        assert!(!arch.is_flag(rax));
        let zf = arch.register_from_name("zf").unwrap();
        assert!(arch.is_flag(zf));
        assert_eq!(arch.parent_register(zf).unwrap(), zf);
    }

    #[test]
    fn sub_register_write_preserves_siblings() {
        let mut arch = x86();
        let rax = arch.register_from_name("rax").unwrap();
        let ax = arch.register_from_name("ax").unwrap();
        let ah = arch.register_from_name("ah").unwrap();
        arch.set_register_value(rax, 0x1122_3344_5566_7788).unwrap();
        arch.set_register_value(ah, 0xff).unwrap();
        assert_eq!(arch.get_register_value(rax).unwrap(), 0x1122_3344_5566_ff88);
        assert_eq!(arch.get_register_value(ax).unwrap(), 0xff88);
    }

    #[test]
    fn dword_write_zero_extends() {
        let mut arch = x86();
        let rax = arch.register_from_name("rax").unwrap();
        let eax = arch.register_from_name("eax").unwrap();
        arch.set_register_value(rax, 0xaaaa_bbbb_cccc_dddd).unwrap();
        arch.set_register_value(eax, 0x1111_2222).unwrap();
        assert_eq!(arch.get_register_value(rax).unwrap(), 0x0000_0000_1111_2222);
    }

    #[test]
    fn memory_reads_do_not_allocate() {
        let mut arch = x86();
        assert_eq!(arch.get_memory_value(0x1000), 0);
        assert!(!arch.is_memory_mapped(0x1000, 1));
        arch.set_memory_value(0x1000, 0xaa);
        assert!(arch.is_memory_mapped(0x1000, 1));
        arch.unmap_memory(0x1000, 1);
        assert!(!arch.is_memory_mapped(0x1000, 1));
        assert_eq!(arch.get_memory_value(0x1000), 0);
    }

    #[test]
    fn little_endian_access() {
        let mut arch = x86();
        arch.set_memory_area(0x100, &[0x01, 0x02, 0x03, 0x04]);
        let mem = MemoryAccess::new(0x100, 4);
        assert_eq!(arch.get_memory_access_value(&mem).unwrap(), 0x0403_0201);
        assert!(arch.is_memory_mapped(0x100, 4));
        assert!(!arch.is_memory_mapped(0x100, 5));
    }

    #[test]
    fn aarch64_geometry() {
        let mut arch = Arch::new();
        arch.set_architecture(ArchId::AArch64);
        let x0 = arch.register_from_name("x0").unwrap();
        let w0 = arch.register_from_name("w0").unwrap();
        assert_eq!(arch.parent_register(w0).unwrap(), x0);
        arch.set_register_value(x0, 0xdead_beef_0000_0001).unwrap();
        arch.set_register_value(w0, 0x42).unwrap();
        // w writes zero-extend into x.
        assert_eq!(arch.get_register_value(x0).unwrap(), 0x42);
    }
}
