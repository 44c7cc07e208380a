//! Built-in reference semantics.
//!
//! One lifter per architecture, installed by `set_architecture`.
//! Embedders replace it with `set_lifter` when they carry their own
//! semantics.

pub mod x86;

use crate::arch::ArchId;
use crate::inst::InstructionLifter;

pub fn lifter_for(id: ArchId) -> Option<Box<dyn InstructionLifter>> {
    match id {
        ArchId::X86_64 => Some(Box::new(x86::X86Semantics::new())),
        ArchId::AArch64 => None,
    }
}
