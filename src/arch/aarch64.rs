//! AArch64 register geometry.

use super::{ArchTable, RegSpec};
use crate::operand::Register;

fn push(specs: &mut Vec<RegSpec>, name: String, upper: u32, lower: u32, parent: Register, flag: bool, zero_extends: bool) {
    specs.push(RegSpec {
        name,
        upper,
        lower,
        parent,
        flag,
        zero_extends,
    });
}

pub(super) fn register_table() -> ArchTable {
    let mut specs = Vec::new();

    for i in 0..31 {
        let parent = Register(specs.len() as u16);
        push(&mut specs, format!("x{}", i), 63, 0, parent, false, false);
        // w writes zero-extend into x.
        push(&mut specs, format!("w{}", i), 31, 0, parent, false, true);
    }

    let sp = Register(specs.len() as u16);
    push(&mut specs, "sp".to_string(), 63, 0, sp, false, false);
    push(&mut specs, "wsp".to_string(), 31, 0, sp, false, true);

    let pc = Register(specs.len() as u16);
    push(&mut specs, "pc".to_string(), 63, 0, pc, false, false);

    for name in ["n", "z", "c", "v"] {
        let id = Register(specs.len() as u16);
        push(&mut specs, name.to_string(), 0, 0, id, true, false);
    }

    ArchTable { specs, pc, sp }
}
