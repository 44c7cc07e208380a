//! x86-64 register geometry.

use super::{ArchTable, RegSpec};
use crate::operand::Register;

fn push(specs: &mut Vec<RegSpec>, name: &str, upper: u32, lower: u32, parent: Register, flag: bool, zero_extends: bool) {
    specs.push(RegSpec {
        name: name.to_string(),
        upper,
        lower,
        parent,
        flag,
        zero_extends,
    });
}

/// Pushes a 64-bit GPR family: the parent plus its dword, word and byte
/// views. The dword view zero-extends on write, as the hardware does.
fn gpr(specs: &mut Vec<RegSpec>, n64: &str, n32: &str, n16: &str, n8: &str, n8h: Option<&str>) -> Register {
    let parent = Register(specs.len() as u16);
    push(specs, n64, 63, 0, parent, false, false);
    push(specs, n32, 31, 0, parent, false, true);
    push(specs, n16, 15, 0, parent, false, false);
    push(specs, n8, 7, 0, parent, false, false);
    if let Some(high) = n8h {
        push(specs, high, 15, 8, parent, false, false);
    }
    parent
}

fn flag(specs: &mut Vec<RegSpec>, name: &str) {
    let id = Register(specs.len() as u16);
    push(specs, name, 0, 0, id, true, false);
}

pub(super) fn register_table() -> ArchTable {
    let mut specs = Vec::new();

    gpr(&mut specs, "rax", "eax", "ax", "al", Some("ah"));
    gpr(&mut specs, "rbx", "ebx", "bx", "bl", Some("bh"));
    gpr(&mut specs, "rcx", "ecx", "cx", "cl", Some("ch"));
    gpr(&mut specs, "rdx", "edx", "dx", "dl", Some("dh"));
    gpr(&mut specs, "rsi", "esi", "si", "sil", None);
    gpr(&mut specs, "rdi", "edi", "di", "dil", None);
    gpr(&mut specs, "rbp", "ebp", "bp", "bpl", None);
    let sp = gpr(&mut specs, "rsp", "esp", "sp", "spl", None);
    gpr(&mut specs, "r8", "r8d", "r8w", "r8b", None);
    gpr(&mut specs, "r9", "r9d", "r9w", "r9b", None);
    gpr(&mut specs, "r10", "r10d", "r10w", "r10b", None);
    gpr(&mut specs, "r11", "r11d", "r11w", "r11b", None);
    gpr(&mut specs, "r12", "r12d", "r12w", "r12b", None);
    gpr(&mut specs, "r13", "r13d", "r13w", "r13b", None);
    gpr(&mut specs, "r14", "r14d", "r14w", "r14b", None);
    gpr(&mut specs, "r15", "r15d", "r15w", "r15b", None);

    let pc = Register(specs.len() as u16);
    push(&mut specs, "rip", 63, 0, pc, false, false);

    flag(&mut specs, "cf");
    flag(&mut specs, "pf");
    flag(&mut specs, "af");
    flag(&mut specs, "zf");
    flag(&mut specs, "sf");
    flag(&mut specs, "tf");
    flag(&mut specs, "if");
    flag(&mut specs, "df");
    flag(&mut specs, "of");

    ArchTable { specs, pc, sp }
}
