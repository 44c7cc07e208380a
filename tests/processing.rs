//! End-to-end instruction processing: disassembled operands through the
//! lifter, with concrete execution, symbolic bindings, taint and path
//! constraints updated together.

use tase::{
    ArchId, Immediate, Instruction, MemoryAccess, Opcode, Operand, Register, Tase,
};

fn session() -> Tase {
    let mut t = Tase::new();
    t.set_architecture(ArchId::X86_64).unwrap();
    t
}

fn reg(t: &Tase, name: &str) -> Register {
    t.get_register_from_name(name).unwrap()
}

fn r2r(addr: u64, opcode: Opcode, dst: Register, src: Register) -> Instruction {
    Instruction::new(addr)
        .with_opcode(opcode)
        .with_operands([Operand::Reg(dst), Operand::Reg(src)])
}

#[test]
fn mov_assigns_value_and_taint() {
    let mut t = session();
    let rax = reg(&t, "rax");
    let rbx = reg(&t, "rbx");
    t.set_concrete_register_value(rax, 0xcafe).unwrap();
    t.taint_register(rax).unwrap();

    let mut inst = r2r(0x1000, Opcode::Mov, rbx, rax);
    assert!(t.processing(&mut inst).unwrap());

    assert_eq!(t.get_symbolic_register_value(rbx).unwrap(), 0xcafe);
    assert_eq!(t.get_concrete_register_value(rbx).unwrap(), 0xcafe);
    assert!(t.is_register_tainted(rbx).unwrap());
    assert!(!inst.get_symbolic_expressions().is_empty());
    assert_eq!(inst.get_read_registers().len(), 1);
    // The program counter advanced past the instruction.
    let rip = reg(&t, "rip");
    assert_eq!(t.get_symbolic_register_value(rip).unwrap(), inst.next_address());
}

#[test]
fn mov_from_immediate_untaints() {
    let mut t = session();
    let rbx = reg(&t, "rbx");
    t.taint_register(rbx).unwrap();
    let mut inst = Instruction::new(0x1000)
        .with_opcode(Opcode::Mov)
        .with_operands([Operand::Reg(rbx), Operand::Imm(Immediate::new(9, 8))]);
    assert!(t.processing(&mut inst).unwrap());
    assert!(!t.is_register_tainted(rbx).unwrap());
    assert_eq!(t.get_symbolic_register_value(rbx).unwrap(), 9);
}

#[test]
fn add_computes_and_sets_flags() {
    let mut t = session();
    let rax = reg(&t, "rax");
    let rbx = reg(&t, "rbx");
    t.set_concrete_register_value(rax, 40).unwrap();
    t.set_concrete_register_value(rbx, 2).unwrap();

    let mut inst = r2r(0x2000, Opcode::Add, rax, rbx);
    assert!(t.processing(&mut inst).unwrap());

    assert_eq!(t.get_symbolic_register_value(rax).unwrap(), 42);
    let zf = reg(&t, "zf");
    let cf = reg(&t, "cf");
    let sf = reg(&t, "sf");
    assert_eq!(t.get_symbolic_register_value(zf).unwrap(), 0);
    assert_eq!(t.get_symbolic_register_value(cf).unwrap(), 0);
    assert_eq!(t.get_symbolic_register_value(sf).unwrap(), 0);
}

#[test]
fn sub_to_zero_raises_zf() {
    let mut t = session();
    let rax = reg(&t, "rax");
    let rbx = reg(&t, "rbx");
    t.set_concrete_register_value(rax, 7).unwrap();
    t.set_concrete_register_value(rbx, 7).unwrap();
    let mut inst = r2r(0x2000, Opcode::Sub, rax, rbx);
    assert!(t.processing(&mut inst).unwrap());
    assert_eq!(t.get_symbolic_register_value(rax).unwrap(), 0);
    assert_eq!(t.get_symbolic_register_value(reg(&t, "zf")).unwrap(), 1);
}

#[test]
fn xor_with_itself_clears_register_and_taint_survives_union() {
    let mut t = session();
    let rax = reg(&t, "rax");
    t.set_concrete_register_value(rax, 0x1234).unwrap();
    t.taint_register(rax).unwrap();

    let mut inst = r2r(0x3000, Opcode::Xor, rax, rax);
    assert!(t.processing(&mut inst).unwrap());

    assert_eq!(t.get_symbolic_register_value(rax).unwrap(), 0);
    assert_eq!(t.get_symbolic_register_value(reg(&t, "zf")).unwrap(), 1);
    // Union keeps the destination taint even for xor reg, reg.
    assert!(t.is_register_tainted(rax).unwrap());
}

#[test]
fn cmp_then_jnz_appends_one_path_constraint() {
    let mut t = session();
    let rax = reg(&t, "rax");
    // Make rax symbolic so the branch condition stays symbolic.
    t.convert_register_to_symbolic_variable(rax, "input").unwrap();

    let mut cmp = Instruction::new(0x4000)
        .with_opcode(Opcode::Cmp)
        .with_operands([Operand::Reg(rax), Operand::Imm(Immediate::new(5, 8))]);
    assert!(t.processing(&mut cmp).unwrap());
    assert_eq!(t.get_path_constraints().unwrap().len(), 0);

    let mut jnz = Instruction::new(0x4004)
        .with_opcode(Opcode::Jnz)
        .with_operands([Operand::Imm(Immediate::new(0x5000, 8))]);
    assert!(t.processing(&mut jnz).unwrap());

    assert!(jnz.is_branch());
    assert!(jnz.is_conditional());
    let constraints = t.get_path_constraints().unwrap();
    assert_eq!(constraints.len(), 1);
    assert_eq!(constraints[0].address, 0x4004);
    // Initial concrete rax is 0, so 0 != 5 and the branch is taken.
    let rip = reg(&t, "rip");
    assert_eq!(t.get_symbolic_register_value(rip).unwrap(), 0x5000);
}

#[test]
fn push_pop_round_trip() {
    let mut t = session();
    let rax = reg(&t, "rax");
    let rbx = reg(&t, "rbx");
    let rsp = reg(&t, "rsp");
    t.set_concrete_register_value(rsp, 0x7fff_0000).unwrap();
    t.set_concrete_register_value(rax, 0xdead_beef).unwrap();
    t.taint_register(rax).unwrap();

    let mut push = Instruction::new(0x5000)
        .with_opcode(Opcode::Push)
        .with_operands([Operand::Reg(rax)]);
    assert!(t.processing(&mut push).unwrap());
    assert_eq!(t.get_symbolic_register_value(rsp).unwrap(), 0x7ffe_fff8);
    assert!(t
        .is_memory_access_tainted(&MemoryAccess::new(0x7ffe_fff8, 8))
        .unwrap());

    let mut pop = Instruction::new(0x5001)
        .with_opcode(Opcode::Pop)
        .with_operands([Operand::Reg(rbx)]);
    assert!(t.processing(&mut pop).unwrap());

    assert_eq!(t.get_symbolic_register_value(rbx).unwrap(), 0xdead_beef);
    assert_eq!(t.get_symbolic_register_value(rsp).unwrap(), 0x7fff_0000);
    // Taint flowed register -> stack -> register.
    assert!(t.is_register_tainted(rbx).unwrap());
}

#[test]
fn movzx_zero_extends() {
    let mut t = session();
    let rax = reg(&t, "rax");
    let ebx = reg(&t, "ebx");
    t.set_concrete_register_value(rax, 0xffff_ffff_ffff_ff80).unwrap();
    let al = reg(&t, "al");
    let mut inst = Instruction::new(0x6000)
        .with_opcode(Opcode::Movzx)
        .with_operands([Operand::Reg(ebx), Operand::Reg(al)]);
    assert!(t.processing(&mut inst).unwrap());
    assert_eq!(t.get_symbolic_register_value(ebx).unwrap(), 0x80);
    // The write to ebx zero-extended into rbx.
    let rbx = reg(&t, "rbx");
    assert_eq!(t.get_symbolic_register_value(rbx).unwrap(), 0x80);
}

#[test]
fn unsupported_instructions_report_false() {
    let mut t = session();
    let mut inst = Instruction::new(0x7000).with_opcode(Opcode::Unsupported);
    assert!(!t.processing(&mut inst).unwrap());
}

#[test]
fn memory_operands_flow_through_mov() {
    let mut t = session();
    let rax = reg(&t, "rax");
    t.set_concrete_memory_area_value(0x100, &[0x01, 0x02, 0x03, 0x04, 0, 0, 0, 0])
        .unwrap();
    t.taint_memory(0x100).unwrap();

    let mem = MemoryAccess::new(0x100, 8);
    let mut load = Instruction::new(0x8000)
        .with_opcode(Opcode::Mov)
        .with_operands([Operand::Reg(rax), Operand::Mem(mem.clone())]);
    assert!(t.processing(&mut load).unwrap());

    assert_eq!(t.get_symbolic_register_value(rax).unwrap(), 0x0403_0201);
    assert!(t.is_register_tainted(rax).unwrap());
    assert_eq!(load.get_load_accesses().len(), 1);

    // Store it somewhere else and check the bytes.
    let dst = MemoryAccess::new(0x200, 8);
    let mut store = Instruction::new(0x8004)
        .with_opcode(Opcode::Mov)
        .with_operands([Operand::Mem(dst.clone()), Operand::Reg(rax)]);
    assert!(t.processing(&mut store).unwrap());
    assert_eq!(t.get_symbolic_memory_access_value(&dst).unwrap(), 0x0403_0201);
    assert!(t.is_memory_access_tainted(&dst).unwrap());
}
