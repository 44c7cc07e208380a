//! Symbolic engine behaviour: register/memory bindings, sub-register
//! writes, concretisation, variable conversion, optimisations and
//! backup/restore.

use tase::{ArchId, Instruction, MemoryAccess, Opcode, SymOpts, Tase};

fn session() -> Tase {
    let mut t = Tase::new();
    t.set_architecture(ArchId::X86_64).unwrap();
    t
}

fn nop(addr: u64) -> Instruction {
    Instruction::new(addr).with_opcode(Opcode::Nop)
}

#[test]
fn dword_sub_register_write_zero_extends_parent() {
    let mut t = session();
    let rax = t.get_register_from_name("rax").unwrap();
    let eax = t.get_register_from_name("eax").unwrap();
    let ast = t.get_ast_builder().clone();

    let mut inst = nop(0);
    let wide = ast.new_bv(0xaaaa_bbbb_cccc_dddd, 64).unwrap();
    t.create_symbolic_register_expression(&mut inst, wide, rax, "")
        .unwrap();
    let narrow = ast.new_bv(0x1111_2222, 32).unwrap();
    t.create_symbolic_register_expression(&mut inst, narrow, eax, "")
        .unwrap();

    // Writing the 32-bit view zero-extends into the 64-bit parent.
    assert_eq!(t.get_symbolic_register_value(rax).unwrap(), 0x0000_0000_1111_2222);
}

#[test]
fn word_sub_register_write_preserves_parent_bits() {
    let mut t = session();
    let rax = t.get_register_from_name("rax").unwrap();
    let ax = t.get_register_from_name("ax").unwrap();
    let ast = t.get_ast_builder().clone();

    let mut inst = nop(0);
    let wide = ast.new_bv(0xaaaa_bbbb_cccc_dddd, 64).unwrap();
    t.create_symbolic_register_expression(&mut inst, wide, rax, "")
        .unwrap();
    let narrow = ast.new_bv(0x1234, 16).unwrap();
    t.create_symbolic_register_expression(&mut inst, narrow, ax, "")
        .unwrap();

    assert_eq!(t.get_symbolic_register_value(rax).unwrap(), 0xaaaa_bbbb_cccc_1234);
    assert_eq!(t.get_symbolic_register_value(ax).unwrap(), 0x1234);
}

#[test]
fn register_binding_width_matches_parent() {
    let t = session();
    let rax = t.get_register_from_name("rax").unwrap();
    let parent_size = t.get_register_bit_size(rax).unwrap();
    let mut t = t;
    let ast = t.get_ast_builder().clone();
    let mut inst = nop(0);
    let al = t.get_register_from_name("al").unwrap();
    let byte = ast.new_bv(0x7f, 8).unwrap();
    let id = t
        .create_symbolic_register_expression(&mut inst, byte, al, "")
        .unwrap()
        .unwrap();
    let node = t.get_full_ast_from_id(id).unwrap();
    assert_eq!(node.get_size(), parent_size);
}

#[test]
fn multi_byte_memory_read_concats_little_endian() {
    let mut t = session();
    t.set_concrete_memory_area_value(0x100, &[0x01, 0x02, 0x03, 0x04])
        .unwrap();
    let node = t.build_symbolic_memory(&MemoryAccess::new(0x100, 4)).unwrap();
    assert_eq!(node.get_size(), 32);
    assert_eq!(node.evaluate(), 0x0403_0201);
    assert_eq!(t.evaluate_ast(&node).unwrap(), 0x0403_0201);
}

#[test]
fn memory_bindings_are_byte_granular() {
    let mut t = session();
    let ast = t.get_ast_builder().clone();
    let mut inst = nop(0);
    let mem = MemoryAccess::new(0x200, 4);
    let value = ast.new_bv(0xdead_beef, 32).unwrap();
    t.create_symbolic_memory_expression(&mut inst, value, &mem, "")
        .unwrap();

    for k in 0..4 {
        let id = t.get_symbolic_memory_id(0x200 + k).unwrap();
        assert!(id.is_some());
        let node = t.get_full_ast_from_id(id.unwrap()).unwrap();
        assert_eq!(node.get_size(), 8);
    }
    assert_eq!(t.get_symbolic_memory_value(0x200).unwrap(), 0xef);
    assert_eq!(t.get_symbolic_memory_value(0x203).unwrap(), 0xde);
    // Concrete state followed the concrete store.
    assert_eq!(
        t.get_concrete_memory_access_value(&MemoryAccess::new(0x200, 4)).unwrap(),
        0xdead_beef
    );
}

#[test]
fn concretize_severs_bindings() {
    let mut t = session();
    let rax = t.get_register_from_name("rax").unwrap();
    let ast = t.get_ast_builder().clone();
    let mut inst = nop(0);
    let value = ast.new_bv(42, 64).unwrap();
    t.create_symbolic_register_expression(&mut inst, value, rax, "")
        .unwrap();
    assert!(t.get_symbolic_register_id(rax).unwrap().is_some());
    t.concretize_register(rax).unwrap();
    assert!(t.get_symbolic_register_id(rax).unwrap().is_none());
    // The concrete value survives concretisation.
    assert_eq!(t.get_concrete_register_value(rax).unwrap(), 42);
}

#[test]
fn aligned_memory_short_circuits_loads() {
    let mut t = session();
    t.enable_symbolic_optimization(SymOpts::ALIGNED_MEMORY, true)
        .unwrap();
    let var = t.new_symbolic_variable(32, "input").unwrap();
    let name = t.get_symbolic_variable_from_id(var).unwrap().get_name().to_string();
    let node = t.get_ast_variable_node(&name).unwrap();
    let mut inst = nop(0);
    let mem = MemoryAccess::new(0x300, 4);
    t.create_symbolic_memory_expression(&mut inst, node.clone(), &mem, "")
        .unwrap();
    // The whole-access expression comes back instead of a byte concat.
    let loaded = t.build_symbolic_memory(&mem).unwrap();
    assert_eq!(loaded, node);
    // An overlapping write invalidates the aligned entry.
    let ast = t.get_ast_builder().clone();
    let byte = ast.new_bv(0, 8).unwrap();
    t.create_symbolic_memory_expression(&mut inst, byte, &MemoryAccess::new(0x301, 1), "")
        .unwrap();
    let reloaded = t.build_symbolic_memory(&mem).unwrap();
    assert_ne!(reloaded, node);
}

#[test]
fn only_on_symbolized_skips_concrete_expressions() {
    let mut t = session();
    t.enable_symbolic_optimization(SymOpts::ONLY_ON_SYMBOLIZED, true)
        .unwrap();
    let rax = t.get_register_from_name("rax").unwrap();
    let ast = t.get_ast_builder().clone();
    let mut inst = nop(0);
    let concrete = ast.new_bv(7, 64).unwrap();
    let skipped = t
        .create_symbolic_register_expression(&mut inst, concrete, rax, "")
        .unwrap();
    assert!(skipped.is_none());
    assert!(t.get_symbolic_register_id(rax).unwrap().is_none());
    // Concrete execution still happened.
    assert_eq!(t.get_concrete_register_value(rax).unwrap(), 7);

    // A symbolized value still creates an expression.
    let var = t.new_symbolic_variable(64, "").unwrap();
    let name = t.get_symbolic_variable_from_id(var).unwrap().get_name().to_string();
    let node = t.get_ast_variable_node(&name).unwrap();
    let created = t
        .create_symbolic_register_expression(&mut inst, node, rax, "")
        .unwrap();
    assert!(created.is_some());
}

#[test]
fn convert_register_to_variable_binds_and_keeps_concrete() {
    let mut t = session();
    let rax = t.get_register_from_name("rax").unwrap();
    t.set_concrete_register_value(rax, 0x1122).unwrap();
    let var_id = t.convert_register_to_symbolic_variable(rax, "user input").unwrap();
    let var = t.get_symbolic_variable_from_id(var_id).unwrap();
    assert_eq!(var.get_size(), 64);
    // The register is now bound to the variable.
    let node = t.build_symbolic_register(rax).unwrap();
    assert!(node.is_symbolized());
    // Concrete state is untouched and evaluation keeps the snapshot.
    assert_eq!(t.get_concrete_register_value(rax).unwrap(), 0x1122);
    assert_eq!(t.get_symbolic_register_value(rax).unwrap(), 0x1122);
}

#[test]
fn convert_memory_rewrites_every_byte_binding() {
    let mut t = session();
    t.set_concrete_memory_area_value(0x400, &[0xaa, 0xbb]).unwrap();
    let var_id = t
        .convert_memory_to_symbolic_variable(&MemoryAccess::new(0x400, 2), "")
        .unwrap();
    let var = t.get_symbolic_variable_from_id(var_id).unwrap();
    assert_eq!(var.get_size(), 16);
    for addr in 0x400..0x402 {
        let id = t.get_symbolic_memory_id(addr).unwrap();
        assert!(id.is_some(), "byte {:#x} lost its binding", addr);
        let node = t.get_full_ast_from_id(id.unwrap()).unwrap();
        assert!(node.is_symbolized());
    }
}

#[test]
fn convert_expression_rewrites_its_root() {
    let mut t = session();
    let ast = t.get_ast_builder().clone();
    let node = ast.new_bv(0x41, 8).unwrap();
    let id = t.new_symbolic_expression(node, "").unwrap();
    let var_id = t.convert_expression_to_symbolic_variable(id, 8, "").unwrap();
    let root = t.get_full_ast_from_id(id).unwrap();
    assert!(root.is_variable());
    let var = t.get_symbolic_variable_from_id(var_id).unwrap();
    // Free variables referenced by any expression resolve by name.
    assert!(t.get_ast_variable_node(var.get_name()).is_some());
    // The snapshot value keeps concolic evaluation defined.
    assert_eq!(root.evaluate(), 0x41);
}

#[test]
fn removed_expressions_are_unknown() {
    let mut t = session();
    let ast = t.get_ast_builder().clone();
    let node = ast.new_bv(1, 8).unwrap();
    let id = t.new_symbolic_expression(node, "").unwrap();
    t.remove_symbolic_expression(id).unwrap();
    assert!(!t.is_symbolic_expression_id_exists(id));
    assert!(t.get_symbolic_expression_from_id(id).is_err());
}

#[test]
fn backup_restore_round_trips_public_state() {
    let mut t = session();
    let rax = t.get_register_from_name("rax").unwrap();
    let ast = t.get_ast_builder().clone();
    let mut inst = nop(0x1000);

    let value = ast.new_bv(0x55, 64).unwrap();
    t.create_symbolic_register_expression(&mut inst, value, rax, "")
        .unwrap();
    let var = t.new_symbolic_variable(8, "").unwrap();
    let name = t.get_symbolic_variable_from_id(var).unwrap().get_name().to_string();
    let x = t.get_ast_variable_node(&name).unwrap();
    let cond = ast.new_bvugt(x.clone(), ast.new_bv(0, 8).unwrap()).unwrap();
    t.add_path_constraint(&inst, cond, true).unwrap();

    let reg_binding = t.get_symbolic_register_id(rax).unwrap();
    let n_exprs = t.get_symbolic_expressions().unwrap().len();
    let n_constraints = t.get_path_constraints().unwrap().len();

    t.backup_symbolic_engine().unwrap();

    // Mutate everything the engine owns.
    let junk = ast.new_bv(0xff, 64).unwrap();
    t.create_symbolic_register_expression(&mut inst, junk, rax, "")
        .unwrap();
    t.new_symbolic_variable(16, "").unwrap();
    let more = ast.new_bvult(x, ast.new_bv(9, 8).unwrap()).unwrap();
    t.add_path_constraint(&inst, more, true).unwrap();
    t.clear_path_constraints().unwrap();

    t.restore_symbolic_engine().unwrap();

    assert_eq!(t.get_symbolic_register_id(rax).unwrap(), reg_binding);
    assert_eq!(t.get_symbolic_expressions().unwrap().len(), n_exprs);
    assert_eq!(t.get_path_constraints().unwrap().len(), n_constraints);
    assert_eq!(t.get_symbolic_register_value(rax).unwrap(), 0x55);
}

#[test]
fn restore_without_backup_is_a_noop() {
    let mut t = session();
    let ast = t.get_ast_builder().clone();
    let node = ast.new_bv(1, 8).unwrap();
    let id = t.new_symbolic_expression(node, "").unwrap();
    t.restore_symbolic_engine().unwrap();
    assert!(t.is_symbolic_expression_id_exists(id));
}

#[test]
fn variable_declarations_are_smt2() {
    let mut t = session();
    t.new_symbolic_variable(32, "").unwrap();
    t.new_symbolic_variable(8, "").unwrap();
    let decls = t.get_variables_declaration().unwrap();
    assert_eq!(
        decls,
        "(declare-fun SymVar_0 () (_ BitVec 32))\n(declare-fun SymVar_1 () (_ BitVec 8))\n"
    );
}
