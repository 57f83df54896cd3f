use gencrypto::emit;
use gencrypto::prelude::*;
use gencrypto::registry;

#[test]
fn emission_is_deterministic() {
    for qualified in ["keccak-p:200:avr", "sha256:arm", "tinyjambu:128:avr"] {
        let entry = registry::global().lookup(qualified).expect("registered");
        let (p1, f1) = entry.generate().unwrap();
        let (p2, f2) = entry.generate().unwrap();
        let t1 = emit::assembly_string(&p1, &f1).unwrap();
        let t2 = emit::assembly_string(&p2, &f2).unwrap();
        assert_eq!(t1, t2, "{qualified}");
        assert!(!t1.is_empty());
    }
}

#[test]
fn avr_text_has_the_expected_frame() {
    let entry = registry::global().lookup("keccak-p:200:avr").unwrap();
    let (p, f) = entry.generate().unwrap();
    let text = emit::assembly_string(&p, &f).unwrap();
    assert!(text.contains("\t.globl keccakp_200_permute"));
    assert!(text.contains("keccakp_200_permute:"));
    assert!(text.contains("\t.balign 256"));
    assert!(text.contains(".Ltab0:"));
    assert!(text.contains("\tlpm "));
    assert!(text.contains("\tret"));
    assert!(text.contains("\t.size keccakp_200_permute, .-keccakp_200_permute"));
    // Callee-saved discipline shows as balanced pushes and pops.
    let pushes = text.matches("\tpush ").count();
    let pops = text.matches("\tpop ").count();
    assert_eq!(pushes, pops);
}

#[test]
fn arm_text_uses_shifted_operands() {
    let entry = registry::global().lookup("sha256:arm").unwrap();
    let (p, f) = entry.generate().unwrap();
    let text = emit::assembly_string(&p, &f).unwrap();
    assert!(text.contains("sha256_transform:"));
    assert!(text.contains(", ror #"));
    assert!(text.contains("\tbx lr"));
}

#[test]
fn scheduling_hints_reorder_emission() {
    let p = Platform::arm();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture_sched").unwrap();
    let a = cg.data(32).unwrap();
    let b = cg.data(32).unwrap();
    cg.move_imm(&a, 41).unwrap();
    cg.move_imm(&b, 42).unwrap();
    // Pull the last record one slot earlier.
    cg.reschedule(-2, 0).unwrap();
    let func = cg.finish().unwrap();
    let text = emit::assembly_string(&p, &func).unwrap();
    let pos41 = text.find("#41").unwrap();
    let pos42 = text.find("#42").unwrap();
    assert!(pos42 < pos41);
}

#[test]
fn every_platform_renders_every_generated_function() {
    for entry in registry::global().entries() {
        let (p, f) = entry.generate().unwrap();
        let text = emit::assembly_string(&p, &f).unwrap();
        assert!(text.contains(&format!("{}:", entry.func_name)), "{}", entry.qualified());
    }
}

#[test]
fn every_operand_size_is_supported_by_its_register() {
    for entry in registry::global().entries() {
        let (_, f) = entry.generate().unwrap();
        for insn in f.insns() {
            for operand in [insn.dest(), insn.src1(), insn.src2()].into_iter().flatten() {
                assert!(
                    operand.base().supports(operand.size()),
                    "{}: {insn}",
                    entry.qualified()
                );
            }
        }
    }
}
