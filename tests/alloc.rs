use gencrypto::prelude::*;

use std::sync::Arc;

fn open_body(platform: &Platform) -> CodeGen<'_> {
    let mut cg = CodeGen::new(platform);
    cg.begin_function("fixture").expect("bare prologue");
    cg
}

#[test]
fn release_restores_allocated_but_not_ever_used() {
    let p = Platform::avr();
    let mut cg = open_body(&p);
    let before = cg.allocated_mask();
    let mut r = cg.data(16).unwrap();
    assert_eq!(r.limb_count(), 2);
    assert_ne!(cg.allocated_mask(), before);

    cg.release(&mut r);
    assert_eq!(cg.allocated_mask(), before);
    assert_ne!(cg.ever_used_mask(), 0);
    assert!(r.is_empty());

    // Release is idempotent.
    cg.release(&mut r);
    assert_eq!(cg.allocated_mask(), before);
}

#[test]
fn reserved_registers_stay_out_of_the_pool() {
    let p = Platform::avr();
    let mut cg = open_body(&p);
    let reserved: u64 = ["r1", "Y", "Z", "SP"]
        .iter()
        .map(|n| 1u64 << p.reg_by_name(n).unwrap().number())
        .sum();
    // Exhaust the data file.
    let mut held = Vec::new();
    while let Ok(r) = cg.data(8) {
        held.push(r);
    }
    assert!(!held.is_empty());
    assert_eq!(cg.allocated_mask() & reserved, 0);
    assert_eq!(cg.ever_used_mask() & reserved, 0);
}

#[test]
fn allocation_is_deterministic() {
    let pick = |p: &Platform| -> Vec<u8> {
        let mut cg = CodeGen::new(p);
        cg.begin_function("fixture").unwrap();
        let a = cg.data(16).unwrap();
        let mut b = cg.data(8).unwrap();
        cg.release(&mut b);
        let c = cg.data(24).unwrap();
        a.limbs()
            .iter()
            .chain(c.limbs())
            .map(|l| l.number())
            .collect()
    };
    let p1 = Platform::avr();
    let p2 = Platform::avr();
    assert_eq!(pick(&p1), pick(&p2));
}

#[test]
fn temporary_prefers_the_scratch_register() {
    let p = Platform::avr();
    let mut cg = open_body(&p);
    let t = cg.temporary(8).unwrap();
    assert_eq!(t.limb(0).number(), 0);
    // With the scratch taken, the fallback is plain data.
    let t2 = cg.temporary(8).unwrap();
    assert!(t2.limb(0).flags().contains(RegFlags::DATA));
}

#[test]
fn storage_prefers_the_storage_class() {
    let p = Platform::thumb();
    let mut cg = open_body(&p);
    let s = cg.storage(32).unwrap();
    assert!(s.limb(0).flags().contains(RegFlags::STORAGE));
}

#[test]
fn address_requests_use_the_address_word() {
    let p = Platform::avr();
    let mut cg = open_body(&p);
    let a = cg.addr().unwrap();
    assert_eq!(a.limb_size(), Some(RegSize::S16));
    assert!(a.limb(0).flags().contains(RegFlags::ADDRESS));

    let p64 = Platform::arm64();
    let mut cg64 = CodeGen::new(&p64);
    cg64.begin_function("fixture").unwrap();
    assert_eq!(p64.word_size(), RegSize::S32);
    assert_eq!(p64.addr_size(), RegSize::S64);
    let a64 = cg64.addr().unwrap();
    assert_eq!(a64.limb_size(), Some(RegSize::S64));
}

#[test]
fn zero_width_allocation_is_rejected() {
    let p = Platform::avr();
    let mut cg = open_body(&p);
    assert!(matches!(cg.data(0), Err(Error::InvalidArgument(_))));
}

#[test]
fn exhaustion_reports_allocation_failure() {
    let p = Platform::avr();
    let mut cg = open_body(&p);
    let mut held = Vec::new();
    while let Ok(r) = cg.data(8) {
        held.push(r);
    }
    match cg.data(8) {
        Err(Error::AllocationFailure { platform, bits }) => {
            assert_eq!(platform, "avr");
            assert_eq!(bits, 8);
        }
        other => panic!("expected allocation failure, got {other:?}"),
    }
}

#[test]
fn odd_widths_round_up_and_stay_unfilled() {
    let p = Platform::avr();
    let mut cg = open_body(&p);
    let r = cg.data(20).unwrap();
    assert_eq!(r.limb_count(), 3);
    assert_eq!(r.size(), 20);
    assert_eq!(r.full_size(), 24);
    assert!(!r.zero_fill());
}

#[test]
fn grant_admits_a_reserved_register() {
    let p = Platform::avr();
    let mut cg = open_body(&p);
    let x = cg.addr().unwrap();
    assert_eq!(x.limb(0).name(), "X");
    // Only X is free by default; the next carrier needs a grant.
    assert!(cg.addr().is_err());
    cg.grant("Y").unwrap();
    let y = cg.addr().unwrap();
    assert_eq!(y.limb(0).name(), "Y");
}

#[test]
fn narrowed_allocation_size_pairs_registers() {
    let p = Platform::avr();
    let mut cg = open_body(&p);
    cg.set_alloc_size(RegSize::S16);
    let r = cg.data(32).unwrap();
    assert_eq!(r.limb_count(), 2);
    assert_eq!(r.limb_size(), Some(RegSize::S16));
    // Each pair shadows its odd partner.
    for limb in r.limbs() {
        assert_ne!(cg.allocated_mask() & (1u64 << (limb.number() + 1)), 0);
    }
    cg.set_alloc_size(RegSize::S8);
    let b = cg.data(8).unwrap();
    for limb in r.limbs() {
        assert_ne!(b.limb(0).number(), limb.number() + 1);
    }
}

#[test]
fn registers_resolve_by_number_and_name() {
    let p = Platform::avr();
    let z = p.reg_by_name("Z").unwrap();
    assert_eq!(z.number(), 30);
    assert!(Arc::ptr_eq(p.reg_by_number(30).unwrap(), z));
    assert!(p.reg_by_name("r99").is_none());
}

#[test]
fn callee_saved_use_shows_up_in_the_epilogue() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    // Take enough registers to spill into the callee-saved file.
    let mut held = Vec::new();
    for _ in 0..12 {
        held.push(cg.data(8).unwrap());
    }
    let func = cg.finish().unwrap();
    let insns = func.insns();
    assert_eq!(insns[0].op(), Opcode::Push);
    let pushes = insns.iter().filter(|i| i.op() == Opcode::Push).count();
    let pops = insns.iter().filter(|i| i.op() == Opcode::Pop).count();
    assert_eq!(pushes, pops);
    assert!(pushes > 0);
    assert_eq!(insns.last().map(|i| i.op()), Some(Opcode::Ret));
}
