use gencrypto::prelude::*;

fn sized(p: &Platform, name: &str, size: RegSize) -> SizedReg {
    SizedReg::new(p.reg_by_name(name).unwrap().clone(), size).unwrap()
}

#[test]
fn two_address_targets_move_then_operate() {
    let p = Platform::avr();
    let d = sized(&p, "r16", RegSize::S8);
    let s1 = sized(&p, "r17", RegSize::S8);
    let s2 = sized(&p, "r18", RegSize::S8);

    let mut buf = Vec::new();
    p.binary(&mut buf, Opcode::Xor, &d, &s1, &s2, false).unwrap();
    assert_eq!(buf.len(), 2);
    assert_eq!(buf[0].op(), Opcode::Mov);
    assert_eq!(buf[0].dest(), Some(&d));
    assert_eq!(buf[1].op(), Opcode::Xor);
    assert_eq!(buf[1].src2(), Some(&s2));

    // In-place forms need no move.
    let mut buf = Vec::new();
    p.binary(&mut buf, Opcode::Xor, &d, &d, &s2, false).unwrap();
    assert_eq!(buf.len(), 1);

    // A commutative operation with the destination in the second source
    // swaps rather than clobbering.
    let mut buf = Vec::new();
    p.binary(&mut buf, Opcode::And, &d, &s1, &d, false).unwrap();
    assert_eq!(buf.len(), 1);
    assert_eq!(buf[0].src2(), Some(&s1));

    // Non-commutative overlap cannot be lowered.
    let mut buf = Vec::new();
    assert!(matches!(
        p.binary(&mut buf, Opcode::Sub, &d, &s1, &d, false),
        Err(Error::InvalidInstruction(_))
    ));
}

#[test]
fn three_address_targets_emit_one_record() {
    let p = Platform::arm();
    let d = sized(&p, "r4", RegSize::S32);
    let s1 = sized(&p, "r5", RegSize::S32);
    let s2 = sized(&p, "r6", RegSize::S32);
    let mut buf = Vec::new();
    p.binary(&mut buf, Opcode::Xor, &d, &s1, &s2, false).unwrap();
    assert_eq!(buf.len(), 1);
    assert_eq!(buf[0].dest(), Some(&d));
    assert_eq!(buf[0].src1(), Some(&s1));
}

#[test]
fn rejected_immediates_are_synthesised_into_scratch() {
    let p = Platform::arm();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    let r = cg.data(32).unwrap();
    let before = cg.insns().len();
    // Not a rotated 8-bit quantity.
    cg.and_imm(&r, 0x1234_5678).unwrap();
    let tail = &cg.insns()[before..];
    assert!(tail.iter().all(|i| i.op() != Opcode::And || i.imm().is_none()));
    assert!(tail.iter().any(|i| matches!(i.op(), Opcode::MovImm16 | Opcode::MovtImm16)));
    assert!(tail.iter().any(|i| i.op() == Opcode::And && i.src2().is_some()));
}

#[test]
fn avr_logical_immediates_use_the_immediate_forms() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    let r = cg.allocate(8, &[RegFlags::DATA | RegFlags::TWO_ADDRESS]).unwrap();
    let before = cg.insns().len();
    cg.and_imm(&r, 0x0f).unwrap();
    let tail = &cg.insns()[before..];
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].op(), Opcode::And);
    assert_eq!(tail[0].imm(), Some(0x0f));
}

#[test]
fn avr_xor_immediate_goes_through_a_register() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    let r = cg.allocate(8, &[RegFlags::DATA | RegFlags::TWO_ADDRESS]).unwrap();
    let before = cg.insns().len();
    cg.xor_imm(&r, 0x55).unwrap();
    let tail = &cg.insns()[before..];
    assert!(tail.iter().any(|i| i.op() == Opcode::MovImm));
    assert!(tail.iter().all(|i| i.op() != Opcode::Xor || i.imm().is_none()));
}

#[test]
fn add_immediate_becomes_subtract_of_the_negation() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    let r = cg.allocate(16, &[RegFlags::DATA | RegFlags::TWO_ADDRESS]).unwrap();
    let before = cg.insns().len();
    cg.add_imm(&r, 0x0102).unwrap();
    let tail = &cg.insns()[before..];
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].op(), Opcode::Sub);
    assert_eq!(tail[0].imm(), Some((0x100 - 0x02) & 0xff));
    assert!(tail[0].sets_flags());
    assert_eq!(tail[1].op(), Opcode::Sbc);
    assert_eq!(tail[1].imm(), Some(0x100 - 0x01 - 1));
}

#[test]
fn rotation_by_zero_appends_nothing() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    let mut r = cg.data(32).unwrap();
    let before = cg.insns().len();
    cg.ror(&mut r, 0).unwrap();
    cg.ror(&mut r, 32).unwrap();
    assert_eq!(cg.insns().len(), before);
}

#[test]
fn rotation_by_whole_limbs_only_renumbers() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    let mut r = cg.data(32).unwrap();
    let original: Vec<u8> = r.limbs().iter().map(|l| l.number()).collect();
    let before = cg.insns().len();
    cg.ror(&mut r, 8).unwrap();
    assert_eq!(cg.insns().len(), before);
    let rotated: Vec<u8> = r.limbs().iter().map(|l| l.number()).collect();
    assert_eq!(rotated[0], original[1]);
    assert_eq!(rotated[3], original[0]);
}

#[test]
fn near_limb_rotations_flip_direction() {
    // ror 7 is re-expressed as a limb step plus rol 1, so the working
    // shifts stay short.
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    let mut r = cg.data(32).unwrap();
    let original: Vec<u8> = r.limbs().iter().map(|l| l.number()).collect();
    let before = cg.insns().len();
    cg.ror(&mut r, 7).unwrap();
    let tail = &cg.insns()[before..];
    // Limb renumbering happened.
    let rotated: Vec<u8> = r.limbs().iter().map(|l| l.number()).collect();
    assert_eq!(rotated[0], original[1]);
    // The value shifts are by a single bit, the fills by seven.
    assert!(tail.iter().filter(|i| i.op() == Opcode::Lsl).all(|i| i.imm() == Some(1)));
    assert!(tail.iter().filter(|i| i.op() == Opcode::Lsr).all(|i| i.imm() == Some(7)));
}

#[test]
fn pinned_values_rotate_through_moves() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    let mut r = cg.data(32).unwrap();
    r.pin();
    let original: Vec<u8> = r.limbs().iter().map(|l| l.number()).collect();
    let before = cg.insns().len();
    cg.ror(&mut r, 8).unwrap();
    let tail = &cg.insns()[before..];
    assert!(tail.iter().all(|i| i.op() == Opcode::Mov));
    assert!(!tail.is_empty());
    let after: Vec<u8> = r.limbs().iter().map(|l| l.number()).collect();
    assert_eq!(after, original);
}

#[test]
fn native_rotates_are_used_where_they_exist() {
    let p = Platform::arm();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    let mut r = cg.data(32).unwrap();
    let before = cg.insns().len();
    cg.ror(&mut r, 13).unwrap();
    let tail = &cg.insns()[before..];
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].op(), Opcode::Ror);
    assert_eq!(tail[0].imm(), Some(13));
}

#[test]
fn unresolved_labels_fail_at_finish() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    let l = cg.new_label();
    cg.branch(Opcode::Bne, l).unwrap();
    assert!(matches!(cg.finish(), Err(Error::UnresolvedLabel(_))));
}

#[test]
fn finalised_generators_reject_further_work() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    cg.finish().unwrap();
    assert!(matches!(cg.data(8), Err(Error::Finalised)));
}

#[test]
fn arguments_must_precede_the_prologue() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    assert!(matches!(
        cg.bind_args("fixture", &[ArgType::Ptr]),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn oversized_frames_are_rejected() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    cg.begin_function("fixture").unwrap();
    assert!(matches!(
        cg.setup_locals(64),
        Err(Error::FrameTooLarge { limit: 63, .. })
    ));
    cg.setup_locals(62).unwrap();
    assert_eq!(cg.frame_bytes(), 62);
}

#[test]
fn immediate_predicates_guard_the_encoders() {
    let p = Platform::arm();
    assert!(p.valid_imm(Opcode::Add, RegSize::S32, 0xff00));
    assert!(!p.valid_imm(Opcode::Add, RegSize::S32, 0xff001));

    let t = Platform::thumb();
    assert!(t.valid_imm(Opcode::Add, RegSize::S32, 0x00ab_00ab));
    assert!(!t.valid_imm(Opcode::Add, RegSize::S32, 0x00ab_00ac));

    let a64 = Platform::arm64();
    assert!(a64.valid_imm(Opcode::And, RegSize::S32, 0x00ff_00ff));
    assert!(!a64.valid_imm(Opcode::And, RegSize::S32, 0x1234_5678));
    assert!(a64.valid_imm(Opcode::Add, RegSize::S32, 0xfff));
    assert!(a64.valid_imm(Opcode::Add, RegSize::S32, 0x3000));
    assert!(!a64.valid_imm(Opcode::Add, RegSize::S32, 0x1001000));
}
