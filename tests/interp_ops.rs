use gencrypto::prelude::*;

/// Build a permutation-shaped function on `platform`, run it over
/// `state`, and hand the mutated bytes back.
fn run_permutation(
    platform: &Platform,
    state: &[u8],
    build: impl FnOnce(&mut CodeGen, &Reg) -> Result<()>,
) -> Vec<u8> {
    let mut cg = CodeGen::new(platform);
    let ptr = cg.begin_permutation("fixture_permute", 0).unwrap();
    build(&mut cg, &ptr).unwrap();
    let func = cg.finish().unwrap();

    let mut out = state.to_vec();
    let mut vm = Interpreter::new(platform);
    vm.exec_permutation(&func, &mut out).unwrap();
    out
}

#[test]
fn add_chains_carry_across_limbs() {
    // Two 32-bit little-endian values on an 8-bit machine.
    let p = Platform::avr();
    let a = 0x01ff_ffffu32;
    let b = 0x0000_0001u32;
    let mut state = Vec::new();
    state.extend_from_slice(&a.to_le_bytes());
    state.extend_from_slice(&b.to_le_bytes());

    let out = run_permutation(&p, &state, |cg, ptr| {
        let x = cg.data(32)?;
        let y = cg.data(32)?;
        cg.ld(&x, ptr, 0)?;
        cg.ld(&y, ptr, 4)?;
        cg.add(&x, &y)?;
        cg.st(&x, ptr, 0)
    });
    assert_eq!(&out[..4], &a.wrapping_add(b).to_le_bytes());
}

#[test]
fn sub_borrows_across_limbs() {
    let p = Platform::avr();
    let a = 0x0100_0000u32;
    let b = 0x0000_0001u32;
    let mut state = Vec::new();
    state.extend_from_slice(&a.to_le_bytes());
    state.extend_from_slice(&b.to_le_bytes());

    let out = run_permutation(&p, &state, |cg, ptr| {
        let x = cg.data(32)?;
        let y = cg.data(32)?;
        cg.ld(&x, ptr, 0)?;
        cg.ld(&y, ptr, 4)?;
        cg.sub(&x, &y)?;
        cg.st(&x, ptr, 0)
    });
    assert_eq!(&out[..4], &a.wrapping_sub(b).to_le_bytes());
}

#[test]
fn rotations_match_host_semantics() {
    for platform in [Platform::avr(), Platform::arm()] {
        for n in [1u32, 4, 7, 8, 12, 19, 24, 31] {
            let v = 0x81c2_d3f4u32;
            let out = run_permutation(&platform, &v.to_le_bytes(), |cg, ptr| {
                let mut x = cg.data(32)?;
                cg.ld(&x, ptr, 0)?;
                cg.ror(&mut x, n)?;
                cg.st(&x, ptr, 0)
            });
            assert_eq!(
                out,
                v.rotate_right(n).to_le_bytes(),
                "ror {n} on {}",
                platform.name()
            );

            let out = run_permutation(&platform, &v.to_le_bytes(), |cg, ptr| {
                let mut x = cg.data(32)?;
                cg.ld(&x, ptr, 0)?;
                cg.rol(&mut x, n)?;
                cg.st(&x, ptr, 0)
            });
            assert_eq!(
                out,
                v.rotate_left(n).to_le_bytes(),
                "rol {n} on {}",
                platform.name()
            );
        }
    }
}

#[test]
fn shifts_match_host_semantics() {
    for platform in [Platform::avr(), Platform::arm()] {
        for n in [1u32, 3, 8, 13, 24] {
            let v = 0xf123_4567u32;
            let out = run_permutation(&platform, &v.to_le_bytes(), |cg, ptr| {
                let x = cg.data(32)?;
                cg.ld(&x, ptr, 0)?;
                cg.shr(&x, n)?;
                cg.st(&x, ptr, 0)
            });
            assert_eq!(out, (v >> n).to_le_bytes(), "shr {n} on {}", platform.name());

            let out = run_permutation(&platform, &v.to_le_bytes(), |cg, ptr| {
                let x = cg.data(32)?;
                cg.ld(&x, ptr, 0)?;
                cg.shl(&x, n)?;
                cg.st(&x, ptr, 0)
            });
            assert_eq!(out, (v << n).to_le_bytes(), "shl {n} on {}", platform.name());
        }
    }
}

#[test]
fn funnel_windows_extract_bit_runs() {
    let p = Platform::avr();
    let lo = 0xdead_beefu32;
    let hi = 0x0123_4567u32;
    for n in [6u32, 15, 21, 27] {
        let mut state = Vec::new();
        state.extend_from_slice(&lo.to_le_bytes());
        state.extend_from_slice(&hi.to_le_bytes());
        state.extend_from_slice(&[0; 4]);
        let out = run_permutation(&p, &state, |cg, ptr| {
            let a = cg.data(32)?;
            let b = cg.data(32)?;
            let d = cg.data(32)?;
            cg.ld(&a, ptr, 0)?;
            cg.ld(&b, ptr, 4)?;
            cg.funnel_shr(&d, &a, &b, n)?;
            cg.st(&d, ptr, 8)
        });
        let expect = ((lo >> n) | (hi << (32 - n))) as u32;
        assert_eq!(&out[8..12], &expect.to_le_bytes(), "window {n}");
    }
}

#[test]
fn counter_loops_run_to_zero() {
    let p = Platform::avr();
    let out = run_permutation(&p, &[0u8, 5], |cg, ptr| {
        let acc = cg.data(8)?;
        let n = cg.allocate(8, &[RegFlags::DATA | RegFlags::TWO_ADDRESS])?;
        cg.ld(&acc, ptr, 0)?;
        cg.ld(&n, ptr, 1)?;
        let lp = cg.count_loop(&n)?;
        cg.add_imm(&acc, 3)?;
        cg.end_count_loop(lp, &n)?;
        cg.st(&acc, ptr, 0)
    });
    assert_eq!(out[0], 15);
}

#[test]
fn subroutine_calls_return_in_order() {
    let p = Platform::arm();
    let out = run_permutation(&p, &7u32.to_le_bytes(), |cg, ptr| {
        let x = cg.data(32)?;
        cg.ld(&x, ptr, 0)?;
        let double = cg.new_label();
        let done = cg.new_label();
        cg.call(double)?;
        cg.call(double)?;
        cg.st(&x, ptr, 0)?;
        cg.branch(Opcode::B, done)?;
        cg.bind(double)?;
        cg.add(&x, &x)?;
        cg.sub_ret()?;
        cg.bind(done)
    });
    assert_eq!(out, 28u32.to_le_bytes());
}

#[test]
fn compares_drive_signed_and_unsigned_branches() {
    let p = Platform::avr();
    // state: a, b, out_lt_u, out_lt_s
    let cases = [
        (0x05u8, 0x80u8, 1u8, 0u8),
        (0x80, 0x05, 0, 1),
        (0x05, 0x05, 0, 0),
    ];
    for (a, b, ltu, lts) in cases {
        let out = run_permutation(&p, &[a, b, 0xff, 0xff], |cg, ptr| {
            let x = cg.data(8)?;
            let y = cg.data(8)?;
            let r = cg.allocate(8, &[RegFlags::DATA | RegFlags::TWO_ADDRESS])?;
            cg.ld(&x, ptr, 0)?;
            cg.ld(&y, ptr, 1)?;

            for (cond, slot) in [(Opcode::Bltu, 2u32), (Opcode::Blt, 3)] {
                let yes = cg.new_label();
                let done = cg.new_label();
                cg.cmp(&x, &y)?;
                cg.branch(cond, yes)?;
                cg.move_imm(&r, 0)?;
                cg.branch(Opcode::B, done)?;
                cg.bind(yes)?;
                cg.move_imm(&r, 1)?;
                cg.bind(done)?;
                cg.st(&r, ptr, slot)?;
            }
            Ok(())
        });
        assert_eq!(out[2], ltu, "unsigned {a:#x} < {b:#x}");
        assert_eq!(out[3], lts, "signed {a:#x} < {b:#x}");
    }
}

#[test]
fn masked_bic_xor_preserves_the_share_sum() {
    let p = Platform::arm();
    let xs = [0x1234_5678u32, 0x9abc_def0];
    let ys = [0x0f0f_0f0fu32, 0x1122_3344];
    let zs = [0xaaaa_5555u32, 0x8765_4321];
    let mut state = Vec::new();
    for v in xs.iter().chain(&ys).chain(&zs) {
        state.extend_from_slice(&v.to_le_bytes());
    }

    let out = run_permutation(&p, &state, |cg, ptr| {
        let mut load = |cg: &mut CodeGen, off: u32| -> Result<Reg> {
            let r = cg.data(32)?;
            cg.ld(&r, ptr, off)?;
            Ok(r)
        };
        let x0 = load(cg, 0)?;
        let x1 = load(cg, 4)?;
        let y0 = load(cg, 8)?;
        let y1 = load(cg, 12)?;
        let z0 = load(cg, 16)?;
        let z1 = load(cg, 20)?;
        let scratch = cg.data(32)?;
        let x = Shares::new(vec![x0.clone(), x1.clone()])?;
        let y = Shares::new(vec![y0, y1])?;
        let z = Shares::new(vec![z0, z1])?;
        cg.masked_bic_xor(&x, &y, &z, &scratch)?;
        cg.st(&x0, ptr, 0)?;
        cg.st(&x1, ptr, 4)
    });

    let got_x0 = u32::from_le_bytes(out[0..4].try_into().unwrap());
    let got_x1 = u32::from_le_bytes(out[4..8].try_into().unwrap());
    let x = xs[0] ^ xs[1];
    let y = ys[0] ^ ys[1];
    let z = zs[0] ^ zs[1];
    assert_eq!(got_x0 ^ got_x1, x ^ (!y & z));
}

#[test]
fn stack_arguments_load_through_ldarg() {
    let p = Platform::avr();
    let mut cg = CodeGen::new(&p);
    let types = [ArgType::Ptr; 5];
    let mut args = cg.bind_args("fixture_many", &types).unwrap();
    // The fifth pointer overflowed to the stack.
    let src = args.pop().unwrap();
    assert!(src.limb(0).flags().contains(RegFlags::ADDRESS));
    let b = cg.data(8).unwrap();
    cg.ld(&b, &src, 0).unwrap();
    let dst = cg.to_addr_granting(args.remove(0)).unwrap();
    cg.st(&b, &dst, 0).unwrap();
    let func = cg.finish().unwrap();

    let mut vm = Interpreter::new(&p);
    vm.memory_mut()[0x6000] = 0xab;
    vm.exec(
        &func,
        &types,
        &[0x6100, 0x6200, 0x6300, 0x6400, 0x6000],
    )
    .unwrap();
    assert_eq!(vm.memory()[0x6100], 0xab);
}

#[test]
fn negation_works_across_limbs() {
    let p = Platform::avr();
    let v = 0x0012_3400u32;
    let out = run_permutation(&p, &v.to_le_bytes(), |cg, ptr| {
        let x = cg.data(32)?;
        cg.ld(&x, ptr, 0)?;
        cg.neg(&x)?;
        cg.st(&x, ptr, 0)
    });
    assert_eq!(out, v.wrapping_neg().to_le_bytes());
}

#[test]
fn preoffset_tables_read_from_the_middle() {
    let p = Platform::avr();
    let table: Vec<u8> = (0..32u8).map(|b| b.wrapping_mul(7)).collect();
    let mut cg = CodeGen::new(&p);
    let ptr = cg.begin_permutation("fixture_tab", 0).unwrap();
    let idx = cg.sbox_add(&table).unwrap();
    cg.sbox_setup_at(idx, 8).unwrap();
    let b = cg.data(8).unwrap();
    cg.sbox_lookup_next(&b).unwrap();
    cg.st(&b, &ptr, 0).unwrap();
    cg.sbox_lookup_next(&b).unwrap();
    cg.st(&b, &ptr, 1).unwrap();
    cg.sbox_cleanup().unwrap();
    let func = cg.finish().unwrap();

    let mut state = [0u8; 2];
    let mut vm = Interpreter::new(&p);
    vm.exec_permutation(&func, &mut state).unwrap();
    assert_eq!(state, [table[8], table[9]]);
}

#[test]
fn fused_branches_compare_against_zero() {
    // The 32-on-64 record has the fused form; the plain 32-bit target
    // falls back to compare-plus-branch.
    let p64 = Platform::arm64();
    let mut cg = CodeGen::new(&p64);
    cg.begin_function("fixture_cb").unwrap();
    let r = cg.data(32).unwrap();
    let l = cg.new_label();
    cg.branch_if_nonzero(&r, l).unwrap();
    cg.bind(l).unwrap();
    assert!(cg.insns().iter().any(|i| i.op() == Opcode::Cbne));

    let p = Platform::arm();
    let out = run_permutation(&p, &[3, 0], |cg, ptr| {
        let x = cg.data(32)?;
        let n = cg.data(32)?;
        cg.ld(&x, ptr, 0)?;
        cg.move_imm(&n, 0)?;
        let top = cg.new_label();
        cg.bind(top)?;
        cg.add_imm(&n, 1)?;
        cg.sub_imm(&x, 1)?;
        cg.branch_if_nonzero(&x, top)?;
        cg.st(&n, ptr, 0)
    });
    assert_eq!(out[0], 3);
}

#[test]
fn three_share_masking_preserves_the_sum() {
    let p = Platform::arm();
    let xs = [0x0101_0101u32, 0x2222_2222, 0x0f0f_0f0f];
    let ys = [0x1111_1111u32, 0x3333_3333, 0x5555_5555];
    let zs = [0x0123_4567u32, 0x89ab_cdef, 0xfedc_ba98];
    let mut state = Vec::new();
    for v in xs.iter().chain(&ys).chain(&zs) {
        state.extend_from_slice(&v.to_le_bytes());
    }

    let out = run_permutation(&p, &state, |cg, ptr| {
        let mut regs = Vec::new();
        for i in 0..9u32 {
            let r = cg.data(32)?;
            cg.ld(&r, ptr, 4 * i)?;
            regs.push(r);
        }
        let scratch = cg.data(32)?;
        let z = Shares::new(regs.split_off(6))?;
        let y = Shares::new(regs.split_off(3))?;
        let x = Shares::new(regs)?;
        cg.masked_bic_xor(&x, &y, &z, &scratch)?;
        for i in 0..3u32 {
            cg.st(x.share(i as usize), ptr, 4 * i)?;
        }
        Ok(())
    });

    let got = (0..3)
        .map(|i| u32::from_le_bytes(out[4 * i..4 * i + 4].try_into().unwrap()))
        .fold(0, |a, v| a ^ v);
    let x = xs.iter().fold(0, |a, v| a ^ v);
    let y = ys.iter().fold(0, |a, v| a ^ v);
    let z = zs.iter().fold(0, |a, v| a ^ v);
    assert_eq!(got, x ^ (!y & z));
}

#[test]
fn masked_prologue_binds_state_and_randomness() {
    let p = Platform::arm();
    let mut cg = CodeGen::new(&p);
    let (state, rand, scratch) = cg.begin_masked_permutation("fixture_masked", 0).unwrap();
    // Fold one word of preserved randomness into the first share.
    let w = cg.data(32).unwrap();
    cg.ld(&w, &state, 0).unwrap();
    cg.ld(&scratch, &rand, 0).unwrap();
    cg.xor(&w, &scratch).unwrap();
    cg.st(&w, &state, 0).unwrap();
    let func = cg.finish().unwrap();

    let mut vm = Interpreter::new(&p);
    let mut st = vec![0x11u8; 16];
    let mut rnd = vec![0x22u8; 8];
    vm.exec_masked_permutation(&func, &mut st, &mut rnd).unwrap();
    assert_eq!(st[0], 0x33);
    assert_eq!(&st[1..], &[0x11u8; 15][..]);
    assert_eq!(rnd, vec![0x22u8; 8]);
}

#[test]
fn interpreter_reports_bad_memory_instead_of_crashing() {
    let p = Platform::arm();
    let mut cg = CodeGen::new(&p);
    let ptr = cg.begin_permutation("fixture_oob", 0).unwrap();
    let b = cg.data(32).unwrap();
    cg.ld(&b, &ptr, 0).unwrap();
    cg.st(&b, &ptr, 0).unwrap();
    let func = cg.finish().unwrap();

    let mut vm = Interpreter::new(&p);
    let err = vm.exec(&func, &[ArgType::Ptr], &[0xff_ffff]);
    assert!(matches!(err, Err(Error::Interp(_))));
}
