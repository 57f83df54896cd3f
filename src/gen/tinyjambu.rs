//! TinyJAMBU permutation generators
//!
//! The 128-bit state is four 32-bit words held in registers; each
//! 128-step block is four unrolled 32-step chunks whose word roles
//! rotate at generation time. The feedback taps are bit windows over
//! adjacent words, extracted limb by limb so the working set stays small
//! enough for the 8-bit register file. The key is stored inverted after
//! the state, which folds the NAND into a plain AND.

use crate::codegen::CodeGen;
use crate::error::Result;
use crate::insn::Opcode;
use crate::kat;
use crate::platform::Platform;
use crate::reg::{Reg, RegFlags};
use crate::registry::Registration;
use crate::vectors;

/// Copy limb `j` of the 64-bit window `(hi:lo) >> shift` into `dst`,
/// staging the upper contribution through `scratch`.
fn window_limb(
    cg: &mut CodeGen,
    dst: &Reg,
    lo: &Reg,
    hi: &Reg,
    shift: u32,
    j: usize,
    scratch: &Reg,
) -> Result<()> {
    let lb = lo.limb_size().unwrap().bits();
    let n = lo.limb_count();
    let step = (shift / lb) as usize;
    let sub = shift % lb;
    let v = |k: usize| {
        if k < n {
            lo.limb_reg(k)
        } else {
            hi.limb_reg(k - n)
        }
    };
    cg.move_reg(dst, &v(step + j))?;
    if sub > 0 {
        cg.shr(dst, sub)?;
        cg.move_reg(scratch, &v(step + j + 1))?;
        cg.shl(scratch, lb - sub)?;
        cg.logor(dst, scratch)?;
    }
    Ok(())
}

/// Generate `tinyjambu_<bits>_permute` for a key of `key_words` 32-bit
/// words (4, 6 or 8). The counter argument is the number of 128-step
/// blocks to run.
pub fn generate(cg: &mut CodeGen, key_words: usize) -> Result<()> {
    let name = match key_words {
        4 => "tinyjambu_128_permute",
        6 => "tinyjambu_192_permute",
        _ => "tinyjambu_256_permute",
    };
    let (state_ptr, count) = cg.begin_permutation_count(name, 0)?;

    let mut s: Vec<Reg> = Vec::with_capacity(4);
    for i in 0..4 {
        let w = cg.data(32)?;
        cg.ld(&w, &state_ptr, 4 * i)?;
        s.push(w);
    }

    // A pointer walks the inverted key, wrapping every `key_words`
    // words; the wrap is tracked by a small index counter.
    let kp = cg.addr_granting()?;
    cg.move_reg(&kp, &state_ptr)?;
    cg.add_imm(&kp, 16)?;
    let kidx = cg.allocate(8, &[RegFlags::DATA | RegFlags::TWO_ADDRESS, RegFlags::DATA])?;
    cg.move_imm(&kidx, 0)?;

    let limb_bits = s[0].limb_size().unwrap().bits();
    let limb_bytes = s[0].limb_size().unwrap().bytes();
    let word_limbs = s[0].limb_count();
    let u = cg.data(limb_bits)?;
    let w = cg.data(limb_bits)?;
    let x = cg.data(limb_bits)?;

    let lp = cg.count_loop(&count)?;
    for chunk in 0..4 {
        // Word roles rotate per chunk and are back in place after four,
        // so the loop body is exactly one 128-step block.
        let s0 = s[chunk % 4].clone();
        let s1 = &s[(chunk + 1) % 4];
        let s2 = &s[(chunk + 2) % 4];
        let s3 = &s[(chunk + 3) % 4];

        // feedback = s0 ^ t1 ^ (t2 & t3) ^ t4 ^ ~k, accumulated in s0,
        // which becomes the new top word.
        for j in 0..word_limbs {
            let fb = s0.limb_reg(j);
            window_limb(cg, &u, s2, s3, 6, j, &x)?;
            window_limb(cg, &w, s2, s3, 21, j, &x)?;
            cg.logand(&u, &w)?;
            cg.xor(&fb, &u)?;
            window_limb(cg, &u, s1, s2, 15, j, &x)?;
            cg.xor(&fb, &u)?;
            window_limb(cg, &u, s2, s3, 27, j, &x)?;
            cg.xor(&fb, &u)?;
            cg.ld(&u, &kp, j as u32 * limb_bytes)?;
            cg.xor(&fb, &u)?;
        }

        // Advance the key cursor, wrapping at the key length.
        cg.add_imm(&kp, 4)?;
        cg.add_imm(&kidx, 1)?;
        cg.cmp_imm(&kidx, key_words as u64)?;
        let skip = cg.new_label();
        cg.branch(Opcode::Bne, skip)?;
        cg.move_imm(&kidx, 0)?;
        cg.sub_imm(&kp, 4 * key_words as u64)?;
        cg.bind(skip)?;
    }
    cg.end_count_loop(lp, &count)?;

    for (i, word) in s.iter().enumerate() {
        cg.st(word, &state_ptr, 4 * i as u32)?;
    }
    Ok(())
}

fn build_128(cg: &mut CodeGen) -> Result<()> {
    generate(cg, 4)
}

fn build_192(cg: &mut CodeGen) -> Result<()> {
    generate(cg, 6)
}

fn build_256(cg: &mut CodeGen) -> Result<()> {
    generate(cg, 8)
}

const VECTORS: &str = include_str!("../../vectors/tinyjambu.txt");

fn kat_words(key_words: usize, func_name: &str) -> Result<()> {
    let platform = Platform::by_name("avr").expect("registered platform");
    let mut cg = CodeGen::new(&platform);
    generate(&mut cg, key_words)?;
    let func = cg.finish()?;

    let file = vectors::parse(VECTORS)?;
    for vector in file.for_function(func_name) {
        let input = vector.bytes("Input")?;
        let key = vector.bytes("Key")?;
        let expected = vector.bytes("Output")?;
        let count = vector.int("Count", 1)? as u8;

        // State layout: 16-byte state followed by the inverted key.
        let mut state: Vec<u8> = input.clone();
        state.extend(key.iter().map(|b| !b));
        let mut want = expected.clone();
        want.extend(key.iter().map(|b| !b));

        kat::check_permutation_count(&platform, &func, vector.name(), &state, count, &want)?;
    }
    Ok(())
}

fn kat_128() -> Result<()> {
    kat_words(4, "tinyjambu_128_permute")
}

fn kat_192() -> Result<()> {
    kat_words(6, "tinyjambu_192_permute")
}

fn kat_256() -> Result<()> {
    kat_words(8, "tinyjambu_256_permute")
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            name: "tinyjambu",
            variant: "128",
            platform: "avr",
            func_name: "tinyjambu_128_permute",
            build: build_128,
            kat: kat_128,
        },
        Registration {
            name: "tinyjambu",
            variant: "192",
            platform: "avr",
            func_name: "tinyjambu_192_permute",
            build: build_192,
            kat: kat_192,
        },
        Registration {
            name: "tinyjambu",
            variant: "256",
            platform: "avr",
            func_name: "tinyjambu_256_permute",
            build: build_256,
            kat: kat_256,
        },
    ]
}
