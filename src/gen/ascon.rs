//! ASCON permutation generator
//!
//! The 320-bit state is five 64-bit words stored big-endian. The
//! substitution layer is bit-parallel, so it runs one byte column at a
//! time across the five words; the linear layer works word by word with
//! two rotated copies reloaded from memory. The round counter argument
//! selects `p^count`, with the first round constant derived from it.

use crate::codegen::CodeGen;
use crate::error::Result;
use crate::kat;
use crate::platform::Platform;
use crate::reg::{Reg, RegFlags};
use crate::registry::Registration;

/// Rotation pairs of the linear layer, per word.
const LINEAR: [(u32, u32); 5] = [(19, 28), (61, 39), (1, 6), (10, 17), (7, 41)];

/// Generate `ascon_permute`; the counter argument is the round count,
/// at most twelve.
pub fn generate(cg: &mut CodeGen) -> Result<()> {
    let (state, count) = cg.begin_permutation_count("ascon_permute", 0)?;

    // First round constant: 0xf0 - 15 * (12 - count) = 15 * count + 60.
    let cr = cg.allocate(8, &[RegFlags::DATA | RegFlags::TWO_ADDRESS, RegFlags::DATA])?;
    {
        let scratch = cg.data(8)?;
        let mut scratch = scratch;
        cg.move_reg(&cr, &count)?;
        cg.shl(&cr, 4)?;
        cg.move_reg(&scratch, &count)?;
        cg.sub(&cr, &scratch)?;
        cg.add_imm(&cr, 60)?;
        cg.release(&mut scratch);
    }

    let lp = cg.count_loop(&count)?;

    // Round constant into the low byte of x2 (offset 23 big-endian).
    {
        let b = cg.data(8)?;
        let mut b = b;
        cg.ld(&b, &state, 23)?;
        cg.xor(&b, &cr)?;
        cg.st(&b, &state, 23)?;
        cg.release(&mut b);
    }

    // Substitution layer, one byte column at a time.
    {
        let mut b: Vec<Reg> = (0..5).map(|_| cg.data(8)).collect::<Result<_>>()?;
        let mut t: Vec<Reg> = (0..5).map(|_| cg.data(8)).collect::<Result<_>>()?;
        for j in 0..8u32 {
            for (i, reg) in b.iter().enumerate() {
                cg.ld(reg, &state, 8 * i as u32 + j)?;
            }
            cg.xor(&b[0], &b[4])?;
            cg.xor(&b[4], &b[3])?;
            cg.xor(&b[2], &b[1])?;
            for i in 0..5 {
                cg.move_reg(&t[i], &b[i])?;
                cg.lognot(&t[i])?;
                cg.logand(&t[i], &b[(i + 1) % 5])?;
            }
            for i in 0..5 {
                cg.xor(&b[i], &t[(i + 1) % 5])?;
            }
            cg.xor(&b[1], &b[0])?;
            cg.xor(&b[0], &b[4])?;
            cg.xor(&b[3], &b[2])?;
            cg.lognot(&b[2])?;
            for (i, reg) in b.iter().enumerate() {
                cg.st(reg, &state, 8 * i as u32 + j)?;
            }
        }
        for r in b.iter_mut().chain(t.iter_mut()) {
            cg.release(r);
        }
    }

    // Linear layer: w ^= ror(w, n1) ^ ror(w, n2), word by word, with the
    // rotated copies reloaded from the still-unwritten memory word.
    {
        let w = cg.data(64)?;
        let c = cg.data(64)?;
        let mut w = w;
        let mut c = c;
        for (i, &(n1, n2)) in LINEAR.iter().enumerate() {
            let off = 8 * i as u32;
            cg.ld(&w, &state, off)?;
            let wv = w.reversed()?;
            for &n in &[n1, n2] {
                cg.ld(&c, &state, off)?;
                let mut cv = c.reversed()?;
                cg.ror(&mut cv, n)?;
                cg.xor(&wv, &cv)?;
            }
            cg.st(&w, &state, off)?;
        }
        cg.release(&mut w);
        cg.release(&mut c);
    }

    // Next round constant.
    cg.sub_imm(&cr, 0x0f)?;
    cg.end_count_loop(lp, &count)?;
    Ok(())
}

fn build(cg: &mut CodeGen) -> Result<()> {
    generate(cg)
}

/// Host-side reference permutation of `rounds` rounds.
pub fn reference(words: &mut [u64; 5], rounds: u32) {
    for r in (12 - rounds)..12 {
        words[2] ^= (0xf0 - r as u64 * 0x10) + r as u64;
        // substitution
        words[0] ^= words[4];
        words[4] ^= words[3];
        words[2] ^= words[1];
        let mut t = [0u64; 5];
        for i in 0..5 {
            t[i] = !words[i] & words[(i + 1) % 5];
        }
        for i in 0..5 {
            words[i] ^= t[(i + 1) % 5];
        }
        words[1] ^= words[0];
        words[0] ^= words[4];
        words[3] ^= words[2];
        words[2] = !words[2];
        // diffusion
        words[0] ^= words[0].rotate_right(19) ^ words[0].rotate_right(28);
        words[1] ^= words[1].rotate_right(61) ^ words[1].rotate_right(39);
        words[2] ^= words[2].rotate_right(1) ^ words[2].rotate_right(6);
        words[3] ^= words[3].rotate_right(10) ^ words[3].rotate_right(17);
        words[4] ^= words[4].rotate_right(7) ^ words[4].rotate_right(41);
    }
}

fn kat() -> Result<()> {
    let platform = Platform::by_name("avr").expect("registered platform");
    let mut cg = CodeGen::new(&platform);
    generate(&mut cg)?;
    let func = cg.finish()?;

    for rounds in [6u8, 8, 12] {
        let mut words = [0u64; 5];
        for (i, w) in words.iter_mut().enumerate() {
            for b in 0..8 {
                *w = (*w << 8) | (8 * i + b) as u64;
            }
        }
        let input: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        reference(&mut words, rounds as u32);
        let expected: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        let label = format!("ascon_permute p{rounds}");
        let mut state = input.clone();
        let mut vm = crate::interp::Interpreter::new(&platform);
        vm.exec_permutation_count(&func, &mut state, rounds)?;
        kat::report(&label, &state, &expected)?;
    }
    Ok(())
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![Registration {
        name: "ascon",
        variant: "",
        platform: "avr",
        func_name: "ascon_permute",
        build,
        kat,
    }]
}
