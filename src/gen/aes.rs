//! AES generators: key schedules and ECB block encryption
//!
//! The schedule image is 4 bytes of header (`rounds` and byte length,
//! both 16-bit little-endian) followed by the expanded key, initial key
//! included. Encryption keeps the sixteen state bytes in registers,
//! performs ShiftRows as a move cascade, and gets xtime branch-free from
//! the carry of a left shift.

use crate::codegen::CodeGen;
use crate::error::Result;
use crate::insn::{Insn, InsnOpts, Opcode};
use crate::kat;
use crate::platform::Platform;
use crate::reg::{Reg, RegFlags};
use crate::registry::Registration;
use crate::vectors;

const SBOX: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5, 0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab, 0x76,
    0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0, 0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4, 0x72, 0xc0,
    0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc, 0x34, 0xa5, 0xe5, 0xf1, 0x71, 0xd8, 0x31, 0x15,
    0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a, 0x07, 0x12, 0x80, 0xe2, 0xeb, 0x27, 0xb2, 0x75,
    0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0, 0x52, 0x3b, 0xd6, 0xb3, 0x29, 0xe3, 0x2f, 0x84,
    0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b, 0x6a, 0xcb, 0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf,
    0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85, 0x45, 0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8,
    0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5, 0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2,
    0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44, 0x17, 0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73,
    0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a, 0x90, 0x88, 0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb,
    0xe0, 0x32, 0x3a, 0x0a, 0x49, 0x06, 0x24, 0x5c, 0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79,
    0xe7, 0xc8, 0x37, 0x6d, 0x8d, 0xd5, 0x4e, 0xa9, 0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08,
    0xba, 0x78, 0x25, 0x2e, 0x1c, 0xa6, 0xb4, 0xc6, 0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a,
    0x70, 0x3e, 0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e, 0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e,
    0xe1, 0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94, 0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68, 0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb, 0x16,
];

/// `r = xtime(r)`: shift out the top bit and fold `0x1b` back in from
/// the carry, with no branch.
fn xtime(cg: &mut CodeGen, r: &Reg, scratch: &Reg) -> Result<()> {
    cg.push(
        Insn::new(Opcode::Lsl)
            .with_dest(r.limb(0).clone())
            .with_src1(r.limb(0).clone())
            .with_imm(1)
            .with_opts(InsnOpts::SET_FLAGS),
    );
    cg.push(
        Insn::new(Opcode::Sbc)
            .with_dest(scratch.limb(0).clone())
            .with_src1(scratch.limb(0).clone())
            .with_src2(scratch.limb(0).clone()),
    );
    cg.and_imm(scratch, 0x1b)?;
    cg.xor(r, scratch)
}

/// Generate `aes_<bits>_init` for a key of `nk` 32-bit words (4, 6, 8).
pub fn generate_init(cg: &mut CodeGen, nk: usize) -> Result<()> {
    let name = match nk {
        4 => "aes_128_init",
        6 => "aes_192_init",
        _ => "aes_256_init",
    };
    let rounds = nk + 6;
    let sched_bytes = 16 * (rounds + 1);
    let (mut key, schedule) = cg.begin_setup_key(name)?;

    let t = cg.allocate(8, &[RegFlags::DATA | RegFlags::TWO_ADDRESS, RegFlags::DATA])?;
    // Header: rounds and schedule length, 16-bit little-endian each.
    for (off, byte) in [
        (0u32, rounds as u64),
        (1, 0),
        (2, (sched_bytes & 0xff) as u64),
        (3, (sched_bytes >> 8) as u64),
    ] {
        cg.move_imm(&t, byte)?;
        cg.st(&t, &schedule, off)?;
    }
    // The initial key is the front of the schedule.
    for i in 0..4 * nk as u32 {
        cg.ld(&t, &key, i)?;
        cg.st(&t, &schedule, 4 + i)?;
    }
    cg.release(&mut key);
    cg.add_imm(&schedule, 4)?;

    let tab = cg.sbox_add(&SBOX)?;
    cg.sbox_setup(tab)?;

    // The previous word rides in registers; the schedule pointer stays
    // on w[i - nk] so both taps are short displacements.
    let mut w: Vec<Reg> = Vec::with_capacity(4);
    for j in 0..4 {
        let b = cg.data(8)?;
        cg.ld(&b, &schedule, (4 * nk - 4 + j) as u32)?;
        w.push(b);
    }
    let rc = cg.allocate(8, &[RegFlags::DATA | RegFlags::TWO_ADDRESS, RegFlags::DATA])?;
    cg.move_imm(&rc, 1)?;

    for i in nk..4 * (rounds + 1) {
        if i % nk == 0 {
            w.rotate_left(1);
            for b in &w {
                cg.sbox_lookup(b, b)?;
            }
            cg.xor(&w[0], &rc)?;
            xtime(cg, &rc, &t)?;
        } else if nk == 8 && i % 8 == 4 {
            for b in &w {
                cg.sbox_lookup(b, b)?;
            }
        }
        for (j, b) in w.iter().enumerate() {
            cg.ld(&t, &schedule, j as u32)?;
            cg.xor(b, &t)?;
        }
        for (j, b) in w.iter().enumerate() {
            cg.st(b, &schedule, (4 * nk + j) as u32)?;
        }
        cg.add_imm(&schedule, 4)?;
    }
    cg.sbox_cleanup()?;
    Ok(())
}

/// ShiftRows as move cascades over the register-resident state
/// (column-major layout: byte (row, col) at `4*col + row`).
fn shift_rows(cg: &mut CodeGen, s: &[Reg], t: &Reg) -> Result<()> {
    let mv = |cg: &mut CodeGen, d: &Reg, src: &Reg| cg.move_reg(d, src);
    // Row 1 rotates left by one.
    mv(cg, t, &s[1])?;
    mv(cg, &s[1], &s[5])?;
    mv(cg, &s[5], &s[9])?;
    mv(cg, &s[9], &s[13])?;
    mv(cg, &s[13], t)?;
    // Row 2 swaps opposite columns.
    mv(cg, t, &s[2])?;
    mv(cg, &s[2], &s[10])?;
    mv(cg, &s[10], t)?;
    mv(cg, t, &s[6])?;
    mv(cg, &s[6], &s[14])?;
    mv(cg, &s[14], t)?;
    // Row 3 rotates right by one.
    mv(cg, t, &s[3])?;
    mv(cg, &s[3], &s[15])?;
    mv(cg, &s[15], &s[11])?;
    mv(cg, &s[11], &s[7])?;
    mv(cg, &s[7], t)?;
    Ok(())
}

fn mix_columns(cg: &mut CodeGen, col: &[Reg], tt: &Reg, u: &Reg, v: &Reg, w: &Reg) -> Result<()> {
    cg.move_reg(tt, &col[0])?;
    cg.xor(tt, &col[1])?;
    cg.xor(tt, &col[2])?;
    cg.xor(tt, &col[3])?;
    cg.move_reg(u, &col[0])?;
    for j in 0..4 {
        cg.move_reg(v, &col[j])?;
        if j < 3 {
            cg.xor(v, &col[j + 1])?;
        } else {
            cg.xor(v, u)?;
        }
        xtime(cg, v, w)?;
        cg.xor(&col[j], v)?;
        cg.xor(&col[j], tt)?;
    }
    Ok(())
}

/// Generate `aes_ecb_encrypt`: one block through a prepared schedule.
pub fn generate_encrypt(cg: &mut CodeGen) -> Result<()> {
    let (schedule, mut input, output_raw) = cg.begin_encrypt_block("aes_ecb_encrypt")?;

    // Middle-round count from the header.
    let counter = cg.allocate(8, &[RegFlags::DATA | RegFlags::TWO_ADDRESS, RegFlags::DATA])?;
    cg.ld(&counter, &schedule, 0)?;
    cg.sub_imm(&counter, 1)?;
    cg.add_imm(&schedule, 4)?;

    let mut s: Vec<Reg> = Vec::with_capacity(16);
    for j in 0..16 {
        let b = cg.data(8)?;
        cg.ld(&b, &input, j)?;
        s.push(b);
    }
    cg.release(&mut input);
    let output = cg.to_addr(output_raw)?;

    let tab = cg.sbox_add(&SBOX)?;
    cg.sbox_setup(tab)?;

    let tt = cg.data(8)?;
    let u = cg.data(8)?;
    let v = cg.data(8)?;
    let w = cg.allocate(8, &[RegFlags::DATA | RegFlags::TWO_ADDRESS, RegFlags::DATA])?;

    let ark = |cg: &mut CodeGen, s: &[Reg], t: &Reg| -> Result<()> {
        for (j, b) in s.iter().enumerate() {
            cg.ld(t, &schedule, j as u32)?;
            cg.xor(b, t)?;
        }
        Ok(())
    };

    ark(cg, &s, &v)?;
    cg.add_imm(&schedule, 16)?;

    let lp = cg.count_loop(&counter)?;
    for b in &s {
        cg.sbox_lookup(b, b)?;
    }
    shift_rows(cg, &s, &v)?;
    for c in 0..4 {
        mix_columns(cg, &s[4 * c..4 * c + 4], &tt, &u, &v, &w)?;
    }
    ark(cg, &s, &v)?;
    cg.add_imm(&schedule, 16)?;
    cg.end_count_loop(lp, &counter)?;

    for b in &s {
        cg.sbox_lookup(b, b)?;
    }
    shift_rows(cg, &s, &v)?;
    ark(cg, &s, &v)?;

    for (j, b) in s.iter().enumerate() {
        cg.st(b, &output, j as u32)?;
    }
    cg.sbox_cleanup()?;
    Ok(())
}

fn build_128(cg: &mut CodeGen) -> Result<()> {
    generate_init(cg, 4)
}

fn build_192(cg: &mut CodeGen) -> Result<()> {
    generate_init(cg, 6)
}

fn build_256(cg: &mut CodeGen) -> Result<()> {
    generate_init(cg, 8)
}

fn build_encrypt(cg: &mut CodeGen) -> Result<()> {
    generate_encrypt(cg)
}

/// Host-side schedule expansion matching the emitted image.
pub fn reference_schedule(key: &[u8]) -> Vec<u8> {
    let nk = key.len() / 4;
    let rounds = nk + 6;
    let sched_bytes = 16 * (rounds + 1);
    let mut out = vec![
        rounds as u8,
        0,
        (sched_bytes & 0xff) as u8,
        (sched_bytes >> 8) as u8,
    ];
    let mut words: Vec<[u8; 4]> = key.chunks(4).map(|c| [c[0], c[1], c[2], c[3]]).collect();
    let mut rc = 1u8;
    for i in nk..4 * (rounds + 1) {
        let mut t = words[i - 1];
        if i % nk == 0 {
            t.rotate_left(1);
            for b in &mut t {
                *b = SBOX[*b as usize];
            }
            t[0] ^= rc;
            rc = (rc << 1) ^ if rc & 0x80 != 0 { 0x1b } else { 0 };
        } else if nk == 8 && i % 8 == 4 {
            for b in &mut t {
                *b = SBOX[*b as usize];
            }
        }
        let prev = words[i - nk];
        words.push([t[0] ^ prev[0], t[1] ^ prev[1], t[2] ^ prev[2], t[3] ^ prev[3]]);
    }
    for w in words {
        out.extend_from_slice(&w);
    }
    out
}

const VECTORS: &str = include_str!("../../vectors/aes.txt");

fn kat_init(nk: usize, func_name: &str) -> Result<()> {
    let platform = Platform::by_name("avr").expect("registered platform");
    let mut cg = CodeGen::new(&platform);
    generate_init(&mut cg, nk)?;
    let func = cg.finish()?;

    let file = vectors::parse(VECTORS)?;
    for vector in file.for_function(func_name) {
        let key = vector.bytes("Key")?;
        let expected = reference_schedule(&key);
        kat::check_setup_key(&platform, &func, vector.name(), &key, &expected)?;
    }
    Ok(())
}

fn kat_128() -> Result<()> {
    kat_init(4, "aes_128_init")
}

fn kat_192() -> Result<()> {
    kat_init(6, "aes_192_init")
}

fn kat_256() -> Result<()> {
    kat_init(8, "aes_256_init")
}

fn kat_encrypt() -> Result<()> {
    let platform = Platform::by_name("avr").expect("registered platform");
    let mut cg = CodeGen::new(&platform);
    generate_encrypt(&mut cg)?;
    let encrypt = cg.finish()?;

    let file = vectors::parse(VECTORS)?;
    for vector in file.for_function("aes_ecb_encrypt") {
        let key = vector.bytes("Key")?;
        let plaintext = vector.bytes("Plaintext")?;
        let expected = vector.bytes("Ciphertext")?;

        // The block runs under the schedule the generated init produces.
        let mut init_cg = CodeGen::new(&platform);
        generate_init(&mut init_cg, key.len() / 4)?;
        let init = init_cg.finish()?;
        let mut schedule = vec![0u8; reference_schedule(&key).len()];
        let mut vm = crate::interp::Interpreter::new(&platform);
        vm.exec_setup_key(&init, &key, &mut schedule)?;

        kat::check_encrypt_block(&platform, &encrypt, vector.name(), &schedule, &plaintext, &expected)?;
    }
    Ok(())
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            name: "aes",
            variant: "128-init",
            platform: "avr",
            func_name: "aes_128_init",
            build: build_128,
            kat: kat_128,
        },
        Registration {
            name: "aes",
            variant: "192-init",
            platform: "avr",
            func_name: "aes_192_init",
            build: build_192,
            kat: kat_192,
        },
        Registration {
            name: "aes",
            variant: "256-init",
            platform: "avr",
            func_name: "aes_256_init",
            build: build_256,
            kat: kat_256,
        },
        Registration {
            name: "aes",
            variant: "ecb",
            platform: "avr",
            func_name: "aes_ecb_encrypt",
            build: build_encrypt,
            kat: kat_encrypt,
        },
    ]
}
