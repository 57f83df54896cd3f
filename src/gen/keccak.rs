//! Keccak-p permutation generators
//!
//! One generator covers the 200-, 400- and 1600-bit widths: lanes are
//! virtual registers of the lane width, the scratch plane for the
//! rho-pi step lives in the frame, and the round constants are walked
//! sequentially out of an embedded table.

use crate::codegen::CodeGen;
use crate::error::Result;
use crate::kat;
use crate::platform::Platform;
use crate::reg::RegFlags;
use crate::registry::Registration;

/// Rotation offsets, indexed `[x][y]`.
const RHO: [[u32; 5]; 5] = [
    [0, 36, 3, 41, 18],
    [1, 44, 10, 45, 2],
    [62, 6, 43, 15, 61],
    [28, 55, 21, 56, 14],
    [27, 20, 39, 8, 56],
];

/// Round constants for the widest lane; narrower lanes truncate.
const RC: [u64; 24] = [
    0x0000000000000001,
    0x0000000000008082,
    0x800000000000808a,
    0x8000000080008000,
    0x000000000000808b,
    0x0000000080000001,
    0x8000000080008081,
    0x8000000000008009,
    0x000000000000008a,
    0x0000000000000088,
    0x0000000080008009,
    0x000000008000000a,
    0x000000008000808b,
    0x800000000000008b,
    0x8000000000008089,
    0x8000000000008003,
    0x8000000000008002,
    0x8000000000000080,
    0x000000000000800a,
    0x800000008000000a,
    0x8000000080008081,
    0x8000000000008080,
    0x0000000080000001,
    0x8000000080008008,
];

/// Number of rounds of Keccak-f for a lane of `bits`: `12 + 2*l`.
pub const fn rounds_for(lane_bits: u32) -> u32 {
    12 + 2 * lane_bits.trailing_zeros()
}

fn lane_off(x: usize, y: usize, lane_bytes: u32) -> u32 {
    (x + 5 * y) as u32 * lane_bytes
}

/// Generate `keccakp_<width>_permute` for the given lane width.
pub fn generate(cg: &mut CodeGen, lane_bits: u32) -> Result<()> {
    let lane_bytes = lane_bits / 8;
    let rounds = rounds_for(lane_bits);
    let name = match lane_bits {
        8 => "keccakp_200_permute",
        16 => "keccakp_400_permute",
        _ => "keccakp_1600_permute",
    };
    let state = cg.begin_permutation(name, 25 * lane_bytes)?;
    let frame = cg.local_base();

    // Round-constant table, one truncated little-endian lane per round.
    let mut table = Vec::with_capacity((rounds * lane_bytes) as usize);
    for rc in RC.iter().take(rounds as usize) {
        table.extend_from_slice(&rc.to_le_bytes()[..lane_bytes as usize]);
    }
    let tab = cg.sbox_add(&table)?;
    cg.sbox_setup(tab)?;

    let mut acc = cg.data(lane_bits)?;
    let mut lane2 = cg.data(lane_bits)?;
    let tmp = cg.temporary(cg.alloc_size().bits())?;
    let counter = cg.allocate(8, &[RegFlags::DATA | RegFlags::TWO_ADDRESS, RegFlags::DATA])?;
    cg.move_imm(&counter, rounds as u64)?;

    let lp = cg.count_loop(&counter)?;

    // theta: column parities into the frame.
    for x in 0..5 {
        cg.ld(&acc, &state, lane_off(x, 0, lane_bytes))?;
        for y in 1..5 {
            cg.xor_from_mem(&acc, &state, lane_off(x, y, lane_bytes), &tmp)?;
        }
        cg.st(&acc, &frame, x as u32 * lane_bytes)?;
    }
    // theta: fold D[x] = C[x-1] ^ rol(C[x+1], 1) into every column.
    for x in 0..5 {
        cg.ld(&acc, &frame, ((x + 1) % 5) as u32 * lane_bytes)?;
        cg.rol(&mut acc, 1)?;
        cg.xor_from_mem(&acc, &frame, ((x + 4) % 5) as u32 * lane_bytes, &tmp)?;
        for y in 0..5 {
            cg.xor_to_mem(&acc, &state, lane_off(x, y, lane_bytes), &tmp)?;
        }
    }

    // rho and pi: rotate each lane and scatter it into the scratch plane.
    for x in 0..5 {
        for y in 0..5 {
            cg.ld(&acc, &state, lane_off(x, y, lane_bytes))?;
            cg.rol(&mut acc, RHO[x][y] % lane_bits)?;
            cg.st(&acc, &frame, lane_off(y, (2 * x + 3 * y) % 5, lane_bytes))?;
        }
    }

    // chi: A[x] = B[x] ^ (~B[x+1] & B[x+2]), row by row out of the plane.
    for y in 0..5 {
        for x in 0..5 {
            cg.ld(&acc, &frame, lane_off((x + 1) % 5, y, lane_bytes))?;
            cg.lognot(&acc)?;
            cg.ld(&lane2, &frame, lane_off((x + 2) % 5, y, lane_bytes))?;
            cg.logand(&acc, &lane2)?;
            cg.xor_from_mem(&acc, &frame, lane_off(x, y, lane_bytes), &tmp)?;
            cg.st(&acc, &state, lane_off(x, y, lane_bytes))?;
        }
    }

    // iota: xor the next table bytes into lane (0, 0).
    cg.ld(&acc, &state, 0)?;
    let limb_bytes = cg.alloc_size().bytes();
    for b in 0..lane_bytes {
        cg.sbox_lookup_next(&tmp)?;
        let limb = acc.limb_reg((b / limb_bytes) as usize);
        let shift = 8 * (b % limb_bytes);
        if shift > 0 {
            cg.shl(&tmp, shift)?;
        }
        cg.xor(&limb, &tmp)?;
    }
    cg.st(&acc, &state, 0)?;

    cg.end_count_loop(lp, &counter)?;
    cg.sbox_cleanup()?;
    Ok(())
}

fn build_200(cg: &mut CodeGen) -> Result<()> {
    generate(cg, 8)
}

fn build_400(cg: &mut CodeGen) -> Result<()> {
    generate(cg, 16)
}

fn build_1600(cg: &mut CodeGen) -> Result<()> {
    generate(cg, 64)
}

/// Host-side reference permutation, generic over the lane width.
pub fn reference(state: &mut [u64; 25], lane_bits: u32) {
    let mask = if lane_bits == 64 {
        u64::MAX
    } else {
        (1u64 << lane_bits) - 1
    };
    let rol = |v: u64, n: u32| -> u64 {
        let n = n % lane_bits;
        if n == 0 {
            v & mask
        } else {
            ((v << n) | (v >> (lane_bits - n))) & mask
        }
    };
    for rc in RC.iter().take(rounds_for(lane_bits) as usize) {
        // theta
        let mut c = [0u64; 5];
        for (x, slot) in c.iter_mut().enumerate() {
            *slot = (0..5).fold(0, |a, y| a ^ state[x + 5 * y]);
        }
        for x in 0..5 {
            let d = c[(x + 4) % 5] ^ rol(c[(x + 1) % 5], 1);
            for y in 0..5 {
                state[x + 5 * y] ^= d;
            }
        }
        // rho + pi
        let mut b = [0u64; 25];
        for x in 0..5 {
            for y in 0..5 {
                b[y + 5 * ((2 * x + 3 * y) % 5)] = rol(state[x + 5 * y], RHO[x][y]);
            }
        }
        // chi
        for y in 0..5 {
            for x in 0..5 {
                state[x + 5 * y] =
                    b[x + 5 * y] ^ (!b[(x + 1) % 5 + 5 * y] & b[(x + 2) % 5 + 5 * y]) & mask;
            }
        }
        // iota
        state[0] ^= rc & mask;
        for lane in state.iter_mut() {
            *lane &= mask;
        }
    }
}

fn kat_width(lane_bits: u32, platform_tag: &str, func_name: &str) -> Result<()> {
    let platform = Platform::by_name(platform_tag).expect("registered platform");
    let mut cg = CodeGen::new(&platform);
    generate(&mut cg, lane_bits)?;
    let func = cg.finish()?;

    let lane_bytes = (lane_bits / 8) as usize;
    let state_len = 25 * lane_bytes;
    let input: Vec<u8> = (0..state_len as u8).collect();

    let mut lanes = [0u64; 25];
    for (i, lane) in lanes.iter_mut().enumerate() {
        for b in 0..lane_bytes {
            *lane |= (input[i * lane_bytes + b] as u64) << (8 * b);
        }
    }
    reference(&mut lanes, lane_bits);
    let mut expected = vec![0u8; state_len];
    for (i, lane) in lanes.iter().enumerate() {
        for b in 0..lane_bytes {
            expected[i * lane_bytes + b] = (lane >> (8 * b)) as u8;
        }
    }
    kat::check_permutation(&platform, &func, func_name, &input, &expected)
}

fn kat_200() -> Result<()> {
    kat_width(8, "avr", "keccakp_200_permute")
}

fn kat_400() -> Result<()> {
    kat_width(16, "avr", "keccakp_400_permute")
}

fn kat_1600() -> Result<()> {
    kat_width(64, "arm", "keccakp_1600_permute")
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            name: "keccak-p",
            variant: "200",
            platform: "avr",
            func_name: "keccakp_200_permute",
            build: build_200,
            kat: kat_200,
        },
        Registration {
            name: "keccak-p",
            variant: "400",
            platform: "avr",
            func_name: "keccakp_400_permute",
            build: build_400,
            kat: kat_400,
        },
        Registration {
            name: "keccak-p",
            variant: "1600",
            platform: "arm",
            func_name: "keccakp_1600_permute",
            build: build_1600,
            kat: kat_1600,
        },
    ]
}
