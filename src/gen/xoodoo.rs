//! Xoodoo permutation generator
//!
//! Twelve 32-bit lanes stay register-resident for all twelve rounds;
//! plane translations are renamings at generation time, the theta
//! parities pass through the frame, and the state pointer itself is
//! spilled for the round body so its register can serve as the second
//! chi scratch.

use crate::codegen::CodeGen;
use crate::error::Result;
use crate::insn::{Opcode, ShiftOp};
use crate::kat;
use crate::platform::Platform;
use crate::reg::Reg;
use crate::registry::Registration;

const RC: [u32; 12] = [
    0x0000_0058, 0x0000_0038, 0x0000_03c0, 0x0000_00d0, 0x0000_0120, 0x0000_0014,
    0x0000_0060, 0x0000_002c, 0x0000_0380, 0x0000_00f0, 0x0000_01a0, 0x0000_0012,
];

fn rot_lane(cg: &mut CodeGen, lane: &Reg, ror: u32) -> Result<()> {
    let mut l = lane.clone();
    cg.ror(&mut l, ror)
}

/// Generate `xoodoo_permute`.
pub fn generate(cg: &mut CodeGen) -> Result<()> {
    let state = cg.begin_permutation("xoodoo_permute", 20)?;
    let frame = cg.local_base();

    let mut lanes: Vec<Reg> = Vec::with_capacity(12);
    for i in 0..12u32 {
        let l = cg.data(32)?;
        cg.ld(&l, &state, 4 * i)?;
        lanes.push(l);
    }
    // Spill the state pointer; its register is the second scratch until
    // the final stores.
    cg.st(&state, &frame, 16)?;
    let u = state.clone();
    let t = cg.temporary(32)?;

    // Plane-to-lane maps, renamed by the translation steps.
    let mut a: [[usize; 4]; 3] = [[0, 1, 2, 3], [4, 5, 6, 7], [8, 9, 10, 11]];

    for rc in RC {
        // theta: P[x] into the frame, then both rotations of P[x-1]
        // folded into every plane.
        for x in 0..4 {
            cg.move_reg(&t, &lanes[a[0][x]])?;
            cg.xor(&t, &lanes[a[1][x]])?;
            cg.xor(&t, &lanes[a[2][x]])?;
            cg.st(&t, &frame, 4 * x as u32)?;
        }
        for x in 0..4 {
            cg.ld(&t, &frame, 4 * ((x + 3) % 4) as u32)?;
            for plane in 0..3 {
                cg.op_shifted(Opcode::Xor, &lanes[a[plane][x]], &t, (ShiftOp::Ror, 27))?;
                cg.op_shifted(Opcode::Xor, &lanes[a[plane][x]], &t, (ShiftOp::Ror, 18))?;
            }
        }

        // rho west: A1 translates by one lane, A2 rotates by 11.
        a[1] = [a[1][3], a[1][0], a[1][1], a[1][2]];
        for x in 0..4 {
            rot_lane(cg, &lanes[a[2][x]], 21)?;
        }

        // iota
        let rc_lane = lanes[a[0][0]].clone();
        cg.xor_imm(&rc_lane, rc as u64)?;

        // chi
        for x in 0..4 {
            cg.move_reg(&u, &lanes[a[1][x]])?;
            cg.bic(&u, &lanes[a[0][x]])?;
            cg.st(&u, &frame, 0)?;
            cg.move_reg(&t, &lanes[a[2][x]])?;
            cg.bic(&t, &lanes[a[1][x]])?;
            cg.move_reg(&u, &lanes[a[0][x]])?;
            cg.bic(&u, &lanes[a[2][x]])?;
            cg.xor(&lanes[a[0][x]], &t)?;
            cg.xor(&lanes[a[1][x]], &u)?;
            cg.ld(&t, &frame, 0)?;
            cg.xor(&lanes[a[2][x]], &t)?;
        }

        // rho east: A1 rotates by 1, A2 translates by two lanes and
        // rotates by 8.
        for x in 0..4 {
            rot_lane(cg, &lanes[a[1][x]], 31)?;
        }
        a[2] = [a[2][2], a[2][3], a[2][0], a[2][1]];
        for x in 0..4 {
            rot_lane(cg, &lanes[a[2][x]], 24)?;
        }
    }

    cg.ld(&state, &frame, 16)?;
    for (plane, row) in a.iter().enumerate() {
        for (x, &lane) in row.iter().enumerate() {
            cg.st(&lanes[lane], &state, 4 * (4 * plane + x) as u32)?;
        }
    }
    Ok(())
}

fn build(cg: &mut CodeGen) -> Result<()> {
    generate(cg)
}

/// Host-side reference permutation.
pub fn reference(state: &mut [u32; 12]) {
    for rc in RC {
        let mut p = [0u32; 4];
        for (x, slot) in p.iter_mut().enumerate() {
            *slot = state[x] ^ state[4 + x] ^ state[8 + x];
        }
        for x in 0..4 {
            let e = p[(x + 3) % 4].rotate_left(5) ^ p[(x + 3) % 4].rotate_left(14);
            state[x] ^= e;
            state[4 + x] ^= e;
            state[8 + x] ^= e;
        }
        let a1 = [state[7], state[4], state[5], state[6]];
        state[4..8].copy_from_slice(&a1);
        for x in 0..4 {
            state[8 + x] = state[8 + x].rotate_left(11);
        }
        state[0] ^= rc;
        for x in 0..4 {
            let b0 = !state[4 + x] & state[8 + x];
            let b1 = !state[8 + x] & state[x];
            let b2 = !state[x] & state[4 + x];
            state[x] ^= b0;
            state[4 + x] ^= b1;
            state[8 + x] ^= b2;
        }
        for x in 0..4 {
            state[4 + x] = state[4 + x].rotate_left(1);
        }
        let a2 = [
            state[8 + 2].rotate_left(8),
            state[8 + 3].rotate_left(8),
            state[8].rotate_left(8),
            state[8 + 1].rotate_left(8),
        ];
        state[8..12].copy_from_slice(&a2);
    }
}

fn kat() -> Result<()> {
    let platform = Platform::by_name("arm").expect("registered platform");
    let mut cg = CodeGen::new(&platform);
    generate(&mut cg)?;
    let func = cg.finish()?;

    let input: Vec<u8> = (0..48u8).collect();
    let mut lanes = [0u32; 12];
    for (i, lane) in lanes.iter_mut().enumerate() {
        *lane = u32::from_le_bytes([
            input[4 * i],
            input[4 * i + 1],
            input[4 * i + 2],
            input[4 * i + 3],
        ]);
    }
    reference(&mut lanes);
    let mut expected = Vec::with_capacity(48);
    for lane in lanes {
        expected.extend_from_slice(&lane.to_le_bytes());
    }
    kat::check_permutation(&platform, &func, "xoodoo_permute", &input, &expected)
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![Registration {
        name: "xoodoo",
        variant: "",
        platform: "arm",
        func_name: "xoodoo_permute",
        build,
        kat,
    }]
}
