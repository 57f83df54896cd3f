use gencrypto::imm;
use gencrypto::prelude::*;

use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

use std::sync::Arc;

fn byte_reg(limbs: usize) -> Reg {
    let srs: Vec<SizedReg> = (0..limbs as u8)
        .map(|n| {
            let base = Arc::new(BaseReg::new(n, RegFlags::DATA).with_name(RegSize::S8, "r"));
            SizedReg::new(base, RegSize::S8).unwrap()
        })
        .collect();
    Reg::from_limbs(srs).unwrap()
}

#[quickcheck]
fn reversed_round_trips(limbs: u8) -> TestResult {
    let limbs = (limbs % 8) as usize + 1;
    let r = byte_reg(limbs);
    TestResult::from_bool(r.reversed().unwrap().reversed().unwrap() == r)
}

#[quickcheck]
fn full_subset_is_identity(limbs: u8) -> TestResult {
    let limbs = (limbs % 8) as usize + 1;
    let r = byte_reg(limbs);
    TestResult::from_bool(r.subset(0, r.size()).unwrap() == r)
}

#[quickcheck]
fn subsets_are_half_open(limbs: u8, start: u8, len: u8) -> TestResult {
    let limbs = (limbs % 8) as usize + 1;
    let r = byte_reg(limbs);
    let start = (start as u32 % limbs as u32) * 8;
    let max = r.full_size() - start;
    let len = (len as u32 % max) + 1;
    match r.subset(start, len) {
        Ok(s) => {
            let expect_limbs = ((len + 7) / 8) as usize;
            TestResult::from_bool(
                s.limb_count() == expect_limbs
                    && s.size() == len
                    && s.limb(0).number() == (start / 8) as u8,
            )
        }
        Err(_) => TestResult::failed(),
    }
}

#[quickcheck]
fn renumbering_composes_to_identity(limbs: u8, steps: u8) -> TestResult {
    let limbs = (limbs % 8) as usize + 1;
    let r = byte_reg(limbs);
    let steps = steps as usize % limbs;
    let once = r.limbs_rotated_right(steps).unwrap();
    let back = once.limbs_rotated_right(limbs - steps).unwrap();
    TestResult::from_bool(back == r)
}

#[quickcheck]
fn rotated_imm8_matches_a_direct_search(v: u32) -> bool {
    let direct = (0..32).step_by(2).any(|r| {
        let byte = v.rotate_left(r);
        byte <= 0xff
    });
    imm::rotated_imm8(v as u64) == direct
}

#[quickcheck]
fn logical_imm_accepts_generated_patterns(ones: u8, zeros: u8, rot: u8) -> TestResult {
    let ones = ones as u32 % 31 + 1;
    // The run length must make the element size a power of two.
    let size = (ones + zeros as u32 % 31 + 1).next_power_of_two();
    if size > 32 || ones >= size {
        return TestResult::discard();
    }
    let run = if ones == 32 {
        u32::MAX
    } else {
        (1u32 << ones) - 1
    };
    let mut v = 0u32;
    let mut at = 0;
    while at < 32 {
        v |= run << at;
        at += size;
    }
    let v = v.rotate_right(rot as u32 % 32);
    TestResult::from_bool(imm::logical_imm(v as u64, 32))
}
