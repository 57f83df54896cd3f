//! The two-address 32-bit subset with split register classes.
//!
//! Low registers r0..r7 do arithmetic, high registers r8..r12 only hold
//! values. Immediates follow the repeated-byte "modified" class.

use super::{arm::ArmWriter, AsmWriter, Lowering, Platform, PlatformBuilder, PlatformFeatures, PlatformKind};
use crate::error::{Error, Result};
use crate::imm;
use crate::insn::{Insn, InsnOpts, Opcode, ShiftOp};
use crate::reg::{BaseReg, RegFlags, RegSize, SizedReg};

use std::sync::Arc;

const NAMES: [&str; 13] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12",
];

fn r32(n: u8, name: &'static str, flags: RegFlags) -> Arc<BaseReg> {
    Arc::new(BaseReg::new(n, flags).with_name(RegSize::S32, name))
}

pub(super) fn platform() -> Platform {
    use RegFlags as F;

    let low = F::DATA | F::ADDRESS | F::TWO_ADDRESS | F::THREE_ADDRESS;
    let high = F::STORAGE;
    let mut regs = Vec::new();
    // Arguments in reverse caller order; there is no caller-save
    // non-argument low register.
    for n in [3, 2, 1, 0] {
        regs.push(r32(n, NAMES[n as usize], low | F::TEMP));
    }
    for n in 4..=7 {
        regs.push(r32(n, NAMES[n as usize], low | F::CALLEE_SAVED));
    }
    regs.push(r32(12, NAMES[12], high | F::TEMP));
    for n in 8..=11 {
        regs.push(r32(n, NAMES[n as usize], high | F::CALLEE_SAVED));
    }
    regs.push(r32(14, "lr", F::DATA | F::LINK | F::CALLEE_SAVED));
    regs.push(r32(13, "sp", F::STACK_PTR | F::ADDRESS | F::NO_ALLOC));
    regs.push(r32(15, "pc", F::PROGRAM_CTR | F::NO_ALLOC));

    PlatformBuilder {
        name: "thumb",
        kind: PlatformKind::Thumb,
        word_size: RegSize::S32,
        addr_size: RegSize::S32,
        features: PlatformFeatures::TWO_ADDRESS
            | PlatformFeatures::SPLIT_CLASSES
            | PlatformFeatures::REGISTER_POOR
            | PlatformFeatures::BIT_CLEAR
            | PlatformFeatures::UNARY_DEST,
        regs,
        args: vec!["r0", "r1", "r2", "r3"],
        sp: "sp",
        frame_base: "sp",
        table_ptr: None,
        frame_limit: 508,
        ret_bytes: 0,
        code_align: 4,
        comment: "@",
    }
    .build()
}

fn low(r: &SizedReg) -> bool {
    r.flags().contains(RegFlags::TWO_ADDRESS)
}

pub(super) struct ThumbIsa;

impl Lowering for ThumbIsa {
    fn unary(
        &self,
        _p: &Platform,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src: &SizedReg,
    ) -> Result<()> {
        if !matches!(op, Opcode::Not | Opcode::Neg | Opcode::Rev) {
            return Err(Error::InvalidInstruction("unary op unsupported"));
        }
        if !low(dest) || !low(src) {
            return Err(Error::InvalidInstruction("unary ops need low registers"));
        }
        buf.push(Insn::new(op).with_dest(dest.clone()).with_src1(src.clone()));
        Ok(())
    }

    fn binary(
        &self,
        _p: &Platform,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src1: &SizedReg,
        src2: &SizedReg,
        set_flags: bool,
    ) -> Result<()> {
        use Opcode::*;
        if !matches!(op, Add | Adc | Sub | Sbc | And | Or | Xor | Bic) {
            return Err(Error::InvalidInstruction("binary op unsupported"));
        }
        if !low(dest) || !low(src1) || !low(src2) {
            return Err(Error::InvalidInstruction("ALU needs low registers"));
        }
        // Low-register add/sub have a real three-address encoding; the
        // rest are destructive.
        if matches!(op, Add | Sub) {
            buf.push(
                Insn::new(op)
                    .with_dest(dest.clone())
                    .with_src1(src1.clone())
                    .with_src2(src2.clone())
                    .setting_flags(set_flags),
            );
            return Ok(());
        }
        if dest != src1 {
            if dest == src2 {
                if matches!(op, And | Or | Xor) {
                    buf.push(
                        Insn::new(op)
                            .with_dest(dest.clone())
                            .with_src1(dest.clone())
                            .with_src2(src1.clone())
                            .with_opts(InsnOpts::SHORT)
                            .setting_flags(set_flags),
                    );
                    return Ok(());
                }
                return Err(Error::InvalidInstruction(
                    "two-address destination overlaps the second source",
                ));
            }
            buf.push(Insn::new(Opcode::Mov).with_dest(dest.clone()).with_src1(src1.clone()));
        }
        buf.push(
            Insn::new(op)
                .with_dest(dest.clone())
                .with_src1(dest.clone())
                .with_src2(src2.clone())
                .with_opts(InsnOpts::SHORT)
                .setting_flags(set_flags),
        );
        Ok(())
    }

    fn binary_shifted(
        &self,
        _p: &Platform,
        _buf: &mut Vec<Insn>,
        _op: Opcode,
        _dest: &SizedReg,
        _src1: &SizedReg,
        _src2: &SizedReg,
        _shift: (ShiftOp, u8),
        _set_flags: bool,
    ) -> Result<()> {
        Err(Error::InvalidInstruction("no shifted operands in the subset"))
    }

    fn binary_imm(
        &self,
        _p: &Platform,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src1: &SizedReg,
        imm_v: u64,
        set_flags: bool,
    ) -> Result<()> {
        if !self.valid_imm(op, dest.size(), imm_v) {
            return Err(Error::InvalidImmediate { op, imm: imm_v });
        }
        if op == Opcode::Cmp {
            buf.push(Insn::new(op).with_src1(src1.clone()).with_imm(imm_v).setting_flags(true));
            return Ok(());
        }
        if !low(dest) {
            return Err(Error::InvalidInstruction("immediate forms need low registers"));
        }
        if dest != src1 {
            buf.push(Insn::new(Opcode::Mov).with_dest(dest.clone()).with_src1(src1.clone()));
        }
        buf.push(
            Insn::new(op)
                .with_dest(dest.clone())
                .with_src1(dest.clone())
                .with_imm(imm_v)
                .with_opts(InsnOpts::SHORT)
                .setting_flags(set_flags),
        );
        Ok(())
    }

    fn move_imm(&self, _p: &Platform, buf: &mut Vec<Insn>, dest: &SizedReg, imm_v: u64) -> Result<()> {
        let v = imm_v & 0xffff_ffff;
        if imm::modified_imm(v) {
            buf.push(Insn::new(Opcode::MovImm).with_dest(dest.clone()).with_imm(v));
        } else if imm::modified_imm(!v & 0xffff_ffff) {
            buf.push(Insn::new(Opcode::MvnImm).with_dest(dest.clone()).with_imm(!v & 0xffff_ffff));
        } else if v <= 0xffff {
            buf.push(Insn::new(Opcode::MovImm16).with_dest(dest.clone()).with_imm(v));
        } else {
            buf.push(Insn::new(Opcode::MovImm16).with_dest(dest.clone()).with_imm(v & 0xffff));
            buf.push(Insn::new(Opcode::MovtImm16).with_dest(dest.clone()).with_imm(v >> 16));
        }
        Ok(())
    }

    fn valid_imm(&self, op: Opcode, _size: RegSize, imm_v: u64) -> bool {
        use Opcode::*;
        match op {
            Add | Sub | And | Or | Xor | Bic | Cmp | MovImm => imm::modified_imm(imm_v),
            Lsl | Lsr | Asr => (1..32).contains(&imm_v),
            MovImm16 | MovtImm16 => imm_v <= 0xffff,
            _ => false,
        }
    }

    fn valid_disp(&self, op: Opcode, _size: RegSize, base: &SizedReg, disp: i32) -> bool {
        if !base.flags().contains(RegFlags::ADDRESS) {
            return false;
        }
        use Opcode::*;
        if base.flags().contains(RegFlags::STACK_PTR) {
            return matches!(op, Ldw | Stw) && (0..=1020).contains(&disp) && disp % 4 == 0;
        }
        match op {
            Ldb | Stb | Ldt => (0..=31).contains(&disp),
            Ldh | Sth => (0..=62).contains(&disp) && disp % 2 == 0,
            Ldw | Stw => (0..=124).contains(&disp) && disp % 4 == 0,
            _ => false,
        }
    }

    fn native_rotate(&self, _size: RegSize, _count: u8) -> bool {
        // Rotates take a register count in the subset; the planner uses
        // shift pairs instead.
        false
    }

    fn frame_setup(&self, p: &Platform, buf: &mut Vec<Insn>, bytes: u32) -> Result<()> {
        let sp = p.sp_reg();
        buf.push(Insn::new(Opcode::Sub).with_dest(sp.clone()).with_src1(sp).with_imm(bytes as u64));
        Ok(())
    }

    fn frame_teardown(&self, p: &Platform, buf: &mut Vec<Insn>, bytes: u32) -> Result<()> {
        let sp = p.sp_reg();
        buf.push(Insn::new(Opcode::Add).with_dest(sp.clone()).with_src1(sp).with_imm(bytes as u64));
        Ok(())
    }

    fn writer(&self) -> Box<dyn AsmWriter> {
        Box::new(ArmWriter::default())
    }
}
