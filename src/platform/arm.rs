//! The 32-bit three-address target.
//!
//! Sixteen word registers, any of which can carry an address; inline
//! shifted operands; rotated 8-bit immediates. r0..r3 carry arguments,
//! r4..r11 and lr are callee-saved, r12 is the scratch temporary.

use super::{
    AsmWriter, FrameInfo, Lowering, Platform, PlatformBuilder, PlatformFeatures, PlatformKind,
};
use crate::error::{Error, Result};
use crate::imm;
use crate::insn::{Insn, Opcode, ShiftOp};
use crate::reg::{BaseReg, RegFlags, RegSize, SizedReg};

use std::io;
use std::sync::Arc;

const NAMES: [&str; 13] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12",
];

fn r32(n: u8, name: &'static str, flags: RegFlags) -> Arc<BaseReg> {
    Arc::new(BaseReg::new(n, flags).with_name(RegSize::S32, name))
}

pub(super) fn platform() -> Platform {
    use RegFlags as F;

    let common = F::DATA | F::ADDRESS | F::THREE_ADDRESS;
    let mut regs = Vec::new();
    // The scratch temporary first, then arguments in reverse caller order,
    // then the callee-saved file.
    regs.push(r32(12, NAMES[12], common | F::TEMP));
    for n in [3, 2, 1, 0] {
        regs.push(r32(n, NAMES[n as usize], common | F::TEMP));
    }
    for n in 4..=11 {
        regs.push(r32(n, NAMES[n as usize], common | F::CALLEE_SAVED));
    }
    regs.push(r32(14, "lr", common | F::LINK | F::CALLEE_SAVED));
    regs.push(r32(13, "sp", F::STACK_PTR | F::ADDRESS | F::NO_ALLOC));
    regs.push(r32(15, "pc", F::PROGRAM_CTR | F::NO_ALLOC));

    PlatformBuilder {
        name: "arm",
        kind: PlatformKind::Arm,
        word_size: RegSize::S32,
        addr_size: RegSize::S32,
        features: PlatformFeatures::THREE_ADDRESS
            | PlatformFeatures::SHIFT_OPERAND
            | PlatformFeatures::REGISTER_RICH
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

fn dp_op(op: Opcode) -> bool {
    use Opcode::*;
    matches!(op, Add | Adc | Sub | Sbc | Rsb | And | Or | Xor | Bic)
}

pub(super) struct ArmIsa;

impl Lowering for ArmIsa {
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
        if !dp_op(op) {
            return Err(Error::InvalidInstruction("binary op unsupported"));
        }
        buf.push(
            Insn::new(op)
                .with_dest(dest.clone())
                .with_src1(src1.clone())
                .with_src2(src2.clone())
                .setting_flags(set_flags),
        );
        Ok(())
    }

    fn binary_shifted(
        &self,
        _p: &Platform,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src1: &SizedReg,
        src2: &SizedReg,
        shift: (ShiftOp, u8),
        set_flags: bool,
    ) -> Result<()> {
        if !dp_op(op) && op != Opcode::Mov {
            return Err(Error::InvalidInstruction("shifted operand unsupported here"));
        }
        if shift.1 >= 32 {
            return Err(Error::InvalidInstruction("shift count out of range"));
        }
        let mut insn = Insn::new(op)
            .with_dest(dest.clone())
            .with_src2(src2.clone())
            .with_shift(shift.0, shift.1)
            .setting_flags(set_flags);
        if op != Opcode::Mov {
            insn = insn.with_src1(src1.clone());
        }
        buf.push(insn);
        Ok(())
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
            buf.push(
                Insn::new(op)
                    .with_src1(src1.clone())
                    .with_imm(imm_v)
                    .setting_flags(true),
            );
            return Ok(());
        }
        buf.push(
            Insn::new(op)
                .with_dest(dest.clone())
                .with_src1(src1.clone())
                .with_imm(imm_v)
                .setting_flags(set_flags),
        );
        Ok(())
    }

    fn move_imm(&self, _p: &Platform, buf: &mut Vec<Insn>, dest: &SizedReg, imm_v: u64) -> Result<()> {
        let v = imm_v & 0xffff_ffff;
        if imm::rotated_imm8(v) {
            buf.push(Insn::new(Opcode::MovImm).with_dest(dest.clone()).with_imm(v));
        } else if imm::rotated_imm8(!v & 0xffff_ffff) {
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
            Add | Adc | Sub | Sbc | Rsb | And | Or | Xor | Bic | Cmp => imm::rotated_imm8(imm_v),
            Lsl | Lsr | Asr | Ror => (1..32).contains(&imm_v),
            MovImm => imm::rotated_imm8(imm_v),
            MovImm16 | MovtImm16 => imm_v <= 0xffff,
            _ => false,
        }
    }

    fn valid_disp(&self, op: Opcode, _size: RegSize, base: &SizedReg, disp: i32) -> bool {
        if !base.flags().contains(RegFlags::ADDRESS) {
            return false;
        }
        use Opcode::*;
        match op {
            Ldb | Stb | Ldw | Stw | Ldt => (-4095..=4095).contains(&disp),
            Ldbs | Ldh | Ldhs | Sth => (-255..=255).contains(&disp),
            _ => false,
        }
    }

    fn native_rotate(&self, size: RegSize, count: u8) -> bool {
        size == RegSize::S32 && (1..32).contains(&count)
    }

    fn frame_setup(&self, p: &Platform, buf: &mut Vec<Insn>, bytes: u32) -> Result<()> {
        let sp = p.sp_reg();
        buf.push(
            Insn::new(Opcode::Sub)
                .with_dest(sp.clone())
                .with_src1(sp)
                .with_imm(bytes as u64),
        );
        Ok(())
    }

    fn frame_teardown(&self, p: &Platform, buf: &mut Vec<Insn>, bytes: u32) -> Result<()> {
        let sp = p.sp_reg();
        buf.push(
            Insn::new(Opcode::Add)
                .with_dest(sp.clone())
                .with_src1(sp)
                .with_imm(bytes as u64),
        );
        Ok(())
    }

    fn writer(&self) -> Box<dyn AsmWriter> {
        Box::new(ArmWriter::default())
    }
}

/// Unified-syntax writer shared by the 32-bit targets.
#[derive(Default)]
pub(super) struct ArmWriter {
    scratch: String,
}

fn label(i: u64) -> String {
    format!(".L{}", i)
}

fn table_label(i: u64) -> String {
    format!(".Ltab{}", i)
}

fn bad(op: Opcode) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{op} is not printable here"))
}

fn shift_name(op: ShiftOp) -> &'static str {
    match op {
        ShiftOp::Asr => "asr",
        ShiftOp::Lsl => "lsl",
        ShiftOp::Lsr => "lsr",
        ShiftOp::Ror => "ror",
    }
}

fn cond_suffix(op: Opcode) -> Option<&'static str> {
    use Opcode::*;
    match op {
        Beq => Some("eq"),
        Bne => Some("ne"),
        Blt => Some("lt"),
        Ble => Some("le"),
        Bgt => Some("gt"),
        Bge => Some("ge"),
        Bltu => Some("lo"),
        Bleu => Some("ls"),
        Bgtu => Some("hi"),
        Bgeu => Some("hs"),
        _ => None,
    }
}

impl AsmWriter for ArmWriter {
    fn write_insn(
        &mut self,
        out: &mut dyn io::Write,
        _p: &Platform,
        frame: &FrameInfo,
        insn: &Insn,
    ) -> io::Result<()> {
        use Opcode::*;
        let op = insn.op();
        let s = if insn.sets_flags() { "s" } else { "" };

        if op == Label {
            let l = insn.label().ok_or_else(|| bad(op))?;
            return writeln!(out, "{}:", label(l.index() as u64));
        }
        if let Some(l) = insn.label() {
            let target = {
                self.scratch.clear();
                self.scratch.push_str(&label(l.index() as u64));
                self.scratch.clone()
            };
            if op == B {
                return writeln!(out, "\tb {}", target);
            }
            if op == Call {
                return writeln!(out, "\tbl {}", target);
            }
            if let Some(c) = cond_suffix(op) {
                return writeln!(out, "\tb{} {}", c, target);
            }
        }

        match op {
            Nop => writeln!(out, "\tnop"),
            Add | Adc | Sub | Sbc | Rsb | And | Or | Xor | Bic => {
                let mn = match op {
                    Add => "add",
                    Adc => "adc",
                    Sub => "sub",
                    Sbc => "sbc",
                    Rsb => "rsb",
                    And => "and",
                    Or => "orr",
                    Xor => "eor",
                    Bic => "bic",
                    _ => unreachable!(),
                };
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                if let Some(imm) = insn.imm() {
                    writeln!(out, "\t{}{} {}, {}, #{}", mn, s, d.name(), s1.name(), imm)
                } else {
                    let s2 = insn.src2().ok_or_else(|| bad(op))?;
                    if let Some((sh, n)) = insn.shift() {
                        writeln!(
                            out,
                            "\t{}{} {}, {}, {}, {} #{}",
                            mn,
                            s,
                            d.name(),
                            s1.name(),
                            s2.name(),
                            shift_name(sh),
                            n
                        )
                    } else {
                        writeln!(out, "\t{}{} {}, {}, {}", mn, s, d.name(), s1.name(), s2.name())
                    }
                }
            }
            Not => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                writeln!(out, "\tmvn{} {}, {}", s, d.name(), s1.name())
            }
            Neg => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                writeln!(out, "\trsb{} {}, {}, #0", s, d.name(), s1.name())
            }
            Rev => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                writeln!(out, "\trev {}, {}", d.name(), s1.name())
            }
            Sext | Zext => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                let mn = match (op == Sext, insn.imm().unwrap_or(8)) {
                    (true, 8) => "sxtb",
                    (true, _) => "sxth",
                    (false, 8) => "uxtb",
                    (false, _) => "uxth",
                };
                writeln!(out, "\t{} {}, {}", mn, d.name(), s1.name())
            }
            Lsl | Lsr | Asr | Ror => {
                let mn = match op {
                    Lsl => "lsl",
                    Lsr => "lsr",
                    Asr => "asr",
                    _ => "ror",
                };
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                if let Some(imm) = insn.imm() {
                    writeln!(out, "\t{}{} {}, {}, #{}", mn, s, d.name(), s1.name(), imm)
                } else {
                    let s2 = insn.src2().ok_or_else(|| bad(op))?;
                    writeln!(out, "\t{}{} {}, {}, {}", mn, s, d.name(), s1.name(), s2.name())
                }
            }
            Mov => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let s1 = insn.src1().or(insn.src2()).ok_or_else(|| bad(op))?;
                if let Some((sh, n)) = insn.shift() {
                    writeln!(out, "\t{} {}, {}, #{}", shift_name(sh), d.name(), s1.name(), n)
                } else {
                    writeln!(out, "\tmov{} {}, {}", s, d.name(), s1.name())
                }
            }
            MovImm => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let imm = insn.imm().unwrap_or(0);
                if imm::rotated_imm8(imm) {
                    writeln!(out, "\tmov {}, #{}", d.name(), imm)
                } else {
                    writeln!(out, "\tldr {}, ={}", d.name(), imm)
                }
            }
            MvnImm => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                writeln!(out, "\tmvn {}, #{}", d.name(), insn.imm().unwrap_or(0))
            }
            MovImm16 => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                writeln!(out, "\tmovw {}, #{}", d.name(), insn.imm().unwrap_or(0))
            }
            MovtImm16 => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                writeln!(out, "\tmovt {}, #{}", d.name(), insn.imm().unwrap_or(0))
            }
            Ldb | Ldbs | Ldh | Ldhs | Ldw | Ldt => {
                let mn = match op {
                    Ldb | Ldt => "ldrb",
                    Ldbs => "ldrsb",
                    Ldh => "ldrh",
                    Ldhs => "ldrsh",
                    _ => "ldr",
                };
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let b = insn.src1().ok_or_else(|| bad(op))?;
                if let Some(idx) = insn.src2() {
                    if let Some((sh, n)) = insn.shift() {
                        writeln!(
                            out,
                            "\t{} {}, [{}, {}, {} #{}]",
                            mn,
                            d.name(),
                            b.name(),
                            idx.name(),
                            shift_name(sh),
                            n
                        )
                    } else {
                        writeln!(out, "\t{} {}, [{}, {}]", mn, d.name(), b.name(), idx.name())
                    }
                } else {
                    writeln!(out, "\t{} {}, [{}, #{}]", mn, d.name(), b.name(), insn.imm().unwrap_or(0))
                }
            }
            Stb | Sth | Stw => {
                let mn = match op {
                    Stb => "strb",
                    Sth => "strh",
                    _ => "str",
                };
                let b = insn.src1().ok_or_else(|| bad(op))?;
                let v = insn.src2().ok_or_else(|| bad(op))?;
                writeln!(out, "\t{} {}, [{}, #{}]", mn, v.name(), b.name(), insn.imm().unwrap_or(0))
            }
            Lea => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                writeln!(out, "\tldr {}, ={}", d.name(), table_label(insn.imm().unwrap_or(0)))
            }
            LdArg => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let off = frame.arg_base() + insn.imm().unwrap_or(0) as u32;
                writeln!(out, "\tldr {}, [sp, #{}]", d.name(), off)
            }
            Push => {
                let r = insn.src1().ok_or_else(|| bad(op))?;
                writeln!(out, "\tpush {{{}}}", r.name())
            }
            Pop => {
                let r = insn.dest().ok_or_else(|| bad(op))?;
                writeln!(out, "\tpop {{{}}}", r.name())
            }
            Cmp => {
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                if let Some(imm) = insn.imm() {
                    writeln!(out, "\tcmp {}, #{}", s1.name(), imm)
                } else {
                    let s2 = insn.src2().ok_or_else(|| bad(op))?;
                    writeln!(out, "\tcmp {}, {}", s1.name(), s2.name())
                }
            }
            Ret => writeln!(out, "\tbx lr"),
            Print => writeln!(out, "\t@ print {}", insn.src1().map(|r| r.name()).unwrap_or("?")),
            _ => Err(bad(op)),
        }
    }
}
