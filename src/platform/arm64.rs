//! The 32-on-64 target record.
//!
//! Thirty-two-bit values travel in 64-bit registers and addressing uses
//! the full 64-bit name. Logical immediates follow the tiled-bitmask
//! class; `extr` gives a native funnel shift.

use super::{
    AsmWriter, FrameInfo, Lowering, Platform, PlatformBuilder, PlatformFeatures, PlatformKind,
};
use crate::error::{Error, Result};
use crate::imm;
use crate::insn::{Insn, Opcode, ShiftOp};
use crate::reg::{BaseReg, RegFlags, RegSize, SizedReg};

use std::io;
use std::sync::Arc;

const W: [&str; 31] = [
    "w0", "w1", "w2", "w3", "w4", "w5", "w6", "w7", "w8", "w9", "w10", "w11", "w12", "w13", "w14",
    "w15", "w16", "w17", "w18", "w19", "w20", "w21", "w22", "w23", "w24", "w25", "w26", "w27",
    "w28", "w29", "w30",
];

const X: [&str; 31] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13", "x14",
    "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27",
    "x28", "x29", "x30",
];

fn r(n: u8, flags: RegFlags) -> Arc<BaseReg> {
    Arc::new(
        BaseReg::new(n, flags)
            .with_name(RegSize::S32, W[n as usize])
            .with_name(RegSize::S64, X[n as usize])
            .with_addr_name(X[n as usize]),
    )
}

pub(super) fn platform() -> Platform {
    use RegFlags as F;

    let common = F::DATA | F::ADDRESS | F::THREE_ADDRESS;
    let mut regs = Vec::new();
    // Caller-save non-argument registers, arguments reversed, callee-save.
    for n in 9..=17 {
        regs.push(r(n, common | F::TEMP));
    }
    regs.push(r(8, common | F::TEMP));
    for n in (0..=7).rev() {
        regs.push(r(n, common | F::TEMP));
    }
    for n in 19..=28 {
        regs.push(r(n, common | F::CALLEE_SAVED));
    }
    regs.push(r(30, common | F::LINK | F::CALLEE_SAVED));
    regs.push(r(18, common | F::NO_ALLOC));
    regs.push(r(29, common | F::NO_ALLOC));
    regs.push(Arc::new(
        BaseReg::new(31, F::STACK_PTR | F::ADDRESS | F::NO_ALLOC)
            .with_name(RegSize::S32, "wsp")
            .with_name(RegSize::S64, "sp")
            .with_addr_name("sp"),
    ));
    regs.push(Arc::new(
        BaseReg::new(32, F::ZERO | F::DATA | F::NO_ALLOC)
            .with_name(RegSize::S32, "wzr")
            .with_name(RegSize::S64, "xzr"),
    ));

    PlatformBuilder {
        name: "arm64",
        kind: PlatformKind::Arm64,
        word_size: RegSize::S32,
        addr_size: RegSize::S64,
        features: PlatformFeatures::THREE_ADDRESS
            | PlatformFeatures::REGISTER_RICH
            | PlatformFeatures::BIT_CLEAR
            | PlatformFeatures::FUNNEL_SHIFT
            | PlatformFeatures::UNARY_DEST
            | PlatformFeatures::COMPARE_AND_BRANCH,
        regs,
        args: vec!["x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7"],
        sp: "sp",
        frame_base: "sp",
        table_ptr: None,
        frame_limit: 4080,
        ret_bytes: 0,
        code_align: 4,
        comment: "//",
    }
    .build()
}

fn add_imm12(imm_v: u64) -> bool {
    imm_v <= 0xfff || (imm_v & 0xfff == 0 && (imm_v >> 12) <= 0xfff)
}

pub(super) struct Arm64Isa;

impl Lowering for Arm64Isa {
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
        use Opcode::*;
        if !matches!(op, Add | Adc | Sub | Sbc | And | Or | Xor | Bic) {
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
        use Opcode::*;
        if !matches!(op, Add | Sub | And | Or | Xor | Bic) {
            return Err(Error::InvalidInstruction("shifted operand unsupported here"));
        }
        if shift.0 == ShiftOp::Ror && !matches!(op, And | Or | Xor | Bic) {
            return Err(Error::InvalidInstruction("rotated operand needs a logical op"));
        }
        buf.push(
            Insn::new(op)
                .with_dest(dest.clone())
                .with_src1(src1.clone())
                .with_src2(src2.clone())
                .with_shift(shift.0, shift.1)
                .setting_flags(set_flags),
        );
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
            buf.push(Insn::new(op).with_src1(src1.clone()).with_imm(imm_v).setting_flags(true));
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
        let width = dest.size().bits();
        let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
        let v = imm_v & mask;
        if v <= 0xffff {
            buf.push(Insn::new(Opcode::MovImm16).with_dest(dest.clone()).with_imm(v));
        } else if (!v & mask) <= 0xffff {
            buf.push(Insn::new(Opcode::MvnImm).with_dest(dest.clone()).with_imm(!v & mask));
        } else if imm::logical_imm(v, width) {
            buf.push(Insn::new(Opcode::MovImm).with_dest(dest.clone()).with_imm(v));
        } else {
            buf.push(Insn::new(Opcode::MovImm16).with_dest(dest.clone()).with_imm(v & 0xffff));
            buf.push(Insn::new(Opcode::MovtImm16).with_dest(dest.clone()).with_imm((v >> 16) & 0xffff));
        }
        Ok(())
    }

    fn valid_imm(&self, op: Opcode, size: RegSize, imm_v: u64) -> bool {
        use Opcode::*;
        match op {
            Add | Sub | Cmp => add_imm12(imm_v),
            And | Or | Xor => imm::logical_imm(imm_v, size.bits()),
            Lsl | Lsr | Asr | Ror => imm_v >= 1 && imm_v < size.bits() as u64,
            Fshl | Fshr => imm_v < size.bits() as u64,
            MovImm16 | MovtImm16 => imm_v <= 0xffff,
            MovImm => imm::logical_imm(imm_v, size.bits()),
            _ => false,
        }
    }

    fn valid_disp(&self, op: Opcode, _size: RegSize, base: &SizedReg, disp: i32) -> bool {
        if !base.flags().contains(RegFlags::ADDRESS) {
            return false;
        }
        let bytes = match op.mem_bytes() {
            Some(b) => b as i32,
            None => return false,
        };
        disp >= 0 && disp % bytes == 0 && disp / bytes <= 4095
    }

    fn native_rotate(&self, size: RegSize, count: u8) -> bool {
        count >= 1 && (count as u32) < size.bits()
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
        Box::new(A64Writer::default())
    }
}

/// AArch64 syntax writer.
#[derive(Default)]
pub(super) struct A64Writer {
    scratch: String,
}

fn label(i: u64) -> String {
    format!(".L{}", i)
}

fn table_label(i: u64) -> String {
    format!(".Ltab{}", i)
}

fn bad(op: Opcode) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{op} is not printable on arm64"))
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

impl AsmWriter for A64Writer {
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
            match op {
                B => return writeln!(out, "\tb {}", target),
                Call => return writeln!(out, "\tbl {}", target),
                Cbeq => {
                    let r = insn.src1().ok_or_else(|| bad(op))?;
                    return writeln!(out, "\tcbz {}, {}", r.name(), target);
                }
                Cbne => {
                    let r = insn.src1().ok_or_else(|| bad(op))?;
                    return writeln!(out, "\tcbnz {}, {}", r.name(), target);
                }
                _ => {
                    if let Some(c) = cond_suffix(op) {
                        return writeln!(out, "\tb.{} {}", c, target);
                    }
                }
            }
        }

        match op {
            Nop => writeln!(out, "\tnop"),
            Add | Adc | Sub | Sbc | And | Or | Xor | Bic => {
                let mn = match op {
                    Add => "add",
                    Adc => "adc",
                    Sub => "sub",
                    Sbc => "sbc",
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
                writeln!(out, "\tmvn {}, {}", d.name(), s1.name())
            }
            Neg => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                writeln!(out, "\tneg {}, {}", d.name(), s1.name())
            }
            Rev => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                writeln!(out, "\trev {}, {}", d.name(), s1.name())
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
                    writeln!(out, "\t{} {}, {}, #{}", mn, d.name(), s1.name(), imm)
                } else {
                    let s2 = insn.src2().ok_or_else(|| bad(op))?;
                    writeln!(out, "\t{} {}, {}, {}", mn, d.name(), s1.name(), s2.name())
                }
            }
            Fshl | Fshr => {
                // extr computes a right funnel; the left form is printed
                // with the complemented count.
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let hi = insn.src1().ok_or_else(|| bad(op))?;
                let lo = insn.src2().ok_or_else(|| bad(op))?;
                let width = d.size().bits() as u64;
                let n = insn.imm().unwrap_or(0);
                let count = if op == Fshr { n } else { (width - n) % width };
                writeln!(out, "\textr {}, {}, {}, #{}", d.name(), hi.name(), lo.name(), count)
            }
            Mov => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                writeln!(out, "\tmov {}, {}", d.name(), s1.name())
            }
            MovImm => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let zr = if d.size() == RegSize::S64 { "xzr" } else { "wzr" };
                writeln!(out, "\torr {}, {}, #{}", d.name(), zr, insn.imm().unwrap_or(0))
            }
            MvnImm => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                writeln!(out, "\tmovn {}, #{}", d.name(), insn.imm().unwrap_or(0))
            }
            MovImm16 => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                writeln!(out, "\tmovz {}, #{}", d.name(), insn.imm().unwrap_or(0))
            }
            MovtImm16 => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                writeln!(out, "\tmovk {}, #{}, lsl #16", d.name(), insn.imm().unwrap_or(0))
            }
            Ldb | Ldbs | Ldh | Ldhs | Ldw | Ldws | Ldd | Ldt => {
                let mn = match op {
                    Ldb | Ldt => "ldrb",
                    Ldbs => "ldrsb",
                    Ldh => "ldrh",
                    Ldhs => "ldrsh",
                    Ldws => "ldrsw",
                    Ldd => "ldr",
                    _ => "ldr",
                };
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let b = insn.src1().ok_or_else(|| bad(op))?;
                let base = b.base().addr_name().unwrap_or("?");
                if let Some(idx) = insn.src2() {
                    writeln!(out, "\t{} {}, [{}, {}, uxtw]", mn, d.name(), base, idx.name())
                } else {
                    writeln!(out, "\t{} {}, [{}, #{}]", mn, d.name(), base, insn.imm().unwrap_or(0))
                }
            }
            Stb | Sth | Stw | Std => {
                let mn = match op {
                    Stb => "strb",
                    Sth => "strh",
                    _ => "str",
                };
                let b = insn.src1().ok_or_else(|| bad(op))?;
                let v = insn.src2().ok_or_else(|| bad(op))?;
                let base = b.base().addr_name().unwrap_or("?");
                writeln!(out, "\t{} {}, [{}, #{}]", mn, v.name(), base, insn.imm().unwrap_or(0))
            }
            Lea => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                writeln!(out, "\tadr {}, {}", d.name(), table_label(insn.imm().unwrap_or(0)))
            }
            LdArg => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let off = frame.arg_base() + insn.imm().unwrap_or(0) as u32;
                writeln!(out, "\tldr {}, [sp, #{}]", d.name(), off)
            }
            Push => {
                let r = insn.src1().ok_or_else(|| bad(op))?;
                let x = X[r.number() as usize];
                writeln!(out, "\tstr {}, [sp, #-16]!", x)
            }
            Pop => {
                let r = insn.dest().ok_or_else(|| bad(op))?;
                let x = X[r.number() as usize];
                writeln!(out, "\tldr {}, [sp], #16", x)
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
            Ret => writeln!(out, "\tret"),
            Print => writeln!(out, "\t// print {}", insn.src1().map(|r| r.name()).unwrap_or("?")),
            _ => Err(bad(op)),
        }
    }
}
