//! The 8-bit accumulator/pointer target.
//!
//! Eight-bit data registers with a split immediate-capable upper class,
//! 16-bit pointer registers X/Y/Z with displacement-limited addressing,
//! rotations synthesised from single-bit shifts, and S-box lookup through
//! the program-memory pointer Z. Y is the frame pointer and Z the table
//! pointer; both are reserved unless the author grants them.
//!
//! Calling convention: arguments arrive in register pairs r25:r24 down to
//! r19:r18; r0 is a scratch temporary, r1 reads as zero, r2..r17 are
//! callee-saved.

use super::{
    AsmWriter, FrameInfo, Lowering, Platform, PlatformBuilder, PlatformFeatures, PlatformKind,
};
use crate::error::{Error, Result};
use crate::imm;
use crate::insn::{Insn, InsnOpts, Opcode, ShiftOp};
use crate::reg::{BaseReg, RegFlags, RegSize, SizedReg};

use std::io;
use std::sync::Arc;

const DATA_NAMES: [&str; 26] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "r13", "r14",
    "r15", "r16", "r17", "r18", "r19", "r20", "r21", "r22", "r23", "r24", "r25",
];

const PAIR_NAMES: [(u8, &str); 4] = [
    (18, "r19:r18"),
    (20, "r21:r20"),
    (22, "r23:r22"),
    (24, "r25:r24"),
];

fn r8(n: u8, flags: RegFlags) -> Arc<BaseReg> {
    let mut reg = BaseReg::new(n, flags).with_name(RegSize::S8, DATA_NAMES[n as usize]);
    if let Some(&(_, pair)) = PAIR_NAMES.iter().find(|&&(p, _)| p == n) {
        reg = reg.with_name(RegSize::S16, pair);
    }
    Arc::new(reg)
}

fn ptr16(n: u8, name: &'static str, flags: RegFlags) -> Arc<BaseReg> {
    Arc::new(
        BaseReg::new(n, flags)
            .with_name(RegSize::S16, name)
            .with_addr_name(name),
    )
}

pub(super) fn platform() -> Platform {
    use RegFlags as F;

    let data = F::DATA;
    let upper = F::DATA | F::TWO_ADDRESS;
    let saved = F::DATA | F::CALLEE_SAVED;
    let saved_upper = saved | F::TWO_ADDRESS;

    let mut regs = Vec::new();
    // Caller-save non-argument registers first.
    regs.push(r8(0, data | F::TEMP));
    regs.push(ptr16(26, "X", F::ADDRESS | F::TEMP));
    // Argument registers in reverse caller order, so early argument slots
    // are consumed last.
    for n in [19, 18, 21, 20, 23, 22, 25, 24] {
        regs.push(r8(n, upper));
    }
    // Callee-saved registers last; the plain class before the
    // immediate-capable one.
    for n in 2..=15 {
        regs.push(r8(n, saved));
    }
    regs.push(r8(16, saved_upper));
    regs.push(r8(17, saved_upper));
    // Reserved registers: the zero register, the frame pointer and the
    // table pointer are handed out only when granted.
    regs.push(r8(1, data | F::ZERO | F::NO_ALLOC));
    regs.push(ptr16(28, "Y", F::ADDRESS | F::CALLEE_SAVED | F::NO_ALLOC));
    regs.push(ptr16(30, "Z", F::ADDRESS | F::TEMP | F::NO_ALLOC));
    regs.push(ptr16(32, "SP", F::STACK_PTR | F::NO_ALLOC));

    PlatformBuilder {
        name: "avr",
        kind: PlatformKind::Avr,
        word_size: RegSize::S8,
        addr_size: RegSize::S16,
        features: PlatformFeatures::TWO_ADDRESS
            | PlatformFeatures::SPLIT_CLASSES
            | PlatformFeatures::REGISTER_POOR
            | PlatformFeatures::SHIFTS_ONLY,
        regs,
        args: vec!["r24", "r25", "r22", "r23", "r20", "r21", "r18", "r19"],
        sp: "SP",
        frame_base: "Y",
        table_ptr: Some("Z"),
        frame_limit: 63,
        ret_bytes: 2,
        code_align: 2,
        comment: ";",
    }
    .build()
}

fn imm_capable(r: &SizedReg) -> bool {
    r.flags().contains(RegFlags::TWO_ADDRESS)
}

fn adiw_base(r: &SizedReg) -> bool {
    matches!(r.number(), 24 | 26 | 28 | 30)
}

/// Copy `src1` into `dest` when a destructive operation needs them equal.
fn settle_dest(
    buf: &mut Vec<Insn>,
    dest: &SizedReg,
    src1: &SizedReg,
    src2: Option<&SizedReg>,
    commutative: bool,
) -> Result<SizedReg> {
    if dest == src1 {
        return Ok(src2.cloned().unwrap_or_else(|| src1.clone()));
    }
    if let Some(s2) = src2 {
        if dest == s2 {
            if commutative {
                return Ok(src1.clone());
            }
            return Err(Error::InvalidInstruction(
                "two-address destination overlaps the second source",
            ));
        }
    }
    buf.push(
        Insn::new(Opcode::Mov)
            .with_dest(dest.clone())
            .with_src1(src1.clone()),
    );
    Ok(src2.cloned().unwrap_or_else(|| src1.clone()))
}

pub(super) struct AvrIsa;

impl Lowering for AvrIsa {
    fn unary(
        &self,
        _p: &Platform,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src: &SizedReg,
    ) -> Result<()> {
        if !matches!(op, Opcode::Not | Opcode::Neg) {
            return Err(Error::InvalidInstruction("unary op unsupported on avr"));
        }
        if dest.size() != RegSize::S8 {
            return Err(Error::InvalidInstruction("avr unary ops are 8-bit"));
        }
        settle_dest(buf, dest, src, None, false)?;
        buf.push(
            Insn::new(op)
                .with_dest(dest.clone())
                .with_src1(dest.clone())
                .with_opts(InsnOpts::SHORT),
        );
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
        if dest.size() != RegSize::S8 {
            return Err(Error::InvalidInstruction("avr register ALU is 8-bit"));
        }
        let commutative = matches!(op, Add | And | Or | Xor);
        if !matches!(op, Add | Adc | Sub | Sbc | And | Or | Xor) {
            return Err(Error::InvalidInstruction("binary op unsupported on avr"));
        }
        let other = settle_dest(buf, dest, src1, Some(src2), commutative)?;
        buf.push(
            Insn::new(op)
                .with_dest(dest.clone())
                .with_src1(dest.clone())
                .with_src2(other)
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
        Err(Error::InvalidInstruction("avr has no shifted operands"))
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
        use Opcode::*;
        if !self.valid_imm(op, dest.size(), imm_v) {
            return Err(Error::InvalidImmediate { op, imm: imm_v });
        }
        match (op, dest.size()) {
            // Word add/subtract on the pointer-capable pairs.
            (Add | Sub, RegSize::S16) => {
                if !adiw_base(dest) {
                    return Err(Error::InvalidInstruction("word immediates need an adiw base"));
                }
                settle_dest(buf, dest, src1, None, false)?;
            }
            (Cmp, RegSize::S8) => {
                if !imm_capable(src1) {
                    return Err(Error::InvalidInstruction("cpi needs the upper class"));
                }
                buf.push(
                    Insn::new(Cmp)
                        .with_src1(src1.clone())
                        .with_imm(imm_v)
                        .with_opts(InsnOpts::SET_FLAGS),
                );
                return Ok(());
            }
            (Lsl | Lsr | Asr | Ror, RegSize::S8) => {
                settle_dest(buf, dest, src1, None, false)?;
            }
            (And | Or | Sub | Sbc, RegSize::S8) => {
                if !imm_capable(dest) {
                    return Err(Error::InvalidInstruction("immediate forms need the upper class"));
                }
                settle_dest(buf, dest, src1, None, false)?;
            }
            _ => return Err(Error::InvalidInstruction("immediate op unsupported on avr")),
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
        match dest.size() {
            RegSize::S8 => {
                if imm_v == 0 {
                    // clr: exclusive-or with itself, any class.
                    buf.push(
                        Insn::new(Opcode::Xor)
                            .with_dest(dest.clone())
                            .with_src1(dest.clone())
                            .with_src2(dest.clone())
                            .with_opts(InsnOpts::SHORT),
                    );
                    return Ok(());
                }
                if !imm_capable(dest) {
                    return Err(Error::InvalidInstruction("ldi needs the upper class"));
                }
                buf.push(Insn::new(Opcode::MovImm).with_dest(dest.clone()).with_imm(imm_v & 0xff));
                Ok(())
            }
            RegSize::S16 => {
                buf.push(Insn::new(Opcode::MovImm).with_dest(dest.clone()).with_imm(imm_v & 0xffff));
                Ok(())
            }
            _ => Err(Error::InvalidInstruction("avr immediates are at most 16-bit")),
        }
    }

    fn valid_imm(&self, op: Opcode, size: RegSize, imm_v: u64) -> bool {
        use Opcode::*;
        match (op, size) {
            (Add | Sub, RegSize::S16) => imm_v <= 63,
            (Lsl | Lsr | Asr, RegSize::S8) => (1..8).contains(&imm_v),
            (Ror | Rol, RegSize::S8) => imm_v == 4,
            (And | Or | Sub | Sbc | Cmp | MovImm, RegSize::S8) => imm::small_imm8(imm_v),
            (MovImm, RegSize::S16) => imm_v <= 0xffff,
            _ => false,
        }
    }

    fn valid_disp(&self, op: Opcode, _size: RegSize, base: &SizedReg, disp: i32) -> bool {
        if !base.flags().contains(RegFlags::ADDRESS) {
            return false;
        }
        if op == Opcode::Ldt {
            return disp == 0;
        }
        let bytes = op.mem_bytes().unwrap_or(1) as i32;
        disp >= 0 && disp + bytes - 1 <= 63
    }

    fn native_rotate(&self, size: RegSize, count: u8) -> bool {
        // swap is a nibble rotate.
        size == RegSize::S8 && count == 4
    }

    fn has_add_imm(&self) -> bool {
        false
    }

    fn frame_setup(&self, p: &Platform, buf: &mut Vec<Insn>, bytes: u32) -> Result<()> {
        // The frame pointer always picks up the stack pointer; the stack
        // only moves when there are locals to carve.
        let y = p.frame_reg();
        let sp = p.sp_reg();
        buf.push(Insn::new(Opcode::Mov).with_dest(y.clone()).with_src1(sp.clone()));
        if bytes > 0 {
            buf.push(
                Insn::new(Opcode::Sub)
                    .with_dest(y.clone())
                    .with_src1(y.clone())
                    .with_imm(bytes as u64),
            );
            buf.push(Insn::new(Opcode::Mov).with_dest(sp).with_src1(y));
        }
        Ok(())
    }

    fn frame_teardown(&self, p: &Platform, buf: &mut Vec<Insn>, bytes: u32) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        let y = p.frame_reg();
        let sp = p.sp_reg();
        buf.push(
            Insn::new(Opcode::Add)
                .with_dest(y.clone())
                .with_src1(y.clone())
                .with_imm(bytes as u64),
        );
        buf.push(Insn::new(Opcode::Mov).with_dest(sp).with_src1(y));
        Ok(())
    }

    fn writer(&self) -> Box<dyn AsmWriter> {
        Box::new(AvrWriter::default())
    }
}

/// Renders records as avr-gcc flavoured assembly.
#[derive(Default)]
pub(super) struct AvrWriter {
    scratch: String,
}

fn pair(sr: &SizedReg) -> (String, String) {
    let n = sr.number();
    (format!("r{}", n), format!("r{}", n + 1))
}

fn label(i: u64) -> String {
    format!(".L{}", i)
}

fn table_label(i: u64) -> String {
    format!(".Ltab{}", i)
}

fn bad(op: Opcode) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{op} is not printable on avr"))
}

impl AvrWriter {
    fn mem_base(sr: &SizedReg) -> String {
        sr.base().addr_name().unwrap_or("?").to_string()
    }

    fn write_load_byte(
        out: &mut dyn io::Write,
        dest: &str,
        base: &SizedReg,
        disp: u32,
    ) -> io::Result<()> {
        let b = Self::mem_base(base);
        if base.number() == 26 && disp > 0 {
            // X has no displacement; step it around the access.
            writeln!(out, "\tadiw r26, {}", disp)?;
            writeln!(out, "\tld {}, X", dest)?;
            writeln!(out, "\tsbiw r26, {}", disp)
        } else if disp == 0 {
            writeln!(out, "\tld {}, {}", dest, b)
        } else {
            writeln!(out, "\tldd {}, {}+{}", dest, b, disp)
        }
    }

    fn write_store_byte(
        out: &mut dyn io::Write,
        base: &SizedReg,
        disp: u32,
        src: &str,
    ) -> io::Result<()> {
        let b = Self::mem_base(base);
        if base.number() == 26 && disp > 0 {
            writeln!(out, "\tadiw r26, {}", disp)?;
            writeln!(out, "\tst X, {}", src)?;
            writeln!(out, "\tsbiw r26, {}", disp)
        } else if disp == 0 {
            writeln!(out, "\tst {}, {}", b, src)
        } else {
            writeln!(out, "\tstd {}+{}, {}", b, disp, src)
        }
    }

    /// Conditional branches are printed as an inverted skip plus `rjmp`,
    /// so targets beyond the short branch range stay reachable.
    fn write_branch(out: &mut dyn io::Write, op: Opcode, target: &str) -> io::Result<()> {
        use Opcode::*;
        match op {
            B => writeln!(out, "\trjmp {}", target),
            Beq => {
                writeln!(out, "\tbrne .+2")?;
                writeln!(out, "\trjmp {}", target)
            }
            Bne => {
                writeln!(out, "\tbreq .+2")?;
                writeln!(out, "\trjmp {}", target)
            }
            Bltu => {
                writeln!(out, "\tbrsh .+2")?;
                writeln!(out, "\trjmp {}", target)
            }
            Bgeu => {
                writeln!(out, "\tbrlo .+2")?;
                writeln!(out, "\trjmp {}", target)
            }
            Blt => {
                writeln!(out, "\tbrge .+2")?;
                writeln!(out, "\trjmp {}", target)
            }
            Bge => {
                writeln!(out, "\tbrlt .+2")?;
                writeln!(out, "\trjmp {}", target)
            }
            Bleu => {
                writeln!(out, "\tbrsh .+2")?;
                writeln!(out, "\trjmp {}", target)?;
                writeln!(out, "\tbrne .+2")?;
                writeln!(out, "\trjmp {}", target)
            }
            Bgtu => {
                writeln!(out, "\tbrlo .+4")?;
                writeln!(out, "\tbreq .+2")?;
                writeln!(out, "\trjmp {}", target)
            }
            Ble => {
                writeln!(out, "\tbrge .+2")?;
                writeln!(out, "\trjmp {}", target)?;
                writeln!(out, "\tbrne .+2")?;
                writeln!(out, "\trjmp {}", target)
            }
            Bgt => {
                writeln!(out, "\tbrlt .+4")?;
                writeln!(out, "\tbreq .+2")?;
                writeln!(out, "\trjmp {}", target)
            }
            _ => Err(bad(op)),
        }
    }
}

impl AsmWriter for AvrWriter {
    fn write_insn(
        &mut self,
        out: &mut dyn io::Write,
        _p: &Platform,
        frame: &FrameInfo,
        insn: &Insn,
    ) -> io::Result<()> {
        use Opcode::*;
        let op = insn.op();

        if let Some(l) = insn.label() {
            if op == Label {
                return writeln!(out, "{}:", label(l.index() as u64));
            }
            if op.is_branch() && op != Call {
                self.scratch.clear();
                self.scratch.push_str(&label(l.index() as u64));
                let target = self.scratch.clone();
                return Self::write_branch(out, op, &target);
            }
        }

        match op {
            Nop => writeln!(out, "\tnop"),
            Add | Adc | Sub | Sbc | And | Or | Xor => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                if d.size() == RegSize::S16 {
                    // adiw/sbiw on a pointer pair.
                    let (lo, _) = pair(d);
                    let mn = if op == Add { "adiw" } else { "sbiw" };
                    return writeln!(out, "\t{} {}, {}", mn, lo, insn.imm().unwrap_or(0));
                }
                if let Some(imm) = insn.imm() {
                    let mn = match op {
                        Sub => "subi",
                        Sbc => "sbci",
                        And => "andi",
                        Or => "ori",
                        _ => return Err(bad(op)),
                    };
                    return writeln!(out, "\t{} {}, {}", mn, d.name(), imm);
                }
                let s2 = insn.src2().ok_or_else(|| bad(op))?;
                if op == Xor && s2 == d {
                    return writeln!(out, "\tclr {}", d.name());
                }
                let mn = match op {
                    Add => "add",
                    Adc => "adc",
                    Sub => "sub",
                    Sbc => "sbc",
                    And => "and",
                    Or => "or",
                    Xor => "eor",
                    _ => unreachable!(),
                };
                writeln!(out, "\t{} {}, {}", mn, d.name(), s2.name())
            }
            Not => writeln!(out, "\tcom {}", insn.dest().ok_or_else(|| bad(op))?.name()),
            Neg => writeln!(out, "\tneg {}", insn.dest().ok_or_else(|| bad(op))?.name()),
            Lsl | Lsr | Asr => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let mn = match op {
                    Lsl => "lsl",
                    Lsr => "lsr",
                    _ => "asr",
                };
                for _ in 0..insn.imm().unwrap_or(1) {
                    writeln!(out, "\t{} {}", mn, d.name())?;
                }
                Ok(())
            }
            Ror | Rol => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                writeln!(out, "\tswap {}", d.name())
            }
            Mov => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let s = insn.src1().ok_or_else(|| bad(op))?;
                if d.size() == RegSize::S8 {
                    return writeln!(out, "\tmov {}, {}", d.name(), s.name());
                }
                if s.flags().contains(RegFlags::STACK_PTR) {
                    let (lo, hi) = pair(d);
                    writeln!(out, "\tin {}, 0x3d", lo)?;
                    return writeln!(out, "\tin {}, 0x3e", hi);
                }
                if d.flags().contains(RegFlags::STACK_PTR) {
                    let (lo, hi) = pair(s);
                    writeln!(out, "\tout 0x3e, {}", hi)?;
                    return writeln!(out, "\tout 0x3d, {}", lo);
                }
                let (dlo, _) = pair(d);
                let (slo, _) = pair(s);
                writeln!(out, "\tmovw {}, {}", dlo, slo)
            }
            MovImm => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let imm = insn.imm().unwrap_or(0);
                if d.size() == RegSize::S8 {
                    return writeln!(out, "\tldi {}, {}", d.name(), imm & 0xff);
                }
                let (lo, hi) = pair(d);
                writeln!(out, "\tldi {}, {}", lo, imm & 0xff)?;
                writeln!(out, "\tldi {}, {}", hi, (imm >> 8) & 0xff)
            }
            Ldb => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let base = insn.src1().ok_or_else(|| bad(op))?;
                Self::write_load_byte(out, d.name(), base, insn.imm().unwrap_or(0) as u32)
            }
            Ldh => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let base = insn.src1().ok_or_else(|| bad(op))?;
                let disp = insn.imm().unwrap_or(0) as u32;
                let (lo, hi) = pair(d);
                Self::write_load_byte(out, &lo, base, disp)?;
                Self::write_load_byte(out, &hi, base, disp + 1)
            }
            Stb => {
                let base = insn.src1().ok_or_else(|| bad(op))?;
                let s = insn.src2().ok_or_else(|| bad(op))?;
                Self::write_store_byte(out, base, insn.imm().unwrap_or(0) as u32, s.name())
            }
            Sth => {
                let base = insn.src1().ok_or_else(|| bad(op))?;
                let s = insn.src2().ok_or_else(|| bad(op))?;
                let disp = insn.imm().unwrap_or(0) as u32;
                let (lo, hi) = pair(s);
                Self::write_store_byte(out, base, disp, &lo)?;
                Self::write_store_byte(out, base, disp + 1, &hi)
            }
            Ldt => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                if let Some(idx) = insn.src2() {
                    // Tables are 256-aligned, so the low pointer byte is
                    // exactly the index.
                    writeln!(out, "\tmov r30, {}", idx.name())?;
                }
                writeln!(out, "\tlpm {}, Z", d.name())
            }
            Lea => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let (lo, hi) = pair(d);
                let t = table_label(insn.imm().unwrap_or(0));
                writeln!(out, "\tldi {}, lo8({})", lo, t)?;
                writeln!(out, "\tldi {}, hi8({})", hi, t)
            }
            LdArg => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                let disp = frame.arg_base() + insn.imm().unwrap_or(0) as u32;
                if d.size() == RegSize::S8 {
                    return writeln!(out, "\tldd {}, Y+{}", d.name(), disp);
                }
                let (lo, hi) = pair(d);
                writeln!(out, "\tldd {}, Y+{}", lo, disp)?;
                writeln!(out, "\tldd {}, Y+{}", hi, disp + 1)
            }
            Push => {
                let s = insn.src1().ok_or_else(|| bad(op))?;
                if s.size() == RegSize::S8 {
                    return writeln!(out, "\tpush {}", s.name());
                }
                let (lo, hi) = pair(s);
                writeln!(out, "\tpush {}", lo)?;
                writeln!(out, "\tpush {}", hi)
            }
            Pop => {
                let d = insn.dest().ok_or_else(|| bad(op))?;
                if d.size() == RegSize::S8 {
                    return writeln!(out, "\tpop {}", d.name());
                }
                let (lo, hi) = pair(d);
                writeln!(out, "\tpop {}", hi)?;
                writeln!(out, "\tpop {}", lo)
            }
            Cmp => {
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                if let Some(imm) = insn.imm() {
                    writeln!(out, "\tcpi {}, {}", s1.name(), imm)
                } else {
                    let s2 = insn.src2().ok_or_else(|| bad(op))?;
                    writeln!(out, "\tcp {}, {}", s1.name(), s2.name())
                }
            }
            Cmpc => {
                let s1 = insn.src1().ok_or_else(|| bad(op))?;
                let s2 = insn.src2().ok_or_else(|| bad(op))?;
                writeln!(out, "\tcpc {}, {}", s1.name(), s2.name())
            }
            Call => writeln!(out, "\trcall {}", label(insn.imm().unwrap_or(0))),
            Ret => writeln!(out, "\tret"),
            Print => writeln!(out, "\t; print {}", insn.src1().map(|r| r.name()).unwrap_or("?")),
            _ => Err(bad(op)),
        }
    }
}
