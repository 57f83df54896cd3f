//! Virtual instruction records
//!
//! A record is a tagged value: an opcode plus whichever operand fields the
//! opcode uses. Records carry no semantics of their own; the interpreter
//! and the platform writers assign meaning.

use crate::reg::SizedReg;

use bitflags::bitflags;

use std::fmt;

/// Opcodes of the virtual instruction set.
///
/// One enumeration is the single source of truth; the interpreter's
/// evaluators and each platform's lowering tables are keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Opcode {
    /// Does nothing; also the "unknown" sentinel.
    Nop = 0,

    /// `dest = src1 + src2` (or `src1 + imm`).
    Add,
    /// `dest = src1 + src2 + carry`.
    Adc,
    /// `dest = src1 - src2` (or `src1 - imm`).
    Sub,
    /// `dest = src1 - src2 - borrow`.
    Sbc,
    /// `dest = src2 - src1` (reverse subtract).
    Rsb,

    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise exclusive OR.
    Xor,
    /// Bit clear: `dest = src1 & !src2`.
    Bic,

    /// Bitwise complement.
    Not,
    /// Two's-complement negation.
    Neg,
    /// Sign-extend from `imm` bits.
    Sext,
    /// Zero-extend from `imm` bits.
    Zext,
    /// Byte swap at the operand width.
    Rev,

    /// Arithmetic shift right by register or immediate count.
    Asr,
    /// Logical shift left.
    Lsl,
    /// Logical shift right.
    Lsr,
    /// Rotate left.
    Rol,
    /// Rotate right.
    Ror,
    /// Funnel shift left: `dest = ((src1:src2) << imm)` high half.
    Fshl,
    /// Funnel shift right: `dest = ((src1:src2) >> imm)` low half.
    Fshr,

    /// Register-to-register move.
    Mov,
    /// Move immediate.
    MovImm,
    /// Move complemented immediate: `dest = !imm`.
    MvnImm,
    /// Move 16-bit immediate, zeroing the upper half.
    MovImm16,
    /// Write a 16-bit immediate into the upper half, keeping the lower.
    MovtImm16,

    /// Load byte.
    Ldb,
    /// Load sign-extended byte.
    Ldbs,
    /// Load 16-bit half.
    Ldh,
    /// Load sign-extended half.
    Ldhs,
    /// Load 32-bit word.
    Ldw,
    /// Load sign-extended word.
    Ldws,
    /// Load 64-bit doubleword.
    Ldd,
    /// Load a byte from an embedded table: `dest = tab[base + src2 + imm]`.
    /// Targets with a separate program memory render this differently from
    /// a plain byte load.
    Ldt,
    /// Store byte.
    Stb,
    /// Store half.
    Sth,
    /// Store word.
    Stw,
    /// Store doubleword.
    Std,

    /// Push one register.
    Push,
    /// Pop one register.
    Pop,
    /// Load an overflow argument from `imm` bytes above the stacked
    /// return address.
    LdArg,
    /// Load the address of S-box table `imm`.
    Lea,

    /// Unconditional branch.
    B,
    /// Branch if equal.
    Beq,
    /// Branch if not equal.
    Bne,
    /// Branch if signed less-than.
    Blt,
    /// Branch if signed less-or-equal.
    Ble,
    /// Branch if signed greater-than.
    Bgt,
    /// Branch if signed greater-or-equal.
    Bge,
    /// Branch if unsigned lower.
    Bltu,
    /// Branch if unsigned lower-or-same.
    Bleu,
    /// Branch if unsigned higher.
    Bgtu,
    /// Branch if unsigned higher-or-same.
    Bgeu,

    /// Fused compare-and-branch if equal.
    Cbeq,
    /// Fused compare-and-branch if not equal.
    Cbne,
    /// Fused compare-and-branch if signed less-than.
    Cblt,
    /// Fused compare-and-branch if signed greater-or-equal.
    Cbge,
    /// Fused compare-and-branch if unsigned lower.
    Cbltu,
    /// Fused compare-and-branch if unsigned higher-or-same.
    Cbgeu,

    /// Compare: subtract without writeback, setting flags.
    Cmp,
    /// Compare with borrow: continue a multi-limb compare.
    Cmpc,

    /// Bind a label at this position.
    Label,
    /// Call an in-function subroutine label.
    Call,
    /// Return from the function or subroutine.
    Ret,
    /// Interpreter-only diagnostic print of `src1`.
    Print,
    /// Pseudo-instruction marking S-box table `imm`; emitted after the
    /// body, skipped by the interpreter.
    Table,
}

impl Opcode {
    /// Whether the opcode is a branch carrying a label index.
    pub fn is_branch(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            B | Beq
                | Bne
                | Blt
                | Ble
                | Bgt
                | Bge
                | Bltu
                | Bleu
                | Bgtu
                | Bgeu
                | Cbeq
                | Cbne
                | Cblt
                | Cbge
                | Cbltu
                | Cbgeu
                | Call
        )
    }

    /// Whether the opcode loads from memory.
    pub fn is_load(self) -> bool {
        use Opcode::*;
        matches!(self, Ldb | Ldbs | Ldh | Ldhs | Ldw | Ldws | Ldd | Ldt)
    }

    /// Whether the opcode stores to memory.
    pub fn is_store(self) -> bool {
        use Opcode::*;
        matches!(self, Stb | Sth | Stw | Std)
    }

    /// Access width in bytes for loads and stores.
    pub fn mem_bytes(self) -> Option<u32> {
        use Opcode::*;
        match self {
            Ldb | Ldbs | Stb | Ldt => Some(1),
            Ldh | Ldhs | Sth => Some(2),
            Ldw | Ldws | Stw => Some(4),
            Ldd | Std => Some(8),
            _ => None,
        }
    }
}

/// Inline transformation of a shifted source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ShiftOp {
    /// Arithmetic shift right.
    Asr,
    /// Logical shift left.
    Lsl,
    /// Logical shift right.
    Lsr,
    /// Rotate right.
    Ror,
}

bitflags! {
    /// Per-record options.
    pub struct InsnOpts: u8 {
        /// Prefer the platform's short encoding.
        const SHORT = 0x01;
        /// Update the condition flags.
        const SET_FLAGS = 0x02;
    }
}

/// An opaque branch target issued by the code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Label(pub(crate) u32);

impl Label {
    /// The label's index, usable as a table key.
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// One virtual instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    op: Opcode,
    dest: Option<SizedReg>,
    src1: Option<SizedReg>,
    src2: Option<SizedReg>,
    imm: Option<u64>,
    shift: Option<(ShiftOp, u8)>,
    opts: InsnOpts,
    sched: i8,
}

impl Insn {
    /// A record with only the opcode set.
    pub fn new(op: Opcode) -> Self {
        Self {
            op,
            dest: None,
            src1: None,
            src2: None,
            imm: None,
            shift: None,
            opts: InsnOpts::empty(),
            sched: 0,
        }
    }

    /// Set the destination operand.
    pub fn with_dest(mut self, r: SizedReg) -> Self {
        self.dest = Some(r);
        self
    }

    /// Set the first source operand.
    pub fn with_src1(mut self, r: SizedReg) -> Self {
        self.src1 = Some(r);
        self
    }

    /// Set the second source operand.
    pub fn with_src2(mut self, r: SizedReg) -> Self {
        self.src2 = Some(r);
        self
    }

    /// Set the immediate.
    pub fn with_imm(mut self, imm: u64) -> Self {
        self.imm = Some(imm);
        self
    }

    /// Set a label target (stored in the immediate field).
    pub fn with_label(mut self, label: Label) -> Self {
        self.imm = Some(label.0 as u64);
        self
    }

    /// Set the shift modifier.
    pub fn with_shift(mut self, op: ShiftOp, count: u8) -> Self {
        self.shift = Some((op, count));
        self
    }

    /// Add options.
    pub fn with_opts(mut self, opts: InsnOpts) -> Self {
        self.opts |= opts;
        self
    }

    /// Request a flags update.
    pub fn setting_flags(self, set: bool) -> Self {
        if set {
            self.with_opts(InsnOpts::SET_FLAGS)
        } else {
            self
        }
    }

    /// Opcode.
    pub const fn op(&self) -> Opcode {
        self.op
    }

    /// Destination operand.
    pub const fn dest(&self) -> Option<&SizedReg> {
        self.dest.as_ref()
    }

    /// First source operand.
    pub const fn src1(&self) -> Option<&SizedReg> {
        self.src1.as_ref()
    }

    /// Second source operand.
    pub const fn src2(&self) -> Option<&SizedReg> {
        self.src2.as_ref()
    }

    /// Immediate, if populated.
    pub const fn imm(&self) -> Option<u64> {
        self.imm
    }

    /// Label target, if the opcode is a branch.
    pub fn label(&self) -> Option<Label> {
        if self.op.is_branch() || self.op == Opcode::Label {
            self.imm.map(|i| Label(i as u32))
        } else {
            None
        }
    }

    /// Shift modifier, if populated.
    pub const fn shift(&self) -> Option<(ShiftOp, u8)> {
        self.shift
    }

    /// Options.
    pub const fn opts(&self) -> InsnOpts {
        self.opts
    }

    /// Whether a flags update was requested.
    pub fn sets_flags(&self) -> bool {
        self.opts.contains(InsnOpts::SET_FLAGS)
    }

    /// Scheduling displacement for the emitter.
    pub const fn sched(&self) -> i8 {
        self.sched
    }

    /// Set the scheduling displacement.
    pub fn set_sched(&mut self, sched: i8) {
        self.sched = sched;
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if let Some(d) = &self.dest {
            write!(f, " {:?}", d)?;
        }
        if let Some(s) = &self.src1 {
            write!(f, ", {:?}", s)?;
        }
        if let Some(s) = &self.src2 {
            write!(f, ", {:?}", s)?;
        }
        if let Some(i) = self.imm {
            write!(f, ", #{:#x}", i)?;
        }
        if let Some((op, n)) = self.shift {
            write!(f, ", {:?} #{}", op, n)?;
        }
        Ok(())
    }
}
