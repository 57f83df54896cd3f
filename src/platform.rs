//! Target platform descriptions
//!
//! A [`Platform`] is static after construction: it owns the register
//! inventory (whose order *is* the allocation policy), the argument
//! register list, the stack pointer, and a feature set. Instruction
//! selection is dispatched through [`PlatformKind`] to one lowering table
//! per target; there is no inheritance beyond that.

use crate::error::Result;
use crate::insn::{Insn, Opcode, ShiftOp};
use crate::reg::{BaseReg, RegSize, SizedReg};

use bitflags::bitflags;

use std::io;
use std::sync::Arc;

mod arm;
mod arm64;
mod avr;
mod thumb;

bitflags! {
    /// Per-target capability flags.
    pub struct PlatformFeatures: u16 {
        /// Destructive two-address ALU encodings.
        const TWO_ADDRESS = 0x0001;
        /// Three-address ALU encodings.
        const THREE_ADDRESS = 0x0002;
        /// A source operand can be shifted inline with an ALU operation.
        const SHIFT_OPERAND = 0x0004;
        /// The register file splits into classes of unequal capability.
        const SPLIT_CLASSES = 0x0008;
        /// Few registers; generators should spill early.
        const REGISTER_POOR = 0x0010;
        /// Many registers; generators can keep whole states resident.
        const REGISTER_RICH = 0x0020;
        /// No rotate instructions; rotations are synthesised from shifts.
        const SHIFTS_ONLY = 0x0040;
        /// Funnel shifts over a register pair exist.
        const FUNNEL_SHIFT = 0x0080;
        /// An and-not (bit clear) instruction exists.
        const BIT_CLEAR = 0x0100;
        /// Memory is big-endian.
        const BIG_ENDIAN = 0x0200;
        /// Unary operations take a separate destination.
        const UNARY_DEST = 0x0400;
        /// Fused compare-and-branch forms exist.
        const COMPARE_AND_BRANCH = 0x0800;
    }
}

/// The targets this crate describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformKind {
    /// 8-bit accumulator/pointer target with constrained addressing.
    Avr,
    /// 32-bit load/store, three-address, shift-and-operate.
    Arm,
    /// Two-address 32-bit subset with split register classes.
    Thumb,
    /// 32-on-64 mode: 32-bit words in 64-bit registers, 64-bit addresses.
    Arm64,
}

/// Declared type of a function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Unsigned 8-bit.
    U8,
    /// Signed 8-bit.
    I8,
    /// Unsigned 16-bit.
    U16,
    /// Signed 16-bit.
    I16,
    /// Unsigned 32-bit.
    U32,
    /// Signed 32-bit.
    I32,
    /// Unsigned 64-bit.
    U64,
    /// Signed 64-bit.
    I64,
    /// Pointer, one register of address-carrier width.
    Ptr,
}

impl ArgType {
    /// Declared width in bits, before rounding.
    pub fn declared_bits(self) -> u32 {
        match self {
            Self::U8 | Self::I8 => 8,
            Self::U16 | Self::I16 => 16,
            Self::U32 | Self::I32 => 32,
            Self::U64 | Self::I64 => 64,
            Self::Ptr => 0,
        }
    }

    /// Width in bits on `platform`: sub-native widths round up to native,
    /// pointers take the address word size.
    pub fn bits(self, platform: &Platform) -> u32 {
        match self {
            Self::Ptr => platform.addr_size().bits(),
            other => other.declared_bits().max(platform.word_size().bits()),
        }
    }
}

/// Where one argument lives on entry.
#[derive(Debug, Clone)]
pub(crate) enum ArgLoc {
    /// In registers; limbs least significant first.
    Regs(Vec<SizedReg>),
    /// On the stack, `offset` bytes above the stacked return address.
    Stack {
        /// Byte offset above the return address.
        offset: u32,
        /// Rounded size in bytes.
        bytes: u32,
    },
}

/// Per-platform instruction selection and validation hooks.
///
/// One method per hook; implementations translate a generic intent into
/// one or more records, preferring the shortest encoding the target has.
pub(crate) trait Lowering {
    fn unary(
        &self,
        p: &Platform,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src: &SizedReg,
    ) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    fn binary(
        &self,
        p: &Platform,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src1: &SizedReg,
        src2: &SizedReg,
        set_flags: bool,
    ) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    fn binary_shifted(
        &self,
        p: &Platform,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src1: &SizedReg,
        src2: &SizedReg,
        shift: (ShiftOp, u8),
        set_flags: bool,
    ) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    fn binary_imm(
        &self,
        p: &Platform,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src1: &SizedReg,
        imm: u64,
        set_flags: bool,
    ) -> Result<()>;

    fn move_imm(&self, p: &Platform, buf: &mut Vec<Insn>, dest: &SizedReg, imm: u64) -> Result<()>;

    /// Whether `imm` fits the legal immediate encoding of `op` at `size`.
    fn valid_imm(&self, op: Opcode, size: RegSize, imm: u64) -> bool;

    /// Whether `disp` is a legal load/store displacement for `op`.
    fn valid_disp(&self, op: Opcode, size: RegSize, base: &SizedReg, disp: i32) -> bool;

    /// Whether a single rotate instruction covers `count` bits at `size`.
    fn native_rotate(&self, size: RegSize, count: u8) -> bool;

    /// Whether an add-with-immediate encoding exists (targets without one
    /// get the subtract-the-negation rewrite).
    fn has_add_imm(&self) -> bool {
        true
    }

    /// Emit the frame-carving records of a prologue.
    fn frame_setup(&self, p: &Platform, buf: &mut Vec<Insn>, bytes: u32) -> Result<()>;

    /// Emit the frame-releasing records of an epilogue.
    fn frame_teardown(&self, p: &Platform, buf: &mut Vec<Insn>, bytes: u32) -> Result<()>;

    /// A fresh per-function assembly writer.
    fn writer(&self) -> Box<dyn AsmWriter>;
}

/// Per-function assembly text renderer.
///
/// A writer is created per function, so any auxiliary state it keeps is
/// reset between functions.
pub trait AsmWriter {
    /// Render one instruction (possibly as several lines).
    fn write_insn(
        &mut self,
        out: &mut dyn io::Write,
        p: &Platform,
        frame: &FrameInfo,
        insn: &Insn,
    ) -> io::Result<()>;
}

/// Facts a writer needs to turn abstract offsets into concrete ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInfo {
    /// Rounded local frame size in bytes.
    pub frame_bytes: u32,
    /// Bytes of callee-saved registers pushed by the prologue.
    pub saved_bytes: u32,
    /// Size of the stacked return address on this target.
    pub ret_bytes: u32,
}

impl FrameInfo {
    /// Distance from the frame base to the first stacked argument.
    pub fn arg_base(&self) -> u32 {
        self.frame_bytes + self.saved_bytes + self.ret_bytes
    }
}

/// Static description of one target.
pub struct Platform {
    name: &'static str,
    kind: PlatformKind,
    word_size: RegSize,
    addr_size: RegSize,
    features: PlatformFeatures,
    regs: Vec<Arc<BaseReg>>,
    args: Vec<Arc<BaseReg>>,
    sp: Arc<BaseReg>,
    frame_base: Arc<BaseReg>,
    table_ptr: Option<Arc<BaseReg>>,
    frame_limit: u32,
    ret_bytes: u32,
    code_align: u32,
    comment: &'static str,
}

impl Platform {
    /// The 8-bit accumulator/pointer target.
    pub fn avr() -> Self {
        avr::platform()
    }

    /// The 32-bit three-address target.
    pub fn arm() -> Self {
        arm::platform()
    }

    /// The two-address split-class 32-bit target.
    pub fn thumb() -> Self {
        thumb::platform()
    }

    /// The 32-on-64 target record.
    pub fn arm64() -> Self {
        arm64::platform()
    }

    /// Look a platform up by tag.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "avr" => Some(Self::avr()),
            "arm" => Some(Self::arm()),
            "thumb" => Some(Self::thumb()),
            "arm64" => Some(Self::arm64()),
            _ => None,
        }
    }

    /// Platform tag.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Dispatch kind.
    pub const fn kind(&self) -> PlatformKind {
        self.kind
    }

    /// Native word size.
    pub const fn word_size(&self) -> RegSize {
        self.word_size
    }

    /// Address word size; differs from the native word in 32-on-64 mode.
    pub const fn addr_size(&self) -> RegSize {
        self.addr_size
    }

    /// Feature set.
    pub const fn features(&self) -> PlatformFeatures {
        self.features
    }

    /// Whether every feature in `f` is present.
    pub fn has(&self, f: PlatformFeatures) -> bool {
        self.features.contains(f)
    }

    /// Register inventory in allocation order.
    pub fn regs(&self) -> &[Arc<BaseReg>] {
        &self.regs
    }

    /// Argument registers in caller order.
    pub fn arg_regs(&self) -> &[Arc<BaseReg>] {
        &self.args
    }

    /// The stack pointer.
    pub fn stack_ptr(&self) -> &Arc<BaseReg> {
        &self.sp
    }

    /// The register locals are addressed from.
    pub fn frame_base(&self) -> &Arc<BaseReg> {
        &self.frame_base
    }

    /// The register staked for S-box table access, if the target
    /// dedicates one.
    pub fn table_ptr(&self) -> Option<&Arc<BaseReg>> {
        self.table_ptr.as_ref()
    }

    /// Largest frame a single prologue adjustment can carve.
    pub const fn frame_limit(&self) -> u32 {
        self.frame_limit
    }

    /// Bytes the call instruction stacks for its return address.
    pub const fn ret_bytes(&self) -> u32 {
        self.ret_bytes
    }

    /// Code alignment in bytes.
    pub const fn code_align(&self) -> u32 {
        self.code_align
    }

    /// Assembly comment prefix.
    pub const fn comment(&self) -> &'static str {
        self.comment
    }

    /// Find a register by its low-level number.
    pub fn reg_by_number(&self, number: u8) -> Option<&Arc<BaseReg>> {
        self.regs.iter().find(|r| r.number() == number)
    }

    /// Find a register by any of its size-specific names.
    pub fn reg_by_name(&self, name: &str) -> Option<&Arc<BaseReg>> {
        self.regs.iter().find(|r| {
            [RegSize::S8, RegSize::S16, RegSize::S32, RegSize::S64]
                .into_iter()
                .any(|s| r.name(s) == Some(name))
                || r.addr_name() == Some(name)
        })
    }

    /// A sized view of the stack pointer.
    pub fn sp_reg(&self) -> SizedReg {
        SizedReg::new(self.sp.clone(), self.addr_size).expect("SP supports the address size")
    }

    /// A sized view of the frame base register.
    pub fn frame_reg(&self) -> SizedReg {
        SizedReg::new(self.frame_base.clone(), self.addr_size).expect("frame base supports the address size")
    }

    pub(crate) fn isa(&self) -> &'static dyn Lowering {
        match self.kind {
            PlatformKind::Avr => &avr::AvrIsa,
            PlatformKind::Arm => &arm::ArmIsa,
            PlatformKind::Thumb => &thumb::ThumbIsa,
            PlatformKind::Arm64 => &arm64::Arm64Isa,
        }
    }

    /// Lower a unary operation.
    pub fn unary(&self, buf: &mut Vec<Insn>, op: Opcode, dest: &SizedReg, src: &SizedReg) -> Result<()> {
        self.isa().unary(self, buf, op, dest, src)
    }

    /// Lower a binary register-register operation.
    pub fn binary(
        &self,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src1: &SizedReg,
        src2: &SizedReg,
        set_flags: bool,
    ) -> Result<()> {
        self.isa().binary(self, buf, op, dest, src1, src2, set_flags)
    }

    /// Lower a binary operation with an inline-shifted second source.
    #[allow(clippy::too_many_arguments)]
    pub fn binary_shifted(
        &self,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src1: &SizedReg,
        src2: &SizedReg,
        shift: (ShiftOp, u8),
        set_flags: bool,
    ) -> Result<()> {
        self.isa().binary_shifted(self, buf, op, dest, src1, src2, shift, set_flags)
    }

    /// Lower a binary operation with an immediate.
    pub fn binary_imm(
        &self,
        buf: &mut Vec<Insn>,
        op: Opcode,
        dest: &SizedReg,
        src1: &SizedReg,
        imm: u64,
        set_flags: bool,
    ) -> Result<()> {
        self.isa().binary_imm(self, buf, op, dest, src1, imm, set_flags)
    }

    /// Lower a move-immediate, choosing among direct, complemented,
    /// half-word and literal-pool forms.
    pub fn move_imm(&self, buf: &mut Vec<Insn>, dest: &SizedReg, imm: u64) -> Result<()> {
        self.isa().move_imm(self, buf, dest, imm)
    }

    /// Whether `imm` is encodable for `op` at `size`.
    pub fn valid_imm(&self, op: Opcode, size: RegSize, imm: u64) -> bool {
        self.isa().valid_imm(op, size, imm)
    }

    /// Whether `disp` is a legal displacement for `op` from `base`.
    pub fn valid_disp(&self, op: Opcode, size: RegSize, base: &SizedReg, disp: i32) -> bool {
        self.isa().valid_disp(op, size, base, disp)
    }

    pub(crate) fn native_rotate(&self, size: RegSize, count: u8) -> bool {
        self.isa().native_rotate(size, count)
    }

    pub(crate) fn has_add_imm(&self) -> bool {
        self.isa().has_add_imm()
    }

    pub(crate) fn frame_setup(&self, buf: &mut Vec<Insn>, bytes: u32) -> Result<()> {
        self.isa().frame_setup(self, buf, bytes)
    }

    pub(crate) fn frame_teardown(&self, buf: &mut Vec<Insn>, bytes: u32) -> Result<()> {
        self.isa().frame_teardown(self, buf, bytes)
    }

    /// A fresh assembly writer for one function.
    pub fn writer(&self) -> Box<dyn AsmWriter> {
        self.isa().writer()
    }

    /// The odd partner a sized register occupies in addition to its own
    /// number: on 8-bit targets a 16-bit view of an even data register is
    /// a pair and shadows the register above it.
    pub(crate) fn shadow(&self, sr: &SizedReg) -> Option<u8> {
        if self.kind == PlatformKind::Avr
            && sr.size() == RegSize::S16
            && sr.base().supports(RegSize::S8)
        {
            Some(sr.number() + 1)
        } else {
            None
        }
    }

    /// Compute where each declared argument lives on entry.
    ///
    /// Registers are consumed from the argument list in caller order; an
    /// argument that no longer fits goes to the stack, and every later
    /// argument follows it there. The stack cursor advances by each
    /// stacked argument's rounded size.
    pub(crate) fn assign_args(&self, types: &[ArgType]) -> Result<Vec<ArgLoc>> {
        let mut out = Vec::with_capacity(types.len());
        let mut cursor = 0usize;
        let mut stack_off = 0u32;
        let mut overflowed = false;

        for &ty in types {
            let bits = ty.bits(self);
            let bytes = bits / 8;

            if ty == ArgType::Ptr && self.addr_size != self.word_size && self.kind != PlatformKind::Arm64 {
                // Pointer wider than the native word: consume a register
                // pair and view it at the address size.
                let need = (self.addr_size.bits() / self.word_size.bits()) as usize;
                if !overflowed && cursor + need <= self.args.len() {
                    let base = &self.args[cursor];
                    if base.supports(self.addr_size) {
                        let sr = SizedReg::new(base.clone(), self.addr_size)?;
                        cursor += need;
                        out.push(ArgLoc::Regs(vec![sr]));
                        continue;
                    }
                }
                overflowed = true;
                out.push(ArgLoc::Stack { offset: stack_off, bytes });
                stack_off += bytes;
                continue;
            }

            let limb_size = if ty == ArgType::Ptr { self.addr_size } else { self.word_size };
            let limbs = (bits / limb_size.bits()) as usize;
            if !overflowed && cursor + limbs <= self.args.len() {
                let mut regs = Vec::with_capacity(limbs);
                let mut ok = true;
                for i in 0..limbs {
                    let base = &self.args[cursor + i];
                    if !base.supports(limb_size) {
                        ok = false;
                        break;
                    }
                    regs.push(SizedReg::new(base.clone(), limb_size)?);
                }
                if ok {
                    cursor += limbs;
                    out.push(ArgLoc::Regs(regs));
                    continue;
                }
            }
            overflowed = true;
            out.push(ArgLoc::Stack { offset: stack_off, bytes });
            stack_off += bytes;
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("name", &self.name)
            .field("word_size", &self.word_size)
            .field("addr_size", &self.addr_size)
            .field("features", &self.features)
            .finish()
    }
}

/// Shared constructor used by the platform records.
pub(crate) struct PlatformBuilder {
    pub name: &'static str,
    pub kind: PlatformKind,
    pub word_size: RegSize,
    pub addr_size: RegSize,
    pub features: PlatformFeatures,
    pub regs: Vec<Arc<BaseReg>>,
    pub args: Vec<&'static str>,
    pub sp: &'static str,
    pub frame_base: &'static str,
    pub table_ptr: Option<&'static str>,
    pub frame_limit: u32,
    pub ret_bytes: u32,
    pub code_align: u32,
    pub comment: &'static str,
}

impl PlatformBuilder {
    pub(crate) fn build(self) -> Platform {
        let find = |name: &str| -> Arc<BaseReg> {
            self.regs
                .iter()
                .find(|r| {
                    [RegSize::S8, RegSize::S16, RegSize::S32, RegSize::S64]
                        .into_iter()
                        .any(|s| r.name(s) == Some(name))
                })
                .cloned()
                .unwrap_or_else(|| panic!("platform register {name} missing"))
        };
        let args = self.args.iter().map(|n| find(n)).collect();
        let sp = find(self.sp);
        let frame_base = find(self.frame_base);
        let table_ptr = self.table_ptr.map(find);
        Platform {
            name: self.name,
            kind: self.kind,
            word_size: self.word_size,
            addr_size: self.addr_size,
            features: self.features,
            regs: self.regs,
            args,
            sp,
            frame_base,
            table_ptr,
            frame_limit: self.frame_limit,
            ret_bytes: self.ret_bytes,
            code_align: self.code_align,
            comment: self.comment,
        }
    }
}
