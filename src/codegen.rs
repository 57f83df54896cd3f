//! Per-function code generation
//!
//! A [`CodeGen`] owns one function under construction: the instruction
//! buffer, the register allocation masks, the frame layout and the S-box
//! tables. Structured operations lower multi-limb intents into records
//! through the platform's hooks; `finish` wraps the buffer with the
//! prologue and epilogue and resolves labels.

use crate::error::{Error, Result};
use crate::insn::{Insn, Label, Opcode};
use crate::platform::{FrameInfo, Platform};
use crate::reg::{Reg, RegFlags, RegSize, SizedReg};

use tracing::debug;

mod alloc;
mod args;
mod ops;
mod prologue;
mod rotate;
mod sbox;

/// Lifecycle of a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CgState {
    /// Created; arguments may still be declared.
    Open,
    /// Prologue issued; allocation and emission are legal.
    Body,
    /// Closed; any further use is an error.
    Finalised,
}

/// A finished function: records, tables and frame facts.
#[derive(Debug)]
pub struct Func {
    name: String,
    insns: Vec<Insn>,
    sboxes: Vec<Vec<u8>>,
    frame: FrameInfo,
}

impl Func {
    /// Function name, used for the emitted label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The instruction records in program order.
    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    /// Embedded S-box tables.
    pub fn sboxes(&self) -> &[Vec<u8>] {
        &self.sboxes
    }

    /// Frame facts for writers and drivers.
    pub fn frame(&self) -> &FrameInfo {
        &self.frame
    }
}

/// Builder for one function on one platform.
pub struct CodeGen<'p> {
    platform: &'p Platform,
    name: String,
    buf: Vec<Insn>,
    sboxes: Vec<Vec<u8>>,
    alloc_size: RegSize,
    allocated: u64,
    ever_used: u64,
    granted: u64,
    frame_bytes: u32,
    stack_args: bool,
    next_label: u32,
    state: CgState,
    sbox_stake: Option<SizedReg>,
}

impl<'p> CodeGen<'p> {
    /// A fresh generator for one function on `platform`.
    pub fn new(platform: &'p Platform) -> Self {
        Self {
            platform,
            name: String::new(),
            buf: Vec::new(),
            sboxes: Vec::new(),
            alloc_size: platform.word_size(),
            allocated: 0,
            ever_used: 0,
            granted: 0,
            frame_bytes: 0,
            stack_args: false,
            next_label: 0,
            state: CgState::Open,
            sbox_stake: None,
        }
    }

    /// The platform this function targets.
    pub fn platform(&self) -> &'p Platform {
        self.platform
    }

    /// Function name set by the prologue verb.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The records generated so far.
    pub fn insns(&self) -> &[Insn] {
        &self.buf
    }

    /// Currently reserved physical registers, as a number-indexed mask.
    pub fn allocated_mask(&self) -> u64 {
        self.allocated
    }

    /// Every register ever reserved; sticky across release.
    pub fn ever_used_mask(&self) -> u64 {
        self.ever_used
    }

    /// Rounded local frame size.
    pub fn frame_bytes(&self) -> u32 {
        self.frame_bytes
    }

    /// Narrow (or restore) the default allocation limb size.
    pub fn set_alloc_size(&mut self, size: RegSize) {
        self.alloc_size = size;
    }

    /// Default allocation limb size.
    pub fn alloc_size(&self) -> RegSize {
        self.alloc_size
    }

    pub(crate) fn push(&mut self, insn: Insn) {
        self.buf.push(insn);
    }

    pub(crate) fn check_body(&self) -> Result<()> {
        match self.state {
            CgState::Body => Ok(()),
            CgState::Finalised => Err(Error::Finalised),
            CgState::Open => Err(Error::InvalidArgument("no prologue was issued")),
        }
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            CgState::Open => Ok(()),
            CgState::Finalised => Err(Error::Finalised),
            CgState::Body => Err(Error::InvalidArgument("arguments must precede the prologue")),
        }
    }

    fn enter_body(&mut self, name: &str) {
        self.name = name.to_string();
        self.state = CgState::Body;
    }

    /// Grant use of an otherwise-reserved register, by name.
    pub fn grant(&mut self, name: &str) -> Result<()> {
        let reg = self
            .platform
            .reg_by_name(name)
            .ok_or(Error::InvalidArgument("unknown register name"))?;
        if self.frame_bytes > 0 && reg.number() == self.platform.frame_base().number() {
            return Err(Error::InvalidArgument("frame base is carrying the frame"));
        }
        self.granted |= 1u64 << reg.number();
        Ok(())
    }

    /// Reserve `bytes` of locals, rounded up to the address word.
    ///
    /// Locals are addressed `[0, bytes)` upward from the frame base.
    pub fn setup_locals(&mut self, bytes: u32) -> Result<()> {
        self.check_body()?;
        let align = self.platform.addr_size().bytes();
        let rounded = (bytes + align - 1) / align * align;
        if rounded > self.platform.frame_limit() {
            return Err(Error::FrameTooLarge {
                platform: self.platform.name(),
                bytes: rounded,
                limit: self.platform.frame_limit(),
            });
        }
        let fb = self.platform.frame_base().number();
        if rounded > 0 && self.granted & (1u64 << fb) != 0 {
            return Err(Error::InvalidArgument("frame base was granted away"));
        }
        self.frame_bytes = rounded;
        Ok(())
    }

    /// A one-limb register addressing the local frame.
    pub fn local_base(&self) -> Reg {
        Reg::from_limbs(vec![self.platform.frame_reg()]).expect("frame base is a register")
    }

    /// Issue a new, unbound label.
    pub fn new_label(&mut self) -> Label {
        let l = Label(self.next_label);
        self.next_label += 1;
        l
    }

    /// Bind `label` at the current position.
    pub fn bind(&mut self, label: Label) -> Result<()> {
        self.check_body()?;
        self.push(Insn::new(Opcode::Label).with_label(label));
        Ok(())
    }

    /// Mark the `nth`-from-tail record with an emission displacement of
    /// `offset` positions.
    pub fn reschedule(&mut self, offset: i8, nth_from_tail: usize) -> Result<()> {
        self.check_body()?;
        let len = self.buf.len();
        if nth_from_tail >= len {
            return Err(Error::InvalidArgument("reschedule reaches before the buffer"));
        }
        self.buf[len - 1 - nth_from_tail].set_sched(offset);
        Ok(())
    }

    /// Close the function: insert the prologue, append the epilogue and
    /// table markers, and verify every branch target.
    ///
    /// The generator is finalised afterwards; any further use fails.
    pub fn finish(&mut self) -> Result<Func> {
        self.check_body()?;

        // Callee-saved registers that were ever touched, in inventory
        // order; the frame base joins them when a frame or stack argument
        // forces it into service.
        let needs_frame = self.frame_bytes > 0
            || (self.stack_args
                && self.platform.frame_base().number() != self.platform.stack_ptr().number());
        if needs_frame {
            self.ever_used |= 1u64 << self.platform.frame_base().number();
        }

        let word = self.platform.word_size();
        let mut saved: Vec<SizedReg> = Vec::new();
        for reg in self.platform.regs() {
            if !reg.flags().contains(RegFlags::CALLEE_SAVED) {
                continue;
            }
            if self.ever_used & (1u64 << reg.number()) == 0 {
                continue;
            }
            let size = if reg.supports(word) {
                word
            } else {
                self.platform.addr_size()
            };
            saved.push(SizedReg::new(reg.clone(), size)?);
        }

        let mut prologue: Vec<Insn> = Vec::new();
        for r in &saved {
            prologue.push(Insn::new(Opcode::Push).with_src1(r.clone()));
        }
        if needs_frame {
            self.platform.frame_setup(&mut prologue, self.frame_bytes)?;
        }

        let mut epilogue: Vec<Insn> = Vec::new();
        if needs_frame {
            self.platform.frame_teardown(&mut epilogue, self.frame_bytes)?;
        }
        for r in saved.iter().rev() {
            epilogue.push(Insn::new(Opcode::Pop).with_dest(r.clone()));
        }
        epilogue.push(Insn::new(Opcode::Ret));

        let mut insns = prologue;
        insns.append(&mut self.buf);
        insns.append(&mut epilogue);
        for i in 0..self.sboxes.len() {
            insns.push(Insn::new(Opcode::Table).with_imm(i as u64));
        }

        // Every branch target must be bound exactly once.
        let mut bound = vec![0u32; self.next_label as usize];
        for insn in &insns {
            if insn.op() == Opcode::Label {
                if let Some(l) = insn.label() {
                    match bound.get_mut(l.index() as usize) {
                        Some(slot) => *slot += 1,
                        None => return Err(Error::UnresolvedLabel(l)),
                    }
                }
            }
        }
        for insn in &insns {
            if insn.op().is_branch() {
                let l = insn.label().ok_or(Error::InvalidArgument("branch without target"))?;
                if bound.get(l.index() as usize).copied().unwrap_or(0) != 1 {
                    return Err(Error::UnresolvedLabel(l));
                }
            }
        }

        let saved_bytes = saved.iter().map(|r| r.size().bytes()).sum();
        let frame = FrameInfo {
            frame_bytes: self.frame_bytes,
            saved_bytes,
            ret_bytes: self.platform.ret_bytes(),
        };
        debug!(
            name = %self.name,
            insns = insns.len(),
            frame = self.frame_bytes,
            saved = saved.len(),
            "function finalised"
        );

        self.state = CgState::Finalised;
        Ok(Func {
            name: std::mem::take(&mut self.name),
            insns,
            sboxes: std::mem::take(&mut self.sboxes),
            frame,
        })
    }
}
