//! Bytecode interpreter
//!
//! Executes an instruction buffer over a simulated machine: a
//! byte-addressable physical register file, a flat memory image with a
//! descending stack, and a Z/N/C/V flags word. Each opcode has one
//! reference evaluator; the drivers at the bottom place arguments the way
//! the calling convention does and are the sole mechanism test vectors
//! are validated through.

use crate::codegen::Func;
use crate::error::{Error, Result};
use crate::insn::{Insn, Opcode, ShiftOp};
use crate::platform::{ArgLoc, ArgType, Platform, PlatformFeatures};
use crate::reg::{RegFlags, SizedReg};

use std::collections::HashMap;

use tracing::debug;

const MEM_SIZE: usize = 0x1_0000;
const STACK_TOP: usize = 0xff00;
const STATE_ADDR: usize = 0x0100;
const KEY_ADDR: usize = 0x2000;
const SCHED_ADDR: usize = 0x3000;
const IN_ADDR: usize = 0x4000;
const OUT_ADDR: usize = 0x4800;
const RAND_ADDR: usize = 0x5000;
const TABLE_BASE: usize = 0x8000;
const TABLE_STRIDE: usize = 0x400;
const STEP_LIMIT: u64 = 50_000_000;

fn width_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Simulated machine state for one platform.
pub struct Interpreter<'p> {
    platform: &'p Platform,
    file: Vec<[u8; 8]>,
    mem: Vec<u8>,
    z: bool,
    n: bool,
    c: bool,
    v: bool,
    entry_sp: usize,
}

impl<'p> Interpreter<'p> {
    /// A fresh machine with cleared registers and memory.
    pub fn new(platform: &'p Platform) -> Self {
        Self {
            platform,
            file: vec![[0u8; 8]; 64],
            mem: vec![0u8; MEM_SIZE],
            z: false,
            n: false,
            c: false,
            v: false,
            entry_sp: STACK_TOP,
        }
    }

    /// Raw memory image, for tests that inspect it.
    pub fn memory(&self) -> &[u8] {
        &self.mem
    }

    /// Mutable memory image, for drivers with non-standard layouts.
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    fn read(&self, sr: &SizedReg) -> Result<u64> {
        let slot = self
            .file
            .get(sr.number() as usize)
            .ok_or_else(|| Error::interp(format!("undefined register {}", sr.number())))?;
        let mut v = u64::from_le_bytes(*slot);
        v &= width_mask(sr.size().bits());
        Ok(v)
    }

    fn write(&mut self, sr: &SizedReg, value: u64) -> Result<()> {
        let bits = sr.size().bits();
        let slot = self
            .file
            .get_mut(sr.number() as usize)
            .ok_or_else(|| Error::interp(format!("undefined register {}", sr.number())))?;
        let old = u64::from_le_bytes(*slot);
        let merged = (old & !width_mask(bits)) | (value & width_mask(bits));
        *slot = merged.to_le_bytes();
        Ok(())
    }

    fn sp_reg(&self) -> SizedReg {
        self.platform.sp_reg()
    }

    fn big_endian(&self) -> bool {
        self.platform.has(PlatformFeatures::BIG_ENDIAN)
    }

    fn mem_read(&self, addr: usize, bytes: usize) -> Result<u64> {
        if addr + bytes > self.mem.len() {
            return Err(Error::interp(format!("load at {addr:#x} out of bounds")));
        }
        let mut v = 0u64;
        for i in 0..bytes {
            let b = self.mem[addr + i] as u64;
            if self.big_endian() {
                v = (v << 8) | b;
            } else {
                v |= b << (8 * i);
            }
        }
        Ok(v)
    }

    fn mem_write(&mut self, addr: usize, bytes: usize, value: u64) -> Result<()> {
        if addr + bytes > self.mem.len() {
            return Err(Error::interp(format!("store at {addr:#x} out of bounds")));
        }
        for i in 0..bytes {
            let shift = if self.big_endian() {
                8 * (bytes - 1 - i)
            } else {
                8 * i
            };
            self.mem[addr + i] = ((value >> shift) & 0xff) as u8;
        }
        Ok(())
    }

    fn shifted(&self, value: u64, bits: u32, shift: Option<(ShiftOp, u8)>) -> u64 {
        let mask = width_mask(bits);
        match shift {
            None => value & mask,
            Some((op, n)) => {
                let n = (n as u32) % bits.max(1);
                let v = value & mask;
                let out = match op {
                    ShiftOp::Lsl => v << n,
                    ShiftOp::Lsr => v >> n,
                    ShiftOp::Asr => {
                        let sign = 1u64 << (bits - 1);
                        if v & sign != 0 {
                            (v >> n) | (mask & !(mask >> n))
                        } else {
                            v >> n
                        }
                    }
                    ShiftOp::Ror => {
                        if n == 0 {
                            v
                        } else {
                            (v >> n) | (v << (bits - n))
                        }
                    }
                };
                out & mask
            }
        }
    }

    fn set_nz(&mut self, res: u64, bits: u32) {
        self.z = res & width_mask(bits) == 0;
        self.n = res & (1u64 << (bits - 1)) != 0;
    }

    fn mem_addr(&self, insn: &Insn) -> Result<usize> {
        let base = insn
            .src1()
            .ok_or_else(|| Error::interp("memory access without a base"))?;
        let mut addr = self.read(base)? as usize;
        if let Some(idx) = insn.src2() {
            let mut i = self.read(idx)?;
            if let Some((ShiftOp::Lsl, s)) = insn.shift() {
                i <<= s;
            }
            addr += i as usize;
        }
        addr += insn.imm().unwrap_or(0) as usize;
        Ok(addr)
    }

    fn branch_taken(&self, op: Opcode) -> bool {
        use Opcode::*;
        match op {
            B => true,
            Beq => self.z,
            Bne => !self.z,
            Blt => self.n != self.v,
            Bge => self.n == self.v,
            Ble => self.z || self.n != self.v,
            Bgt => !self.z && self.n == self.v,
            Bltu => self.c,
            Bgeu => !self.c,
            Bleu => self.c || self.z,
            Bgtu => !self.c && !self.z,
            _ => false,
        }
    }

    /// Run `func` to its return, with arguments already in place.
    fn run(&mut self, func: &Func) -> Result<()> {
        let mut labels: HashMap<u32, usize> = HashMap::new();
        for (i, insn) in func.insns().iter().enumerate() {
            if insn.op() == Opcode::Label {
                if let Some(l) = insn.label() {
                    labels.insert(l.index(), i);
                }
            }
        }

        let mut pc = 0usize;
        let mut calls: Vec<usize> = Vec::new();
        let mut steps = 0u64;

        while pc < func.insns().len() {
            steps += 1;
            if steps > STEP_LIMIT {
                return Err(Error::interp("step limit exceeded"));
            }
            let insn = &func.insns()[pc];
            match self.step(insn, &labels, &mut calls, &mut pc)? {
                Flow::Next => pc += 1,
                Flow::Jump(t) => pc = t,
                Flow::Return => match calls.pop() {
                    Some(ret) => pc = ret,
                    None => return Ok(()),
                },
            }
        }
        Err(Error::interp("fell off the end of the buffer"))
    }

    fn step(
        &mut self,
        insn: &Insn,
        labels: &HashMap<u32, usize>,
        calls: &mut Vec<usize>,
        pc: &mut usize,
    ) -> Result<Flow> {
        use Opcode::*;
        let op = insn.op();

        let target = |l: Option<crate::insn::Label>| -> Result<usize> {
            let l = l.ok_or_else(|| Error::interp("branch without a label"))?;
            labels
                .get(&l.index())
                .copied()
                .ok_or(Error::UnresolvedLabel(l))
        };

        match op {
            Nop | Label | Table => Ok(Flow::Next),

            Add | Adc | Sub | Sbc | Rsb => {
                let d = insn.dest().or(insn.src1()).ok_or_else(|| Error::interp("alu without dest"))?;
                let bits = d.size().bits();
                let mask = width_mask(bits);
                let a = self.read(insn.src1().unwrap_or(d))?;
                let b = match insn.src2() {
                    Some(s2) => self.shifted(self.read(s2)?, bits, insn.shift()),
                    None => insn.imm().unwrap_or(0) & mask,
                };
                let cin = self.c as u64;
                let (res, carry, overflow) = match op {
                    Add => {
                        let wide = a as u128 + b as u128;
                        let res = wide as u64 & mask;
                        (res, wide > mask as u128, ((a ^ res) & (b ^ res)) >> (bits - 1) & 1 != 0)
                    }
                    Adc => {
                        let wide = a as u128 + b as u128 + cin as u128;
                        let res = wide as u64 & mask;
                        (res, wide > mask as u128, ((a ^ res) & (b ^ res)) >> (bits - 1) & 1 != 0)
                    }
                    Sub => {
                        let res = a.wrapping_sub(b) & mask;
                        (res, b > a, ((a ^ b) & (a ^ res)) >> (bits - 1) & 1 != 0)
                    }
                    Sbc => {
                        let res = a.wrapping_sub(b).wrapping_sub(cin) & mask;
                        (res, (b as u128 + cin as u128) > a as u128, ((a ^ b) & (a ^ res)) >> (bits - 1) & 1 != 0)
                    }
                    Rsb => {
                        let res = b.wrapping_sub(a) & mask;
                        (res, a > b, ((b ^ a) & (b ^ res)) >> (bits - 1) & 1 != 0)
                    }
                    _ => unreachable!(),
                };
                if let Some(dest) = insn.dest() {
                    self.write(dest, res)?;
                }
                if insn.sets_flags() {
                    self.set_nz(res, bits);
                    self.c = carry;
                    self.v = overflow;
                }
                Ok(Flow::Next)
            }

            And | Or | Xor | Bic => {
                let d = insn.dest().ok_or_else(|| Error::interp("alu without dest"))?;
                let bits = d.size().bits();
                let mask = width_mask(bits);
                let a = self.read(insn.src1().unwrap_or(d))?;
                let b = match insn.src2() {
                    Some(s2) => self.shifted(self.read(s2)?, bits, insn.shift()),
                    None => insn.imm().unwrap_or(0) & mask,
                };
                let res = match op {
                    And => a & b,
                    Or => a | b,
                    Xor => a ^ b,
                    Bic => a & !b & mask,
                    _ => unreachable!(),
                };
                self.write(d, res)?;
                if insn.sets_flags() {
                    self.set_nz(res, bits);
                }
                Ok(Flow::Next)
            }

            Not | Neg | Rev | Sext | Zext => {
                let d = insn.dest().ok_or_else(|| Error::interp("unary without dest"))?;
                let bits = d.size().bits();
                let mask = width_mask(bits);
                let a = self.read(insn.src1().unwrap_or(d))?;
                let res = match op {
                    Not => !a & mask,
                    Neg => a.wrapping_neg() & mask,
                    Rev => {
                        let bytes = (bits / 8) as usize;
                        let mut r = 0u64;
                        for i in 0..bytes {
                            r = (r << 8) | ((a >> (8 * i)) & 0xff);
                        }
                        r
                    }
                    Sext => {
                        let from = insn.imm().unwrap_or(8) as u32;
                        let sign = 1u64 << (from - 1);
                        let low = a & width_mask(from);
                        if low & sign != 0 {
                            (low | (mask & !width_mask(from))) & mask
                        } else {
                            low
                        }
                    }
                    Zext => a & width_mask(insn.imm().unwrap_or(8) as u32),
                    _ => unreachable!(),
                };
                self.write(d, res)?;
                if insn.sets_flags() {
                    self.set_nz(res, bits);
                }
                Ok(Flow::Next)
            }

            Asr | Lsl | Lsr | Rol | Ror => {
                let d = insn.dest().ok_or_else(|| Error::interp("shift without dest"))?;
                let bits = d.size().bits();
                let mask = width_mask(bits);
                let a = self.read(insn.src1().unwrap_or(d))?;
                let count = match insn.src2() {
                    Some(s2) => (self.read(s2)? % bits as u64) as u32,
                    None => insn.imm().unwrap_or(0) as u32 % bits,
                };
                let (res, carry) = match op {
                    Lsl => {
                        let res = (a << count) & mask;
                        let carry = count > 0 && (a >> (bits - count)) & 1 != 0;
                        (res, carry)
                    }
                    Lsr => {
                        let res = a >> count;
                        let carry = count > 0 && (a >> (count - 1)) & 1 != 0;
                        (res, carry)
                    }
                    Asr => {
                        let res = self.shifted(a, bits, Some((ShiftOp::Asr, count as u8)));
                        let carry = count > 0 && (a >> (count - 1)) & 1 != 0;
                        (res, carry)
                    }
                    Ror => {
                        let res = if count == 0 { a } else { ((a >> count) | (a << (bits - count))) & mask };
                        (res, count > 0 && res & (1 << (bits - 1)) != 0)
                    }
                    Rol => {
                        let res = if count == 0 { a } else { ((a << count) | (a >> (bits - count))) & mask };
                        (res, count > 0 && res & 1 != 0)
                    }
                    _ => unreachable!(),
                };
                self.write(d, res)?;
                if insn.sets_flags() {
                    self.set_nz(res, bits);
                    self.c = carry;
                }
                Ok(Flow::Next)
            }

            Fshl | Fshr => {
                let d = insn.dest().ok_or_else(|| Error::interp("funnel without dest"))?;
                let bits = d.size().bits();
                let mask = width_mask(bits);
                let hi = self.read(insn.src1().ok_or_else(|| Error::interp("funnel without hi"))?)?;
                let lo = self.read(insn.src2().ok_or_else(|| Error::interp("funnel without lo"))?)?;
                let n = (insn.imm().unwrap_or(0) as u32) % bits;
                let res = if n == 0 {
                    if op == Fshr {
                        lo
                    } else {
                        hi
                    }
                } else if op == Fshr {
                    ((lo >> n) | (hi << (bits - n))) & mask
                } else {
                    ((hi << n) | (lo >> (bits - n))) & mask
                };
                self.write(d, res)?;
                Ok(Flow::Next)
            }

            Mov => {
                let d = insn.dest().ok_or_else(|| Error::interp("move without dest"))?;
                let bits = d.size().bits();
                let src = insn
                    .src1()
                    .or(insn.src2())
                    .ok_or_else(|| Error::interp("move without source"))?;
                let v = self.shifted(self.read(src)?, bits, insn.shift());
                self.write(d, v)?;
                if insn.sets_flags() {
                    self.set_nz(v, bits);
                }
                Ok(Flow::Next)
            }

            MovImm => {
                let d = insn.dest().ok_or_else(|| Error::interp("move without dest"))?;
                self.write(d, insn.imm().unwrap_or(0))?;
                Ok(Flow::Next)
            }
            MvnImm => {
                let d = insn.dest().ok_or_else(|| Error::interp("move without dest"))?;
                let mask = width_mask(d.size().bits());
                self.write(d, !insn.imm().unwrap_or(0) & mask)?;
                Ok(Flow::Next)
            }
            MovImm16 => {
                let d = insn.dest().ok_or_else(|| Error::interp("move without dest"))?;
                self.write(d, insn.imm().unwrap_or(0) & 0xffff)?;
                Ok(Flow::Next)
            }
            MovtImm16 => {
                let d = insn.dest().ok_or_else(|| Error::interp("move without dest"))?;
                let old = self.read(d)?;
                self.write(d, (old & 0xffff) | ((insn.imm().unwrap_or(0) & 0xffff) << 16))?;
                Ok(Flow::Next)
            }

            Ldb | Ldbs | Ldh | Ldhs | Ldw | Ldws | Ldd | Ldt => {
                let d = insn.dest().ok_or_else(|| Error::interp("load without dest"))?;
                let bytes = op.mem_bytes().unwrap() as usize;
                let addr = self.mem_addr(insn)?;
                let raw = self.mem_read(addr, bytes)?;
                let bits = d.size().bits();
                let v = match op {
                    Ldbs => self.sign_extend(raw, 8, bits),
                    Ldhs => self.sign_extend(raw, 16, bits),
                    Ldws => self.sign_extend(raw, 32, bits),
                    _ => raw,
                };
                self.write(d, v)?;
                Ok(Flow::Next)
            }

            Stb | Sth | Stw | Std => {
                let bytes = op.mem_bytes().unwrap() as usize;
                let v = self.read(insn.src2().ok_or_else(|| Error::interp("store without value"))?)?;
                let addr = self.mem_addr(insn)?;
                self.mem_write(addr, bytes, v)?;
                Ok(Flow::Next)
            }

            Push => {
                let r = insn.src1().ok_or_else(|| Error::interp("push without source"))?;
                let bytes = r.size().bytes() as usize;
                let sp = self.sp_reg();
                let new_sp = (self.read(&sp)? as usize)
                    .checked_sub(bytes)
                    .ok_or_else(|| Error::interp("stack underflow"))?;
                let v = self.read(r)?;
                self.mem_write(new_sp, bytes, v)?;
                self.write(&sp, new_sp as u64)?;
                Ok(Flow::Next)
            }
            Pop => {
                let r = insn.dest().ok_or_else(|| Error::interp("pop without dest"))?;
                let bytes = r.size().bytes() as usize;
                let sp = self.sp_reg();
                let at = self.read(&sp)? as usize;
                let v = self.mem_read(at, bytes)?;
                self.write(r, v)?;
                self.write(&sp, (at + bytes) as u64)?;
                Ok(Flow::Next)
            }
            LdArg => {
                let d = insn.dest().ok_or_else(|| Error::interp("ldarg without dest"))?;
                let addr = self.entry_sp + insn.imm().unwrap_or(0) as usize;
                let v = self.mem_read(addr, d.size().bytes() as usize)?;
                self.write(d, v)?;
                Ok(Flow::Next)
            }
            Lea => {
                let d = insn.dest().ok_or_else(|| Error::interp("lea without dest"))?;
                let idx = insn.imm().unwrap_or(0) as usize;
                self.write(d, (TABLE_BASE + idx * TABLE_STRIDE) as u64)?;
                Ok(Flow::Next)
            }

            Cmp | Cmpc => {
                let s1 = insn.src1().ok_or_else(|| Error::interp("compare without source"))?;
                let bits = s1.size().bits();
                let mask = width_mask(bits);
                let a = self.read(s1)?;
                let b = match insn.src2() {
                    Some(s2) => self.read(s2)?,
                    None => insn.imm().unwrap_or(0) & mask,
                };
                let cin = if op == Cmpc { self.c as u64 } else { 0 };
                let res = a.wrapping_sub(b).wrapping_sub(cin) & mask;
                // A chained compare only clears Z; equality must hold in
                // every limb.
                let was_z = self.z;
                self.set_nz(res, bits);
                if op == Cmpc {
                    self.z &= was_z;
                }
                self.c = (b as u128 + cin as u128) > a as u128;
                self.v = ((a ^ b) & (a ^ res)) >> (bits - 1) & 1 != 0;
                Ok(Flow::Next)
            }

            B | Beq | Bne | Blt | Ble | Bgt | Bge | Bltu | Bleu | Bgtu | Bgeu => {
                if self.branch_taken(op) {
                    Ok(Flow::Jump(target(insn.label())?))
                } else {
                    Ok(Flow::Next)
                }
            }

            Cbeq | Cbne | Cblt | Cbge | Cbltu | Cbgeu => {
                let s1 = insn.src1().ok_or_else(|| Error::interp("compare-branch without source"))?;
                let a = self.read(s1)?;
                let b = match insn.src2() {
                    Some(s2) => self.read(s2)?,
                    None => 0,
                };
                let bits = s1.size().bits();
                let sa = self.sign_extend(a, bits, 64) as i64;
                let sb = self.sign_extend(b, bits, 64) as i64;
                let taken = match op {
                    Cbeq => a == b,
                    Cbne => a != b,
                    Cblt => sa < sb,
                    Cbge => sa >= sb,
                    Cbltu => a < b,
                    Cbgeu => a >= b,
                    _ => unreachable!(),
                };
                if taken {
                    Ok(Flow::Jump(target(insn.label())?))
                } else {
                    Ok(Flow::Next)
                }
            }

            Call => {
                calls.push(*pc + 1);
                Ok(Flow::Jump(target(insn.label())?))
            }
            Ret => Ok(Flow::Return),

            Print => {
                if let Some(r) = insn.src1() {
                    let v = self.read(r)?;
                    debug!(reg = r.name(), value = v, "print");
                }
                Ok(Flow::Next)
            }
        }
    }

    fn sign_extend(&self, v: u64, from: u32, to: u32) -> u64 {
        let sign = 1u64 << (from - 1);
        let low = v & width_mask(from);
        if low & sign != 0 {
            (low | (width_mask(to) & !width_mask(from))) & width_mask(to)
        } else {
            low
        }
    }

    fn place_tables(&mut self, func: &Func) -> Result<()> {
        for (i, tab) in func.sboxes().iter().enumerate() {
            let base = TABLE_BASE + i * TABLE_STRIDE;
            if base + tab.len() > self.mem.len() {
                return Err(Error::interp("too many tables"));
            }
            self.mem[base..base + tab.len()].copy_from_slice(tab);
        }
        Ok(())
    }

    /// Place `values` according to the calling convention for `types`
    /// and execute until the entry frame returns.
    pub fn exec(&mut self, func: &Func, types: &[ArgType], values: &[u64]) -> Result<()> {
        if types.len() != values.len() {
            return Err(Error::InvalidArgument("argument counts differ"));
        }
        self.place_tables(func)?;

        let locs = self.platform.assign_args(types)?;
        let stack_bytes: u32 = locs
            .iter()
            .map(|l| match l {
                ArgLoc::Stack { offset, bytes } => offset + bytes,
                _ => 0,
            })
            .max()
            .unwrap_or(0);
        self.entry_sp = STACK_TOP - stack_bytes as usize;

        // Zero registers read as zero on entry.
        for reg in self.platform.regs() {
            if reg.flags().contains(RegFlags::ZERO) {
                self.file[reg.number() as usize] = [0u8; 8];
            }
        }
        let sp = self.sp_reg();
        self.write(&sp, self.entry_sp as u64)?;

        for (loc, &value) in locs.iter().zip(values) {
            match loc {
                ArgLoc::Regs(srs) => {
                    let mut v = value;
                    for sr in srs {
                        self.write(sr, v)?;
                        let bits = sr.size().bits();
                        v = if bits >= 64 { 0 } else { v >> bits };
                    }
                }
                ArgLoc::Stack { offset, bytes } => {
                    self.mem_write(self.entry_sp + *offset as usize, *bytes as usize, value)?;
                }
            }
        }
        self.run(func)
    }

    /// Run a permutation over `state`, in place.
    pub fn exec_permutation(&mut self, func: &Func, state: &mut [u8]) -> Result<()> {
        self.mem[STATE_ADDR..STATE_ADDR + state.len()].copy_from_slice(state);
        self.exec(func, &[ArgType::Ptr], &[STATE_ADDR as u64])?;
        state.copy_from_slice(&self.mem[STATE_ADDR..STATE_ADDR + state.len()]);
        Ok(())
    }

    /// Run a counted permutation over `state`, in place.
    pub fn exec_permutation_count(&mut self, func: &Func, state: &mut [u8], count: u8) -> Result<()> {
        self.mem[STATE_ADDR..STATE_ADDR + state.len()].copy_from_slice(state);
        self.exec(func, &[ArgType::Ptr, ArgType::U8], &[STATE_ADDR as u64, count as u64])?;
        state.copy_from_slice(&self.mem[STATE_ADDR..STATE_ADDR + state.len()]);
        Ok(())
    }

    /// Run a key setup, filling `schedule`.
    pub fn exec_setup_key(&mut self, func: &Func, key: &[u8], schedule: &mut [u8]) -> Result<()> {
        self.mem[KEY_ADDR..KEY_ADDR + key.len()].copy_from_slice(key);
        self.exec(func, &[ArgType::Ptr, ArgType::Ptr], &[KEY_ADDR as u64, SCHED_ADDR as u64])?;
        schedule.copy_from_slice(&self.mem[SCHED_ADDR..SCHED_ADDR + schedule.len()]);
        Ok(())
    }

    /// Run a block encryption.
    pub fn exec_encrypt_block(
        &mut self,
        func: &Func,
        schedule: &[u8],
        input: &[u8],
        output: &mut [u8],
    ) -> Result<()> {
        self.mem[SCHED_ADDR..SCHED_ADDR + schedule.len()].copy_from_slice(schedule);
        self.mem[IN_ADDR..IN_ADDR + input.len()].copy_from_slice(input);
        self.exec(
            func,
            &[ArgType::Ptr, ArgType::Ptr, ArgType::Ptr],
            &[SCHED_ADDR as u64, IN_ADDR as u64, OUT_ADDR as u64],
        )?;
        output.copy_from_slice(&self.mem[OUT_ADDR..OUT_ADDR + output.len()]);
        Ok(())
    }

    /// Run a masked permutation over `state`, with preserved randomness
    /// carried in `rand`.
    pub fn exec_masked_permutation(
        &mut self,
        func: &Func,
        state: &mut [u8],
        rand: &mut [u8],
    ) -> Result<()> {
        self.mem[STATE_ADDR..STATE_ADDR + state.len()].copy_from_slice(state);
        self.mem[RAND_ADDR..RAND_ADDR + rand.len()].copy_from_slice(rand);
        self.exec(func, &[ArgType::Ptr, ArgType::Ptr], &[STATE_ADDR as u64, RAND_ADDR as u64])?;
        state.copy_from_slice(&self.mem[STATE_ADDR..STATE_ADDR + state.len()]);
        rand.copy_from_slice(&self.mem[RAND_ADDR..RAND_ADDR + rand.len()]);
        Ok(())
    }
}

enum Flow {
    Next,
    Jump(usize),
    Return,
}
