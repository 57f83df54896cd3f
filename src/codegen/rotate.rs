//! Rotation and shift lowering
//!
//! A rotation decomposes into a whole-limb permutation plus a sub-limb
//! bit rotation. The permutation is free when the register may be
//! renumbered; the sub-limb part uses a native rotate where one exists
//! and a shift pair with an OR otherwise. Rotations whose sub-limb part
//! exceeds half a limb are first re-expressed from the other direction
//! so the synthesised shifts stay short.

use super::CodeGen;
use crate::error::{Error, Result};
use crate::insn::{Insn, Opcode};
use crate::platform::PlatformFeatures;
use crate::reg::Reg;

impl CodeGen<'_> {
    /// Rotate `reg` right by `bits`, renumbering limbs where possible.
    pub fn ror(&mut self, reg: &mut Reg, bits: u32) -> Result<()> {
        self.rotate(reg, bits, true)
    }

    /// Rotate `reg` left by `bits`.
    pub fn rol(&mut self, reg: &mut Reg, bits: u32) -> Result<()> {
        self.rotate(reg, bits, false)
    }

    fn rotate(&mut self, reg: &mut Reg, bits: u32, right: bool) -> Result<()> {
        self.check_body()?;
        let total = reg.full_size();
        if reg.size() != total {
            return Err(Error::InvalidArgument("partial registers cannot rotate"));
        }
        let mut r = bits % total;
        if r == 0 {
            return Ok(());
        }
        let limb = reg.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        let lb = limb.bits();

        // Canonicalise: a long sub-limb shift is a short one from the
        // other direction (rotate right by 7 is left by 1 plus a limb
        // step).
        let mut right = right;
        if r % lb > lb / 2 {
            right = !right;
            r = total - r;
        }
        let limb_steps = (r / lb) as usize;
        let sub = (r % lb) as u8;

        if limb_steps > 0 {
            let n = reg.limb_count();
            let steps_right = if right { limb_steps } else { n - limb_steps };
            if reg.is_pinned() {
                self.limb_cascade(reg, steps_right)?;
            } else {
                *reg = reg.limbs_rotated_right(steps_right)?;
            }
        }
        if sub > 0 {
            self.sub_rotate(reg, sub, right)?;
        }
        Ok(())
    }

    /// Move-cascade a whole-limb rotation for values whose physical
    /// placement may not be renumbered.
    fn limb_cascade(&mut self, reg: &Reg, steps_right: usize) -> Result<()> {
        let n = reg.limb_count();
        let steps = steps_right % n;
        if steps == 0 {
            return Ok(());
        }
        let size = reg.limb_size().unwrap();
        let mut t = self.temporary(size.bits())?;
        let mut moved = vec![false; n];
        for start in 0..n {
            if moved[start] {
                continue;
            }
            // Walk one cycle: each slot receives the limb `steps` above it.
            self.buf.push(
                Insn::new(Opcode::Mov)
                    .with_dest(t.limb(0).clone())
                    .with_src1(reg.limb(start).clone()),
            );
            let mut at = start;
            loop {
                let from = (at + steps) % n;
                moved[at] = true;
                if from == start {
                    self.buf.push(
                        Insn::new(Opcode::Mov)
                            .with_dest(reg.limb(at).clone())
                            .with_src1(t.limb(0).clone()),
                    );
                    break;
                }
                self.buf.push(
                    Insn::new(Opcode::Mov)
                        .with_dest(reg.limb(at).clone())
                        .with_src1(reg.limb(from).clone()),
                );
                at = from;
            }
        }
        self.release(&mut t);
        Ok(())
    }

    /// Rotate every bit of `reg` by `sub` (< limb width) in the given
    /// direction, rippling across limbs.
    fn sub_rotate(&mut self, reg: &Reg, sub: u8, right: bool) -> Result<()> {
        let size = reg.limb_size().unwrap();
        let lb = size.bits() as u8;
        let n = reg.limb_count();
        let p = self.platform;

        if n == 1 {
            let count = if right { sub } else { lb - sub };
            if p.native_rotate(size, count) {
                return p.binary_imm(
                    &mut self.buf,
                    Opcode::Ror,
                    reg.limb(0),
                    reg.limb(0),
                    count as u64,
                    false,
                );
            }
            let mut t = self.temporary(size.bits())?;
            self.buf.push(
                Insn::new(Opcode::Mov)
                    .with_dest(t.limb(0).clone())
                    .with_src1(reg.limb(0).clone()),
            );
            let (main, fill) = if right {
                (Opcode::Lsr, Opcode::Lsl)
            } else {
                (Opcode::Lsl, Opcode::Lsr)
            };
            p.binary_imm(&mut self.buf, main, reg.limb(0), reg.limb(0), sub as u64, false)?;
            p.binary_imm(&mut self.buf, fill, t.limb(0), t.limb(0), (lb - sub) as u64, false)?;
            p.binary(&mut self.buf, Opcode::Or, reg.limb(0), reg.limb(0), t.limb(0), false)?;
            self.release(&mut t);
            return Ok(());
        }

        // Multi-limb ripple. The wrap-around source is saved first.
        let mut t = self.temporary(size.bits())?;
        let mut u = self.temporary(size.bits())?;
        if right {
            self.buf.push(
                Insn::new(Opcode::Mov)
                    .with_dest(t.limb(0).clone())
                    .with_src1(reg.limb(0).clone()),
            );
            for i in 0..n {
                let hi = if i == n - 1 { t.limb(0) } else { reg.limb(i + 1) };
                self.buf.push(
                    Insn::new(Opcode::Mov)
                        .with_dest(u.limb(0).clone())
                        .with_src1(hi.clone()),
                );
                p.binary_imm(&mut self.buf, Opcode::Lsl, u.limb(0), u.limb(0), (lb - sub) as u64, false)?;
                p.binary_imm(&mut self.buf, Opcode::Lsr, reg.limb(i), reg.limb(i), sub as u64, false)?;
                p.binary(&mut self.buf, Opcode::Or, reg.limb(i), reg.limb(i), u.limb(0), false)?;
            }
        } else {
            self.buf.push(
                Insn::new(Opcode::Mov)
                    .with_dest(t.limb(0).clone())
                    .with_src1(reg.limb(n - 1).clone()),
            );
            for i in (0..n).rev() {
                let lo = if i == 0 { t.limb(0) } else { reg.limb(i - 1) };
                self.buf.push(
                    Insn::new(Opcode::Mov)
                        .with_dest(u.limb(0).clone())
                        .with_src1(lo.clone()),
                );
                p.binary_imm(&mut self.buf, Opcode::Lsr, u.limb(0), u.limb(0), (lb - sub) as u64, false)?;
                p.binary_imm(&mut self.buf, Opcode::Lsl, reg.limb(i), reg.limb(i), sub as u64, false)?;
                p.binary(&mut self.buf, Opcode::Or, reg.limb(i), reg.limb(i), u.limb(0), false)?;
            }
        }
        self.release(&mut u);
        self.release(&mut t);
        Ok(())
    }

    /// Logical shift left by `bits`, zero-filling from below.
    pub fn shl(&mut self, reg: &Reg, bits: u32) -> Result<()> {
        self.shift(reg, bits, false)
    }

    /// Logical shift right by `bits`, zero-filling from above.
    pub fn shr(&mut self, reg: &Reg, bits: u32) -> Result<()> {
        self.shift(reg, bits, true)
    }

    fn shift(&mut self, reg: &Reg, bits: u32, right: bool) -> Result<()> {
        self.check_body()?;
        if bits == 0 {
            return Ok(());
        }
        let size = reg.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        let lb = size.bits();
        let total = reg.full_size();
        if bits >= total {
            return self.move_imm(reg, 0);
        }
        let n = reg.limb_count();
        let steps = (bits / lb) as usize;
        let sub = (bits % lb) as u8;
        let p = self.platform;

        if steps > 0 {
            if right {
                for i in 0..n - steps {
                    self.buf.push(
                        Insn::new(Opcode::Mov)
                            .with_dest(reg.limb(i).clone())
                            .with_src1(reg.limb(i + steps).clone()),
                    );
                }
                for i in n - steps..n {
                    let limb = reg.limb_reg(i);
                    self.move_imm(&limb, 0)?;
                }
            } else {
                for i in (steps..n).rev() {
                    self.buf.push(
                        Insn::new(Opcode::Mov)
                            .with_dest(reg.limb(i).clone())
                            .with_src1(reg.limb(i - steps).clone()),
                    );
                }
                for i in 0..steps {
                    let limb = reg.limb_reg(i);
                    self.move_imm(&limb, 0)?;
                }
            }
        }
        if sub == 0 {
            return Ok(());
        }
        if n == 1 {
            let op = if right { Opcode::Lsr } else { Opcode::Lsl };
            return p.binary_imm(&mut self.buf, op, reg.limb(0), reg.limb(0), sub as u64, false);
        }
        let mut u = self.temporary(size.bits())?;
        if right {
            let hi_limit = n - steps;
            for i in 0..hi_limit {
                if i + 1 < hi_limit {
                    self.buf.push(
                        Insn::new(Opcode::Mov)
                            .with_dest(u.limb(0).clone())
                            .with_src1(reg.limb(i + 1).clone()),
                    );
                    p.binary_imm(&mut self.buf, Opcode::Lsl, u.limb(0), u.limb(0), (lb - sub as u32) as u64, false)?;
                    p.binary_imm(&mut self.buf, Opcode::Lsr, reg.limb(i), reg.limb(i), sub as u64, false)?;
                    p.binary(&mut self.buf, Opcode::Or, reg.limb(i), reg.limb(i), u.limb(0), false)?;
                } else {
                    p.binary_imm(&mut self.buf, Opcode::Lsr, reg.limb(i), reg.limb(i), sub as u64, false)?;
                }
            }
        } else {
            for i in (steps..n).rev() {
                if i > steps {
                    self.buf.push(
                        Insn::new(Opcode::Mov)
                            .with_dest(u.limb(0).clone())
                            .with_src1(reg.limb(i - 1).clone()),
                    );
                    p.binary_imm(&mut self.buf, Opcode::Lsr, u.limb(0), u.limb(0), (lb - sub as u32) as u64, false)?;
                    p.binary_imm(&mut self.buf, Opcode::Lsl, reg.limb(i), reg.limb(i), sub as u64, false)?;
                    p.binary(&mut self.buf, Opcode::Or, reg.limb(i), reg.limb(i), u.limb(0), false)?;
                } else {
                    p.binary_imm(&mut self.buf, Opcode::Lsl, reg.limb(i), reg.limb(i), sub as u64, false)?;
                }
            }
        }
        self.release(&mut u);
        Ok(())
    }

    /// `dst = ((hi:lo) >> count)` truncated to one register width: the
    /// funnel-shift window crypto kernels extract bit runs with.
    ///
    /// `dst` must be disjoint from both sources. Uses the native funnel
    /// instruction for single-limb operands on targets that have one.
    pub fn funnel_shr(&mut self, dst: &Reg, lo: &Reg, hi: &Reg, count: u32) -> Result<()> {
        self.check_body()?;
        Self::check_shapes(dst, lo)?;
        Self::check_shapes(dst, hi)?;
        let size = dst.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        let total = dst.full_size();
        if count >= total {
            return Err(Error::InvalidArgument("funnel count exceeds the width"));
        }
        for i in 0..dst.limb_count() {
            if lo.limbs().contains(dst.limb(i)) || hi.limbs().contains(dst.limb(i)) {
                return Err(Error::InvalidArgument("funnel destination overlaps a source"));
            }
        }
        let p = self.platform;
        if dst.limb_count() == 1 && p.has(PlatformFeatures::FUNNEL_SHIFT) && count > 0 {
            self.buf.push(
                Insn::new(Opcode::Fshr)
                    .with_dest(dst.limb(0).clone())
                    .with_src1(hi.limb(0).clone())
                    .with_src2(lo.limb(0).clone())
                    .with_imm(count as u64),
            );
            return Ok(());
        }

        let lb = size.bits();
        let n = dst.limb_count();
        let byte = (count / lb) as usize;
        let sub = (count % lb) as u8;
        // The concatenated limb sequence, low half first.
        let v = |j: usize| {
            if j < n {
                lo.limb(j)
            } else {
                hi.limb(j - n)
            }
        };
        if sub == 0 {
            for j in 0..n {
                self.buf.push(
                    Insn::new(Opcode::Mov)
                        .with_dest(dst.limb(j).clone())
                        .with_src1(v(byte + j).clone()),
                );
            }
            return Ok(());
        }
        let mut u = self.temporary(size.bits())?;
        for j in 0..n {
            self.buf.push(
                Insn::new(Opcode::Mov)
                    .with_dest(dst.limb(j).clone())
                    .with_src1(v(byte + j).clone()),
            );
            p.binary_imm(&mut self.buf, Opcode::Lsr, dst.limb(j), dst.limb(j), sub as u64, false)?;
            self.buf.push(
                Insn::new(Opcode::Mov)
                    .with_dest(u.limb(0).clone())
                    .with_src1(v(byte + j + 1).clone()),
            );
            p.binary_imm(&mut self.buf, Opcode::Lsl, u.limb(0), u.limb(0), (lb - sub as u32) as u64, false)?;
            p.binary(&mut self.buf, Opcode::Or, dst.limb(j), dst.limb(j), u.limb(0), false)?;
        }
        self.release(&mut u);
        Ok(())
    }
}
