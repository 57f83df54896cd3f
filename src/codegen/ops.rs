//! Structured emission
//!
//! Authors act on whole virtual registers; every operation here iterates
//! the limbs in ascending significance and lowers each through the
//! platform hooks, chaining carries where the operation needs it.

use super::CodeGen;
use crate::error::{Error, Result};
use crate::insn::{Insn, Opcode};
use crate::platform::PlatformFeatures;
use crate::reg::{Reg, RegFlags, RegSize, SizedReg};

fn limb_mask(size: RegSize) -> u64 {
    match size {
        RegSize::S64 => u64::MAX,
        s => (1u64 << s.bits()) - 1,
    }
}

fn load_op(size: RegSize) -> Opcode {
    match size {
        RegSize::S8 => Opcode::Ldb,
        RegSize::S16 => Opcode::Ldh,
        RegSize::S32 => Opcode::Ldw,
        RegSize::S64 => Opcode::Ldd,
    }
}

fn store_op(size: RegSize) -> Opcode {
    match size {
        RegSize::S8 => Opcode::Stb,
        RegSize::S16 => Opcode::Sth,
        RegSize::S32 => Opcode::Stw,
        RegSize::S64 => Opcode::Std,
    }
}

impl CodeGen<'_> {
    pub(super) fn check_shapes(a: &Reg, b: &Reg) -> Result<()> {
        if a.limb_count() != b.limb_count() || a.limb_size() != b.limb_size() {
            return Err(Error::InvalidArgument("operand shapes differ"));
        }
        Ok(())
    }

    pub(super) fn check_base(base: &Reg) -> Result<&SizedReg> {
        if base.limb_count() != 1 || !base.limb(0).flags().contains(RegFlags::ADDRESS) {
            return Err(Error::InvalidArgument("base is not an address register"));
        }
        Ok(base.limb(0))
    }

    /// Roll the buffer back to `mark` after a failed lowering strategy.
    pub(super) fn rollback(&mut self, mark: usize) {
        self.buf.truncate(mark);
    }

    fn carry_chain(&mut self, first: Opcode, rest: Opcode, dst: &Reg, src: &Reg) -> Result<()> {
        self.check_body()?;
        Self::check_shapes(dst, src)?;
        let p = self.platform;
        let n = dst.limb_count();
        for i in 0..n {
            let op = if i == 0 { first } else { rest };
            p.binary(&mut self.buf, op, dst.limb(i), dst.limb(i), src.limb(i), i < n - 1)?;
        }
        Ok(())
    }

    /// `dst += src`, carry rippling across limbs.
    pub fn add(&mut self, dst: &Reg, src: &Reg) -> Result<()> {
        self.carry_chain(Opcode::Add, Opcode::Adc, dst, src)
    }

    /// `dst -= src`, borrow rippling across limbs.
    pub fn sub(&mut self, dst: &Reg, src: &Reg) -> Result<()> {
        self.carry_chain(Opcode::Sub, Opcode::Sbc, dst, src)
    }

    fn limb_parallel(&mut self, op: Opcode, dst: &Reg, src: &Reg) -> Result<()> {
        self.check_body()?;
        Self::check_shapes(dst, src)?;
        let p = self.platform;
        for i in 0..dst.limb_count() {
            p.binary(&mut self.buf, op, dst.limb(i), dst.limb(i), src.limb(i), false)?;
        }
        Ok(())
    }

    /// `dst ^= src`.
    pub fn xor(&mut self, dst: &Reg, src: &Reg) -> Result<()> {
        self.limb_parallel(Opcode::Xor, dst, src)
    }

    /// `dst &= src`.
    pub fn logand(&mut self, dst: &Reg, src: &Reg) -> Result<()> {
        self.limb_parallel(Opcode::And, dst, src)
    }

    /// `dst |= src`.
    pub fn logor(&mut self, dst: &Reg, src: &Reg) -> Result<()> {
        self.limb_parallel(Opcode::Or, dst, src)
    }

    /// `dst &= !src`, using the native bit-clear when the platform has
    /// one and a complemented scratch otherwise.
    pub fn bic(&mut self, dst: &Reg, src: &Reg) -> Result<()> {
        self.check_body()?;
        Self::check_shapes(dst, src)?;
        if self.platform.has(PlatformFeatures::BIT_CLEAR) {
            return self.limb_parallel(Opcode::Bic, dst, src);
        }
        let size = dst.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        let mut t = self.temporary(size.bits())?;
        let p = self.platform;
        for i in 0..dst.limb_count() {
            self.buf.push(
                Insn::new(Opcode::Mov)
                    .with_dest(t.limb(0).clone())
                    .with_src1(src.limb(i).clone()),
            );
            p.unary(&mut self.buf, Opcode::Not, t.limb(0), t.limb(0))?;
            p.binary(&mut self.buf, Opcode::And, dst.limb(i), dst.limb(i), t.limb(0), false)?;
        }
        self.release(&mut t);
        Ok(())
    }

    /// `dst = !dst`, limb-parallel.
    pub fn lognot(&mut self, dst: &Reg) -> Result<()> {
        self.check_body()?;
        let p = self.platform;
        for i in 0..dst.limb_count() {
            p.unary(&mut self.buf, Opcode::Not, dst.limb(i), dst.limb(i))?;
        }
        Ok(())
    }

    /// Two's-complement negate.
    pub fn neg(&mut self, dst: &Reg) -> Result<()> {
        self.check_body()?;
        if dst.limb_count() == 1 {
            let p = self.platform;
            return p.unary(&mut self.buf, Opcode::Neg, dst.limb(0), dst.limb(0));
        }
        self.lognot(dst)?;
        self.add_imm(dst, 1)
    }

    /// Copy `src` into `dst`, limb by limb.
    pub fn move_reg(&mut self, dst: &Reg, src: &Reg) -> Result<()> {
        self.check_body()?;
        Self::check_shapes(dst, src)?;
        for i in 0..dst.limb_count() {
            if dst.limb(i) == src.limb(i) {
                continue;
            }
            self.buf.push(
                Insn::new(Opcode::Mov)
                    .with_dest(dst.limb(i).clone())
                    .with_src1(src.limb(i).clone()),
            );
        }
        Ok(())
    }

    /// Load a literal into `dst`, synthesising through a scratch register
    /// where the platform cannot move it directly.
    pub fn move_imm(&mut self, dst: &Reg, value: u64) -> Result<()> {
        self.check_body()?;
        let size = dst.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        let mask = limb_mask(size);
        let p = self.platform;
        for i in 0..dst.limb_count() {
            let chunk = (value >> (i as u32 * size.bits())) & mask;
            let mark = self.buf.len();
            if p.move_imm(&mut self.buf, dst.limb(i), chunk).is_ok() {
                continue;
            }
            self.rollback(mark);
            let mut t = self.allocate(
                size.bits(),
                &[RegFlags::DATA | RegFlags::TWO_ADDRESS, RegFlags::DATA],
            )?;
            p.move_imm(&mut self.buf, t.limb(0), chunk)?;
            self.buf.push(
                Insn::new(Opcode::Mov)
                    .with_dest(dst.limb(i).clone())
                    .with_src1(t.limb(0).clone()),
            );
            self.release(&mut t);
        }
        Ok(())
    }

    /// A scratch register with the same limb shape as `like`.
    fn scratch_like(&mut self, like: &Reg) -> Result<Reg> {
        let size = like.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        let saved = self.alloc_size;
        self.alloc_size = size;
        let r = self.allocate(
            like.full_size(),
            &[
                RegFlags::TEMP,
                RegFlags::DATA | RegFlags::TWO_ADDRESS,
                RegFlags::DATA,
            ],
        );
        self.alloc_size = saved;
        r
    }

    fn imm_chain(&mut self, first: Opcode, rest: Opcode, dst: &Reg, value: u64) -> Result<()> {
        let size = dst.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        let mask = limb_mask(size);
        let p = self.platform;
        let n = dst.limb_count();
        for i in 0..n {
            let chunk = (value >> (i as u32 * size.bits())) & mask;
            let op = if i == 0 { first } else { rest };
            p.binary_imm(&mut self.buf, op, dst.limb(i), dst.limb(i), chunk, i < n - 1)?;
        }
        Ok(())
    }

    /// `dst += value`.
    ///
    /// Tried as a direct add chain, then as a subtract of the negation
    /// (the idiom on targets without add-immediates), then through a
    /// scratch register.
    pub fn add_imm(&mut self, dst: &Reg, value: u64) -> Result<()> {
        self.check_body()?;
        let full = dst.full_size();
        let value = if full >= 64 { value } else { value & ((1u64 << full) - 1) };
        if value == 0 {
            return Ok(());
        }
        let mark = self.buf.len();
        if self.imm_chain(Opcode::Add, Opcode::Adc, dst, value).is_ok() {
            return Ok(());
        }
        self.rollback(mark);
        let neg = if full >= 64 {
            value.wrapping_neg()
        } else {
            value.wrapping_neg() & ((1u64 << full) - 1)
        };
        if self.imm_chain(Opcode::Sub, Opcode::Sbc, dst, neg).is_ok() {
            return Ok(());
        }
        self.rollback(mark);
        let mut t = self.scratch_like(dst)?;
        self.move_imm(&t, value)?;
        self.add(dst, &t)?;
        self.release(&mut t);
        Ok(())
    }

    /// `dst -= value`.
    pub fn sub_imm(&mut self, dst: &Reg, value: u64) -> Result<()> {
        self.check_body()?;
        let full = dst.full_size();
        let value = if full >= 64 { value } else { value & ((1u64 << full) - 1) };
        if value == 0 {
            return Ok(());
        }
        let mark = self.buf.len();
        if self.imm_chain(Opcode::Sub, Opcode::Sbc, dst, value).is_ok() {
            return Ok(());
        }
        self.rollback(mark);
        let neg = if full >= 64 {
            value.wrapping_neg()
        } else {
            value.wrapping_neg() & ((1u64 << full) - 1)
        };
        if self.imm_chain(Opcode::Add, Opcode::Adc, dst, neg).is_ok() {
            return Ok(());
        }
        self.rollback(mark);
        let mut t = self.scratch_like(dst)?;
        self.move_imm(&t, value)?;
        self.sub(dst, &t)?;
        self.release(&mut t);
        Ok(())
    }

    fn logical_imm_limbs<F>(&mut self, op: Opcode, dst: &Reg, value: u64, identity: F) -> Result<()>
    where
        F: Fn(u64, u64) -> bool,
    {
        self.check_body()?;
        let size = dst.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        let mask = limb_mask(size);
        let p = self.platform;
        let mut scratch: Option<Reg> = None;
        for i in 0..dst.limb_count() {
            let chunk = (value >> (i as u32 * size.bits())) & mask;
            if identity(chunk, mask) {
                continue;
            }
            if op == Opcode::Xor && chunk == mask {
                p.unary(&mut self.buf, Opcode::Not, dst.limb(i), dst.limb(i))?;
                continue;
            }
            if op == Opcode::And && chunk == 0 {
                let limb = dst.limb_reg(i);
                self.move_imm(&limb, 0)?;
                continue;
            }
            let mark = self.buf.len();
            if p
                .binary_imm(&mut self.buf, op, dst.limb(i), dst.limb(i), chunk, false)
                .is_ok()
            {
                continue;
            }
            self.rollback(mark);
            if scratch.is_none() {
                scratch = Some(self.allocate(
                    size.bits(),
                    &[RegFlags::DATA | RegFlags::TWO_ADDRESS, RegFlags::DATA],
                )?);
            }
            let t = scratch.as_ref().unwrap().clone();
            self.move_imm(&t, chunk)?;
            p.binary(&mut self.buf, op, dst.limb(i), dst.limb(i), t.limb(0), false)?;
        }
        if let Some(mut t) = scratch {
            self.release(&mut t);
        }
        Ok(())
    }

    /// `dst ^= value`, skipping identity limbs.
    pub fn xor_imm(&mut self, dst: &Reg, value: u64) -> Result<()> {
        self.logical_imm_limbs(Opcode::Xor, dst, value, |c, _| c == 0)
    }

    /// `dst &= value`, skipping identity limbs.
    pub fn and_imm(&mut self, dst: &Reg, value: u64) -> Result<()> {
        self.logical_imm_limbs(Opcode::And, dst, value, |c, m| c == m)
    }

    /// `dst |= value`, skipping identity limbs.
    pub fn or_imm(&mut self, dst: &Reg, value: u64) -> Result<()> {
        self.logical_imm_limbs(Opcode::Or, dst, value, |c, _| c == 0)
    }

    /// Compare `a` with `b`: a subtract without writeback whose flags
    /// settle on the most significant limb.
    pub fn cmp(&mut self, a: &Reg, b: &Reg) -> Result<()> {
        self.check_body()?;
        Self::check_shapes(a, b)?;
        let n = a.limb_count();
        if n == 1 {
            self.buf.push(
                Insn::new(Opcode::Cmp)
                    .with_src1(a.limb(0).clone())
                    .with_src2(b.limb(0).clone())
                    .setting_flags(true),
            );
            return Ok(());
        }
        if self.platform.has(PlatformFeatures::REGISTER_POOR) {
            self.buf.push(
                Insn::new(Opcode::Cmp)
                    .with_src1(a.limb(0).clone())
                    .with_src2(b.limb(0).clone())
                    .setting_flags(true),
            );
            for i in 1..n {
                self.buf.push(
                    Insn::new(Opcode::Cmpc)
                        .with_src1(a.limb(i).clone())
                        .with_src2(b.limb(i).clone())
                        .setting_flags(true),
                );
            }
            return Ok(());
        }
        let size = a.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        let mut t = self.temporary(size.bits())?;
        let p = self.platform;
        p.binary(&mut self.buf, Opcode::Sub, t.limb(0), a.limb(0), b.limb(0), true)?;
        for i in 1..n {
            p.binary(&mut self.buf, Opcode::Sbc, t.limb(0), a.limb(i), b.limb(i), true)?;
        }
        self.release(&mut t);
        Ok(())
    }

    /// Compare `a` with a literal.
    pub fn cmp_imm(&mut self, a: &Reg, value: u64) -> Result<()> {
        self.check_body()?;
        if a.limb_count() == 1 {
            let mark = self.buf.len();
            let p = self.platform;
            if p
                .binary_imm(&mut self.buf, Opcode::Cmp, a.limb(0), a.limb(0), value, true)
                .is_ok()
            {
                return Ok(());
            }
            self.rollback(mark);
        }
        let mut t = self.scratch_like(a)?;
        self.move_imm(&t, value)?;
        self.cmp(a, &t)?;
        self.release(&mut t);
        Ok(())
    }

    /// Branch to `label` when `reg` is zero, fusing compare and branch on
    /// targets that have the form.
    pub fn branch_if_zero(&mut self, reg: &Reg, label: crate::insn::Label) -> Result<()> {
        self.branch_on_zero(reg, label, true)
    }

    /// Branch to `label` when `reg` is non-zero.
    pub fn branch_if_nonzero(&mut self, reg: &Reg, label: crate::insn::Label) -> Result<()> {
        self.branch_on_zero(reg, label, false)
    }

    fn branch_on_zero(&mut self, reg: &Reg, label: crate::insn::Label, zero: bool) -> Result<()> {
        self.check_body()?;
        if reg.limb_count() != 1 {
            return Err(Error::InvalidArgument("fused branches are single-limb"));
        }
        if self.platform.has(PlatformFeatures::COMPARE_AND_BRANCH) {
            let op = if zero { Opcode::Cbeq } else { Opcode::Cbne };
            self.buf.push(
                Insn::new(op)
                    .with_src1(reg.limb(0).clone())
                    .with_label(label),
            );
            return Ok(());
        }
        self.cmp_imm(reg, 0)?;
        self.branch(if zero { Opcode::Beq } else { Opcode::Bne }, label)
    }

    /// Append a branch on `cond` to `label`.
    pub fn branch(&mut self, cond: Opcode, label: crate::insn::Label) -> Result<()> {
        self.check_body()?;
        if !cond.is_branch() || cond == Opcode::Call {
            return Err(Error::InvalidArgument("not a branch opcode"));
        }
        self.buf.push(Insn::new(cond).with_label(label));
        Ok(())
    }

    /// Call an in-function subroutine label.
    pub fn call(&mut self, label: crate::insn::Label) -> Result<()> {
        self.check_body()?;
        self.buf.push(Insn::new(Opcode::Call).with_label(label));
        Ok(())
    }

    /// Return from a subroutine emitted inside this function.
    pub fn sub_ret(&mut self) -> Result<()> {
        self.check_body()?;
        self.buf.push(Insn::new(Opcode::Ret));
        Ok(())
    }

    /// Load `dst` from `[base + off]`, one limb per access.
    pub fn ld(&mut self, dst: &Reg, base: &Reg, off: u32) -> Result<()> {
        self.check_body()?;
        let b = Self::check_base(base)?.clone();
        let size = dst.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        let op = load_op(size);
        let step = size.bytes();
        let p = self.platform;
        let fits = (0..dst.limb_count() as u32)
            .all(|i| p.valid_disp(op, size, &b, (off + i * step) as i32));
        if fits {
            for i in 0..dst.limb_count() {
                self.buf.push(
                    Insn::new(op)
                        .with_dest(dst.limb(i).clone())
                        .with_src1(b.clone())
                        .with_imm((off + i as u32 * step) as u64),
                );
            }
            return Ok(());
        }
        // Out-of-range displacement: carry the offset in a scratch base.
        let mut t = self.addr()?;
        let base_reg = Reg::from_limbs(vec![b])?;
        self.move_reg(&t, &base_reg)?;
        self.add_imm(&t, off as u64)?;
        for i in 0..dst.limb_count() {
            let disp = i as u32 * step;
            if !p.valid_disp(op, size, t.limb(0), disp as i32) {
                return Err(Error::InvalidInstruction("displacement out of range"));
            }
            self.buf.push(
                Insn::new(op)
                    .with_dest(dst.limb(i).clone())
                    .with_src1(t.limb(0).clone())
                    .with_imm(disp as u64),
            );
        }
        self.release(&mut t);
        Ok(())
    }

    /// Store `src` to `[base + off]`, one limb per access.
    pub fn st(&mut self, src: &Reg, base: &Reg, off: u32) -> Result<()> {
        self.check_body()?;
        let b = Self::check_base(base)?.clone();
        let size = src.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        let op = store_op(size);
        let step = size.bytes();
        let p = self.platform;
        let fits = (0..src.limb_count() as u32)
            .all(|i| p.valid_disp(op, size, &b, (off + i * step) as i32));
        if fits {
            for i in 0..src.limb_count() {
                self.buf.push(
                    Insn::new(op)
                        .with_src1(b.clone())
                        .with_src2(src.limb(i).clone())
                        .with_imm((off + i as u32 * step) as u64),
                );
            }
            return Ok(());
        }
        let mut t = self.addr()?;
        let base_reg = Reg::from_limbs(vec![b])?;
        self.move_reg(&t, &base_reg)?;
        self.add_imm(&t, off as u64)?;
        for i in 0..src.limb_count() {
            let disp = i as u32 * step;
            if !p.valid_disp(op, size, t.limb(0), disp as i32) {
                return Err(Error::InvalidInstruction("displacement out of range"));
            }
            self.buf.push(
                Insn::new(op)
                    .with_src1(t.limb(0).clone())
                    .with_src2(src.limb(i).clone())
                    .with_imm(disp as u64),
            );
        }
        self.release(&mut t);
        Ok(())
    }

    /// Interpreter-only diagnostic print of a register.
    pub fn print(&mut self, reg: &Reg) -> Result<()> {
        self.check_body()?;
        self.buf.push(Insn::new(Opcode::Print).with_src1(reg.limb(0).clone()));
        Ok(())
    }

    /// `dst = op(dst, shift(src))` on single-limb operands: the
    /// shift-and-operate form, materialised through a scratch register on
    /// targets without it.
    pub fn op_shifted(
        &mut self,
        op: Opcode,
        dst: &Reg,
        src: &Reg,
        shift: (crate::insn::ShiftOp, u8),
    ) -> Result<()> {
        self.check_body()?;
        if dst.limb_count() != 1 || src.limb_count() != 1 {
            return Err(Error::InvalidArgument("shifted operands are single-limb"));
        }
        let p = self.platform;
        let mark = self.buf.len();
        if p
            .binary_shifted(&mut self.buf, op, dst.limb(0), dst.limb(0), src.limb(0), shift, false)
            .is_ok()
        {
            return Ok(());
        }
        self.rollback(mark);
        let size = dst.limb_size().unwrap();
        let mut t = self.temporary(size.bits())?;
        self.buf.push(
            Insn::new(Opcode::Mov)
                .with_dest(t.limb(0).clone())
                .with_src1(src.limb(0).clone()),
        );
        match shift.0 {
            crate::insn::ShiftOp::Lsl => self.shl(&t, shift.1 as u32)?,
            crate::insn::ShiftOp::Lsr => self.shr(&t, shift.1 as u32)?,
            crate::insn::ShiftOp::Ror => self.ror(&mut t, shift.1 as u32)?,
            crate::insn::ShiftOp::Asr => {
                p.binary_imm(&mut self.buf, Opcode::Asr, t.limb(0), t.limb(0), shift.1 as u64, false)?
            }
        }
        p.binary(&mut self.buf, op, dst.limb(0), dst.limb(0), t.limb(0), false)?;
        self.release(&mut t);
        Ok(())
    }

    /// `dst = shift(src)` on single-limb operands.
    pub fn mov_shifted(
        &mut self,
        dst: &Reg,
        src: &Reg,
        shift: (crate::insn::ShiftOp, u8),
    ) -> Result<()> {
        self.check_body()?;
        if dst.limb_count() != 1 || src.limb_count() != 1 {
            return Err(Error::InvalidArgument("shifted operands are single-limb"));
        }
        let p = self.platform;
        let mark = self.buf.len();
        if p
            .binary_shifted(&mut self.buf, Opcode::Mov, dst.limb(0), dst.limb(0), src.limb(0), shift, false)
            .is_ok()
        {
            return Ok(());
        }
        self.rollback(mark);
        self.buf.push(
            Insn::new(Opcode::Mov)
                .with_dest(dst.limb(0).clone())
                .with_src1(src.limb(0).clone()),
        );
        let mut d = dst.clone();
        match shift.0 {
            crate::insn::ShiftOp::Lsl => self.shl(&d, shift.1 as u32)?,
            crate::insn::ShiftOp::Lsr => self.shr(&d, shift.1 as u32)?,
            crate::insn::ShiftOp::Ror => self.ror(&mut d, shift.1 as u32)?,
            crate::insn::ShiftOp::Asr => {
                p.binary_imm(&mut self.buf, Opcode::Asr, dst.limb(0), dst.limb(0), shift.1 as u64, false)?
            }
        }
        Ok(())
    }

    /// Byte-swap a single-limb register.
    pub fn bswap(&mut self, reg: &Reg) -> Result<()> {
        self.check_body()?;
        if reg.limb_count() != 1 {
            return Err(Error::InvalidArgument("byte swap is single-limb"));
        }
        let p = self.platform;
        p.unary(&mut self.buf, Opcode::Rev, reg.limb(0), reg.limb(0))
    }

    /// Decrement a single-limb register, leaving the zero flag set for a
    /// following branch.
    pub fn dec_flags(&mut self, reg: &Reg) -> Result<()> {
        self.check_body()?;
        if reg.limb_count() != 1 {
            return Err(Error::InvalidArgument("counters are single-limb"));
        }
        let p = self.platform;
        p.binary_imm(&mut self.buf, Opcode::Sub, reg.limb(0), reg.limb(0), 1, true)
    }
}
