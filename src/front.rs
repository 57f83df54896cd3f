//! Author-facing verb layer
//!
//! Thin idioms over the code generator that primitive authors lean on:
//! memory-coupled XOR, counter loops, and the masked-share helpers.
//! Every verb either appends records or manipulates allocator state,
//! never both implicitly.

use crate::codegen::CodeGen;
use crate::error::{Error, Result};
use crate::insn::{Label, Opcode};
use crate::reg::Reg;

/// An open counter loop.
#[derive(Debug, Clone, Copy)]
pub struct CountLoop {
    top: Label,
}

impl CodeGen<'_> {
    /// `dst ^= [base + off]`, staging each limb through `tmp`.
    pub fn xor_from_mem(&mut self, dst: &Reg, base: &Reg, off: u32, tmp: &Reg) -> Result<()> {
        let size = dst.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        if tmp.limb_size() != Some(size) {
            return Err(Error::InvalidArgument("staging register width differs"));
        }
        let step = size.bytes();
        for i in 0..dst.limb_count() {
            let t = tmp.limb_reg(0);
            self.ld(&t, base, off + i as u32 * step)?;
            let d = dst.limb_reg(i);
            self.xor(&d, &t)?;
        }
        Ok(())
    }

    /// `[base + off] ^= src`, staging each limb through `tmp`.
    pub fn xor_to_mem(&mut self, src: &Reg, base: &Reg, off: u32, tmp: &Reg) -> Result<()> {
        let size = src.limb_size().ok_or(Error::InvalidArgument("empty operand"))?;
        if tmp.limb_size() != Some(size) {
            return Err(Error::InvalidArgument("staging register width differs"));
        }
        let step = size.bytes();
        for i in 0..src.limb_count() {
            let t = tmp.limb_reg(0);
            let addr = off + i as u32 * step;
            self.ld(&t, base, addr)?;
            let s = src.limb_reg(i);
            self.xor(&t, &s)?;
            self.st(&t, base, addr)?;
        }
        Ok(())
    }

    /// Open a loop that will run `count` times; the counter must already
    /// hold the trip count and is consumed down to zero.
    pub fn count_loop(&mut self, _counter: &Reg) -> Result<CountLoop> {
        let top = self.new_label();
        self.bind(top)?;
        Ok(CountLoop { top })
    }

    /// Close a counter loop: decrement and branch while non-zero.
    pub fn end_count_loop(&mut self, lp: CountLoop, counter: &Reg) -> Result<()> {
        self.dec_flags(counter)?;
        self.branch(Opcode::Bne, lp.top)
    }
}

/// An `n`-share masked value: the XOR of the shares is the secret.
#[derive(Debug, Clone)]
pub struct Shares {
    shares: Vec<Reg>,
}

impl Shares {
    /// Wrap two or three equally shaped share registers.
    pub fn new(shares: Vec<Reg>) -> Result<Self> {
        if !(2..=3).contains(&shares.len()) {
            return Err(Error::InvalidArgument("two or three shares"));
        }
        let shape = (shares[0].limb_count(), shares[0].limb_size());
        if shares.iter().any(|s| (s.limb_count(), s.limb_size()) != shape) {
            return Err(Error::InvalidArgument("share shapes differ"));
        }
        Ok(Self { shares })
    }

    /// Number of shares.
    pub fn order(&self) -> usize {
        self.shares.len()
    }

    /// The `i`-th share.
    pub fn share(&self, i: usize) -> &Reg {
        &self.shares[i]
    }
}

impl CodeGen<'_> {
    /// Masked `x ^= (~y) & z`.
    ///
    /// The complement lives entirely in share zero of `y`, so the
    /// expansion pairs every `y` share with every `z` share (four terms
    /// at two shares, nine at three) and steers term `(j, k)` into
    /// output share `(j + k) mod n`. `scratch` stages each term.
    pub fn masked_bic_xor(
        &mut self,
        x: &Shares,
        y: &Shares,
        z: &Shares,
        scratch: &Reg,
    ) -> Result<()> {
        let n = x.order();
        if y.order() != n || z.order() != n {
            return Err(Error::InvalidArgument("share orders differ"));
        }
        for j in 0..n {
            for k in 0..n {
                let out = x.share((j + k) % n);
                self.move_reg(scratch, z.share(k))?;
                if j == 0 {
                    // (~y0) & zk as a bit-clear.
                    self.bic(scratch, y.share(0))?;
                } else {
                    self.logand(scratch, y.share(j))?;
                }
                self.xor(out, scratch)?;
            }
        }
        Ok(())
    }
}
