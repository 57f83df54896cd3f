//! S-box tables
//!
//! Tables are owned by the function and emitted after its body, aligned
//! to 256 bytes so an 8-bit index can replace the low pointer byte.
//! Lookups go through a staked pointer register: the platform's dedicated
//! table pointer where one exists, any address carrier otherwise.

use super::CodeGen;
use crate::error::{Error, Result};
use crate::insn::{Insn, Opcode};
use crate::reg::{Reg, SizedReg};

/// Largest table one embedded region may hold.
pub const SBOX_MAX: usize = 1024;

impl CodeGen<'_> {
    /// Embed `table` at the end of the function, returning its index.
    pub fn sbox_add(&mut self, table: &[u8]) -> Result<usize> {
        if table.is_empty() || table.len() > SBOX_MAX {
            return Err(Error::InvalidArgument("table length out of range"));
        }
        self.sboxes.push(table.to_vec());
        Ok(self.sboxes.len() - 1)
    }

    /// Stake the table pointer on table `index`.
    pub fn sbox_setup(&mut self, index: usize) -> Result<()> {
        self.check_body()?;
        if index >= self.sboxes.len() {
            return Err(Error::InvalidArgument("unknown table index"));
        }
        if self.sbox_stake.is_some() {
            return Err(Error::InvalidArgument("a table pointer is already staked"));
        }
        let stake: SizedReg = match self.platform.table_ptr() {
            Some(tp) => {
                let bit = 1u64 << tp.number();
                if self.allocated & bit != 0 {
                    return Err(Error::AllocationFailure {
                        platform: self.platform.name(),
                        bits: self.platform.addr_size().bits(),
                    });
                }
                self.allocated |= bit;
                self.ever_used |= bit;
                SizedReg::new(tp.clone(), self.platform.addr_size())?
            }
            None => {
                let r = self.addr()?;
                r.limb(0).clone()
            }
        };
        self.push(
            Insn::new(Opcode::Lea)
                .with_dest(stake.clone())
                .with_imm(index as u64),
        );
        self.sbox_stake = Some(stake);
        Ok(())
    }

    /// Stake the table pointer `offset` bytes into table `index`
    /// (pre-offset variant for shared constant regions).
    pub fn sbox_setup_at(&mut self, index: usize, offset: u32) -> Result<()> {
        self.sbox_setup(index)?;
        self.sbox_adjust(offset)
    }

    /// Advance the staked pointer.
    pub fn sbox_adjust(&mut self, delta: u32) -> Result<()> {
        self.check_body()?;
        let stake = self
            .sbox_stake
            .clone()
            .ok_or(Error::InvalidArgument("no staked table pointer"))?;
        let ptr = Reg::from_limbs(vec![stake])?;
        self.add_imm(&ptr, delta as u64)
    }

    /// `dst = table[idx]`: the offset-by-register lookup used for S-boxes
    /// and round-indexed constants.
    pub fn sbox_lookup(&mut self, dst: &Reg, idx: &Reg) -> Result<()> {
        self.check_body()?;
        let stake = self
            .sbox_stake
            .clone()
            .ok_or(Error::InvalidArgument("no staked table pointer"))?;
        self.push(
            Insn::new(Opcode::Ldt)
                .with_dest(dst.limb(0).clone())
                .with_src1(stake)
                .with_src2(idx.limb(0).clone()),
        );
        Ok(())
    }

    /// `dst = *ptr++`: sequential table read, advancing the stake.
    pub fn sbox_lookup_next(&mut self, dst: &Reg) -> Result<()> {
        self.check_body()?;
        let stake = self
            .sbox_stake
            .clone()
            .ok_or(Error::InvalidArgument("no staked table pointer"))?;
        self.push(
            Insn::new(Opcode::Ldt)
                .with_dest(dst.limb(0).clone())
                .with_src1(stake),
        );
        self.sbox_adjust(1)
    }

    /// The staked pointer as a register, for direct wide loads from a
    /// constant region.
    pub fn sbox_base(&self) -> Result<Reg> {
        let stake = self
            .sbox_stake
            .clone()
            .ok_or(Error::InvalidArgument("no staked table pointer"))?;
        Reg::from_limbs(vec![stake])
    }

    /// Release the staked pointer.
    pub fn sbox_cleanup(&mut self) -> Result<()> {
        let stake = self
            .sbox_stake
            .take()
            .ok_or(Error::InvalidArgument("no staked table pointer"))?;
        self.allocated &= !(1u64 << stake.number());
        Ok(())
    }
}
