//! Register allocation
//!
//! First-fit over the platform's inventory; the list order is the
//! allocation policy. Up to four flag sets are tried in turn before the
//! request fails.

use super::CodeGen;
use crate::error::{Error, Result};
use crate::reg::{Reg, RegFlags, SizedReg};

impl CodeGen<'_> {
    /// Reserve a fresh virtual register of `bits`, trying each flag set
    /// in `prefs` until one can be satisfied.
    ///
    /// The limb width is the current default allocation size, forced to
    /// the address word when `ADDRESS` is requested. The least
    /// significant limb is assigned first.
    pub fn allocate(&mut self, bits: u32, prefs: &[RegFlags]) -> Result<Reg> {
        self.check_body()?;
        if bits == 0 {
            return Err(Error::InvalidArgument("zero-width allocation"));
        }
        if prefs.is_empty() || prefs.len() > 4 {
            return Err(Error::InvalidArgument("between one and four flag sets"));
        }
        for &flags in prefs {
            if let Some(reg) = self.try_allocate(bits, flags)? {
                return Ok(reg);
            }
        }
        Err(Error::AllocationFailure {
            platform: self.platform.name(),
            bits,
        })
    }

    fn try_allocate(&mut self, bits: u32, flags: RegFlags) -> Result<Option<Reg>> {
        let limb = if flags.contains(RegFlags::ADDRESS) {
            self.platform.addr_size()
        } else {
            self.alloc_size
        };
        let count = ((bits + limb.bits() - 1) / limb.bits()) as usize;

        let mut picks: Vec<SizedReg> = Vec::with_capacity(count);
        for base in self.platform.regs() {
            if picks.len() == count {
                break;
            }
            let n = base.number();
            if self.allocated & (1u64 << n) != 0 {
                continue;
            }
            if !base.supports(limb) {
                continue;
            }
            if !base.flags().contains(flags) {
                continue;
            }
            if base.flags().contains(RegFlags::NO_ALLOC) && self.granted & (1u64 << n) == 0 {
                continue;
            }
            let sr = SizedReg::new(base.clone(), limb)?;
            if let Some(shadow) = self.platform.shadow(&sr) {
                if self.allocated & (1u64 << shadow) != 0 {
                    continue;
                }
            }
            picks.push(sr);
        }
        if picks.len() < count {
            return Ok(None);
        }
        for sr in &picks {
            self.reserve_sized(sr);
        }
        let mut reg = Reg::from_limbs(picks)?;
        if bits < reg.full_size() {
            reg.set_size(bits)?;
        }
        Ok(Some(reg))
    }

    /// A scratch register: the explicit temporary class first, plain data
    /// as the fallback.
    pub fn temporary(&mut self, bits: u32) -> Result<Reg> {
        self.allocate(bits, &[RegFlags::TEMP, RegFlags::DATA])
    }

    /// A value-holding register: the storage class first, plain data as
    /// the fallback.
    pub fn storage(&mut self, bits: u32) -> Result<Reg> {
        self.allocate(bits, &[RegFlags::STORAGE, RegFlags::DATA])
    }

    /// A plain data register.
    pub fn data(&mut self, bits: u32) -> Result<Reg> {
        self.allocate(bits, &[RegFlags::DATA])
    }

    /// An address-carrier register at the address word size.
    pub fn addr(&mut self) -> Result<Reg> {
        self.allocate(self.platform.addr_size().bits(), &[RegFlags::ADDRESS])
    }

    /// Return every physical register of `reg` to the free pool and clear
    /// it. Idempotent; the ever-used mask is untouched.
    pub fn release(&mut self, reg: &mut Reg) {
        for limb in reg.limbs() {
            self.allocated &= !(1u64 << limb.number());
            if let Some(shadow) = self.platform.shadow(limb) {
                self.allocated &= !(1u64 << shadow);
            }
        }
        reg.clear();
    }

    pub(crate) fn reserve_sized(&mut self, sr: &SizedReg) {
        let bit = 1u64 << sr.number();
        self.allocated |= bit;
        self.ever_used |= bit;
        if let Some(shadow) = self.platform.shadow(sr) {
            let sb = 1u64 << shadow;
            self.allocated |= sb;
            self.ever_used |= sb;
        }
    }
}
