//! Argument binding
//!
//! Arguments are declared once, in order, before any code exists. Each
//! consumes registers from the platform's argument list or, once that is
//! exhausted, a stack slot above the stacked return address serviced by
//! an `ldarg` record.

use super::CodeGen;
use crate::error::Result;
use crate::insn::{Insn, Opcode};
use crate::platform::{ArgLoc, ArgType, PlatformFeatures};
use crate::reg::{Reg, RegFlags, RegSize};

impl CodeGen<'_> {
    /// Declare the function's arguments and bind them to registers.
    ///
    /// Legal only once, on an open generator; issuing the bindings moves
    /// the generator into its body state.
    pub fn bind_args(&mut self, name: &str, types: &[ArgType]) -> Result<Vec<Reg>> {
        self.check_open()?;
        let locs = self.platform.assign_args(types)?;
        self.enter_body(name);

        let mut out = Vec::with_capacity(locs.len());
        for (loc, &ty) in locs.iter().zip(types) {
            match loc {
                ArgLoc::Regs(srs) => {
                    for sr in srs {
                        self.reserve_sized(sr);
                    }
                    let mut reg = Reg::from_limbs(srs.clone())?;
                    if self.platform.has(PlatformFeatures::BIG_ENDIAN) && reg.limb_count() > 1 {
                        reg = reg.reversed()?;
                    }
                    out.push(reg);
                }
                ArgLoc::Stack { offset, bytes } => {
                    self.stack_args = true;
                    let reg = if ty == ArgType::Ptr {
                        let r = self.addr()?;
                        self.push(
                            Insn::new(Opcode::LdArg)
                                .with_dest(r.limb(0).clone())
                                .with_imm(*offset as u64),
                        );
                        r
                    } else {
                        let r = self.allocate(bytes * 8, &[RegFlags::DATA])?;
                        let step = r.limb_size().map(RegSize::bytes).unwrap_or(1);
                        for (i, limb) in r.limbs().iter().enumerate() {
                            self.push(
                                Insn::new(Opcode::LdArg)
                                    .with_dest(limb.clone())
                                    .with_imm((*offset + i as u32 * step) as u64),
                            );
                        }
                        r
                    };
                    out.push(reg);
                }
            }
        }
        Ok(out)
    }

    /// Move an incoming pointer argument into an address-carrier register
    /// if it is not in one already, releasing the original.
    pub fn to_addr(&mut self, mut arg: Reg) -> Result<Reg> {
        if arg.limb(0).flags().contains(RegFlags::ADDRESS) {
            return Ok(arg);
        }
        let dst = self.addr()?;
        self.move_reg(&dst, &arg)?;
        self.release(&mut arg);
        Ok(dst)
    }

    /// Like [`to_addr`](Self::to_addr), but willing to grant the frame
    /// base (when no frame is in use) and then the table pointer to find
    /// a carrier.
    pub fn to_addr_granting(&mut self, arg: Reg) -> Result<Reg> {
        if arg.limb(0).flags().contains(RegFlags::ADDRESS) {
            return Ok(arg);
        }
        let dst = self.addr_granting()?;
        let mut arg = arg;
        self.move_reg(&dst, &arg)?;
        self.release(&mut arg);
        Ok(dst)
    }

    /// Allocate an address carrier, granting the frame base (when no
    /// frame is in use) and then the table pointer if none is free.
    pub fn addr_granting(&mut self) -> Result<Reg> {
        if self.addr_available() {
            return self.addr();
        }
        if self.frame_bytes == 0 {
            let fb = self.platform.frame_base().clone();
            if let Some(name) = fb.name(self.platform.addr_size()) {
                self.grant(name)?;
                if self.addr_available() {
                    return self.addr();
                }
            }
        }
        if let Some(tp) = self.platform.table_ptr().cloned() {
            if let Some(name) = tp.name(self.platform.addr_size()) {
                self.grant(name)?;
            }
        }
        self.addr()
    }

    fn addr_available(&self) -> bool {
        let addr = self.platform.addr_size();
        self.platform.regs().iter().any(|r| {
            r.flags().contains(RegFlags::ADDRESS)
                && !r.flags().contains(RegFlags::STACK_PTR)
                && r.supports(addr)
                && self.allocated_mask() & (1u64 << r.number()) == 0
                && (!r.flags().contains(RegFlags::NO_ALLOC)
                    || self.granted & (1u64 << r.number()) != 0)
        })
    }
}
