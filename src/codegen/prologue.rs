//! Prologue verbs
//!
//! Authors never write prologue instructions; they pick the verb matching
//! the function's shape and receive the bound registers. Epilogues are
//! produced automatically at `finish` from the ever-used mask.

use super::CodeGen;
use crate::error::Result;
use crate::platform::ArgType;
use crate::reg::Reg;

impl CodeGen<'_> {
    /// A bare function with no arguments; used for hand-built tests.
    pub fn begin_function(&mut self, name: &str) -> Result<()> {
        self.bind_args(name, &[])?;
        Ok(())
    }

    /// Permutation shape: one state pointer and a local frame.
    pub fn begin_permutation(&mut self, name: &str, frame_bytes: u32) -> Result<Reg> {
        let mut args = self.bind_args(name, &[ArgType::Ptr])?;
        let state = self.to_addr(args.remove(0))?;
        self.setup_locals(frame_bytes)?;
        Ok(state)
    }

    /// Permutation with a small counter argument.
    pub fn begin_permutation_count(&mut self, name: &str, frame_bytes: u32) -> Result<(Reg, Reg)> {
        let mut args = self.bind_args(name, &[ArgType::Ptr, ArgType::U8])?;
        let count = args.remove(1);
        let state = self.to_addr(args.remove(0))?;
        self.setup_locals(frame_bytes)?;
        Ok((state, count))
    }

    /// Key setup shape: key pointer and schedule pointer.
    pub fn begin_setup_key(&mut self, name: &str) -> Result<(Reg, Reg)> {
        let mut args = self.bind_args(name, &[ArgType::Ptr, ArgType::Ptr])?;
        let schedule = args.remove(1);
        let key = args.remove(0);
        let schedule = self.to_addr(schedule)?;
        let key = self.to_addr_granting(key)?;
        Ok((key, schedule))
    }

    /// Block cipher shape: schedule, input and output pointers.
    ///
    /// On pointer-starved targets the output binding may come back as a
    /// plain register pair; move it into an address carrier once the
    /// input pointer is spent.
    pub fn begin_encrypt_block(&mut self, name: &str) -> Result<(Reg, Reg, Reg)> {
        let mut args = self.bind_args(name, &[ArgType::Ptr, ArgType::Ptr, ArgType::Ptr])?;
        let output = args.remove(2);
        let input = args.remove(1);
        let schedule = args.remove(0);
        let input = self.to_addr(input)?;
        let schedule = self.to_addr_granting(schedule)?;
        Ok((schedule, input, output))
    }

    /// Masked permutation shape: state pointer, preserved-randomness
    /// pointer, and a declared scratch share.
    pub fn begin_masked_permutation(
        &mut self,
        name: &str,
        frame_bytes: u32,
    ) -> Result<(Reg, Reg, Reg)> {
        let mut args = self.bind_args(name, &[ArgType::Ptr, ArgType::Ptr])?;
        let rand = args.remove(1);
        let state = self.to_addr(args.remove(0))?;
        let rand = self.to_addr_granting(rand)?;
        self.setup_locals(frame_bytes)?;
        let scratch = self.temporary(self.platform.word_size().bits())?;
        Ok((state, rand, scratch))
    }
}
