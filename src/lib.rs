//! Guided compiler for cryptographic primitives.
//!
//! Primitives are written once against a register-algebra verb layer;
//! the framework handles register allocation, frame layout, calling
//! conventions, rotation lowering, S-box materialisation and assembly
//! emission, and verifies the generated code against known answers
//! through an in-process interpreter.

#![warn(missing_docs)]

pub mod codegen;
pub mod emit;
pub mod error;
pub mod front;
pub mod gen;
pub mod imm;
pub mod insn;
pub mod interp;
pub mod kat;
pub mod platform;
pub mod reg;
pub mod registry;
pub mod vectors;

pub mod prelude {
    //! The types most callers need.

    pub use crate::codegen::{CodeGen, Func};
    pub use crate::error::{Error, Result};
    pub use crate::front::{CountLoop, Shares};
    pub use crate::insn::{Insn, InsnOpts, Label, Opcode, ShiftOp};
    pub use crate::interp::Interpreter;
    pub use crate::platform::{ArgType, Platform, PlatformFeatures, PlatformKind};
    pub use crate::reg::{BaseReg, Reg, RegFlags, RegSize, SizedReg};
    pub use crate::registry::{Registration, Registry};
}
