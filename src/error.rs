//! Code generation and interpretation error taxonomy

use crate::insn::{Label, Opcode};

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can go wrong while describing registers, generating a
/// function, interpreting it, or feeding it test vectors.
///
/// Every error is fatal to the function under construction. Callers are
/// expected to discard the partial generator and start over; no variant is
/// recoverable in place.
#[derive(Debug, Error)]
pub enum Error {
    /// A register composition or sizing request violates the model
    /// invariants (mixed limb widths, duplicated physical register,
    /// size outside the legal window, misaligned subset, ...).
    #[error("invalid register: {0}")]
    InvalidRegister(&'static str),

    /// No combination of free physical registers satisfies an allocation
    /// request, after every flag fallback was tried.
    #[error("cannot allocate {bits} bits on {platform}")]
    AllocationFailure {
        /// Platform the allocation ran against.
        platform: &'static str,
        /// Requested width in bits.
        bits: u32,
    },

    /// The operand combination is illegal for the platform and no lowering
    /// could work around it.
    #[error("invalid instruction: {0}")]
    InvalidInstruction(&'static str),

    /// A literal falls outside the platform's legal immediate encodings for
    /// the opcode. The structured layer normally synthesises such literals
    /// into a scratch register; this surfaces only when that is impossible.
    #[error("immediate {imm:#x} is not encodable for {op}")]
    InvalidImmediate {
        /// Opcode the literal was destined for.
        op: Opcode,
        /// The offending literal.
        imm: u64,
    },

    /// A branch references a label that was never bound, or a label was
    /// bound more than once.
    #[error("unresolved label {0:?}")]
    UnresolvedLabel(Label),

    /// API misuse that is independent of the platform, such as a zero-width
    /// allocation or mismatched operand shapes.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The generator was used after `finish`.
    #[error("function already finalised")]
    Finalised,

    /// The local frame exceeds what the platform can carve out with a
    /// single prologue adjustment.
    #[error("frame of {bytes} bytes exceeds the {platform} limit of {limit}")]
    FrameTooLarge {
        /// Platform the frame was requested on.
        platform: &'static str,
        /// Requested frame size after rounding.
        bytes: u32,
        /// The platform's single-adjustment limit.
        limit: u32,
    },

    /// The interpreter hit an invalid machine state: out-of-bounds memory,
    /// a read of a register the platform does not define, or an over-long
    /// run. Reported as a mismatch, never a crash.
    #[error("interpreter abort: {0}")]
    Interp(String),

    /// A test-vector field the driver asked for is absent.
    #[error("test vector field missing: {0}")]
    TestVectorMissing(String),
}

impl Error {
    /// Interpreter abort with a formatted reason.
    pub(crate) fn interp(msg: impl Into<String>) -> Self {
        Self::Interp(msg.into())
    }
}
