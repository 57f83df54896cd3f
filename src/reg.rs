//! Physical register descriptions and multi-limb virtual registers

use crate::error::{Error, Result};

use bitflags::bitflags;

use std::fmt;
use std::sync::Arc;

/// Operand widths a physical register can be used at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RegSize {
    /// Eight bits.
    S8 = 8,
    /// Sixteen bits.
    S16 = 16,
    /// Thirty-two bits.
    S32 = 32,
    /// Sixty-four bits.
    S64 = 64,
}

impl RegSize {
    /// Width in bits.
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Width in bytes.
    pub const fn bytes(self) -> u32 {
        self.bits() / 8
    }

    /// The size matching an exact bit count, if any.
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::S8),
            16 => Some(Self::S16),
            32 => Some(Self::S32),
            64 => Some(Self::S64),
            _ => None,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::S8 => 0,
            Self::S16 => 1,
            Self::S32 => 2,
            Self::S64 => 3,
        }
    }
}

bitflags! {
    /// Widths supported by a basic register, as a set.
    pub struct SizeSet: u8 {
        /// Usable at 8 bits.
        const B8 = 0x01;
        /// Usable at 16 bits.
        const B16 = 0x02;
        /// Usable at 32 bits.
        const B32 = 0x04;
        /// Usable at 64 bits.
        const B64 = 0x08;
    }
}

impl SizeSet {
    /// Whether `size` is in the set.
    pub fn supports(self, size: RegSize) -> bool {
        self.contains(match size {
            RegSize::S8 => Self::B8,
            RegSize::S16 => Self::B16,
            RegSize::S32 => Self::B32,
            RegSize::S64 => Self::B64,
        })
    }
}

bitflags! {
    /// Capability flags of a basic register.
    ///
    /// The two class flags (`TWO_ADDRESS`, `THREE_ADDRESS`) mark the
    /// register as usable in the platform's short or long encodings; what
    /// that means concretely is up to the platform's lowering hooks.
    pub struct RegFlags: u16 {
        /// Usable in two-address (short) encodings; on split-class
        /// platforms this marks the privileged class (immediate-capable
        /// on 8-bit targets, low registers on Thumb).
        const TWO_ADDRESS = 0x0001;
        /// Usable in three-address encodings.
        const THREE_ADDRESS = 0x0002;
        /// The stack pointer.
        const STACK_PTR = 0x0004;
        /// The program counter.
        const PROGRAM_CTR = 0x0008;
        /// The link register.
        const LINK = 0x0010;
        /// May carry an address for loads and stores.
        const ADDRESS = 0x0020;
        /// General data register, arithmetic-capable.
        const DATA = 0x0040;
        /// Movable but not arithmetic-capable (storage class).
        const STORAGE = 0x0080;
        /// Widening moves out of this register sign-extend.
        const SIGN_EXTENDS = 0x0100;
        /// Callee-saved under the platform's calling convention.
        const CALLEE_SAVED = 0x0200;
        /// Reads as zero.
        const ZERO = 0x0400;
        /// Scratch register that calls and branches may clobber.
        const TEMP = 0x0800;
        /// Never handed out by the allocator unless explicitly granted.
        const NO_ALLOC = 0x1000;
    }
}

/// A named physical register on a target.
///
/// Immutable after construction and shared by handle ([`Arc`]); platforms
/// hand out many references and never mutate. Rebuild to "change".
#[derive(Debug)]
pub struct BaseReg {
    number: u8,
    sizes: SizeSet,
    flags: RegFlags,
    names: [Option<&'static str>; 4],
    addr_name: Option<&'static str>,
}

impl BaseReg {
    /// Describe a register with its platform-unique number and flags.
    pub fn new(number: u8, flags: RegFlags) -> Self {
        debug_assert!(number < 64, "register numbers index a 64-bit mask");
        Self {
            number,
            sizes: SizeSet::empty(),
            flags,
            names: [None; 4],
            addr_name: None,
        }
    }

    /// Add a width and its textual name.
    pub fn with_name(mut self, size: RegSize, name: &'static str) -> Self {
        self.sizes |= match size {
            RegSize::S8 => SizeSet::B8,
            RegSize::S16 => SizeSet::B16,
            RegSize::S32 => SizeSet::B32,
            RegSize::S64 => SizeSet::B64,
        };
        self.names[size.index()] = Some(name);
        self
    }

    /// Add a dedicated address-mode name (e.g. `X` for an 8-bit pair).
    pub fn with_addr_name(mut self, name: &'static str) -> Self {
        self.addr_name = Some(name);
        self
    }

    /// Platform-unique register number.
    pub const fn number(&self) -> u8 {
        self.number
    }

    /// Capability flags.
    pub const fn flags(&self) -> RegFlags {
        self.flags
    }

    /// Widths the register supports.
    pub const fn sizes(&self) -> SizeSet {
        self.sizes
    }

    /// Whether the register is usable at `size`.
    pub fn supports(&self, size: RegSize) -> bool {
        self.sizes.supports(size)
    }

    /// Textual name at `size`.
    pub fn name(&self, size: RegSize) -> Option<&'static str> {
        self.names[size.index()]
    }

    /// Address-mode name, falling back to the widest plain name.
    pub fn addr_name(&self) -> Option<&'static str> {
        self.addr_name
            .or_else(|| self.names.iter().rev().copied().flatten().next())
    }
}

/// A basic register selected at one specific width.
#[derive(Clone)]
pub struct SizedReg {
    base: Arc<BaseReg>,
    size: RegSize,
}

impl SizedReg {
    /// Pair a register with a width it supports.
    pub fn new(base: Arc<BaseReg>, size: RegSize) -> Result<Self> {
        if !base.supports(size) {
            return Err(Error::InvalidRegister("register does not support size"));
        }
        Ok(Self { base, size })
    }

    /// The underlying basic register.
    pub fn base(&self) -> &Arc<BaseReg> {
        &self.base
    }

    /// Register number.
    pub fn number(&self) -> u8 {
        self.base.number()
    }

    /// Selected width.
    pub const fn size(&self) -> RegSize {
        self.size
    }

    /// Capability flags of the underlying register.
    pub fn flags(&self) -> RegFlags {
        self.base.flags()
    }

    /// Textual name at the selected width.
    pub fn name(&self) -> &'static str {
        self.base.name(self.size).unwrap_or("?")
    }
}

impl PartialEq for SizedReg {
    fn eq(&self, other: &Self) -> bool {
        self.number() == other.number() && self.size == other.size
    }
}

impl Eq for SizedReg {}

impl fmt::Debug for SizedReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.size.bits())
    }
}

/// A multi-limb virtual register.
///
/// An ordered sequence of equally sized physical registers holding one
/// value, least significant limb first, plus the number of significant bits
/// and whether the bits above them are known to be zero.
#[derive(Clone, Default)]
pub struct Reg {
    limbs: Vec<SizedReg>,
    size: u32,
    zero_fill: bool,
    pinned: bool,
}

impl Reg {
    /// An empty register holding nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from limbs of identical width, least significant first.
    pub fn from_limbs(limbs: Vec<SizedReg>) -> Result<Self> {
        let mut reg = Self::empty();
        for limb in limbs {
            reg.push(limb)?;
        }
        Ok(reg)
    }

    /// Append the next more significant limb.
    pub fn push(&mut self, limb: SizedReg) -> Result<()> {
        if let Some(first) = self.limbs.first() {
            if first.size() != limb.size() {
                return Err(Error::InvalidRegister("mixed limb widths"));
            }
        }
        if self.limbs.iter().any(|l| l.number() == limb.number()) {
            return Err(Error::InvalidRegister("physical register used twice"));
        }
        self.limbs.push(limb);
        self.size = self.full_size();
        Ok(())
    }

    /// Number of limbs.
    pub fn limb_count(&self) -> usize {
        self.limbs.len()
    }

    /// Whether no limbs are held.
    pub fn is_empty(&self) -> bool {
        self.limbs.is_empty()
    }

    /// Width of each limb; empty registers have no limb size.
    pub fn limb_size(&self) -> Option<RegSize> {
        self.limbs.first().map(SizedReg::size)
    }

    /// The `i`-th limb, least significant first.
    pub fn limb(&self, i: usize) -> &SizedReg {
        &self.limbs[i]
    }

    /// All limbs in significance order.
    pub fn limbs(&self) -> &[SizedReg] {
        &self.limbs
    }

    /// Significant bit count.
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Total bit capacity.
    pub fn full_size(&self) -> u32 {
        self.limbs
            .first()
            .map(|l| l.size().bits() * self.limbs.len() as u32)
            .unwrap_or(0)
    }

    /// Whether bits `size..full_size` are guaranteed zero.
    pub const fn zero_fill(&self) -> bool {
        self.zero_fill
    }

    /// Record that the bits above `size` are known zero (or no longer are).
    pub fn set_zero_fill(&mut self, zero: bool) {
        self.zero_fill = zero;
    }

    /// Whether limb renumbering is forbidden for this value.
    pub const fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Forbid limb renumbering; rotations will move bytes instead.
    pub fn pin(&mut self) {
        self.pinned = true;
    }

    /// Set the significant bit count.
    ///
    /// The count must stay within the high limb: more than
    /// `full_size - limb_size`, at most `full_size`.
    pub fn set_size(&mut self, bits: u32) -> Result<()> {
        let full = self.full_size();
        let limb = self.limb_size().map(|s| s.bits()).unwrap_or(0);
        if bits > full || full - bits >= limb {
            return Err(Error::InvalidRegister("size outside the high limb"));
        }
        self.size = bits;
        if bits < full {
            self.zero_fill = false;
        }
        Ok(())
    }

    /// A limb-aligned slice `[start, start + bits)` of this register.
    ///
    /// The range is half-open and must start on a limb boundary; the
    /// selected limbs are shared with `self`.
    pub fn subset(&self, start: u32, bits: u32) -> Result<Self> {
        let limb = match self.limb_size() {
            Some(s) => s.bits(),
            None => return Err(Error::InvalidRegister("subset of an empty register")),
        };
        if start % limb != 0 {
            return Err(Error::InvalidRegister("subset start not limb-aligned"));
        }
        if bits == 0 || start + bits > self.full_size() {
            return Err(Error::InvalidRegister("subset range out of bounds"));
        }
        let lo = (start / limb) as usize;
        let hi = ((start + bits + limb - 1) / limb) as usize;
        let mut out = Self::from_limbs(self.limbs[lo..hi].to_vec())?;
        out.set_size(bits)?;
        out.zero_fill = self.zero_fill || bits % limb == 0;
        out.pinned = self.pinned;
        Ok(out)
    }

    /// The same value with limb significance reversed, switching between
    /// little- and big-endian layouts. Only whole values can be reversed.
    pub fn reversed(&self) -> Result<Self> {
        if self.size != self.full_size() {
            return Err(Error::InvalidRegister("partial register reversed"));
        }
        let mut out = self.clone();
        out.limbs.reverse();
        Ok(out)
    }

    /// Renumber limbs so the value rotates right by `n` whole limbs.
    ///
    /// No code is implied; limb `i` of the result is limb `(i + n) % count`
    /// of the input. Only whole values can be renumbered.
    pub fn limbs_rotated_right(&self, n: usize) -> Result<Self> {
        if self.size != self.full_size() {
            return Err(Error::InvalidRegister("partial register renumbered"));
        }
        let mut out = self.clone();
        let count = out.limbs.len();
        if count > 0 {
            out.limbs.rotate_left(n % count);
        }
        Ok(out)
    }

    /// Apply an arbitrary limb permutation: limb `i` of the result is limb
    /// `perm[i]` of the input.
    pub fn limbs_permuted(&self, perm: &[usize]) -> Result<Self> {
        if perm.len() != self.limbs.len() {
            return Err(Error::InvalidRegister("permutation length mismatch"));
        }
        let mut seen = vec![false; perm.len()];
        for &p in perm {
            if p >= perm.len() || seen[p] {
                return Err(Error::InvalidRegister("not a permutation"));
            }
            seen[p] = true;
        }
        let mut out = self.clone();
        out.limbs = perm.iter().map(|&p| self.limbs[p].clone()).collect();
        Ok(out)
    }

    /// A one-limb view of limb `i`, sharing the physical register.
    pub fn limb_reg(&self, i: usize) -> Self {
        Self {
            limbs: vec![self.limbs[i].clone()],
            size: self.limbs[i].size().bits(),
            zero_fill: true,
            pinned: self.pinned,
        }
    }

    /// Drop all limbs, leaving an empty register.
    pub(crate) fn clear(&mut self) {
        self.limbs.clear();
        self.size = 0;
        self.zero_fill = false;
        self.pinned = false;
    }
}

impl PartialEq for Reg {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.limbs == other.limbs
    }
}

impl Eq for Reg {}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reg[")?;
        for (i, l) in self.limbs.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:?}", l)?;
        }
        write!(f, "]/{}", self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(n: u8) -> Arc<BaseReg> {
        Arc::new(BaseReg::new(n, RegFlags::DATA).with_name(RegSize::S8, "r"))
    }

    fn reg(numbers: &[u8]) -> Reg {
        Reg::from_limbs(
            numbers
                .iter()
                .map(|&n| SizedReg::new(base(n), RegSize::S8).unwrap())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn mixed_widths_rejected() {
        let wide = Arc::new(
            BaseReg::new(9, RegFlags::DATA)
                .with_name(RegSize::S8, "a")
                .with_name(RegSize::S16, "b"),
        );
        let mut r = reg(&[0]);
        let err = r.push(SizedReg::new(wide, RegSize::S16).unwrap());
        assert!(matches!(err, Err(Error::InvalidRegister(_))));
    }

    #[test]
    fn duplicate_limb_rejected() {
        let mut r = reg(&[0, 1]);
        let err = r.push(SizedReg::new(base(0), RegSize::S8).unwrap());
        assert!(matches!(err, Err(Error::InvalidRegister(_))));
    }

    #[test]
    fn size_window() {
        let mut r = reg(&[0, 1, 2, 3]);
        assert!(r.set_size(25).is_ok());
        assert!(!r.zero_fill());
        assert!(r.set_size(32).is_ok());
        assert!(r.set_size(24).is_err());
        assert!(r.set_size(33).is_err());
    }

    #[test]
    fn subset_is_half_open() {
        let r = reg(&[0, 1, 2, 3]);
        let s = r.subset(8, 16).unwrap();
        assert_eq!(s.limb_count(), 2);
        assert_eq!(s.limb(0).number(), 1);
        assert_eq!(s.limb(1).number(), 2);
        assert_eq!(r.subset(0, r.size()).unwrap(), r);
        assert!(r.subset(4, 8).is_err());
    }

    #[test]
    fn reverse_round_trips() {
        let r = reg(&[0, 1, 2]);
        assert_eq!(r.reversed().unwrap().reversed().unwrap(), r);
        let mut partial = reg(&[0, 1, 2]);
        partial.set_size(17).unwrap();
        assert!(partial.reversed().is_err());
    }

    #[test]
    fn renumber_rotates_value() {
        let r = reg(&[0, 1, 2, 3]);
        let rot = r.limbs_rotated_right(1).unwrap();
        assert_eq!(rot.limb(0).number(), 1);
        assert_eq!(rot.limb(3).number(), 0);
    }
}
