//! Immediate encodability predicates
//!
//! Each platform family has an exact rule for which literals fit its
//! instruction encodings. These predicates are computed precisely; a
//! literal that fails is synthesised into a scratch register by the code
//! generator, never emitted raw.

/// Rotated 8-bit class: an 8-bit quantity rotated right by an even amount
/// within 32 bits, and zero-extensions thereof.
pub fn rotated_imm8(imm: u64) -> bool {
    if imm > u32::MAX as u64 {
        return false;
    }
    let v = imm as u32;
    (0..16).any(|r| v.rotate_left(r * 2) <= 0xff)
}

/// Constrained small class: 8-bit unsigned only.
pub fn small_imm8(imm: u64) -> bool {
    imm <= 0xff
}

/// "Modified" class: a plain byte, the repeated-byte patterns `00XY00XY`,
/// `XY00XY00` and `XYXYXYXY`, or an 8-bit value with its high bit set
/// rotated right by a multiple of four.
pub fn modified_imm(imm: u64) -> bool {
    if imm > u32::MAX as u64 {
        return false;
    }
    let v = imm as u32;
    if v <= 0xff {
        return true;
    }
    let b = v & 0xff;
    if v == b * 0x0001_0001 || v == b * 0x0100_0100 || v == b * 0x0101_0101 {
        return true;
    }
    (0..8).any(|r| {
        let rot = v.rotate_left(r * 4);
        rot <= 0xff && rot >= 0x80
    })
}

/// Bitmask-logical class: `Y > 0` consecutive ones followed by `X > 0`
/// consecutive zeros, `X + Y` a power of two, tiled across the word and
/// rotated.
pub fn logical_imm(imm: u64, width: u32) -> bool {
    debug_assert!(width == 32 || width == 64);
    let v = if width == 32 {
        if imm > u32::MAX as u64 {
            return false;
        }
        // Replicate so the 64-bit walk below sees the tiled pattern.
        imm | (imm << 32)
    } else {
        imm
    };
    if v == 0 || v == u64::MAX {
        return false;
    }

    // Find the smallest repeating element.
    let mut size = 64u32;
    while size > 2 {
        let half = size / 2;
        let mask = (1u64 << half) - 1;
        if (v & mask) != ((v >> half) & mask) {
            break;
        }
        size = half;
    }
    if width == 32 && size > 32 {
        return false;
    }

    // The element must be a rotation of a contiguous run of ones.
    let mask = if size == 64 { u64::MAX } else { (1u64 << size) - 1 };
    let elem = v & mask;
    let ones = elem.count_ones();
    if ones == 0 || ones == size {
        return false;
    }
    let run = (1u64 << ones) - 1;
    (0..size).any(|r| {
        // Rotation within the element, not the full u64.
        let rot = if r == 0 {
            elem
        } else {
            ((elem >> r) | (elem << (size - r))) & mask
        };
        rot == run
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotated_imm8_boundaries() {
        assert!(rotated_imm8(0));
        assert!(rotated_imm8(0xff));
        assert!(rotated_imm8(0x3fc)); // 0xff << 2
        assert!(rotated_imm8(0xff00_0000));
        assert!(rotated_imm8(0xf000_000f)); // 0xff rotated across the top
        assert!(!rotated_imm8(0x101));
        assert!(!rotated_imm8(0x102));
        assert!(!rotated_imm8(0xff80));
        assert!(!rotated_imm8(0x1_0000_0000));
    }

    #[test]
    fn modified_imm_patterns() {
        assert!(modified_imm(0x0000_00ab));
        assert!(modified_imm(0x00ab_00ab));
        assert!(modified_imm(0xab00_ab00));
        assert!(modified_imm(0xabab_abab));
        assert!(modified_imm(0x8000_0000)); // 0x80 rotated right by 8? high-bit byte at top
        assert!(!modified_imm(0x0012_3400));
        assert!(!modified_imm(0x00ab_00ac));
    }

    #[test]
    fn logical_imm_patterns() {
        assert!(logical_imm(0x5555_5555_5555_5555, 64));
        assert!(logical_imm(0x0000_ffff_0000_ffff, 64));
        assert!(logical_imm(0x00ff_00ff, 32));
        assert!(logical_imm(0xff00_0000, 32));
        assert!(logical_imm(0x0000_0ff0, 32));
        assert!(!logical_imm(0, 64));
        assert!(!logical_imm(u64::MAX, 64));
        assert!(!logical_imm(0xffff_ffff, 32));
        assert!(!logical_imm(0x1234_5678, 32));
    }
}
