//! Bit-exact numeric conversions.
//!
//! The micro-VM's operand stack stores every value as a plain `i64` slot:
//! int/float occupy the low 32 bits (float as raw IEEE-754 bits), long/double
//! occupy all 64 bits (double as raw IEEE-754 bits). These helpers are the
//! single place that encodes those rules, so the VM translator, the
//! interpreter, and the JIT variant can't drift from each other.

/// Reinterpret an `f32`'s bits as a sign-extended `i64` stack slot.
///
/// NaN bit patterns are preserved exactly (no canonicalization).
pub fn f32_to_slot(x: f32) -> i64 {
    x.to_bits() as i32 as i64
}

/// Inverse of [`f32_to_slot`].
pub fn slot_to_f32(slot: i64) -> f32 {
    f32::from_bits(slot as i32 as u32)
}

/// Reinterpret an `f64`'s bits as an `i64` stack slot.
pub fn f64_to_slot(x: f64) -> i64 {
    x.to_bits() as i64
}

/// Inverse of [`f64_to_slot`].
pub fn slot_to_f64(slot: i64) -> f64 {
    f64::from_bits(slot as u64)
}

/// Sign-extend a narrow integer width up to `i64`, matching the bytecode's
/// widening-conversion semantics (I2L etc.).
pub fn sign_extend_32_to_64(x: i32) -> i64 {
    x as i64
}

/// Two's-complement narrowing truncation, matching L2I / D2I-family
/// conversions after the float/double portion has already been rounded.
pub fn truncate_64_to_32(x: i64) -> i32 {
    x as i32
}

/// Shift counts on the source ISA are implicitly masked to the operand
/// width, mirroring the host runtime's shift-count masking.
pub fn mask_shift_32(count: i32) -> u32 {
    (count as u32) & 0x1f
}

pub fn mask_shift_64(count: i64) -> u32 {
    (count as u64 & 0x3f) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_roundtrip_preserves_nan_bits() {
        let nan = f32::from_bits(0x7FC0_0001);
        let slot = f32_to_slot(nan);
        let back = slot_to_f32(slot);
        assert_eq!(back.to_bits(), nan.to_bits());
    }

    #[test]
    fn f64_roundtrip_preserves_non_nan() {
        for x in [0.0_f64, -0.0, 1.5, f64::MIN, f64::MAX, f64::EPSILON] {
            let slot = f64_to_slot(x);
            assert_eq!(slot_to_f64(slot).to_bits(), x.to_bits());
        }
    }

    #[test]
    fn truncation_is_two_complement() {
        assert_eq!(truncate_64_to_32(0x1_0000_0000), 0);
        assert_eq!(truncate_64_to_32(-1), -1);
    }

    #[test]
    fn shift_masking() {
        assert_eq!(mask_shift_32(33), 1);
        assert_eq!(mask_shift_64(65), 1);
    }
}
