//! Reference fractional-position generator.
//!
//! The engine only consumes the [`PositionGenerator`] contract; production
//! embedders bring their own encoding. This generator treats position keys
//! as base-256 fraction digit strings in (0, 1) and inserts by midpoint,
//! which is enough to exercise every ordering path in tests.

use notesync_protocol::{PositionGenerator, PositionSuffix, UniquePosition};

/// Midpoint-over-byte-strings position generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct MidpointPositionGenerator;

impl MidpointPositionGenerator {
    /// Creates the generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PositionGenerator for MidpointPositionGenerator {
    fn initial(&self, suffix: &PositionSuffix) -> UniquePosition {
        UniquePosition::new(vec![0x80], *suffix)
    }

    fn before(&self, pos: &UniquePosition, suffix: &PositionSuffix) -> UniquePosition {
        UniquePosition::new(midpoint(&[], pos.key()), *suffix)
    }

    fn after(&self, pos: &UniquePosition, suffix: &PositionSuffix) -> UniquePosition {
        // Appending a digit to a canonical (no trailing zero) key yields a
        // strictly greater key; `after` is only ever asked for a key past
        // the last sibling.
        let mut key = pos.key().to_vec();
        key.push(0x80);
        UniquePosition::new(key, *suffix)
    }

    fn between(
        &self,
        before: &UniquePosition,
        after: &UniquePosition,
        suffix: &PositionSuffix,
    ) -> UniquePosition {
        UniquePosition::new(midpoint(before.key(), after.key()), *suffix)
    }
}

/// Exact midpoint of two base-256 fraction digit strings, `low < high`.
/// The result is canonical (no trailing zeros) and strictly between.
fn midpoint(low: &[u8], high: &[u8]) -> Vec<u8> {
    let n = low.len().max(high.len());
    let mut digits: Vec<u16> = (0..n)
        .map(|i| {
            u16::from(low.get(i).copied().unwrap_or(0))
                + u16::from(high.get(i).copied().unwrap_or(0))
        })
        .collect();

    // Normalize so every digit fits a byte; the overflow becomes the
    // integer part (at most 1, since both inputs are below 1.0).
    let mut integer = 0u16;
    for i in (0..n).rev() {
        if digits[i] > 0xff {
            digits[i] -= 0x100;
            if i == 0 {
                integer += 1;
            } else {
                digits[i - 1] += 1;
            }
        }
    }

    // Divide by two, most significant digit first.
    let mut remainder = integer;
    let mut out = Vec::with_capacity(n + 1);
    for digit in digits {
        let current = remainder * 0x100 + digit;
        out.push((current / 2) as u8);
        remainder = current % 2;
    }
    if remainder == 1 {
        out.push(0x80);
    }
    while out.last() == Some(&0) {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_model::Guid;

    fn suffix() -> PositionSuffix {
        PositionSuffix::from_guid(&Guid::random())
    }

    #[test]
    fn initial_is_valid() {
        let pos = MidpointPositionGenerator::new().initial(&suffix());
        assert!(pos.is_valid());
    }

    #[test]
    fn before_and_after_bracket() {
        let generator = MidpointPositionGenerator::new();
        let pos = generator.initial(&suffix());
        let earlier = generator.before(&pos, &suffix());
        let later = generator.after(&pos, &suffix());
        assert!(earlier < pos);
        assert!(pos < later);
    }

    #[test]
    fn between_stays_strictly_inside() {
        let generator = MidpointPositionGenerator::new();
        let a = generator.initial(&suffix());
        let b = generator.after(&a, &suffix());
        let mid = generator.between(&a, &b, &suffix());
        assert!(a < mid);
        assert!(mid < b);
    }

    #[test]
    fn repeated_halving_keeps_order() {
        let generator = MidpointPositionGenerator::new();
        let anchor = generator.initial(&suffix());
        let mut upper = generator.after(&anchor, &suffix());
        // Squeeze 64 inserts into the same gap.
        for _ in 0..64 {
            let mid = generator.between(&anchor, &upper, &suffix());
            assert!(anchor < mid);
            assert!(mid < upper);
            upper = mid;
        }
    }

    #[test]
    fn repeated_prepends_keep_order() {
        let generator = MidpointPositionGenerator::new();
        let mut first = generator.initial(&suffix());
        for _ in 0..64 {
            let earlier = generator.before(&first, &suffix());
            assert!(earlier < first);
            assert!(earlier.is_valid());
            first = earlier;
        }
    }

    #[test]
    fn midpoint_known_values() {
        assert_eq!(midpoint(&[0x40], &[0x80]), vec![0x60]);
        assert_eq!(midpoint(&[], &[0x80]), vec![0x40]);
        // Adjacent keys force an extra digit.
        assert_eq!(midpoint(&[0x80], &[0x81]), vec![0x80, 0x80]);
    }
}
