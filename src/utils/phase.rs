//! Q16.16 fixed-point phase accumulator for fractional sample position tracking.
//!
//! The upper 16 bits of the accumulator hold the integer sample offset, the lower 16 bits the
//! fractional position between two samples. Accumulating in fixed-point avoids the float drift
//! which builds up over long grains. Accumulator overflows carry into a separate frame offset,
//! so grains can read more than 65535 frames.

// -------------------------------------------------------------------------------------------------

/// Number of fractional bits in a [`FixedPointPhase`].
pub const PHASE_SHIFT: u32 = 16;
/// Fixed-point representation of one whole sample step.
pub const PHASE_ONE: u32 = 1 << PHASE_SHIFT;
/// Mask selecting the fractional bits of a [`FixedPointPhase`].
pub const PHASE_MASK: u32 = PHASE_ONE - 1;
/// Number of frames a full turn of the 32-bit accumulator spans.
pub const PHASE_CARRY_FRAMES: usize = 1 << (u32::BITS - PHASE_SHIFT);

// -------------------------------------------------------------------------------------------------

/// Unsigned Q16.16 fixed-point sample position with an overflow carry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FixedPointPhase {
    carry: usize,
    raw: u32,
}

impl FixedPointPhase {
    pub const ZERO: Self = Self { carry: 0, raw: 0 };

    /// Create a phase from its raw Q16.16 bits.
    pub const fn from_raw(raw: u32) -> Self {
        Self { carry: 0, raw }
    }

    /// Raw Q16.16 bits of the accumulator, without the carry.
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.raw
    }

    /// Integer sample offset.
    #[inline]
    pub const fn integer(&self) -> usize {
        self.carry + (self.raw >> PHASE_SHIFT) as usize
    }

    /// Fractional position between the integer sample and its successor, in `0.0..1.0`.
    #[inline]
    pub fn fraction(&self) -> f32 {
        const SCALE: f32 = 1.0 / PHASE_ONE as f32;
        (self.raw & PHASE_MASK) as f32 * SCALE
    }

    /// Move the phase forward by the given fixed-point increment.
    #[inline]
    pub fn advance(&mut self, increment: u32) {
        let (raw, overflowed) = self.raw.overflowing_add(increment);
        self.raw = raw;
        if overflowed {
            self.carry += PHASE_CARRY_FRAMES;
        }
    }

    /// Fixed-point increment which reads `read_length` source samples in `duration` steps:
    /// `round(read_length * 2^16 / duration)`.
    pub fn increment_for(read_length: f64, duration: usize) -> u32 {
        if duration == 0 || read_length <= 0.0 {
            return 0;
        }
        (read_length * PHASE_ONE as f64 / duration as f64)
            .round()
            .min(u32::MAX as f64) as u32
    }

    /// Integer sample offset reached after `steps` increments from zero.
    #[inline]
    pub fn integer_after_steps(increment: u32, steps: usize) -> usize {
        ((increment as u64 * steps as u64) >> PHASE_SHIFT) as usize
    }
}

// -------------------------------------------------------------------------------------------------

/// Linear interpolation between `a` and `b`.
#[inline]
pub fn lerp(a: f32, b: f32, fraction: f32) -> f32 {
    a + (b - a) * fraction
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_fraction() {
        let phase = FixedPointPhase::from_raw((3 << PHASE_SHIFT) | (PHASE_ONE / 4));
        assert_eq!(phase.integer(), 3);
        assert_eq!(phase.fraction(), 0.25);

        let mut phase = FixedPointPhase::ZERO;
        phase.advance(PHASE_ONE + PHASE_ONE / 2);
        phase.advance(PHASE_ONE + PHASE_ONE / 2);
        assert_eq!(phase.integer(), 3);
        assert_eq!(phase.fraction(), 0.0);
    }

    #[test]
    fn increments() {
        assert_eq!(FixedPointPhase::increment_for(4.0, 4), PHASE_ONE);
        assert_eq!(FixedPointPhase::increment_for(2.0, 4), PHASE_ONE / 2);
        // round(1 * 65536 / 3) = 21845.33 -> 21845
        assert_eq!(FixedPointPhase::increment_for(1.0, 3), 21845);
        assert_eq!(FixedPointPhase::increment_for(5.0, 0), 0);
        assert_eq!(FixedPointPhase::increment_for(-1.0, 10), 0);
    }

    #[test]
    fn accumulator_overflow_carries() {
        let mut phase = FixedPointPhase::from_raw(u32::MAX);
        phase.advance(1);
        assert_eq!(phase.integer(), PHASE_CARRY_FRAMES);
        assert_eq!(phase.fraction(), 0.0);

        // 1.5 turns of the accumulator in three steps
        let mut phase = FixedPointPhase::ZERO;
        for _ in 0..3 {
            phase.advance(1 << 31);
        }
        assert_eq!(phase.integer(), 98304);
        assert_eq!(phase.fraction(), 0.0);

        // long reads keep their exact increment
        let increment = FixedPointPhase::increment_for(88200.0, 44100);
        assert_eq!(increment, 2 * PHASE_ONE);
        assert_eq!(FixedPointPhase::integer_after_steps(increment, 44099), 88198);
    }

    #[test]
    fn interpolation() {
        assert_eq!(lerp(0.0, 1.0, 0.5), 0.5);
        assert_eq!(lerp(-1.0, 1.0, 0.25), -0.5);
        assert_eq!(lerp(2.0, 4.0, 0.0), 2.0);
    }
}
