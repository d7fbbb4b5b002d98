//! Pitch and id helpers, buffer and fixed-point phase utilities.

pub mod buffer;
pub mod phase;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    LazyLock,
};

// -------------------------------------------------------------------------------------------------

/// Generates a unique usize number, by simply counting atomically upwards from 1.
pub fn unique_usize_id() -> usize {
    static ID_COUNTER: AtomicUsize = AtomicUsize::new(1);
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

// -------------------------------------------------------------------------------------------------

/// Middle C. Notes at this key play the sample buffer at its original pitch.
pub const ROOT_NOTE: u8 = 60;

/// Precomputed playback speed ratios for all 128 MIDI notes, relative to [`ROOT_NOTE`].
pub static NOTE_PITCH_TABLE: LazyLock<[f64; 128]> = LazyLock::new(|| {
    let mut table = [1.0; 128];
    for (note, ratio) in table.iter_mut().enumerate() {
        *ratio = pitch_ratio_from_semitones(note as f64 - ROOT_NOTE as f64);
    }
    table
});

/// Playback speed ratio for the given MIDI note. Notes above 127 are clamped.
#[inline]
pub fn pitch_ratio_from_note(note: u8) -> f64 {
    NOTE_PITCH_TABLE[note.min(127) as usize]
}

/// Playback speed ratio for a relative pitch offset in semitones.
#[inline]
pub fn pitch_ratio_from_semitones(semitones: f64) -> f64 {
    (semitones / 12.0).exp2()
}

/// Playback speed ratio for a relative pitch offset in cents.
#[inline]
pub fn pitch_ratio_from_cents(cents: f64) -> f64 {
    (cents / 1200.0).exp2()
}

// -------------------------------------------------------------------------------------------------

/// Mirror `value` back into the range `0.0..=max`, bouncing off both bounds.
pub fn reflect_into_range(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    let period = 2.0 * max;
    let value = value.rem_euclid(period);
    if value > max {
        period - value
    } else {
        value
    }
}

// -------------------------------------------------------------------------------------------------
