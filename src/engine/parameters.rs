//! Numeric parameters of the granular engine.

use std::ops::RangeInclusive;

use strum::VariantNames;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Boundary handling of the grain start position spray.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
)]
#[repr(u8)]
pub enum SprayMode {
    /// Spray only moves grains forward in the buffer. Positions are clamped at the buffer start.
    #[default]
    OneSided,
    /// Spray moves grains in both directions. Positions get mirrored at the buffer bounds.
    Reflect,
}

impl SprayMode {
    fn from_index(index: usize) -> Self {
        match index {
            0 => Self::OneSided,
            _ => Self::Reflect,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Identifies a single settable engine parameter.
///
/// All parameters are set as plain `f32` values. Boolean parameters treat values >= 0.5 as
/// `true`, enum parameters use the variant's index.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
    strum::EnumIter,
)]
pub enum GranularParameter {
    /// Master volume multiplier.
    Volume,
    /// Global pitch offset in semitones.
    PitchOffset,
    /// Random grain detune range in cents (+/-).
    DetuneRange,
    /// Lowest random grain volume multiplier. 1.0 disables volume randomization.
    VolumeJitterFloor,
    /// Random grain panning range (+/-).
    PanJitterRange,
    /// Maximum random extra gap between two grain spawns in seconds.
    GapJitterMax,
    /// Grain duration in milliseconds.
    GrainSize,
    /// Time between two grain spawns of a voice in milliseconds.
    GrainInterval,
    /// Random grain size variation (+/-), relative to the grain size.
    SizeJitter,
    /// Base grain start position, relative to the sample buffer length.
    Position,
    /// When enabled, a triangle oscillator sweeps the grain start position through the buffer.
    ScanEnabled,
    /// Time the scan oscillator takes to sweep once through the buffer in seconds.
    ScanTime,
    /// Random grain start position offset, relative to the sample buffer length.
    Spray,
    /// Boundary handling of the spray: see [`SprayMode`].
    SprayMode,
}

impl GranularParameter {
    /// Valid value range.
    pub fn range(&self) -> RangeInclusive<f32> {
        match self {
            Self::Volume => 0.0..=4.0,
            Self::PitchOffset => -48.0..=48.0,
            Self::DetuneRange => 0.0..=100.0,
            Self::VolumeJitterFloor => 0.0..=1.0,
            Self::PanJitterRange => 0.0..=1.0,
            Self::GapJitterMax => 0.0..=1.0,
            Self::GrainSize => 1.0..=1000.0,
            Self::GrainInterval => 1.0..=1000.0,
            Self::SizeJitter => 0.0..=1.0,
            Self::Position => 0.0..=1.0,
            Self::ScanEnabled => 0.0..=1.0,
            Self::ScanTime => 0.1..=60.0,
            Self::Spray => 0.0..=1.0,
            Self::SprayMode => 0.0..=(SprayMode::VARIANTS.len() - 1) as f32,
        }
    }

    /// Default value.
    pub fn default_value(&self) -> f32 {
        match self {
            Self::Volume => 1.0,
            Self::PitchOffset => 0.0,
            Self::DetuneRange => 0.0,
            Self::VolumeJitterFloor => 1.0,
            Self::PanJitterRange => 0.0,
            Self::GapJitterMax => 0.0,
            Self::GrainSize => 100.0,
            Self::GrainInterval => 50.0,
            Self::SizeJitter => 0.0,
            Self::Position => 0.0,
            Self::ScanEnabled => 0.0,
            Self::ScanTime => 4.0,
            Self::Spray => 0.0,
            Self::SprayMode => SprayMode::OneSided as u8 as f32,
        }
    }

    /// Clamp the given value into the parameter's range.
    pub fn clamp_value(&self, value: f32) -> f32 {
        let range = self.range();
        value.clamp(*range.start(), *range.end())
    }
}

// -------------------------------------------------------------------------------------------------

/// Parameters controlling grain spawning and grain shapes of a granular engine.
#[derive(Clone, Debug, PartialEq)]
pub struct GranularParameters {
    /// Master volume multiplier (0.0 - 4.0).
    pub volume: f32,
    /// Global pitch offset in semitones (-48 - 48).
    pub pitch_offset: f32,
    /// Random grain detune range in cents (0 - 100).
    pub detune_range: f32,
    /// Lowest random grain volume (0.0 - 1.0). At 1.0, all grains play at full volume.
    pub volume_jitter_floor: f32,
    /// Random grain panning range (0.0 - 1.0).
    pub pan_jitter_range: f32,
    /// Maximum random extra gap between grain spawns in seconds (0.0 - 1.0).
    pub gap_jitter_max: f32,
    /// Grain duration in milliseconds (1.0 - 1000.0).
    pub grain_size: f32,
    /// Time between two grain spawns in milliseconds (1.0 - 1000.0).
    pub grain_interval: f32,
    /// Random grain size variation (0.0 - 1.0). At 1.0, grains vary between 0% and 200% size.
    pub size_jitter: f32,
    /// Base grain start position in the sample buffer (0.0 - 1.0).
    pub position: f32,
    /// Sweep grain start positions through the buffer instead of using `position`.
    pub scan_enabled: bool,
    /// Time for one sweep through the buffer in seconds (0.1 - 60.0).
    pub scan_time: f32,
    /// Random start position offset, relative to the buffer length (0.0 - 1.0).
    pub spray: f32,
    /// Spray boundary handling.
    pub spray_mode: SprayMode,
}

impl Default for GranularParameters {
    fn default() -> Self {
        use GranularParameter as P;
        Self {
            volume: P::Volume.default_value(),
            pitch_offset: P::PitchOffset.default_value(),
            detune_range: P::DetuneRange.default_value(),
            volume_jitter_floor: P::VolumeJitterFloor.default_value(),
            pan_jitter_range: P::PanJitterRange.default_value(),
            gap_jitter_max: P::GapJitterMax.default_value(),
            grain_size: P::GrainSize.default_value(),
            grain_interval: P::GrainInterval.default_value(),
            size_jitter: P::SizeJitter.default_value(),
            position: P::Position.default_value(),
            scan_enabled: P::ScanEnabled.default_value() >= 0.5,
            scan_time: P::ScanTime.default_value(),
            spray: P::Spray.default_value(),
            spray_mode: SprayMode::default(),
        }
    }
}

impl GranularParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate all parameters.
    pub fn validate(&self) -> Result<(), Error> {
        use strum::IntoEnumIterator;
        for parameter in GranularParameter::iter() {
            let value = self.get(parameter);
            if !parameter.range().contains(&value) {
                return Err(Error::ParameterError(format!(
                    "'{parameter}' must be in range {:?}, but is {value}",
                    parameter.range()
                )));
            }
        }
        Ok(())
    }

    /// Get the given parameter's current value as plain float.
    pub fn get(&self, parameter: GranularParameter) -> f32 {
        use GranularParameter as P;
        match parameter {
            P::Volume => self.volume,
            P::PitchOffset => self.pitch_offset,
            P::DetuneRange => self.detune_range,
            P::VolumeJitterFloor => self.volume_jitter_floor,
            P::PanJitterRange => self.pan_jitter_range,
            P::GapJitterMax => self.gap_jitter_max,
            P::GrainSize => self.grain_size,
            P::GrainInterval => self.grain_interval,
            P::SizeJitter => self.size_jitter,
            P::Position => self.position,
            P::ScanEnabled => self.scan_enabled as u8 as f32,
            P::ScanTime => self.scan_time,
            P::Spray => self.spray,
            P::SprayMode => self.spray_mode as u8 as f32,
        }
    }

    /// Set the given parameter. Values get clamped into the parameter's range, NaN values are
    /// rejected.
    pub fn set(&mut self, parameter: GranularParameter, value: f32) -> Result<(), Error> {
        use GranularParameter as P;
        if value.is_nan() {
            return Err(Error::ParameterError(format!(
                "'{parameter}' value must be a number"
            )));
        }
        let value = parameter.clamp_value(value);
        match parameter {
            P::Volume => self.volume = value,
            P::PitchOffset => self.pitch_offset = value,
            P::DetuneRange => self.detune_range = value,
            P::VolumeJitterFloor => self.volume_jitter_floor = value,
            P::PanJitterRange => self.pan_jitter_range = value,
            P::GapJitterMax => self.gap_jitter_max = value,
            P::GrainSize => self.grain_size = value,
            P::GrainInterval => self.grain_interval = value,
            P::SizeJitter => self.size_jitter = value,
            P::Position => self.position = value,
            P::ScanEnabled => self.scan_enabled = value >= 0.5,
            P::ScanTime => self.scan_time = value,
            P::Spray => self.spray = value,
            P::SprayMode => self.spray_mode = SprayMode::from_index(value.round() as usize),
        }
        Ok(())
    }

    /// Grain duration in samples at the given sample rate.
    pub fn grain_size_samples(&self, sample_rate: u32) -> usize {
        (self.grain_size as f64 * sample_rate as f64 / 1000.0).round() as usize
    }

    /// Time between grain spawns in samples at the given sample rate. Never less than one.
    pub fn grain_interval_samples(&self, sample_rate: u32) -> i64 {
        ((self.grain_interval as f64 * sample_rate as f64 / 1000.0).round() as i64).max(1)
    }

    /// Maximum random extra gap between grain spawns in samples.
    pub fn gap_jitter_max_samples(&self, sample_rate: u32) -> f64 {
        self.gap_jitter_max as f64 * sample_rate as f64
    }
}

// -------------------------------------------------------------------------------------------------
