//! A single grain: an enveloped, pitch-shifted read window into the sample buffer.

use assume::assume;

use super::envelope::{EnvelopeShape, GrainEnvelope};
use crate::{
    sample::SampleBuffer,
    utils::{
        phase::{lerp, FixedPointPhase},
        pitch_ratio_from_cents,
    },
};

// -------------------------------------------------------------------------------------------------

/// Randomized per-grain parameters, drawn once when a grain gets spawned.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct GrainEssence {
    /// Fine pitch detune in cents.
    pub detune_cents: f32,
    /// Volume multiplier.
    pub volume: f32,
    /// Stereo panning in range -1.0..=1.0.
    pub panning: f32,
    /// Additional delay in samples until the next grain of the voice gets spawned.
    pub gap_jitter: usize,
    /// Duration and read length multiplier.
    pub size_scale: f32,
    /// First sample frame the grain reads from.
    pub start_offset: usize,
}

// -------------------------------------------------------------------------------------------------

/// How a grain accesses the sample buffer. Decided once on activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GrainReadMode {
    /// The whole read window, including the interpolation neighbour of the last frame, lies
    /// within the buffer: read with direct indices.
    Contiguous,
    /// The read window crosses the buffer end: wrap all indices with the buffer's bit mask.
    Wrapped,
}

// -------------------------------------------------------------------------------------------------

/// A single grain in a voice's grain pool.
///
/// Grains are activated in place in a free pool slot and become inactive as soon as their
/// envelope finished, after which the slot can be reused right away.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Grain {
    active: bool,
    envelope: GrainEnvelope,
    phase: FixedPointPhase,
    increment: u32,
    start: usize,
    read_mode: GrainReadMode,
    left_gain: f32,
    right_gain: f32,
}

impl Default for Grain {
    fn default() -> Self {
        Self::new()
    }
}

impl Grain {
    /// Create a new inactive grain.
    pub const fn new() -> Self {
        Self {
            active: false,
            envelope: GrainEnvelope::new(),
            phase: FixedPointPhase::ZERO,
            increment: 0,
            start: 0,
            read_mode: GrainReadMode::Wrapped,
            left_gain: 0.5,
            right_gain: 0.5,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[cfg(test)]
    pub fn envelope(&self) -> &GrainEnvelope {
        &self.envelope
    }

    #[cfg(test)]
    pub fn read_mode(&self) -> GrainReadMode {
        self.read_mode
    }

    /// Fixed-point read increment per output sample.
    #[cfg(test)]
    pub fn increment(&self) -> u32 {
        self.increment
    }

    /// Samples until the grain's envelope reaches its next segment boundary.
    #[inline]
    pub fn samples_to_boundary(&self) -> usize {
        self.envelope.samples_to_boundary()
    }

    /// Activate this grain.
    ///
    /// `duration` is the nominal grain length in output samples and `read_rate` the number of
    /// source frames to read per output sample. Both duration and read length get scaled by the
    /// essence's size scale; the read length additionally by the essence's detune.
    ///
    /// Grains whose scaled duration is too short for their envelope stay inactive.
    pub fn activate(
        &mut self,
        duration: usize,
        read_rate: f64,
        amplitude: f32,
        essence: &GrainEssence,
        buffer_len: usize,
        shape: EnvelopeShape,
    ) {
        debug_assert!(
            buffer_len == 0 || buffer_len.is_power_of_two(),
            "Expecting a pow2 sample buffer length"
        );
        let size_scale = essence.size_scale.max(0.0) as f64;
        let scaled_duration = (duration as f64 * size_scale).round() as usize;
        let read_length = duration as f64
            * read_rate.max(0.0)
            * size_scale
            * pitch_ratio_from_cents(essence.detune_cents as f64);

        self.left_gain = 0.5 * (1.0 - essence.panning);
        self.right_gain = 0.5 * (1.0 + essence.panning);
        self.phase = FixedPointPhase::ZERO;
        self.envelope.init(shape, amplitude, scaled_duration);
        if buffer_len == 0 || self.envelope.at_end() {
            self.active = false;
            return;
        }
        self.increment = FixedPointPhase::increment_for(read_length, scaled_duration);
        self.start = essence.start_offset & (buffer_len - 1);

        // highest frame touched: integer part of the last phase plus its interpolation neighbour
        let last_index = self.start
            + FixedPointPhase::integer_after_steps(self.increment, scaled_duration - 1)
            + 1;
        self.read_mode = if last_index < buffer_len {
            GrainReadMode::Contiguous
        } else {
            GrainReadMode::Wrapped
        };
        self.active = true;
    }

    /// Deactivate this grain immediately.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Render up to `left.len()` samples and *add* them to the given output buffers.
    ///
    /// Returns the number of samples the grain advanced, which is less than requested when its
    /// envelope finished within the call. Inactive grains render nothing and return 0.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32], source: &SampleBuffer) -> usize {
        if !self.active {
            return 0;
        }
        debug_assert_eq!(left.len(), right.len(), "Expecting equally sized channels");
        let sample_count = left.len().min(right.len());

        let mut processed = 0;
        while processed < sample_count && !self.envelope.at_end() {
            let chunk = (sample_count - processed).min(self.envelope.samples_to_boundary());
            let range = processed..processed + chunk;
            match self.read_mode {
                GrainReadMode::Contiguous => {
                    self.render_contiguous(&mut left[range.clone()], &mut right[range], source)
                }
                GrainReadMode::Wrapped => {
                    self.render_wrapped(&mut left[range.clone()], &mut right[range], source)
                }
            }
            self.envelope.check_boundary(chunk);
            processed += chunk;
        }
        if self.envelope.at_end() {
            self.active = false;
        }
        processed
    }

    fn render_contiguous(&mut self, left: &mut [f32], right: &mut [f32], source: &SampleBuffer) {
        let (source_left, source_right) = (source.left(), source.right());
        let len = source_left.len();
        for (out_left, out_right) in left.iter_mut().zip(right.iter_mut()) {
            let amplitude = self.envelope.synthesize();
            let index = self.start + self.phase.integer();
            let fraction = self.phase.fraction();

            assume!(unsafe: index + 1 < len, "Contiguous read window is checked on activation");
            let l = lerp(source_left[index], source_left[index + 1], fraction);
            assume!(unsafe: index + 1 < source_right.len());
            let r = lerp(source_right[index], source_right[index + 1], fraction);

            *out_left += l * amplitude * self.left_gain;
            *out_right += r * amplitude * self.right_gain;
            self.phase.advance(self.increment);
        }
    }

    fn render_wrapped(&mut self, left: &mut [f32], right: &mut [f32], source: &SampleBuffer) {
        let (source_left, source_right) = (source.left(), source.right());
        let mask = source.mask();
        for (out_left, out_right) in left.iter_mut().zip(right.iter_mut()) {
            let amplitude = self.envelope.synthesize();
            let index = (self.start + self.phase.integer()) & mask;
            let next_index = (index + 1) & mask;
            let fraction = self.phase.fraction();

            let l = lerp(source_left[index], source_left[next_index], fraction);
            let r = lerp(source_right[index], source_right[next_index], fraction);

            *out_left += l * amplitude * self.left_gain;
            *out_right += r * amplitude * self.right_gain;
            self.phase.advance(self.increment);
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{utils::phase::PHASE_ONE, Error};

    fn essence(start_offset: usize) -> GrainEssence {
        GrainEssence {
            volume: 1.0,
            size_scale: 1.0,
            start_offset,
            ..GrainEssence::default()
        }
    }

    #[test]
    fn renders_enveloped_source() -> Result<(), Error> {
        let source = SampleBuffer::from_mono(vec![1.0; 4], 44100)?;
        let mut grain = Grain::new();
        grain.activate(4, 1.0, 1.0, &essence(0), source.len(), EnvelopeShape::Plain);
        assert!(grain.is_active());
        assert_eq!(grain.increment(), PHASE_ONE);

        let mut left = vec![0.0; 4];
        let mut right = vec![0.0; 4];
        assert_eq!(grain.render(&mut left, &mut right, &source), 4);
        // center panned: half the envelope on each channel
        assert_eq!(left, vec![0.0, 0.375, 0.5, 0.375]);
        assert_eq!(right, left);
        assert!(!grain.is_active());
        Ok(())
    }

    #[test]
    fn read_mode_decision() -> Result<(), Error> {
        let source = SampleBuffer::from_mono(vec![0.0; 16], 44100)?;
        let mut grain = Grain::new();

        // reads frames 0..=8 (8 steps of one frame plus the interpolation neighbour)
        grain.activate(8, 1.0, 1.0, &essence(0), source.len(), EnvelopeShape::Plain);
        assert_eq!(grain.read_mode(), GrainReadMode::Contiguous);

        // last index 7 + 7 + 1 = 15 still fits
        grain.activate(8, 1.0, 1.0, &essence(7), source.len(), EnvelopeShape::Plain);
        assert_eq!(grain.read_mode(), GrainReadMode::Contiguous);

        // 8 + 7 + 1 = 16 does not
        grain.activate(8, 1.0, 1.0, &essence(8), source.len(), EnvelopeShape::Plain);
        assert_eq!(grain.read_mode(), GrainReadMode::Wrapped);

        // doubled pitch reads twice as far
        grain.activate(8, 2.0, 1.0, &essence(0), source.len(), EnvelopeShape::Plain);
        assert_eq!(grain.read_mode(), GrainReadMode::Contiguous);
        grain.activate(8, 2.0, 1.0, &essence(2), source.len(), EnvelopeShape::Plain);
        assert_eq!(grain.read_mode(), GrainReadMode::Wrapped);

        // start offsets are masked into the buffer
        grain.activate(2, 1.0, 1.0, &essence(16 + 3), source.len(), EnvelopeShape::Plain);
        assert_eq!(grain.read_mode(), GrainReadMode::Contiguous);
        assert_eq!(grain.start, 3);
        Ok(())
    }

    #[test]
    fn wrapped_reads_stay_in_buffer() -> Result<(), Error> {
        let ramp = vec![0.0, 1.0, 2.0, 3.0];
        let source = SampleBuffer::new(ramp.clone(), ramp, 44100)?;
        let mut grain = Grain::new();
        // punchy: constant envelope for the first two samples
        grain.activate(4, 1.0, 1.0, &essence(3), source.len(), EnvelopeShape::Punchy);
        assert_eq!(grain.read_mode(), GrainReadMode::Wrapped);

        let mut left = vec![0.0; 2];
        let mut right = vec![0.0; 2];
        assert_eq!(grain.render(&mut left, &mut right, &source), 2);
        // frame 3, then wrapped frame 0
        assert_eq!(left, vec![1.5, 0.0]);

        // long, fast grains on a tiny buffer keep wrapping without panicking
        let mut grain = Grain::new();
        grain.activate(64, 3.7, 1.0, &essence(1), source.len(), EnvelopeShape::Plain);
        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        assert_eq!(grain.render(&mut left, &mut right, &source), 64);
        assert!(left.iter().all(|v| v.is_finite() && *v >= 0.0));
        Ok(())
    }

    #[test]
    fn interpolates_fractional_positions() -> Result<(), Error> {
        let ramp = (0..16).map(|v| v as f32).collect::<Vec<_>>();
        let source = SampleBuffer::new(ramp.clone(), ramp, 44100)?;
        let mut grain = Grain::new();
        // half speed, punchy for a flat envelope in the first half
        grain.activate(8, 0.5, 1.0, &essence(4), source.len(), EnvelopeShape::Punchy);
        assert_eq!(grain.increment(), PHASE_ONE / 2);
        let mut left = vec![0.0; 4];
        let mut right = vec![0.0; 4];
        grain.render(&mut left, &mut right, &source);
        assert_eq!(left, vec![2.0, 2.25, 2.5, 2.75]);
        Ok(())
    }

    #[test]
    fn panning_gains() -> Result<(), Error> {
        let source = SampleBuffer::from_mono(vec![1.0; 8], 44100)?;
        let mut grain = Grain::new();
        let essence = GrainEssence {
            panning: -1.0,
            ..essence(0)
        };
        grain.activate(4, 1.0, 1.0, &essence, source.len(), EnvelopeShape::Punchy);
        let mut left = vec![0.0; 4];
        let mut right = vec![0.0; 4];
        grain.render(&mut left, &mut right, &source);
        assert_eq!(left[0], 1.0);
        assert!(right.iter().all(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn stops_when_envelope_finished() -> Result<(), Error> {
        let source = SampleBuffer::from_mono(vec![1.0; 64], 44100)?;
        let mut grain = Grain::new();
        grain.activate(10, 1.0, 1.0, &essence(0), source.len(), EnvelopeShape::Punchy);

        let mut left = vec![0.0; 32];
        let mut right = vec![0.0; 32];
        assert_eq!(grain.render(&mut left[..3], &mut right[..3], &source), 3);
        assert_eq!(grain.render(&mut left[3..], &mut right[3..], &source), 7);
        assert!(!grain.is_active());
        assert!(left[10..].iter().all(|v| *v == 0.0));

        // rendering an inactive grain is a no-op
        assert_eq!(grain.render(&mut left, &mut right, &source), 0);
        Ok(())
    }

    #[test]
    fn degenerate_activations_stay_inactive() -> Result<(), Error> {
        let source = SampleBuffer::from_mono(vec![1.0; 8], 44100)?;
        let mut grain = Grain::new();

        let shrunk = GrainEssence {
            size_scale: 0.0,
            ..essence(0)
        };
        grain.activate(100, 1.0, 1.0, &shrunk, source.len(), EnvelopeShape::Plain);
        assert!(!grain.is_active());

        grain.activate(1, 1.0, 1.0, &essence(0), source.len(), EnvelopeShape::Punchy);
        assert!(!grain.is_active());

        grain.activate(100, 1.0, 1.0, &essence(0), 0, EnvelopeShape::Plain);
        assert!(!grain.is_active());
        Ok(())
    }

    #[test]
    fn size_scale_and_detune() -> Result<(), Error> {
        let source = SampleBuffer::from_mono(vec![0.0; 1024], 44100)?;
        let mut grain = Grain::new();
        let essence = GrainEssence {
            size_scale: 2.0,
            detune_cents: 1200.0,
            ..essence(0)
        };
        grain.activate(100, 1.0, 1.0, &essence, source.len(), EnvelopeShape::Plain);
        assert_eq!(grain.envelope().duration(), 200);
        // read length 100 * 2 * 2 over 200 samples
        assert_eq!(grain.increment(), 2 * PHASE_ONE);
        Ok(())
    }

    #[test]
    fn long_reads_keep_their_pitch() -> Result<(), Error> {
        // one second at 44.1 kHz, an octave up: reads 88200 frames
        let mut grain = Grain::new();
        grain.activate(44100, 2.0, 1.0, &essence(0), 1 << 17, EnvelopeShape::Plain);
        assert_eq!(grain.increment(), 2 * PHASE_ONE);
        assert_eq!(grain.read_mode(), GrainReadMode::Contiguous);
        grain.activate(44100, 2.0, 1.0, &essence(0), 1 << 16, EnvelopeShape::Plain);
        assert_eq!(grain.read_mode(), GrainReadMode::Wrapped);

        // two octaves up with a flat first half: frame k * 4 is played at sample k, also past
        // the first accumulator overflow at frame 65536
        let ramp = (0..1 << 18).map(|v| v as f32).collect::<Vec<_>>();
        let source = SampleBuffer::new(ramp.clone(), ramp, 44100)?;
        let mut grain = Grain::new();
        grain.activate(44100, 4.0, 1.0, &essence(0), source.len(), EnvelopeShape::Punchy);
        assert_eq!(grain.increment(), 4 * PHASE_ONE);
        assert_eq!(grain.read_mode(), GrainReadMode::Contiguous);
        let mut left = vec![0.0; 44100];
        let mut right = vec![0.0; 44100];
        assert_eq!(grain.render(&mut left, &mut right, &source), 44100);
        assert_eq!(left[1000], 2000.0);
        assert_eq!(left[20000], 40000.0);
        assert_eq!(left[22049], 44098.0);

        // the same read wrapped into a smaller buffer stays in bounds
        let ramp = (0..1 << 16).map(|v| v as f32).collect::<Vec<_>>();
        let source = SampleBuffer::new(ramp.clone(), ramp, 44100)?;
        let mut grain = Grain::new();
        grain.activate(44100, 4.0, 1.0, &essence(0), source.len(), EnvelopeShape::Punchy);
        assert_eq!(grain.read_mode(), GrainReadMode::Wrapped);
        let mut left = vec![0.0; 44100];
        let mut right = vec![0.0; 44100];
        assert_eq!(grain.render(&mut left, &mut right, &source), 44100);
        // frame 80000 wraps to 14464
        assert_eq!(left[20000], 7232.0);
        Ok(())
    }

    #[test]
    fn rendering_is_additive() -> Result<(), Error> {
        let left_source = (0..256).map(|v| (v as f32 * 0.1).sin()).collect::<Vec<_>>();
        let right_source = (0..256).map(|v| (v as f32 * 0.07).cos()).collect::<Vec<_>>();
        let source = SampleBuffer::new(left_source, right_source, 44100)?;

        let setups = [
            (64, 1.0, 0.8, 10, -0.5, EnvelopeShape::Plain),
            (48, 1.5, 0.3, 200, 0.25, EnvelopeShape::Punchy),
            (100, 0.75, 1.0, 77, 1.0, EnvelopeShape::Plain),
        ];
        let make_grains = || {
            setups.map(|(duration, rate, amplitude, offset, panning, shape)| {
                let mut grain = Grain::new();
                let essence = GrainEssence {
                    panning,
                    ..essence(offset)
                };
                grain.activate(duration, rate, amplitude, &essence, source.len(), shape);
                grain
            })
        };

        let mut mixed_left = vec![0.0; 128];
        let mut mixed_right = vec![0.0; 128];
        for mut grain in make_grains() {
            grain.render(&mut mixed_left, &mut mixed_right, &source);
        }

        let mut summed_left = vec![0.0; 128];
        let mut summed_right = vec![0.0; 128];
        for mut grain in make_grains() {
            let mut left = vec![0.0; 128];
            let mut right = vec![0.0; 128];
            grain.render(&mut left, &mut right, &source);
            for i in 0..128 {
                summed_left[i] += left[i];
                summed_right[i] += right[i];
            }
        }

        for i in 0..128 {
            assert!((mixed_left[i] - summed_left[i]).abs() < 1e-6);
            assert!((mixed_right[i] - summed_right[i]).abs() < 1e-6);
        }
        Ok(())
    }
}
