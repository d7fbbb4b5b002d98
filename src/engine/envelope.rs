//! Per-grain amplitude envelopes, synthesized with forward differences of a parabola.

// -------------------------------------------------------------------------------------------------

/// Shape of a [`GrainEnvelope`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopeShape {
    /// A single parabolic arch from zero over the peak back to zero.
    #[default]
    Plain,
    /// Instant attack: holds the peak for the first half, then decays parabolically to zero.
    /// Used for the first grain of a note only.
    Punchy,
}

// -------------------------------------------------------------------------------------------------

/// Amplitude envelope of a single grain.
///
/// The envelope is a quadratic polynomial which is evaluated incrementally: each sample emits
/// the current amplitude, then adds `slope` to the amplitude and `curve` to the slope. Segments
/// end at fixed sample boundaries, which the caller must report via
/// [`check_boundary`](Self::check_boundary), so no per-sample end checks are needed.
#[derive(Debug, Clone, Copy)]
pub struct GrainEnvelope {
    shape: EnvelopeShape,
    peak: f64,
    amplitude: f64,
    slope: f64,
    curve: f64,
    duration: usize,
    elapsed: usize,
    segment: usize,
    samples_to_boundary: usize,
    finished: bool,
}

impl Default for GrainEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl GrainEnvelope {
    /// Create a new, finished envelope.
    pub const fn new() -> Self {
        Self {
            shape: EnvelopeShape::Plain,
            peak: 0.0,
            amplitude: 0.0,
            slope: 0.0,
            curve: 0.0,
            duration: 0,
            elapsed: 0,
            segment: 0,
            samples_to_boundary: 0,
            finished: true,
        }
    }

    /// (Re)initialize the envelope with the given shape, peak gain and total duration in samples.
    pub fn init(&mut self, shape: EnvelopeShape, peak: f32, duration: usize) {
        match shape {
            EnvelopeShape::Plain => self.init_plain(peak, duration),
            EnvelopeShape::Punchy => self.init_punchy(peak, duration),
        }
    }

    /// Single parabolic arch which starts at zero, peaks at `peak` in the middle and returns to
    /// zero after `duration` samples: `f(t) = 4 * peak * t * (n - t) / n²`.
    ///
    /// A zero duration results in a finished envelope.
    pub fn init_plain(&mut self, peak: f32, duration: usize) {
        self.reset(EnvelopeShape::Plain, peak, duration);
        if duration < 1 {
            self.finish();
            return;
        }
        let n = duration as f64;
        self.amplitude = 0.0;
        self.slope = 4.0 * self.peak * (1.0 / n - 1.0 / (n * n));
        self.curve = -8.0 * self.peak / (n * n);
        self.samples_to_boundary = duration;
    }

    /// Two segments: the first `duration / 2` samples hold `peak`, the remaining samples decay
    /// parabolically to zero: `f(k) = peak * (1 - (k / H)²)`.
    ///
    /// Durations below two samples result in a finished envelope.
    pub fn init_punchy(&mut self, peak: f32, duration: usize) {
        self.reset(EnvelopeShape::Punchy, peak, duration);
        if duration < 2 {
            self.finish();
            return;
        }
        self.amplitude = self.peak;
        self.slope = 0.0;
        self.curve = 0.0;
        self.samples_to_boundary = duration / 2;
    }

    #[cfg(test)]
    pub fn shape(&self) -> EnvelopeShape {
        self.shape
    }

    /// Total duration in samples.
    #[cfg(test)]
    pub fn duration(&self) -> usize {
        self.duration
    }

    /// Number of samples synthesized so far.
    #[cfg(test)]
    pub fn elapsed(&self) -> usize {
        self.elapsed
    }

    /// Samples left until the envelope finishes.
    #[cfg(test)]
    pub fn remaining(&self) -> usize {
        if self.finished {
            0
        } else {
            self.duration - self.elapsed
        }
    }

    /// Index of the currently running segment.
    #[cfg(test)]
    pub fn segment(&self) -> usize {
        self.segment
    }

    /// Samples left until the current segment ends.
    #[inline]
    pub fn samples_to_boundary(&self) -> usize {
        self.samples_to_boundary
    }

    /// True when all segments have been played.
    #[inline]
    pub fn at_end(&self) -> bool {
        self.finished
    }

    /// Emit the current amplitude and advance by one sample.
    #[inline]
    pub fn synthesize(&mut self) -> f32 {
        let amplitude = self.amplitude as f32;
        self.amplitude += self.slope;
        self.slope += self.curve;
        self.elapsed += 1;
        amplitude
    }

    /// Report that `samples_advanced` samples got synthesized since the last call. Moves on to
    /// the next segment, or finishes the envelope, when the current segment's boundary is hit.
    #[inline]
    pub fn check_boundary(&mut self, samples_advanced: usize) {
        debug_assert!(
            samples_advanced <= self.samples_to_boundary,
            "Synthesized past a segment boundary"
        );
        self.samples_to_boundary = self.samples_to_boundary.saturating_sub(samples_advanced);
        if self.samples_to_boundary == 0 && !self.finished {
            self.advance_segment();
        }
    }

    fn advance_segment(&mut self) {
        match (self.shape, self.segment) {
            (EnvelopeShape::Punchy, 0) => {
                let h = (self.duration - self.duration / 2) as f64;
                self.segment = 1;
                self.amplitude = self.peak;
                self.slope = -self.peak / (h * h);
                self.curve = -2.0 * self.peak / (h * h);
                self.samples_to_boundary = self.duration - self.duration / 2;
            }
            _ => self.finish(),
        }
    }

    fn reset(&mut self, shape: EnvelopeShape, peak: f32, duration: usize) {
        self.shape = shape;
        self.peak = peak as f64;
        self.duration = duration;
        self.elapsed = 0;
        self.segment = 0;
        self.finished = false;
    }

    fn finish(&mut self) {
        self.finished = true;
        self.amplitude = 0.0;
        self.slope = 0.0;
        self.curve = 0.0;
        self.samples_to_boundary = 0;
    }
}

// -------------------------------------------------------------------------------------------------
