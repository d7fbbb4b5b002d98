//! Stereo source sample buffer for grains and its shared, swappable wrapper.

use std::sync::{Arc, RwLock, RwLockReadGuard, TryLockError};

use crate::{utils::unique_usize_id, Error};

// -------------------------------------------------------------------------------------------------

/// Immutable stereo sample buffer from which grains read.
///
/// Both channels have the same length, which is either zero (no sample loaded) or a power of two,
/// so that wrapping reads can be done with a simple bit mask. Loading, decoding and padding audio
/// files to such a length is up to the caller.
#[derive(Debug)]
pub struct SampleBuffer {
    id: usize,
    left: Box<[f32]>,
    right: Box<[f32]>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Create a new sample buffer from the given planar channels.
    ///
    /// Returns an error when channel lengths differ, or when they are not a power of two.
    pub fn new(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Self, Error> {
        if left.len() != right.len() {
            return Err(Error::SampleBufferError(format!(
                "channel lengths must match, but left has {} and right {} samples",
                left.len(),
                right.len()
            )));
        }
        if !left.is_empty() && !left.len().is_power_of_two() {
            return Err(Error::SampleBufferError(format!(
                "length must be a power of two, but is {}",
                left.len()
            )));
        }
        if sample_rate == 0 {
            return Err(Error::SampleBufferError(
                "sample rate must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: unique_usize_id(),
            left: left.into_boxed_slice(),
            right: right.into_boxed_slice(),
            sample_rate,
        })
    }

    /// Create a new sample buffer which uses the given mono samples for both channels.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, Error> {
        Self::new(samples.clone(), samples, sample_rate)
    }

    /// Create an empty sample buffer. Engines render silence with empty buffers.
    pub fn empty(sample_rate: u32) -> Self {
        Self {
            id: unique_usize_id(),
            left: Box::new([]),
            right: Box::new([]),
            sample_rate: sample_rate.max(1),
        }
    }

    /// Unique id of this buffer instance.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of sample frames in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.left.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Bit mask for wrapping read indices into the buffer.
    #[inline]
    pub fn mask(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// The buffer's native sample rate.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn left(&self) -> &[f32] {
        &self.left
    }

    #[inline]
    pub fn right(&self) -> &[f32] {
        &self.right
    }
}

// -------------------------------------------------------------------------------------------------

/// A [`SampleBuffer`] that can be replaced by a loader thread while an engine renders from it.
///
/// The engine only ever *tries* to acquire the read gate, once per rendered block, so a
/// concurrent swap never blocks the audio thread: it gets a silent block instead. The replaced
/// buffer is dropped in the thread that calls [`replace`](Self::replace).
#[derive(Debug, Clone)]
pub struct SharedSampleBuffer {
    buffer: Arc<RwLock<SampleBuffer>>,
}

impl SharedSampleBuffer {
    pub fn new(buffer: SampleBuffer) -> Self {
        let buffer = Arc::new(RwLock::new(buffer));
        Self { buffer }
    }

    /// Swap in a new sample buffer. Blocks until the engine finished its current block.
    pub fn replace(&self, buffer: SampleBuffer) -> Result<(), Error> {
        let mut current = self.buffer.write()?;
        log::info!(
            "Replacing sample buffer #{} ({} frames) with #{} ({} frames)",
            current.id(),
            current.len(),
            buffer.id(),
            buffer.len()
        );
        // old buffer gets dropped here, outside of the audio thread
        *current = buffer;
        Ok(())
    }

    /// Try acquiring the read gate without blocking. Returns `None` when a swap is in progress
    /// or the lock got poisoned.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, SampleBuffer>> {
        match self.buffer.try_read() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(_)) => None,
        }
    }
}

impl From<SampleBuffer> for SharedSampleBuffer {
    fn from(buffer: SampleBuffer) -> Self {
        Self::new(buffer)
    }
}

// -------------------------------------------------------------------------------------------------
