//! The granular engine: voices, grain scheduling and the block renderer.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    error::Error,
    sample::{SampleBuffer, SharedSampleBuffer},
    utils::{
        buffer::{add_buffers, clear_buffer},
        pitch_ratio_from_note, pitch_ratio_from_semitones, reflect_into_range,
    },
};

// -------------------------------------------------------------------------------------------------

mod envelope;
mod grain;
mod handle;
mod parameters;
mod voice;

pub use handle::{EngineMessage, GranularEngineHandle};
pub use parameters::{GranularParameter, GranularParameters, SprayMode};

use envelope::EnvelopeShape;
use grain::GrainEssence;
use handle::EngineMessageQueue;
use voice::{GrainRef, SpawnKind, Voice};

// -------------------------------------------------------------------------------------------------

/// Setup options of a [`GranularEngine`]. Fixed for the lifetime of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Max number of simultaneously playing notes.
    pub max_voices: usize,
    /// Number of plain grain slots per voice. The punchy attack grain has its own slot.
    pub grains_per_voice: usize,
    /// Size of the internal scratch buffers. Larger blocks get rendered in multiple steps.
    pub max_block_size: usize,
    /// Capacity of the handle's message queue.
    pub message_queue_size: usize,
    /// Random seed. When `None`, the engine gets seeded from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            max_voices: 8,
            grains_per_voice: 32,
            max_block_size: 512,
            message_queue_size: 256,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = max_voices;
        self
    }

    pub fn with_grains_per_voice(mut self, grains_per_voice: usize) -> Self {
        self.grains_per_voice = grains_per_voice;
        self
    }

    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    pub fn with_message_queue_size(mut self, message_queue_size: usize) -> Self {
        self.message_queue_size = message_queue_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate all config values.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_rate == 0 {
            return Err(Error::ParameterError(
                "Sample rate must be > 0".to_string(),
            ));
        }
        if self.max_voices == 0 {
            return Err(Error::ParameterError(
                "Need at least one voice".to_string(),
            ));
        }
        if self.grains_per_voice == 0 {
            return Err(Error::ParameterError(
                "Need at least one grain per voice".to_string(),
            ));
        }
        if self.max_block_size == 0 {
            return Err(Error::ParameterError(
                "Max block size must be > 0".to_string(),
            ));
        }
        if self.message_queue_size == 0 {
            return Err(Error::ParameterError(
                "Message queue size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Parameters of all grain spawns within a single block, resolved once per block.
struct SpawnContext {
    grain_duration: usize,
    interval: i64,
    read_rate: f64,
    volume: f32,
    detune_range: f32,
    volume_jitter_floor: f32,
    pan_jitter_range: f32,
    gap_jitter_max: f64,
    size_jitter: f32,
    buffer_len: usize,
    last_index: f64,
    position: f64,
    scan_enabled: bool,
    scan_increment: f64,
    spray: f64,
    spray_mode: SprayMode,
}

impl SpawnContext {
    fn new(parameters: &GranularParameters, buffer: &SampleBuffer, sample_rate: u32) -> Self {
        let buffer_len = buffer.len();
        let last_index = buffer_len.saturating_sub(1) as f64;
        let sample_rate_ratio = buffer.sample_rate() as f64 / sample_rate as f64;
        Self {
            grain_duration: parameters.grain_size_samples(sample_rate),
            interval: parameters.grain_interval_samples(sample_rate),
            read_rate: pitch_ratio_from_semitones(parameters.pitch_offset as f64)
                * sample_rate_ratio,
            volume: parameters.volume,
            detune_range: parameters.detune_range,
            volume_jitter_floor: parameters.volume_jitter_floor,
            pan_jitter_range: parameters.pan_jitter_range,
            gap_jitter_max: parameters.gap_jitter_max_samples(sample_rate),
            size_jitter: parameters.size_jitter,
            buffer_len,
            last_index,
            position: parameters.position as f64 * last_index,
            scan_enabled: parameters.scan_enabled,
            scan_increment: last_index / (parameters.scan_time as f64 * sample_rate as f64),
            spray: parameters.spray as f64 * last_index,
            spray_mode: parameters.spray_mode,
        }
    }

    /// Draw a new random grain essence. Random values are always drawn in the same order, so
    /// a seeded engine produces the same grains regardless of the parameter values.
    fn draw_essence(&self, rng: &mut SmallRng, scan_position: f64) -> GrainEssence {
        let detune_cents = self.detune_range * (2.0 * rng.random::<f32>() - 1.0);
        let volume =
            self.volume_jitter_floor + (1.0 - self.volume_jitter_floor) * rng.random::<f32>();
        let panning = self.pan_jitter_range * (2.0 * rng.random::<f32>() - 1.0);
        let gap_jitter = (self.gap_jitter_max * rng.random::<f64>()) as usize;
        let size_scale = (1.0 + self.size_jitter * (2.0 * rng.random::<f32>() - 1.0)).max(0.0);
        let spray_random = rng.random::<f64>();

        let base_offset = if self.scan_enabled {
            scan_position
        } else {
            self.position
        };
        let start_offset = match self.spray_mode {
            SprayMode::OneSided => (base_offset + self.spray * spray_random).max(0.0),
            SprayMode::Reflect => reflect_into_range(
                base_offset + self.spray * (2.0 * spray_random - 1.0),
                self.last_index,
            ),
        };
        GrainEssence {
            detune_cents,
            volume,
            panning,
            gap_jitter,
            size_scale,
            start_offset: start_offset as usize,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A polyphonic real-time granular synthesizer.
///
/// Each playing note owns a voice, which periodically spawns short enveloped and pitch shifted
/// grains from a shared sample buffer. All grains get mixed into a stereo output.
///
/// The engine preallocates all of its voices, grains and scratch buffers on construction:
/// [`process`](Self::process) never allocates, locks or fails. Control it directly, or from
/// other threads via a [`GranularEngineHandle`].
pub struct GranularEngine {
    config: EngineConfig,
    parameters: GranularParameters,
    voices: Box<[Voice]>,
    note_counter: u64,
    rng: SmallRng,
    sample_buffer: SharedSampleBuffer,
    sample_buffer_id: Option<usize>,
    message_queue: EngineMessageQueue,
    active_grains: Vec<GrainRef>,
    scratch_left: Box<[f32]>,
    scratch_right: Box<[f32]>,
    dropped_spawns: u64,
}

impl GranularEngine {
    /// Create a new engine with the given config, playing grains from the given buffer.
    pub fn new(config: EngineConfig, sample_buffer: SharedSampleBuffer) -> Result<Self, Error> {
        config.validate()?;
        let voices = (0..config.max_voices)
            .map(|_| Voice::new(config.grains_per_voice))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let message_queue = Arc::new(ArrayQueue::new(config.message_queue_size));
        let active_grains = Vec::with_capacity(config.max_voices * (config.grains_per_voice + 1));
        let scratch_left = vec![0.0; config.max_block_size].into_boxed_slice();
        let scratch_right = vec![0.0; config.max_block_size].into_boxed_slice();
        log::info!(
            "Creating granular engine: {} voices with {} grains at {} Hz",
            config.max_voices,
            config.grains_per_voice,
            config.sample_rate
        );
        Ok(Self {
            config,
            parameters: GranularParameters::default(),
            voices,
            note_counter: 0,
            rng,
            sample_buffer,
            sample_buffer_id: None,
            message_queue,
            active_grains,
            scratch_left,
            scratch_right,
            dropped_spawns: 0,
        })
    }

    /// The engine's setup options.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a new handle to control this engine from other threads.
    pub fn handle(&self) -> GranularEngineHandle {
        GranularEngineHandle::new(
            Arc::clone(&self.message_queue),
            self.sample_buffer.clone(),
        )
    }

    /// Current parameter set.
    pub fn parameters(&self) -> &GranularParameters {
        &self.parameters
    }

    /// Set a single parameter. Values get clamped to the parameter's range, NaNs are rejected.
    pub fn set_parameter(&mut self, parameter: GranularParameter, value: f32) -> Result<(), Error> {
        self.parameters.set(parameter, value)
    }

    /// Replace all parameters at once.
    pub fn set_parameters(&mut self, parameters: GranularParameters) -> Result<(), Error> {
        parameters.validate()?;
        self.parameters = parameters;
        Ok(())
    }

    /// Start a new note. Steals the oldest voice when all voices are busy.
    pub fn note_on(&mut self, note: u8, velocity: f32) {
        let note = note.min(127);
        let velocity = velocity.clamp(0.0, 1.0);
        let voice_index = self.next_free_voice_index();
        self.note_counter += 1;
        let voice = &mut self.voices[voice_index];
        if voice.is_active() {
            log::debug!(
                "Stealing voice #{voice_index} (note {}) for note {note}",
                voice.note()
            );
        }
        voice.start(note, velocity, pitch_ratio_from_note(note), self.note_counter);
    }

    /// Stop spawning new grains on all voices which play the given note. Already playing grains
    /// keep on playing until they finished.
    pub fn note_off(&mut self, note: u8) {
        for voice in self.voices.iter_mut() {
            if voice.is_playing() && voice.note() == note {
                voice.release();
            }
        }
    }

    /// Stop spawning new grains on all voices.
    pub fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.release();
        }
    }

    /// Number of voices which are playing or still have grains running.
    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Number of currently playing grains.
    pub fn active_grain_count(&self) -> usize {
        self.voices.iter().map(|v| v.active_grain_count()).sum()
    }

    /// Number of grain spawns which got dropped, because the voice's grain pool was full.
    pub fn dropped_spawns(&self) -> u64 {
        self.dropped_spawns
    }

    /// True when no voice is playing and all grains finished.
    pub fn is_exhausted(&self) -> bool {
        self.voices.iter().all(|v| !v.is_active())
    }

    /// Apply all pending messages from the engine's handles.
    pub fn process_messages(&mut self) {
        while let Some(message) = self.message_queue.pop() {
            match message {
                EngineMessage::NoteOn { note, velocity } => self.note_on(note, velocity),
                EngineMessage::NoteOff { note } => self.note_off(note),
                EngineMessage::AllNotesOff => self.all_notes_off(),
                EngineMessage::SetParameter { parameter, value } => {
                    if let Err(err) = self.set_parameter(parameter, value) {
                        log::warn!("Failed to apply parameter '{parameter}': {err}");
                    }
                }
            }
        }
    }

    /// Render all grains and *add* them to the given stereo output buffers.
    ///
    /// Pending handle messages get applied first. When the sample buffer is empty or currently
    /// getting replaced, the block stays untouched.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len(), "Expecting equally sized channels");
        self.process_messages();

        let sample_buffer = self.sample_buffer.clone();
        let Some(buffer) = sample_buffer.try_read() else {
            return;
        };
        if buffer.is_empty() {
            return;
        }
        if self.sample_buffer_id != Some(buffer.id()) {
            if self.sample_buffer_id.is_some() {
                log::debug!("Sample buffer changed: stopping all playing grains");
                for voice in self.voices.iter_mut() {
                    voice.deactivate_grains();
                }
            }
            self.sample_buffer_id = Some(buffer.id());
        }

        let context = SpawnContext::new(&self.parameters, &buffer, self.config.sample_rate);
        let sample_count = left.len().min(right.len());
        let mut offset = 0;
        while offset < sample_count {
            self.spawn_due_grains(&context);

            // render up to the next spawn or envelope segment change
            let mut next_event = (sample_count - offset).min(self.scratch_left.len());
            for voice in self.voices.iter() {
                next_event = next_event.min(voice.samples_to_next_event());
            }
            let next_event = next_event.max(1);

            let scratch_left = &mut self.scratch_left[..next_event];
            let scratch_right = &mut self.scratch_right[..next_event];
            clear_buffer(scratch_left);
            clear_buffer(scratch_right);

            self.active_grains.clear();
            for (voice_index, voice) in self.voices.iter().enumerate() {
                voice.collect_active_grains(voice_index, &mut self.active_grains);
            }
            for grain_ref in self.active_grains.iter() {
                self.voices[grain_ref.voice]
                    .grain_mut(grain_ref.slot)
                    .render(scratch_left, scratch_right, &buffer);
            }

            add_buffers(&mut left[offset..offset + next_event], scratch_left);
            add_buffers(&mut right[offset..offset + next_event], scratch_right);

            for voice in self.voices.iter_mut() {
                voice.advance(next_event, context.scan_increment, context.last_index);
            }
            offset += next_event;
        }
    }

    fn spawn_due_grains(&mut self, context: &SpawnContext) {
        for voice in self.voices.iter_mut() {
            while voice.is_spawn_due() {
                if !Self::spawn_grain(voice, &mut self.rng, context) {
                    self.dropped_spawns += 1;
                }
            }
        }
    }

    /// Spawn the next grain of the given voice. Returns false when the voice's pool is full and
    /// the spawn got dropped.
    fn spawn_grain(voice: &mut Voice, rng: &mut SmallRng, context: &SpawnContext) -> bool {
        let kind = voice.next_spawn_kind();
        let essence = context.draw_essence(rng, voice.scan().position());
        let spawned = match voice.free_slot(kind) {
            Some(slot) => {
                let amplitude = voice.velocity() * essence.volume * context.volume;
                let read_rate = voice.pitch_ratio() * context.read_rate;
                let shape = match kind {
                    SpawnKind::Punchy => EnvelopeShape::Punchy,
                    SpawnKind::Plain => EnvelopeShape::Plain,
                };
                voice.grain_mut(slot).activate(
                    context.grain_duration,
                    read_rate,
                    amplitude,
                    &essence,
                    context.buffer_len,
                    shape,
                );
                true
            }
            None => false,
        };
        voice.spawned(kind, context.interval + essence.gap_jitter as i64);
        spawned
    }

    fn next_free_voice_index(&self) -> usize {
        // Try to find a completely free voice first
        if let Some(index) = self.voices.iter().position(|v| !v.is_active()) {
            return index;
        }
        // Else steal the oldest released voice, or the oldest playing one
        let oldest = |playing: bool| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_playing() == playing)
                .min_by_key(|(_, v)| v.age())
                .map(|(index, _)| index)
        };
        oldest(false).or_else(|| oldest(true)).unwrap_or(0)
    }
}

// -------------------------------------------------------------------------------------------------
