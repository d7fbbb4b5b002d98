use super::grain::Grain;

// -------------------------------------------------------------------------------------------------

/// Which kind of grain a voice spawns next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpawnKind {
    /// The first grain of a note, using the fast attack envelope.
    Punchy,
    /// All following grains.
    Plain,
}

// -------------------------------------------------------------------------------------------------

/// Address of a grain within a voice's pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GrainSlot {
    Punchy,
    Plain(usize),
}

/// Address of a grain within the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GrainRef {
    pub voice: usize,
    pub slot: GrainSlot,
}

// -------------------------------------------------------------------------------------------------

/// Triangle wave which sweeps the grain start position back and forth through the buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanOscillator {
    position: f64,
    direction: f64,
}

impl Default for ScanOscillator {
    fn default() -> Self {
        Self {
            position: 0.0,
            direction: 1.0,
        }
    }
}

impl ScanOscillator {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Current position in sample frames.
    #[inline]
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Move `frames * increment` frames in the current direction, bouncing between 0 and
    /// `last_index`.
    pub fn advance(&mut self, frames: usize, increment: f64, last_index: f64) {
        if last_index <= 0.0 {
            self.position = 0.0;
            return;
        }
        self.position += self.direction * increment * frames as f64;
        // large steps may bounce off both ends
        loop {
            if self.position > last_index {
                self.position = 2.0 * last_index - self.position;
                self.direction = -1.0;
            } else if self.position < 0.0 {
                self.position = -self.position;
                self.direction = 1.0;
            } else {
                break;
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A single note voice of the granular engine.
///
/// Owns a single slot pool for the punchy attack grain and a fixed size pool of plain grains,
/// plus the countdown until the next grain spawn. Voices are stomped in place when a new note
/// starts; nothing gets allocated after construction.
pub(crate) struct Voice {
    note: u8,
    velocity: f32,
    pitch_ratio: f64,
    age: u64,
    gate: bool,
    countdown: i64,
    punchy_scheduled: bool,
    punchy_grain: Grain,
    plain_grains: Box<[Grain]>,
    scan: ScanOscillator,
}

impl Voice {
    pub fn new(grain_pool_size: usize) -> Self {
        debug_assert!(grain_pool_size > 0, "Need at least one plain grain slot");
        Self {
            note: 0,
            velocity: 0.0,
            pitch_ratio: 1.0,
            age: 0,
            gate: false,
            countdown: 0,
            punchy_scheduled: false,
            punchy_grain: Grain::new(),
            plain_grains: vec![Grain::new(); grain_pool_size].into_boxed_slice(),
            scan: ScanOscillator::default(),
        }
    }

    /// The voice's note number.
    #[inline]
    pub fn note(&self) -> u8 {
        self.note
    }

    #[inline]
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// Playback speed ratio of the voice's note.
    #[inline]
    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }

    /// Note-on counter value at the time the voice got started. Lower is older.
    #[inline]
    pub fn age(&self) -> u64 {
        self.age
    }

    /// Is the voice's note held, so that it keeps spawning new grains?
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.gate
    }

    /// Is the voice either playing or still rendering grains?
    #[inline]
    pub fn is_active(&self) -> bool {
        self.gate || self.active_grain_count() > 0
    }

    #[cfg(test)]
    pub fn countdown(&self) -> i64 {
        self.countdown
    }

    #[inline]
    pub fn is_spawn_due(&self) -> bool {
        self.gate && self.countdown <= 0
    }

    #[inline]
    pub fn scan(&self) -> &ScanOscillator {
        &self.scan
    }

    /// Reset the voice and start a new note. The first grain spawns immediately.
    pub fn start(&mut self, note: u8, velocity: f32, pitch_ratio: f64, age: u64) {
        self.kill();
        self.note = note;
        self.velocity = velocity;
        self.pitch_ratio = pitch_ratio;
        self.age = age;
        self.gate = true;
    }

    /// Stop spawning new grains. Playing grains run until their envelopes finished.
    pub fn release(&mut self) {
        self.gate = false;
    }

    /// Stop spawning and silence all grains immediately.
    pub fn kill(&mut self) {
        self.gate = false;
        self.countdown = 0;
        self.punchy_scheduled = false;
        self.scan.reset();
        self.deactivate_grains();
    }

    /// Silence all grains, without changing the voice's playback state.
    pub fn deactivate_grains(&mut self) {
        self.punchy_grain.deactivate();
        for grain in self.plain_grains.iter_mut() {
            grain.deactivate();
        }
    }

    /// Kind of grain the next spawn should use.
    #[inline]
    pub fn next_spawn_kind(&self) -> SpawnKind {
        if self.punchy_scheduled {
            SpawnKind::Plain
        } else {
            SpawnKind::Punchy
        }
    }

    /// Find an inactive slot for a grain of the given kind.
    pub fn free_slot(&self, kind: SpawnKind) -> Option<GrainSlot> {
        match kind {
            SpawnKind::Punchy => (!self.punchy_grain.is_active()).then_some(GrainSlot::Punchy),
            SpawnKind::Plain => self
                .plain_grains
                .iter()
                .position(|grain| !grain.is_active())
                .map(GrainSlot::Plain),
        }
    }

    /// Mark that the spawn of the given kind happened (or got dropped).
    pub fn spawned(&mut self, kind: SpawnKind, next_spawn_delay: i64) {
        if kind == SpawnKind::Punchy {
            self.punchy_scheduled = true;
        }
        self.countdown += next_spawn_delay.max(1);
    }

    #[inline]
    pub fn grain_mut(&mut self, slot: GrainSlot) -> &mut Grain {
        match slot {
            GrainSlot::Punchy => &mut self.punchy_grain,
            GrainSlot::Plain(index) => &mut self.plain_grains[index],
        }
    }

    /// Number of currently active grains in both pools.
    pub fn active_grain_count(&self) -> usize {
        self.punchy_grain.is_active() as usize
            + self.plain_grains.iter().filter(|g| g.is_active()).count()
    }

    /// Number of currently active plain grains.
    #[cfg(test)]
    pub fn active_plain_grain_count(&self) -> usize {
        self.plain_grains.iter().filter(|g| g.is_active()).count()
    }

    /// Push references to all active grains of this voice into `grains`.
    pub fn collect_active_grains(&self, voice_index: usize, grains: &mut Vec<GrainRef>) {
        if self.punchy_grain.is_active() {
            grains.push(GrainRef {
                voice: voice_index,
                slot: GrainSlot::Punchy,
            });
        }
        for (index, grain) in self.plain_grains.iter().enumerate() {
            if grain.is_active() {
                grains.push(GrainRef {
                    voice: voice_index,
                    slot: GrainSlot::Plain(index),
                });
            }
        }
    }

    /// Samples until the next voice event: the next spawn or any grain's envelope boundary.
    /// Returns `usize::MAX` when there's nothing scheduled.
    pub fn samples_to_next_event(&self) -> usize {
        let mut next_event = if self.gate {
            self.countdown.max(0) as usize
        } else {
            usize::MAX
        };
        if self.punchy_grain.is_active() {
            next_event = next_event.min(self.punchy_grain.samples_to_boundary());
        }
        for grain in self.plain_grains.iter().filter(|g| g.is_active()) {
            next_event = next_event.min(grain.samples_to_boundary());
        }
        next_event
    }

    /// Move the voice's spawn countdown and scan oscillator forward by `frames`.
    pub fn advance(&mut self, frames: usize, scan_increment: f64, scan_last_index: f64) {
        if self.gate {
            self.countdown -= frames as i64;
            self.scan.advance(frames, scan_increment, scan_last_index);
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{envelope::EnvelopeShape, grain::GrainEssence};

    fn activate(voice: &mut Voice, slot: GrainSlot, duration: usize) {
        let essence = GrainEssence {
            volume: 1.0,
            size_scale: 1.0,
            ..GrainEssence::default()
        };
        voice
            .grain_mut(slot)
            .activate(duration, 1.0, 1.0, &essence, 1024, EnvelopeShape::Plain);
    }

    #[test]
    fn start_resets_state() {
        let mut voice = Voice::new(4);
        assert!(!voice.is_active());
        voice.start(64, 0.5, 2.0, 1);
        assert!(voice.is_playing());
        assert!(voice.is_spawn_due());
        assert_eq!(voice.next_spawn_kind(), SpawnKind::Punchy);

        activate(&mut voice, GrainSlot::Punchy, 100);
        voice.spawned(SpawnKind::Punchy, 10);
        assert_eq!(voice.next_spawn_kind(), SpawnKind::Plain);
        assert_eq!(voice.countdown(), 10);
        voice.advance(30, 1.0, 100.0);
        assert_eq!(voice.countdown(), -20);

        voice.start(65, 1.0, 1.0, 2);
        assert_eq!(voice.note(), 65);
        assert_eq!(voice.countdown(), 0);
        assert_eq!(voice.active_grain_count(), 0);
        assert_eq!(voice.next_spawn_kind(), SpawnKind::Punchy);
        assert_eq!(voice.scan().position(), 0.0);
    }

    #[test]
    fn slot_allocation() {
        let mut voice = Voice::new(2);
        voice.start(60, 1.0, 1.0, 1);
        assert_eq!(voice.free_slot(SpawnKind::Punchy), Some(GrainSlot::Punchy));
        activate(&mut voice, GrainSlot::Punchy, 100);
        assert_eq!(voice.free_slot(SpawnKind::Punchy), None);

        assert_eq!(voice.free_slot(SpawnKind::Plain), Some(GrainSlot::Plain(0)));
        activate(&mut voice, GrainSlot::Plain(0), 100);
        assert_eq!(voice.free_slot(SpawnKind::Plain), Some(GrainSlot::Plain(1)));
        activate(&mut voice, GrainSlot::Plain(1), 100);
        assert_eq!(voice.free_slot(SpawnKind::Plain), None);
        assert_eq!(voice.active_grain_count(), 3);
        assert_eq!(voice.active_plain_grain_count(), 2);

        let mut grains = Vec::new();
        voice.collect_active_grains(3, &mut grains);
        assert_eq!(grains.len(), 3);
        assert!(grains.iter().all(|g| g.voice == 3));
        assert_eq!(grains[0].slot, GrainSlot::Punchy);
    }

    #[test]
    fn release_keeps_tails() {
        let mut voice = Voice::new(1);
        voice.start(60, 1.0, 1.0, 1);
        activate(&mut voice, GrainSlot::Plain(0), 50);
        voice.release();
        assert!(!voice.is_playing());
        assert!(!voice.is_spawn_due());
        assert!(voice.is_active());
        assert_eq!(voice.samples_to_next_event(), 50);

        voice.kill();
        assert!(!voice.is_active());
        assert_eq!(voice.samples_to_next_event(), usize::MAX);
    }

    #[test]
    fn next_event() {
        let mut voice = Voice::new(2);
        voice.start(60, 1.0, 1.0, 1);
        assert_eq!(voice.samples_to_next_event(), 0);
        voice.spawned(SpawnKind::Punchy, 40);
        assert_eq!(voice.samples_to_next_event(), 40);
        activate(&mut voice, GrainSlot::Plain(1), 25);
        assert_eq!(voice.samples_to_next_event(), 25);
    }

    #[test]
    fn scan_bounces() {
        let mut scan = ScanOscillator::default();
        scan.advance(5, 1.0, 8.0);
        assert_eq!(scan.position(), 5.0);
        scan.advance(5, 1.0, 8.0);
        assert_eq!(scan.position(), 6.0);
        scan.advance(8, 1.0, 8.0);
        assert_eq!(scan.position(), 2.0);
        // bounce off both ends in one step
        scan.advance(20, 1.0, 8.0);
        assert_eq!(scan.position(), 6.0);
        scan.advance(1, 1.0, 0.0);
        assert_eq!(scan.position(), 0.0);
    }
}
