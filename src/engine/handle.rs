use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use super::parameters::GranularParameter;
use crate::{
    error::Error,
    sample::{SampleBuffer, SharedSampleBuffer},
};

// -------------------------------------------------------------------------------------------------

/// Control messages, applied by the engine at the start of the next processed block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineMessage {
    NoteOn { note: u8, velocity: f32 },
    NoteOff { note: u8 },
    AllNotesOff,
    SetParameter { parameter: GranularParameter, value: f32 },
}

/// Bounded single consumer message queue of an engine.
pub(crate) type EngineMessageQueue = Arc<ArrayQueue<EngineMessage>>;

// -------------------------------------------------------------------------------------------------

/// A cloneable handle to control a [`GranularEngine`](super::GranularEngine) which is running in
/// another thread, usually the audio thread.
///
/// Messages are sent via a bounded lock-free queue. When the queue is full, sending fails with an
/// [`Error::SendError`]: increase the engine's queue size or send fewer messages per block.
#[derive(Clone)]
pub struct GranularEngineHandle {
    message_queue: EngineMessageQueue,
    sample_buffer: SharedSampleBuffer,
}

impl GranularEngineHandle {
    pub(crate) fn new(message_queue: EngineMessageQueue, sample_buffer: SharedSampleBuffer) -> Self {
        Self {
            message_queue,
            sample_buffer,
        }
    }

    /// Start a new note with the given MIDI note number (0 - 127) and velocity (0.0 - 1.0).
    pub fn note_on(&self, note: u8, velocity: f32) -> Result<(), Error> {
        if note > 127 {
            return Err(Error::ParameterError(format!(
                "Note must be in range 0..=127, but is {note}"
            )));
        }
        if !(0.0..=1.0).contains(&velocity) {
            return Err(Error::ParameterError(format!(
                "Velocity must be in range 0.0..=1.0, but is {velocity}"
            )));
        }
        self.send(EngineMessage::NoteOn { note, velocity }, "note on")
    }

    /// Stop spawning new grains on all voices which play the given note.
    pub fn note_off(&self, note: u8) -> Result<(), Error> {
        self.send(EngineMessage::NoteOff { note }, "note off")
    }

    /// Stop spawning new grains on all voices.
    pub fn all_notes_off(&self) -> Result<(), Error> {
        self.send(EngineMessage::AllNotesOff, "all notes off")
    }

    /// Set a single engine parameter. Values get clamped into the parameter's range.
    pub fn set_parameter(&self, parameter: GranularParameter, value: f32) -> Result<(), Error> {
        if value.is_nan() {
            return Err(Error::ParameterError(format!(
                "'{parameter}' value must be a number"
            )));
        }
        self.send(
            EngineMessage::SetParameter { parameter, value },
            "set parameter",
        )
    }

    /// Replace the engine's sample buffer.
    ///
    /// Blocks until the engine finished its current block. The old buffer gets dropped in the
    /// calling thread. Grains which still play the old buffer get stopped by the engine.
    pub fn replace_sample_buffer(&self, buffer: SampleBuffer) -> Result<(), Error> {
        self.sample_buffer.replace(buffer)
    }

    fn send(&self, message: EngineMessage, name: &str) -> Result<(), Error> {
        self.message_queue
            .push(message)
            .map_err(|_| Error::SendError(format!("Engine message queue is full ({name})")))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(capacity: usize) -> (GranularEngineHandle, EngineMessageQueue) {
        let queue = Arc::new(ArrayQueue::new(capacity));
        let buffer = SharedSampleBuffer::new(SampleBuffer::empty(44100));
        (GranularEngineHandle::new(Arc::clone(&queue), buffer), queue)
    }

    #[test]
    fn pushes_messages() -> Result<(), Error> {
        let (handle, queue) = handle(4);
        handle.note_on(60, 0.5)?;
        handle.set_parameter(GranularParameter::Spray, 0.25)?;
        handle.note_off(60)?;
        handle.all_notes_off()?;
        assert_eq!(
            queue.pop(),
            Some(EngineMessage::NoteOn {
                note: 60,
                velocity: 0.5
            })
        );
        assert_eq!(
            queue.pop(),
            Some(EngineMessage::SetParameter {
                parameter: GranularParameter::Spray,
                value: 0.25
            })
        );
        assert_eq!(queue.pop(), Some(EngineMessage::NoteOff { note: 60 }));
        assert_eq!(queue.pop(), Some(EngineMessage::AllNotesOff));
        assert_eq!(queue.pop(), None);
        Ok(())
    }

    #[test]
    fn rejects_invalid_input() {
        let (handle, queue) = handle(4);
        assert!(matches!(
            handle.note_on(128, 1.0),
            Err(Error::ParameterError(_))
        ));
        assert!(matches!(
            handle.note_on(60, 1.5),
            Err(Error::ParameterError(_))
        ));
        assert!(matches!(
            handle.set_parameter(GranularParameter::Volume, f32::NAN),
            Err(Error::ParameterError(_))
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_fails() -> Result<(), Error> {
        let (handle, _queue) = handle(1);
        handle.note_on(60, 1.0)?;
        assert!(matches!(handle.note_off(60), Err(Error::SendError(_))));
        Ok(())
    }
}
