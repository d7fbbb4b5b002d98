//! Renders a short note sequence with the granular engine into a wav file.

use std::{f32::consts::TAU, io, path::Path};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use granular::{
    EngineConfig, Error, GranularEngine, GranularParameter, GranularParameters, SampleBuffer,
    SharedSampleBuffer, SprayMode,
};

// -------------------------------------------------------------------------------------------------

// Common demo code
#[path = "./common/arguments.rs"]
mod arguments;

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

const SAMPLE_RATE: u32 = 44100;
const BLOCK_SIZE: usize = 256;
const DEFAULT_OUTPUT_PATH: &str = "render-grains.wav";

/// Note sequence: (start time in seconds, duration in seconds, note, velocity)
const NOTES: [(f32, f32, u8, f32); 5] = [
    (0.0, 1.5, 48, 1.0),
    (0.5, 1.5, 55, 0.8),
    (1.0, 2.0, 60, 0.7),
    (2.0, 1.0, 64, 0.9),
    (2.5, 1.5, 67, 0.6),
];

/// Total render length in seconds, including release tails.
const RENDER_DURATION: f32 = 5.0;

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    // Parse optional arguments
    let args = arguments::parse();

    // Load or synthesize the grain source
    let sample_buffer = match &args.input_path {
        Some(path) => load_sample_buffer(path)?,
        None => synthesize_sample_buffer()?,
    };

    // Create the engine
    let mut config = EngineConfig::default().with_sample_rate(SAMPLE_RATE);
    config.seed = args.seed;
    let mut engine = GranularEngine::new(config, SharedSampleBuffer::new(sample_buffer))?;
    engine.set_parameters(GranularParameters {
        grain_size: 120.0,
        grain_interval: 25.0,
        detune_range: 8.0,
        volume_jitter_floor: 0.6,
        pan_jitter_range: 0.5,
        gap_jitter_max: 0.01,
        size_jitter: 0.3,
        scan_enabled: true,
        scan_time: 6.0,
        spray: 0.05,
        spray_mode: SprayMode::Reflect,
        volume: 0.5,
        ..GranularParameters::default()
    })?;

    // Render the note sequence via the engine's handle, as a host would from its control thread
    let handle = engine.handle();
    let sample_time = |seconds: f32| (seconds * SAMPLE_RATE as f32) as usize;
    let total_frames = sample_time(RENDER_DURATION);

    let mut output = Vec::with_capacity(total_frames * 2);
    let mut left = vec![0.0; BLOCK_SIZE];
    let mut right = vec![0.0; BLOCK_SIZE];
    let mut frame = 0;
    while frame < total_frames {
        let block_end = frame + BLOCK_SIZE;
        for (start, duration, note, velocity) in NOTES {
            if (frame..block_end).contains(&sample_time(start)) {
                handle.note_on(note, velocity)?;
            }
            if (frame..block_end).contains(&sample_time(start + duration)) {
                handle.note_off(note)?;
            }
        }
        if (frame..block_end).contains(&sample_time(3.0)) {
            handle.set_parameter(GranularParameter::PitchOffset, -12.0)?;
        }

        left.fill(0.0);
        right.fill(0.0);
        #[cfg(all(debug_assertions, feature = "assert-allocs"))]
        assert_no_alloc::assert_no_alloc(|| engine.process(&mut left, &mut right));
        #[cfg(not(all(debug_assertions, feature = "assert-allocs")))]
        engine.process(&mut left, &mut right);

        for (l, r) in left.iter().zip(right.iter()) {
            output.push(*l);
            output.push(*r);
        }
        frame = block_end;
    }
    log::info!(
        "Rendered {} frames, {} grain spawns got dropped",
        total_frames,
        engine.dropped_spawns()
    );

    // Write the result
    let output_path = args
        .output_path
        .unwrap_or_else(|| DEFAULT_OUTPUT_PATH.into());
    write_wav_file(&output_path, &output)?;
    log::info!("Wrote '{}'", output_path.display());
    Ok(())
}

// -------------------------------------------------------------------------------------------------

fn hound_error(err: hound::Error) -> Error {
    match err {
        hound::Error::IoError(err) => Error::IoError(err),
        err => Error::IoError(io::Error::new(io::ErrorKind::InvalidData, err)),
    }
}

/// Load a wav file and pad it to a power of two length.
fn load_sample_buffer(path: &Path) -> Result<SampleBuffer, Error> {
    let mut reader = WavReader::open(path).map_err(hound_error)?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(hound_error)?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(hound_error)?
        }
    };

    let channel_count = (spec.channels as usize).max(1);
    let frame_count = samples.len() / channel_count;
    let padded_len = frame_count.max(1).next_power_of_two();
    // mono files play on both channels, extra channels get dropped
    let mut left = vec![0.0; padded_len];
    let mut right = vec![0.0; padded_len];
    for (frame, values) in samples.chunks_exact(channel_count).enumerate() {
        left[frame] = values[0];
        right[frame] = values[channel_count.min(2) - 1];
    }
    log::info!(
        "Loaded '{}': {} frames, padded to {}",
        path.display(),
        frame_count,
        padded_len
    );
    SampleBuffer::new(left, right, spec.sample_rate)
}

/// Create a decaying, slightly detuned saw-ish tone as grain source.
fn synthesize_sample_buffer() -> Result<SampleBuffer, Error> {
    let len = 1 << 17;
    let frequency = 261.63;
    let tone = |detune: f32| {
        (0..len)
            .map(|i| {
                let time = i as f32 / SAMPLE_RATE as f32;
                let phase = time * frequency * detune * TAU;
                let decay = (-time * 0.8).exp();
                decay * (phase.sin() + 0.5 * (2.0 * phase).sin() + 0.25 * (3.0 * phase).sin())
                    * 0.5
            })
            .collect::<Vec<f32>>()
    };
    SampleBuffer::new(tone(1.0), tone(1.003), SAMPLE_RATE)
}

fn write_wav_file(path: &Path, interleaved: &[f32]) -> Result<(), Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec).map_err(hound_error)?;
    for sample in interleaved {
        writer.write_sample(*sample).map_err(hound_error)?;
    }
    writer.finalize().map_err(hound_error)
}
