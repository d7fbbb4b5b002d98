#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod engine;
mod error;
mod sample;

// public, flat re-exports
pub use error::Error;

pub use engine::{
    EngineConfig, EngineMessage, GranularEngine, GranularEngineHandle, GranularParameter,
    GranularParameters, SprayMode,
};

pub use sample::{SampleBuffer, SharedSampleBuffer};

// public mods
pub mod utils;

// -------------------------------------------------------------------------------------------------

#[cfg(all(test, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;
