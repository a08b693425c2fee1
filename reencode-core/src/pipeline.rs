mod audio_channel;
mod coder;
mod engine;
mod muxer;
mod tracks;

pub use engine::{EngineOptions, TranscodeEngine};
