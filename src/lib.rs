pub mod config;
pub mod error;
pub mod logger;
pub mod transcoder;

pub use transcoder::{SessionEvent, SessionHandle, TranscodeCallback, Transcoder};
