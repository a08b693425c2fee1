use std::time::Duration;

use crate::{MediaBackend, prelude::*};

use super::muxer::BufferedSink;

mod pass_through;
mod transcoding;

pub(crate) use pass_through::PassThroughCoder;
pub(crate) use transcoding::TranscodingCoder;


/// Everything a coder touches during a single step.
pub(crate) struct StepContext<'a> {
    pub source: &'a mut dyn SourceReader,
    pub sink: &'a mut BufferedSink,
    pub timeout: Duration,
}

pub(crate) enum TrackCoder {
    PassThrough(PassThroughCoder),
    Transcode(TranscodingCoder),
}

impl TrackCoder {
    pub fn kind(&self) -> MediaKind {
        match self {
            TrackCoder::PassThrough(coder) => coder.kind(),
            TrackCoder::Transcode(coder) => coder.kind(),
        }
    }

    pub fn track_index(&self) -> usize {
        match self {
            TrackCoder::PassThrough(coder) => coder.track_index(),
            TrackCoder::Transcode(coder) => coder.track_index(),
        }
    }

    pub fn setup<B: MediaBackend>(&mut self, backend: &B) -> Result<(), TranscodeError> {
        match self {
            TrackCoder::PassThrough(_) => Ok(()),
            TrackCoder::Transcode(coder) => coder.setup(backend),
        }
    }

    /// Moves as much data as possible without blocking. Returns `true` if anything moved.
    pub fn step_pipeline(&mut self, ctx: &mut StepContext) -> Result<bool, TranscodeError> {
        match self {
            TrackCoder::PassThrough(coder) => coder.step_pipeline(ctx),
            TrackCoder::Transcode(coder) => coder.step_pipeline(ctx),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            TrackCoder::PassThrough(coder) => coder.is_finished(),
            TrackCoder::Transcode(coder) => coder.is_finished(),
        }
    }

    pub fn last_presentation_time_us(&self) -> i64 {
        match self {
            TrackCoder::PassThrough(coder) => coder.last_presentation_time_us(),
            TrackCoder::Transcode(coder) => coder.last_presentation_time_us(),
        }
    }

    /// Share of the track written so far, in `0.0..=1.0`.
    pub fn progress(&self, duration_us: i64) -> f64 {
        if self.is_finished() {
            return 1.0;
        }
        f64::min(
            1.0,
            self.last_presentation_time_us() as f64 / duration_us as f64,
        )
    }

    pub fn release(&mut self) {
        match self {
            TrackCoder::PassThrough(_) => (),
            TrackCoder::Transcode(coder) => coder.release(),
        }
    }
}
