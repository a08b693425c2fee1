use tracing::{debug, trace};

use crate::{
    pipeline::muxer::{BufferedSink, TrackOrigin},
    prelude::*,
};

use super::StepContext;

/// Copies samples of one track from the source to the sink without re-encoding.
pub(crate) struct PassThroughCoder {
    kind: MediaKind,
    track_index: usize,
    buffer: Vec<u8>,
    finished: bool,
    last_presentation_time_us: i64,
}

impl PassThroughCoder {
    /// The input format is registered with `sink` as the output format of the track.
    pub fn new(
        kind: MediaKind,
        track_index: usize,
        format: &MediaFormat,
        fallback_buffer_size: usize,
        sink: &mut BufferedSink,
    ) -> Result<Self, TranscodeError> {
        let buffer_size = format
            .integer(keys::MAX_INPUT_SIZE)
            .and_then(|size| usize::try_from(size).ok())
            .filter(|size| *size > 0)
            .unwrap_or(fallback_buffer_size);
        debug!(%kind, track_index, buffer_size, "Copying track without re-encoding.");
        sink.set_output_format(kind, format.clone(), TrackOrigin::PassThrough)?;

        Ok(Self {
            kind,
            track_index,
            buffer: vec![0; buffer_size],
            finished: false,
            last_presentation_time_us: 0,
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn last_presentation_time_us(&self) -> i64 {
        self.last_presentation_time_us
    }

    pub fn step_pipeline(&mut self, ctx: &mut StepContext) -> Result<bool, TranscodeError> {
        if self.finished {
            return Ok(false);
        }
        let Some(sample_track) = ctx.source.sample_track_index() else {
            ctx.sink.write_sample(
                self.kind,
                &[],
                &BufferInfo::end_of_stream(self.last_presentation_time_us),
            )?;
            debug!(kind = %self.kind, "Copied track finished.");
            self.finished = true;
            return Ok(true);
        };
        if sample_track != self.track_index {
            return Ok(false);
        }

        let size = ctx.source.sample_size();
        if size > self.buffer.len() {
            return Err(InvariantViolation::SampleTooLarge {
                size,
                capacity: self.buffer.len(),
            }
            .into());
        }
        let read = ctx
            .source
            .read_sample_data(&mut self.buffer[..size])
            .map_err(TranscodeError::Source)?;
        let presentation_time_us = ctx.source.sample_time_us();
        let flags = ctx.source.sample_flags().intersection(BufferFlags::KEY_FRAME);
        trace!(kind = %self.kind, read, presentation_time_us, "Copying sample.");

        ctx.sink.write_sample(
            self.kind,
            &self.buffer[..read],
            &BufferInfo::new(read, presentation_time_us, flags),
        )?;
        self.last_presentation_time_us = presentation_time_us;
        ctx.source.advance().map_err(TranscodeError::Source)?;
        Ok(true)
    }
}
