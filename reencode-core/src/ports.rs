//! Seams to the platform: codecs, demuxer, muxer and the GPU frame path between video codecs.
//!
//! Every call is expected to return promptly. Codec ports are polled with an explicit timeout and
//! report "nothing available" instead of blocking.

use std::time::Duration;

use crate::{BackendError, BufferFlags, BufferInfo, ContainerFormat, MediaFormat};

/// Result of polling a codec for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    TryAgain,
    /// New output format is available through [`CodecPort::output_format`].
    FormatChanged,
    /// Previously fetched buffer slices are invalid and must be fetched again.
    BuffersChanged,
    Buffer { index: usize, info: BufferInfo },
}

pub trait CodecPort: Send {
    fn start(&mut self) -> Result<(), BackendError>;

    /// Returns index of a free input slot, `None` if none became free within `timeout`.
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<usize>, BackendError>;

    /// Whole input slot, its length is the slot capacity.
    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8], BackendError>;

    fn queue_input_buffer(&mut self, index: usize, info: BufferInfo) -> Result<(), BackendError>;

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<OutputEvent, BackendError>;

    /// Whole output slot, valid bytes are described by the `BufferInfo` it was dequeued with.
    fn output_buffer(&mut self, index: usize) -> Result<&[u8], BackendError>;

    /// Hands the slot back to the codec. With `render` the frame is sent to the attached output
    /// surface.
    fn release_output_buffer(&mut self, index: usize, render: bool) -> Result<(), BackendError>;

    fn output_format(&self) -> Result<MediaFormat, BackendError>;

    /// Ends the input of an encoder that is fed through a frame transfer surface.
    fn signal_end_of_input_stream(&mut self) -> Result<(), BackendError>;

    fn stop(&mut self) -> Result<(), BackendError>;

    fn release(&mut self) -> Result<(), BackendError>;
}

/// Demultiplexer over the input container.
pub trait SourceReader: Send {
    fn track_count(&self) -> usize;

    fn track_format(&self, track_index: usize) -> Result<MediaFormat, BackendError>;

    fn select_track(&mut self, track_index: usize) -> Result<(), BackendError>;

    /// Track of the current sample, `None` once every selected track is exhausted.
    fn sample_track_index(&self) -> Option<usize>;

    fn sample_size(&self) -> usize;

    fn sample_time_us(&self) -> i64;

    fn sample_flags(&self) -> BufferFlags;

    /// Copies the current sample into `buffer` and returns the number of bytes written.
    fn read_sample_data(&mut self, buffer: &mut [u8]) -> Result<usize, BackendError>;

    /// Moves to the next sample, returns `false` if there is none.
    fn advance(&mut self) -> Result<bool, BackendError>;

    fn release(&mut self) -> Result<(), BackendError>;
}

/// Container writer. Tracks have to be added before `start`.
pub trait ContainerSink: Send {
    fn set_orientation_hint(&mut self, degrees: i64) -> Result<(), BackendError>;

    fn add_track(&mut self, format: &MediaFormat) -> Result<usize, BackendError>;

    fn start(&mut self) -> Result<(), BackendError>;

    fn write_sample(
        &mut self,
        track_index: usize,
        data: &[u8],
        info: &BufferInfo,
    ) -> Result<(), BackendError>;

    fn stop(&mut self) -> Result<(), BackendError>;

    fn release(&mut self) -> Result<(), BackendError>;
}

/// Moves decoded video frames from the decoder output surface into the encoder input surface.
pub trait FrameTransfer: Send {
    /// Output dimensions of the decoded frames, already adjusted for rotation.
    fn set_output_size(&mut self, _width: i64, _height: i64) -> Result<(), BackendError> {
        Ok(())
    }

    /// Draws the frame most recently released with `render` and submits it to the encoder.
    fn render_frame(&mut self, presentation_time_us: i64) -> Result<(), BackendError>;

    fn release(&mut self) -> Result<(), BackendError>;
}

/// Decides the output format of each track. `None` keeps the track as is.
pub trait FormatStrategy: Send + Sync {
    /// Whether an encoder for `mime` is available.
    fn is_supported(&self, mime: &str) -> bool;

    fn video_output_format(&self, source: &MediaFormat) -> Option<MediaFormat>;

    fn audio_output_format(&self, source: &MediaFormat) -> Option<MediaFormat>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceMetadata {
    pub duration_us: Option<i64>,
    pub rotation_degrees: i64,
}

/// Factory for everything a session needs from the platform.
pub trait MediaBackend: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn read_metadata(&self, input: &Self::Input) -> Result<SourceMetadata, BackendError>;

    fn open_source(&self, input: &Self::Input) -> Result<Box<dyn SourceReader>, BackendError>;

    fn create_sink(
        &self,
        output: &Self::Output,
        container: ContainerFormat,
    ) -> Result<Box<dyn ContainerSink>, BackendError>;

    /// Creates a configured, not yet started encoder.
    fn create_encoder(&self, format: &MediaFormat) -> Result<Box<dyn CodecPort>, BackendError>;

    /// Attaches a frame transfer to the input surface of a video encoder.
    fn create_frame_transfer(
        &self,
        encoder: &mut dyn CodecPort,
    ) -> Result<Box<dyn FrameTransfer>, BackendError>;

    /// Creates a configured, not yet started decoder. Video decoders render into `frame_transfer`.
    fn create_decoder(
        &self,
        format: &MediaFormat,
        frame_transfer: Option<&mut dyn FrameTransfer>,
    ) -> Result<Box<dyn CodecPort>, BackendError>;
}
