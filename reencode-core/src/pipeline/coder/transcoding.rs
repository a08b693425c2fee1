use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::{
    MediaBackend,
    pipeline::{
        audio_channel::AudioChannel,
        muxer::{BufferedSink, TrackOrigin},
    },
    prelude::*,
};

use super::StepContext;

struct ManagedCodec {
    port: Box<dyn CodecPort>,
    started: bool,
}

impl ManagedCodec {
    fn new(port: Box<dyn CodecPort>) -> Self {
        Self {
            port,
            started: false,
        }
    }

    fn start(&mut self) -> Result<(), BackendError> {
        self.port.start()?;
        self.started = true;
        Ok(())
    }

    fn release(mut self, kind: MediaKind, role: &str) {
        if self.started
            && let Err(err) = self.port.stop()
        {
            warn!(%kind, role, %err, "Failed to stop codec.");
        }
        if let Err(err) = self.port.release() {
            warn!(%kind, role, %err, "Failed to release codec.");
        }
    }
}

#[derive(Debug, Default)]
struct TrackProgress {
    extractor: DrainState,
    decoder: DrainState,
    encoder: DrainState,
    encoder_format_known: bool,
    last_presentation_time_us: i64,
}

/// Decodes one track and encodes it into the requested output format.
pub(crate) struct TranscodingCoder {
    kind: MediaKind,
    track_index: usize,
    input_format: MediaFormat,
    output_format: MediaFormat,
    decoder: Option<ManagedCodec>,
    encoder: Option<ManagedCodec>,
    frame_transfer: Option<Box<dyn FrameTransfer>>,
    audio_channel: Option<AudioChannel>,
    progress: TrackProgress,
}

impl TranscodingCoder {
    pub fn new(
        kind: MediaKind,
        track_index: usize,
        input_format: MediaFormat,
        output_format: MediaFormat,
    ) -> Self {
        Self {
            kind,
            track_index,
            input_format,
            output_format,
            decoder: None,
            encoder: None,
            frame_transfer: None,
            audio_channel: None,
            progress: TrackProgress::default(),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    pub fn is_finished(&self) -> bool {
        self.progress.encoder.is_end_of_stream()
    }

    pub fn last_presentation_time_us(&self) -> i64 {
        self.progress.last_presentation_time_us
    }

    #[cfg(test)]
    pub fn drain_states(&self) -> (DrainState, DrainState, DrainState) {
        (
            self.progress.extractor,
            self.progress.decoder,
            self.progress.encoder,
        )
    }

    /// Creates and starts the codecs. Encoder first, video decoders render into its input surface.
    pub fn setup<B: MediaBackend>(&mut self, backend: &B) -> Result<(), TranscodeError> {
        let kind = self.kind;
        if !self.input_format.has_mime() || !self.output_format.has_mime() {
            return Err(ConfigurationError::MissingMime(kind).into());
        }
        debug!(
            %kind,
            input = %self.input_format.mime,
            output = %self.output_format.mime,
            "Setting up transcoding."
        );

        let encoder = backend
            .create_encoder(&self.output_format)
            .map_err(|err| TranscodeError::CreateEncoder(kind, err))?;
        let encoder = self.encoder.insert(ManagedCodec::new(encoder));
        if kind == MediaKind::Video {
            let frame_transfer = backend
                .create_frame_transfer(encoder.port.as_mut())
                .map_err(TranscodeError::CreateFrameTransfer)?;
            self.frame_transfer = Some(frame_transfer);
        }
        encoder
            .start()
            .map_err(|err| TranscodeError::CreateEncoder(kind, err))?;

        let mut decoder_format = self.input_format.clone();
        if kind == MediaKind::Video && decoder_format.contains(keys::ROTATION_DEGREES) {
            // frames are stored unrotated, the container carries the orientation hint
            decoder_format.set_int(keys::ROTATION_DEGREES, 0);
        }
        let frame_transfer = self
            .frame_transfer
            .as_mut()
            .map(|frame_transfer| frame_transfer.as_mut() as &mut dyn FrameTransfer);
        let decoder = backend
            .create_decoder(&decoder_format, frame_transfer)
            .map_err(|err| TranscodeError::CreateDecoder(kind, err))?;
        self.decoder
            .insert(ManagedCodec::new(decoder))
            .start()
            .map_err(|err| TranscodeError::CreateDecoder(kind, err))?;

        if kind == MediaKind::Audio {
            self.audio_channel = Some(AudioChannel::new(self.output_format.clone()));
        }
        Ok(())
    }

    pub fn step_pipeline(&mut self, ctx: &mut StepContext) -> Result<bool, TranscodeError> {
        let rotation_degrees = self.input_format.integer(keys::ROTATION_DEGREES).unwrap_or(0);
        let path = match (self.kind, &mut self.audio_channel, &mut self.frame_transfer) {
            (MediaKind::Audio, Some(channel), _) => TranscodePath::Audio(channel),
            (MediaKind::Video, _, Some(frame_transfer)) => TranscodePath::Video {
                frame_transfer: frame_transfer.as_mut(),
                rotation_degrees,
            },
            _ => return Err(InvariantViolation::CoderNotSetUp(self.kind).into()),
        };
        let (Some(decoder), Some(encoder)) = (&mut self.decoder, &mut self.encoder) else {
            return Err(InvariantViolation::CoderNotSetUp(self.kind).into());
        };
        let mut stages = Stages {
            kind: self.kind,
            track_index: self.track_index,
            decoder: decoder.port.as_mut(),
            encoder: encoder.port.as_mut(),
            path,
            progress: &mut self.progress,
            timeout: ctx.timeout,
        };

        let mut busy = false;
        while stages.drain_encoder(ctx.sink)?.made_progress() {
            busy = true;
        }
        if stages.drain_decoder()?.made_progress() {
            busy = true;
        }
        if let TranscodePath::Audio(channel) = &mut stages.path {
            while channel.feed_encoder(stages.decoder, stages.encoder, stages.timeout)? {
                busy = true;
            }
        }
        while stages.drain_extractor(ctx.source)?.made_progress() {
            busy = true;
        }
        Ok(busy)
    }

    /// Frame transfer first, then decoder, then encoder.
    pub fn release(&mut self) {
        if let Some(mut frame_transfer) = self.frame_transfer.take()
            && let Err(err) = frame_transfer.release()
        {
            warn!(%err, "Failed to release frame transfer.");
        }
        if let Some(decoder) = self.decoder.take() {
            decoder.release(self.kind, "decoder");
        }
        if let Some(encoder) = self.encoder.take() {
            encoder.release(self.kind, "encoder");
        }
    }
}

enum TranscodePath<'a> {
    Audio(&'a mut AudioChannel),
    Video {
        frame_transfer: &'a mut dyn FrameTransfer,
        rotation_degrees: i64,
    },
}

struct Stages<'a> {
    kind: MediaKind,
    track_index: usize,
    decoder: &'a mut dyn CodecPort,
    encoder: &'a mut dyn CodecPort,
    path: TranscodePath<'a>,
    progress: &'a mut TrackProgress,
    timeout: Duration,
}

fn codec_error(kind: MediaKind) -> impl Fn(BackendError) -> TranscodeError + Copy {
    move |err| TranscodeError::Codec(kind, err)
}

impl Stages<'_> {
    fn drain_extractor(
        &mut self,
        source: &mut dyn SourceReader,
    ) -> Result<DrainResult, TranscodeError> {
        let to_codec_error = codec_error(self.kind);
        if self.progress.extractor.is_end_of_stream() {
            return Ok(DrainResult::None);
        }
        let sample_track = source.sample_track_index();
        if let Some(track_index) = sample_track
            && track_index != self.track_index
        {
            return Ok(DrainResult::None);
        }
        let Some(slot) = self
            .decoder
            .dequeue_input_buffer(self.timeout)
            .map_err(to_codec_error)?
        else {
            return Ok(DrainResult::None);
        };

        if sample_track.is_none() {
            self.decoder
                .queue_input_buffer(slot, BufferInfo::end_of_stream(0))
                .map_err(to_codec_error)?;
            debug!(kind = %self.kind, "Source exhausted, queued end of stream to decoder.");
            self.progress.extractor.advance(DrainState::EndOfStream);
            return Ok(DrainResult::None);
        }

        let size = source.sample_size();
        let buffer = self.decoder.input_buffer(slot).map_err(to_codec_error)?;
        if size > buffer.len() {
            return Err(InvariantViolation::SampleTooLarge {
                size,
                capacity: buffer.len(),
            }
            .into());
        }
        let read = source
            .read_sample_data(&mut buffer[..size])
            .map_err(TranscodeError::Source)?;
        let presentation_time_us = source.sample_time_us();
        let flags = source.sample_flags().intersection(BufferFlags::KEY_FRAME);
        self.decoder
            .queue_input_buffer(slot, BufferInfo::new(read, presentation_time_us, flags))
            .map_err(to_codec_error)?;
        source.advance().map_err(TranscodeError::Source)?;
        self.progress.extractor.advance(DrainState::InProgress);
        Ok(DrainResult::Consumed)
    }

    fn drain_decoder(&mut self) -> Result<DrainResult, TranscodeError> {
        let to_codec_error = codec_error(self.kind);
        if self.progress.decoder.is_end_of_stream() {
            return Ok(DrainResult::None);
        }
        let (index, info) = match self
            .decoder
            .dequeue_output_buffer(self.timeout)
            .map_err(to_codec_error)?
        {
            OutputEvent::TryAgain => return Ok(DrainResult::None),
            OutputEvent::FormatChanged => {
                let format = self.decoder.output_format().map_err(to_codec_error)?;
                self.on_decoded_format(&format)?;
                return Ok(DrainResult::ShouldRetryImmediately);
            }
            OutputEvent::BuffersChanged => {
                trace!(kind = %self.kind, "Decoder buffers changed.");
                return Ok(DrainResult::ShouldRetryImmediately);
            }
            OutputEvent::Buffer { index, info } => (index, info),
        };
        self.progress.decoder.advance(DrainState::InProgress);

        match &mut self.path {
            TranscodePath::Audio(channel) => {
                if info.size > 0 {
                    channel.drain_decoder_buffer_and_queue(Some(index), &info)?;
                } else {
                    self.decoder
                        .release_output_buffer(index, false)
                        .map_err(to_codec_error)?;
                }
                if info.is_end_of_stream() {
                    channel.drain_decoder_buffer_and_queue(None, &info)?;
                }
            }
            TranscodePath::Video { frame_transfer, .. } => {
                let render = info.size > 0;
                self.decoder
                    .release_output_buffer(index, render)
                    .map_err(to_codec_error)?;
                if render {
                    frame_transfer
                        .render_frame(info.presentation_time_us)
                        .map_err(TranscodeError::FrameTransfer)?;
                }
                if info.is_end_of_stream() {
                    self.encoder
                        .signal_end_of_input_stream()
                        .map_err(to_codec_error)?;
                }
            }
        }
        if info.is_end_of_stream() {
            debug!(kind = %self.kind, "Decoder reached end of stream.");
            self.progress.decoder.advance(DrainState::EndOfStream);
        }
        Ok(DrainResult::Consumed)
    }

    fn on_decoded_format(&mut self, format: &MediaFormat) -> Result<(), TranscodeError> {
        match &mut self.path {
            TranscodePath::Audio(channel) => channel.set_actual_decoded_format(format)?,
            TranscodePath::Video {
                frame_transfer,
                rotation_degrees,
            } => {
                let (Some(width), Some(height)) =
                    (format.integer(keys::WIDTH), format.integer(keys::HEIGHT))
                else {
                    debug!("Decoded video format has no dimensions.");
                    return Ok(());
                };
                let (width, height) = match rotation_degrees.rem_euclid(360) {
                    90 | 270 => (height, width),
                    _ => (width, height),
                };
                debug!(width, height, "Decoded video format changed.");
                frame_transfer
                    .set_output_size(width, height)
                    .map_err(TranscodeError::FrameTransfer)?;
            }
        }
        Ok(())
    }

    fn drain_encoder(&mut self, sink: &mut BufferedSink) -> Result<DrainResult, TranscodeError> {
        let to_codec_error = codec_error(self.kind);
        if self.progress.encoder.is_end_of_stream() {
            return Ok(DrainResult::None);
        }
        let (index, info) = match self
            .encoder
            .dequeue_output_buffer(self.timeout)
            .map_err(to_codec_error)?
        {
            OutputEvent::TryAgain => return Ok(DrainResult::None),
            OutputEvent::FormatChanged => {
                let format = self.encoder.output_format().map_err(to_codec_error)?;
                sink.set_output_format(self.kind, format, TrackOrigin::Transcoded)?;
                self.progress.encoder_format_known = true;
                return Ok(DrainResult::ShouldRetryImmediately);
            }
            OutputEvent::BuffersChanged => return Ok(DrainResult::ShouldRetryImmediately),
            OutputEvent::Buffer { index, info } => (index, info),
        };

        if info.flags.contains(BufferFlags::CODEC_CONFIG) {
            // codec specific data already travels in the output format
            self.encoder
                .release_output_buffer(index, false)
                .map_err(to_codec_error)?;
            return Ok(DrainResult::ShouldRetryImmediately);
        }
        if !self.progress.encoder_format_known {
            return Err(InvariantViolation::BufferBeforeFormat(self.kind).into());
        }
        self.progress.encoder.advance(DrainState::InProgress);

        if info.is_end_of_stream() {
            let terminal = BufferInfo {
                offset: 0,
                size: 0,
                presentation_time_us: self.progress.last_presentation_time_us,
                flags: info.flags,
            };
            sink.write_sample(self.kind, &[], &terminal)?;
            self.encoder
                .release_output_buffer(index, false)
                .map_err(to_codec_error)?;
            debug!(kind = %self.kind, "Encoder reached end of stream.");
            self.progress.encoder.advance(DrainState::EndOfStream);
            return Ok(DrainResult::Consumed);
        }

        let buffer = self.encoder.output_buffer(index).map_err(to_codec_error)?;
        let end = info.offset + info.size;
        let data = buffer
            .get(info.offset..end)
            .ok_or(InvariantViolation::BufferOutOfRange {
                offset: info.offset,
                end,
                len: buffer.len(),
            })?;
        sink.write_sample(self.kind, data, &info)?;
        self.progress.last_presentation_time_us = info.presentation_time_us;
        self.encoder
            .release_output_buffer(index, false)
            .map_err(to_codec_error)?;
        Ok(DrainResult::Consumed)
    }
}
