use std::{collections::VecDeque, time::Duration};

use tracing::{debug, trace};

use crate::prelude::*;

mod remix;

use remix::Remix;


const BYTES_PER_SAMPLE: usize = 2;

/// Decoded PCM waiting in a decoder output slot.
#[derive(Debug, Default)]
struct AudioBuffer {
    /// `None` marks the end of stream.
    slot: Option<usize>,
    presentation_time_us: i64,
    offset: usize,
    size: usize,
}

/// Remixed PCM that did not fit into an encoder input slot.
#[derive(Debug, Default)]
struct OverflowBuffer {
    data: Vec<u8>,
    position: usize,
    /// Timestamp of the first sample in `data`, not of the next unread one.
    presentation_time_us: i64,
}

impl OverflowBuffer {
    fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }
}

#[derive(Debug, Clone, Copy)]
struct DecodedLayout {
    sample_rate: i64,
    input_channels: usize,
    output_channels: usize,
    remix: Remix,
}

/// Moves decoded PCM from the decoder to the encoder, converting the channel layout and keeping
/// timestamps continuous when a decoded buffer has to be split across encoder slots.
pub(crate) struct AudioChannel {
    encode_format: MediaFormat,
    layout: Option<DecodedLayout>,
    filled_buffers: VecDeque<AudioBuffer>,
    empty_buffers: Vec<AudioBuffer>,
    overflow: OverflowBuffer,
    end_of_stream_queued: bool,
}

impl AudioChannel {
    pub fn new(encode_format: MediaFormat) -> Self {
        Self {
            encode_format,
            layout: None,
            filled_buffers: VecDeque::new(),
            empty_buffers: Vec::new(),
            overflow: OverflowBuffer::default(),
            end_of_stream_queued: false,
        }
    }

    pub fn set_actual_decoded_format(
        &mut self,
        decoded_format: &MediaFormat,
    ) -> Result<(), ConfigurationError> {
        let sample_rate = positive_sample_rate(decoded_format)?;
        let requested_sample_rate = positive_sample_rate(&self.encode_format)?;
        if sample_rate != requested_sample_rate {
            return Err(ConfigurationError::SampleRateMismatch {
                decoded: sample_rate,
                requested: requested_sample_rate,
            });
        }
        let input_channels = channel_count(decoded_format)?;
        let output_channels = channel_count(&self.encode_format)?;
        let remix = Remix::new(input_channels, output_channels);
        debug!(
            sample_rate,
            input_channels, output_channels, ?remix, "Decoded audio format set."
        );

        self.layout = Some(DecodedLayout {
            sample_rate,
            input_channels,
            output_channels,
            remix,
        });
        self.overflow.presentation_time_us = 0;
        Ok(())
    }

    /// Queues a decoder output slot (or the end of stream marker when `slot` is `None`).
    pub fn drain_decoder_buffer_and_queue(
        &mut self,
        slot: Option<usize>,
        info: &BufferInfo,
    ) -> Result<(), InvariantViolation> {
        if self.layout.is_none() {
            return Err(InvariantViolation::BufferBeforeFormat(MediaKind::Audio));
        }
        let mut buffer = self.empty_buffers.pop().unwrap_or_default();
        buffer.slot = slot;
        buffer.presentation_time_us = info.presentation_time_us;
        buffer.offset = info.offset;
        buffer.size = if slot.is_some() { info.size } else { 0 };
        self.filled_buffers.push_back(buffer);
        Ok(())
    }

    /// Queues at most one encoder input. Returns `true` if data was queued.
    pub fn feed_encoder(
        &mut self,
        decoder: &mut dyn CodecPort,
        encoder: &mut dyn CodecPort,
        timeout: Duration,
    ) -> Result<bool, TranscodeError> {
        if self.end_of_stream_queued {
            return Ok(false);
        }
        let has_overflow = self.overflow.has_remaining();
        if self.filled_buffers.is_empty() && !has_overflow {
            return Ok(false);
        }
        let Some(layout) = self.layout else {
            return Err(InvariantViolation::BufferBeforeFormat(MediaKind::Audio).into());
        };
        let Some(index) = encoder
            .dequeue_input_buffer(timeout)
            .map_err(codec_error)?
        else {
            return Ok(false);
        };

        if has_overflow {
            let out = encoder.input_buffer(index).map_err(codec_error)?;
            let (written, presentation_time_us) = self.drain_overflow(layout, out)?;
            trace!(written, presentation_time_us, "Queued overflow samples.");
            encoder
                .queue_input_buffer(
                    index,
                    BufferInfo::new(written, presentation_time_us, BufferFlags::NONE),
                )
                .map_err(codec_error)?;
            return Ok(true);
        }

        let Some(input) = self.filled_buffers.pop_front() else {
            return Ok(false);
        };
        let Some(slot) = input.slot else {
            encoder
                .queue_input_buffer(index, BufferInfo::end_of_stream(input.presentation_time_us))
                .map_err(codec_error)?;
            debug!("Queued end of stream to the audio encoder.");
            self.end_of_stream_queued = true;
            self.empty_buffers.push(input);
            return Ok(false);
        };

        let data = decoder.output_buffer(slot).map_err(codec_error)?;
        let out = encoder.input_buffer(index).map_err(codec_error)?;
        let written = self.remix_and_maybe_fill_overflow(layout, &input, data, out)?;
        encoder
            .queue_input_buffer(
                index,
                BufferInfo::new(written, input.presentation_time_us, BufferFlags::NONE),
            )
            .map_err(codec_error)?;
        decoder
            .release_output_buffer(slot, false)
            .map_err(codec_error)?;
        self.empty_buffers.push(input);
        Ok(true)
    }

    pub fn overflow_remaining(&self) -> usize {
        self.overflow.remaining()
    }

    fn drain_overflow(
        &mut self,
        layout: DecodedLayout,
        out: &mut [u8],
    ) -> Result<(usize, i64), InvariantViolation> {
        let frame_size = layout.remix.output_frame_size();
        let len = usize::min(self.overflow.remaining(), out.len() / frame_size * frame_size);
        if len == 0 {
            return Err(InvariantViolation::SampleTooLarge {
                size: frame_size,
                capacity: out.len(),
            });
        }
        let presentation_time_us = self.overflow.presentation_time_us
            + samples_to_duration_us(
                self.overflow.position / BYTES_PER_SAMPLE,
                layout.sample_rate,
                layout.output_channels,
            );

        let start = self.overflow.position;
        out[..len].copy_from_slice(&self.overflow.data[start..start + len]);
        self.overflow.position += len;
        if !self.overflow.has_remaining() {
            self.overflow.data.clear();
            self.overflow.position = 0;
        }
        Ok((len, presentation_time_us))
    }

    fn remix_and_maybe_fill_overflow(
        &mut self,
        layout: DecodedLayout,
        input: &AudioBuffer,
        data: &[u8],
        out: &mut [u8],
    ) -> Result<usize, InvariantViolation> {
        let end = input.offset + input.size;
        let data = data
            .get(input.offset..end)
            .ok_or(InvariantViolation::BufferOutOfRange {
                offset: input.offset,
                end,
                len: data.len(),
            })?;
        let remix = layout.remix;
        if remix.output_len(data.len()) <= out.len() {
            let (_, written) = remix.remix(data, out);
            return Ok(written);
        }

        let (consumed, written) = remix.remix(data, out);
        if written == 0 {
            return Err(InvariantViolation::SampleTooLarge {
                size: remix.output_frame_size(),
                capacity: out.len(),
            });
        }
        let rest = &data[consumed..];
        self.overflow.data.clear();
        self.overflow.data.resize(remix.output_len(rest.len()), 0);
        self.overflow.position = 0;
        remix.remix(rest, &mut self.overflow.data);
        self.overflow.presentation_time_us = input.presentation_time_us
            + samples_to_duration_us(
                consumed / BYTES_PER_SAMPLE,
                layout.sample_rate,
                layout.input_channels,
            );
        trace!(
            overflow = self.overflow.data.len(),
            presentation_time_us = self.overflow.presentation_time_us,
            "Decoded buffer does not fit the encoder slot."
        );
        Ok(written)
    }
}

fn codec_error(err: BackendError) -> TranscodeError {
    TranscodeError::Codec(MediaKind::Audio, err)
}

fn required_int(format: &MediaFormat, key: &'static str) -> Result<i64, ConfigurationError> {
    format
        .integer(key)
        .ok_or(ConfigurationError::MissingFormatKey {
            kind: MediaKind::Audio,
            key,
        })
}

fn positive_sample_rate(format: &MediaFormat) -> Result<i64, ConfigurationError> {
    match required_int(format, keys::SAMPLE_RATE)? {
        rate if rate > 0 => Ok(rate),
        rate => Err(ConfigurationError::InvalidSampleRate(rate)),
    }
}

fn channel_count(format: &MediaFormat) -> Result<usize, ConfigurationError> {
    match required_int(format, keys::CHANNEL_COUNT)? {
        1 => Ok(1),
        2 => Ok(2),
        count => Err(ConfigurationError::UnsupportedChannelCount(count)),
    }
}

/// Duration of `samples` interleaved samples, truncated to whole microseconds.
pub(crate) fn samples_to_duration_us(samples: usize, sample_rate: i64, channels: usize) -> i64 {
    samples as i64 * 1_000_000 / sample_rate / channels as i64
}
