use std::error::Error;

use crate::{ContainerFormat, MediaKind};

/// Failure reported by a platform backend (codec, demuxer, muxer or frame transfer).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("Failed to create the container sink.")]
    CreateSink(#[source] BackendError),

    #[error("Failed to read the source metadata.")]
    ReadMetadata(#[source] BackendError),

    #[error("Failed to open the source reader.")]
    OpenSource(#[source] BackendError),

    #[error("Failed to create the {0} decoder.")]
    CreateDecoder(MediaKind, #[source] BackendError),

    #[error("Failed to create the {0} encoder.")]
    CreateEncoder(MediaKind, #[source] BackendError),

    #[error("Failed to create the frame transfer between video decoder and encoder.")]
    CreateFrameTransfer(#[source] BackendError),

    #[error("The {0} codec failed while transcoding.")]
    Codec(MediaKind, #[source] BackendError),

    #[error("The source reader failed while reading samples.")]
    Source(#[source] BackendError),

    #[error("The container sink failed while writing samples.")]
    Sink(#[source] BackendError),

    #[error("The frame transfer failed while rendering a frame.")]
    FrameTransfer(#[source] BackendError),

    #[error("Transcoding was interrupted.")]
    Interrupted,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("No container format supports any of the requested video codecs.")]
    NoSupportedContainer,

    #[error("The source does not contain any video or audio track.")]
    NoTracks,

    #[error("Nothing to transcode. The format strategy kept every track as is.")]
    NothingToTranscode,

    #[error("The {0} format does not define a codec identifier.")]
    MissingMime(MediaKind),

    #[error("The {kind} format is missing the \"{key}\" attribute.")]
    MissingFormatKey { kind: MediaKind, key: &'static str },

    #[error(
        "Audio sample rate conversion is not supported. Decoded: {decoded} Hz, requested: {requested} Hz."
    )]
    SampleRateMismatch { decoded: i64, requested: i64 },

    #[error("Invalid audio sample rate: {0} Hz.")]
    InvalidSampleRate(i64),

    #[error("Unsupported audio channel count: {0}. Only mono and stereo are supported.")]
    UnsupportedChannelCount(i64),

    #[error("{container:?} output does not support {kind} codec \"{mime}\".")]
    UnsupportedCodec {
        container: ContainerFormat,
        kind: MediaKind,
        mime: String,
    },

    #[error("{container:?} output requires the H.264 Baseline profile, got profile_idc {profile_idc:?}.")]
    UnsupportedAvcProfile {
        container: ContainerFormat,
        profile_idc: Option<u8>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum InvariantViolation {
    #[error("The {0} codec produced a buffer before reporting its output format.")]
    BufferBeforeFormat(MediaKind),

    #[error("Sample of {size} bytes does not fit into a buffer of {capacity} bytes.")]
    SampleTooLarge { size: usize, capacity: usize },

    #[error("Buffer range {offset}..{end} is outside of a {len} byte slot.")]
    BufferOutOfRange { offset: usize, end: usize, len: usize },

    #[error("The container sink was stopped before it was started.")]
    SinkNotStarted,

    #[error("The container sink received a sample after it was stopped.")]
    SinkStopped,

    #[error("No {0} track is registered with the container sink.")]
    UnknownTrack(MediaKind),

    #[error("The {0} coder was stepped before its codecs were set up.")]
    CoderNotSetUp(MediaKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeErrorType {
    Configuration,
    Resource,
    Invariant,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeErrorInfo {
    pub error_code: &'static str,
    pub error_type: TranscodeErrorType,
}

impl TranscodeErrorInfo {
    fn new(error_code: &'static str, error_type: TranscodeErrorType) -> Self {
        Self {
            error_code,
            error_type,
        }
    }
}

const INVALID_CONFIGURATION: &str = "INVALID_CONFIGURATION";
const UNSUPPORTED_OUTPUT_FORMAT: &str = "UNSUPPORTED_OUTPUT_FORMAT";
const CODEC_INIT_FAILED: &str = "CODEC_INIT_FAILED";
const SOURCE_ERROR: &str = "SOURCE_ERROR";
const SINK_ERROR: &str = "SINK_ERROR";
const CODEC_ERROR: &str = "CODEC_ERROR";
const FRAME_TRANSFER_ERROR: &str = "FRAME_TRANSFER_ERROR";
const INVARIANT_VIOLATION: &str = "INVARIANT_VIOLATION";
const INTERRUPTED: &str = "INTERRUPTED";

impl From<&ConfigurationError> for TranscodeErrorInfo {
    fn from(err: &ConfigurationError) -> Self {
        match err {
            ConfigurationError::UnsupportedCodec { .. }
            | ConfigurationError::UnsupportedAvcProfile { .. }
            | ConfigurationError::NoSupportedContainer => TranscodeErrorInfo::new(
                UNSUPPORTED_OUTPUT_FORMAT,
                TranscodeErrorType::Configuration,
            ),
            _ => TranscodeErrorInfo::new(INVALID_CONFIGURATION, TranscodeErrorType::Configuration),
        }
    }
}

impl From<&TranscodeError> for TranscodeErrorInfo {
    fn from(err: &TranscodeError) -> Self {
        match err {
            TranscodeError::Configuration(err) => err.into(),
            TranscodeError::Invariant(_) => {
                TranscodeErrorInfo::new(INVARIANT_VIOLATION, TranscodeErrorType::Invariant)
            }
            TranscodeError::CreateDecoder(_, _) | TranscodeError::CreateEncoder(_, _) => {
                TranscodeErrorInfo::new(CODEC_INIT_FAILED, TranscodeErrorType::Resource)
            }
            TranscodeError::ReadMetadata(_)
            | TranscodeError::OpenSource(_)
            | TranscodeError::Source(_) => {
                TranscodeErrorInfo::new(SOURCE_ERROR, TranscodeErrorType::Resource)
            }
            TranscodeError::CreateSink(_) | TranscodeError::Sink(_) => {
                TranscodeErrorInfo::new(SINK_ERROR, TranscodeErrorType::Resource)
            }
            TranscodeError::CreateFrameTransfer(_) | TranscodeError::FrameTransfer(_) => {
                TranscodeErrorInfo::new(FRAME_TRANSFER_ERROR, TranscodeErrorType::Resource)
            }
            TranscodeError::Codec(_, _) => {
                TranscodeErrorInfo::new(CODEC_ERROR, TranscodeErrorType::Resource)
            }
            TranscodeError::Interrupted => {
                TranscodeErrorInfo::new(INTERRUPTED, TranscodeErrorType::Interrupted)
            }
        }
    }
}
