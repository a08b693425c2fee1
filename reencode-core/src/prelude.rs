pub(crate) use crate::{
    codecs::ContainerFormat,
    error::{
        BackendError, ConfigurationError, InvariantViolation, TranscodeError,
    },
    format::{MediaFormat, keys},
    ports::{CodecPort, ContainerSink, FrameTransfer, OutputEvent, SourceReader},
    types::{BufferFlags, BufferInfo, DrainResult, DrainState, MediaKind},
};
