use bytes::BytesMut;
use tracing::{debug, info};

use crate::prelude::*;


const INITIAL_BUFFER_SIZE: usize = 64 * 1024;

/// Who produced the track format. Only encoder formats are checked against the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackOrigin {
    Transcoded,
    PassThrough,
}

#[derive(Debug)]
struct PendingSample {
    kind: MediaKind,
    offset: usize,
    size: usize,
    presentation_time_us: i64,
    flags: BufferFlags,
}

#[derive(Debug, Default)]
struct TrackSlot {
    expected: bool,
    format: Option<(MediaFormat, TrackOrigin)>,
    sink_index: Option<usize>,
}

enum SinkState {
    Collecting {
        buffer: BytesMut,
        samples: Vec<PendingSample>,
    },
    Active,
    Stopped,
}

/// Delays writing into the container until every expected track has a known output format.
pub(crate) struct BufferedSink {
    sink: Box<dyn ContainerSink>,
    container: ContainerFormat,
    orientation_hint: i64,
    video: TrackSlot,
    audio: TrackSlot,
    state: SinkState,
}

impl BufferedSink {
    pub fn new(sink: Box<dyn ContainerSink>, container: ContainerFormat) -> Self {
        Self {
            sink,
            container,
            orientation_hint: 0,
            video: TrackSlot::default(),
            audio: TrackSlot::default(),
            state: SinkState::Collecting {
                buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
                samples: Vec::new(),
            },
        }
    }

    pub fn expect_tracks(&mut self, video: bool, audio: bool) {
        self.video.expected = video;
        self.audio.expected = audio;
    }

    pub fn set_orientation_hint(&mut self, degrees: i64) {
        self.orientation_hint = degrees;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SinkState::Active)
    }

    pub fn set_output_format(
        &mut self,
        kind: MediaKind,
        format: MediaFormat,
        origin: TrackOrigin,
    ) -> Result<(), TranscodeError> {
        let slot = self.track_mut(kind);
        if !slot.expected {
            return Err(InvariantViolation::UnknownTrack(kind).into());
        }
        if slot.sink_index.is_some() {
            // the container keeps the format the track was added with
            debug!(%kind, mime = %format.mime, "Ignoring format change of a started track.");
            return Ok(());
        }
        debug!(%kind, mime = %format.mime, ?origin, "Output format registered.");
        slot.format = Some((format, origin));

        if matches!(self.state, SinkState::Collecting { .. }) && self.all_formats_known() {
            self.start()?;
        }
        Ok(())
    }

    pub fn write_sample(
        &mut self,
        kind: MediaKind,
        data: &[u8],
        info: &BufferInfo,
    ) -> Result<(), TranscodeError> {
        match &mut self.state {
            SinkState::Collecting { buffer, samples } => {
                samples.push(PendingSample {
                    kind,
                    offset: buffer.len(),
                    size: data.len(),
                    presentation_time_us: info.presentation_time_us,
                    flags: info.flags,
                });
                buffer.extend_from_slice(data);
                return Ok(());
            }
            SinkState::Stopped => return Err(InvariantViolation::SinkStopped.into()),
            SinkState::Active => {}
        }

        let track_index = self
            .track(kind)
            .sink_index
            .ok_or(InvariantViolation::UnknownTrack(kind))?;
        let info = BufferInfo {
            offset: 0,
            size: data.len(),
            ..*info
        };
        self.sink
            .write_sample(track_index, data, &info)
            .map_err(TranscodeError::Sink)
    }

    pub fn stop(&mut self) -> Result<(), TranscodeError> {
        match self.state {
            SinkState::Active => {
                self.state = SinkState::Stopped;
                self.sink.stop().map_err(TranscodeError::Sink)
            }
            _ => Err(InvariantViolation::SinkNotStarted.into()),
        }
    }

    pub fn release(&mut self) -> Result<(), BackendError> {
        self.sink.release()
    }

    fn start(&mut self) -> Result<(), TranscodeError> {
        for (kind, slot) in [(MediaKind::Video, &self.video), (MediaKind::Audio, &self.audio)] {
            if let Some((format, TrackOrigin::Transcoded)) = &slot.format {
                self.container.validate(kind, format)?;
            }
        }

        for kind in [MediaKind::Video, MediaKind::Audio] {
            let Some((format, _)) = self.track(kind).format.clone() else {
                continue;
            };
            let index = self.sink.add_track(&format).map_err(TranscodeError::Sink)?;
            self.track_mut(kind).sink_index = Some(index);
        }
        self.sink
            .set_orientation_hint(self.orientation_hint)
            .map_err(TranscodeError::Sink)?;
        self.sink.start().map_err(TranscodeError::Sink)?;

        let SinkState::Collecting { buffer, samples } =
            std::mem::replace(&mut self.state, SinkState::Active)
        else {
            return Ok(());
        };
        info!(
            container = ?self.container,
            buffered_samples = samples.len(),
            buffered_bytes = buffer.len(),
            "Container sink started."
        );
        let buffer = buffer.freeze();
        for sample in samples {
            let info = BufferInfo::new(sample.size, sample.presentation_time_us, sample.flags);
            let data = &buffer[sample.offset..sample.offset + sample.size];
            self.write_sample(sample.kind, data, &info)?;
        }
        Ok(())
    }

    fn all_formats_known(&self) -> bool {
        [&self.video, &self.audio]
            .into_iter()
            .all(|slot| !slot.expected || slot.format.is_some())
    }

    fn track(&self, kind: MediaKind) -> &TrackSlot {
        match kind {
            MediaKind::Video => &self.video,
            MediaKind::Audio => &self.audio,
        }
    }

    fn track_mut(&mut self, kind: MediaKind) -> &mut TrackSlot {
        match kind {
            MediaKind::Video => &mut self.video,
            MediaKind::Audio => &mut self.audio,
        }
    }
}
