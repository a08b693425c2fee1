use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, ThreadId},
};

use reencode_core::{
    BackendError, CodecPort, ContainerFormat, ContainerSink, FrameTransfer, MediaBackend,
    MediaFormat, MediaKind, SourceMetadata, SourceReader, codecs::mime, keys,
};
use tracing::debug;

use crate::{
    clip::Clip,
    codec::{CodecConfig, SimulatedCodec, SimulatedFrameTransfer, Surface},
    sink::RecordingSink,
    source::ClipReader,
};

/// Counters shared by everything the backend creates.
#[derive(Debug, Default)]
pub struct BackendStats {
    pub sinks_created: AtomicUsize,
    pub sources_opened: AtomicUsize,
    pub sources_released: AtomicUsize,
    pub codecs_created: AtomicUsize,
    pub codecs_started: AtomicUsize,
    pub codecs_stopped: AtomicUsize,
    pub codecs_released: AtomicUsize,
    pub frame_transfers_released: AtomicUsize,
    pub decoder_formats: Mutex<Vec<MediaFormat>>,
    pub frame_output_sizes: Mutex<Vec<(i64, i64)>>,
}

impl BackendStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub decoder: CodecConfig,
    pub audio_encoder: CodecConfig,
    pub video_encoder: CodecConfig,
    /// Encoder creation fails for this track kind.
    pub fail_encoder: Option<MediaKind>,
}

/// Platform stand-in that runs entirely in memory.
pub struct SimulatedBackend {
    options: BackendOptions,
    stats: Arc<BackendStats>,
    /// Input surface of the last video encoder created on each thread.
    surfaces: Mutex<HashMap<ThreadId, Surface>>,
}

impl SimulatedBackend {
    pub fn new(options: BackendOptions) -> Self {
        Self {
            options,
            stats: Arc::default(),
            surfaces: Mutex::default(),
        }
    }

    pub fn stats(&self) -> Arc<BackendStats> {
        self.stats.clone()
    }
}

fn required_int(format: &MediaFormat, key: &str) -> Result<i64, BackendError> {
    format
        .integer(key)
        .ok_or_else(|| BackendError::new(format!("Format {} has no \"{key}\"", format.mime)))
}

impl MediaBackend for SimulatedBackend {
    type Input = Clip;
    type Output = RecordingSink;

    fn read_metadata(&self, input: &Clip) -> Result<SourceMetadata, BackendError> {
        Ok(input.metadata)
    }

    fn open_source(&self, input: &Clip) -> Result<Box<dyn SourceReader>, BackendError> {
        self.stats.sources_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ClipReader::new(input.clone(), self.stats.clone())))
    }

    fn create_sink(
        &self,
        output: &RecordingSink,
        container: ContainerFormat,
    ) -> Result<Box<dyn ContainerSink>, BackendError> {
        self.stats.sinks_created.fetch_add(1, Ordering::SeqCst);
        output.record().container = Some(container);
        Ok(Box::new(output.clone()))
    }

    fn create_encoder(&self, format: &MediaFormat) -> Result<Box<dyn CodecPort>, BackendError> {
        let kind = MediaKind::from_mime(&format.mime)
            .ok_or_else(|| BackendError::new(format!("No encoder for {}", format.mime)))?;
        if self.options.fail_encoder == Some(kind) {
            return Err(BackendError::new(format!("No {kind} encoder available")));
        }
        self.stats.codecs_created.fetch_add(1, Ordering::SeqCst);
        debug!(%kind, mime = %format.mime, "Creating simulated encoder.");

        let encoder = match kind {
            MediaKind::Audio => SimulatedCodec::new(
                self.options.audio_encoder.clone(),
                format.clone(),
                self.stats.clone(),
            ),
            MediaKind::Video => {
                let surface = Surface::default();
                self.surfaces
                    .lock()
                    .unwrap()
                    .insert(thread::current().id(), surface.clone());
                SimulatedCodec::new(
                    self.options.video_encoder.clone(),
                    format.clone(),
                    self.stats.clone(),
                )
                .with_surface(surface)
            }
        };
        Ok(Box::new(encoder))
    }

    fn create_frame_transfer(
        &self,
        _encoder: &mut dyn CodecPort,
    ) -> Result<Box<dyn FrameTransfer>, BackendError> {
        let surface = self
            .surfaces
            .lock()
            .unwrap()
            .remove(&thread::current().id())
            .ok_or_else(|| BackendError::new("Encoder has no input surface"))?;
        Ok(Box::new(SimulatedFrameTransfer::new(
            surface,
            self.stats.clone(),
        )))
    }

    fn create_decoder(
        &self,
        format: &MediaFormat,
        frame_transfer: Option<&mut dyn FrameTransfer>,
    ) -> Result<Box<dyn CodecPort>, BackendError> {
        let kind = MediaKind::from_mime(&format.mime)
            .ok_or_else(|| BackendError::new(format!("No decoder for {}", format.mime)))?;
        let output_format = match kind {
            MediaKind::Audio => MediaFormat::audio(
                mime::AUDIO_RAW,
                required_int(format, keys::SAMPLE_RATE)?,
                required_int(format, keys::CHANNEL_COUNT)?,
            ),
            MediaKind::Video => {
                if frame_transfer.is_none() {
                    return Err(BackendError::new("Video decoder needs a frame transfer"));
                }
                MediaFormat::video(
                    "video/raw",
                    required_int(format, keys::WIDTH)?,
                    required_int(format, keys::HEIGHT)?,
                )
            }
        };
        self.stats.codecs_created.fetch_add(1, Ordering::SeqCst);
        self.stats.decoder_formats.lock().unwrap().push(format.clone());
        Ok(Box::new(SimulatedCodec::new(
            self.options.decoder.clone(),
            output_format,
            self.stats.clone(),
        )))
    }
}
