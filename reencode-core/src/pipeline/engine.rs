use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{Level, debug, info, span, warn};

use crate::{FormatStrategy, MediaBackend, prelude::*};

use super::{
    coder::{PassThroughCoder, StepContext, TrackCoder, TranscodingCoder},
    muxer::BufferedSink,
    tracks::{SourceTrack, SourceTracks},
};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Wait between iterations in which no coder made progress.
    pub backoff: Duration,
    /// Progress is reported every `progress_interval` iterations.
    pub progress_interval: u32,
    /// Sample buffer of copied tracks whose format has no `max-input-size`.
    pub pass_through_buffer_size: usize,
    /// Timeout passed to every codec dequeue call.
    pub codec_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(10),
            progress_interval: 10,
            pass_through_buffer_size: 1024 * 1024,
            codec_timeout: Duration::ZERO,
        }
    }
}

/// Runs a single transcoding session on the calling thread.
pub struct TranscodeEngine<'a, B: MediaBackend> {
    backend: &'a B,
    options: EngineOptions,
    interrupt: Receiver<()>,
}

/// Resources owned by one session. Released in field order.
struct Session {
    video: Option<TrackCoder>,
    audio: Option<TrackCoder>,
    source: Option<Box<dyn SourceReader>>,
    sink: BufferedSink,
}

impl<'a, B: MediaBackend> TranscodeEngine<'a, B> {
    pub fn new(backend: &'a B, options: EngineOptions) -> Self {
        Self {
            backend,
            options,
            interrupt: crossbeam_channel::never(),
        }
    }

    /// A message on `interrupt`, or its disconnection, ends the session with
    /// [`TranscodeError::Interrupted`] the next time the engine backs off.
    pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Transcodes `input` into `output`. `on_progress` receives values in `0.0..=1.0`, or a
    /// single `-1.0` when the source duration is unknown.
    pub fn run(
        &self,
        input: &B::Input,
        output: &B::Output,
        strategy: &dyn FormatStrategy,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), TranscodeError> {
        let container = ContainerFormat::select(strategy)?;
        let _span = span!(Level::INFO, "Transcode", ?container).entered();

        let sink = self
            .backend
            .create_sink(output, container)
            .map_err(TranscodeError::CreateSink)?;
        let mut session = Session {
            video: None,
            audio: None,
            source: None,
            sink: BufferedSink::new(sink, container),
        };

        let result = self.run_session(&mut session, input, strategy, on_progress);
        drop(session);
        match &result {
            Ok(()) => info!("Transcoding finished."),
            Err(TranscodeError::Interrupted) => info!("Transcoding interrupted."),
            Err(err) => warn!(%err, "Transcoding failed."),
        }
        result
    }

    fn run_session(
        &self,
        session: &mut Session,
        input: &B::Input,
        strategy: &dyn FormatStrategy,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), TranscodeError> {
        let metadata = self
            .backend
            .read_metadata(input)
            .map_err(TranscodeError::ReadMetadata)?;
        let source = self
            .backend
            .open_source(input)
            .map_err(TranscodeError::OpenSource)?;
        let source = session.source.insert(source);
        let tracks = SourceTracks::discover(source.as_ref())?;

        let video_output = tracks
            .video
            .as_ref()
            .and_then(|track| strategy.video_output_format(&track.format));
        let audio_output = tracks
            .audio
            .as_ref()
            .and_then(|track| strategy.audio_output_format(&track.format));
        if video_output.is_none() && audio_output.is_none() {
            return Err(ConfigurationError::NothingToTranscode.into());
        }

        session
            .sink
            .expect_tracks(tracks.video.is_some(), tracks.audio.is_some());
        session.sink.set_orientation_hint(metadata.rotation_degrees);

        for (kind, output_format) in [
            (MediaKind::Video, video_output),
            (MediaKind::Audio, audio_output),
        ] {
            let Some(track) = tracks.get(kind) else {
                continue;
            };
            let coder = self.create_coder(kind, track, output_format, &mut session.sink)?;
            let coder = match kind {
                MediaKind::Video => session.video.insert(coder),
                MediaKind::Audio => session.audio.insert(coder),
            };
            let _span = span!(Level::INFO, "Track", %kind, index = track.index).entered();
            coder.setup(self.backend)?;
        }
        for track in [&tracks.video, &tracks.audio].into_iter().flatten() {
            source
                .select_track(track.index)
                .map_err(TranscodeError::Source)?;
        }

        self.run_loop(
            source.as_mut(),
            &mut session.sink,
            [&mut session.video, &mut session.audio],
            metadata.duration_us,
            on_progress,
        )?;
        session.sink.stop()
    }

    fn create_coder(
        &self,
        kind: MediaKind,
        track: &SourceTrack,
        output_format: Option<MediaFormat>,
        sink: &mut BufferedSink,
    ) -> Result<TrackCoder, TranscodeError> {
        let coder = match output_format {
            Some(output_format) => TrackCoder::Transcode(TranscodingCoder::new(
                kind,
                track.index,
                track.format.clone(),
                output_format,
            )),
            None => TrackCoder::PassThrough(PassThroughCoder::new(
                kind,
                track.index,
                &track.format,
                self.options.pass_through_buffer_size,
                sink,
            )?),
        };
        Ok(coder)
    }

    fn run_loop(
        &self,
        source: &mut dyn SourceReader,
        sink: &mut BufferedSink,
        [video, audio]: [&mut Option<TrackCoder>; 2],
        duration_us: Option<i64>,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), TranscodeError> {
        let duration_us = duration_us.filter(|duration_us| *duration_us > 0);
        if duration_us.is_none() {
            debug!("Source duration unknown, progress is not reported.");
            on_progress(-1.0);
        }
        let progress_interval = u64::from(self.options.progress_interval.max(1));

        let mut iteration: u64 = 0;
        loop {
            let mut ctx = StepContext {
                source: &mut *source,
                sink: &mut *sink,
                timeout: self.options.codec_timeout,
            };
            let mut busy = false;
            for coder in [&mut *video, &mut *audio].into_iter().flatten() {
                busy |= coder.step_pipeline(&mut ctx)?;
            }

            if let Some(finished) = live_coders(video, audio).find(|coder| coder.is_finished()) {
                debug!(kind = %finished.kind(), iteration, "Track finished, ending session.");
                return Ok(());
            }

            iteration += 1;
            if let Some(duration_us) = duration_us
                && iteration % progress_interval == 0
            {
                let (sum, count) = live_coders(video, audio)
                    .fold((0.0, 0u32), |(sum, count), coder| {
                        (sum + coder.progress(duration_us), count + 1)
                    });
                on_progress(sum / f64::from(count));
            }

            if !busy {
                self.back_off()?;
            }
        }
    }

    fn back_off(&self) -> Result<(), TranscodeError> {
        match self.interrupt.recv_timeout(self.options.backoff) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Err(TranscodeError::Interrupted),
        }
    }
}

fn live_coders<'a>(
    video: &'a Option<TrackCoder>,
    audio: &'a Option<TrackCoder>,
) -> impl Iterator<Item = &'a TrackCoder> {
    [video.as_ref(), audio.as_ref()].into_iter().flatten()
}

/// Releases video coder, audio coder, source and sink in that order, on every exit path.
impl Drop for Session {
    fn drop(&mut self) {
        for coder in [&mut self.video, &mut self.audio] {
            if let Some(mut coder) = coder.take() {
                debug!(kind = %coder.kind(), "Releasing coder.");
                coder.release();
            }
        }
        if let Some(mut source) = self.source.take()
            && let Err(err) = source.release()
        {
            warn!(%err, "Failed to release source.");
        }
        if let Err(err) = self.sink.release() {
            warn!(%err, "Failed to release sink.");
        }
    }
}
