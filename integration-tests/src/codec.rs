use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::Ordering,
    },
    time::Duration,
};

use bytes::Bytes;
use reencode_core::{
    BackendError, BufferFlags, BufferInfo, CodecPort, FrameTransfer, MediaFormat, OutputEvent,
};

use crate::backend::BackendStats;

#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub input_slots: usize,
    pub input_capacity: usize,
    pub output_slots: usize,
    /// Emitted once as a `CODEC_CONFIG` buffer, right after the format change.
    pub codec_config: Option<Bytes>,
    /// Report `BuffersChanged` once after the format change.
    pub buffers_changed: bool,
    /// Stops producing output buffers after this many. The format change is still reported.
    pub max_outputs: Option<usize>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            input_slots: 4,
            input_capacity: 64 * 1024,
            output_slots: 4,
            codec_config: None,
            buffers_changed: false,
            max_outputs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceEvent {
    Frame(i64),
    EndOfStream,
}

/// Input surface of a video encoder. Frames rendered by the decoder side show up as encoder input.
#[derive(Debug, Clone, Default)]
pub struct Surface(Arc<Mutex<VecDeque<SurfaceEvent>>>);

impl Surface {
    fn events(&self) -> MutexGuard<'_, VecDeque<SurfaceEvent>> {
        self.0.lock().unwrap()
    }
}

/// Codec that passes payloads through unchanged. A video encoder with a surface encodes every
/// rendered frame into its 8 byte timestamp.
pub struct SimulatedCodec {
    config: CodecConfig,
    output_format: MediaFormat,
    input_slots: Vec<Vec<u8>>,
    free_inputs: VecDeque<usize>,
    pending: VecDeque<(Bytes, BufferInfo)>,
    output_slots: Vec<Option<Bytes>>,
    surface: Option<Surface>,
    format_announced: bool,
    codec_config_sent: bool,
    buffers_changed_sent: bool,
    outputs_produced: usize,
    started: bool,
    stats: Arc<BackendStats>,
}

impl SimulatedCodec {
    pub fn new(config: CodecConfig, output_format: MediaFormat, stats: Arc<BackendStats>) -> Self {
        Self {
            input_slots: vec![vec![0; config.input_capacity]; config.input_slots],
            free_inputs: (0..config.input_slots).collect(),
            pending: VecDeque::new(),
            output_slots: vec![None; config.output_slots],
            surface: None,
            format_announced: false,
            codec_config_sent: false,
            buffers_changed_sent: false,
            outputs_produced: 0,
            started: false,
            config,
            output_format,
            stats,
        }
    }

    /// Takes input from `surface` instead of input buffers.
    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.input_slots.clear();
        self.free_inputs.clear();
        self.surface = Some(surface);
        self
    }

    fn ensure_started(&self) -> Result<(), BackendError> {
        match self.started {
            true => Ok(()),
            false => Err(BackendError::new("Codec is not started")),
        }
    }

    fn collect_surface_frames(&mut self) {
        let Some(surface) = &self.surface else {
            return;
        };
        for event in surface.events().drain(..) {
            let entry = match event {
                SurfaceEvent::Frame(pts) => (
                    Bytes::copy_from_slice(&pts.to_le_bytes()),
                    BufferInfo::new(8, pts, BufferFlags::KEY_FRAME),
                ),
                SurfaceEvent::EndOfStream => (Bytes::new(), BufferInfo::end_of_stream(0)),
            };
            self.pending.push_back(entry);
        }
    }
}

impl CodecPort for SimulatedCodec {
    fn start(&mut self) -> Result<(), BackendError> {
        self.started = true;
        self.stats.codecs_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Result<Option<usize>, BackendError> {
        self.ensure_started()?;
        Ok(self.free_inputs.pop_front())
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8], BackendError> {
        self.input_slots
            .get_mut(index)
            .map(Vec::as_mut_slice)
            .ok_or_else(|| BackendError::new(format!("Invalid input buffer {index}")))
    }

    fn queue_input_buffer(&mut self, index: usize, info: BufferInfo) -> Result<(), BackendError> {
        self.ensure_started()?;
        let slot = self
            .input_slots
            .get(index)
            .ok_or_else(|| BackendError::new(format!("Invalid input buffer {index}")))?;
        let data = slot
            .get(info.offset..info.offset + info.size)
            .ok_or_else(|| BackendError::new("Input range exceeds buffer"))?;
        let flags = info.flags.intersection(BufferFlags::END_OF_STREAM);
        self.pending.push_back((
            Bytes::copy_from_slice(data),
            BufferInfo::new(info.size, info.presentation_time_us, flags),
        ));
        self.free_inputs.push_back(index);
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> Result<OutputEvent, BackendError> {
        self.ensure_started()?;
        self.collect_surface_frames();
        if self.pending.is_empty() {
            return Ok(OutputEvent::TryAgain);
        }
        if !self.format_announced {
            self.format_announced = true;
            return Ok(OutputEvent::FormatChanged);
        }
        if self
            .config
            .max_outputs
            .is_some_and(|max_outputs| self.outputs_produced >= max_outputs)
        {
            return Ok(OutputEvent::TryAgain);
        }
        if self.config.buffers_changed && !self.buffers_changed_sent {
            self.buffers_changed_sent = true;
            return Ok(OutputEvent::BuffersChanged);
        }
        let Some(index) = self.output_slots.iter().position(Option::is_none) else {
            return Ok(OutputEvent::TryAgain);
        };

        let (data, info) = match &self.config.codec_config {
            Some(codec_config) if !self.codec_config_sent => {
                self.codec_config_sent = true;
                let info = BufferInfo::new(codec_config.len(), 0, BufferFlags::CODEC_CONFIG);
                (codec_config.clone(), info)
            }
            _ => match self.pending.pop_front() {
                Some(entry) => {
                    self.outputs_produced += 1;
                    entry
                }
                None => return Ok(OutputEvent::TryAgain),
            },
        };
        self.output_slots[index] = Some(data);
        Ok(OutputEvent::Buffer { index, info })
    }

    fn output_buffer(&mut self, index: usize) -> Result<&[u8], BackendError> {
        match self.output_slots.get(index) {
            Some(Some(data)) => Ok(&data[..]),
            _ => Err(BackendError::new(format!("Output buffer {index} is not dequeued"))),
        }
    }

    fn release_output_buffer(&mut self, index: usize, _render: bool) -> Result<(), BackendError> {
        match self.output_slots.get_mut(index).and_then(Option::take) {
            Some(_) => Ok(()),
            None => Err(BackendError::new(format!("Output buffer {index} is not dequeued"))),
        }
    }

    fn output_format(&self) -> Result<MediaFormat, BackendError> {
        Ok(self.output_format.clone())
    }

    fn signal_end_of_input_stream(&mut self) -> Result<(), BackendError> {
        match &self.surface {
            Some(surface) => {
                surface.events().push_back(SurfaceEvent::EndOfStream);
                Ok(())
            }
            None => Err(BackendError::new("Codec has no input surface")),
        }
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.ensure_started()?;
        self.started = false;
        self.stats.codecs_stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) -> Result<(), BackendError> {
        self.stats.codecs_released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct SimulatedFrameTransfer {
    surface: Surface,
    stats: Arc<BackendStats>,
}

impl SimulatedFrameTransfer {
    pub fn new(surface: Surface, stats: Arc<BackendStats>) -> Self {
        Self { surface, stats }
    }
}

impl FrameTransfer for SimulatedFrameTransfer {
    fn set_output_size(&mut self, width: i64, height: i64) -> Result<(), BackendError> {
        self.stats.frame_output_sizes.lock().unwrap().push((width, height));
        Ok(())
    }

    fn render_frame(&mut self, presentation_time_us: i64) -> Result<(), BackendError> {
        self.surface
            .events()
            .push_back(SurfaceEvent::Frame(presentation_time_us));
        Ok(())
    }

    fn release(&mut self) -> Result<(), BackendError> {
        self.stats.frame_transfers_released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
