use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use reencode_core::{BackendError, BufferInfo, ContainerFormat, ContainerSink, MediaFormat};

#[derive(Debug, Clone)]
pub struct WrittenSample {
    pub track_index: usize,
    pub data: Bytes,
    pub info: BufferInfo,
}

#[derive(Debug, Default)]
pub struct SinkRecord {
    pub container: Option<ContainerFormat>,
    pub orientation_hint: Option<i64>,
    pub tracks: Vec<MediaFormat>,
    pub samples: Vec<WrittenSample>,
    pub started: bool,
    pub stopped: bool,
    pub released: bool,
}

impl SinkRecord {
    pub fn track_samples(&self, track_index: usize) -> impl Iterator<Item = &WrittenSample> {
        self.samples
            .iter()
            .filter(move |sample| sample.track_index == track_index)
    }

    /// Concatenated payload of a track, end of stream markers included.
    pub fn track_payload(&self, track_index: usize) -> Bytes {
        let mut payload = BytesMut::new();
        for sample in self.track_samples(track_index) {
            payload.extend_from_slice(&sample.data);
        }
        payload.freeze()
    }

    pub fn track_index(&self, mime: &str) -> Option<usize> {
        self.tracks.iter().position(|format| format.mime == mime)
    }
}

/// Output of a session. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink(Arc<Mutex<SinkRecord>>);

impl RecordingSink {
    pub fn record(&self) -> MutexGuard<'_, SinkRecord> {
        self.0.lock().unwrap()
    }
}

impl ContainerSink for RecordingSink {
    fn set_orientation_hint(&mut self, degrees: i64) -> Result<(), BackendError> {
        let mut record = self.record();
        if record.started {
            return Err(BackendError::new("Orientation set after start"));
        }
        record.orientation_hint = Some(degrees);
        Ok(())
    }

    fn add_track(&mut self, format: &MediaFormat) -> Result<usize, BackendError> {
        let mut record = self.record();
        if record.started {
            return Err(BackendError::new("Track added after start"));
        }
        record.tracks.push(format.clone());
        Ok(record.tracks.len() - 1)
    }

    fn start(&mut self) -> Result<(), BackendError> {
        self.record().started = true;
        Ok(())
    }

    fn write_sample(
        &mut self,
        track_index: usize,
        data: &[u8],
        info: &BufferInfo,
    ) -> Result<(), BackendError> {
        let mut record = self.record();
        if !record.started || record.stopped {
            return Err(BackendError::new("Sink is not running"));
        }
        if track_index >= record.tracks.len() {
            return Err(BackendError::new(format!("No track {track_index}")));
        }
        record.samples.push(WrittenSample {
            track_index,
            data: Bytes::copy_from_slice(data),
            info: *info,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.record().stopped = true;
        Ok(())
    }

    fn release(&mut self) -> Result<(), BackendError> {
        self.record().released = true;
        Ok(())
    }
}
