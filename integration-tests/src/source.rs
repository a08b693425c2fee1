use std::{
    collections::HashSet,
    sync::{Arc, atomic::Ordering},
};

use reencode_core::{BackendError, BufferFlags, MediaFormat, SourceReader};

use crate::{
    backend::BackendStats,
    clip::{Clip, ClipSample},
};

/// Reads a [`Clip`] sample by sample. Only samples of selected tracks are visible.
pub struct ClipReader {
    clip: Clip,
    position: usize,
    selected: HashSet<usize>,
    stats: Arc<BackendStats>,
}

impl ClipReader {
    pub fn new(clip: Clip, stats: Arc<BackendStats>) -> Self {
        Self {
            clip,
            position: 0,
            selected: HashSet::new(),
            stats,
        }
    }

    fn current(&self) -> Option<(usize, &ClipSample)> {
        self.clip.samples[self.position..]
            .iter()
            .enumerate()
            .find(|(_, sample)| self.selected.contains(&sample.track_index))
            .map(|(offset, sample)| (self.position + offset, sample))
    }
}

impl SourceReader for ClipReader {
    fn track_count(&self) -> usize {
        self.clip.tracks.len()
    }

    fn track_format(&self, track_index: usize) -> Result<MediaFormat, BackendError> {
        self.clip
            .tracks
            .get(track_index)
            .cloned()
            .ok_or_else(|| BackendError::new(format!("No track {track_index}")))
    }

    fn select_track(&mut self, track_index: usize) -> Result<(), BackendError> {
        if track_index >= self.clip.tracks.len() {
            return Err(BackendError::new(format!("No track {track_index}")));
        }
        self.selected.insert(track_index);
        Ok(())
    }

    fn sample_track_index(&self) -> Option<usize> {
        self.current().map(|(_, sample)| sample.track_index)
    }

    fn sample_size(&self) -> usize {
        self.current().map(|(_, sample)| sample.data.len()).unwrap_or(0)
    }

    fn sample_time_us(&self) -> i64 {
        self.current()
            .map(|(_, sample)| sample.presentation_time_us)
            .unwrap_or(-1)
    }

    fn sample_flags(&self) -> BufferFlags {
        self.current()
            .map(|(_, sample)| sample.flags)
            .unwrap_or_default()
    }

    fn read_sample_data(&mut self, buffer: &mut [u8]) -> Result<usize, BackendError> {
        let Some((_, sample)) = self.current() else {
            return Ok(0);
        };
        let target = buffer
            .get_mut(..sample.data.len())
            .ok_or_else(|| BackendError::new("Sample does not fit the buffer"))?;
        target.copy_from_slice(&sample.data);
        Ok(sample.data.len())
    }

    fn advance(&mut self) -> Result<bool, BackendError> {
        self.position = self
            .current()
            .map(|(index, _)| index + 1)
            .unwrap_or(self.clip.samples.len());
        Ok(self.current().is_some())
    }

    fn release(&mut self) -> Result<(), BackendError> {
        self.stats.sources_released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
