use tracing::debug;

use crate::prelude::*;

#[derive(Debug, Clone)]
pub(crate) struct SourceTrack {
    pub index: usize,
    pub format: MediaFormat,
}

/// First video and first audio track of a source. Other tracks are ignored.
#[derive(Debug, Default)]
pub(crate) struct SourceTracks {
    pub video: Option<SourceTrack>,
    pub audio: Option<SourceTrack>,
}

impl SourceTracks {
    pub fn discover(source: &dyn SourceReader) -> Result<Self, TranscodeError> {
        let mut tracks = Self::default();
        for index in 0..source.track_count() {
            let format = source.track_format(index).map_err(TranscodeError::Source)?;
            let slot = match MediaKind::from_mime(&format.mime) {
                Some(MediaKind::Video) => &mut tracks.video,
                Some(MediaKind::Audio) => &mut tracks.audio,
                None => {
                    debug!(index, mime = %format.mime, "Ignoring track.");
                    continue;
                }
            };
            if slot.is_none() {
                debug!(index, mime = %format.mime, "Found track.");
                *slot = Some(SourceTrack { index, format });
            }
        }

        if tracks.video.is_none() && tracks.audio.is_none() {
            return Err(ConfigurationError::NoTracks.into());
        }
        Ok(tracks)
    }

    pub fn get(&self, kind: MediaKind) -> Option<&SourceTrack> {
        match kind {
            MediaKind::Video => self.video.as_ref(),
            MediaKind::Audio => self.audio.as_ref(),
        }
    }
}
