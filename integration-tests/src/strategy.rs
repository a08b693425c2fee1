use reencode_core::{FormatStrategy, MediaFormat};
use serde::Deserialize;

/// Returns the same output formats for every source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixedStrategy {
    /// Video MIME types with an available encoder.
    #[serde(default)]
    pub supported: Vec<String>,
    pub video: Option<MediaFormat>,
    pub audio: Option<MediaFormat>,
}

impl FormatStrategy for FixedStrategy {
    fn is_supported(&self, mime: &str) -> bool {
        self.supported.iter().any(|supported| supported == mime)
    }

    fn video_output_format(&self, _source: &MediaFormat) -> Option<MediaFormat> {
        self.video.clone()
    }

    fn audio_output_format(&self, _source: &MediaFormat) -> Option<MediaFormat> {
        self.audio.clone()
    }
}
