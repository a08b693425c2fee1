use bytes::Bytes;
use rand::{Rng, SeedableRng, rngs::StdRng};
use reencode_core::{BufferFlags, MediaFormat, SourceMetadata, keys};

/// One demuxed sample of a [`Clip`].
#[derive(Debug, Clone)]
pub struct ClipSample {
    pub track_index: usize,
    pub data: Bytes,
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

/// In-memory input file. Audio samples carry native-endian PCM so that decoding is the identity.
#[derive(Debug, Clone, Default)]
pub struct Clip {
    pub tracks: Vec<MediaFormat>,
    /// Interleaved by presentation time.
    pub samples: Vec<ClipSample>,
    pub metadata: SourceMetadata,
}

impl Clip {
    pub fn builder(seed: u64) -> ClipBuilder {
        ClipBuilder {
            clip: Clip::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn track_samples(&self, track_index: usize) -> impl Iterator<Item = &ClipSample> {
        self.samples
            .iter()
            .filter(move |sample| sample.track_index == track_index)
    }

    pub fn track_payload(&self, track_index: usize) -> Vec<u8> {
        self.track_samples(track_index)
            .flat_map(|sample| sample.data.iter().copied())
            .collect()
    }
}

pub struct ClipBuilder {
    clip: Clip,
    rng: StdRng,
}

impl ClipBuilder {
    /// Adds a track of `buffer_count` buffers with `frames_per_buffer` random PCM frames each.
    pub fn pcm_audio(
        mut self,
        mime: &str,
        sample_rate: i64,
        channels: i64,
        frames_per_buffer: usize,
        buffer_count: usize,
    ) -> Self {
        let track_index = self.clip.tracks.len();
        let buffer_size = frames_per_buffer * channels as usize * 2;
        self.clip.tracks.push(
            MediaFormat::audio(mime, sample_rate, channels)
                .with_int(keys::MAX_INPUT_SIZE, buffer_size as i64),
        );

        for buffer in 0..buffer_count {
            let data: Vec<u8> = (0..frames_per_buffer * channels as usize)
                .flat_map(|_| self.rng.random::<i16>().to_ne_bytes())
                .collect();
            let frame = (buffer * frames_per_buffer) as i64;
            self.clip.samples.push(ClipSample {
                track_index,
                data: Bytes::from(data),
                presentation_time_us: frame * 1_000_000 / sample_rate,
                flags: BufferFlags::KEY_FRAME,
            });
        }
        self
    }

    /// Adds a track of `frame_count` frames, `frame_interval_us` apart, with a key frame every
    /// 30 frames.
    pub fn video(
        mut self,
        mime: &str,
        width: i64,
        height: i64,
        frame_count: usize,
        frame_interval_us: i64,
    ) -> Self {
        let track_index = self.clip.tracks.len();
        let mut format = MediaFormat::video(mime, width, height).with_int(keys::MAX_INPUT_SIZE, 256);
        if self.clip.metadata.rotation_degrees != 0 {
            format.set_int(keys::ROTATION_DEGREES, self.clip.metadata.rotation_degrees);
        }
        self.clip.tracks.push(format);

        for frame in 0..frame_count {
            let size = self.rng.random_range(16..256);
            let data: Vec<u8> = (0..size).map(|_| self.rng.random()).collect();
            let flags = match frame % 30 {
                0 => BufferFlags::KEY_FRAME,
                _ => BufferFlags::NONE,
            };
            self.clip.samples.push(ClipSample {
                track_index,
                data: Bytes::from(data),
                presentation_time_us: frame as i64 * frame_interval_us,
                flags,
            });
        }
        self
    }

    /// Track that is neither video nor audio.
    pub fn other_track(mut self, mime: &str) -> Self {
        self.clip.tracks.push(MediaFormat::new(mime));
        self
    }

    /// Applies to video tracks added afterwards.
    pub fn rotation(mut self, degrees: i64) -> Self {
        self.clip.metadata.rotation_degrees = degrees;
        self
    }

    pub fn duration_us(mut self, duration_us: Option<i64>) -> Self {
        self.clip.metadata.duration_us = duration_us;
        self
    }

    pub fn build(mut self) -> Clip {
        self.clip
            .samples
            .sort_by_key(|sample| sample.presentation_time_us);
        self.clip
    }
}
