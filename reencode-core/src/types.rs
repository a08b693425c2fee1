use std::{fmt, ops::BitOr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Track kind derived from the MIME prefix (`video/` or `audio/`).
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else if mime.starts_with("audio/") {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    pub const KEY_FRAME: BufferFlags = BufferFlags(1);
    pub const CODEC_CONFIG: BufferFlags = BufferFlags(1 << 1);
    pub const END_OF_STREAM: BufferFlags = BufferFlags(1 << 2);

    pub fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Keeps only the flags that are also set in `mask`.
    pub fn intersection(self, mask: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 & mask.0)
    }
}

impl BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        BufferFlags(self.0 | rhs.0)
    }
}

/// Describes the valid payload of a codec or source buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    pub offset: usize,
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

impl BufferInfo {
    pub fn new(size: usize, presentation_time_us: i64, flags: BufferFlags) -> Self {
        Self {
            offset: 0,
            size,
            presentation_time_us,
            flags,
        }
    }

    pub fn end_of_stream(presentation_time_us: i64) -> Self {
        Self::new(0, presentation_time_us, BufferFlags::END_OF_STREAM)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_STREAM)
    }
}

/// Progress of a single drain stage. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DrainState {
    #[default]
    Idle,
    InProgress,
    EndOfStream,
}

impl DrainState {
    pub fn advance(&mut self, next: DrainState) {
        if next > *self {
            *self = next;
        }
    }

    pub fn is_end_of_stream(self) -> bool {
        self == DrainState::EndOfStream
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainResult {
    /// Nothing could be done right now.
    None,
    /// State changed without moving data, call again.
    ShouldRetryImmediately,
    /// A buffer was moved downstream.
    Consumed,
}

impl DrainResult {
    pub fn made_progress(self) -> bool {
        self != DrainResult::None
    }
}
