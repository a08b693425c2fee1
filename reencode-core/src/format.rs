use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::MediaKind;

pub mod keys {
    pub const SAMPLE_RATE: &str = "sample-rate";
    pub const CHANNEL_COUNT: &str = "channel-count";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const ROTATION_DEGREES: &str = "rotation-degrees";
    pub const MAX_INPUT_SIZE: &str = "max-input-size";
    pub const BITRATE: &str = "bitrate";
    pub const FRAME_RATE: &str = "frame-rate";
    pub const CSD_0: &str = "csd-0";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormatValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Bytes),
}

/// Codec identifier plus the key/value attributes describing an elementary stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaFormat {
    pub mime: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, FormatValue>,
}

impl MediaFormat {
    pub fn new(mime: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn audio(mime: impl Into<String>, sample_rate: i64, channel_count: i64) -> Self {
        Self::new(mime)
            .with_int(keys::SAMPLE_RATE, sample_rate)
            .with_int(keys::CHANNEL_COUNT, channel_count)
    }

    pub fn video(mime: impl Into<String>, width: i64, height: i64) -> Self {
        Self::new(mime)
            .with_int(keys::WIDTH, width)
            .with_int(keys::HEIGHT, height)
    }

    pub fn with_int(mut self, key: &str, value: i64) -> Self {
        self.set_int(key, value);
        self
    }

    pub fn with_bytes(mut self, key: &str, value: impl Into<Bytes>) -> Self {
        self.attributes
            .insert(key.to_string(), FormatValue::Bytes(value.into()));
        self
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.attributes
            .insert(key.to_string(), FormatValue::Int(value));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.attributes.get(key)? {
            FormatValue::Int(value) => Some(*value),
            FormatValue::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn bytes(&self, key: &str) -> Option<&Bytes> {
        match self.attributes.get(key)? {
            FormatValue::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_mime(&self.mime)
    }

    pub fn has_mime(&self) -> bool {
        !self.mime.trim().is_empty()
    }
}
