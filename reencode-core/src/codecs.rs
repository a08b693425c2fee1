use serde::{Deserialize, Serialize};

use crate::{ConfigurationError, FormatStrategy, MediaFormat, MediaKind, format::keys};

pub mod mime {
    pub const VIDEO_AVC: &str = "video/avc";
    pub const VIDEO_3GPP: &str = "video/3gpp";
    pub const VIDEO_VP8: &str = "video/x-vnd.on2.vp8";
    pub const VIDEO_VP9: &str = "video/x-vnd.on2.vp9";
    pub const VIDEO_THEORA: &str = "video/theora";
    pub const AUDIO_AAC: &str = "audio/mp4a-latm";
    pub const AUDIO_RAW: &str = "audio/raw";
}

/// profile_idc of the H.264 Baseline profile
pub const AVC_PROFILE_BASELINE: u8 = 66;

const NAL_UNIT_TYPE_SPS: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    Mpeg4,
    ThreeGpp,
    WebM,
    Ogg,
}

/// Video codecs in order of preference together with the container each one is written to.
const CONTAINER_PREFERENCE: [(&str, ContainerFormat); 5] = [
    (mime::VIDEO_AVC, ContainerFormat::Mpeg4),
    (mime::VIDEO_3GPP, ContainerFormat::ThreeGpp),
    (mime::VIDEO_VP8, ContainerFormat::WebM),
    (mime::VIDEO_VP9, ContainerFormat::WebM),
    (mime::VIDEO_THEORA, ContainerFormat::Ogg),
];

impl ContainerFormat {
    pub fn select(strategy: &dyn FormatStrategy) -> Result<Self, ConfigurationError> {
        CONTAINER_PREFERENCE
            .iter()
            .find(|(mime, _)| strategy.is_supported(mime))
            .map(|(_, container)| *container)
            .ok_or(ConfigurationError::NoSupportedContainer)
    }

    /// Checks that a transcoded track format can be stored in this container.
    pub fn validate(self, kind: MediaKind, format: &MediaFormat) -> Result<(), ConfigurationError> {
        if self != ContainerFormat::Mpeg4 {
            return Ok(());
        }
        match kind {
            MediaKind::Video => {
                if format.mime != mime::VIDEO_AVC {
                    return Err(ConfigurationError::UnsupportedCodec {
                        container: self,
                        kind,
                        mime: format.mime.clone(),
                    });
                }
                let profile_idc = format.bytes(keys::CSD_0).and_then(|sps| avc_profile_idc(sps));
                if profile_idc != Some(AVC_PROFILE_BASELINE) {
                    return Err(ConfigurationError::UnsupportedAvcProfile {
                        container: self,
                        profile_idc,
                    });
                }
                Ok(())
            }
            MediaKind::Audio => {
                if format.mime != mime::AUDIO_AAC {
                    return Err(ConfigurationError::UnsupportedCodec {
                        container: self,
                        kind,
                        mime: format.mime.clone(),
                    });
                }
                Ok(())
            }
        }
    }
}

/// Reads profile_idc from an SPS NAL unit, with or without an Annex B start code.
pub fn avc_profile_idc(sps: &[u8]) -> Option<u8> {
    let nal = sps
        .strip_prefix(&[0, 0, 0, 1])
        .or_else(|| sps.strip_prefix(&[0, 0, 1]))
        .unwrap_or(sps);
    match nal {
        [header, profile_idc, ..] if header & 0x1f == NAL_UNIT_TYPE_SPS => Some(*profile_idc),
        _ => None,
    }
}
