use anyhow::Result;
use reencode::SessionEvent;
use reencode_core::{
    ConfigurationError, MediaKind, TranscodeError, TranscodeErrorInfo, TranscodeErrorType,
    codecs::mime,
};
use serde_json::{Value, json};

use crate::{BackendOptions, BackendStats, Clip};

use super::{assert_released, start_transcoder, strategy, terminal, transcode};

fn stereo_aac() -> Value {
    json!({
        "mime": "audio/mp4a-latm",
        "attributes": { "sample-rate": 44100, "channel-count": 2 },
    })
}

fn failure(events: &[SessionEvent]) -> &TranscodeError {
    match terminal(events) {
        SessionEvent::Failed(err) => err,
        event => panic!("expected a failure, got {event:?}"),
    }
}

#[test]
pub fn nothing_to_transcode() -> Result<()> {
    let (transcoder, stats) = start_transcoder(BackendOptions::default(), 1)?;
    let clip = Clip::builder(7)
        .video(mime::VIDEO_AVC, 320, 240, 10, 33_333)
        .pcm_audio(mime::AUDIO_AAC, 44100, 2, 1024, 10)
        .build();
    let strategy = strategy(json!({ "supported": ["video/avc"] }))?;

    let (output, events) = transcode(&transcoder, clip, strategy)?;

    assert_eq!(events.len(), 1, "{events:?}");
    assert!(matches!(
        failure(&events),
        TranscodeError::Configuration(ConfigurationError::NothingToTranscode)
    ));
    let record = output.record();
    assert!(record.released && !record.started);
    assert!(record.tracks.is_empty());
    assert_eq!(BackendStats::get(&stats.sources_opened), 1);
    assert_eq!(BackendStats::get(&stats.codecs_created), 0);
    assert_released(&stats);
    Ok(())
}

#[test]
pub fn no_supported_container() -> Result<()> {
    let (transcoder, stats) = start_transcoder(BackendOptions::default(), 1)?;
    let clip = Clip::builder(8)
        .pcm_audio(mime::AUDIO_AAC, 44100, 2, 1024, 10)
        .build();
    let strategy = strategy(json!({ "supported": ["video/hevc"], "audio": stereo_aac() }))?;

    let (output, events) = transcode(&transcoder, clip, strategy)?;

    let err = failure(&events);
    assert!(matches!(
        err,
        TranscodeError::Configuration(ConfigurationError::NoSupportedContainer)
    ));
    assert_eq!(
        TranscodeErrorInfo::from(err).error_code,
        "UNSUPPORTED_OUTPUT_FORMAT"
    );
    assert_eq!(output.record().container, None);
    assert_eq!(BackendStats::get(&stats.sinks_created), 0);
    assert_eq!(BackendStats::get(&stats.sources_opened), 0);
    Ok(())
}

#[test]
pub fn source_without_media_tracks() -> Result<()> {
    let (transcoder, stats) = start_transcoder(BackendOptions::default(), 1)?;
    let clip = Clip::builder(9).other_track("text/vtt").build();
    let strategy = strategy(json!({ "supported": ["video/avc"], "audio": stereo_aac() }))?;

    let (output, events) = transcode(&transcoder, clip, strategy)?;

    assert!(matches!(
        failure(&events),
        TranscodeError::Configuration(ConfigurationError::NoTracks)
    ));
    assert!(output.record().released);
    assert_released(&stats);
    Ok(())
}

/// Only mono and stereo layouts can be remixed. The layout is known once the decoder reports it.
#[test]
pub fn unsupported_channel_count() -> Result<()> {
    let (transcoder, stats) = start_transcoder(BackendOptions::default(), 1)?;
    let clip = Clip::builder(10)
        .pcm_audio(mime::AUDIO_AAC, 44100, 6, 1024, 10)
        .build();
    let strategy = strategy(json!({ "supported": ["video/avc"], "audio": stereo_aac() }))?;

    let (output, events) = transcode(&transcoder, clip, strategy)?;

    let err = failure(&events);
    assert!(matches!(
        err,
        TranscodeError::Configuration(ConfigurationError::UnsupportedChannelCount(6))
    ));
    assert_eq!(
        TranscodeErrorInfo::from(err).error_type,
        TranscodeErrorType::Configuration
    );
    let record = output.record();
    assert!(!record.started && record.released);
    assert!(record.samples.is_empty());
    assert_eq!(BackendStats::get(&stats.codecs_stopped), 2);
    assert_released(&stats);
    Ok(())
}

#[test]
pub fn sample_rate_conversion_is_rejected() -> Result<()> {
    let (transcoder, stats) = start_transcoder(BackendOptions::default(), 1)?;
    let clip = Clip::builder(11)
        .pcm_audio(mime::AUDIO_AAC, 48000, 2, 1024, 10)
        .build();
    let strategy = strategy(json!({ "supported": ["video/avc"], "audio": stereo_aac() }))?;

    let (_output, events) = transcode(&transcoder, clip, strategy)?;

    assert!(matches!(
        failure(&events),
        TranscodeError::Configuration(ConfigurationError::SampleRateMismatch {
            decoded: 48000,
            requested: 44100,
        })
    ));
    assert_released(&stats);
    Ok(())
}

/// Codecs created before the failing encoder are still released.
#[test]
pub fn encoder_creation_failure() -> Result<()> {
    let (transcoder, stats) = start_transcoder(
        BackendOptions {
            fail_encoder: Some(MediaKind::Audio),
            ..Default::default()
        },
        1,
    )?;
    let clip = Clip::builder(12)
        .video(mime::VIDEO_AVC, 320, 240, 10, 33_333)
        .pcm_audio(mime::AUDIO_AAC, 44100, 2, 1024, 10)
        .build();
    let strategy = strategy(json!({
        "supported": ["video/x-vnd.on2.vp8"],
        "video": {
            "mime": "video/x-vnd.on2.vp8",
            "attributes": { "width": 320, "height": 240 },
        },
        "audio": {
            "mime": "audio/opus",
            "attributes": { "sample-rate": 44100, "channel-count": 2 },
        },
    }))?;

    let (output, events) = transcode(&transcoder, clip, strategy)?;

    let err = failure(&events);
    assert!(matches!(err, TranscodeError::CreateEncoder(MediaKind::Audio, _)));
    let info = TranscodeErrorInfo::from(err);
    assert_eq!(info.error_code, "CODEC_INIT_FAILED");
    assert_eq!(info.error_type, TranscodeErrorType::Resource);

    // video encoder and decoder
    assert_eq!(BackendStats::get(&stats.codecs_created), 2);
    assert_eq!(BackendStats::get(&stats.frame_transfers_released), 1);
    assert!(output.record().released);
    assert_released(&stats);
    Ok(())
}
