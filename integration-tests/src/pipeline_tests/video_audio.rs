use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use crossbeam_channel::unbounded;
use reencode::SessionEvent;
use reencode_core::{
    ConfigurationError, ContainerFormat, MediaFormat, TranscodeError, codecs::mime, keys,
};

use crate::{
    BackendOptions, BackendStats, Clip, CodecConfig, FixedStrategy, RecordingSink,
    collect_events,
};

use super::{SESSION_TIMEOUT, assert_released, start_transcoder, terminal, transcode};

const FRAME_INTERVAL_US: i64 = 33_333;

/// SPS of a Constrained Baseline stream.
const BASELINE_SPS: &[u8] = &[0, 0, 0, 1, 0x67, 66, 0xc0, 0x1e, 0xda, 0x02, 0x80];

fn avc_output() -> MediaFormat {
    MediaFormat::video(mime::VIDEO_AVC, 640, 360)
        .with_int(keys::BITRATE, 2_000_000)
        .with_int(keys::FRAME_RATE, 30)
        .with_bytes(keys::CSD_0, Bytes::from_static(BASELINE_SPS))
}

fn aac_output() -> MediaFormat {
    MediaFormat::audio(mime::AUDIO_AAC, 44100, 2)
}

fn mpeg4_strategy() -> Arc<FixedStrategy> {
    Arc::new(FixedStrategy {
        supported: vec![mime::VIDEO_AVC.to_string()],
        video: Some(avc_output()),
        audio: Some(aac_output()),
    })
}

/// The audio encoder stops producing output after a few buffers, so video is the first track to
/// finish. The session completes at that point and the unfinished audio track is cut short.
#[test]
pub fn video_finishing_first_ends_session() -> Result<()> {
    let (transcoder, stats) = start_transcoder(
        BackendOptions {
            audio_encoder: CodecConfig {
                max_outputs: Some(3),
                ..Default::default()
            },
            video_encoder: CodecConfig {
                codec_config: Some(Bytes::from_static(BASELINE_SPS)),
                ..Default::default()
            },
            ..Default::default()
        },
        1,
    )?;
    let clip = Clip::builder(3)
        .rotation(90)
        .video(mime::VIDEO_AVC, 640, 360, 12, FRAME_INTERVAL_US)
        .pcm_audio(mime::AUDIO_AAC, 44100, 2, 1024, 20)
        .duration_us(Some(12 * FRAME_INTERVAL_US))
        .build();

    let (output, events) = transcode(&transcoder, clip.clone(), mpeg4_strategy())?;

    assert!(
        matches!(terminal(&events), SessionEvent::Completed),
        "{events:?}"
    );
    let record = output.record();
    assert_eq!(record.orientation_hint, Some(90));
    assert_eq!(record.tracks, vec![avc_output(), aac_output()]);

    let video: Vec<_> = record.track_samples(0).collect();
    let (last, frames) = video.split_last().expect("video samples");
    assert!(last.info.is_end_of_stream());
    let expected_timestamps: Vec<i64> = clip
        .track_samples(0)
        .map(|sample| sample.presentation_time_us)
        .collect();
    let timestamps: Vec<i64> = frames
        .iter()
        .map(|sample| sample.info.presentation_time_us)
        .collect();
    assert_eq!(timestamps, expected_timestamps);
    assert!(
        frames
            .iter()
            .all(|sample| sample.data[..] == sample.info.presentation_time_us.to_le_bytes())
    );

    let audio: Vec<_> = record.track_samples(1).collect();
    assert_eq!(audio.len(), 3);
    assert!(audio.iter().all(|sample| !sample.info.is_end_of_stream()));

    // decoder renders unrotated frames, the container rotates them
    let decoder_formats = stats.decoder_formats.lock().unwrap().clone();
    let video_decoder = decoder_formats
        .iter()
        .find(|format| format.mime == mime::VIDEO_AVC)
        .expect("video decoder");
    assert_eq!(video_decoder.integer(keys::ROTATION_DEGREES), Some(0));
    assert_eq!(*stats.frame_output_sizes.lock().unwrap(), vec![(360, 640)]);

    assert_eq!(BackendStats::get(&stats.codecs_created), 4);
    assert_eq!(BackendStats::get(&stats.codecs_stopped), 4);
    assert_eq!(BackendStats::get(&stats.frame_transfers_released), 1);
    assert_released(&stats);
    Ok(())
}

/// MPEG-4 only accepts Baseline AVC. The check runs once both encoders reported their formats.
#[test]
pub fn high_profile_avc_is_rejected_for_mpeg4() -> Result<()> {
    let (transcoder, stats) = start_transcoder(BackendOptions::default(), 1)?;
    let clip = Clip::builder(4)
        .video(mime::VIDEO_AVC, 640, 360, 30, FRAME_INTERVAL_US)
        .pcm_audio(mime::AUDIO_AAC, 44100, 2, 1024, 30)
        .build();
    let high_profile = MediaFormat::video(mime::VIDEO_AVC, 640, 360)
        .with_bytes(keys::CSD_0, Bytes::from_static(&[0, 0, 1, 0x67, 100, 0, 0x1f]));
    let strategy = Arc::new(FixedStrategy {
        video: Some(high_profile),
        ..(*mpeg4_strategy()).clone()
    });

    let (output, events) = transcode(&transcoder, clip, strategy)?;

    assert!(
        matches!(
            terminal(&events),
            SessionEvent::Failed(TranscodeError::Configuration(
                ConfigurationError::UnsupportedAvcProfile {
                    container: ContainerFormat::Mpeg4,
                    profile_idc: Some(100),
                }
            ))
        ),
        "{events:?}"
    );
    let record = output.record();
    assert!(!record.started && record.released);
    assert_released(&stats);
    Ok(())
}

/// Sessions on different workers keep their video surfaces apart.
#[test]
pub fn parallel_sessions() -> Result<()> {
    let (transcoder, stats) = start_transcoder(BackendOptions::default(), 3)?;
    let (sender, receiver) = unbounded();

    let sessions: Vec<(RecordingSink, Clip)> = (0..3)
        .map(|seed| {
            let clip = Clip::builder(seed)
                .video(mime::VIDEO_AVC, 320, 240, 10 + seed as usize, FRAME_INTERVAL_US)
                .build();
            (RecordingSink::default(), clip)
        })
        .collect();
    for (output, clip) in &sessions {
        let strategy = Arc::new(FixedStrategy {
            supported: vec![mime::VIDEO_VP8.to_string()],
            video: Some(MediaFormat::video(mime::VIDEO_VP8, 320, 240)),
            audio: None,
        });
        transcoder.execute(clip.clone(), output.clone(), strategy, sender.clone());
    }
    for _ in &sessions {
        let events = collect_events(&receiver, SESSION_TIMEOUT)?;
        assert!(matches!(terminal(&events), SessionEvent::Completed));
    }

    for (output, clip) in &sessions {
        let record = output.record();
        // every frame and the end of stream marker
        assert_eq!(
            record.track_samples(0).count(),
            clip.track_samples(0).count() + 1
        );
    }
    assert_released(&stats);
    Ok(())
}
