use anyhow::Result;
use bytes::Bytes;
use reencode::SessionEvent;
use reencode_core::{ContainerFormat, MediaFormat, codecs::mime};
use serde_json::json;

use crate::{BackendOptions, BackendStats, Clip, CodecConfig};

use super::{assert_released, pcm, progress, start_transcoder, strategy, terminal, transcode};

fn expected_down_mix(left: i16, right: i16) -> i16 {
    let a = i64::from(left) + 32768;
    let b = i64::from(right) + 32768;
    let mixed = if a < 32768 || b < 32768 {
        a * b / 32768
    } else {
        2 * (a + b) - a * b / 32768 - 65535
    };
    (mixed.clamp(0, 65535) - 32768) as i16
}

/// Stereo source down-mixed to mono. Encoder input buffers are smaller than decoded buffers,
/// so most of the audio goes through the overflow buffer.
#[test]
pub fn stereo_to_mono_down_mix() -> Result<()> {
    let (transcoder, stats) = start_transcoder(
        BackendOptions {
            audio_encoder: CodecConfig {
                input_slots: 2,
                input_capacity: 1500,
                codec_config: Some(Bytes::from_static(&[0x12, 0x10])),
                buffers_changed: true,
                ..Default::default()
            },
            ..Default::default()
        },
        1,
    )?;
    let clip = Clip::builder(1)
        .pcm_audio(mime::AUDIO_AAC, 44100, 2, 1024, 40)
        .duration_us(Some(40 * 1024 * 1_000_000 / 44100))
        .build();
    let strategy = strategy(json!({
        "supported": ["video/avc"],
        "video": null,
        "audio": {
            "mime": "audio/mp4a-latm",
            "attributes": {
                "sample-rate": 44100,
                "channel-count": 1,
                "bitrate": 128000,
            },
        },
    }))?;

    let (output, events) = transcode(&transcoder, clip.clone(), strategy)?;

    assert!(
        matches!(terminal(&events), SessionEvent::Completed),
        "{events:?}"
    );
    let progress = progress(&events);
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)), "{progress:?}");
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");

    let record = output.record();
    assert_eq!(record.container, Some(ContainerFormat::Mpeg4));
    assert!(record.started && record.stopped && record.released);
    assert_eq!(
        record.tracks,
        vec![MediaFormat::audio(mime::AUDIO_AAC, 44100, 1).with_int("bitrate", 128000)]
    );

    let expected: Vec<i16> = pcm(&clip.track_payload(0))
        .chunks_exact(2)
        .map(|frame| expected_down_mix(frame[0], frame[1]))
        .collect();
    assert_eq!(pcm(&record.track_payload(0)), expected);

    let samples: Vec<_> = record.track_samples(0).collect();
    assert!(
        samples
            .windows(2)
            .all(|w| w[0].info.presentation_time_us <= w[1].info.presentation_time_us)
    );
    let last = samples[samples.len() - 1];
    assert!(last.info.is_end_of_stream());
    assert!(last.data.is_empty());
    assert!(
        samples[..samples.len() - 1]
            .iter()
            .all(|sample| sample.data.len() <= 1500 && !sample.info.is_end_of_stream())
    );

    assert_eq!(BackendStats::get(&stats.codecs_created), 2);
    assert_eq!(BackendStats::get(&stats.codecs_stopped), 2);
    assert_released(&stats);
    Ok(())
}

/// Mono source up-mixed to stereo, with an unknown duration.
#[test]
pub fn mono_to_stereo_up_mix() -> Result<()> {
    let (transcoder, stats) = start_transcoder(BackendOptions::default(), 1)?;
    let clip = Clip::builder(2)
        .pcm_audio(mime::AUDIO_AAC, 48000, 1, 960, 25)
        .build();
    let strategy = strategy(json!({
        "supported": ["video/x-vnd.on2.vp8"],
        "audio": {
            "mime": "audio/opus",
            "attributes": { "sample-rate": 48000, "channel-count": 2 },
        },
    }))?;

    let (output, events) = transcode(&transcoder, clip.clone(), strategy)?;

    assert!(matches!(terminal(&events), SessionEvent::Completed));
    assert_eq!(progress(&events), vec![-1.0]);
    let expected: Vec<i16> = pcm(&clip.track_payload(0))
        .into_iter()
        .flat_map(|sample| [sample, sample])
        .collect();
    let record = output.record();
    assert_eq!(record.container, Some(ContainerFormat::WebM));
    assert_eq!(pcm(&record.track_payload(0)), expected);
    assert_released(&stats);
    Ok(())
}
