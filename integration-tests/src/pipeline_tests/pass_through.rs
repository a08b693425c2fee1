use anyhow::Result;
use reencode::SessionEvent;
use reencode_core::{BufferFlags, ContainerFormat, codecs::mime};
use serde_json::json;

use crate::{BackendOptions, BackendStats, Clip, SinkRecord};

use super::{assert_released, pcm, start_transcoder, strategy, terminal, transcode};

fn assert_copied(record: &SinkRecord, clip: &Clip, track_index: usize) {
    let written: Vec<_> = record.track_samples(0).collect();
    let (last, copied) = written.split_last().expect("copied samples");
    assert!(last.info.is_end_of_stream() && last.data.is_empty());

    let source: Vec<_> = clip.track_samples(track_index).collect();
    assert_eq!(copied.len(), source.len());
    for (copied, source) in copied.iter().zip(source) {
        assert_eq!(copied.data, source.data);
        assert_eq!(copied.info.presentation_time_us, source.presentation_time_us);
        assert_eq!(
            copied.info.flags.contains(BufferFlags::KEY_FRAME),
            source.flags.contains(BufferFlags::KEY_FRAME)
        );
    }
}

/// Video is copied as is while audio is up-mixed. The copied track ends together with the source,
/// which also ends the session before audio reports its end of stream.
#[test]
pub fn copied_video_with_transcoded_audio() -> Result<()> {
    let (transcoder, stats) = start_transcoder(BackendOptions::default(), 1)?;
    let clip = Clip::builder(5)
        .video(mime::VIDEO_VP8, 320, 240, 45, 33_333)
        .pcm_audio("audio/vorbis", 48000, 1, 960, 20)
        .build();
    let strategy = strategy(json!({
        "supported": ["video/x-vnd.on2.vp8"],
        "video": null,
        "audio": {
            "mime": "audio/opus",
            "attributes": { "sample-rate": 48000, "channel-count": 2 },
        },
    }))?;

    let (output, events) = transcode(&transcoder, clip.clone(), strategy)?;

    assert!(
        matches!(terminal(&events), SessionEvent::Completed),
        "{events:?}"
    );
    let record = output.record();
    assert_eq!(record.container, Some(ContainerFormat::WebM));
    assert_eq!(record.tracks[0], clip.tracks[0]);
    assert_copied(&record, &clip, 0);

    let audio_track = record.track_index("audio/opus").expect("audio track");
    let up_mixed: Vec<i16> = pcm(&clip.track_payload(1))
        .into_iter()
        .flat_map(|sample| [sample, sample])
        .collect();
    let written = pcm(&record.track_payload(audio_track));
    assert!(!written.is_empty());
    assert!(up_mixed.starts_with(&written));

    // decoder and encoder of the audio track only
    assert_eq!(BackendStats::get(&stats.codecs_created), 2);
    assert_released(&stats);
    Ok(())
}

/// Copied tracks are stored even when the container would not accept them from an encoder.
#[test]
pub fn copied_track_skips_container_checks() -> Result<()> {
    let (transcoder, stats) = start_transcoder(BackendOptions::default(), 1)?;
    let clip = Clip::builder(6)
        .video(mime::VIDEO_VP9, 320, 240, 20, 40_000)
        .pcm_audio(mime::AUDIO_AAC, 44100, 2, 1024, 10)
        .build();
    let strategy = strategy(json!({
        "supported": ["video/avc"],
        "audio": {
            "mime": "audio/mp4a-latm",
            "attributes": { "sample-rate": 44100, "channel-count": 2 },
        },
    }))?;

    let (output, events) = transcode(&transcoder, clip.clone(), strategy)?;

    assert!(
        matches!(terminal(&events), SessionEvent::Completed),
        "{events:?}"
    );
    let record = output.record();
    assert_eq!(record.container, Some(ContainerFormat::Mpeg4));
    assert_eq!(record.tracks[0].mime, mime::VIDEO_VP9);
    assert_copied(&record, &clip, 0);
    assert_released(&stats);
    Ok(())
}
