// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use crate::{
    container::{
        webm::{reader::TrackKind, WebmReader, WebmWriter},
        mp4::Mp4Writer,
        AudioTrackParams, ContainerWriter, Mp4Muxer, VideoTrackParams,
    },
    frame::EncodedFrame,
    tests::testing,
    types::{Timescale, CHANNELS, SAMPLE_RATE},
};

fn audio_params() -> AudioTrackParams {
    AudioTrackParams {
        timescale: Timescale::NANOSECONDS,
        sample_rate: SAMPLE_RATE,
        channels: CHANNELS,
        pre_skip: 312,
    }
}

fn video_params(timescale: Timescale) -> VideoTrackParams {
    VideoTrackParams {
        timescale,
        width: 640,
        height: 480,
        fourcc: "VP80",
        extra_data: None,
    }
}

fn frame(timestamp: u64, keyframe: bool, fill: u8) -> EncodedFrame {
    EncodedFrame {
        timestamp,
        data: vec![fill; 24],
        keyframe,
    }
}

#[test]
fn webm_output_can_be_demuxed_again() {
    testing::init();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.webm");

    let mut writer = WebmWriter::create(&path).unwrap();
    writer.set_audio_track(&audio_params()).unwrap();
    writer
        .set_video_track(&video_params(Timescale::NANOSECONDS))
        .unwrap();

    // 20 ms audio cadence against 40 ms video cadence, interleaved the way
    // the muxer would deliver them.
    for i in 0..50u64 {
        if i % 2 == 0 {
            writer
                .append_video(frame(i / 2 * 40_000_000, i == 0, 7))
                .unwrap();
        }
        writer.append_audio(frame(i * 20_000_000, true, 9)).unwrap();
    }
    writer.finalize().unwrap();

    let mut reader = WebmReader::open(&path).unwrap();
    let audio_track = reader.track_of_kind(TrackKind::Audio).unwrap().clone();
    let video_track = reader.track_of_kind(TrackKind::Video).unwrap().clone();
    assert_eq!(audio_track.codec_id, "A_OPUS");
    assert_eq!(video_track.codec_id, "V_VP8");

    // The Opus head carries the pre-skip.
    let head = audio_track.codec_private.as_deref().unwrap();
    assert!(head.starts_with(b"OpusHead"));
    assert_eq!(u16::from_le_bytes([head[10], head[11]]), 312);

    let mut audio_blocks = Vec::new();
    let mut video_blocks = Vec::new();
    while let Some(block) = reader.next_block().unwrap() {
        if block.track == audio_track.number {
            audio_blocks.push(block);
        } else {
            video_blocks.push(block);
        }
    }
    assert_eq!(audio_blocks.len(), 50);
    assert_eq!(video_blocks.len(), 25);

    // Millisecond granularity survives the container round trip.
    assert_eq!(audio_blocks[3].timestamp_ns, 60_000_000);
    assert_eq!(video_blocks[3].timestamp_ns, 120_000_000);
    assert_eq!(audio_blocks[0].data, vec![9u8; 24]);
    assert!(video_blocks[0].keyframe);
}

#[test]
fn webm_rejects_reordered_frames() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.webm");

    let mut writer = WebmWriter::create(&path).unwrap();
    writer.set_audio_track(&audio_params()).unwrap();
    writer.append_audio(frame(40_000_000, true, 1)).unwrap();
    assert!(writer.append_audio(frame(20_000_000, true, 1)).is_err());
}

#[test]
fn webm_clean_up_removes_the_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.webm");

    let mut writer = WebmWriter::create(&path).unwrap();
    writer.set_audio_track(&audio_params()).unwrap();
    writer.append_audio(frame(0, true, 1)).unwrap();
    writer.clean_up();
    assert!(!path.exists());
}

#[test]
fn simple_mp4_ends_with_the_movie_box() {
    testing::init();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.mp4");

    let mut writer = Mp4Writer::create(&path, Mp4Muxer::Simple, None).unwrap();
    writer
        .set_audio_track(&AudioTrackParams {
            timescale: Timescale::MP4_AUDIO,
            ..audio_params()
        })
        .unwrap();
    writer
        .set_video_track(&video_params(Timescale::MP4_VIDEO))
        .unwrap();

    for i in 0..10u64 {
        writer.append_audio(frame(i * 960, true, 2)).unwrap();
        writer.append_video(frame(i * 640, i == 0, 3)).unwrap();
    }
    writer.finalize().unwrap();

    let data = std::fs::read(&path).unwrap();
    assert_eq!(&data[4..8], b"ftyp");
    // moov is the final box.
    let moov_pos = find_box(&data, b"moov").unwrap();
    let mdat_pos = find_box(&data, b"mdat").unwrap();
    assert!(mdat_pos < moov_pos);
    let moov_size = u32::from_be_bytes(data[moov_pos - 4..moov_pos].try_into().unwrap()) as usize;
    assert_eq!(moov_pos - 4 + moov_size, data.len());
}

#[test]
fn faststart_mp4_puts_the_movie_box_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.mp4");

    let mut writer = Mp4Writer::create(&path, Mp4Muxer::Faststart, None).unwrap();
    writer
        .set_audio_track(&AudioTrackParams {
            timescale: Timescale::MP4_AUDIO,
            ..audio_params()
        })
        .unwrap();
    for i in 0..10u64 {
        writer.append_audio(frame(i * 960, true, 2)).unwrap();
    }
    writer.finalize().unwrap();

    let data = std::fs::read(&path).unwrap();
    let moov_pos = find_box(&data, b"moov").unwrap();
    let mdat_pos = find_box(&data, b"mdat").unwrap();
    assert!(moov_pos < mdat_pos);
    // The staging file is gone.
    assert!(std::fs::read_dir(dir.path())
        .unwrap()
        .all(|entry| entry.unwrap().path() == path));

    // The mdat payload is exactly the appended sample data.
    let mdat_size = u32::from_be_bytes(data[mdat_pos - 4..mdat_pos].try_into().unwrap()) as usize;
    assert_eq!(mdat_size, 8 + 10 * 24);
}

/// Byte offset of a top-level box's type tag.
fn find_box(data: &[u8], kind: &[u8; 4]) -> Option<usize> {
    let mut pos = 0;
    while pos + 8 <= data.len() {
        let size = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
        if &data[pos + 4..pos + 8] == kind {
            return Some(pos + 4);
        }
        if size < 8 {
            return None;
        }
        pos += size;
    }
    None
}
