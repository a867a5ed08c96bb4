// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::fs;

use compositor::{ContainerFormat, Resolution, Reuse, SourceKind};
use recording_compose::metadata;

fn write(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn session_metadata_is_loaded_with_relative_media_paths() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "report.json",
        r#"{
            "recording_id": "rec-1",
            "created_at": "2026-08-01T10:00:00Z",
            "archives": [
                {
                    "path": "archive_a.webm",
                    "connection_id": "a",
                    "start_time_offset": 0.0,
                    "stop_time_offset": 10.0
                },
                {
                    "path": "archive_b.webm",
                    "connection_id": "b",
                    "start_time_offset": 2.5,
                    "stop_time_offset": 12.0
                }
            ]
        }"#,
    );

    let (recording_id, archives) = metadata::load_session(&path).unwrap();
    assert_eq!(recording_id, "rec-1");
    assert_eq!(archives.len(), 2);
    assert_eq!(archives[0].path, dir.path().join("archive_a.webm"));
    assert_eq!(archives[1].connection_id, "b");
    assert_eq!(archives[1].start_time_offset, 2.5);
}

#[test]
fn session_without_archives_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "report.json",
        r#"{"recording_id": "rec-1", "archives": []}"#,
    );
    assert!(metadata::load_session(&path).is_err());
}

#[test]
fn implicit_layout_builds_a_grid_over_all_archives() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "report.json",
        r#"{
            "recording_id": "rec-2",
            "archives": [
                {"path": "a.webm", "connection_id": "a", "start_time_offset": 0.0, "stop_time_offset": 5.0},
                {"path": "b.webm", "connection_id": "b", "start_time_offset": 1.0, "stop_time_offset": 6.0},
                {"path": "c.webm", "connection_id": "c", "start_time_offset": 2.0, "stop_time_offset": 7.0}
            ]
        }"#,
    );

    let input = metadata::from_session(&path, false).unwrap();
    assert_eq!(input.description.audio_sources.len(), 3);
    assert_eq!(input.description.regions.len(), 1);
    assert_eq!(input.description.regions[0].video_sources.len(), 3);
    // Three sources need a 2x2 grid of 320x240 cells.
    assert_eq!(input.description.resolution, Resolution::new(640, 480));
    assert_eq!(input.catalog.of_kind(SourceKind::Video).count(), 3);

    let audio_only = metadata::from_session(&path, true).unwrap();
    assert!(audio_only.description.regions.is_empty());
}

#[test]
fn layout_json_is_resolved_into_a_description() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a", "b"] {
        write(
            dir.path(),
            &format!("archive_{name}.json"),
            &format!(
                r#"{{
                    "path": "{name}.webm",
                    "connection_id": "{name}",
                    "start_time_offset": 0.0,
                    "stop_time_offset": 8.0
                }}"#
            ),
        );
    }
    let layout_path = write(
        dir.path(),
        "layout.json",
        r#"{
            "format": "mp4",
            "bitrate": 500,
            "resolution": "1280x720",
            "trim": false,
            "audio_sources": ["archive_a.json", "archive_b.json"],
            "video_layout": {
                "main": {
                    "width": 1280,
                    "height": 720,
                    "z_pos": 1,
                    "max_columns": 2,
                    "cells_excluded": [0],
                    "reuse": "show_newest",
                    "video_sources": ["archive_a.json", "archive_b.json"]
                }
            }
        }"#,
    );

    let input = metadata::from_layout(&layout_path).unwrap();
    assert_eq!(input.format, Some(ContainerFormat::Mp4));
    assert_eq!(input.recording_id, "layout");
    assert!(!input.description.trim);
    assert_eq!(input.description.bitrate_kbps, 500);
    assert_eq!(input.description.resolution, Resolution::new(1280, 720));

    let region = &input.description.regions[0];
    assert_eq!(region.name, "main");
    assert_eq!(region.z_index, 1);
    assert_eq!(region.max_columns, 2);
    assert_eq!(region.cells_excluded, vec![0]);
    assert_eq!(region.reuse, Reuse::ShowNewest);
    assert_eq!(region.video_sources.len(), 2);

    // The whole thing compiles against the loaded catalog.
    let layout = compositor::layout::compile(&input.description, &input.catalog).unwrap();
    assert_eq!(layout.regions.len(), 1);
}

#[test]
fn screen_capture_is_stacked_on_top() {
    let dir = tempfile::tempdir().unwrap();
    let session = write(
        dir.path(),
        "report.json",
        r#"{
            "recording_id": "rec-3",
            "archives": [
                {"path": "a.webm", "connection_id": "a", "start_time_offset": 0.0, "stop_time_offset": 5.0}
            ]
        }"#,
    );
    let capture = write(
        dir.path(),
        "screen.json",
        r#"{
            "recording_id": "rec-3-screen",
            "archives": [
                {"path": "s.webm", "connection_id": "screen-1", "start_time_offset": 1.0, "stop_time_offset": 4.0},
                {"path": "t.webm", "connection_id": "screen-2", "start_time_offset": 2.0, "stop_time_offset": 3.0}
            ]
        }"#,
    );

    let mut input = metadata::from_session(&session, false).unwrap();
    metadata::add_screen_capture(&mut input, &capture, Some("screen-1")).unwrap();

    let screen = input.description.regions.last().unwrap();
    assert_eq!(screen.name, "screen-capture");
    assert_eq!(screen.video_sources.len(), 1);
    assert!(screen.z_index > input.description.regions[0].z_index);

    // Unknown connection ids are an error.
    assert!(metadata::add_screen_capture(&mut input, &capture, Some("nope")).is_err());
}

#[test]
fn malformed_json_is_a_readable_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "broken.json", "{");
    let error = metadata::load_session(&path).unwrap_err();
    assert!(error.to_string().contains("broken.json"));
}
