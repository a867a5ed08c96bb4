// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::HashMap;

use crate::{
    composer::{blit, GridComposer, ParallelGridComposer, RegionComposer, VideoSources},
    frame::YuvImage,
    scaler::{FilterMode, PreserveAspectScaler},
    source::SourceKind,
    tests::testing,
    types::Resolution,
};

fn solid(width: u32, height: u32, luma: u8) -> YuvImage {
    let mut image = YuvImage::black(width, height);
    let (y, _, _) = image.planes_mut();
    y.fill(luma);
    image
}

fn luma_at(image: &YuvImage, x: u32, y: u32) -> u8 {
    image.y_plane()[(y * image.width() + x) as usize]
}

#[test]
fn scaling_preserves_the_aspect_ratio_with_black_bars() {
    testing::init();

    // A 100x100 source into a 160x90 cell: pillarboxed to 90x90.
    let mut scaler = PreserveAspectScaler::new(Resolution::new(160, 90), FilterMode::Box);
    let scaled = scaler.scale(&solid(100, 100, 200));

    assert_eq!(scaled.width(), 160);
    assert_eq!(scaled.height(), 90);
    // Bars on the left and right, content in the middle.
    assert_eq!(luma_at(scaled, 0, 45), 0);
    assert_eq!(luma_at(scaled, 159, 45), 0);
    assert_eq!(luma_at(scaled, 80, 45), 200);
}

#[test]
fn scaling_upscales_small_sources() {
    let mut scaler = PreserveAspectScaler::new(Resolution::new(320, 240), FilterMode::Bilinear);
    let scaled = scaler.scale(&solid(160, 120, 120));
    // Same aspect ratio: the whole cell is content.
    assert_eq!(luma_at(scaled, 0, 0), 120);
    assert_eq!(luma_at(scaled, 319, 239), 120);
    assert_eq!(luma_at(scaled, 160, 120), 120);
}

#[test]
fn nearest_and_box_filters_keep_solid_frames_solid() {
    for filter in [FilterMode::Nearest, FilterMode::Box] {
        let mut scaler = PreserveAspectScaler::new(Resolution::new(64, 48), filter);
        let scaled = scaler.scale(&solid(640, 480, 77));
        assert_eq!(luma_at(scaled, 32, 24), 77);
    }
}

#[test]
fn blit_copies_into_the_target_rectangle() {
    let mut dst = YuvImage::black(64, 64);
    let src = solid(16, 16, 250);
    blit(&mut dst, &src, 32, 16);

    assert_eq!(luma_at(&dst, 32, 16), 250);
    assert_eq!(luma_at(&dst, 47, 31), 250);
    assert_eq!(luma_at(&dst, 31, 16), 0);
    assert_eq!(luma_at(&dst, 32, 32), 0);
    // Chroma stays neutral.
    assert!(dst.u_plane().iter().all(|&u| u == 128));
}

#[test]
fn grid_composer_places_each_source_in_its_cell() {
    let mut composer = GridComposer::new(Resolution::new(640, 480), 4, 0, FilterMode::Box);
    let mut scratch = YuvImage::black(640, 480);

    let a = solid(320, 240, 100);
    let b = solid(320, 240, 180);
    composer.compose(&mut scratch, &[Some(&a), None, Some(&b), None]);

    // 2x2 grid: a top-left, b bottom-left, the rest black.
    assert_eq!(luma_at(&scratch, 160, 120), 100);
    assert_eq!(luma_at(&scratch, 480, 120), 0);
    assert_eq!(luma_at(&scratch, 160, 360), 180);
    assert_eq!(luma_at(&scratch, 480, 360), 0);
}

#[test]
fn parallel_grid_composer_matches_the_serial_one() {
    let resolution = Resolution::new(640, 480);
    let sources: Vec<YuvImage> = (0..5u8)
        .map(|i| solid(320, 240, 40 + i * 30))
        .collect();
    let images: Vec<Option<&YuvImage>> = sources.iter().map(Some).collect();

    let mut serial = GridComposer::new(resolution, 5, 0, FilterMode::Box);
    let mut parallel = ParallelGridComposer::new(resolution, 5, 0, FilterMode::Box);

    let mut scratch_serial = YuvImage::black(640, 480);
    let mut scratch_parallel = YuvImage::black(640, 480);
    serial.compose(&mut scratch_serial, &images);
    parallel.compose(&mut scratch_parallel, &images);

    assert_eq!(scratch_serial, scratch_parallel);
}

#[test]
fn region_composer_switches_sources_at_the_scheduled_time() {
    testing::init();

    let (catalog, ids) = testing::catalog(&[
        ("a", 0.0, 5.0, SourceKind::Video),
        ("b", 10.0, 15.0, SourceKind::Video),
    ]);
    let layout = testing::compiled(&[], vec![testing::region(&ids)], false, &catalog);

    let mut decoders = HashMap::new();
    decoders.insert(
        ids[0],
        testing::SolidVideoDecoder::boxed(Resolution::new(640, 480), 100),
    );
    decoders.insert(
        ids[1],
        testing::SolidVideoDecoder::boxed(Resolution::new(640, 480), 200),
    );
    let mut sources = VideoSources::new(decoders);

    let mut composer = RegionComposer::new(&layout.regions, FilterMode::Box);
    let mut scratch = YuvImage::black(640, 480);

    composer.compose_at(testing::secs(1), &mut scratch, &mut sources).unwrap();
    let region = &layout.regions[0];
    let cell = &region.cells[region.sequence[0].cell_index];
    let probe_x = cell.position.x + cell.resolution.width / 2;
    let probe_y = cell.position.y + cell.resolution.height / 2;
    assert_eq!(luma_at(&scratch, probe_x, probe_y), 100);

    // Dead air: the cell expired, nothing is drawn.
    scratch.fill_black();
    composer.compose_at(testing::secs(7), &mut scratch, &mut sources).unwrap();
    assert!(scratch.y_plane().iter().all(|&y| y == 0));

    // The second source took over.
    scratch.fill_black();
    composer.compose_at(testing::secs(12), &mut scratch, &mut sources).unwrap();
    let cell = &region.cells[region.sequence[1].cell_index];
    let probe_x = cell.position.x + cell.resolution.width / 2;
    let probe_y = cell.position.y + cell.resolution.height / 2;
    assert_eq!(luma_at(&scratch, probe_x, probe_y), 200);
}
