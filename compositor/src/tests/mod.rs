// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

mod composer;
mod container;
mod interval;
mod layout;

pub mod testing {

    use std::{collections::HashMap, sync::Arc};

    use parking_lot::Mutex;

    use crate::{
        codec::{
            AudioDecoder, AudioEncoder, AudioTimestamps, VideoCodec, VideoDecoder, VideoEncoder,
            VideoTimestamps,
        },
        composer::{ComposerKind, VideoSources},
        container::{AudioTrackParams, ContainerWriter, VideoTrackParams},
        error::{Error, Result},
        filler::Filler,
        frame::{EncodedFrame, PcmBlock, YuvImage},
        layout::{
            compile, CompiledLayout, LayoutDescription, RegionDescription, Reuse,
        },
        muxer::Muxer,
        producer::{AudioProducer, AudioSource, VideoProducer},
        queue::frame_queue,
        scaler::FilterMode,
        source::{ArchiveItem, SourceCatalog, SourceId, SourceKind},
        types::{
            FrameRate, Position, Resolution, Timescale, TimescaleRatio, CHANNELS,
            NANOS_PER_SECOND, SAMPLES_PER_BLOCK, SAMPLE_RATE,
        },
    };

    /// Output resolution used by most tests.
    pub const RESOLUTION: Resolution = Resolution {
        width: 640,
        height: 480,
    };

    /// Pre-skip reported by the synthetic audio encoder.
    pub const TEST_PRE_SKIP: u32 = 312;

    /// initialize logging for testing
    pub fn init() {
        env_logger::builder().is_test(true).try_init().ok();
    }

    /// Build a catalog from `(connection_id, start_s, stop_s, kind)` tuples.
    pub fn catalog(items: &[(&str, f64, f64, SourceKind)]) -> (SourceCatalog, Vec<SourceId>) {
        let mut catalog = SourceCatalog::default();
        let ids = items
            .iter()
            .map(|(connection_id, start, stop, kind)| {
                catalog
                    .add(
                        *kind,
                        &ArchiveItem {
                            path: format!("{connection_id}.webm").into(),
                            connection_id: (*connection_id).to_string(),
                            start_time_offset: *start,
                            stop_time_offset: *stop,
                        },
                    )
                    .unwrap()
            })
            .collect();
        (catalog, ids)
    }

    /// A full-frame region at z = 0.
    pub fn region(sources: &[SourceId]) -> RegionDescription {
        RegionDescription {
            name: "grid".to_string(),
            position: Position::default(),
            z_index: 0,
            width: 0,
            height: 0,
            max_columns: 0,
            max_rows: 0,
            cells_excluded: Vec::new(),
            reuse: Reuse::ShowOldest,
            video_sources: sources.to_vec(),
        }
    }

    pub fn layout_description(
        audio_sources: &[SourceId],
        regions: Vec<RegionDescription>,
        trim: bool,
    ) -> LayoutDescription {
        LayoutDescription {
            resolution: RESOLUTION,
            trim,
            bitrate_kbps: 0,
            audio_sources: audio_sources.to_vec(),
            regions,
        }
    }

    pub fn compiled(
        audio_sources: &[SourceId],
        regions: Vec<RegionDescription>,
        trim: bool,
        catalog: &SourceCatalog,
    ) -> CompiledLayout {
        compile(&layout_description(audio_sources, regions, trim), catalog).unwrap()
    }

    /// Video decoder producing a solid image of the given luma.
    #[derive(Debug)]
    pub struct SolidVideoDecoder {
        image: YuvImage,
    }

    impl SolidVideoDecoder {
        pub fn new(resolution: Resolution, luma: u8) -> Self {
            let mut image = YuvImage::black(resolution.width, resolution.height);
            let (y, _, _) = image.planes_mut();
            y.fill(luma);
            Self { image }
        }

        pub fn boxed(resolution: Resolution, luma: u8) -> Box<dyn VideoDecoder> {
            Box::new(Self::new(resolution, luma))
        }
    }

    impl VideoDecoder for SolidVideoDecoder {
        fn get_image(&mut self, _t: u64) -> Result<&YuvImage> {
            Ok(&self.image)
        }
    }

    /// Audio decoder yielding a constant sample value for a fixed duration.
    #[derive(Debug)]
    pub struct ConstAudioDecoder {
        value: i16,
        blocks_left: u64,
    }

    impl ConstAudioDecoder {
        pub fn new(value: i16, duration_s: f64) -> Self {
            let samples = (duration_s * f64::from(SAMPLE_RATE)).round() as u64;
            Self {
                value,
                blocks_left: samples / SAMPLES_PER_BLOCK as u64,
            }
        }

        pub fn boxed(value: i16, duration_s: f64) -> Box<dyn AudioDecoder> {
            Box::new(Self::new(value, duration_s))
        }
    }

    impl AudioDecoder for ConstAudioDecoder {
        fn read_block(&mut self) -> Result<Option<PcmBlock>> {
            if self.blocks_left == 0 {
                return Ok(None);
            }
            self.blocks_left -= 1;
            Ok(Some(PcmBlock::from_samples(vec![
                self.value;
                SAMPLES_PER_BLOCK * CHANNELS as usize
            ])))
        }
    }

    /// Video "encoder" that records a tiny digest of each frame: the luma
    /// of the frame center and of the top-left corner.
    pub struct DigestVideoEncoder {
        timestamps: VideoTimestamps,
        sender: crate::queue::FrameSender,
    }

    impl DigestVideoEncoder {
        pub fn boxed(
            timescale: Timescale,
            fps: FrameRate,
            sender: crate::queue::FrameSender,
        ) -> Box<dyn VideoEncoder> {
            Box::new(Self {
                timestamps: VideoTimestamps::new(timescale, fps),
                sender,
            })
        }
    }

    impl VideoEncoder for DigestVideoEncoder {
        fn encode(&mut self, image: &YuvImage) -> Result<()> {
            let y = image.y_plane();
            let center = y[(image.height() / 2 * image.width() + image.width() / 2) as usize];
            let frame = EncodedFrame {
                timestamp: self.timestamps.next(),
                data: vec![center, y[0]],
                keyframe: true,
            };
            if !self.sender.push(frame) {
                return Err(Error::Encode("the video queue is closed".to_string()));
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn codec(&self) -> VideoCodec {
            VideoCodec::Vp8
        }

        fn extra_data(&self) -> Option<&[u8]> {
            None
        }
    }

    /// Audio "encoder" that stores each mixed block verbatim (little-endian
    /// i16), so tests can assert on the mixed PCM.
    pub struct PcmAudioEncoder {
        timestamps: AudioTimestamps,
        sender: crate::queue::FrameSender,
    }

    impl PcmAudioEncoder {
        pub fn boxed(
            timescale: Timescale,
            sender: crate::queue::FrameSender,
        ) -> Box<dyn AudioEncoder> {
            Box::new(Self {
                timestamps: AudioTimestamps::new(timescale),
                sender,
            })
        }
    }

    impl AudioEncoder for PcmAudioEncoder {
        fn encode(&mut self, block: &PcmBlock) -> Result<()> {
            let mut data = Vec::with_capacity(block.samples.len() * 2);
            for sample in &block.samples {
                data.extend_from_slice(&sample.to_le_bytes());
            }
            let frame = EncodedFrame {
                timestamp: self.timestamps.next(),
                data,
                keyframe: true,
            };
            if !self.sender.push(frame) {
                return Err(Error::Encode("the audio queue is closed".to_string()));
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn skip(&self) -> u32 {
            TEST_PRE_SKIP
        }
    }

    /// Everything a [`TestContainer`] captured during one run.
    #[derive(Debug, Default)]
    pub struct Captured {
        pub audio_params: Option<AudioTrackParams>,
        pub video_params: Option<VideoTrackParams>,
        pub audio: Vec<EncodedFrame>,
        pub video: Vec<EncodedFrame>,
        pub finalized: bool,
        pub cleaned_up: bool,
    }

    impl Captured {
        /// Decode the PCM digest of one captured audio frame.
        pub fn audio_samples(&self, index: usize) -> Vec<i16> {
            self.audio[index]
                .data
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect()
        }
    }

    /// Container capturing everything in memory.
    #[derive(Debug)]
    pub struct TestContainer {
        captured: Arc<Mutex<Captured>>,
    }

    impl TestContainer {
        pub fn new() -> (Self, Arc<Mutex<Captured>>) {
            let captured = Arc::new(Mutex::new(Captured::default()));
            (
                Self {
                    captured: captured.clone(),
                },
                captured,
            )
        }
    }

    impl ContainerWriter for TestContainer {
        fn set_audio_track(&mut self, params: &AudioTrackParams) -> Result<()> {
            self.captured.lock().audio_params = Some(*params);
            Ok(())
        }

        fn set_video_track(&mut self, params: &VideoTrackParams) -> Result<()> {
            self.captured.lock().video_params = Some(params.clone());
            Ok(())
        }

        fn append_audio(&mut self, frame: EncodedFrame) -> Result<()> {
            let mut captured = self.captured.lock();
            if captured
                .audio
                .last()
                .is_some_and(|last| frame.timestamp < last.timestamp)
            {
                return Err(Error::Mux("audio out of order".to_string()));
            }
            captured.audio.push(frame);
            Ok(())
        }

        fn append_video(&mut self, frame: EncodedFrame) -> Result<()> {
            let mut captured = self.captured.lock();
            if captured
                .video
                .last()
                .is_some_and(|last| frame.timestamp < last.timestamp)
            {
                return Err(Error::Mux("video out of order".to_string()));
            }
            captured.video.push(frame);
            Ok(())
        }

        fn finalize(&mut self) -> Result<()> {
            self.captured.lock().finalized = true;
            Ok(())
        }

        fn clean_up(&mut self) {
            self.captured.lock().cleaned_up = true;
        }
    }

    /// Run a full composition over synthetic codecs and capture the output.
    ///
    /// `video_decoders` may be empty for an audio-only run.
    pub fn run_composition(
        layout: &CompiledLayout,
        video_decoders: HashMap<SourceId, Box<dyn VideoDecoder>>,
        audio_decoders: Vec<(SourceId, Box<dyn AudioDecoder>)>,
        fps: FrameRate,
    ) -> Result<Arc<Mutex<Captured>>> {
        let timescale = Timescale::NANOSECONDS;
        let audio_only = video_decoders.is_empty();

        let (audio_sender, audio_receiver) = frame_queue(64);
        let audio_encoder = PcmAudioEncoder::boxed(timescale, audio_sender);
        let pre_skip = audio_encoder.skip();

        let mut audio_sources = Vec::new();
        for (id, decoder) in audio_decoders {
            audio_sources.push(AudioSource {
                id,
                interval: layout.catalog.get(id)?.interval,
                decoder,
            });
        }

        let (container, captured) = TestContainer::new();
        let mut container: Box<dyn ContainerWriter> = Box::new(container);
        container.set_audio_track(&AudioTrackParams {
            timescale,
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            pre_skip,
        })?;

        let (video_sender, video_receiver) = frame_queue(64);
        let video_handle = if audio_only {
            drop(video_sender);
            VideoProducer::none(video_receiver)
        } else {
            container.set_video_track(&VideoTrackParams {
                timescale,
                width: layout.resolution.width,
                height: layout.resolution.height,
                fourcc: "VP80",
                extra_data: None,
            })?;
            let encoder = DigestVideoEncoder::boxed(timescale, fps, video_sender);
            VideoProducer::new(
                layout,
                ComposerKind::Region,
                FilterMode::Box,
                VideoSources::new(video_decoders),
                encoder,
                fps,
            )?
            .spawn(video_receiver)
        };

        let audio_handle = AudioProducer::new(
            audio_sources,
            audio_encoder,
            layout.audio_max_end_time,
            Filler::new(layout.resolution),
        )
        .spawn(audio_receiver);

        Muxer::new(
            container,
            audio_handle,
            video_handle,
            TimescaleRatio::new(timescale, timescale),
            None,
        )
        .run()?;

        Ok(captured)
    }

    /// Seconds to session nanoseconds.
    pub fn secs(s: u64) -> u64 {
        s * NANOS_PER_SECOND
    }
}
