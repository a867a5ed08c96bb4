// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! MP4 writer with two strategies: `simple` streams the media data first and
//! appends `moov` at the end; `faststart` stages the media data in a
//! temporary file and writes `moov` before it, so playback can begin while
//! the file is still downloading.
//!
//! Sample tables are kept in memory (a few dozen bytes per sample); the
//! media data itself is streamed to disk.

use std::{
    fs::File,
    io::{BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use crate::{
    container::{AudioTrackParams, ContainerWriter, Mp4Muxer, VideoTrackParams},
    error::{Error, Result},
    frame::EncodedFrame,
};

/// Movie-level timescale (milliseconds).
const MOVIE_TIMESCALE: u32 = 1000;

/// Writes the composed output as an MP4 file.
pub struct Mp4Writer {
    path: PathBuf,
    mode: Mp4Muxer,
    /// Media staging: the output file itself in simple mode, the temp file
    /// in faststart mode.
    media: Option<BufWriter<File>>,
    temp_path: Option<PathBuf>,
    /// Offset of the `mdat` size field in simple mode.
    mdat_size_pos: u64,
    media_written: u64,
    audio: Option<TrackState>,
    video: Option<TrackState>,
    audio_params: Option<AudioTrackParams>,
    video_params: Option<VideoTrackParams>,
    closed: bool,
}

impl std::fmt::Debug for Mp4Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mp4Writer")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

#[derive(Debug, Default)]
struct TrackState {
    /// Offset of each sample relative to the start of the media data.
    offsets: Vec<u64>,
    sizes: Vec<u32>,
    timestamps: Vec<u64>,
    /// 1-based indices of sync samples.
    sync_samples: Vec<u32>,
    last_timestamp: Option<u64>,
}

impl TrackState {
    fn push(&mut self, offset: u64, frame: &EncodedFrame) {
        self.offsets.push(offset);
        self.sizes.push(frame.data.len() as u32);
        self.timestamps.push(frame.timestamp);
        if frame.keyframe {
            self.sync_samples.push(self.timestamps.len() as u32);
        }
        self.last_timestamp = Some(frame.timestamp);
    }

    /// Per-sample durations in track ticks; the final sample reuses the
    /// previous duration (or `fallback` when it is the only one).
    fn durations(&self, fallback: u64) -> Vec<u64> {
        let mut durations: Vec<u64> = self
            .timestamps
            .windows(2)
            .map(|pair| pair[1].saturating_sub(pair[0]))
            .collect();
        durations.push(durations.last().copied().unwrap_or(fallback));
        durations
    }
}

impl Mp4Writer {
    /// Open the output (and the faststart temp file when requested).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] when either file cannot be created.
    pub fn create(path: &Path, mode: Mp4Muxer, temp_dir: Option<&Path>) -> Result<Self> {
        let (media, temp_path, mdat_size_pos) = match mode {
            Mp4Muxer::Simple => {
                let file = File::create(path).map_err(|e| {
                    Error::Setup(format!("unable to create '{}': {e}", path.display()))
                })?;
                let mut out = BufWriter::new(file);
                let ftyp = ftyp_box();
                out.write_all(&ftyp)
                    .map_err(|e| Error::io(path.to_path_buf(), e))?;
                // mdat with a size patched on finalize.
                let mdat_size_pos = ftyp.len() as u64;
                out.write_all(&0u32.to_be_bytes())
                    .map_err(|e| Error::io(path.to_path_buf(), e))?;
                out.write_all(b"mdat")
                    .map_err(|e| Error::io(path.to_path_buf(), e))?;
                (out, None, mdat_size_pos)
            }
            Mp4Muxer::Faststart => {
                let dir = temp_dir
                    .map(Path::to_path_buf)
                    .or_else(|| path.parent().map(Path::to_path_buf))
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .unwrap_or_else(|| PathBuf::from("."));
                if !dir.is_dir() {
                    return Err(Error::Setup(format!(
                        "faststart temp directory '{}' does not exist",
                        dir.display()
                    )));
                }
                let temp_path = dir.join(format!(
                    "{}.mdat.tmp",
                    path.file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "out".to_string())
                ));
                let file = File::create(&temp_path).map_err(|e| {
                    Error::Setup(format!("unable to create '{}': {e}", temp_path.display()))
                })?;
                (BufWriter::new(file), Some(temp_path), 0)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            media: Some(media),
            temp_path,
            mdat_size_pos,
            media_written: 0,
            audio: None,
            video: None,
            audio_params: None,
            video_params: None,
            closed: false,
        })
    }

    fn append(&mut self, frame: EncodedFrame, is_video: bool) -> Result<()> {
        let path = self.path.clone();
        let offset = self.media_written;
        let out = self
            .media
            .as_mut()
            .ok_or_else(|| Error::Mux("the MP4 file is already closed".to_string()))?;
        out.write_all(&frame.data)
            .map_err(|e| Error::io(path, e))?;
        self.media_written += frame.data.len() as u64;

        let track = if is_video {
            self.video.get_or_insert_with(TrackState::default)
        } else {
            self.audio.get_or_insert_with(TrackState::default)
        };
        track.push(offset, &frame);
        Ok(())
    }

    fn build_moov(&self, media_base: u64) -> Result<Vec<u8>> {
        let mut tracks = Vec::new();
        let mut duration_ms: u64 = 0;
        let mut track_id = 1;

        if let (Some(track), Some(params)) = (&self.audio, &self.audio_params) {
            let timescale = params.timescale.0 as u32;
            // One mixed block per sample.
            let fallback = u64::from(params.timescale.0) * 960 / 48_000;
            let track_duration = track_duration(track, fallback);
            duration_ms = duration_ms.max(scale(track_duration, timescale, MOVIE_TIMESCALE));
            tracks.push(trak_box(
                track_id,
                timescale,
                track_duration,
                &audio_sample_entry(params),
                track,
                media_base,
                fallback,
                false,
                0,
                0,
            ));
            track_id += 1;
        }
        if let (Some(track), Some(params)) = (&self.video, &self.video_params) {
            let timescale = params.timescale.0 as u32;
            let fallback = track
                .timestamps
                .get(1)
                .copied()
                .unwrap_or(u64::from(timescale));
            let track_duration = track_duration(track, fallback);
            duration_ms = duration_ms.max(scale(track_duration, timescale, MOVIE_TIMESCALE));
            tracks.push(trak_box(
                track_id,
                timescale,
                track_duration,
                &video_sample_entry(params)?,
                track,
                media_base,
                fallback,
                true,
                params.width,
                params.height,
            ));
        }

        let mut moov_payload = mvhd_box(duration_ms, track_id + 1);
        for track in tracks {
            moov_payload.extend_from_slice(&track);
        }
        Ok(mp4_box(b"moov", &moov_payload))
    }
}

impl ContainerWriter for Mp4Writer {
    fn set_audio_track(&mut self, params: &AudioTrackParams) -> Result<()> {
        self.audio_params = Some(*params);
        Ok(())
    }

    fn set_video_track(&mut self, params: &VideoTrackParams) -> Result<()> {
        self.video_params = Some(params.clone());
        Ok(())
    }

    fn append_audio(&mut self, frame: EncodedFrame) -> Result<()> {
        if self.audio_params.is_none() {
            return Err(Error::Mux("no audio track declared".to_string()));
        }
        let last = self.audio.as_ref().and_then(|t| t.last_timestamp);
        if last.is_some_and(|last| frame.timestamp < last) {
            return Err(Error::Mux(format!(
                "audio timestamp {} is behind {}",
                frame.timestamp,
                last.unwrap_or(0)
            )));
        }
        self.append(frame, false)
    }

    fn append_video(&mut self, frame: EncodedFrame) -> Result<()> {
        let Some(params) = &mut self.video_params else {
            return Err(Error::Mux("no video track declared".to_string()));
        };
        // AVC parameter sets travel inside the first keyframe; lift them
        // into the decoder configuration record for the sample entry.
        if params.fourcc == "avc1" && params.extra_data.is_none() {
            params.extra_data = avc_configuration_from_sample(&frame.data);
        }
        let last = self.video.as_ref().and_then(|t| t.last_timestamp);
        if last.is_some_and(|last| frame.timestamp < last) {
            return Err(Error::Mux(format!(
                "video timestamp {} is behind {}",
                frame.timestamp,
                last.unwrap_or(0)
            )));
        }
        self.append(frame, true)
    }

    fn finalize(&mut self) -> Result<()> {
        let path = self.path.clone();
        let mut media = self
            .media
            .take()
            .ok_or_else(|| Error::Mux("the MP4 file is already closed".to_string()))?;

        match self.mode {
            Mp4Muxer::Simple => {
                // Patch the mdat size, then append moov.
                let mdat_size = 8 + self.media_written;
                if mdat_size > u64::from(u32::MAX) {
                    return Err(Error::Mux("mdat exceeds 4 GiB".to_string()));
                }
                media.flush().map_err(|e| Error::io(path.clone(), e))?;
                media
                    .seek(SeekFrom::Start(self.mdat_size_pos))
                    .map_err(|e| Error::io(path.clone(), e))?;
                media
                    .write_all(&(mdat_size as u32).to_be_bytes())
                    .map_err(|e| Error::io(path.clone(), e))?;
                media
                    .seek(SeekFrom::End(0))
                    .map_err(|e| Error::io(path.clone(), e))?;

                let media_base = self.mdat_size_pos + 8;
                let moov = self.build_moov(media_base)?;
                media
                    .write_all(&moov)
                    .map_err(|e| Error::io(path.clone(), e))?;
                media.flush().map_err(|e| Error::io(path, e))?;
            }
            Mp4Muxer::Faststart => {
                media.flush().map_err(|e| Error::io(path.clone(), e))?;
                drop(media);

                let ftyp = ftyp_box();
                // The moov size does not depend on the offsets it contains
                // (fixed-width entries), so a first pass with base 0 fixes
                // the layout.
                let moov_size = self.build_moov(0)?.len() as u64;
                let media_base = ftyp.len() as u64 + moov_size + 8;
                let moov = self.build_moov(media_base)?;

                let file = File::create(&path).map_err(|e| {
                    Error::Setup(format!("unable to create '{}': {e}", path.display()))
                })?;
                let mut out = BufWriter::new(file);
                out.write_all(&ftyp).map_err(|e| Error::io(path.clone(), e))?;
                out.write_all(&moov).map_err(|e| Error::io(path.clone(), e))?;

                let mdat_size = 8 + self.media_written;
                if mdat_size > u64::from(u32::MAX) {
                    return Err(Error::Mux("mdat exceeds 4 GiB".to_string()));
                }
                out.write_all(&(mdat_size as u32).to_be_bytes())
                    .map_err(|e| Error::io(path.clone(), e))?;
                out.write_all(b"mdat")
                    .map_err(|e| Error::io(path.clone(), e))?;

                let temp_path = self
                    .temp_path
                    .clone()
                    .ok_or_else(|| Error::Logic("faststart without a temp file".to_string()))?;
                let mut temp =
                    File::open(&temp_path).map_err(|e| Error::io(temp_path.clone(), e))?;
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let n = temp
                        .read(&mut buf)
                        .map_err(|e| Error::io(temp_path.clone(), e))?;
                    if n == 0 {
                        break;
                    }
                    out.write_all(&buf[..n])
                        .map_err(|e| Error::io(path.clone(), e))?;
                }
                out.flush().map_err(|e| Error::io(path, e))?;

                if let Err(error) = std::fs::remove_file(&temp_path) {
                    warn!(
                        "unable to remove temp file '{}': {error}",
                        temp_path.display()
                    );
                }
            }
        }

        self.closed = true;
        debug!("wrote '{}'", self.path.display());
        Ok(())
    }

    fn clean_up(&mut self) {
        self.media = None;
        if let Some(temp_path) = self.temp_path.take() {
            let _ = std::fs::remove_file(temp_path);
        }
        if !self.closed && self.path.exists() {
            if let Err(error) = std::fs::remove_file(&self.path) {
                warn!(
                    "unable to remove partial output '{}': {error}",
                    self.path.display()
                );
            }
        }
    }
}

fn track_duration(track: &TrackState, fallback: u64) -> u64 {
    track
        .last_timestamp
        .map(|last| last + fallback)
        .unwrap_or(0)
}

fn scale(value: u64, from: u32, to: u32) -> u64 {
    (u128::from(value) * u128::from(to) / u128::from(from)) as u64
}

// Box serialization.

fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + payload.len());
    data.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
    data.extend_from_slice(kind);
    data.extend_from_slice(payload);
    data
}

fn full_box(kind: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut inner = Vec::with_capacity(4 + payload.len());
    inner.push(version);
    inner.extend_from_slice(&flags.to_be_bytes()[1..]);
    inner.extend_from_slice(payload);
    mp4_box(kind, &inner)
}

fn ftyp_box() -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"isom");
    payload.extend_from_slice(&512u32.to_be_bytes());
    for brand in [b"isom", b"iso2", b"mp41"] {
        payload.extend_from_slice(brand);
    }
    mp4_box(b"ftyp", &payload)
}

fn mvhd_box(duration_ms: u64, next_track_id: u32) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&0u32.to_be_bytes()); // creation time
    p.extend_from_slice(&0u32.to_be_bytes()); // modification time
    p.extend_from_slice(&MOVIE_TIMESCALE.to_be_bytes());
    p.extend_from_slice(&(duration_ms as u32).to_be_bytes());
    p.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate 1.0
    p.extend_from_slice(&0x0100u16.to_be_bytes()); // volume 1.0
    p.extend_from_slice(&[0u8; 10]); // reserved
    p.extend_from_slice(&identity_matrix());
    p.extend_from_slice(&[0u8; 24]); // pre-defined
    p.extend_from_slice(&next_track_id.to_be_bytes());
    full_box(b"mvhd", 0, 0, &p)
}

fn identity_matrix() -> [u8; 36] {
    let mut m = [0u8; 36];
    m[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    m[16..20].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    m[32..36].copy_from_slice(&0x4000_0000u32.to_be_bytes());
    m
}

#[allow(clippy::too_many_arguments)]
fn trak_box(
    track_id: u32,
    timescale: u32,
    duration: u64,
    sample_entry: &[u8],
    track: &TrackState,
    media_base: u64,
    fallback_duration: u64,
    is_video: bool,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let duration_ms = scale(duration, timescale, MOVIE_TIMESCALE);

    let mut tkhd = Vec::new();
    tkhd.extend_from_slice(&0u32.to_be_bytes());
    tkhd.extend_from_slice(&0u32.to_be_bytes());
    tkhd.extend_from_slice(&track_id.to_be_bytes());
    tkhd.extend_from_slice(&0u32.to_be_bytes()); // reserved
    tkhd.extend_from_slice(&(duration_ms as u32).to_be_bytes());
    tkhd.extend_from_slice(&[0u8; 8]); // reserved
    tkhd.extend_from_slice(&0u16.to_be_bytes()); // layer
    tkhd.extend_from_slice(&0u16.to_be_bytes()); // alternate group
    tkhd.extend_from_slice(&(if is_video { 0u16 } else { 0x0100 }).to_be_bytes());
    tkhd.extend_from_slice(&0u16.to_be_bytes()); // reserved
    tkhd.extend_from_slice(&identity_matrix());
    tkhd.extend_from_slice(&(width << 16).to_be_bytes());
    tkhd.extend_from_slice(&(height << 16).to_be_bytes());
    let tkhd = full_box(b"tkhd", 0, 7, &tkhd);

    let mut mdhd = Vec::new();
    mdhd.extend_from_slice(&0u32.to_be_bytes());
    mdhd.extend_from_slice(&0u32.to_be_bytes());
    mdhd.extend_from_slice(&timescale.to_be_bytes());
    mdhd.extend_from_slice(&(duration as u32).to_be_bytes());
    mdhd.extend_from_slice(&0x55C4u16.to_be_bytes()); // language: und
    mdhd.extend_from_slice(&0u16.to_be_bytes());
    let mdhd = full_box(b"mdhd", 0, 0, &mdhd);

    let mut hdlr = Vec::new();
    hdlr.extend_from_slice(&0u32.to_be_bytes()); // pre-defined
    hdlr.extend_from_slice(if is_video { b"vide" } else { b"soun" });
    hdlr.extend_from_slice(&[0u8; 12]); // reserved
    hdlr.extend_from_slice(if is_video {
        b"VideoHandler\0"
    } else {
        b"SoundHandler\0"
    });
    let hdlr = full_box(b"hdlr", 0, 0, &hdlr);

    // stbl
    let stsd = {
        let mut p = Vec::new();
        p.extend_from_slice(&1u32.to_be_bytes());
        p.extend_from_slice(sample_entry);
        full_box(b"stsd", 0, 0, &p)
    };
    let stts = {
        let durations = track.durations(fallback_duration);
        let mut runs: Vec<(u32, u64)> = Vec::new();
        for duration in durations {
            match runs.last_mut() {
                Some((count, d)) if *d == duration => *count += 1,
                _ => runs.push((1, duration)),
            }
        }
        let mut p = Vec::new();
        p.extend_from_slice(&(runs.len() as u32).to_be_bytes());
        for (count, duration) in runs {
            p.extend_from_slice(&count.to_be_bytes());
            p.extend_from_slice(&(duration as u32).to_be_bytes());
        }
        full_box(b"stts", 0, 0, &p)
    };
    let stsc = {
        let mut p = Vec::new();
        p.extend_from_slice(&1u32.to_be_bytes());
        p.extend_from_slice(&1u32.to_be_bytes()); // first chunk
        p.extend_from_slice(&1u32.to_be_bytes()); // samples per chunk
        p.extend_from_slice(&1u32.to_be_bytes()); // sample description index
        full_box(b"stsc", 0, 0, &p)
    };
    let stsz = {
        let mut p = Vec::new();
        p.extend_from_slice(&0u32.to_be_bytes()); // no constant size
        p.extend_from_slice(&(track.sizes.len() as u32).to_be_bytes());
        for size in &track.sizes {
            p.extend_from_slice(&size.to_be_bytes());
        }
        full_box(b"stsz", 0, 0, &p)
    };
    let stco = {
        let mut p = Vec::new();
        p.extend_from_slice(&(track.offsets.len() as u32).to_be_bytes());
        for offset in &track.offsets {
            p.extend_from_slice(&((media_base + offset) as u32).to_be_bytes());
        }
        full_box(b"stco", 0, 0, &p)
    };

    let mut stbl_payload = Vec::new();
    stbl_payload.extend_from_slice(&stsd);
    stbl_payload.extend_from_slice(&stts);
    if is_video && !track.sync_samples.is_empty() {
        let mut p = Vec::new();
        p.extend_from_slice(&(track.sync_samples.len() as u32).to_be_bytes());
        for index in &track.sync_samples {
            p.extend_from_slice(&index.to_be_bytes());
        }
        stbl_payload.extend_from_slice(&full_box(b"stss", 0, 0, &p));
    }
    stbl_payload.extend_from_slice(&stsc);
    stbl_payload.extend_from_slice(&stsz);
    stbl_payload.extend_from_slice(&stco);
    let stbl = mp4_box(b"stbl", &stbl_payload);

    let header = if is_video {
        let mut p = Vec::new();
        p.extend_from_slice(&0u16.to_be_bytes()); // graphics mode
        p.extend_from_slice(&[0u8; 6]); // opcolor
        full_box(b"vmhd", 0, 1, &p)
    } else {
        full_box(b"smhd", 0, 0, &0u32.to_be_bytes())
    };
    let dinf = {
        let url = full_box(b"url ", 0, 1, &[]);
        let mut dref = Vec::new();
        dref.extend_from_slice(&1u32.to_be_bytes());
        dref.extend_from_slice(&url);
        mp4_box(b"dinf", &full_box(b"dref", 0, 0, &dref))
    };

    let mut minf_payload = Vec::new();
    minf_payload.extend_from_slice(&header);
    minf_payload.extend_from_slice(&dinf);
    minf_payload.extend_from_slice(&stbl);
    let minf = mp4_box(b"minf", &minf_payload);

    let mut mdia_payload = Vec::new();
    mdia_payload.extend_from_slice(&mdhd);
    mdia_payload.extend_from_slice(&hdlr);
    mdia_payload.extend_from_slice(&minf);
    let mdia = mp4_box(b"mdia", &mdia_payload);

    let mut trak_payload = Vec::new();
    trak_payload.extend_from_slice(&tkhd);
    trak_payload.extend_from_slice(&mdia);
    mp4_box(b"trak", &trak_payload)
}

/// `Opus` sample entry with its `dOps` configuration.
fn audio_sample_entry(params: &AudioTrackParams) -> Vec<u8> {
    let mut dops = Vec::new();
    dops.push(0); // version
    dops.push(params.channels as u8);
    dops.extend_from_slice(&(params.pre_skip as u16).to_be_bytes());
    dops.extend_from_slice(&params.sample_rate.to_be_bytes());
    dops.extend_from_slice(&0u16.to_be_bytes()); // output gain
    dops.push(0); // channel mapping family

    let mut p = Vec::new();
    p.extend_from_slice(&[0u8; 6]); // reserved
    p.extend_from_slice(&1u16.to_be_bytes()); // data reference index
    p.extend_from_slice(&[0u8; 8]); // reserved
    p.extend_from_slice(&(params.channels as u16).to_be_bytes());
    p.extend_from_slice(&16u16.to_be_bytes()); // sample size
    p.extend_from_slice(&[0u8; 4]); // pre-defined + reserved
    p.extend_from_slice(&(params.sample_rate << 16).to_be_bytes());
    p.extend_from_slice(&mp4_box(b"dOps", &dops));
    mp4_box(b"Opus", &p)
}

/// Build an AVC decoder configuration record from the SPS and PPS NAL units
/// of one length-prefixed sample, if it carries them.
fn avc_configuration_from_sample(data: &[u8]) -> Option<Vec<u8>> {
    let mut sps: Option<&[u8]> = None;
    let mut pps: Option<&[u8]> = None;
    let mut cursor = 0;
    while cursor + 4 <= data.len() {
        let len = u32::from_be_bytes([
            data[cursor],
            data[cursor + 1],
            data[cursor + 2],
            data[cursor + 3],
        ]) as usize;
        cursor += 4;
        if cursor + len > data.len() || len == 0 {
            break;
        }
        let nal = &data[cursor..cursor + len];
        match nal[0] & 0x1F {
            7 => sps = sps.or(Some(nal)),
            8 => pps = pps.or(Some(nal)),
            _ => {}
        }
        cursor += len;
    }

    let (sps, pps) = (sps?, pps?);
    if sps.len() < 4 {
        return None;
    }
    let mut record = Vec::with_capacity(11 + sps.len() + pps.len());
    record.push(1);
    record.push(sps[1]);
    record.push(sps[2]);
    record.push(sps[3]);
    record.push(0xFF); // 4-byte NAL lengths
    record.push(0xE1); // one SPS
    record.extend_from_slice(&(sps.len() as u16).to_be_bytes());
    record.extend_from_slice(sps);
    record.push(1); // one PPS
    record.extend_from_slice(&(pps.len() as u16).to_be_bytes());
    record.extend_from_slice(pps);
    Some(record)
}

/// Video sample entry for AVC, VP8/VP9 or AV1.
fn video_sample_entry(params: &VideoTrackParams) -> Result<Vec<u8>> {
    let (kind, config): (&[u8; 4], Vec<u8>) = match params.fourcc {
        "avc1" => {
            let extra = params.extra_data.clone().ok_or_else(|| {
                Error::Mux("an AVC track needs its decoder configuration".to_string())
            })?;
            (b"avc1", mp4_box(b"avcC", &extra))
        }
        "VP80" | "VP90" => {
            let mut vpcc = Vec::new();
            vpcc.push(0); // profile
            vpcc.push(10); // level
            vpcc.push(8 << 4 | 1 << 1); // bit depth, 4:2:0 colocated
            vpcc.push(2); // primaries: unspecified
            vpcc.push(2); // transfer: unspecified
            vpcc.push(2); // matrix: unspecified
            vpcc.extend_from_slice(&0u16.to_be_bytes()); // no init data
            let kind: &[u8; 4] = if params.fourcc == "VP80" {
                b"vp08"
            } else {
                b"vp09"
            };
            (kind, full_box(b"vpcC", 1, 0, &vpcc))
        }
        "AV01" => {
            let extra = params
                .extra_data
                .clone()
                .unwrap_or_else(|| vec![0x81, 0x00, 0x00, 0x00]);
            (b"av01", mp4_box(b"av1C", &extra))
        }
        other => {
            return Err(Error::Mux(format!(
                "codec '{other}' cannot be stored in MP4"
            )))
        }
    };

    let mut p = Vec::new();
    p.extend_from_slice(&[0u8; 6]); // reserved
    p.extend_from_slice(&1u16.to_be_bytes()); // data reference index
    p.extend_from_slice(&[0u8; 16]); // pre-defined + reserved
    p.extend_from_slice(&(params.width as u16).to_be_bytes());
    p.extend_from_slice(&(params.height as u16).to_be_bytes());
    p.extend_from_slice(&0x0048_0000u32.to_be_bytes()); // 72 dpi
    p.extend_from_slice(&0x0048_0000u32.to_be_bytes());
    p.extend_from_slice(&0u32.to_be_bytes()); // reserved
    p.extend_from_slice(&1u16.to_be_bytes()); // frame count
    p.extend_from_slice(&[0u8; 32]); // compressor name
    p.extend_from_slice(&0x0018u16.to_be_bytes()); // depth
    p.extend_from_slice(&(-1i16).to_be_bytes()); // pre-defined
    p.extend_from_slice(&config);
    Ok(mp4_box(kind, &p))
}
