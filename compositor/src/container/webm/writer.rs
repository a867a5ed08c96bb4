// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! EBML muxer producing a single-segment WebM file with one Opus audio
//! track and optionally one video track.
//!
//! The segment is written with an unknown size; only the duration in the
//! info element is patched when the file is finalized.

use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use super::{
    AUDIO, CHANNELS_ID, CLUSTER, CLUSTER_TIMESTAMP, CODEC_DELAY, CODEC_ID, CODEC_PRIVATE,
    DURATION, EBML_HEADER, INFO, MUXING_APP, PIXEL_HEIGHT, PIXEL_WIDTH, SAMPLING_FREQUENCY,
    SEEK_PRE_ROLL, SEGMENT, SIMPLE_BLOCK, TIMESTAMP_SCALE, TRACKS, TRACK_ENTRY, TRACK_NUMBER,
    TRACK_TYPE, TRACK_TYPE_AUDIO, TRACK_TYPE_VIDEO, TRACK_UID, VIDEO, WRITING_APP,
};
use crate::{
    container::{AudioTrackParams, ContainerWriter, VideoTrackParams},
    error::{Error, Result},
    frame::EncodedFrame,
    types::NANOS_PER_SECOND,
};

/// One nanosecond-timescale tick per millisecond block timestamp.
const TIMESTAMP_SCALE_NS: u64 = 1_000_000;
/// Opus seek pre-roll mandated for WebM, in nanoseconds.
const OPUS_SEEK_PRE_ROLL: u64 = 80_000_000;
/// Start a fresh cluster when the relative timestamp would near the i16
/// limit.
const MAX_CLUSTER_SPAN_MS: u64 = 30_000;

const AUDIO_TRACK: u64 = 1;
const VIDEO_TRACK: u64 = 2;

/// Writes the composed output as a WebM file.
#[derive(Debug)]
pub struct WebmWriter {
    path: PathBuf,
    out: Option<CountingWriter>,
    audio: Option<AudioTrackParams>,
    video: Option<VideoTrackParams>,
    /// Byte offset of the duration payload, patched on finalize.
    duration_pos: u64,
    header_written: bool,
    cluster: Option<Cluster>,
    last_audio_ts: Option<u64>,
    last_video_ts: Option<u64>,
    /// Largest timestamp seen, in milliseconds.
    end_ms: u64,
}

#[derive(Debug)]
struct Cluster {
    base_ms: u64,
    data: Vec<u8>,
}

impl WebmWriter {
    /// Open the output file for writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] when the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| Error::Setup(format!("unable to create '{}': {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: Some(CountingWriter::new(file)),
            audio: None,
            video: None,
            duration_pos: 0,
            header_written: false,
            cluster: None,
            last_audio_ts: None,
            last_video_ts: None,
            end_ms: 0,
        })
    }

    fn out(&mut self) -> Result<&mut CountingWriter> {
        self.out
            .as_mut()
            .ok_or_else(|| Error::Mux("the WebM file is already closed".to_string()))
    }

    /// EBML header, segment start, info and tracks. Written once, before
    /// the first frame.
    fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }

        let mut header = Vec::new();
        write_uint_element(&mut header, 0x4286, 1); // EBMLVersion
        write_uint_element(&mut header, 0x42F7, 1); // EBMLReadVersion
        write_uint_element(&mut header, 0x42F2, 4); // EBMLMaxIDLength
        write_uint_element(&mut header, 0x42F3, 8); // EBMLMaxSizeLength
        write_string_element(&mut header, 0x4282, "webm"); // DocType
        write_uint_element(&mut header, 0x4287, 4); // DocTypeVersion
        write_uint_element(&mut header, 0x4285, 2); // DocTypeReadVersion

        let mut info = Vec::new();
        write_uint_element(&mut info, TIMESTAMP_SCALE, TIMESTAMP_SCALE_NS);
        write_string_element(&mut info, MUXING_APP, "compositor");
        write_string_element(&mut info, WRITING_APP, "compositor");
        let duration_offset_in_info = {
            let mut duration = Vec::new();
            write_id(&mut duration, DURATION);
            write_size(&mut duration, 8);
            let offset = info.len() + duration.len();
            duration.extend_from_slice(&0f64.to_be_bytes());
            info.extend_from_slice(&duration);
            offset
        };

        let mut tracks = Vec::new();
        if let Some(audio) = self.audio {
            let mut entry = Vec::new();
            write_uint_element(&mut entry, TRACK_NUMBER, AUDIO_TRACK);
            write_uint_element(&mut entry, TRACK_UID, AUDIO_TRACK);
            write_uint_element(&mut entry, TRACK_TYPE, TRACK_TYPE_AUDIO);
            write_string_element(&mut entry, CODEC_ID, "A_OPUS");
            write_binary_element(&mut entry, CODEC_PRIVATE, &opus_head(&audio));
            write_uint_element(
                &mut entry,
                CODEC_DELAY,
                u64::from(audio.pre_skip) * NANOS_PER_SECOND / u64::from(audio.sample_rate),
            );
            write_uint_element(&mut entry, SEEK_PRE_ROLL, OPUS_SEEK_PRE_ROLL);
            let mut audio_el = Vec::new();
            write_float_element(&mut audio_el, SAMPLING_FREQUENCY, f64::from(audio.sample_rate));
            write_uint_element(&mut audio_el, CHANNELS_ID, u64::from(audio.channels));
            write_master_element(&mut entry, AUDIO, &audio_el);
            write_master_element(&mut tracks, TRACK_ENTRY, &entry);
        }
        if let Some(video) = &self.video {
            let codec_id = match video.fourcc {
                "VP80" => "V_VP8",
                "VP90" => "V_VP9",
                "AV01" => "V_AV1",
                other => {
                    return Err(Error::Mux(format!(
                        "codec '{other}' cannot be stored in WebM"
                    )))
                }
            };
            let mut entry = Vec::new();
            write_uint_element(&mut entry, TRACK_NUMBER, VIDEO_TRACK);
            write_uint_element(&mut entry, TRACK_UID, VIDEO_TRACK);
            write_uint_element(&mut entry, TRACK_TYPE, TRACK_TYPE_VIDEO);
            write_string_element(&mut entry, CODEC_ID, codec_id);
            if let Some(extra) = &video.extra_data {
                write_binary_element(&mut entry, CODEC_PRIVATE, extra);
            }
            let mut video_el = Vec::new();
            write_uint_element(&mut video_el, PIXEL_WIDTH, u64::from(video.width));
            write_uint_element(&mut video_el, PIXEL_HEIGHT, u64::from(video.height));
            write_master_element(&mut entry, VIDEO, &video_el);
            write_master_element(&mut tracks, TRACK_ENTRY, &entry);
        }

        let path = self.path.clone();
        let out = self.out()?;
        let mut buf = Vec::new();
        write_master_element(&mut buf, EBML_HEADER, &header);
        write_id(&mut buf, SEGMENT);
        // Unknown size: all ones in an 8-byte length field.
        buf.extend_from_slice(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);

        let duration_pos;
        {
            let mut info_el = Vec::new();
            write_master_element(&mut info_el, INFO, &info);
            // Info id + size prefix precede the payload.
            let info_payload_start = info_el.len() - info.len();
            duration_pos = (buf.len() + info_payload_start + duration_offset_in_info) as u64;
            buf.extend_from_slice(&info_el);
        }
        write_master_element(&mut buf, TRACKS, &tracks);

        out.write_all(&buf).map_err(|e| Error::io(path, e))?;
        self.duration_pos = duration_pos;
        self.header_written = true;
        Ok(())
    }

    fn append(&mut self, track: u64, frame: &EncodedFrame) -> Result<()> {
        self.write_header()?;

        let ts_ms = frame.timestamp / TIMESTAMP_SCALE_NS;
        self.end_ms = self.end_ms.max(ts_ms);

        let start_new = match &self.cluster {
            None => true,
            Some(cluster) => {
                ts_ms < cluster.base_ms
                    || ts_ms - cluster.base_ms > MAX_CLUSTER_SPAN_MS
                    || (track == VIDEO_TRACK && frame.keyframe)
            }
        };
        if start_new {
            self.flush_cluster()?;
            let mut data = Vec::new();
            write_uint_element(&mut data, CLUSTER_TIMESTAMP, ts_ms);
            self.cluster = Some(Cluster {
                base_ms: ts_ms,
                data,
            });
        }

        let cluster = self
            .cluster
            .as_mut()
            .ok_or_else(|| Error::Logic("cluster missing after rollover".to_string()))?;
        let relative = (ts_ms - cluster.base_ms) as i16;

        let mut block = Vec::new();
        write_size(&mut block, track); // track number as vint
        block.extend_from_slice(&relative.to_be_bytes());
        block.push(if frame.keyframe { 0x80 } else { 0x00 });
        block.extend_from_slice(&frame.data);

        write_id(&mut cluster.data, SIMPLE_BLOCK);
        write_size(&mut cluster.data, block.len() as u64);
        cluster.data.extend_from_slice(&block);
        Ok(())
    }

    fn flush_cluster(&mut self) -> Result<()> {
        let Some(cluster) = self.cluster.take() else {
            return Ok(());
        };
        let path = self.path.clone();
        let out = self.out()?;
        let mut buf = Vec::new();
        write_master_element(&mut buf, CLUSTER, &cluster.data);
        out.write_all(&buf).map_err(|e| Error::io(path, e))
    }
}

impl ContainerWriter for WebmWriter {
    fn set_audio_track(&mut self, params: &AudioTrackParams) -> Result<()> {
        if self.header_written {
            return Err(Error::Mux(
                "audio track declared after the first frame".to_string(),
            ));
        }
        self.audio = Some(*params);
        Ok(())
    }

    fn set_video_track(&mut self, params: &VideoTrackParams) -> Result<()> {
        if self.header_written {
            return Err(Error::Mux(
                "video track declared after the first frame".to_string(),
            ));
        }
        self.video = Some(params.clone());
        Ok(())
    }

    fn append_audio(&mut self, frame: EncodedFrame) -> Result<()> {
        if self.audio.is_none() {
            return Err(Error::Mux("no audio track declared".to_string()));
        }
        if self.last_audio_ts.is_some_and(|last| frame.timestamp < last) {
            return Err(Error::Mux(format!(
                "audio timestamp {} is behind {}",
                frame.timestamp,
                self.last_audio_ts.unwrap_or(0)
            )));
        }
        self.last_audio_ts = Some(frame.timestamp);
        self.append(AUDIO_TRACK, &frame)
    }

    fn append_video(&mut self, frame: EncodedFrame) -> Result<()> {
        if self.video.is_none() {
            return Err(Error::Mux("no video track declared".to_string()));
        }
        if self.last_video_ts.is_some_and(|last| frame.timestamp < last) {
            return Err(Error::Mux(format!(
                "video timestamp {} is behind {}",
                frame.timestamp,
                self.last_video_ts.unwrap_or(0)
            )));
        }
        self.last_video_ts = Some(frame.timestamp);
        self.append(VIDEO_TRACK, &frame)
    }

    fn finalize(&mut self) -> Result<()> {
        self.write_header()?;
        self.flush_cluster()?;

        let path = self.path.clone();
        let duration_pos = self.duration_pos;
        let end_ms = self.end_ms;
        let out = self.out()?;
        out.seek_patch(duration_pos, &(end_ms as f64).to_be_bytes())
            .map_err(|e| Error::io(path.clone(), e))?;
        out.flush().map_err(|e| Error::io(path, e))?;
        self.out = None;
        debug!("wrote '{}' ({end_ms} ms)", self.path.display());
        Ok(())
    }

    fn clean_up(&mut self) {
        if self.out.take().is_some() {
            if let Err(error) = std::fs::remove_file(&self.path) {
                warn!(
                    "unable to remove partial output '{}': {error}",
                    self.path.display()
                );
            }
        }
    }
}

/// Serialized `OpusHead` block as stored in the codec private data.
fn opus_head(params: &AudioTrackParams) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1); // version
    head.push(params.channels as u8);
    head.extend_from_slice(&(params.pre_skip as u16).to_le_bytes());
    head.extend_from_slice(&params.sample_rate.to_le_bytes());
    head.extend_from_slice(&0u16.to_le_bytes()); // output gain
    head.push(0); // mapping family
    head
}

#[derive(Debug)]
struct CountingWriter {
    inner: BufWriter<File>,
}

impl CountingWriter {
    fn new(file: File) -> Self {
        Self {
            inner: BufWriter::new(file),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(data)
    }

    /// Overwrite `data` at absolute position `pos`, restoring the cursor to
    /// the end of the file.
    fn seek_patch(&mut self, pos: u64, data: &[u8]) -> std::io::Result<()> {
        self.inner.flush()?;
        self.inner.seek(SeekFrom::Start(pos))?;
        self.inner.write_all(data)?;
        self.inner.flush()?;
        self.inner.seek(SeekFrom::End(0))?;
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

// EBML primitives, shared with the reader through identical conventions.

pub(crate) fn write_id(buf: &mut Vec<u8>, id: u32) {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    buf.extend_from_slice(&bytes[skip..]);
}

/// Variable-length size field, minimal encoding.
pub(crate) fn write_size(buf: &mut Vec<u8>, value: u64) {
    let mut length = 1;
    while length < 8 && value >= (1u64 << (7 * length)) - 1 {
        length += 1;
    }
    let marked = value | (1u64 << (7 * length));
    let bytes = marked.to_be_bytes();
    buf.extend_from_slice(&bytes[8 - length..]);
}

fn write_uint_element(buf: &mut Vec<u8>, id: u32, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    write_id(buf, id);
    write_size(buf, (8 - skip) as u64);
    buf.extend_from_slice(&bytes[skip..]);
}

fn write_float_element(buf: &mut Vec<u8>, id: u32, value: f64) {
    write_id(buf, id);
    write_size(buf, 8);
    buf.extend_from_slice(&value.to_be_bytes());
}

fn write_string_element(buf: &mut Vec<u8>, id: u32, value: &str) {
    write_binary_element(buf, id, value.as_bytes());
}

fn write_binary_element(buf: &mut Vec<u8>, id: u32, value: &[u8]) {
    write_id(buf, id);
    write_size(buf, value.len() as u64);
    buf.extend_from_slice(value);
}

fn write_master_element(buf: &mut Vec<u8>, id: u32, payload: &[u8]) {
    write_id(buf, id);
    write_size(buf, payload.len() as u64);
    buf.extend_from_slice(payload);
}
