// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Streaming WebM demuxer for participant archives.
//!
//! Parses the header and track entries up front, then yields blocks cluster
//! by cluster. Only what the decoders need is implemented: no cue parsing,
//! no seeking, no lacing.

use std::{
    collections::VecDeque,
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use super::{
    BLOCK, BLOCK_GROUP, CLUSTER, CLUSTER_TIMESTAMP, CODEC_DELAY, CODEC_ID, CODEC_PRIVATE,
    EBML_HEADER, INFO, SEGMENT, SIMPLE_BLOCK, TIMESTAMP_SCALE, TRACKS, TRACK_ENTRY, TRACK_NUMBER,
    TRACK_TYPE, TRACK_TYPE_AUDIO, TRACK_TYPE_VIDEO,
};
use crate::error::{Error, Result};

/// Kind of one demuxed track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
    Other,
}

/// Static description of one track in the archive.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub number: u64,
    pub kind: TrackKind,
    pub codec_id: String,
    pub codec_private: Option<Vec<u8>>,
    /// Codec delay in nanoseconds (the Opus pre-skip).
    pub codec_delay: u64,
}

/// One demuxed block.
#[derive(Debug, Clone)]
pub struct WebmBlock {
    pub track: u64,
    pub timestamp_ns: u64,
    pub keyframe: bool,
    pub data: Vec<u8>,
}

/// Reads one WebM archive start to end.
#[derive(Debug)]
pub struct WebmReader {
    input: BufReader<File>,
    path: PathBuf,
    timestamp_scale: u64,
    tracks: Vec<TrackInfo>,
    cluster: Option<ClusterCursor>,
    pending: VecDeque<WebmBlock>,
}

#[derive(Debug)]
struct ClusterCursor {
    /// Cluster base timestamp in timescale units.
    base: u64,
    /// Bytes of cluster payload still unread.
    remaining: u64,
}

impl WebmReader {
    /// Open an archive and parse everything up to the first cluster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for files that are not WebM and
    /// [`Error::Io`] on read failures.
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).map_err(|e| Error::io(path, e))?;
        let mut reader = Self {
            input: BufReader::new(file),
            path: path.to_path_buf(),
            timestamp_scale: 1_000_000,
            tracks: Vec::new(),
            cluster: None,
            pending: VecDeque::new(),
        };
        reader.parse_header()?;
        Ok(reader)
    }

    #[must_use]
    pub fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    /// The first track of the given kind.
    #[must_use]
    pub fn track_of_kind(&self, kind: TrackKind) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    /// Next block in file order, across all tracks. `None` at end of file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] on malformed clusters.
    pub fn next_block(&mut self) -> Result<Option<WebmBlock>> {
        loop {
            if let Some(block) = self.pending.pop_front() {
                return Ok(Some(block));
            }
            if !self.advance()? {
                return Ok(None);
            }
        }
    }

    /// EBML header and all segment elements up to the first cluster.
    fn parse_header(&mut self) -> Result<()> {
        let (id, size, _) = match self.read_element()? {
            Some(header) => header,
            None => return Err(self.malformed("empty file")),
        };
        if id != EBML_HEADER {
            return Err(self.malformed("not an EBML file"));
        }
        self.skip(size.unwrap_or(0))?;

        let (id, _, _) = match self.read_element()? {
            Some(header) => header,
            None => return Err(self.malformed("missing segment")),
        };
        if id != SEGMENT {
            return Err(self.malformed("missing segment"));
        }

        // Walk the segment until the media starts.
        loop {
            let Some((id, size, _)) = self.read_element()? else {
                return Ok(()); // archive without media
            };
            match id {
                INFO => {
                    let payload = self.read_payload(size)?;
                    if let Some(scale) = find_uint(&payload, TIMESTAMP_SCALE) {
                        self.timestamp_scale = scale;
                    }
                }
                TRACKS => {
                    let payload = self.read_payload(size)?;
                    self.parse_tracks(&payload)?;
                }
                CLUSTER => {
                    self.begin_cluster(size)?;
                    return Ok(());
                }
                _ => self.skip(size.unwrap_or(0))?,
            }
        }
    }

    fn parse_tracks(&mut self, payload: &[u8]) -> Result<()> {
        let mut cursor = 0;
        while let Some((id, element, next)) = next_child(payload, cursor) {
            cursor = next;
            if id != TRACK_ENTRY {
                continue;
            }
            let number = find_uint(element, TRACK_NUMBER)
                .ok_or_else(|| self.malformed("track entry without a number"))?;
            let kind = match find_uint(element, TRACK_TYPE) {
                Some(TRACK_TYPE_VIDEO) => TrackKind::Video,
                Some(TRACK_TYPE_AUDIO) => TrackKind::Audio,
                _ => TrackKind::Other,
            };
            let codec_id = find_binary(element, CODEC_ID)
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            self.tracks.push(TrackInfo {
                number,
                kind,
                codec_id,
                codec_private: find_binary(element, CODEC_PRIVATE).map(<[u8]>::to_vec),
                codec_delay: find_uint(element, CODEC_DELAY).unwrap_or(0),
            });
        }
        Ok(())
    }

    /// Read the cluster timestamp and queue its first blocks.
    fn begin_cluster(&mut self, size: Option<u64>) -> Result<()> {
        let size = size.ok_or_else(|| self.malformed("cluster with unknown size"))?;
        self.cluster = Some(ClusterCursor {
            base: 0,
            remaining: size,
        });
        Ok(())
    }

    /// Pull the next element out of the current cluster, or open the next
    /// cluster. Returns `false` at end of file.
    fn advance(&mut self) -> Result<bool> {
        loop {
            let Some(remaining) = self.cluster.as_ref().map(|c| c.remaining) else {
                // Between clusters: scan for the next one.
                loop {
                    let Some((id, size, _)) = self.read_element()? else {
                        return Ok(false);
                    };
                    if id == CLUSTER {
                        self.begin_cluster(size)?;
                        break;
                    }
                    self.skip(size.unwrap_or(0))?;
                }
                continue;
            };

            if remaining == 0 {
                self.cluster = None;
                continue;
            }

            let Some((id, size, header_len)) = self.read_element()? else {
                self.cluster = None;
                return Ok(false);
            };
            let size = size.ok_or_else(|| self.malformed("block with unknown size"))?;

            match id {
                CLUSTER_TIMESTAMP => {
                    let payload = self.read_exact_vec(size)?;
                    if let Some(cluster) = &mut self.cluster {
                        cluster.base = read_uint(&payload);
                    }
                }
                SIMPLE_BLOCK => {
                    let payload = self.read_exact_vec(size)?;
                    let block = self.parse_block(&payload, true)?;
                    self.pending.push_back(block);
                }
                BLOCK_GROUP => {
                    let payload = self.read_exact_vec(size)?;
                    if let Some(raw) = find_binary(&payload, BLOCK) {
                        let raw = raw.to_vec();
                        let block = self.parse_block(&raw, false)?;
                        self.pending.push_back(block);
                    }
                }
                _ => self.skip(size)?,
            }

            if let Some(cluster) = &mut self.cluster {
                cluster.remaining = remaining.saturating_sub(header_len + size);
            }
            if !self.pending.is_empty() {
                return Ok(true);
            }
        }
    }

    fn parse_block(&mut self, payload: &[u8], simple: bool) -> Result<WebmBlock> {
        let (track, track_len) = read_vint(payload)
            .ok_or_else(|| self.malformed("block without a track number"))?;
        let rest = &payload[track_len..];
        if rest.len() < 3 {
            return Err(self.malformed("truncated block header"));
        }
        let relative = i16::from_be_bytes([rest[0], rest[1]]);
        let flags = rest[2];
        if flags & 0x06 != 0 {
            return Err(self.malformed("laced blocks are not supported"));
        }
        let base = self.cluster.as_ref().map_or(0, |c| c.base);
        let timestamp_units = if relative < 0 {
            base.saturating_sub((-i64::from(relative)) as u64)
        } else {
            base + relative as u64
        };
        Ok(WebmBlock {
            track,
            timestamp_ns: timestamp_units * self.timestamp_scale,
            keyframe: simple && flags & 0x80 != 0,
            data: rest[3..].to_vec(),
        })
    }

    // Low-level input handling.

    /// Element id and size; also returns how many header bytes were read.
    fn read_element(&mut self) -> Result<Option<(u32, Option<u64>, u64)>> {
        let Some((id, id_len)) = self.read_id()? else {
            return Ok(None);
        };
        let mut first = [0u8; 1];
        if self.input.read_exact(&mut first).is_err() {
            return Ok(None);
        }
        let length = first[0].leading_zeros() as usize + 1;
        if length > 8 {
            return Err(self.malformed("invalid size field"));
        }
        let mut value = u64::from(first[0]) & ((1 << (8 - length)) - 1);
        let mut rest = vec![0u8; length - 1];
        self.input
            .read_exact(&mut rest)
            .map_err(|e| Error::io(self.path.clone(), e))?;
        let mut all_ones = value == (1 << (8 - length)) - 1;
        for byte in rest {
            value = (value << 8) | u64::from(byte);
            all_ones = all_ones && byte == 0xFF;
        }
        Ok(Some((
            id,
            (!all_ones).then_some(value),
            id_len + length as u64,
        )))
    }

    fn read_id(&mut self) -> Result<Option<(u32, u64)>> {
        let mut first = [0u8; 1];
        match self.input.read_exact(&mut first) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(Error::io(self.path.clone(), e)),
        }
        let length = first[0].leading_zeros() as usize + 1;
        if length > 4 {
            return Err(self.malformed("invalid element id"));
        }
        let mut id = u32::from(first[0]);
        let mut rest = vec![0u8; length - 1];
        self.input
            .read_exact(&mut rest)
            .map_err(|e| Error::io(self.path.clone(), e))?;
        for byte in rest {
            id = (id << 8) | u32::from(byte);
        }
        Ok(Some((id, length as u64)))
    }

    fn read_payload(&mut self, size: Option<u64>) -> Result<Vec<u8>> {
        let size = size.ok_or_else(|| self.malformed("element with unknown size"))?;
        self.read_exact_vec(size)
    }

    fn read_exact_vec(&mut self, size: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size as usize];
        self.input
            .read_exact(&mut buf)
            .map_err(|e| Error::io(self.path.clone(), e))?;
        Ok(buf)
    }

    fn skip(&mut self, size: u64) -> Result<()> {
        self.input
            .seek(SeekFrom::Current(size as i64))
            .map_err(|e| Error::io(self.path.clone(), e))?;
        Ok(())
    }

    fn malformed(&self, what: &str) -> Error {
        Error::Decode(format!("'{}': {what}", self.path.display()))
    }
}

/// Read one vint (marker stripped); returns the value and its length.
fn read_vint(data: &[u8]) -> Option<(u64, usize)> {
    let first = *data.first()?;
    let length = first.leading_zeros() as usize + 1;
    if length > 8 || data.len() < length {
        return None;
    }
    let mut value = u64::from(first) & ((1 << (8 - length)) - 1);
    for byte in &data[1..length] {
        value = (value << 8) | u64::from(*byte);
    }
    Some((value, length))
}

/// Iterate the children of a master element payload.
fn next_child(payload: &[u8], mut cursor: usize) -> Option<(u32, &[u8], usize)> {
    if cursor >= payload.len() {
        return None;
    }
    let first = payload[cursor];
    let id_len = first.leading_zeros() as usize + 1;
    if id_len > 4 || cursor + id_len > payload.len() {
        return None;
    }
    let mut id = 0u32;
    for byte in &payload[cursor..cursor + id_len] {
        id = (id << 8) | u32::from(*byte);
    }
    cursor += id_len;

    let (size, size_len) = read_vint(&payload[cursor..])?;
    cursor += size_len;
    let end = cursor + size as usize;
    if end > payload.len() {
        return None;
    }
    Some((id, &payload[cursor..end], end))
}

/// First child with the given id, decoded as an unsigned integer.
fn find_uint(payload: &[u8], id: u32) -> Option<u64> {
    find_binary(payload, id).map(read_uint)
}

/// First child with the given id, raw payload.
fn find_binary(payload: &[u8], id: u32) -> Option<&[u8]> {
    let mut cursor = 0;
    while let Some((child_id, element, next)) = next_child(payload, cursor) {
        if child_id == id {
            return Some(element);
        }
        cursor = next;
    }
    None
}

fn read_uint(data: impl AsRef<[u8]>) -> u64 {
    data.as_ref()
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
