//! Layout of the volumetric container.
//!
//! ```text
//! ┌──────────────┐ 0
//! │ file header  │ 30 bytes: version, pointers to the sequence-info,
//! ├──────────────┤           bloc-index and track-index chunks
//! │ sequence info│
//! ├──────────────┤ 79
//! │ bloc 0 ...   │ one bloc chunk followed by its frame chunks
//! │ bloc n       │
//! ├──────────────┤
//! │ bloc index   │
//! │ track index  │ optional, points at audio chunks
//! └──────────────┘
//! ```
//!
//! Every chunk starts with a 9-byte header (type u8, codec u16, version
//! u16, payload size u32). All integers are little-endian. Nothing here
//! performs I/O; the [`ChunkStore`][crate::chunk_store::ChunkStore] feeds
//! fetched bytes through these parsers.

use crate::error::StreamError;

pub const FILE_HEADER_LEN: usize = 30;
pub const CHUNK_HEADER_LEN: usize = 9;
/// Byte offset of the first bloc in every container.
pub const FIRST_KEYFRAME_POS: u64 = 79;

const SEQUENCE_INFO_LEN: usize = 36;
const BLOC_INFO_LEN: usize = 16;
const TRACK_ENTRY_LEN: usize = 8;

// ─────────────────────────────────────────────────────────────────────────────
// Little-endian cursor
// ─────────────────────────────────────────────────────────────────────────────

/// Bounds-checked reader over a byte slice.
pub(crate) struct LeReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], StreamError> {
        if self.remaining() < n {
            return Err(StreamError::container(format!(
                "unexpected end of data: need {n} bytes at offset {}, have {}",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StreamError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, StreamError> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, StreamError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn i16(&mut self) -> Result<i16, StreamError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, StreamError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i32(&mut self) -> Result<i32, StreamError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32, StreamError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub(crate) fn f32_vec(&mut self, n: usize) -> Result<Vec<f32>, StreamError> {
        (0..n).map(|_| self.f32()).collect()
    }

    pub(crate) fn u32_vec(&mut self, n: usize) -> Result<Vec<u32>, StreamError> {
        (0..n).map(|_| self.u32()).collect()
    }

    pub(crate) fn i16_vec(&mut self, n: usize) -> Result<Vec<i16>, StreamError> {
        (0..n).map(|_| self.i16()).collect()
    }
}

fn pointer(value: i32, what: &str) -> Result<u64, StreamError> {
    u64::try_from(value).map_err(|_| StreamError::container(format!("negative {what} pointer {value}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunks
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    SequenceInfo,
    TrackIndex,
    BlocIndex,
    /// Full geometry of a keyframe.
    Keyframe,
    /// Vertex deltas against the last keyframe.
    InterFrame,
    /// Texture of the pending frame; completes it.
    Texture,
    Normals,
    Audio,
    Other(u8),
}

impl ChunkType {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ChunkType::SequenceInfo,
            2 => ChunkType::TrackIndex,
            3 => ChunkType::BlocIndex,
            10 => ChunkType::Keyframe,
            11 => ChunkType::InterFrame,
            12 => ChunkType::Texture,
            14 => ChunkType::Normals,
            21 => ChunkType::Audio,
            other => ChunkType::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ChunkType::SequenceInfo => 1,
            ChunkType::TrackIndex => 2,
            ChunkType::BlocIndex => 3,
            ChunkType::Keyframe => 10,
            ChunkType::InterFrame => 11,
            ChunkType::Texture => 12,
            ChunkType::Normals => 14,
            ChunkType::Audio => 21,
            ChunkType::Other(raw) => raw,
        }
    }

    /// Frame-data chunks go to the decoder; everything else is handled by
    /// the store itself.
    pub fn is_frame_data(self) -> bool {
        matches!(
            self,
            ChunkType::Keyframe | ChunkType::InterFrame | ChunkType::Texture | ChunkType::Normals
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub kind: ChunkType,
    pub codec: u16,
    pub version: u16,
    /// Payload length, excluding this header.
    pub size: u32,
}

impl ChunkHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, StreamError> {
        let mut r = LeReader::new(bytes);
        Ok(Self {
            kind: ChunkType::from_u8(r.u8()?),
            codec: r.u16()?,
            version: r.u16()?,
            size: r.u32()?,
        })
    }

    /// Header plus payload.
    pub fn total_len(&self) -> u64 {
        CHUNK_HEADER_LEN as u64 + u64::from(self.size)
    }
}

/// A chunk as lifted from the container, payload untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    pub header: ChunkHeader,
    pub data: Vec<u8>,
}

impl RawChunk {
    pub fn kind(&self) -> ChunkType {
        self.header.kind
    }
}

/// Split `buf` into consecutive chunks.
///
/// Bulk ranges are cut on chunk boundaries, so a chunk running past the end
/// of `buf` means the container is corrupt.
pub fn split_chunks(buf: &[u8]) -> Result<Vec<RawChunk>, StreamError> {
    let mut chunks = Vec::new();
    let mut r = LeReader::new(buf);
    while r.remaining() > 0 {
        let header = ChunkHeader::parse(r.take(CHUNK_HEADER_LEN)?)?;
        let data = r.take(header.size as usize)?.to_vec();
        chunks.push(RawChunk { header, data });
    }
    Ok(chunks)
}

// ─────────────────────────────────────────────────────────────────────────────
// File header
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: i16,
    pub sequence_info: u64,
    pub bloc_index: u64,
    /// Zero when the container carries no additional tracks.
    pub track_index: u64,
}

impl FileHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, StreamError> {
        if bytes.len() < FILE_HEADER_LEN {
            return Err(StreamError::container(format!(
                "file header is {} bytes, expected {FILE_HEADER_LEN}",
                bytes.len()
            )));
        }
        let version = LeReader::at(bytes, 4).i16()?;
        let sequence_info = pointer(LeReader::at(bytes, 6).i32()?, "sequence info")?;
        let bloc_index = pointer(LeReader::at(bytes, 14).i32()?, "bloc index")?;
        let track_index = pointer(LeReader::at(bytes, 22).i32()?, "track index")?;
        Ok(Self {
            version,
            sequence_info,
            bloc_index,
            track_index,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sequence info
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureEncoding {
    Astc,
    Dxt,
    Rgba,
}

impl TextureEncoding {
    pub fn from_code(code: u32) -> Self {
        match code {
            164 => TextureEncoding::Astc,
            100 => TextureEncoding::Dxt,
            _ => TextureEncoding::Rgba,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceInfo {
    pub frame_count: u32,
    pub bloc_count: u32,
    pub frame_rate: f32,
    pub max_vertices: u32,
    pub max_triangles: u32,
    pub texture_encoding: u32,
    pub texture_width: u32,
    pub texture_height: u32,
    pub additional_tracks: u32,
}

impl SequenceInfo {
    pub fn parse(payload: &[u8]) -> Result<Self, StreamError> {
        if payload.len() < SEQUENCE_INFO_LEN {
            return Err(StreamError::container(format!(
                "sequence info is {} bytes, expected {SEQUENCE_INFO_LEN}",
                payload.len()
            )));
        }
        let mut r = LeReader::new(payload);
        let info = Self {
            frame_count: r.u32()?,
            bloc_count: r.u32()?,
            frame_rate: r.f32()?,
            max_vertices: r.u32()?,
            max_triangles: r.u32()?,
            texture_encoding: r.u32()?,
            texture_width: r.u32()?,
            texture_height: r.u32()?,
            additional_tracks: r.u32()?,
        };
        if !(info.frame_rate.is_finite() && info.frame_rate > 0.0) {
            return Err(StreamError::container(format!(
                "frame rate {} is not positive",
                info.frame_rate
            )));
        }
        if info.frame_count == 0 {
            return Err(StreamError::container("sequence has no frames"));
        }
        if info.bloc_count == 0 {
            return Err(StreamError::container("sequence has no blocs"));
        }
        Ok(info)
    }

    /// Sequence length in seconds.
    pub fn duration(&self) -> f64 {
        f64::from(self.frame_count) / f64::from(self.frame_rate)
    }

    pub fn texture_format(&self) -> TextureEncoding {
        TextureEncoding::from_code(self.texture_encoding)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bloc and track indexes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlocInfo {
    pub keyframe_id: i32,
    pub inter_frames: i32,
    /// Byte offset of the bloc chunk.
    pub chunk_pos: i32,
}

pub fn parse_bloc_index(payload: &[u8], bloc_count: u32) -> Result<Vec<BlocInfo>, StreamError> {
    let needed = bloc_count as usize * BLOC_INFO_LEN;
    if payload.len() < needed {
        return Err(StreamError::container(format!(
            "bloc index holds {} bytes, {bloc_count} blocs need {needed}",
            payload.len()
        )));
    }
    (0..bloc_count as usize)
        .map(|i| {
            let mut r = LeReader::at(payload, i * BLOC_INFO_LEN);
            Ok(BlocInfo {
                keyframe_id: r.i32()?,
                inter_frames: r.i32()?,
                chunk_pos: r.i32()?,
            })
        })
        .collect()
}

/// Byte offset at which each bulk range starts.
///
/// One entry per bloc plus a leading [`FIRST_KEYFRAME_POS`]; entry `i + 1`
/// lies just past bloc `i`'s bloc chunk.
pub fn keyframe_positions(blocs: &[BlocInfo]) -> Vec<u64> {
    let mut positions = Vec::with_capacity(blocs.len() + 1);
    positions.push(FIRST_KEYFRAME_POS);
    positions.extend(blocs.iter().map(|b| {
        let pos = i64::from(b.chunk_pos)
            + CHUNK_HEADER_LEN as i64
            + (i64::from(b.inter_frames) + 1) * BLOC_INFO_LEN as i64;
        pos.max(0) as u64
    }));
    positions
}

/// Chunk positions of the additional tracks.
pub fn parse_track_index(payload: &[u8], tracks: u32) -> Result<Vec<u64>, StreamError> {
    (0..tracks as usize)
        .map(|i| pointer(LeReader::at(payload, i * TRACK_ENTRY_LEN).i32()?, "track"))
        .collect()
}
