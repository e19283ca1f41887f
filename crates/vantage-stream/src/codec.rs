//! Incremental mesh codec run by the decode worker.
//!
//! A bloc opens with a keyframe carrying full geometry. Inter-frames carry
//! quantised vertex deltas against that keyframe, normals arrive in their
//! own chunk, and the texture chunk completes the pending frame:
//!
//! | Chunk | Payload |
//! |---|---|
//! | 10 keyframe | `u32` frame, `u32` vertices, `u32` faces, `f32 × 3v` positions, `u32 × 3f` indices, `f32 × 2v` uvs |
//! | 11 inter-frame | `f32` scale, `i16 × 3v` deltas |
//! | 14 normals | `f32 × 3v` |
//! | 12 texture | encoded texture bytes |

use tracing::{trace, warn};

use crate::container::{ChunkType, LeReader, RawChunk, TextureEncoding};
use crate::error::StreamError;

/// One displayable frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub frame: i64,
    /// `x, y, z` per vertex.
    pub vertices: Vec<f32>,
    /// Three vertex indices per triangle.
    pub faces: Vec<u32>,
    pub uvs: Vec<f32>,
    /// Empty when the frame carried no normals chunk.
    pub normals: Vec<f32>,
    pub texture: Vec<u8>,
    pub texture_encoding: TextureEncoding,
}

impl DecodedFrame {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn face_count(&self) -> usize {
        self.faces.len() / 3
    }
}

/// Turns raw chunks into frames. Runs on the decode worker thread.
///
/// A call yields `None` for chunks that only advance internal state.
pub trait ChunkCodec: Send {
    fn decode(&mut self, chunk: RawChunk) -> Result<Option<DecodedFrame>, StreamError>;

    /// Drop any partially decoded state.
    fn reset(&mut self) {}
}

#[derive(Debug, Clone)]
struct Keyframe {
    positions: Vec<f32>,
    faces: Vec<u32>,
    uvs: Vec<f32>,
}

#[derive(Debug, Clone)]
struct Pending {
    frame: i64,
    positions: Vec<f32>,
    normals: Vec<f32>,
}

#[derive(Debug)]
pub struct MeshCodec {
    texture_encoding: TextureEncoding,
    keyframe: Option<Keyframe>,
    pending: Option<Pending>,
    next_frame: i64,
}

impl MeshCodec {
    pub fn new(texture_encoding: TextureEncoding) -> Self {
        Self {
            texture_encoding,
            keyframe: None,
            pending: None,
            next_frame: 0,
        }
    }

    fn keyframe(&mut self, data: &[u8]) -> Result<(), StreamError> {
        let mut r = LeReader::new(data);
        let frame = r.u32()?;
        let vertices = r.u32()? as usize;
        let faces = r.u32()? as usize;
        let positions = r.f32_vec(vertices * 3)?;
        let indices = r.u32_vec(faces * 3)?;
        let uvs = r.f32_vec(vertices * 2)?;
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices) {
            return Err(StreamError::Codec(format!(
                "keyframe {frame} indexes vertex {bad} of {vertices}"
            )));
        }
        trace!(frame, vertices, faces, "keyframe");
        self.pending = Some(Pending {
            frame: i64::from(frame),
            positions: positions.clone(),
            normals: Vec::new(),
        });
        self.keyframe = Some(Keyframe {
            positions,
            faces: indices,
            uvs,
        });
        Ok(())
    }

    fn inter_frame(&mut self, data: &[u8]) -> Result<(), StreamError> {
        let key = self
            .keyframe
            .as_ref()
            .ok_or_else(|| StreamError::Codec("inter-frame before any keyframe".to_string()))?;
        let mut r = LeReader::new(data);
        let scale = r.f32()?;
        let deltas = r.i16_vec(key.positions.len())?;
        let positions = key
            .positions
            .iter()
            .zip(&deltas)
            .map(|(base, d)| base + f32::from(*d) * scale)
            .collect();
        if self.pending.is_some() {
            warn!(frame = self.next_frame, "inter-frame replaces an incomplete frame");
        }
        self.pending = Some(Pending {
            frame: self.next_frame,
            positions,
            normals: Vec::new(),
        });
        Ok(())
    }

    fn normals(&mut self, data: &[u8]) -> Result<(), StreamError> {
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| StreamError::Codec("normals without a pending frame".to_string()))?;
        pending.normals = LeReader::new(data).f32_vec(pending.positions.len())?;
        Ok(())
    }

    fn texture(&mut self, data: Vec<u8>) -> Result<DecodedFrame, StreamError> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| StreamError::Codec("texture without a pending frame".to_string()))?;
        let key = self
            .keyframe
            .as_ref()
            .ok_or_else(|| StreamError::Codec("texture before any keyframe".to_string()))?;
        self.next_frame = pending.frame + 1;
        Ok(DecodedFrame {
            frame: pending.frame,
            vertices: pending.positions,
            faces: key.faces.clone(),
            uvs: key.uvs.clone(),
            normals: pending.normals,
            texture: data,
            texture_encoding: self.texture_encoding,
        })
    }
}

impl ChunkCodec for MeshCodec {
    fn decode(&mut self, chunk: RawChunk) -> Result<Option<DecodedFrame>, StreamError> {
        match chunk.kind() {
            ChunkType::Keyframe => self.keyframe(&chunk.data).map(|_| None),
            ChunkType::InterFrame => self.inter_frame(&chunk.data).map(|_| None),
            ChunkType::Normals => self.normals(&chunk.data).map(|_| None),
            ChunkType::Texture => self.texture(chunk.data).map(Some),
            _ => Ok(None),
        }
    }

    fn reset(&mut self) {
        self.keyframe = None;
        self.pending = None;
        self.next_frame = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ChunkHeader;
    use crate::testing::{inter_payload, keyframe_payload, triangle};

    fn chunk(kind: u8, data: Vec<u8>) -> RawChunk {
        RawChunk {
            header: ChunkHeader {
                kind: ChunkType::from_u8(kind),
                codec: 0,
                version: 1,
                size: data.len() as u32,
            },
            data,
        }
    }

    #[test]
    fn keyframe_then_texture_emits_a_frame() {
        let mut codec = MeshCodec::new(TextureEncoding::Astc);
        assert_eq!(codec.decode(chunk(10, triangle(7))).unwrap(), None);
        let frame = codec.decode(chunk(12, vec![0xAB; 4])).unwrap().unwrap();
        assert_eq!(frame.frame, 7);
        assert_eq!(frame.vertex_count(), 3);
        assert_eq!(frame.face_count(), 1);
        assert_eq!(frame.texture, vec![0xAB; 4]);
        assert_eq!(frame.texture_encoding, TextureEncoding::Astc);
        assert!(frame.normals.is_empty());
    }

    #[test]
    fn inter_frames_apply_scaled_deltas_and_count_up() {
        let mut codec = MeshCodec::new(TextureEncoding::Rgba);
        codec.decode(chunk(10, triangle(0))).unwrap();
        codec.decode(chunk(12, vec![])).unwrap();

        let deltas = [10, 0, 0, 0, 10, 0, 0, 0, 10];
        codec.decode(chunk(11, inter_payload(0.1, &deltas))).unwrap();
        codec.decode(chunk(14, vec![0u8; 9 * 4])).unwrap();
        let frame = codec.decode(chunk(12, vec![1])).unwrap().unwrap();

        assert_eq!(frame.frame, 1);
        assert!((frame.vertices[0] - 1.0).abs() < 1e-6);
        assert!((frame.vertices[3] - 1.0).abs() < 1e-6);
        assert!((frame.vertices[4] - 1.0).abs() < 1e-6);
        assert!((frame.vertices[8] - 1.0).abs() < 1e-6);
        assert_eq!(frame.normals.len(), 9);
        assert_eq!(frame.faces, vec![0, 1, 2]);
    }

    #[test]
    fn inter_frame_without_keyframe_is_an_error() {
        let mut codec = MeshCodec::new(TextureEncoding::Rgba);
        assert!(matches!(
            codec.decode(chunk(11, inter_payload(1.0, &[0; 9]))),
            Err(StreamError::Codec(_))
        ));
    }

    #[test]
    fn truncated_keyframe_is_rejected() {
        let mut codec = MeshCodec::new(TextureEncoding::Rgba);
        let mut payload = triangle(0);
        payload.truncate(20);
        assert!(codec.decode(chunk(10, payload)).is_err());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut codec = MeshCodec::new(TextureEncoding::Rgba);
        let payload = keyframe_payload(0, &[0.0; 9], &[0, 1, 3], &[0.0; 6]);
        assert!(matches!(
            codec.decode(chunk(10, payload)),
            Err(StreamError::Codec(_))
        ));
    }

    #[test]
    fn reset_forgets_the_keyframe() {
        let mut codec = MeshCodec::new(TextureEncoding::Rgba);
        codec.decode(chunk(10, triangle(0))).unwrap();
        codec.reset();
        assert!(codec.decode(chunk(12, vec![])).is_err());
    }
}
