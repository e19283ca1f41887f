//! Builders for small in-memory containers used across the crate's tests.

use crate::container::FILE_HEADER_LEN;

pub(crate) fn chunk_bytes(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(9 + payload.len());
    out.push(kind);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

pub(crate) fn sequence_info_bytes(frames: u32, blocs: u32, fps: f32, tracks: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(36);
    out.extend_from_slice(&frames.to_le_bytes());
    out.extend_from_slice(&blocs.to_le_bytes());
    out.extend_from_slice(&fps.to_le_bytes());
    out.extend_from_slice(&1024u32.to_le_bytes());
    out.extend_from_slice(&2048u32.to_le_bytes());
    out.extend_from_slice(&164u32.to_le_bytes());
    out.extend_from_slice(&512u32.to_le_bytes());
    out.extend_from_slice(&512u32.to_le_bytes());
    out.extend_from_slice(&tracks.to_le_bytes());
    out
}

fn textures(bloc: &[(u8, Vec<u8>)]) -> u32 {
    bloc.iter().filter(|(kind, _)| *kind == 12).count() as u32
}

pub(crate) struct BuiltContainer {
    pub bytes: Vec<u8>,
    pub bloc_index_pos: u64,
}

/// Lays blocs out the way the bulk fetch expects them: a bloc chunk whose
/// payload is `(inter_frames + 1) * 16` bytes, then the bloc's frame chunks.
pub(crate) struct ContainerBuilder {
    fps: f32,
    frames: Option<u32>,
    blocs: Vec<Vec<(u8, Vec<u8>)>>,
    audio: Option<Vec<u8>>,
}

impl ContainerBuilder {
    pub fn new(fps: f32) -> Self {
        Self {
            fps,
            frames: None,
            blocs: Vec::new(),
            audio: None,
        }
    }

    pub fn bloc(mut self, chunks: &[(u8, Vec<u8>)]) -> Self {
        self.blocs.push(chunks.to_vec());
        self
    }

    pub fn frames(mut self, frames: u32) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn audio(mut self, track: Vec<u8>) -> Self {
        self.audio = Some(track);
        self
    }

    pub fn build(self) -> BuiltContainer {
        let frame_count = self
            .frames
            .unwrap_or_else(|| self.blocs.iter().map(|b| textures(b)).sum());
        let tracks = u32::from(self.audio.is_some());

        let mut bytes = vec![0u8; FILE_HEADER_LEN];
        bytes.extend(chunk_bytes(
            1,
            &sequence_info_bytes(frame_count, self.blocs.len() as u32, self.fps, tracks),
        ));
        bytes.resize(79, 0);

        let mut index = Vec::new();
        let mut keyframe_id = 0i32;
        for bloc in &self.blocs {
            let inter = textures(bloc).saturating_sub(1) as i32;
            let chunk_pos = bytes.len() as i32;
            bytes.extend(chunk_bytes(5, &vec![0u8; (inter as usize + 1) * 16]));
            for (kind, payload) in bloc {
                bytes.extend(chunk_bytes(*kind, payload));
            }
            index.extend_from_slice(&keyframe_id.to_le_bytes());
            index.extend_from_slice(&inter.to_le_bytes());
            index.extend_from_slice(&chunk_pos.to_le_bytes());
            index.extend_from_slice(&0i32.to_le_bytes());
            keyframe_id += inter + 1;
        }

        let bloc_index_pos = bytes.len() as u64;
        bytes.extend(chunk_bytes(3, &index));

        let mut track_index_pos = 0i32;
        if let Some(audio) = &self.audio {
            track_index_pos = bytes.len() as i32;
            let audio_pos = track_index_pos + 9 + 8;
            let mut entry = audio_pos.to_le_bytes().to_vec();
            entry.extend_from_slice(&0i32.to_le_bytes());
            bytes.extend(chunk_bytes(2, &entry));
            bytes.extend(chunk_bytes(21, audio));
        }

        bytes[4..6].copy_from_slice(&3i16.to_le_bytes());
        bytes[6..10].copy_from_slice(&30i32.to_le_bytes());
        bytes[14..18].copy_from_slice(&(bloc_index_pos as i32).to_le_bytes());
        bytes[22..26].copy_from_slice(&track_index_pos.to_le_bytes());

        BuiltContainer {
            bytes,
            bloc_index_pos,
        }
    }
}

/// Payload of a keyframe chunk (type 10).
pub(crate) fn keyframe_payload(frame: u32, positions: &[f32], faces: &[u32], uvs: &[f32]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&frame.to_le_bytes());
    out.extend_from_slice(&((positions.len() / 3) as u32).to_le_bytes());
    out.extend_from_slice(&((faces.len() / 3) as u32).to_le_bytes());
    positions.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes()));
    faces.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes()));
    uvs.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes()));
    out
}

/// Payload of an inter-frame chunk (type 11).
pub(crate) fn inter_payload(scale: f32, deltas: &[i16]) -> Vec<u8> {
    let mut out = scale.to_le_bytes().to_vec();
    deltas.iter().for_each(|d| out.extend_from_slice(&d.to_le_bytes()));
    out
}

/// A one-triangle keyframe.
pub(crate) fn triangle(frame: u32) -> Vec<u8> {
    keyframe_payload(
        frame,
        &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        &[0, 1, 2],
        &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
    )
}
