//! Localization request and response messages.
//!
//! Field numbers are fixed by the positioning service and must not change.
//!
//! | Message | Fields |
//! |---|---|
//! | `Request` | operation 1, request_id 2, external 3, internal 4, total_num_of_frames 5, frame_order 6, tracking_id 7, source_image 9, dev_radius 20 |
//! | `Position` | lat 1, lon 2, height 3 |
//! | `Quaternion` | y 1, x 2, z 3, w 4 |
//! | `ExternalParameters` | position 1, quaternion 2 |
//! | `InternalParameters` | scene_height 1, scene_width 2, fov 3, projection_matrix 4 |
//! | `Response` | request_id 1, tracking_id 2, response 3, error 4 |
//! | `ResponseOffsets` | position 1, yaw_offset_quaternion 2, pitch_offset_quaternion 3 |
//! | `ResponseError` | code 1, message 2 |

use vantage_geo::Quaternion;
use vantage_types::GeoPosition;

use crate::wire::{WireError, WireReader, WireType, WireWriter};

/// Search radius sent with every request, in metres.
pub const DEFAULT_DEV_RADIUS: u64 = 30;

/// Operation requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Unsupported = 0,
    Alignment = 4,
    Reloc = 5,
}

impl Operation {
    fn from_code(code: u64) -> Self {
        match code {
            4 => Operation::Alignment,
            5 => Operation::Reloc,
            _ => Operation::Unsupported,
        }
    }
}

/// Localization flavour, folded into the low digit of a request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Align = 1,
    Refine = 2,
    HitScan = 3,
    StaticMultiframe = 4,
    Relocalize = 5,
    DynamicMultiframe = 6,
}

impl MessageType {
    /// `counter * 10 + kind`, so the response id reveals which flavour it
    /// answers.
    pub fn request_id(self, counter: u64) -> u64 {
        counter * 10 + self as u64
    }
}

/// Device pose estimate sent with a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalParameters {
    pub position: GeoPosition,
    pub orientation: Quaternion,
}

/// Camera intrinsics of the captured frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InternalParameters {
    pub scene_width: u32,
    pub scene_height: u32,
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Row-major projection matrix (`e00, e01, .. e33`).
    pub projection: [f64; 16],
}

/// One frame of a multi-frame localization scan.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizationRequest {
    pub operation: Operation,
    pub request_id: u64,
    pub external: ExternalParameters,
    pub internal: InternalParameters,
    pub total_frames: u32,
    pub frame_order: u32,
    /// Always written, even when empty.
    pub tracking_id: String,
    pub source_image: Vec<u8>,
    pub dev_radius: u64,
}

impl LocalizationRequest {
    /// An alignment request with the default search radius.
    pub fn alignment(
        request_id: u64,
        external: ExternalParameters,
        internal: InternalParameters,
        total_frames: u32,
        frame_order: u32,
        source_image: Vec<u8>,
    ) -> Self {
        Self {
            operation: Operation::Alignment,
            request_id,
            external,
            internal,
            total_frames,
            frame_order,
            tracking_id: String::new(),
            source_image,
            dev_radius: DEFAULT_DEV_RADIUS,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.varint_field(1, self.operation as u64);
        w.varint_field(2, self.request_id);
        w.message_field(3, |ext| {
            ext.message_field(1, |p| write_position(p, &self.external.position));
            ext.message_field(2, |q| write_quaternion(q, &self.external.orientation));
        });
        w.message_field(4, |int| {
            int.varint_field(1, u64::from(self.internal.scene_height));
            int.varint_field(2, u64::from(self.internal.scene_width));
            int.float_field(3, self.internal.fov);
            int.packed_doubles_field(4, &self.internal.projection);
        });
        w.varint_field(5, u64::from(self.total_frames));
        w.varint_field(6, u64::from(self.frame_order));
        w.string_field(7, &self.tracking_id);
        w.bytes_field(9, &self.source_image);
        w.varint_field(20, self.dev_radius);
        w.into_bytes()
    }

    /// Parse a request; used by service fakes and diagnostics.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = WireReader::new(bytes);
        let mut req = Self {
            operation: Operation::Unsupported,
            request_id: 0,
            external: ExternalParameters {
                position: GeoPosition::default(),
                orientation: Quaternion::identity(),
            },
            internal: InternalParameters {
                scene_width: 0,
                scene_height: 0,
                fov: 0.0,
                projection: [0.0; 16],
            },
            total_frames: 0,
            frame_order: 0,
            tracking_id: String::new(),
            source_image: Vec::new(),
            dev_radius: 0,
        };
        while !r.is_empty() {
            match r.read_tag()? {
                (1, WireType::Varint) => req.operation = Operation::from_code(r.read_varint()?),
                (2, WireType::Varint) => req.request_id = r.read_varint()?,
                (3, WireType::LengthDelimited) => req.external = read_external(r.read_bytes()?)?,
                (4, WireType::LengthDelimited) => req.internal = read_internal(r.read_bytes()?)?,
                (5, WireType::Varint) => req.total_frames = r.read_varint()? as u32,
                (6, WireType::Varint) => req.frame_order = r.read_varint()? as u32,
                (7, WireType::LengthDelimited) => req.tracking_id = r.read_string(7)?,
                (9, WireType::LengthDelimited) => req.source_image = r.read_bytes()?.to_vec(),
                (20, WireType::Varint) => req.dev_radius = r.read_varint()?,
                (_, wt) => r.skip(wt)?,
            }
        }
        Ok(req)
    }
}

/// Corrections computed by the service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseOffsets {
    pub position: GeoPosition,
    pub yaw_offset: Quaternion,
    pub pitch_offset: Quaternion,
}

impl Default for ResponseOffsets {
    fn default() -> Self {
        Self {
            position: GeoPosition::default(),
            yaw_offset: Quaternion::identity(),
            pitch_offset: Quaternion::identity(),
        }
    }
}

/// Error reported by the service in place of offsets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

/// Answer to a scan, sent once after its final frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalizationResponse {
    pub request_id: u64,
    pub tracking_id: String,
    pub offsets: Option<ResponseOffsets>,
    pub error: Option<ResponseError>,
}

impl LocalizationResponse {
    pub fn success(request_id: u64, offsets: ResponseOffsets) -> Self {
        Self {
            request_id,
            offsets: Some(offsets),
            ..Self::default()
        }
    }

    pub fn failure(request_id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            request_id,
            error: Some(ResponseError {
                code,
                message: message.into(),
            }),
            ..Self::default()
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.varint_field(1, self.request_id);
        if !self.tracking_id.is_empty() {
            w.string_field(2, &self.tracking_id);
        }
        if let Some(offsets) = &self.offsets {
            w.message_field(3, |o| {
                o.message_field(1, |p| write_position(p, &offsets.position));
                o.message_field(2, |q| write_quaternion(q, &offsets.yaw_offset));
                o.message_field(3, |q| write_quaternion(q, &offsets.pitch_offset));
            });
        }
        if let Some(error) = &self.error {
            w.message_field(4, |e| {
                e.varint_field(1, error.code as u64);
                e.string_field(2, &error.message);
            });
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = WireReader::new(bytes);
        let mut resp = Self::default();
        while !r.is_empty() {
            match r.read_tag()? {
                (1, WireType::Varint) => resp.request_id = r.read_varint()?,
                (2, WireType::LengthDelimited) => resp.tracking_id = r.read_string(2)?,
                (3, WireType::LengthDelimited) => {
                    resp.offsets = Some(read_offsets(r.read_bytes()?)?)
                }
                (4, WireType::LengthDelimited) => resp.error = Some(read_error(r.read_bytes()?)?),
                (_, wt) => r.skip(wt)?,
            }
        }
        Ok(resp)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Nested messages
// ────────────────────────────────────────────────────────────────────────────

fn write_position(w: &mut WireWriter, p: &GeoPosition) {
    w.double_field(1, p.latitude);
    w.double_field(2, p.longitude);
    w.double_field(3, p.altitude);
}

fn write_quaternion(w: &mut WireWriter, q: &Quaternion) {
    w.double_field(1, q.y);
    w.double_field(2, q.x);
    w.double_field(3, q.z);
    w.double_field(4, q.w);
}

fn read_position(bytes: &[u8]) -> Result<GeoPosition, WireError> {
    let mut r = WireReader::new(bytes);
    let mut p = GeoPosition::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Fixed64) => p.latitude = r.read_double()?,
            (2, WireType::Fixed64) => p.longitude = r.read_double()?,
            (3, WireType::Fixed64) => p.altitude = r.read_double()?,
            (_, wt) => r.skip(wt)?,
        }
    }
    Ok(p)
}

fn read_quaternion(bytes: &[u8]) -> Result<Quaternion, WireError> {
    let mut r = WireReader::new(bytes);
    let mut q = Quaternion::new(0.0, 0.0, 0.0, 0.0);
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Fixed64) => q.y = r.read_double()?,
            (2, WireType::Fixed64) => q.x = r.read_double()?,
            (3, WireType::Fixed64) => q.z = r.read_double()?,
            (4, WireType::Fixed64) => q.w = r.read_double()?,
            (_, wt) => r.skip(wt)?,
        }
    }
    Ok(q)
}

fn read_external(bytes: &[u8]) -> Result<ExternalParameters, WireError> {
    let mut r = WireReader::new(bytes);
    let mut ext = ExternalParameters {
        position: GeoPosition::default(),
        orientation: Quaternion::identity(),
    };
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::LengthDelimited) => ext.position = read_position(r.read_bytes()?)?,
            (2, WireType::LengthDelimited) => ext.orientation = read_quaternion(r.read_bytes()?)?,
            (_, wt) => r.skip(wt)?,
        }
    }
    Ok(ext)
}

fn read_internal(bytes: &[u8]) -> Result<InternalParameters, WireError> {
    let mut r = WireReader::new(bytes);
    let mut int = InternalParameters {
        scene_width: 0,
        scene_height: 0,
        fov: 0.0,
        projection: [0.0; 16],
    };
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Varint) => int.scene_height = r.read_varint()? as u32,
            (2, WireType::Varint) => int.scene_width = r.read_varint()? as u32,
            (3, WireType::Fixed32) => int.fov = r.read_float()?,
            (4, WireType::LengthDelimited) => {
                for (slot, v) in int.projection.iter_mut().zip(r.read_packed_doubles()?) {
                    *slot = v;
                }
            }
            (_, wt) => r.skip(wt)?,
        }
    }
    Ok(int)
}

fn read_offsets(bytes: &[u8]) -> Result<ResponseOffsets, WireError> {
    let mut r = WireReader::new(bytes);
    let mut offsets = ResponseOffsets::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::LengthDelimited) => offsets.position = read_position(r.read_bytes()?)?,
            (2, WireType::LengthDelimited) => offsets.yaw_offset = read_quaternion(r.read_bytes()?)?,
            (3, WireType::LengthDelimited) => {
                offsets.pitch_offset = read_quaternion(r.read_bytes()?)?
            }
            (_, wt) => r.skip(wt)?,
        }
    }
    Ok(offsets)
}

fn read_error(bytes: &[u8]) -> Result<ResponseError, WireError> {
    let mut r = WireReader::new(bytes);
    let mut error = ResponseError::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Varint) => error.code = r.read_varint()? as i64,
            (2, WireType::LengthDelimited) => error.message = r.read_string(2)?,
            (_, wt) => r.skip(wt)?,
        }
    }
    Ok(error)
}
