//! Fixed-layout binary encoding of [`FaceRecord`].
//!
//! Every field is written little-endian in declaration order behind an
//! 8-byte header, so the buffer is self-contained and its size is constant:
//!
//! ```text
//! offset  size  field
//!      0     4  magic "FHFR"
//!      4     2  layout version (u16)
//!      6     2  reserved, zero
//!      8     4  track_id (i32)
//!     12     4  face_index (i32)
//!     16    16  rect x, y, width, height (i32 x 4)
//!     32     4  detect_score (f32)
//!     36    40  keypoints x0, y0 .. x4, y4 (f32 x 10)
//!     76    12  roll, yaw, pitch (f32 x 3)
//!     88    20  quality (f32 x 5)
//! ```
//!
//! Floats travel as raw bits, so decoding reproduces them exactly.

use crate::types::{FaceRecord, FaceRect, Point2f, KEYPOINT_COUNT};
use thiserror::Error;

const MAGIC: [u8; 4] = *b"FHFR";
const LAYOUT_VERSION: u16 = 1;
const HEADER_LEN: usize = 8;

/// Total encoded size of one face record.
pub const FACE_RECORD_LEN: usize = HEADER_LEN + 4 + 4 + 16 + 4 + KEYPOINT_COUNT * 8 + 12 + KEYPOINT_COUNT * 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("face record buffer has {actual} bytes, expected {expected}", expected = FACE_RECORD_LEN)]
    InvalidLength { actual: usize },
    #[error("face record buffer has a bad magic header")]
    BadMagic,
    #[error("unsupported face record layout version {0}")]
    UnsupportedVersion(u16),
}

/// An encoded face record. Opaque to callers; decode with [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceRecordBytes(Vec<u8>);

impl FaceRecordBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn decode(&self) -> Result<FaceRecord, CodecError> {
        decode(&self.0)
    }
}

impl AsRef<[u8]> for FaceRecordBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encode a face record. The layout has no variable-length parts, so this cannot fail.
pub fn encode(record: &FaceRecord) -> FaceRecordBytes {
    let mut buf = Vec::with_capacity(FACE_RECORD_LEN);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&LAYOUT_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());

    buf.extend_from_slice(&record.track_id.to_le_bytes());
    buf.extend_from_slice(&record.face_index.to_le_bytes());
    for v in [record.rect.x, record.rect.y, record.rect.width, record.rect.height] {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf.extend_from_slice(&record.detect_score.to_bits().to_le_bytes());
    for p in &record.keypoints {
        buf.extend_from_slice(&p.x.to_bits().to_le_bytes());
        buf.extend_from_slice(&p.y.to_bits().to_le_bytes());
    }
    for v in [record.roll, record.yaw, record.pitch] {
        buf.extend_from_slice(&v.to_bits().to_le_bytes());
    }
    for q in &record.quality {
        buf.extend_from_slice(&q.to_bits().to_le_bytes());
    }

    debug_assert_eq!(buf.len(), FACE_RECORD_LEN);
    FaceRecordBytes(buf)
}

/// Decode a buffer produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<FaceRecord, CodecError> {
    if bytes.len() != FACE_RECORD_LEN {
        return Err(CodecError::InvalidLength { actual: bytes.len() });
    }
    if bytes[..4] != MAGIC {
        return Err(CodecError::BadMagic);
    }

    let mut reader = Reader { buf: bytes, pos: 4 };
    let version = reader.u16();
    if version != LAYOUT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let _reserved = reader.u16();

    let track_id = reader.i32();
    let face_index = reader.i32();
    let rect = FaceRect {
        x: reader.i32(),
        y: reader.i32(),
        width: reader.i32(),
        height: reader.i32(),
    };
    let detect_score = reader.f32();
    let mut keypoints = [Point2f::default(); KEYPOINT_COUNT];
    for p in keypoints.iter_mut() {
        p.x = reader.f32();
        p.y = reader.f32();
    }
    let roll = reader.f32();
    let yaw = reader.f32();
    let pitch = reader.f32();
    let mut quality = [0.0f32; KEYPOINT_COUNT];
    for q in quality.iter_mut() {
        *q = reader.f32();
    }

    Ok(FaceRecord {
        track_id,
        face_index,
        rect,
        detect_score,
        keypoints,
        roll,
        yaw,
        pitch,
        quality,
    })
}

/// Sequential little-endian reader over a buffer whose length was checked up front.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_bits(u32::from_le_bytes(self.take()))
    }
}
