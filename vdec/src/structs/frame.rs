use std::fmt::Display;
use std::sync::Arc;

use crate::structs::format::PixelFormat;
use crate::structs::picture::{PictureBuffer, Plane};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    I,
    P,
    B,
}

impl Display for PictureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PictureType::I => write!(f, "I"),
            PictureType::P => write!(f, "P"),
            PictureType::B => write!(f, "B"),
        }
    }
}

/// Per-macroblock quantiser values exported by the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    pub values: Vec<u8>,
    /// Macroblocks per row.
    pub stride: usize,
}

impl QuantTable {
    /// Quantiser of the macroblock covering luma position `(x, y)`.
    pub fn at(&self, x: usize, y: usize) -> Option<u8> {
        if self.stride == 0 {
            return None;
        }
        self.values.get((y >> 4) * self.stride + (x >> 4)).copied()
    }
}

/// Where the decoded pixels live.
#[derive(Debug)]
pub enum FrameData {
    /// Decoder-owned planes that must be copied into a pool picture.
    Owned(Vec<Plane>),
    /// Pixels decoded straight into a pool picture.
    Direct(Arc<PictureBuffer>),
}

/// A picture as produced by the decoder.
#[derive(Debug)]
pub struct DecodedFrame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub picture_type: PictureType,
    /// Later pictures may predict from this one.
    pub reference: bool,
    pub data: FrameData,
    pub qscale: Option<QuantTable>,
}

impl DecodedFrame {
    /// A frame whose first plane has no stride carries nothing to show.
    pub fn is_empty(&self) -> bool {
        match &self.data {
            FrameData::Owned(planes) => planes.first().is_none_or(|plane| plane.pitch == 0),
            FrameData::Direct(picture) => picture
                .planes()
                .first()
                .is_none_or(|plane| plane.pitch == 0),
        }
    }

    pub fn direct_picture(&self) -> Option<&Arc<PictureBuffer>> {
        match &self.data {
            FrameData::Direct(picture) => Some(picture),
            FrameData::Owned(_) => None,
        }
    }
}
