//! Post-processing of decoded pictures.
//!
//! The pipeline only decides when to post-process and with which profile; the
//! filtering itself sits behind [`PostProcessor`]. [`DeblockFilter`] is a
//! small block-edge smoother used when no other implementation is supplied.

use std::fmt::Display;

use crate::structs::format::{Chroma, PixelFormat};
use crate::structs::frame::{PictureType, QuantTable};
use crate::structs::picture::Plane;

/// Block size whose edges the deblocking filter smooths.
pub const DEBLOCK_BLOCK: usize = 8;
/// Quantiser assumed when the codec exports none.
pub const DEFAULT_QP: u8 = 2;

/// Filter profile chosen from the chroma subsampling of the decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessProfile {
    Yuv444,
    Yuv422,
    Yuv411,
    Yuv420,
}

impl PostProcessProfile {
    pub fn for_format(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Yuv444p => Self::Yuv444,
            PixelFormat::Yuv422p | PixelFormat::Yuyv422 => Self::Yuv422,
            PixelFormat::Yuv411p => Self::Yuv411,
            _ => Self::Yuv420,
        }
    }

    /// Profile for pictures already in a renderer chroma; RV24 has none.
    pub fn for_chroma(chroma: Chroma) -> Option<Self> {
        match chroma {
            Chroma::I420 => Some(Self::Yuv420),
            Chroma::I422 => Some(Self::Yuv422),
            Chroma::I444 => Some(Self::Yuv444),
            Chroma::Rv24 => None,
        }
    }

    /// Log2 chroma subsampling.
    pub fn chroma_shift(self) -> (u32, u32) {
        match self {
            Self::Yuv444 => (0, 0),
            Self::Yuv422 => (1, 0),
            Self::Yuv411 => (2, 0),
            Self::Yuv420 => (1, 1),
        }
    }
}

impl Display for PostProcessProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yuv444 => write!(f, "4:4:4"),
            Self::Yuv422 => write!(f, "4:2:2"),
            Self::Yuv411 => write!(f, "4:1:1"),
            Self::Yuv420 => write!(f, "4:2:0"),
        }
    }
}

/// A resolved post-processing mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcessMode {
    pub name: String,
    pub quality: u8,
    pub deblock_luma: bool,
    pub deblock_chroma: bool,
}

pub trait PostProcessor: Send {
    /// Resolves a mode name at the given quality, `None` if unknown.
    fn mode_by_name(&self, name: &str, quality: u8) -> Option<PostProcessMode>;

    /// Filters `src` into `dst`. Both follow the decoded picture's planar layout.
    #[allow(clippy::too_many_arguments)]
    fn process(
        &mut self,
        src: &[Plane],
        dst: &mut [Plane],
        width: usize,
        height: usize,
        qscale: Option<&QuantTable>,
        mode: &PostProcessMode,
        profile: PostProcessProfile,
        picture_type: PictureType,
    );
}

/// Smooths 8x8 block edges whose step is small relative to the quantiser.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeblockFilter;

#[inline]
fn smooth(p: u8, q: u8, limit: i32) -> Option<(u8, u8)> {
    let (p, q) = (p as i32, q as i32);
    if p == q || (p - q).abs() >= limit {
        return None;
    }
    Some((((3 * p + q + 2) >> 2) as u8, ((p + 3 * q + 2) >> 2) as u8))
}

impl DeblockFilter {
    fn copy_plane(src: &Plane, dst: &mut Plane) {
        let row_bytes = src.pitch.min(dst.pitch);
        for line in 0..src.lines.min(dst.lines) {
            dst.row_mut(line)[..row_bytes].copy_from_slice(&src.row(line)[..row_bytes]);
        }
    }

    /// Filters one plane in place. `(sx, sy)` maps plane positions back to
    /// luma positions for the quantiser lookup.
    fn deblock_plane(
        plane: &mut Plane,
        width: usize,
        height: usize,
        (sx, sy): (u32, u32),
        qscale: Option<&QuantTable>,
    ) {
        let limit_at = |x: usize, y: usize| {
            let qp = qscale
                .and_then(|table| table.at(x << sx, y << sy))
                .filter(|&qp| qp > 0)
                .unwrap_or(DEFAULT_QP);
            qp as i32 * 2
        };

        for y in 0..height {
            let row = plane.row_mut(y);
            for x in (DEBLOCK_BLOCK..width).step_by(DEBLOCK_BLOCK) {
                if let Some((p, q)) = smooth(row[x - 1], row[x], limit_at(x, y)) {
                    row[x - 1] = p;
                    row[x] = q;
                }
            }
        }

        let pitch = plane.pitch;
        for y in (DEBLOCK_BLOCK..height).step_by(DEBLOCK_BLOCK) {
            for x in 0..width {
                let (above, below) = ((y - 1) * pitch + x, y * pitch + x);
                if let Some((p, q)) = smooth(plane.data[above], plane.data[below], limit_at(x, y)) {
                    plane.data[above] = p;
                    plane.data[below] = q;
                }
            }
        }
    }
}

impl PostProcessor for DeblockFilter {
    fn mode_by_name(&self, name: &str, quality: u8) -> Option<PostProcessMode> {
        let (deblock_luma, deblock_chroma) = match name {
            "default" | "deblock" => (quality >= 1, quality >= 3),
            "luma" => (quality >= 1, false),
            "none" => (false, false),
            _ => return None,
        };

        Some(PostProcessMode {
            name: name.to_string(),
            quality,
            deblock_luma,
            deblock_chroma,
        })
    }

    fn process(
        &mut self,
        src: &[Plane],
        dst: &mut [Plane],
        width: usize,
        height: usize,
        qscale: Option<&QuantTable>,
        mode: &PostProcessMode,
        profile: PostProcessProfile,
        _picture_type: PictureType,
    ) {
        let (csx, csy) = profile.chroma_shift();

        for (index, (src, dst)) in src.iter().zip(dst.iter_mut()).enumerate() {
            Self::copy_plane(src, dst);

            let (shift, enabled) = if index == 0 {
                ((0, 0), mode.deblock_luma)
            } else {
                ((csx, csy), mode.deblock_chroma)
            };
            if !enabled {
                continue;
            }

            let plane_width = width.div_ceil(1 << shift.0).min(dst.pitch);
            let plane_height = height.div_ceil(1 << shift.1).min(dst.lines);
            Self::deblock_plane(dst, plane_width, plane_height, shift, qscale);
        }
    }
}
