use std::fmt::Display;

use crate::utils::errors::FormatError;

/// Fixed-point scale of [`VideoFormat::aspect`]: a 4:3 picture is `4 * ASPECT_FACTOR / 3`.
pub const ASPECT_FACTOR: u32 = 432_000;

/// Decoder-native pixel layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Yuv420p,
    /// Packed 4:2:2, `Y0 U Y1 V` byte order.
    Yuyv422,
    Rgb24,
    Bgr24,
    Yuv422p,
    Yuv444p,
    Yuv410p,
    Yuv411p,
    Gray8,
}

impl PixelFormat {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Yuv420p,
            1 => Self::Yuyv422,
            2 => Self::Rgb24,
            3 => Self::Bgr24,
            4 => Self::Yuv422p,
            5 => Self::Yuv444p,
            6 => Self::Yuv410p,
            7 => Self::Yuv411p,
            8 => Self::Gray8,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Yuv420p => 0,
            Self::Yuyv422 => 1,
            Self::Rgb24 => 2,
            Self::Bgr24 => 3,
            Self::Yuv422p => 4,
            Self::Yuv444p => 5,
            Self::Yuv410p => 6,
            Self::Yuv411p => 7,
            Self::Gray8 => 8,
        }
    }

    /// Renderer chroma that can hold this format without conversion.
    pub fn native_chroma(self) -> Option<Chroma> {
        match self {
            Self::Yuv420p => Some(Chroma::I420),
            Self::Yuv422p => Some(Chroma::I422),
            Self::Yuv444p => Some(Chroma::I444),
            Self::Rgb24 => Some(Chroma::Rv24),
            _ => None,
        }
    }

    /// Chroma the renderer is asked for: the native one, or I420 when a
    /// conversion path exists.
    pub fn output_chroma(self) -> Result<Chroma, FormatError> {
        if let Some(chroma) = self.native_chroma() {
            return Ok(chroma);
        }

        match self {
            Self::Yuv410p | Self::Yuv411p | Self::Yuyv422 => Ok(Chroma::I420),
            _ => Err(FormatError::Unsupported(self)),
        }
    }

    /// Horizontal and vertical chroma subsampling as log2 shifts, planar YUV only.
    pub fn chroma_shift(self) -> Option<(u32, u32)> {
        match self {
            Self::Yuv420p => Some((1, 1)),
            Self::Yuv422p => Some((1, 0)),
            Self::Yuv444p => Some((0, 0)),
            Self::Yuv410p => Some((2, 2)),
            Self::Yuv411p => Some((2, 0)),
            _ => None,
        }
    }

    /// `(row_bytes, lines)` of every plane for a `width`x`height` picture.
    pub fn plane_geometry(self, width: usize, height: usize) -> Vec<(usize, usize)> {
        match self {
            Self::Yuyv422 => vec![(width.div_ceil(2) * 4, height)],
            Self::Rgb24 | Self::Bgr24 => vec![(width * 3, height)],
            Self::Gray8 => vec![(width, height)],
            _ => {
                let (sx, sy) = self.chroma_shift().unwrap_or((0, 0));
                let cw = width.div_ceil(1 << sx);
                let ch = height.div_ceil(1 << sy);
                vec![(width, height), (cw, ch), (cw, ch)]
            }
        }
    }

    pub fn picture_size(self, width: usize, height: usize) -> usize {
        self.plane_geometry(width, height)
            .iter()
            .map(|(w, h)| w * h)
            .sum()
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Yuv420p => "yuv420p",
            Self::Yuyv422 => "yuyv422",
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Yuv410p => "yuv410p",
            Self::Yuv411p => "yuv411p",
            Self::Gray8 => "gray8",
        };
        write!(f, "{name}")
    }
}

/// Picture layouts the renderer allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chroma {
    I420,
    I422,
    I444,
    Rv24,
}

impl Chroma {
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            Self::I420 => *b"I420",
            Self::I422 => *b"I422",
            Self::I444 => *b"I444",
            Self::Rv24 => *b"RV24",
        }
    }

    pub fn plane_geometry(self, width: usize, height: usize) -> Vec<(usize, usize)> {
        match self {
            Self::I420 => PixelFormat::Yuv420p.plane_geometry(width, height),
            Self::I422 => PixelFormat::Yuv422p.plane_geometry(width, height),
            Self::I444 => PixelFormat::Yuv444p.plane_geometry(width, height),
            Self::Rv24 => PixelFormat::Rgb24.plane_geometry(width, height),
        }
    }
}

impl Display for Chroma {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.fourcc()))
    }
}

/// Output format negotiated with the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub chroma: Chroma,
    pub aspect: u32,
}

impl VideoFormat {
    /// Builds a format, deriving the aspect from the picture size when the
    /// stream does not carry one.
    pub fn new(width: u32, height: u32, chroma: Chroma, aspect_ratio: f32) -> Self {
        let mut aspect = (ASPECT_FACTOR as f32 * aspect_ratio) as u32;
        if aspect == 0 && height != 0 {
            aspect = (ASPECT_FACTOR as u64 * width as u64 / height as u64) as u32;
        }

        Self {
            width,
            height,
            chroma,
            aspect,
        }
    }
}

/// Nominal frame rate as `num / den` frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn is_known(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    /// Offset of the `index`-th frame after an anchor, rounded to the nearest tick.
    pub fn offset(&self, index: u64, ticks_per_second: u64) -> i64 {
        if !self.is_known() {
            return 0;
        }

        let num = index as u128 * ticks_per_second as u128 * self.den as u128;
        let den = self.num as u128;
        ((num * 2 + den) / (den * 2)) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_chroma_mapping() {
        assert_eq!(PixelFormat::Yuv420p.output_chroma(), Ok(Chroma::I420));
        assert_eq!(PixelFormat::Yuv444p.output_chroma(), Ok(Chroma::I444));
        assert_eq!(PixelFormat::Yuv410p.output_chroma(), Ok(Chroma::I420));
        assert_eq!(PixelFormat::Yuyv422.output_chroma(), Ok(Chroma::I420));
        assert_eq!(
            PixelFormat::Bgr24.output_chroma(),
            Err(FormatError::Unsupported(PixelFormat::Bgr24))
        );
    }

    #[test]
    fn odd_sizes_round_up_chroma() {
        let planes = PixelFormat::Yuv420p.plane_geometry(5, 3);
        assert_eq!(planes, vec![(5, 3), (3, 2), (3, 2)]);

        let planes = PixelFormat::Yuv410p.plane_geometry(10, 9);
        assert_eq!(planes, vec![(10, 9), (3, 3), (3, 3)]);
    }

    #[test]
    fn frame_rate_offset_rounds() {
        let pal = FrameRate::new(25, 1);
        assert_eq!(pal.offset(1, 1_000_000), 40_000);
        assert_eq!(pal.offset(2, 1_000), 80);

        let ntsc = FrameRate::new(30_000, 1_001);
        assert_eq!(ntsc.offset(1, 1_000_000), 33_367);
        assert_eq!(FrameRate::default().offset(3, 1_000_000), 0);
    }

    #[test]
    fn aspect_falls_back_to_picture_size() {
        let format = VideoFormat::new(640, 480, Chroma::I420, 0.0);
        assert_eq!(format.aspect, 4 * ASPECT_FACTOR / 3);
    }
}
