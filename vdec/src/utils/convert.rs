//! Software pixel-format conversion into renderer layouts.

use crate::structs::format::{Chroma, PixelFormat};
use crate::structs::picture::Plane;
use crate::utils::errors::FormatError;

/// Colour-space / subsampling conversion between a decoder pixel format and
/// a renderer chroma.
pub trait FormatConverter: Send {
    fn convert(
        &self,
        src_format: PixelFormat,
        src: &[Plane],
        width: usize,
        height: usize,
        dst_chroma: Chroma,
        dst: &mut [Plane],
    ) -> Result<(), FormatError>;
}

/// Reference converter covering every format whose output chroma is I420.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareConverter;

fn check_plane(index: usize, plane: &Plane, row_bytes: usize, lines: usize) -> Result<(), FormatError> {
    let need = if lines == 0 {
        0
    } else {
        plane.pitch * (lines - 1) + row_bytes
    };

    if plane.pitch < row_bytes || plane.data.len() < need {
        return Err(FormatError::PlaneTooSmall {
            plane: index,
            need,
            have: plane.data.len(),
        });
    }
    Ok(())
}

fn check_planes(planes: &[Plane], geometry: &[(usize, usize)]) -> Result<(), FormatError> {
    for (index, (plane, &(row_bytes, lines))) in planes.iter().zip(geometry).enumerate() {
        check_plane(index, plane, row_bytes, lines)?;
    }
    Ok(())
}

#[inline(always)]
fn average(samples: [u8; 4]) -> u8 {
    let sum: u32 = samples.iter().map(|&s| s as u32).sum();
    ((sum + 2) >> 2) as u8
}

impl SoftwareConverter {
    /// Planar YUV with any subsampling to 4:2:0 planar.
    ///
    /// Every output chroma sample averages the source samples that cover its
    /// 2x2 luma block.
    fn planar_to_i420(
        src_format: PixelFormat,
        src: &[Plane],
        width: usize,
        height: usize,
        dst: &mut [Plane],
    ) -> Result<(), FormatError> {
        let Some((sx, sy)) = src_format.chroma_shift() else {
            return Err(FormatError::NoConversion(src_format, Chroma::I420));
        };

        let src_geometry = src_format.plane_geometry(width, height);
        check_planes(src, &src_geometry)?;
        check_planes(dst, &Chroma::I420.plane_geometry(width, height))?;

        for line in 0..height {
            dst[0].row_mut(line)[..width].copy_from_slice(&src[0].row(line)[..width]);
        }

        let (src_cw, src_ch) = src_geometry[1];
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));

        for plane in 1..3 {
            let source = &src[plane];
            let sample = |lx: usize, ly: usize| {
                let x = (lx.min(width - 1) >> sx).min(src_cw - 1);
                let y = (ly.min(height - 1) >> sy).min(src_ch - 1);
                source.data[y * source.pitch + x]
            };

            for y in 0..ch {
                let row = dst[plane].row_mut(y);
                for (x, out) in row[..cw].iter_mut().enumerate() {
                    let (lx, ly) = (x * 2, y * 2);
                    *out = average([
                        sample(lx, ly),
                        sample(lx + 1, ly),
                        sample(lx, ly + 1),
                        sample(lx + 1, ly + 1),
                    ]);
                }
            }
        }

        Ok(())
    }

    /// Packed `Y0 U Y1 V` to 4:2:0 planar, averaging chroma of line pairs.
    fn yuyv_to_i420(
        src: &[Plane],
        width: usize,
        height: usize,
        dst: &mut [Plane],
    ) -> Result<(), FormatError> {
        check_planes(src, &PixelFormat::Yuyv422.plane_geometry(width, height))?;
        check_planes(dst, &Chroma::I420.plane_geometry(width, height))?;

        let packed = &src[0];
        for line in 0..height {
            let row = packed.row(line);
            for (x, out) in dst[0].row_mut(line)[..width].iter_mut().enumerate() {
                *out = row[x * 2];
            }
        }

        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        for (plane, offset) in [(1, 1), (2, 3)] {
            for y in 0..ch {
                let top = packed.row(y * 2);
                let bottom = packed.row((y * 2 + 1).min(height - 1));
                for (x, out) in dst[plane].row_mut(y)[..cw].iter_mut().enumerate() {
                    let i = x * 4 + offset;
                    *out = ((top[i] as u16 + bottom[i] as u16 + 1) >> 1) as u8;
                }
            }
        }

        Ok(())
    }
}

impl FormatConverter for SoftwareConverter {
    fn convert(
        &self,
        src_format: PixelFormat,
        src: &[Plane],
        width: usize,
        height: usize,
        dst_chroma: Chroma,
        dst: &mut [Plane],
    ) -> Result<(), FormatError> {
        if dst_chroma != Chroma::I420 {
            return Err(FormatError::NoConversion(src_format, dst_chroma));
        }
        if dst.len() != 3 {
            return Err(FormatError::PlaneCountMismatch {
                src: src.len(),
                dst: dst.len(),
            });
        }
        if width == 0 || height == 0 {
            return Ok(());
        }

        match src_format {
            PixelFormat::Yuyv422 if src.len() == 1 => Self::yuyv_to_i420(src, width, height, dst),
            PixelFormat::Yuv420p
            | PixelFormat::Yuv422p
            | PixelFormat::Yuv444p
            | PixelFormat::Yuv410p
            | PixelFormat::Yuv411p
                if src.len() == 3 =>
            {
                Self::planar_to_i420(src_format, src, width, height, dst)
            }
            PixelFormat::Yuyv422
            | PixelFormat::Yuv420p
            | PixelFormat::Yuv422p
            | PixelFormat::Yuv444p
            | PixelFormat::Yuv410p
            | PixelFormat::Yuv411p => Err(FormatError::PlaneCountMismatch {
                src: src.len(),
                dst: dst.len(),
            }),
            _ => Err(FormatError::NoConversion(src_format, dst_chroma)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::picture::PLANE_ALIGN;

    fn i420(width: usize, height: usize) -> Vec<Plane> {
        Chroma::I420
            .plane_geometry(width, height)
            .into_iter()
            .map(|(row_bytes, lines)| Plane::new(row_bytes, lines, PLANE_ALIGN))
            .collect()
    }

    #[test]
    fn yuv410_chroma_is_replicated() -> Result<(), FormatError> {
        let src = vec![
            Plane::from_packed((0..16).collect(), 4, 4),
            Plane::from_packed(vec![100], 1, 1),
            Plane::from_packed(vec![200], 1, 1),
        ];
        let mut dst = i420(4, 4);

        SoftwareConverter.convert(PixelFormat::Yuv410p, &src, 4, 4, Chroma::I420, &mut dst)?;

        assert_eq!(&dst[0].row(3)[..4], [12, 13, 14, 15]);
        assert!(dst[1].visible_rows().all(|row| row == [100, 100]));
        assert!(dst[2].visible_rows().all(|row| row == [200, 200]));
        Ok(())
    }

    #[test]
    fn yuv411_averages_line_pairs() -> Result<(), FormatError> {
        let src = vec![
            Plane::from_packed(vec![0; 8], 4, 2),
            Plane::from_packed(vec![10, 20], 1, 2),
            Plane::from_packed(vec![30, 31], 1, 2),
        ];
        let mut dst = i420(4, 2);

        SoftwareConverter.convert(PixelFormat::Yuv411p, &src, 4, 2, Chroma::I420, &mut dst)?;

        assert_eq!(&dst[1].row(0)[..2], [15, 15]);
        assert_eq!(&dst[2].row(0)[..2], [31, 31]);
        Ok(())
    }

    #[test]
    fn yuyv_splits_packed_samples() -> Result<(), FormatError> {
        // Y0 U Y1 V for a 2x2 picture.
        let src = vec![Plane::from_packed(vec![1, 50, 2, 90, 3, 70, 4, 110], 4, 2)];
        let mut dst = i420(2, 2);

        SoftwareConverter.convert(PixelFormat::Yuyv422, &src, 2, 2, Chroma::I420, &mut dst)?;

        assert_eq!(&dst[0].row(0)[..2], [1, 2]);
        assert_eq!(&dst[0].row(1)[..2], [3, 4]);
        assert_eq!(dst[1].row(0)[0], 60);
        assert_eq!(dst[2].row(0)[0], 100);
        Ok(())
    }

    #[test]
    fn undefined_pair_is_rejected() {
        let src = vec![Plane::from_packed(vec![0; 12], 6, 2)];
        let mut dst = i420(2, 2);

        assert_eq!(
            SoftwareConverter.convert(PixelFormat::Bgr24, &src, 2, 2, Chroma::I420, &mut dst),
            Err(FormatError::NoConversion(PixelFormat::Bgr24, Chroma::I420))
        );
    }

    #[test]
    fn short_plane_is_rejected() {
        let src = vec![
            Plane::from_packed(vec![0; 4], 4, 1),
            Plane::from_packed(vec![], 1, 1),
            Plane::from_packed(vec![], 1, 1),
        ];
        let mut dst = i420(4, 4);

        assert!(matches!(
            SoftwareConverter.convert(PixelFormat::Yuv410p, &src, 4, 4, Chroma::I420, &mut dst),
            Err(FormatError::PlaneTooSmall { plane: 0, .. })
        ));
    }
}
