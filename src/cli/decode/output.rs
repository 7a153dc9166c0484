use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use vdec::structs::format::{Chroma, FrameRate, VideoFormat};
use vdec::structs::picture::Plane;

use crate::cli::command::VideoFormat as OutputFormat;

/// Frame rate written to Y4M headers when the stream does not carry one.
const FALLBACK_RATE: FrameRate = FrameRate::new(25, 1);

pub fn create_path_with_extension(base_path: &Path, expected_ext: &str) -> PathBuf {
    match base_path.extension() {
        Some(ext) if ext == expected_ext => base_path.to_path_buf(),
        Some(_) => {
            let mut name = base_path.as_os_str().to_owned();
            name.push(".");
            name.push(expected_ext);
            PathBuf::from(name)
        }
        None => base_path.with_extension(expected_ext),
    }
}

pub fn output_extension(format: OutputFormat) -> Option<&'static str> {
    match format {
        OutputFormat::Y4m => Some("y4m"),
        OutputFormat::Raw => Some("yuv"),
        OutputFormat::Null => None,
    }
}

fn colorspace(chroma: Chroma) -> Result<y4m::Colorspace> {
    match chroma {
        Chroma::I420 => Ok(y4m::Colorspace::C420),
        Chroma::I422 => Ok(y4m::Colorspace::C422),
        Chroma::I444 => Ok(y4m::Colorspace::C444),
        Chroma::Rv24 => bail!("Y4M cannot carry {chroma} pictures, use --format raw"),
    }
}

/// Visible rows of `plane` without pitch padding.
fn pack_plane(plane: &Plane) -> Vec<u8> {
    let mut packed = Vec::with_capacity(plane.visible_pitch * plane.lines);
    plane.visible_rows().for_each(|row| packed.extend_from_slice(row));
    packed
}

/// YUV4MPEG2 output; the stream header is written with the first picture.
pub struct Y4mWriter<W: Write> {
    sink: Option<W>,
    encoder: Option<y4m::Encoder<W>>,
    rate: FrameRate,
    format: Option<VideoFormat>,
}

impl<W: Write> Y4mWriter<W> {
    pub fn new(sink: W, rate: FrameRate) -> Self {
        let rate = if rate.is_known() { rate } else { FALLBACK_RATE };
        Self {
            sink: Some(sink),
            encoder: None,
            rate,
            format: None,
        }
    }

    fn encoder_for(&mut self, format: &VideoFormat) -> Result<&mut y4m::Encoder<W>> {
        if let Some(current) = &self.format {
            if current != format {
                bail!(
                    "picture format changed from {}x{} {} to {}x{} {}, Y4M cannot follow",
                    current.width,
                    current.height,
                    current.chroma,
                    format.width,
                    format.height,
                    format.chroma
                );
            }
        }

        if self.encoder.is_none() {
            let colorspace = colorspace(format.chroma)?;
            let sink = self
                .sink
                .take()
                .ok_or_else(|| anyhow!("Y4M sink already consumed"))?;
            let encoder = y4m::encode(
                format.width as usize,
                format.height as usize,
                y4m::Ratio::new(self.rate.num as usize, self.rate.den as usize),
            )
            .with_colorspace(colorspace)
            .write_header(sink)
            .map_err(|e| anyhow!("cannot write Y4M header: {e}"))?;

            self.encoder = Some(encoder);
            self.format = Some(*format);
        }

        self.encoder
            .as_mut()
            .ok_or_else(|| anyhow!("Y4M encoder unavailable"))
    }

    pub fn write_picture(&mut self, format: &VideoFormat, planes: &[Plane]) -> Result<()> {
        let packed: Vec<Vec<u8>> = planes.iter().map(pack_plane).collect();
        let [y, u, v] = packed.as_slice() else {
            bail!("Y4M expects 3 planes, picture has {}", packed.len());
        };

        let encoder = self.encoder_for(format)?;
        encoder
            .write_frame(&y4m::Frame::new([y.as_slice(), u.as_slice(), v.as_slice()], None))
            .map_err(|e| anyhow!("cannot write Y4M frame: {e}"))
    }
}

pub enum VideoWriter<W: Write> {
    Y4m(Y4mWriter<W>),
    Raw(W),
    Null,
}

impl VideoWriter<BufWriter<Box<dyn Write>>> {
    /// Opens the sink for `format`; `-` writes to stdout.
    pub fn create(path: Option<&Path>, format: OutputFormat, rate: FrameRate) -> Result<Self> {
        let (Some(path), Some(ext)) = (path, output_extension(format)) else {
            return Ok(Self::Null);
        };

        let sink: Box<dyn Write> = if crate::input::is_pipe(path) {
            Box::new(io::stdout())
        } else {
            let path = create_path_with_extension(path, ext);
            log::info!("Writing {ext} output to {}", path.display());
            Box::new(File::create(path)?)
        };

        Ok(Self::new(BufWriter::new(sink), format, rate))
    }
}

impl<W: Write> VideoWriter<W> {
    pub fn new(sink: W, format: OutputFormat, rate: FrameRate) -> Self {
        match format {
            OutputFormat::Y4m => Self::Y4m(Y4mWriter::new(sink, rate)),
            OutputFormat::Raw => Self::Raw(sink),
            OutputFormat::Null => Self::Null,
        }
    }

    pub fn write_picture(&mut self, format: &VideoFormat, planes: &[Plane]) -> Result<()> {
        match self {
            VideoWriter::Y4m(writer) => writer.write_picture(format, planes),
            VideoWriter::Raw(writer) => {
                for row in planes.iter().flat_map(|plane| plane.visible_rows()) {
                    writer.write_all(row)?;
                }
                Ok(())
            }
            VideoWriter::Null => Ok(()),
        }
    }

    pub fn finish(self) -> Result<()> {
        match self {
            VideoWriter::Raw(mut writer) => writer.flush()?,
            // The encoder flushes its sink when dropped.
            VideoWriter::Y4m(writer) => drop(writer),
            VideoWriter::Null => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdec::structs::picture::PLANE_ALIGN;

    fn picture(chroma: Chroma, width: u32, height: u32) -> (VideoFormat, Vec<Plane>) {
        let format = VideoFormat::new(width, height, chroma, 0.0);
        let planes = chroma
            .plane_geometry(width as usize, height as usize)
            .into_iter()
            .enumerate()
            .map(|(index, (row_bytes, lines))| {
                let mut plane = Plane::new(row_bytes, lines, PLANE_ALIGN);
                plane.data.fill(0xEE);
                for line in 0..lines {
                    plane.row_mut(line)[..row_bytes].fill(index as u8 + 1);
                }
                plane
            })
            .collect();
        (format, planes)
    }

    #[test]
    fn extension_handling() {
        assert_eq!(
            create_path_with_extension(Path::new("out"), "y4m"),
            PathBuf::from("out.y4m")
        );
        assert_eq!(
            create_path_with_extension(Path::new("out.y4m"), "y4m"),
            PathBuf::from("out.y4m")
        );
        assert_eq!(
            create_path_with_extension(Path::new("clip.v1"), "yuv"),
            PathBuf::from("clip.v1.yuv")
        );
    }

    #[test]
    fn raw_output_strips_pitch_padding() -> Result<()> {
        let (format, planes) = picture(Chroma::I420, 6, 2);
        let mut out = Vec::new();
        let mut writer = VideoWriter::new(&mut out, OutputFormat::Raw, FrameRate::new(25, 1));
        writer.write_picture(&format, &planes)?;
        writer.finish()?;

        let mut expected = vec![1; 12];
        expected.extend_from_slice(&[2; 3]);
        expected.extend_from_slice(&[3; 3]);
        assert_eq!(out, expected);
        Ok(())
    }

    #[test]
    fn y4m_stream_header_then_frames() -> Result<()> {
        let (format, planes) = picture(Chroma::I422, 4, 2);
        let mut out = Vec::new();
        let mut writer = VideoWriter::new(&mut out, OutputFormat::Y4m, FrameRate::new(30000, 1001));
        writer.write_picture(&format, &planes)?;
        writer.write_picture(&format, &planes)?;

        let (other, other_planes) = picture(Chroma::I420, 4, 2);
        assert!(writer.write_picture(&other, &other_planes).is_err());
        writer.finish()?;

        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with("YUV4MPEG2 W4 H2 F30000:1001"));
        assert!(text.contains("C422"));
        assert_eq!(text.matches("FRAME").count(), 2);
        Ok(())
    }

    #[test]
    fn y4m_rejects_rgb() {
        let (format, planes) = picture(Chroma::Rv24, 4, 2);
        let mut out = Vec::new();
        let mut writer = VideoWriter::new(&mut out, OutputFormat::Y4m, FrameRate::default());
        assert!(writer.write_picture(&format, &planes).is_err());
    }
}
