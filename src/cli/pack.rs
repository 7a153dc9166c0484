use std::fs::File;
use std::io::{BufWriter, Read, Write};

use anyhow::{Result, anyhow, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use vdec::codec::raw::{RAW_FOURCC, RawHeader, encode_picture};
use vdec::structs::format::{FrameRate, PixelFormat};
use vdec::structs::frame::PictureType;
use vdec::utils::timing::MICROSECONDS;

use super::command::{Cli, PackArgs};
use crate::container::{VideoHeader, VpkWriter};
use crate::input::InputReader;

/// Timestamp of the first picture; zero is reserved for untimed packets.
pub const PTS_ORIGIN: i64 = 1_000_000;
/// Distance between intra pictures.
const GOP_LENGTH: u64 = 12;
/// Distance between predicted reference pictures inside a group.
const P_DISTANCE: u64 = 3;

pub fn cmd_pack(args: &PackArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Packing {} into {}",
        args.input.display(),
        args.output.display()
    );

    let input = InputReader::new(&args.input)?;
    let output = BufWriter::new(File::create(&args.output)?);

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {pos} pictures {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            Some(pb)
        }
        None => None,
    };

    let packer = Packer {
        pictures_per_packet: args.pictures_per_packet.max(1) as usize,
        max_packet_size: args.max_packet_size.filter(|&size| size > 0),
        pb: pb.as_ref(),
    };
    let summary = packer.pack(input, output)?;

    if let Some(pb) = &pb {
        pb.finish_with_message("done");
    }
    log::info!(
        "Packed {} pictures into {} packets",
        summary.pictures,
        summary.packets
    );
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackSummary {
    pub pictures: u64,
    pub packets: u64,
}

pub struct Packer<'a> {
    pub pictures_per_packet: usize,
    /// Packets above this size are split, only the first part keeps the timestamp.
    pub max_packet_size: Option<usize>,
    pub pb: Option<&'a ProgressBar>,
}

impl Packer<'_> {
    pub fn pack<R: Read, W: Write>(&self, input: R, output: W) -> Result<PackSummary> {
        let mut decoder =
            y4m::decode(input).map_err(|e| anyhow!("cannot read Y4M header: {e}"))?;

        let (width, height) = (decoder.get_width(), decoder.get_height());
        let (Ok(width16), Ok(height16)) = (u16::try_from(width), u16::try_from(height)) else {
            bail!("picture size {width}x{height} exceeds 65535x65535");
        };

        let colorspace = decoder.get_colorspace();
        let (format, mono) = match colorspace {
            y4m::Colorspace::C420 | y4m::Colorspace::C420jpeg | y4m::Colorspace::C420paldv => {
                (PixelFormat::Yuv420p, false)
            }
            y4m::Colorspace::C422 => (PixelFormat::Yuv422p, false),
            y4m::Colorspace::C444 => (PixelFormat::Yuv444p, false),
            y4m::Colorspace::Cmono => (PixelFormat::Yuv420p, true),
            other => bail!("unsupported Y4M colorspace {other:?}"),
        };

        let framerate = decoder.get_framerate();
        let rate = match (u32::try_from(framerate.num), u32::try_from(framerate.den)) {
            (Ok(num), Ok(den)) => FrameRate::new(num, den),
            _ => FrameRate::default(),
        };
        log::info!(
            "Y4M input: {width}x{height} {format}{} @ {}/{}",
            if mono { " (from mono)" } else { "" },
            rate.num,
            rate.den
        );

        let mut writer = VpkWriter::new(
            output,
            &VideoHeader {
                codec: RAW_FOURCC,
                width: width16,
                height: height16,
                fps_num: rate.num,
                fps_den: rate.den,
            },
        )?;

        let chroma_fill: Vec<Vec<u8>> = format
            .plane_geometry(width, height)
            .into_iter()
            .skip(1)
            .map(|(row_bytes, lines)| vec![128u8; row_bytes * lines])
            .collect();

        let mut pictures = 0u64;
        let mut packet = Vec::new();
        let mut packet_pts = None;
        let mut in_packet = 0;

        loop {
            let frame = match decoder.read_frame() {
                Ok(frame) => frame,
                Err(y4m::Error::EOF) => break,
                Err(e) => bail!("cannot read Y4M frame {pictures}: {e}"),
            };

            let mut planes = Vec::with_capacity(format.picture_size(width, height));
            planes.extend_from_slice(frame.get_y_plane());
            if mono {
                chroma_fill.iter().for_each(|plane| planes.extend_from_slice(plane));
            } else {
                planes.extend_from_slice(frame.get_u_plane());
                planes.extend_from_slice(frame.get_v_plane());
            }

            let (picture_type, reference) = gop_position(pictures);
            let header = RawHeader {
                width: width16,
                height: height16,
                format,
                picture_type,
                reference,
                has_qscale: false,
            };

            packet_pts.get_or_insert(PTS_ORIGIN + rate.offset(pictures, MICROSECONDS));
            packet.extend_from_slice(&encode_picture(&header, &planes, None));
            pictures += 1;
            in_packet += 1;

            if in_packet == self.pictures_per_packet {
                self.write_packet(&mut writer, &packet, packet_pts.take())?;
                packet.clear();
                in_packet = 0;
            }

            if let Some(pb) = self.pb {
                pb.inc(1);
            }
        }

        if !packet.is_empty() {
            self.write_packet(&mut writer, &packet, packet_pts.take())?;
        }

        let packets = writer.packets();
        writer.finish()?;
        Ok(PackSummary { pictures, packets })
    }

    fn write_packet<W: Write>(
        &self,
        writer: &mut VpkWriter<W>,
        payload: &[u8],
        pts: Option<i64>,
    ) -> Result<()> {
        match self.max_packet_size {
            Some(size) if payload.len() > size => {
                let mut pts = pts;
                for part in payload.chunks(size) {
                    writer.write_packet(part, pts.take())?;
                }
            }
            _ => writer.write_packet(payload, pts)?,
        }
        Ok(())
    }
}

/// Picture type and reference flag of the `index`-th picture.
fn gop_position(index: u64) -> (PictureType, bool) {
    let position = index % GOP_LENGTH;
    if position == 0 {
        (PictureType::I, true)
    } else if position % P_DISTANCE == 0 {
        (PictureType::P, true)
    } else {
        (PictureType::B, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::VpkReader;
    use std::io::Cursor;

    fn y4m_input(colorspace: y4m::Colorspace, frames: usize) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = y4m::encode(4, 2, y4m::Ratio::new(25, 1))
                .with_colorspace(colorspace)
                .write_header(&mut out)
                .unwrap();
            let y = [16u8; 8];
            let c = [200u8; 2];
            for _ in 0..frames {
                let frame = match colorspace {
                    y4m::Colorspace::Cmono => y4m::Frame::new([&y[..], &[][..], &[][..]], None),
                    _ => y4m::Frame::new([&y[..], &c[..], &c[..]], None),
                };
                encoder.write_frame(&frame).unwrap();
            }
        }
        out
    }

    fn packer(pictures_per_packet: usize, max_packet_size: Option<usize>) -> Packer<'static> {
        Packer {
            pictures_per_packet,
            max_packet_size,
            pb: None,
        }
    }

    #[test]
    fn one_picture_per_packet_with_timestamps() -> Result<()> {
        let mut out = Vec::new();
        let summary = packer(1, None).pack(Cursor::new(y4m_input(y4m::Colorspace::C420, 3)), &mut out)?;
        assert_eq!(summary, PackSummary { pictures: 3, packets: 3 });

        let mut reader = VpkReader::new(Cursor::new(out))?;
        assert_eq!(reader.header().frame_rate(), FrameRate::new(25, 1));

        let mut pts = Vec::new();
        while let Some(packet) = reader.next_chunk()? {
            assert_eq!(packet.payload.len(), 10 + 8 + 2 + 2);
            assert_eq!(&packet.payload[..4], b"RAWV");
            pts.push(packet.pts());
        }
        assert_eq!(
            pts,
            [Some(PTS_ORIGIN), Some(PTS_ORIGIN + 40_000), Some(PTS_ORIGIN + 80_000)]
        );
        Ok(())
    }

    #[test]
    fn grouping_and_splitting() -> Result<()> {
        let mut out = Vec::new();
        let summary = packer(2, Some(15)).pack(Cursor::new(y4m_input(y4m::Colorspace::C420, 3)), &mut out)?;
        // Two groups of 44 and 22 bytes, cut into 15-byte parts.
        assert_eq!(summary, PackSummary { pictures: 3, packets: 3 + 2 });

        let mut reader = VpkReader::new(Cursor::new(out))?;
        let mut timed = Vec::new();
        while let Some(packet) = reader.next_chunk()? {
            assert!(packet.payload.len() <= 15);
            timed.extend(packet.pts());
        }
        assert_eq!(timed, [PTS_ORIGIN, PTS_ORIGIN + 80_000]);
        Ok(())
    }

    #[test]
    fn mono_input_gets_neutral_chroma() -> Result<()> {
        let mut out = Vec::new();
        packer(1, None).pack(Cursor::new(y4m_input(y4m::Colorspace::Cmono, 1)), &mut out)?;

        let mut reader = VpkReader::new(Cursor::new(out))?;
        let packet = reader.next_chunk()?.expect("one packet");
        assert_eq!(&packet.payload[10..18], &[16; 8]);
        assert_eq!(&packet.payload[18..], &[128; 4]);
        Ok(())
    }

    #[test]
    fn gop_structure() {
        assert_eq!(gop_position(0), (PictureType::I, true));
        assert_eq!(gop_position(1), (PictureType::B, false));
        assert_eq!(gop_position(3), (PictureType::P, true));
        assert_eq!(gop_position(12), (PictureType::I, true));
    }
}
