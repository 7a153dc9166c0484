//! `.vpk` packet container.
//!
//! A file is a sequence of chunks, each a four-byte type, a big-endian `u32`
//! payload size and the payload. The first chunk is a [`VideoHeader`]; every
//! following [`VideoPacket`] carries one demultiplexed packet. Chunks of any
//! other type are skipped.

use std::io::{self, Read, Write};

use anyhow::{Result, bail};
use log::{debug, trace};
use vdec::codec::raw::{RAW_FOURCC, encode_extradata};
use vdec::process::pump::PacketSource;
use vdec::structs::format::FrameRate;
use vdec::structs::packet::InputPacket;
use vdec::utils::errors::SourceError;
use vdecd_macros::{ToBytes, chunk_type};

use crate::join_bytes_be;

pub const CHUNK_HEADER_SIZE: usize = 8;
pub const VIDEO_HEADER_SIZE: usize = 16;
/// Timestamp field of a packet whose presentation time is unknown.
pub const NO_PTS: i64 = 0;
const MAX_CHUNK_SIZE: u32 = 64 << 20;

pub trait ContainerChunk {
    fn chunk_type(&self) -> &[u8; 4];
    fn chunk_data(&self) -> Vec<u8>;

    fn write_all<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let data = self.chunk_data();
        let size = u32::try_from(data.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk too large"))?;

        writer.write_all(&join_bytes_be!(*self.chunk_type(), size))?;
        writer.write_all(&data)?;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToBytes)]
#[chunk_type(b"VHDR")]
pub struct VideoHeader {
    pub codec: [u8; 4],
    pub width: u16,
    pub height: u16,
    pub fps_num: u32,
    pub fps_den: u32,
}

impl VideoHeader {
    pub fn frame_rate(&self) -> FrameRate {
        FrameRate::new(self.fps_num, self.fps_den)
    }

    pub fn codec_name(&self) -> String {
        String::from_utf8_lossy(&self.codec).into_owned()
    }

    /// Codec extradata implied by the header.
    pub fn extradata(&self) -> Option<Vec<u8>> {
        (self.codec == RAW_FOURCC && self.frame_rate().is_known())
            .then(|| encode_extradata(self.frame_rate()))
    }

    fn parse(data: &[u8]) -> Result<Self> {
        let Ok(bytes) = <[u8; VIDEO_HEADER_SIZE]>::try_from(data) else {
            bail!(
                "VHDR chunk is {} bytes, expected {VIDEO_HEADER_SIZE}",
                data.len()
            );
        };

        Ok(Self {
            codec: [bytes[0], bytes[1], bytes[2], bytes[3]],
            width: u16::from_be_bytes([bytes[4], bytes[5]]),
            height: u16::from_be_bytes([bytes[6], bytes[7]]),
            fps_num: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            fps_den: u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, ToBytes)]
#[chunk_type(b"VPKT")]
pub struct VideoPacket {
    pub pts: i64,
    pub payload: Vec<u8>,
}

impl VideoPacket {
    fn parse(data: Vec<u8>) -> io::Result<Self> {
        let Some(pts) = data.first_chunk::<8>().map(|pts| i64::from_be_bytes(*pts)) else {
            return Err(invalid_data(format!(
                "VPKT chunk is {} bytes, too short for a timestamp",
                data.len()
            )));
        };

        Ok(Self {
            pts,
            payload: data[8..].to_vec(),
        })
    }

    pub fn pts(&self) -> Option<i64> {
        (self.pts != NO_PTS).then_some(self.pts)
    }
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

pub struct VpkWriter<W: Write> {
    writer: W,
    packets: u64,
}

impl<W: Write> VpkWriter<W> {
    pub fn new(mut writer: W, header: &VideoHeader) -> io::Result<Self> {
        header.write_all(&mut writer)?;
        Ok(Self { writer, packets: 0 })
    }

    pub fn write_packet(&mut self, payload: &[u8], pts: Option<i64>) -> io::Result<()> {
        VideoPacket {
            pts: pts.unwrap_or(NO_PTS),
            payload: payload.to_vec(),
        }
        .write_all(&mut self.writer)?;
        self.packets += 1;
        Ok(())
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Reads packets from a `.vpk` stream.
///
/// With [`rebase`](Self::rebase) set, packet timestamps are shifted so that
/// the first one lands on the given clock time.
pub struct VpkReader<R: Read> {
    reader: R,
    header: VideoHeader,
    packets: u64,
    rebase: Option<i64>,
    pts_offset: Option<i64>,
}

impl<R: Read> VpkReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let Some((kind, data)) = read_chunk(&mut reader)? else {
            bail!("empty input, expected a VHDR chunk");
        };
        if &kind != b"VHDR" {
            bail!(
                "stream starts with {:?}, expected VHDR",
                String::from_utf8_lossy(&kind)
            );
        }

        let header = VideoHeader::parse(&data)?;
        debug!(
            "vpk header: {} {}x{} @ {}/{}",
            header.codec_name(),
            header.width,
            header.height,
            header.fps_num,
            header.fps_den
        );

        Ok(Self {
            reader,
            header,
            packets: 0,
            rebase: None,
            pts_offset: None,
        })
    }

    pub fn rebase(mut self, origin: i64) -> Self {
        self.rebase = Some(origin);
        self
    }

    pub fn header(&self) -> &VideoHeader {
        &self.header
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Next packet chunk, with its timestamp as stored.
    pub fn next_chunk(&mut self) -> io::Result<Option<VideoPacket>> {
        while let Some((kind, data)) = read_chunk(&mut self.reader)? {
            if &kind == b"VPKT" {
                self.packets += 1;
                return VideoPacket::parse(data).map(Some);
            }
            trace!(
                "skipping {:?} chunk ({} bytes)",
                String::from_utf8_lossy(&kind),
                data.len()
            );
        }
        Ok(None)
    }

    fn map_pts(&mut self, pts: Option<i64>) -> Option<i64> {
        let pts = pts?;
        let Some(origin) = self.rebase else {
            return Some(pts);
        };
        let offset = *self.pts_offset.get_or_insert(origin - pts);
        Some(pts + offset)
    }
}

impl<R: Read> PacketSource for VpkReader<R> {
    fn next_packet(&mut self) -> Result<Option<InputPacket>, SourceError> {
        let Some(packet) = self.next_chunk()? else {
            return Ok(None);
        };
        let pts = self.map_pts(packet.pts());
        Ok(Some(InputPacket::new(packet.payload, pts)))
    }
}

/// Reads one chunk. `None` at a clean end of input.
fn read_chunk<R: Read>(reader: &mut R) -> io::Result<Option<([u8; 4], Vec<u8>)>> {
    let mut header = [0u8; CHUNK_HEADER_SIZE];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated chunk header",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let kind = [header[0], header[1], header[2], header[3]];
    let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if size > MAX_CHUNK_SIZE {
        return Err(invalid_data(format!(
            "chunk {:?} claims {size} bytes",
            String::from_utf8_lossy(&kind)
        )));
    }

    let mut data = vec![0u8; size as usize];
    reader.read_exact(&mut data)?;
    Ok(Some((kind, data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header() -> VideoHeader {
        VideoHeader {
            codec: RAW_FOURCC,
            width: 16,
            height: 8,
            fps_num: 25,
            fps_den: 1,
        }
    }

    #[test]
    fn header_chunk_layout() -> anyhow::Result<()> {
        let mut out = Vec::new();
        header().write_all(&mut out)?;

        assert_eq!(out.len(), CHUNK_HEADER_SIZE + VIDEO_HEADER_SIZE);
        assert_eq!(&out[..4], b"VHDR");
        assert_eq!(&out[4..8], &(VIDEO_HEADER_SIZE as u32).to_be_bytes());
        assert_eq!(&out[8..12], b"RAWV");
        assert_eq!(&out[12..14], &16u16.to_be_bytes());
        Ok(())
    }

    #[test]
    fn packets_read_back_with_unknown_chunks_skipped() -> anyhow::Result<()> {
        let mut writer = VpkWriter::new(Vec::new(), &header())?;
        writer.write_packet(&[1, 2, 3], Some(40_000))?;
        let mut out = writer.finish()?;
        out.extend_from_slice(b"JUNK\0\0\0\x02ab");
        VideoPacket {
            pts: NO_PTS,
            payload: vec![4],
        }
        .write_all(&mut out)?;

        let mut reader = VpkReader::new(Cursor::new(out))?;
        assert_eq!(reader.header(), &header());
        assert_eq!(reader.header().extradata(), Some(vec![0, 0, 0, 25, 0, 0, 0, 1]));

        let first = reader.next_packet()?.expect("first packet");
        assert_eq!(&first.data[..], &[1, 2, 3]);
        assert_eq!(first.pts, Some(40_000));

        let second = reader.next_packet()?.expect("second packet");
        assert_eq!(&second.data[..], &[4]);
        assert_eq!(second.pts, None);

        assert!(reader.next_packet()?.is_none());
        assert_eq!(reader.packets(), 2);
        Ok(())
    }

    #[test]
    fn rebase_shifts_all_timestamps_by_first() -> anyhow::Result<()> {
        let mut writer = VpkWriter::new(Vec::new(), &header())?;
        writer.write_packet(&[0], None)?;
        writer.write_packet(&[0], Some(1_000_000))?;
        writer.write_packet(&[0], Some(1_040_000))?;
        let out = writer.finish()?;

        let mut reader = VpkReader::new(Cursor::new(out))?.rebase(300_000);
        let pts: Vec<_> = std::iter::from_fn(|| reader.next_packet().ok().flatten())
            .map(|packet| packet.pts)
            .collect();
        assert_eq!(pts, [None, Some(300_000), Some(340_000)]);
        Ok(())
    }

    #[test]
    fn rejects_missing_header_and_truncation() {
        assert!(VpkReader::new(Cursor::new(Vec::<u8>::new())).is_err());
        assert!(VpkReader::new(Cursor::new(b"VPKT\0\0\0\0".to_vec())).is_err());

        let mut out = Vec::new();
        header().write_all(&mut out).unwrap();
        out.extend_from_slice(b"VPKT\0\0\0\x10\0\0");
        let mut reader = VpkReader::new(Cursor::new(out)).unwrap();
        assert!(reader.next_packet().is_err());
    }
}
