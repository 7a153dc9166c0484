//! Uncompressed reference codec.
//!
//! A picture is a 10-byte big-endian header followed by the planes stored
//! tightly and, when flagged, one quantiser byte per 16x16 macroblock:
//!
//! ```text
//! sync "RAWV" (32) | width (16) | height (16)
//! pix_fmt (4) | picture_type (2) | reference (1) | qscale (1)
//! ```
//!
//! The optional 8-byte extradata record carries the frame rate as two
//! big-endian `u32` (numerator, denominator).

use log::{debug, trace};

use crate::codec::{
    BufferProvider, BufferRequest, CodecContext, CodecParameters, DecodeInput, DecodeOutput,
    DecoderCapabilities, SkipHint, VideoDecoder,
};
use crate::log_or_err;
use crate::structs::format::{FrameRate, PixelFormat};
use crate::structs::frame::{DecodedFrame, FrameData, PictureType, QuantTable};
use crate::structs::picture::{PictureView, Plane};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::DecoderError;

pub const RAW_SYNC: u32 = u32::from_be_bytes(*b"RAWV");
pub const RAW_FOURCC: [u8; 4] = *b"RAWV";
pub const HEADER_SIZE: usize = 10;
pub const EXTRADATA_SIZE: usize = 8;

/// Row alignment of decoder-owned planes.
const OWNED_ALIGN: usize = 32;
const GRAY_CHROMA: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    pub picture_type: PictureType,
    pub reference: bool,
    pub has_qscale: bool,
}

impl RawHeader {
    pub fn picture_size(&self) -> usize {
        self.format
            .picture_size(self.width as usize, self.height as usize)
    }

    pub fn qscale_stride(&self) -> usize {
        (self.width as usize).div_ceil(16)
    }

    pub fn qscale_size(&self) -> usize {
        if self.has_qscale {
            self.qscale_stride() * (self.height as usize).div_ceil(16)
        } else {
            0
        }
    }

    /// Header, planes and quantiser table.
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.picture_size() + self.qscale_size()
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0; HEADER_SIZE];
        out[..4].copy_from_slice(&RAW_FOURCC);
        out[4..6].copy_from_slice(&self.width.to_be_bytes());
        out[6..8].copy_from_slice(&self.height.to_be_bytes());

        let picture_type = match self.picture_type {
            PictureType::I => 0,
            PictureType::P => 1,
            PictureType::B => 2,
        };
        out[8] = (self.format.code() << 4)
            | (picture_type << 2)
            | ((self.reference as u8) << 1)
            | self.has_qscale as u8;
        out
    }
}

/// Serialises one picture. `planes` must hold the tight plane rows in order.
pub fn encode_picture(header: &RawHeader, planes: &[u8], qscale: Option<&[u8]>) -> Vec<u8> {
    let mut header = *header;
    header.has_qscale = qscale.is_some();

    let mut out = Vec::with_capacity(header.total_size());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(planes);
    if let Some(qscale) = qscale {
        out.extend_from_slice(qscale);
    }
    out
}

/// Frame-rate extradata record.
pub fn encode_extradata(rate: FrameRate) -> Vec<u8> {
    let mut out = Vec::with_capacity(EXTRADATA_SIZE);
    out.extend_from_slice(&rate.num.to_be_bytes());
    out.extend_from_slice(&rate.den.to_be_bytes());
    out
}

/// Decoder for [`RAW_FOURCC`] streams.
#[derive(Debug)]
pub struct RawVideoDecoder {
    params: Option<CodecParameters>,
    context: CodecContext,
    skip: SkipHint,
    /// Last reference picture obtained in direct mode, linked until replaced.
    held: Option<PictureView>,
    fail_level: log::Level,
}

impl Default for RawVideoDecoder {
    fn default() -> Self {
        Self {
            params: None,
            context: CodecContext::default(),
            skip: SkipHint::None,
            held: None,
            fail_level: log::Level::Error,
        }
    }
}

impl RawVideoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_header(&self, data: &[u8]) -> Result<RawHeader, DecoderError> {
        let mut reader = BsIoSliceReader::from_slice(data);

        let sync: u32 = reader.get_n(32)?;
        if sync != RAW_SYNC {
            return Err(DecoderError::InvalidSync(sync));
        }

        let width: u16 = reader.get_n(16)?;
        let height: u16 = reader.get_n(16)?;
        if width == 0 || height == 0 {
            return Err(DecoderError::InvalidDimensions { width, height });
        }

        let code: u8 = reader.get_n(4)?;
        let format = PixelFormat::from_code(code).ok_or(DecoderError::UnknownPixelFormat(code))?;

        let picture_type = match reader.get_n::<u8>(2)? {
            0 => PictureType::I,
            1 => PictureType::P,
            2 => PictureType::B,
            bits => {
                let lenient = self
                    .params
                    .as_ref()
                    .is_some_and(|params| params.workaround_bugs > 0);
                if !lenient {
                    return Err(DecoderError::UnknownPictureType(bits));
                }
                log_or_err!(self, log::Level::Warn, DecoderError::UnknownPictureType(bits));
                PictureType::I
            }
        };

        Ok(RawHeader {
            width,
            height,
            format,
            picture_type,
            reference: reader.get()?,
            has_qscale: reader.get()?,
        })
    }

    fn grayscale(&self) -> bool {
        self.params.as_ref().is_some_and(|params| params.grayscale)
    }

    fn truncated(&self) -> bool {
        self.params.as_ref().is_some_and(|params| params.truncated)
    }

    /// Copies the tight payload rows into `planes`.
    fn fill_planes(header: &RawHeader, payload: &[u8], planes: &mut [Plane], grayscale: bool) {
        let geometry = header
            .format
            .plane_geometry(header.width as usize, header.height as usize);

        let mut offset = 0;
        for (index, ((row_bytes, lines), plane)) in geometry.into_iter().zip(planes.iter_mut()).enumerate() {
            let gray = grayscale && index > 0;
            for line in 0..lines {
                let row = &mut plane.row_mut(line)[..row_bytes];
                if gray {
                    row.fill(GRAY_CHROMA);
                } else {
                    row.copy_from_slice(&payload[offset..offset + row_bytes]);
                }
                offset += row_bytes;
            }
        }

        if grayscale && header.format == PixelFormat::Yuyv422 {
            // Chroma samples sit at every odd byte.
            for plane in planes.iter_mut().take(1) {
                plane.data.iter_mut().skip(1).step_by(2).for_each(|c| *c = GRAY_CHROMA);
            }
        }
    }

    fn decode_direct(
        &mut self,
        header: &RawHeader,
        payload: &[u8],
        provider: &mut dyn BufferProvider,
    ) -> Result<FrameData, DecoderError> {
        let view = provider.get_buffer(&BufferRequest {
            format: header.format,
            width: header.width as u32,
            height: header.height as u32,
            reference: header.reference,
        })?;

        Self::fill_planes(
            header,
            payload,
            &mut view.picture().planes(),
            self.grayscale(),
        );
        let picture = view.picture().clone();

        if header.reference {
            if let Some(previous) = self.held.replace(view) {
                trace!("releasing reference picture {}", previous.picture().id());
                provider.release_buffer(previous)?;
            }
        } else {
            provider.release_buffer(view)?;
        }

        Ok(FrameData::Direct(picture))
    }

    fn decode_owned(&self, header: &RawHeader, payload: &[u8]) -> FrameData {
        let mut planes: Vec<_> = header
            .format
            .plane_geometry(header.width as usize, header.height as usize)
            .into_iter()
            .map(|(row_bytes, lines)| Plane::new(row_bytes, lines, OWNED_ALIGN))
            .collect();

        Self::fill_planes(header, payload, &mut planes, self.grayscale());
        FrameData::Owned(planes)
    }
}

impl VideoDecoder for RawVideoDecoder {
    fn name(&self) -> &str {
        "raw"
    }

    fn capabilities(&self) -> DecoderCapabilities {
        DecoderCapabilities {
            direct_rendering: true,
            truncated: true,
        }
    }

    fn open(&mut self, params: &CodecParameters) -> Result<(), DecoderError> {
        let mut frame_rate = params.frame_rate;

        if let Some(extradata) = &params.extradata {
            if extradata.len() != EXTRADATA_SIZE {
                return Err(DecoderError::InvalidExtradata(format!(
                    "expected {EXTRADATA_SIZE} bytes, got {}",
                    extradata.len()
                )));
            }

            let mut reader = BsIoSliceReader::from_slice(extradata);
            let rate = FrameRate::new(reader.get_n(32)?, reader.get_n(32)?);
            if rate.is_known() {
                frame_rate = rate;
            }
        }

        self.context = CodecContext {
            width: params.width,
            height: params.height,
            pix_fmt: None,
            frame_rate,
            aspect_ratio: 0.0,
        };
        self.fail_level = params.fail_level;
        self.params = Some(params.clone());

        debug!(
            "raw decoder open: {}x{} @ {}/{} fps",
            params.width, params.height, frame_rate.num, frame_rate.den
        );
        Ok(())
    }

    fn context(&self) -> &CodecContext {
        &self.context
    }

    fn set_skip(&mut self, hint: SkipHint) {
        self.skip = hint;
    }

    fn decode(
        &mut self,
        input: DecodeInput<'_>,
        provider: Option<&mut dyn BufferProvider>,
    ) -> Result<DecodeOutput, DecoderError> {
        let data = input.data();
        if self.params.is_none() {
            return Err(DecoderError::NotOpen);
        }

        let incomplete = |need: usize| {
            if self.truncated() {
                Ok(DecodeOutput::default())
            } else {
                Err(DecoderError::Incomplete {
                    need,
                    have: data.len(),
                })
            }
        };

        if data.len() < HEADER_SIZE {
            return incomplete(HEADER_SIZE);
        }

        let header = self.parse_header(data)?;
        let consumed = header.total_size();
        if data.len() < consumed {
            return incomplete(consumed);
        }

        self.context.width = header.width as u32;
        self.context.height = header.height as u32;
        self.context.pix_fmt = Some(header.format);

        let skipped = match self.skip {
            SkipHint::HeadersOnly => true,
            SkipHint::NonReference => !header.reference,
            SkipHint::None => false,
        };
        if skipped {
            trace!("skipping {} picture ({:?})", header.picture_type, self.skip);
            return Ok(DecodeOutput {
                consumed,
                frame: None,
            });
        }

        let payload = &data[HEADER_SIZE..HEADER_SIZE + header.picture_size()];
        let frame_data = match provider {
            Some(provider) if header.format.native_chroma().is_some() => {
                self.decode_direct(&header, payload, provider)?
            }
            _ => self.decode_owned(&header, payload),
        };

        let qscale = header.has_qscale.then(|| QuantTable {
            values: data[HEADER_SIZE + header.picture_size()..consumed].to_vec(),
            stride: header.qscale_stride(),
        });

        Ok(DecodeOutput {
            consumed,
            frame: Some(DecodedFrame {
                format: header.format,
                width: header.width as u32,
                height: header.height as u32,
                picture_type: header.picture_type,
                reference: header.reference,
                data: frame_data,
                qscale,
            }),
        })
    }

    fn flush(&mut self, provider: Option<&mut dyn BufferProvider>) {
        let Some(view) = self.held.take() else {
            return;
        };

        match provider {
            Some(provider) => {
                if let Err(err) = provider.release_buffer(view) {
                    debug!("releasing held picture on flush: {err}");
                }
            }
            None => debug!("dropping held picture {} without provider", view.picture().id()),
        }
    }
}
