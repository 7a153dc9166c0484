//! Decoder interface seen by the pipeline.
//!
//! The pipeline drives any [`VideoDecoder`]; [`raw`] is a reference codec
//! for uncompressed pictures.

pub mod raw;

use crate::structs::format::{FrameRate, PixelFormat};
use crate::structs::frame::DecodedFrame;
use crate::structs::picture::PictureView;
use crate::utils::errors::{DecoderError, PoolError};

/// What a decoder can do beyond plain decode calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderCapabilities {
    /// Can decode into buffers obtained from a [`BufferProvider`].
    pub direct_rendering: bool,
    /// Accepts input cut at arbitrary byte boundaries.
    pub truncated: bool,
}

/// How much work the decoder may skip on the next call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SkipHint {
    #[default]
    None,
    /// Drop pictures nothing else predicts from.
    NonReference,
    /// Parse headers to learn the stream parameters, produce no picture.
    HeadersOnly,
}

/// Parameters the decoder is opened with.
#[derive(Debug, Clone)]
pub struct CodecParameters {
    /// Size hint from the container, 0 if unknown.
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub extradata: Option<Vec<u8>>,
    pub workaround_bugs: u8,
    pub error_resilience: i8,
    pub grayscale: bool,
    pub truncated: bool,
    pub fail_level: log::Level,
}

impl Default for CodecParameters {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            frame_rate: FrameRate::default(),
            extradata: None,
            workaround_bugs: 1,
            error_resilience: -1,
            grayscale: false,
            truncated: false,
            fail_level: log::Level::Error,
        }
    }
}

/// Stream parameters as currently known to the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CodecContext {
    pub width: u32,
    pub height: u32,
    pub pix_fmt: Option<PixelFormat>,
    pub frame_rate: FrameRate,
    /// Display aspect ratio, 0 if unknown.
    pub aspect_ratio: f32,
}

impl CodecContext {
    pub fn has_picture_size(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Input of one decode call: the buffered bytes followed by zeroed padding.
///
/// Decoders parse [`data`](Self::data) and may read ahead into
/// [`padded`](Self::padded) without bounds checks on the logical end.
#[derive(Debug, Clone, Copy)]
pub struct DecodeInput<'a> {
    padded: &'a [u8],
    len: usize,
}

impl<'a> DecodeInput<'a> {
    /// `padded` holds `len` bytes of input followed by the padding.
    pub fn new(padded: &'a [u8], len: usize) -> Self {
        Self {
            len: len.min(padded.len()),
            padded,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        &self.padded[..self.len]
    }

    pub fn padded(&self) -> &'a [u8] {
        self.padded
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Unpadded input.
impl<'a> From<&'a [u8]> for DecodeInput<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::new(data, data.len())
    }
}

#[derive(Debug, Default)]
pub struct DecodeOutput {
    /// Bytes of the input the call used up.
    pub consumed: usize,
    pub frame: Option<DecodedFrame>,
}

/// A buffer request from a decoder in direct-rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Later pictures will predict from this one.
    pub reference: bool,
}

/// Buffer callbacks offered to a decoder for zero-copy output.
pub trait BufferProvider {
    fn get_buffer(&mut self, request: &BufferRequest) -> Result<PictureView, PoolError>;
    fn release_buffer(&mut self, view: PictureView) -> Result<(), PoolError>;
}

pub trait VideoDecoder: Send {
    fn name(&self) -> &str;

    fn capabilities(&self) -> DecoderCapabilities;

    fn open(&mut self, params: &CodecParameters) -> Result<(), DecoderError>;

    fn context(&self) -> &CodecContext;

    /// Applies to the following decode calls until changed.
    fn set_skip(&mut self, hint: SkipHint);

    /// Decodes from the start of `input`.
    ///
    /// At most one picture is produced per call; the caller advances by
    /// `consumed` and calls again for the rest. With a `provider` the
    /// decoder writes straight into pool pictures.
    fn decode(
        &mut self,
        input: DecodeInput<'_>,
        provider: Option<&mut dyn BufferProvider>,
    ) -> Result<DecodeOutput, DecoderError>;

    /// Drops internal state, handing held buffers back to `provider`.
    fn flush(&mut self, provider: Option<&mut dyn BufferProvider>);
}
