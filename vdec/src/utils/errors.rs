use crate::structs::format::{Chroma, PixelFormat};
use crate::structs::picture::PictureState;

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum AssembleError {
    #[error("Cannot consume {requested} bytes, only {available} buffered")]
    ConsumeOverflow { requested: usize, available: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum DecoderError {
    #[error("Codec is not open")]
    NotOpen,

    #[error("Invalid picture sync word {0:#010X}")]
    InvalidSync(u32),

    #[error("Incomplete picture: need {need} bytes, have {have}")]
    Incomplete { need: usize, have: usize },

    #[error("Invalid picture dimensions {width}x{height}")]
    InvalidDimensions { width: u16, height: u16 },

    #[error("Unknown pixel format code {0}")]
    UnknownPixelFormat(u8),

    #[error("Unknown picture type bits {0:#b}")]
    UnknownPictureType(u8),

    #[error("Invalid extradata: {0}")]
    InvalidExtradata(String),

    #[error("Cannot obtain a picture buffer: {0}")]
    BufferUnavailable(#[from] PoolError),

    #[error("Bitstream read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Picture pool is closed")]
    Closed,

    #[error("Picture allocation cancelled")]
    Cancelled,

    #[error("Picture {0} does not belong to this pool")]
    UnknownPicture(usize),

    #[error("Reference count underflow on picture {0}")]
    RefcountUnderflow(usize),

    #[error("Picture {id} cannot leave state {state}")]
    InvalidTransition { id: usize, state: PictureState },

    #[error("Invalid output format {width}x{height}")]
    InvalidFormat { width: u32, height: u32 },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Don't know how to convert pixel format {0} to {1}")]
    NoConversion(PixelFormat, Chroma),

    #[error("Pixel format {0} has no output chroma")]
    Unsupported(PixelFormat),

    #[error("Plane {plane} too small: need {need} bytes, have {have}")]
    PlaneTooSmall {
        plane: usize,
        need: usize,
        have: usize,
    },

    #[error("Plane count mismatch: source has {src}, destination has {dst}")]
    PlaneCountMismatch { src: usize, dst: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("Upstream reported an error: {0}")]
    Upstream(String),

    #[error("Packet source I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Conditions that stop the decode thread and reach the pipeline owner.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(#[from] FormatError),

    #[error("Cannot create video output: {0}")]
    RendererUnavailable(String),

    #[error("Picture pool failed: {0}")]
    Pool(#[from] PoolError),

    #[error("Packet source failed: {0}")]
    SourceFailed(#[from] SourceError),

    #[error("Cannot open codec ({codec}): {source}")]
    CodecOpen {
        codec: String,
        #[source]
        source: DecoderError,
    },

    #[error("Assembler failed: {0}")]
    Assemble(#[from] AssembleError),
}
