use log::{debug, error};

use crate::structs::format::{Chroma, PixelFormat};
use crate::structs::frame::{DecodedFrame, FrameData};
use crate::structs::picture::Plane;
use crate::utils::convert::{FormatConverter, SoftwareConverter};
use crate::utils::errors::FormatError;
use crate::utils::postproc::{PostProcessMode, PostProcessProfile, PostProcessor};

/// How decoded planes reach a pool picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeMode {
    /// Row-by-row copy into a renderer layout of the same format.
    NativeCopy,
    /// Filter from the decoded planes into the pool picture.
    PostProcess {
        mode: PostProcessMode,
        profile: PostProcessProfile,
    },
    /// Colour-space or subsampling conversion, optionally filtered afterwards.
    ConvertFormat {
        from: PixelFormat,
        to: Chroma,
        post_process: Option<(PostProcessMode, PostProcessProfile)>,
    },
}

/// Writes decoded frames into pool pictures.
///
/// The mode is decided once per pixel format and reused until the decoder
/// switches formats.
pub struct FrameCompositor {
    post_processing: Option<(Box<dyn PostProcessor>, PostProcessMode)>,
    converter: Box<dyn FormatConverter>,
    selected: Option<(PixelFormat, CompositeMode)>,
}

impl Default for FrameCompositor {
    fn default() -> Self {
        Self::new(Box::new(SoftwareConverter))
    }
}

impl FrameCompositor {
    pub fn new(converter: Box<dyn FormatConverter>) -> Self {
        Self {
            post_processing: None,
            converter,
            selected: None,
        }
    }

    pub fn with_post_processing(
        mut self,
        processor: Box<dyn PostProcessor>,
        mode: PostProcessMode,
    ) -> Self {
        self.post_processing = Some((processor, mode));
        self.selected = None;
        self
    }

    pub fn post_processing(&self) -> bool {
        self.post_processing.is_some()
    }

    /// Mode for frames of `format`.
    pub fn select(&mut self, format: PixelFormat) -> Result<&CompositeMode, FormatError> {
        let cached = self
            .selected
            .as_ref()
            .is_some_and(|(selected, _)| *selected == format);

        if !cached {
            let mode = self.decide(format)?;
            debug!("compositing {format} as {mode:?}");
            self.selected = Some((format, mode));
        }

        match &self.selected {
            Some((_, mode)) => Ok(mode),
            None => Err(FormatError::Unsupported(format)),
        }
    }

    fn decide(&self, format: PixelFormat) -> Result<CompositeMode, FormatError> {
        let chroma = format.output_chroma().inspect_err(|err| error!("{err}"))?;

        if format.native_chroma().is_none() {
            let post_process = self.post_processing.as_ref().and_then(|(_, mode)| {
                PostProcessProfile::for_chroma(chroma).map(|profile| (mode.clone(), profile))
            });
            return Ok(CompositeMode::ConvertFormat {
                from: format,
                to: chroma,
                post_process,
            });
        }

        Ok(match &self.post_processing {
            // Packed RGB has no luma plane to filter.
            Some((_, mode)) if chroma != Chroma::Rv24 => CompositeMode::PostProcess {
                mode: mode.clone(),
                profile: PostProcessProfile::for_format(format),
            },
            _ => CompositeMode::NativeCopy,
        })
    }

    /// Writes `frame` into `dst`, which must follow the selected output chroma.
    pub fn composite(&mut self, frame: &DecodedFrame, dst: &mut [Plane]) -> Result<(), FormatError> {
        let mode = self.select(frame.format)?.clone();

        let guard;
        let src: &[Plane] = match &frame.data {
            FrameData::Owned(planes) => planes,
            FrameData::Direct(picture) => {
                guard = picture.planes();
                &guard
            }
        };

        let (width, height) = (frame.width as usize, frame.height as usize);
        match mode {
            CompositeMode::NativeCopy => copy_planes(src, dst),
            CompositeMode::PostProcess { mode, profile } => {
                self.post_process(src, dst, frame, &mode, profile)
            }
            CompositeMode::ConvertFormat {
                from,
                to,
                post_process: None,
            } => self.converter.convert(from, src, width, height, to, dst),
            CompositeMode::ConvertFormat {
                from,
                to,
                post_process: Some((mode, profile)),
            } => {
                let mut converted: Vec<Plane> = to
                    .plane_geometry(width, height)
                    .into_iter()
                    .map(|(row_bytes, lines)| {
                        Plane::from_packed(vec![0; row_bytes * lines], row_bytes, lines)
                    })
                    .collect();
                self.converter
                    .convert(from, src, width, height, to, &mut converted)?;
                self.post_process(&converted, dst, frame, &mode, profile)
            }
        }
    }

    fn post_process(
        &mut self,
        src: &[Plane],
        dst: &mut [Plane],
        frame: &DecodedFrame,
        mode: &PostProcessMode,
        profile: PostProcessProfile,
    ) -> Result<(), FormatError> {
        if src.len() != dst.len() {
            return Err(FormatError::PlaneCountMismatch {
                src: src.len(),
                dst: dst.len(),
            });
        }
        if let Some((processor, _)) = self.post_processing.as_mut() {
            processor.process(
                src,
                dst,
                frame.width as usize,
                frame.height as usize,
                frame.qscale.as_ref(),
                mode,
                profile,
                frame.picture_type,
            );
        }
        Ok(())
    }
}

/// Copies every plane row by row over the narrower of the two pitches.
pub fn copy_planes(src: &[Plane], dst: &mut [Plane]) -> Result<(), FormatError> {
    if src.len() != dst.len() {
        return Err(FormatError::PlaneCountMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }

    for (src, dst) in src.iter().zip(dst.iter_mut()) {
        let row_bytes = src.pitch.min(dst.pitch);
        for line in 0..src.lines.min(dst.lines) {
            dst.row_mut(line)[..row_bytes].copy_from_slice(&src.row(line)[..row_bytes]);
        }
    }
    Ok(())
}
