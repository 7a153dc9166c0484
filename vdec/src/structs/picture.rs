use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::structs::format::VideoFormat;

/// Row alignment of renderer-allocated planes.
pub const PLANE_ALIGN: usize = 16;

/// One plane of pixel data, `pitch` bytes per row over `lines` rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    pub pitch: usize,
    pub lines: usize,
    /// Bytes per row that carry picture content.
    pub visible_pitch: usize,
}

impl Plane {
    /// Allocates a zeroed plane whose pitch is `row_bytes` rounded up to `align`.
    pub fn new(row_bytes: usize, lines: usize, align: usize) -> Self {
        let pitch = row_bytes.next_multiple_of(align.max(1));
        Self {
            data: vec![0; pitch * lines],
            pitch,
            lines,
            visible_pitch: row_bytes,
        }
    }

    /// Wraps tightly packed rows.
    pub fn from_packed(data: Vec<u8>, row_bytes: usize, lines: usize) -> Self {
        Self {
            data,
            pitch: row_bytes,
            lines,
            visible_pitch: row_bytes,
        }
    }

    pub fn row(&self, line: usize) -> &[u8] {
        let start = line * self.pitch;
        &self.data[start..start + self.pitch]
    }

    pub fn row_mut(&mut self, line: usize) -> &mut [u8] {
        let start = line * self.pitch;
        &mut self.data[start..start + self.pitch]
    }

    /// Visible rows without the alignment padding.
    pub fn visible_rows(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.lines).map(|line| &self.row(line)[..self.visible_pitch])
    }
}

/// Lifecycle of a pool picture.
///
/// `Free` pictures belong to the pool. `Allocated` pictures are being written
/// by the decode side. `Referenced` pictures are queued for display or held
/// by the decoder for prediction. `Released` pictures have no holder left and
/// are reclaimed on the next allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureState {
    Free,
    Allocated,
    Referenced,
    Released,
}

impl Display for PictureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PictureState::Free => write!(f, "FREE"),
            PictureState::Allocated => write!(f, "ALLOCATED"),
            PictureState::Referenced => write!(f, "REFERENCED"),
            PictureState::Released => write!(f, "RELEASED"),
        }
    }
}

/// A picture buffer owned by a [`FrameBufferPool`](crate::utils::buffer_pool::FrameBufferPool).
///
/// The state and reference count live in the pool; the buffer itself only
/// carries the pixel storage.
#[derive(Debug)]
pub struct PictureBuffer {
    id: usize,
    format: VideoFormat,
    planes: Mutex<Vec<Plane>>,
}

impl PictureBuffer {
    pub(crate) fn new(id: usize, format: VideoFormat) -> Self {
        let planes = format
            .chroma
            .plane_geometry(format.width as usize, format.height as usize)
            .into_iter()
            .map(|(row_bytes, lines)| Plane::new(row_bytes, lines, PLANE_ALIGN))
            .collect();

        Self {
            id,
            format,
            planes: Mutex::new(planes),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    /// Locks the pixel planes for reading or writing.
    pub fn planes(&self) -> MutexGuard<'_, Vec<Plane>> {
        self.planes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The decoder's handle on a picture obtained through a
/// [`BufferProvider`](crate::codec::BufferProvider).
///
/// Giving the view back to the provider ends the decoder's access and drops
/// the reference taken for predicted pictures.
#[derive(Debug)]
pub struct PictureView {
    pub(crate) picture: Arc<PictureBuffer>,
    pub(crate) linked: bool,
}

impl PictureView {
    pub fn new(picture: Arc<PictureBuffer>, linked: bool) -> Self {
        Self { picture, linked }
    }

    pub fn picture(&self) -> &Arc<PictureBuffer> {
        &self.picture
    }
}
