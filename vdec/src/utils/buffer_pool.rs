use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, trace};

use crate::codec::{BufferProvider, BufferRequest};
use crate::log_or_err;
use crate::structs::format::VideoFormat;
use crate::structs::picture::{PictureBuffer, PictureState, PictureView};
use crate::utils::errors::PoolError;

/// How often a blocked allocation re-checks for shutdown.
pub const ALLOC_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Pipeline-wide stop signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A picture handed to the renderer together with its presentation time.
#[derive(Debug, Clone)]
pub struct DisplayPicture {
    pub picture: Arc<PictureBuffer>,
    pub pts: i64,
}

#[derive(Debug)]
struct Slot {
    picture: Arc<PictureBuffer>,
    state: PictureState,
    refcount: u32,
    display_pending: bool,
    /// Allocated for a previous output format; dropped once released.
    stale: bool,
}

impl Slot {
    fn is_free(&self) -> bool {
        !self.stale && self.state == PictureState::Free
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    format: Option<VideoFormat>,
    slots: Vec<Slot>,
    display_queue: VecDeque<DisplayPicture>,
    closed: bool,
    next_id: usize,
}

impl PoolInner {
    fn slot_mut(&mut self, id: usize) -> Result<&mut Slot, PoolError> {
        self.slots
            .iter_mut()
            .find(|slot| slot.picture.id() == id)
            .ok_or(PoolError::UnknownPicture(id))
    }

    fn live_slots(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.stale).count()
    }

    /// Hands released pictures back to the pool.
    fn reclaim(&mut self) {
        self.slots
            .iter_mut()
            .filter(|slot| !slot.stale && slot.state == PictureState::Released)
            .for_each(|slot| slot.state = PictureState::Free);
    }

    /// Moves a picture to `Released` once nobody holds it any more.
    fn try_release(&mut self, id: usize) -> bool {
        let Some(index) = self.slots.iter().position(|slot| slot.picture.id() == id) else {
            return false;
        };

        let slot = &mut self.slots[index];
        if slot.state != PictureState::Referenced || slot.refcount != 0 || slot.display_pending {
            return false;
        }

        trace!("picture {id} released");
        if slot.stale {
            self.slots.swap_remove(index);
        } else {
            slot.state = PictureState::Released;
        }
        true
    }
}

/// Picture buffers shared between the decode thread and the renderer.
///
/// Buffers are created lazily up to `capacity`. The decode side allocates,
/// links and publishes; the renderer takes published pictures from the
/// display queue and reports when it is done with them. A picture is only
/// reused after its reference count has dropped to zero and its display has
/// finished.
#[derive(Debug)]
pub struct FrameBufferPool {
    inner: Mutex<PoolInner>,
    available: Condvar,
    displayable: Condvar,
    capacity: usize,
    allow_modify: AtomicBool,
    fail_level: log::Level,
}

impl FrameBufferPool {
    /// Creates an empty pool holding at most `capacity` pictures.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            available: Condvar::new(),
            displayable: Condvar::new(),
            capacity: capacity.max(1),
            allow_modify: AtomicBool::new(true),
            fail_level: log::Level::Error,
        }
    }

    /// Sets the failure level for protocol violations such as unlink underflow.
    pub fn with_fail_level(mut self, level: log::Level) -> Self {
        self.fail_level = level;
        self
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn format(&self) -> Option<VideoFormat> {
        self.lock().format
    }

    /// Sets the output format, retiring buffers of any previous format.
    pub fn configure(&self, format: VideoFormat) -> Result<(), PoolError> {
        if format.width == 0 || format.height == 0 {
            return Err(PoolError::InvalidFormat {
                width: format.width,
                height: format.height,
            });
        }

        let mut inner = self.lock();
        if inner.format == Some(format) {
            return Ok(());
        }

        debug!(
            "output format {}x{} {} (aspect {})",
            format.width, format.height, format.chroma, format.aspect
        );
        inner.format = Some(format);
        inner
            .slots
            .retain(|slot| !matches!(slot.state, PictureState::Free | PictureState::Released));
        inner.slots.iter_mut().for_each(|slot| slot.stale = true);
        self.available.notify_all();

        Ok(())
    }

    /// Obtains a picture for writing, blocking until one is free.
    ///
    /// The wait wakes up every [`ALLOC_POLL_INTERVAL`] to observe `cancel`,
    /// and fails as soon as the pool is closed.
    pub fn allocate(&self, cancel: &CancelToken) -> Result<Arc<PictureBuffer>, PoolError> {
        let mut inner = self.lock();

        loop {
            if inner.closed {
                return Err(PoolError::Closed);
            }
            if cancel.is_cancelled() {
                return Err(PoolError::Cancelled);
            }

            let Some(format) = inner.format else {
                return Err(PoolError::InvalidFormat {
                    width: 0,
                    height: 0,
                });
            };

            inner.reclaim();
            if inner.slots.iter().all(|slot| !slot.is_free()) && inner.live_slots() < self.capacity {
                let id = inner.next_id;
                inner.next_id += 1;

                trace!("picture {id} created");
                inner.slots.push(Slot {
                    picture: Arc::new(PictureBuffer::new(id, format)),
                    state: PictureState::Free,
                    refcount: 0,
                    display_pending: false,
                    stale: false,
                });
            }

            if let Some(slot) = inner.slots.iter_mut().find(|slot| slot.is_free()) {
                slot.state = PictureState::Allocated;
                slot.refcount = 0;
                slot.display_pending = false;
                return Ok(slot.picture.clone());
            }

            inner = self
                .available
                .wait_timeout(inner, ALLOC_POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Takes a reference for a picture that later pictures predict from.
    pub fn link(&self, picture: &PictureBuffer) -> Result<(), PoolError> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(picture.id())?;

        match slot.state {
            PictureState::Allocated | PictureState::Referenced => {
                slot.refcount += 1;
                Ok(())
            }
            state => Err(PoolError::InvalidTransition {
                id: picture.id(),
                state,
            }),
        }
    }

    /// Drops a reference taken with [`link`](Self::link).
    pub fn unlink(&self, picture: &PictureBuffer) -> Result<(), PoolError> {
        let id = picture.id();
        let mut inner = self.lock();
        let slot = inner.slot_mut(id)?;

        if slot.refcount == 0 {
            log_or_err!(self, log::Level::Warn, PoolError::RefcountUnderflow(id));
            return Ok(());
        }

        slot.refcount -= 1;
        if inner.try_release(id) {
            self.available.notify_all();
        }
        Ok(())
    }

    /// Queues a written picture for display at `pts`.
    pub fn publish(&self, picture: &Arc<PictureBuffer>, pts: i64) -> Result<(), PoolError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(PoolError::Closed);
        }

        let slot = inner.slot_mut(picture.id())?;
        if slot.state != PictureState::Allocated {
            return Err(PoolError::InvalidTransition {
                id: picture.id(),
                state: slot.state,
            });
        }

        slot.state = PictureState::Referenced;
        slot.display_pending = true;
        inner.display_queue.push_back(DisplayPicture {
            picture: picture.clone(),
            pts,
        });
        self.displayable.notify_one();
        Ok(())
    }

    /// Gives back an allocated picture that will not be displayed.
    pub fn discard(&self, picture: &PictureBuffer) -> Result<(), PoolError> {
        let id = picture.id();
        let mut inner = self.lock();
        let slot = inner.slot_mut(id)?;

        if slot.state != PictureState::Allocated {
            return Err(PoolError::InvalidTransition {
                id,
                state: slot.state,
            });
        }

        slot.state = PictureState::Referenced;
        slot.display_pending = false;
        if inner.try_release(id) {
            self.available.notify_all();
        }
        Ok(())
    }

    /// Renderer side: waits up to `timeout` for the next published picture.
    ///
    /// Returns `None` on timeout, or once the pool is closed and drained.
    pub fn next_displayable(&self, timeout: Duration) -> Option<DisplayPicture> {
        let mut inner = self.lock();

        if inner.display_queue.is_empty() && !inner.closed {
            inner = self
                .displayable
                .wait_timeout(inner, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        inner.display_queue.pop_front()
    }

    /// Renderer side: the picture has been shown and may be reused.
    pub fn displayed(&self, picture: &PictureBuffer) -> Result<(), PoolError> {
        let id = picture.id();
        let mut inner = self.lock();
        let slot = inner.slot_mut(id)?;

        if !slot.display_pending {
            return Err(PoolError::InvalidTransition {
                id,
                state: slot.state,
            });
        }

        slot.display_pending = false;
        if inner.try_release(id) {
            self.available.notify_all();
        }
        Ok(())
    }

    /// Whether the renderer may modify published pictures in place.
    pub fn allows_modify(&self) -> bool {
        self.allow_modify.load(Ordering::Acquire)
    }

    pub fn set_allow_modify(&self, allow: bool) {
        self.allow_modify.store(allow, Ordering::Release);
    }

    /// Shuts the pool down and wakes every waiter on both sides.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        self.available.notify_all();
        self.displayable.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_drained(&self) -> bool {
        let inner = self.lock();
        inner.closed && inner.display_queue.is_empty()
    }

    /// State and reference count of a picture, if it is still in the pool.
    pub fn picture_state(&self, id: usize) -> Option<(PictureState, u32)> {
        let inner = self.lock();
        inner
            .slots
            .iter()
            .find(|slot| slot.picture.id() == id)
            .map(|slot| (slot.state, slot.refcount))
    }
}

/// Zero-copy buffer source handed to the decoder.
///
/// Pictures come straight from the renderer pool; reference pictures are
/// linked for as long as the decoder keeps its view.
#[derive(Debug)]
pub struct DirectRendering {
    pool: Arc<FrameBufferPool>,
    cancel: CancelToken,
    aspect_ratio: f32,
}

impl DirectRendering {
    pub fn new(pool: Arc<FrameBufferPool>, cancel: CancelToken) -> Self {
        pool.set_allow_modify(false);
        Self {
            pool,
            cancel,
            aspect_ratio: 0.0,
        }
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
    }

    pub fn pool(&self) -> &Arc<FrameBufferPool> {
        &self.pool
    }
}

impl BufferProvider for DirectRendering {
    fn get_buffer(&mut self, request: &BufferRequest) -> Result<PictureView, PoolError> {
        let Some(chroma) = request.format.native_chroma() else {
            return Err(PoolError::InvalidFormat {
                width: request.width,
                height: request.height,
            });
        };

        self.pool.configure(VideoFormat::new(
            request.width,
            request.height,
            chroma,
            self.aspect_ratio,
        ))?;

        let picture = self.pool.allocate(&self.cancel)?;
        if request.reference {
            self.pool.link(&picture)?;
        }

        Ok(PictureView::new(picture, request.reference))
    }

    fn release_buffer(&mut self, view: PictureView) -> Result<(), PoolError> {
        if view.linked {
            self.pool.unlink(&view.picture)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::format::{Chroma, PixelFormat};
    use std::thread;

    fn pool(capacity: usize) -> FrameBufferPool {
        let pool = FrameBufferPool::new(capacity);
        pool.configure(VideoFormat::new(16, 16, Chroma::I420, 0.0))
            .unwrap();
        pool
    }

    #[test]
    fn released_only_after_display_and_unlink() -> Result<(), PoolError> {
        let pool = pool(2);
        let cancel = CancelToken::new();

        let picture = pool.allocate(&cancel)?;
        pool.link(&picture)?;
        pool.publish(&picture, 1_000)?;
        assert_eq!(
            pool.picture_state(picture.id()),
            Some((PictureState::Referenced, 1))
        );

        let shown = pool.next_displayable(Duration::from_millis(1)).unwrap();
        assert_eq!(shown.pts, 1_000);
        pool.displayed(&shown.picture)?;
        assert_eq!(
            pool.picture_state(picture.id()),
            Some((PictureState::Referenced, 1))
        );

        pool.unlink(&picture)?;
        assert_eq!(
            pool.picture_state(picture.id()),
            Some((PictureState::Released, 0))
        );

        let again = pool.allocate(&cancel)?;
        assert_eq!(again.id(), picture.id());
        Ok(())
    }

    #[test]
    fn unlink_never_goes_negative() -> Result<(), PoolError> {
        let pool = pool(1);
        let picture = pool.allocate(&CancelToken::new())?;

        pool.unlink(&picture)?;
        assert_eq!(
            pool.picture_state(picture.id()),
            Some((PictureState::Allocated, 0))
        );

        let strict = FrameBufferPool::new(1).with_fail_level(log::Level::Warn);
        strict.configure(VideoFormat::new(16, 16, Chroma::I420, 0.0))?;
        let picture = strict.allocate(&CancelToken::new())?;
        assert_eq!(
            strict.unlink(&picture),
            Err(PoolError::RefcountUnderflow(picture.id()))
        );
        Ok(())
    }

    #[test]
    fn blocked_allocation_observes_cancel() -> Result<(), PoolError> {
        let pool = Arc::new(pool(1));
        let cancel = CancelToken::new();
        let _held = pool.allocate(&cancel)?;

        let waiter = {
            let pool = pool.clone();
            let cancel = cancel.clone();
            thread::spawn(move || pool.allocate(&cancel).map(|p| p.id()))
        };

        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
        assert_eq!(waiter.join().unwrap(), Err(PoolError::Cancelled));
        Ok(())
    }

    #[test]
    fn close_fails_waiters() -> Result<(), PoolError> {
        let pool = Arc::new(pool(1));
        let _held = pool.allocate(&CancelToken::new())?;

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.allocate(&CancelToken::new()).map(|p| p.id()))
        };

        thread::sleep(Duration::from_millis(30));
        pool.close();
        assert_eq!(waiter.join().unwrap(), Err(PoolError::Closed));
        assert!(pool.next_displayable(Duration::from_millis(1)).is_none());
        Ok(())
    }

    #[test]
    fn released_pictures_return_to_free_on_allocation() -> Result<(), PoolError> {
        let pool = pool(2);
        let cancel = CancelToken::new();

        let first = pool.allocate(&cancel)?;
        let second = pool.allocate(&cancel)?;
        pool.discard(&first)?;
        pool.discard(&second)?;
        assert_eq!(
            pool.picture_state(second.id()),
            Some((PictureState::Released, 0))
        );

        let again = pool.allocate(&cancel)?;
        assert_eq!(again.id(), first.id());
        assert_eq!(
            pool.picture_state(first.id()),
            Some((PictureState::Allocated, 0))
        );
        assert_eq!(
            pool.picture_state(second.id()),
            Some((PictureState::Free, 0))
        );
        Ok(())
    }

    #[test]
    fn discarded_picture_is_reused() -> Result<(), PoolError> {
        let pool = pool(1);
        let cancel = CancelToken::new();

        let picture = pool.allocate(&cancel)?;
        pool.discard(&picture)?;
        assert_eq!(
            pool.picture_state(picture.id()),
            Some((PictureState::Released, 0))
        );
        assert_eq!(pool.allocate(&cancel)?.id(), picture.id());
        Ok(())
    }

    #[test]
    fn format_change_retires_old_buffers() -> Result<(), PoolError> {
        let pool = pool(2);
        let cancel = CancelToken::new();

        let held = pool.allocate(&cancel)?;
        let spare = pool.allocate(&cancel)?;
        pool.discard(&spare)?;

        pool.configure(VideoFormat::new(32, 32, Chroma::I444, 0.0))?;
        assert_eq!(pool.picture_state(spare.id()), None);

        let fresh = pool.allocate(&cancel)?;
        assert_eq!(fresh.format().chroma, Chroma::I444);

        pool.discard(&held)?;
        assert_eq!(pool.picture_state(held.id()), None);
        Ok(())
    }

    #[test]
    fn direct_rendering_links_reference_pictures() -> Result<(), PoolError> {
        let pool = Arc::new(FrameBufferPool::new(4));
        let mut direct = DirectRendering::new(pool.clone(), CancelToken::new());
        assert!(!pool.allows_modify());

        let request = BufferRequest {
            format: PixelFormat::Yuv420p,
            width: 32,
            height: 16,
            reference: true,
        };
        let view = direct.get_buffer(&request)?;
        let id = view.picture().id();
        assert_eq!(pool.picture_state(id), Some((PictureState::Allocated, 1)));

        pool.discard(view.picture())?;
        assert_eq!(pool.picture_state(id), Some((PictureState::Referenced, 1)));

        direct.release_buffer(view)?;
        assert_eq!(pool.picture_state(id), Some((PictureState::Released, 0)));

        let unsupported = BufferRequest {
            format: PixelFormat::Yuv410p,
            ..request
        };
        assert!(direct.get_buffer(&unsupported).is_err());
        Ok(())
    }
}
