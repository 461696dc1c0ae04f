// cglx/src/pbuffer.rs
//
//! GLX pbuffers backed by CGL pbuffers.
//!
//! A GLX pbuffer needs an identifier the server won't hand to anything else while the pbuffer
//! lives. We get one by creating a placeholder pixmap of the same size and using its ID; the
//! pixmap is freed when the pbuffer is destroyed.

use crate::attrib::{GLX_EVENT_MASK, GLX_FBCONFIG_ID, GLX_HEIGHT, GLX_LARGEST_PBUFFER};
use crate::attrib::{GLX_PBUFFER_HEIGHT, GLX_PBUFFER_WIDTH, GLX_PRESERVED_CONTENTS, GLX_WIDTH};
use crate::error::ToWindowingApiError;
use crate::platform::{Display, Native, PbufferFormat, Xid};
use crate::Error;

use bitflags::bitflags;
use euclid::default::Size2D;
use fnv::FnvHashMap;
use log::{debug, warn};
use std::sync::{Mutex, MutexGuard};

bitflags! {
    /// Events a client can select on a pbuffer.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct EventMask: u32 {
        const PBUFFER_CLOBBER = 0x0800_0000;
    }
}

/// The attribute list passed to `glXCreatePbuffer`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PbufferAttributes {
    pub size: Size2D<i32>,
    /// Hint only; CGL gives us exactly the size we ask for or fails.
    pub largest: bool,
    /// Hint only; contents are always preserved.
    pub preserved_contents: bool,
}

impl PbufferAttributes {
    /// Parses a `None`-terminated list of attribute/value pairs.
    ///
    /// The list may also simply end. Unknown attributes are rejected.
    pub fn parse(list: &[i32]) -> Result<PbufferAttributes, Error> {
        let mut attributes = PbufferAttributes::default();
        for pair in list.chunks(2) {
            let attribute = pair[0];
            if attribute == 0 {
                break;
            }
            let value = *pair.get(1).ok_or(Error::BadAttribute(attribute))?;
            match attribute {
                GLX_PBUFFER_WIDTH => attributes.size.width = value,
                GLX_PBUFFER_HEIGHT => attributes.size.height = value,
                GLX_LARGEST_PBUFFER => attributes.largest = value != 0,
                GLX_PRESERVED_CONTENTS => attributes.preserved_contents = value != 0,
                _ => return Err(Error::BadAttribute(attribute)),
            }
        }
        if attributes.size.width < 0 || attributes.size.height < 0 {
            return Err(Error::BadAttribute(if attributes.size.width < 0 {
                GLX_PBUFFER_WIDTH
            } else {
                GLX_PBUFFER_HEIGHT
            }));
        }
        Ok(attributes)
    }
}

struct Pbuffer<P> {
    size: Size2D<i32>,
    buffer: P,
    fbconfig_id: u32,
    event_mask: EventMask,
}

/// The process-wide table of pbuffers, keyed by their placeholder identifier.
pub struct PbufferTable<N: Native> {
    entries: Mutex<FnvHashMap<Xid, Pbuffer<N::PBuffer>>>,
}

impl<N: Native> Default for PbufferTable<N> {
    fn default() -> PbufferTable<N> {
        PbufferTable::new()
    }
}

impl<N: Native> PbufferTable<N> {
    pub fn new() -> PbufferTable<N> {
        PbufferTable {
            entries: Mutex::new(FnvHashMap::default()),
        }
    }

    // Lock the table
    fn lock(&self) -> MutexGuard<FnvHashMap<Xid, Pbuffer<N::PBuffer>>> {
        self.entries
            .lock()
            .unwrap_or_else(|_| fatal!("pbuffer table lock poisoned"))
    }

    /// Creates a pbuffer and returns its identifier.
    pub fn create<D: Display>(
        &self,
        display: &D,
        native: &N,
        screen: i32,
        fbconfig_id: u32,
        size: Size2D<i32>,
    ) -> Result<Xid, Error> {
        let buffer = native
            .create_pbuffer(size, PbufferFormat::default())
            .map_err(|err| Error::PbufferCreationFailed(err.to_windowing_api_error()))?;

        let placeholder_size = Size2D::new(size.width.max(1) as u32, size.height.max(1) as u32);
        let id = match display.create_placeholder_pixmap(screen, placeholder_size) {
            Some(id) => id,
            None => {
                if let Err(err) = native.destroy_pbuffer(buffer) {
                    warn!("destroying pbuffer after a failed create: {}", err.0);
                }
                return Err(Error::AllocationFailed);
            }
        };

        let previous = self.lock().insert(
            id,
            Pbuffer {
                size,
                buffer,
                fbconfig_id,
                event_mask: EventMask::empty(),
            },
        );
        if previous.is_some() {
            fatal!("the server reused live pbuffer identifier {:#x}", id);
        }

        debug!("Created pbuffer {:#x} ({:?})", id, size);
        Ok(id)
    }

    /// Destroys a pbuffer. Returns false if `id` isn't a pbuffer.
    pub fn destroy<D: Display>(&self, display: &D, native: &N, id: Xid) -> bool {
        let pbuffer = match self.lock().remove(&id) {
            Some(pbuffer) => pbuffer,
            None => return false,
        };

        if let Err(err) = native.destroy_pbuffer(pbuffer.buffer) {
            warn!("destroying pbuffer {:#x} failed: {}", id, native.error_string(err));
        }
        display.free_pixmap(id);
        debug!("Destroyed pbuffer {:#x}", id);
        true
    }

    #[inline]
    pub fn contains(&self, id: Xid) -> bool {
        self.lock().contains_key(&id)
    }

    /// Calls `f` with the native buffer object of the pbuffer `id`.
    ///
    /// The table stays locked until `f` returns, so the buffer can't be destroyed under it.
    pub fn with_buffer<F, R>(&self, id: Xid, f: F) -> Option<R>
    where
        F: FnOnce(N::PBuffer) -> R,
    {
        let entries = self.lock();
        let pbuffer = entries.get(&id)?;
        Some(f(pbuffer.buffer))
    }

    #[inline]
    pub fn size(&self, id: Xid) -> Option<Size2D<i32>> {
        self.lock().get(&id).map(|pbuffer| pbuffer.size)
    }

    /// Answers `glXQueryDrawable` for a pbuffer. Returns `None` if `id` isn't a pbuffer or the
    /// attribute doesn't apply.
    pub fn query(&self, id: Xid, attribute: i32) -> Option<u32> {
        let entries = self.lock();
        let pbuffer = entries.get(&id)?;
        match attribute {
            GLX_WIDTH => Some(pbuffer.size.width as u32),
            GLX_HEIGHT => Some(pbuffer.size.height as u32),
            GLX_PRESERVED_CONTENTS => Some(1),
            GLX_LARGEST_PBUFFER => Some(0),
            GLX_FBCONFIG_ID => Some(pbuffer.fbconfig_id),
            GLX_EVENT_MASK => Some(pbuffer.event_mask.bits()),
            _ => None,
        }
    }

    /// Returns false if `id` isn't a pbuffer.
    pub fn set_event_mask(&self, id: Xid, mask: EventMask) -> bool {
        match self.lock().get_mut(&id) {
            Some(pbuffer) => {
                pbuffer.event_mask = mask;
                true
            }
            None => false,
        }
    }

    pub fn event_mask(&self, id: Xid) -> Option<EventMask> {
        self.lock().get(&id).map(|pbuffer| pbuffer.event_mask)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.lock().len()
    }
}
