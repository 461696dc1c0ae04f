// cglx/src/pixmap.rs
//
//! GLX pixmaps, rendered through shared memory exported by the display server.

use crate::attrib::{GLX_FBCONFIG_ID, GLX_HEIGHT, GLX_WIDTH};
use crate::platform::{self, Display, OffScreenTarget, Xid};
use crate::shm::SharedBuffer;
use crate::Error;

use euclid::default::Size2D;
use fnv::FnvHashMap;
use log::{debug, warn};
use std::sync::{Mutex, MutexGuard};

struct Pixmap {
    size: Size2D<i32>,
    pitch: i32,
    // Bytes per pixel.
    bpp: i32,
    fbconfig_id: u32,
    buffer: SharedBuffer,
}

/// The process-wide table of GLX pixmaps.
#[derive(Default)]
pub struct PixmapTable {
    entries: Mutex<FnvHashMap<Xid, Pixmap>>,
}

impl PixmapTable {
    pub fn new() -> PixmapTable {
        PixmapTable::default()
    }

    // Lock the table
    fn lock(&self) -> MutexGuard<FnvHashMap<Xid, Pixmap>> {
        self.entries
            .lock()
            .unwrap_or_else(|_| fatal!("pixmap table lock poisoned"))
    }

    /// Makes the X pixmap `pixmap` renderable.
    pub fn create<D: Display>(
        &self,
        display: &D,
        screen: i32,
        pixmap: Xid,
        fbconfig_id: u32,
    ) -> Result<(), Error> {
        if self.contains(pixmap) {
            return Err(Error::Failed);
        }

        let shared = display
            .create_shared_pixmap(screen, pixmap)
            .ok_or(Error::PixmapCreationFailed)?;

        let required = shared.pitch.max(0) as usize * shared.size.height.max(0) as usize;
        if shared.length < required {
            warn!(
                "pixmap {:#x} exports {} bytes but needs {}",
                pixmap, shared.length, required
            );
            display.destroy_shared_pixmap(pixmap);
            return Err(Error::PixmapCreationFailed);
        }

        let buffer = match platform::map_shared_pixmap(&shared) {
            Ok(buffer) => buffer,
            Err(err) => {
                display.destroy_shared_pixmap(pixmap);
                return Err(err);
            }
        };

        let mut entries = self.lock();
        if entries.contains_key(&pixmap) {
            // The export belongs to the pixmap, and the winner owns it now.
            return Err(Error::Failed);
        }
        debug!(
            "Created pixmap {:#x} ({:?}, {} bytes)",
            pixmap,
            shared.size,
            buffer.len()
        );
        entries.insert(
            pixmap,
            Pixmap {
                size: shared.size,
                pitch: shared.pitch,
                bpp: shared.bpp,
                fbconfig_id,
                buffer,
            },
        );
        Ok(())
    }

    /// Unmaps and forgets a pixmap. Returns false if `pixmap` isn't a GLX pixmap.
    pub fn destroy<D: Display>(&self, display: &D, pixmap: Xid) -> bool {
        let entry = match self.lock().remove(&pixmap) {
            Some(entry) => entry,
            None => return false,
        };
        display.destroy_shared_pixmap(pixmap);
        drop(entry);
        debug!("Destroyed pixmap {:#x}", pixmap);
        true
    }

    #[inline]
    pub fn contains(&self, pixmap: Xid) -> bool {
        self.lock().contains_key(&pixmap)
    }

    /// Calls `f` with the pixmap's memory described as an off-screen render target.
    ///
    /// The table stays locked until `f` returns, so the memory can't be unmapped under it.
    /// Returns `None` without calling `f` if `pixmap` isn't a GLX pixmap.
    pub fn with_off_screen_target<F, R>(&self, pixmap: Xid, f: F) -> Option<R>
    where
        F: FnOnce(&OffScreenTarget) -> R,
    {
        let entries = self.lock();
        let entry = entries.get(&pixmap)?;
        let target = OffScreenTarget {
            size: entry.size,
            row_bytes: entry.pitch,
            bits_per_pixel: entry.bpp * 8,
            base: entry.buffer.as_mut_ptr(),
        };
        Some(f(&target))
    }

    /// Answers `glXQueryDrawable` for a pixmap.
    pub fn query(&self, pixmap: Xid, attribute: i32) -> Option<u32> {
        let entries = self.lock();
        let entry = entries.get(&pixmap)?;
        match attribute {
            GLX_WIDTH => Some(entry.size.width as u32),
            GLX_HEIGHT => Some(entry.size.height as u32),
            GLX_FBCONFIG_ID => Some(entry.fbconfig_id),
            _ => None,
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.lock().len()
    }
}
