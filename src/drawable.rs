// cglx/src/drawable.rs
//
//! The drawable table: reference-counted records mapping GLX drawables onto native objects.
//!
//! Every drawable that has ever been made current is tracked here, keyed by its protocol
//! identifier. Contexts hold counted references to the drawable they are attached to. Lookups
//! are not references: only `reference()` keeps an entry alive.
//!
//! An entry leaves the table in exactly one way, `remove_if_unreferenced()`, which checks the
//! count and unlinks in one step under the table lock. The thread that unlinks an entry is the
//! only one that tears its native backing down.

use crate::pbuffer::PbufferTable;
use crate::pixmap::PixmapTable;
use crate::platform::{Display, Native, SurfaceId, Xid};
use crate::Error;

use fnv::FnvHashMap;
use log::{debug, warn};
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// What backs a drawable. Fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawableKind {
    /// A window, rendered through an imported window server surface.
    Surface,
    /// A GLX pbuffer. The pbuffer table owns the native buffer.
    Pbuffer,
    /// A GLX pixmap. The pixmap table owns the shared memory.
    Pixmap,
}

/// One tracked drawable.
pub struct Drawable {
    id: Xid,
    kind: DrawableKind,
    screen: i32,
    // The client-unique ID the server tags surface notifications with. Zero if there is no
    // surface.
    uid: u32,
    generation: u64,
    state: Mutex<DrawableState>,
}

struct DrawableState {
    reference_count: usize,
    // Cleared when the server tells us it destroyed the surface, or on teardown.
    surface_id: Option<SurfaceId>,
    linked: bool,
}

impl Debug for Drawable {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Drawable")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Drawable {
    fn lock(&self) -> MutexGuard<DrawableState> {
        self.state
            .lock()
            .unwrap_or_else(|_| fatal!("drawable {:#x} lock poisoned", self.id))
    }

    /// Adds a reference. Lookups don't count; only references keep an entry in the table.
    pub fn reference(&self) {
        let mut state = self.lock();
        if !state.linked {
            fatal!("referencing drawable {:#x} after it was unlinked", self.id);
        }
        state.reference_count += 1;
    }

    /// Drops a reference. This never destroys the entry; see `DrawableTable::destroy()`.
    pub fn release(&self) {
        let mut state = self.lock();
        if state.reference_count == 0 {
            fatal!("releasing unreferenced drawable {:#x}", self.id);
        }
        state.reference_count -= 1;
    }

    #[inline]
    pub fn reference_count(&self) -> usize {
        self.lock().reference_count
    }

    /// The protocol identifier.
    #[inline]
    pub fn id(&self) -> Xid {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> DrawableKind {
        self.kind
    }

    #[inline]
    pub fn screen(&self) -> i32 {
        self.screen
    }

    #[inline]
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// A serial distinguishing this entry from earlier entries for the same identifier.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn surface_id(&self) -> Option<SurfaceId> {
        self.lock().surface_id
    }

    #[inline]
    pub fn is_surface(&self) -> bool {
        self.kind == DrawableKind::Surface
    }

    #[inline]
    pub fn is_pbuffer(&self) -> bool {
        self.kind == DrawableKind::Pbuffer
    }

    #[inline]
    pub fn is_pixmap(&self) -> bool {
        self.kind == DrawableKind::Pixmap
    }

    // Forgets the surface ID without destroying it, handing ownership to the caller.
    pub(crate) fn take_surface_id(&self) -> Option<SurfaceId> {
        self.lock().surface_id.take()
    }
}

/// The process-wide table of drawables.
pub struct DrawableTable {
    entries: Mutex<FnvHashMap<Xid, Arc<Drawable>>>,
    next_generation: AtomicU64,
}

impl Default for DrawableTable {
    fn default() -> DrawableTable {
        DrawableTable::new()
    }
}

impl DrawableTable {
    pub fn new() -> DrawableTable {
        DrawableTable {
            entries: Mutex::new(FnvHashMap::default()),
            next_generation: AtomicU64::new(1),
        }
    }

    // Lock the table
    pub(crate) fn lock(&self) -> MutexGuard<FnvHashMap<Xid, Arc<Drawable>>> {
        self.entries
            .lock()
            .unwrap_or_else(|_| fatal!("drawable table lock poisoned"))
    }

    /// Looks up a drawable. This doesn't add a reference.
    pub fn find(&self, id: Xid) -> Option<Arc<Drawable>> {
        self.lock().get(&id).cloned()
    }

    /// Returns true if `drawable` is still the live entry for its identifier.
    pub fn contains(&self, drawable: &Drawable) -> bool {
        self.lock()
            .get(&drawable.id)
            .map_or(false, |entry| entry.generation == drawable.generation)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> bool {
        matches!(self.entries.try_lock(), Err(std::sync::TryLockError::WouldBlock))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Creates an unreferenced entry for `id`.
    ///
    /// The kind is inferred from the pbuffer and pixmap tables; anything else is a window and
    /// gets a window server surface. Fails with `DrawableExists` if an entry for `id` was
    /// inserted first, in which case nothing of this call's making survives.
    pub fn create<N, D>(
        &self,
        display: &D,
        native: &N,
        pbuffers: &PbufferTable<N>,
        pixmaps: &PixmapTable,
        screen: i32,
        id: Xid,
    ) -> Result<Arc<Drawable>, Error>
    where
        N: Native,
        D: Display,
    {
        self.create_with_references(display, native, pbuffers, pixmaps, screen, id, 0)
    }

    /// Finds or creates the entry for `id` and adds a reference to it.
    ///
    /// A hit is referenced before the table lock is dropped, so it can't be collected out from
    /// under the caller. A miss is created outside the lock; if another thread wins the race to
    /// insert, its entry is adopted instead.
    pub(crate) fn acquire<N, D>(
        &self,
        display: &D,
        native: &N,
        pbuffers: &PbufferTable<N>,
        pixmaps: &PixmapTable,
        screen: i32,
        id: Xid,
    ) -> Result<Arc<Drawable>, Error>
    where
        N: Native,
        D: Display,
    {
        loop {
            if let Some(drawable) = self.find_and_reference(id) {
                return Ok(drawable);
            }
            match self.create_with_references(display, native, pbuffers, pixmaps, screen, id, 1) {
                Err(Error::DrawableExists) => {
                    debug!("Lost the race to create drawable {:#x}; retrying", id);
                }
                result => return result,
            }
        }
    }

    fn find_and_reference(&self, id: Xid) -> Option<Arc<Drawable>> {
        let entries = self.lock();
        let drawable = entries.get(&id)?;
        drawable.reference();
        Some(drawable.clone())
    }

    #[allow(clippy::too_many_arguments)]
    fn create_with_references<N, D>(
        &self,
        display: &D,
        native: &N,
        pbuffers: &PbufferTable<N>,
        pixmaps: &PixmapTable,
        screen: i32,
        id: Xid,
        reference_count: usize,
    ) -> Result<Arc<Drawable>, Error>
    where
        N: Native,
        D: Display,
    {
        let kind = if pbuffers.contains(id) {
            DrawableKind::Pbuffer
        } else if pixmaps.contains(id) {
            DrawableKind::Pixmap
        } else {
            DrawableKind::Surface
        };

        let (surface_id, uid) = match kind {
            DrawableKind::Surface => {
                let (surface_id, uid) = create_surface(display, native, screen, id)?;
                (Some(surface_id), uid)
            }
            DrawableKind::Pbuffer | DrawableKind::Pixmap => (None, 0),
        };

        let drawable = Arc::new(Drawable {
            id,
            kind,
            screen,
            uid,
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(DrawableState {
                reference_count,
                surface_id,
                linked: true,
            }),
        });

        let mut entries = self.lock();
        if entries.contains_key(&id) {
            drop(entries);
            debug!("Discarding duplicate {:?} for drawable {:#x}", kind, id);
            destroy_backing(native, &drawable);
            return Err(Error::DrawableExists);
        }
        entries.insert(id, drawable.clone());
        debug!(
            "Created {:?} drawable {:#x} (generation {})",
            kind, id, drawable.generation
        );
        Ok(drawable)
    }

    /// Unlinks `drawable` if nothing references it.
    ///
    /// Returns false, leaving the entry in place, if the count is positive. Also returns false
    /// if the entry was already unlinked. When this returns true the caller owns the teardown.
    pub fn remove_if_unreferenced(&self, drawable: &Drawable) -> bool {
        let mut entries = self.lock();
        unlink_if_unreferenced(&mut entries, drawable)
    }

    /// Unlinks `drawable` and tears down its native backing if nothing references it.
    ///
    /// Returns true iff this call destroyed the entry. False means someone still holds a
    /// reference, or another thread got there first; neither is an error.
    pub fn destroy<N: Native>(&self, native: &N, drawable: &Drawable) -> bool {
        let mut entries = self.lock();
        if !unlink_if_unreferenced(&mut entries, drawable) {
            return false;
        }
        destroy_backing(native, drawable);
        true
    }

    /// Destroys the entry for `id` if it exists and is unreferenced.
    pub fn destroy_id<N: Native>(&self, native: &N, id: Xid) -> bool {
        let mut entries = self.lock();
        let drawable = match entries.get(&id) {
            Some(drawable) => drawable.clone(),
            None => return false,
        };
        if !unlink_if_unreferenced(&mut entries, &drawable) {
            return false;
        }
        destroy_backing(native, &drawable);
        true
    }
}

// The table lock must be held.
pub(crate) fn unlink_if_unreferenced(
    entries: &mut FnvHashMap<Xid, Arc<Drawable>>,
    drawable: &Drawable,
) -> bool {
    let mut state = drawable.lock();
    if !state.linked || state.reference_count > 0 {
        return false;
    }

    match entries.get(&drawable.id) {
        Some(entry) if entry.generation == drawable.generation => {}
        _ => fatal!(
            "linked drawable {:#x} (generation {}) missing from the table",
            drawable.id,
            drawable.generation
        ),
    }

    state.linked = false;
    entries.remove(&drawable.id);
    debug!("Unlinked drawable {:#x}", drawable.id);
    true
}

// Releases what the entry owns. Pbuffers and pixmaps are owned by their own tables and are
// destroyed explicitly through them.
pub(crate) fn destroy_backing<N: Native>(native: &N, drawable: &Drawable) {
    if let Some(surface_id) = drawable.take_surface_id() {
        if let Err(err) = native.destroy_surface(surface_id) {
            warn!(
                "destroying surface {:?} of drawable {:#x} failed: {}",
                surface_id, drawable.id, err.0
            );
        }
    }
}

fn create_surface<N, D>(
    display: &D,
    native: &N,
    screen: i32,
    id: Xid,
) -> Result<(SurfaceId, u32), Error>
where
    N: Native,
    D: Display,
{
    let client = native.client_id().ok_or(Error::NoClientId)?;
    let grant = display
        .create_surface(screen, id, client)
        .ok_or(Error::SurfaceCreationFailed)?;
    match native.import_surface(grant.key) {
        Ok(surface_id) => Ok((surface_id, grant.uid)),
        Err(err) => {
            warn!("importing surface for drawable {:#x} failed: {}", id, err.0);
            display.destroy_surface(screen, id);
            Err(Error::SurfaceImportFailed(err))
        }
    }
}
