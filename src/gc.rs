// cglx/src/gc.rs
//
//! Reclamation of drawables whose server-side identifier went away.
//!
//! Windows and pixmaps can be destroyed on the server without any notification reaching us.
//! The only way to find out is to probe the identifier and watch for an error.

use crate::drawable::{destroy_backing, unlink_if_unreferenced, DrawableTable};
use crate::platform::{Display, Native};

use log::debug;

/// Installs a recording error handler on the display for the guard's lifetime.
///
/// Any errors already queued on the connection are flushed through the previous handler
/// first, so the trap only observes errors caused while it is installed.
#[must_use]
pub(crate) struct ErrorTrap<'a, D: Display> {
    display: &'a D,
}

impl<'a, D: Display> ErrorTrap<'a, D> {
    pub(crate) fn new(display: &'a D) -> ErrorTrap<'a, D> {
        display.sync();
        display.push_error_trap();
        ErrorTrap { display }
    }
}

impl<'a, D: Display> Drop for ErrorTrap<'a, D> {
    fn drop(&mut self) {
        self.display.pop_error_trap();
    }
}

impl DrawableTable {
    /// Destroys every unreferenced drawable whose identifier the server no longer knows.
    ///
    /// Referenced drawables are never probed. The table lock is held across the whole sweep, so
    /// nothing can reference an entry between its probe and its removal. Returns the number of
    /// entries destroyed.
    pub fn garbage_collect<N, D>(&self, display: &D, native: &N) -> usize
    where
        N: Native,
        D: Display,
    {
        if self.is_empty() {
            return 0;
        }

        let trap = ErrorTrap::new(display);
        let mut entries = self.lock();

        let candidates: Vec<_> = entries
            .values()
            .filter(|drawable| drawable.reference_count() == 0)
            .cloned()
            .collect();

        let mut collected = 0;
        for drawable in candidates {
            let err = match display.get_geometry(drawable.id()) {
                Ok(_) => continue,
                Err(err) => err,
            };
            if !err.is_stale_resource() {
                debug!("Probing drawable {:#x} failed with {:?}", drawable.id(), err);
                continue;
            }

            if unlink_if_unreferenced(&mut entries, &drawable) {
                debug!(
                    "Collected stale drawable {:#x} ({:?})",
                    drawable.id(),
                    drawable.kind()
                );
                destroy_backing(native, &drawable);
                collected += 1;
            }
        }

        // The previous error handler goes back before anyone else can touch the table.
        drop(trap);
        drop(entries);
        collected
    }
}
