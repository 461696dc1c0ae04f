// cglx/src/glx.rs
//
//! The entry points the GLX protocol layer calls.
//!
//! `Glx` owns every registry and coordinates them: binding contexts to drawables, tearing
//! contexts down, reacting to surface notifications from the server, and the pbuffer and pixmap
//! extensions. The display connection is passed into each call rather than stored.

use crate::attrib::{GLX_HEIGHT, GLX_WIDTH};
use crate::config::Config;
use crate::context::{Context, ContextHandle, ContextRegistry};
use crate::drawable::{Drawable, DrawableKind, DrawableTable};
use crate::error::{GlxError, GlxErrorCode, ToWindowingApiError, WindowingApiError};
use crate::pbuffer::{EventMask, PbufferAttributes, PbufferTable};
use crate::pixmap::PixmapTable;
use crate::platform::{CglError, Display, Native, SurfaceNotifyKind, Xid, NONE};
use crate::visual::PixelFormatDescriptor;
use crate::Error;

use bitflags::bitflags;
use log::{debug, warn};
use std::sync::Arc;
use std::thread;

bitflags! {
    /// Which groups of state `copy_context` copies. These are the GL attribute bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct CopyMask: u32 {
        const CURRENT = 0x0000_0001;
        const POINT = 0x0000_0002;
        const LINE = 0x0000_0004;
        const POLYGON = 0x0000_0008;
        const POLYGON_STIPPLE = 0x0000_0010;
        const PIXEL_MODE = 0x0000_0020;
        const LIGHTING = 0x0000_0040;
        const FOG = 0x0000_0080;
        const DEPTH_BUFFER = 0x0000_0100;
        const ACCUM_BUFFER = 0x0000_0200;
        const STENCIL_BUFFER = 0x0000_0400;
        const VIEWPORT = 0x0000_0800;
        const TRANSFORM = 0x0000_1000;
        const ENABLE = 0x0000_2000;
        const COLOR_BUFFER = 0x0000_4000;
        const HINT = 0x0000_8000;
        const EVAL = 0x0001_0000;
        const LIST = 0x0002_0000;
        const TEXTURE = 0x0004_0000;
        const SCISSOR = 0x0008_0000;
        const ALL = 0xFFFF_FFFF;
    }
}

/// The drawable and context registries plus the native API they map onto.
pub struct Glx<N: Native> {
    native: N,
    config: Config,
    drawables: DrawableTable,
    contexts: ContextRegistry<N>,
    pbuffers: PbufferTable<N>,
    pixmaps: PixmapTable,
}

impl<N: Native> Glx<N> {
    pub fn new(native: N, config: Config) -> Glx<N> {
        Glx {
            native,
            config,
            drawables: DrawableTable::new(),
            contexts: ContextRegistry::new(),
            pbuffers: PbufferTable::new(),
            pixmaps: PixmapTable::new(),
        }
    }

    #[inline]
    pub fn native(&self) -> &N {
        &self.native
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn drawables(&self) -> &DrawableTable {
        &self.drawables
    }

    #[inline]
    pub fn contexts(&self) -> &ContextRegistry<N> {
        &self.contexts
    }

    #[inline]
    pub fn pbuffers(&self) -> &PbufferTable<N> {
        &self.pbuffers
    }

    #[inline]
    pub fn pixmaps(&self) -> &PixmapTable {
        &self.pixmaps
    }

    #[inline]
    pub fn context(&self, handle: ContextHandle) -> Option<Arc<Context<N>>> {
        self.contexts.get(handle)
    }

    fn report(&self, call: &str, err: CglError) -> WindowingApiError {
        if self.config.diagnostic {
            warn!("{}: {}", call, self.native.error_string(err));
        } else {
            debug!("{} failed: {}", call, err.0);
        }
        err.to_windowing_api_error()
    }

    /// Creates a context for `descriptor` on `screen`, optionally sharing objects with `share`.
    pub fn create_context(
        &self,
        screen: i32,
        descriptor: &PixelFormatDescriptor,
        share: Option<ContextHandle>,
    ) -> Result<ContextHandle, GlxError> {
        let share = match share {
            Some(handle) => match self.contexts.get(handle) {
                Some(context) if context.screen() != screen => {
                    return Err(GlxError::x11(GlxErrorCode::BadMatch));
                }
                Some(context) => Some(context.native_context()),
                None => return Err(GlxError::glx(GlxErrorCode::BadContext)),
            },
            None => None,
        };

        let pixel_format = match self.native.choose_pixel_format(&descriptor.to_attributes()) {
            Ok(Some(pixel_format)) => pixel_format,
            Ok(None) => return Err(Error::NoPixelFormatFound.to_glx_error()),
            Err(err) => {
                let err = self.report("choosing a pixel format", err);
                return Err(Error::PixelFormatSelectionFailed(err).to_glx_error());
            }
        };

        let native_context = match self.native.create_context(pixel_format, share) {
            Ok(native_context) => native_context,
            Err(err) => {
                let err = self.report("creating a context", err);
                if let Err(err) = self.native.destroy_pixel_format(pixel_format) {
                    warn!("destroying pixel format failed: {}", err.0);
                }
                return Err(Error::ContextCreationFailed(err).to_glx_error());
            }
        };

        let handle = self.contexts.next_handle();
        self.contexts.insert(Arc::new(Context::new(
            handle,
            screen,
            descriptor.is_double_buffered(),
            native_context,
            pixel_format,
        )));
        debug!("Created context {:?} ({:?})", handle, native_context);
        Ok(handle)
    }

    /// Destroys a context, its native objects, and its drawable if nothing else references it.
    pub fn destroy_context<D: Display>(
        &self,
        display: &D,
        handle: ContextHandle,
    ) -> Result<(), Error> {
        let context = self.contexts.get(handle).ok_or(Error::InvalidContext)?;

        if self.native.current_context() == Some(context.native_context()) {
            if let Err(err) = self.native.set_current_context(None) {
                let err = self.report("clearing the current context", err);
                fatal!("context {:?} can't be made not current: {:?}", handle, err);
            }
        }

        // Nothing can find the context by notification once it is unlinked.
        if self.contexts.remove(handle).is_none() {
            // Another thread destroyed it first.
            return Err(Error::InvalidContext);
        }

        if let Err(err) = self.native.clear_drawable(context.native_context()) {
            let err = self.report("clearing the drawable", err);
            fatal!("context {:?} drawable can't be cleared: {:?}", handle, err);
        }

        let drawable = context.lock().drawable.take();
        if let Some(drawable) = drawable {
            self.release_drawable(display, &drawable);
        }

        if let Err(err) = self.native.destroy_pixel_format(context.pixel_format()) {
            let err = self.report("destroying the pixel format", err);
            fatal!("context {:?} pixel format can't be destroyed: {:?}", handle, err);
        }
        if let Err(err) = self.native.destroy_context(context.native_context()) {
            let err = self.report("destroying the context", err);
            fatal!("context {:?} can't be destroyed: {:?}", handle, err);
        }
        debug!("Destroyed context {:?}", handle);
        drop(context);

        if self.config.collect_on_context_destroy {
            self.garbage_collect(display);
        }
        Ok(())
    }

    // Drops a context's reference on `drawable`, destroying the entry if it was the last one.
    fn release_drawable<D: Display>(&self, display: &D, drawable: &Drawable) {
        drawable.release();
        if self.drawables.destroy(&self.native, drawable) && drawable.is_surface() {
            display.destroy_surface(drawable.screen(), drawable.id());
        }
    }

    /// Binds `new` to `drawable` on the calling thread, replacing `old`.
    ///
    /// With no `new` context the thread ends up with no current context. With a `drawable` of
    /// `NONE` the context becomes current without a drawable. If the native bind fails, the
    /// context keeps the drawable it had.
    pub fn make_current<D: Display>(
        &self,
        display: &D,
        old: Option<ContextHandle>,
        new: Option<ContextHandle>,
        drawable: Xid,
    ) -> Result<(), Error> {
        if let Some(old) = old.and_then(|handle| self.contexts.get(handle)) {
            old.lock().is_current = false;
        }

        let context = match new {
            None => {
                if let Err(err) = self.native.set_current_context(None) {
                    self.report("clearing the current context", err);
                }
                return Ok(());
            }
            Some(handle) => self.contexts.get(handle).ok_or(Error::InvalidContext)?,
        };
        let native_context = context.native_context();

        if drawable == NONE {
            self.native
                .set_current_context(Some(native_context))
                .map_err(|err| Error::MakeCurrentFailed(self.report("making current", err)))?;
            self.native
                .clear_drawable(native_context)
                .map_err(|err| Error::ClearDrawableFailed(self.report("clearing", err)))?;
            return Ok(());
        }

        let attached = context.drawable();
        let (target, same) = match attached {
            Some(attached) if attached.id() == drawable => (attached, true),
            _ => {
                let target = self.drawables.acquire(
                    display,
                    &self.native,
                    &self.pbuffers,
                    &self.pixmaps,
                    context.screen(),
                    drawable,
                )?;
                (target, false)
            }
        };

        if let Err(err) = self.native.set_current_context(Some(native_context)) {
            let err = self.report("making current", err);
            if !same {
                self.release_drawable(display, &target);
            }
            return Err(Error::MakeCurrentFailed(err));
        }

        if !same {
            let previous = context.lock().drawable.replace(target.clone());
            if let Some(previous) = previous {
                self.release_drawable(display, &previous);
            }
        }

        context.lock().is_current = true;

        match target.kind() {
            DrawableKind::Pbuffer => {
                self.pbuffers
                    .with_buffer(drawable, |pbuffer| {
                        self.native.set_pbuffer(native_context, pbuffer, 0, 0, 0)
                    })
                    .ok_or(Error::PbufferNotFound)?
                    .map_err(|err| Error::PbufferBindFailed(self.report("set_pbuffer", err)))?;
                self.ensure_still_attached(&context, &target, Error::PbufferNotFound)?;
            }
            DrawableKind::Surface => {
                let surface_id = target.surface_id().ok_or(Error::SurfaceLost)?;
                self.native
                    .attach_surface(native_context, surface_id)
                    .map_err(Error::SurfaceAttachFailed)?;
                let first = !context.lock().made_current;
                if first {
                    // The viewport and scissor start out as the surface size, once.
                    if let Ok(geometry) = display.get_geometry(drawable) {
                        self.native.set_viewport_and_scissor(geometry.size);
                    }
                    context.lock().made_current = true;
                }
            }
            DrawableKind::Pixmap => {
                self.native
                    .clear_drawable(native_context)
                    .map_err(|err| Error::ClearDrawableFailed(self.report("clearing", err)))?;
                // The memory stays mapped while the pixmap table is locked.
                self.pixmaps
                    .with_off_screen_target(drawable, |off_screen| unsafe {
                        self.native.set_off_screen(native_context, off_screen)
                    })
                    .ok_or(Error::PixmapNotFound)?
                    .map_err(|err| Error::OffScreenFailed(self.report("set_off_screen", err)))?;
                self.ensure_still_attached(&context, &target, Error::PixmapNotFound)?;
            }
        }

        context.lock().thread_id = thread::current().id();
        debug!("Made {:?} current on {:#x}", context.handle(), drawable);
        Ok(())
    }

    // A destroy on another thread can detach the drawable while it is being bound. Its binding
    // must not outlive the detach, since the memory or buffer behind it goes away next.
    fn ensure_still_attached(
        &self,
        context: &Context<N>,
        target: &Arc<Drawable>,
        lost: Error,
    ) -> Result<(), Error> {
        let attached = context
            .drawable()
            .map_or(false, |attached| Arc::ptr_eq(&attached, target));
        if attached {
            return Ok(());
        }
        debug!("Drawable {:#x} was destroyed while being bound", target.id());
        if let Err(err) = self.native.clear_drawable(context.native_context()) {
            self.report("clearing a destroyed drawable", err);
        }
        Err(lost)
    }

    /// True if `handle` is attached to `drawable`.
    pub fn is_current_drawable(&self, handle: ContextHandle, drawable: Xid) -> bool {
        self.contexts
            .get(handle)
            .and_then(|context| context.drawable())
            .map_or(false, |attached| attached.id() == drawable)
    }

    /// Copies the state groups in `mask` from `source` to `destination`.
    ///
    /// `current` is the calling thread's current context.
    pub fn copy_context(
        &self,
        current: Option<ContextHandle>,
        source: ContextHandle,
        destination: ContextHandle,
        mask: CopyMask,
    ) -> Result<(), GlxError> {
        let src = self
            .contexts
            .get(source)
            .ok_or(GlxError::glx(GlxErrorCode::BadContext))?;
        let dest = self
            .contexts
            .get(destination)
            .ok_or(GlxError::glx(GlxErrorCode::BadContext))?;

        if src.screen() != dest.screen() {
            return Err(GlxError::x11(GlxErrorCode::BadMatch));
        }
        if current == Some(destination) || dest.is_current() {
            return Err(GlxError::x11(GlxErrorCode::BadAccess));
        }

        if current == Some(source) {
            self.native.flush();
        }

        self.native
            .copy_context(src.native_context(), dest.native_context(), mask.bits())
            .map_err(|err| {
                let err = self.report("copying context state", err);
                Error::CopyContextFailed(err).to_glx_error()
            })
    }

    /// Presents the back buffer of the drawable `handle` is rendering to.
    pub fn swap_buffers(&self, handle: ContextHandle) -> Result<(), Error> {
        let context = self.contexts.get(handle).ok_or(Error::InvalidContext)?;
        self.native.flush();
        self.native
            .flush_drawable(context.native_context())
            .map_err(|err| Error::FlushFailed(self.report("flushing the drawable", err)))
    }

    /// Swaps `drawable`, which must be the drawable of the calling thread's current context.
    pub fn swap_drawable_buffers(
        &self,
        current: Option<ContextHandle>,
        drawable: Xid,
    ) -> Result<(), GlxError> {
        let current = current.ok_or(GlxError::glx(GlxErrorCode::BadCurrentWindow))?;
        if !self.is_current_drawable(current, drawable) {
            return Err(GlxError::glx(GlxErrorCode::BadCurrentWindow));
        }
        self.swap_buffers(current).map_err(Error::to_glx_error)
    }

    /// Creates an unreferenced entry for `drawable`.
    pub fn create_drawable<D: Display>(
        &self,
        display: &D,
        screen: i32,
        drawable: Xid,
    ) -> Result<Arc<Drawable>, Error> {
        self.drawables.create(
            display,
            &self.native,
            &self.pbuffers,
            &self.pixmaps,
            screen,
            drawable,
        )
    }

    /// Destroys the entry for `drawable` unless it is referenced.
    ///
    /// Returns false if the entry is referenced or doesn't exist.
    pub fn destroy_drawable<D: Display>(&self, display: &D, drawable: Xid) -> bool {
        let entry = match self.drawables.find(drawable) {
            Some(entry) => entry,
            None => return false,
        };
        if !self.drawables.destroy(&self.native, &entry) {
            return false;
        }
        if entry.is_surface() {
            display.destroy_surface(entry.screen(), entry.id());
        }
        true
    }

    /// Reclaims unreferenced drawables the server has destroyed behind our back.
    pub fn garbage_collect<D: Display>(&self, display: &D) -> usize {
        self.drawables.garbage_collect(display, &self.native)
    }

    /// Handles a surface notification from the server.
    pub fn surface_notify(&self, uid: u32, kind: SurfaceNotifyKind) {
        let (context, drawable) = match self.contexts.find_by_surface_uid(uid) {
            Some(found) => found,
            None => {
                debug!("Ignoring {:?} for unknown surface uid {}", kind, uid);
                return;
            }
        };

        match kind {
            SurfaceNotifyKind::Destroyed => {
                if let Err(err) = self.native.clear_drawable(context.native_context()) {
                    self.report("clearing a destroyed surface", err);
                }
                if let Some(surface_id) = drawable.take_surface_id() {
                    if let Err(err) = self.native.destroy_surface(surface_id) {
                        warn!("destroying surface {:?} failed: {}", surface_id, err.0);
                    }
                }
                debug!("Surface of drawable {:#x} was destroyed", drawable.id());
            }
            SurfaceNotifyKind::Changed => {
                if let Err(err) = self.native.update_surface(context.native_context()) {
                    warn!("updating surface of {:#x} failed: {}", drawable.id(), err.0);
                }
            }
        }
    }

    /// Detaches `drawable` from every context bound to it.
    pub fn destroy_drawable_in_any<D: Display>(&self, display: &D, drawable: Xid) {
        for (native_context, entry) in self.contexts.detach_drawable(drawable) {
            self.release_drawable(display, &entry);
            if let Err(err) = self.native.clear_drawable(native_context) {
                self.report("clearing a detached drawable", err);
            }
        }
    }

    /// `glXCreatePbuffer`.
    pub fn create_pbuffer<D: Display>(
        &self,
        display: &D,
        fbconfig_id: u32,
        attributes: &[i32],
    ) -> Result<Xid, GlxError> {
        let attributes = PbufferAttributes::parse(attributes).map_err(Error::to_glx_error)?;
        self.pbuffers
            .create(
                display,
                &self.native,
                display.default_screen(),
                fbconfig_id,
                attributes.size,
            )
            .map_err(Error::to_glx_error)
    }

    /// `glXDestroyPbuffer`. Returns false if `pbuffer` isn't a pbuffer.
    pub fn destroy_pbuffer<D: Display>(&self, display: &D, pbuffer: Xid) -> bool {
        if !self.pbuffers.contains(pbuffer) {
            return false;
        }
        self.destroy_drawable_in_any(display, pbuffer);
        self.drawables.destroy_id(&self.native, pbuffer);
        self.pbuffers.destroy(display, &self.native, pbuffer)
    }

    /// `glXQueryDrawable`.
    pub fn query_drawable<D: Display>(
        &self,
        display: &D,
        drawable: Xid,
        attribute: i32,
    ) -> Result<u32, GlxError> {
        let answer = self
            .pixmaps
            .query(drawable, attribute)
            .or_else(|| self.pbuffers.query(drawable, attribute));
        if let Some(value) = answer {
            return Ok(value);
        }

        // Anything the server can't answer either is a bad drawable, whatever the attribute.
        let bad_drawable = GlxError::glx(GlxErrorCode::BadDrawable);
        let geometry = display.get_geometry(drawable).map_err(|_| bad_drawable)?;
        match attribute {
            GLX_WIDTH => Ok(geometry.size.width),
            GLX_HEIGHT => Ok(geometry.size.height),
            _ => Err(bad_drawable),
        }
    }

    /// `glXSelectEvent`.
    pub fn select_event<D: Display>(
        &self,
        display: &D,
        drawable: Xid,
        mask: EventMask,
    ) -> Result<(), GlxError> {
        if self.pbuffers.set_event_mask(drawable, mask) {
            return Ok(());
        }
        // Windows never generate pbuffer events, but selecting on one isn't an error.
        if display.window_exists(drawable) {
            return Ok(());
        }
        Err(GlxError::glx(GlxErrorCode::BadDrawable))
    }

    /// `glXGetSelectedEvent`.
    pub fn get_selected_event<D: Display>(
        &self,
        display: &D,
        drawable: Xid,
    ) -> Result<EventMask, GlxError> {
        if let Some(mask) = self.pbuffers.event_mask(drawable) {
            return Ok(mask);
        }
        if display.window_exists(drawable) {
            return Ok(EventMask::empty());
        }
        Err(GlxError::glx(GlxErrorCode::BadDrawable))
    }

    /// `glXCreateGLXPixmap`: makes the X pixmap `pixmap` renderable.
    pub fn create_pixmap<D: Display>(
        &self,
        display: &D,
        screen: i32,
        pixmap: Xid,
        fbconfig_id: u32,
    ) -> Result<Xid, GlxError> {
        self.pixmaps
            .create(display, screen, pixmap, fbconfig_id)
            .map_err(Error::to_glx_error)?;
        Ok(pixmap)
    }

    /// `glXDestroyGLXPixmap`.
    pub fn destroy_pixmap<D: Display>(&self, display: &D, pixmap: Xid) -> Result<(), GlxError> {
        if !self.pixmaps.contains(pixmap) {
            return Err(Error::PixmapNotFound.to_glx_error());
        }
        self.destroy_drawable_in_any(display, pixmap);
        self.drawables.destroy_id(&self.native, pixmap);
        if !self.pixmaps.destroy(display, pixmap) {
            return Err(Error::PixmapNotFound.to_glx_error());
        }
        Ok(())
    }

    #[inline]
    pub fn is_pixmap(&self, drawable: Xid) -> bool {
        self.pixmaps.contains(drawable)
    }
}
