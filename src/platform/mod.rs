// cglx/src/platform/mod.rs
//
//! The native graphics API and display server seen from the registry.
//!
//! `Native` covers everything that happens in-process: CGL pixel formats, contexts and pbuffers,
//! plus the window server surfaces that CGL contexts attach to. `Display` covers the display
//! server connection that owns the protocol-level identifiers. Every native call reports a
//! status code where zero means success; the traits surface those as `Result`s.

use crate::shm::SharedBuffer;
use crate::visual::PixelFormatAttribute;

use euclid::default::Size2D;
use std::fmt::Debug;
use std::os::raw::c_void;

pub mod headless;

#[cfg(macos)]
pub mod macos;

/// A protocol-level resource identifier.
pub type Xid = u32;

/// The "no resource" identifier.
pub const NONE: Xid = 0;

/// A nonzero CGL error code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CglError(pub i32);

/// A nonzero window server (Xplugin) error code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XpError(pub i32);

/// An X11 error observed while an error trap was installed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XErrorCode {
    BadWindow,
    BadPixmap,
    BadDrawable,
    BadMatch,
    Other(u8),
}

impl XErrorCode {
    /// True if the error means the identifier no longer names a live resource.
    #[inline]
    pub fn is_stale_resource(self) -> bool {
        matches!(
            self,
            XErrorCode::BadWindow | XErrorCode::BadPixmap | XErrorCode::BadDrawable
        )
    }
}

/// A window server surface imported into this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

/// This process's window server client ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientId(pub u32);

/// The key the display server hands out for a surface, redeemable with `Native::import_surface`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceKey(pub [u32; 2]);

/// What the display server returns when it creates a surface for a drawable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceGrant {
    pub key: SurfaceKey,
    /// The client-unique ID used to tag later notifications about this surface.
    pub uid: u32,
}

/// Asynchronous notifications about surfaces, delivered by the display server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceNotifyKind {
    Destroyed,
    Changed,
}

/// The result of a geometry query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub size: Size2D<u32>,
    pub depth: u32,
}

/// The shared memory the display server exported for a GLX pixmap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedPixmap {
    pub size: Size2D<i32>,
    /// Bytes per row.
    pub pitch: i32,
    /// Bytes per pixel.
    pub bpp: i32,
    /// Total length of the shared memory object.
    pub length: usize,
    /// The name of the shared memory object. `None` means the server renders in-process and
    /// the client should allocate private memory instead.
    pub path: Option<String>,
}

/// Client memory installed as the render target of a context.
#[derive(Clone, Copy, Debug)]
pub struct OffScreenTarget {
    pub size: Size2D<i32>,
    pub row_bytes: i32,
    pub bits_per_pixel: i32,
    pub base: *mut c_void,
}

/// The texture target and format a pbuffer is created with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PbufferFormat {
    pub target: u32,
    pub internal_format: u32,
    pub max_level: i32,
}

impl Default for PbufferFormat {
    fn default() -> PbufferFormat {
        PbufferFormat {
            // GL_TEXTURE_RECTANGLE_EXT
            target: 0x84F5,
            // GL_RGBA
            internal_format: 0x1908,
            max_level: 0,
        }
    }
}

/// The native graphics API.
///
/// Implementations resolve all of their entry points up front. A missing entry point is fatal
/// when the implementation is constructed, never when a method is called.
pub trait Native: Send + Sync {
    type PixelFormat: Copy + Debug + PartialEq + Send + Sync;
    type Context: Copy + Debug + PartialEq + Send + Sync;
    type PBuffer: Copy + Debug + PartialEq + Send + Sync;

    /// Returns `Ok(None)` if no pixel format matches.
    fn choose_pixel_format(
        &self,
        attributes: &[PixelFormatAttribute],
    ) -> Result<Option<Self::PixelFormat>, CglError>;
    fn destroy_pixel_format(&self, pixel_format: Self::PixelFormat) -> Result<(), CglError>;

    fn create_context(
        &self,
        pixel_format: Self::PixelFormat,
        share_with: Option<Self::Context>,
    ) -> Result<Self::Context, CglError>;
    fn destroy_context(&self, context: Self::Context) -> Result<(), CglError>;

    /// Sets the calling thread's current context.
    fn set_current_context(&self, context: Option<Self::Context>) -> Result<(), CglError>;
    /// Returns the calling thread's current context.
    fn current_context(&self) -> Option<Self::Context>;

    fn clear_drawable(&self, context: Self::Context) -> Result<(), CglError>;
    fn flush_drawable(&self, context: Self::Context) -> Result<(), CglError>;

    /// Makes client memory the render target of `context`.
    ///
    /// # Safety
    ///
    /// `target.base` must point to at least `row_bytes * height` writable bytes that stay
    /// mapped until the context's drawable is cleared or replaced.
    unsafe fn set_off_screen(
        &self,
        context: Self::Context,
        target: &OffScreenTarget,
    ) -> Result<(), CglError>;

    fn create_pbuffer(
        &self,
        size: Size2D<i32>,
        format: PbufferFormat,
    ) -> Result<Self::PBuffer, CglError>;
    fn destroy_pbuffer(&self, pbuffer: Self::PBuffer) -> Result<(), CglError>;
    fn set_pbuffer(
        &self,
        context: Self::Context,
        pbuffer: Self::PBuffer,
        face: u32,
        level: i32,
        screen: i32,
    ) -> Result<(), CglError>;

    fn copy_context(
        &self,
        source: Self::Context,
        destination: Self::Context,
        mask: u32,
    ) -> Result<(), CglError>;

    /// A human-readable description of `error`.
    fn error_string(&self, error: CglError) -> String;

    /// This process's window server client ID, connecting on first use.
    fn client_id(&self) -> Option<ClientId>;
    fn import_surface(&self, key: SurfaceKey) -> Result<SurfaceId, XpError>;
    fn destroy_surface(&self, surface: SurfaceId) -> Result<(), XpError>;
    fn attach_surface(&self, context: Self::Context, surface: SurfaceId) -> Result<(), XpError>;
    /// Resynchronizes the context with the current geometry of its surface.
    fn update_surface(&self, context: Self::Context) -> Result<(), XpError>;

    /// `glFlush` on the current context.
    fn flush(&self);
    /// `glViewport` and `glScissor` on the current context, anchored at the origin.
    fn set_viewport_and_scissor(&self, size: Size2D<u32>);
}

/// A connection to the display server.
///
/// This is the protocol side: it owns the identifiers that the registry maps onto native
/// objects. Calls that can fail on the server report through the error trap when one is
/// installed.
pub trait Display {
    fn default_screen(&self) -> i32;

    /// Asks the server to create a window server surface for `drawable`.
    fn create_surface(&self, screen: i32, drawable: Xid, client: ClientId)
        -> Option<SurfaceGrant>;
    fn destroy_surface(&self, screen: i32, drawable: Xid);

    /// Reserves an identifier by creating a pixmap the server will not recycle.
    fn create_placeholder_pixmap(&self, screen: i32, size: Size2D<u32>) -> Option<Xid>;
    fn free_pixmap(&self, pixmap: Xid);

    /// Asks the server to export the contents of `pixmap` through shared memory.
    fn create_shared_pixmap(&self, screen: i32, pixmap: Xid) -> Option<SharedPixmap>;
    fn destroy_shared_pixmap(&self, pixmap: Xid);

    /// A geometry query, legal on both windows and pixmaps.
    fn get_geometry(&self, drawable: Xid) -> Result<Geometry, XErrorCode>;
    fn window_exists(&self, window: Xid) -> bool;

    /// Round-trips to the server so that every queued error has been delivered.
    fn sync(&self);
    /// Installs an error handler that records errors instead of treating them as fatal.
    fn push_error_trap(&self);
    /// Restores the error handler that was installed before the matching `push_error_trap`.
    fn pop_error_trap(&self);
}

/// Memory backing a GLX pixmap once it has been mapped.
pub(crate) fn map_shared_pixmap(shared: &SharedPixmap) -> Result<SharedBuffer, crate::Error> {
    match shared.path {
        Some(ref path) => SharedBuffer::open(path, shared.length),
        None => SharedBuffer::anonymous(shared.length),
    }
}
