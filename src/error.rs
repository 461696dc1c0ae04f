// cglx/src/error.rs
//
//! Various errors that methods can produce.

use crate::platform::{CglError, XpError};

use std::error;
use std::fmt::{self, Display, Formatter};

/// Various errors that methods can produce.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Error {
    /// The method failed for a miscellaneous reason.
    Failed,
    /// Memory or a native object couldn't be allocated.
    AllocationFailed,
    /// Choosing a CGL pixel format failed.
    PixelFormatSelectionFailed(WindowingApiError),
    /// The system couldn't choose a pixel format matching the descriptor.
    NoPixelFormatFound,
    /// The system couldn't create a CGL context.
    ContextCreationFailed(WindowingApiError),
    /// The system couldn't make the CGL context current or not current.
    MakeCurrentFailed(WindowingApiError),
    /// The display server refused to create a surface for the drawable.
    SurfaceCreationFailed,
    /// The window server surface couldn't be imported into this process.
    SurfaceImportFailed(XpError),
    /// The window server surface couldn't be attached to the context.
    SurfaceAttachFailed(XpError),
    /// The system couldn't create a pbuffer.
    PbufferCreationFailed(WindowingApiError),
    /// The drawable is a pbuffer, but its native buffer object couldn't be found.
    PbufferNotFound,
    /// The pbuffer couldn't be bound to the context.
    PbufferBindFailed(WindowingApiError),
    /// The pixmap memory couldn't be installed as an off-screen target.
    OffScreenFailed(WindowingApiError),
    /// The native drawable binding couldn't be cleared.
    ClearDrawableFailed(WindowingApiError),
    /// The display server couldn't export or map memory for a pixmap.
    PixmapCreationFailed,
    /// The pixmap isn't known.
    PixmapNotFound,
    /// The context handle doesn't name a live context.
    InvalidContext,
    /// Another thread registered a drawable with this identifier first.
    DrawableExists,
    /// An attribute in an attribute list isn't recognized.
    BadAttribute(i32),
    /// The window server didn't hand out a client ID.
    NoClientId,
    /// Copying state between two contexts failed.
    CopyContextFailed(WindowingApiError),
    /// The window server destroyed the drawable's surface.
    SurfaceLost,
    /// Flushing the drawable to the screen failed.
    FlushFailed(WindowingApiError),
}

/// Abstraction of the errors that CGL returns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WindowingApiError {
    /// Miscellaneous error.
    Failed,
    /// CGL: Invalid pixel format attribute.
    BadAttribute,
    /// CGL: Invalid renderer property.
    BadProperty,
    /// CGL: Invalid pixel format object.
    BadPixelFormat,
    /// CGL: Invalid renderer information object.
    BadRendererInfo,
    /// CGL: Invalid context object.
    BadContext,
    /// Invalid drawable.
    BadDrawable,
    /// CGL: Invalid display.
    BadDisplay,
    /// CGL: Invalid context state.
    BadState,
    /// CGL: Invalid numerical value.
    BadValue,
    /// CGL: Invalid share context.
    BadMatch,
    /// CGL: Invalid enumerant (constant).
    BadEnumeration,
    /// CGL: Invalid off-screen drawable.
    BadOffScreen,
    /// CGL: Invalid full-screen drawable.
    BadFullScreen,
    /// CGL: Invalid window.
    BadWindow,
    /// CGL: Invalid address; e.g. null pointer passed to function requiring
    /// a non-null pointer argument.
    BadAddress,
    /// CGL: Invalid code module.
    BadCodeModule,
    /// CGL: Invalid memory allocation; i.e. CGL couldn't allocate memory.
    BadAlloc,
    /// CGL: Invalid Core Graphics connection.
    BadConnection,
}

pub(crate) trait ToWindowingApiError {
    fn to_windowing_api_error(self) -> WindowingApiError;
}

impl ToWindowingApiError for CglError {
    fn to_windowing_api_error(self) -> WindowingApiError {
        match self.0 {
            10000 => WindowingApiError::BadAttribute,
            10001 => WindowingApiError::BadProperty,
            10002 => WindowingApiError::BadPixelFormat,
            10003 => WindowingApiError::BadRendererInfo,
            10004 => WindowingApiError::BadContext,
            10005 => WindowingApiError::BadDrawable,
            10006 => WindowingApiError::BadDisplay,
            10007 => WindowingApiError::BadState,
            10008 => WindowingApiError::BadValue,
            10009 => WindowingApiError::BadMatch,
            10010 => WindowingApiError::BadEnumeration,
            10011 => WindowingApiError::BadOffScreen,
            10012 => WindowingApiError::BadFullScreen,
            10013 => WindowingApiError::BadWindow,
            10014 => WindowingApiError::BadAddress,
            10015 => WindowingApiError::BadCodeModule,
            10016 => WindowingApiError::BadAlloc,
            10017 => WindowingApiError::BadConnection,
            _ => WindowingApiError::Failed,
        }
    }
}

/// Error codes reported back through the GLX protocol.
///
/// The X11 core codes (`BadMatch`, `BadAccess`, ...) carry their X11 numbers; the GLX codes are
/// offsets from the extension's error base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlxErrorCode {
    /// X11 `BadValue`.
    BadValue,
    /// X11 `BadMatch`.
    BadMatch,
    /// X11 `BadAccess`.
    BadAccess,
    /// X11 `BadAlloc`.
    BadAlloc,
    /// `GLXBadContext`.
    BadContext,
    /// `GLXBadDrawable`.
    BadDrawable,
    /// `GLXBadPixmap`.
    BadPixmap,
    /// `GLXBadCurrentWindow`.
    BadCurrentWindow,
    /// `GLXBadPbuffer`.
    BadPbuffer,
}

impl GlxErrorCode {
    /// The numeric code on the wire.
    pub fn code(self) -> u8 {
        match self {
            GlxErrorCode::BadValue => 2,
            GlxErrorCode::BadMatch => 8,
            GlxErrorCode::BadAccess => 10,
            GlxErrorCode::BadAlloc => 11,
            GlxErrorCode::BadContext => 0,
            GlxErrorCode::BadDrawable => 2,
            GlxErrorCode::BadPixmap => 3,
            GlxErrorCode::BadCurrentWindow => 5,
            GlxErrorCode::BadPbuffer => 10,
        }
    }
}

/// An error destined for the protocol layer.
///
/// `x11` is true when the code is a core X11 error that must be reported as a windowing-protocol
/// error, and false for a GLX extension error generated on the client side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlxError {
    /// The error code.
    pub code: GlxErrorCode,
    /// Whether this is a core X11 error.
    pub x11: bool,
}

impl GlxError {
    #[inline]
    pub(crate) fn x11(code: GlxErrorCode) -> GlxError {
        GlxError { code, x11: true }
    }

    #[inline]
    pub(crate) fn glx(code: GlxErrorCode) -> GlxError {
        GlxError { code, x11: false }
    }
}

impl Error {
    /// Maps this error onto the code the protocol layer should report.
    pub fn to_glx_error(self) -> GlxError {
        match self {
            Error::AllocationFailed => GlxError::x11(GlxErrorCode::BadAlloc),
            Error::PixelFormatSelectionFailed(_) | Error::NoPixelFormatFound => {
                GlxError::x11(GlxErrorCode::BadMatch)
            }
            Error::ContextCreationFailed(WindowingApiError::BadMatch) => {
                GlxError::x11(GlxErrorCode::BadMatch)
            }
            Error::BadAttribute(_) => GlxError::x11(GlxErrorCode::BadValue),
            Error::PixmapNotFound => GlxError::glx(GlxErrorCode::BadPixmap),
            Error::PbufferNotFound => GlxError::glx(GlxErrorCode::BadPbuffer),
            Error::SurfaceCreationFailed
            | Error::SurfaceImportFailed(_)
            | Error::SurfaceAttachFailed(_)
            | Error::SurfaceLost
            | Error::DrawableExists => GlxError::glx(GlxErrorCode::BadDrawable),
            Error::PbufferCreationFailed(_) | Error::PixmapCreationFailed => {
                GlxError::x11(GlxErrorCode::BadAlloc)
            }
            _ => GlxError::glx(GlxErrorCode::BadContext),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Error::BadAttribute(attribute) => write!(f, "bad attribute {:#x}", attribute),
            Error::SurfaceImportFailed(err) => write!(f, "surface import failed: {}", err.0),
            Error::SurfaceAttachFailed(err) => write!(f, "surface attach failed: {}", err.0),
            ref other => write!(f, "{:?}", other),
        }
    }
}

impl error::Error for Error {}
