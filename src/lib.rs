// cglx/src/lib.rs
//
//! Maps GLX drawables and contexts onto CGL contexts and window server surfaces.
//!
//! A GLX client on macOS renders through CGL, not through the X server. This crate keeps the
//! bookkeeping that makes that work: a reference-counted table of drawables, each bound to a
//! native surface, pbuffer, or shared-memory pixmap; a registry of contexts and the drawable
//! each is attached to; and a garbage collector that reclaims drawables the X server destroyed
//! without telling us.
//!
//! Everything goes through a `Glx` value, generic over the native API. `platform::headless`
//! provides an in-process implementation; `platform::macos` talks to CGL and Xplugin.

#[macro_use]
mod macros;

mod attrib;
pub use crate::attrib::{GLX_EVENT_MASK, GLX_FBCONFIG_ID, GLX_HEIGHT, GLX_LARGEST_PBUFFER};
pub use crate::attrib::{GLX_PBUFFER_HEIGHT, GLX_PBUFFER_WIDTH, GLX_PRESERVED_CONTENTS, GLX_WIDTH};

pub mod config;
pub use crate::config::Config;

mod context;
pub use crate::context::{Context, ContextHandle, ContextRegistry};

mod drawable;
pub use crate::drawable::{Drawable, DrawableKind, DrawableTable};

pub mod error;
pub use crate::error::{Error, GlxError, GlxErrorCode, WindowingApiError};

mod gc;

mod glx;
pub use crate::glx::{CopyMask, Glx};

mod pbuffer;
pub use crate::pbuffer::{EventMask, PbufferAttributes, PbufferTable};

mod pixmap;
pub use crate::pixmap::PixmapTable;

pub mod platform;

mod shm;

mod visual;
pub use crate::visual::{ModeFlags, PixelFormatAttribute, PixelFormatDescriptor};

#[cfg(test)]
mod tests;
