// cglx/src/platform/macos/mod.rs
//
//! The CGL backend.

use crate::{Config, Glx};

use lazy_static::lazy_static;

mod ffi;
mod loader;

mod native;
pub use self::native::{Cgl, CglContext, CglPbuffer, CglPixelFormat};

lazy_static! {
    /// The process-wide registries, configured from the environment on first use.
    pub static ref DEFAULT: Glx<Cgl> = Glx::new(Cgl::load(), Config::from_env());
}
