// cglx/src/platform/macos/loader.rs
//
//! Runtime symbol resolution.
//!
//! Neither framework is linked; both are opened on first use. Any symbol we need that isn't
//! there aborts the process right away instead of failing on some later call.

use lazy_static::lazy_static;
use libc::{dlerror, dlopen, dlsym, RTLD_NOW};
use log::debug;
use std::ffi::{CStr, CString};
use std::mem;
use std::os::raw::c_void;

pub(crate) static OPENGL_FRAMEWORK_PATH: &str = "/System/Library/Frameworks/OpenGL.framework/OpenGL";
pub(crate) static XPLUGIN_PATH: &str = "/usr/lib/libXplugin.1.dylib";

lazy_static! {
    pub(crate) static ref OPENGL_FRAMEWORK: Library = Library::open(OPENGL_FRAMEWORK_PATH);
}

/// A `dlopen`ed library. Never closed.
pub(crate) struct Library {
    handle: *mut c_void,
    path: &'static str,
}

unsafe impl Send for Library {}
unsafe impl Sync for Library {}

fn last_error() -> String {
    unsafe {
        let message = dlerror();
        if message.is_null() {
            "unknown error".to_owned()
        } else {
            CStr::from_ptr(message).to_string_lossy().into_owned()
        }
    }
}

impl Library {
    pub(crate) fn open(path: &'static str) -> Library {
        let c_path = match CString::new(path) {
            Ok(c_path) => c_path,
            Err(_) => fatal!("library path {:?} contains a NUL", path),
        };
        unsafe {
            // Drain any stale error.
            dlerror();
            let handle = dlopen(c_path.as_ptr(), RTLD_NOW);
            if handle.is_null() {
                fatal!("unable to dlopen {}: {}", path, last_error());
            }
            debug!("Opened {}", path);
            Library { handle, path }
        }
    }

    /// Looks `name` up, returning null if it's missing.
    pub(crate) fn lookup(&self, name: &str) -> *const c_void {
        match CString::new(name) {
            Ok(c_name) => unsafe { dlsym(self.handle, c_name.as_ptr()) as *const c_void },
            Err(_) => std::ptr::null(),
        }
    }

    /// Resolves `name` as a function pointer of type `F`, aborting if it's missing.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type matching the symbol's real signature.
    pub(crate) unsafe fn function<F: Copy>(&self, name: &str) -> F {
        debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*const c_void>());
        let symbol = self.lookup(name);
        if symbol.is_null() {
            fatal!("{} has no symbol {}: {}", self.path, name, last_error());
        }
        mem::transmute_copy(&symbol)
    }
}
