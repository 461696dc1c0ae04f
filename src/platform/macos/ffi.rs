// cglx/src/platform/macos/ffi.rs
//
//! Entry points resolved from the OpenGL framework and Xplugin.

#![allow(non_camel_case_types)]

use super::loader::{Library, OPENGL_FRAMEWORK, XPLUGIN_PATH};

use cgl::{CGLContextObj, CGLError, CGLPixelFormatAttribute, CGLPixelFormatObj};
use std::os::raw::{c_char, c_int, c_uint, c_void};

pub(crate) type GLint = c_int;
pub(crate) type GLsizei = c_int;
pub(crate) type GLenum = c_uint;
pub(crate) type GLbitfield = c_uint;

#[repr(C)]
pub(crate) struct _CGLPBufferObject {
    _private: [u8; 0],
}
pub(crate) type CGLPBufferObj = *mut _CGLPBufferObject;

pub(crate) type xp_error = c_int;
pub(crate) type xp_client_id = c_uint;
pub(crate) type xp_surface_id = c_uint;

pub(crate) const XP_SUCCESS: xp_error = 0;
pub(crate) const XP_IN_BACKGROUND: c_uint = 1 << 0;

pub(crate) struct CglFunctions {
    pub(crate) choose_pixel_format: unsafe extern "C" fn(
        *const CGLPixelFormatAttribute,
        *mut CGLPixelFormatObj,
        *mut GLint,
    ) -> CGLError,
    pub(crate) destroy_pixel_format: unsafe extern "C" fn(CGLPixelFormatObj) -> CGLError,
    pub(crate) create_context:
        unsafe extern "C" fn(CGLPixelFormatObj, CGLContextObj, *mut CGLContextObj) -> CGLError,
    pub(crate) destroy_context: unsafe extern "C" fn(CGLContextObj) -> CGLError,
    pub(crate) set_current_context: unsafe extern "C" fn(CGLContextObj) -> CGLError,
    pub(crate) get_current_context: unsafe extern "C" fn() -> CGLContextObj,
    pub(crate) clear_drawable: unsafe extern "C" fn(CGLContextObj) -> CGLError,
    pub(crate) flush_drawable: unsafe extern "C" fn(CGLContextObj) -> CGLError,
    pub(crate) set_off_screen:
        unsafe extern "C" fn(CGLContextObj, GLsizei, GLsizei, GLint, *mut c_void) -> CGLError,
    pub(crate) copy_context:
        unsafe extern "C" fn(CGLContextObj, CGLContextObj, GLbitfield) -> CGLError,
    pub(crate) error_string: unsafe extern "C" fn(CGLError) -> *const c_char,
    pub(crate) create_pbuffer: unsafe extern "C" fn(
        GLsizei,
        GLsizei,
        GLenum,
        GLenum,
        GLint,
        *mut CGLPBufferObj,
    ) -> CGLError,
    pub(crate) destroy_pbuffer: unsafe extern "C" fn(CGLPBufferObj) -> CGLError,
    pub(crate) set_pbuffer:
        unsafe extern "C" fn(CGLContextObj, CGLPBufferObj, GLenum, GLint, GLint) -> CGLError,
}

impl CglFunctions {
    pub(crate) fn load() -> CglFunctions {
        let library: &Library = &OPENGL_FRAMEWORK;
        unsafe {
            CglFunctions {
                choose_pixel_format: library.function("CGLChoosePixelFormat"),
                destroy_pixel_format: library.function("CGLDestroyPixelFormat"),
                create_context: library.function("CGLCreateContext"),
                destroy_context: library.function("CGLDestroyContext"),
                set_current_context: library.function("CGLSetCurrentContext"),
                get_current_context: library.function("CGLGetCurrentContext"),
                clear_drawable: library.function("CGLClearDrawable"),
                flush_drawable: library.function("CGLFlushDrawable"),
                set_off_screen: library.function("CGLSetOffScreen"),
                copy_context: library.function("CGLCopyContext"),
                error_string: library.function("CGLErrorString"),
                create_pbuffer: library.function("CGLCreatePBuffer"),
                destroy_pbuffer: library.function("CGLDestroyPBuffer"),
                set_pbuffer: library.function("CGLSetPBuffer"),
            }
        }
    }
}

pub(crate) struct XpFunctions {
    pub(crate) init: unsafe extern "C" fn(c_uint) -> xp_error,
    pub(crate) get_client_id: unsafe extern "C" fn(*mut xp_client_id) -> xp_error,
    pub(crate) import_surface:
        unsafe extern "C" fn(*const c_uint, *mut xp_surface_id) -> xp_error,
    pub(crate) destroy_surface: unsafe extern "C" fn(xp_surface_id) -> xp_error,
    pub(crate) attach_gl_context: unsafe extern "C" fn(*mut c_void, xp_surface_id) -> xp_error,
    pub(crate) update_gl_context: unsafe extern "C" fn(*mut c_void) -> xp_error,
}

impl XpFunctions {
    pub(crate) fn load() -> XpFunctions {
        let library = Library::open(XPLUGIN_PATH);
        unsafe {
            XpFunctions {
                init: library.function("xp_init"),
                get_client_id: library.function("xp_get_client_id"),
                import_surface: library.function("xp_import_surface"),
                destroy_surface: library.function("xp_destroy_surface"),
                attach_gl_context: library.function("xp_attach_gl_context"),
                update_gl_context: library.function("xp_update_gl_context"),
            }
        }
    }
}
