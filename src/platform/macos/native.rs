// cglx/src/platform/macos/native.rs
//
//! CGL and Xplugin behind the `Native` trait.

use super::ffi::{CGLPBufferObj, CglFunctions, XpFunctions, XP_IN_BACKGROUND, XP_SUCCESS};
use super::loader::OPENGL_FRAMEWORK;
use crate::platform::{CglError, ClientId, Native, OffScreenTarget, PbufferFormat, SurfaceId};
use crate::platform::{SurfaceKey, XpError};
use crate::visual::PixelFormatAttribute;

use cgl::{kCGLPFAAlphaSize, kCGLPFAColorSize, kCGLPFADepthSize, kCGLPFADoubleBuffer};
use cgl::{kCGLPFASampleBuffers, kCGLPFASamples, kCGLPFAStencilSize, kCGLPFAStereo};
use cgl::{CGLContextObj, CGLError, CGLPixelFormatAttribute, CGLPixelFormatObj};
use euclid::default::Size2D;
use glow::HasContext;
use lazy_static::lazy_static;
use log::debug;
use std::ffi::CStr;
use std::os::raw::c_void;
use std::ptr;
use std::sync::Mutex;

// Deprecated attributes the cgl crate doesn't export.
#[allow(non_upper_case_globals)]
const kCGLPFAAccumSize: CGLPixelFormatAttribute = 14;
#[allow(non_upper_case_globals)]
const kCGLPFAOffScreen: CGLPixelFormatAttribute = 53;

lazy_static! {
    // CGLChoosePixelFormat fails with kCGLBadConnection if several threads open a window
    // server connection at once.
    static ref CHOOSE_PIXEL_FORMAT_MUTEX: Mutex<()> = Mutex::new(());
}

thread_local! {
    // Only touched with a context current, which is when loading needs one.
    static GL: glow::Context = unsafe {
        glow::Context::from_loader_function(|name| OPENGL_FRAMEWORK.lookup(name))
    };
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CglPixelFormat(CGLPixelFormatObj);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CglContext(CGLContextObj);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CglPbuffer(CGLPBufferObj);

// CGL objects may be used from any thread; CGL serializes access per context.
unsafe impl Send for CglPixelFormat {}
unsafe impl Sync for CglPixelFormat {}
unsafe impl Send for CglContext {}
unsafe impl Sync for CglContext {}
unsafe impl Send for CglPbuffer {}
unsafe impl Sync for CglPbuffer {}

/// The real native API.
pub struct Cgl {
    cgl: CglFunctions,
    xp: XpFunctions,
    client_id: Mutex<Option<ClientId>>,
}

#[inline]
fn check(err: CGLError) -> Result<(), CglError> {
    if err == 0 {
        Ok(())
    } else {
        Err(CglError(err as i32))
    }
}

#[inline]
fn check_xp(err: i32) -> Result<(), XpError> {
    if err == XP_SUCCESS {
        Ok(())
    } else {
        Err(XpError(err))
    }
}

fn to_cgl_attributes(attributes: &[PixelFormatAttribute]) -> Vec<CGLPixelFormatAttribute> {
    let mut list = vec![];
    for attribute in attributes {
        match *attribute {
            PixelFormatAttribute::Stereo => list.push(kCGLPFAStereo),
            PixelFormatAttribute::DoubleBuffer => list.push(kCGLPFADoubleBuffer),
            PixelFormatAttribute::OffScreen => list.push(kCGLPFAOffScreen),
            PixelFormatAttribute::ColorSize(bits) => {
                list.extend_from_slice(&[kCGLPFAColorSize, bits as CGLPixelFormatAttribute])
            }
            PixelFormatAttribute::AlphaSize(bits) => {
                list.extend_from_slice(&[kCGLPFAAlphaSize, bits as CGLPixelFormatAttribute])
            }
            PixelFormatAttribute::AccumSize(bits) => {
                list.extend_from_slice(&[kCGLPFAAccumSize, bits as CGLPixelFormatAttribute])
            }
            PixelFormatAttribute::DepthSize(bits) => {
                list.extend_from_slice(&[kCGLPFADepthSize, bits as CGLPixelFormatAttribute])
            }
            PixelFormatAttribute::StencilSize(bits) => {
                list.extend_from_slice(&[kCGLPFAStencilSize, bits as CGLPixelFormatAttribute])
            }
            PixelFormatAttribute::SampleBuffers(count) => {
                list.extend_from_slice(&[kCGLPFASampleBuffers, count as CGLPixelFormatAttribute])
            }
            PixelFormatAttribute::Samples(count) => {
                list.extend_from_slice(&[kCGLPFASamples, count as CGLPixelFormatAttribute])
            }
        }
    }
    list.push(0);
    list
}

impl Cgl {
    /// Opens the OpenGL framework and Xplugin and resolves every entry point.
    pub fn load() -> Cgl {
        Cgl {
            cgl: CglFunctions::load(),
            xp: XpFunctions::load(),
            client_id: Mutex::new(None),
        }
    }
}

impl Native for Cgl {
    type PixelFormat = CglPixelFormat;
    type Context = CglContext;
    type PBuffer = CglPbuffer;

    fn choose_pixel_format(
        &self,
        attributes: &[PixelFormatAttribute],
    ) -> Result<Option<CglPixelFormat>, CglError> {
        let attributes = to_cgl_attributes(attributes);
        let _guard = CHOOSE_PIXEL_FORMAT_MUTEX
            .lock()
            .unwrap_or_else(|_| fatal!("pixel format lock poisoned"));
        unsafe {
            let mut pixel_format = ptr::null_mut();
            let mut pixel_format_count = 0;
            check((self.cgl.choose_pixel_format)(
                attributes.as_ptr(),
                &mut pixel_format,
                &mut pixel_format_count,
            ))?;
            if pixel_format.is_null() || pixel_format_count == 0 {
                return Ok(None);
            }
            Ok(Some(CglPixelFormat(pixel_format)))
        }
    }

    fn destroy_pixel_format(&self, pixel_format: CglPixelFormat) -> Result<(), CglError> {
        unsafe { check((self.cgl.destroy_pixel_format)(pixel_format.0)) }
    }

    fn create_context(
        &self,
        pixel_format: CglPixelFormat,
        share_with: Option<CglContext>,
    ) -> Result<CglContext, CglError> {
        let share_with = share_with.map_or(ptr::null_mut(), |context| context.0);
        unsafe {
            let mut context = ptr::null_mut();
            check((self.cgl.create_context)(pixel_format.0, share_with, &mut context))?;
            debug_assert!(!context.is_null());
            Ok(CglContext(context))
        }
    }

    fn destroy_context(&self, context: CglContext) -> Result<(), CglError> {
        unsafe { check((self.cgl.destroy_context)(context.0)) }
    }

    fn set_current_context(&self, context: Option<CglContext>) -> Result<(), CglError> {
        let context = context.map_or(ptr::null_mut(), |context| context.0);
        unsafe { check((self.cgl.set_current_context)(context)) }
    }

    fn current_context(&self) -> Option<CglContext> {
        let context = unsafe { (self.cgl.get_current_context)() };
        if context.is_null() {
            None
        } else {
            Some(CglContext(context))
        }
    }

    fn clear_drawable(&self, context: CglContext) -> Result<(), CglError> {
        unsafe { check((self.cgl.clear_drawable)(context.0)) }
    }

    fn flush_drawable(&self, context: CglContext) -> Result<(), CglError> {
        unsafe { check((self.cgl.flush_drawable)(context.0)) }
    }

    unsafe fn set_off_screen(
        &self,
        context: CglContext,
        target: &OffScreenTarget,
    ) -> Result<(), CglError> {
        check((self.cgl.set_off_screen)(
            context.0,
            target.size.width,
            target.size.height,
            target.row_bytes,
            target.base,
        ))
    }

    fn create_pbuffer(
        &self,
        size: Size2D<i32>,
        format: PbufferFormat,
    ) -> Result<CglPbuffer, CglError> {
        unsafe {
            let mut pbuffer = ptr::null_mut();
            check((self.cgl.create_pbuffer)(
                size.width,
                size.height,
                format.target,
                format.internal_format,
                format.max_level,
                &mut pbuffer,
            ))?;
            Ok(CglPbuffer(pbuffer))
        }
    }

    fn destroy_pbuffer(&self, pbuffer: CglPbuffer) -> Result<(), CglError> {
        unsafe { check((self.cgl.destroy_pbuffer)(pbuffer.0)) }
    }

    fn set_pbuffer(
        &self,
        context: CglContext,
        pbuffer: CglPbuffer,
        face: u32,
        level: i32,
        screen: i32,
    ) -> Result<(), CglError> {
        unsafe { check((self.cgl.set_pbuffer)(context.0, pbuffer.0, face, level, screen)) }
    }

    fn copy_context(
        &self,
        source: CglContext,
        destination: CglContext,
        mask: u32,
    ) -> Result<(), CglError> {
        unsafe { check((self.cgl.copy_context)(source.0, destination.0, mask)) }
    }

    fn error_string(&self, error: CglError) -> String {
        unsafe {
            let string = (self.cgl.error_string)(error.0 as CGLError);
            if string.is_null() {
                return format!("CGL error {}", error.0);
            }
            CStr::from_ptr(string).to_string_lossy().into_owned()
        }
    }

    fn client_id(&self) -> Option<ClientId> {
        let mut client_id = self
            .client_id
            .lock()
            .unwrap_or_else(|_| fatal!("client ID lock poisoned"));
        if client_id.is_none() {
            unsafe {
                let mut id = 0;
                if (self.xp.init)(XP_IN_BACKGROUND) == XP_SUCCESS
                    && (self.xp.get_client_id)(&mut id) == XP_SUCCESS
                {
                    debug!("Connected to the window server as client {}", id);
                    *client_id = Some(ClientId(id));
                }
            }
        }
        *client_id
    }

    fn import_surface(&self, key: SurfaceKey) -> Result<SurfaceId, XpError> {
        unsafe {
            let mut surface_id = 0;
            check_xp((self.xp.import_surface)(key.0.as_ptr(), &mut surface_id))?;
            Ok(SurfaceId(surface_id))
        }
    }

    fn destroy_surface(&self, surface: SurfaceId) -> Result<(), XpError> {
        unsafe { check_xp((self.xp.destroy_surface)(surface.0)) }
    }

    fn attach_surface(&self, context: CglContext, surface: SurfaceId) -> Result<(), XpError> {
        unsafe { check_xp((self.xp.attach_gl_context)(context.0 as *mut c_void, surface.0)) }
    }

    fn update_surface(&self, context: CglContext) -> Result<(), XpError> {
        unsafe { check_xp((self.xp.update_gl_context)(context.0 as *mut c_void)) }
    }

    fn flush(&self) {
        GL.with(|gl| unsafe { gl.flush() })
    }

    fn set_viewport_and_scissor(&self, size: Size2D<u32>) {
        let (width, height) = (size.width as i32, size.height as i32);
        GL.with(|gl| unsafe {
            gl.viewport(0, 0, width, height);
            gl.scissor(0, 0, width, height);
        })
    }
}
