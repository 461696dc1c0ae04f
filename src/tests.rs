// cglx/src/tests.rs
//
//! Unit tests, run against the headless backend.

use crate::platform::headless::{Binding, HeadlessDisplay, HeadlessNative, NativeCall};
use crate::platform::{Native, SurfaceNotifyKind, XpError, Xid, NONE};
use crate::{Config, ContextHandle, CopyMask, DrawableKind, Error, EventMask, Glx};
use crate::{GlxError, GlxErrorCode, PixelFormatDescriptor, WindowingApiError};
use crate::{GLX_EVENT_MASK, GLX_FBCONFIG_ID, GLX_HEIGHT, GLX_LARGEST_PBUFFER};
use crate::{GLX_PBUFFER_HEIGHT, GLX_PBUFFER_WIDTH, GLX_PRESERVED_CONTENTS, GLX_WIDTH};

use euclid::default::Size2D;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

// kCGLBadContext, kCGLBadMatch
const CGL_BAD_CONTEXT: i32 = 10004;
const CGL_BAD_MATCH: i32 = 10009;

fn setup() -> (Glx<HeadlessNative>, HeadlessDisplay) {
    (Glx::new(HeadlessNative::new(), Config::default()), HeadlessDisplay::new())
}

fn create_context(glx: &Glx<HeadlessNative>) -> ContextHandle {
    glx.create_context(0, &PixelFormatDescriptor::rgba8_depth24(), None)
        .unwrap()
}

fn make_current(
    glx: &Glx<HeadlessNative>,
    display: &HeadlessDisplay,
    context: ContextHandle,
    drawable: Xid,
) {
    glx.make_current(display, Some(context), Some(context), drawable)
        .unwrap()
}

fn binding(glx: &Glx<HeadlessNative>, context: ContextHandle) -> Binding {
    let native_context = glx.context(context).unwrap().native_context();
    glx.native().binding(native_context).unwrap()
}

#[test]
fn test_reference_counting() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));

    let drawable = glx.create_drawable(&display, 0, window).unwrap();
    assert_eq!(drawable.reference_count(), 0);
    assert_eq!(drawable.kind(), DrawableKind::Surface);

    drawable.reference();
    drawable.reference();
    assert_eq!(drawable.reference_count(), 2);
    drawable.release();
    assert_eq!(drawable.reference_count(), 1);
    assert!(!glx.destroy_drawable(&display, window));
    assert!(glx.drawables().find(window).is_some());

    drawable.release();
    assert_eq!(drawable.reference_count(), 0);
    assert!(glx.destroy_drawable(&display, window));
    assert!(glx.drawables().find(window).is_none());
    assert!(!glx.drawables().contains(&drawable));
    assert_eq!(glx.native().counters().surfaces_destroyed, 1);
    assert!(!display.has_surface(window));

    // Already gone.
    assert!(!glx.destroy_drawable(&display, window));
}

#[test]
fn test_no_duplicate_entries() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));

    glx.create_drawable(&display, 0, window).unwrap();
    assert_eq!(
        glx.create_drawable(&display, 0, window).unwrap_err(),
        Error::DrawableExists
    );
    assert_eq!(glx.drawables().count(), 1);
    // The losing surface was torn down.
    assert_eq!(glx.native().live_surfaces(), 1);

    // Two contexts on one window share the entry.
    let first = create_context(&glx);
    let second = create_context(&glx);
    make_current(&glx, &display, first, window);
    make_current(&glx, &display, second, window);
    let a = glx.context(first).unwrap().drawable().unwrap();
    let b = glx.context(second).unwrap().drawable().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.reference_count(), 2);
    assert_eq!(glx.drawables().count(), 1);
}

#[test]
fn test_context_surface_lifecycle() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 48));
    let context = create_context(&glx);
    assert_eq!(glx.contexts().count(), 1);
    assert!(!glx.context(context).unwrap().has_been_made_current());

    make_current(&glx, &display, context, window);

    let drawable = glx.context(context).unwrap().drawable().unwrap();
    assert_eq!(drawable.reference_count(), 1);
    assert!(drawable.is_surface());
    assert_eq!(glx.drawables().count(), 1);
    assert!(glx.context(context).unwrap().is_current());
    assert!(glx.context(context).unwrap().has_been_made_current());
    assert_eq!(
        glx.context(context).unwrap().thread_id(),
        thread::current().id()
    );
    assert_eq!(
        binding(&glx, context),
        Binding::Surface(drawable.surface_id().unwrap())
    );
    assert_eq!(glx.native().last_viewport(), Some(Size2D::new(64, 48)));
    assert!(glx.is_current_drawable(context, window));

    // The context still holds the drawable, so an external destroy leaves it alone.
    assert!(!glx.destroy_drawable(&display, window));
    assert_eq!(drawable.reference_count(), 1);
    assert!(glx.drawables().contains(&drawable));
    assert_eq!(glx.native().counters().surfaces_destroyed, 0);
    drop(drawable);

    glx.destroy_context(&display, context).unwrap();

    assert!(glx.context(context).is_none());
    assert_eq!(glx.contexts().count(), 0);
    assert_eq!(glx.drawables().count(), 0);
    assert_eq!(glx.native().counters().surfaces_destroyed, 1);
    assert_eq!(glx.native().live_surfaces(), 0);
    assert_eq!(glx.native().live_contexts(), 0);
    assert_eq!(glx.native().live_pixel_formats(), 0);
    assert_eq!(display.surfaces_destroyed(), 1);
    assert!(glx.native().current_context().is_none());

    assert_eq!(
        glx.destroy_context(&display, context),
        Err(Error::InvalidContext)
    );
}

#[test]
fn test_viewport_is_only_set_on_first_attach() {
    let (glx, display) = setup();
    let first = display.create_window(Size2D::new(64, 48));
    let second = display.create_window(Size2D::new(10, 10));
    let context = create_context(&glx);

    make_current(&glx, &display, context, first);
    make_current(&glx, &display, context, second);
    assert_eq!(glx.native().counters().viewport_updates, 1);
    assert_eq!(glx.native().last_viewport(), Some(Size2D::new(64, 48)));
}

#[test]
fn test_shared_drawable_outlives_first_context() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));
    let first = create_context(&glx);
    let second = create_context(&glx);
    make_current(&glx, &display, first, window);
    make_current(&glx, &display, second, window);

    glx.destroy_context(&display, first).unwrap();
    let drawable = glx.drawables().find(window).unwrap();
    assert_eq!(drawable.reference_count(), 1);
    assert_eq!(glx.native().counters().surfaces_destroyed, 0);

    glx.destroy_context(&display, second).unwrap();
    assert_eq!(glx.drawables().count(), 0);
    assert_eq!(glx.native().counters().surfaces_destroyed, 1);
}

#[test]
fn test_make_current_is_idempotent() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));
    let context = create_context(&glx);

    make_current(&glx, &display, context, window);
    let before = glx.context(context).unwrap().drawable().unwrap();
    make_current(&glx, &display, context, window);
    let after = glx.context(context).unwrap().drawable().unwrap();

    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.reference_count(), 1);
    assert_eq!(glx.drawables().count(), 1);
    assert_eq!(glx.native().live_surfaces(), 1);
}

#[test]
fn test_make_current_switches_drawables() {
    let (glx, display) = setup();
    let first = display.create_window(Size2D::new(64, 64));
    let second = display.create_window(Size2D::new(32, 32));
    let context = create_context(&glx);

    make_current(&glx, &display, context, first);
    make_current(&glx, &display, context, second);

    assert!(glx.drawables().find(first).is_none());
    assert_eq!(glx.drawables().find(second).unwrap().reference_count(), 1);
    assert_eq!(glx.native().counters().surfaces_destroyed, 1);
    assert!(!display.has_surface(first));
    assert!(display.has_surface(second));
    assert!(glx.is_current_drawable(context, second));
    assert!(!glx.is_current_drawable(context, first));
}

#[test]
fn test_failed_make_current_keeps_previous_drawable() {
    let (glx, display) = setup();
    let first = display.create_window(Size2D::new(64, 64));
    let second = display.create_window(Size2D::new(32, 32));
    let context = create_context(&glx);
    make_current(&glx, &display, context, first);

    glx.native()
        .fail(NativeCall::SetCurrentContext, CGL_BAD_CONTEXT);
    assert_eq!(
        glx.make_current(&display, Some(context), Some(context), second),
        Err(Error::MakeCurrentFailed(WindowingApiError::BadContext))
    );
    glx.native().restore(NativeCall::SetCurrentContext);

    assert!(glx.is_current_drawable(context, first));
    assert_eq!(glx.drawables().find(first).unwrap().reference_count(), 1);
    assert!(glx.drawables().find(second).is_none());
    assert_eq!(glx.native().live_surfaces(), 1);
}

#[test]
fn test_make_current_without_context() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));
    let context = create_context(&glx);
    make_current(&glx, &display, context, window);

    glx.make_current(&display, Some(context), None, NONE)
        .unwrap();
    assert!(glx.native().current_context().is_none());
    assert!(!glx.context(context).unwrap().is_current());
    // The context keeps its drawable until it is bound elsewhere or destroyed.
    assert!(glx.is_current_drawable(context, window));
}

#[test]
fn test_make_current_without_drawable() {
    let (glx, display) = setup();
    let context = create_context(&glx);

    make_current(&glx, &display, context, NONE);
    let native_context = glx.context(context).unwrap().native_context();
    assert_eq!(glx.native().current_context(), Some(native_context));
    assert_eq!(binding(&glx, context), Binding::None);
    assert_eq!(glx.drawables().count(), 0);
}

#[test]
fn test_make_current_invalid_context() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));
    let context = create_context(&glx);
    glx.destroy_context(&display, context).unwrap();

    assert_eq!(
        glx.make_current(&display, None, Some(context), window),
        Err(Error::InvalidContext)
    );
}

#[test]
fn test_surface_creation_failures() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));
    let context = create_context(&glx);

    display.refuse_surfaces(true);
    assert_eq!(
        glx.make_current(&display, None, Some(context), window),
        Err(Error::SurfaceCreationFailed)
    );
    display.refuse_surfaces(false);

    glx.native().fail(NativeCall::ImportSurface, 3);
    assert_eq!(
        glx.make_current(&display, None, Some(context), window),
        Err(Error::SurfaceImportFailed(XpError(3)))
    );
    glx.native().restore(NativeCall::ImportSurface);
    // The server-side surface was cleaned up too.
    assert!(!display.has_surface(window));

    glx.native().disconnect();
    assert_eq!(
        glx.make_current(&display, None, Some(context), window),
        Err(Error::NoClientId)
    );

    assert_eq!(glx.drawables().count(), 0);
    assert!(glx.context(context).unwrap().drawable().is_none());
}

#[test]
fn test_garbage_collection_skips_referenced_drawables() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));
    let context = create_context(&glx);
    make_current(&glx, &display, context, window);

    display.destroy_behind_our_back(window);
    let queries = display.geometry_queries();
    assert_eq!(glx.garbage_collect(&display), 0);

    // Referenced entries aren't even probed.
    assert_eq!(display.geometry_queries(), queries);
    assert_eq!(glx.drawables().find(window).unwrap().reference_count(), 1);
    assert_eq!(display.trap_depth(), 0);
    assert_eq!(display.syncs(), 1);
}

#[test]
fn test_garbage_collection_reclaims_stale_drawables() {
    let (glx, display) = setup();
    let live = display.create_window(Size2D::new(64, 64));
    let stale = display.create_window(Size2D::new(64, 64));
    glx.create_drawable(&display, 0, live).unwrap();
    glx.create_drawable(&display, 0, stale).unwrap();

    display.destroy_behind_our_back(stale);
    assert_eq!(glx.garbage_collect(&display), 1);

    assert!(glx.drawables().find(live).is_some());
    assert!(glx.drawables().find(stale).is_none());
    assert_eq!(glx.native().counters().surfaces_destroyed, 1);
    assert_eq!(display.trap_depth(), 0);

    // Nothing left to collect.
    assert_eq!(glx.garbage_collect(&display), 0);
}

#[test]
fn test_garbage_collection_restores_error_handler_before_unlocking() {
    let (glx, display) = setup();
    let glx = Arc::new(glx);
    let stale = display.create_window(Size2D::new(64, 64));
    glx.create_drawable(&display, 0, stale).unwrap();
    display.destroy_behind_our_back(stale);

    let locked_at_pop = Arc::new(AtomicBool::new(false));
    {
        let glx = glx.clone();
        let locked_at_pop = locked_at_pop.clone();
        display.on_pop_error_trap(move || {
            locked_at_pop.store(glx.drawables().is_locked(), Ordering::SeqCst);
        });
    }

    assert_eq!(glx.garbage_collect(&display), 1);
    assert!(locked_at_pop.load(Ordering::SeqCst));
    assert_eq!(display.trap_depth(), 0);
    assert!(!glx.drawables().is_locked());
}

#[test]
fn test_garbage_collection_of_empty_table() {
    let (glx, display) = setup();
    assert_eq!(glx.garbage_collect(&display), 0);
    assert_eq!(display.syncs(), 0);
}

#[test]
fn test_destroy_context_collects_garbage() {
    let (glx, display) = setup();
    let stale = display.create_window(Size2D::new(64, 64));
    glx.create_drawable(&display, 0, stale).unwrap();
    display.destroy_behind_our_back(stale);

    let context = create_context(&glx);
    glx.destroy_context(&display, context).unwrap();
    assert_eq!(glx.drawables().count(), 0);

    let config = Config {
        collect_on_context_destroy: false,
        ..Config::default()
    };
    let glx = Glx::new(HeadlessNative::new(), config);
    let stale = display.create_window(Size2D::new(64, 64));
    glx.create_drawable(&display, 0, stale).unwrap();
    display.destroy_behind_our_back(stale);

    let context = create_context(&glx);
    glx.destroy_context(&display, context).unwrap();
    assert_eq!(glx.drawables().count(), 1);
}

#[test]
fn test_surface_destroyed_notification() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));
    let context = create_context(&glx);
    make_current(&glx, &display, context, window);

    let drawable = glx.context(context).unwrap().drawable().unwrap();
    let surface_id = drawable.surface_id().unwrap();
    glx.surface_notify(drawable.uid(), SurfaceNotifyKind::Destroyed);

    assert_eq!(binding(&glx, context), Binding::None);
    assert!(!glx.native().is_surface_live(surface_id));
    assert!(drawable.surface_id().is_none());
    assert_eq!(drawable.reference_count(), 1);
    assert_eq!(glx.native().counters().surfaces_destroyed, 1);

    // Binding again needs a surface the server no longer has.
    assert_eq!(
        glx.make_current(&display, Some(context), Some(context), window),
        Err(Error::SurfaceLost)
    );

    // Teardown doesn't free the surface a second time.
    drop(drawable);
    glx.destroy_context(&display, context).unwrap();
    assert_eq!(glx.native().counters().surfaces_destroyed, 1);
    assert_eq!(glx.drawables().count(), 0);
}

#[test]
fn test_surface_changed_notification() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));
    let context = create_context(&glx);
    make_current(&glx, &display, context, window);

    let uid = glx.context(context).unwrap().drawable().unwrap().uid();
    display.resize_window(window, Size2D::new(128, 128));
    glx.surface_notify(uid, SurfaceNotifyKind::Changed);
    assert_eq!(glx.native().counters().surface_updates, 1);

    // Unknown surfaces are ignored.
    glx.surface_notify(uid + 100, SurfaceNotifyKind::Changed);
    glx.surface_notify(uid + 100, SurfaceNotifyKind::Destroyed);
    assert_eq!(glx.native().counters().surface_updates, 1);
    assert_eq!(glx.native().counters().surfaces_destroyed, 0);
}

#[test]
fn test_create_context_errors() {
    let (glx, display) = setup();
    let descriptor = PixelFormatDescriptor::rgba8_depth24();

    let gone = create_context(&glx);
    glx.destroy_context(&display, gone).unwrap();
    assert_eq!(
        glx.create_context(0, &descriptor, Some(gone)),
        Err(GlxError {
            code: GlxErrorCode::BadContext,
            x11: false
        })
    );

    glx.native().fail(NativeCall::CreateContext, CGL_BAD_MATCH);
    assert_eq!(
        glx.create_context(0, &descriptor, None),
        Err(GlxError {
            code: GlxErrorCode::BadMatch,
            x11: true
        })
    );
    glx.native().fail(NativeCall::CreateContext, CGL_BAD_CONTEXT);
    assert_eq!(
        glx.create_context(0, &descriptor, None),
        Err(GlxError {
            code: GlxErrorCode::BadContext,
            x11: false
        })
    );
    glx.native().restore(NativeCall::CreateContext);

    // Failed creations don't leak pixel formats.
    assert_eq!(glx.native().live_pixel_formats(), 0);
    assert_eq!(glx.contexts().count(), 0);

    let shared = create_context(&glx);
    let sharing = glx.create_context(0, &descriptor, Some(shared)).unwrap();
    assert_ne!(shared, sharing);
    assert_eq!(glx.contexts().count(), 2);

    // Sharing only works within a screen, and nothing native is created otherwise.
    let pixel_formats = glx.native().live_pixel_formats();
    assert_eq!(
        glx.create_context(1, &descriptor, Some(shared)),
        Err(GlxError {
            code: GlxErrorCode::BadMatch,
            x11: true
        })
    );
    assert_eq!(glx.native().live_pixel_formats(), pixel_formats);
    assert_eq!(glx.contexts().count(), 2);
}

#[test]
fn test_copy_context() {
    let (glx, display) = setup();
    let descriptor = PixelFormatDescriptor::rgba8_depth24();
    let source = create_context(&glx);
    let destination = create_context(&glx);
    let elsewhere = glx.create_context(1, &descriptor, None).unwrap();

    glx.copy_context(None, source, destination, CopyMask::ALL)
        .unwrap();
    assert_eq!(glx.native().counters().copies, 1);

    assert_eq!(
        glx.copy_context(None, source, elsewhere, CopyMask::ALL),
        Err(GlxError {
            code: GlxErrorCode::BadMatch,
            x11: true
        })
    );
    assert_eq!(
        glx.copy_context(Some(destination), source, destination, CopyMask::ALL),
        Err(GlxError {
            code: GlxErrorCode::BadAccess,
            x11: true
        })
    );

    // Copying from the current context flushes it first.
    make_current(&glx, &display, source, NONE);
    let flushes = glx.native().counters().flushes;
    glx.copy_context(Some(source), source, destination, CopyMask::VIEWPORT)
        .unwrap();
    assert_eq!(glx.native().counters().flushes, flushes + 1);

    glx.native().fail(NativeCall::CopyContext, CGL_BAD_CONTEXT);
    assert_eq!(
        glx.copy_context(None, source, destination, CopyMask::ALL),
        Err(GlxError {
            code: GlxErrorCode::BadContext,
            x11: false
        })
    );
    glx.native().restore(NativeCall::CopyContext);

    // A destination current anywhere is off limits.
    let window = display.create_window(Size2D::new(8, 8));
    make_current(&glx, &display, destination, window);
    assert_eq!(
        glx.copy_context(None, source, destination, CopyMask::ALL),
        Err(GlxError {
            code: GlxErrorCode::BadAccess,
            x11: true
        })
    );
}

#[test]
fn test_swap_buffers() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));
    let other = display.create_window(Size2D::new(64, 64));
    let context = create_context(&glx);
    make_current(&glx, &display, context, window);

    glx.swap_drawable_buffers(Some(context), window).unwrap();
    assert_eq!(glx.native().counters().drawable_flushes, 1);
    assert_eq!(glx.native().counters().flushes, 1);

    assert_eq!(
        glx.swap_drawable_buffers(Some(context), other),
        Err(GlxError {
            code: GlxErrorCode::BadCurrentWindow,
            x11: false
        })
    );
    assert_eq!(
        glx.swap_drawable_buffers(None, window),
        Err(GlxError {
            code: GlxErrorCode::BadCurrentWindow,
            x11: false
        })
    );

    glx.native().fail(NativeCall::FlushDrawable, CGL_BAD_CONTEXT);
    assert_eq!(
        glx.swap_buffers(context),
        Err(Error::FlushFailed(WindowingApiError::BadContext))
    );
}

#[test]
fn test_destroy_drawable_in_any() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(64, 64));
    let first = create_context(&glx);
    let second = create_context(&glx);
    make_current(&glx, &display, first, window);
    make_current(&glx, &display, second, window);

    glx.destroy_drawable_in_any(&display, window);

    assert!(glx.context(first).unwrap().drawable().is_none());
    assert!(glx.context(second).unwrap().drawable().is_none());
    assert_eq!(binding(&glx, first), Binding::None);
    assert_eq!(glx.drawables().count(), 0);
    assert_eq!(glx.native().counters().surfaces_destroyed, 1);
}

#[test]
fn test_pbuffer_lifecycle() {
    let (glx, display) = setup();
    let pbuffer = glx
        .create_pbuffer(
            &display,
            7,
            &[GLX_PBUFFER_WIDTH, 400, GLX_PBUFFER_HEIGHT, 400, 0],
        )
        .unwrap();

    // The identifier is a placeholder pixmap on the server.
    assert!(display.has_pixmap(pbuffer));
    assert_eq!(glx.native().live_pbuffers(), 1);
    assert_eq!(glx.query_drawable(&display, pbuffer, GLX_WIDTH), Ok(400));
    assert_eq!(glx.query_drawable(&display, pbuffer, GLX_HEIGHT), Ok(400));
    assert_eq!(glx.query_drawable(&display, pbuffer, GLX_FBCONFIG_ID), Ok(7));
    assert_eq!(
        glx.query_drawable(&display, pbuffer, GLX_PRESERVED_CONTENTS),
        Ok(1)
    );
    assert_eq!(
        glx.query_drawable(&display, pbuffer, GLX_LARGEST_PBUFFER),
        Ok(0)
    );

    let context = create_context(&glx);
    make_current(&glx, &display, context, pbuffer);
    let drawable = glx.context(context).unwrap().drawable().unwrap();
    assert!(drawable.is_pbuffer());
    assert!(drawable.surface_id().is_none());
    assert!(matches!(binding(&glx, context), Binding::Pbuffer(_)));
    drop(drawable);

    assert!(glx.destroy_pbuffer(&display, pbuffer));
    assert_eq!(glx.native().counters().pbuffers_destroyed, 1);
    assert_eq!(glx.native().live_pbuffers(), 0);
    assert!(!display.has_pixmap(pbuffer));
    assert!(glx.context(context).unwrap().drawable().is_none());
    assert_eq!(glx.drawables().count(), 0);

    // Destroying twice is a no-op.
    assert!(!glx.destroy_pbuffer(&display, pbuffer));
    assert_eq!(glx.native().counters().pbuffers_destroyed, 1);
    assert_eq!(
        glx.query_drawable(&display, pbuffer, GLX_WIDTH),
        Err(GlxError {
            code: GlxErrorCode::BadDrawable,
            x11: false
        })
    );
}

#[test]
fn test_pbuffer_creation_errors() {
    let (glx, display) = setup();
    assert_eq!(
        glx.create_pbuffer(&display, 1, &[0x1234, 1]),
        Err(GlxError {
            code: GlxErrorCode::BadValue,
            x11: true
        })
    );

    glx.native().fail(NativeCall::CreatePbuffer, 10016);
    assert_eq!(
        glx.create_pbuffer(&display, 1, &[GLX_PBUFFER_WIDTH, 4, GLX_PBUFFER_HEIGHT, 4]),
        Err(GlxError {
            code: GlxErrorCode::BadAlloc,
            x11: true
        })
    );
    assert_eq!(glx.pbuffers().count(), 0);
}

#[test]
fn test_select_event() {
    let (glx, display) = setup();
    let pbuffer = glx
        .create_pbuffer(&display, 1, &[GLX_PBUFFER_WIDTH, 4, GLX_PBUFFER_HEIGHT, 4])
        .unwrap();
    let window = display.create_window(Size2D::new(4, 4));

    assert_eq!(
        glx.get_selected_event(&display, pbuffer),
        Ok(EventMask::empty())
    );
    glx.select_event(&display, pbuffer, EventMask::PBUFFER_CLOBBER)
        .unwrap();
    assert_eq!(
        glx.get_selected_event(&display, pbuffer),
        Ok(EventMask::PBUFFER_CLOBBER)
    );
    assert_eq!(
        glx.query_drawable(&display, pbuffer, GLX_EVENT_MASK),
        Ok(EventMask::PBUFFER_CLOBBER.bits())
    );

    glx.select_event(&display, window, EventMask::PBUFFER_CLOBBER)
        .unwrap();
    assert_eq!(
        glx.get_selected_event(&display, window),
        Ok(EventMask::empty())
    );

    assert_eq!(
        glx.select_event(&display, 0xdead, EventMask::PBUFFER_CLOBBER),
        Err(GlxError {
            code: GlxErrorCode::BadDrawable,
            x11: false
        })
    );
    assert_eq!(
        glx.get_selected_event(&display, 0xdead),
        Err(GlxError {
            code: GlxErrorCode::BadDrawable,
            x11: false
        })
    );
}

#[test]
fn test_pixmap_lifecycle() {
    let (glx, display) = setup();
    let pixmap = display.create_pixmap(Size2D::new(16, 8));

    assert_eq!(glx.create_pixmap(&display, 0, pixmap, 3), Ok(pixmap));
    assert!(glx.is_pixmap(pixmap));
    assert_eq!(glx.query_drawable(&display, pixmap, GLX_WIDTH), Ok(16));
    assert_eq!(glx.query_drawable(&display, pixmap, GLX_HEIGHT), Ok(8));
    assert_eq!(glx.query_drawable(&display, pixmap, GLX_FBCONFIG_ID), Ok(3));
    assert_eq!(
        glx.query_drawable(&display, pixmap, GLX_EVENT_MASK),
        Err(GlxError {
            code: GlxErrorCode::BadDrawable,
            x11: false
        })
    );

    let context = create_context(&glx);
    make_current(&glx, &display, context, pixmap);
    assert!(glx.context(context).unwrap().drawable().unwrap().is_pixmap());
    assert_eq!(binding(&glx, context), Binding::OffScreen(Size2D::new(16, 8)));

    glx.destroy_pixmap(&display, pixmap).unwrap();
    assert!(!glx.is_pixmap(pixmap));
    assert!(glx.context(context).unwrap().drawable().is_none());
    assert_eq!(glx.drawables().count(), 0);
    assert_eq!(display.live_shared_pixmaps(), 0);

    assert_eq!(
        glx.destroy_pixmap(&display, pixmap),
        Err(GlxError {
            code: GlxErrorCode::BadPixmap,
            x11: false
        })
    );
}

// Stalls every pbuffer or off-screen bind until `destroy` has started on another thread, so
// the destroy runs while `make_current` is in the middle of binding.
fn bind_while_destroying<F>(
    glx: &Glx<HeadlessNative>,
    display: &HeadlessDisplay,
    context: ContextHandle,
    drawable: Xid,
    destroy: F,
) -> Result<(), Error>
where
    F: FnOnce() + Send,
{
    let (binding_sender, binding_receiver) = mpsc::channel();
    let binding_sender = Mutex::new(binding_sender);
    glx.native().on_bind(move || {
        let _ = binding_sender.lock().unwrap().send(());
        thread::sleep(Duration::from_millis(50));
    });

    thread::scope(|scope| {
        scope.spawn(move || {
            binding_receiver.recv().unwrap();
            destroy();
        });
        glx.make_current(display, None, Some(context), drawable)
    })
}

#[test]
fn test_pixmap_destroyed_while_binding() {
    let (glx, display) = setup();
    let pixmap = display.create_pixmap(Size2D::new(16, 8));
    glx.create_pixmap(&display, 0, pixmap, 1).unwrap();
    let context = create_context(&glx);

    let result = bind_while_destroying(&glx, &display, context, pixmap, || {
        glx.destroy_pixmap(&display, pixmap).unwrap();
    });

    assert!(matches!(result, Ok(()) | Err(Error::PixmapNotFound)));
    assert!(!glx.is_pixmap(pixmap));
    assert_eq!(display.live_shared_pixmaps(), 0);
    // Whichever way the race went, nothing is left bound to the unmapped memory.
    assert!(glx.context(context).unwrap().drawable().is_none());
    assert_eq!(binding(&glx, context), Binding::None);
    assert_eq!(glx.drawables().count(), 0);
}

#[test]
fn test_pbuffer_destroyed_while_binding() {
    let (glx, display) = setup();
    let pbuffer = glx
        .create_pbuffer(&display, 1, &[GLX_PBUFFER_WIDTH, 4, GLX_PBUFFER_HEIGHT, 4])
        .unwrap();
    let context = create_context(&glx);

    let result = bind_while_destroying(&glx, &display, context, pbuffer, || {
        assert!(glx.destroy_pbuffer(&display, pbuffer));
    });

    assert!(matches!(result, Ok(()) | Err(Error::PbufferNotFound)));
    assert_eq!(glx.native().live_pbuffers(), 0);
    assert_eq!(glx.native().counters().pbuffers_destroyed, 1);
    assert!(glx.context(context).unwrap().drawable().is_none());
    assert_eq!(binding(&glx, context), Binding::None);
    assert_eq!(glx.drawables().count(), 0);
}

#[test]
fn test_pixmap_of_unknown_drawable() {
    let (glx, display) = setup();
    assert_eq!(
        glx.create_pixmap(&display, 0, 0xdead, 1),
        Err(GlxError {
            code: GlxErrorCode::BadAlloc,
            x11: true
        })
    );
    assert_eq!(glx.pixmaps().count(), 0);
}

#[test]
fn test_query_window() {
    let (glx, display) = setup();
    let window = display.create_window(Size2D::new(32, 16));
    assert_eq!(glx.query_drawable(&display, window, GLX_WIDTH), Ok(32));
    assert_eq!(glx.query_drawable(&display, window, GLX_HEIGHT), Ok(16));
    assert_eq!(
        glx.query_drawable(&display, window, GLX_FBCONFIG_ID),
        Err(GlxError {
            code: GlxErrorCode::BadDrawable,
            x11: false
        })
    );
    assert_eq!(
        glx.query_drawable(&display, 0xdead, GLX_WIDTH),
        Err(GlxError {
            code: GlxErrorCode::BadDrawable,
            x11: false
        })
    );
}

// Threads create contexts, bind them to a handful of shared windows and destroy them again,
// while others create and destroy unreferenced entries and collect garbage. The headless
// backend aborts on any double free or use of a destroyed native object.
#[test]
fn test_concurrent_lifecycle() {
    const THREADS: usize = 8;
    const ITERATIONS: usize = 200;

    let (glx, display) = setup();
    let windows: Vec<Xid> = (0..4)
        .map(|_| display.create_window(Size2D::new(32, 32)))
        .collect();

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                let mut rng = rand::thread_rng();
                let mut contexts: Vec<ContextHandle> = vec![];
                for _ in 0..ITERATIONS {
                    let window = windows[rng.gen_range(0..windows.len())];
                    match rng.gen_range(0..6) {
                        0 => contexts.push(create_context(&glx)),
                        1 | 2 if !contexts.is_empty() => {
                            let context = contexts[rng.gen_range(0..contexts.len())];
                            make_current(&glx, &display, context, window);
                        }
                        3 if !contexts.is_empty() => {
                            let context = contexts.swap_remove(rng.gen_range(0..contexts.len()));
                            glx.destroy_context(&display, context).unwrap();
                        }
                        4 => match glx.create_drawable(&display, 0, window) {
                            Ok(_) | Err(Error::DrawableExists) => {}
                            Err(err) => panic!("creating drawable failed: {:?}", err),
                        },
                        _ => {
                            glx.destroy_drawable(&display, window);
                            glx.garbage_collect(&display);
                        }
                    }
                }
                for context in contexts {
                    glx.destroy_context(&display, context).unwrap();
                }
            });
        }
    });

    assert_eq!(glx.contexts().count(), 0);
    for &window in &windows {
        if let Some(drawable) = glx.drawables().find(window) {
            assert_eq!(drawable.reference_count(), 0);
        }
        glx.destroy_drawable(&display, window);
    }
    assert_eq!(glx.drawables().count(), 0);
    assert_eq!(glx.native().live_surfaces(), 0);
    assert_eq!(glx.native().live_contexts(), 0);
    assert_eq!(glx.native().live_pixel_formats(), 0);
    assert_eq!(display.trap_depth(), 0);
}
