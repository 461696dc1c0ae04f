// cglx/src/platform/headless.rs
//
//! An in-process model of CGL and the display server.
//!
//! Nothing here draws. It tracks which native objects are alive, what each context is bound
//! to and which context each thread has current, so callers can check exactly what the
//! registries did. Freeing an object twice, or using one after it was freed, is fatal just as
//! it would crash a real process.

use super::{CglError, ClientId, Display, Geometry, Native, OffScreenTarget, PbufferFormat};
use super::{SharedPixmap, SurfaceGrant, SurfaceId, SurfaceKey, XErrorCode, XpError, Xid};
use crate::visual::PixelFormatAttribute;

use euclid::default::Size2D;
use fnv::{FnvHashMap, FnvHashSet};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

// kCGLBadContext
const BAD_CONTEXT: i32 = 10004;
// xp_error_bad_surface
const XP_BAD_SURFACE: i32 = 5;

/// A callback run from inside a headless call, with no headless lock held.
pub type Hook = Arc<dyn Fn() + Send + Sync>;

fn run_hook(hook: &Mutex<Option<Hook>>) {
    let hook = hook
        .lock()
        .unwrap_or_else(|_| fatal!("headless hook lock poisoned"))
        .clone();
    if let Some(hook) = hook {
        hook();
    }
}

fn set_hook<F>(slot: &Mutex<Option<Hook>>, hook: F)
where
    F: Fn() + Send + Sync + 'static,
{
    *slot
        .lock()
        .unwrap_or_else(|_| fatal!("headless hook lock poisoned")) = Some(Arc::new(hook));
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeadlessPixelFormat(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeadlessContext(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeadlessPbuffer(u64);

/// Native calls that can be told to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NativeCall {
    ChoosePixelFormat,
    CreateContext,
    SetCurrentContext,
    ClearDrawable,
    FlushDrawable,
    SetOffScreen,
    CreatePbuffer,
    SetPbuffer,
    CopyContext,
    ImportSurface,
    AttachSurface,
}

/// What a native context renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    None,
    Surface(SurfaceId),
    Pbuffer(HeadlessPbuffer),
    OffScreen(Size2D<i32>),
}

/// Counts of calls made on a `HeadlessNative`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeCounters {
    pub surfaces_destroyed: usize,
    pub pbuffers_destroyed: usize,
    pub contexts_destroyed: usize,
    pub surface_updates: usize,
    pub drawable_flushes: usize,
    pub flushes: usize,
    pub viewport_updates: usize,
    pub copies: usize,
}

#[derive(Default)]
struct NativeState {
    next_object: u64,
    pixel_formats: FnvHashSet<u64>,
    contexts: FnvHashMap<u64, Binding>,
    pbuffers: FnvHashMap<u64, Size2D<i32>>,
    surfaces: FnvHashSet<SurfaceId>,
    current: FnvHashMap<ThreadId, u64>,
    failures: FnvHashMap<NativeCall, i32>,
    last_viewport: Option<Size2D<u32>>,
    counters: NativeCounters,
    no_client: bool,
}

impl NativeState {
    fn next_object(&mut self) -> u64 {
        self.next_object += 1;
        self.next_object
    }

    fn check(&self, call: NativeCall) -> Result<(), CglError> {
        match self.failures.get(&call) {
            Some(&code) => Err(CglError(code)),
            None => Ok(()),
        }
    }

    fn check_surface_call(&self, call: NativeCall) -> Result<(), XpError> {
        match self.failures.get(&call) {
            Some(&code) => Err(XpError(code)),
            None => Ok(()),
        }
    }

    fn binding_mut(&mut self, context: HeadlessContext) -> &mut Binding {
        match self.contexts.get_mut(&context.0) {
            Some(binding) => binding,
            None => fatal!("use of destroyed context {:?}", context),
        }
    }
}

/// The native API half of the headless backend.
#[derive(Default)]
pub struct HeadlessNative {
    state: Mutex<NativeState>,
    bind_hook: Mutex<Option<Hook>>,
}

impl HeadlessNative {
    pub fn new() -> HeadlessNative {
        HeadlessNative::default()
    }

    fn lock(&self) -> MutexGuard<NativeState> {
        self.state
            .lock()
            .unwrap_or_else(|_| fatal!("headless native lock poisoned"))
    }

    /// Makes every later `call` fail with `code` until `restore()`.
    pub fn fail(&self, call: NativeCall, code: i32) {
        self.lock().failures.insert(call, code);
    }

    pub fn restore(&self, call: NativeCall) {
        self.lock().failures.remove(&call);
    }

    /// Runs `hook` at the start of every `set_pbuffer` and `set_off_screen` call.
    pub fn on_bind<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        set_hook(&self.bind_hook, hook);
    }

    /// Pretends the window server never accepted our connection.
    pub fn disconnect(&self) {
        self.lock().no_client = true;
    }

    pub fn counters(&self) -> NativeCounters {
        self.lock().counters
    }

    pub fn live_contexts(&self) -> usize {
        self.lock().contexts.len()
    }

    pub fn live_pixel_formats(&self) -> usize {
        self.lock().pixel_formats.len()
    }

    pub fn live_pbuffers(&self) -> usize {
        self.lock().pbuffers.len()
    }

    pub fn live_surfaces(&self) -> usize {
        self.lock().surfaces.len()
    }

    pub fn is_surface_live(&self, surface: SurfaceId) -> bool {
        self.lock().surfaces.contains(&surface)
    }

    /// What `context` renders into. `None` if the context was destroyed.
    pub fn binding(&self, context: HeadlessContext) -> Option<Binding> {
        self.lock().contexts.get(&context.0).copied()
    }

    /// The size last passed to `set_viewport_and_scissor`.
    pub fn last_viewport(&self) -> Option<Size2D<u32>> {
        self.lock().last_viewport
    }
}

impl Native for HeadlessNative {
    type PixelFormat = HeadlessPixelFormat;
    type Context = HeadlessContext;
    type PBuffer = HeadlessPbuffer;

    fn choose_pixel_format(
        &self,
        _: &[PixelFormatAttribute],
    ) -> Result<Option<HeadlessPixelFormat>, CglError> {
        let mut state = self.lock();
        state.check(NativeCall::ChoosePixelFormat)?;
        let id = state.next_object();
        state.pixel_formats.insert(id);
        Ok(Some(HeadlessPixelFormat(id)))
    }

    fn destroy_pixel_format(&self, pixel_format: HeadlessPixelFormat) -> Result<(), CglError> {
        if !self.lock().pixel_formats.remove(&pixel_format.0) {
            fatal!("double free of {:?}", pixel_format);
        }
        Ok(())
    }

    fn create_context(
        &self,
        pixel_format: HeadlessPixelFormat,
        share_with: Option<HeadlessContext>,
    ) -> Result<HeadlessContext, CglError> {
        let mut state = self.lock();
        state.check(NativeCall::CreateContext)?;
        if !state.pixel_formats.contains(&pixel_format.0) {
            fatal!("use of destroyed {:?}", pixel_format);
        }
        if let Some(share_with) = share_with {
            if !state.contexts.contains_key(&share_with.0) {
                return Err(CglError(BAD_CONTEXT));
            }
        }
        let id = state.next_object();
        state.contexts.insert(id, Binding::None);
        Ok(HeadlessContext(id))
    }

    fn destroy_context(&self, context: HeadlessContext) -> Result<(), CglError> {
        let mut state = self.lock();
        if state.contexts.remove(&context.0).is_none() {
            fatal!("double free of {:?}", context);
        }
        state.current.retain(|_, current| *current != context.0);
        state.counters.contexts_destroyed += 1;
        Ok(())
    }

    fn set_current_context(&self, context: Option<HeadlessContext>) -> Result<(), CglError> {
        let mut state = self.lock();
        state.check(NativeCall::SetCurrentContext)?;
        let thread = thread::current().id();
        match context {
            Some(context) => {
                state.binding_mut(context);
                state.current.insert(thread, context.0);
            }
            None => {
                state.current.remove(&thread);
            }
        }
        Ok(())
    }

    fn current_context(&self) -> Option<HeadlessContext> {
        self.lock()
            .current
            .get(&thread::current().id())
            .map(|&id| HeadlessContext(id))
    }

    fn clear_drawable(&self, context: HeadlessContext) -> Result<(), CglError> {
        let mut state = self.lock();
        state.check(NativeCall::ClearDrawable)?;
        *state.binding_mut(context) = Binding::None;
        Ok(())
    }

    fn flush_drawable(&self, context: HeadlessContext) -> Result<(), CglError> {
        let mut state = self.lock();
        state.check(NativeCall::FlushDrawable)?;
        state.binding_mut(context);
        state.counters.drawable_flushes += 1;
        Ok(())
    }

    unsafe fn set_off_screen(
        &self,
        context: HeadlessContext,
        target: &OffScreenTarget,
    ) -> Result<(), CglError> {
        run_hook(&self.bind_hook);
        let mut state = self.lock();
        state.check(NativeCall::SetOffScreen)?;
        // Touch every byte, the way a clear would.
        let length = target.row_bytes.max(0) as usize * target.size.height.max(0) as usize;
        ptr::write_bytes(target.base as *mut u8, 0, length);
        *state.binding_mut(context) = Binding::OffScreen(target.size);
        Ok(())
    }

    fn create_pbuffer(
        &self,
        size: Size2D<i32>,
        _: PbufferFormat,
    ) -> Result<HeadlessPbuffer, CglError> {
        let mut state = self.lock();
        state.check(NativeCall::CreatePbuffer)?;
        let id = state.next_object();
        state.pbuffers.insert(id, size);
        Ok(HeadlessPbuffer(id))
    }

    fn destroy_pbuffer(&self, pbuffer: HeadlessPbuffer) -> Result<(), CglError> {
        let mut state = self.lock();
        if state.pbuffers.remove(&pbuffer.0).is_none() {
            fatal!("double free of {:?}", pbuffer);
        }
        for binding in state.contexts.values_mut() {
            if *binding == Binding::Pbuffer(pbuffer) {
                *binding = Binding::None;
            }
        }
        state.counters.pbuffers_destroyed += 1;
        Ok(())
    }

    fn set_pbuffer(
        &self,
        context: HeadlessContext,
        pbuffer: HeadlessPbuffer,
        _: u32,
        _: i32,
        _: i32,
    ) -> Result<(), CglError> {
        run_hook(&self.bind_hook);
        let mut state = self.lock();
        state.check(NativeCall::SetPbuffer)?;
        if !state.pbuffers.contains_key(&pbuffer.0) {
            fatal!("use of destroyed {:?}", pbuffer);
        }
        *state.binding_mut(context) = Binding::Pbuffer(pbuffer);
        Ok(())
    }

    fn copy_context(
        &self,
        source: HeadlessContext,
        destination: HeadlessContext,
        _: u32,
    ) -> Result<(), CglError> {
        let mut state = self.lock();
        state.check(NativeCall::CopyContext)?;
        state.binding_mut(source);
        state.binding_mut(destination);
        state.counters.copies += 1;
        Ok(())
    }

    fn error_string(&self, error: CglError) -> String {
        format!("headless CGL error {}", error.0)
    }

    fn client_id(&self) -> Option<ClientId> {
        if self.lock().no_client {
            None
        } else {
            Some(ClientId(1))
        }
    }

    fn import_surface(&self, _: SurfaceKey) -> Result<SurfaceId, XpError> {
        let mut state = self.lock();
        state.check_surface_call(NativeCall::ImportSurface)?;
        let id = SurfaceId(state.next_object() as u32);
        state.surfaces.insert(id);
        Ok(id)
    }

    fn destroy_surface(&self, surface: SurfaceId) -> Result<(), XpError> {
        let mut state = self.lock();
        if !state.surfaces.remove(&surface) {
            fatal!("double free of {:?}", surface);
        }
        for binding in state.contexts.values_mut() {
            if *binding == Binding::Surface(surface) {
                *binding = Binding::None;
            }
        }
        state.counters.surfaces_destroyed += 1;
        Ok(())
    }

    fn attach_surface(&self, context: HeadlessContext, surface: SurfaceId) -> Result<(), XpError> {
        let mut state = self.lock();
        state.check_surface_call(NativeCall::AttachSurface)?;
        if !state.surfaces.contains(&surface) {
            return Err(XpError(XP_BAD_SURFACE));
        }
        *state.binding_mut(context) = Binding::Surface(surface);
        Ok(())
    }

    fn update_surface(&self, context: HeadlessContext) -> Result<(), XpError> {
        let mut state = self.lock();
        state.binding_mut(context);
        state.counters.surface_updates += 1;
        Ok(())
    }

    fn flush(&self) {
        self.lock().counters.flushes += 1;
    }

    fn set_viewport_and_scissor(&self, size: Size2D<u32>) {
        let mut state = self.lock();
        state.last_viewport = Some(size);
        state.counters.viewport_updates += 1;
    }
}

#[derive(Default)]
struct DisplayState {
    next_id: Xid,
    next_uid: u32,
    windows: FnvHashMap<Xid, Size2D<u32>>,
    pixmaps: FnvHashMap<Xid, Size2D<u32>>,
    // Server-side surfaces, by drawable.
    surfaces: FnvHashMap<Xid, u32>,
    shared_pixmaps: FnvHashSet<Xid>,
    refuse_surfaces: bool,
    trap_depth: usize,
    syncs: usize,
    geometry_queries: usize,
    surfaces_destroyed: usize,
}

/// The display server half of the headless backend.
#[derive(Default)]
pub struct HeadlessDisplay {
    state: Mutex<DisplayState>,
    pop_error_trap_hook: Mutex<Option<Hook>>,
}

impl HeadlessDisplay {
    pub fn new() -> HeadlessDisplay {
        HeadlessDisplay::default()
    }

    fn lock(&self) -> MutexGuard<DisplayState> {
        self.state
            .lock()
            .unwrap_or_else(|_| fatal!("headless display lock poisoned"))
    }

    /// Runs `hook` whenever an error trap is popped, after the trap is gone.
    pub fn on_pop_error_trap<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        set_hook(&self.pop_error_trap_hook, hook);
    }

    fn next_id(state: &mut DisplayState) -> Xid {
        state.next_id += 1;
        // Resource IDs carry the client's base in the high bits.
        0x0040_0000 | state.next_id
    }

    pub fn create_window(&self, size: Size2D<u32>) -> Xid {
        let mut state = self.lock();
        let id = HeadlessDisplay::next_id(&mut state);
        state.windows.insert(id, size);
        id
    }

    pub fn resize_window(&self, window: Xid, size: Size2D<u32>) {
        if let Some(entry) = self.lock().windows.get_mut(&window) {
            *entry = size;
        }
    }

    /// Destroys a window or pixmap the way another client would: nobody here is told.
    pub fn destroy_behind_our_back(&self, drawable: Xid) {
        let mut state = self.lock();
        state.windows.remove(&drawable);
        state.pixmaps.remove(&drawable);
        state.surfaces.remove(&drawable);
    }

    /// Creates an X pixmap that can later be turned into a GLX pixmap.
    pub fn create_pixmap(&self, size: Size2D<u32>) -> Xid {
        let mut state = self.lock();
        let id = HeadlessDisplay::next_id(&mut state);
        state.pixmaps.insert(id, size);
        id
    }

    /// Makes `create_surface` fail.
    pub fn refuse_surfaces(&self, refuse: bool) {
        self.lock().refuse_surfaces = refuse;
    }

    pub fn has_pixmap(&self, pixmap: Xid) -> bool {
        self.lock().pixmaps.contains_key(&pixmap)
    }

    pub fn has_surface(&self, drawable: Xid) -> bool {
        self.lock().surfaces.contains_key(&drawable)
    }

    pub fn live_surfaces(&self) -> usize {
        self.lock().surfaces.len()
    }

    pub fn surfaces_destroyed(&self) -> usize {
        self.lock().surfaces_destroyed
    }

    pub fn live_shared_pixmaps(&self) -> usize {
        self.lock().shared_pixmaps.len()
    }

    pub fn trap_depth(&self) -> usize {
        self.lock().trap_depth
    }

    pub fn syncs(&self) -> usize {
        self.lock().syncs
    }

    pub fn geometry_queries(&self) -> usize {
        self.lock().geometry_queries
    }
}

impl Display for HeadlessDisplay {
    fn default_screen(&self) -> i32 {
        0
    }

    fn create_surface(&self, _: i32, drawable: Xid, _: ClientId) -> Option<SurfaceGrant> {
        let mut state = self.lock();
        if state.refuse_surfaces || !state.windows.contains_key(&drawable) {
            return None;
        }
        state.next_uid += 1;
        let uid = state.next_uid;
        state.surfaces.insert(drawable, uid);
        Some(SurfaceGrant {
            key: SurfaceKey([drawable, uid]),
            uid,
        })
    }

    fn destroy_surface(&self, _: i32, drawable: Xid) {
        let mut state = self.lock();
        if state.surfaces.remove(&drawable).is_some() {
            state.surfaces_destroyed += 1;
        }
    }

    fn create_placeholder_pixmap(&self, _: i32, size: Size2D<u32>) -> Option<Xid> {
        Some(self.create_pixmap(size))
    }

    fn free_pixmap(&self, pixmap: Xid) {
        if self.lock().pixmaps.remove(&pixmap).is_none() {
            fatal!("double free of pixmap {:#x}", pixmap);
        }
    }

    fn create_shared_pixmap(&self, _: i32, pixmap: Xid) -> Option<SharedPixmap> {
        let mut state = self.lock();
        let size = *state.pixmaps.get(&pixmap)?;
        state.shared_pixmaps.insert(pixmap);
        let pitch = size.width as i32 * 4;
        Some(SharedPixmap {
            size: size.to_i32(),
            pitch,
            bpp: 4,
            length: pitch as usize * size.height as usize,
            path: None,
        })
    }

    fn destroy_shared_pixmap(&self, pixmap: Xid) {
        if !self.lock().shared_pixmaps.remove(&pixmap) {
            fatal!("double free of shared pixmap {:#x}", pixmap);
        }
    }

    fn get_geometry(&self, drawable: Xid) -> Result<Geometry, XErrorCode> {
        let mut state = self.lock();
        state.geometry_queries += 1;
        if let Some(&size) = state.windows.get(&drawable) {
            return Ok(Geometry { size, depth: 24 });
        }
        if let Some(&size) = state.pixmaps.get(&drawable) {
            return Ok(Geometry { size, depth: 24 });
        }
        Err(XErrorCode::BadDrawable)
    }

    fn window_exists(&self, window: Xid) -> bool {
        self.lock().windows.contains_key(&window)
    }

    fn sync(&self) {
        self.lock().syncs += 1;
    }

    fn push_error_trap(&self) {
        self.lock().trap_depth += 1;
    }

    fn pop_error_trap(&self) {
        {
            let mut state = self.lock();
            if state.trap_depth == 0 {
                fatal!("error trap popped without a push");
            }
            state.trap_depth -= 1;
        }
        run_hook(&self.pop_error_trap_hook);
    }
}
