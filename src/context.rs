// cglx/src/context.rs
//
//! GLX contexts and the registry that tracks them.

use crate::drawable::Drawable;
use crate::platform::{Native, Xid};

use fnv::FnvHashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

/// Names a context in the registry.
///
/// Handles are never reused, so a handle to a destroyed context stays invalid forever.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub(crate) u64);

/// A GLX context backed by a CGL context.
pub struct Context<N: Native> {
    handle: ContextHandle,
    screen: i32,
    double_buffered: bool,
    native_context: N::Context,
    pixel_format: N::PixelFormat,
    state: Mutex<ContextState>,
}

pub(crate) struct ContextState {
    pub(crate) is_current: bool,
    // Set the first time the context is made current on a surface. The viewport and scissor
    // are initialized from the surface geometry exactly once.
    pub(crate) made_current: bool,
    pub(crate) thread_id: ThreadId,
    // Holds one reference on the drawable.
    pub(crate) drawable: Option<Arc<Drawable>>,
}

impl<N: Native> Debug for Context<N> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Context")
            .field("handle", &self.handle)
            .field("screen", &self.screen)
            .field("native_context", &self.native_context)
            .finish()
    }
}

impl<N: Native> Context<N> {
    pub(crate) fn new(
        handle: ContextHandle,
        screen: i32,
        double_buffered: bool,
        native_context: N::Context,
        pixel_format: N::PixelFormat,
    ) -> Context<N> {
        Context {
            handle,
            screen,
            double_buffered,
            native_context,
            pixel_format,
            state: Mutex::new(ContextState {
                is_current: false,
                made_current: false,
                thread_id: thread::current().id(),
                drawable: None,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<ContextState> {
        self.state
            .lock()
            .unwrap_or_else(|_| fatal!("context {:?} lock poisoned", self.handle))
    }

    #[inline]
    pub fn handle(&self) -> ContextHandle {
        self.handle
    }

    #[inline]
    pub fn screen(&self) -> i32 {
        self.screen
    }

    #[inline]
    pub fn is_double_buffered(&self) -> bool {
        self.double_buffered
    }

    #[inline]
    pub fn native_context(&self) -> N::Context {
        self.native_context
    }

    #[inline]
    pub fn pixel_format(&self) -> N::PixelFormat {
        self.pixel_format
    }

    /// True between a successful make-current and the next make-current that replaces it.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.lock().is_current
    }

    /// True once the context has been made current on a window.
    #[inline]
    pub fn has_been_made_current(&self) -> bool {
        self.lock().made_current
    }

    /// The thread that last made this context current.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.lock().thread_id
    }

    /// The attached drawable. This doesn't add a reference.
    pub fn drawable(&self) -> Option<Arc<Drawable>> {
        self.lock().drawable.clone()
    }
}

/// Every live context in the process.
pub struct ContextRegistry<N: Native> {
    contexts: Mutex<FnvHashMap<ContextHandle, Arc<Context<N>>>>,
    next_handle: AtomicU64,
}

impl<N: Native> Default for ContextRegistry<N> {
    fn default() -> ContextRegistry<N> {
        ContextRegistry::new()
    }
}

impl<N: Native> ContextRegistry<N> {
    pub fn new() -> ContextRegistry<N> {
        ContextRegistry {
            contexts: Mutex::new(FnvHashMap::default()),
            next_handle: AtomicU64::new(1),
        }
    }

    // Lock the registry
    fn lock(&self) -> MutexGuard<FnvHashMap<ContextHandle, Arc<Context<N>>>> {
        self.contexts
            .lock()
            .unwrap_or_else(|_| fatal!("context registry lock poisoned"))
    }

    pub(crate) fn next_handle(&self) -> ContextHandle {
        ContextHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn insert(&self, context: Arc<Context<N>>) {
        if self.lock().insert(context.handle, context.clone()).is_some() {
            fatal!("context handle {:?} registered twice", context.handle);
        }
    }

    /// Unlinks a context. Only one caller can get `Some` for a given handle.
    pub(crate) fn remove(&self, handle: ContextHandle) -> Option<Arc<Context<N>>> {
        self.lock().remove(&handle)
    }

    #[inline]
    pub fn get(&self, handle: ContextHandle) -> Option<Arc<Context<N>>> {
        self.lock().get(&handle).cloned()
    }

    #[inline]
    pub fn contains(&self, handle: ContextHandle) -> bool {
        self.lock().contains_key(&handle)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Finds a context whose attached drawable carries the surface notification ID `uid`.
    ///
    /// This is a linear scan over every context. Contexts are few.
    pub(crate) fn find_by_surface_uid(
        &self,
        uid: u32,
    ) -> Option<(Arc<Context<N>>, Arc<Drawable>)> {
        let contexts = self.lock();
        for context in contexts.values() {
            let state = context.lock();
            if let Some(ref drawable) = state.drawable {
                if drawable.is_surface() && drawable.uid() == uid {
                    return Some((context.clone(), drawable.clone()));
                }
            }
        }
        None
    }

    /// Detaches `id` from every context it is attached to.
    ///
    /// Returns each detached context's native context along with the drawable, whose
    /// reference now belongs to the caller.
    pub(crate) fn detach_drawable(&self, id: Xid) -> Vec<(N::Context, Arc<Drawable>)> {
        let contexts = self.lock();
        let mut detached = vec![];
        for context in contexts.values() {
            let mut state = context.lock();
            if state.drawable.as_ref().map_or(false, |drawable| drawable.id() == id) {
                if let Some(drawable) = state.drawable.take() {
                    detached.push((context.native_context, drawable));
                }
            }
        }
        detached
    }
}
