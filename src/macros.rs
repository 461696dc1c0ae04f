// cglx/src/macros.rs
//
//! Macros.

/// Reports an invariant violation and aborts the process.
///
/// Used where continuing would operate on corrupted shared state: a poisoned registry lock, a
/// native teardown call that must succeed, or a reference count going negative. This never
/// unwinds, so no destructor observes the broken state.
///
/// It is not part of the public API:
///
/// ```compile_fail
/// cglx::fatal!("invariant violated");
/// ```
macro_rules! fatal {
    ($($arg:tt)+) => {{
        ::log::error!($($arg)+);
        ::std::process::abort()
    }};
}
