// cglx/build.rs
//
//! The `cglx` build script.

use cfg_aliases::cfg_aliases;

fn main() {
    // Setup aliases for #[cfg] checks
    cfg_aliases! {
        // Platforms
        macos: { target_os = "macos" },
    }
}
