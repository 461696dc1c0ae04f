// cglx/src/attrib.rs
//
//! GLX attribute names used by drawable queries and attribute lists.

pub const GLX_FBCONFIG_ID: i32 = 0x8013;
pub const GLX_PRESERVED_CONTENTS: i32 = 0x801B;
pub const GLX_LARGEST_PBUFFER: i32 = 0x801C;
pub const GLX_WIDTH: i32 = 0x801D;
pub const GLX_HEIGHT: i32 = 0x801E;
pub const GLX_EVENT_MASK: i32 = 0x801F;
pub const GLX_PBUFFER_HEIGHT: i32 = 0x8040;
pub const GLX_PBUFFER_WIDTH: i32 = 0x8041;
