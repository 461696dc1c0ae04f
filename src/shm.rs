// cglx/src/shm.rs
//
//! Shared memory backing for GLX pixmaps.
//!
//! The display server renders pixmaps into a POSIX shared memory object and hands us its name.
//! We map it read-write and install the mapping as the off-screen target of a context.

use crate::Error;

use log::{debug, warn};
use std::ffi::CString;
use std::os::raw::c_void;
use std::ptr;

/// A read-write memory mapping, unmapped on drop.
pub struct SharedBuffer {
    base: *mut c_void,
    len: usize,
    // The name of the shared memory object, if this mapping came from one.
    path: Option<CString>,
    fd: Option<libc::c_int>,
}

// The mapping is plain memory; access is serialized by the pixmap table.
unsafe impl Send for SharedBuffer {}
unsafe impl Sync for SharedBuffer {}

impl SharedBuffer {
    /// Maps the shared memory object `path` exported by the display server.
    pub fn open(path: &str, len: usize) -> Result<SharedBuffer, Error> {
        let path = CString::new(path).map_err(|_| Error::PixmapCreationFailed)?;
        if len == 0 {
            return Err(Error::PixmapCreationFailed);
        }

        unsafe {
            let fd = libc::shm_open(path.as_ptr(), libc::O_RDWR, 0);
            if fd < 0 {
                warn!("shm_open({:?}) failed", path);
                return Err(Error::PixmapCreationFailed);
            }

            let base = libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            if base == libc::MAP_FAILED {
                warn!("mmap of {:?} ({} bytes) failed", path, len);
                libc::close(fd);
                libc::shm_unlink(path.as_ptr());
                return Err(Error::PixmapCreationFailed);
            }

            debug!("Mapped {:?} ({} bytes)", path, len);
            Ok(SharedBuffer {
                base,
                len,
                path: Some(path),
                fd: Some(fd),
            })
        }
    }

    /// Creates a private anonymous mapping, for servers that render in-process.
    pub fn anonymous(len: usize) -> Result<SharedBuffer, Error> {
        if len == 0 {
            return Err(Error::PixmapCreationFailed);
        }

        unsafe {
            let base = libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            );
            if base == libc::MAP_FAILED {
                return Err(Error::AllocationFailed);
            }
            Ok(SharedBuffer {
                base,
                len,
                path: None,
                fd: None,
            })
        }
    }

    /// The base address of the mapping.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut c_void {
        self.base
    }

    /// The length of the mapping in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base, self.len);
            if let Some(fd) = self.fd.take() {
                libc::close(fd);
            }
            if let Some(ref path) = self.path {
                libc::shm_unlink(path.as_ptr());
            }
        }
    }
}
