//! Mapped windows onto shared memory segments.
//!
//! A [`MappedWindow`] is a live `mmap` of a segment. Several windows may
//! alias the same pages; writes through one are visible through all of them
//! because every mapping is `MAP_SHARED`.
//!
//! Windows never hand out Rust references into the mapping. Bytes are moved
//! in and out with raw copies, and every transfer first checks that the
//! window is still mapped, so a window that was unmapped (or displaced by a
//! later fixed mapping) fails with [`Error::UseAfterUnmap`] instead of
//! touching a stale address range.

use super::{AccessMode, Placement, Protection};
use crate::error::{Error, Result};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Lifecycle state of a window's address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    /// The range is mapped and owned by the window.
    Mapped,
    /// The window was explicitly unmapped.
    Unmapped,
    /// A later fixed mapping replaced (part of) the range.
    Displaced,
}

/// Address range shared between a window and the mapping registry.
#[derive(Debug)]
pub(crate) struct WindowState {
    pub(crate) base: usize,
    pub(crate) len: usize,
    pub(crate) status: Cell<WindowStatus>,
}

impl WindowState {
    pub(crate) fn is_mapped(&self) -> bool {
        self.status.get() == WindowStatus::Mapped
    }

    pub(crate) fn end(&self) -> usize {
        self.base + self.len
    }
}

/// A mapping of a segment into this process's address space.
pub struct MappedWindow {
    state: Rc<WindowState>,
    protection: Protection,
    placement: Placement,
    segment: String,
    mode: AccessMode,
    mapper_id: u64,
    sequence: u64,
}

/// Everything the mapper knows about a freshly mapped window.
pub(crate) struct WindowParts {
    pub(crate) state: Rc<WindowState>,
    pub(crate) protection: Protection,
    pub(crate) placement: Placement,
    pub(crate) segment: String,
    pub(crate) mode: AccessMode,
    pub(crate) mapper_id: u64,
    pub(crate) sequence: u64,
}

impl MappedWindow {
    pub(crate) fn from_parts(parts: WindowParts) -> Self {
        Self {
            state: parts.state,
            protection: parts.protection,
            placement: parts.placement,
            segment: parts.segment,
            mode: parts.mode,
            mapper_id: parts.mapper_id,
            sequence: parts.sequence,
        }
    }

    /// Base address of the window.
    ///
    /// Stays readable after unmap so callers can report it, but the range is
    /// no longer backed by this window.
    pub fn base_address(&self) -> usize {
        self.state.base
    }

    /// Length of the window in bytes.
    pub fn len(&self) -> usize {
        self.state.len
    }

    /// Returns true if the window has zero length.
    pub fn is_empty(&self) -> bool {
        self.state.len == 0
    }

    /// Address one past the last byte of the window.
    pub fn end_address(&self) -> usize {
        self.state.end()
    }

    /// Page protection of the window.
    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// Placement the window was mapped with.
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Name of the segment the window maps.
    pub fn segment_name(&self) -> &str {
        &self.segment
    }

    /// Access mode of the handle the window was mapped from.
    pub fn source_mode(&self) -> AccessMode {
        self.mode
    }

    /// Current lifecycle state.
    pub fn status(&self) -> WindowStatus {
        self.state.status.get()
    }

    /// Is the window still backed by its mapping?
    pub fn is_mapped(&self) -> bool {
        self.state.is_mapped()
    }

    pub(crate) fn mapper_id(&self) -> u64 {
        self.mapper_id
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Release the window's address range.
    ///
    /// # Errors
    ///
    /// [`Error::UseAfterUnmap`] if the window was already unmapped or
    /// displaced.
    pub fn unmap(&mut self) -> Result<()> {
        self.ensure_mapped()?;
        // Mark first: the range is gone whether or not munmap reports an error.
        self.state.status.set(WindowStatus::Unmapped);
        // SAFETY: the status was Mapped, so the range is still this window's
        // mapping, and it is marked Unmapped before any later access.
        unsafe {
            rustix::mm::munmap(self.state.base as *mut _, self.state.len)
                .map_err(|e| Error::system("munmap", e))?;
        }
        tracing::debug!(
            segment = %self.segment,
            base = format_args!("{:#x}", self.state.base),
            len = self.state.len,
            "unmapped window"
        );
        Ok(())
    }

    pub(crate) fn ensure_mapped(&self) -> Result<()> {
        if self.state.is_mapped() {
            Ok(())
        } else {
            Err(Error::UseAfterUnmap {
                base: self.state.base,
            })
        }
    }

    /// Copy `dst.len()` bytes starting at `offset` out of the window.
    ///
    /// Bounds must already be checked by the caller.
    pub(crate) fn copy_out(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.ensure_mapped()?;
        debug_assert!(offset + dst.len() <= self.state.len);
        // SAFETY: the window is mapped, readable, and [offset, offset+len)
        // lies inside it. The destination is a Rust buffer and cannot
        // overlap the shared mapping.
        unsafe {
            let src = (self.state.base as *const u8).add(offset);
            std::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    /// Copy `src` into the window at `offset`.
    ///
    /// Bounds must already be checked by the caller.
    pub(crate) fn copy_in(&self, offset: usize, src: &[u8]) -> Result<()> {
        self.ensure_mapped()?;
        if !self.protection.is_writable() {
            return Err(Error::ProtectionViolation(format!(
                "window at {:#x} onto `{}` is read-only",
                self.state.base, self.segment
            )));
        }
        debug_assert!(offset + src.len() <= self.state.len);
        // SAFETY: the window is mapped read-write and [offset, offset+len)
        // lies inside it. `src` is a Rust buffer; a caller passing bytes
        // read from the same mapping still gets a valid copy because they
        // were copied out first.
        unsafe {
            let dst = (self.state.base as *mut u8).add(offset);
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
        }
        Ok(())
    }

    /// Set `len` bytes at `offset` to `byte`.
    ///
    /// Bounds must already be checked by the caller.
    pub(crate) fn fill_bytes(&self, offset: usize, len: usize, byte: u8) -> Result<()> {
        self.ensure_mapped()?;
        if !self.protection.is_writable() {
            return Err(Error::ProtectionViolation(format!(
                "window at {:#x} onto `{}` is read-only",
                self.state.base, self.segment
            )));
        }
        debug_assert!(offset + len <= self.state.len);
        // SAFETY: as in `copy_in`.
        unsafe {
            std::ptr::write_bytes((self.state.base as *mut u8).add(offset), byte, len);
        }
        Ok(())
    }
}

impl Drop for MappedWindow {
    fn drop(&mut self) {
        if self.state.is_mapped() {
            self.state.status.set(WindowStatus::Unmapped);
            // SAFETY: still Mapped, and this is the last handle on the state
            // that can reach the range.
            unsafe {
                let _ = rustix::mm::munmap(self.state.base as *mut _, self.state.len);
            }
        }
    }
}

impl fmt::Debug for MappedWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedWindow")
            .field("segment", &self.segment)
            .field("base", &format_args!("{:#x}", self.state.base))
            .field("len", &self.state.len)
            .field("protection", &self.protection)
            .field("status", &self.state.status.get())
            .finish()
    }
}
