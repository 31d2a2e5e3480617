//! Named POSIX shared memory handles.
//!
//! A [`SegmentHandle`] is one `shm_open` descriptor on a named segment. Many
//! handles may be live on the same name at once, each with its own
//! [`AccessMode`]; the mode only matters when a window is mapped from it.
//!
//! # Example
//!
//! ```rust,ignore
//! use shm_compose::memory::{AccessMode, SegmentHandle};
//!
//! let writer = SegmentHandle::open("/demo.shm", AccessMode::ReadWriteCreate)?;
//! writer.set_length(4096)?;
//!
//! let reader = SegmentHandle::open("/demo.shm", AccessMode::ReadOnly)?;
//! assert_eq!(reader.len()?, 4096);
//!
//! reader.close()?;
//! writer.close()?;
//! SegmentHandle::unlink("/demo.shm")?;
//! ```

use super::AccessMode;
use crate::error::{Error, Result};
use rustix::fd::{AsFd, BorrowedFd, OwnedFd};
use rustix::fs::Mode;
use rustix::io::Errno;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Longest name accepted by `shm_open` on Linux (NAME_MAX).
const MAX_NAME_LEN: usize = 255;

/// Segments that have had a window mapped in this process, by name.
///
/// A name leaves the set when it is unlinked through [`SegmentHandle::unlink`].
static MAPPED_SEGMENTS: Mutex<BTreeSet<String>> = Mutex::new(BTreeSet::new());

fn mapped_segments() -> MutexGuard<'static, BTreeSet<String>> {
    MAPPED_SEGMENTS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An open descriptor on a named shared memory segment.
pub struct SegmentHandle {
    fd: OwnedFd,
    name: String,
    mode: AccessMode,
}

impl SegmentHandle {
    /// Open (or create) the segment `name` with `mode`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidName`] if `name` is not of the form `/something`.
    /// - [`Error::NotFound`] if the segment is absent and `mode` does not create.
    /// - [`Error::PermissionDenied`] if the OS refuses `mode`.
    pub fn open(name: &str, mode: AccessMode) -> Result<Self> {
        validate_name(name)?;

        let fd = rustix::shm::open(name, mode.oflags(), Mode::from_raw_mode(0o666)).map_err(
            |errno| match errno {
                Errno::NOENT => Error::NotFound {
                    name: name.to_string(),
                },
                Errno::ACCESS | Errno::PERM => Error::PermissionDenied {
                    name: name.to_string(),
                    source: errno,
                },
                other => Error::system("shm_open", other),
            },
        )?;

        tracing::debug!(segment = name, %mode, "opened shared memory handle");

        Ok(Self {
            fd,
            name: name.to_string(),
            mode,
        })
    }

    /// Release the descriptor.
    ///
    /// The segment's contents and name are left alone; windows mapped from
    /// this handle stay valid.
    pub fn close(self) -> Result<()> {
        tracing::debug!(segment = %self.name, "closing shared memory handle");
        drop(self.fd);
        Ok(())
    }

    /// Remove `name` from the shared memory namespace.
    ///
    /// Existing handles and windows keep the memory alive until released.
    pub fn unlink(name: &str) -> Result<()> {
        validate_name(name)?;
        rustix::shm::unlink(name).map_err(|errno| match errno {
            Errno::NOENT => Error::NotFound {
                name: name.to_string(),
            },
            other => Error::system("shm_unlink", other),
        })?;
        mapped_segments().remove(name);
        tracing::debug!(segment = name, "unlinked shared memory segment");
        Ok(())
    }

    /// Current byte length of the segment, as seen by this handle.
    pub fn len(&self) -> Result<usize> {
        let stat = rustix::fs::fstat(&self.fd).map_err(|e| Error::system("fstat", e))?;
        Ok(stat.st_size as usize)
    }

    /// Has the segment not been sized yet?
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Segment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access mode this handle was opened with.
    pub fn access_mode(&self) -> AccessMode {
        self.mode
    }

    /// Has a window been mapped from this segment, through any handle?
    pub fn has_mapped(&self) -> bool {
        mapped_segments().contains(&self.name)
    }

    pub(crate) fn mark_mapped(&self) {
        mapped_segments().insert(self.name.clone());
    }
}

impl AsFd for SegmentHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl fmt::Debug for SegmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentHandle")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(Error::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if !name.starts_with('/') {
        return invalid("must start with '/'");
    }
    if name.len() < 2 {
        return invalid("must not be empty after '/'");
    }
    if name.len() > MAX_NAME_LEN {
        return invalid("longer than 255 bytes");
    }
    if name[1..].contains('/') {
        return invalid("must not contain '/' after the first byte");
    }
    if name.contains('\0') {
        return invalid("must not contain NUL");
    }
    Ok(())
}
