//! Segment access modes, window protections and placements.

use rustix::mm::ProtFlags;
use std::fmt;

/// How a named segment is opened.
///
/// Access modes are enforced when a window is mapped, not when the handle
/// is opened: a read-only handle opens fine but refuses read-write windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Open read-write, creating the segment if it does not exist.
    ///
    /// Opening an existing segment in this mode never truncates it.
    ReadWriteCreate,
    /// Open an existing segment read-only.
    ReadOnly,
    /// Open an existing segment read-write.
    ReadWriteExisting,
}

impl AccessMode {
    /// Can windows from this handle be written?
    #[inline]
    pub fn is_writable(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }

    /// Can this handle create and size its segment?
    #[inline]
    pub fn can_size(self) -> bool {
        matches!(self, AccessMode::ReadWriteCreate)
    }

    /// Does `protection` stay within what this mode grants?
    #[inline]
    pub fn permits(self, protection: Protection) -> bool {
        match protection {
            Protection::ReadOnly => true,
            Protection::ReadWrite => self.is_writable(),
        }
    }

    pub(crate) fn oflags(self) -> rustix::shm::OFlags {
        use rustix::shm::OFlags;
        match self {
            AccessMode::ReadWriteCreate => OFlags::RDWR | OFlags::CREATE,
            AccessMode::ReadOnly => OFlags::RDONLY,
            AccessMode::ReadWriteExisting => OFlags::RDWR,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessMode::ReadWriteCreate => "read-write-create",
            AccessMode::ReadOnly => "read-only",
            AccessMode::ReadWriteExisting => "read-write-existing",
        };
        f.write_str(s)
    }
}

/// Page protection of a mapped window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protection {
    /// Reads only; writes through the window are refused.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

impl Protection {
    /// Is writing allowed?
    #[inline]
    pub fn is_writable(self) -> bool {
        matches!(self, Protection::ReadWrite)
    }

    pub(crate) fn prot_flags(self) -> ProtFlags {
        match self {
            Protection::ReadOnly => ProtFlags::READ,
            Protection::ReadWrite => ProtFlags::READ | ProtFlags::WRITE,
        }
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protection::ReadOnly => f.write_str("read-only"),
            Protection::ReadWrite => f.write_str("read-write"),
        }
    }
}

/// Where a window is placed in the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// Let the OS choose the base address.
    Anywhere,
    /// Place the window at exactly this address.
    ///
    /// To attach window B right after window A, map B with
    /// `FixedAt(a.base_address() + a.len())`. Adjacency is never inferred.
    FixedAt(usize),
}

impl Placement {
    /// Fixed placement right after a window of `len` bytes at `base`.
    ///
    /// Saturates at the top of the address space, which the mapper then
    /// rejects as a wrapping range.
    #[inline]
    pub fn after(base: usize, len: usize) -> Self {
        Placement::FixedAt(base.saturating_add(len))
    }
}

/// System page size in bytes.
#[inline]
pub fn page_size() -> usize {
    rustix::param::page_size()
}

/// Round `bytes` up to the next page boundary.
#[inline]
pub fn round_to_page(bytes: usize) -> usize {
    let page = page_size();
    bytes.div_ceil(page) * page
}

/// Is `value` a multiple of the page size?
#[inline]
pub fn is_page_aligned(value: usize) -> bool {
    value % page_size() == 0
}
