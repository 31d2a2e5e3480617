//! Error types for shm-compose.

use thiserror::Error;

/// Result type alias using shm-compose's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for segment, window and view operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The named segment does not exist and the access mode does not create it.
    #[error("shared memory segment `{name}` not found")]
    NotFound {
        /// Segment name.
        name: String,
    },

    /// The OS refused the requested access mode.
    #[error("permission denied opening `{name}`: {source}")]
    PermissionDenied {
        /// Segment name.
        name: String,
        /// Underlying errno.
        source: rustix::io::Errno,
    },

    /// The segment name is not a valid POSIX shared memory name.
    #[error("invalid shared memory name `{name}`: {reason}")]
    InvalidName {
        /// Offending name.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A length is zero, not page aligned, or would shrink a segment.
    #[error("invalid length {len}: {reason}")]
    InvalidLength {
        /// Requested length in bytes.
        len: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// Sizing was requested on a handle that cannot create/resize.
    #[error("cannot size `{name}`: handle opened {mode}")]
    SizingUnsupported {
        /// Segment name.
        name: String,
        /// Access mode the handle was opened with.
        mode: crate::memory::AccessMode,
    },

    /// A fixed placement could not be honoured.
    #[error("cannot place window at {address:#x}: {reason}")]
    PlacementConflict {
        /// Requested base address.
        address: usize,
        /// Why the placement was refused.
        reason: String,
    },

    /// Mapping failed for a reason other than placement.
    #[error("mapping `{name}` failed: {reason}")]
    MapFailed {
        /// Segment name.
        name: String,
        /// Failure description.
        reason: String,
        /// Underlying errno, when the OS rejected the call.
        #[source]
        source: Option<rustix::io::Errno>,
    },

    /// Two windows are not a commanded adjacent pair.
    #[error("windows are not adjacent: {0}")]
    NotAdjacent(String),

    /// An access reaches outside its region or destination buffer.
    #[error("access of {len} bytes at offset {offset} exceeds {limit} bytes")]
    OutOfRange {
        /// Start offset of the access.
        offset: usize,
        /// Length of the access.
        len: usize,
        /// Length of the region (or buffer) being accessed.
        limit: usize,
    },

    /// A write targets read-only memory, or a mapping asks for more than its handle allows.
    #[error("protection violation: {0}")]
    ProtectionViolation(String),

    /// A window was used after it was unmapped or displaced.
    #[error("window at {base:#x} used after unmap")]
    UseAfterUnmap {
        /// Base address the window had while mapped.
        base: usize,
    },

    /// System call error (via rustix).
    #[error("{op} failed: {source}")]
    System {
        /// Name of the failing system call.
        op: &'static str,
        /// Underlying errno.
        source: rustix::io::Errno,
    },
}

impl Error {
    pub(crate) fn system(op: &'static str, source: rustix::io::Errno) -> Self {
        Error::System { op, source }
    }

    pub(crate) fn out_of_range(offset: usize, len: usize, limit: usize) -> Self {
        Error::OutOfRange { offset, len, limit }
    }

    /// Returns true for the use-after-unmap hazard class.
    pub fn is_use_after_unmap(&self) -> bool {
        matches!(self, Error::UseAfterUnmap { .. })
    }
}
