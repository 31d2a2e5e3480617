//! Segment sizing.
//!
//! A segment must have a definite, page-aligned length before it is mapped.
//! Sizing only ever grows a segment, and once any window has been mapped
//! from a segment its length is frozen for every handle on that name.

use super::{SegmentHandle, is_page_aligned, page_size};
use crate::error::{Error, Result};

impl SegmentHandle {
    /// Set the segment length to `bytes`.
    ///
    /// Calling this again with the current length is a no-op and leaves the
    /// contents untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::SizingUnsupported`] unless the handle was opened with
    ///   [`AccessMode::ReadWriteCreate`](super::AccessMode::ReadWriteCreate).
    /// - [`Error::InvalidLength`] if `bytes` is zero, not a multiple of the
    ///   page size, smaller than the current length, or a window has already
    ///   been mapped from the segment.
    pub fn set_length(&self, bytes: usize) -> Result<()> {
        if !self.access_mode().can_size() {
            return Err(Error::SizingUnsupported {
                name: self.name().to_string(),
                mode: self.access_mode(),
            });
        }
        validate_length(bytes)?;

        let current = self.len()?;
        if current == bytes {
            return Ok(());
        }
        if bytes < current {
            return Err(Error::InvalidLength {
                len: bytes,
                reason: format!("segment is already {current} bytes and never shrinks"),
            });
        }
        if self.has_mapped() {
            return Err(Error::InvalidLength {
                len: bytes,
                reason: "length is fixed once the segment has been mapped".into(),
            });
        }

        rustix::fs::ftruncate(self, bytes as u64).map_err(|e| Error::system("ftruncate", e))?;
        tracing::debug!(segment = self.name(), from = current, to = bytes, "sized segment");
        Ok(())
    }
}

/// Check that `bytes` is usable as a segment length.
pub fn validate_length(bytes: usize) -> Result<()> {
    if bytes == 0 {
        return Err(Error::InvalidLength {
            len: bytes,
            reason: "length must be greater than 0".into(),
        });
    }
    if !is_page_aligned(bytes) {
        return Err(Error::InvalidLength {
            len: bytes,
            reason: format!("length must be a multiple of the page size ({})", page_size()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AccessMode;
    use crate::memory::handle::tests::unique_name;

    #[test]
    fn test_set_length_visible_to_other_handles() {
        let name = unique_name("size");
        let page = page_size();
        let writer = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();
        let reader = SegmentHandle::open(&name, AccessMode::ReadOnly).unwrap();

        writer.set_length(2 * page).unwrap();
        assert_eq!(reader.len().unwrap(), 2 * page);

        SegmentHandle::unlink(&name).unwrap();
    }

    #[test]
    fn test_set_length_idempotent() {
        let name = unique_name("idem");
        let page = page_size();
        let handle = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();
        handle.set_length(page).unwrap();
        handle.set_length(page).unwrap();
        assert_eq!(handle.len().unwrap(), page);
        SegmentHandle::unlink(&name).unwrap();
    }

    #[test]
    fn test_invalid_lengths() {
        let name = unique_name("badlen");
        let page = page_size();
        let handle = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();

        for bytes in [0, 1, page + 1] {
            let err = handle.set_length(bytes).unwrap_err();
            assert!(matches!(err, Error::InvalidLength { .. }), "{bytes}: {err}");
        }

        handle.set_length(2 * page).unwrap();
        let err = handle.set_length(page).unwrap_err();
        assert!(matches!(err, Error::InvalidLength { .. }));
        assert_eq!(handle.len().unwrap(), 2 * page);

        SegmentHandle::unlink(&name).unwrap();
    }

    #[test]
    fn test_length_frozen_for_every_handle_after_mapping() {
        use crate::memory::{Placement, Protection, WindowMapper};

        let name = unique_name("frozen");
        let page = page_size();
        let first = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();
        first.set_length(page).unwrap();
        let second = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();
        assert!(!second.has_mapped());

        let mapper = WindowMapper::new();
        let _window = mapper
            .map(&first, page, Protection::ReadWrite, Placement::Anywhere)
            .unwrap();
        assert!(second.has_mapped());

        for handle in [&first, &second] {
            let err = handle.set_length(2 * page).unwrap_err();
            assert!(matches!(err, Error::InvalidLength { .. }), "{err}");
            // The current length is still accepted
            handle.set_length(page).unwrap();
        }
        let late = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();
        assert!(late.set_length(2 * page).is_err());
        assert_eq!(late.len().unwrap(), page);

        SegmentHandle::unlink(&name).unwrap();
    }

    #[test]
    fn test_unlink_clears_frozen_length() {
        use crate::memory::{Placement, Protection, WindowMapper};

        let name = unique_name("refrozen");
        let page = page_size();
        let handle = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();
        handle.set_length(page).unwrap();
        drop(
            WindowMapper::new()
                .map(&handle, page, Protection::ReadWrite, Placement::Anywhere)
                .unwrap(),
        );
        handle.close().unwrap();
        SegmentHandle::unlink(&name).unwrap();

        // A new segment under the same name starts unmapped
        let fresh = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();
        assert!(!fresh.has_mapped());
        fresh.set_length(2 * page).unwrap();
        SegmentHandle::unlink(&name).unwrap();
    }

    #[test]
    fn test_sizing_unsupported_without_create() {
        let name = unique_name("nosize");
        let page = page_size();
        let creator = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();
        creator.set_length(page).unwrap();

        for mode in [AccessMode::ReadOnly, AccessMode::ReadWriteExisting] {
            let handle = SegmentHandle::open(&name, mode).unwrap();
            let err = handle.set_length(2 * page).unwrap_err();
            assert!(matches!(err, Error::SizingUnsupported { .. }), "{err}");
        }
        assert_eq!(creator.len().unwrap(), page);

        SegmentHandle::unlink(&name).unwrap();
    }
}
