//! Bounded reads and writes against windows and composite views.
//!
//! Every access is checked against the region it targets before a single
//! byte moves. Requests that reach past the end fail with
//! [`Error::OutOfRange`]; nothing is clamped, and nothing spills into the
//! next page or the next window.

use super::MappedWindow;
use crate::error::{Error, Result};

/// A byte range backed by one or more mapped windows.
pub trait MappedRegion {
    /// Length of the region in bytes.
    fn len(&self) -> usize;

    /// Returns true if the region has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `dst` with the bytes at `offset..offset + dst.len()`.
    fn read_into(&self, offset: usize, dst: &mut [u8]) -> Result<()>;

    /// Write `src` at `offset`.
    fn write_from(&self, offset: usize, src: &[u8]) -> Result<()>;

    /// Set `len` bytes at `offset` to `byte`.
    fn fill(&self, offset: usize, len: usize, byte: u8) -> Result<()>;

    /// Read `len` bytes at `offset` into a new buffer.
    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        check_bounds(offset, len, self.len())?;
        let mut buf = vec![0u8; len];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }
}

/// Fail unless `offset..offset + len` fits in `limit` bytes.
#[inline]
pub fn check_bounds(offset: usize, len: usize, limit: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= limit => Ok(()),
        _ => Err(Error::out_of_range(offset, len, limit)),
    }
}

impl MappedRegion for MappedWindow {
    fn len(&self) -> usize {
        MappedWindow::len(self)
    }

    fn read_into(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.ensure_mapped()?;
        check_bounds(offset, dst.len(), MappedWindow::len(self))?;
        self.copy_out(offset, dst)
    }

    fn write_from(&self, offset: usize, src: &[u8]) -> Result<()> {
        self.ensure_mapped()?;
        check_bounds(offset, src.len(), MappedWindow::len(self))?;
        self.copy_in(offset, src)
    }

    fn fill(&self, offset: usize, len: usize, byte: u8) -> Result<()> {
        self.ensure_mapped()?;
        check_bounds(offset, len, MappedWindow::len(self))?;
        self.fill_bytes(offset, len, byte)
    }
}

/// Copy `length` bytes at `offset` of `region` into the front of `destination`.
///
/// # Errors
///
/// [`Error::OutOfRange`] if the request exceeds the region or `destination`
/// is shorter than `length`.
pub fn copy_into<R: MappedRegion + ?Sized>(
    destination: &mut [u8],
    region: &R,
    offset: usize,
    length: usize,
) -> Result<()> {
    check_bounds(0, length, destination.len())?;
    check_bounds(offset, length, region.len())?;
    region.read_into(offset, &mut destination[..length])
}

/// Write the bytes of `text` at `offset`. No terminator is appended.
///
/// # Errors
///
/// [`Error::OutOfRange`] if `offset + text.len()` exceeds the window. The
/// window is left untouched in that case.
pub fn write_string(window: &MappedWindow, offset: usize, text: &str) -> Result<()> {
    window.write_from(offset, text.as_bytes())
}

/// Write `text` followed by a NUL byte at `offset`.
///
/// The terminator counts against the window bound.
pub fn write_cstring(window: &MappedWindow, offset: usize, text: &str) -> Result<()> {
    check_bounds(offset, text.len() + 1, window.len())?;
    window.write_from(offset, text.as_bytes())?;
    window.write_from(offset + text.len(), &[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::handle::tests::unique_name;
    use crate::memory::{
        AccessMode, Placement, Protection, SegmentHandle, WindowMapper, page_size,
    };

    struct Fixture {
        name: String,
        _handle: SegmentHandle,
        mapper: WindowMapper,
    }

    impl Fixture {
        fn new(tag: &str) -> (Self, MappedWindow) {
            let name = unique_name(tag);
            let handle = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();
            handle.set_length(page_size()).unwrap();
            let mapper = WindowMapper::new();
            let window = mapper
                .map(&handle, page_size(), Protection::ReadWrite, Placement::Anywhere)
                .unwrap();
            (
                Self {
                    name,
                    _handle: handle,
                    mapper,
                },
                window,
            )
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = SegmentHandle::unlink(&self.name);
        }
    }

    #[test]
    fn test_check_bounds() {
        assert!(check_bounds(0, 10, 10).is_ok());
        assert!(check_bounds(10, 0, 10).is_ok());
        assert!(check_bounds(5, 6, 10).is_err());
        assert!(check_bounds(usize::MAX, 2, 10).is_err());
    }

    #[test]
    fn test_write_string_then_read() {
        let (_fx, window) = Fixture::new("wstr");
        write_string(&window, 0, "hello world").unwrap();
        assert_eq!(window.read(0, 11).unwrap(), b"hello world");
    }

    #[test]
    fn test_write_string_one_past_end_fails_untouched() {
        let (_fx, window) = Fixture::new("past-end");
        let page = page_size();
        let text = "this is longer than 10 char";
        window.fill(0, page, 0xAA).unwrap();

        let offset = page - (text.len() - 1);
        let err = write_string(&window, offset, text).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }), "{err}");
        assert!(window.read(0, page).unwrap().iter().all(|&b| b == 0xAA));

        // The scenario of writing 28 bytes into the last 10 bytes of a page
        let err = write_cstring(&window, page - 10, text).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));

        // Exactly fitting is fine
        write_string(&window, page - text.len(), text).unwrap();
        assert_eq!(window.read(page - text.len(), text.len()).unwrap(), text.as_bytes());
    }

    #[test]
    fn test_write_cstring_terminates() {
        let (_fx, window) = Fixture::new("cstr");
        window.fill(0, 8, 0xFF).unwrap();
        write_cstring(&window, 0, "abc").unwrap();
        assert_eq!(window.read(0, 5).unwrap(), b"abc\0\xFF");
    }

    #[test]
    fn test_copy_into_never_clamps() {
        let (_fx, window) = Fixture::new("copy");
        let page = page_size();
        write_string(&window, 0, "hello world").unwrap();

        let mut buf = [0u8; 10];
        copy_into(&mut buf, &window, 0, 10).unwrap();
        assert_eq!(&buf, b"hello worl");

        let mut big = vec![0u8; page + 1];
        let err = copy_into(&mut big, &window, 0, page + 1).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));

        let err = copy_into(&mut buf, &window, 0, 11).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { limit: 10, .. }));
    }

    #[test]
    fn test_readonly_window_refuses_writes() {
        let (fx, _rw) = Fixture::new("ro-write");
        let reader = SegmentHandle::open(&fx.name, AccessMode::ReadOnly).unwrap();
        let ro = fx
            .mapper
            .map(&reader, page_size(), Protection::ReadOnly, Placement::Anywhere)
            .unwrap();
        let err = write_string(&ro, 0, "nope").unwrap_err();
        assert!(matches!(err, Error::ProtectionViolation(_)), "{err}");
    }

    #[test]
    fn test_access_after_unmap_fails() {
        let (_fx, mut window) = Fixture::new("uau");
        window.unmap().unwrap();

        let mut buf = [0u8; 4];
        assert!(window.read_into(0, &mut buf).unwrap_err().is_use_after_unmap());
        assert!(write_string(&window, 0, "x").unwrap_err().is_use_after_unmap());
        assert!(copy_into(&mut buf, &window, 0, 4).unwrap_err().is_use_after_unmap());
        assert!(window.unmap().unwrap_err().is_use_after_unmap());
    }
}
