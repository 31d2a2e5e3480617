//! Composite views over two adjacent windows.
//!
//! A [`CompositeView`] treats two windows whose address ranges touch as one
//! buffer. Accesses may straddle the boundary; each piece is routed to the
//! window that owns it. The view borrows both windows, so neither can be
//! unmapped while it exists, and a window displaced by a later fixed mapping
//! is caught on the next access.

use super::access::{MappedRegion, check_bounds};
use super::{MappedWindow, Placement};
use crate::error::{Error, Result};

/// Two commanded-adjacent windows addressed as one range.
#[derive(Debug, Clone, Copy)]
pub struct CompositeView<'a> {
    first: &'a MappedWindow,
    second: &'a MappedWindow,
}

/// Part of a composite access that falls inside one window.
struct Piece<'a> {
    window: &'a MappedWindow,
    /// Offset inside the window.
    local: usize,
    /// Offset inside the caller's buffer.
    start: usize,
    len: usize,
}

impl<'a> CompositeView<'a> {
    /// Pair `first` with `second`, which must have been mapped by the same
    /// mapper, after `first`, with `Placement::FixedAt(first.end_address())`.
    ///
    /// # Errors
    ///
    /// [`Error::UseAfterUnmap`] if either window is gone;
    /// [`Error::NotAdjacent`] if the pair was not placed back to back.
    pub fn compose(first: &'a MappedWindow, second: &'a MappedWindow) -> Result<Self> {
        first.ensure_mapped()?;
        second.ensure_mapped()?;

        if first.mapper_id() != second.mapper_id() {
            return Err(Error::NotAdjacent(
                "windows come from different mappers".into(),
            ));
        }
        if second.sequence() <= first.sequence() {
            return Err(Error::NotAdjacent(
                "second window was mapped before the first".into(),
            ));
        }
        let expected = first.end_address();
        if second.placement() != Placement::FixedAt(expected) {
            return Err(Error::NotAdjacent(format!(
                "second window was not placed at {expected:#x} (placement {:?})",
                second.placement()
            )));
        }
        if second.base_address() != expected {
            return Err(Error::NotAdjacent(format!(
                "second window landed at {:#x}, expected {expected:#x}",
                second.base_address()
            )));
        }

        tracing::debug!(
            base = format_args!("{:#x}", first.base_address()),
            boundary = first.len(),
            len = first.len() + second.len(),
            "composed windows"
        );

        Ok(Self { first, second })
    }

    /// First window of the pair.
    pub fn first(&self) -> &'a MappedWindow {
        self.first
    }

    /// Second window of the pair.
    pub fn second(&self) -> &'a MappedWindow {
        self.second
    }

    /// Offset at which the second window starts.
    pub fn boundary(&self) -> usize {
        self.first.len()
    }

    /// Base address of the whole view.
    pub fn base_address(&self) -> usize {
        self.first.base_address()
    }

    /// Read `length` bytes at `offset`.
    pub fn read(&self, offset: usize, length: usize) -> Result<Vec<u8>> {
        MappedRegion::read(self, offset, length)
    }

    /// Write `bytes` at `offset`.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.write_from(offset, bytes)
    }

    fn ensure_mapped(&self) -> Result<()> {
        self.first.ensure_mapped()?;
        self.second.ensure_mapped()
    }

    /// Split `offset..offset + len` across the two windows.
    fn pieces(&self, offset: usize, len: usize) -> impl Iterator<Item = Piece<'a>> {
        let boundary = self.boundary();
        let end = offset + len;

        let head = (offset < boundary).then(|| Piece {
            window: self.first,
            local: offset,
            start: 0,
            len: end.min(boundary) - offset,
        });
        let tail = (end > boundary).then(|| {
            let from = offset.max(boundary);
            Piece {
                window: self.second,
                local: from - boundary,
                start: from - offset,
                len: end - from,
            }
        });

        head.into_iter().chain(tail).filter(|p| p.len > 0)
    }

    fn check_writable(&self, offset: usize, len: usize) -> Result<()> {
        for piece in self.pieces(offset, len) {
            if !piece.window.protection().is_writable() {
                return Err(Error::ProtectionViolation(format!(
                    "composite bytes {}..{} fall in read-only window at {:#x}",
                    offset + piece.start,
                    offset + piece.start + piece.len,
                    piece.window.base_address()
                )));
            }
        }
        Ok(())
    }
}

impl MappedRegion for CompositeView<'_> {
    fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    fn read_into(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.ensure_mapped()?;
        check_bounds(offset, dst.len(), MappedRegion::len(self))?;
        for piece in self.pieces(offset, dst.len()) {
            piece
                .window
                .copy_out(piece.local, &mut dst[piece.start..piece.start + piece.len])?;
        }
        Ok(())
    }

    fn write_from(&self, offset: usize, src: &[u8]) -> Result<()> {
        self.ensure_mapped()?;
        check_bounds(offset, src.len(), MappedRegion::len(self))?;
        self.check_writable(offset, src.len())?;
        for piece in self.pieces(offset, src.len()) {
            piece
                .window
                .copy_in(piece.local, &src[piece.start..piece.start + piece.len])?;
        }
        Ok(())
    }

    fn fill(&self, offset: usize, len: usize, byte: u8) -> Result<()> {
        self.ensure_mapped()?;
        check_bounds(offset, len, MappedRegion::len(self))?;
        self.check_writable(offset, len)?;
        for piece in self.pieces(offset, len) {
            piece.window.fill_bytes(piece.local, piece.len, byte)?;
        }
        Ok(())
    }
}
