//! Window mapper: places segment windows in the address space.
//!
//! The mapper is the only place that performs fixed-address mapping. Every
//! mapper on a thread shares one registry of the address ranges mapped
//! through this crate (live windows and reservations), so a `FixedAt`
//! placement can replace a window this process handed out earlier, but
//! never memory that belongs to anyone else.
//!
//! # Composing adjacent windows
//!
//! ```rust,ignore
//! use shm_compose::memory::{Placement, Protection, WindowMapper};
//!
//! let mapper = WindowMapper::new();
//! let room = mapper.reserve(2 * page)?;
//!
//! let first = mapper.map(&a, page, Protection::ReadWrite, room.placement_at(0))?;
//! let second = mapper.map(
//!     &b,
//!     page,
//!     Protection::ReadWrite,
//!     Placement::after(first.base_address(), first.len()),
//! )?;
//! assert_eq!(second.base_address(), first.end_address());
//! ```

use super::window::{MappedWindow, WindowParts, WindowState, WindowStatus};
use super::{Placement, Protection, SegmentHandle, is_page_aligned, sizing::validate_length};
use crate::error::{Error, Result};
use rustix::io::Errno;
use rustix::mm::{MapFlags, ProtFlags};
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::ops::Range;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MAPPER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

/// An inaccessible address range reserved by a [`WindowMapper`].
///
/// Fixed mappings may land anywhere inside a reservation. Whatever part is
/// still reserved when the mapper is dropped is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    base: usize,
    len: usize,
}

impl Reservation {
    /// First address of the reservation.
    pub fn base_address(&self) -> usize {
        self.base
    }

    /// Reserved length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is reserved.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed placement `offset` bytes into the reservation.
    ///
    /// Saturates at the top of the address space, which the mapper then
    /// rejects as a wrapping range.
    pub fn placement_at(&self, offset: usize) -> Placement {
        Placement::FixedAt(self.base.saturating_add(offset))
    }
}

struct Reserved {
    mapper: u64,
    range: Range<usize>,
}

#[derive(Default)]
struct Registry {
    windows: Vec<Weak<WindowState>>,
    reserved: Vec<Reserved>,
}

impl Registry {
    fn live_windows(&self) -> impl Iterator<Item = Rc<WindowState>> + '_ {
        self.windows
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|w| w.is_mapped())
    }

    /// Is every byte of `range` inside a live window or a reservation?
    fn owns(&self, range: &Range<usize>) -> bool {
        let mut owned: Vec<Range<usize>> = self
            .reserved
            .iter()
            .map(|r| r.range.clone())
            .chain(self.live_windows().map(|w| w.base..w.end()))
            .filter(|r| overlaps(r, range))
            .collect();
        owned.sort_by_key(|r| r.start);

        let mut cursor = range.start;
        for r in owned {
            if r.start > cursor {
                return false;
            }
            cursor = cursor.max(r.end);
            if cursor >= range.end {
                return true;
            }
        }
        cursor >= range.end
    }

    /// Forget `range` after a fixed mapping replaced it.
    fn evict(&mut self, range: &Range<usize>) {
        let mut kept = Vec::with_capacity(self.reserved.len() + 1);
        for Reserved { mapper, range: r } in self.reserved.drain(..) {
            if !overlaps(&r, range) {
                kept.push(Reserved { mapper, range: r });
                continue;
            }
            if r.start < range.start {
                kept.push(Reserved {
                    mapper,
                    range: r.start..range.start,
                });
            }
            if r.end > range.end {
                kept.push(Reserved {
                    mapper,
                    range: range.end..r.end,
                });
            }
        }
        self.reserved = kept;

        for window in self.live_windows().collect::<Vec<_>>() {
            let span = window.base..window.end();
            if !overlaps(&span, range) {
                continue;
            }
            window.status.set(WindowStatus::Displaced);
            // Release the parts of the old window the new mapping did not cover.
            for rest in [span.start..range.start, range.end..span.end] {
                if rest.start < rest.end {
                    // SAFETY: `rest` lies inside the displaced window's own
                    // mapping and outside the new one. The window is marked
                    // Displaced first, so nothing reads or writes it again.
                    unsafe {
                        let _ = rustix::mm::munmap(rest.start as *mut _, rest.end - rest.start);
                    }
                }
            }
            tracing::warn!(
                base = format_args!("{:#x}", span.start),
                len = span.end - span.start,
                "window displaced by fixed mapping"
            );
        }

        self.windows.retain(|w| w.upgrade().is_some_and(|w| w.is_mapped()));
    }

    /// Take back every reservation `mapper` still holds.
    fn release(&mut self, mapper: u64) -> Vec<Range<usize>> {
        let (mine, others): (Vec<_>, Vec<_>) =
            self.reserved.drain(..).partition(|r| r.mapper == mapper);
        self.reserved = others;
        mine.into_iter().map(|r| r.range).collect()
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Maps segment handles into windows.
///
/// Mappers on the same thread share their ownership registry; the mapper id
/// and map sequence only order windows for composition.
pub struct WindowMapper {
    id: u64,
    sequence: Cell<u64>,
    /// The registry is thread-local, so a mapper stays on its thread.
    _local: PhantomData<Rc<()>>,
}

impl WindowMapper {
    /// Create a mapper.
    pub fn new() -> Self {
        Self {
            id: NEXT_MAPPER_ID.fetch_add(1, Ordering::Relaxed),
            sequence: Cell::new(0),
            _local: PhantomData,
        }
    }

    /// Unique id of this mapper.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bytes this mapper reserved that are not yet covered by a window.
    pub fn reserved_bytes(&self) -> usize {
        REGISTRY.with_borrow(|registry| {
            registry
                .reserved
                .iter()
                .filter(|r| r.mapper == self.id)
                .map(|r| r.range.end - r.range.start)
                .sum()
        })
    }

    /// Reserve `len` bytes of inaccessible address space as a landing zone
    /// for fixed mappings.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidLength`] unless `len` is a positive multiple of the
    /// page size; [`Error::MapFailed`] if the OS refuses the reservation.
    pub fn reserve(&self, len: usize) -> Result<Reservation> {
        validate_length(len)?;

        // SAFETY: a null hint without MAP_FIXED lets the kernel pick a free
        // range, so no existing mapping is touched.
        let ptr = unsafe {
            rustix::mm::mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::empty(),
                MapFlags::PRIVATE | MapFlags::NORESERVE,
            )
        }
        .map_err(|e| Error::MapFailed {
            name: "<reservation>".into(),
            reason: format!("cannot reserve {len} bytes"),
            source: Some(e),
        })?;

        let base = ptr as usize;
        REGISTRY.with_borrow_mut(|registry| {
            registry.reserved.push(Reserved {
                mapper: self.id,
                range: base..base + len,
            })
        });
        tracing::debug!(base = format_args!("{:#x}", base), len, "reserved address range");

        Ok(Reservation { base, len })
    }

    /// Map `requested_length` bytes of `handle`'s segment.
    ///
    /// A `FixedAt` placement over windows or reservations made through this
    /// crate on the same thread replaces them; the windows it overlaps
    /// become [`WindowStatus::Displaced`].
    ///
    /// # Errors
    ///
    /// - [`Error::ProtectionViolation`] if `protection` exceeds the handle's
    ///   access mode. Nothing is mapped.
    /// - [`Error::InvalidLength`] if `requested_length` is zero.
    /// - [`Error::PlacementConflict`] if a fixed address is null, misaligned,
    ///   wraps the address space, or holds memory the crate did not map.
    /// - [`Error::MapFailed`] if the segment is shorter than
    ///   `requested_length` or the OS rejects the mapping.
    pub fn map(
        &self,
        handle: &SegmentHandle,
        requested_length: usize,
        protection: Protection,
        placement: Placement,
    ) -> Result<MappedWindow> {
        if !handle.access_mode().permits(protection) {
            return Err(Error::ProtectionViolation(format!(
                "{protection} window requested on {} handle for `{}`",
                handle.access_mode(),
                handle.name()
            )));
        }
        if requested_length == 0 {
            return Err(Error::InvalidLength {
                len: 0,
                reason: "window length must be greater than 0".into(),
            });
        }

        let segment_len = handle.len()?;
        if requested_length > segment_len {
            return Err(Error::MapFailed {
                name: handle.name().to_string(),
                reason: format!(
                    "segment too small: {segment_len} bytes, {requested_length} requested"
                ),
                source: None,
            });
        }

        let base = match placement {
            Placement::Anywhere => self.map_anywhere(handle, requested_length, protection)?,
            Placement::FixedAt(address) => {
                self.map_fixed(handle, address, requested_length, protection)?
            }
        };

        let state = Rc::new(WindowState {
            base,
            len: requested_length,
            status: Cell::new(WindowStatus::Mapped),
        });
        REGISTRY.with_borrow_mut(|registry| registry.windows.push(Rc::downgrade(&state)));
        handle.mark_mapped();

        let sequence = self.sequence.get() + 1;
        self.sequence.set(sequence);

        tracing::debug!(
            segment = handle.name(),
            base = format_args!("{:#x}", base),
            len = requested_length,
            %protection,
            ?placement,
            "mapped window"
        );

        Ok(MappedWindow::from_parts(WindowParts {
            state,
            protection,
            placement,
            segment: handle.name().to_string(),
            mode: handle.access_mode(),
            mapper_id: self.id,
            sequence,
        }))
    }

    fn map_anywhere(
        &self,
        handle: &SegmentHandle,
        len: usize,
        protection: Protection,
    ) -> Result<usize> {
        // SAFETY: the kernel chooses a free range; nothing is replaced.
        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                len,
                protection.prot_flags(),
                MapFlags::SHARED,
                handle,
                0,
            )
        }
        .map_err(|e| map_failed(handle, e))?;
        Ok(ptr as usize)
    }

    fn map_fixed(
        &self,
        handle: &SegmentHandle,
        address: usize,
        len: usize,
        protection: Protection,
    ) -> Result<usize> {
        if address == 0 {
            return Err(conflict(address, "address is null"));
        }
        let end = address
            .checked_add(len)
            .ok_or_else(|| conflict(address, "range wraps the address space"))?;
        if !is_page_aligned(address) {
            return Err(conflict(address, "address is not page aligned"));
        }
        let range = address..end;

        // Free range: take it without replacing anything.
        // SAFETY: MAP_FIXED_NOREPLACE fails with EEXIST instead of touching an
        // existing mapping.
        let attempt = unsafe {
            rustix::mm::mmap(
                address as *mut _,
                len,
                protection.prot_flags(),
                MapFlags::SHARED | MapFlags::FIXED_NOREPLACE,
                handle,
                0,
            )
        };
        match attempt {
            Ok(ptr) if ptr as usize == address => return Ok(address),
            Ok(ptr) => {
                // Kernels without MAP_FIXED_NOREPLACE treat the address as a hint.
                // SAFETY: `ptr` is the mapping just created above and has no
                // other users.
                unsafe {
                    let _ = rustix::mm::munmap(ptr, len);
                }
                return Err(conflict(
                    address,
                    &format!("kernel relocated the window to {:#x}", ptr as usize),
                ));
            }
            Err(Errno::EXIST) => {}
            Err(Errno::INVAL) => return Err(conflict(address, "kernel rejected the address")),
            Err(e) => return Err(map_failed(handle, e)),
        }

        if !REGISTRY.with_borrow(|registry| registry.owns(&range)) {
            return Err(conflict(
                address,
                "range holds memory that was not mapped through this crate",
            ));
        }

        let replace = MapFlags::SHARED | MapFlags::from_bits_retain(libc::MAP_FIXED as u32);
        // SAFETY: the registry confirmed every byte of `range` belongs to a
        // live window or a reservation made here. Those windows are marked
        // Displaced below and only access memory after checking their status.
        let result = unsafe {
            rustix::mm::mmap(
                address as *mut _,
                len,
                protection.prot_flags(),
                replace,
                handle,
                0,
            )
        };
        // A failed MAP_FIXED may already have torn down the old pages, so the
        // previous owners of the range are evicted either way.
        REGISTRY.with_borrow_mut(|registry| registry.evict(&range));

        match result {
            Ok(ptr) if ptr as usize == address => Ok(address),
            Ok(ptr) => {
                // SAFETY: `ptr` is the mapping just created and has no users.
                unsafe {
                    let _ = rustix::mm::munmap(ptr, len);
                }
                Err(conflict(address, "kernel did not honour MAP_FIXED"))
            }
            Err(Errno::INVAL) => Err(conflict(address, "kernel rejected the address")),
            Err(e) => Err(map_failed(handle, e)),
        }
    }
}

impl Default for WindowMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WindowMapper {
    fn drop(&mut self) {
        let ranges = REGISTRY
            .try_with(|registry| registry.borrow_mut().release(self.id))
            .unwrap_or_default();
        for r in ranges {
            // SAFETY: the range is still a PROT_NONE reservation of this
            // mapper; no window covers it.
            unsafe {
                let _ = rustix::mm::munmap(r.start as *mut _, r.end - r.start);
            }
        }
    }
}

fn conflict(address: usize, reason: &str) -> Error {
    Error::PlacementConflict {
        address,
        reason: reason.to_string(),
    }
}

fn map_failed(handle: &SegmentHandle, errno: Errno) -> Error {
    Error::MapFailed {
        name: handle.name().to_string(),
        reason: "mmap failed".into(),
        source: Some(errno),
    }
}
