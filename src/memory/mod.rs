//! Shared memory segments, windows and composite views.
//!
//! # Architecture
//!
//! - [`SegmentHandle`]: one `shm_open` descriptor on a named segment
//! - [`WindowMapper`]: maps handles into [`MappedWindow`]s, anywhere or at a
//!   fixed address, replacing only ranges the crate mapped earlier
//! - [`CompositeView`]: two back-to-back windows addressed as one buffer
//! - [`MappedRegion`]: bounded byte access shared by windows and views
//! - [`Teardown`]: unmap, close, unlink, in that order
//!
//! # Example
//!
//! ```rust,ignore
//! use shm_compose::memory::*;
//!
//! let page = page_size();
//! let a = SegmentHandle::open("/left.shm", AccessMode::ReadWriteCreate)?;
//! let b = SegmentHandle::open("/right.shm", AccessMode::ReadWriteCreate)?;
//! a.set_length(page)?;
//! b.set_length(page)?;
//!
//! let mapper = WindowMapper::new();
//! let room = mapper.reserve(2 * page)?;
//! let left = mapper.map(&a, page, Protection::ReadWrite, room.placement_at(0))?;
//! let right = mapper.map(&b, page, Protection::ReadWrite,
//!     Placement::after(left.base_address(), left.len()))?;
//!
//! let view = CompositeView::compose(&left, &right)?;
//! view.write(page - 3, b"straddle")?;
//! ```

mod access;
mod composite;
mod handle;
mod lifecycle;
mod mapper;
mod segment;
mod sizing;
mod window;

pub use access::{MappedRegion, check_bounds, copy_into, write_cstring, write_string};
pub use composite::CompositeView;
pub use handle::SegmentHandle;
pub use lifecycle::Teardown;
pub use mapper::{Reservation, WindowMapper};
pub use segment::{AccessMode, Placement, Protection, is_page_aligned, page_size, round_to_page};
pub use sizing::validate_length;
pub use window::{MappedWindow, WindowStatus};
