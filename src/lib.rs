//! # shm-compose
//!
//! Composing named POSIX shared memory segments into bounded, adjacent
//! memory windows.
//!
//! Several handles open the same named segment with different access
//! modes; a [`WindowMapper`](memory::WindowMapper) maps them into the
//! address space, anywhere or at an exact address, and a
//! [`CompositeView`](memory::CompositeView) addresses two back-to-back
//! windows as one buffer. Every access is bounds- and protection-checked,
//! and windows that were unmapped or displaced fail fast instead of touching
//! stale memory.
//!
//! ## Features
//!
//! - **Aliased windows**: `MAP_SHARED` mappings through independent handles
//! - **Commanded adjacency**: `Placement::FixedAt` with ownership checks,
//!   never clobbering memory the mapper did not hand out
//! - **Bounded access**: out-of-range writes are errors, not overflow
//! - **Linux-only**: `shm_open`, `MAP_FIXED_NOREPLACE`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shm_compose::prelude::*;
//!
//! let report = shm_compose::demo::run(&DemoConfig::default())?;
//! assert!(report.is_adjacent());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod demo;
pub mod error;
pub mod memory;
pub mod observability;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::DemoConfig;
    pub use crate::error::{Error, Result};
    pub use crate::memory::{
        AccessMode, CompositeView, MappedRegion, MappedWindow, Placement, Protection,
        SegmentHandle, Teardown, WindowMapper,
    };
}

pub use error::{Error, Result};
