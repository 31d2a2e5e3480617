//! Deterministic teardown of windows and handles.
//!
//! Closing a handle and unmapping a window are independent operations, but
//! a clean shutdown unmaps every window first, then closes every handle,
//! then unlinks the names it was asked to remove.

use super::{MappedWindow, SegmentHandle};
use crate::error::{Error, Result};

/// Collects windows, handles and names and releases them in order.
#[derive(Debug, Default)]
pub struct Teardown {
    windows: Vec<MappedWindow>,
    handles: Vec<SegmentHandle>,
    unlink: Vec<String>,
}

impl Teardown {
    /// Create an empty teardown plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a window to unmap.
    pub fn window(&mut self, window: MappedWindow) -> &mut Self {
        self.windows.push(window);
        self
    }

    /// Add a handle to close.
    pub fn handle(&mut self, handle: SegmentHandle) -> &mut Self {
        self.handles.push(handle);
        self
    }

    /// Add a segment name to unlink once everything is released.
    pub fn unlink(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.unlink.contains(&name) {
            self.unlink.push(name);
        }
        self
    }

    /// Release everything: windows, then handles, then names.
    ///
    /// Every step is attempted; the first failure is returned. Windows that
    /// were already unmapped or displaced are skipped.
    pub fn finish(self) -> Result<()> {
        let mut first_error: Option<Error> = None;
        let mut record = |step: &str, result: Result<()>| {
            if let Err(e) = result {
                tracing::warn!(step, error = %e, "teardown step failed");
                first_error.get_or_insert(e);
            }
        };

        for mut window in self.windows {
            if window.is_mapped() {
                record("unmap", window.unmap());
            }
        }
        for handle in self.handles {
            record("close", handle.close());
        }
        for name in &self.unlink {
            record("unlink", SegmentHandle::unlink(name));
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
