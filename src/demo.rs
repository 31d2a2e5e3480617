//! The composition demonstration.
//!
//! One run sizes a segment, opens it through several handles with different
//! access modes, maps a read-write window, pins a second window directly
//! after it, maps an independent read-only window on the first segment, and
//! then exercises reads and writes across the result:
//!
//! 1. a greeting written through the first window is read back through the
//!    read-only window;
//! 2. a tail string too long for the end of the first window is refused with
//!    [`Error::OutOfRange`];
//! 3. the same tail string written through the composite view straddles the
//!    boundary and lands in the second window.
//!
//! The first failure aborts the run with a [`StepError`] naming the step.

use crate::config::DemoConfig;
use crate::error::Error;
use crate::memory::{
    AccessMode, CompositeView, MappedRegion, Placement, Protection, SegmentHandle, Teardown,
    WindowMapper, copy_into, validate_length, write_string,
};
use crate::observability::{span_demo, span_step};
use std::fmt;
use thiserror::Error as ThisError;

/// Bytes read back through the read-only window after the greeting.
const READBACK_LEN: usize = 20;

/// Bytes copied out with [`copy_into`] after the greeting.
const COPY_LEN: usize = 10;

/// A demonstration step that failed, and why.
#[derive(ThisError, Debug)]
#[error("{step} failed: {source}")]
pub struct StepError {
    /// Name of the failing step.
    pub step: &'static str,
    /// Underlying error.
    #[source]
    pub source: Error,
}

trait StepExt<T> {
    fn step(self, step: &'static str) -> Result<T, StepError>;
}

impl<T> StepExt<T> for crate::error::Result<T> {
    fn step(self, step: &'static str) -> Result<T, StepError> {
        self.map_err(|source| StepError { step, source })
    }
}

/// What one run observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    /// Base address of the first window.
    pub first_base: usize,
    /// Base address of the second window.
    pub second_base: usize,
    /// Length of each window.
    pub window_len: usize,
    /// First bytes of the segment, read through the read-only window.
    pub readback: Vec<u8>,
    /// Bytes copied out of the read-only window with `copy_into`.
    pub copied: Vec<u8>,
    /// The tail write through the first window alone was refused.
    pub overflow_rejected: bool,
    /// The tail as read back through the composite view.
    pub composite_tail: Vec<u8>,
    /// Bytes of the tail that crossed into the second window, read through
    /// the read-only window when both windows map the same segment, or the
    /// second window otherwise.
    pub spill: Vec<u8>,
}

impl DemoReport {
    /// Does the second window start exactly where the first ends?
    pub fn is_adjacent(&self) -> bool {
        self.second_base == self.first_base + self.window_len
    }
}

impl fmt::Display for DemoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "windows: {:#x} + {:#x} ({} bytes each, adjacent: {})",
            self.first_base,
            self.second_base,
            self.window_len,
            self.is_adjacent()
        )?;
        writeln!(f, "read-only readback: {:?}", printable(&self.readback))?;
        writeln!(f, "copied: {:?}", printable(&self.copied))?;
        writeln!(f, "overflow rejected: {}", self.overflow_rejected)?;
        writeln!(f, "composite tail: {:?}", printable(&self.composite_tail))?;
        write!(f, "spill into second window: {:?}", printable(&self.spill))
    }
}

fn printable(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

/// Run the demonstration once.
///
/// On failure, segments named by `config` are unlinked (if
/// `config.unlink_on_exit`) before the error is returned.
pub fn run(config: &DemoConfig) -> Result<DemoReport, StepError> {
    let span = span_demo(&config.first_segment, &config.second_segment, config.window_len);
    let _guard = span.enter();

    let result = run_steps(config);
    if result.is_err() && config.unlink_on_exit {
        for name in config.segment_names() {
            let _ = SegmentHandle::unlink(name);
        }
    }
    result
}

fn run_steps(config: &DemoConfig) -> Result<DemoReport, StepError> {
    let len = config.window_len;
    validate_length(len).step("configure")?;

    let writer = {
        let _s = span_step("open").entered();
        SegmentHandle::open(&config.first_segment, AccessMode::ReadWriteCreate)
            .step("open first segment")?
    };
    writer.set_length(len).step("size first segment")?;

    let reader =
        SegmentHandle::open(&config.first_segment, AccessMode::ReadOnly).step("open read-only")?;
    let extra = SegmentHandle::open(&config.second_segment, AccessMode::ReadWriteCreate)
        .step("open second segment")?;
    extra.set_length(len).step("size second segment")?;
    tracing::info!(
        first = %config.first_segment,
        second = %config.second_segment,
        len,
        "segments open"
    );

    let mapper = WindowMapper::new();
    let room = mapper.reserve(2 * len).step("reserve address range")?;

    let first = mapper
        .map(&writer, len, Protection::ReadWrite, room.placement_at(0))
        .step("map first window")?;
    first.fill(0, len, 0).step("clear first window")?;

    let second = mapper
        .map(
            &extra,
            len,
            Protection::ReadWrite,
            Placement::after(first.base_address(), first.len()),
        )
        .step("map second window")?;
    tracing::info!(
        first = format_args!("{:#x}", first.base_address()),
        second = format_args!("{:#x}", second.base_address()),
        "second window pinned after first"
    );

    let shadow = mapper
        .map(&reader, len, Protection::ReadOnly, Placement::Anywhere)
        .step("map read-only window")?;

    write_string(&first, 0, &config.greeting).step("write greeting")?;
    let readback = shadow
        .read(0, READBACK_LEN.min(len))
        .step("read through read-only window")?;
    let mut copied = vec![0u8; COPY_LEN.min(len)];
    let copy_len = copied.len();
    copy_into(&mut copied, &shadow, 0, copy_len).step("copy out")?;
    tracing::info!(readback = %printable(&readback), "greeting visible through read-only window");

    let tail_offset = len.saturating_sub(config.tail_room);
    let overflow_rejected = match write_string(&first, tail_offset, &config.tail_text) {
        Ok(()) => false,
        Err(Error::OutOfRange {
            offset,
            len: bytes,
            limit,
        }) => {
            tracing::info!(offset, bytes, limit, "write past window end refused");
            true
        }
        Err(source) => {
            return Err(StepError {
                step: "write tail",
                source,
            });
        }
    };

    let (composite_tail, spill) = {
        let view = CompositeView::compose(&first, &second).step("compose view")?;
        view.write(tail_offset, config.tail_text.as_bytes())
            .step("write tail through composite view")?;
        let composite_tail = view
            .read(tail_offset, config.tail_text.len())
            .step("read tail through composite view")?;

        let crossed = (tail_offset + config.tail_text.len()).saturating_sub(len);
        let spill = if config.is_mirrored() {
            shadow.read(0, crossed)
        } else {
            second.read(0, crossed)
        }
        .step("read spill")?;
        (composite_tail, spill)
    };
    tracing::info!(spill = %printable(&spill), "tail straddled the window boundary");

    let report = DemoReport {
        first_base: first.base_address(),
        second_base: second.base_address(),
        window_len: len,
        readback,
        copied,
        overflow_rejected,
        composite_tail,
        spill,
    };

    let mut teardown = Teardown::new();
    teardown
        .window(first)
        .window(second)
        .window(shadow)
        .handle(writer)
        .handle(reader)
        .handle(extra);
    if config.unlink_on_exit {
        for name in config.segment_names() {
            teardown.unlink(name);
        }
    }
    teardown.finish().step("teardown")?;
    drop(mapper);

    tracing::info!("teardown complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_GREETING, DEFAULT_TAIL_ROOM, DEFAULT_TAIL_TEXT};
    use crate::memory::page_size;

    fn name(tag: &str) -> String {
        format!("/shm-compose-demo-{}-{}", tag, std::process::id())
    }

    #[test]
    fn test_mirrored_run() {
        let config = DemoConfig::mirrored(name("mirror"));
        let report = run(&config).unwrap();

        assert!(report.is_adjacent());
        assert_eq!(report.window_len, page_size());
        assert_eq!(&report.readback[..DEFAULT_GREETING.len()], DEFAULT_GREETING.as_bytes());
        assert_eq!(report.copied, &DEFAULT_GREETING.as_bytes()[..10]);
        assert!(report.overflow_rejected);
        assert_eq!(report.composite_tail, DEFAULT_TAIL_TEXT.as_bytes());
        assert_eq!(report.spill, &DEFAULT_TAIL_TEXT.as_bytes()[DEFAULT_TAIL_ROOM..]);

        // Unlinked on the way out
        assert!(SegmentHandle::open(&config.first_segment, AccessMode::ReadOnly).is_err());
    }

    #[test]
    fn test_split_run() {
        let config = DemoConfig::split(name("left"), name("right"));
        let report = run(&config).unwrap();
        assert!(report.is_adjacent());
        assert_eq!(report.spill, &DEFAULT_TAIL_TEXT.as_bytes()[DEFAULT_TAIL_ROOM..]);
        for segment in config.segment_names() {
            assert!(SegmentHandle::open(segment, AccessMode::ReadOnly).is_err());
        }
    }

    #[test]
    fn test_bad_window_len_names_step() {
        let config = DemoConfig::mirrored(name("badlen")).with_window_len(123);
        let err = run(&config).unwrap_err();
        assert_eq!(err.step, "configure");
        assert!(matches!(err.source, Error::InvalidLength { .. }));
        assert!(err.to_string().starts_with("configure failed"));
    }

    #[test]
    fn test_invalid_name_aborts_at_open() {
        let config = DemoConfig::mirrored("no-leading-slash");
        let err = run(&config).unwrap_err();
        assert_eq!(err.step, "open first segment");
    }

    #[test]
    fn test_tail_that_fits_is_not_rejected() {
        let config = DemoConfig::mirrored(name("fits")).with_tail("short", 10);
        let report = run(&config).unwrap();
        assert!(!report.overflow_rejected);
        assert!(report.spill.is_empty());
    }
}
