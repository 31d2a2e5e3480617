//! Configuration for the composition demonstration.

use crate::memory::page_size;

/// Default text written at the start of the first window.
pub const DEFAULT_GREETING: &str = "hello world";

/// Default text written near the end of the first window.
pub const DEFAULT_TAIL_TEXT: &str = "this is longer than 10 char";

/// Default distance from the end of the first window for the tail write.
pub const DEFAULT_TAIL_ROOM: usize = 10;

/// Settings for one run of the demonstration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Segment mapped as the first window (and read back read-only).
    pub first_segment: String,
    /// Segment mapped right after the first window.
    ///
    /// Defaults to the first segment, which makes the composite view a
    /// mirror: bytes written past the first window reappear at its start.
    pub second_segment: String,
    /// Length of each window in bytes (a page multiple).
    pub window_len: usize,
    /// Written at offset 0 of the first window.
    pub greeting: String,
    /// Written `tail_room` bytes before the end of the first window.
    pub tail_text: String,
    /// Room left at the end of the first window for `tail_text`.
    pub tail_room: usize,
    /// Unlink the segments during teardown.
    pub unlink_on_exit: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        let name = format!("/shm-compose-{}", std::process::id());
        Self {
            first_segment: name.clone(),
            second_segment: name,
            window_len: page_size(),
            greeting: DEFAULT_GREETING.to_string(),
            tail_text: DEFAULT_TAIL_TEXT.to_string(),
            tail_room: DEFAULT_TAIL_ROOM,
            unlink_on_exit: true,
        }
    }
}

impl DemoConfig {
    /// Use `name` for both windows (mirror composition).
    pub fn mirrored(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            first_segment: name.clone(),
            second_segment: name,
            ..Self::default()
        }
    }

    /// Use two distinct segments.
    pub fn split(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first_segment: first.into(),
            second_segment: second.into(),
            ..Self::default()
        }
    }

    /// Set the window length.
    pub fn with_window_len(mut self, len: usize) -> Self {
        self.window_len = len;
        self
    }

    /// Set the greeting text.
    pub fn with_greeting(mut self, text: impl Into<String>) -> Self {
        self.greeting = text.into();
        self
    }

    /// Set the tail text and how close to the window end it is written.
    pub fn with_tail(mut self, text: impl Into<String>, room: usize) -> Self {
        self.tail_text = text.into();
        self.tail_room = room;
        self
    }

    /// Keep the segments after the run.
    pub fn keep_segments(mut self) -> Self {
        self.unlink_on_exit = false;
        self
    }

    /// Do both windows map the same segment?
    pub fn is_mirrored(&self) -> bool {
        self.first_segment == self.second_segment
    }

    /// Segment names to size and unlink, without duplicates.
    pub fn segment_names(&self) -> Vec<&str> {
        if self.is_mirrored() {
            vec![&self.first_segment]
        } else {
            vec![&self.first_segment, &self.second_segment]
        }
    }
}
