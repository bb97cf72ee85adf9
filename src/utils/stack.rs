//! Best-effort call-site extraction from captured backtraces
//!
//! Parses the textual form produced by `std::backtrace::Backtrace`:
//!
//! ```text
//!    0: std::backtrace::Backtrace::capture
//!              at /rustc/abc/library/std/src/backtrace.rs:296:13
//!    1: my_app::handlers::login
//!              at ./src/handlers.rs:42:9
//! ```
//!
//! Any failure resolves to "no call site", never to an error.

use serde::{Deserialize, Serialize};
use std::backtrace::{Backtrace, BacktraceStatus};

/// Location a log call came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl CallSite {
    /// Call site of a `#[track_caller]` function
    pub fn from_location(location: &std::panic::Location<'_>) -> Self {
        Self {
            function: None,
            file: Some(location.file().to_string()),
            line: Some(location.line()),
            column: Some(location.column()),
        }
    }

    /// `file:line` when both are known
    pub fn short(&self) -> Option<String> {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => Some(format!("{}:{}", file, line)),
            (Some(file), None) => Some(file.clone()),
            _ => self.function.clone(),
        }
    }
}

/// One parsed backtrace frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: usize,
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

const INTERNAL_PREFIXES: [&str; 6] = [
    "std::",
    "core::",
    "alloc::",
    "backtrace::",
    "rust_begin_unwind",
    "__rust",
];

#[derive(Debug, Clone)]
pub struct StackInspector {
    skip_frames: usize,
    skip_prefixes: Vec<String>,
}

impl StackInspector {
    /// `skip_frames` application frames are dropped before the call site
    pub fn new(skip_frames: usize) -> Self {
        Self {
            skip_frames,
            skip_prefixes: vec![concat!(env!("CARGO_CRATE_NAME"), "::").to_string()],
        }
    }

    /// Also treat frames whose function starts with `prefix` as internal
    #[must_use]
    pub fn skip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.skip_prefixes.push(prefix.into());
        self
    }

    /// Frames that belong to this crate are kept; used in tests that parse
    /// synthetic stacks naming crate functions
    #[must_use]
    pub fn keep_own_frames(mut self) -> Self {
        self.skip_prefixes.clear();
        self
    }

    pub fn skip_frames(&self) -> usize {
        self.skip_frames
    }

    /// Parse backtrace text into frames; unparseable lines are ignored
    pub fn parse(text: &str) -> Vec<Frame> {
        let mut frames: Vec<Frame> = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(location) = line.strip_prefix("at ") {
                if let Some(frame) = frames.last_mut() {
                    if frame.file.is_none() {
                        let (file, line_no, column) = split_location(location);
                        frame.file = Some(file);
                        frame.line = line_no;
                        frame.column = column;
                    }
                }
                continue;
            }

            if let Some((index, function)) = line.split_once(": ") {
                if let Ok(index) = index.trim().parse::<usize>() {
                    frames.push(Frame {
                        index,
                        function: strip_hash(function.trim()).to_string(),
                        file: None,
                        line: None,
                        column: None,
                    });
                }
            }
        }

        frames
    }

    fn is_internal(&self, frame: &Frame) -> bool {
        INTERNAL_PREFIXES
            .iter()
            .any(|prefix| frame.function.starts_with(prefix))
            || self
                .skip_prefixes
                .iter()
                .any(|prefix| frame.function.starts_with(prefix.as_str()))
    }

    /// Call site from backtrace text, after dropping internal frames and
    /// `skip_frames` more
    pub fn call_site(&self, text: &str) -> Option<CallSite> {
        Self::parse(text)
            .into_iter()
            .filter(|frame| !self.is_internal(frame))
            .nth(self.skip_frames)
            .map(|frame| CallSite {
                function: Some(frame.function),
                file: frame.file,
                line: frame.line,
                column: frame.column,
            })
    }

    /// Capture the live stack; `None` when backtraces are disabled or
    /// unsupported on this platform
    pub fn capture(&self) -> Option<CallSite> {
        let backtrace = Backtrace::capture();
        if backtrace.status() != BacktraceStatus::Captured {
            return None;
        }
        self.call_site(&backtrace.to_string())
    }
}

impl Default for StackInspector {
    fn default() -> Self {
        Self::new(0)
    }
}

/// `path/to/file.rs:42:9` -> (`path/to/file.rs`, 42, 9)
fn split_location(location: &str) -> (String, Option<u32>, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let last = parts.next();
    let middle = parts.next();
    let rest = parts.next();

    match (rest, middle, last) {
        (Some(file), Some(line), Some(column)) => match (line.parse(), column.parse()) {
            (Ok(line), Ok(column)) => (file.to_string(), Some(line), Some(column)),
            _ => (location.to_string(), None, None),
        },
        (None, Some(file), Some(line)) => match line.parse() {
            Ok(line) => (file.to_string(), Some(line), None),
            Err(_) => (location.to_string(), None, None),
        },
        _ => (location.to_string(), None, None),
    }
}

/// Drop the `::h0123abcd` symbol hash suffix some platforms print
fn strip_hash(function: &str) -> &str {
    match function.rfind("::h") {
        Some(pos)
            if function.len() - pos == 19
                && function[pos + 3..].chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            &function[..pos]
        }
        _ => function,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "   0: std::backtrace::Backtrace::capture
             at /rustc/abc/library/std/src/backtrace.rs:296:13
   1: rust_log_pipeline::core::logger::Logger::log_with
             at ./src/core/logger.rs:210:30
   2: shop::checkout::submit_order
             at ./src/checkout.rs:42:9
   3: shop::main::h0123456789abcdef
             at ./src/main.rs:12:5
   4: core::ops::function::FnOnce::call_once
             at /rustc/abc/library/core/src/ops/function.rs:250:5
";

    #[test]
    fn test_parse_frames() {
        let frames = StackInspector::parse(SAMPLE);
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[2].function, "shop::checkout::submit_order");
        assert_eq!(frames[2].file.as_deref(), Some("./src/checkout.rs"));
        assert_eq!(frames[2].line, Some(42));
        assert_eq!(frames[2].column, Some(9));
        assert_eq!(frames[3].function, "shop::main");
    }

    #[test]
    fn test_call_site_skips_internal_frames() {
        let site = StackInspector::new(0).call_site(SAMPLE).expect("call site");
        assert_eq!(site.function.as_deref(), Some("shop::checkout::submit_order"));
        assert_eq!(site.short().as_deref(), Some("./src/checkout.rs:42"));
    }

    #[test]
    fn test_call_site_skips_requested_frames() {
        let site = StackInspector::new(1).call_site(SAMPLE).expect("call site");
        assert_eq!(site.function.as_deref(), Some("shop::main"));
        assert_eq!(site.line, Some(12));

        assert!(StackInspector::new(2).call_site(SAMPLE).is_none());
    }

    #[test]
    fn test_keep_own_frames() {
        let site = StackInspector::new(0)
            .keep_own_frames()
            .call_site(SAMPLE)
            .expect("call site");
        assert_eq!(
            site.function.as_deref(),
            Some("rust_log_pipeline::core::logger::Logger::log_with")
        );
    }

    #[test]
    fn test_garbage_yields_nothing() {
        assert!(StackInspector::new(0).call_site("").is_none());
        assert!(StackInspector::new(0).call_site("not a stack\nat nowhere").is_none());
    }

    #[test]
    fn test_frame_without_location() {
        let text = "   0: shop::worker\n   1: shop::spawn\n             at src/spawn.rs:7\n";
        let frames = StackInspector::parse(text);
        assert_eq!(frames[0].file, None);
        assert_eq!(frames[1].file.as_deref(), Some("src/spawn.rs"));
        assert_eq!(frames[1].line, Some(7));
        assert_eq!(frames[1].column, None);
    }

    #[test]
    fn test_capture_never_panics() {
        // status depends on RUST_BACKTRACE; either outcome is acceptable
        let _ = StackInspector::default().capture();
    }
}
