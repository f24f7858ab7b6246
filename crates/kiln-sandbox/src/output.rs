//! Per-worker combined output capture
//!
//! Each execution gets its own sink instead of redirecting the process-wide
//! stdout/stderr, so concurrent runs never see each other's text. The caller
//! seals the sink when it returns; anything a still-running worker writes
//! after that point is dropped.

use std::sync::{Arc, Mutex, MutexGuard};

/// Default cap on captured output (1 MiB)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
struct SinkState {
    buf: String,
    limit: usize,
    truncated: bool,
    sealed: bool,
}

/// Shared handle to one execution's stdout+stderr buffer
#[derive(Debug, Clone)]
pub struct OutputSink {
    state: Arc<Mutex<SinkState>>,
}

/// What was captured by the time the sink was sealed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub text: String,
    pub truncated: bool,
}

impl OutputSink {
    pub fn new(limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState {
                buf: String::new(),
                limit,
                truncated: false,
                sealed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        // A worker that panicked mid-write leaves a valid String behind
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append text; returns false once the sink is sealed or full
    pub fn write(&self, text: &str) -> bool {
        let mut state = self.lock();
        if state.sealed {
            return false;
        }
        let remaining = state.limit.saturating_sub(state.buf.len());
        if text.len() <= remaining {
            state.buf.push_str(text);
            return true;
        }
        let mut cut = remaining;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        state.buf.push_str(&text[..cut]);
        state.truncated = true;
        false
    }

    /// Stop accepting writes and take everything captured so far
    pub fn seal(&self) -> CapturedOutput {
        let mut state = self.lock();
        state.sealed = true;
        CapturedOutput {
            text: std::mem::take(&mut state.buf),
            truncated: state.truncated,
        }
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_in_order() {
        let sink = OutputSink::default();
        sink.write("hello ");
        sink.write("world\n");
        let captured = sink.seal();
        assert_eq!(captured.text, "hello world\n");
        assert!(!captured.truncated);
    }

    #[test]
    fn test_truncates_at_limit() {
        let sink = OutputSink::new(8);
        assert!(sink.write("1234"));
        assert!(!sink.write("56789abc"));
        let captured = sink.seal();
        assert_eq!(captured.text, "12345678");
        assert!(captured.truncated);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sink = OutputSink::new(3);
        sink.write("aé€");
        let captured = sink.seal();
        assert_eq!(captured.text, "aé");
    }

    #[test]
    fn test_writes_after_seal_are_dropped() {
        let sink = OutputSink::default();
        let worker_side = sink.clone();
        worker_side.write("before");
        let captured = sink.seal();
        assert!(!worker_side.write("after"));
        assert_eq!(captured.text, "before");
        assert_eq!(sink.seal().text, "");
    }
}
