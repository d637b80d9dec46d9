//! Status publication for map calls
//!
//! A top-level map call reports progress through a [`StatusSink`]. The default
//! sink draws an `indicatif` progress bar on stderr and mirrors the progress in
//! the terminal title. Nested calls never publish.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Receiver of progress events for a single map call.
pub trait StatusSink: Send + Sync {
    /// Called once before the first work item is dispatched.
    fn begin(&self, label: &str, total: usize);

    /// Called after each work item completes, from whichever thread ran it.
    fn advance(&self, label: &str, done: usize, total: usize);

    /// Called once after the last work item, or after the call failed.
    fn finish(&self, label: &str, done: usize, total: usize);
}

/// Progress bar plus terminal title on stderr.
pub struct TerminalStatus {
    bar: Mutex<Option<ProgressBar>>,
    title: bool,
}

impl TerminalStatus {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            title: std::io::stderr().is_terminal(),
        }
    }

    fn set_title(&self, text: &str) {
        if !self.title {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\x1b]2;{}\x07", text);
        let _ = stderr.flush();
    }
}

impl Default for TerminalStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for TerminalStatus {
    fn begin(&self, label: &str, total: usize) {
        let bar = create_progress_bar(total);
        bar.set_message(label.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
        self.set_title(&title_text(label, 0, total));
    }

    fn advance(&self, label: &str, done: usize, total: usize) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_position(done as u64);
            }
        }
        self.set_title(&title_text(label, done, total));
    }

    fn finish(&self, label: &str, done: usize, total: usize) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_with_message(format!("{}: {}/{} done", label, done, total));
            }
        }
        self.set_title(&title_text(label, done, total));
    }
}

fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ "),
    );
    pb
}

/// Text shown in the terminal title while a map call runs.
pub fn title_text(label: &str, done: usize, total: usize) -> String {
    let percent = if total > 0 { done * 100 / total } else { 100 };
    format!("{}: {}/{} ({}%)", label, done, total, percent)
}

/// Per-call wrapper that counts completed items and forwards to the sink,
/// or does nothing when publication is suppressed.
///
/// The sink sees exactly one `finish`, sent on drop if the call unwinds first.
pub(crate) struct StatusPublisher {
    sink: Option<Arc<dyn StatusSink>>,
    label: String,
    total: usize,
    done: AtomicUsize,
    finished: AtomicBool,
}

impl StatusPublisher {
    pub(crate) fn start(sink: Option<Arc<dyn StatusSink>>, label: &str, total: usize) -> Self {
        if let Some(sink) = &sink {
            sink.begin(label, total);
        }
        Self {
            sink,
            label: label.to_string(),
            total,
            done: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
        }
    }

    pub(crate) fn suppressed() -> Self {
        Self::start(None, "", 0)
    }

    pub(crate) fn item_done(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(sink) = &self.sink {
            sink.advance(&self.label, done, self.total);
        }
    }

    pub(crate) fn finish(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.finish(&self.label, self.done.load(Ordering::Relaxed), self.total);
        }
    }
}

impl Drop for StatusPublisher {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingSink {
        begins: AtomicUsize,
        advances: AtomicUsize,
        finishes: AtomicUsize,
    }

    impl StatusSink for CountingSink {
        fn begin(&self, _label: &str, _total: usize) {
            self.begins.fetch_add(1, Ordering::SeqCst);
        }
        fn advance(&self, _label: &str, _done: usize, _total: usize) {
            self.advances.fetch_add(1, Ordering::SeqCst);
        }
        fn finish(&self, _label: &str, _done: usize, _total: usize) {
            self.finishes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_title_text() {
        assert_eq!(title_text("map", 0, 4), "map: 0/4 (0%)");
        assert_eq!(title_text("map", 3, 4), "map: 3/4 (75%)");
        assert_eq!(title_text("map", 0, 0), "map: 0/0 (100%)");
    }

    #[test]
    fn test_publisher_forwards_events() {
        let sink = Arc::new(CountingSink::default());
        let publisher = StatusPublisher::start(Some(sink.clone() as Arc<dyn StatusSink>), "test", 3);
        publisher.item_done();
        publisher.item_done();
        publisher.item_done();
        publisher.finish();

        assert_eq!(sink.begins.load(Ordering::SeqCst), 1);
        assert_eq!(sink.advances.load(Ordering::SeqCst), 3);
        assert_eq!(sink.finishes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_publisher_finishes_once_when_dropped() {
        let sink = Arc::new(CountingSink::default());
        let publisher = StatusPublisher::start(Some(sink.clone() as Arc<dyn StatusSink>), "test", 3);
        publisher.item_done();
        drop(publisher);
        assert_eq!(sink.finishes.load(Ordering::SeqCst), 1);

        let publisher = StatusPublisher::start(Some(sink.clone() as Arc<dyn StatusSink>), "test", 1);
        publisher.item_done();
        publisher.finish();
        drop(publisher);
        assert_eq!(sink.finishes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_suppressed_publisher_is_silent() {
        let publisher = StatusPublisher::suppressed();
        publisher.item_done();
        publisher.finish();
        assert_eq!(publisher.done.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_terminal_status_lifecycle() {
        let status = TerminalStatus::new();
        status.begin("lifecycle", 2);
        status.advance("lifecycle", 1, 2);
        status.finish("lifecycle", 2, 2);
        assert!(status.bar.lock().unwrap().is_none());
    }
}
