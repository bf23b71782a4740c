//! Progress display for long running external steps
//!
//! Resolving one environment can take minutes, so the worklist gets a bar
//! on stderr. Cloning the wrapper repository gets a spinner. Log lines share
//! stderr with the bar and go through [`LogWriter`], which hides the bar
//! while a line is written.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

const WORKLIST_TEMPLATE: &str = "{spinner:.cyan} [{pos}/{len}] {elapsed_precise} {wide_msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg} ({elapsed})";

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// The visible bar log lines have to step around
static ACTIVE: Mutex<Option<(u64, ProgressBar)>> = Mutex::new(None);

/// Run `f` with the active bar, if any, cleared from the terminal
fn suspended<R>(f: impl FnOnce() -> R) -> R {
    // clone out of the lock so a log line from inside `f` cannot deadlock
    let active = ACTIVE
        .lock()
        .ok()
        .and_then(|slot| slot.as_ref().map(|(_, bar)| bar.clone()));
    match active {
        Some(bar) => bar.suspend(f),
        None => f(),
    }
}

/// Bar or spinner on stderr, cleared when dropped
pub struct Progress {
    id: u64,
    bar: ProgressBar,
}

impl Progress {
    /// Bar over the environment files of one run
    pub fn worklist(len: usize, visible: bool) -> Self {
        let bar = ProgressBar::new(len as u64);
        bar.set_style(ProgressStyle::with_template(WORKLIST_TEMPLATE).expect("Invalid template"));
        Self::ticking(bar, visible, 100)
    }

    /// Spinner for a step of unknown length
    pub fn spinner(message: &str, visible: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template(SPINNER_TEMPLATE)
                .expect("Invalid template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.set_message(message.to_string());
        Self::ticking(bar, visible, 80)
    }

    fn ticking(bar: ProgressBar, visible: bool, millis: u64) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        if visible {
            bar.enable_steady_tick(Duration::from_millis(millis));
            if let Ok(mut slot) = ACTIVE.lock() {
                *slot = Some((id, bar.clone()));
            }
        } else {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self { id, bar }
    }

    /// Show the environment file now being processed
    pub fn begin(&self, env: &Path) {
        self.bar.set_message(env.display().to_string());
    }

    /// Count the current file as done
    pub fn advance(&self) {
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if let Ok(mut slot) = ACTIVE.lock() {
            if slot.as_ref().is_some_and(|(id, _)| *id == self.id) {
                *slot = None;
            }
        }
        self.bar.finish_and_clear();
    }
}

/// Writer that suspends the active bar around every write
pub struct Suspending<W>(pub W);

impl<W: Write> Write for Suspending<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        suspended(|| self.0.write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        suspended(|| self.0.write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// `MakeWriter` for the tracing subscriber: stderr, stepping around bars
#[derive(Debug, Clone, Copy, Default)]
pub struct LogWriter;

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = Suspending<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        Suspending(io::stderr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_worklist_counts() {
        let progress = Progress::worklist(2, false);
        assert!(progress.bar.is_hidden());
        progress.begin(Path::new("envs/a.yaml"));
        progress.advance();
        progress.begin(Path::new("envs/b.yaml"));
        progress.advance();
        assert_eq!(progress.position(), 2);
        assert_eq!(progress.bar.length(), Some(2));
    }

    fn is_active(progress: &Progress) -> bool {
        ACTIVE
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|(id, _)| *id == progress.id)
    }

    #[test]
    fn test_only_visible_bars_are_suspended_for_logs() {
        let hidden = Progress::worklist(1, false);
        assert!(!is_active(&hidden));

        let visible = Progress::worklist(1, true);
        assert!(is_active(&visible));
        let mut log = Suspending(Vec::new());
        log.write_all(b"INFO Resolving prior versions...\n").unwrap();
        assert_eq!(log.0, b"INFO Resolving prior versions...\n");
        assert!(is_active(&visible));

        let id = visible.id;
        drop(visible);
        assert!(!ACTIVE
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|(active, _)| *active == id));
    }

    #[test]
    fn test_log_writer_without_bar() {
        let mut writer = Suspending(Vec::new());
        writer.write_all(b"WARN no bar\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.0, b"WARN no bar\n");
    }

    #[test]
    fn test_hidden_spinner_keeps_message() {
        let progress = Progress::spinner("Cloning wrapper repository...", false);
        assert_eq!(progress.bar.message(), "Cloning wrapper repository...");
        assert_eq!(progress.position(), 0);
    }
}
