//! Log capture shared by unit tests.

use std::sync::Mutex;

static LINES: Mutex<Vec<String>> = Mutex::new(Vec::new());
static LOGGER: CaptureLogger = CaptureLogger;

struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(mut lines) = LINES.lock() {
            lines.push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Installs the capturing logger once per test binary.
pub(crate) fn capture_logs() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
}

/// Captured lines containing `needle`.
pub(crate) fn lines_containing(needle: &str) -> Vec<String> {
    LINES
        .lock()
        .map(|lines| lines.iter().filter(|l| l.contains(needle)).cloned().collect())
        .unwrap_or_default()
}
