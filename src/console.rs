//! Operator console.
//!
//! Everything the operator should see (server output, command results,
//! warnings from background saves) goes through [`Console`]. Each
//! [`log`](Console::log) line is prefixed with a local timestamp and also
//! mirrored to `tracing` under the `console` target.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use tracing::{debug, warn};

/// Timestamp layout used for console lines.
pub const CONSOLE_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H:%M:%S";

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Cloneable handle to the operator-visible output sink.
#[derive(Clone)]
pub struct Console {
    out: SharedWriter,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

impl Console {
    /// Console writing to the process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Console writing to an arbitrary sink.
    #[must_use]
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Console backed by an in-memory buffer, plus a handle for reading it back.
    #[must_use]
    pub fn capture() -> (Self, CapturedOutput) {
        let captured = CapturedOutput::default();
        (Self::new(captured.clone()), captured)
    }

    /// Write a timestamped line.
    pub fn log(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        debug!(target: "console", "{line}");
        let stamp = Local::now().format(CONSOLE_TIMESTAMP_FORMAT);
        self.write_text(&format!("[{stamp}] {line}{}", line_ending()));
    }

    /// Write text followed by a line terminator, without a timestamp.
    pub fn println(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        debug!(target: "console", "{text}");
        self.write_text(&format!("{text}{}", line_ending()));
    }

    /// Write text as is (used for the prompt).
    pub fn print(&self, text: impl AsRef<str>) {
        self.write_text(text.as_ref());
    }

    fn write_text(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            warn!(%err, "console write failed");
        }
    }
}

/// Platform line terminator for console output and server input.
#[must_use]
pub fn line_ending() -> &'static str {
    if cfg!(windows) {
        "\r\n"
    } else {
        "\n"
    }
}

/// In-memory console sink, readable from tests and tools.
#[derive(Clone, Default)]
pub struct CapturedOutput {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    /// Everything written so far, lossily decoded as UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Whether the captured output contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
