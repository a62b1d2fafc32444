//! Server output fan-out.
//!
//! Each output stream of the server gets a reader task ([`run_output_reader`])
//! that frames the bytes into lines with [`ServerLineCodec`] and hands every
//! line to the shared [`OutputHub`]. The hub:
//!
//! 1. writes the line, truncated to the configured limit, to the console;
//! 2. appends primary-stream lines to the bounded history;
//! 3. forwards the full line to the current subscriber, if any.
//!
//! Delivery to the subscriber waits at most `send_timeout`; a subscriber
//! that falls behind loses lines instead of stalling the reader.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Local;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::console::Console;
use crate::process::codec::ServerLineCodec;
use crate::process::{OutputLine, OutputReceiver, OutputStream};
use crate::{AppError, Result};

/// Suffix appended to console lines cut at the length limit.
const TRUNCATION_MARKER: &str = " ...";

/// Tunables for an [`OutputHub`].
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Console truncation limit in characters.
    pub line_limit: usize,
    /// Retained primary lines.
    pub history_limit: usize,
    /// Subscription queue depth.
    pub subscriber_capacity: usize,
    /// Maximum wait when the subscription queue is full.
    pub send_timeout: Duration,
}

/// Shared sink for all server output lines.
#[derive(Debug)]
pub struct OutputHub {
    console: Console,
    settings: HubSettings,
    history: Mutex<VecDeque<OutputLine>>,
    subscriber: Mutex<Option<mpsc::Sender<String>>>,
}

impl OutputHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new(console: Console, settings: HubSettings) -> Self {
        Self {
            console,
            settings,
            history: Mutex::new(VecDeque::new()),
            subscriber: Mutex::new(None),
        }
    }

    /// Open the single subscription slot.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if a subscription is already active.
    pub fn subscribe(&self) -> Result<OutputReceiver> {
        let mut slot = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(AppError::State(
                "an output subscription is already active".into(),
            ));
        }
        let (tx, rx) = mpsc::channel(self.settings.subscriber_capacity.max(1));
        *slot = Some(tx);
        Ok(rx)
    }

    /// Drop the subscription sender so the consumer observes end-of-stream.
    pub fn unsubscribe(&self) {
        let previous = self
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            debug!("output subscription closed");
        }
    }

    /// Copy of the retained primary-stream history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<OutputLine> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Echo, record and forward one line.
    pub async fn publish(&self, stream: OutputStream, line: String) {
        debug!(?stream, line = %line, "server output");
        self.console
            .log(truncate_for_console(&line, self.settings.line_limit));

        if stream == OutputStream::Primary {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.push_back(OutputLine {
                line: line.clone(),
                at: Local::now(),
            });
            while history.len() > self.settings.history_limit {
                history.pop_front();
            }
        }

        let subscriber = self
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(tx) = subscriber {
            match tokio::time::timeout(self.settings.send_timeout, tx.send(line)).await {
                Ok(Ok(())) => {}
                Ok(Err(_closed)) => debug!("subscriber went away, line not delivered"),
                Err(_elapsed) => debug!("subscriber queue full, line dropped"),
            }
        }
    }
}

/// Cut `line` to `limit` characters, marking the cut.
#[must_use]
pub fn truncate_for_console(line: &str, limit: usize) -> Cow<'_, str> {
    match line.char_indices().nth(limit) {
        Some((byte_index, _)) => Cow::Owned(format!("{}{TRUNCATION_MARKER}", &line[..byte_index])),
        None => Cow::Borrowed(line),
    }
}

/// Read `source` line by line until EOF, publishing each line to `hub`.
///
/// The codec drops over-long lines itself; only an I/O error ends the task.
pub async fn run_output_reader<R>(stream: OutputStream, source: R, hub: std::sync::Arc<OutputHub>)
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(source, ServerLineCodec::new());

    while let Some(item) = framed.next().await {
        match item {
            Ok(line) => hub.publish(stream, line).await,
            Err(err) => {
                warn!(?stream, %err, "output reader: stream error, stopping");
                break;
            }
        }
    }

    debug!(?stream, "output reader: EOF");
}
