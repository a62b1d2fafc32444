//! Line codec for server output streams.
//!
//! Frames on `\n` and never fails on content: bytes that are not valid UTF-8
//! are replaced, a trailing `\r` (emitted by the Windows build of the server)
//! is stripped, and lines longer than [`MAX_LINE_BYTES`] are dropped with a
//! warning while framing continues at the next newline. Only I/O errors are
//! reported.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::{AppError, Result};

/// Maximum accepted line length: 64 KiB.
pub const MAX_LINE_BYTES: usize = 65_536;

/// Newline-delimited, lossy UTF-8 decoder for server stdout/stderr.
#[derive(Debug, Default)]
pub struct ServerLineCodec {
    /// Offset already scanned for a newline in the current buffer.
    next_index: usize,
    /// Inside an over-long line; drop bytes until the next newline.
    discarding: bool,
}

impl ServerLineCodec {
    /// Create a codec with the [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ServerLineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            let Some(newline) = newline else {
                if self.discarding || src.len() > MAX_LINE_BYTES {
                    if !self.discarding {
                        warn!(
                            limit = MAX_LINE_BYTES,
                            "server output line too long, discarding"
                        );
                        self.discarding = true;
                    }
                    src.clear();
                    self.next_index = 0;
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };

            let frame = src.split_to(newline + 1);
            self.next_index = 0;
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if newline > MAX_LINE_BYTES {
                warn!(
                    len = newline,
                    limit = MAX_LINE_BYTES,
                    "server output line too long, discarding"
                );
                continue;
            }
            return Ok(Some(to_line(&frame[..newline])));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if std::mem::take(&mut self.discarding) || src.is_empty() {
            src.clear();
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        Ok(Some(to_line(&rest)))
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
