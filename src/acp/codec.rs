//! NDJSON framing for agent stdio.
//!
//! One JSON-RPC message per `\n`-terminated line. The decoder drops blank
//! lines and a trailing `\r`. Lines over [`MAX_LINE_BYTES`] and lines that
//! are not UTF-8 are logged and skipped; decoding resumes with the next
//! message; only I/O failures end the stream.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::{AppError, Result};

/// Largest inbound line accepted from an agent: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited framing for ACP messages.
#[derive(Debug, Default)]
pub struct AcpCodec {
    /// Bytes of the buffer already searched for a newline.
    scanned: usize,
    /// Inside an oversized line; bytes are dropped until its newline.
    skipping: bool,
}

impl AcpCodec {
    /// Codec with the [`MAX_LINE_BYTES`] ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn warn_too_long() {
    warn!(limit = MAX_LINE_BYTES, "acp codec: line too long, skipping");
}

/// `line` without its terminator, as text; `None` when blank or not UTF-8.
fn frame_text(mut line: &[u8]) -> Option<String> {
    if let [head @ .., b'\r'] = line {
        line = head;
    }
    match std::str::from_utf8(line) {
        Ok(text) if text.trim().is_empty() => None,
        Ok(text) => Some(text.to_owned()),
        Err(err) => {
            warn!(%err, "acp codec: line is not valid utf-8, skipping");
            None
        }
    }
}

impl Decoder for AcpCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let newline = src[self.scanned..].iter().position(|b| *b == b'\n');
            let Some(offset) = newline else {
                if self.skipping {
                    src.clear();
                    self.scanned = 0;
                } else if src.len() > MAX_LINE_BYTES {
                    src.clear();
                    self.scanned = 0;
                    self.skipping = true;
                    warn_too_long();
                } else {
                    self.scanned = src.len();
                }
                return Ok(None);
            };

            let end = self.scanned + offset;
            self.scanned = 0;
            let line = src.split_to(end);
            src.advance(1);

            if std::mem::take(&mut self.skipping) {
                continue;
            }
            if line.len() > MAX_LINE_BYTES {
                warn_too_long();
                continue;
            }
            if let Some(text) = frame_text(&line) {
                return Ok(Some(text));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(text) = self.decode(src)? {
            return Ok(Some(text));
        }
        self.scanned = 0;
        if std::mem::take(&mut self.skipping) || src.is_empty() {
            src.clear();
            return Ok(None);
        }
        let rest = src.split();
        Ok(frame_text(&rest))
    }
}

impl Encoder<String> for AcpCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
