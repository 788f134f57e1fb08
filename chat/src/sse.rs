use bytes::BytesMut;
use tracing::warn;

use crate::DONE_MESSAGE;

pub const DATA_PREFIX: &[u8] = b"data:";

/// Accumulates raw upstream reads and hands out complete lines.
///
/// A read may end in the middle of a line; the tail stays buffered until the
/// newline arrives in a later read.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
    // bytes already searched for a newline
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line without its terminator (`\n` or `\r\n`).
    pub fn next_line(&mut self) -> Option<BytesMut> {
        let offset = self.buf[self.scanned..].iter().position(|b| *b == b'\n');
        let Some(offset) = offset else {
            self.scanned = self.buf.len();
            return None;
        };

        let end = self.scanned + offset;
        let mut line = self.buf.split_to(end + 1);
        self.scanned = 0;
        line.truncate(end);
        strip_carriage_return(&mut line);
        Some(line)
    }

    /// Drains whatever is left once the upstream has closed.
    pub fn finish(&mut self) -> Option<BytesMut> {
        self.scanned = 0;
        if self.buf.is_empty() {
            return None;
        }
        let mut line = self.buf.split();
        strip_carriage_return(&mut line);
        Some(line)
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn strip_carriage_return(line: &mut BytesMut) {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
}

#[derive(Debug, PartialEq)]
pub enum UpstreamFrame<'a> {
    /// Payload of a `data:` line, to be parsed as a chunk.
    Data(&'a str),
    /// The `[DONE]` sentinel.
    Done,
    /// Blank keep-alive, comment, other field, or undecodable line.
    Ignored,
}

pub fn parse_line(line: &[u8]) -> UpstreamFrame<'_> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return UpstreamFrame::Ignored;
    };
    let payload = payload.strip_prefix(b" ").unwrap_or(payload);

    let Ok(payload) = std::str::from_utf8(payload) else {
        warn!("Skipping data line that is not valid UTF-8");
        return UpstreamFrame::Ignored;
    };

    let payload = payload.trim();
    if payload.is_empty() {
        UpstreamFrame::Ignored
    } else if payload == DONE_MESSAGE {
        UpstreamFrame::Done
    } else {
        UpstreamFrame::Data(payload)
    }
}
