// src/common/framer.rs

use std::collections::VecDeque;

/// Longest partial line kept while waiting for a delimiter. Anything longer is noise.
pub const MAX_PARTIAL_LINE: usize = 1024;

const DELIMITER: char = '\n';

/// Token extraction policy applied to each complete line.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FramingMode {
    /// Line is a token only if it is non-empty and every character is an ASCII digit.
    Strict,
    /// All ASCII digits in the line are concatenated; a non-empty result is a token.
    Lenient,
}

impl FramingMode {
    /// Applies the policy to one trimmed line.
    pub fn extract(&self, line: &str) -> Option<String> {
        match self {
            FramingMode::Strict => {
                if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) {
                    Some(line.to_owned())
                } else {
                    None
                }
            }
            FramingMode::Lenient => {
                let digits: String = line.chars().filter(|c| c.is_ascii_digit()).collect();
                if digits.is_empty() {
                    None
                } else {
                    Some(digits)
                }
            }
        }
    }
}

/// Splits a byte stream into newline-delimited numeric tokens.
///
/// The framer is persistent: bytes after the last delimiter stay buffered and are
/// completed by a later [`feed`](LineFramer::feed), so the tokens produced do not
/// depend on where the stream was chunked. After every `feed` the internal
/// buffer holds at most one partial line.
#[derive(Debug)]
pub struct LineFramer {
    mode: FramingMode,
    buffer: String,
    pending: VecDeque<String>,
}

impl LineFramer {
    pub fn new(mode: FramingMode) -> Self {
        LineFramer {
            mode,
            buffer: String::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Bytes waiting for a delimiter.
    pub fn partial(&self) -> &str {
        &self.buffer
    }

    /// Appends `raw` and returns the tokens completed by it, in stream order.
    ///
    /// Undecodable bytes are dropped, not reported. Lines that fail the mode's
    /// policy are discarded silently. Tokens not consumed from the returned
    /// iterator are handed out first by the next call.
    pub fn feed(&mut self, raw: &[u8]) -> Tokens<'_> {
        for chunk in raw.utf8_chunks() {
            self.buffer.push_str(chunk.valid());
        }

        while let Some(idx) = self.buffer.find(DELIMITER) {
            let rest = self.buffer.split_off(idx + DELIMITER.len_utf8());
            let raw_line = core::mem::replace(&mut self.buffer, rest);
            let line = raw_line[..idx].trim();
            match self.mode.extract(line) {
                Some(token) => self.pending.push_back(token),
                None => {
                    if !line.is_empty() {
                        log::trace!("discarding line {:?}", line);
                    }
                }
            }
        }

        if self.buffer.len() > MAX_PARTIAL_LINE {
            log::debug!(
                "dropping {} buffered bytes with no line delimiter",
                self.buffer.len()
            );
            self.buffer.clear();
        }

        Tokens { pending: &mut self.pending }
    }

    /// Forgets any partial line and unread tokens.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending.clear();
    }
}

/// Tokens completed by one [`LineFramer::feed`] call, oldest first.
#[derive(Debug)]
pub struct Tokens<'a> {
    pending: &'a mut VecDeque<String>,
}

impl Iterator for Tokens<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pending.len(), Some(self.pending.len()))
    }
}
