//! Pattern buffer with efficient tail-search optimization.
//!
//! Only the last N bytes of the buffer are searched for prompt and pagination
//! patterns, rather than the entire output. For large outputs (full routing
//! tables, `show tech`), this is critical for performance.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::bytes::Regex;

/// Backspace/space runs a device prints to erase a pagination marker after
/// the advance keystroke, e.g. `\b\b\b\b\b\b\b\b        \b\b\b\b\b\b\b\b`.
static ERASE_SEQUENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x08+ *\x08*").expect("static erase pattern"));

/// Buffer for accumulating output and efficiently searching for patterns.
#[derive(Debug)]
pub struct PatternBuffer {
    /// The accumulated output buffer.
    buffer: Vec<u8>,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    ///
    /// # Arguments
    ///
    /// * `search_depth` - Number of bytes from the end to search for patterns.
    ///   Default recommendation is 1000 bytes.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            search_depth,
        }
    }

    /// Extend the buffer with new data, dropping erase sequences and ANSI
    /// escape codes.
    pub fn extend(&mut self, data: &[u8]) {
        let data: Cow<'_, [u8]> = if memchr::memchr(b'\x08', data).is_some() {
            ERASE_SEQUENCE.replace_all(data, &b""[..])
        } else {
            Cow::Borrowed(data)
        };
        let cleaned = strip_ansi_escapes::strip(data.as_ref());
        self.buffer.extend_from_slice(&cleaned);
    }

    /// Search only the tail of the buffer for the pattern.
    ///
    /// Returns the match if found, with byte offsets relative to the
    /// start of the search region (not the full buffer).
    pub fn search_tail(&self, pattern: &Regex) -> Option<regex::bytes::Match<'_>> {
        pattern.find(self.tail())
    }

    /// Search the entire buffer for a pattern.
    ///
    /// Use sparingly - prefer `search_tail` for prompt detection.
    pub fn search_full(&self, pattern: &Regex) -> Option<regex::bytes::Match<'_>> {
        pattern.find(&self.buffer)
    }

    /// Check if the tail contains a pattern match.
    pub fn tail_contains(&self, pattern: &Regex) -> bool {
        self.search_tail(pattern).is_some()
    }

    /// Check whether a match of `pattern` ends exactly at the end of the buffer.
    ///
    /// Patterns should be anchored with `\z`; this additionally rejects any
    /// match that stops short of the last byte.
    pub fn ends_with_match(&self, pattern: &Regex) -> bool {
        let tail = self.tail();
        pattern
            .find_iter(tail)
            .last()
            .is_some_and(|m| m.end() == tail.len())
    }

    /// Remove a match of `pattern` sitting at the very end of the buffer.
    ///
    /// Returns `true` if something was removed.
    pub fn strip_tail_match(&mut self, pattern: &Regex) -> bool {
        let offset = self.tail_offset();
        let found = pattern
            .find_iter(&self.buffer[offset..])
            .last()
            .filter(|m| offset + m.end() == self.buffer.len())
            .map(|m| offset + m.start());

        match found {
            Some(start) => {
                self.buffer.truncate(start);
                true
            }
            None => false,
        }
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the buffer contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn tail_offset(&self) -> usize {
        self.buffer.len().saturating_sub(self.search_depth)
    }

    fn tail(&self) -> &[u8] {
        &self.buffer[self.tail_offset()..]
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
