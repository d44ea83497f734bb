//! Pattern construction for prompt and pagination detection.
//!
//! Every pattern built here is anchored to the end of the haystack (`\z`), so
//! it only matches the unconsumed tail of the stream.

use regex::bytes::Regex;

/// Matches any plausible CLI prompt line at the end of the buffer.
///
/// Used before the device's own prompt is known (banner capture, login).
pub const GENERIC_PROMPT: &str = r"(?:\A|[\r\n])[^\r\n]{1,128}[#>$%][ \t]*\z";

/// Build the completion pattern for a classified device.
///
/// Matches a line made of the hostname, an optional mode marker such as
/// `(config-if)`, and a prompt delimiter, sitting at the end of the buffer.
pub fn completion_pattern(hostname: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?:\A|[\r\n])(?:[\w./:-]*:)?{}(?:\([^)\r\n]*\))?[#>][ \t]*\z",
        regex::escape(hostname)
    ))
}

/// Build a pattern matching one exact prompt string at the end of the buffer.
pub fn exact_prompt_pattern(prompt: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?:\A|[\r\n]){}[ \t]*\z", regex::escape(prompt.trim())))
}

/// Compile a pagination marker pattern so it only matches at the tail.
pub fn marker_pattern(marker: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?:{})[ \t]*\z", marker))
}

/// Extract the last non-empty line from captured output.
pub fn last_line(data: &str) -> Option<&str> {
    data.lines()
        .rev()
        .map(|line| line.trim_matches(|c: char| c.is_whitespace() || c == '\x08'))
        .find(|line| !line.is_empty())
}
