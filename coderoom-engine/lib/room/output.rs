//! Sanitization and size-capping of shared terminal output.
//!
//! Raw bytes from a room's shell carry whatever the programs inside emit:
//! ANSI escape sequences, cursor movement, bells. Everything a session
//! receives passes through here first, so a chunk is plain text, bounded in
//! size, and safe to render anywhere.

use once_cell::sync::Lazy;
use regex::Regex;

use coderoom_utils::TRUNCATION_MARKER;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// CSI, OSC, and two-byte escape sequences.
static ESCAPE_SEQUENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b(?:\[[0-9;?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[@-Z\\^_])").unwrap()
});

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Decode, strip control/escape sequences, and cap `raw` at `max_bytes`.
pub fn sanitize_chunk(raw: &[u8], max_bytes: usize) -> String {
    let text = String::from_utf8_lossy(raw);
    let stripped = ESCAPE_SEQUENCES.replace_all(&text, "");

    let cleaned: String = stripped
        .chars()
        .filter(|c| matches!(c, '\n' | '\r' | '\t') || !c.is_control())
        .collect();

    cap_text(&cleaned, max_bytes)
}

/// Truncate `text` to at most `max_bytes` bytes of content, appending a
/// visible marker when anything was cut.
pub fn cap_text(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}{}", &text[..end], TRUNCATION_MARKER)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(sanitize_chunk(b"hello world\n", 1024), "hello world\n");
    }

    #[test]
    fn test_csi_sequences_stripped() {
        let raw = b"\x1b[31mred\x1b[0m text";
        assert_eq!(sanitize_chunk(raw, 1024), "red text");
    }

    #[test]
    fn test_osc_title_sequence_stripped() {
        let raw = b"\x1b]0;window title\x07prompt$ ";
        assert_eq!(sanitize_chunk(raw, 1024), "prompt$ ");
    }

    #[test]
    fn test_control_characters_stripped_but_whitespace_kept() {
        let raw = b"line1\n\tline2\x07\x08done\r\n";
        assert_eq!(sanitize_chunk(raw, 1024), "line1\n\tline2done\r\n");
    }

    #[test]
    fn test_oversized_chunk_truncated_with_marker() {
        let raw = vec![b'a'; 100];
        let result = sanitize_chunk(&raw, 10);

        assert!(result.starts_with("aaaaaaaaaa"));
        assert!(result.ends_with(coderoom_utils::TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // Each 'é' is two bytes; a 5-byte cap lands inside a character.
        let text = "ééééé";
        let result = cap_text(text, 5);

        assert!(result.starts_with("éé"));
        assert!(result.ends_with(coderoom_utils::TRUNCATION_MARKER));
    }

    #[test]
    fn test_invalid_utf8_replaced_not_dropped() {
        let raw = [b'o', b'k', 0xff, b'!'];
        let result = sanitize_chunk(&raw, 1024);
        assert!(result.contains("ok"));
        assert!(result.contains('!'));
    }
}
