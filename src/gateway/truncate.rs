//! Byte-accounted output truncation.
//!
//! Bounds the text returned to the chat surface. The cut never splits a
//! multi-byte character, and the returned byte length — marker included —
//! never exceeds the budget. The gateway's minimum output budget (512
//! bytes) always leaves room for the marker.

/// Appended to truncated output.
const TRUNCATION_MARKER: &str = "\n... [output truncated: size limit exceeded]";

/// Cuts `output` to at most `max_bytes` of UTF-8.
///
/// Within budget the text is returned unchanged with `false`; otherwise
/// the text is cut at a character boundary, the marker is appended, and
/// `true` is returned.
pub fn truncate(output: &str, max_bytes: usize) -> (String, bool) {
    if output.len() <= max_bytes {
        return (output.to_string(), false);
    }

    let budget = max_bytes.saturating_sub(TRUNCATION_MARKER.len());
    let mut cut = budget.min(output.len());
    while cut > 0 && !output.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut text = output[..cut].to_string();
    text.push_str(TRUNCATION_MARKER);
    (text, true)
}
