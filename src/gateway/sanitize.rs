//! Command text sanitizer.
//!
//! First stage of the gateway pipeline. Total and deterministic: any
//! input produces a cleaned string, never an error.

/// Control characters stripped from command input: C0 (U+0000–U+001F),
/// DEL, and the C1 range (U+007F–U+009F).
fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}'..='\u{009F}')
}

/// Normalizes raw command text: strips control characters, collapses
/// whitespace runs to a single space, trims the ends.
///
/// Tabs and newlines are control characters, so they are removed before
/// whitespace collapsing rather than converted to spaces.
pub fn sanitize(raw: &str) -> String {
    let stripped: String = raw.chars().filter(|c| !is_stripped_control(*c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
