//! Line framing: CR/LF run splitting and newline framing.
//!
//! Both relay directions are line-oriented. Data arriving from the backend
//! socket or inside a WebSocket text message may use `\n`, `\r\n`, or even
//! bare `\r` terminators, and a single read may carry several lines at once.
//! [`split_lines`] normalises all of that into discrete line events;
//! [`frame_line`] produces the single canonical `\n`-terminated form the relay
//! writes on either side.
//!
//! Splitting treats any *run* of CR/LF characters as one separator, so
//! `"a\r\nb"` and `"a\n\n\nb"` both yield exactly `["a", "b"]`. Empty
//! segments are dropped: a lone terminator produces no line event at all.

// ── Public API ────────────────────────────────────────────────────────────────

/// Splits `text` on runs of carriage-return/line-feed characters, yielding
/// each non-empty segment in order.
///
/// # Examples
///
/// ```rust
/// use relay_core::split_lines;
///
/// let lines: Vec<&str> = split_lines("hello\r\nworld\n").collect();
/// assert_eq!(lines, vec!["hello", "world"]);
/// ```
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    // Splitting on the individual characters and dropping empty segments is
    // equivalent to splitting on one-or-more CR/LF: every extra terminator in
    // a run contributes only an empty segment, which the filter removes.
    text.split(['\r', '\n']).filter(|segment| !segment.is_empty())
}

/// Frames an outgoing line with exactly one trailing `\n`.
///
/// The input must already be a bare line (no terminator); [`split_lines`]
/// produces exactly that shape.
pub fn frame_line(line: &str) -> String {
    let mut framed = String::with_capacity(line.len() + 1);
    framed.push_str(line);
    framed.push('\n');
    framed
}

// ── Tests ─────────────────────────────────────────────────────────────────────
