//! Header/body boundary detection over an accumulating byte buffer.

const SEPARATOR: &[u8] = b"\r\n\r\n";

/// A request head split off from the bytes that follow it.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Request line and header lines, without the blank-line separator.
    pub head: &'a [u8],
    /// Body bytes that arrived together with the head. Empty, never absent,
    /// when the buffer ends exactly at the separator.
    pub body_prefix: &'a [u8],
}

/// Returns the offset of the blank-line separator, scanning from `from`.
///
/// `from` lets callers skip bytes already scanned on earlier reads; it is
/// clamped so a separator straddling two reads is still found.
pub fn find_head_end(buf: &[u8], from: usize) -> Option<usize> {
    let start = from.min(buf.len()).saturating_sub(SEPARATOR.len() - 1);

    buf[start..]
        .windows(SEPARATOR.len())
        .position(|w| w == SEPARATOR)
        .map(|pos| start + pos)
}

/// Splits `buf` at the first blank line, or returns `None` while the head is
/// still incomplete.
pub fn split_head(buf: &[u8]) -> Option<Frame<'_>> {
    let end = find_head_end(buf, 0)?;

    Some(Frame {
        head: &buf[..end],
        body_prefix: &buf[end + SEPARATOR.len()..],
    })
}
