use bytes::Bytes;

use crate::codec::XID_DIGITS;

/// Status code marking unsolicited continuous data (e.g. scan frames).
pub const STREAMING_STATUS: &[u8; 2] = b"99";

pub(crate) fn is_terminator(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// One raw line as received, including its terminator when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    raw: Bytes,
}

impl Line {
    /// Wrap raw line bytes.
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self { raw: raw.into() }
    }

    /// Raw bytes including the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Bytes without the trailing terminator.
    pub fn body(&self) -> &[u8] {
        match self.raw.last() {
            Some(&b) if is_terminator(b) => &self.raw[..self.raw.len() - 1],
            _ => &self.raw,
        }
    }

    /// True for a line consisting solely of a terminator.
    pub fn is_blank(&self) -> bool {
        self.raw.len() == 1 && is_terminator(self.raw[0])
    }

    /// True when the line ended with `\n` or `\r` rather than being split
    /// at the maximum line length.
    pub fn is_terminated(&self) -> bool {
        self.raw.last().copied().is_some_and(is_terminator)
    }

    /// Body with the trailing checksum byte removed.
    pub fn payload(&self) -> &[u8] {
        let body = self.body();
        &body[..body.len().saturating_sub(1)]
    }

    /// The checksum byte the device sent, if the line has one.
    pub fn checksum_byte(&self) -> Option<u8> {
        self.body().last().copied()
    }

    /// Lossy text of the body, for logs and display.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.body()).into_owned()
    }

    /// Number of raw bytes including the terminator.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// One complete reply: a run of lines ending in a blank line.
///
/// Not `Clone`: each response has exactly one consumer (a waiting
/// transaction, the stream handler, or the discard path), and ownership
/// moves to it.
#[derive(Debug, PartialEq, Eq)]
pub struct Response {
    lines: Vec<Line>,
}

impl Response {
    /// Assemble a response from already-split lines.
    pub fn from_lines(lines: Vec<Line>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn line(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    /// Number of lines including the terminating blank line.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total raw bytes across all lines.
    pub fn byte_len(&self) -> usize {
        self.lines.iter().map(Line::len).sum()
    }

    /// Echoed command text on line 0, without the transaction id.
    pub fn command(&self) -> Option<&str> {
        let body = self.lines.first()?.body();
        let end = body.iter().position(|&b| b == b';').unwrap_or(body.len());
        std::str::from_utf8(&body[..end]).ok()
    }

    /// Two-character status code at the start of line 1.
    pub fn status(&self) -> Option<&str> {
        let body = self.lines.get(1)?.body();
        std::str::from_utf8(body.get(..2)?).ok()
    }

    /// Transaction id echoed after the first `;` on line 0.
    pub fn transaction_id(&self) -> Option<u32> {
        let body = self.lines.first()?.body();
        let semi = body.iter().position(|&b| b == b';')?;
        let digits: &[u8] = &body[semi + 1..];
        let len = digits
            .iter()
            .take(XID_DIGITS)
            .take_while(|b| b.is_ascii_hexdigit())
            .count();
        if len == 0 {
            return None;
        }
        let text = std::str::from_utf8(&digits[..len]).ok()?;
        u32::from_str_radix(text, 16).ok()
    }

    /// True for unsolicited continuous data (status `99`).
    pub fn is_streaming(&self) -> bool {
        self.lines
            .get(1)
            .is_some_and(|line| line.body().starts_with(STREAMING_STATUS))
    }

    /// Data lines (after the status line, before the blank terminator)
    /// with checksum and terminator stripped.
    pub fn payload_lines(&self) -> impl Iterator<Item = &[u8]> {
        let end = match self.lines.last() {
            Some(last) if last.is_blank() => self.lines.len() - 1,
            _ => self.lines.len(),
        };
        self.lines
            .get(2..end)
            .unwrap_or_default()
            .iter()
            .map(Line::payload)
    }

    /// Take ownership of the lines.
    pub fn into_lines(self) -> Vec<Line> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(text: &str) -> Response {
        Response::from_lines(
            text.split_inclusive('\n')
                .map(|l| Line::new(l.as_bytes().to_vec()))
                .collect(),
        )
    }

    #[test]
    fn line_accessors() {
        let line = Line::new(&b"00P\n"[..]);
        assert_eq!(line.body(), b"00P");
        assert_eq!(line.payload(), b"00");
        assert_eq!(line.checksum_byte(), Some(b'P'));
        assert_eq!(line.text(), "00P");
        assert!(line.is_terminated());
        assert!(!line.is_blank());

        assert!(Line::new(&b"\n"[..]).is_blank());
        assert!(Line::new(&b"\r"[..]).is_blank());
        assert!(!Line::new(&b"abc"[..]).is_terminated());
    }

    #[test]
    fn header_fields() {
        let r = response("VV;1a2b3c4d\n00P\nVEND:Hokuyo;[\n\n");
        assert_eq!(r.command(), Some("VV"));
        assert_eq!(r.status(), Some("00"));
        assert_eq!(r.transaction_id(), Some(0x1a2b_3c4d));
        assert!(!r.is_streaming());
        assert_eq!(r.len(), 4);
    }

    #[test]
    fn transaction_id_missing_or_malformed() {
        assert_eq!(response("VV\n00P\n\n").transaction_id(), None);
        assert_eq!(response("VV;zz\n00P\n\n").transaction_id(), None);
        assert_eq!(response("VV;ff\n00P\n\n").transaction_id(), Some(0xff));
    }

    #[test]
    fn streaming_marker_is_on_line_one() {
        let r = response("MD0000108001000;00000001\n99b\nABCD7\n\n");
        assert!(r.is_streaming());
        assert_eq!(r.status(), Some("99"));

        let not_streaming = response("99;00000001\n00P\n\n");
        assert!(!not_streaming.is_streaming());
    }

    #[test]
    fn payload_lines_skip_header_and_terminator() {
        let r = response("PP;00000001\n00P\nMODL:UTM;x\nDMIN:23;7\n\n");
        let payload: Vec<&[u8]> = r.payload_lines().collect();
        assert_eq!(payload, vec![&b"MODL:UTM;"[..], &b"DMIN:23;"[..]]);

        let short = response("QT;00000001\n00P\n\n");
        assert_eq!(short.payload_lines().count(), 0);
    }

    #[test]
    fn byte_len_and_into_lines() {
        let r = response("QT;00000001\n00P\n\n");
        assert_eq!(r.byte_len(), 12 + 4 + 1);
        let lines = r.into_lines();
        assert_eq!(lines.len(), 3);
    }
}
