use heapless::String;

pub const LINE_BUFFER_LEN: usize = 1024;

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

/// The line buffer overflowed before a line feed arrived. The partial line
/// has been discarded; input is skipped until the next line feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineOverflow;

/// Accumulates raw modem bytes into complete lines.
///
/// Carriage returns are dropped and non-printable bytes (>= 0x7F) are
/// replaced with `?` so every yielded line is valid UTF-8 and safe to log.
/// A line feed completes the line and resets the buffer.
///
/// Overflow is reported once per oversized line instead of silently wrapping
/// around; the remainder of the line is swallowed so a truncated tail is
/// never surfaced as a line of its own.
pub struct LineBuffer<const N: usize = LINE_BUFFER_LEN> {
    buf: heapless::Vec<u8, N>,
    skipping: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            skipping: false,
        }
    }

    /// Feed a single byte, yielding a completed line on line feed.
    pub fn feed(&mut self, byte: u8) -> Result<Option<String<N>>, LineOverflow> {
        if byte == CR {
            return Ok(None);
        }

        if byte == LF {
            if self.skipping {
                self.skipping = false;
                self.buf.clear();
                return Ok(None);
            }
            let mut line = String::new();
            for &b in self.buf.iter() {
                // sanitised below, always single-byte UTF-8
                line.push(b as char).ok();
            }
            self.buf.clear();
            return Ok(Some(line));
        }

        if self.skipping {
            return Ok(None);
        }

        let byte = if byte >= 0x7F { b'?' } else { byte };

        if self.buf.push(byte).is_err() {
            self.buf.clear();
            self.skipping = true;
            return Err(LineOverflow);
        }

        Ok(None)
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str<const N: usize>(buf: &mut LineBuffer<N>, s: &str) -> Option<String<N>> {
        let mut out = None;
        for &b in s.as_bytes() {
            if let Ok(Some(line)) = buf.feed(b) {
                out = Some(line);
            }
        }
        out
    }

    #[test]
    fn cr_is_dropped_lf_completes() {
        let mut buf = LineBuffer::<64>::new();
        let line = feed_str(&mut buf, "OK\r\n").unwrap();
        assert_eq!(line.as_str(), "OK");
    }

    #[test]
    fn high_bytes_become_question_marks() {
        let mut buf = LineBuffer::<64>::new();
        assert_eq!(buf.feed(b'A'), Ok(None));
        assert_eq!(buf.feed(0x80), Ok(None));
        assert_eq!(buf.feed(0x7F), Ok(None));
        let line = buf.feed(b'\n').unwrap().unwrap();
        assert_eq!(line.as_str(), "A??");
    }

    #[test]
    fn empty_line_is_yielded_empty() {
        let mut buf = LineBuffer::<64>::new();
        let line = feed_str(&mut buf, "\r\n").unwrap();
        assert!(line.is_empty());
    }

    #[test]
    fn overflow_reports_once_and_swallows_the_tail() {
        let mut buf = LineBuffer::<4>::new();
        assert_eq!(buf.feed(b'a'), Ok(None));
        assert_eq!(buf.feed(b'b'), Ok(None));
        assert_eq!(buf.feed(b'c'), Ok(None));
        assert_eq!(buf.feed(b'd'), Ok(None));
        assert_eq!(buf.feed(b'e'), Err(LineOverflow));
        // the rest of the oversized line is dropped, including its LF
        assert_eq!(buf.feed(b'f'), Ok(None));
        assert_eq!(buf.feed(b'\n'), Ok(None));
        // and the next line comes through intact
        let line = feed_str(&mut buf, "OK\r\n").unwrap();
        assert_eq!(line.as_str(), "OK");
    }
}
