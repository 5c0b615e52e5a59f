use heapless::{String, Vec};

use crate::pdu::Concat;

pub const MAX_NUMBER_LEN: usize = 20;
pub const MAX_MESSAGE_LEN: usize = 1024;
pub const MAX_SMS_PARTS: usize = 10;

/// An outgoing message job, alive from the moment the send sequence starts
/// until every part has been acknowledged with `+CMGS:`.
#[derive(Debug, Default)]
pub(crate) struct OutgoingSms {
    pub recipient: String<MAX_NUMBER_LEN>,
    pub message: String<MAX_MESSAGE_LEN>,
    /// Byte offsets into `message` marking part boundaries. Empty for a
    /// single-PDU message.
    pub splits: Vec<usize, MAX_SMS_PARTS>,
    /// CSMS reference shared by all parts; 0 while no multipart job is
    /// active.
    pub reference: u8,
    /// 1-based index of the part most recently handed to the codec.
    pub part: usize,
    pub force_16bit: bool,
}

impl OutgoingSms {
    pub fn total_parts(&self) -> usize {
        self.splits.len() + 1
    }

    /// Bounds of the next part to send, advancing the part index.
    pub fn next_part_bounds(&mut self) -> (usize, usize) {
        let begin = if self.part == 0 {
            0
        } else {
            self.splits[self.part - 1]
        };
        let end = if self.part >= self.splits.len() {
            self.message.len()
        } else {
            self.splits[self.part]
        };
        self.part += 1;
        (begin, end)
    }

    pub fn parts_remaining(&self) -> bool {
        self.part <= self.splits.len()
    }

    pub fn clear_multipart(&mut self) {
        self.reference = 0;
        self.part = 0;
        self.force_16bit = false;
        self.splits.clear();
    }
}

/// Reassembles incoming concatenated messages from a `AT+CMGL` listing.
///
/// Parts sharing a reference accumulate; a reference different from the last
/// non-zero one flushes what was gathered so far, and the end of the listing
/// flushes unconditionally.
#[derive(Debug, Default)]
pub(crate) struct IncomingSms {
    sender: String<MAX_NUMBER_LEN>,
    text: String<MAX_MESSAGE_LEN>,
    reference: u8,
}

impl IncomingSms {
    pub const fn new() -> Self {
        Self {
            sender: String::new(),
            text: String::new(),
            reference: 0,
        }
    }

    /// Whether a decoded part with `concat` belongs to a different message
    /// than what is currently accumulated.
    pub fn breaks_accumulation(&self, concat: Concat) -> bool {
        self.reference == 0 || self.reference != concat.reference
    }

    pub fn absorb(&mut self, sender: &str, text: &str, concat: Concat) {
        self.reference = concat.reference;
        self.sender.clear();
        if self.sender.push_str(sender).is_err() {
            warn!("sender exceeds capacity, truncating");
        }
        if self.text.push_str(text).is_err() {
            warn!("accumulated message exceeds capacity, truncating");
        }
    }

    /// Take the accumulated message, if any, resetting the accumulator.
    pub fn flush(&mut self) -> Option<(String<MAX_MESSAGE_LEN>, String<MAX_NUMBER_LEN>)> {
        self.reference = 0;
        if self.text.is_empty() {
            self.sender.clear();
            return None;
        }
        let text = core::mem::take(&mut self.text);
        let sender = core::mem::take(&mut self.sender);
        Some((text, sender))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat(reference: u8, part: u8, total: u8) -> Concat {
        Concat {
            reference,
            part,
            total,
        }
    }

    #[test]
    fn same_reference_accumulates_into_one_message() {
        let mut acc = IncomingSms::new();
        for (i, part) in ["foo", "bar", "baz"].iter().enumerate() {
            if acc.breaks_accumulation(concat(5, i as u8 + 1, 3)) {
                assert!(acc.flush().is_none() || i == 0);
            }
            acc.absorb("+123", part, concat(5, i as u8 + 1, 3));
        }
        let (text, sender) = acc.flush().unwrap();
        assert_eq!(text.as_str(), "foobarbaz");
        assert_eq!(sender.as_str(), "+123");
        assert!(acc.flush().is_none());
    }

    #[test]
    fn reference_change_breaks_accumulation() {
        let mut acc = IncomingSms::new();
        acc.absorb("+1", "first", concat(5, 1, 2));
        assert!(acc.breaks_accumulation(concat(6, 1, 1)));
        let (text, _) = acc.flush().unwrap();
        assert_eq!(text.as_str(), "first");
        acc.absorb("+2", "second", concat(6, 1, 1));
        let (text, sender) = acc.flush().unwrap();
        assert_eq!(text.as_str(), "second");
        assert_eq!(sender.as_str(), "+2");
    }

    #[test]
    fn zero_reference_always_breaks() {
        let acc = IncomingSms::new();
        assert!(acc.breaks_accumulation(concat(0, 0, 0)));
        assert!(acc.breaks_accumulation(concat(5, 1, 2)));
    }

    #[test]
    fn outgoing_part_bounds_walk_the_splits() {
        let mut job = OutgoingSms {
            message: String::try_from("aaaabbbbcc").unwrap(),
            ..Default::default()
        };
        job.splits.extend_from_slice(&[4, 8]).unwrap();
        assert_eq!(job.total_parts(), 3);

        assert_eq!(job.next_part_bounds(), (0, 4));
        assert!(job.parts_remaining());
        assert_eq!(job.next_part_bounds(), (4, 8));
        assert!(job.parts_remaining());
        assert_eq!(job.next_part_bounds(), (8, 10));
        assert!(!job.parts_remaining());
    }
}
