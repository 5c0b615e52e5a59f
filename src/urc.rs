//! Classification of unsolicited lines, independent of protocol state.
//!
//! Parsing is pure; gating that depends on driver state (the `+CPIN:`
//! init-done gate, the `+CMTI:` debug gate) is applied by the runner.

use crate::call::CallState;
use crate::registration::Status;

/// A registration report carried by a `+CREG:` line long enough to hold one
/// (short `+CREG: 1` echoes of `AT+CREG=1` parse to `Registration(None)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegistrationReport {
    pub status: Status,
    /// The mode field says unsolicited registration reporting is disabled
    /// and needs an `AT+CREG=1`.
    pub needs_enable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Urc<'a> {
    /// `*ATREADY: 1`
    Ready,
    /// `PB DONE`
    PhonebookDone,
    /// `+CPIN: <code>`
    Pin(&'a str),
    /// `+CREG: <mode>,<stat>[,...]`
    Registration(Option<RegistrationReport>),
    /// `+CSQ: <rssi>,<ber>`
    SignalQuality(Option<u8>),
    /// `+CMTI: <mem>,<index>`, a new stored message
    MessageIndication,
    /// `+CUSD: <m>,"<hex>",<dcs>`, carrying the hex payload
    Ussd(&'a str),
    /// `+CLCC: <idx>,<dir>,<stat>,...,"<number>",<type>`
    CallStatus {
        state: CallState,
        caller_id: &'a str,
    },
    /// `+CLIP:`, acknowledged and ignored
    CallerId,
    Ring,
    NoCarrier,
}

impl<'a> Urc<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        if line == "*ATREADY: 1" {
            return Some(Self::Ready);
        }
        if line == "PB DONE" {
            return Some(Self::PhonebookDone);
        }
        if line.starts_with("+CPIN:") {
            return Some(Self::Pin(line.get(7..).unwrap_or("")));
        }
        if line.starts_with("+CREG:") {
            return Some(Self::Registration(parse_registration(line)));
        }
        if line.starts_with("+CSQ:") {
            return Some(Self::SignalQuality(parse_signal_quality(line)));
        }
        if line.starts_with("+CMTI:") {
            return Some(Self::MessageIndication);
        }
        if line.starts_with("+CUSD:") {
            return Some(Self::Ussd(parse_item(line, 7, 2)));
        }
        if line.starts_with("+CLCC:") {
            let state = parse_item(line, 7, 3)
                .parse::<u8>()
                .map(CallState::from)
                .unwrap_or(CallState::Disconnected);
            return Some(Self::CallStatus {
                state,
                caller_id: parse_item(line, 7, 6),
            });
        }
        if line.starts_with("+CLIP:") {
            return Some(Self::CallerId);
        }
        if line == "RING" {
            return Some(Self::Ring);
        }
        if line == "NO CARRIER" {
            return Some(Self::NoCarrier);
        }
        None
    }
}

// "+CREG: 0,1": mode byte at offset 7, status byte at offset 9.
fn parse_registration(line: &str) -> Option<RegistrationReport> {
    let bytes = line.as_bytes();
    if bytes.len() < 10 {
        return None;
    }
    let status = Status::from(bytes[9].wrapping_sub(b'0'));
    Some(RegistrationReport {
        status,
        needs_enable: bytes[7] == b'0',
    })
}

fn parse_signal_quality(line: &str) -> Option<u8> {
    let rest = line.get(6..)?;
    let rssi = rest.split(',').next()?;
    if rssi.is_empty() {
        return None;
    }
    rssi.parse().ok()
}

/// 1-based comma-separated item of `line[from..]`, with surrounding double
/// quotes stripped. Missing items come back empty.
pub(crate) fn parse_item(line: &str, from: usize, item: usize) -> &str {
    let found = line
        .get(from..)
        .and_then(|rest| rest.split(',').nth(item - 1))
        .unwrap_or("");
    found
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(found)
}
