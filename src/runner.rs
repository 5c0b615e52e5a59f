//! The tick-driven protocol engine.
//!
//! [`Runner::poll`] is meant to be called from the board's main loop and
//! never blocks: it releases a pending power pulse, applies the timeout
//! rules, drains whatever the serial port has buffered one framed line at a
//! time and, once the link is quiet and no ack is outstanding, starts the
//! next queued host request. [`Runner::update`] is the slow periodic hook
//! that kicks off a health check of the link.

use core::fmt::Write as _;

use embassy_time::Instant;
use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};
use heapless::String;

use crate::call::CallState;
use crate::config::ModemConfig;
use crate::error::Error;
use crate::events::Callbacks;
use crate::hex::{decode_hex, encode_hex};
use crate::line::{LineBuffer, LINE_BUFFER_LEN};
use crate::module_timing::{
    boot_grace_time, call_poll_interval, idle_timeout, modem_init_timeout, power_pulse_time,
    rx_timeout,
};
use crate::modules::ModemFamily;
use crate::pdu::{Concat, PduCodec, PduError};
use crate::registration::{PinStatus, RegistrationStatus};
use crate::sms::{IncomingSms, OutgoingSms, MAX_MESSAGE_LEN, MAX_NUMBER_LEN, MAX_SMS_PARTS};
use crate::state::State;
use crate::urc::{parse_item, Urc};

pub const MAX_CMD_LEN: usize = 128;
pub const MAX_USSD_LEN: usize = 64;

const MAX_USSD_HEX_LEN: usize = MAX_USSD_LEN * 2;
const MAX_USSD_DECODED_LEN: usize = 256;
const MAX_PDU_HEX_LEN: usize = 512;

const CTRL_Z: u8 = 0x1A;

/// Host requests waiting for the engine to go idle. One slot per kind;
/// re-requesting before the previous request was started overwrites it.
#[derive(Default)]
struct PendingRequests {
    send_sms: Option<(String<MAX_NUMBER_LEN>, String<MAX_MESSAGE_LEN>)>,
    dial: Option<String<MAX_NUMBER_LEN>>,
    connect: bool,
    disconnect: bool,
    send_ussd: Option<String<MAX_USSD_LEN>>,
    send_at: Option<String<MAX_CMD_LEN>>,
    incoming_message: bool,
    message_cleanup: bool,
}

pub struct Runner<'a, S, C, P>
where
    S: Read + Write + ReadReady,
    C: ModemConfig,
    P: PduCodec,
{
    serial: S,
    config: C,
    pdu: P,

    state: State,
    family: ModemFamily,
    line: LineBuffer<LINE_BUFFER_LEN>,
    callbacks: Callbacks<'a>,
    pending: PendingRequests,

    /// A command with a terminating `OK`/`ERROR` is outstanding; nothing new
    /// is transmitted until it resolves.
    expect_ack: bool,
    /// Copy of the outstanding command, to swallow its echo while `ATE0` has
    /// not taken effect yet.
    current_cmd: String<MAX_CMD_LEN>,

    modem_ready: bool,
    init_done: bool,
    debug: bool,

    pin: PinStatus,
    registration: RegistrationStatus,
    registration_required: bool,
    rssi: Option<u8>,

    started: Instant,
    last_tx: Option<Instant>,
    last_rx: Option<Instant>,
    power_pulse: Option<Instant>,

    call_state: CallState,
    last_call_poll: Option<Instant>,
    dialed_number: String<MAX_NUMBER_LEN>,

    outgoing: OutgoingSms,
    incoming: IncomingSms,
    csms_counter: u8,
    /// Index and stat fields of the last `+CMGL:` header seen.
    parse_index: u8,
    parse_stat: u8,

    ussd_code: String<MAX_USSD_LEN>,
}

impl<'a, S, C, P> Runner<'a, S, C, P>
where
    S: Read + Write + ReadReady,
    C: ModemConfig,
    P: PduCodec,
{
    pub fn new(serial: S, config: C, pdu: P) -> Self {
        Self {
            serial,
            config,
            pdu,
            state: State::Idle,
            family: ModemFamily::A76xx,
            line: LineBuffer::new(),
            callbacks: Callbacks::new(),
            pending: PendingRequests::default(),
            expect_ack: false,
            current_cmd: String::new(),
            modem_ready: false,
            init_done: false,
            debug: false,
            pin: PinStatus::new(),
            registration: RegistrationStatus::new(),
            registration_required: false,
            rssi: None,
            started: Instant::now(),
            last_tx: None,
            last_rx: None,
            power_pulse: None,
            call_state: CallState::Disconnected,
            last_call_poll: None,
            dialed_number: String::new(),
            outgoing: OutgoingSms::default(),
            incoming: IncomingSms::new(),
            csms_counter: 1,
            parse_index: 0,
            parse_stat: 0,
            ussd_code: String::new(),
        }
    }

    /// Queue an SMS. Splitting into parts happens when the send starts.
    pub fn send_sms(&mut self, recipient: &str, message: &str) -> Result<(), Error> {
        let recipient = String::try_from(recipient).map_err(|_| Error::Overflow)?;
        let message = String::try_from(message).map_err(|_| Error::Overflow)?;
        self.pending.send_sms = Some((recipient, message));
        Ok(())
    }

    /// Queue a USSD code (e.g. `*100#`) to be sent.
    pub fn send_ussd(&mut self, code: &str) -> Result<(), Error> {
        let code = String::try_from(code).map_err(|_| Error::Overflow)?;
        self.pending.send_ussd = Some(code);
        Ok(())
    }

    /// Queue a raw AT command. The response lines still pass through the
    /// regular classification.
    pub fn send_at(&mut self, cmd: &str) -> Result<(), Error> {
        let cmd = String::try_from(cmd).map_err(|_| Error::Overflow)?;
        self.pending.send_at = Some(cmd);
        Ok(())
    }

    /// Queue a voice call to `number`.
    pub fn dial(&mut self, number: &str) -> Result<(), Error> {
        let number = String::try_from(number).map_err(|_| Error::Overflow)?;
        self.pending.dial = Some(number);
        Ok(())
    }

    /// Answer the pending incoming call.
    pub fn connect(&mut self) {
        self.pending.connect = true;
    }

    /// Hang up the call in progress.
    pub fn disconnect(&mut self) {
        self.pending.disconnect = true;
    }

    /// In debug mode the engine stays passive: no periodic checks, no idle
    /// flushes and no reaction to message indications, so raw AT traffic can
    /// be observed undisturbed.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn is_registered(&self) -> bool {
        self.registration.registered()
    }

    /// Last RSSI reported by `AT+CSQ`, raw 0..=31 scale.
    pub fn signal_quality(&self) -> Option<u8> {
        self.rssi
    }

    pub fn call_state(&self) -> CallState {
        self.call_state
    }

    pub fn modem_family(&self) -> ModemFamily {
        self.family
    }

    pub fn on_sms_received(
        &mut self,
        cb: &'a mut (dyn FnMut(&str, &str) + 'a),
    ) -> Result<(), Error> {
        self.callbacks.add_sms_received(cb)
    }

    pub fn on_sms_sent(&mut self, cb: &'a mut (dyn FnMut(&str, &str) + 'a)) -> Result<(), Error> {
        self.callbacks.add_sms_sent(cb)
    }

    pub fn on_sms_send_failed(
        &mut self,
        cb: &'a mut (dyn FnMut(&str, &str) + 'a),
    ) -> Result<(), Error> {
        self.callbacks.add_sms_send_failed(cb)
    }

    pub fn on_incoming_call(&mut self, cb: &'a mut (dyn FnMut(&str) + 'a)) -> Result<(), Error> {
        self.callbacks.add_incoming_call(cb)
    }

    pub fn on_call_connected(&mut self, cb: &'a mut (dyn FnMut() + 'a)) -> Result<(), Error> {
        self.callbacks.add_call_connected(cb)
    }

    pub fn on_call_disconnected(&mut self, cb: &'a mut (dyn FnMut() + 'a)) -> Result<(), Error> {
        self.callbacks.add_call_disconnected(cb)
    }

    pub fn on_ussd_received(&mut self, cb: &'a mut (dyn FnMut(&str) + 'a)) -> Result<(), Error> {
        self.callbacks.add_ussd_received(cb)
    }

    /// One fast tick. Call this from the main loop.
    pub fn poll(&mut self) -> Result<(), Error> {
        let now = Instant::now();

        // Release the power key once the pulse has been held long enough.
        if let Some(pulsed) = self.power_pulse {
            if pulsed + power_pulse_time() < now {
                if let Some(pin) = self.config.power_pin() {
                    pin.set_low().map_err(|_| Error::IoPin)?;
                }
                self.power_pulse = None;
            }
        }

        if self.state == State::ModemWait {
            if self.modem_ready {
                info!("Modem initialized");
                self.last_tx = Some(now);
                self.state = State::Idle;
                return Ok(());
            }
            if let Some(tx) = self.last_tx {
                if tx + modem_init_timeout() < now {
                    warn!("Modem failed to initialize in a timely manner");
                    self.last_tx = Some(now);
                    self.state = State::Idle;
                    return Ok(());
                }
            }
        } else if let Some(tx) = self.last_tx {
            if self.last_rx.is_none() && tx + rx_timeout() < now {
                self.modem_ready = false;
                if self.config.power_pin().is_none() {
                    error!("Modem not responding and no power pin to cycle it");
                    self.last_tx = Some(now);
                    return Ok(());
                }
                warn!("Modem not responding, power cycling it (this is fine on first boot)");
                if let Some(pin) = self.config.power_pin() {
                    pin.set_high().map_err(|_| Error::IoPin)?;
                }
                self.power_pulse = Some(now);
                self.expect_ack = false;
                self.state = State::ModemWait;
                return Ok(());
            }

            let waiting_for_pin = self.state == State::PinWait;
            if !self.debug && !waiting_for_pin && tx + idle_timeout() < now {
                // Quiet for a while; force a flush to resync the channel.
                return self.send_terminated("", State::Idle);
            }
        }

        // Drain buffered input first, one framed line at a time, in arrival
        // order.
        if self.read_ready()? {
            while self.read_ready()? {
                let mut byte = [0u8; 1];
                self.serial.read(&mut byte).map_err(|_| Error::Serial)?;
                match self.line.feed(byte[0]) {
                    Ok(Some(line)) => {
                        self.last_rx = Some(Instant::now());
                        self.handle_line(&line)?;
                    }
                    Ok(None) => {}
                    Err(_) => error!("Line buffer overflow, dropping oversized line"),
                }
            }
            return Ok(());
        }

        if self.expect_ack {
            return Ok(());
        }

        self.drain_pending(now)
    }

    /// The slow periodic hook. Starts a network health check when the engine
    /// is idle and out of the boot grace window.
    pub fn update(&mut self) -> Result<(), Error> {
        if self.state != State::Idle
            || self.expect_ack
            || self.call_state != CallState::Disconnected
        {
            return Ok(());
        }
        if Instant::now() < self.started + boot_grace_time() {
            return Ok(());
        }
        if self.debug {
            return Ok(());
        }
        debug!("Performing periodic network checks");
        self.periodic_check()
    }

    fn read_ready(&mut self) -> Result<bool, Error> {
        self.serial.read_ready().map_err(|_| Error::Serial)
    }

    fn periodic_check(&mut self) -> Result<(), Error> {
        if !self.init_done {
            return self.send_cmd_ack("ATE0", State::Init);
        }
        self.send_cmd_ack("AT+CREG?", State::RegWait)
    }

    /// Start the next queued request. Only called with no ack outstanding
    /// and no buffered input.
    fn drain_pending(&mut self, now: Instant) -> Result<(), Error> {
        // Raw commands go out while idle, or at any time in debug mode.
        if self.state == State::Idle || self.debug {
            if let Some(cmd) = self.pending.send_at.take() {
                return self.send_cmd_ack(&cmd, State::Idle);
            }
        }

        if self.state == State::PinWait {
            if self.pin.required {
                // Acted on once, so the PIN is never entered twice.
                self.pin.required = false;
                let cmd = match self.config.pin_code() {
                    None => {
                        error!("SIM PIN required but no pin_code configured");
                        None
                    }
                    Some(pin) => {
                        let mut cmd = String::<MAX_CMD_LEN>::new();
                        let _ = write!(cmd, "AT+CPIN={}", pin);
                        Some(cmd)
                    }
                };
                if let Some(cmd) = cmd {
                    debug!("Entering PIN");
                    return self.send_cmd_ack(&cmd, State::PinWait);
                }
            } else if self.pin.accepted {
                return self.periodic_check();
            }
            return Ok(());
        }

        if self.state == State::RegWait {
            if self.registration_required {
                self.registration_required = false;
                return self.send_cmd_ack("AT+CREG=1", State::Idle);
            }
            if self.registration.registered() {
                return self.send_cmd_ack("AT+CSQ", State::Csq);
            }
            return Ok(());
        }

        if self.state != State::Idle {
            return Ok(());
        }

        // Everything below needs the network.
        if !self.registration.registered() {
            return Ok(());
        }

        if self.pending.connect {
            self.pending.connect = false;
            if self.call_state == CallState::Active {
                return Ok(());
            }
            if self.call_state != CallState::Incoming {
                warn!("No incoming call to answer");
                return Ok(());
            }
            debug!("Connecting...");
            return self.send_cmd_ack("ATA", State::Idle);
        }

        if self.pending.disconnect {
            self.pending.disconnect = false;
            if self.call_state == CallState::Disconnected {
                return Ok(());
            }
            debug!("Disconnecting...");
            return self.send_cmd_ack("AT+CHUP", State::Idle);
        }

        if let Some(number) = self.pending.dial.take() {
            if self.call_state != CallState::Disconnected {
                warn!("Call already in progress");
                return Ok(());
            }
            self.dialed_number = number;
            return self.send_cmd_ack("AT+CSCS=\"GSM\"", State::Dialing1);
        }

        // While a call is up, keep its status fresh, but not on every tick.
        if self.call_state != CallState::Disconnected {
            if self
                .last_call_poll
                .map_or(true, |t| t + call_poll_interval() < now)
            {
                self.last_call_poll = Some(now);
                return self.send_cmd_ack("AT+CLCC", State::Idle);
            }
            return Ok(());
        }

        if self.pending.incoming_message {
            self.pending.incoming_message = false;
            return self.check_sms_messages();
        }

        if let Some((recipient, message)) = self.pending.send_sms.take() {
            self.outgoing.recipient = recipient;
            self.outgoing.message = message;
            return self.send_cmd_ack("AT+CSCS=\"GSM\"", State::SendingSms1);
        }

        if self.pending.message_cleanup {
            if self.parse_index == 0 {
                self.pending.message_cleanup = false;
                return Ok(());
            }
            let mut cmd = String::<MAX_CMD_LEN>::new();
            let _ = write!(cmd, "AT+CMGD={}", self.parse_index);
            self.send_cmd_ack(&cmd, State::Idle)?;
            self.parse_index -= 1;
            if self.parse_index == 0 {
                // Storage is clean; re-list to pick up anything that arrived
                // meanwhile.
                self.pending.message_cleanup = false;
                self.state = State::CheckSms1;
            }
            return Ok(());
        }

        if let Some(code) = self.pending.send_ussd.take() {
            self.ussd_code = code;
            return self.set_message_mode(1, State::SendUssd1);
        }

        Ok(())
    }

    /// A complete framed line from the modem.
    fn handle_line(&mut self, line: &str) -> Result<(), Error> {
        if line.is_empty() {
            return Ok(());
        }
        debug!("<<: {} - {:?} ({})", line, self.state, self.expect_ack);

        if let Some(urc) = Urc::parse(line) {
            if self.handle_urc(urc) {
                return Ok(());
            }
        }

        if line == self.current_cmd.as_str() {
            // Echo of our own command; ATE0 has not taken effect yet.
            return Ok(());
        }

        let ok = line == "OK";
        if self.expect_ack {
            let cmd = core::mem::take(&mut self.current_cmd);
            self.expect_ack = false;

            if line == "ERROR" || line.starts_with("+CME ERROR:") {
                if line == "ERROR" {
                    warn!("Received ERROR from command {}", cmd.as_str());
                } else {
                    error!("Command {} failed: {}", cmd.as_str(), line);
                }
                self.abort_sms_job();
                self.state = State::Idle;
                return Ok(());
            }

            if !ok {
                debug!("Not an ack in {:?}: {}", self.state, line);
                // The timeout machinery recovers from here.
                self.state = State::Idle;
                return Ok(());
            }
        }

        self.dispatch(line, ok)
    }

    /// Unsolicited lines, valid in any state. Returns `false` when the line
    /// should fall through to the solicited handling instead.
    fn handle_urc(&mut self, urc: Urc<'_>) -> bool {
        match urc {
            Urc::Ready => {
                self.modem_ready = true;
                true
            }
            Urc::PhonebookDone | Urc::CallerId | Urc::Ring | Urc::NoCarrier => true,
            Urc::Pin(code) => {
                if !self.init_done {
                    // Boot chatter; the PIN handshake starts after init.
                    return false;
                }
                if !self.pin.apply(code) {
                    self.pin.required = false;
                    error!("Unsupported PIN lock: {}", code);
                } else if self.pin.required {
                    debug!("PIN required");
                } else {
                    debug!("PIN accepted");
                }
                true
            }
            Urc::Registration(None) => true,
            Urc::Registration(Some(report)) => {
                let was_registered = self.registration.registered();
                self.registration.set_status(report.status);
                if self.registration.registered() {
                    if !was_registered {
                        info!("Registered on the network");
                    }
                } else {
                    if was_registered {
                        warn!("Network registration lost");
                    }
                    if report.needs_enable {
                        self.registration_required = true;
                    }
                }
                true
            }
            Urc::SignalQuality(rssi) => {
                if let Some(rssi) = rssi {
                    debug!("RSSI: {}", rssi);
                    self.rssi = Some(rssi);
                }
                true
            }
            Urc::MessageIndication => {
                if self.debug {
                    return false;
                }
                self.pending.incoming_message = true;
                true
            }
            Urc::Ussd(payload) => {
                self.handle_ussd_payload(payload);
                true
            }
            Urc::CallStatus { state, caller_id } => {
                if state != self.call_state {
                    debug!("Call state is now {:?}", state);
                    self.call_state = state;
                    match state {
                        CallState::Incoming => {
                            debug!("Incoming call from {}", caller_id);
                            self.callbacks.notify_incoming_call(caller_id);
                        }
                        CallState::Active => self.callbacks.notify_call_connected(),
                        CallState::Disconnected => self.callbacks.notify_call_disconnected(),
                        _ => {}
                    }
                }
                true
            }
        }
    }

    fn handle_ussd_payload(&mut self, payload: &str) {
        match decode_hex::<MAX_USSD_DECODED_LEN>(payload) {
            Ok(bytes) => match core::str::from_utf8(&bytes) {
                Ok(text) => {
                    debug!("Received USSD message: {}", text);
                    self.callbacks.notify_ussd_received(text);
                }
                Err(_) => warn!("USSD payload is not valid UTF-8"),
            },
            Err(_) => warn!("Malformed USSD hex payload"),
        }
    }

    /// Solicited lines, interpreted by the current state. `ok` is set for a
    /// bare `OK`, which for acked commands means the ack was just consumed.
    fn dispatch(&mut self, line: &str, ok: bool) -> Result<(), Error> {
        match self.state {
            // Nothing solicited is expected in these; poll() drives them.
            State::Idle | State::ModemWait | State::PinWait | State::RegWait => {}

            State::Init => {
                self.init_done = true;
                self.send_cmd("AT+CGMM", State::ModemDetect)?;
            }
            State::ModemDetect => {
                self.family = ModemFamily::from_model(line);
                debug!("Modem family {:?} ({})", self.family, line);
                // The trailing OK of AT+CGMM acts as the ack.
                self.expect_ack = true;
                self.state = State::Init2;
            }
            State::Init2 => self.send_cmd_ack("AT+CPIN?", State::PinWait)?,

            State::Csq | State::CheckSms => self.check_sms_messages()?,
            State::CheckSms1 => {
                self.parse_index = 0;
                // 4: all stored messages
                self.send_cmd("AT+CMGL=4", State::ParseSmsResponse)?;
            }
            State::ParseSmsResponse => {
                if line.starts_with("+CMGL:") {
                    self.parse_sms_header(line);
                    self.state = State::ReceiveSms;
                } else if ok {
                    // Empty listing; refresh call status instead.
                    self.send_cmd_ack("AT+CLCC", State::Idle)?;
                }
            }
            State::ReceiveSms => {
                if line.starts_with("+CMGL:") {
                    self.parse_sms_header(line);
                } else if ok {
                    self.flush_incoming();
                    self.pending.message_cleanup = true;
                    self.state = State::Idle;
                } else if self.parse_stat == 0 {
                    // Body line; only unread messages are decoded.
                    self.parse_sms_body(line);
                }
            }

            State::Dialing1 => {
                let mut cmd = String::<MAX_CMD_LEN>::new();
                let _ = write!(cmd, "ATD{};", self.dialed_number);
                self.send_cmd(&cmd, State::Dialing2)?;
            }
            State::Dialing2 => {
                if ok {
                    debug!("Dialing: {}", self.dialed_number.as_str());
                    self.state = State::Idle;
                } else {
                    self.error_out()?;
                }
            }

            State::SendingSms1 => self.send_cmd("AT+CSCA?", State::SendingSms2)?,
            State::SendingSms2 => {
                if line.starts_with("+CSCA:") {
                    self.pdu.set_smsc(parse_item(line, 7, 1));
                    // Consume the trailing OK as the ack.
                    self.expect_ack = true;
                } else if ok {
                    self.prepare_multipart();
                    self.set_message_mode(0, State::SendingSms3)?;
                }
            }
            State::SendingSms3 => self.send_sms_header()?,
            State::SendingSms4 => {
                if line == "> " {
                    self.send_sms_body()?;
                }
            }
            State::SendingSms5 => {
                if line.starts_with("+CMGS:") {
                    debug!("SMS part accepted: {}", line);
                    if !self.outgoing.splits.is_empty() {
                        if self.outgoing.parts_remaining() {
                            self.state = State::SendingSms3;
                            self.expect_ack = true;
                            return Ok(());
                        }
                        self.outgoing.clear_multipart();
                    }
                    let message = self.outgoing.message.clone();
                    let recipient = self.outgoing.recipient.clone();
                    self.callbacks.notify_sms_sent(&message, &recipient);
                    // The trailing OK drives the post-send message check.
                    self.state = State::CheckSms;
                    self.expect_ack = true;
                }
            }

            State::SendUssd1 => self.send_cmd_ack("AT+CSCS=?", State::SendUssd2)?,
            State::SendUssd2 => match encode_hex::<MAX_USSD_HEX_LEN>(self.ussd_code.as_bytes()) {
                Ok(hex) => {
                    let mut cmd = String::<{ MAX_USSD_HEX_LEN + 16 }>::new();
                    let _ = write!(cmd, "AT+CUSD=1,\"{}\"", hex);
                    self.send_cmd_ack(&cmd, State::SendUssd3)?;
                }
                Err(_) => {
                    error!("USSD code too long to encode");
                    self.state = State::Idle;
                }
            },
            State::SendUssd3 => {
                if ok {
                    debug!("Sent USSD code: {}", self.ussd_code.as_str());
                    self.state = State::Idle;
                } else {
                    self.error_out()?;
                }
            }
        }
        Ok(())
    }

    /// An acked command came back `ERROR`/`+CME ERROR`. If an SMS job was in
    /// flight it is reported as failed and torn down.
    fn abort_sms_job(&mut self) {
        if self.state.is_sending_sms() {
            let recipient = self.outgoing.recipient.clone();
            self.outgoing.clear_multipart();
            self.callbacks
                .notify_sms_send_failed("command failed", &recipient);
        }
    }

    fn error_out(&mut self) -> Result<(), Error> {
        self.registration.reset();
        // Verbose CME errors make the follow-up logs actionable.
        self.send_terminated("AT+CMEE=2", State::Idle)
    }

    fn check_sms_messages(&mut self) -> Result<(), Error> {
        self.set_message_mode(0, State::CheckSms1)
    }

    fn set_message_mode(&mut self, mode: u8, next: State) -> Result<(), Error> {
        let mut cmd = String::<MAX_CMD_LEN>::new();
        let _ = write!(cmd, "AT+CMGF={}", mode);
        self.send_cmd_ack(&cmd, next)
    }

    /// Walk the whole message once with the codec to fix the part
    /// boundaries, the shared reference and the encoding width.
    fn prepare_multipart(&mut self) {
        self.outgoing.splits.clear();
        let mut offset = 0;
        let mut force_16bit = false;
        while let Some(consumed) = self.pdu.check_multipart(
            &self.outgoing.recipient,
            &self.outgoing.message,
            offset,
            &mut force_16bit,
        ) {
            let split = offset + consumed;
            if consumed == 0 {
                warn!("Multipart split made no progress at {}", offset);
                break;
            }
            if self.outgoing.splits.push(split).is_err() {
                warn!("Message needs more than {} parts, truncating", MAX_SMS_PARTS);
                break;
            }
            offset = split;
        }
        if !self.outgoing.splits.is_empty() {
            self.outgoing.reference = self.next_csms_reference();
            self.outgoing.part = 0;
            self.outgoing.force_16bit = force_16bit;
        }
    }

    // Skips 0, which marks "no concatenation".
    fn next_csms_reference(&mut self) -> u8 {
        let reference = self.csms_counter;
        self.csms_counter = self.csms_counter.checked_add(1).unwrap_or(1);
        reference
    }

    /// Encode the next part (or the whole message) and open the `AT+CMGS`
    /// header for it.
    fn send_sms_header(&mut self) -> Result<(), Error> {
        let encoded_len = if self.outgoing.splits.is_empty() {
            self.pdu
                .encode(&self.outgoing.recipient, &self.outgoing.message, None, false)
        } else {
            let (begin, end) = self.outgoing.next_part_bounds();
            match self.outgoing.message.get(begin..end) {
                Some(part) => {
                    let concat = Concat {
                        reference: self.outgoing.reference,
                        part: self.outgoing.part as u8,
                        total: self.outgoing.total_parts() as u8,
                    };
                    info!(
                        "Sending SMS {} part {} of {}",
                        concat.reference, concat.part, concat.total
                    );
                    self.pdu.encode(
                        &self.outgoing.recipient,
                        part,
                        Some(concat),
                        self.outgoing.force_16bit,
                    )
                }
                None => {
                    // The codec handed back a split offset that does not lie
                    // on a character boundary.
                    warn!("SMS part bounds {}..{} are not valid", begin, end);
                    Err(PduError::Malformed)
                }
            }
        };

        match encoded_len {
            Err(e) => {
                warn!("Error encoding SMS: {:?}", e);
                let recipient = self.outgoing.recipient.clone();
                self.outgoing.clear_multipart();
                self.callbacks
                    .notify_sms_send_failed("encode failed", &recipient);
                self.state = State::Idle;
                Ok(())
            }
            Ok(len) => {
                let mut cmd = String::<MAX_CMD_LEN>::new();
                let _ = write!(cmd, "AT+CMGS={}", len);
                self.send_cmd(&cmd, State::SendingSms4)?;
                if !self.family.frames_cmgs_prompt() {
                    // No framed prompt on this family; proceed as if it
                    // arrived.
                    self.send_sms_body()?;
                }
                Ok(())
            }
        }
    }

    fn send_sms_body(&mut self) -> Result<(), Error> {
        let body: String<MAX_PDU_HEX_LEN> =
            String::try_from(self.pdu.encoded()).map_err(|_| Error::Overflow)?;
        self.send_terminated(&body, State::SendingSms5)
    }

    fn parse_sms_header(&mut self, line: &str) {
        self.parse_index = parse_item(line, 7, 1).parse().unwrap_or(0);
        self.parse_stat = parse_item(line, 7, 2).parse().unwrap_or(0);
    }

    fn parse_sms_body(&mut self, line: &str) {
        if let Err(e) = self.pdu.decode(line) {
            warn!("Failed to decode incoming PDU: {:?}", e);
            return;
        }
        let concat = self.pdu.concat();
        debug!(
            "SMS fragment: ref {}, part {} of {}",
            concat.reference, concat.part, concat.total
        );
        if self.incoming.breaks_accumulation(concat) {
            self.flush_incoming();
        }
        self.incoming
            .absorb(self.pdu.sender(), self.pdu.text(), concat);
    }

    fn flush_incoming(&mut self) {
        if let Some((text, sender)) = self.incoming.flush() {
            debug!("Received SMS from {}", sender.as_str());
            self.callbacks.notify_sms_received(&text, &sender);
        }
    }

    fn send_cmd(&mut self, cmd: &str, next: State) -> Result<(), Error> {
        debug!(">>: {} - {:?}", cmd, self.state);
        self.current_cmd.clear();
        self.serial
            .write_all(cmd.as_bytes())
            .map_err(|_| Error::Serial)?;
        self.serial.write_all(b"\r\n").map_err(|_| Error::Serial)?;
        self.last_tx = Some(Instant::now());
        self.state = next;
        Ok(())
    }

    fn send_cmd_ack(&mut self, cmd: &str, next: State) -> Result<(), Error> {
        self.send_cmd(cmd, next)?;
        self.expect_ack = true;
        // Oversized commands simply lose echo suppression.
        self.current_cmd = String::try_from(cmd).unwrap_or_default();
        Ok(())
    }

    /// Write `payload` terminated with Ctrl-Z instead of CRLF, as PDU bodies
    /// and channel flushes want.
    fn send_terminated(&mut self, payload: &str, next: State) -> Result<(), Error> {
        debug!(">>: {}<ctrl-z> - {:?}", payload, self.state);
        self.current_cmd.clear();
        self.serial
            .write_all(payload.as_bytes())
            .map_err(|_| Error::Serial)?;
        self.serial.write_all(&[CTRL_Z]).map_err(|_| Error::Serial)?;
        self.last_tx = Some(Instant::now());
        self.state = next;
        Ok(())
    }
}
