/// Protocol state of the driver. Exactly one is active at a time; every
/// transition happens in the runner's line dispatch or its timeout handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    #[default]
    Idle,
    /// `ATE0` sent, waiting for the ack.
    Init,
    /// Model string consumed, waiting for the trailing `OK` of `AT+CGMM`.
    Init2,
    /// Power-cycled, waiting for the unsolicited ready marker.
    ModemWait,
    /// `AT+CGMM` sent, waiting for the model string.
    ModemDetect,
    /// `AT+CPIN?` acked, PIN handshake driven from the idle drain.
    PinWait,
    /// `AT+CREG?` acked, registration driven from the idle drain.
    RegWait,
    /// `AT+CSQ` outstanding.
    Csq,
    /// `AT+CSCS="GSM"` acked, about to dial.
    Dialing1,
    /// `ATD<number>;` sent.
    Dialing2,
    /// Entered after a finished send; sets PDU mode for the listing.
    CheckSms,
    /// PDU mode set; lists stored messages next.
    CheckSms1,
    /// `AT+CMGL=4` sent, waiting for the first listing header.
    ParseSmsResponse,
    /// Iterating listing header/body pairs.
    ReceiveSms,
    /// `AT+CSCS="GSM"` acked; queries the service-center address next.
    SendingSms1,
    /// `AT+CSCA?` sent, waiting for `+CSCA:`.
    SendingSms2,
    /// PDU mode acked; encodes and sends the part header next.
    SendingSms3,
    /// `AT+CMGS=<len>` sent, waiting for the `> ` prompt.
    SendingSms4,
    /// PDU body sent, waiting for `+CMGS:`.
    SendingSms5,
    /// Text mode acked; queries character sets next.
    SendUssd1,
    /// `AT+CSCS=?` acked; sends the hex-encoded code next.
    SendUssd2,
    /// `AT+CUSD=1,"<hex>"` acked or failed.
    SendUssd3,
}

impl State {
    /// States in which an SMS send job is in flight and an ack failure must
    /// report the job as failed.
    pub fn is_sending_sms(&self) -> bool {
        matches!(
            self,
            Self::SendingSms1
                | Self::SendingSms2
                | Self::SendingSms3
                | Self::SendingSms4
                | Self::SendingSms5
        )
    }
}
