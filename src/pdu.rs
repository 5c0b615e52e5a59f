//! Contract of the external SMS PDU codec.
//!
//! PDU encoding/decoding is delegated to a collaborator owned by the driver;
//! this module only fixes its interface. An implementation is expected to
//! keep the hex text of the last encode and the fields of the last decode
//! available until the next call.

/// Concatenated-SMS (CSMS) header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Concat {
    /// Shared reference number. `0` means "not part of a concatenated
    /// message".
    pub reference: u8,
    /// 1-based part index.
    pub part: u8,
    /// Total number of parts.
    pub total: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PduError {
    /// The message does not fit a single PDU (and no concat header was
    /// requested), or exceeds codec limits.
    MessageTooLong,
    /// The recipient or service-center address could not be encoded.
    InvalidAddress,
    /// The incoming PDU hex could not be decoded.
    Malformed,
}

pub trait PduCodec {
    /// Remember the service-center address (from `+CSCA:`) for subsequent
    /// encodes.
    fn set_smsc(&mut self, number: &str);

    /// Longest prefix of `message[offset..]` that fits one PDU when a
    /// multipart split is required.
    ///
    /// Returns `None` when the remainder fits a single PDU without further
    /// splitting. Sets `force_16bit` when any inspected part requires UCS-2
    /// encoding, in which case every part of the message must be encoded
    /// 16-bit.
    fn check_multipart(
        &mut self,
        recipient: &str,
        message: &str,
        offset: usize,
        force_16bit: &mut bool,
    ) -> Option<usize>;

    /// Encode one outgoing message (or message part, when `concat` is given)
    /// and return the TPDU length to pass to `AT+CMGS=`.
    fn encode(
        &mut self,
        recipient: &str,
        message: &str,
        concat: Option<Concat>,
        force_16bit: bool,
    ) -> Result<usize, PduError>;

    /// Hex text of the last successful [`encode`](Self::encode), ready to be
    /// written to the modem followed by Ctrl-Z.
    fn encoded(&self) -> &str;

    /// Decode one incoming PDU hex line (a `AT+CMGL` body line).
    fn decode(&mut self, pdu: &str) -> Result<(), PduError>;

    /// Sender address of the last successful decode.
    fn sender(&self) -> &str;

    /// Text of the last successful decode.
    fn text(&self) -> &str;

    /// Concatenation info of the last successful decode.
    fn concat(&self) -> Concat;
}
