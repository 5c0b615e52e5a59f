#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A bounded buffer or parameter exceeded its capacity.
    Overflow,

    /// The serial transport failed a read or write.
    Serial,

    /// The power control pin could not be driven.
    IoPin,
}
