use thiserror::Error;

/// Errors produced while decoding a bit stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerdeErr {
    /// The reader ran out of bits
    #[error("Attempted to read {requested} bit(s) with only {remaining} remaining in the stream")]
    UnexpectedEnd { requested: u32, remaining: u32 },

    /// A decoded string was not valid UTF-8
    #[error("Decoded string is not valid UTF-8")]
    InvalidUtf8,

    /// A value does not fit the bit width it is being written with
    #[error("Value {value} cannot be encoded with {bits} bit(s)")]
    ValueOutOfRange { value: i128, bits: u8 },

    /// A length prefix exceeded the limit allowed by the caller
    #[error("Decoded length {length} exceeds the maximum of {max}")]
    LengthTooLarge { length: u64, max: u64 },
}
