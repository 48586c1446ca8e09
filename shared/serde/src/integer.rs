use crate::{
    bit_reader::BitReader, bit_writer::BitWrite, error::SerdeErr, serde::Serde, ConstBitLength,
};

pub type UnsignedInteger<const BITS: u8> = SerdeInteger<false, false, BITS>;
pub type SignedInteger<const BITS: u8> = SerdeInteger<true, false, BITS>;
pub type UnsignedVariableInteger<const BITS: u8> = SerdeInteger<false, true, BITS>;
pub type SignedVariableInteger<const BITS: u8> = SerdeInteger<true, true, BITS>;

/// Packed integer. Fixed variants always occupy `BITS` bits (plus a sign bit
/// when signed); variable variants emit `BITS`-wide groups, each preceded by
/// a continuation bit, so small values stay small on the wire.
// The outer generic type wraps a non-generic inner type to limit monomorphization.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SerdeInteger<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> {
    inner: PackedInteger,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
struct PackedInteger {
    value: i128,
    signed: bool,
    variable: bool,
    bits: u8,
}

impl PackedInteger {
    fn try_new(signed: bool, variable: bool, bits: u8, value: i128) -> Result<Self, SerdeErr> {
        let out_of_range = SerdeErr::ValueOutOfRange { value, bits };
        if bits == 0 || bits > 127 {
            return Err(out_of_range);
        }
        if !signed && value < 0 {
            return Err(out_of_range);
        }
        if !variable {
            let limit: i128 = 1_i128 << bits;
            if value >= limit || (signed && value <= -limit) {
                return Err(out_of_range);
            }
        }

        Ok(Self {
            value,
            signed,
            variable,
            bits,
        })
    }

    fn ser(&self, writer: &mut dyn BitWrite) {
        let mut magnitude = self.value.unsigned_abs();
        if self.signed {
            writer.write_bit(self.value < 0);
        }

        if self.variable {
            loop {
                let proceed = magnitude >= (1_u128 << self.bits);
                writer.write_bit(proceed);
                for _ in 0..self.bits {
                    writer.write_bit(magnitude & 1 != 0);
                    magnitude >>= 1;
                }
                if !proceed {
                    return;
                }
            }
        } else {
            for _ in 0..self.bits {
                writer.write_bit(magnitude & 1 != 0);
                magnitude >>= 1;
            }
        }
    }

    fn de(reader: &mut BitReader, signed: bool, variable: bool, bits: u8) -> Result<Self, SerdeErr> {
        let negative = if signed { reader.read_bit()? } else { false };

        let mut magnitude: u128 = 0;
        let mut shift: u32 = 0;
        loop {
            let proceed = if variable { reader.read_bit()? } else { false };
            for _ in 0..bits {
                if reader.read_bit()? {
                    if shift >= 127 {
                        return Err(SerdeErr::ValueOutOfRange {
                            value: i128::MAX,
                            bits,
                        });
                    }
                    magnitude |= 1 << shift;
                }
                shift += 1;
            }
            if !proceed {
                break;
            }
        }

        let value = magnitude as i128;
        Ok(Self {
            value: if negative { -value } else { value },
            signed,
            variable,
            bits,
        })
    }

    fn bit_length(&self) -> u32 {
        let mut output: u32 = if self.signed { 1 } else { 0 };

        if self.variable {
            let mut magnitude = self.value.unsigned_abs();
            loop {
                let proceed = magnitude >= (1_u128 << self.bits);
                output += 1 + self.bits as u32;
                magnitude >>= self.bits;
                if !proceed {
                    break;
                }
            }
        } else {
            output += self.bits as u32;
        }
        output
    }
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> SerdeInteger<SIGNED, VARIABLE, BITS> {
    /// Builds an integer, rejecting values the encoding cannot represent
    pub fn try_new<T: Into<i128>>(value: T) -> Result<Self, SerdeErr> {
        Ok(Self {
            inner: PackedInteger::try_new(SIGNED, VARIABLE, BITS, value.into())?,
        })
    }

    /// Builds an integer.
    ///
    /// # Panics
    ///
    /// Panics if the value cannot be represented. Use `try_new` for untrusted input.
    pub fn new<T: Into<i128>>(value: T) -> Self {
        match Self::try_new(value) {
            Ok(integer) => integer,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn get(&self) -> i128 {
        self.inner.value
    }
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> Serde for SerdeInteger<SIGNED, VARIABLE, BITS> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.inner.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let inner = PackedInteger::de(reader, SIGNED, VARIABLE, BITS)?;
        Ok(Self { inner })
    }

    fn bit_length(&self) -> u32 {
        self.inner.bit_length()
    }
}

impl<const SIGNED: bool, const BITS: u8> ConstBitLength for SerdeInteger<SIGNED, false, BITS> {
    fn const_bit_length() -> u32 {
        let sign_bit: u32 = if SIGNED { 1 } else { 0 };
        sign_bit + BITS as u32
    }
}
