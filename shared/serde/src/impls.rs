use crate::{
    bit_reader::BitReader, bit_writer::BitWrite, error::SerdeErr, integer::UnsignedVariableInteger,
    serde::Serde, ConstBitLength,
};

// Booleans

impl Serde for bool {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_bit(*self);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        reader.read_bit()
    }

    fn bit_length(&self) -> u32 {
        1
    }
}

impl ConstBitLength for bool {
    fn const_bit_length() -> u32 {
        1
    }
}

// Fixed-width unsigned integers, little endian byte order

macro_rules! impl_serde_unsigned {
    ($type:ty, $bytes:expr) => {
        impl Serde for $type {
            fn ser(&self, writer: &mut dyn BitWrite) {
                for byte in self.to_le_bytes() {
                    writer.write_byte(byte);
                }
            }

            fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
                let mut bytes = [0u8; $bytes];
                for byte in bytes.iter_mut() {
                    *byte = reader.read_byte()?;
                }
                Ok(<$type>::from_le_bytes(bytes))
            }

            fn bit_length(&self) -> u32 {
                $bytes * 8
            }
        }

        impl ConstBitLength for $type {
            fn const_bit_length() -> u32 {
                $bytes * 8
            }
        }
    };
}

impl_serde_unsigned!(u8, 1);
impl_serde_unsigned!(u16, 2);
impl_serde_unsigned!(u32, 4);
impl_serde_unsigned!(u64, 8);

impl Serde for i32 {
    fn ser(&self, writer: &mut dyn BitWrite) {
        (*self as u32).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(u32::de(reader)? as i32)
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

impl Serde for f32 {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.to_bits().ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(f32::from_bits(u32::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

// Length-prefixed containers

impl Serde for String {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.len() as u64).ser(writer);
        for byte in self.as_bytes() {
            writer.write_byte(*byte);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let length = UnsignedVariableInteger::<7>::de(reader)?.get() as u64;
        if length > reader.bits_remaining() as u64 / 8 {
            return Err(SerdeErr::LengthTooLarge {
                length,
                max: reader.bits_remaining() as u64 / 8,
            });
        }
        let mut bytes = Vec::with_capacity(length as usize);
        for _ in 0..length {
            bytes.push(reader.read_byte()?);
        }
        String::from_utf8(bytes).map_err(|_| SerdeErr::InvalidUtf8)
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.len() as u64).bit_length() + (self.len() as u32) * 8
    }
}

impl<T: Serde> Serde for Vec<T> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.len() as u64).ser(writer);
        for item in self {
            item.ser(writer);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let length = UnsignedVariableInteger::<7>::de(reader)?.get() as u64;
        // every element takes at least one bit
        if length > reader.bits_remaining() as u64 {
            return Err(SerdeErr::LengthTooLarge {
                length,
                max: reader.bits_remaining() as u64,
            });
        }
        let mut output = Vec::with_capacity(length as usize);
        for _ in 0..length {
            output.push(T::de(reader)?);
        }
        Ok(output)
    }

    fn bit_length(&self) -> u32 {
        let prefix = UnsignedVariableInteger::<7>::new(self.len() as u64).bit_length();
        prefix + self.iter().map(Serde::bit_length).sum::<u32>()
    }
}

impl<T: Serde> Serde for Option<T> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            Some(value) => {
                writer.write_bit(true);
                value.ser(writer);
            }
            None => writer.write_bit(false),
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if reader.read_bit()? {
            Ok(Some(T::de(reader)?))
        } else {
            Ok(None)
        }
    }

    fn bit_length(&self) -> u32 {
        1 + self.as_ref().map(Serde::bit_length).unwrap_or(0)
    }
}
