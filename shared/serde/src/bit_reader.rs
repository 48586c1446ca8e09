use crate::{bit_writer::BitWriter, error::SerdeErr, BitWrite};

/// Reads bits back out of a buffer produced by a `BitWriter`. The reader can
/// be bounded to an exact bit length so trailing padding is never consumed.
#[derive(Clone)]
pub struct BitReader<'b> {
    buffer: &'b [u8],
    bit_len: u32,
    position: u32,
}

impl<'b> BitReader<'b> {
    pub fn new(buffer: &'b [u8]) -> Self {
        Self::with_bit_len(buffer, (buffer.len() as u32) * 8)
    }

    pub fn with_bit_len(buffer: &'b [u8], bit_len: u32) -> Self {
        let max_bits = (buffer.len() as u32) * 8;
        Self {
            buffer,
            bit_len: bit_len.min(max_bits),
            position: 0,
        }
    }

    pub fn bits_remaining(&self) -> u32 {
        self.bit_len - self.position
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn read_bit(&mut self) -> Result<bool, SerdeErr> {
        if self.position >= self.bit_len {
            return Err(SerdeErr::UnexpectedEnd {
                requested: 1,
                remaining: 0,
            });
        }
        let byte = self.buffer[(self.position / 8) as usize];
        let bit = (byte >> (self.position % 8)) & 1 != 0;
        self.position += 1;
        Ok(bit)
    }

    pub fn read_byte(&mut self) -> Result<u8, SerdeErr> {
        self.ensure(8)?;
        let mut output: u8 = 0;
        for i in 0..8 {
            if self.read_bit()? {
                output |= 1 << i;
            }
        }
        Ok(output)
    }

    /// Reads `bit_len` bits into a freshly packed buffer
    pub fn read_bits(&mut self, bit_len: u32) -> Result<Vec<u8>, SerdeErr> {
        self.ensure(bit_len)?;
        let mut writer = BitWriter::with_capacity(bit_len.div_ceil(8) as usize);
        for _ in 0..bit_len {
            writer.write_bit(self.read_bit()?);
        }
        Ok(writer.to_bytes())
    }

    fn ensure(&self, requested: u32) -> Result<(), SerdeErr> {
        let remaining = self.bits_remaining();
        if requested > remaining {
            return Err(SerdeErr::UnexpectedEnd {
                requested,
                remaining,
            });
        }
        Ok(())
    }
}
