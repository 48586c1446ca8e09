/// Sink for a stream of bits, least significant bit of each byte first
pub trait BitWrite {
    fn write_bit(&mut self, bit: bool);

    fn write_byte(&mut self, byte: u8) {
        let mut temp = byte;
        for _ in 0..8 {
            self.write_bit(temp & 1 != 0);
            temp >>= 1;
        }
    }

    /// Appends the first `bit_len` bits of `bytes`, in the same order a
    /// `BitWriter` would have produced them
    fn write_bits(&mut self, bytes: &[u8], bit_len: u32) {
        let whole_bytes = (bit_len / 8) as usize;
        for byte in &bytes[..whole_bytes] {
            self.write_byte(*byte);
        }
        let trailing = bit_len % 8;
        if trailing > 0 {
            let last = bytes[whole_bytes];
            for i in 0..trailing {
                self.write_bit((last >> i) & 1 != 0);
            }
        }
    }
}

/// Growable bit writer. Has no size ceiling, so it serves both single
/// messages and reassembled partial payloads.
pub struct BitWriter {
    scratch: u8,
    scratch_index: u8,
    buffer: Vec<u8>,
    bits_written: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            scratch: 0,
            scratch_index: 0,
            buffer: Vec::with_capacity(bytes),
            bits_written: 0,
        }
    }

    fn flush_scratch(&mut self) {
        if self.scratch_index > 0 {
            let byte = (self.scratch << (8 - self.scratch_index)).reverse_bits();
            self.buffer.push(byte);
            self.scratch = 0;
            self.scratch_index = 0;
        }
    }

    pub fn bits_written(&self) -> u32 {
        self.bits_written
    }

    pub fn is_empty(&self) -> bool {
        self.bits_written == 0
    }

    pub fn to_bytes(mut self) -> Vec<u8> {
        self.flush_scratch();
        self.buffer
    }

    /// Consumes the writer, returning the packed bytes and the exact bit count
    pub fn into_bits(self) -> (Vec<u8>, u32) {
        let bits = self.bits_written;
        (self.to_bytes(), bits)
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWrite for BitWriter {
    fn write_bit(&mut self, bit: bool) {
        self.scratch <<= 1;

        if bit {
            self.scratch |= 1;
        }

        self.scratch_index += 1;
        self.bits_written += 1;

        if self.scratch_index >= 8 {
            self.buffer.push(self.scratch.reverse_bits());
            self.scratch_index = 0;
            self.scratch = 0;
        }
    }
}
