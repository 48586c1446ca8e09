//! # Replica Serde
//! Bit-level reading and writing used by the replica wire format.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod bit_reader;
mod bit_writer;
mod error;
mod impls;
mod integer;
mod serde;

pub use bit_reader::BitReader;
pub use bit_writer::{BitWrite, BitWriter};
pub use error::SerdeErr;
pub use integer::{
    SerdeInteger, SignedInteger, SignedVariableInteger, UnsignedInteger, UnsignedVariableInteger,
};
pub use serde::{ConstBitLength, Serde};
