use replica_serde::{BitReader, BitWrite, SerdeErr};

/// A property that serializes its own changes. Versions are opaque to the
/// agent: it hands back the version last written to the connection and
/// forgets it when a packet carrying that delta is lost.
pub trait NetDeltaSerialize: Send + Sync {
    /// Writes whatever changed since `base` (everything when `base` is
    /// `None`) and returns the new version, or returns `None` without writing
    /// anything when nothing changed
    fn write_delta(&self, base: Option<u32>, writer: &mut dyn BitWrite) -> Option<u32>;

    fn read_delta(&mut self, reader: &mut BitReader) -> Result<(), SerdeErr>;
}
