// Radio protocol codecs.

pub mod legacy;
pub mod xxtea;

pub use legacy::{decode, encode, DecodeError, LEGACY_PAYLOAD_SIZE};

/// Modulation and timing parameters of a radio protocol, consumed by the
/// radio driver. The core only fills these in; the driver owns bit
/// transport and slot scheduling.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolDesc {
    pub name: &'static str,
    /// Payload length in bytes after sync word removal.
    pub payload_size: usize,
    /// Air bitrate, bits per second.
    pub bitrate: u32,
    /// FSK frequency deviation, Hz.
    pub deviation: u32,
    /// Payload bits are transmitted inverted.
    pub payload_inverted: bool,
    /// Manchester whitening on the air.
    pub manchester: bool,
    /// Transmit slot windows in milliseconds from the PPS edge.
    pub slot0: (u32, u32),
    pub slot1: (u32, u32),
    /// Transmit interval bounds, milliseconds.
    pub tx_interval_min: u32,
    pub tx_interval_max: u32,
}

/// The Legacy protocol as broadcast by existing units.
pub const LEGACY_PROTO_DESC: ProtocolDesc = ProtocolDesc {
    name: "Legacy",
    payload_size: LEGACY_PAYLOAD_SIZE,
    bitrate: 100_000,
    deviation: 50_000,
    payload_inverted: true,
    manchester: true,
    slot0: (400, 800),
    slot1: (800, 1200),
    tx_interval_min: 800,
    tx_interval_max: 1200,
};
