use thiserror::Error;

/// Failures surfaced from [`crate::Machine::init`].
///
/// These are the only errors the core ever returns to its host: undefined hardware
/// behavior (forbidden reads/writes, invalid opcodes) and illegal guest programs are
/// handled locally and never propagated, per the core's error-handling contract.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("ROM image of {actual} bytes is too small for its declared size of {declared} bytes")]
    RomTooSmall { declared: usize, actual: usize },
    #[error("ROM header checksum mismatch: header claims {expected:#04x}, computed {actual:#04x}")]
    BadHeaderChecksum { expected: u8, actual: u8 },
    #[error("cartridge type byte {0:#04x} does not map to a supported bank controller")]
    UnsupportedCartridgeType(u8),
}
