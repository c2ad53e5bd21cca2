// MMD Buoy Firmware — Error Types
//
// Typed errors at the driver layer; binaries wrap them in anyhow at the
// application boundary.

use std::fmt;

// ---------------------------------------------------------------------------
// Bus transactions
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// I2C/SPI write did not complete.
    WriteFailed,
    /// I2C/SPI read did not complete.
    ReadFailed,
    /// SPI slave transfer could not be queued.
    TransferFailed,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailed => write!(f, "bus write failed"),
            Self::ReadFailed => write!(f, "bus read failed"),
            Self::TransferFailed => write!(f, "bus transfer failed"),
        }
    }
}

impl std::error::Error for BusError {}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Underlying I2C transaction failed.
    Bus(BusError),
    /// Driver used before a successful init.
    NotInitialized,
    /// MS5637 PROM word read failed during init.
    PromReadFailed,
    /// Chip ID / product code did not match the expected device.
    UnrecognizedDevice,
    /// ADC sample could not be taken.
    ReadFailed,
    /// Tilt computation produced a non-finite angle (zero-g vector).
    InvalidAngle,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "sensor bus error: {e}"),
            Self::NotInitialized => write!(f, "sensor not initialized"),
            Self::PromReadFailed => write!(f, "PROM read failed"),
            Self::UnrecognizedDevice => write!(f, "unrecognized device"),
            Self::ReadFailed => write!(f, "sensor read failed"),
            Self::InvalidAngle => write!(f, "tilt angle undefined"),
        }
    }
}

impl std::error::Error for SensorError {}

impl From<BusError> for SensorError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Persisted offset store
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Record could not be read back.
    ReadFailed,
    /// Record could not be written or committed.
    WriteFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "offset store read failed"),
            Self::WriteFailed => write!(f, "offset store write failed"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for SensorError {
    fn from(_: StorageError) -> Self {
        Self::ReadFailed
    }
}
