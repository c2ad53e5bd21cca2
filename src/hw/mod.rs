// MMD Buoy Firmware — Hardware Ports
//
// Traits at the seam between the board logic and the HAL. The core compiles
// and is tested on the host; ESP-IDF implementations live in `esp` behind
// the `esp32` feature.

use std::thread;
use std::time::Duration;

use crate::command::spi::SpiFrame;
use crate::error::{BusError, SensorError, StorageError};

#[cfg(feature = "esp32")]
pub mod esp;

// ---------------------------------------------------------------------------
// Raw I2C bus
// ---------------------------------------------------------------------------

/// Raw master-mode I2C transactions. `stop: false` leaves the bus claimed for
/// a repeated-start read.
pub trait I2cBus: Send {
    fn write(&mut self, addr: u8, bytes: &[u8], stop: bool) -> Result<(), BusError>;
    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), BusError>;
}

// ---------------------------------------------------------------------------
// Millisecond delay
// ---------------------------------------------------------------------------

/// Blocking millisecond delay. Sensor drivers treat every wait as an
/// "at least N ms" contract.
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

#[derive(Clone, Copy, Default)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

// ---------------------------------------------------------------------------
// Leak / battery detector ADC
// ---------------------------------------------------------------------------

/// Single-channel ADC, already scaled to volts (3.3 × raw / 4095).
pub trait Adc {
    fn read(&mut self) -> Result<f32, SensorError>;
}

// ---------------------------------------------------------------------------
// Persisted accelerometer offsets
// ---------------------------------------------------------------------------

pub const OFFSET_RECORD_LEN: usize = 6;

/// Non-volatile store for the accelerometer zero-point triple. The triple is
/// always written whole; all-zero is the valid uncalibrated default. An
/// adapter that finds its backing store corrupt or unformatted erases and
/// reinitializes it before serving reads.
pub trait OffsetStore {
    fn load(&mut self) -> Result<(i16, i16, i16), StorageError>;
    fn save(&mut self, x: i16, y: i16, z: i16) -> Result<(), StorageError>;
}

/// Pack the offset triple as three little-endian u16 words.
pub fn encode_offsets(x: i16, y: i16, z: i16) -> [u8; OFFSET_RECORD_LEN] {
    let mut record = [0u8; OFFSET_RECORD_LEN];
    record[0..2].copy_from_slice(&(x as u16).to_le_bytes());
    record[2..4].copy_from_slice(&(y as u16).to_le_bytes());
    record[4..6].copy_from_slice(&(z as u16).to_le_bytes());
    record
}

pub fn decode_offsets(record: &[u8; OFFSET_RECORD_LEN]) -> (i16, i16, i16) {
    (
        u16::from_le_bytes([record[0], record[1]]) as i16,
        u16::from_le_bytes([record[2], record[3]]) as i16,
        u16::from_le_bytes([record[4], record[5]]) as i16,
    )
}

// ---------------------------------------------------------------------------
// Power rails and status bits
// ---------------------------------------------------------------------------

/// PM board power rails. Values are raw pin levels; polarity is wired per
/// rail (DRIVER_EN is active-low: level `false` enables the driver stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PmRail {
    Analog3v3,
    BattSelect,
    BattSerial,
    Ctd,
    Driver,
    MainPower,
    VbsPower,
    VbsSerial,
    WcmDiag,
    WcmPower,
    WcmRelay,
    /// Gates the LTC2944 onto the I2C bus while the gauge is addressed.
    Ltc2944I2c,
}

pub trait PmRails {
    fn set(&mut self, rail: PmRail, level: bool);
    fn get(&self, rail: PmRail) -> bool;
}

/// PM board read-only status inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PmStatusBit {
    AccelInt,
    ExtGpio1,
    ExtGpio2,
    Lt8618Pg,
    Ltc2944Alcc,
    WcmFault,
}

pub trait PmStatusBits {
    fn get(&self, bit: PmStatusBit) -> bool;
}

/// WCM board power rails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WcmRail {
    Analog3v3,
    GpsPower,
    CellPower,
    Light,
    SatPower,
    WifiPower,
    ComSwitchA,
}

pub trait WcmRails {
    fn set(&mut self, rail: WcmRail, level: bool);
    fn get(&self, rail: WcmRail) -> bool;
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

/// Polled PC serial link. Bytes are drained non-blocking; writes block until
/// sent.
pub trait SerialPort {
    fn poll_byte(&mut self) -> Option<u8>;
    fn write_str(&mut self, s: &str);
}

/// Polled SPI slave. The master signals a poll session by driving the select
/// line; a queued transfer completes in the background and is then collected.
pub trait SpiSlavePort {
    /// Select line reads active while the SPI master is on.
    fn select_active(&mut self) -> bool;
    /// Queue a transfer that will send `tx` on the next master poll.
    fn start_transfer(&mut self, tx: &SpiFrame) -> Result<(), BusError>;
    /// A queued transfer has finished exchanging frames.
    fn transfer_complete(&mut self) -> bool;
    /// Collect the command frame received by the completed transfer.
    fn take_received(&mut self) -> SpiFrame;
}

/// Auxiliary serial device on the WCM board (GPS receiver, SAT/CELL modem).
pub trait AuxLink {
    fn data_ready(&mut self) -> bool;
    /// Collect one CR-terminated line, up to `max` bytes. `None` if the line
    /// overflowed or the read failed.
    fn read_line(&mut self, max: usize) -> Option<String>;
    fn send(&mut self, s: &str);
}

// ---------------------------------------------------------------------------
// Power-mode and wake-timer collaborators
// ---------------------------------------------------------------------------

/// Low-power cycle entry. The PM implementation sleeps the MCU and returns
/// after wake; the WCM implementation is a no-op.
pub trait PowerMode {
    fn enter_low_power(&mut self);
}

#[derive(Default)]
pub struct NoLowPower;

impl PowerMode for NoLowPower {
    fn enter_low_power(&mut self) {}
}

/// Periodic wake timer behind the elapsed flag. `restart` reloads the full
/// period (WCM ping does this; PM ping only forces the flag).
pub trait WakeTimer {
    fn restart(&mut self);
}

#[derive(Default)]
pub struct NoWakeTimer;

impl WakeTimer for NoWakeTimer {
    fn restart(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_record_round_trip() {
        let record = encode_offsets(-120, 16384, 7);
        assert_eq!(decode_offsets(&record), (-120, 16384, 7));
    }

    #[test]
    fn offset_record_is_little_endian_words() {
        let record = encode_offsets(0x0102, 0x0304, -1);
        assert_eq!(record, [0x02, 0x01, 0x04, 0x03, 0xFF, 0xFF]);
    }

    #[test]
    fn zero_record_decodes_to_uncalibrated_default() {
        assert_eq!(decode_offsets(&[0u8; OFFSET_RECORD_LEN]), (0, 0, 0));
    }
}
