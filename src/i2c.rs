// MMD Buoy Firmware — I2C Transaction Layer
//
// Shared-bus handle plus the command/response patterns the sensor drivers
// are built on. One bus, one thread; the mutex only serializes the handle
// clones held by the individual drivers.

use std::sync::{Arc, Mutex};

use crate::error::BusError;
use crate::hw::I2cBus;

/// Clone-able handle to the single I2C master. Each driver owns a clone and
/// locks per transaction.
pub struct SharedBus<B> {
    inner: Arc<Mutex<B>>,
}

impl<B> Clone for SharedBus<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: I2cBus> SharedBus<B> {
    pub fn new(bus: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
        }
    }

    /// Write a command packet. `repeated_start` suppresses the stop condition
    /// so a following read reclaims the bus.
    pub fn write_command(
        &self,
        addr: u8,
        bytes: &[u8],
        repeated_start: bool,
    ) -> Result<(), BusError> {
        let mut bus = self.inner.lock().unwrap();
        bus.write(addr, bytes, !repeated_start).map_err(|e| {
            log::warn!("i2c write to {addr:#04x} failed: {e}");
            e
        })
    }

    /// Read an `n`-byte response (n ≤ 4), packed big-endian.
    pub fn read_response(&self, addr: u8, n: usize) -> Result<u32, BusError> {
        let mut buf = [0u8; 4];
        let mut bus = self.inner.lock().unwrap();
        bus.read(addr, &mut buf[..n]).map_err(|e| {
            log::warn!("i2c read from {addr:#04x} failed: {e}");
            e
        })?;
        Ok(pack_be(&buf[..n]))
    }

    /// Command/response pair: write `cmd`, then read `n` bytes big-endian.
    pub fn write_then_read(
        &self,
        addr: u8,
        cmd: &[u8],
        n: usize,
        repeated_start: bool,
    ) -> Result<u32, BusError> {
        let mut buf = [0u8; 4];
        let mut bus = self.inner.lock().unwrap();
        bus.write(addr, cmd, !repeated_start).map_err(|e| {
            log::warn!("i2c command to {addr:#04x} failed: {e}");
            e
        })?;
        bus.read(addr, &mut buf[..n]).map_err(|e| {
            log::warn!("i2c response from {addr:#04x} failed: {e}");
            e
        })?;
        Ok(pack_be(&buf[..n]))
    }

    /// Register-style read: no-stop write of the register address, then read
    /// `buf.len()` bytes.
    pub fn read_register(&self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        let mut bus = self.inner.lock().unwrap();
        bus.write(addr, &[reg], false).map_err(|e| {
            log::warn!("i2c register select {reg:#04x} at {addr:#04x} failed: {e}");
            e
        })?;
        bus.read(addr, buf).map_err(|e| {
            log::warn!("i2c register read {reg:#04x} at {addr:#04x} failed: {e}");
            e
        })
    }

    /// Register-style write: single packet of `[reg, value]`.
    pub fn write_register(&self, addr: u8, reg: u8, value: u8) -> Result<(), BusError> {
        let mut bus = self.inner.lock().unwrap();
        bus.write(addr, &[reg, value], true).map_err(|e| {
            log::warn!("i2c register write {reg:#04x} at {addr:#04x} failed: {e}");
            e
        })
    }
}

fn pack_be(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

// ---------------------------------------------------------------------------
// Scripted bus for driver unit tests
// ---------------------------------------------------------------------------
#[cfg(test)]
pub(crate) mod testbus {
    use std::collections::{BTreeMap, VecDeque};

    use super::*;

    /// Register-map bus simulation. Reads are served from the queue keyed by
    /// the most recent single-byte command write; multi-byte writes are only
    /// recorded.
    #[derive(Default)]
    pub struct ScriptBus {
        pub responses: BTreeMap<u8, VecDeque<Vec<u8>>>,
        pub writes: Vec<(u8, Vec<u8>)>,
        pub fail_writes: bool,
        pub fail_reads: bool,
        /// Fail this many reads before serving staged responses again.
        pub fail_next_reads: usize,
        pending: Option<u8>,
    }

    impl ScriptBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn stage(&mut self, command: u8, response: &[u8]) {
            self.responses
                .entry(command)
                .or_default()
                .push_back(response.to_vec());
        }
    }

    impl super::SharedBus<ScriptBus> {
        /// Peek at the scripted bus behind the shared handle.
        pub(crate) fn with_bus<R>(&self, f: impl FnOnce(&ScriptBus) -> R) -> R {
            let bus = self.inner.lock().unwrap();
            f(&bus)
        }
    }

    impl I2cBus for ScriptBus {
        fn write(&mut self, addr: u8, bytes: &[u8], _stop: bool) -> Result<(), BusError> {
            if self.fail_writes {
                return Err(BusError::WriteFailed);
            }
            if bytes.len() == 1 {
                self.pending = Some(bytes[0]);
            }
            self.writes.push((addr, bytes.to_vec()));
            Ok(())
        }

        fn read(&mut self, _addr: u8, buf: &mut [u8]) -> Result<(), BusError> {
            if self.fail_reads {
                return Err(BusError::ReadFailed);
            }
            if self.fail_next_reads > 0 {
                self.fail_next_reads -= 1;
                self.pending = None;
                return Err(BusError::ReadFailed);
            }
            let key = self.pending.take().ok_or(BusError::ReadFailed)?;
            let response = self
                .responses
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .ok_or(BusError::ReadFailed)?;
            let n = buf.len().min(response.len());
            buf[..n].copy_from_slice(&response[..n]);
            Ok(())
        }
    }
}
