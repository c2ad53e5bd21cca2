// Shared mock hardware for the board and run-loop tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use mmdbuoy::command::spi::SpiFrame;
use mmdbuoy::error::{BusError, SensorError, StorageError};
use mmdbuoy::hw::{
    Adc, AuxLink, Delay, I2cBus, OffsetStore, PmRail, PmRails, PmStatusBit, PmStatusBits,
    PowerMode, SerialPort, SpiSlavePort, WakeTimer, WcmRail, WcmRails,
};

#[derive(Clone, Copy)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn delay_ms(&mut self, _ms: u32) {}
}

// ---------------------------------------------------------------------------
// I2C register-map simulation
// ---------------------------------------------------------------------------

/// Reads are served from per-command queues keyed by the most recent
/// single-byte command write; other writes are recorded.
#[derive(Default)]
pub struct MockBus {
    responses: Arc<Mutex<BTreeMap<u8, VecDeque<Vec<u8>>>>>,
    pub writes: Arc<Mutex<Vec<(u8, Vec<u8>)>>>,
    pending: Option<u8>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, command: u8, response: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .entry(command)
            .or_default()
            .push_back(response.to_vec());
    }

    /// Handle for staging more responses after the bus has been moved into
    /// a board.
    pub fn stager(&self) -> MockBusStager {
        MockBusStager {
            responses: Arc::clone(&self.responses),
        }
    }
}

pub struct MockBusStager {
    responses: Arc<Mutex<BTreeMap<u8, VecDeque<Vec<u8>>>>>,
}

impl MockBusStager {
    pub fn stage(&self, command: u8, response: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .entry(command)
            .or_default()
            .push_back(response.to_vec());
    }
}

impl I2cBus for MockBus {
    fn write(&mut self, addr: u8, bytes: &[u8], _stop: bool) -> Result<(), BusError> {
        if bytes.len() == 1 {
            self.pending = Some(bytes[0]);
        }
        self.writes.lock().unwrap().push((addr, bytes.to_vec()));
        Ok(())
    }

    fn read(&mut self, _addr: u8, buf: &mut [u8]) -> Result<(), BusError> {
        let key = self.pending.take().ok_or(BusError::ReadFailed)?;
        let response = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .ok_or(BusError::ReadFailed)?;
        let n = buf.len().min(response.len());
        buf[..n].copy_from_slice(&response[..n]);
        Ok(())
    }
}

/// Stage a healthy MC3416 identity plus config registers so `init` succeeds.
pub fn stage_mc3416_init(bus: &mut MockBus) {
    bus.stage(0x18, &[0xA0]); // chip ID
    bus.stage(0x3B, &[0x20]); // product code
    bus.stage(0x08, &[0x00]); // sample rate read-modify-write
    bus.stage(0x20, &[0x00]); // range read-modify-write
}

/// Stage the MS5637 PROM words for `init`.
pub fn stage_ms5637_prom(bus: &mut MockBus, c: &[u16; 7]) {
    bus.stage(0xA0, &(c[0] << 12).to_be_bytes());
    for i in 1..=6usize {
        bus.stage(0xA0 + ((i as u8) << 1), &c[i].to_be_bytes());
    }
}

/// Stage one D1/D2 conversion pair for `read`.
pub fn stage_ms5637_sample(stager: &MockBusStager, d1: u32, d2: u32) {
    stager.stage(0x00, &d1.to_be_bytes()[1..]);
    stager.stage(0x00, &d2.to_be_bytes()[1..]);
}

// ---------------------------------------------------------------------------
// Rails, status bits, ADC, offset store
// ---------------------------------------------------------------------------

/// Rail bank that records every `set` call.
#[derive(Clone, Default)]
pub struct MockPmRails {
    pub levels: Rc<RefCell<HashMap<PmRail, bool>>>,
    pub history: Rc<RefCell<Vec<(PmRail, bool)>>>,
}

impl PmRails for MockPmRails {
    fn set(&mut self, rail: PmRail, level: bool) {
        self.levels.borrow_mut().insert(rail, level);
        self.history.borrow_mut().push((rail, level));
    }

    fn get(&self, rail: PmRail) -> bool {
        self.levels.borrow().get(&rail).copied().unwrap_or(false)
    }
}

#[derive(Clone, Default)]
pub struct MockStatusBits {
    pub bits: Rc<RefCell<HashMap<PmStatusBit, bool>>>,
}

impl PmStatusBits for MockStatusBits {
    fn get(&self, bit: PmStatusBit) -> bool {
        self.bits.borrow().get(&bit).copied().unwrap_or(false)
    }
}

#[derive(Clone, Default)]
pub struct MockWcmRails {
    pub levels: Rc<RefCell<HashMap<WcmRail, bool>>>,
    pub history: Rc<RefCell<Vec<(WcmRail, bool)>>>,
}

impl WcmRails for MockWcmRails {
    fn set(&mut self, rail: WcmRail, level: bool) {
        self.levels.borrow_mut().insert(rail, level);
        self.history.borrow_mut().push((rail, level));
    }

    fn get(&self, rail: WcmRail) -> bool {
        self.levels.borrow().get(&rail).copied().unwrap_or(false)
    }
}

pub struct MockAdc {
    pub value: Result<f32, SensorError>,
}

impl MockAdc {
    pub fn reading(value: f32) -> Self {
        Self { value: Ok(value) }
    }

    pub fn failing() -> Self {
        Self {
            value: Err(SensorError::ReadFailed),
        }
    }
}

impl Adc for MockAdc {
    fn read(&mut self) -> Result<f32, SensorError> {
        self.value
    }
}

#[derive(Clone, Default)]
pub struct MockStore {
    pub record: Rc<RefCell<Option<(i16, i16, i16)>>>,
}

impl OffsetStore for MockStore {
    fn load(&mut self) -> Result<(i16, i16, i16), StorageError> {
        Ok(self.record.borrow().unwrap_or((0, 0, 0)))
    }

    fn save(&mut self, x: i16, y: i16, z: i16) -> Result<(), StorageError> {
        *self.record.borrow_mut() = Some((x, y, z));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockSerial {
    pub rx: Rc<RefCell<VecDeque<u8>>>,
    pub tx: Rc<RefCell<String>>,
}

impl MockSerial {
    pub fn feed(&self, bytes: &[u8]) {
        self.rx.borrow_mut().extend(bytes.iter().copied());
    }

    pub fn output(&self) -> String {
        self.tx.borrow().clone()
    }
}

impl SerialPort for MockSerial {
    fn poll_byte(&mut self) -> Option<u8> {
        self.rx.borrow_mut().pop_front()
    }

    fn write_str(&mut self, s: &str) {
        self.tx.borrow_mut().push_str(s);
    }
}

/// SPI slave with a scripted sequence of master polls. Each queued frame is
/// delivered through one arm/complete/take cycle; the frames the board loads
/// for transmission are recorded.
#[derive(Clone, Default)]
pub struct MockSpiSlave {
    pub select: Rc<RefCell<bool>>,
    pub polls: Rc<RefCell<VecDeque<SpiFrame>>>,
    pub sent: Rc<RefCell<Vec<SpiFrame>>>,
    armed: Rc<RefCell<Option<SpiFrame>>>,
    received: Rc<RefCell<Option<SpiFrame>>>,
}

impl MockSpiSlave {
    pub fn with_select_active() -> Self {
        let slave = Self::default();
        *slave.select.borrow_mut() = true;
        slave
    }

    pub fn queue_poll(&self, frame: &[u8; 8]) {
        self.polls.borrow_mut().push_back(*frame);
    }
}

impl SpiSlavePort for MockSpiSlave {
    fn select_active(&mut self) -> bool {
        *self.select.borrow()
    }

    fn start_transfer(&mut self, tx: &SpiFrame) -> Result<(), BusError> {
        self.sent.borrow_mut().push(*tx);
        *self.armed.borrow_mut() = Some(*tx);
        Ok(())
    }

    fn transfer_complete(&mut self) -> bool {
        if self.armed.borrow().is_none() {
            return false;
        }
        if let Some(frame) = self.polls.borrow_mut().pop_front() {
            *self.received.borrow_mut() = Some(frame);
            *self.armed.borrow_mut() = None;
            true
        } else {
            false
        }
    }

    fn take_received(&mut self) -> SpiFrame {
        self.received.borrow_mut().take().unwrap_or([0u8; 8])
    }
}

#[derive(Clone, Default)]
pub struct MockAux {
    pub lines: Rc<RefCell<VecDeque<String>>>,
    pub sent: Rc<RefCell<Vec<String>>>,
}

impl MockAux {
    pub fn with_line(line: &str) -> Self {
        let aux = Self::default();
        aux.lines.borrow_mut().push_back(line.to_string());
        aux
    }
}

impl AuxLink for MockAux {
    fn data_ready(&mut self) -> bool {
        !self.lines.borrow().is_empty()
    }

    fn read_line(&mut self, max: usize) -> Option<String> {
        let line = self.lines.borrow_mut().pop_front()?;
        if line.len() >= max {
            return None;
        }
        Some(line)
    }

    fn send(&mut self, s: &str) {
        self.sent.borrow_mut().push(s.to_string());
    }
}

#[derive(Clone, Default)]
pub struct MockWakeTimer {
    pub restarts: Rc<RefCell<usize>>,
}

impl WakeTimer for MockWakeTimer {
    fn restart(&mut self) {
        *self.restarts.borrow_mut() += 1;
    }
}

#[derive(Clone, Default)]
pub struct MockPower {
    pub sleeps: Rc<RefCell<usize>>,
}

impl PowerMode for MockPower {
    fn enter_low_power(&mut self) {
        *self.sleeps.borrow_mut() += 1;
    }
}
