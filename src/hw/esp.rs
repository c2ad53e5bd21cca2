// MMD Buoy Firmware — ESP-IDF Hardware Adapters
//
// Concrete port implementations for the production boards. HAL-level
// peripherals come from esp-idf-hal; where the HAL has no safe wrapper yet
// (ADC oneshot, SPI slave, light sleep) the raw esp-idf-sys API is used.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin, Input, Output, PinDriver};
use esp_idf_hal::i2c::I2cDriver;
use esp_idf_hal::uart::UartDriver;
use esp_idf_svc::nvs::{EspNvs, NvsDefault};
use esp_idf_svc::timer::{EspTaskTimerService, EspTimer};

use crate::error::{BusError, SensorError, StorageError};
use crate::hw::{
    decode_offsets, encode_offsets, Adc, AuxLink, I2cBus, OffsetStore, PmRail, PmRails,
    PmStatusBit, PmStatusBits, PowerMode, SerialPort, SpiSlavePort, WakeTimer, WcmRail, WcmRails,
    OFFSET_RECORD_LEN,
};
use crate::command::spi::SpiFrame;
use crate::config::{SPI_FRAME_LEN, WAKE_TIMER_PERIOD_S};

const I2C_TIMEOUT_TICKS: u32 = 1000;
const AUX_READ_TICKS: u32 = 1000;

// ---------------------------------------------------------------------------
// I2C
// ---------------------------------------------------------------------------

/// Raw bus over the esp-idf I2C master driver. A no-stop write is held back
/// and replayed as a write_read when the matching read arrives, which is how
/// ESP-IDF expresses a repeated start.
pub struct EspI2cBus {
    driver: I2cDriver<'static>,
    pending: Option<(u8, Vec<u8>)>,
}

impl EspI2cBus {
    pub fn new(driver: I2cDriver<'static>) -> Self {
        Self {
            driver,
            pending: None,
        }
    }
}

impl I2cBus for EspI2cBus {
    fn write(&mut self, addr: u8, bytes: &[u8], stop: bool) -> Result<(), BusError> {
        if !stop {
            self.pending = Some((addr, bytes.to_vec()));
            return Ok(());
        }
        self.pending = None;
        self.driver
            .write(addr, bytes, I2C_TIMEOUT_TICKS)
            .map_err(|_| BusError::WriteFailed)
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), BusError> {
        match self.pending.take() {
            Some((pending_addr, command)) if pending_addr == addr => self
                .driver
                .write_read(addr, &command, buf, I2C_TIMEOUT_TICKS)
                .map_err(|_| BusError::ReadFailed),
            _ => self
                .driver
                .read(addr, buf, I2C_TIMEOUT_TICKS)
                .map_err(|_| BusError::ReadFailed),
        }
    }
}

// ---------------------------------------------------------------------------
// ADC (oneshot, raw esp-idf-sys API)
// ---------------------------------------------------------------------------

pub struct EspAdc {
    handle: esp_idf_sys::adc_oneshot_unit_handle_t,
    channel: esp_idf_sys::adc_channel_t,
}

// The handle is only ever used from the single run-loop thread.
unsafe impl Send for EspAdc {}

impl EspAdc {
    /// Configure one ADC1 channel for 12-bit, 11 dB attenuation (0–3.3 V).
    pub fn new(
        handle: esp_idf_sys::adc_oneshot_unit_handle_t,
        channel: esp_idf_sys::adc_channel_t,
    ) -> anyhow::Result<Self> {
        unsafe {
            let chan_cfg = esp_idf_sys::adc_oneshot_chan_cfg_t {
                atten: esp_idf_sys::adc_atten_t_ADC_ATTEN_DB_11,
                bitwidth: esp_idf_sys::adc_bitwidth_t_ADC_BITWIDTH_12,
            };
            let ret = esp_idf_sys::adc_oneshot_config_channel(handle, channel, &chan_cfg);
            if ret != esp_idf_sys::ESP_OK {
                anyhow::bail!("ADC channel config failed ({ret})");
            }
        }
        Ok(Self { handle, channel })
    }

    /// Create the shared ADC1 oneshot unit.
    pub fn new_unit() -> anyhow::Result<esp_idf_sys::adc_oneshot_unit_handle_t> {
        unsafe {
            let mut handle: esp_idf_sys::adc_oneshot_unit_handle_t = core::ptr::null_mut();
            let unit_cfg = esp_idf_sys::adc_oneshot_unit_init_cfg_t {
                unit_id: esp_idf_sys::adc_unit_t_ADC_UNIT_1,
                ulp_mode: esp_idf_sys::adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
                ..core::mem::zeroed()
            };
            let ret = esp_idf_sys::adc_oneshot_new_unit(&unit_cfg, &mut handle);
            if ret != esp_idf_sys::ESP_OK {
                anyhow::bail!("ADC unit init failed ({ret})");
            }
            Ok(handle)
        }
    }
}

impl Adc for EspAdc {
    fn read(&mut self) -> Result<f32, SensorError> {
        let mut raw: i32 = 0;
        let ret = unsafe { esp_idf_sys::adc_oneshot_read(self.handle, self.channel, &mut raw) };
        if ret != esp_idf_sys::ESP_OK {
            log::warn!("adc read failed ({ret})");
            return Err(SensorError::ReadFailed);
        }
        Ok(crate::config::ADC_VREF * raw as f32 / crate::config::ADC_FULL_SCALE)
    }
}

// ---------------------------------------------------------------------------
// Offset store (NVS-backed)
// ---------------------------------------------------------------------------

pub struct NvsOffsetStore {
    nvs: EspNvs<NvsDefault>,
    key: &'static str,
}

impl NvsOffsetStore {
    /// Open the store and make sure a readable record exists; a missing or
    /// malformed record is rewritten as the all-zero uncalibrated default.
    pub fn new(nvs: EspNvs<NvsDefault>, key: &'static str) -> Self {
        let mut store = Self { nvs, key };
        let mut buf = [0u8; OFFSET_RECORD_LEN];
        let usable = matches!(store.nvs.get_blob(key, &mut buf), Ok(Some(record)) if record.len() == OFFSET_RECORD_LEN);
        if !usable {
            log::warn!("offset store unformatted, initializing to zero");
            if let Err(e) = store.save(0, 0, 0) {
                log::error!("offset store init failed: {e}");
            }
        }
        store
    }
}

impl OffsetStore for NvsOffsetStore {
    fn load(&mut self) -> Result<(i16, i16, i16), StorageError> {
        let mut buf = [0u8; OFFSET_RECORD_LEN];
        match self.nvs.get_blob(self.key, &mut buf) {
            Ok(Some(record)) if record.len() == OFFSET_RECORD_LEN => {
                let mut fixed = [0u8; OFFSET_RECORD_LEN];
                fixed.copy_from_slice(record);
                Ok(decode_offsets(&fixed))
            }
            Ok(_) => Ok((0, 0, 0)),
            Err(_) => Err(StorageError::ReadFailed),
        }
    }

    fn save(&mut self, x: i16, y: i16, z: i16) -> Result<(), StorageError> {
        self.nvs
            .set_blob(self.key, &encode_offsets(x, y, z))
            .map_err(|_| StorageError::WriteFailed)
    }
}

// ---------------------------------------------------------------------------
// GPIO rail banks
// ---------------------------------------------------------------------------

type OutPin = PinDriver<'static, AnyOutputPin, Output>;

/// Output-pin bank addressed by rail. Levels are cached so getters don't
/// need readable outputs.
pub struct GpioBank<K> {
    pins: HashMap<K, OutPin>,
    levels: HashMap<K, bool>,
}

impl<K: std::hash::Hash + Eq + Copy> GpioBank<K> {
    pub fn new(pins: Vec<(K, OutPin)>) -> Self {
        let levels = pins.iter().map(|(k, _)| (*k, false)).collect();
        Self {
            pins: pins.into_iter().collect(),
            levels,
        }
    }

    fn drive(&mut self, key: K, level: bool) {
        if let Some(pin) = self.pins.get_mut(&key) {
            let result = if level { pin.set_high() } else { pin.set_low() };
            if result.is_ok() {
                self.levels.insert(key, level);
            }
        }
    }

    fn level(&self, key: K) -> bool {
        self.levels.get(&key).copied().unwrap_or(false)
    }
}

impl PmRails for GpioBank<PmRail> {
    fn set(&mut self, rail: PmRail, level: bool) {
        self.drive(rail, level);
    }

    fn get(&self, rail: PmRail) -> bool {
        self.level(rail)
    }
}

impl WcmRails for GpioBank<WcmRail> {
    fn set(&mut self, rail: WcmRail, level: bool) {
        self.drive(rail, level);
    }

    fn get(&self, rail: WcmRail) -> bool {
        self.level(rail)
    }
}

type InPin = PinDriver<'static, AnyInputPin, Input>;

/// Input-pin bank for the PM status block.
pub struct StatusBank {
    pins: HashMap<PmStatusBit, InPin>,
}

impl StatusBank {
    pub fn new(pins: Vec<(PmStatusBit, InPin)>) -> Self {
        Self {
            pins: pins.into_iter().collect(),
        }
    }
}

impl PmStatusBits for StatusBank {
    fn get(&self, bit: PmStatusBit) -> bool {
        self.pins.get(&bit).map(|pin| pin.is_high()).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// PC serial link
// ---------------------------------------------------------------------------

pub struct EspSerial {
    uart: UartDriver<'static>,
}

impl EspSerial {
    pub fn new(uart: UartDriver<'static>) -> Self {
        Self { uart }
    }
}

impl SerialPort for EspSerial {
    fn poll_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.uart.read(&mut buf, 0) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }

    fn write_str(&mut self, s: &str) {
        if let Err(e) = self.uart.write(s.as_bytes()) {
            log::warn!("uart write failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Auxiliary serial devices (GPS, SAT/CELL modem)
// ---------------------------------------------------------------------------

pub struct EspAuxLink {
    uart: UartDriver<'static>,
}

impl EspAuxLink {
    pub fn new(uart: UartDriver<'static>) -> Self {
        Self { uart }
    }
}

impl AuxLink for EspAuxLink {
    fn data_ready(&mut self) -> bool {
        self.uart.remaining_read().map(|n| n > 0).unwrap_or(false)
    }

    fn read_line(&mut self, max: usize) -> Option<String> {
        let mut line = Vec::with_capacity(max);
        let mut buf = [0u8; 1];
        // Sentences are CR-terminated like the PC link.
        while let Ok(1) = self.uart.read(&mut buf, AUX_READ_TICKS) {
            match buf[0] {
                b'\r' => return Some(String::from_utf8_lossy(&line).into_owned()),
                b'\n' => continue,
                byte => {
                    line.push(byte);
                    if line.len() == max {
                        return None;
                    }
                }
            }
        }
        None
    }

    fn send(&mut self, s: &str) {
        if let Err(e) = self.uart.write(s.as_bytes()) {
            log::warn!("aux uart write failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// SPI slave (raw esp-idf-sys API)
// ---------------------------------------------------------------------------

pub struct EspSpiSlave {
    host: esp_idf_sys::spi_host_device_t,
    select: InPin,
    tx_buf: Box<[u8; SPI_FRAME_LEN]>,
    rx_buf: Box<[u8; SPI_FRAME_LEN]>,
    trans: Box<esp_idf_sys::spi_slave_transaction_t>,
    in_flight: bool,
}

// Single run-loop thread; the raw buffers never cross threads.
unsafe impl Send for EspSpiSlave {}

impl EspSpiSlave {
    pub fn new(host: esp_idf_sys::spi_host_device_t, select: InPin) -> Self {
        Self {
            host,
            select,
            tx_buf: Box::new([0u8; SPI_FRAME_LEN]),
            rx_buf: Box::new([0u8; SPI_FRAME_LEN]),
            trans: Box::new(unsafe { core::mem::zeroed() }),
            in_flight: false,
        }
    }
}

impl SpiSlavePort for EspSpiSlave {
    fn select_active(&mut self) -> bool {
        self.select.is_high()
    }

    fn start_transfer(&mut self, tx: &SpiFrame) -> Result<(), BusError> {
        *self.tx_buf = *tx;
        self.rx_buf.fill(0);
        self.trans.length = SPI_FRAME_LEN * 8; // bits
        self.trans.tx_buffer = self.tx_buf.as_ptr() as *const _;
        self.trans.rx_buffer = self.rx_buf.as_mut_ptr() as *mut _;
        let ret = unsafe {
            esp_idf_sys::spi_slave_queue_trans(self.host, self.trans.as_mut(), 0)
        };
        if ret != esp_idf_sys::ESP_OK {
            return Err(BusError::TransferFailed);
        }
        self.in_flight = true;
        Ok(())
    }

    fn transfer_complete(&mut self) -> bool {
        if !self.in_flight {
            return false;
        }
        let mut done: *mut esp_idf_sys::spi_slave_transaction_t = core::ptr::null_mut();
        let ret = unsafe { esp_idf_sys::spi_slave_get_trans_result(self.host, &mut done, 0) };
        if ret == esp_idf_sys::ESP_OK {
            self.in_flight = false;
            true
        } else {
            false
        }
    }

    fn take_received(&mut self) -> SpiFrame {
        *self.rx_buf
    }
}

// ---------------------------------------------------------------------------
// Wake timer and low-power window
// ---------------------------------------------------------------------------

pub struct EspWakeTimer {
    timer: EspTimer<'static>,
    period: Duration,
}

impl EspWakeTimer {
    pub fn new(service: &EspTaskTimerService, elapsed: Arc<AtomicBool>) -> anyhow::Result<Self> {
        let timer = service.timer(move || {
            elapsed.store(true, Ordering::SeqCst);
        })?;
        let period = Duration::from_secs(WAKE_TIMER_PERIOD_S);
        timer.every(period)?;
        Ok(Self { timer, period })
    }
}

impl WakeTimer for EspWakeTimer {
    fn restart(&mut self) {
        if self.timer.cancel().is_ok() {
            if let Err(e) = self.timer.every(self.period) {
                log::warn!("wake timer restart failed: {e}");
            }
        }
    }
}

/// PM low-power window: light sleep with a timer wakeup, so the board keeps
/// its RAM and resumes the run loop where it left off.
pub struct LightSleep {
    pub wakeup_after: Duration,
}

impl PowerMode for LightSleep {
    fn enter_low_power(&mut self) {
        unsafe {
            esp_idf_sys::esp_sleep_enable_timer_wakeup(self.wakeup_after.as_micros() as u64);
            esp_idf_sys::esp_light_sleep_start();
        }
    }
}
