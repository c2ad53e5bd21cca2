// MMD Buoy Firmware — MS5637 Pressure / Temperature Driver
//
// Internal pressure/temperature sensor on both boards (MS5637-02BA03,
// slave address 0x76). PROM calibration words are read once at init; every
// read runs both conversions fresh and applies the second-order
// compensation from the datasheet in double precision.

use crate::config::*;
use crate::error::SensorError;
use crate::hw::{Delay, I2cBus};
use crate::i2c::SharedBus;
use crate::readings::BaroReading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Reset,
    PromRead,
    Ready,
}

pub struct Ms5637<B, D> {
    bus: SharedBus<B>,
    delay: D,
    state: State,
    /// CRC nibble in word 0, calibration constants C1..C6 in words 1..6.
    c: [u16; 7],
    d1: u32,
    d2: u32,
}

impl<B: I2cBus, D: Delay> Ms5637<B, D> {
    pub fn new(bus: SharedBus<B>, delay: D) -> Self {
        Self {
            bus,
            delay,
            state: State::Uninitialized,
            c: [0; 7],
            d1: 0,
            d2: 0,
        }
    }

    /// Reset the sensor and read the PROM calibration words. Any failed word
    /// leaves the driver uninitialized.
    pub fn init(&mut self) -> Result<(), SensorError> {
        self.state = State::Uninitialized;

        self.bus
            .write_command(I2C_ADDR_MS5637, &[MS5637_CMD_RESET], false)
            .map_err(|e| {
                log::warn!("ms5637 init: could not reset: {e}");
                SensorError::Bus(e)
            })?;
        self.delay.delay_ms(MS5637_RESET_SETTLE_MS);
        self.state = State::Reset;

        self.prom_read().map_err(|e| {
            self.state = State::Uninitialized;
            e
        })?;
        self.state = State::Ready;
        Ok(())
    }

    fn prom_read(&mut self) -> Result<(), SensorError> {
        // Word 0 carries the factory CRC in bits 15:12.
        let word = self
            .bus
            .write_then_read(I2C_ADDR_MS5637, &[MS5637_PROM_BASE], 2, false)
            .map_err(|e| {
                log::warn!("ms5637 prom read: could not read CRC word: {e}");
                SensorError::PromReadFailed
            })?;
        self.c[0] = ((word >> 12) & 0x0F) as u16;
        self.delay.delay_ms(MS5637_PROM_SETTLE_MS);

        for i in 1..=6usize {
            let command = MS5637_PROM_BASE + ((i as u8) << 1);
            let word = self
                .bus
                .write_then_read(I2C_ADDR_MS5637, &[command], 2, false)
                .map_err(|e| {
                    log::warn!("ms5637 prom read: could not read C{i}: {e}");
                    SensorError::PromReadFailed
                })?;
            self.c[i] = word as u16;
            self.delay.delay_ms(MS5637_PROM_SETTLE_MS);
        }
        self.state = State::PromRead;
        Ok(())
    }

    fn convert(&mut self, command: u8) -> Result<(), SensorError> {
        self.bus
            .write_command(I2C_ADDR_MS5637, &[command], false)?;
        self.delay.delay_ms(MS5637_CONVERSION_MS);
        Ok(())
    }

    fn adc_read(&mut self) -> Result<u32, SensorError> {
        let value = self
            .bus
            .write_then_read(I2C_ADDR_MS5637, &[MS5637_CMD_ADC_READ], 3, false)?;
        self.delay.delay_ms(MS5637_CONVERSION_MS);
        Ok(value)
    }

    fn read_d1_d2(&mut self) -> Result<(u32, u32), SensorError> {
        self.convert(MS5637_CMD_CONVERT_D1_OSR4096)?;
        let d1 = self.adc_read()?;
        self.convert(MS5637_CMD_CONVERT_D2_OSR4096)?;
        let d2 = self.adc_read()?;
        Ok((d1, d2))
    }

    /// Run both conversions and return the compensated reading. d1/d2 are
    /// recomputed in full on every call; a failed call leaves no partial
    /// state behind.
    pub fn read(&mut self) -> Result<BaroReading, SensorError> {
        if self.state != State::Ready {
            return Err(SensorError::NotInitialized);
        }

        let (d1, d2) = self.read_d1_d2()?;
        self.d1 = d1;
        self.d2 = d2;

        let (pressure_mbar, temperature_c) = compensate(&self.c, d1, d2);
        Ok(BaroReading {
            d1,
            d2,
            pressure_mbar,
            temperature_c,
        })
    }

    /// CRC nibble and calibration constants as read from the PROM.
    pub fn calibration_coefficients(&self) -> [u16; 7] {
        self.c
    }
}

/// Second-order temperature compensation (datasheet section "second order
/// temperature compensation"). Inputs are the PROM constants and the raw
/// D1/D2 conversions; output is (mbar, °C).
fn compensate(c: &[u16; 7], d1: u32, d2: u32) -> (f64, f64) {
    // dT = D2 - TREF = D2 - C5 * 2^8
    // TEMP = 2000 + dT * C6 / 2^23   (centi-°C)
    let dt = f64::from(d2) - f64::from(c[5]) * (1u64 << 8) as f64;
    let mut temp = 2000.0 + dt * f64::from(c[6]) / (1u64 << 23) as f64;

    // OFF = C2 * 2^17 + C4 * dT / 2^6
    // SENS = C1 * 2^16 + C3 * dT / 2^7
    let mut off = f64::from(c[2]) * (1u64 << 17) as f64 + f64::from(c[4]) * dt / (1u64 << 6) as f64;
    let mut sens = f64::from(c[1]) * (1u64 << 16) as f64 + f64::from(c[3]) * dt / (1u64 << 7) as f64;

    let t2;
    let mut off2;
    let mut sens2;
    if temp < 2000.0 {
        // Low temperature
        t2 = 3.0 * dt * dt / (1u64 << 33) as f64;
        let tmp = (temp - 2000.0) * (temp - 2000.0) / (1u64 << 4) as f64;
        off2 = 61.0 * tmp;
        sens2 = 29.0 * tmp;

        if temp < -1500.0 {
            // Very low temperature
            let tmp = (temp + 1500.0) * (temp + 1500.0);
            off2 += 17.0 * tmp;
            sens2 += 9.0 * tmp;
        }
    } else {
        // High temperature
        t2 = 5.0 * dt * dt / (1u64 << 38) as f64;
        off2 = 0.0;
        sens2 = 0.0;
    }

    temp -= t2;
    off -= off2;
    sens -= sens2;

    // P = (D1 * SENS / 2^21 - OFF) / 2^15   (centi-mbar)
    let p = (f64::from(d1) * sens / (1u64 << 21) as f64 - off) / (1u64 << 15) as f64;

    (p / 100.0, temp / 100.0)
}
