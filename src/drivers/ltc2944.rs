// MMD Buoy Firmware — LTC2944 Battery Gas Gauge Driver
//
// PM board only (slave address 0x64). Init programs the accumulated-charge
// registers to the full-capacity value; reads run one manual-mode conversion
// cycle and scale the raw registers with the datasheet constants.

use crate::config::*;
use crate::error::SensorError;
use crate::hw::{Delay, I2cBus};
use crate::i2c::SharedBus;
use crate::readings::GaugeReading;

pub struct Ltc2944<B, D> {
    bus: SharedBus<B>,
    delay: D,
    battery_capacity_mah: f64,
}

impl<B: I2cBus, D: Delay> Ltc2944<B, D> {
    pub fn new(bus: SharedBus<B>, delay: D) -> Self {
        Self {
            bus,
            delay,
            battery_capacity_mah: BATTERY_CAPACITY_MAH,
        }
    }

    /// Charge corresponding to a full accumulated-charge register, in mAh.
    fn max_charge_mah(&self) -> f64 {
        1000.0 * 65535.0 * LTC2944_QLSB * LTC2944_M * 50e-3 / (LTC2944_RSENSE * 4096.0)
    }

    /// Probe the gauge and assume a fully charged battery by programming the
    /// accumulated-charge registers. The initial control-register read is
    /// retried once before giving up.
    pub fn init(&mut self) -> Result<(), SensorError> {
        let control = match self
            .bus
            .write_then_read(I2C_ADDR_LTC2944, &[LTC2944_REG_CONTROL], 1, true)
        {
            Ok(value) => value,
            Err(_) => self
                .bus
                .write_then_read(I2C_ADDR_LTC2944, &[LTC2944_REG_CONTROL], 1, true)?,
        };

        // Shut down the analog section (control B[0]) before touching the
        // accumulated charge registers.
        self.bus.write_command(
            I2C_ADDR_LTC2944,
            &[LTC2944_REG_CONTROL, control as u8 | 0x01],
            false,
        )?;

        let acr = (65535.0 * self.battery_capacity_mah / self.max_charge_mah() + 0.5) as u16;
        self.bus.write_command(
            I2C_ADDR_LTC2944,
            &[LTC2944_REG_ACC_CHARGE_MSB, (acr >> 8) as u8, acr as u8],
            false,
        )?;
        Ok(())
    }

    /// Run one manual conversion and read voltage, current, temperature,
    /// accumulated charge and the status byte.
    pub fn read(&mut self) -> Result<GaugeReading, SensorError> {
        // Manual mode: the ADC converts once and goes back to sleep.
        self.bus.write_command(
            I2C_ADDR_LTC2944,
            &[LTC2944_REG_CONTROL, LTC2944_CTRL_MANUAL],
            false,
        )?;

        // Voltage (48 ms max.), current (8 ms) and temperature (8 ms)
        // conversions all finish inside this window.
        self.delay.delay_ms(LTC2944_CONVERSION_WAIT_MS);

        let adc = self
            .bus
            .write_then_read(I2C_ADDR_LTC2944, &[LTC2944_REG_VOLTAGE_MSB], 2, true)?;
        let voltage_v = LTC2944_VFS_V * f64::from(adc) / 65535.0;

        let adc = self
            .bus
            .write_then_read(I2C_ADDR_LTC2944, &[LTC2944_REG_CURRENT_MSB], 2, true)?;
        let current_a = (LTC2944_VFS_I * 1e-3 / LTC2944_RSENSE) * (f64::from(adc) - 32767.0) / 32767.0;

        let adc = self
            .bus
            .write_then_read(I2C_ADDR_LTC2944, &[LTC2944_REG_TEMPERATURE_MSB], 2, true)?;
        let temperature_c = f64::from(adc) * LTC2944_TFS / 65535.0 - 273.15;

        // qLSB = 0.340 mAh * (50 mΩ / RSENSE) * (M / 4096)
        let adc = self
            .bus
            .write_then_read(I2C_ADDR_LTC2944, &[LTC2944_REG_ACC_CHARGE_MSB], 2, true)?;
        let charge_mah =
            1000.0 * f64::from(adc) * LTC2944_QLSB * LTC2944_M * 50e-3 / (LTC2944_RSENSE * 4096.0);

        let adc = self
            .bus
            .write_then_read(I2C_ADDR_LTC2944, &[LTC2944_REG_STATUS], 1, true)?;
        let status = adc as u8;

        Ok(GaugeReading {
            voltage_v,
            current_a,
            temperature_c,
            charge_mah,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::testbus::ScriptBus;

    struct NoDelay;
    impl Delay for NoDelay {
        fn delay_ms(&mut self, _ms: u32) {}
    }

    #[test]
    fn read_scales_registers_with_datasheet_constants() {
        let mut bus = ScriptBus::new();
        bus.stage(LTC2944_REG_VOLTAGE_MSB, &0xC000u16.to_be_bytes());
        bus.stage(LTC2944_REG_CURRENT_MSB, &0x7FFFu16.to_be_bytes()); // 32767 → 0 A
        bus.stage(LTC2944_REG_TEMPERATURE_MSB, &0x8000u16.to_be_bytes());
        bus.stage(LTC2944_REG_ACC_CHARGE_MSB, &0x1000u16.to_be_bytes());
        bus.stage(LTC2944_REG_STATUS, &[0x05]);

        let mut gauge = Ltc2944::new(SharedBus::new(bus), NoDelay);
        let reading = gauge.read().unwrap();

        assert!((reading.voltage_v - 70.8 * 49152.0 / 65535.0).abs() < 1e-9);
        assert!(reading.current_a.abs() < 1e-9);
        assert!((reading.temperature_c - (32768.0 * 510.0 / 65535.0 - 273.15)).abs() < 1e-9);
        let expected_charge = 1000.0 * 4096.0 * 0.34e-3 * 4096.0 * 50e-3 / (15e-3 * 4096.0);
        assert!((reading.charge_mah - expected_charge).abs() < 1e-9);
        assert_eq!(reading.status, 0x05);
    }

    #[test]
    fn init_retries_the_control_read_once() {
        let mut bus = ScriptBus::new();
        bus.fail_next_reads = 1;
        bus.stage(LTC2944_REG_CONTROL, &[0x3C]);
        let mut gauge = Ltc2944::new(SharedBus::new(bus), NoDelay);
        gauge.init().unwrap();

        let writes = gauge.bus.with_bus(|b| b.writes.clone());
        // Shutdown bit merged into the control value that was read back.
        assert!(writes
            .iter()
            .any(|(addr, w)| *addr == I2C_ADDR_LTC2944 && w == &[LTC2944_REG_CONTROL, 0x3D]));
        // Full-charge value programmed MSB first.
        let acr = writes
            .iter()
            .find(|(_, w)| w.len() == 3 && w[0] == LTC2944_REG_ACC_CHARGE_MSB)
            .expect("accumulated charge write");
        let programmed = u16::from_be_bytes([acr.1[1], acr.1[2]]);
        let max_charge = 1000.0 * 65535.0 * 0.34e-3 * 4096.0 * 50e-3 / (15e-3 * 4096.0);
        let expected = (65535.0 * 5200.0 / max_charge + 0.5) as u16;
        assert_eq!(programmed, expected);
    }
}
