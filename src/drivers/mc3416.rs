// MMD Buoy Firmware — MC3416 Tilt Accelerometer Driver
//
// mCube MC3416 at slave address 0x4C. The buoy only cares about the tilt
// angle of the Y axis relative to gravity; zero-point offsets are raw-count
// corrections persisted in the external offset store.

use crate::config::*;
use crate::error::SensorError;
use crate::hw::{Delay, I2cBus, OffsetStore};
use crate::i2c::SharedBus;
use crate::readings::{AxisCounts, GVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Standby,
    Wake,
}

pub struct Mc3416<B, D, O> {
    bus: SharedBus<B>,
    delay: D,
    store: O,
    offsets: AxisCounts,
    counts: AxisCounts,
    g: GVector,
}

impl<B: I2cBus, D: Delay, O: OffsetStore> Mc3416<B, D, O> {
    pub fn new(bus: SharedBus<B>, delay: D, store: O) -> Self {
        Self {
            bus,
            delay,
            store,
            offsets: AxisCounts::default(),
            counts: AxisCounts::default(),
            g: GVector::default(),
        }
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, SensorError> {
        let mut buf = [0u8; 1];
        self.bus.read_register(I2C_ADDR_MC3416, reg, &mut buf)?;
        Ok(buf[0])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.bus.write_register(I2C_ADDR_MC3416, reg, value)?;
        Ok(())
    }

    fn set_mode(&mut self, mode: Mode) -> Result<(), SensorError> {
        let bits = match mode {
            Mode::Standby => MC3416_MODE_STANDBY,
            Mode::Wake => MC3416_MODE_WAKE,
        };
        self.write_reg(MC3416_REG_MODE, bits)?;
        if mode == Mode::Wake {
            // Internal wake-up settle before samples are valid.
            self.delay.delay_ms(MC3416_WAKEUP_DELAY_MS);
        }
        Ok(())
    }

    /// Read the device-status register and report the current mode.
    pub fn check_mode(&mut self) -> Result<Mode, SensorError> {
        let status = self.read_reg(MC3416_REG_DEVICE_STATUS)?;
        if status & MC3416_STATE_MASK == MC3416_MODE_STANDBY {
            Ok(Mode::Standby)
        } else {
            Ok(Mode::Wake)
        }
    }

    fn validate_chip(&mut self) -> Result<(), SensorError> {
        let chip_id = self.read_reg(MC3416_REG_CHIPID)?;
        let product_code = self.read_reg(MC3416_REG_PRODUCT_CODE_L)?;
        if chip_id & MC3416_CHIPID_MASK != MC3416_CHIPID {
            log::warn!("mc3416: chip ID {chip_id:#04x} incorrect");
            return Err(SensorError::UnrecognizedDevice);
        }
        if product_code & MC3416_PCODE_MASK != MC3416_PCODE {
            log::warn!("mc3416: product code {product_code:#04x} incorrect");
            return Err(SensorError::UnrecognizedDevice);
        }
        Ok(())
    }

    fn set_sampling_rate(&mut self) -> Result<(), SensorError> {
        let value = self.read_reg(MC3416_REG_SAMPLE_RATE)?;
        self.write_reg(MC3416_REG_SAMPLE_RATE, (value & MC3416_ODR_MASK) | MC3416_ODR_128)
    }

    fn set_range_resolution(&mut self) -> Result<(), SensorError> {
        let value = self.read_reg(MC3416_REG_RANGE)?;
        self.write_reg(MC3416_REG_RANGE, (value & MC3416_RANGE_MASK) | MC3416_RANGE_2G)
    }

    /// Load offsets, confirm the chip identity, configure sampling and range,
    /// then wake the device. An identity mismatch is fatal to this sensor.
    pub fn init(&mut self) -> Result<(), SensorError> {
        match self.store.load() {
            Ok((x, y, z)) => self.offsets = AxisCounts { x, y, z },
            Err(e) => {
                // All-zero is the valid uncalibrated default.
                log::warn!("mc3416: offset load failed ({e}), using zero offsets");
                self.offsets = AxisCounts::default();
            }
        }

        self.validate_chip()?;
        self.set_mode(Mode::Standby)?;
        self.set_sampling_rate()?;
        self.set_range_resolution()?;
        self.set_mode(Mode::Wake)?;
        Ok(())
    }

    fn read_axis(&mut self) -> Result<AxisCounts, SensorError> {
        let xl = self.read_reg(MC3416_REG_XOUT_EX_L)?;
        let xh = self.read_reg(MC3416_REG_XOUT_EX_H)?;
        let yl = self.read_reg(MC3416_REG_YOUT_EX_L)?;
        let yh = self.read_reg(MC3416_REG_YOUT_EX_H)?;
        let zl = self.read_reg(MC3416_REG_ZOUT_EX_L)?;
        let zh = self.read_reg(MC3416_REG_ZOUT_EX_H)?;
        Ok(AxisCounts {
            x: i16::from_le_bytes([xl, xh]),
            y: i16::from_le_bytes([yl, yh]),
            z: i16::from_le_bytes([zl, zh]),
        })
    }

    fn wake_if_standby(&mut self) -> Result<(), SensorError> {
        if self.check_mode()? == Mode::Standby {
            self.set_mode(Mode::Wake)?;
        }
        Ok(())
    }

    fn convert_to_g(&mut self, raw: AxisCounts) {
        self.counts = AxisCounts {
            x: raw.x.wrapping_sub(self.offsets.x),
            y: raw.y.wrapping_sub(self.offsets.y),
            z: raw.z.wrapping_sub(self.offsets.z),
        };
        self.g = GVector {
            x: f64::from(self.counts.x) * MC3416_RES_2G,
            y: f64::from(self.counts.y) * MC3416_RES_2G,
            z: f64::from(self.counts.z) * MC3416_RES_2G,
        };
    }

    /// Sample the three axes and compute the Y-axis tilt from vertical, in
    /// degrees. A zero-g vector has no defined angle and reads as a failure.
    pub fn read_tilt(&mut self) -> Result<f64, SensorError> {
        self.wake_if_standby()?;
        let raw = self.read_axis()?;
        self.convert_to_g(raw);

        let GVector { x, y, z } = self.g;
        let angle = MC3416_RAD_TO_DEG * (y / (x * x + y * y + z * z).sqrt()).acos();
        if !angle.is_finite() {
            return Err(SensorError::InvalidAngle);
        }
        Ok(angle)
    }

    /// Capture the current raw counts as the new zero point. The Y axis sits
    /// vertical in the buoy, so 1 g (16384 counts) is subtracted from its
    /// raw reading before storing.
    pub fn calibrate(&mut self) -> Result<(), SensorError> {
        self.wake_if_standby()?;
        let raw = self.read_axis()?;

        self.offsets = AxisCounts {
            x: raw.x,
            y: raw.y.wrapping_sub(MC3416_Y_REF_COUNTS),
            z: raw.z,
        };
        self.store
            .save(self.offsets.x, self.offsets.y, self.offsets.z)?;
        Ok(())
    }

    /// Clear the zero point and persist.
    pub fn zero_offsets(&mut self) -> Result<(), SensorError> {
        self.offsets = AxisCounts::default();
        self.store.save(0, 0, 0)?;
        Ok(())
    }

    /// Offset-corrected counts from the last sample.
    pub fn counts(&self) -> AxisCounts {
        self.counts
    }

    /// Gravity vector from the last sample.
    pub fn g_values(&self) -> GVector {
        self.g
    }

    pub fn offsets(&self) -> AxisCounts {
        self.offsets
    }

    /// Park the device in standby.
    pub fn standby(&mut self) -> Result<(), SensorError> {
        self.set_mode(Mode::Standby)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::error::StorageError;
    use crate::i2c::testbus::ScriptBus;

    struct NoDelay;
    impl Delay for NoDelay {
        fn delay_ms(&mut self, _ms: u32) {}
    }

    /// In-memory store shared with the test body.
    #[derive(Clone, Default)]
    struct MemStore {
        record: Rc<RefCell<Option<(i16, i16, i16)>>>,
    }

    impl OffsetStore for MemStore {
        fn load(&mut self) -> Result<(i16, i16, i16), StorageError> {
            Ok(self.record.borrow().unwrap_or((0, 0, 0)))
        }

        fn save(&mut self, x: i16, y: i16, z: i16) -> Result<(), StorageError> {
            *self.record.borrow_mut() = Some((x, y, z));
            Ok(())
        }
    }

    fn stage_axes(bus: &mut ScriptBus, x: i16, y: i16, z: i16) {
        let [xl, xh] = x.to_le_bytes();
        let [yl, yh] = y.to_le_bytes();
        let [zl, zh] = z.to_le_bytes();
        bus.stage(MC3416_REG_XOUT_EX_L, &[xl]);
        bus.stage(MC3416_REG_XOUT_EX_H, &[xh]);
        bus.stage(MC3416_REG_YOUT_EX_L, &[yl]);
        bus.stage(MC3416_REG_YOUT_EX_H, &[yh]);
        bus.stage(MC3416_REG_ZOUT_EX_L, &[zl]);
        bus.stage(MC3416_REG_ZOUT_EX_H, &[zh]);
    }

    fn stage_awake(bus: &mut ScriptBus) {
        bus.stage(MC3416_REG_DEVICE_STATUS, &[MC3416_MODE_WAKE]);
    }

    fn driver_with(
        bus: ScriptBus,
        store: MemStore,
    ) -> Mc3416<ScriptBus, NoDelay, MemStore> {
        Mc3416::new(SharedBus::new(bus), NoDelay, store)
    }

    #[test]
    fn init_rejects_wrong_chip_id() {
        let mut bus = ScriptBus::new();
        bus.stage(MC3416_REG_CHIPID, &[0x30]);
        bus.stage(MC3416_REG_PRODUCT_CODE_L, &[0x20]);
        let mut driver = driver_with(bus, MemStore::default());
        assert_eq!(driver.init(), Err(SensorError::UnrecognizedDevice));
    }

    #[test]
    fn init_configures_rate_and_range_with_merged_bits() {
        let mut bus = ScriptBus::new();
        bus.stage(MC3416_REG_CHIPID, &[0xA0]);
        bus.stage(MC3416_REG_PRODUCT_CODE_L, &[0x20]);
        bus.stage(MC3416_REG_SAMPLE_RATE, &[0xAB]);
        bus.stage(MC3416_REG_RANGE, &[0xFF]);
        let mut driver = driver_with(bus, MemStore::default());
        driver.init().unwrap();

        let writes = driver.bus.with_bus(|b| b.writes.clone());
        let find = |reg: u8| {
            writes
                .iter()
                .rev()
                .find(|(_, w)| w.len() == 2 && w[0] == reg)
                .map(|(_, w)| w[1])
        };
        assert_eq!(find(MC3416_REG_SAMPLE_RATE), Some((0xAB & 0xF8) | 0x00));
        assert_eq!(find(MC3416_REG_RANGE), Some((0xFF & 0x80) | 0x09));
        assert_eq!(find(MC3416_REG_MODE), Some(MC3416_MODE_WAKE));
    }

    #[test]
    fn tilt_subtracts_persisted_offsets() {
        // Perfectly vertical Y reading with a stored Y offset of 100:
        // corrected y = 16384 → exactly 0° only when the offset applies.
        let mut bus = ScriptBus::new();
        stage_awake(&mut bus);
        stage_axes(&mut bus, 0, 16484, 0);
        let mut driver = driver_with(bus, MemStore::default());
        driver.offsets = AxisCounts { x: 0, y: 100, z: 0 };

        let angle = driver.read_tilt().unwrap();
        assert!(angle.abs() < 1e-9, "angle {angle}");
        assert_eq!(driver.counts(), AxisCounts { x: 0, y: 16384, z: 0 });
    }

    #[test]
    fn offset_change_shifts_the_angle_predictably() {
        // Same raw sample, two different zero points: the angle must follow
        // the corrected vector, not the raw one.
        let raw = (1000i16, 16000i16, 200i16);

        let mut bus = ScriptBus::new();
        stage_awake(&mut bus);
        stage_axes(&mut bus, raw.0, raw.1, raw.2);
        let mut driver = driver_with(bus, MemStore::default());
        let baseline = driver.read_tilt().unwrap();

        let mut bus = ScriptBus::new();
        stage_awake(&mut bus);
        stage_axes(&mut bus, raw.0, raw.1, raw.2);
        let mut driver = driver_with(bus, MemStore::default());
        driver.offsets = AxisCounts { x: 1000, y: 0, z: 200 };
        let corrected = driver.read_tilt().unwrap();

        let expected = {
            let y = f64::from(raw.1) * MC3416_RES_2G;
            let x = f64::from(raw.0) * MC3416_RES_2G;
            let z = f64::from(raw.2) * MC3416_RES_2G;
            MC3416_RAD_TO_DEG * (y / (x * x + y * y + z * z).sqrt()).acos()
        };
        assert!((baseline - expected).abs() < 1e-9);
        // With x/z zeroed out the vector is pure Y → 0°.
        assert!(corrected.abs() < 1e-9, "corrected {corrected}");
    }

    #[test]
    fn zero_g_vector_is_a_read_failure() {
        let mut bus = ScriptBus::new();
        stage_awake(&mut bus);
        stage_axes(&mut bus, 0, 0, 0);
        let mut driver = driver_with(bus, MemStore::default());
        assert_eq!(driver.read_tilt(), Err(SensorError::InvalidAngle));
    }

    #[test]
    fn calibrate_references_y_to_one_g() {
        let store = MemStore::default();
        let mut bus = ScriptBus::new();
        stage_awake(&mut bus);
        stage_axes(&mut bus, 25, 16384, -40);
        let mut driver = driver_with(bus, store.clone());
        driver.calibrate().unwrap();

        // rawY == 16384 → stored y offset is exactly 0.
        assert_eq!(store.record.borrow().unwrap(), (25, 0, -40));
        assert_eq!(driver.offsets(), AxisCounts { x: 25, y: 0, z: -40 });
    }

    #[test]
    fn zero_offsets_round_trips_through_the_store() {
        let store = MemStore::default();
        *store.record.borrow_mut() = Some((5, 6, 7));
        let bus = ScriptBus::new();
        let mut driver = driver_with(bus, store.clone());
        driver.zero_offsets().unwrap();
        assert_eq!(store.record.borrow().unwrap(), (0, 0, 0));
    }

    #[test]
    fn standby_device_is_woken_before_sampling() {
        let mut bus = ScriptBus::new();
        bus.stage(MC3416_REG_DEVICE_STATUS, &[MC3416_MODE_STANDBY]);
        stage_axes(&mut bus, 0, 16384, 0);
        let mut driver = driver_with(bus, MemStore::default());
        let angle = driver.read_tilt().unwrap();
        assert!(angle.abs() < 1e-9);
    }
}
