// MMD Buoy Firmware — Hardware & Protocol Configuration
// Boards: Power Module (PM) and Wireless Communication Module (WCM)

// ---------------------------------------------------------------------------
// Serial / SPI link framing
// ---------------------------------------------------------------------------
pub const UART_BAUD: u32 = 38_400;
pub const COMMAND_LENGTH: usize = 64; // max serial command line, bytes
pub const SPI_FRAME_LEN: usize = 8; // fixed polled-slave frame, bytes
pub const SPI_SETTLE_MS: u32 = 10; // settle after transfer-complete before dispatch

// ---------------------------------------------------------------------------
// Run loop timing
// ---------------------------------------------------------------------------
pub const WAKE_TIMER_PERIOD_S: u64 = 30; // periodic elapsed flag → sleep cycle (PM)

// ---------------------------------------------------------------------------
// I2C Bus
// ---------------------------------------------------------------------------
pub const I2C_ADDR_MS5637: u8 = 0x76;
pub const I2C_ADDR_MC3416: u8 = 0x4C;
pub const I2C_ADDR_LTC2944: u8 = 0x64;

// ---------------------------------------------------------------------------
// MS5637 pressure / temperature sensor (MS5637-02BA03)
// ---------------------------------------------------------------------------
pub const MS5637_CMD_RESET: u8 = 0x1E;
pub const MS5637_CMD_CONVERT_D1_OSR4096: u8 = 0x48; // pressure
pub const MS5637_CMD_CONVERT_D2_OSR4096: u8 = 0x58; // temperature
pub const MS5637_CMD_ADC_READ: u8 = 0x00;
pub const MS5637_PROM_BASE: u8 = 0xA0; // word n at 0xA0 + 2n

pub const MS5637_RESET_SETTLE_MS: u32 = 3; // datasheet: 2.8 ms reload
pub const MS5637_PROM_SETTLE_MS: u32 = 20; // between PROM word reads
pub const MS5637_CONVERSION_MS: u32 = 20; // OSR 4096 conversion is 8.22 ms

// ---------------------------------------------------------------------------
// MC3416 accelerometer register map
// ---------------------------------------------------------------------------
pub const MC3416_REG_DEVICE_STATUS: u8 = 0x05;
pub const MC3416_REG_MODE: u8 = 0x07;
pub const MC3416_REG_SAMPLE_RATE: u8 = 0x08;
pub const MC3416_REG_XOUT_EX_L: u8 = 0x0D;
pub const MC3416_REG_XOUT_EX_H: u8 = 0x0E;
pub const MC3416_REG_YOUT_EX_L: u8 = 0x0F;
pub const MC3416_REG_YOUT_EX_H: u8 = 0x10;
pub const MC3416_REG_ZOUT_EX_L: u8 = 0x11;
pub const MC3416_REG_ZOUT_EX_H: u8 = 0x12;
pub const MC3416_REG_CHIPID: u8 = 0x18;
pub const MC3416_REG_RANGE: u8 = 0x20;
pub const MC3416_REG_PRODUCT_CODE_L: u8 = 0x3B;

pub const MC3416_MODE_STANDBY: u8 = 0x00;
pub const MC3416_MODE_WAKE: u8 = 0x01;
pub const MC3416_STATE_MASK: u8 = 0x03;

pub const MC3416_ODR_128: u8 = 0x00;
pub const MC3416_ODR_MASK: u8 = 0xF8;
pub const MC3416_RANGE_2G: u8 = 0x09;
pub const MC3416_RANGE_MASK: u8 = 0x80;

pub const MC3416_CHIPID: u8 = 0xA0; // register value masked 0xF0
pub const MC3416_CHIPID_MASK: u8 = 0xF0;
pub const MC3416_PCODE: u8 = 0x20; // register value masked 0xF1
pub const MC3416_PCODE_MASK: u8 = 0xF1;

pub const MC3416_WAKEUP_DELAY_MS: u32 = 1000;

/// Resolution at the fixed ±2 g range: 2 g / 2^15 per count.
pub const MC3416_RES_2G: f64 = 0.00006103515625;
pub const MC3416_RAD_TO_DEG: f64 = 57.29577951; // 180 / pi
/// Y axis reference orientation is vertical: 1 g in raw counts.
pub const MC3416_Y_REF_COUNTS: i16 = 16384;

// ---------------------------------------------------------------------------
// LTC2944 battery gas gauge
// ---------------------------------------------------------------------------
pub const LTC2944_REG_STATUS: u8 = 0x00;
pub const LTC2944_REG_CONTROL: u8 = 0x01;
pub const LTC2944_REG_ACC_CHARGE_MSB: u8 = 0x02;
pub const LTC2944_REG_VOLTAGE_MSB: u8 = 0x08;
pub const LTC2944_REG_CURRENT_MSB: u8 = 0x0E;
pub const LTC2944_REG_TEMPERATURE_MSB: u8 = 0x14;

/// Manual mode, coulomb prescaler M = 4096, /ALCC disabled, shutdown clear.
pub const LTC2944_CTRL_MANUAL: u8 = 0x78;
pub const LTC2944_CONVERSION_WAIT_MS: u32 = 100;

pub const LTC2944_M: f64 = 4096.0;
pub const LTC2944_QLSB: f64 = 0.34e-3; // Ah per count at 50 mΩ / M = 4096
pub const LTC2944_TFS: f64 = 510.0; // full-scale temperature, kelvin
pub const LTC2944_VFS_I: f64 = 64.0; // full-scale sense voltage, mV
pub const LTC2944_VFS_V: f64 = 70.8; // full-scale battery voltage, V
pub const LTC2944_RSENSE: f64 = 15e-3; // sense resistor, Ω
pub const BATTERY_CAPACITY_MAH: f64 = 5200.0; // 12 V pack

// ---------------------------------------------------------------------------
// Leak / battery detector ADC
// ---------------------------------------------------------------------------
pub const ADC_VREF: f32 = 3.3;
pub const ADC_FULL_SCALE: f32 = 4095.0;
