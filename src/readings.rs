// MMD Buoy Firmware — Sensor Reading Types

// ---------------------------------------------------------------------------
// MS5637 pressure / temperature
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default)]
pub struct BaroReading {
    /// Uncompensated pressure conversion.
    pub d1: u32,
    /// Uncompensated temperature conversion.
    pub d2: u32,
    pub pressure_mbar: f64,
    pub temperature_c: f64,
}

// ---------------------------------------------------------------------------
// MC3416 accelerometer
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisCounts {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

// ---------------------------------------------------------------------------
// LTC2944 battery gas gauge
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default)]
pub struct GaugeReading {
    pub voltage_v: f64,
    pub current_a: f64,
    pub temperature_c: f64,
    pub charge_mah: f64,
    pub status: u8,
}
