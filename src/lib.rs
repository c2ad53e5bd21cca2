// MMD Buoy Firmware — Library Root
//
// Firmware for the buoy's two controller boards:
//   - PM  (Power Module): rail sequencing, battery gauge, leak/baro/tilt
//     sensors, PC serial command link, polled SPI slave link.
//   - WCM (Wireless Communication Module): radio/GPS/satellite rails, leak
//     and battery detectors, the same sensor pair and command links.
//
// The board logic is hardware-independent and runs against the port traits
// in `hw`; the ESP-IDF adapters and the `pm`/`wcm` binaries sit behind the
// `esp32` feature.

pub mod boards;
pub mod command;
pub mod config;
pub mod drivers;
pub mod error;
pub mod hw;
pub mod i2c;
pub mod readings;
pub mod runloop;
