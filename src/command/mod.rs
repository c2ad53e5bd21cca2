// MMD Buoy Firmware — Command Layer
//
// Two incompatible views of the same command set: the CRLF line protocol on
// the PC serial link, and the fixed-width polled SPI slave protocol.

pub mod line;
pub mod spi;

/// Integer argument of a `<NAME> <value>` setter command. Missing or
/// malformed arguments read as 0, matching the tolerant C-string parsing the
/// master controllers rely on.
pub fn setter_arg(command: &str) -> i32 {
    command
        .split_whitespace()
        .nth(1)
        .and_then(|token| token.parse().ok())
        .unwrap_or(0)
}
