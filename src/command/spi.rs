// MMD Buoy Firmware — SPI Slave Frames & Session State
//
// The polled SPI link moves fixed 8-byte frames, so multi-field sensor
// results are spread over successive RESP polls. The session remembers the
// last primary command and how many fields have gone out.

use crate::config::SPI_FRAME_LEN;

pub type SpiFrame = [u8; SPI_FRAME_LEN];

/// Placeholder returned once a response sequence is exhausted.
pub const DASH_FRAME: SpiFrame = *b"--------";

/// Command text carried by a received frame (up to the first NUL).
pub fn frame_text(frame: &SpiFrame) -> String {
    let end = frame.iter().position(|&b| b == 0).unwrap_or(SPI_FRAME_LEN);
    String::from_utf8_lossy(&frame[..end]).into_owned()
}

/// Right-align a float into the 8-character frame, `%8.<decimals>f` style.
pub fn float_field(value: f64, decimals: usize) -> SpiFrame {
    text_field(&format!("{value:>width$.decimals$}", width = SPI_FRAME_LEN))
}

/// Right-align an integer into the 8-character frame.
pub fn int_field(value: i64) -> SpiFrame {
    text_field(&format!("{value:>width$}", width = SPI_FRAME_LEN))
}

pub fn bit_field(level: bool) -> SpiFrame {
    int_field(if level { 1 } else { 0 })
}

/// Pack a string into a frame: first 8 bytes, space padded.
pub fn text_field(s: &str) -> SpiFrame {
    let mut frame = [b' '; SPI_FRAME_LEN];
    for (slot, byte) in frame.iter_mut().zip(s.bytes()) {
        *slot = byte;
    }
    frame
}

/// Per-board multiplexing cursor: which primary command the master is
/// polling out, and how many of its fields have been sent. Reset by every
/// new primary command.
#[derive(Default)]
pub struct SpiSession {
    last_command: String,
    num_sent: u8,
}

impl SpiSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a primary command without starting a field sequence
    /// (single-field and side-effect-only commands).
    pub fn record(&mut self, command: &str) {
        self.last_command = command.to_string();
    }

    /// Record a primary command whose first field is being returned now.
    pub fn begin_fields(&mut self, command: &str) {
        self.last_command = command.to_string();
        self.num_sent = 1;
    }

    /// Does the remembered primary command contain `key`?
    pub fn matches(&self, key: &str) -> bool {
        self.last_command.contains(key)
    }

    pub fn num_sent(&self) -> u8 {
        self.num_sent
    }

    pub fn advance(&mut self) {
        self.num_sent += 1;
    }
}
