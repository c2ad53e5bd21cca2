// MMD Buoy Firmware — Serial Line Discipline
//
// Commands arrive as ASCII terminated by CRLF. The carriage return ends the
// token; the line feed releases it. A line that overruns the fixed command
// buffer is dropped.

use crate::config::COMMAND_LENGTH;

/// Assembles CR-terminated command lines from polled bytes.
#[derive(Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
    complete: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(COMMAND_LENGTH),
            complete: false,
        }
    }

    /// Feed one received byte. Returns the finished command line once the
    /// terminating LF arrives.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\n' => {
                if self.complete {
                    self.complete = false;
                    let line = String::from_utf8_lossy(&self.buf).into_owned();
                    self.buf.clear();
                    return Some(line);
                }
                None
            }
            b'\r' => {
                self.complete = true;
                None
            }
            _ => {
                if self.complete {
                    // Stray bytes between CR and LF are ignored.
                    return None;
                }
                self.buf.push(byte);
                if self.buf.len() == COMMAND_LENGTH {
                    // Overlong line: drop it rather than dispatch a fragment.
                    self.buf.clear();
                    self.complete = false;
                }
                None
            }
        }
    }
}

/// Everything a line command produces: data lines, the echoed (possibly
/// rewritten) command token, and the VALID/INVALID verdict.
#[derive(Debug, Clone)]
pub struct LineResponse {
    pub data: Vec<String>,
    pub echo: String,
    pub valid: bool,
}

impl LineResponse {
    pub fn new(echo: &str) -> Self {
        Self {
            data: Vec::new(),
            echo: echo.to_string(),
            valid: true,
        }
    }
}
