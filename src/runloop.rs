// MMD Buoy Firmware — Cooperative Run Loop
//
// Single-threaded polling: arm the SPI slave while the master's select line
// is active, service completed SPI transfers, and assemble serial command
// lines. One cycle runs until the wake timer (or a ping) raises the elapsed
// flag; the board then gets its low-power window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::command::line::{LineAssembler, LineResponse};
use crate::command::spi::{frame_text, SpiFrame, DASH_FRAME};
use crate::config::SPI_SETTLE_MS;
use crate::hw::{Delay, PowerMode, SerialPort, SpiSlavePort};

/// Board-side command dispatch, one implementation per board.
pub trait CommandHandler {
    fn handle_line(&mut self, line: &str) -> LineResponse;
    /// Dispatch one received SPI frame. `response` holds the frame that the
    /// next master poll will clock out; handlers that produce nothing leave
    /// it as is.
    fn handle_frame(&mut self, command: &str, response: &mut SpiFrame);
}

pub struct RunLoop<H, U, P, M, D> {
    handler: H,
    serial: U,
    spi: P,
    power: M,
    delay: D,
    assembler: LineAssembler,
    tx_frame: SpiFrame,
    timer_elapsed: Arc<AtomicBool>,
    spi_armed: Arc<AtomicBool>,
}

impl<H, U, P, M, D> RunLoop<H, U, P, M, D>
where
    H: CommandHandler,
    U: SerialPort,
    P: SpiSlavePort,
    M: PowerMode,
    D: Delay,
{
    pub fn new(
        handler: H,
        serial: U,
        spi: P,
        power: M,
        delay: D,
        timer_elapsed: Arc<AtomicBool>,
        spi_armed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            handler,
            serial,
            spi,
            power,
            delay,
            assembler: LineAssembler::new(),
            tx_frame: DASH_FRAME,
            timer_elapsed,
            spi_armed,
        }
    }

    /// One pass over the poll sources.
    pub fn poll_once(&mut self) {
        // Arm the SPI slave once the master drives the select line.
        if !self.spi_armed.load(Ordering::SeqCst) && self.spi.select_active() {
            self.tx_frame = DASH_FRAME;
            match self.spi.start_transfer(&self.tx_frame) {
                Ok(()) => {
                    self.spi_armed.store(true, Ordering::SeqCst);
                    log::info!("run: SPI initialized");
                }
                Err(e) => log::warn!("run: SPI arm failed: {e}"),
            }
        }

        // Service a completed SPI exchange and queue the next one.
        if self.spi_armed.load(Ordering::SeqCst) && self.spi.transfer_complete() {
            self.delay.delay_ms(SPI_SETTLE_MS);
            let rx = self.spi.take_received();
            let command = frame_text(&rx);
            self.handler.handle_frame(&command, &mut self.tx_frame);

            if let Err(e) = self.spi.start_transfer(&self.tx_frame) {
                self.spi_armed.store(false, Ordering::SeqCst);
                log::warn!("run: SPI re-arm failed: {e}");
            }
        }

        // Drain serial bytes; dispatch when a full line lands.
        while let Some(byte) = self.serial.poll_byte() {
            if let Some(line) = self.assembler.push(byte) {
                let response = self.handler.handle_line(&line);
                self.emit(&response);
            }
        }
    }

    fn emit(&mut self, response: &LineResponse) {
        for data in &response.data {
            self.serial.write_str(data);
            self.serial.write_str("\r\n");
        }
        self.serial.write_str(&response.echo);
        self.serial.write_str(" ");
        self.serial
            .write_str(if response.valid { "VALID\r\n" } else { "INVALID\r\n" });
    }

    /// Poll until the elapsed flag is raised, then run the low-power window.
    pub fn run_cycle(&mut self) {
        self.timer_elapsed.store(false, Ordering::SeqCst);
        while !self.timer_elapsed.load(Ordering::SeqCst) {
            self.poll_once();
        }
        log::info!("run: entering low-power window");
        self.power.enter_low_power();
        log::info!("run: exiting low-power window");
    }

    pub fn run(&mut self) -> ! {
        log::info!("run: started");
        loop {
            self.run_cycle();
        }
    }

    /// The board behind this loop (tests and shutdown paths).
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}
