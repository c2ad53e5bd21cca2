// MMD Buoy Firmware — Wireless Communication Module (WCM) Board
//
// Switches the radio/GPS/satellite rails, reads the leak and battery
// detectors plus the shared MS5637/MC3416 sensors, and forwards GPS and
// SAT/CELL modem traffic. Same dual command surface as the PM board, with
// the WCM rail set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::command::line::LineResponse;
use crate::command::setter_arg;
use crate::command::spi::{self, SpiFrame, SpiSession, DASH_FRAME};
use crate::config::COMMAND_LENGTH;
use crate::drivers::mc3416::Mc3416;
use crate::drivers::ms5637::Ms5637;
use crate::hw::{Adc, AuxLink, Delay, I2cBus, OffsetStore, WakeTimer, WcmRail, WcmRails};
use crate::i2c::SharedBus;
use crate::runloop::CommandHandler;

/// Rail levels captured by the SPI `POWER` primary, replayed by `RESP`.
#[derive(Default, Clone, Copy)]
struct PowerSnapshot {
    gps: bool,
    cell: bool,
    light: bool,
    sat: bool,
    wifi: bool,
    com_sw: bool,
}

pub struct WcmBoard<B, D, R, A, O, G, C, T> {
    rails: R,
    leak_adc: A,
    batt_adc: A,
    ms5637: Ms5637<B, D>,
    mc3416: Mc3416<B, D, O>,
    gps: G,
    com: C,
    timer: T,

    session: SpiSession,
    baro_temperature: f64,
    power: PowerSnapshot,

    timer_elapsed: Arc<AtomicBool>,
}

impl<B, D, R, A, O, G, C, T> WcmBoard<B, D, R, A, O, G, C, T>
where
    B: I2cBus,
    D: Delay + Clone,
    R: WcmRails,
    A: Adc,
    O: OffsetStore,
    G: AuxLink,
    C: AuxLink,
    T: WakeTimer,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: SharedBus<B>,
        delay: D,
        rails: R,
        leak_adc: A,
        batt_adc: A,
        store: O,
        gps: G,
        com: C,
        timer: T,
        timer_elapsed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            rails,
            leak_adc,
            batt_adc,
            ms5637: Ms5637::new(bus.clone(), delay.clone()),
            mc3416: Mc3416::new(bus, delay, store),
            gps,
            com,
            timer,
            session: SpiSession::new(),
            baro_temperature: 0.0,
            power: PowerSnapshot::default(),
            timer_elapsed,
        }
    }

    /// Power-on rail defaults, then the internal sensors.
    pub fn init(&mut self) {
        self.rails.set(WcmRail::Analog3v3, true);
        self.rails.set(WcmRail::GpsPower, true);

        self.rails.set(WcmRail::CellPower, false);
        self.rails.set(WcmRail::WifiPower, false);
        self.rails.set(WcmRail::ComSwitchA, false);
        self.rails.set(WcmRail::SatPower, false);
        self.rails.set(WcmRail::Light, false);

        self.init_internal_hw();
    }

    pub fn init_internal_hw(&mut self) {
        match self.ms5637.init() {
            Ok(()) => log::info!("wcm init: ms5637 init done"),
            Err(e) => log::error!("wcm init: could not initialize MS5637: {e}"),
        }

        match self.mc3416.init() {
            Ok(()) => log::info!("wcm init: mc3416 init done"),
            Err(e) => log::error!("wcm init: could not initialize MC3416: {e}"),
        }
    }

    fn ping(&mut self) {
        log::info!("handle_command: ping received");
        self.timer.restart();
        self.timer_elapsed.store(true, Ordering::SeqCst);
    }

    fn set_rail(&mut self, response: &mut LineResponse, name: &str, rail: WcmRail, line: &str) {
        let value = setter_arg(line);
        response.echo = format!("{name} {value}");
        self.rails.set(rail, value != 0);
    }

    // -----------------------------------------------------------------------
    // Serial line commands
    // -----------------------------------------------------------------------
    pub fn handle_line(&mut self, line: &str) -> LineResponse {
        let mut response = LineResponse::new(line);

        if line.contains("read_leak") {
            match self.leak_adc.read() {
                Ok(v) => response.data.push(format!("LEAK {v:.2}")),
                Err(e) => log::warn!("handle_command: could not read leak detector: {e}"),
            }
        } else if line.contains("read_batt") {
            match self.batt_adc.read() {
                Ok(v) => response.data.push(format!("BATTERY DETECT {v:.2}")),
                Err(e) => log::warn!("handle_command: could not read battery detector: {e}"),
            }
        } else if line.contains("read_coms") {
            // Power the modem long enough to collect one line from it.
            self.rails.set(WcmRail::SatPower, true);
            if self.com.data_ready() {
                match self.com.read_line(COMMAND_LENGTH) {
                    Some(data) => response.data.push(format!("{data} VALID")),
                    None => response.data.push("INVALID".to_string()),
                }
            }
            self.rails.set(WcmRail::SatPower, false);
        } else if line.contains("read_gps") {
            if self.rails.get(WcmRail::GpsPower) && self.gps.data_ready() {
                if let Some(data) = self.gps.read_line(COMMAND_LENGTH) {
                    // The GPS sentence replaces the command echo.
                    response.echo = data;
                }
            }
        } else if line.contains("wcm_ping") {
            self.ping();
        } else if line.contains("read_ms5637") {
            match self.ms5637.read() {
                Ok(b) => {
                    response.data.push(format!("D1 {}", b.d1));
                    response.data.push(format!("D2 {}", b.d2));
                    response
                        .data
                        .push(format!("MS5637 PRESSURE {:.2}", b.pressure_mbar));
                    response
                        .data
                        .push(format!("MS5637 TEMPERATURE {:.2}", b.temperature_c));
                }
                Err(e) => log::warn!("handle_command: could not read MS5637: {e}"),
            }
        } else if line.contains("read_mc3416") {
            match self.mc3416.read_tilt() {
                Ok(angle) => response.data.push(format!("TILT ANGLE {angle:.2}")),
                Err(e) => log::warn!("handle_command: could not read MC3416: {e}"),
            }
        } else if line.contains("calibrate_mc3416") {
            if let Err(e) = self.mc3416.calibrate() {
                log::warn!("handle_command: could not calibrate MC3416: {e}");
            }
        } else if line.contains("zero_mc3416") {
            if let Err(e) = self.mc3416.zero_offsets() {
                log::warn!("handle_command: could not zero MC3416: {e}");
            }
        } else if line.contains("read_power_bits") {
            let bits = [
                ("+3V3VA_EN", WcmRail::Analog3v3),
                ("GPS_PWR_EN", WcmRail::GpsPower),
                ("COM_SW_A", WcmRail::ComSwitchA),
                ("SAT_PWR_EN", WcmRail::SatPower),
                ("CELL PWR_EN", WcmRail::CellPower),
                ("WF_PWR_EN", WcmRail::WifiPower),
                ("LGT_ON", WcmRail::Light),
            ];
            for (name, rail) in bits {
                response
                    .data
                    .push(format!("{name} {}", self.rails.get(rail) as i32));
            }
        } else if line.contains("reinitialize") {
            self.init_internal_hw();
        } else if line.contains("+3V3VA_EN") {
            self.set_rail(&mut response, "+3V3VA_EN", WcmRail::Analog3v3, line);
        } else if line.contains("GPS_PWR_EN") {
            self.set_rail(&mut response, "GPS_PWR_EN", WcmRail::GpsPower, line);
        } else if line.contains("COM_SW_A") {
            self.set_rail(&mut response, "COM_SW_A", WcmRail::ComSwitchA, line);
        } else if line.contains("SAT_PWR_EN") {
            self.set_rail(&mut response, "SAT_PWR_EN", WcmRail::SatPower, line);
        } else if line.contains("CELL_PWR_EN") {
            self.set_rail(&mut response, "CELL_PWR_EN", WcmRail::CellPower, line);
        } else if line.contains("LGT_ON") {
            self.set_rail(&mut response, "LGT_ON", WcmRail::Light, line);
        } else if line.contains("WF_PWR_EN") {
            self.set_rail(&mut response, "WF_PWR_EN", WcmRail::WifiPower, line);
        } else {
            response.valid = false;
        }

        response
    }

    // -----------------------------------------------------------------------
    // SPI commands
    // -----------------------------------------------------------------------
    pub fn handle_frame(&mut self, command: &str, response: &mut SpiFrame) {
        if command.contains("LEAK") {
            self.session.record(command);
            match self.leak_adc.read() {
                Ok(v) => *response = spi::float_field(f64::from(v), 2),
                Err(e) => log::warn!("handle_spi_command: could not read leak detector: {e}"),
            }
        } else if command.contains("read_gps") {
            self.session.begin_fields(command);
            // The master expects a sentence; block until the receiver has one.
            while !self.gps.data_ready() {}
            if let Some(data) = self.gps.read_line(COMMAND_LENGTH) {
                *response = spi::text_field(&data);
            }
        } else if command.contains("wcm_ping") {
            self.session.record(command);
            self.ping();
        } else if command.contains("MS5637") {
            self.session.begin_fields(command);
            match self.ms5637.read() {
                Ok(b) => {
                    self.baro_temperature = b.temperature_c;
                    *response = spi::float_field(b.pressure_mbar, 2);
                }
                Err(e) => log::warn!("handle_spi_command: could not read MS5637: {e}"),
            }
        } else if command.contains("read_mc3416") {
            self.session.begin_fields(command);
            match self.mc3416.read_tilt() {
                Ok(angle) => *response = spi::float_field(angle, 2),
                Err(e) => log::warn!("handle_spi_command: could not read MC3416: {e}"),
            }
        } else if command.contains("calibrate_mc3416") {
            self.session.record(command);
            if let Err(e) = self.mc3416.calibrate() {
                log::warn!("handle_spi_command: could not calibrate MC3416: {e}");
            }
        } else if command.contains("zero_mc3416") {
            self.session.record(command);
            if let Err(e) = self.mc3416.zero_offsets() {
                log::warn!("handle_spi_command: could not zero MC3416: {e}");
            }
        } else if command.contains("POWER") {
            self.session.begin_fields(command);
            self.power = PowerSnapshot {
                gps: self.rails.get(WcmRail::GpsPower),
                cell: self.rails.get(WcmRail::CellPower),
                light: self.rails.get(WcmRail::Light),
                sat: self.rails.get(WcmRail::SatPower),
                wifi: self.rails.get(WcmRail::WifiPower),
                com_sw: self.rails.get(WcmRail::ComSwitchA),
            };
            *response = spi::bit_field(self.rails.get(WcmRail::Analog3v3));
        } else if command.contains("RESP") {
            self.handle_resp(response);
        } else if command.contains("+3V3VA_EN") {
            self.spi_set_rail(command, WcmRail::Analog3v3);
        } else if command.contains("GPS_PWR_EN") {
            self.spi_set_rail(command, WcmRail::GpsPower);
        } else if command.contains("COM_SW_A") {
            self.spi_set_rail(command, WcmRail::ComSwitchA);
        } else if command.contains("SAT_PWR_EN") {
            self.spi_set_rail(command, WcmRail::SatPower);
        } else if command.contains("CELL_PWR_EN") {
            self.spi_set_rail(command, WcmRail::CellPower);
        } else if command.contains("WF_PWR_EN") {
            self.spi_set_rail(command, WcmRail::WifiPower);
        } else if command.contains("LGT_ON") {
            self.spi_set_rail(command, WcmRail::Light);
        } else {
            log::warn!("handle_spi_command: unknown command {command:?}");
        }
    }

    fn spi_set_rail(&mut self, command: &str, rail: WcmRail) {
        self.rails.set(rail, setter_arg(command) != 0);
    }

    /// Continuation poll. Unlike the PM board, a `RESP` with no matching
    /// primary command answers with the dash placeholder.
    fn handle_resp(&mut self, response: &mut SpiFrame) {
        if self.session.matches("LEAK") {
            *response = DASH_FRAME;
        } else if self.session.matches("MS5637") {
            *response = match self.session.num_sent() {
                1 => spi::float_field(self.baro_temperature, 2),
                _ => DASH_FRAME,
            };
            if self.session.num_sent() == 1 {
                self.session.advance();
            }
        } else if self.session.matches("POWER") {
            let p = self.power;
            *response = match self.session.num_sent() {
                1 => spi::bit_field(p.gps),
                2 => spi::bit_field(p.cell),
                3 => spi::bit_field(p.light),
                4 => spi::bit_field(p.sat),
                5 => spi::bit_field(p.wifi),
                6 => spi::bit_field(p.com_sw),
                _ => DASH_FRAME,
            };
            if self.session.num_sent() <= 6 {
                self.session.advance();
            }
        } else {
            *response = DASH_FRAME;
        }
    }
}

impl<B, D, R, A, O, G, C, T> CommandHandler for WcmBoard<B, D, R, A, O, G, C, T>
where
    B: I2cBus,
    D: Delay + Clone,
    R: WcmRails,
    A: Adc,
    O: OffsetStore,
    G: AuxLink,
    C: AuxLink,
    T: WakeTimer,
{
    fn handle_line(&mut self, line: &str) -> LineResponse {
        WcmBoard::handle_line(self, line)
    }

    fn handle_frame(&mut self, command: &str, response: &mut SpiFrame) {
        WcmBoard::handle_frame(self, command, response)
    }
}
