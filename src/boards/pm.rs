// MMD Buoy Firmware — Power Module (PM) Board
//
// Sequences the buoy power rails, reads the onboard sensors (leak detector,
// LTC2944 gauge, MS5637 baro, MC3416 tilt) and answers the PC line protocol
// and the polled SPI master.
//
// Command matching is substring containment against an ordered table, first
// match wins. The order is load-bearing: several keywords are substrings of
// others, and the SPI variant uses abbreviated rail names.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::command::line::LineResponse;
use crate::command::setter_arg;
use crate::command::spi::{self, SpiFrame, SpiSession, DASH_FRAME};
use crate::drivers::ltc2944::Ltc2944;
use crate::drivers::mc3416::Mc3416;
use crate::drivers::ms5637::Ms5637;
use crate::hw::{Adc, Delay, I2cBus, OffsetStore, PmRail, PmRails, PmStatusBit, PmStatusBits};
use crate::i2c::SharedBus;
use crate::readings::GaugeReading;
use crate::runloop::CommandHandler;

/// Power bits captured by the SPI `POWER` primary, replayed by `RESP`.
#[derive(Default, Clone, Copy)]
struct PowerSnapshot {
    batt: bool,
    driver: bool,
    vbs: bool,
    vbs_serial: bool,
    wcm_diag: bool,
    wcm_power: bool,
    wcm_relay: bool,
}

/// Status bits captured by the SPI `STATUS` primary.
#[derive(Default, Clone, Copy)]
struct StatusSnapshot {
    gpio1: bool,
    gpio2: bool,
    pg: bool,
    alcc: bool,
    fault: bool,
}

pub struct PmBoard<B, D, R, S, A, O> {
    rails: R,
    status: S,
    leak_adc: A,
    ms5637: Ms5637<B, D>,
    mc3416: Mc3416<B, D, O>,
    ltc2944: Ltc2944<B, D>,

    session: SpiSession,
    gauge: GaugeReading,
    baro_temperature: f64,
    power: PowerSnapshot,
    status_bits: StatusSnapshot,

    /// Set by the periodic wake timer or a ping; the run loop drops to the
    /// sleep path when it observes this.
    timer_elapsed: Arc<AtomicBool>,
    /// Owned by the run loop; `Main_PWR_EN 0` forces an SPI re-arm.
    spi_armed: Arc<AtomicBool>,
}

impl<B, D, R, S, A, O> PmBoard<B, D, R, S, A, O>
where
    B: I2cBus,
    D: Delay + Clone,
    R: PmRails,
    S: PmStatusBits,
    A: Adc,
    O: OffsetStore,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: SharedBus<B>,
        delay: D,
        rails: R,
        status: S,
        leak_adc: A,
        store: O,
        timer_elapsed: Arc<AtomicBool>,
        spi_armed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            rails,
            status,
            leak_adc,
            ms5637: Ms5637::new(bus.clone(), delay.clone()),
            mc3416: Mc3416::new(bus.clone(), delay.clone(), store),
            ltc2944: Ltc2944::new(bus, delay),
            session: SpiSession::new(),
            gauge: GaugeReading::default(),
            baro_temperature: 0.0,
            power: PowerSnapshot::default(),
            status_bits: StatusSnapshot::default(),
            timer_elapsed,
            spi_armed,
        }
    }

    /// Power-on rail defaults, then the internal sensors.
    pub fn init(&mut self) {
        // Turn on the board and the sensor supply.
        self.rails.set(PmRail::Analog3v3, true);
        self.rails.set(PmRail::Driver, false); // active-low: low enables

        // Turn off everything else.
        self.rails.set(PmRail::BattSelect, false);
        self.rails.set(PmRail::BattSerial, false);
        self.rails.set(PmRail::Ltc2944I2c, false);
        self.rails.set(PmRail::Ctd, false);
        self.rails.set(PmRail::VbsPower, false);
        self.rails.set(PmRail::VbsSerial, false);
        self.rails.set(PmRail::WcmDiag, false);
        self.rails.set(PmRail::WcmPower, false);
        self.rails.set(PmRail::WcmRelay, false);

        self.init_internal_hw();
    }

    /// (Re)initialize the I2C sensors. Each failure is logged and leaves the
    /// other sensors untouched.
    pub fn init_internal_hw(&mut self) {
        self.rails.set(PmRail::Ltc2944I2c, true);
        let gauge = self.ltc2944.init();
        self.rails.set(PmRail::Ltc2944I2c, false);
        match gauge {
            Ok(()) => log::info!("pm init: ltc2944 init done"),
            Err(e) => log::error!("pm init: could not initialize LTC2944: {e}"),
        }

        match self.ms5637.init() {
            Ok(()) => log::info!("pm init: ms5637 init done"),
            Err(e) => log::error!("pm init: could not initialize MS5637: {e}"),
        }

        match self.mc3416.init() {
            Ok(()) => log::info!("pm init: mc3416 init done"),
            Err(e) => log::error!("pm init: could not initialize MC3416: {e}"),
        }
    }

    fn read_gauge(&mut self) -> Result<GaugeReading, crate::error::SensorError> {
        self.rails.set(PmRail::Ltc2944I2c, true);
        let result = self.ltc2944.read();
        self.rails.set(PmRail::Ltc2944I2c, false);
        result
    }

    fn set_rail(&mut self, response: &mut LineResponse, name: &str, rail: PmRail, line: &str) {
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
        } else if line.contains("pm_ping") {
            log::info!("handle_command: ping received");
            self.timer_elapsed.store(true, Ordering::SeqCst);
        } else if line.contains("read_ltc2944") {
            match self.read_gauge() {
                Ok(g) => {
                    response.data.push(format!("VOLTAGE {:.3}", g.voltage_v));
                    response.data.push(format!("CURRENT {:.3}", g.current_a));
                    response
                        .data
                        .push(format!("LTC2944 TEMPERATURE {:.2}", g.temperature_c));
                    response.data.push(format!("CHARGE {:.2}", g.charge_mah));
                    response.data.push(format!("STATUS 0x{:02x}", g.status));
                }
                Err(e) => log::warn!("handle_command: could not read LTC2944: {e}"),
            }
        } else if line.contains("read_ms5637") {
            let c = self.ms5637.calibration_coefficients();
            response.data.push(format!("CRC {}", c[0]));
            for (i, value) in c.iter().enumerate().skip(1) {
                response.data.push(format!("C{i} {value}"));
            }
            match self.ms5637.read() {
                Ok(b) => {
                    response.data.push(format!("D1 {}", b.d1));
                    response.data.push(format!("D2 {}", b.d2));
                    response.data.push(format!("PRESSURE {:.2}", b.pressure_mbar));
                    response
                        .data
                        .push(format!("TEMPERATURE {:.2}", b.temperature_c));
                }
                Err(e) => log::warn!("handle_command: could not read MS5637: {e}"),
            }
        } else if line.contains("read_mc3416") {
            match self.mc3416.read_tilt() {
                Ok(angle) => response.data.push(format!("ACCEL TILT ANGLE {angle:.2}")),
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
                ("+3V3VA_EN", PmRail::Analog3v3),
                ("BATT_SEL", PmRail::BattSelect),
                ("DRIVER_EN", PmRail::Driver),
                ("Main_PWR_EN", PmRail::MainPower),
                ("VBS_PWR_EN", PmRail::VbsPower),
                ("VBS_SER_PWR_EN", PmRail::VbsSerial),
                ("WCM_DIAG_EN", PmRail::WcmDiag),
                ("WCM_PWR_EN", PmRail::WcmPower),
                ("WCM_RLY", PmRail::WcmRelay),
            ];
            for (name, rail) in bits {
                response
                    .data
                    .push(format!("{name} {}", self.rails.get(rail) as i32));
            }
        } else if line.contains("read_status_bits") {
            let bits = [
                ("/ACCEL_INT", PmStatusBit::AccelInt),
                ("EXT_GPIO1", PmStatusBit::ExtGpio1),
                ("EXT_GPIO2", PmStatusBit::ExtGpio2),
                ("LT8618_PG", PmStatusBit::Lt8618Pg),
                ("/LTC2944_ALCC", PmStatusBit::Ltc2944Alcc),
                ("/WCM_FAULT", PmStatusBit::WcmFault),
            ];
            for (name, bit) in bits {
                response
                    .data
                    .push(format!("{name} {}", self.status.get(bit) as i32));
            }
        } else if line.contains("reinitialize") {
            self.init_internal_hw();
        } else if line.contains("+3V3VA_EN") {
            self.set_rail(&mut response, "+3V3VA_EN", PmRail::Analog3v3, line);
        } else if line.contains("BATT_SEL") {
            self.set_rail(&mut response, "BATT_SEL", PmRail::BattSelect, line);
        } else if line.contains("BATT_SER_PWR_EN") {
            self.set_rail(&mut response, "BATT_SER_PWR_EN", PmRail::BattSerial, line);
        } else if line.contains("CTD_PWR_EN") {
            self.set_rail(&mut response, "CTD_PWR_EN", PmRail::Ctd, line);
        } else if line.contains("DRIVER_EN") {
            // Active-low driver stage: "DRIVER_EN 1" disables (pin high).
            let value = setter_arg(line);
            response.echo = format!("DRIVER_EN {value}");
            self.rails.set(PmRail::Driver, value == 1);
        } else if line.contains("Main_PWR_EN") {
            if !self.rails.get(PmRail::Driver) {
                let value = setter_arg(line);
                response.echo = format!("Main_PWR_EN {value}");
                if value == 0 {
                    self.rails.set(PmRail::MainPower, false);
                    self.spi_armed.store(false, Ordering::SeqCst);
                    log::info!("handle_command: main power off");
                } else {
                    self.rails.set(PmRail::MainPower, true);
                    log::info!("handle_command: main power on");
                }
            } else {
                // Driver stage is disabled: leave the rail alone and report
                // its current state.
                let level = self.rails.get(PmRail::MainPower);
                response.data.push(format!("Main_PWR_EN {}", level as i32));
                response.echo = "Main_PWR_EN unchanged".to_string();
            }
        } else if line.contains("VBS_PWR_EN") {
            self.set_rail(&mut response, "VBS_PWR_EN", PmRail::VbsPower, line);
        } else if line.contains("VBS_SER_PWR_EN") {
            self.set_rail(&mut response, "VBS_SER_PWR_EN", PmRail::VbsSerial, line);
        } else if line.contains("WCM_DIAG_EN") {
            self.set_rail(&mut response, "WCM_DIAG_EN", PmRail::WcmDiag, line);
        } else if line.contains("WCM_PWR_EN") {
            self.set_rail(&mut response, "WCM_PWR_EN", PmRail::WcmPower, line);
        } else if line.contains("WCM_RLY") {
            if !self.rails.get(PmRail::Driver) {
                let value = setter_arg(line);
                response.echo = format!("WCM_RLY {value}");
                if value == 0 {
                    self.rails.set(PmRail::WcmPower, false);
                    self.rails.set(PmRail::WcmRelay, false);
                } else {
                    self.rails.set(PmRail::WcmRelay, true);
                    self.rails.set(PmRail::WcmPower, true);
                }
                let level = self.rails.get(PmRail::WcmPower);
                response.data.push(format!("WCM_PWR_EN {}", level as i32));
            } else {
                let level = self.rails.get(PmRail::WcmRelay);
                response.data.push(format!("WCM_RLY {}", level as i32));
                response.echo = "WCM_RLY unchanged".to_string();
            }
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
        } else if command.contains("pm_ping") {
            self.session.record(command);
            log::info!("handle_spi_command: ping");
            self.timer_elapsed.store(true, Ordering::SeqCst);
        } else if command.contains("LTC2944") {
            self.session.begin_fields(command);
            match self.read_gauge() {
                Ok(g) => {
                    self.gauge = g;
                    *response = spi::float_field(g.voltage_v, 3);
                }
                Err(e) => log::warn!("handle_spi_command: could not read LTC2944: {e}"),
            }
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
                batt: self.rails.get(PmRail::BattSelect),
                driver: self.rails.get(PmRail::Driver),
                vbs: self.rails.get(PmRail::VbsPower),
                vbs_serial: self.rails.get(PmRail::VbsSerial),
                wcm_diag: self.rails.get(PmRail::WcmDiag),
                wcm_power: self.rails.get(PmRail::WcmPower),
                wcm_relay: self.rails.get(PmRail::WcmRelay),
            };
            *response = spi::bit_field(self.rails.get(PmRail::Analog3v3));
        } else if command.contains("STATUS") {
            self.session.begin_fields(command);
            self.status_bits = StatusSnapshot {
                gpio1: self.status.get(PmStatusBit::ExtGpio1),
                gpio2: self.status.get(PmStatusBit::ExtGpio2),
                pg: self.status.get(PmStatusBit::Lt8618Pg),
                alcc: self.status.get(PmStatusBit::Ltc2944Alcc),
                fault: self.status.get(PmStatusBit::WcmFault),
            };
            *response = spi::bit_field(self.status.get(PmStatusBit::AccelInt));
        } else if command.contains("RESP") {
            self.handle_resp(response);
        } else if command.contains("+3V3VA") {
            self.spi_set_rail(command, PmRail::Analog3v3);
        } else if command.contains("BATT") {
            self.spi_set_rail(command, PmRail::BattSelect);
        } else if command.contains("DRIVER") {
            // SPI polarity per source wiring: arg 0 disables (pin high).
            let value = setter_arg(command);
            self.rails.set(PmRail::Driver, value == 0);
        } else if command.contains("VBS_P") {
            self.spi_set_rail(command, PmRail::VbsPower);
        } else if command.contains("VBS_S") {
            self.spi_set_rail(command, PmRail::VbsSerial);
        } else if command.contains("WCM_D") {
            self.spi_set_rail(command, PmRail::WcmDiag);
        } else if command.contains("WCM_P") {
            self.spi_set_rail(command, PmRail::WcmPower);
        } else if command.contains("WCM_EN") {
            // Relay + power pair, only while the driver stage pin is high.
            if self.rails.get(PmRail::Driver) {
                let value = setter_arg(command);
                if value == 0 {
                    self.rails.set(PmRail::WcmPower, false);
                    self.rails.set(PmRail::WcmRelay, false);
                } else {
                    self.rails.set(PmRail::WcmRelay, true);
                    self.rails.set(PmRail::WcmPower, true);
                }
            }
        } else {
            log::warn!("handle_spi_command: unknown command {command:?}");
        }
    }

    fn spi_set_rail(&mut self, command: &str, rail: PmRail) {
        self.rails.set(rail, setter_arg(command) != 0);
    }

    /// Continuation poll: next field of the captured result, keyed off the
    /// remembered primary command. A session with no matching primary leaves
    /// the frame untouched.
    fn handle_resp(&mut self, response: &mut SpiFrame) {
        if self.session.matches("LEAK") {
            *response = DASH_FRAME;
        } else if self.session.matches("LTC2944") {
            *response = match self.session.num_sent() {
                1 => spi::float_field(self.gauge.current_a, 3),
                2 => spi::float_field(self.gauge.temperature_c, 2),
                3 => spi::float_field(self.gauge.charge_mah, 2),
                4 => spi::int_field(i64::from(self.gauge.status)),
                _ => DASH_FRAME,
            };
            if self.session.num_sent() <= 4 {
                self.session.advance();
            }
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
                1 => spi::bit_field(p.batt),
                2 => spi::bit_field(p.driver),
                3 => spi::bit_field(p.vbs),
                4 => spi::bit_field(p.vbs_serial),
                5 => spi::bit_field(p.wcm_diag),
                6 => spi::bit_field(p.wcm_power),
                7 => spi::bit_field(p.wcm_relay),
                _ => DASH_FRAME,
            };
            if self.session.num_sent() <= 7 {
                self.session.advance();
            }
        } else if self.session.matches("STATUS") {
            let s = self.status_bits;
            *response = match self.session.num_sent() {
                1 => spi::bit_field(s.gpio1),
                2 => spi::bit_field(s.gpio2),
                3 => spi::bit_field(s.pg),
                4 => spi::bit_field(s.alcc),
                5 => spi::bit_field(s.fault),
                _ => DASH_FRAME,
            };
            if self.session.num_sent() <= 5 {
                self.session.advance();
            }
        }
        // No remembered primary: the frame keeps its previous contents.
    }
}

impl<B, D, R, S, A, O> CommandHandler for PmBoard<B, D, R, S, A, O>
where
    B: I2cBus,
    D: Delay + Clone,
    R: PmRails,
    S: PmStatusBits,
    A: Adc,
    O: OffsetStore,
{
    fn handle_line(&mut self, line: &str) -> LineResponse {
        PmBoard::handle_line(self, line)
    }

    fn handle_frame(&mut self, command: &str, response: &mut SpiFrame) {
        PmBoard::handle_frame(self, command, response)
    }
}
