// WCM board dispatcher tests: the WCM rail table, auxiliary links, and the
// board's RESP behavior (dashes when no primary command is in flight).

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::*;
use mmdbuoy::boards::wcm::WcmBoard;
use mmdbuoy::command::spi::DASH_FRAME;
use mmdbuoy::hw::{WcmRail, WcmRails};
use mmdbuoy::i2c::SharedBus;

type TestBoard = WcmBoard<
    MockBus,
    NoDelay,
    MockWcmRails,
    MockAdc,
    MockStore,
    MockAux,
    MockAux,
    MockWakeTimer,
>;

struct Fixture {
    board: TestBoard,
    rails: MockWcmRails,
    timer: MockWakeTimer,
    stager: MockBusStager,
    timer_elapsed: Arc<AtomicBool>,
}

fn fixture_with(bus: MockBus, gps: MockAux, com: MockAux) -> Fixture {
    let rails = MockWcmRails::default();
    let timer = MockWakeTimer::default();
    let stager = bus.stager();
    let timer_elapsed = Arc::new(AtomicBool::new(false));
    let board = WcmBoard::new(
        SharedBus::new(bus),
        NoDelay,
        rails.clone(),
        MockAdc::reading(0.42),
        MockAdc::reading(3.10),
        MockStore::default(),
        gps,
        com,
        timer.clone(),
        Arc::clone(&timer_elapsed),
    );
    Fixture {
        board,
        rails,
        timer,
        stager,
        timer_elapsed,
    }
}

fn fixture() -> Fixture {
    fixture_with(MockBus::new(), MockAux::default(), MockAux::default())
}

// ---------------------------------------------------------------------------
// Line protocol
// ---------------------------------------------------------------------------

#[test]
fn read_batt_reports_the_battery_detector() {
    let mut f = fixture();
    let response = f.board.handle_line("read_batt");
    assert_eq!(response.data, vec!["BATTERY DETECT 3.10"]);
    assert!(response.valid);
}

#[test]
fn wcm_ping_restarts_the_timer_and_raises_the_flag() {
    let mut f = fixture();
    f.board.handle_line("wcm_ping");
    assert_eq!(*f.timer.restarts.borrow(), 1);
    assert!(f.timer_elapsed.load(Ordering::SeqCst));
}

#[test]
fn read_coms_powers_the_sat_rail_around_the_exchange() {
    let com = MockAux::with_line("+CSQ: 18,0");
    let mut f = fixture_with(MockBus::new(), MockAux::default(), com);
    let response = f.board.handle_line("read_coms");
    assert_eq!(response.data, vec!["+CSQ: 18,0 VALID"]);

    let history = f.rails.history.borrow();
    let sat_events: Vec<bool> = history
        .iter()
        .filter(|(rail, _)| *rail == WcmRail::SatPower)
        .map(|(_, level)| *level)
        .collect();
    assert_eq!(sat_events, vec![true, false]);
}

#[test]
fn read_gps_requires_the_gps_rail() {
    let gps = MockAux::with_line("$GPGGA,0,0,0");
    let mut f = fixture_with(MockBus::new(), gps, MockAux::default());

    // Rail off: the sentence stays queued and the echo is untouched.
    let response = f.board.handle_line("read_gps");
    assert_eq!(response.echo, "read_gps");

    f.rails.clone().set(WcmRail::GpsPower, true);
    let response = f.board.handle_line("read_gps");
    assert_eq!(response.echo, "$GPGGA,0,0,0");
}

#[test]
fn wcm_power_bits_report_in_fixed_order() {
    let mut f = fixture();
    f.rails.clone().set(WcmRail::Light, true);
    let response = f.board.handle_line("read_power_bits");
    let names: Vec<&str> = response
        .data
        .iter()
        .map(|line| line.rsplit_once(' ').unwrap().0)
        .collect();
    assert_eq!(
        names,
        vec![
            "+3V3VA_EN",
            "GPS_PWR_EN",
            "COM_SW_A",
            "SAT_PWR_EN",
            "CELL PWR_EN",
            "WF_PWR_EN",
            "LGT_ON"
        ]
    );
    assert_eq!(response.data[6], "LGT_ON 1");
}

#[test]
fn cell_power_setter_is_active_high() {
    let mut f = fixture();
    let response = f.board.handle_line("CELL_PWR_EN 1");
    assert_eq!(response.echo, "CELL_PWR_EN 1");
    assert!(f.rails.get(WcmRail::CellPower));
    f.board.handle_line("CELL_PWR_EN 0");
    assert!(!f.rails.get(WcmRail::CellPower));
}

// ---------------------------------------------------------------------------
// SPI protocol
// ---------------------------------------------------------------------------

#[test]
fn power_then_six_resps_yields_seven_fields_then_dashes() {
    let mut f = fixture();
    f.rails.clone().set(WcmRail::Analog3v3, true);
    f.rails.clone().set(WcmRail::SatPower, true);

    let mut frame = DASH_FRAME;
    f.board.handle_frame("POWER", &mut frame);
    let mut fields = vec![frame];
    for _ in 0..7 {
        f.board.handle_frame("RESP", &mut frame);
        fields.push(frame);
    }

    // Order: 3v3, gps, cell, lgt, sat, wifi, com_sw.
    let expected_bits = [true, false, false, false, true, false, false];
    for (i, expect) in expected_bits.iter().enumerate() {
        let want: &[u8; 8] = if *expect { b"       1" } else { b"       0" };
        assert_eq!(&fields[i], want, "field {i}");
    }
    assert_eq!(fields[7], DASH_FRAME, "eighth poll is the placeholder");
}

#[test]
fn resp_with_no_prior_primary_answers_dashes() {
    let mut f = fixture();
    let mut frame = *b"PREVIOUS";
    f.board.handle_frame("RESP", &mut frame);
    assert_eq!(frame, DASH_FRAME);
}

#[test]
fn spi_read_gps_returns_the_head_of_the_sentence() {
    let gps = MockAux::with_line("$GPGGA,123456");
    let mut f = fixture_with(MockBus::new(), gps, MockAux::default());
    let mut frame = [0u8; 8];
    f.board.handle_frame("read_gps", &mut frame);
    assert_eq!(&frame, b"$GPGGA,1");
}

#[test]
fn spi_leak_then_resp_returns_the_placeholder() {
    let mut f = fixture();
    let mut frame = [0u8; 8];
    f.board.handle_frame("LEAK", &mut frame);
    assert_eq!(&frame, b"    0.42");
    f.board.handle_frame("RESP", &mut frame);
    assert_eq!(frame, DASH_FRAME);
}

#[test]
fn spi_ms5637_sequence_with_staged_sensor() {
    let mut bus = MockBus::new();
    let c = [0u16, 46372, 43981, 29059, 27842, 31553, 28165];
    stage_ms5637_prom(&mut bus, &c);
    let mut f = fixture_with(bus, MockAux::default(), MockAux::default());
    f.board.handle_line("reinitialize");

    stage_ms5637_sample(&f.stager, 6_465_444, 8_077_636);
    let mut frame = [0u8; 8];
    f.board.handle_frame("MS5637", &mut frame);
    let pressure: f64 = String::from_utf8_lossy(&frame).trim().parse().unwrap();
    assert!((pressure - 1100.0).abs() < 1.0);

    f.board.handle_frame("RESP", &mut frame);
    let temperature: f64 = String::from_utf8_lossy(&frame).trim().parse().unwrap();
    assert!((temperature - 20.0).abs() < 0.01);

    f.board.handle_frame("RESP", &mut frame);
    assert_eq!(frame, DASH_FRAME);
}

#[test]
fn spi_setters_drive_the_wcm_rails() {
    let mut f = fixture();
    let mut frame = [0u8; 8];
    f.board.handle_frame("LGT_ON 1", &mut frame);
    assert!(f.rails.get(WcmRail::Light));
    f.board.handle_frame("WF_PWR_EN 1", &mut frame);
    assert!(f.rails.get(WcmRail::WifiPower));
    f.board.handle_frame("GPS_PWR_EN 0", &mut frame);
    assert!(!f.rails.get(WcmRail::GpsPower));
}
