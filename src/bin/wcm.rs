// MMD Buoy Firmware — WCM Board Entry Point
//
// Same shape as the PM entry point, with the WCM rail set, the battery
// detector channel, and the GPS / SAT-CELL auxiliary serial links. The WCM
// has no low-power window; an elapsed wake timer just restarts the cycle.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use esp_idf_hal::gpio::{InputPin, OutputPin, PinDriver};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::prelude::*;
use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};
use esp_idf_svc::timer::EspTaskTimerService;

use mmdbuoy::boards::wcm::WcmBoard;
use mmdbuoy::config::UART_BAUD;
use mmdbuoy::hw::esp::{
    EspAdc, EspAuxLink, EspI2cBus, EspSerial, EspSpiSlave, EspWakeTimer, GpioBank, NvsOffsetStore,
};
use mmdbuoy::hw::{NoLowPower, StdDelay, WcmRail};
use mmdbuoy::i2c::SharedBus;
use mmdbuoy::runloop::RunLoop;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("WCM board firmware starting…");

    let peripherals = Peripherals::take()?;

    // ---- Sensor I2C bus ---------------------------------------------------
    let i2c_config = I2cConfig::new().baudrate(400u32.kHz().into());
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio8, // SDA
        peripherals.pins.gpio9, // SCL
        &i2c_config,
    )?;
    // SAFETY: the I2C peripheral is a singleton and the firmware never exits.
    let i2c: I2cDriver<'static> = unsafe { core::mem::transmute(i2c) };
    let bus = SharedBus::new(EspI2cBus::new(i2c));

    // ---- PC serial link ---------------------------------------------------
    let uart_config = UartConfig::new().baudrate(Hertz(UART_BAUD));
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17, // TX
        peripherals.pins.gpio18, // RX
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        &uart_config,
    )?;
    let uart: UartDriver<'static> = unsafe { core::mem::transmute(uart) };
    let serial = EspSerial::new(uart);

    // ---- GPS and SAT/CELL modem links --------------------------------------
    let gps_uart = UartDriver::new(
        peripherals.uart0,
        peripherals.pins.gpio43, // TX
        peripherals.pins.gpio44, // RX
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        &uart_config,
    )?;
    let gps_uart: UartDriver<'static> = unsafe { core::mem::transmute(gps_uart) };
    let gps = EspAuxLink::new(gps_uart);

    let com_uart = UartDriver::new(
        peripherals.uart2,
        peripherals.pins.gpio33, // TX
        peripherals.pins.gpio34, // RX
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        &uart_config,
    )?;
    let com_uart: UartDriver<'static> = unsafe { core::mem::transmute(com_uart) };
    let com = EspAuxLink::new(com_uart);

    // ---- SPI slave to the master controller --------------------------------
    let host = esp_idf_sys::spi_host_device_t_SPI2_HOST;
    unsafe {
        let bus_cfg = esp_idf_sys::spi_bus_config_t {
            __bindgen_anon_1: esp_idf_sys::spi_bus_config_t__bindgen_ty_1 { mosi_io_num: 11 },
            __bindgen_anon_2: esp_idf_sys::spi_bus_config_t__bindgen_ty_2 { miso_io_num: 13 },
            sclk_io_num: 12,
            ..core::mem::zeroed()
        };
        let slave_cfg = esp_idf_sys::spi_slave_interface_config_t {
            spics_io_num: 10,
            queue_size: 1,
            mode: 0,
            ..core::mem::zeroed()
        };
        let ret = esp_idf_sys::spi_slave_initialize(
            host,
            &bus_cfg,
            &slave_cfg,
            esp_idf_sys::spi_common_dma_t_SPI_DMA_CH_AUTO,
        );
        if ret != esp_idf_sys::ESP_OK {
            anyhow::bail!("SPI slave init failed ({ret})");
        }
    }
    let select = PinDriver::input(peripherals.pins.gpio10.downgrade_input())?;
    let select: PinDriver<'static, _, _> = unsafe { core::mem::transmute(select) };
    let spi = EspSpiSlave::new(host, select);

    // ---- Power rails --------------------------------------------------------
    macro_rules! rail {
        ($rail:expr, $pin:expr) => {
            (
                $rail,
                unsafe {
                    core::mem::transmute(PinDriver::output($pin.downgrade_output())?)
                },
            )
        };
    }
    let rails = GpioBank::new(vec![
        rail!(WcmRail::Analog3v3, peripherals.pins.gpio3),
        rail!(WcmRail::GpsPower, peripherals.pins.gpio4),
        rail!(WcmRail::CellPower, peripherals.pins.gpio5),
        rail!(WcmRail::Light, peripherals.pins.gpio6),
        rail!(WcmRail::SatPower, peripherals.pins.gpio7),
        rail!(WcmRail::WifiPower, peripherals.pins.gpio14),
        rail!(WcmRail::ComSwitchA, peripherals.pins.gpio15),
    ]);

    // ---- Leak and battery detector ADCs ------------------------------------
    let adc_unit = EspAdc::new_unit()?;
    let leak_adc = EspAdc::new(adc_unit, esp_idf_sys::adc_channel_t_ADC_CHANNEL_0)?;
    let batt_adc = EspAdc::new(adc_unit, esp_idf_sys::adc_channel_t_ADC_CHANNEL_1)?;

    // ---- Accelerometer offset store ----------------------------------------
    let nvs = EspNvs::new(EspDefaultNvsPartition::take()?, "buoy", true)?;
    let store = NvsOffsetStore::new(nvs, "mc3416_offsets");

    // ---- Wake timer and shared flags ---------------------------------------
    let timer_elapsed = Arc::new(AtomicBool::new(false));
    let spi_armed = Arc::new(AtomicBool::new(false));
    let timer_service = EspTaskTimerService::new()?;
    let wake_timer = EspWakeTimer::new(&timer_service, Arc::clone(&timer_elapsed))?;

    // ---- Board and run loop -------------------------------------------------
    let mut board = WcmBoard::new(
        bus,
        StdDelay,
        rails,
        leak_adc,
        batt_adc,
        store,
        gps,
        com,
        wake_timer,
        Arc::clone(&timer_elapsed),
    );
    board.init();

    let mut run_loop = RunLoop::new(
        board,
        serial,
        spi,
        NoLowPower,
        StdDelay,
        timer_elapsed,
        spi_armed,
    );
    run_loop.run()
}
