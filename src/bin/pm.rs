// MMD Buoy Firmware — PM Board Entry Point
//
// Boot sequence:
//   1. Bring up logging and take the peripherals.
//   2. Build the shared I2C bus, serial link, SPI slave, rails and stores.
//   3. Apply the power-on rail defaults and init the sensors.
//   4. Enter the cooperative run loop (never returns).

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use esp_idf_hal::gpio::{InputPin, OutputPin, PinDriver};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::prelude::*;
use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};
use esp_idf_svc::timer::EspTaskTimerService;

use mmdbuoy::boards::pm::PmBoard;
use mmdbuoy::config::UART_BAUD;
use mmdbuoy::hw::esp::{
    EspAdc, EspI2cBus, EspSerial, EspSpiSlave, EspWakeTimer, GpioBank, LightSleep, NvsOffsetStore,
    StatusBank,
};
use mmdbuoy::hw::{PmRail, PmStatusBit, StdDelay};
use mmdbuoy::i2c::SharedBus;
use mmdbuoy::runloop::RunLoop;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("PM board firmware starting…");

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

    // ---- Power rails and status inputs ------------------------------------
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
        rail!(PmRail::Analog3v3, peripherals.pins.gpio2),
        rail!(PmRail::BattSelect, peripherals.pins.gpio3),
        rail!(PmRail::BattSerial, peripherals.pins.gpio4),
        rail!(PmRail::Ctd, peripherals.pins.gpio5),
        rail!(PmRail::Driver, peripherals.pins.gpio6),
        rail!(PmRail::MainPower, peripherals.pins.gpio7),
        rail!(PmRail::VbsPower, peripherals.pins.gpio14),
        rail!(PmRail::VbsSerial, peripherals.pins.gpio15),
        rail!(PmRail::WcmDiag, peripherals.pins.gpio16),
        rail!(PmRail::WcmPower, peripherals.pins.gpio21),
        rail!(PmRail::WcmRelay, peripherals.pins.gpio33),
        rail!(PmRail::Ltc2944I2c, peripherals.pins.gpio46),
    ]);

    macro_rules! status {
        ($bit:expr, $pin:expr) => {
            (
                $bit,
                unsafe {
                    core::mem::transmute(PinDriver::input($pin.downgrade_input())?)
                },
            )
        };
    }
    let status = StatusBank::new(vec![
        status!(PmStatusBit::AccelInt, peripherals.pins.gpio38),
        status!(PmStatusBit::ExtGpio1, peripherals.pins.gpio39),
        status!(PmStatusBit::ExtGpio2, peripherals.pins.gpio40),
        status!(PmStatusBit::Lt8618Pg, peripherals.pins.gpio41),
        status!(PmStatusBit::Ltc2944Alcc, peripherals.pins.gpio42),
        status!(PmStatusBit::WcmFault, peripherals.pins.gpio45),
    ]);

    // ---- Leak detector ADC -------------------------------------------------
    let adc_unit = EspAdc::new_unit()?;
    let leak_adc = EspAdc::new(adc_unit, esp_idf_sys::adc_channel_t_ADC_CHANNEL_0)?;

    // ---- Accelerometer offset store ----------------------------------------
    let nvs = EspNvs::new(EspDefaultNvsPartition::take()?, "buoy", true)?;
    let store = NvsOffsetStore::new(nvs, "mc3416_offsets");

    // ---- Wake timer and shared flags ---------------------------------------
    let timer_elapsed = Arc::new(AtomicBool::new(false));
    let spi_armed = Arc::new(AtomicBool::new(false));
    let timer_service = EspTaskTimerService::new()?;
    let _wake_timer = EspWakeTimer::new(&timer_service, Arc::clone(&timer_elapsed))?;

    // ---- Board and run loop -------------------------------------------------
    let mut board = PmBoard::new(
        bus,
        StdDelay,
        rails,
        status,
        leak_adc,
        store,
        Arc::clone(&timer_elapsed),
        Arc::clone(&spi_armed),
    );
    board.init();

    let power = LightSleep {
        wakeup_after: Duration::from_secs(60),
    };
    let mut run_loop = RunLoop::new(
        board,
        serial,
        spi,
        power,
        StdDelay,
        timer_elapsed,
        spi_armed,
    );
    run_loop.run()
}
