use core::cell::RefCell;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::i2c::{Config as I2cConfig, I2c};
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{
    BufferedInterruptHandler, BufferedUart, Config as UartConfig, DataBits, Parity, StopBits,
    UartTx,
};
use embassy_time::Delay;
use node_core::cycle::{CycleController, NodeServices};
use node_core::modem::EspAt;
use node_core::power::PowerControl;

use crate::clock::EmbassyClock;
use crate::config::NODE_CONFIG;
use crate::diagnostics::{self, LazyConsole};
use crate::hw::BoardPower;
use crate::modem::{ModemCell, SharedModem};
use crate::sensor::Bme280Sensor;

const MODEM_UART_BAUD: u32 = 115_200;
const CONSOLE_UART_BAUD: u32 = 115_200;
const SENSOR_I2C_FREQUENCY: Hertz = Hertz(100_000);
const MODEM_UART_BUFFER_SIZE: usize = 512;

static mut MODEM_TX_BUFFER: [u8; MODEM_UART_BUFFER_SIZE] = [0; MODEM_UART_BUFFER_SIZE];
static mut MODEM_RX_BUFFER: [u8; MODEM_UART_BUFFER_SIZE] = [0; MODEM_UART_BUFFER_SIZE];

embassy_stm32::bind_interrupts!(struct ModemIrqs {
    USART2_LPUART2 => BufferedInterruptHandler<hal::peripherals::USART2>;
});

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

fn uart_config(baudrate: u32) -> UartConfig {
    let mut config = UartConfig::default();
    config.baudrate = baudrate;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;
    config
}

#[cortex_m_rt::entry]
fn main() -> ! {
    let hal::Peripherals {
        I2C1,
        PB8,
        PB9,
        USART2,
        PA2,
        PA3,
        USART1,
        PA9,
        PB5,
        ..
    } = hal::init(hal::Config::default());
    diagnostics::log_wake();

    let mut power = BoardPower::new(Output::new(PB5, Level::Low, Speed::Low));

    let mut i2c_config = I2cConfig::default();
    i2c_config.frequency = SENSOR_I2C_FREQUENCY;
    let sensor = Bme280Sensor::new(I2c::new_blocking(I2C1, PB8, PB9, i2c_config), Delay);

    let uart = unsafe {
        BufferedUart::new(
            USART2,
            PA3,
            PA2,
            &mut MODEM_TX_BUFFER,
            &mut MODEM_RX_BUFFER,
            ModemIrqs,
            uart_config(MODEM_UART_BAUD),
        )
    };
    let Ok(uart) = uart else {
        defmt::error!("modem: UART configuration rejected");
        power.radio_off();
        power.deep_sleep(NODE_CONFIG.timing.sleep_duration);
        park();
    };

    let modem_cell = ModemCell::new(RefCell::new(EspAt::new(uart, EmbassyClock::new())));
    let modem = SharedModem::new(&modem_cell);

    let console = LazyConsole::new(move || {
        UartTx::new_blocking(USART1, PA9, uart_config(CONSOLE_UART_BAUD)).ok()
    });

    let services = NodeServices {
        sensor,
        network: modem,
        transport: modem,
        power,
        diagnostics: console,
        clock: EmbassyClock::new(),
    };

    let report = CycleController::new(&NODE_CONFIG, services).run();
    defmt::error!(
        "power: deep sleep returned (published={})",
        report.published()
    );
    park();
}

fn park() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}
