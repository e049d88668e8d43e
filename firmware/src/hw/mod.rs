//! Board power controls for the telemetry node.
//!
//! The Wi-Fi coprocessor hangs off a single enable line. Deep sleep parks the
//! core in WFI until the wake deadline and then resets, so every wake cycle
//! starts from a clean boot.

use core::time::Duration;

use embassy_stm32::gpio::Output;
use embassy_time::Instant;
use node_core::power::PowerControl;

use crate::clock::to_embassy;

pub struct BoardPower<'d> {
    radio_enable: Output<'d>,
}

impl<'d> BoardPower<'d> {
    pub fn new(radio_enable: Output<'d>) -> Self {
        Self { radio_enable }
    }
}

impl PowerControl for BoardPower<'_> {
    fn radio_off(&mut self) {
        self.radio_enable.set_low();
    }

    fn radio_on(&mut self) {
        self.radio_enable.set_high();
    }

    fn deep_sleep(&mut self, wake_after: Duration) {
        defmt::info!("power: sleeping for {}s", wake_after.as_secs());
        let wake_at = Instant::now()
            .checked_add(to_embassy(wake_after))
            .unwrap_or(Instant::MAX);
        while Instant::now() < wake_at {
            cortex_m::asm::wfi();
        }
        cortex_m::peripheral::SCB::sys_reset();
    }
}
