//! Cycle logging and the lazily started diagnostic console.
//!
//! Milestones go to defmt on target and stdout on the host. Diagnostic lines
//! additionally go to a UART console that is only powered up the first time
//! the cycle has something to report.

use embedded_io::Write;
use node_core::diagnostics::DiagnosticSink;

/// Diagnostic sink that builds its console on first activation.
///
/// `F` produces the console; `None` means the console could not be brought up
/// and lines only reach the log.
pub struct LazyConsole<F, W> {
    factory: Option<F>,
    console: Option<W>,
}

impl<F, W> LazyConsole<F, W>
where
    F: FnOnce() -> Option<W>,
    W: Write,
{
    pub const fn new(factory: F) -> Self {
        Self {
            factory: Some(factory),
            console: None,
        }
    }

    pub fn console(&self) -> Option<&W> {
        self.console.as_ref()
    }
}

impl<F, W> DiagnosticSink for LazyConsole<F, W>
where
    F: FnOnce() -> Option<W>,
    W: Write,
{
    fn activate(&mut self) {
        if let Some(factory) = self.factory.take() {
            self.console = factory();
            if self.console.is_none() {
                log_console_unavailable();
            }
        }
    }

    fn emit(&mut self, line: &str) {
        log_diagnostic(line);

        if let Some(console) = self.console.as_mut() {
            let written = console
                .write_all(line.as_bytes())
                .and_then(|()| console.write_all(b"\r\n"))
                .and_then(|()| console.flush());
            if written.is_err() {
                // Stop using a console that fails; the log still has the line.
                self.console = None;
                log_console_unavailable();
            }
        }
    }
}

#[cfg(target_os = "none")]
pub fn log_wake() {
    defmt::info!("node: wake");
}

#[cfg(not(target_os = "none"))]
pub fn log_wake() {
    println!("node: wake");
}

#[cfg(target_os = "none")]
pub fn log_sensor_fault() {
    defmt::warn!("sensor: measurement failed, reporting non-finite sample");
}

#[cfg(not(target_os = "none"))]
pub fn log_sensor_fault() {
    println!("sensor: measurement failed, reporting non-finite sample");
}

#[cfg(target_os = "none")]
fn log_diagnostic(line: &str) {
    defmt::warn!("diag: {}", line);
}

#[cfg(not(target_os = "none"))]
fn log_diagnostic(line: &str) {
    println!("diag: {line}");
}

#[cfg(target_os = "none")]
fn log_console_unavailable() {
    defmt::warn!("diag: console unavailable");
}

#[cfg(not(target_os = "none"))]
fn log_console_unavailable() {
    println!("diag: console unavailable");
}

#[cfg(target_os = "none")]
pub fn log_published(topic: &str, bytes: usize) {
    defmt::info!("modem: published {} bytes to {}", bytes, topic);
}

#[cfg(not(target_os = "none"))]
pub fn log_published(topic: &str, bytes: usize) {
    println!("modem: published {bytes} bytes to {topic}");
}
