//! Best-effort diagnostic output surfaced only when something goes wrong.

use core::fmt::{self, Write};

use heapless::String;

/// Maximum length of a single diagnostic line.
pub const MAX_DIAGNOSTIC_LEN: usize = 96;

/// Fixed-capacity diagnostic line.
pub type DiagnosticLine = String<MAX_DIAGNOSTIC_LEN>;

/// Text channel the cycle reports failures through.
///
/// Implementations swallow their own errors: a broken diagnostic channel must
/// never change the outcome of the cycle.
pub trait DiagnosticSink {
    /// Brings the channel up. Called at most once per wake cycle, right before
    /// the first line is emitted.
    fn activate(&mut self);

    /// Writes one human-readable line.
    fn emit(&mut self, line: &str);
}

/// Sink that discards everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopDiagnosticSink;

impl NoopDiagnosticSink {
    pub const fn new() -> Self {
        Self
    }
}

impl DiagnosticSink for NoopDiagnosticSink {
    fn activate(&mut self) {}

    fn emit(&mut self, _: &str) {}
}

impl<T> DiagnosticSink for &mut T
where
    T: DiagnosticSink + ?Sized,
{
    fn activate(&mut self) {
        (**self).activate();
    }

    fn emit(&mut self, line: &str) {
        (**self).emit(line);
    }
}

/// Renders `"<source>: <detail>"`, cutting the text at [`MAX_DIAGNOSTIC_LEN`].
pub fn compose(source: impl fmt::Display, detail: fmt::Arguments<'_>) -> DiagnosticLine {
    let mut line = DiagnosticLine::new();
    let mut writer = Truncating { line: &mut line };
    // Truncating never reports an error, only stops accepting characters.
    let _ = write!(writer, "{source}: {detail}");
    line
}

struct Truncating<'a> {
    line: &'a mut DiagnosticLine,
}

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            let ch = if ch == '\n' || ch == '\r' { ' ' } else { ch };
            if self.line.push(ch).is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_source_and_detail() {
        let line = compose("network-join", format_args!("timed out after {} ms", 20_000));
        assert_eq!(line.as_str(), "network-join: timed out after 20000 ms");
    }

    #[test]
    fn long_details_are_truncated() {
        let long = "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx";
        let line = compose("publish", format_args!("{long}{long}{long}"));

        assert_eq!(line.len(), MAX_DIAGNOSTIC_LEN);
        assert!(line.starts_with("publish: xxx"));
    }

    #[test]
    fn line_breaks_are_flattened() {
        let line = compose("sensor-init", format_args!("bus\r\nerror"));
        assert_eq!(line.as_str(), "sensor-init: bus  error");
    }
}
