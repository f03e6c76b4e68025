//! Diagnostic line sink
//!
//! Human-facing status output (frame hex dumps, calibration progress,
//! status pages). Fire-and-forget, one line at a time. This is separate
//! from the `log` facade, which carries developer logging.

use core::fmt::{self, Write};

use heapless::String;

/// Longest line the core emits
pub const LINE_CAPACITY: usize = 64;

pub trait Diagnostics {
    fn line(&mut self, line: &str);
}

/// Format `args` into a fixed buffer and emit it. Overlong lines are cut.
pub fn emit<D: Diagnostics + ?Sized>(sink: &mut D, args: fmt::Arguments<'_>) {
    let mut line: String<LINE_CAPACITY> = String::new();
    let _ = line.write_fmt(args);
    sink.line(&line);
}
