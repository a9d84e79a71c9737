use chrono::{DateTime, Utc};
use moteconn::printf::PrintfMsg;
use std::io::Write;

/// Wall-clock format stamped at the start of every output line.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";

/// Streams printf buffers to `out`, prefixing each line of mote output with
/// the arrival time of the message that started it.
#[derive(Debug)]
pub struct Printer<W> {
    out: W,
    awaiting_timestamp: bool,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            awaiting_timestamp: true,
        }
    }

    /// Print one message. `received` is captured once per message, so every
    /// line a buffer starts carries the same stamp.
    pub fn print(&mut self, received: DateTime<Utc>, msg: &PrintfMsg) -> std::io::Result<()> {
        for &byte in msg.buffer() {
            // NUL padding and carriage returns disappear without touching
            // the line state.
            if byte == 0 || byte == b'\r' {
                continue;
            }
            if self.awaiting_timestamp {
                write!(self.out, "{}:", received.format(TIMESTAMP_FORMAT))?;
                self.awaiting_timestamp = false;
            }
            write!(self.out, "{}", char::from(byte))?;
            if byte == b'\n' {
                self.awaiting_timestamp = true;
            }
        }
        self.out.flush()
    }
}
