// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use bit_field::BitField;
use log::{log_enabled, trace, Level};

// Open-drain wired-OR line: each source owns one bit, the line is low while
// any source drives it.

pub struct IrqLine {
    kind: &'static str,
    signal: u8,
}

impl IrqLine {
    pub fn new(kind: &'static str) -> Self {
        Self { kind, signal: 0 }
    }

    pub fn is_low(&self) -> bool {
        self.signal != 0
    }

    pub fn reset(&mut self) {
        self.signal = 0;
    }

    pub fn set_low(&mut self, source: usize, value: bool) {
        if log_enabled!(Level::Trace) {
            trace!(
                target: "cpu::int",
                "{}.{} {}",
                self.kind,
                source,
                if value { "set" } else { "cleared" }
            );
        }
        self.signal.set_bit(source, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_is_low_while_any_source_drives() {
        let mut line = IrqLine::new("irq");
        line.set_low(0, true);
        line.set_low(1, true);
        line.set_low(0, false);
        assert!(line.is_low());
        line.set_low(1, false);
        assert!(!line.is_low());
    }
}
