// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use bit_field::BitField;

// Spec: 6526 COMPLEX INTERFACE ADAPTER (CIA) Datasheet
// http://unusedino.de/ec64/technical/misc/cia6526/timers.html

#[derive(Copy, Clone, PartialEq)]
pub enum Mode {
    TimerA,
    TimerB,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Input {
    SystemClock,
    External,
    TimerA,
    TimerAWithCnt,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Output {
    Pulse,
    Toggle,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RunMode {
    OneShot,
    Continuous,
}

pub struct Timer {
    // Configuration
    mode: Mode,
    enabled: bool,
    input: Input,
    output: Output,
    run_mode: RunMode,
    pb_on: bool,
    latch: u16,
    // Runtime State
    counter: u16,
    pb_output: bool,
    pb_pulse: bool,
}

impl Timer {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            enabled: false,
            input: Input::SystemClock,
            output: Output::Pulse,
            run_mode: RunMode::Continuous,
            pb_on: false,
            latch: 0xffff,
            counter: 0,
            pb_output: false,
            pb_pulse: false,
        }
    }

    pub fn get_counter(&self) -> u16 {
        self.counter
    }

    pub fn get_counter_lo(&self) -> u8 {
        (self.counter & 0x00ff) as u8
    }

    pub fn get_counter_hi(&self) -> u8 {
        (self.counter >> 8) as u8
    }

    pub fn get_input(&self) -> Input {
        self.input
    }

    pub fn get_latch(&self) -> u16 {
        self.latch
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_pb_on(&self) -> bool {
        self.pb_on
    }

    /// Timer output as seen on the port B overlay bit.
    pub fn get_pb_output(&self) -> bool {
        match self.output {
            Output::Toggle => self.pb_output,
            Output::Pulse => self.pb_pulse,
        }
    }

    pub fn set_latch_lo(&mut self, value: u8) {
        self.latch = (self.latch & 0xff00) | value as u16;
    }

    pub fn set_latch_hi(&mut self, value: u8) {
        self.latch = ((value as u16) << 8) | (self.latch & 0x00ff);
        // Writing the high byte while the timer is stopped loads the counter.
        if !self.enabled {
            self.counter = self.latch;
        }
    }

    pub fn get_config(&self) -> u8 {
        let mut config = 0u8;
        config.set_bit(0, self.enabled);
        config.set_bit(1, self.pb_on);
        config.set_bit(2, self.output == Output::Toggle);
        config.set_bit(3, self.run_mode == RunMode::OneShot);
        match self.mode {
            Mode::TimerA => {
                config.set_bit(5, self.input == Input::External);
            }
            Mode::TimerB => {
                let input: u8 = match self.input {
                    Input::SystemClock => 0,
                    Input::External => 1,
                    Input::TimerA => 2,
                    Input::TimerAWithCnt => 3,
                };
                config |= input << 5;
            }
        }
        config
    }

    pub fn set_config(&mut self, value: u8) {
        let was_enabled = self.enabled;
        self.enabled = value.get_bit(0);
        self.pb_on = value.get_bit(1);
        self.output = if value.get_bit(2) {
            Output::Toggle
        } else {
            Output::Pulse
        };
        self.run_mode = if value.get_bit(3) {
            RunMode::OneShot
        } else {
            RunMode::Continuous
        };
        if value.get_bit(4) {
            // Force load strobe.
            self.counter = self.latch;
        }
        self.input = match self.mode {
            Mode::TimerA => {
                if value.get_bit(5) {
                    Input::External
                } else {
                    Input::SystemClock
                }
            }
            Mode::TimerB => match (value >> 5) & 0x03 {
                0 => Input::SystemClock,
                1 => Input::External,
                2 => Input::TimerA,
                3 => Input::TimerAWithCnt,
                _ => unreachable!(),
            },
        };
        // Starting a stopped timer sets the toggle output high.
        if self.enabled && !was_enabled {
            self.pb_output = true;
        }
    }

    pub fn reset(&mut self) {
        self.enabled = false;
        self.input = Input::SystemClock;
        self.output = Output::Pulse;
        self.run_mode = RunMode::Continuous;
        self.pb_on = false;
        self.latch = 0xffff;
        self.counter = 0;
        self.pb_output = false;
        self.pb_pulse = false;
    }

    /// Advance the timer by one cycle; `pulse` is the count source for this
    /// cycle. Returns true on underflow.
    pub fn clock(&mut self, pulse: bool) -> bool {
        self.pb_pulse = false;
        if !self.enabled || !pulse {
            return false;
        }
        if self.counter == 0 {
            self.counter = self.latch;
        } else {
            self.counter -= 1;
        }
        if self.counter == 0 {
            self.underflow();
            true
        } else {
            false
        }
    }

    fn underflow(&mut self) {
        self.counter = self.latch;
        if self.run_mode == RunMode::OneShot {
            self.enabled = false;
        }
        self.pb_output = !self.pb_output;
        self.pb_pulse = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_timer(latch: u16) -> Timer {
        let mut timer = Timer::new(Mode::TimerA);
        timer.set_latch_lo((latch & 0xff) as u8);
        timer.set_latch_hi((latch >> 8) as u8);
        timer
    }

    #[test]
    fn latch_hi_write_loads_stopped_counter() {
        let timer = setup_timer(0x1000);
        assert_eq!(0x1000, timer.get_counter());
    }

    #[test]
    fn one_shot_fires_after_latch_cycles() {
        let mut timer = setup_timer(0x1000);
        timer.set_config(0b_0000_1001);
        let mut underflow_at = None;
        for i in 1..=0x1001u32 {
            if timer.clock(true) {
                underflow_at = Some(i);
                break;
            }
        }
        assert_eq!(Some(0x1000), underflow_at);
        assert!(!timer.is_enabled());
    }

    #[test]
    fn continuous_reloads() {
        let mut timer = setup_timer(2);
        timer.set_config(0b_0000_0001);
        assert!(!timer.clock(true));
        assert!(timer.clock(true));
        assert_eq!(2, timer.get_counter());
        assert!(timer.is_enabled());
    }

    #[test]
    fn config_round_trip() {
        let mut timer = Timer::new(Mode::TimerB);
        timer.set_config(0b_0100_1011);
        assert_eq!(0b_0100_1011 & !0x10, timer.get_config());
        assert_eq!(Input::TimerA, timer.get_input());
    }
}
