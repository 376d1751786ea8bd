// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::sync::{Arc, Mutex};

use bit_field::BitField;
use log::{log_enabled, trace, warn, Level};

use crate::factory::{Chip, Tickable};
use crate::util::{Clock, IoPort, IrqControl, IrqLine, Pin, Shared, SharedCell};

use super::cycle_counter::CycleCounter;
use super::timer;
use super::timer::Timer;
use super::tod::Tod;

// Spec: 6526 COMPLEX INTERFACE ADAPTER (CIA) Datasheet
// Spec: https://www.c64-wiki.com/index.php/CIA
// http://www.unusedino.de/ec64/technical/project64/mapping_c64.html

enum IntDelay {
    Interrupt0 = 1,
    Interrupt1 = 1 << 1,
}

enum IntSource {
    TimerA = 0,
    TimerB = 1,
    Alarm = 2,
    Flag = 4,
}

#[derive(Copy, Clone, PartialEq)]
pub enum Mode {
    Cia1,
    Cia2,
}

impl Mode {
    /// Source slot on the wired-OR interrupt line; slot 0 belongs to the vic.
    pub fn irq_source(self) -> usize {
        1
    }
}

pub mod reg {
    pub const PRA: u8 = 0x00;
    pub const PRB: u8 = 0x01;
    pub const DDRA: u8 = 0x02;
    pub const DDRB: u8 = 0x03;
    pub const TALO: u8 = 0x04;
    pub const TAHI: u8 = 0x05;
    pub const TBLO: u8 = 0x06;
    pub const TBHI: u8 = 0x07;
    pub const TODTS: u8 = 0x08;
    pub const TODSEC: u8 = 0x09;
    pub const TODMIN: u8 = 0x0a;
    pub const TODHR: u8 = 0x0b;
    pub const SDR: u8 = 0x0c;
    pub const ICR: u8 = 0x0d;
    pub const CRA: u8 = 0x0e;
    pub const CRB: u8 = 0x0f;
}

pub struct Cia {
    // Dependencies
    mode: Mode,
    joystick_1: Option<SharedCell<u8>>,
    joystick_2: Option<SharedCell<u8>>,
    keyboard_matrix: Option<Arc<Mutex<[u8; 16]>>>,
    // Functional Units
    irq_control: IrqControl,
    irq_delay: CycleCounter,
    timer_a: Timer,
    timer_b: Timer,
    tod_clock: Tod,
    tod_alarm: Tod,
    tod_latch: Option<Tod>,
    tod_set_alarm: bool,
    tod_period: u64,
    tod_counter: u64,
    // I/O
    flag_pin: Shared<Pin>,
    irq_line: Shared<IrqLine>,
    port_a: Shared<IoPort>,
    port_b: Shared<IoPort>,
}

impl Cia {
    #![cfg_attr(feature = "cargo-clippy", allow(clippy::too_many_arguments))]
    pub fn new(
        mode: Mode,
        joystick_1: Option<SharedCell<u8>>,
        joystick_2: Option<SharedCell<u8>>,
        keyboard_matrix: Option<Arc<Mutex<[u8; 16]>>>,
        port_a: Shared<IoPort>,
        port_b: Shared<IoPort>,
        flag_pin: Shared<Pin>,
        irq_line: Shared<IrqLine>,
        clock_freq: u32,
    ) -> Self {
        Self {
            mode,
            joystick_1,
            joystick_2,
            keyboard_matrix,
            irq_control: IrqControl::default(),
            irq_delay: CycleCounter::new(0xffff),
            timer_a: Timer::new(timer::Mode::TimerA),
            timer_b: Timer::new(timer::Mode::TimerB),
            tod_clock: Tod::new(),
            tod_alarm: Tod::new(),
            tod_latch: None,
            tod_set_alarm: false,
            tod_period: u64::from(clock_freq) / 10,
            tod_counter: u64::from(clock_freq) / 10,
            flag_pin,
            irq_line,
            port_a,
            port_b,
        }
    }

    fn clock_cycle(&mut self) {
        // Process timers
        let timer_a_output = self.timer_a.clock(self.timer_a.get_input() == timer::Input::SystemClock);
        let timer_b_pulse = match self.timer_b.get_input() {
            timer::Input::SystemClock => true,
            // CNT is tied high so it never produces count edges of its own;
            // in the cascaded modes timer B counts timer A underflows.
            timer::Input::External => false,
            timer::Input::TimerA | timer::Input::TimerAWithCnt => timer_a_output,
        };
        let timer_b_output = self.timer_b.clock(timer_b_pulse);

        // Process time of day
        self.tod_counter -= 1;
        if self.tod_counter == 0 {
            self.tod_counter = self.tod_period;
            self.tod_clock.tick();
        }

        // Process interrupts
        /*
        Any interrupt will set the corresponding bit in the DATA register.
        Any interrupt which is enabled by the MASK register will set the IR
        bit (MSB) of the DATA register and bring the IRQ pin low.
        */
        let mut irq_event = false;
        if timer_a_output {
            self.irq_control.set_event(IntSource::TimerA as usize);
            irq_event = true;
        }
        if timer_b_output {
            self.irq_control.set_event(IntSource::TimerB as usize);
            irq_event = true;
        }
        if self.tod_counter == self.tod_period && self.tod_clock.matches(&self.tod_alarm) {
            self.irq_control.set_event(IntSource::Alarm as usize);
            irq_event = true;
        }
        if self.flag_pin.borrow().is_falling() {
            self.irq_control.set_event(IntSource::Flag as usize);
            irq_event = true;
        }
        if irq_event && self.irq_control.is_triggered() {
            self.irq_delay.feed(IntDelay::Interrupt0 as u16);
        }
        if self.irq_delay.has_cycle(IntDelay::Interrupt1 as u16) {
            self.irq_line
                .borrow_mut()
                .set_low(self.mode.irq_source(), true);
        }
        self.irq_delay.clock();
    }

    fn read_cia1_port_a(&self) -> u8 {
        let active_columns = self.port_b.borrow().get_value();
        let keyboard_state = self.scan_keyboard_active_cols(active_columns);
        let joystick_state = self.scan_joystick(&self.joystick_2);
        let result = self.port_a.borrow().get_value_2(keyboard_state);
        result & joystick_state
    }

    fn read_cia1_port_b(&self) -> u8 {
        let active_rows = self.port_a.borrow().get_value();
        let keyboard_state = self.scan_keyboard_active_rows(active_rows);
        let joystick_state = self.scan_joystick(&self.joystick_1);
        let mut result = self.port_b.borrow().get_value_2(keyboard_state);
        /*
        A control bit allows the timer output to appear on a PORT B output
        line (PB6 for TIMER A and PB7 for TIMER B). This function overrides
        the DDRB control bit and forces the appropriate PB line to an output.
        */
        if self.timer_a.is_pb_on() {
            result.set_bit(6, self.timer_a.get_pb_output());
        }
        if self.timer_b.is_pb_on() {
            result.set_bit(7, self.timer_b.get_pb_output());
        }
        result & joystick_state
    }

    fn read_cia2_port_a(&self) -> u8 {
        // vic bank select and serial bus lines
        self.port_a.borrow().get_value()
    }

    fn read_cia2_port_b(&self) -> u8 {
        let mut result = self.port_b.borrow().get_value();
        if self.timer_a.is_pb_on() {
            result.set_bit(6, self.timer_a.get_pb_output());
        }
        if self.timer_b.is_pb_on() {
            result.set_bit(7, self.timer_b.get_pb_output());
        }
        result
    }

    fn scan_joystick(&self, joystick: &Option<SharedCell<u8>>) -> u8 {
        if let Some(ref state) = *joystick {
            !state.get()
        } else {
            0xff
        }
    }

    fn scan_keyboard_active_cols(&self, active_columns: u8) -> u8 {
        if let Some(matrix) = self.keyboard_matrix.as_ref() {
            match matrix.lock() {
                Ok(matrix) => {
                    let mut result = 0xff;
                    for col in 0..8 {
                        if !active_columns.get_bit(col) {
                            result &= matrix[8 + col];
                        }
                    }
                    result
                }
                Err(_) => {
                    warn!(target: "cia", "Keyboard matrix unavailable");
                    0xff
                }
            }
        } else {
            0xff
        }
    }

    fn scan_keyboard_active_rows(&self, active_rows: u8) -> u8 {
        if let Some(matrix) = self.keyboard_matrix.as_ref() {
            match matrix.lock() {
                Ok(matrix) => {
                    let mut result = 0xff;
                    for row in 0..8 {
                        if !active_rows.get_bit(row) {
                            result &= matrix[row];
                        }
                    }
                    result
                }
                Err(_) => {
                    warn!(target: "cia", "Keyboard matrix unavailable");
                    0xff
                }
            }
        } else {
            0xff
        }
    }

    fn tod_write_target(&mut self) -> &mut Tod {
        if self.tod_set_alarm {
            &mut self.tod_alarm
        } else {
            &mut self.tod_clock
        }
    }
}

impl Tickable for Cia {
    fn tick(&mut self, _clock: &Clock) -> u64 {
        self.clock_cycle();
        1
    }
}

impl Chip for Cia {
    fn reset(&mut self) {
        /*
        A low on the RES pin resets all internal registers. The port pins are
        set as inputs and port registers to zero (although a read of the
        ports will return all highs because of passive pullups). The timer
        control registers are set to zero and the timer latches to all ones.
        All other registers are reset to zero.
        */
        self.irq_control.reset();
        self.irq_delay.reset();
        self.timer_a.reset();
        self.timer_b.reset();
        self.tod_clock.reset();
        self.tod_alarm.reset();
        self.tod_latch = None;
        self.tod_set_alarm = false;
        self.tod_counter = self.tod_period;
        self.flag_pin.borrow_mut().set_active(false);
        self.port_a.borrow_mut().reset();
        self.port_b.borrow_mut().reset();
        self.irq_line
            .borrow_mut()
            .set_low(self.mode.irq_source(), false);
    }

    // I/O

    fn read(&mut self, reg: u8) -> u8 {
        let value = match reg {
            reg::PRA => match self.mode {
                Mode::Cia1 => self.read_cia1_port_a(),
                Mode::Cia2 => self.read_cia2_port_a(),
            },
            reg::PRB => match self.mode {
                Mode::Cia1 => self.read_cia1_port_b(),
                Mode::Cia2 => self.read_cia2_port_b(),
            },
            reg::DDRA => self.port_a.borrow().get_direction(),
            reg::DDRB => self.port_b.borrow().get_direction(),
            reg::TALO => self.timer_a.get_counter_lo(),
            reg::TAHI => self.timer_a.get_counter_hi(),
            reg::TBLO => self.timer_b.get_counter_lo(),
            reg::TBHI => self.timer_b.get_counter_hi(),
            reg::TODTS => {
                // Reading tenths releases the read latch.
                let tod = self.tod_latch.take().unwrap_or(self.tod_clock);
                to_bcd(tod.get_tenth())
            }
            reg::TODSEC => {
                let tod = self.tod_latch.unwrap_or(self.tod_clock);
                to_bcd(tod.get_seconds())
            }
            reg::TODMIN => {
                let tod = self.tod_latch.unwrap_or(self.tod_clock);
                to_bcd(tod.get_minutes())
            }
            reg::TODHR => {
                // Reading hours freezes the visible time until tenths are
                // read, so a multi-register read cannot tear.
                let tod = *self.tod_latch.get_or_insert(self.tod_clock);
                let mut result = to_bcd(tod.get_hours());
                result.set_bit(7, tod.get_pm());
                result
            }
            reg::SDR => 0,
            reg::ICR => {
                /*
                The interrupt DATA register is cleared and the IRQ line
                returns high following a read of the DATA register.
                */
                let data = self.irq_control.get_data();
                self.irq_control.clear();
                self.irq_delay.remove(IntDelay::Interrupt0 as u16 | IntDelay::Interrupt1 as u16);
                self.irq_line
                    .borrow_mut()
                    .set_low(self.mode.irq_source(), false);
                data
            }
            reg::CRA => self.timer_a.get_config(),
            reg::CRB => {
                let mut config = self.timer_b.get_config();
                config.set_bit(7, self.tod_set_alarm);
                config
            }
            _ => panic!("invalid reg {}", reg),
        };
        if log_enabled!(Level::Trace) {
            trace!(target: "cia::reg", "Read 0x{:02x} = 0x{:02x}", reg, value);
        }
        value
    }

    fn write(&mut self, reg: u8, value: u8) {
        if log_enabled!(Level::Trace) {
            trace!(target: "cia::reg", "Write 0x{:02x} = 0x{:02x}", reg, value);
        }
        match reg {
            reg::PRA => {
                self.port_a.borrow_mut().set_value(value);
            }
            reg::PRB => {
                self.port_b.borrow_mut().set_value(value);
            }
            reg::DDRA => {
                self.port_a.borrow_mut().set_direction(value);
            }
            reg::DDRB => {
                self.port_b.borrow_mut().set_direction(value);
            }
            reg::TALO => {
                self.timer_a.set_latch_lo(value);
            }
            reg::TAHI => {
                self.timer_a.set_latch_hi(value);
            }
            reg::TBLO => {
                self.timer_b.set_latch_lo(value);
            }
            reg::TBHI => {
                self.timer_b.set_latch_hi(value);
            }
            reg::TODTS => {
                let set_alarm = self.tod_set_alarm;
                let tod = self.tod_write_target();
                tod.set_tenth(from_bcd(value & 0x0f));
                if !set_alarm {
                    // Writing tenths restarts a halted clock.
                    tod.set_halted(false);
                }
            }
            reg::TODSEC => {
                self.tod_write_target().set_seconds(from_bcd(value & 0x7f));
            }
            reg::TODMIN => {
                self.tod_write_target().set_minutes(from_bcd(value & 0x7f));
            }
            reg::TODHR => {
                let set_alarm = self.tod_set_alarm;
                let tod = self.tod_write_target();
                tod.set_hours(from_bcd(value & 0x1f));
                tod.set_pm(value.get_bit(7));
                if !set_alarm {
                    // Writing hours halts the clock until tenths are written.
                    tod.set_halted(true);
                }
            }
            reg::SDR => {}
            reg::ICR => {
                self.irq_control.update_mask(value);
                if self.irq_control.is_triggered() {
                    self.irq_delay.feed(IntDelay::Interrupt0 as u16);
                }
            }
            reg::CRA => {
                self.timer_a.set_config(value);
            }
            reg::CRB => {
                self.timer_b.set_config(value & 0x7f);
                self.tod_set_alarm = value.get_bit(7);
            }
            _ => panic!("invalid reg {}", reg),
        }
    }
}

fn from_bcd(decimal: u8) -> u8 {
    (decimal >> 4) * 10 + (decimal & 0x0f)
}

fn to_bcd(num: u8) -> u8 {
    ((num / 10) << 4) | (num % 10)
}
