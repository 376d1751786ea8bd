// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::sync::Arc;

use bit_field::BitField;
use log::{info, log_enabled, trace, Level};

use crate::factory::{Chip, SidModel, SoundOutput, Tickable};
use crate::util::Clock;

use super::envelope::Envelope;
use super::filter::Filter;
use super::oscillator::Oscillator;
use super::{DT, SAMPLES};

// SPEC: http://www.oxyron.de/html/registers_sid.html
// Design:
//   One sample is accumulated per tick and the chip asks the clock to come
//   back after the number of system cycles one output sample spans. Every
//   SAMPLES ticks the block is filtered, mixed and dispatched to the sound
//   output; when no free buffer is available the block is dropped.
//
//   Voice chaining for sync/ring: voice 1 <- voice 3, voice 2 <- voice 1,
//   voice 3 <- voice 2.

pub mod reg {
    pub const FREQLO1: u8 = 0x00;
    pub const FREQHI1: u8 = 0x01;
    pub const PWLO1: u8 = 0x02;
    pub const PWHI1: u8 = 0x03;
    pub const CR1: u8 = 0x04;
    pub const AD1: u8 = 0x05;
    pub const SR1: u8 = 0x06;
    pub const FREQLO2: u8 = 0x07;
    pub const FREQHI2: u8 = 0x08;
    pub const PWLO2: u8 = 0x09;
    pub const PWHI2: u8 = 0x0a;
    pub const CR2: u8 = 0x0b;
    pub const AD2: u8 = 0x0c;
    pub const SR2: u8 = 0x0d;
    pub const FREQLO3: u8 = 0x0e;
    pub const FREQHI3: u8 = 0x0f;
    pub const PWLO3: u8 = 0x10;
    pub const PWHI3: u8 = 0x11;
    pub const CR3: u8 = 0x12;
    pub const AD3: u8 = 0x13;
    pub const SR3: u8 = 0x14;
    pub const FCLO: u8 = 0x15;
    pub const FCHI: u8 = 0x16;
    pub const RESFILT: u8 = 0x17;
    pub const MODVOL: u8 = 0x18;
    pub const POTX: u8 = 0x19;
    pub const POTY: u8 = 0x1a;
    pub const OSC3: u8 = 0x1b;
    pub const ENV3: u8 = 0x1c;
}

struct Voice {
    osc: Oscillator,
    env: Envelope,
}

impl Voice {
    fn new(clock_freq: u32) -> Self {
        Self {
            osc: Oscillator::new(clock_freq),
            env: Envelope::new(clock_freq),
        }
    }

    fn set_control(&mut self, value: u8) {
        self.osc.set_control(value);
        self.env.set_gate(value.get_bit(0));
    }

    fn reset(&mut self) {
        self.osc.reset();
        self.env.reset();
    }

    fn tick(&mut self, sync_wrapped: bool, sync_amplitude: f64) -> f64 {
        self.osc.tick(sync_wrapped, sync_amplitude) * self.env.tick()
    }
}

pub struct Sid {
    // Dependencies
    sound_output: Arc<dyn SoundOutput>,
    // Functional Units
    voices: [Voice; 3],
    filter: Filter,
    // Register state
    voice_filt: [bool; 3],
    voice_3_off: bool,
    volume: f64,
    prev_volume: f64,
    last_value: u8,
    // Sample pipeline
    samples: [Vec<f64>; 3],
    click: Vec<f64>,
    sample_index: usize,
    click_index: usize,
    samples_cycles: u64,
}

impl Sid {
    pub fn new(chip_model: SidModel, clock_freq: u32, sound_output: Arc<dyn SoundOutput>) -> Self {
        info!(target: "sound", "Initializing SID");
        let model = match chip_model {
            SidModel::Mos6581 => "6581",
            SidModel::Mos8580 => "8580",
        };
        trace!(target: "sound", "Chip model {}", model);
        Self {
            sound_output,
            voices: [
                Voice::new(clock_freq),
                Voice::new(clock_freq),
                Voice::new(clock_freq),
            ],
            filter: Filter::new(),
            voice_filt: [false; 3],
            voice_3_off: false,
            volume: 0.0,
            prev_volume: 0.0,
            last_value: 0,
            samples: [
                vec![0.0; SAMPLES],
                vec![0.0; SAMPLES],
                vec![0.0; SAMPLES],
            ],
            click: vec![0.0; SAMPLES],
            sample_index: 0,
            click_index: 0,
            samples_cycles: (f64::from(clock_freq) * DT).round() as u64,
        }
    }

    fn set_mode_vol(&mut self, value: u8) {
        self.volume = 0.5 * f64::from(value & 0x0f) / 15.0;
        self.filter
            .set_mode(value.get_bit(4), value.get_bit(5), value.get_bit(6));
        self.voice_3_off = value.get_bit(7);
        /*
        Volume bug or "fourth voice": a change of the master volume nibble
        leaves a dc step in the output, which is how samples were played
        before the dac was discovered.
        */
        if (self.prev_volume - self.volume).abs() > 1e-9 {
            self.prev_volume = self.volume;
            let offset = self.volume * 4.0 - 1.0;
            if self.click_index <= self.sample_index {
                for value in &mut self.click[self.click_index..self.sample_index] {
                    *value = offset;
                }
            } else {
                for value in &mut self.click[self.click_index..] {
                    *value = offset;
                }
                for value in &mut self.click[..self.sample_index] {
                    *value = offset;
                }
            }
        }
        self.click_index = self.sample_index;
    }

    fn play(&mut self) {
        let buffer = self.sound_output.buffer();
        if let Some(mut out) = buffer {
            if self.filter.is_enabled() {
                for (voice, filtered) in self.voice_filt.iter().enumerate() {
                    if *filtered {
                        self.filter.apply(&mut self.samples[voice]);
                    }
                }
            }
            out.clear();
            for i in 0..SAMPLES {
                let voice_3 = if self.voice_3_off && !self.voice_filt[2] {
                    0.0
                } else {
                    self.samples[2][i]
                };
                let mut value = self.samples[0][i] + self.samples[1][i] + voice_3 + self.click[i];
                if value > 1.0 {
                    value = 1.0;
                } else if value < -1.0 {
                    value = -1.0;
                }
                out.push((value * self.volume * f64::from(i16::max_value())) as i16);
            }
            self.sound_output.dispatch(out);
        }
        for value in self.click.iter_mut() {
            *value = 0.0;
        }
    }
}

impl Tickable for Sid {
    fn tick(&mut self, _clock: &Clock) -> u64 {
        let states = [
            (
                self.voices[0].osc.has_wrapped(),
                self.voices[0].osc.get_amplitude(),
            ),
            (
                self.voices[1].osc.has_wrapped(),
                self.voices[1].osc.get_amplitude(),
            ),
            (
                self.voices[2].osc.has_wrapped(),
                self.voices[2].osc.get_amplitude(),
            ),
        ];
        let index = self.sample_index;
        self.samples[0][index] = self.voices[0].tick(states[2].0, states[2].1);
        self.samples[1][index] = self.voices[1].tick(states[0].0, states[0].1);
        self.samples[2][index] = self.voices[2].tick(states[1].0, states[1].1);
        /*
        When a voice is routed into a disabled filter its sample is dropped,
        which allows pwm playback through filter on/off switching.
        */
        if !self.filter.is_enabled() {
            for (voice, filtered) in self.voice_filt.iter().enumerate() {
                if *filtered {
                    self.samples[voice][index] = 0.0;
                }
            }
        }
        self.sample_index += 1;
        if self.sample_index == SAMPLES {
            self.sample_index = 0;
            self.click_index = 0;
            self.play();
        }
        self.samples_cycles
    }
}

impl Chip for Sid {
    fn reset(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.reset();
        }
        self.filter.reset();
        self.voice_filt = [false; 3];
        self.voice_3_off = false;
        self.volume = 0.0;
        self.prev_volume = 0.0;
        self.last_value = 0;
        for buffer in self.samples.iter_mut() {
            for value in buffer.iter_mut() {
                *value = 0.0;
            }
        }
        for value in self.click.iter_mut() {
            *value = 0.0;
        }
        self.sample_index = 0;
        self.click_index = 0;
    }

    // I/O

    fn read(&mut self, reg: u8) -> u8 {
        match reg {
            reg::POTX | reg::POTY => 0,
            reg::OSC3 => {
                let amplitude = self.voices[2].osc.get_amplitude();
                ((amplitude * f64::from(i16::max_value())) as i16 >> 8) as u8
            }
            reg::ENV3 => {
                let amplitude = self.voices[2].env.get_amplitude();
                ((amplitude * f64::from(i16::max_value())) as i16 >> 8) as u8
            }
            _ => self.last_value,
        }
    }

    fn write(&mut self, reg: u8, value: u8) {
        if log_enabled!(Level::Trace) {
            trace!(target: "sid::reg", "Write 0x{:02x} = 0x{:02x}", reg, value);
        }
        match reg {
            reg::FREQLO1 => self.voices[0].osc.set_frequency_lo(value),
            reg::FREQHI1 => self.voices[0].osc.set_frequency_hi(value),
            reg::PWLO1 => self.voices[0].osc.set_pulse_width_lo(value),
            reg::PWHI1 => self.voices[0].osc.set_pulse_width_hi(value),
            reg::CR1 => self.voices[0].set_control(value),
            reg::AD1 => self.voices[0].env.set_attack_decay(value),
            reg::SR1 => self.voices[0].env.set_sustain_release(value),
            reg::FREQLO2 => self.voices[1].osc.set_frequency_lo(value),
            reg::FREQHI2 => self.voices[1].osc.set_frequency_hi(value),
            reg::PWLO2 => self.voices[1].osc.set_pulse_width_lo(value),
            reg::PWHI2 => self.voices[1].osc.set_pulse_width_hi(value),
            reg::CR2 => self.voices[1].set_control(value),
            reg::AD2 => self.voices[1].env.set_attack_decay(value),
            reg::SR2 => self.voices[1].env.set_sustain_release(value),
            reg::FREQLO3 => self.voices[2].osc.set_frequency_lo(value),
            reg::FREQHI3 => self.voices[2].osc.set_frequency_hi(value),
            reg::PWLO3 => self.voices[2].osc.set_pulse_width_lo(value),
            reg::PWHI3 => self.voices[2].osc.set_pulse_width_hi(value),
            reg::CR3 => self.voices[2].set_control(value),
            reg::AD3 => self.voices[2].env.set_attack_decay(value),
            reg::SR3 => self.voices[2].env.set_sustain_release(value),
            reg::FCLO => self.filter.set_cutoff_lo(value),
            reg::FCHI => self.filter.set_cutoff_hi(value),
            reg::RESFILT => {
                self.filter.set_resonance(value >> 4);
                self.voice_filt[0] = value.get_bit(0);
                self.voice_filt[1] = value.get_bit(1);
                self.voice_filt[2] = value.get_bit(2);
            }
            reg::MODVOL => self.set_mode_vol(value),
            _ => {}
        }
        self.last_value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CapturedOutput {
        free: Mutex<Vec<Vec<i16>>>,
        played: Mutex<Vec<Vec<i16>>>,
    }

    impl CapturedOutput {
        fn new(buffers: usize) -> Self {
            let mut free = Vec::new();
            for _ in 0..buffers {
                free.push(Vec::with_capacity(SAMPLES));
            }
            Self {
                free: Mutex::new(free),
                played: Mutex::new(Vec::new()),
            }
        }
    }

    impl SoundOutput for CapturedOutput {
        fn buffer(&self) -> Option<Vec<i16>> {
            self.free.lock().unwrap().pop()
        }

        fn dispatch(&self, samples: Vec<i16>) {
            self.played.lock().unwrap().push(samples);
        }

        fn reset(&self) {}
    }

    fn setup_sid(output: Arc<CapturedOutput>) -> Sid {
        let mut sid = Sid::new(SidModel::Mos6581, 985_248, output);
        Chip::reset(&mut sid);
        sid
    }

    fn run_block(sid: &mut Sid) {
        let clock = Clock::new(985_248, 0.0);
        for _ in 0..SAMPLES {
            sid.tick(&clock);
        }
    }

    fn peak(samples: &[i16]) -> i32 {
        samples.iter().fold(0i32, |acc, s| acc.max(i32::from(*s).abs()))
    }

    #[test]
    fn tick_reports_sample_cadence() {
        let output = Arc::new(CapturedOutput::new(1));
        let mut sid = setup_sid(output);
        let clock = Clock::new(985_248, 0.0);
        assert_eq!(22, sid.tick(&clock));
    }

    #[test]
    fn gated_voice_produces_sound() {
        let output = Arc::new(CapturedOutput::new(1));
        let mut sid = setup_sid(output.clone());
        sid.write(reg::MODVOL, 0x0f);
        sid.write(reg::AD1, 0x09);
        sid.write(reg::SR1, 0xf0);
        sid.write(reg::FREQHI1, 0x1c);
        sid.write(reg::FREQLO1, 0xd6);
        sid.write(reg::CR1, 0x21); // sawtooth + gate
        run_block(&mut sid);
        let played = output.played.lock().unwrap();
        assert_eq!(1, played.len());
        assert!(peak(&played[0]) > 1000);
    }

    #[test]
    fn voice_3_off_silences_output() {
        let output = Arc::new(CapturedOutput::new(1));
        let mut sid = setup_sid(output.clone());
        sid.write(reg::MODVOL, 0x8f); // voice 3 off, max volume
        sid.write(reg::AD3, 0x00);
        sid.write(reg::SR3, 0xf0);
        sid.write(reg::FREQHI3, 0x1c);
        sid.write(reg::FREQLO3, 0xd6);
        sid.write(reg::CR3, 0x21);
        run_block(&mut sid);
        let played = output.played.lock().unwrap();
        assert_eq!(1, played.len());
        assert_eq!(0, peak(&played[0]));
    }

    #[test]
    fn missing_buffer_discards_block() {
        let output = Arc::new(CapturedOutput::new(0));
        let mut sid = setup_sid(output.clone());
        sid.write(reg::MODVOL, 0x0f);
        run_block(&mut sid);
        assert!(output.played.lock().unwrap().is_empty());
    }

    #[test]
    fn volume_change_writes_click_offset() {
        let output = Arc::new(CapturedOutput::new(1));
        let mut sid = setup_sid(output.clone());
        let clock = Clock::new(985_248, 0.0);
        sid.write(reg::MODVOL, 0x00);
        for _ in 0..SAMPLES / 2 {
            sid.tick(&clock);
        }
        sid.write(reg::MODVOL, 0x0f);
        for _ in 0..SAMPLES / 2 {
            sid.tick(&clock);
        }
        let played = output.played.lock().unwrap();
        assert_eq!(1, played.len());
        // the first half of the block carries the old-volume offset
        assert!(played[0][SAMPLES / 4] != 0);
    }
}
