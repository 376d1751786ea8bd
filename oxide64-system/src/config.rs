// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use oxide64_core::device::joystick;
use oxide64_core::SystemModel;

pub struct Config {
    pub model: SystemModel,
    pub joystick: JoystickConfig,
    pub sound: SoundConfig,
    pub roms: RomData,
    /// Wall-clock pacing factor; 1.0 is real speed, 0.0 free-runs the clock.
    pub pace_factor: f64,
}

impl Config {
    pub fn new(model: SystemModel) -> Config {
        Config {
            model,
            joystick: JoystickConfig::default(),
            sound: SoundConfig::default(),
            roms: RomData::default(),
            pace_factor: 1.0,
        }
    }

    pub fn new_with_roms(
        model: SystemModel,
        basic: &[u8],
        charset: &[u8],
        kernal: &[u8],
    ) -> Config {
        Config {
            model,
            joystick: JoystickConfig::default(),
            sound: SoundConfig::default(),
            roms: RomData::new(basic, charset, kernal),
            pace_factor: 1.0,
        }
    }
}

pub struct JoystickConfig {
    pub axis_motion_threshold: i16,
    pub joystick_1: joystick::Mode,
    pub joystick_2: joystick::Mode,
}

impl Default for JoystickConfig {
    fn default() -> JoystickConfig {
        JoystickConfig {
            axis_motion_threshold: 3200,
            joystick_1: joystick::Mode::Numpad,
            joystick_2: joystick::Mode::None,
        }
    }
}

pub struct RomData {
    pub basic: Vec<u8>,
    pub charset: Vec<u8>,
    pub kernal: Vec<u8>,
}

impl Default for RomData {
    fn default() -> Self {
        RomData {
            basic: vec![0x00; 0x2000],
            charset: vec![0x00; 0x1000],
            kernal: vec![0x00; 0x2000],
        }
    }
}

impl RomData {
    pub fn new(basic: &[u8], charset: &[u8], kernal: &[u8]) -> Self {
        RomData {
            basic: basic.to_vec(),
            charset: charset.to_vec(),
            kernal: kernal.to_vec(),
        }
    }
}

pub struct SoundConfig {
    pub enable: bool,
    pub buffer_count: usize,
    pub sample_rate: u32,
    pub sid_filters: bool,
}

impl Default for SoundConfig {
    fn default() -> SoundConfig {
        SoundConfig {
            enable: true,
            buffer_count: 8,
            sample_rate: 44_100,
            sid_filters: true,
        }
    }
}
