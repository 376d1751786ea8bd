// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

mod autostart;
mod c64;
mod c64_factory;
mod config;
mod frame_buffer;
mod palette;
mod sound_buffer;

pub use self::autostart::{Autostart, AutostartMethod, Image, Mode};
pub use self::c64::C64;
pub use self::c64_factory::C64Factory;
pub use self::config::{Config, JoystickConfig, RomData, SoundConfig};
pub use self::frame_buffer::FrameBuffer;
pub use self::palette::Palette;
pub use self::sound_buffer::SoundBufferPool;
