// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use log::info;

use super::c64::C64;

// Design:
//   Autostart waits for the basic interpreter to reach its ready prompt
//   (a breakpoint on the idle loop), mounts the image and types RUN through
//   the keyboard buffer.

pub trait Image {
    fn mount(&mut self, c64: &mut C64);
    fn unmount(&mut self, c64: &mut C64);
}

#[derive(Copy, Clone, PartialEq)]
pub enum Mode {
    Load,
    Run,
}

pub enum AutostartMethod {
    WithImage(Box<dyn Image>),
    WithAutostart(Autostart),
}

pub struct Autostart {
    mode: Mode,
    image: Box<dyn Image>,
}

impl Autostart {
    pub fn new(mode: Mode, image: Box<dyn Image>) -> Self {
        Self { mode, image }
    }

    pub fn execute(&mut self, c64: &mut C64) {
        info!(target: "autostart", "Starting program");
        self.image.mount(c64);
        if self.mode == Mode::Run {
            c64.type_run();
        }
    }
}
