// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

mod bin;
mod crt;
mod loaders;
mod prg;

use std::io;
use std::path::Path;

use oxide64_system::{AutostartMethod, Image};

pub use self::bin::BinLoader;
pub use self::crt::CrtLoader;
pub use self::loaders::Loaders;
pub use self::prg::PrgLoader;

pub trait Loader {
    fn autostart(&self, path: &Path) -> Result<AutostartMethod, io::Error>;
    fn load(&self, path: &Path) -> Result<Box<dyn Image>, io::Error>;
}
