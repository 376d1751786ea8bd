// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::io::{Error, ErrorKind};
use std::path::Path;

use crate::bin::BinLoader;
use crate::crt::CrtLoader;
use crate::prg::PrgLoader;
use crate::Loader;

pub struct Loaders;

impl Loaders {
    pub fn from_ext(ext: Option<&str>) -> Result<Box<dyn Loader>, Error> {
        match ext.map(str::to_lowercase).as_deref() {
            Some("bin") => Ok(Box::new(BinLoader::new(0x1000))),
            Some("crt") => Ok(Box::new(CrtLoader::new())),
            Some("prg") => Ok(Box::new(PrgLoader::new())),
            _ => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("unknown image type {}", ext.unwrap_or("")),
            )),
        }
    }

    pub fn from_path(path: &Path) -> Result<Box<dyn Loader>, Error> {
        let ext = path.extension().and_then(|s| s.to_str());
        Loaders::from_ext(ext)
    }
}
