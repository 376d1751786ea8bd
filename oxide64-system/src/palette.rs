// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// Spec: http://unusedino.de/ec64/technical/misc/vic656x/colors/

#![cfg_attr(feature = "cargo-clippy", allow(clippy::unreadable_literal))]

use std::fs::File;
use std::io::{self, BufRead, BufReader, Error, ErrorKind};
use std::path::Path;

pub struct Palette;

impl Palette {
    pub fn default() -> [u32; 16] {
        [
            0x000000ff, // Black
            0xffffffff, // White
            0x68372bff, // Red
            0x70a4b2ff, // Cyan
            0x6f3d86ff, // Purple
            0x588d43ff, // Green
            0x352879ff, // Blue
            0xb8c76fff, // Yellow
            0x6f4f25ff, // Orange
            0x433900ff, // Brown
            0x9a6759ff, // LightRed
            0x444444ff, // DarkGray
            0x6c6c6cff, // MediumGray
            0x9ad284ff, // LightGreen
            0x6c5eb5ff, // LightBlue
            0x959595ff, // LightGray
        ]
    }

    /// Load a palette from a textual table: one RRGGBBAA hex value per line,
    /// '#' starts a comment.
    pub fn load(path: &Path) -> io::Result<[u32; 16]> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut colors = [0u32; 16];
        let mut index = 0;
        for line in reader.lines() {
            let line = line?;
            let entry = line.split('#').next().unwrap_or("").trim();
            if entry.is_empty() {
                continue;
            }
            if index == 16 {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    "palette has more than 16 entries",
                ));
            }
            colors[index] = u32::from_str_radix(entry, 16)
                .map_err(|_| Error::new(ErrorKind::InvalidData, "invalid palette entry"))?;
            index += 1;
        }
        if index != 16 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "palette has fewer than 16 entries",
            ));
        }
        Ok(colors)
    }
}
