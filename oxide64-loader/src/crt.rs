// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![cfg_attr(feature = "cargo-clippy", allow(clippy::cast_lossless))]

use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader, Error, ErrorKind, Read};
use std::path::Path;
use std::str;

use byteorder::{BigEndian, ReadBytesExt};
use log::info;
use oxide64_core::device::cartridge::{Cartridge, Chip, ChipType, HwType};
use oxide64_system::{AutostartMethod, Image, C64};

use super::Loader;

// SPEC: http://ist.uwaterloo.ca/~schepers/formats/CRT.TXT

static HEADER_SIG: &str = "C64 CARTRIDGE   ";
static CHIP_SIG: &str = "CHIP";

struct Header {
    signature: [u8; 16],
    header_length: u32,
    version: u16,
    hw_type: u16,
    exrom_line: u8,
    game_line: u8,
    #[allow(dead_code)]
    reserved: [u8; 6],
    name: [u8; 32],
}

struct ChipHeader {
    signature: [u8; 4],
    length: u32,
    chip_type: u16,
    bank_number: u16,
    load_address: u16,
    image_size: u16,
}

struct CrtImage {
    cartridge: Option<Cartridge>,
}

impl Image for CrtImage {
    fn mount(&mut self, c64: &mut C64) {
        info!(target: "loader", "Mounting CRT image");
        if let Some(cartridge) = self.cartridge.take() {
            c64.attach_cartridge(cartridge);
        }
    }

    fn unmount(&mut self, c64: &mut C64) {
        c64.detach_cartridge();
    }
}

pub struct CrtLoader;

impl CrtLoader {
    pub fn new() -> Self {
        Self {}
    }

    fn build_cartridge(&self, header: &Header) -> io::Result<Cartridge> {
        let hw_type = HwType::from(header.hw_type as u8).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidData,
                format!("unsupported cartridge hardware type {}", header.hw_type),
            )
        })?;
        Ok(Cartridge::new(
            header.version,
            hw_type,
            header.exrom_line != 0,
            header.game_line != 0,
        ))
    }

    fn build_chip(&self, header: &ChipHeader, data: Vec<u8>) -> io::Result<Chip> {
        let chip_type = ChipType::from(header.chip_type).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidData,
                format!("invalid cartridge chip type {}", header.chip_type),
            )
        })?;
        Ok(Chip {
            chip_type,
            bank_number: header.bank_number as u8,
            offset: header.load_address,
            size: header.image_size,
            data,
        })
    }

    fn read_chip_header(&self, rdr: &mut dyn Read) -> io::Result<Option<ChipHeader>> {
        let mut signature = [0u8; 4];
        match rdr.read(&mut signature)? {
            0 => Ok(None),
            4 => {
                let header = ChipHeader {
                    signature,
                    length: rdr.read_u32::<BigEndian>()?,
                    chip_type: rdr.read_u16::<BigEndian>()?,
                    bank_number: rdr.read_u16::<BigEndian>()?,
                    load_address: rdr.read_u16::<BigEndian>()?,
                    image_size: rdr.read_u16::<BigEndian>()?,
                };
                Ok(Some(header))
            }
            size => Err(Error::new(
                ErrorKind::UnexpectedEof,
                format!("chip header error, expected {} got {}", 4, size),
            )),
        }
    }

    fn read_data(&self, rdr: &mut dyn Read, length: usize) -> io::Result<Vec<u8>> {
        let mut data = vec![0; length];
        rdr.read_exact(&mut data)?;
        Ok(data)
    }

    fn read_header(&self, rdr: &mut dyn Read) -> io::Result<Header> {
        let mut signature = [0u8; 16];
        let mut reserved = [0u8; 6];
        let mut name = [0u8; 32];
        let header = Header {
            signature: {
                rdr.read_exact(&mut signature)?;
                signature
            },
            header_length: rdr.read_u32::<BigEndian>()?,
            version: rdr.read_u16::<BigEndian>()?,
            hw_type: rdr.read_u16::<BigEndian>()?,
            exrom_line: rdr.read_u8()?,
            game_line: rdr.read_u8()?,
            reserved: {
                rdr.read_exact(&mut reserved)?;
                reserved
            },
            name: {
                rdr.read_exact(&mut name)?;
                name
            },
        };
        Ok(header)
    }

    fn validate_chip_header(&self, header: &ChipHeader) -> io::Result<()> {
        let sig = str::from_utf8(&header.signature)
            .map_err(|_| Error::new(ErrorKind::InvalidData, "invalid chip signature"))?;
        if sig != CHIP_SIG {
            return Err(Error::new(ErrorKind::InvalidData, "invalid chip signature"));
        }
        if header.length < 0x10 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "invalid chip packet length",
            ));
        }
        Ok(())
    }

    fn validate_header(&self, header: &Header) -> io::Result<()> {
        let sig = str::from_utf8(&header.signature)
            .map_err(|_| Error::new(ErrorKind::InvalidData, "invalid cartridge signature"))?;
        if sig != HEADER_SIG {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "invalid cartridge signature",
            ));
        }
        if header.header_length < 0x40 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "invalid cartridge header length",
            ));
        }
        Ok(())
    }

    fn read_cartridge(&self, rdr: &mut impl BufRead) -> io::Result<Cartridge> {
        let header = self
            .read_header(rdr)
            .map_err(|_| Error::new(ErrorKind::InvalidData, "invalid cartridge header"))?;
        self.validate_header(&header)?;
        info!(target: "loader", "Found cartridge {}, version {}.{}, type {}",
              str::from_utf8(&header.name).unwrap_or(""),
              header.version >> 8,
              header.version & 0xff,
              header.hw_type);
        rdr.consume((header.header_length - 0x40) as usize);
        let mut cartridge = self.build_cartridge(&header)?;
        loop {
            let chip_header_opt = self
                .read_chip_header(rdr)
                .map_err(|_| Error::new(ErrorKind::InvalidData, "invalid cartridge chip header"))?;
            match chip_header_opt {
                Some(chip_header) => {
                    self.validate_chip_header(&chip_header)?;
                    info!(target: "loader", "Found chip {}, offset 0x{:x}, size {}",
                          chip_header.bank_number, chip_header.load_address, chip_header.length - 0x10);
                    let chip_data = self
                        .read_data(rdr, (chip_header.length - 0x10) as usize)
                        .map_err(|_| {
                            Error::new(
                                ErrorKind::InvalidData,
                                format!("invalid cartridge chip {} data", chip_header.bank_number),
                            )
                        })?;
                    let chip = self.build_chip(&chip_header, chip_data)?;
                    cartridge.add(chip);
                }
                None => {
                    break;
                }
            }
        }
        Ok(cartridge)
    }
}

impl Loader for CrtLoader {
    fn autostart(&self, path: &Path) -> Result<AutostartMethod, io::Error> {
        let image = self.load(path)?;
        Ok(AutostartMethod::WithImage(image))
    }

    fn load(&self, path: &Path) -> Result<Box<dyn Image>, io::Error> {
        info!(target: "loader", "Loading CRT {}", path.display());
        let file = File::open(path)?;
        let mut rdr = BufReader::new(file);
        let cartridge = self.read_cartridge(&mut rdr)?;
        Ok(Box::new(CrtImage {
            cartridge: Some(cartridge),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};
    use std::io::{Cursor, Write};

    fn make_crt(payload: &[u8]) -> Vec<u8> {
        let mut image = Vec::new();
        image.write_all(HEADER_SIG.as_bytes()).unwrap();
        image.write_u32::<BigEndian>(0x40).unwrap();
        image.write_u16::<BigEndian>(0x0100).unwrap();
        image.write_u16::<BigEndian>(0).unwrap(); // normal
        image.write_u8(0).unwrap(); // exrom
        image.write_u8(1).unwrap(); // game
        image.write_all(&[0u8; 6]).unwrap();
        image.write_all(&[0u8; 32]).unwrap();
        // one chip packet
        image.write_all(CHIP_SIG.as_bytes()).unwrap();
        image
            .write_u32::<BigEndian>(0x10 + payload.len() as u32)
            .unwrap();
        image.write_u16::<BigEndian>(0).unwrap(); // rom
        image.write_u16::<BigEndian>(0).unwrap(); // bank
        image.write_u16::<BigEndian>(0x8000).unwrap();
        image.write_u16::<BigEndian>(payload.len() as u16).unwrap();
        image.write_all(payload).unwrap();
        image
    }

    #[test]
    fn chip_payload_round_trip() {
        let payload: Vec<u8> = (0..255u8).cycle().take(0x2000).collect();
        let image = make_crt(&payload);
        let loader = CrtLoader::new();
        let mut rdr = Cursor::new(image);
        let cartridge = loader.read_cartridge(&mut rdr).expect("valid image");
        let chip = cartridge.get_chip(0).expect("chip bank 0");
        assert_eq!(payload, chip.data);
        assert_eq!(0x8000, chip.offset);
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut image = make_crt(&[0u8; 16]);
        image[0] = b'X';
        let loader = CrtLoader::new();
        let mut rdr = Cursor::new(image);
        assert!(loader.read_cartridge(&mut rdr).is_err());
    }

    #[test]
    fn bad_chip_signature_is_rejected() {
        let mut image = make_crt(&[0u8; 16]);
        image[0x40] = b'X';
        let loader = CrtLoader::new();
        let mut rdr = Cursor::new(image);
        assert!(loader.read_cartridge(&mut rdr).is_err());
    }
}
