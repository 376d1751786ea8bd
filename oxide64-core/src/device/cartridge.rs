// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use bit_field::BitField;
use log::{log_enabled, trace, Level};

// SPEC: http://ist.uwaterloo.ca/~schepers/formats/CRT.TXT

pub enum ChipType {
    Rom,
    Ram,
    FlashRom,
}

impl ChipType {
    pub fn from(chip_type: u16) -> Option<ChipType> {
        match chip_type {
            0x00 => Some(ChipType::Rom),
            0x01 => Some(ChipType::Ram),
            0x02 => Some(ChipType::FlashRom),
            _ => None,
        }
    }
}

pub struct Chip {
    pub chip_type: ChipType,
    pub bank_number: u8,
    pub offset: u16,
    pub size: u16,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, PartialEq)]
pub enum HwType {
    Normal,
    EasyFlash,
    Final3,
    GameSystem,
    MagicDesk,
    SimonsBasic,
    OceanType1,
}

impl HwType {
    pub fn from(value: u8) -> Option<HwType> {
        match value {
            0 => Some(HwType::Normal),
            3 => Some(HwType::Final3),
            4 => Some(HwType::SimonsBasic),
            5 => Some(HwType::OceanType1),
            15 => Some(HwType::GameSystem),
            19 => Some(HwType::MagicDesk),
            32 => Some(HwType::EasyFlash),
            _ => None,
        }
    }

    pub fn is_mirrored(self) -> bool {
        match self {
            HwType::OceanType1 | HwType::MagicDesk | HwType::Normal => true,
            _ => false,
        }
    }
}

pub struct IoConfig {
    pub exrom: bool,
    pub game: bool,
}

pub type IoObserver = Box<dyn Fn(&IoConfig)>;

pub struct Cartridge {
    version: u16,
    hw_type: HwType,
    exrom: bool,
    game: bool,
    banks: Vec<Option<Chip>>,
    io_observer: Option<IoObserver>,
    is_mirrored: bool,
    // Runtime State
    bank_lo: Option<usize>,
    bank_hi: Option<usize>,
    io_config: IoConfig,
    reg_value: u8,
}

impl Cartridge {
    pub fn new(version: u16, hw_type: HwType, exrom: bool, game: bool) -> Self {
        let mut banks = Vec::with_capacity(64);
        for _ in 0..64 {
            banks.push(None);
        }
        Cartridge {
            version,
            hw_type,
            exrom,
            game,
            banks,
            io_observer: None,
            is_mirrored: hw_type.is_mirrored(),
            bank_lo: None,
            bank_hi: None,
            io_config: IoConfig {
                exrom: true,
                game: true,
            },
            reg_value: 0,
        }
    }

    pub fn get_version(&self) -> u16 {
        self.version
    }

    pub fn get_hw_type(&self) -> HwType {
        self.hw_type
    }

    pub fn set_io_observer(&mut self, observer: Option<IoObserver>) {
        self.io_observer = observer;
    }

    pub fn add(&mut self, chip: Chip) {
        let bank_num = chip.bank_number as usize;
        self.banks[bank_num] = Some(chip);
    }

    pub fn get_chip(&self, bank_number: u8) -> Option<&Chip> {
        self.banks[bank_number as usize].as_ref()
    }

    pub fn reset(&mut self) {
        self.bank_lo = None;
        self.bank_hi = None;
        self.io_config = IoConfig {
            exrom: self.exrom,
            game: self.game,
        };
        if self.banks.iter().any(|bank| bank.is_some()) {
            self.switch_bank(0);
        }
        self.notify_io_changed();
    }

    fn notify_io_changed(&self) {
        if let Some(ref observer) = self.io_observer {
            observer(&self.io_config);
        }
    }

    fn switch_bank(&mut self, bank_number: u8) {
        if log_enabled!(Level::Trace) {
            trace!(
                target: "cart::banks",
                "Switching to bank {} game {} exrom {}",
                bank_number,
                self.io_config.game,
                self.io_config.exrom
            );
        }
        if let Some(ref bank) = self.banks[bank_number as usize] {
            match bank.offset {
                0x8000 => {
                    self.bank_lo = Some(bank.bank_number as usize);
                    self.bank_hi = if self.is_mirrored { self.bank_lo } else { None };
                }
                0xa000 | 0xe000 => {
                    self.bank_hi = Some(bank.bank_number as usize);
                    self.bank_lo = if self.is_mirrored { self.bank_hi } else { None };
                }
                _ => panic!("invalid load address 0x{:04x}", bank.offset),
            }
        }
    }

    // -- Device I/O

    fn read_io(&mut self, address: u16) -> u8 {
        if let HwType::GameSystem = self.hw_type {
            if let 0xde00..=0xdeff = address {
                self.switch_bank((address & 0x3f) as u8);
            }
        }
        self.reg_value
    }

    fn write_io(&mut self, address: u16, value: u8) {
        self.reg_value = value;
        match self.hw_type {
            HwType::EasyFlash => {
                if address == 0xde00 {
                    self.switch_bank(value & 0x3f);
                }
            }
            HwType::Final3 => {
                if address == 0xdfff {
                    self.switch_bank(value & 0x3f);
                }
            }
            HwType::MagicDesk => {
                if address == 0xde00 {
                    if !value.get_bit(7) {
                        self.switch_bank(value & 0x3f);
                        self.io_config.exrom = self.exrom;
                        self.io_config.game = self.game;
                    } else {
                        self.io_config.exrom = true;
                        self.io_config.game = true;
                    }
                    self.notify_io_changed();
                }
            }
            HwType::Normal => {
                if address == 0xde00 {
                    self.switch_bank(value & 0x3f);
                }
            }
            HwType::OceanType1 => {
                if address == 0xde00 && value.get_bit(7) {
                    self.switch_bank(value & 0x3f);
                }
            }
            HwType::SimonsBasic => {
                if address == 0xde00 {
                    self.io_config.game = value == 0x01;
                    self.notify_io_changed();
                }
            }
            _ => {}
        }
    }

    fn read_chip(&self, bank: Option<usize>, address: u16, base: u16) -> Option<u8> {
        bank.and_then(|bank_num| self.banks[bank_num].as_ref())
            .map(|chip| {
                let offset = (address - base) as usize % chip.data.len();
                chip.data[offset]
            })
    }

    pub fn read(&mut self, address: u16) -> Option<u8> {
        match address {
            0x8000..=0x9fff => self.read_chip(self.bank_lo, address, 0x8000),
            0xa000..=0xbfff => self.read_chip(self.bank_hi, address, 0xa000),
            0xe000..=0xffff => self.read_chip(self.bank_hi, address, 0xe000),
            0xde00..=0xdfff => Some(self.read_io(address)),
            _ => None,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            0xde00..=0xdfff => self.write_io(address, value),
            0x8000..=0x9fff => {
                if let Some(chip) = self.bank_lo.and_then(|bank| self.banks[bank].as_mut()) {
                    if let ChipType::Ram = chip.chip_type {
                        let offset = (address - 0x8000) as usize % chip.data.len();
                        chip.data[offset] = value;
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chip(bank: u8, offset: u16, fill: u8) -> Chip {
        Chip {
            chip_type: ChipType::Rom,
            bank_number: bank,
            offset,
            size: 0x2000,
            data: vec![fill; 0x2000],
        }
    }

    fn setup_cartridge() -> Cartridge {
        let mut cartridge = Cartridge::new(0x0100, HwType::Normal, false, true);
        cartridge.add(make_chip(0, 0x8000, 0xaa));
        cartridge.add(make_chip(1, 0x8000, 0xbb));
        cartridge.reset();
        cartridge
    }

    #[test]
    fn read_active_bank() {
        let mut cartridge = setup_cartridge();
        assert_eq!(Some(0xaa), cartridge.read(0x8000));
        // mirrored into romh for the normal hw type
        assert_eq!(Some(0xaa), cartridge.read(0xa000));
    }

    #[test]
    fn bank_switch_through_io() {
        let mut cartridge = setup_cartridge();
        cartridge.write(0xde00, 0x01);
        assert_eq!(Some(0xbb), cartridge.read(0x8000));
    }

    #[test]
    fn unmapped_region_fades() {
        let mut cartridge = setup_cartridge();
        assert_eq!(None, cartridge.read(0x4000));
    }
}
