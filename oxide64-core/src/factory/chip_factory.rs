// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![cfg_attr(feature = "cargo-clippy", allow(clippy::too_many_arguments))]

use std::rc::Rc;
use std::sync::{Arc, Mutex};

use crate::factory::system_model::{SidModel, VicModel};
use crate::factory::types::*;
use crate::util::{Clock, ColorRam, IoPort, IrqLine, Pin, Ram, Rom, Shared, SharedCell};

/// ChipFactory provides an interface to construct each chip/component within
/// the system, so that any of them can be swapped out for a different
/// implementation. Interactions between chips are modelled through separate
/// I/O state passed into each constructor (`IrqLine`, `Pin`, `IoPort`) rather
/// than through direct references.
///
/// The four core traits used to model system operation are `Chip`, `Cpu`,
/// `Mmu` and `Addressable`; the wiring layer interacts with every component
/// through them (plus `Tickable`, through which the system clock drives the
/// schedule).
pub trait ChipFactory {
    /// Constructs CPU.
    ///
    /// The three least significant bits in the port register correspond to
    /// the three control lines used for bank switching.
    ///
    /// # Dependencies
    /// `mem` - memory controller
    /// # I/O
    /// `io_port` - cpu on-chip I/O port
    /// # Signals
    /// `ba_line` - ba input
    /// `irq_line` - interrupt request input
    /// `nmi_line` - non-maskable interrupt request input
    fn new_cpu(
        &self,
        mem: Shared<dyn Addressable>,
        io_port: Shared<IoPort>,
        ba_line: Shared<Pin>,
        irq_line: Shared<IrqLine>,
        nmi_line: Shared<IrqLine>,
    ) -> Shared<dyn Cpu>;

    // -- Chipset

    /// Constructs CIA 1 chip.
    ///
    /// CIA 1 is connected to the two control ports used to connect joysticks.
    /// The keyboard matrix is also connected to CIA 1 ports.
    fn new_cia_1(
        &self,
        joystick_1: SharedCell<u8>,
        joystick_2: SharedCell<u8>,
        keyboard_matrix: Arc<Mutex<[u8; 16]>>,
        port_a: Shared<IoPort>,
        port_b: Shared<IoPort>,
        flag_pin: Shared<Pin>,
        irq_line: Shared<IrqLine>,
    ) -> Shared<dyn Chip>;

    /// Constructs CIA 2 chip. Port A drives the VIC bank select lines, the
    /// interrupt output is wired to NMI.
    fn new_cia_2(
        &self,
        port_a: Shared<IoPort>,
        port_b: Shared<IoPort>,
        flag_pin: Shared<Pin>,
        nmi_line: Shared<IrqLine>,
    ) -> Shared<dyn Chip>;

    /// Constructs SID chip. Generated sample blocks are handed to
    /// `sound_output` through the dispatchable buffer protocol.
    fn new_sid(
        &self,
        chip_model: SidModel,
        clock_freq: u32,
        sound_output: Arc<dyn SoundOutput>,
    ) -> Shared<dyn Chip>;

    /// Constructs VIC chip.
    ///
    /// Since VIC relies on CIA 2 port A for its memory address generation,
    /// the memory base address is provided through `vic_base_address` and
    /// updated only when CIA 2 port A changes.
    ///
    /// VIC renders into `video_output` one scanline at a time and requests
    /// wall-clock pacing from the system clock at the end of each frame.
    fn new_vic(
        &self,
        chip_model: VicModel,
        color_ram: Shared<ColorRam>,
        ram: Shared<Ram>,
        rom_charset: Shared<Rom>,
        vic_base_address: SharedCell<u16>,
        video_output: Shared<dyn VideoOutput>,
        lp_pin: Shared<Pin>,
        ba_line: Shared<Pin>,
        irq_line: Shared<IrqLine>,
    ) -> Shared<dyn Chip>;

    // -- Memory

    /// Constructs the memory controller visible to the cpu. Bank switching is
    /// controlled through the 5 latch bits (LORAM, HIRAM, CHAREN, GAME,
    /// EXROM) fed to the MMU.
    fn new_memory(
        &self,
        mmu: Shared<dyn Mmu>,
        cia_1: Shared<dyn Chip>,
        cia_2: Shared<dyn Chip>,
        color_ram: Shared<ColorRam>,
        expansion_port: Shared<dyn AddressableFaded>,
        ram: Shared<Ram>,
        rom_basic: Shared<Rom>,
        rom_charset: Shared<Rom>,
        rom_kernal: Shared<Rom>,
        sid: Shared<dyn Chip>,
        vic: Shared<dyn Chip>,
    ) -> Shared<dyn Addressable>;

    /// Constructs the system clock.
    fn new_clock(&self, freq: u32, pace_factor: f64) -> Rc<Clock>;

    /// Constructs RAM with the specified `capacity`.
    fn new_ram(&self, capacity: usize) -> Shared<Ram>;

    /// Constructs ROM from the given image.
    fn new_rom(&self, data: &[u8], offset: u16) -> Shared<Rom>;
}
