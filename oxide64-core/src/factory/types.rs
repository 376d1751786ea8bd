// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::rc::Rc;

use crate::util::Clock;

/// A tick represents a callback invoked by the cpu for each clock cycle
/// during instruction execution.
pub type TickFn = Rc<dyn Fn()>;

pub fn make_noop() -> TickFn {
    Rc::new(|| {})
}

/// A tickable is any component scheduled by the system clock. The returned
/// value is the number of base cycles until the component wants to be ticked
/// again; `Clock::HALT` stops the machine.
pub trait Tickable {
    fn tick(&mut self, clock: &Clock) -> u64;
}

/// Addressable represents a bank of memory.
pub trait Addressable {
    /// Read byte from the specified address.
    fn read(&self, address: u16) -> u8;
    /// Write byte to the specified address.
    fn write(&mut self, address: u16, value: u8);
}

/// Addressable that may be absent from the bus; a read of `None` falls back
/// to the null device.
pub trait AddressableFaded {
    fn read(&mut self, address: u16) -> Option<u8>;
    fn write(&mut self, address: u16, value: u8);
}

/// Memory bank type used with MMU to determine how to map a memory address.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bank {
    Basic,
    Charset,
    Kernal,
    Io,
    Ram,
    RomH,
    RomL,
    Disabled,
}

/// A chip is a clocked system component with a memory mapped register file.
pub trait Chip: Tickable {
    /// Handle reset signal.
    fn reset(&mut self);
    /// Read value from the specified register.
    fn read(&mut self, reg: u8) -> u8;
    /// Write value to the specified register.
    fn write(&mut self, reg: u8, value: u8);
}

#[derive(Copy, Clone)]
pub enum Register {
    A,
    X,
    Y,
    SP,
    P,
}

/// Callback invoked when the cpu reaches a breakpoint address; fires before
/// the opcode fetch.
pub type BreakpointHook = Box<dyn FnMut(u16)>;

/// CPU is responsible for decoding and executing instructions.
pub trait Cpu: Tickable {
    fn get_register(&self, reg: Register) -> u8;
    fn set_register(&mut self, reg: Register, value: u8);
    fn get_pc(&self) -> u16;
    fn set_pc(&mut self, value: u16);
    /// True once a KIL/JAM opcode has latched the halted state.
    fn is_jam(&self) -> bool;
    /// Take (and clear) the external-break request raised by a hookless
    /// breakpoint.
    fn take_ebreak(&mut self) -> bool;
    fn set_decimal_enable(&mut self, enabled: bool);
    /// Register a breakpoint. Without a hook, hitting the address raises the
    /// ebreak flag instead. An autodelete breakpoint unregisters itself after
    /// the first hit.
    fn add_breakpoint(&mut self, address: u16, hook: Option<BreakpointHook>, autodelete: bool);
    fn remove_breakpoint(&mut self, address: u16);
    /// Decode and execute one instruction. The tick callback is invoked for
    /// each elapsed clock cycle.
    fn step(&mut self, tick_fn: &TickFn);
    /// Reset chip.
    fn reset(&mut self);
    // I/O
    /// Read byte from the specified address.
    fn read(&self, address: u16) -> u8;
    /// Write byte to the specified address.
    fn write(&mut self, address: u16, value: u8);
}

/// Represents memory management unit which controls visible memory banks.
pub trait Mmu {
    /// Map address to currently mapped in memory bank.
    fn map(&self, address: u16) -> Bank;
    /// Change bank configuration based on the specified mode.
    fn switch_banks(&mut self, mode: u8);
}

/// Sound output used by SID chip: the dispatchable buffer protocol. The
/// implementation owns a pool of fixed-size blocks; `buffer` blocks until one
/// is free and returns `None` when the output is shutting down.
pub trait SoundOutput: Send + Sync {
    /// Borrow a free sample block.
    fn buffer(&self) -> Option<Vec<i16>>;
    /// Queue a filled block for playback.
    fn dispatch(&self, samples: Vec<i16>);
    /// Reset output.
    fn reset(&self);
}

/// Video output used by VIC chip. One full scanline of RGBA pixels is
/// delivered at a time, in increasing line order within a frame.
pub trait VideoOutput {
    /// Get frame buffer width and height.
    fn get_dimension(&self) -> (usize, usize);
    /// Deliver a completed scanline. `line` is 0-based from the top of the
    /// visible frame.
    fn render_line(&mut self, line: usize, pixels: &[u32]);
    /// Reset output.
    fn reset(&mut self);
}
