// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![cfg_attr(feature = "cargo-clippy", allow(clippy::cast_lossless))]

use std::cmp;
use std::fmt;
use std::rc::Rc;

use log::{log_enabled, trace, warn, Level};

use crate::factory::{make_noop, Addressable, BreakpointHook, Cpu, Register, TickFn, Tickable};
use crate::util::{new_shared_cell, Clock, IoPort, IrqLine, Pin, Shared, SharedCell};

use super::instruction::Instruction;
use super::operand::Operand;

// Spec: http://nesdev.com/6502.txt
// Design:
//   CPU is responsible for decoding and executing instructions. Its state
//   consists of registers and interrupt lines. Instruction decoding is
//   delegated to Instruction, addressing modes to Operand. On each step the
//   interrupt lines are sampled to see if program flow should be interrupted,
//   with the one-instruction delay after CLI/SEI/PLP that real silicon shows.
//   6510 has two port registers at 0x0000 and 0x0001 that control PLA
//   configuration so they are also handled here.
//
//   Under the system clock the cpu executes one full instruction per tick and
//   reports the consumed cycles; while the BA line is held low it stalls in
//   1-cycle steps instead.

enum Flag {
    Carry = 1,
    Zero = 1 << 1,
    IntDisable = 1 << 2,
    Decimal = 1 << 3,
    Break = 1 << 4,
    Reserved = 1 << 5,
    Overflow = 1 << 6,
    Negative = 1 << 7,
}

#[derive(Debug)]
enum Interrupt {
    Break = 1,
    Irq = 1 << 1,
    Nmi = 1 << 2,
    Reset = 1 << 3,
}

impl Interrupt {
    pub fn vector(&self) -> u16 {
        match *self {
            Interrupt::Break => 0xfffe,
            Interrupt::Irq => 0xfffe,
            Interrupt::Nmi => 0xfffa,
            Interrupt::Reset => 0xfffc,
        }
    }
}

struct Registers {
    a: u8,
    x: u8,
    y: u8,
    sp: u8,
    pc: u16,
    p: u8,
}

impl Registers {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0,
            pc: 0,
            p: 0,
        }
    }

    pub fn reset(&mut self) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0;
        self.pc = 0;
        self.p = 0;
    }
}

struct Breakpoint {
    address: u16,
    hook: Option<BreakpointHook>,
    autodelete: bool,
}

pub struct Cpu6510 {
    // Dependencies
    mem: Shared<dyn Addressable>,
    // Runtime State
    regs: Registers,
    decimal_enable: bool,
    // Sampled interrupt-disable flag; lags one instruction behind P after
    // CLI/SEI/PLP to reproduce the documented delayed-I behaviour.
    int_disable_latch: bool,
    jam: bool,
    ebreak: bool,
    breakpoints: Vec<Breakpoint>,
    // Cycle accounting for the system clock
    cycles: SharedCell<u64>,
    count_fn: TickFn,
    // I/O
    ba_line: Shared<Pin>,
    io_port: Shared<IoPort>,
    irq_line: Shared<IrqLine>,
    nmi_line: Shared<IrqLine>,
}

impl Cpu6510 {
    pub fn new(
        mem: Shared<dyn Addressable>,
        io_port: Shared<IoPort>,
        ba_line: Shared<Pin>,
        irq_line: Shared<IrqLine>,
        nmi_line: Shared<IrqLine>,
    ) -> Self {
        let cycles = new_shared_cell(0u64);
        let count_fn: TickFn = {
            let cycles = cycles.clone();
            Rc::new(move || cycles.set(cycles.get() + 1))
        };
        Self {
            mem,
            regs: Registers::new(),
            decimal_enable: true,
            int_disable_latch: false,
            jam: false,
            ebreak: false,
            breakpoints: Vec::new(),
            cycles,
            count_fn,
            ba_line,
            io_port,
            irq_line,
            nmi_line,
        }
    }

    pub fn get_a(&self) -> u8 {
        self.regs.a
    }

    pub fn get_x(&self) -> u8 {
        self.regs.x
    }

    pub fn get_y(&self) -> u8 {
        self.regs.y
    }

    pub fn set_a(&mut self, value: u8) {
        self.regs.a = value;
    }

    pub fn set_x(&mut self, value: u8) {
        self.regs.x = value;
    }

    pub fn set_y(&mut self, value: u8) {
        self.regs.y = value;
    }

    fn execute(&mut self, instr: &Instruction, tick_fn: &TickFn) {
        match *instr {
            //  Data Movement
            Instruction::LDA(ref op) => {
                let value = op.get(self, tick_fn);
                self.update_nz(value);
                self.regs.a = value;
            }
            Instruction::LDX(ref op) => {
                let value = op.get(self, tick_fn);
                self.update_nz(value);
                self.regs.x = value;
            }
            Instruction::LDY(ref op) => {
                let value = op.get(self, tick_fn);
                self.update_nz(value);
                self.regs.y = value;
            }
            Instruction::PHA => {
                let value = self.regs.a;
                self.push(value, tick_fn);
                tick_fn();
            }
            Instruction::PHP => {
                // NOTE undocumented behavior
                let value = self.regs.p | (Flag::Break as u8) | (Flag::Reserved as u8);
                self.push(value, tick_fn);
                tick_fn();
            }
            Instruction::PLA => {
                let value = self.pop(tick_fn);
                self.update_nz(value);
                self.regs.a = value;
                tick_fn();
                tick_fn();
            }
            Instruction::PLP => {
                let value = self.pop(tick_fn);
                self.regs.p = value;
                tick_fn();
                tick_fn();
            }
            Instruction::STA(ref op) => {
                let value = self.regs.a;
                op.set(self, value, true, tick_fn);
            }
            Instruction::STX(ref op) => {
                let value = self.regs.x;
                op.set(self, value, true, tick_fn);
            }
            Instruction::STY(ref op) => {
                let value = self.regs.y;
                op.set(self, value, true, tick_fn);
            }
            Instruction::TAX => {
                let value = self.regs.a;
                self.update_nz(value);
                self.regs.x = value;
                tick_fn();
            }
            Instruction::TAY => {
                let value = self.regs.a;
                self.update_nz(value);
                self.regs.y = value;
                tick_fn();
            }
            Instruction::TSX => {
                let value = self.regs.sp;
                self.update_nz(value);
                self.regs.x = value;
                tick_fn();
            }
            Instruction::TXA => {
                let value = self.regs.x;
                self.update_nz(value);
                self.regs.a = value;
                tick_fn();
            }
            Instruction::TXS => {
                let value = self.regs.x;
                // NOTE do not set nz
                self.regs.sp = value;
                tick_fn();
            }
            Instruction::TYA => {
                let value = self.regs.y;
                self.update_nz(value);
                self.regs.a = value;
                tick_fn();
            }
            // Arithmetic
            Instruction::ADC(ref op) => {
                let value = op.get(self, tick_fn);
                self.do_adc(value);
            }
            Instruction::SBC(ref op) => {
                let value = op.get(self, tick_fn);
                self.do_sbc(value);
            }
            Instruction::CMP(ref op) => {
                let value = op.get(self, tick_fn);
                let a = self.regs.a;
                self.do_compare(a, value);
            }
            Instruction::CPX(ref op) => {
                let value = op.get(self, tick_fn);
                let x = self.regs.x;
                self.do_compare(x, value);
            }
            Instruction::CPY(ref op) => {
                let value = op.get(self, tick_fn);
                let y = self.regs.y;
                self.do_compare(y, value);
            }
            Instruction::DEC(ref op) => {
                self.rmw_op(op, tick_fn, Self::do_dec);
            }
            Instruction::DEX => {
                let result = self.regs.x.wrapping_sub(1);
                self.update_nz(result);
                self.regs.x = result;
                tick_fn();
            }
            Instruction::DEY => {
                let result = self.regs.y.wrapping_sub(1);
                self.update_nz(result);
                self.regs.y = result;
                tick_fn();
            }
            Instruction::INC(ref op) => {
                self.rmw_op(op, tick_fn, Self::do_inc);
            }
            Instruction::INX => {
                let result = self.regs.x.wrapping_add(1);
                self.update_nz(result);
                self.regs.x = result;
                tick_fn();
            }
            Instruction::INY => {
                let result = self.regs.y.wrapping_add(1);
                self.update_nz(result);
                self.regs.y = result;
                tick_fn();
            }
            // Logical
            Instruction::AND(ref op) => {
                let result = op.get(self, tick_fn) & self.regs.a;
                self.update_nz(result);
                self.regs.a = result;
            }
            Instruction::EOR(ref op) => {
                let result = op.get(self, tick_fn) ^ self.regs.a;
                self.update_nz(result);
                self.regs.a = result;
            }
            Instruction::ORA(ref op) => {
                let result = op.get(self, tick_fn) | self.regs.a;
                self.update_nz(result);
                self.regs.a = result;
            }
            // Shift and Rotate
            Instruction::ASL(ref op) => {
                self.rmw_op(op, tick_fn, Self::do_asl);
            }
            Instruction::LSR(ref op) => {
                self.rmw_op(op, tick_fn, Self::do_lsr);
            }
            Instruction::ROL(ref op) => {
                self.rmw_op(op, tick_fn, Self::do_rol);
            }
            Instruction::ROR(ref op) => {
                self.rmw_op(op, tick_fn, Self::do_ror);
            }
            // Control Flow
            Instruction::BCC(ref op) => {
                if !self.test_flag(Flag::Carry) {
                    self.regs.pc = op.ea(self, false, tick_fn);
                }
            }
            Instruction::BCS(ref op) => {
                if self.test_flag(Flag::Carry) {
                    self.regs.pc = op.ea(self, false, tick_fn);
                }
            }
            Instruction::BEQ(ref op) => {
                if self.test_flag(Flag::Zero) {
                    self.regs.pc = op.ea(self, false, tick_fn);
                }
            }
            Instruction::BMI(ref op) => {
                if self.test_flag(Flag::Negative) {
                    self.regs.pc = op.ea(self, false, tick_fn);
                }
            }
            Instruction::BNE(ref op) => {
                if !self.test_flag(Flag::Zero) {
                    self.regs.pc = op.ea(self, false, tick_fn);
                }
            }
            Instruction::BPL(ref op) => {
                if !self.test_flag(Flag::Negative) {
                    self.regs.pc = op.ea(self, false, tick_fn);
                }
            }
            Instruction::BVC(ref op) => {
                if !self.test_flag(Flag::Overflow) {
                    self.regs.pc = op.ea(self, false, tick_fn);
                }
            }
            Instruction::BVS(ref op) => {
                if self.test_flag(Flag::Overflow) {
                    self.regs.pc = op.ea(self, false, tick_fn);
                }
            }
            Instruction::JMP(ref op) => {
                self.regs.pc = op.ea(self, false, tick_fn);
            }
            Instruction::JSR(ref op) => {
                let pc = self.regs.pc.wrapping_sub(1);
                self.push(((pc >> 8) & 0xff) as u8, tick_fn);
                self.push((pc & 0xff) as u8, tick_fn);
                self.regs.pc = op.ea(self, false, tick_fn);
                tick_fn();
            }
            Instruction::RTS => {
                let address = (self.pop(tick_fn) as u16) | ((self.pop(tick_fn) as u16) << 8);
                self.regs.pc = address.wrapping_add(1);
                tick_fn();
                tick_fn();
                tick_fn();
            }
            // Misc
            Instruction::BIT(ref op) => {
                let value = op.get(self, tick_fn);
                let a = self.regs.a;
                self.set_flag(Flag::Negative, value & 0x80 != 0);
                self.set_flag(Flag::Overflow, 0x40 & value != 0);
                self.set_flag(Flag::Zero, value & a == 0);
            }
            Instruction::BRK => {
                self.interrupt(&Interrupt::Break, tick_fn);
            }
            Instruction::CLC => {
                self.set_flag(Flag::Carry, false);
                tick_fn();
            }
            Instruction::CLD => {
                self.set_flag(Flag::Decimal, false);
                tick_fn();
            }
            Instruction::CLI => {
                self.set_flag(Flag::IntDisable, false);
                tick_fn();
            }
            Instruction::CLV => {
                self.set_flag(Flag::Overflow, false);
                tick_fn();
            }
            Instruction::NOP => {
                tick_fn();
            }
            Instruction::SEC => {
                self.set_flag(Flag::Carry, true);
                tick_fn();
            }
            Instruction::SED => {
                self.set_flag(Flag::Decimal, true);
                tick_fn();
            }
            Instruction::SEI => {
                self.set_flag(Flag::IntDisable, true);
                tick_fn();
            }
            Instruction::RTI => {
                self.regs.p = self.pop(tick_fn);
                self.regs.pc = (self.pop(tick_fn) as u16) | ((self.pop(tick_fn) as u16) << 8);
                self.int_disable_latch = self.test_flag(Flag::IntDisable);
                tick_fn();
                tick_fn();
            }
            // Undocumented - read-modify-write combos
            Instruction::SLO(ref op) => {
                let address = self.rmw_address(op, tick_fn);
                let value = self.read_internal(address, tick_fn);
                let result = self.do_asl(value);
                self.write_internal(address, result, tick_fn);
                let a = self.regs.a | result;
                self.update_nz(a);
                self.regs.a = a;
                tick_fn();
            }
            Instruction::RLA(ref op) => {
                let address = self.rmw_address(op, tick_fn);
                let value = self.read_internal(address, tick_fn);
                let result = self.do_rol(value);
                self.write_internal(address, result, tick_fn);
                let a = self.regs.a & result;
                self.update_nz(a);
                self.regs.a = a;
                tick_fn();
            }
            Instruction::SRE(ref op) => {
                let address = self.rmw_address(op, tick_fn);
                let value = self.read_internal(address, tick_fn);
                let result = self.do_lsr(value);
                self.write_internal(address, result, tick_fn);
                let a = self.regs.a ^ result;
                self.update_nz(a);
                self.regs.a = a;
                tick_fn();
            }
            Instruction::RRA(ref op) => {
                let address = self.rmw_address(op, tick_fn);
                let value = self.read_internal(address, tick_fn);
                let result = self.do_ror(value);
                self.write_internal(address, result, tick_fn);
                self.do_adc(result);
                tick_fn();
            }
            Instruction::DCP(ref op) => {
                let address = self.rmw_address(op, tick_fn);
                let value = self.read_internal(address, tick_fn);
                let result = value.wrapping_sub(1);
                self.write_internal(address, result, tick_fn);
                let a = self.regs.a;
                self.do_compare(a, result);
                tick_fn();
            }
            Instruction::ISC(ref op) => {
                let address = self.rmw_address(op, tick_fn);
                let value = self.read_internal(address, tick_fn);
                let result = value.wrapping_add(1);
                self.write_internal(address, result, tick_fn);
                self.do_sbc(result);
                tick_fn();
            }
            // Undocumented - loads and stores
            Instruction::LAX(ref op) => {
                let value = op.get(self, tick_fn);
                self.update_nz(value);
                self.regs.a = value;
                self.regs.x = value;
            }
            Instruction::SAX(ref op) => {
                let value = self.regs.a & self.regs.x;
                op.set(self, value, true, tick_fn);
            }
            Instruction::LAS(ref op) => {
                let value = op.get(self, tick_fn) & self.regs.sp;
                self.update_nz(value);
                self.regs.a = value;
                self.regs.x = value;
                self.regs.sp = value;
            }
            // Undocumented - immediate logic
            Instruction::ANC(ref op) => {
                let result = self.regs.a & op.get(self, tick_fn);
                self.update_nz(result);
                self.set_flag(Flag::Carry, result & 0x80 != 0);
                self.regs.a = result;
            }
            Instruction::ALR(ref op) => {
                let value = self.regs.a & op.get(self, tick_fn);
                self.set_flag(Flag::Carry, (value & 0x01) != 0);
                let result = value >> 1;
                self.update_nz(result);
                self.regs.a = result;
            }
            Instruction::ARR(ref op) => {
                let value = self.regs.a & op.get(self, tick_fn);
                let carry_in = if self.test_flag(Flag::Carry) { 0x80 } else { 0 };
                let result = (value >> 1) | carry_in;
                self.update_nz(result);
                self.set_flag(Flag::Carry, result & 0x40 != 0);
                self.set_flag(
                    Flag::Overflow,
                    ((result >> 6) ^ (result >> 5)) & 0x01 != 0,
                );
                self.regs.a = result;
            }
            Instruction::SBX(ref op) => {
                let value = op.get(self, tick_fn);
                let result = ((self.regs.a & self.regs.x) as u16).wrapping_sub(value as u16);
                self.set_flag(Flag::Carry, result < 0x100);
                self.update_nz((result & 0xff) as u8);
                self.regs.x = (result & 0xff) as u8;
            }
            // Undocumented - unstable
            Instruction::ANE(ref op) => {
                let value = op.get(self, tick_fn);
                let result = (self.regs.a | 0xee) & self.regs.x & value;
                self.update_nz(result);
                self.regs.a = result;
            }
            Instruction::LXA(ref op) => {
                let value = op.get(self, tick_fn);
                let result = (self.regs.a | 0xee) & value;
                self.update_nz(result);
                self.regs.a = result;
                self.regs.x = result;
            }
            Instruction::SHA(ref op) => {
                let value = self.regs.a & self.regs.x;
                self.unstable_store(op, value, tick_fn);
            }
            Instruction::SHX(ref op) => {
                let value = self.regs.x;
                self.unstable_store(op, value, tick_fn);
            }
            Instruction::SHY(ref op) => {
                let value = self.regs.y;
                self.unstable_store(op, value, tick_fn);
            }
            Instruction::SHS(ref op) => {
                let value = self.regs.a & self.regs.x;
                self.regs.sp = value;
                self.unstable_store(op, value, tick_fn);
            }
            // Undocumented - multi-byte nops
            Instruction::DOP(ref op) => {
                let _ = op.get(self, tick_fn);
            }
            Instruction::TOP(ref op) => {
                let _ = op.get(self, tick_fn);
            }
            // Undocumented - processor lockup
            Instruction::KIL => {
                warn!(target: "cpu", "Processor jam at 0x{:04x}", self.regs.pc.wrapping_sub(1));
                self.jam = true;
                tick_fn();
            }
        };
    }

    pub fn fetch_byte(&mut self, tick_fn: &TickFn) -> u8 {
        let byte = self.read_internal(self.regs.pc, tick_fn);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        byte
    }

    pub fn fetch_word(&mut self, tick_fn: &TickFn) -> u16 {
        let word = self.read_internal_u16(self.regs.pc, tick_fn);
        self.regs.pc = self.regs.pc.wrapping_add(2);
        word
    }

    fn interrupt(&mut self, interrupt: &Interrupt, tick_fn: &TickFn) {
        if log_enabled!(Level::Trace) {
            trace!(target: "cpu::int", "Interrupt {:?}", interrupt);
        }
        let pc = self.regs.pc;
        let p = self.regs.p;
        match interrupt {
            Interrupt::Irq => {
                tick_fn();
                self.push(((pc >> 8) & 0xff) as u8, tick_fn);
                self.push((pc & 0xff) as u8, tick_fn);
                self.push(p & !(Flag::Break as u8), tick_fn);
                self.set_flag(Flag::IntDisable, true);
            }
            Interrupt::Nmi => {
                tick_fn();
                self.push(((pc >> 8) & 0xff) as u8, tick_fn);
                self.push((pc & 0xff) as u8, tick_fn);
                self.push(p & !(Flag::Break as u8), tick_fn);
                self.set_flag(Flag::IntDisable, true);
                self.nmi_line.borrow_mut().reset();
            }
            Interrupt::Break => {
                let pc = pc.wrapping_add(1);
                self.push(((pc >> 8) & 0xff) as u8, tick_fn);
                self.push((pc & 0xff) as u8, tick_fn);
                self.push(p | (Flag::Break as u8) | (Flag::Reserved as u8), tick_fn);
                self.set_flag(Flag::IntDisable, true);
            }
            Interrupt::Reset => {
                self.set_flag(Flag::IntDisable, true);
            }
        }
        self.int_disable_latch = true;
        self.regs.pc = self.read_internal_u16(interrupt.vector(), tick_fn);
        tick_fn();
    }

    fn pop(&mut self, tick_fn: &TickFn) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let addr = 0x0100 + self.regs.sp as u16;
        self.read_internal(addr, tick_fn)
    }

    fn push(&mut self, value: u8, tick_fn: &TickFn) {
        let addr = 0x0100 + self.regs.sp as u16;
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write_internal(addr, value, tick_fn);
    }

    /// Effective address for read-modify-write instructions; the index cycle
    /// is always paid, there is no page-cross shortcut.
    fn rmw_address(&mut self, op: &Operand, tick_fn: &TickFn) -> u16 {
        match *op {
            Operand::ZeroPage(address) => address as u16,
            Operand::ZeroPageX(address) => {
                tick_fn();
                address.wrapping_add(self.regs.x) as u16
            }
            Operand::Absolute(address) => address,
            Operand::AbsoluteX(address) => {
                tick_fn();
                address.wrapping_add(self.regs.x as u16)
            }
            Operand::AbsoluteY(address) => {
                tick_fn();
                address.wrapping_add(self.regs.y as u16)
            }
            Operand::IndirectX(address) => {
                let pointer = address.wrapping_add(self.regs.x);
                tick_fn();
                self.read_internal_u16_zp(pointer, tick_fn)
            }
            Operand::IndirectY(address) => {
                tick_fn();
                self.read_internal_u16_zp(address, tick_fn)
                    .wrapping_add(self.regs.y as u16)
            }
            _ => panic!("illegal addressing mode for rmw operation"),
        }
    }

    fn rmw_op(&mut self, op: &Operand, tick_fn: &TickFn, f: fn(&mut Self, u8) -> u8) {
        if let Operand::Accumulator = *op {
            let value = self.regs.a;
            let result = f(self, value);
            self.regs.a = result;
            tick_fn();
        } else {
            let address = self.rmw_address(op, tick_fn);
            let value = self.read_internal(address, tick_fn);
            let result = f(self, value);
            self.write_internal(address, result, tick_fn);
            tick_fn();
        }
    }

    /// Store path of the unstable SHA/SHX/SHY/SHS group: the stored value is
    /// ANDed with the high address byte + 1 and the store is dropped when the
    /// index crosses a page ("no DMA crossing" model).
    fn unstable_store(&mut self, op: &Operand, value: u8, tick_fn: &TickFn) {
        let (base, index) = match *op {
            Operand::AbsoluteX(address) => {
                tick_fn();
                (address, self.regs.x)
            }
            Operand::AbsoluteY(address) => {
                tick_fn();
                (address, self.regs.y)
            }
            Operand::IndirectY(address) => {
                let pointer = self.read_internal_u16_zp(address, tick_fn);
                tick_fn();
                (pointer, self.regs.y)
            }
            _ => panic!("illegal addressing mode for unstable store"),
        };
        let ea = base.wrapping_add(index as u16);
        let result = value & ((base >> 8) as u8).wrapping_add(1);
        if base & 0xff00 == ea & 0xff00 {
            self.write_internal(ea, result, tick_fn);
        } else {
            tick_fn();
        }
    }

    // -- ALU helpers

    fn do_adc(&mut self, value: u8) {
        let ac = self.regs.a as u16;
        let value = value as u16;
        let carry = if self.test_flag(Flag::Carry) { 1 } else { 0 };
        let temp = if !self.test_flag(Flag::Decimal) || !self.decimal_enable {
            ac.wrapping_add(value).wrapping_add(carry)
        } else {
            let mut t = (ac & 0x0f) + (value & 0x0f) + carry;
            if t > 0x09 {
                t += 0x06;
            }
            t += (ac & 0xf0) + (value & 0xf0);
            if t & 0x01f0 > 0x90 {
                t += 0x60;
            }
            t
        };
        self.set_flag(
            Flag::Overflow,
            (ac ^ value) & 0x80 == 0 && (ac ^ temp) & 0x80 == 0x80,
        );
        self.set_flag(Flag::Carry, temp > 0xff);
        let result = (temp & 0xff) as u8;
        self.update_nz(result);
        self.regs.a = result;
    }

    fn do_sbc(&mut self, value: u8) {
        let ac = self.regs.a as u16;
        let value = value as u16;
        let carry = if self.test_flag(Flag::Carry) { 0 } else { 1 };
        let temp = if !self.test_flag(Flag::Decimal) || !self.decimal_enable {
            ac.wrapping_sub(value).wrapping_sub(carry)
        } else {
            let mut t = (ac & 0x0f).wrapping_sub(value & 0x0f).wrapping_sub(carry);
            if t & 0x10 != 0 {
                t = (t.wrapping_sub(0x06) & 0x0f)
                    | ((ac & 0xf0).wrapping_sub(value & 0xf0).wrapping_sub(0x10));
            } else {
                t = (t & 0x0f) | ((ac & 0xf0).wrapping_sub(value & 0xf0));
            }
            if t & 0x0100 != 0 {
                t = t.wrapping_sub(0x60);
            }
            t
        };
        self.set_flag(
            Flag::Overflow,
            (ac ^ temp) & 0x80 != 0 && (ac ^ value) & 0x80 == 0x80,
        );
        self.set_flag(Flag::Carry, temp < 0x100);
        let result = (temp & 0xff) as u8;
        self.update_nz(result);
        self.regs.a = result;
    }

    fn do_compare(&mut self, reg: u8, value: u8) {
        let result = (reg as u16).wrapping_sub(value as u16);
        self.set_flag(Flag::Carry, result < 0x100);
        self.update_nz((result & 0xff) as u8);
    }

    fn do_asl(&mut self, value: u8) -> u8 {
        self.set_flag(Flag::Carry, (value & 0x80) != 0);
        let result = value << 1;
        self.update_nz(result);
        result
    }

    fn do_lsr(&mut self, value: u8) -> u8 {
        self.set_flag(Flag::Carry, (value & 0x01) != 0);
        let result = value >> 1;
        self.update_nz(result);
        result
    }

    fn do_rol(&mut self, value: u8) -> u8 {
        let mut temp = (value as u16) << 1;
        if self.test_flag(Flag::Carry) {
            temp |= 0x01
        };
        self.set_flag(Flag::Carry, temp > 0xff);
        let result = (temp & 0xff) as u8;
        self.update_nz(result);
        result
    }

    fn do_ror(&mut self, value: u8) -> u8 {
        let value = value as u16;
        let mut temp = if self.test_flag(Flag::Carry) {
            value | 0x100
        } else {
            value
        };
        self.set_flag(Flag::Carry, temp & 0x01 != 0);
        temp >>= 1;
        let result = (temp & 0xff) as u8;
        self.update_nz(result);
        result
    }

    fn do_dec(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.update_nz(result);
        result
    }

    fn do_inc(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.update_nz(result);
        result
    }

    fn set_flag(&mut self, flag: Flag, value: bool) {
        if value {
            self.regs.p |= flag as u8;
        } else {
            self.regs.p &= !(flag as u8);
        }
    }

    fn test_flag(&self, flag: Flag) -> bool {
        (self.regs.p & (flag as u8)) != 0
    }

    fn update_nz(&mut self, value: u8) {
        self.set_flag(Flag::Negative, value & 0x80 != 0);
        self.set_flag(Flag::Zero, value == 0);
    }

    fn check_breakpoints(&mut self) {
        let pc = self.regs.pc;
        let mut fired = None;
        for (pos, bp) in self.breakpoints.iter_mut().enumerate() {
            if bp.address == pc {
                match bp.hook {
                    Some(ref mut hook) => hook(pc),
                    None => self.ebreak = true,
                }
                if bp.autodelete {
                    fired = Some(pos);
                }
                break;
            }
        }
        if let Some(pos) = fired {
            self.breakpoints.remove(pos);
        }
    }

    // -- Memory Ops

    pub fn read_internal(&self, address: u16, tick_fn: &TickFn) -> u8 {
        let value = match address {
            0x0000 => self.io_port.borrow().get_direction(),
            0x0001 => self.io_port.borrow().get_value() & 0x3f,
            _ => self.mem.borrow().read(address),
        };
        tick_fn();
        value
    }

    pub fn read_internal_u16(&self, address: u16, tick_fn: &TickFn) -> u16 {
        let low = self.read_internal(address, tick_fn);
        let high = self.read_internal(address.wrapping_add(1), tick_fn);
        ((high as u16) << 8) | low as u16
    }

    /// Zero-page pointer fetch; the high byte wraps inside page zero.
    pub fn read_internal_u16_zp(&self, pointer: u8, tick_fn: &TickFn) -> u16 {
        let low = self.read_internal(pointer as u16, tick_fn);
        let high = self.read_internal(pointer.wrapping_add(1) as u16, tick_fn);
        ((high as u16) << 8) | low as u16
    }

    pub fn write_internal(&mut self, address: u16, value: u8, tick_fn: &TickFn) {
        match address {
            0x0000 => self.io_port.borrow_mut().set_direction(value),
            0x0001 => self.io_port.borrow_mut().set_value(value),
            _ => {}
        }
        self.mem.borrow_mut().write(address, value);
        tick_fn();
    }
}

impl Cpu for Cpu6510 {
    fn get_register(&self, reg: Register) -> u8 {
        match reg {
            Register::A => self.regs.a,
            Register::X => self.regs.x,
            Register::Y => self.regs.y,
            Register::SP => self.regs.sp,
            Register::P => self.regs.p,
        }
    }

    fn set_register(&mut self, reg: Register, value: u8) {
        match reg {
            Register::A => self.regs.a = value,
            Register::X => self.regs.x = value,
            Register::Y => self.regs.y = value,
            Register::SP => self.regs.sp = value,
            Register::P => self.regs.p = value,
        }
    }

    fn get_pc(&self) -> u16 {
        self.regs.pc
    }

    fn set_pc(&mut self, value: u16) {
        self.regs.pc = value;
    }

    fn is_jam(&self) -> bool {
        self.jam
    }

    fn take_ebreak(&mut self) -> bool {
        let ebreak = self.ebreak;
        self.ebreak = false;
        ebreak
    }

    fn set_decimal_enable(&mut self, enabled: bool) {
        self.decimal_enable = enabled;
    }

    fn add_breakpoint(&mut self, address: u16, hook: Option<BreakpointHook>, autodelete: bool) {
        self.breakpoints.push(Breakpoint {
            address,
            hook,
            autodelete,
        });
    }

    fn remove_breakpoint(&mut self, address: u16) {
        self.breakpoints.retain(|bp| bp.address != address);
    }

    fn step(&mut self, tick_fn: &TickFn) {
        if self.jam {
            tick_fn();
            return;
        }
        if !self.breakpoints.is_empty() {
            self.check_breakpoints();
            if self.ebreak {
                // Hand control back before the opcode fetch.
                tick_fn();
                return;
            }
        }
        if self.nmi_line.borrow().is_low() {
            self.interrupt(&Interrupt::Nmi, tick_fn);
        } else if self.irq_line.borrow().is_low() && !self.int_disable_latch {
            self.interrupt(&Interrupt::Irq, tick_fn);
        }
        let pc = self.regs.pc;
        let opcode = self.fetch_byte(tick_fn);
        let instr = Instruction::decode(self, opcode, tick_fn);
        if log_enabled!(Level::Trace) {
            let op_value = format!("{}", instr);
            trace!(target: "cpu::ins", "0x{:04x}: {:14}; {}", pc, op_value, &self);
        }
        self.execute(&instr, tick_fn);
        match instr {
            // Delayed-I: the freshly written flag value is sampled only
            // after the following instruction.
            Instruction::CLI | Instruction::SEI | Instruction::PLP => {}
            _ => self.int_disable_latch = self.test_flag(Flag::IntDisable),
        }
    }

    fn reset(&mut self) {
        self.regs.reset();
        self.jam = false;
        self.ebreak = false;
        self.int_disable_latch = false;
        self.io_port.borrow_mut().set_value(0xff);
        self.irq_line.borrow_mut().reset();
        self.nmi_line.borrow_mut().reset();
        self.write(0x0000, 0b_0010_1111);
        self.write(0x0001, 0b_0001_1111);
        self.interrupt(&Interrupt::Reset, &make_noop());
    }

    // -- I/O

    fn read(&self, address: u16) -> u8 {
        self.read_internal(address, &make_noop())
    }

    fn write(&mut self, address: u16, value: u8) {
        self.write_internal(address, value, &make_noop());
    }
}

impl Tickable for Cpu6510 {
    fn tick(&mut self, _clock: &Clock) -> u64 {
        if self.jam || self.ebreak {
            return Clock::HALT;
        }
        if self.ba_line.borrow().is_low() {
            return 1;
        }
        self.cycles.set(0);
        let tick_fn = self.count_fn.clone();
        self.step(&tick_fn);
        if self.jam || self.ebreak {
            return Clock::HALT;
        }
        cmp::max(1, self.cycles.get())
    }
}

impl fmt::Display for Cpu6510 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x} {:02x} {:02x} {:02x} {}{}{}{}{}{}{}",
            self.regs.a,
            self.regs.x,
            self.regs.y,
            self.regs.sp,
            if (self.regs.p & Flag::Negative as u8) != 0 {
                "N"
            } else {
                "n"
            },
            if (self.regs.p & Flag::Overflow as u8) != 0 {
                "V"
            } else {
                "v"
            },
            if (self.regs.p & Flag::Break as u8) != 0 {
                "B"
            } else {
                "b"
            },
            if (self.regs.p & Flag::Decimal as u8) != 0 {
                "D"
            } else {
                "d"
            },
            if (self.regs.p & Flag::IntDisable as u8) != 0 {
                "I"
            } else {
                "i"
            },
            if (self.regs.p & Flag::Zero as u8) != 0 {
                "Z"
            } else {
                "z"
            },
            if (self.regs.p & Flag::Carry as u8) != 0 {
                "C"
            } else {
                "c"
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::operand::Operand;
    use super::*;
    use crate::util::new_shared;
    use crate::util::Ram;
    use std::cell::Cell;

    struct MockMemory {
        ram: Ram,
    }

    impl Addressable for MockMemory {
        fn read(&self, address: u16) -> u8 {
            self.ram.read(address)
        }

        fn write(&mut self, address: u16, value: u8) {
            self.ram.write(address, value);
        }
    }

    fn setup_cpu() -> Cpu6510 {
        let ba_line = new_shared(Pin::new_high());
        let cpu_io_port = new_shared(IoPort::new(0x00, 0xff));
        let cpu_irq = new_shared(IrqLine::new("irq"));
        let cpu_nmi = new_shared(IrqLine::new("nmi"));
        let mem = new_shared(MockMemory {
            ram: Ram::new(0x10000),
        });
        Cpu6510::new(mem, cpu_io_port, ba_line, cpu_irq, cpu_nmi)
    }

    fn counting_tick_fn() -> (TickFn, Rc<Cell<u64>>) {
        let counter = Rc::new(Cell::new(0u64));
        let counter_clone = counter.clone();
        let tick_fn: TickFn = Rc::new(move || counter_clone.set(counter_clone.get() + 1));
        (tick_fn, counter)
    }

    #[test]
    fn adc_80_16() {
        let mut cpu = setup_cpu();
        cpu.set_a(80);
        cpu.set_flag(Flag::Carry, false);
        cpu.execute(&Instruction::ADC(Operand::Immediate(16)), &make_noop());
        assert_eq!(96, cpu.get_a());
        assert_eq!(false, cpu.test_flag(Flag::Carry));
        assert_eq!(false, cpu.test_flag(Flag::Negative));
        assert_eq!(false, cpu.test_flag(Flag::Overflow));
    }

    #[test]
    fn adc_binary_overflow() {
        let mut cpu = setup_cpu();
        cpu.set_a(0x3f);
        cpu.set_flag(Flag::Carry, true);
        cpu.execute(&Instruction::ADC(Operand::Immediate(0x40)), &make_noop());
        assert_eq!(0x80, cpu.get_a());
        assert_eq!(true, cpu.test_flag(Flag::Negative));
        assert_eq!(true, cpu.test_flag(Flag::Overflow));
        assert_eq!(false, cpu.test_flag(Flag::Zero));
        assert_eq!(false, cpu.test_flag(Flag::Carry));
    }

    #[test]
    fn adc_bcd() {
        let mut cpu = setup_cpu();
        cpu.set_a(0x58);
        cpu.set_flag(Flag::Decimal, true);
        cpu.set_flag(Flag::Carry, false);
        cpu.execute(&Instruction::ADC(Operand::Immediate(0x46)), &make_noop());
        assert_eq!(0x04, cpu.get_a());
        assert_eq!(true, cpu.test_flag(Flag::Carry));
    }

    #[test]
    fn adc_bcd_disabled() {
        let mut cpu = setup_cpu();
        cpu.set_decimal_enable(false);
        cpu.set_a(0x58);
        cpu.set_flag(Flag::Decimal, true);
        cpu.set_flag(Flag::Carry, false);
        cpu.execute(&Instruction::ADC(Operand::Immediate(0x46)), &make_noop());
        assert_eq!(0x9e, cpu.get_a());
    }

    #[test]
    fn sbc_bcd() {
        let mut cpu = setup_cpu();
        cpu.set_a(0x40);
        cpu.set_flag(Flag::Decimal, true);
        cpu.set_flag(Flag::Carry, true);
        cpu.execute(&Instruction::SBC(Operand::Immediate(0x13)), &make_noop());
        assert_eq!(0x27, cpu.get_a());
        assert_eq!(true, cpu.test_flag(Flag::Carry));
    }

    #[test]
    fn branch_cycles() {
        let mut cpu = setup_cpu();
        // bne +2 not taken
        cpu.write(0x1000, 0xd0);
        cpu.write(0x1001, 0x02);
        cpu.set_flag(Flag::Zero, true);
        cpu.set_pc(0x1000);
        let (tick_fn, cycles) = counting_tick_fn();
        Cpu::step(&mut cpu, &tick_fn);
        assert_eq!(2, cycles.get());
        // bne +2 taken, same page
        cpu.set_flag(Flag::Zero, false);
        cpu.set_pc(0x1000);
        let (tick_fn, cycles) = counting_tick_fn();
        Cpu::step(&mut cpu, &tick_fn);
        assert_eq!(3, cycles.get());
        assert_eq!(0x1004, cpu.get_pc());
        // bne crossing a page boundary
        cpu.write(0x10f0, 0xd0);
        cpu.write(0x10f1, 0x7f);
        cpu.set_pc(0x10f0);
        let (tick_fn, cycles) = counting_tick_fn();
        Cpu::step(&mut cpu, &tick_fn);
        assert_eq!(4, cycles.get());
    }

    #[test]
    fn lda_abs_x_page_cross_cycles() {
        let mut cpu = setup_cpu();
        cpu.write(0x1000, 0xbd);
        cpu.write(0x1001, 0xff);
        cpu.write(0x1002, 0x10);
        cpu.set_x(0x01);
        cpu.set_pc(0x1000);
        let (tick_fn, cycles) = counting_tick_fn();
        Cpu::step(&mut cpu, &tick_fn);
        assert_eq!(5, cycles.get());
    }

    #[test]
    fn asl_abs_x_cycles() {
        let mut cpu = setup_cpu();
        cpu.write(0x1000, 0x1e);
        cpu.write(0x1001, 0x00);
        cpu.write(0x1002, 0x20);
        cpu.set_pc(0x1000);
        let (tick_fn, cycles) = counting_tick_fn();
        Cpu::step(&mut cpu, &tick_fn);
        assert_eq!(7, cycles.get());
    }

    #[test]
    fn sta_zp_x_wraps_in_page_zero() {
        let mut cpu = setup_cpu();
        cpu.set_a(0xab);
        cpu.set_x(0xff);
        cpu.execute(&Instruction::STA(Operand::ZeroPageX(0x00)), &make_noop());
        assert_eq!(0xab, cpu.read(0x00ff));
    }

    #[test]
    fn jmp_indirect_page_wrap_bug() {
        let mut cpu = setup_cpu();
        cpu.write(0x10ff, 0x34);
        cpu.write(0x1000, 0x12);
        cpu.write(0x1100, 0x78);
        cpu.execute(&Instruction::JMP(Operand::Indirect(0x10ff)), &make_noop());
        assert_eq!(0x1234, cpu.get_pc());
    }

    #[test]
    fn irq_vectors_through_fffe() {
        let mut cpu = setup_cpu();
        cpu.write(0xfffe, 0x00);
        cpu.write(0xffff, 0x80);
        cpu.write(0x8000, 0xea);
        cpu.set_pc(0x1000);
        cpu.irq_line.borrow_mut().set_low(0, true);
        let (tick_fn, cycles) = counting_tick_fn();
        Cpu::step(&mut cpu, &tick_fn);
        // 7 interrupt cycles plus the 2-cycle nop at the handler
        assert_eq!(9, cycles.get());
        assert_eq!(0x8001, cpu.get_pc());
        assert_eq!(true, cpu.test_flag(Flag::IntDisable));
    }

    #[test]
    fn irq_is_delayed_after_cli() {
        let mut cpu = setup_cpu();
        cpu.set_register(Register::P, Flag::IntDisable as u8);
        cpu.int_disable_latch = true;
        cpu.write(0xfffe, 0x00);
        cpu.write(0xffff, 0x80);
        cpu.write(0x8000, 0xea);
        // cli; inx; inx
        cpu.write(0x1000, 0x58);
        cpu.write(0x1001, 0xe8);
        cpu.write(0x1002, 0xe8);
        cpu.set_pc(0x1000);
        cpu.irq_line.borrow_mut().set_low(0, true);
        Cpu::step(&mut cpu, &make_noop()); // cli
        Cpu::step(&mut cpu, &make_noop()); // inx still runs
        assert_eq!(1, cpu.get_x());
        assert_eq!(0x1002, cpu.get_pc());
        Cpu::step(&mut cpu, &make_noop()); // now the irq is taken
        assert_eq!(0x8001, cpu.get_pc());
    }

    #[test]
    fn kil_latches_jam() {
        let mut cpu = setup_cpu();
        cpu.write(0x1000, 0x02);
        cpu.set_pc(0x1000);
        Cpu::step(&mut cpu, &make_noop());
        assert_eq!(true, cpu.is_jam());
    }

    #[test]
    fn sha_abs_y_stores_masked_value() {
        let mut cpu = setup_cpu();
        cpu.set_a(0xff);
        cpu.set_x(0xff);
        cpu.set_y(0x01);
        cpu.execute(&Instruction::SHA(Operand::AbsoluteY(0x1000)), &make_noop());
        assert_eq!(0x11, cpu.read(0x1001));
    }

    #[test]
    fn breakpoint_without_hook_raises_ebreak() {
        let mut cpu = setup_cpu();
        cpu.write(0x1000, 0xea);
        cpu.set_pc(0x1000);
        cpu.add_breakpoint(0x1000, None, false);
        Cpu::step(&mut cpu, &make_noop());
        assert_eq!(true, cpu.take_ebreak());
        assert_eq!(false, cpu.take_ebreak());
    }

    #[test]
    fn breakpoint_hook_autodeletes() {
        use std::rc::Rc;
        let mut cpu = setup_cpu();
        cpu.write(0x1000, 0xea);
        cpu.write(0x1001, 0xea);
        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        cpu.add_breakpoint(
            0x1000,
            Some(Box::new(move |_| hits_clone.set(hits_clone.get() + 1))),
            true,
        );
        cpu.set_pc(0x1000);
        Cpu::step(&mut cpu, &make_noop());
        cpu.set_pc(0x1000);
        Cpu::step(&mut cpu, &make_noop());
        assert_eq!(1, hits.get());
    }
}
