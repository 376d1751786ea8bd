// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use oxide64_core::cpu::Cpu6510;
use oxide64_core::{Addressable, Cpu, IoPort, IrqLine, Pin, Ram, TickFn};

struct MockMemory {
    ram: Ram,
}

impl MockMemory {
    pub fn new(ram: Ram) -> Self {
        MockMemory { ram }
    }
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
    let ba_line = Rc::new(RefCell::new(Pin::new_high()));
    let cpu_io_port = Rc::new(RefCell::new(IoPort::new(0x00, 0xff)));
    let cpu_irq = Rc::new(RefCell::new(IrqLine::new("irq")));
    let cpu_nmi = Rc::new(RefCell::new(IrqLine::new("nmi")));
    let mem = Rc::new(RefCell::new(MockMemory::new(Ram::new(0x10000))));
    Cpu6510::new(mem, cpu_io_port, ba_line, cpu_irq, cpu_nmi)
}

// Based on 65xx Processor Data from http://www.romhacking.net/documents/318/
//
// Index registers are zero so no indexed page crossings occur; branch
// entries assume an all-clear status byte, which takes bpl/bvc/bcc/bne
// (4 cycles here: the $ab displacement lands on the previous page) and
// skips bmi/bvs/bcs/beq (2 cycles). KIL opcodes are marked 0 and skipped.

#[cfg_attr(rustfmt, rustfmt_skip)]
const OPCODE_TIMING: [u8; 256] = [
    7, 6, 0, 8, 3, 3, 5, 5, 3, 2, 2, 2, 4, 4, 6, 6, // 0x
    4, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 1x
    6, 6, 0, 8, 3, 3, 5, 5, 4, 2, 2, 2, 4, 4, 6, 6, // 2x
    2, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 3x
    6, 6, 0, 8, 3, 3, 5, 5, 3, 2, 2, 2, 3, 4, 6, 6, // 4x
    4, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 5x
    6, 6, 0, 8, 3, 3, 5, 5, 4, 2, 2, 2, 5, 4, 6, 6, // 6x
    2, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 7x
    2, 6, 2, 6, 3, 3, 3, 3, 2, 2, 2, 2, 4, 4, 4, 4, // 8x
    4, 6, 0, 6, 4, 4, 4, 4, 2, 5, 2, 5, 5, 5, 5, 5, // 9x
    2, 6, 2, 6, 3, 3, 3, 3, 2, 2, 2, 2, 4, 4, 4, 4, // Ax
    2, 5, 0, 5, 4, 4, 4, 4, 2, 4, 2, 4, 4, 4, 4, 4, // Bx
    2, 6, 2, 8, 3, 3, 5, 5, 2, 2, 2, 2, 4, 4, 6, 6, // Cx
    4, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // Dx
    2, 6, 2, 8, 3, 3, 5, 5, 2, 2, 2, 2, 4, 4, 6, 6, // Ex
    2, 5, 0, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // Fx
];

#[test]
fn opcode_timing() {
    for opcode in 0..256usize {
        let expected = OPCODE_TIMING[opcode];
        if expected == 0 {
            continue;
        }
        let mut cpu = setup_cpu();
        cpu.write(0x1000, opcode as u8);
        cpu.write(0x1001, 0xab);
        cpu.write(0x1002, 0x0c);
        cpu.set_pc(0x1000);
        let counter = Rc::new(Cell::new(0u8));
        let tick_fn: TickFn = {
            let counter = counter.clone();
            Rc::new(move || counter.set(counter.get() + 1))
        };
        cpu.step(&tick_fn);
        assert_eq!(
            expected,
            counter.get(),
            "opcode 0x{:02x} timing mismatch",
            opcode
        );
    }
}
