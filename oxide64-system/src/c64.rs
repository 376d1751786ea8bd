// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::rc::Rc;
use std::sync::{Arc, Mutex};

use log::info;

use oxide64_core::device::joystick;
use oxide64_core::device::{Cartridge, Joystick, Keyboard};
use oxide64_core::mem::ExpansionPort;
use oxide64_core::*;

use super::autostart::Autostart;
use super::Config;

// Design:
//   C64 represents the machine itself and all of its components. Connections
//   between different components are managed as component dependencies and
//   wired up here: the PLA observers on the cpu port and the expansion I/O
//   lines, the vic bank observer on cia 2 port a, and the clock schedule.
//   The vic is registered ahead of the cpu so bus stealing takes effect in
//   the same cycle it is asserted.

/// Start of the basic idle loop; the autostart trap lives here.
const BASIC_READY: u16 = 0xa474;
/// Keyboard buffer and its fill count.
const KEYBOARD_BUFFER: u16 = 0x0277;
const KEYBOARD_BUFFER_LEN: u16 = 0x00c6;

/// Keyboard events are drained roughly once per frame so the rom scanner can
/// observe every press/release pair.
const KEYBOARD_DRAIN_CYCLES: u64 = 20_000;

struct ChipTicker(Shared<dyn Chip>);

impl Tickable for ChipTicker {
    fn tick(&mut self, clock: &Clock) -> u64 {
        self.0.borrow_mut().tick(clock)
    }
}

struct CpuTicker(Shared<dyn Cpu>);

impl Tickable for CpuTicker {
    fn tick(&mut self, clock: &Clock) -> u64 {
        self.0.borrow_mut().tick(clock)
    }
}

struct KeyboardTicker(Shared<Keyboard>);

impl Tickable for KeyboardTicker {
    fn tick(&mut self, _clock: &Clock) -> u64 {
        let mut keyboard = self.0.borrow_mut();
        if keyboard.has_events() {
            keyboard.drain_event();
        }
        KEYBOARD_DRAIN_CYCLES
    }
}

pub struct C64 {
    // Dependencies
    config: Rc<Config>,
    // Chipset
    cpu: Shared<dyn Cpu>,
    cia_1: Shared<dyn Chip>,
    cia_2: Shared<dyn Chip>,
    sid: Shared<dyn Chip>,
    vic: Shared<dyn Chip>,
    // Memory
    color_ram: Shared<ColorRam>,
    expansion_port: Shared<ExpansionPort>,
    ram: Shared<Ram>,
    // Peripherals
    joystick_1: Option<Joystick>,
    joystick_2: Option<Joystick>,
    keyboard: Shared<Keyboard>,
    keyboard_matrix: Arc<Mutex<[u8; 16]>>,
    light_pen_pin: Shared<Pin>,
    // Buffers
    video_output: Shared<dyn VideoOutput>,
    sound_output: Arc<dyn SoundOutput>,
    // Runtime State
    autostart: Option<Autostart>,
    clock: Rc<Clock>,
}

impl C64 {
    pub fn build(
        config: Rc<Config>,
        factory: &dyn ChipFactory,
        video_output: Shared<dyn VideoOutput>,
        sound_output: Arc<dyn SoundOutput>,
    ) -> C64 {
        info!(target: "c64", "Initializing system");
        let clock = factory.new_clock(config.model.cpu_freq, config.pace_factor);
        let joystick_1_state = new_shared_cell(0u8);
        let joystick_2_state = new_shared_cell(0u8);
        let keyboard_matrix = Arc::new(Mutex::new([0xff; 16]));
        let vic_base_address = new_shared_cell(0u16);

        // I/O Lines
        let ba_line = new_shared(Pin::new_high());
        let cpu_io_port = new_shared(IoPort::new(0x00, 0xff));
        let cia_1_flag_pin = new_shared(Pin::new_low());
        let cia_1_port_a = new_shared(IoPort::new(0x00, 0xff));
        let cia_1_port_b = new_shared(IoPort::new(0x00, 0xff));
        let cia_2_flag_pin = new_shared(Pin::new_low());
        let cia_2_port_a = new_shared(IoPort::new(0x00, 0xff));
        let cia_2_port_b = new_shared(IoPort::new(0x00, 0xff));
        let exp_io_line = new_shared(IoPort::new(0xff, 0xff));
        let light_pen_pin = new_shared(Pin::new_low());
        let irq_line = new_shared(IrqLine::new("irq"));
        let nmi_line = new_shared(IrqLine::new("nmi"));

        // Memory
        let color_ram = new_shared(ColorRam::new(config.model.color_ram));
        let ram = factory.new_ram(config.model.memory_size);
        let rom_basic = factory.new_rom(config.roms.basic.as_slice(), 0xa000);
        let rom_charset = factory.new_rom(config.roms.charset.as_slice(), 0);
        let rom_kernal = factory.new_rom(config.roms.kernal.as_slice(), 0xe000);

        // Chipset
        let cia_1 = factory.new_cia_1(
            joystick_1_state.clone(),
            joystick_2_state.clone(),
            keyboard_matrix.clone(),
            cia_1_port_a.clone(),
            cia_1_port_b.clone(),
            cia_1_flag_pin.clone(),
            irq_line.clone(),
        );
        let cia_2 = factory.new_cia_2(
            cia_2_port_a.clone(),
            cia_2_port_b.clone(),
            cia_2_flag_pin.clone(),
            nmi_line.clone(),
        );
        let sid = factory.new_sid(
            config.model.sid_model,
            config.model.cpu_freq,
            sound_output.clone(),
        );
        let vic = factory.new_vic(
            config.model.vic_model,
            color_ram.clone(),
            ram.clone(),
            rom_charset.clone(),
            vic_base_address.clone(),
            video_output.clone(),
            light_pen_pin.clone(),
            ba_line.clone(),
            irq_line.clone(),
        );

        // Memory Controller and Processor
        let expansion_port = new_shared(ExpansionPort::new(exp_io_line.clone()));
        let mmu: Shared<dyn Mmu> = new_shared(oxide64_core::mem::Pla::new());
        let mem = factory.new_memory(
            mmu.clone(),
            cia_1.clone(),
            cia_2.clone(),
            color_ram.clone(),
            expansion_port.clone(),
            ram.clone(),
            rom_basic,
            rom_charset,
            rom_kernal,
            sid.clone(),
            vic.clone(),
        );
        let cpu = factory.new_cpu(
            mem,
            cpu_io_port.clone(),
            ba_line.clone(),
            irq_line.clone(),
            nmi_line.clone(),
        );

        // Peripherals
        let joystick_1 = if config.joystick.joystick_1 != joystick::Mode::None {
            Some(Joystick::new(
                config.joystick.joystick_1,
                config.joystick.axis_motion_threshold,
                joystick_1_state,
            ))
        } else {
            None
        };
        let joystick_2 = if config.joystick.joystick_2 != joystick::Mode::None {
            Some(Joystick::new(
                config.joystick.joystick_2,
                config.joystick.axis_motion_threshold,
                joystick_2_state,
            ))
        } else {
            None
        };
        let keyboard = new_shared(Keyboard::new(keyboard_matrix.clone()));

        // Observers
        let exp_io_line_clone = exp_io_line.clone();
        let mmu_clone = mmu.clone();
        cpu_io_port
            .borrow_mut()
            .set_observer(Box::new(move |cpu_port| {
                let expansion_port_io = exp_io_line_clone.borrow().get_value();
                let mode = cpu_port & 0x07 | expansion_port_io & 0x18;
                mmu_clone.borrow_mut().switch_banks(mode);
            }));
        let cpu_io_port_clone = cpu_io_port;
        let mmu_clone = mmu;
        exp_io_line
            .borrow_mut()
            .set_observer(Box::new(move |expansion_port_io| {
                let cpu_port_io = cpu_io_port_clone.borrow().get_value();
                let mode = cpu_port_io & 0x07 | expansion_port_io & 0x18;
                mmu_clone.borrow_mut().switch_banks(mode);
            }));
        let vic_base_address_clone = vic_base_address;
        cia_2_port_a
            .borrow_mut()
            .set_observer(Box::new(move |value| {
                let base_address = u16::from(!value & 0x03) << 14;
                vic_base_address_clone.set(base_address);
            }));

        // Clock schedule; the vic must run ahead of the cpu so bus stealing
        // is visible within the same cycle.
        clock.register(new_shared(ChipTicker(vic.clone())));
        clock.register(new_shared(ChipTicker(cia_1.clone())));
        clock.register(new_shared(ChipTicker(cia_2.clone())));
        clock.register(new_shared(CpuTicker(cpu.clone())));
        clock.register(new_shared(ChipTicker(sid.clone())));
        clock.register(new_shared(KeyboardTicker(keyboard.clone())));

        C64 {
            config,
            cpu,
            cia_1,
            cia_2,
            sid,
            vic,
            color_ram,
            expansion_port,
            ram,
            joystick_1,
            joystick_2,
            keyboard,
            keyboard_matrix,
            light_pen_pin,
            video_output,
            sound_output,
            autostart: None,
            clock,
        }
    }

    pub fn get_clock(&self) -> Rc<Clock> {
        self.clock.clone()
    }

    pub fn get_clock_control(&self) -> Arc<ClockControl> {
        self.clock.get_control()
    }

    pub fn get_config(&self) -> &Config {
        &self.config
    }

    pub fn get_cpu(&self) -> Shared<dyn Cpu> {
        self.cpu.clone()
    }

    pub fn get_cia_1(&self) -> Shared<dyn Chip> {
        self.cia_1.clone()
    }

    pub fn get_cia_2(&self) -> Shared<dyn Chip> {
        self.cia_2.clone()
    }

    pub fn get_cycles(&self) -> u64 {
        self.clock.get()
    }

    pub fn get_joystick_1(&mut self) -> &mut Option<Joystick> {
        &mut self.joystick_1
    }

    pub fn get_joystick_2(&mut self) -> &mut Option<Joystick> {
        &mut self.joystick_2
    }

    pub fn get_keyboard(&self) -> Shared<Keyboard> {
        self.keyboard.clone()
    }

    pub fn get_keyboard_matrix(&self) -> Arc<Mutex<[u8; 16]>> {
        self.keyboard_matrix.clone()
    }

    pub fn get_sid(&self) -> Shared<dyn Chip> {
        self.sid.clone()
    }

    pub fn get_video_output(&self) -> Shared<dyn VideoOutput> {
        self.video_output.clone()
    }

    pub fn get_sound_output(&self) -> Arc<dyn SoundOutput> {
        self.sound_output.clone()
    }

    pub fn get_vic(&self) -> Shared<dyn Chip> {
        self.vic.clone()
    }

    pub fn is_cpu_jam(&self) -> bool {
        self.cpu.borrow().is_jam()
    }

    pub fn set_autostart(&mut self, autostart: Option<Autostart>) {
        if autostart.is_some() {
            self.cpu.borrow_mut().add_breakpoint(BASIC_READY, None, true);
        }
        self.autostart = autostart;
    }

    /// Drive the light pen input; the vic latches the raster position on the
    /// rising edge.
    pub fn set_light_pen(&mut self, active: bool) {
        self.light_pen_pin.borrow_mut().set_active(active);
    }

    /// Swap which joystick feeds which control port.
    pub fn swap_joysticks(&mut self) {
        std::mem::swap(&mut self.joystick_1, &mut self.joystick_2);
    }

    pub fn load(&mut self, data: &[u8], offset: u16) {
        let mut ram = self.ram.borrow_mut();
        let mut address = offset;
        for byte in data {
            ram.write(address, *byte);
            address = address.wrapping_add(1);
        }
    }

    /// Load a basic program and patch the interpreter pointers so RUN finds
    /// it.
    pub fn load_basic_program(&mut self, data: &[u8], offset: u16) {
        self.load(data, offset);
        let end = offset.wrapping_add(data.len() as u16);
        let mut ram = self.ram.borrow_mut();
        ram.write(0x2b, (offset & 0xff) as u8);
        ram.write(0x2c, (offset >> 8) as u8);
        for pointer in &[0x2du16, 0x2f, 0x31, 0xae] {
            ram.write(*pointer, (end & 0xff) as u8);
            ram.write(pointer + 1, (end >> 8) as u8);
        }
    }

    /// Type RUN through the kernal keyboard buffer.
    pub fn type_run(&mut self) {
        let mut ram = self.ram.borrow_mut();
        for (i, byte) in b"RUN\r".iter().enumerate() {
            ram.write(KEYBOARD_BUFFER + i as u16, *byte);
        }
        ram.write(KEYBOARD_BUFFER_LEN, 4);
    }

    pub fn reset(&mut self, hard: bool) {
        info!(target: "c64", "Resetting system");
        self.clock.reset();
        // Memory
        if hard {
            self.ram.borrow_mut().fill(0x00);
            self.color_ram.borrow_mut().fill(0x00);
        }
        // Chipset
        self.cpu.borrow_mut().reset();
        self.cia_1.borrow_mut().reset();
        self.cia_2.borrow_mut().reset();
        self.sid.borrow_mut().reset();
        self.vic.borrow_mut().reset();
        // I/O
        self.expansion_port.borrow_mut().reset();
        // Peripherals
        if let Some(ref mut joystick) = self.joystick_1 {
            joystick.reset();
        }
        if let Some(ref mut joystick) = self.joystick_2 {
            joystick.reset();
        }
        self.keyboard.borrow_mut().reset();
        self.sound_output.reset();
    }

    /// Run the machine until it halts (stop request, cpu jam or an external
    /// break). Autostart resumes transparently.
    pub fn run(&mut self) {
        loop {
            self.clock.run();
            if !self.process_break() {
                break;
            }
        }
    }

    /// Handle a halted clock: consumes an external break and fires a pending
    /// autostart. Returns true when execution should resume.
    pub fn process_break(&mut self) -> bool {
        if self.cpu.borrow_mut().take_ebreak() {
            let autostart = self.autostart.take();
            if let Some(mut autostart) = autostart {
                autostart.execute(self);
                return true;
            }
        }
        false
    }

    /// Execute one clock round.
    pub fn step(&mut self) -> bool {
        self.clock.step()
    }

    // -- Peripherals Ops

    pub fn attach_cartridge(&mut self, cartridge: Cartridge) {
        self.expansion_port.borrow_mut().attach(cartridge);
    }

    pub fn detach_cartridge(&mut self) {
        self.expansion_port.borrow_mut().detach();
        self.reset(false);
    }
}

#[cfg(test)]
mod tests {
    use super::super::{C64Factory, SoundBufferPool};
    use super::*;

    struct NullVideo;

    impl VideoOutput for NullVideo {
        fn get_dimension(&self) -> (usize, usize) {
            (0, 0)
        }
        fn render_line(&mut self, _line: usize, _pixels: &[u32]) {}
        fn reset(&mut self) {}
    }

    fn build_c64() -> C64 {
        let mut basic = vec![0x00; 0x2000];
        basic[0] = 0x94;
        let charset = vec![0x11; 0x1000];
        let kernal = vec![0x22; 0x2000];
        let mut config = Config::new_with_roms(
            SystemModel::from("pal"),
            &basic,
            &charset,
            &kernal,
        );
        config.pace_factor = 0.0;
        let config = Rc::new(config);
        let factory = C64Factory::new(config.clone());
        let video_output: Shared<dyn VideoOutput> = new_shared(NullVideo {});
        let sound_output = Arc::new(SoundBufferPool::new(4, 882));
        C64::build(config, &factory, video_output, sound_output)
    }

    #[test]
    fn verify_mem_layout() {
        let mut c64 = build_c64();
        c64.reset(false);
        let cpu = c64.get_cpu();
        assert_eq!(0x94, cpu.borrow().read(0xa000));
        assert_eq!(0x22, cpu.borrow().read(0xe000));
    }

    #[test]
    fn ram_visible_after_bank_switch(){
        let mut c64 = build_c64();
        c64.reset(false);
        c64.load(&[0x55], 0xa000);
        let cpu = c64.get_cpu();
        assert_eq!(0x94, cpu.borrow().read(0xa000));
        // loram off maps ram into the basic window
        cpu.borrow_mut().write(0x0001, 0x36 & !0x01);
        assert_eq!(0x55, cpu.borrow().read(0xa000));
    }

    #[test]
    fn load_basic_program_patches_pointers() {
        let mut c64 = build_c64();
        c64.reset(false);
        c64.load_basic_program(&[0x01, 0x02, 0x03, 0x04], 0x0801);
        let cpu = c64.get_cpu();
        assert_eq!(0x01, cpu.borrow().read(0x0801));
        assert_eq!(0x01, cpu.borrow().read(0x2b));
        assert_eq!(0x08, cpu.borrow().read(0x2c));
        assert_eq!(0x05, cpu.borrow().read(0x2d));
        assert_eq!(0x08, cpu.borrow().read(0x2e));
    }
}
