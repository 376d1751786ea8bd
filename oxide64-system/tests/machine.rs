// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::rc::Rc;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use oxide64_core::{new_shared, Cpu, Shared, SystemModel, VideoOutput};
use oxide64_system::{
    Autostart, C64Factory, Config, FrameBuffer, Image, Mode, SoundBufferPool, C64,
};

const FRAME_CYCLES: u64 = 19656;

fn build_c64() -> (C64, Arc<SoundBufferPool>) {
    let mut config = Config::new(SystemModel::from("pal"));
    config.pace_factor = 0.0;
    let config = Rc::new(config);
    let factory = C64Factory::new(config.clone());
    let (width, height) = config.model.frame_buffer_size;
    let video_output: Shared<dyn VideoOutput> = new_shared(FrameBuffer::new(width, height));
    let sound_output = Arc::new(SoundBufferPool::new(4, 882));
    let c64 = C64::build(
        config,
        &factory,
        video_output,
        sound_output.clone(),
    );
    (c64, sound_output)
}

/// Map ram into the kernal window while keeping I/O visible, so test
/// programs can own the interrupt vectors.
fn map_ram_with_io(program: &mut Vec<u8>) {
    // lda #$35, sta $01
    program.extend_from_slice(&[0xa9, 0x35, 0x85, 0x01]);
}

fn run_until<F: FnMut(&mut C64) -> bool>(c64: &mut C64, limit: u64, mut done: F) -> bool {
    for _ in 0..limit {
        c64.step();
        if done(c64) {
            return true;
        }
    }
    false
}

#[test]
fn frame_cycle_budget_is_exact() {
    let (mut c64, _sound) = build_c64();
    c64.reset(false);
    let clock = c64.get_clock();
    let mut sync_points = Vec::new();
    for _ in 0..(FRAME_CYCLES * 3 + 100) {
        c64.step();
        let cycles = clock.take_sync_request();
        if cycles > 0 {
            assert_eq!(FRAME_CYCLES, cycles);
            sync_points.push(clock.get());
        }
    }
    assert!(sync_points.len() >= 2);
    for pair in sync_points.windows(2) {
        assert_eq!(FRAME_CYCLES, pair[1] - pair[0]);
    }
}

#[test]
fn raster_interrupt_enters_handler_via_fffe() {
    let (mut c64, _sound) = build_c64();
    c64.reset(false);
    let mut program = vec![0x78]; // sei
    map_ram_with_io(&mut program);
    program.extend_from_slice(&[
        0xa9, 0x64, // lda #$64
        0x8d, 0x12, 0xd0, // sta $d012
        0xad, 0x11, 0xd0, // lda $d011
        0x29, 0x7f, // and #$7f
        0x8d, 0x11, 0xd0, // sta $d011
        0xa9, 0x01, // lda #$01
        0x8d, 0x1a, 0xd0, // sta $d01a
        0xa9, 0x0f, // lda #$0f
        0x8d, 0x19, 0xd0, // sta $d019 (drop stale flags)
        0x58, // cli
        0x4c, 0x1d, 0x40, // jmp *
    ]);
    c64.load(&program, 0x4000);
    // handler: record the raster line, acknowledge, leave a marker
    c64.load(
        &[
            0xad, 0x12, 0xd0, // lda $d012
            0x85, 0x03, // sta $03
            0xa9, 0x0f, // lda #$0f
            0x8d, 0x19, 0xd0, // sta $d019
            0xa9, 0x01, // lda #$01
            0x85, 0x02, // sta $02
            0x40, // rti
        ],
        0x9000,
    );
    c64.load(&[0x00, 0x90], 0xfffe);
    let cpu = c64.get_cpu();
    cpu.borrow_mut().set_pc(0x4000);
    let hit = run_until(&mut c64, 2 * FRAME_CYCLES, |c64| {
        c64.get_cpu().borrow().read(0x0002) == 0x01
    });
    assert!(hit, "raster interrupt handler did not run");
    let line = cpu.borrow().read(0x0003);
    assert!(
        line == 100 || line == 101,
        "handler entered at raster line {}",
        line
    );
}

#[test]
fn cia_timer_one_shot_fires_after_4096_cycles() {
    let (mut c64, _sound) = build_c64();
    c64.reset(false);
    let mut program = vec![0x78]; // sei
    map_ram_with_io(&mut program);
    program.extend_from_slice(&[
        0xa9, 0x81, // lda #$81
        0x8d, 0x0d, 0xdc, // sta $dc0d (enable timer a irq)
        0xa9, 0x00, // lda #$00
        0x8d, 0x04, 0xdc, // sta $dc04
        0xa9, 0x10, // lda #$10
        0x8d, 0x05, 0xdc, // sta $dc05 (latch $1000)
        0xa9, 0x09, // lda #$09
        0x8d, 0x0e, 0xdc, // sta $dc0e (one-shot start)
        0x58, // cli
        0x4c, 0x1a, 0x40, // jmp *
    ]);
    c64.load(&program, 0x4000);
    c64.load(
        &[
            0xad, 0x0d, 0xdc, // lda $dc0d (acknowledge)
            0xa9, 0x01, // lda #$01
            0x85, 0x02, // sta $02
            0x40, // rti
        ],
        0x9000,
    );
    c64.load(&[0x00, 0x90], 0xfffe);
    let cpu = c64.get_cpu();
    cpu.borrow_mut().set_pc(0x4000);
    let hit = run_until(&mut c64, 6000, |c64| {
        c64.get_cpu().borrow().read(0x0002) == 0x01
    });
    assert!(hit, "timer interrupt handler did not run");
    // setup takes ~35 cycles, the counter 4096, the service a couple dozen
    let cycles = c64.get_cycles();
    assert!(cycles > 4096, "fired too early: {}", cycles);
    assert!(cycles < 4096 + 400, "fired too late: {}", cycles);
}

#[test]
fn jmp_indirect_wraps_inside_page() {
    let (mut c64, _sound) = build_c64();
    c64.reset(false);
    c64.load(&[0x34], 0x10ff);
    c64.load(&[0x12], 0x1000);
    c64.load(&[0x78], 0x1100);
    c64.load(&[0x6c, 0xff, 0x10], 0x4000);
    let cpu = c64.get_cpu();
    cpu.borrow_mut().set_pc(0x4000);
    c64.step();
    assert_eq!(0x1234, cpu.borrow().get_pc());
}

#[test]
fn sid_produces_audio_blocks() {
    let (mut c64, sound) = build_c64();
    c64.reset(false);
    c64.load(&[0x4c, 0x00, 0x40], 0x4000);
    let cpu = c64.get_cpu();
    cpu.borrow_mut().set_pc(0x4000);
    {
        let mut cpu = cpu.borrow_mut();
        cpu.write(0xd418, 0x0f); // volume
        cpu.write(0xd405, 0x09); // ad
        cpu.write(0xd406, 0xf0); // sr
        cpu.write(0xd401, 0x1c); // freq hi
        cpu.write(0xd400, 0xd6); // freq lo
        cpu.write(0xd404, 0x21); // sawtooth + gate
    }
    for _ in 0..25_000 {
        c64.step();
    }
    let block = sound.pop_playing().expect("an audio block was dispatched");
    assert_eq!(882, block.len());
    let peak = block.iter().fold(0i32, |acc, s| acc.max(i32::from(*s).abs()));
    assert!(peak > 1000, "audio block is silent");
}

#[test]
fn autostart_mounts_image_and_types_run() {
    struct TestImage;

    impl Image for TestImage {
        fn mount(&mut self, c64: &mut C64) {
            c64.load_basic_program(&[0xde, 0xad], 0x0801);
        }
        fn unmount(&mut self, _c64: &mut C64) {}
    }

    let (mut c64, _sound) = build_c64();
    c64.reset(false);
    c64.set_autostart(Some(Autostart::new(Mode::Run, Box::new(TestImage))));
    let cpu = c64.get_cpu();
    cpu.borrow_mut().set_pc(0xa474);
    // the trap halts the clock, the machine resumes through process_break
    while !c64.step() {}
    assert!(c64.process_break());
    assert_eq!(0xde, cpu.borrow().read(0x0801));
    assert_eq!(0xad, cpu.borrow().read(0x0802));
    // RUN\r sits in the keyboard buffer
    assert_eq!(0x52, cpu.borrow().read(0x0277));
    assert_eq!(0x55, cpu.borrow().read(0x0278));
    assert_eq!(0x4e, cpu.borrow().read(0x0279));
    assert_eq!(0x0d, cpu.borrow().read(0x027a));
    assert_eq!(0x04, cpu.borrow().read(0x00c6));
}

#[test]
fn pause_and_stop_coordinate_across_threads() {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let (mut c64, _sound) = build_c64();
        c64.reset(false);
        c64.load(&[0x4c, 0x00, 0x40], 0x4000);
        c64.get_cpu().borrow_mut().set_pc(0x4000);
        tx.send(c64.get_clock_control()).expect("send control");
        c64.run();
    });
    let control = rx.recv().expect("clock control");
    control.pause(true);
    while !control.is_paused() {
        thread::sleep(Duration::from_millis(1));
    }
    control.pause(false);
    control.stop();
    handle.join().expect("emulation thread");
}

#[test]
fn hard_reset_clears_memory() {
    let (mut c64, _sound) = build_c64();
    c64.reset(false);
    c64.load(&[0xaa], 0x4000);
    c64.reset(true);
    assert_eq!(0x00, c64.get_cpu().borrow().read(0x4000));
}
