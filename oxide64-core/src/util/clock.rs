// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::factory::Tickable;
use crate::util::Shared;

// Design:
//   The clock owns the schedule of every clocked component. One round visits
//   each registered tickable in registration order and invokes it when its due
//   cycle has been reached; the value a tickable returns is the number of base
//   cycles until it wants to run again. After a round the virtual cycle
//   counter advances by one. Registration order doubles as the intra-cycle
//   ordering guarantee, so the video chip must be registered ahead of the cpu
//   for bus stealing to be visible in the same cycle.
//
//   Wall-clock pacing is driven by the video chip through sync(): at the end
//   of a frame it reports the frame's cycle count and the run loop sleeps
//   until real time catches up with virtual time. A pace factor of 0.0
//   disables pacing altogether, which is what cpu test harnesses want.

const PAUSE_POLL: Duration = Duration::from_millis(10);
const SYNC_SLACK: Duration = Duration::from_millis(100);

struct Slot {
    tickable: Shared<dyn Tickable>,
    due: Cell<u64>,
}

/// Cross-thread handle for pause/stop coordination. The ui thread flips the
/// flags; the emulation thread observes them at the top of each round.
pub struct ClockControl {
    pause: AtomicBool,
    paused: AtomicBool,
    stop: AtomicBool,
}

impl ClockControl {
    fn new() -> Self {
        Self {
            pause: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        }
    }

    pub fn pause(&self, paused: bool) {
        self.pause.store(paused, Ordering::SeqCst);
    }

    /// True once the emulation thread has observed the pause request and
    /// reached its idle point.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

pub struct Clock {
    // Configuration
    freq: u32,
    pace_factor: Cell<f64>,
    // Schedule
    slots: RefCell<Vec<Slot>>,
    cycles: Cell<u64>,
    // Pacing
    sync_request: Cell<u64>,
    deadline: Cell<Option<Instant>>,
    // Control
    control: Arc<ClockControl>,
}

impl Clock {
    /// Sentinel returned by a tickable to stop the machine.
    pub const HALT: u64 = u64::MAX;

    pub fn new(freq: u32, pace_factor: f64) -> Self {
        Self {
            freq,
            pace_factor: Cell::new(pace_factor),
            slots: RefCell::new(Vec::new()),
            cycles: Cell::new(0),
            sync_request: Cell::new(0),
            deadline: Cell::new(None),
            control: Arc::new(ClockControl::new()),
        }
    }

    pub fn get_freq(&self) -> u32 {
        self.freq
    }

    pub fn get_pace_factor(&self) -> f64 {
        self.pace_factor.get()
    }

    pub fn set_pace_factor(&self, pace_factor: f64) {
        self.pace_factor.set(pace_factor);
    }

    pub fn get_control(&self) -> Arc<ClockControl> {
        self.control.clone()
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.cycles.get()
    }

    #[inline]
    pub fn elapsed(&self, prev: u64) -> u64 {
        self.cycles.get() - prev
    }

    pub fn register(&self, tickable: Shared<dyn Tickable>) {
        self.slots.borrow_mut().push(Slot {
            tickable,
            due: Cell::new(0),
        });
    }

    pub fn reset(&self) {
        self.cycles.set(0);
        self.sync_request.set(0);
        self.deadline.set(None);
        for slot in self.slots.borrow().iter() {
            slot.due.set(0);
        }
    }

    /// Execute one round of the schedule. Returns true when any tickable
    /// requested a halt.
    pub fn step(&self) -> bool {
        let mut halted = false;
        let now = self.cycles.get();
        for slot in self.slots.borrow().iter() {
            if slot.due.get() <= now {
                let cycles = slot.tickable.borrow_mut().tick(self);
                if cycles == Self::HALT {
                    halted = true;
                } else {
                    slot.due.set(now + cycles);
                }
            }
        }
        self.cycles.set(now.wrapping_add(1));
        halted
    }

    /// Run rounds until a tickable halts the machine or stop is requested.
    pub fn run(&self) {
        info!(target: "clock", "Running at {} Hz, pace {}", self.freq, self.pace_factor.get());
        loop {
            if self.control.stop.load(Ordering::SeqCst) {
                break;
            }
            if self.control.pause.load(Ordering::SeqCst) {
                self.control.paused.store(true, Ordering::SeqCst);
                thread::sleep(PAUSE_POLL);
                continue;
            }
            self.control.paused.store(false, Ordering::SeqCst);
            if self.step() {
                info!(target: "clock", "Halted at cycle {}", self.cycles.get());
                break;
            }
            self.process_sync();
        }
    }

    /// Request wall-clock pacing for the given number of elapsed cycles.
    /// Called by the video chip when a frame completes.
    pub fn sync(&self, cycles: u64) {
        self.sync_request.set(cycles);
    }

    /// Consume a pending sync request. The run loop turns it into a sleep;
    /// a stepping harness can use it to observe frame boundaries.
    pub fn take_sync_request(&self) -> u64 {
        self.sync_request.replace(0)
    }

    fn process_sync(&self) {
        let cycles = self.take_sync_request();
        if cycles == 0 {
            return;
        }
        let pace = self.pace_factor.get();
        if pace == 0.0 {
            return;
        }
        let span = Duration::from_secs_f64(cycles as f64 * pace / f64::from(self.freq));
        let now = Instant::now();
        let deadline = match self.deadline.get() {
            Some(last) => last + span,
            None => now + span,
        };
        if now < deadline {
            thread::sleep(deadline - now);
            self.deadline.set(Some(deadline));
        } else if now > deadline + SYNC_SLACK {
            // Catch up instead of accumulating lag.
            debug!(target: "clock", "Sync lag {:?}, rebasing", now - deadline);
            self.deadline.set(Some(now));
        } else {
            self.deadline.set(Some(deadline));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::new_shared;

    struct Counter {
        ticks: u64,
        period: u64,
        halt_at: Option<u64>,
    }

    impl Tickable for Counter {
        fn tick(&mut self, _clock: &Clock) -> u64 {
            self.ticks += 1;
            if self.halt_at == Some(self.ticks) {
                Clock::HALT
            } else {
                self.period
            }
        }
    }

    #[test]
    fn round_respects_due_cycles() {
        let clock = Clock::new(985_248, 0.0);
        let fast = new_shared(Counter {
            ticks: 0,
            period: 1,
            halt_at: None,
        });
        let slow = new_shared(Counter {
            ticks: 0,
            period: 4,
            halt_at: None,
        });
        clock.register(fast.clone());
        clock.register(slow.clone());
        for _ in 0..8 {
            clock.step();
        }
        assert_eq!(8, fast.borrow().ticks);
        assert_eq!(2, slow.borrow().ticks);
    }

    #[test]
    fn halt_stops_run_loop() {
        let clock = Clock::new(985_248, 0.0);
        let counter = new_shared(Counter {
            ticks: 0,
            period: 1,
            halt_at: Some(10),
        });
        clock.register(counter.clone());
        clock.run();
        assert_eq!(10, counter.borrow().ticks);
    }

    #[test]
    fn registration_order_is_tick_order() {
        let clock = Clock::new(985_248, 0.0);
        let first = new_shared(Counter {
            ticks: 0,
            period: 1,
            halt_at: None,
        });
        let second = new_shared(Counter {
            ticks: 0,
            period: 1000,
            halt_at: None,
        });
        clock.register(first.clone());
        clock.register(second.clone());
        clock.step();
        assert_eq!(1, first.borrow().ticks);
        assert_eq!(1, second.borrow().ticks);
    }
}
