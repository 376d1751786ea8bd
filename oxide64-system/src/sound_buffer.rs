// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use log::warn;
use oxide64_core::SoundOutput;

// Dispatchable audio buffer pool. The sid borrows a free block, fills it and
// dispatches it into the playing queue; the consumer thread drains playing at
// the sample rate and recycles exhausted blocks. When no block is free the
// producer waits, so an underrunning consumer is preferred over tearing.

const BORROW_POLL: Duration = Duration::from_millis(10);

pub struct SoundBufferPool {
    free: Mutex<VecDeque<Vec<i16>>>,
    playing: Mutex<VecDeque<Vec<i16>>>,
    stop: AtomicBool,
}

impl SoundBufferPool {
    pub fn new(buffer_count: usize, buffer_size: usize) -> Self {
        let mut free = VecDeque::with_capacity(buffer_count);
        for _ in 0..buffer_count {
            free.push_back(Vec::with_capacity(buffer_size));
        }
        Self {
            free: Mutex::new(free),
            playing: Mutex::new(VecDeque::new()),
            stop: AtomicBool::new(false),
        }
    }

    /// Consumer side: next block queued for playback.
    pub fn pop_playing(&self) -> Option<Vec<i16>> {
        match self.playing.lock() {
            Ok(mut playing) => playing.pop_front(),
            Err(_) => None,
        }
    }

    /// Consumer side: hand an exhausted block back to the producer.
    pub fn recycle(&self, mut buffer: Vec<i16>) {
        buffer.clear();
        if let Ok(mut free) = self.free.lock() {
            free.push_back(buffer);
        }
    }

    /// Unblock the producer; subsequent borrows return no buffer.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

impl SoundOutput for SoundBufferPool {
    fn buffer(&self) -> Option<Vec<i16>> {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return None;
            }
            match self.free.lock() {
                Ok(mut free) => {
                    if let Some(buffer) = free.pop_front() {
                        return Some(buffer);
                    }
                }
                Err(_) => {
                    warn!(target: "sound", "Buffer pool unavailable");
                    return None;
                }
            }
            thread::sleep(BORROW_POLL);
        }
    }

    fn dispatch(&self, samples: Vec<i16>) {
        if let Ok(mut playing) = self.playing.lock() {
            playing.push_back(samples);
        }
    }

    fn reset(&self) {
        if let (Ok(mut free), Ok(mut playing)) = (self.free.lock(), self.playing.lock()) {
            while let Some(mut buffer) = playing.pop_front() {
                buffer.clear();
                free.push_back(buffer);
            }
        }
        self.stop.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrow_fill_dispatch_round_trip() {
        let pool = SoundBufferPool::new(2, 4);
        let mut buffer = pool.buffer().expect("free buffer");
        buffer.extend_from_slice(&[1, 2, 3, 4]);
        pool.dispatch(buffer);
        let played = pool.pop_playing().expect("playing buffer");
        assert_eq!(vec![1, 2, 3, 4], played);
        pool.recycle(played);
        assert!(pool.buffer().is_some());
    }

    #[test]
    fn stop_poisons_borrow() {
        let pool = SoundBufferPool::new(0, 4);
        pool.stop();
        assert!(pool.buffer().is_none());
    }

    #[test]
    fn reset_requeues_playing_blocks() {
        let pool = SoundBufferPool::new(1, 4);
        let buffer = pool.buffer().expect("free buffer");
        pool.dispatch(buffer);
        pool.reset();
        assert!(pool.pop_playing().is_none());
        assert!(pool.buffer().is_some());
    }
}
