// This file is part of oxide64.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use oxide64_core::VideoOutput;

// Collects scanlines into a full RGBA frame. Lines arrive strictly top to
// bottom, so the completed flag flips exactly once per frame when the last
// line lands.

pub struct FrameBuffer {
    dim: (usize, usize),
    pixels: Vec<u32>,
    frame_complete: bool,
    frame_count: u32,
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize) -> FrameBuffer {
        FrameBuffer {
            dim: (width, height),
            pixels: vec![0; width * height],
            frame_complete: false,
            frame_count: 0,
        }
    }

    pub fn get_pitch(&self) -> usize {
        self.dim.0 * std::mem::size_of::<u32>()
    }

    pub fn get_pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn get_frame_count(&self) -> u32 {
        self.frame_count
    }

    /// True once per completed frame; reading clears the flag.
    pub fn take_frame_complete(&mut self) -> bool {
        let complete = self.frame_complete;
        self.frame_complete = false;
        complete
    }
}

impl VideoOutput for FrameBuffer {
    fn get_dimension(&self) -> (usize, usize) {
        self.dim
    }

    fn render_line(&mut self, line: usize, pixels: &[u32]) {
        let (width, height) = self.dim;
        if line >= height {
            return;
        }
        let start = line * width;
        let count = pixels.len().min(width);
        self.pixels[start..start + count].copy_from_slice(&pixels[..count]);
        if line == height - 1 {
            self.frame_complete = true;
            self.frame_count = self.frame_count.wrapping_add(1);
        }
    }

    fn reset(&mut self) {
        for pixel in self.pixels.iter_mut() {
            *pixel = 0;
        }
        self.frame_complete = false;
        self.frame_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_line_completes_frame() {
        let mut fb = FrameBuffer::new(4, 2);
        fb.render_line(0, &[1, 2, 3, 4]);
        assert!(!fb.take_frame_complete());
        fb.render_line(1, &[5, 6, 7, 8]);
        assert!(fb.take_frame_complete());
        assert!(!fb.take_frame_complete());
        assert_eq!(&[1, 2, 3, 4, 5, 6, 7, 8], fb.get_pixels());
    }
}
