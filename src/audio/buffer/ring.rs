//! Fixed-size circular sample buffer.
//!
//! Decouples an external producer's frame cadence from the render quantum.
//! Writes past capacity overwrite the oldest samples.

pub struct SampleRing {
    buf: Vec<i16>,
    size: usize,
    write_offset: usize,
    read_offset: usize,
    length: usize,
}

impl SampleRing {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            buf: vec![0; size],
            size,
            write_offset: 0,
            read_offset: 0,
            length: 0,
        }
    }

    /// Samples currently available to read.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn remaining(&self) -> usize {
        self.size - self.length
    }

    pub fn write(&mut self, chunk: &[i16]) {
        // Only the newest `size` samples of an oversized chunk can survive.
        let chunk = if chunk.len() > self.size {
            &chunk[chunk.len() - self.size..]
        } else {
            chunk
        };
        let to_write = chunk.len();
        let available_at_end = self.size - self.write_offset;

        if to_write <= available_at_end {
            self.buf[self.write_offset..self.write_offset + to_write].copy_from_slice(chunk);
        } else {
            self.buf[self.write_offset..].copy_from_slice(&chunk[..available_at_end]);
            self.buf[..to_write - available_at_end].copy_from_slice(&chunk[available_at_end..]);
        }

        let new_len = self.length + to_write;
        if new_len > self.size {
            let overwritten = new_len - self.size;
            self.read_offset = (self.read_offset + overwritten) % self.size;
            self.length = self.size;
        } else {
            self.length = new_len;
        }

        self.write_offset = (self.write_offset + to_write) % self.size;
    }

    /// Add up to `acc.len()` samples into `acc`, scaled by `gain`.
    /// Returns the number of samples consumed.
    pub fn accumulate_into(&mut self, acc: &mut [i32], gain: f32) -> usize {
        let to_read = acc.len().min(self.length);
        for slot in acc.iter_mut().take(to_read) {
            let s = self.buf[self.read_offset];
            *slot += (s as f32 * gain).round() as i32;
            self.read_offset = (self.read_offset + 1) % self.size;
        }
        self.length -= to_read;
        to_read
    }

    /// Skip `n` samples without reading them. Returns the samples skipped.
    pub fn skip(&mut self, n: usize) -> usize {
        let to_skip = n.min(self.length);
        self.read_offset = (self.read_offset + to_skip) % self.size;
        self.length -= to_skip;
        to_skip
    }

    pub fn clear(&mut self) {
        self.write_offset = 0;
        self.read_offset = 0;
        self.length = 0;
    }
}
