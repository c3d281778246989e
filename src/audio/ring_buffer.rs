//! Lock-free SPSC ring buffer between the cpal callback and the framer.
//!
//! The capture callback runs on cpal's audio thread and must never block;
//! it pushes resampled mono samples here and the framing task drains them
//! into fixed-size blocks.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// ~10 seconds of 16 kHz mono audio. If the framer ever falls this far
/// behind, the oldest audio is dropped.
const CAPACITY: usize = 160_000;

/// Producer half, owned by the cpal input callback.
pub struct CaptureProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Consumer half, owned by the framing task.
pub struct CaptureConsumer {
    inner: ringbuf::HeapCons<f32>,
}

/// Create a matched producer/consumer pair.
pub fn capture_ring() -> (CaptureProducer, CaptureConsumer) {
    let rb = HeapRb::<f32>::new(CAPACITY);
    let (prod, cons) = rb.split();
    (CaptureProducer { inner: prod }, CaptureConsumer { inner: cons })
}

impl CaptureProducer {
    /// Push samples, returning how many were accepted. A short write means
    /// the buffer is full and the overflow is dropped.
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

impl CaptureConsumer {
    /// Pop up to `buf.len()` samples. Returns how many were read.
    pub fn pop_slice(&mut self, buf: &mut [f32]) -> usize {
        self.inner.pop_slice(buf)
    }

    /// Samples currently waiting to be read.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_preserves_order() {
        let (mut prod, mut cons) = capture_ring();
        let written = prod.push_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(written, 3);
        assert_eq!(cons.available(), 3);

        let mut out = [0.0f32; 3];
        assert_eq!(cons.pop_slice(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert_eq!(cons.available(), 0);
    }

    #[test]
    fn full_buffer_reports_short_write() {
        let (mut prod, _cons) = capture_ring();
        let chunk = vec![0.0f32; CAPACITY];
        assert_eq!(prod.push_slice(&chunk), CAPACITY);
        assert_eq!(prod.push_slice(&[1.0]), 0);
    }
}
