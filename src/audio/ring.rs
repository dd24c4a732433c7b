use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared single-producer single-consumer ring of interleaved i16 samples.
///
/// Both indices are kept modulo the capacity; one slot stays empty so a full
/// ring is distinguishable from an empty one. Each side stores its own index
/// with Release and loads the counterpart with Acquire, which is the only
/// synchronisation between the decode side and the audio-driver thread.
///
/// The writer never overwrites unread data: samples that do not fit are
/// dropped at the writer and counted.
pub struct PcmRing {
    buf: Box<[UnsafeCell<i16>]>,
    capacity: u32,
    write: AtomicU32,
    read: AtomicU32,
    dropped: AtomicU64,
}

// Safety: the writer only stores into [write, write+n) and the reader only
// loads from [read, read+n); the index protocol keeps those ranges disjoint,
// and the split into RingWriter/RingReader prevents a second producer or
// consumer from existing.
unsafe impl Sync for PcmRing {}
unsafe impl Send for PcmRing {}

impl PcmRing {
    fn new(capacity_samples: usize) -> Arc<Self> {
        let capacity = capacity_samples.max(2) as u32;
        let buf = (0..capacity).map(|_| UnsafeCell::new(0)).collect();
        Arc::new(Self {
            buf,
            capacity,
            write: AtomicU32::new(0),
            read: AtomicU32::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    fn used(&self, write: u32, read: u32) -> u32 {
        (write + self.capacity - read) % self.capacity
    }
}

/// Create a ring and split it into its two exclusive endpoints.
pub fn ring_pair(capacity_samples: usize) -> (RingWriter, RingReader) {
    let ring = PcmRing::new(capacity_samples);
    (
        RingWriter { ring: ring.clone() },
        RingReader { ring },
    )
}

pub struct RingWriter {
    ring: Arc<PcmRing>,
}

impl RingWriter {
    pub fn capacity(&self) -> usize {
        self.ring.capacity as usize - 1
    }

    /// Samples dropped because the ring was full.
    pub fn dropped(&self) -> u64 {
        self.ring.dropped.load(Ordering::Relaxed)
    }

    /// Append as many samples as fit; returns the number written.
    pub fn push_slice(&mut self, samples: &[i16]) -> usize {
        let ring = &*self.ring;
        let write = ring.write.load(Ordering::Relaxed);
        let read = ring.read.load(Ordering::Acquire);
        let free = ring.capacity - 1 - ring.used(write, read);

        let n = samples.len().min(free as usize);
        for (i, &sample) in samples[..n].iter().enumerate() {
            let at = (write as usize + i) % ring.capacity as usize;
            unsafe { *ring.buf[at].get() = sample };
        }
        ring.write
            .store((write + n as u32) % ring.capacity, Ordering::Release);

        let overflow = samples.len() - n;
        if overflow > 0 {
            ring.dropped.fetch_add(overflow as u64, Ordering::Relaxed);
        }
        n
    }
}

pub struct RingReader {
    ring: Arc<PcmRing>,
}

impl RingReader {
    pub fn capacity(&self) -> usize {
        self.ring.capacity as usize - 1
    }

    /// Samples currently buffered.
    pub fn available(&self) -> usize {
        let ring = &*self.ring;
        let write = ring.write.load(Ordering::Acquire);
        let read = ring.read.load(Ordering::Relaxed);
        ring.used(write, read) as usize
    }

    /// Move up to `out.len()` samples out of the ring; returns the count.
    /// The read index only advances past samples already copied out.
    pub fn pop_slice(&mut self, out: &mut [i16]) -> usize {
        let ring = &*self.ring;
        let write = ring.write.load(Ordering::Acquire);
        let read = ring.read.load(Ordering::Relaxed);

        let n = out.len().min(ring.used(write, read) as usize);
        for (i, slot) in out[..n].iter_mut().enumerate() {
            let at = (read as usize + i) % ring.capacity as usize;
            *slot = unsafe { *ring.buf[at].get() };
        }
        ring.read
            .store((read + n as u32) % ring.capacity, Ordering::Release);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_sample_order() {
        let (mut writer, mut reader) = ring_pair(64);
        let input: Vec<i16> = (0..32).collect();
        assert_eq!(writer.push_slice(&input), 32);
        assert_eq!(reader.available(), 32);

        let mut out = [0i16; 32];
        assert_eq!(reader.pop_slice(&mut out), 32);
        assert_eq!(&out[..], &input[..]);
        assert_eq!(reader.available(), 0);
    }

    #[test]
    fn writer_drops_on_full_and_counts() {
        let (mut writer, mut reader) = ring_pair(8);
        // Usable capacity is one below the allocation.
        assert_eq!(writer.push_slice(&[1; 10]), 7);
        assert_eq!(writer.dropped(), 3);

        // Reads are a prefix of writes even across the drop.
        let mut out = [0i16; 7];
        assert_eq!(reader.pop_slice(&mut out), 7);
        assert_eq!(out, [1; 7]);
    }

    #[test]
    fn wraps_across_the_boundary() {
        let (mut writer, mut reader) = ring_pair(8);
        let mut out = [0i16; 6];
        for round in 0..10i16 {
            let chunk = [round; 6];
            assert_eq!(writer.push_slice(&chunk), 6);
            assert_eq!(reader.pop_slice(&mut out), 6);
            assert_eq!(out, chunk);
        }
    }

    #[test]
    fn read_never_passes_write() {
        let (mut writer, mut reader) = ring_pair(16);
        writer.push_slice(&[7; 5]);
        let mut out = [0i16; 12];
        assert_eq!(reader.pop_slice(&mut out), 5);
        assert_eq!(reader.pop_slice(&mut out), 0);
    }

    #[test]
    fn concurrent_stream_is_a_prefix_of_writes() {
        let (mut writer, mut reader) = ring_pair(128);
        let producer = std::thread::spawn(move || {
            let mut next = 0i16;
            while next < 1000 {
                let chunk: Vec<i16> = (next..(next + 10).min(1000)).collect();
                let pushed = writer.push_slice(&chunk);
                next += pushed as i16;
                if pushed < chunk.len() {
                    std::thread::yield_now();
                }
            }
        });

        let mut seen = Vec::new();
        let mut out = [0i16; 32];
        while seen.len() < 1000 {
            let n = reader.pop_slice(&mut out);
            seen.extend_from_slice(&out[..n]);
            if n == 0 {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
        let expected: Vec<i16> = (0..1000).collect();
        assert_eq!(seen, expected);
    }
}
