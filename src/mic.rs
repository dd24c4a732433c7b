use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use log::{debug, error, info, warn};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

use crate::driver::writer::WriterQueue;
use crate::protocol::frames::SendMessage;

/// Upstream microphone stream parameters: 16 kHz mono s16le, decode type 5
/// in the registry.
pub const MIC_SAMPLE_RATE: u32 = 16_000;
pub const MIC_DECODE_TYPE: u8 = 5;
pub const MIC_AUDIO_TYPE: u8 = 0;

/// One SendAudio chunk: 20 ms of capture.
const CHUNK_SAMPLES: usize = (MIC_SAMPLE_RATE / 50) as usize;
/// Callback-to-framing ring: half a second of slack before drops.
const CAPTURE_RING_SAMPLES: usize = (MIC_SAMPLE_RATE / 2) as usize;

/// Start/stop surface the audio pipeline drives; split out so command
/// routing is testable without a capture device.
pub trait MicControl: Send {
    /// Idempotent; a running capture is replaced.
    fn start(&mut self);
    /// Idempotent.
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

/// System-microphone capture bridge.
///
/// A dedicated thread owns the cpal stream (cpal streams are not Send); the
/// stream callback pushes samples into a lock-free ring and the same thread
/// frames drained chunks into SendAudio messages, posted in capture order.
pub struct Microphone {
    writer: WriterQueue,
    worker: Option<MicWorker>,
}

struct MicWorker {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

impl Microphone {
    pub fn new(writer: WriterQueue) -> Self {
        Self {
            writer,
            worker: None,
        }
    }
}

impl MicControl for Microphone {
    fn start(&mut self) {
        // Re-entrant start replaces the previous capture.
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        let writer = self.writer.clone();
        let stop_flag = stop.clone();
        let thread = thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || capture_loop(writer, stop_flag))
            .expect("spawn mic thread");

        self.worker = Some(MicWorker { stop, thread });
        info!("microphone capture started");
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Relaxed);
            if worker.thread.join().is_err() {
                warn!("mic capture thread panicked");
            }
            info!("microphone capture stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(writer: WriterQueue, stop: Arc<AtomicBool>) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        // No capture endpoint: stay a no-op, the session keeps running.
        info!("no input device available, microphone disabled");
        return;
    };

    let config = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(MIC_SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let (producer, mut consumer) = HeapRb::<i16>::new(CAPTURE_RING_SAMPLES).split();

    let sample_format = match device.default_input_config() {
        Ok(cfg) => cfg.sample_format(),
        Err(e) => {
            error!("mic config query failed: {e}");
            return;
        }
    };

    let stream = match sample_format {
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, producer),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, producer),
        _ => build_stream::<f32>(&device, &config, producer),
    };

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            error!("mic stream build failed: {e}");
            return;
        }
    };
    if let Err(e) = stream.play() {
        error!("mic stream start failed: {e}");
        return;
    }

    // Frame drained samples into fixed 20 ms chunks, in order.
    let mut chunk = Vec::with_capacity(CHUNK_SAMPLES);
    let mut scratch = [0i16; CHUNK_SAMPLES];
    while !stop.load(Ordering::Relaxed) {
        let n = consumer.pop_slice(&mut scratch[..CHUNK_SAMPLES - chunk.len()]);
        chunk.extend_from_slice(&scratch[..n]);
        if chunk.len() == CHUNK_SAMPLES {
            let mut pcm = Vec::with_capacity(CHUNK_SAMPLES * 2);
            for sample in chunk.drain(..) {
                pcm.extend_from_slice(&sample.to_le_bytes());
            }
            if writer
                .post(SendMessage::Audio {
                    decode_type: MIC_DECODE_TYPE,
                    audio_type: MIC_AUDIO_TYPE,
                    pcm: Bytes::from(pcm),
                })
                .is_err()
            {
                // Failures here are logged and end the capture; the session
                // is not torn down.
                error!("writer rejected mic frame, stopping capture");
                break;
            }
        } else {
            thread::sleep(Duration::from_millis(5));
        }
    }

    drop(stream);
    debug!("mic capture loop exited");
}

/// Stack-only callback: convert to i16 and push; drop when the framing side
/// falls behind.
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: ringbuf::HeapProd<i16>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample,
    i16: cpal::FromSample<T>,
{
    let err_fn = |err| warn!("mic stream error: {err}");
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                let converted = <i16 as cpal::FromSample<T>>::from_sample_(sample);
                if producer.try_push(converted).is_err() {
                    // Framing side behind: drop, never block the driver.
                    break;
                }
            }
        },
        err_fn,
        None,
    )
}
