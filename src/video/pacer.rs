use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::demux::LatestCell;

use super::decoder::VideoFrame;
use super::renderer::Renderer;

/// Presents pending frames at a bounded cadence.
///
/// A timer samples the single-slot cell at `1000/fps` ms; a frame is drawn
/// only when one is present and the inter-present interval has elapsed,
/// so a bursty decoder cannot push the display above the target rate.
pub struct FramePacer {
    cell: Arc<LatestCell<VideoFrame>>,
    renderer: Box<dyn Renderer>,
    frame_interval: Duration,
    last_present: Option<Instant>,
}

impl FramePacer {
    pub fn new(cell: Arc<LatestCell<VideoFrame>>, renderer: Box<dyn Renderer>, fps: u32) -> Self {
        Self {
            cell,
            renderer,
            frame_interval: Duration::from_millis(1000 / fps.max(1) as u64),
            last_present: None,
        }
    }

    /// One timer tick: draw the pending frame if the cadence allows.
    /// Returns whether a frame was presented.
    pub fn tick(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_present {
            if now.duration_since(last) < self.frame_interval {
                return false;
            }
        }
        let Some(frame) = self.cell.take() else {
            return false;
        };
        if let Err(e) = self.renderer.draw(&frame) {
            // Draw errors drop the frame; the next one repaints.
            warn!("present failed: {e}");
            return false;
        }
        self.last_present = Some(now);
        true
    }

    /// Animation loop; runs until the owning task is dropped.
    pub async fn run(mut self) {
        let mut ticker = interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            let now = ticker.tick().await;
            self.tick(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::renderer::RendererKind;
    use crate::video::MediaError;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingRenderer {
        drawn: Arc<AtomicU32>,
    }

    impl Renderer for CountingRenderer {
        fn kind(&self) -> RendererKind {
            RendererKind::Gl2
        }
        fn draw(&mut self, _frame: &VideoFrame) -> Result<(), MediaError> {
            self.drawn.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn frame(timestamp: u32) -> VideoFrame {
        VideoFrame {
            width: 800,
            height: 480,
            timestamp,
            data: Bytes::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn draws_when_frame_present_and_interval_elapsed() {
        let cell = LatestCell::new();
        let drawn = Arc::new(AtomicU32::new(0));
        let mut pacer = FramePacer::new(
            cell.clone(),
            Box::new(CountingRenderer {
                drawn: drawn.clone(),
            }),
            30,
        );

        let t0 = Instant::now();
        assert!(!pacer.tick(t0)); // empty cell

        cell.put(frame(1));
        assert!(pacer.tick(t0));
        assert_eq!(drawn.load(Ordering::Relaxed), 1);

        // Too soon: the fresh frame stays pending.
        cell.put(frame(2));
        assert!(!pacer.tick(t0 + Duration::from_millis(10)));

        // Past the 33 ms cadence it goes out.
        assert!(pacer.tick(t0 + Duration::from_millis(40)));
        assert_eq!(drawn.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn overwritten_frames_are_never_drawn() {
        let cell = LatestCell::new();
        let drawn = Arc::new(AtomicU32::new(0));
        let mut pacer = FramePacer::new(
            cell.clone(),
            Box::new(CountingRenderer {
                drawn: drawn.clone(),
            }),
            30,
        );

        cell.put(frame(1));
        cell.put(frame(2));
        cell.put(frame(3));
        assert!(pacer.tick(Instant::now()));
        assert_eq!(drawn.load(Ordering::Relaxed), 1);
        assert!(cell.take().is_none());
    }
}
