use std::sync::{Arc, Mutex};

use log::{trace, warn};
use tokio::sync::mpsc;
use tokio::sync::Notify;

use crate::protocol::frames::{AudioPacket, MediaPacket, Message, VideoPacket};

/// Single-slot latest-wins cell.
///
/// Producers overwrite, the consumer takes. Used for decoded video frames
/// and for the raw video hand-off where only the newest item matters.
pub struct LatestCell<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> Default for LatestCell<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
        }
    }
}

impl<T> LatestCell<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the slot content, returning the overwritten item so the
    /// producer can dispose of it (decoded frames hold decoder resources).
    pub fn put(&self, value: T) -> Option<T> {
        let previous = self.slot.lock().unwrap().replace(value);
        self.notify.notify_one();
        previous
    }

    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap().take()
    }

    /// Await until an item is present, then take it.
    pub async fn recv(&self) -> T {
        loop {
            if let Some(value) = self.take() {
                return value;
            }
            self.notify.notified().await;
        }
    }
}

/// Typed fan-out of decoded messages.
///
/// Dispatch never blocks the reader: video overwrites a single slot, the
/// push-through lanes use `try_send` and drop on a saturated consumer.
pub struct Demux {
    video: Arc<LatestCell<VideoPacket>>,
    audio_tx: mpsc::Sender<AudioPacket>,
    media_tx: mpsc::Sender<MediaPacket>,
    command_tx: mpsc::Sender<u32>,
}

pub struct DemuxOutputs {
    pub video: Arc<LatestCell<VideoPacket>>,
    pub audio: mpsc::Receiver<AudioPacket>,
    pub media: mpsc::Receiver<MediaPacket>,
    pub commands: mpsc::Receiver<u32>,
}

impl Demux {
    pub fn new() -> (Self, DemuxOutputs) {
        let video = LatestCell::new();
        let (audio_tx, audio_rx) = mpsc::channel(256);
        let (media_tx, media_rx) = mpsc::channel(64);
        let (command_tx, command_rx) = mpsc::channel(64);
        (
            Self {
                video: video.clone(),
                audio_tx,
                media_tx,
                command_tx,
            },
            DemuxOutputs {
                video,
                audio: audio_rx,
                media: media_rx,
                commands: command_rx,
            },
        )
    }

    /// Route one decoded message. Non-media messages are left to the
    /// session state machine and ignored here.
    pub fn dispatch(&self, message: &Message) {
        match message {
            Message::VideoData(packet) => {
                if self.video.put(packet.clone()).is_some() {
                    trace!("video slot overwritten before decode");
                }
            }
            Message::AudioData(packet) => {
                if self.audio_tx.try_send(packet.clone()).is_err() {
                    warn!("audio consumer saturated, dropping packet");
                }
            }
            Message::MediaData(packet) => {
                if self.media_tx.try_send(packet.clone()).is_err() {
                    warn!("media consumer saturated, dropping update");
                }
            }
            Message::Command(value) => {
                if self.command_tx.try_send(*value).is_err() {
                    warn!("command consumer saturated, dropping {value}");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn video_packet(timestamp: u32) -> Message {
        Message::VideoData(VideoPacket {
            width: 800,
            height: 480,
            flags: 0,
            timestamp,
            payload: Bytes::new(),
        })
    }

    #[tokio::test]
    async fn video_is_latest_wins() {
        let (demux, outputs) = Demux::new();
        demux.dispatch(&video_packet(1));
        demux.dispatch(&video_packet(2));
        demux.dispatch(&video_packet(3));
        let frame = outputs.video.take().unwrap();
        assert_eq!(frame.timestamp, 3);
        assert!(outputs.video.take().is_none());
    }

    #[tokio::test]
    async fn commands_pass_through_in_order() {
        let (demux, mut outputs) = Demux::new();
        demux.dispatch(&Message::Command(1002));
        demux.dispatch(&Message::Command(1012));
        assert_eq!(outputs.commands.recv().await, Some(1002));
        assert_eq!(outputs.commands.recv().await, Some(1012));
    }

    #[tokio::test]
    async fn latest_cell_recv_wakes() {
        let cell: Arc<LatestCell<u32>> = LatestCell::new();
        let consumer = cell.clone();
        let task = tokio::spawn(async move { consumer.recv().await });
        tokio::task::yield_now().await;
        cell.put(7);
        assert_eq!(task.await.unwrap(), 7);
    }
}
