use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::trace;
use thiserror::Error;
use tokio::sync::Notify;

use crate::protocol::frames::SendMessage;

#[derive(Debug, Error)]
#[error("writer queue overflowed with non-coalescable traffic")]
pub struct WriterOverflow;

/// Serialising queue in front of the bulk-out endpoint.
///
/// All producers (session control, input encoder, mic framing) post here;
/// a single writer task drains it. When full, the newest Move-only touch
/// frame is evicted to make room; if nothing is coalescable the post fails,
/// which the session treats as fatal.
///
/// Posting is synchronous and lock-only so the mic capture thread can use
/// it without a runtime handle.
#[derive(Clone)]
pub struct WriterQueue {
    shared: Arc<Shared>,
}

struct Shared {
    queue: Mutex<VecDeque<SendMessage>>,
    notify: Notify,
    capacity: usize,
}

impl WriterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                notify: Notify::new(),
                capacity,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue a frame for transmission.
    ///
    /// Successive Move-only touch frames coalesce: if the newest queued
    /// frame is also Move-only, it is replaced in place, so ordering across
    /// Down/Up boundaries is preserved.
    pub fn post(&self, msg: SendMessage) -> Result<(), WriterOverflow> {
        let mut queue = self.shared.queue.lock().unwrap();

        if msg.is_move_only()
            && queue
                .back()
                .is_some_and(|back| back.is_move_only() && back.category() == msg.category())
        {
            *queue.back_mut().unwrap() = msg;
            drop(queue);
            self.shared.notify.notify_one();
            return Ok(());
        }

        if queue.len() >= self.shared.capacity {
            // Evict the newest coalescable frame; stale touch positions lose
            // to control traffic.
            match queue.iter().rposition(|m| m.is_move_only()) {
                Some(pos) => {
                    trace!("writer queue full, evicting stale move frame at {pos}");
                    queue.remove(pos);
                }
                None => return Err(WriterOverflow),
            }
        }

        queue.push_back(msg);
        drop(queue);
        self.shared.notify.notify_one();
        Ok(())
    }

    /// Await the next frame to transmit.
    pub async fn recv(&self) -> SendMessage {
        loop {
            if let Some(msg) = self.shared.queue.lock().unwrap().pop_front() {
                return msg;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Non-blocking drain used while shutting down.
    pub fn try_recv(&self) -> Option<SendMessage> {
        self.shared.queue.lock().unwrap().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TouchAction;

    fn touch(action: TouchAction, x: f32) -> SendMessage {
        SendMessage::Touch {
            x,
            y: 0.5,
            action,
        }
    }

    #[test]
    fn successive_move_frames_coalesce() {
        let queue = WriterQueue::new(8);
        queue.post(touch(TouchAction::Move, 0.1)).unwrap();
        queue.post(touch(TouchAction::Move, 0.2)).unwrap();
        queue.post(touch(TouchAction::Move, 0.3)).unwrap();
        assert_eq!(queue.len(), 1);
        let SendMessage::Touch { x, .. } = queue.try_recv().unwrap() else {
            panic!("expected touch");
        };
        assert_eq!(x, 0.3);
    }

    #[test]
    fn moves_do_not_coalesce_across_down_up() {
        let queue = WriterQueue::new(8);
        queue.post(touch(TouchAction::Move, 0.1)).unwrap();
        queue.post(touch(TouchAction::Up, 0.1)).unwrap();
        queue.post(touch(TouchAction::Move, 0.2)).unwrap();
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn overflow_evicts_move_frames_first() {
        let queue = WriterQueue::new(2);
        queue.post(SendMessage::HeartBeat).unwrap();
        queue.post(touch(TouchAction::Down, 0.1)).unwrap();
        // Queue full: a control frame must push out nothing coalescable...
        assert!(queue.post(SendMessage::DisconnectPhone).is_err());
        // ...but once a Move frame is queued it is the eviction victim.
        let queue = WriterQueue::new(2);
        queue.post(touch(TouchAction::Move, 0.1)).unwrap();
        queue.post(SendMessage::HeartBeat).unwrap();
        queue.post(SendMessage::DisconnectPhone).unwrap();
        assert_eq!(queue.len(), 2);
        assert!(matches!(
            queue.try_recv().unwrap(),
            SendMessage::HeartBeat
        ));
        assert!(matches!(
            queue.try_recv().unwrap(),
            SendMessage::DisconnectPhone
        ));
    }

    #[tokio::test]
    async fn recv_wakes_on_post() {
        let queue = WriterQueue::new(4);
        let consumer = queue.clone();
        let task = tokio::spawn(async move { consumer.recv().await });
        tokio::task::yield_now().await;
        queue.post(SendMessage::HeartBeat).unwrap();
        let msg = task.await.unwrap();
        assert!(matches!(msg, SendMessage::HeartBeat));
    }
}
