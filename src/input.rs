use crate::protocol::frames::{SendMessage, TouchPoint};
use crate::protocol::{CommandValue, TouchAction};

/// Single-touch frame. Coordinates are normalised to the unit square; the
/// encoder clamps NaN and out-of-range values.
pub fn touch(x: f32, y: f32, action: TouchAction) -> SendMessage {
    SendMessage::Touch { x, y, action }
}

/// Key command frame.
pub fn key(value: CommandValue) -> SendMessage {
    SendMessage::Command(value)
}

/// Multi-touch pointer bookkeeping.
///
/// Every update sends a full-frame snapshot: all active pointers at their
/// current position, the pointer whose state changed carrying Down/Up and
/// everyone else Move. Slot ids are allocated at pointer-down (smallest
/// free id) and become reusable after release.
#[derive(Default)]
pub struct MultiTouchTracker {
    slots: Vec<Option<(f32, f32)>>,
}

impl MultiTouchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_ids(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.is_some().then_some(id as u32))
            .collect()
    }

    fn snapshot(&self, changed: Option<(u32, TouchAction)>) -> SendMessage {
        let points = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| {
                let (x, y) = (*slot)?;
                let id = id as u32;
                let action = match changed {
                    Some((changed_id, action)) if changed_id == id => action,
                    _ => TouchAction::Move,
                };
                Some(TouchPoint { id, x, y, action })
            })
            .collect();
        SendMessage::MultiTouch(points)
    }

    /// New pointer; returns its slot id and the Down snapshot.
    pub fn down(&mut self, x: f32, y: f32) -> (u32, SendMessage) {
        let id = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.slots[id] = Some((x, y));
        (id as u32, self.snapshot(Some((id as u32, TouchAction::Down))))
    }

    /// Position update for an active pointer. Unknown ids yield nothing.
    pub fn moved(&mut self, id: u32, x: f32, y: f32) -> Option<SendMessage> {
        let slot = self.slots.get_mut(id as usize)?;
        slot.as_mut()?;
        *slot = Some((x, y));
        Some(self.snapshot(None))
    }

    /// Pointer release: the Up snapshot still contains the pointer, the
    /// slot frees afterwards.
    pub fn up(&mut self, id: u32) -> Option<SendMessage> {
        self.slots.get(id as usize)?.as_ref()?;
        let snapshot = self.snapshot(Some((id, TouchAction::Up)));
        self.slots[id as usize] = None;
        // Trim trailing free slots so the vec does not grow unbounded.
        while self.slots.last() == Some(&None) {
            self.slots.pop();
        }
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(msg: &SendMessage) -> &[TouchPoint] {
        match msg {
            SendMessage::MultiTouch(points) => points,
            other => panic!("expected multitouch, got {other:?}"),
        }
    }

    #[test]
    fn slot_ids_allocate_smallest_free() {
        let mut tracker = MultiTouchTracker::new();
        let (a, _) = tracker.down(0.1, 0.1);
        let (b, _) = tracker.down(0.2, 0.2);
        let (c, _) = tracker.down(0.3, 0.3);
        assert_eq!((a, b, c), (0, 1, 2));

        tracker.up(b).unwrap();
        assert_eq!(tracker.active_ids(), vec![0, 2]);

        // The freed middle slot is reused by the next pointer-down.
        let (d, _) = tracker.down(0.4, 0.4);
        assert_eq!(d, 1);
        assert_eq!(tracker.active_ids(), vec![0, 1, 2]);
    }

    #[test]
    fn active_set_matches_down_not_yet_up() {
        let mut tracker = MultiTouchTracker::new();
        let (a, _) = tracker.down(0.1, 0.1);
        let (b, _) = tracker.down(0.2, 0.2);
        assert_eq!(tracker.active_ids(), vec![a, b]);
        tracker.up(a).unwrap();
        assert_eq!(tracker.active_ids(), vec![b]);
        tracker.up(b).unwrap();
        assert!(tracker.active_ids().is_empty());
    }

    #[test]
    fn snapshots_carry_all_pointers_with_override() {
        let mut tracker = MultiTouchTracker::new();
        tracker.down(0.1, 0.1);
        let (second, down_snapshot) = tracker.down(0.6, 0.6);

        let snapshot = points(&down_snapshot);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].action, TouchAction::Move);
        assert_eq!(snapshot[1].action, TouchAction::Down);
        assert_eq!(snapshot[1].id, second);

        let moved = tracker.moved(second, 0.7, 0.7).unwrap();
        let snapshot = points(&moved);
        assert!(snapshot.iter().all(|p| p.action == TouchAction::Move));
        assert_eq!(snapshot[1].x, 0.7);

        let released = tracker.up(second).unwrap();
        let snapshot = points(&released);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].action, TouchAction::Up);
    }

    #[test]
    fn unknown_pointer_updates_are_rejected() {
        let mut tracker = MultiTouchTracker::new();
        assert!(tracker.moved(3, 0.5, 0.5).is_none());
        assert!(tracker.up(0).is_none());
        let (id, _) = tracker.down(0.5, 0.5);
        tracker.up(id).unwrap();
        assert!(tracker.up(id).is_none());
    }
}
