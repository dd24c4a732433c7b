use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::device;

/// Attach/detach transitions for the known dongle ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugEvent {
    Attached,
    Detached,
}

/// Polling watcher over the bus.
///
/// Emits one event per presence transition; steady-state polls are filtered
/// by the last-known-connected flag so consumers never see duplicates.
pub struct HotplugWatcher {
    task: JoinHandle<()>,
    events: mpsc::Receiver<HotplugEvent>,
}

impl HotplugWatcher {
    pub fn spawn(poll_interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(watch_loop(poll_interval, tx));
        Self { task, events: rx }
    }

    pub async fn next_event(&mut self) -> Option<HotplugEvent> {
        self.events.recv().await
    }
}

impl Drop for HotplugWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch_loop(poll_interval: Duration, tx: mpsc::Sender<HotplugEvent>) {
    let mut connected: Option<bool> = None;
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let present = matches!(device::find_dongle().await, Ok(Some(_)));

        let event = match (connected, present) {
            (Some(true), true) | (Some(false), false) => None,
            (_, true) => Some(HotplugEvent::Attached),
            (Some(true), false) => Some(HotplugEvent::Detached),
            (None, false) => {
                connected = Some(false);
                None
            }
        };
        connected = Some(present);

        if let Some(event) = event {
            info!("hotplug: {event:?}");
            if tx.send(event).await.is_err() {
                debug!("hotplug consumer gone, watcher exiting");
                return;
            }
        }
    }
}
