use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, Sleep};
use usb_async::DeviceHandle;

use crate::demux::Demux;
use crate::events::CarlinkEvent;
use crate::protocol::frames::{FrameDecoder, Message, SendMessage};
use crate::transport::{DongleInfo, EndpointPair, TransportError};

use super::config::DongleConfig;
use super::fsm::{Effect, SessionFsm, SessionState};
use super::writer::WriterQueue;

/// Cadence of the protocol-level keep-alive frame.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
/// Window the dongle gets to deliver media before pairing is advertised.
const PAIR_TIMEOUT: Duration = Duration::from_secs(15);
/// Grace given to in-flight writes during stop.
const STOP_GRACE: Duration = Duration::from_millis(200);
/// Poll granularity of the bulk-in read; also bounds stop latency.
const READ_TIMEOUT: Duration = Duration::from_millis(200);
/// Protocol errors within this window before the session fails.
const PROTOCOL_ERROR_WINDOW: Duration = Duration::from_secs(1);
const PROTOCOL_ERROR_LIMIT: usize = 8;

/// Why a session run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Host asked for a stop; device released cleanly.
    Stopped,
    /// The dongle disappeared from the bus.
    Detached,
    /// Unrecoverable fault; host must stop and start again.
    Failed(String),
}

/// One live dongle session: owns the device handle, the reader and writer
/// tasks, the state machine and all session timers.
pub struct DongleSession {
    handle: DeviceHandle,
    endpoints: EndpointPair,
    fsm: SessionFsm,
    writer: WriterQueue,
    demux: Demux,
    event_tx: mpsc::Sender<CarlinkEvent>,
}

impl DongleSession {
    pub fn new(
        handle: DeviceHandle,
        endpoints: EndpointPair,
        info: DongleInfo,
        config: DongleConfig,
        writer: WriterQueue,
        demux: Demux,
        event_tx: mpsc::Sender<CarlinkEvent>,
    ) -> Self {
        Self {
            handle,
            endpoints,
            fsm: SessionFsm::new(config, info),
            writer,
            demux,
            event_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.fsm.state()
    }

    /// Drive the session until stop, detach or failure.
    pub async fn run(mut self, mut stop_rx: watch::Receiver<bool>) -> SessionOutcome {
        let read_len = (self.fsm.config().packet_max as usize).max(self.endpoints.in_wmax as usize);
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<Vec<u8>>(32);
        let (io_err_tx, mut io_err_rx) = mpsc::channel::<TransportError>(4);

        let reader = spawn_reader(
            self.handle.clone(),
            self.endpoints.in_ep,
            read_len,
            chunk_tx,
            io_err_tx.clone(),
        );
        let writer_task = spawn_writer(
            self.handle.clone(),
            self.endpoints.out_ep,
            self.writer.clone(),
            io_err_tx,
        );

        let mut decoder = FrameDecoder::new();
        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        let mut frame_heartbeat: Option<tokio::time::Interval> = None;
        let mut pair_timeout: Option<std::pin::Pin<Box<Sleep>>> = None;
        let mut error_window: VecDeque<Instant> = VecDeque::new();

        let init = self.fsm.init_sequence();
        let init_result = self.apply_effects(init, &mut frame_heartbeat, &mut pair_timeout);

        let outcome = if let Err(reason) = init_result {
            let effect = self.fsm.fail(&reason);
            let _ = self.apply_effects(vec![effect], &mut frame_heartbeat, &mut pair_timeout);
            SessionOutcome::Failed(reason)
        } else { loop {
            tokio::select! {
                biased;

                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break SessionOutcome::Stopped;
                    }
                }

                Some(err) = io_err_rx.recv() => {
                    if err.is_device_gone() {
                        info!("device gone mid-session");
                        break SessionOutcome::Detached;
                    }
                    let reason = format!("usb transport fault: {err}");
                    let effect = self.fsm.fail(&reason);
                    let _ = self.apply_effects(vec![effect], &mut frame_heartbeat, &mut pair_timeout);
                    break SessionOutcome::Failed(reason);
                }

                maybe_chunk = chunk_rx.recv() => {
                    let Some(chunk) = maybe_chunk else {
                        break SessionOutcome::Detached;
                    };
                    decoder.extend(&chunk);
                    if let Err(reason) = self.drain_frames(
                        &mut decoder,
                        &mut error_window,
                        &mut frame_heartbeat,
                        &mut pair_timeout,
                    ) {
                        let effect = self.fsm.fail(&reason);
                        let _ = self.apply_effects(vec![effect], &mut frame_heartbeat, &mut pair_timeout);
                        break SessionOutcome::Failed(reason);
                    }
                }

                _ = heartbeat.tick() => {
                    if self.writer.post(SendMessage::HeartBeat).is_err() {
                        let reason = "writer queue overflow".to_string();
                        let effect = self.fsm.fail(&reason);
                        let _ = self.apply_effects(vec![effect], &mut frame_heartbeat, &mut pair_timeout);
                        break SessionOutcome::Failed(reason);
                    }
                }

                _ = tick_opt(&mut frame_heartbeat) => {
                    if self.writer.post(SendMessage::Command(
                        crate::protocol::CommandValue::Frame,
                    )).is_err() {
                        let reason = "writer queue overflow".to_string();
                        let effect = self.fsm.fail(&reason);
                        let _ = self.apply_effects(vec![effect], &mut frame_heartbeat, &mut pair_timeout);
                        break SessionOutcome::Failed(reason);
                    }
                }

                _ = sleep_opt(&mut pair_timeout) => {
                    pair_timeout = None;
                    if let Some(effect) = self.fsm.on_pair_timeout() {
                        if let Err(reason) =
                            self.apply_effects(vec![effect], &mut frame_heartbeat, &mut pair_timeout)
                        {
                            let effect = self.fsm.fail(&reason);
                            let _ = self.apply_effects(vec![effect], &mut frame_heartbeat, &mut pair_timeout);
                            break SessionOutcome::Failed(reason);
                        }
                    }
                }
            }
        }};

        // Graceful teardown: queue the disconnect burst, give in-flight
        // writes a bounded grace, then drop the endpoint tasks.
        if outcome == SessionOutcome::Stopped {
            let effects = self.fsm.stop_sequence();
            let _ = self.apply_effects(effects, &mut frame_heartbeat, &mut pair_timeout);
            let drained = tokio::time::timeout(STOP_GRACE, async {
                while !self.writer.is_empty() {
                    sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
            if drained.is_err() {
                warn!("abandoning {} queued frames after stop grace", self.writer.len());
            }
        }

        reader.abort();
        writer_task.abort();
        if let Err(e) = self.handle.release_interface(self.endpoints.interface).await {
            debug!("release interface: {e}");
        }

        info!("session ended: {outcome:?}");
        outcome
    }

    fn drain_frames(
        &mut self,
        decoder: &mut FrameDecoder,
        error_window: &mut VecDeque<Instant>,
        frame_heartbeat: &mut Option<tokio::time::Interval>,
        pair_timeout: &mut Option<std::pin::Pin<Box<Sleep>>>,
    ) -> Result<(), String> {
        loop {
            match decoder.next_frame() {
                Ok(None) => return Ok(()),
                Ok(Some((msg_type, payload))) => {
                    let message = match Message::parse(msg_type, payload) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!("payload decode failed: {e}");
                            self.note_protocol_error(error_window)?;
                            continue;
                        }
                    };
                    self.handle_message(message, frame_heartbeat, pair_timeout)?;
                }
                Err(e) => {
                    warn!("frame decode failed: {e}");
                    self.note_protocol_error(error_window)?;
                }
            }
        }
    }

    fn note_protocol_error(&mut self, window: &mut VecDeque<Instant>) -> Result<(), String> {
        let now = Instant::now();
        window.push_back(now);
        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) > PROTOCOL_ERROR_WINDOW)
        {
            window.pop_front();
        }
        if window.len() >= PROTOCOL_ERROR_LIMIT {
            return Err("protocol error storm on bulk-in".to_string());
        }
        Ok(())
    }

    fn handle_message(
        &mut self,
        message: Message,
        frame_heartbeat: &mut Option<tokio::time::Interval>,
        pair_timeout: &mut Option<std::pin::Pin<Box<Sleep>>>,
    ) -> Result<(), String> {
        let mut effects = self.fsm.on_message(&message);
        if let Message::VideoData(packet) = &message {
            if let Some(effect) = self.fsm.observe_video_geometry(packet.width, packet.height) {
                effects.push(effect);
            }
        }
        self.demux.dispatch(&message);
        self.apply_effects(effects, frame_heartbeat, pair_timeout)
    }

    /// Err carries the failure reason when a non-coalescable frame cannot
    /// be queued.
    fn apply_effects(
        &mut self,
        effects: Vec<Effect>,
        frame_heartbeat: &mut Option<tokio::time::Interval>,
        pair_timeout: &mut Option<std::pin::Pin<Box<Sleep>>>,
    ) -> Result<(), String> {
        let mut overflow = None;
        for effect in effects {
            match effect {
                Effect::Send(msg) => {
                    if let Err(e) = self.writer.post(msg) {
                        error!("dropping control frame: {e}");
                        overflow = Some(e.to_string());
                    }
                }
                Effect::Emit(event) => {
                    if self.event_tx.try_send(event).is_err() {
                        warn!("event consumer saturated, dropping event");
                    }
                }
                Effect::ArmPairTimeout => {
                    *pair_timeout = Some(Box::pin(sleep(PAIR_TIMEOUT)));
                }
                Effect::DisarmPairTimeout => {
                    *pair_timeout = None;
                }
                Effect::FrameHeartbeat(Some(ms)) => {
                    let mut ticker = interval(Duration::from_millis(ms));
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    // The first tick fires immediately by default; skip it so
                    // the cadence starts one interval out.
                    ticker.reset();
                    *frame_heartbeat = Some(ticker);
                }
                Effect::FrameHeartbeat(None) => {
                    *frame_heartbeat = None;
                }
            }
        }
        match overflow {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

async fn tick_opt(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_opt(timer: &mut Option<std::pin::Pin<Box<Sleep>>>) {
    match timer {
        Some(t) => t.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Reader task: owns the bulk-in endpoint. Short read timeouts keep the
/// shared handle available to the writer between polls.
fn spawn_reader(
    handle: DeviceHandle,
    in_ep: u8,
    read_len: usize,
    chunk_tx: mpsc::Sender<Vec<u8>>,
    err_tx: mpsc::Sender<TransportError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match handle.read_bulk(in_ep, read_len, READ_TIMEOUT).await {
                Ok(chunk) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    if chunk_tx.send(chunk).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let err: TransportError = e.into();
                    match &err {
                        TransportError::Io(io_err) if io_err.kind() == io::ErrorKind::WouldBlock => {
                            continue;
                        }
                        TransportError::DeviceGone => {
                            let _ = err_tx.send(err).await;
                            return;
                        }
                        _ => {
                            debug!("bulk-in error, clearing halt: {err}");
                            let _ = handle.clear_halt(in_ep).await;
                            tokio::time::sleep(Duration::from_millis(5)).await;
                        }
                    }
                }
            }
        }
    })
}

/// Writer task: single consumer of the writer queue.
fn spawn_writer(
    handle: DeviceHandle,
    out_ep: u8,
    queue: WriterQueue,
    err_tx: mpsc::Sender<TransportError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let msg = queue.recv().await;
            let bytes = msg.encode();
            match handle.write_bulk(out_ep, &bytes, Duration::from_secs(1)).await {
                Ok(n) if n == bytes.len() => {}
                Ok(n) => {
                    warn!("short bulk write: {n}/{} bytes", bytes.len());
                }
                Err(e) => {
                    let err: TransportError = e.into();
                    match &err {
                        TransportError::Io(io_err)
                            if matches!(
                                io_err.kind(),
                                io::ErrorKind::BrokenPipe | io::ErrorKind::WouldBlock
                            ) =>
                        {
                            warn!("bulk-out stalled, clearing halt");
                            let _ = handle.clear_halt(out_ep).await;
                        }
                        _ => {
                            let _ = err_tx.send(err).await;
                            return;
                        }
                    }
                }
            }
        }
    })
}
