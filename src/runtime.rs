use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use usb_async::DeviceHandle;

use crate::audio::player::{AudioAction, AudioPipeline, PlayerHandoff};
use crate::demux::Demux;
use crate::driver::config::DongleConfig;
use crate::driver::session::{DongleSession, SessionOutcome};
use crate::driver::writer::WriterQueue;
use crate::events::{CarlinkEvent, HostCommand, MediaState};
use crate::input;
use crate::mic::Microphone;
use crate::protocol::frames::SendMessage;
use crate::protocol::CommandValue;
use crate::transport::{device, HotplugEvent, HotplugWatcher};
use crate::video::decoder::{HwAccel, VideoDecoder, VideoPipeline};
use crate::video::pacer::FramePacer;
use crate::video::renderer::{
    probe_order, select_renderer, Renderer, RendererProbe, RendererSelection,
};

const HOTPLUG_POLL: Duration = Duration::from_millis(500);
const WRITER_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 64;

/// Factory for per-session decoder instances; the decoder dies with the
/// session on unplug and a fresh one is built on reconnect.
pub type DecoderFactory = Box<dyn Fn() -> Box<dyn VideoDecoder> + Send>;
/// Renderer factory, handed the probed context selection.
pub type RendererFactory = Box<dyn Fn(RendererSelection) -> Box<dyn Renderer> + Send>;

/// Construction-time wiring for the runtime: the session configuration and
/// the host's media backends. A build without video backends runs headless
/// (events and audio only).
pub struct CarlinkBuilder {
    config: DongleConfig,
    decoder: Option<DecoderFactory>,
    renderer: Option<RendererFactory>,
    probe: Option<Box<dyn RendererProbe>>,
}

impl CarlinkBuilder {
    pub fn new(config: DongleConfig) -> Self {
        Self {
            config,
            decoder: None,
            renderer: None,
            probe: None,
        }
    }

    pub fn video_decoder<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn VideoDecoder> + Send + 'static,
    {
        self.decoder = Some(Box::new(factory));
        self
    }

    pub fn renderer<F>(mut self, factory: F) -> Self
    where
        F: Fn(RendererSelection) -> Box<dyn Renderer> + Send + 'static,
    {
        self.renderer = Some(Box::new(factory));
        self
    }

    /// Decoder-support probe driving renderer selection. Without one the
    /// first context in the platform order is assumed capable.
    pub fn renderer_probe(mut self, probe: Box<dyn RendererProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Spawn the runtime task and hand back the host-facing surface.
    pub fn spawn(self) -> Carlink {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (handoff_tx, handoff_rx) = mpsc::channel(8);

        let runtime = Runtime {
            config: self.config,
            decoder: self.decoder,
            renderer: self.renderer,
            probe: self.probe,
            renderer_selection: None,
            event_tx,
            cmd_rx,
            handoff_tx,
            writer: WriterQueue::new(WRITER_CAPACITY),
        };
        let task = tokio::spawn(runtime.run());

        Carlink {
            events: event_rx,
            commands: cmd_tx,
            audio_streams: Some(handoff_rx),
            task,
        }
    }
}

/// Host handle: an upward event stream, a downward command sink and the
/// audio stream hand-offs for the output side.
pub struct Carlink {
    events: mpsc::Receiver<CarlinkEvent>,
    commands: mpsc::Sender<HostCommand>,
    audio_streams: Option<mpsc::Receiver<PlayerHandoff>>,
    task: JoinHandle<()>,
}

impl Carlink {
    pub fn builder(config: DongleConfig) -> CarlinkBuilder {
        CarlinkBuilder::new(config)
    }

    pub async fn next_event(&mut self) -> Option<CarlinkEvent> {
        self.events.recv().await
    }

    /// PCM stream hand-offs; the host typically drains these from its audio
    /// output setup task and drives each worklet from the audio callback.
    /// Takeable once so it can live on a different task than the events.
    pub fn take_audio_streams(&mut self) -> Option<mpsc::Receiver<PlayerHandoff>> {
        self.audio_streams.take()
    }

    pub async fn send(&self, command: HostCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub async fn shutdown(self) {
        let _ = self.commands.send(HostCommand::Stop).await;
        drop(self.commands);
        let _ = self.task.await;
    }
}

struct ActiveSession {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<SessionOutcome>,
    aux: Vec<JoinHandle<()>>,
    handle: DeviceHandle,
}

impl ActiveSession {
    async fn stop(mut self) -> SessionOutcome {
        let _ = self.stop_tx.send(true);
        let outcome = match tokio::time::timeout(Duration::from_secs(2), &mut self.join).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) | Err(_) => {
                self.join.abort();
                SessionOutcome::Stopped
            }
        };
        for task in self.aux {
            task.abort();
        }
        outcome
    }
}

struct Runtime {
    config: DongleConfig,
    decoder: Option<DecoderFactory>,
    renderer: Option<RendererFactory>,
    probe: Option<Box<dyn RendererProbe>>,
    /// Probe verdict, cached for the lifetime of the runtime.
    renderer_selection: Option<RendererSelection>,
    event_tx: mpsc::Sender<CarlinkEvent>,
    cmd_rx: mpsc::Receiver<HostCommand>,
    handoff_tx: mpsc::Sender<PlayerHandoff>,
    writer: WriterQueue,
}

impl Runtime {
    async fn run(mut self) {
        let mut watcher = HotplugWatcher::spawn(HOTPLUG_POLL);
        let mut session: Option<ActiveSession> = None;
        let mut wanted = false;

        loop {
            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => {
                    let Some(command) = maybe_cmd else { break };
                    match command {
                        HostCommand::Start => {
                            wanted = true;
                            if session.is_none() {
                                session = self.try_open().await;
                            } else {
                                // Coalesced: one session per device; later
                                // starts join the in-flight one.
                                debug!("start ignored, session already live");
                            }
                        }
                        HostCommand::Stop => {
                            wanted = false;
                            if let Some(active) = session.take() {
                                active.stop().await;
                            }
                        }
                        HostCommand::SendKey(value) => {
                            let _ = self.writer.post(input::key(value));
                        }
                        HostCommand::SendTouch { x, y, action } => {
                            let _ = self.writer.post(input::touch(x, y, action));
                        }
                        HostCommand::SendMultiTouch(points) => {
                            let _ = self.writer.post(SendMessage::MultiTouch(points));
                        }
                        HostCommand::SetConfig(config) => {
                            // Immutable per session: effective at next start.
                            self.config = config;
                        }
                        HostCommand::ForceReset => {
                            self.force_reset(&mut session).await;
                        }
                    }
                }

                Some(event) = watcher.next_event() => match event {
                    HotplugEvent::Attached => {
                        info!("dongle attached");
                        if wanted && session.is_none() {
                            session = self.try_open().await;
                        }
                    }
                    HotplugEvent::Detached => {
                        info!("dongle detached");
                        if let Some(active) = session.take() {
                            active.stop().await;
                        }
                        let _ = self.event_tx.try_send(CarlinkEvent::Unplugged);
                    }
                },

                outcome = join_session(&mut session), if session.is_some() => {
                    let finished = session.take().expect("session present");
                    for task in finished.aux {
                        task.abort();
                    }
                    match outcome {
                        SessionOutcome::Detached => {
                            let _ = self.event_tx.try_send(CarlinkEvent::Unplugged);
                            // The watcher drives the reconnect while the
                            // host still wants a session.
                        }
                        SessionOutcome::Failed(reason) => {
                            warn!("session failed: {reason}");
                            wanted = false;
                        }
                        SessionOutcome::Stopped => {}
                    }
                }
            }
        }

        if let Some(active) = session.take() {
            active.stop().await;
        }
    }

    async fn try_open(&mut self) -> Option<ActiveSession> {
        let device = match device::find_dongle().await {
            Ok(Some(device)) => device,
            Ok(None) => {
                debug!("no dongle on the bus yet");
                return None;
            }
            Err(e) => {
                warn!("enumeration failed: {e}");
                return None;
            }
        };

        let (handle, endpoints, info) = match device::open_dongle(&device).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!("open failed: {e}");
                let _ = self
                    .event_tx
                    .try_send(CarlinkEvent::Failure(format!("open failed: {e}")));
                return None;
            }
        };

        let (demux, outputs) = Demux::new();
        let mut aux = Vec::new();

        // Audio lane: per-stream players feeding ring buffers, commands
        // routed to the microphone bridge.
        let pipeline = AudioPipeline::new(
            self.handoff_tx.clone(),
            self.event_tx.clone(),
            Microphone::new(self.writer.clone()),
            self.config.audio_transfer_mode,
        );
        aux.push(tokio::spawn(audio_task(outputs.audio, pipeline)));

        // Metadata lane: merge updates, surface snapshots.
        let media_events = self.event_tx.clone();
        let mut media_rx = outputs.media;
        aux.push(tokio::spawn(async move {
            let mut state = MediaState::default();
            while let Some(packet) = media_rx.recv().await {
                state.merge(packet);
                let _ = media_events.try_send(CarlinkEvent::MediaMeta(state.clone()));
            }
        }));

        // Command lane.
        let command_events = self.event_tx.clone();
        let mut command_rx = outputs.commands;
        aux.push(tokio::spawn(async move {
            while let Some(value) = command_rx.recv().await {
                if let Some(command) = CommandValue::from_u32(value) {
                    let _ = command_events.try_send(CarlinkEvent::Command(command));
                }
            }
        }));

        // Video lane, when the host wired up a decoder (and optionally a
        // renderer for in-core presentation).
        if let Some(make_decoder) = self.decoder.as_ref() {
            let decoded = crate::demux::LatestCell::new();
            let mut pipeline = VideoPipeline::new(make_decoder(), decoded.clone());
            let raw = outputs.video;
            aux.push(tokio::spawn(async move {
                loop {
                    let packet = raw.recv().await;
                    pipeline.handle_packet(&packet);
                }
            }));

            if self.renderer.is_some() {
                let selection = self.select_renderer_cached().await;
                let make_renderer = self.renderer.as_ref().expect("renderer checked above");
                let pacer = FramePacer::new(decoded, make_renderer(selection), self.config.fps);
                aux.push(tokio::spawn(pacer.run()));
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let session = DongleSession::new(
            handle.clone(),
            endpoints,
            info,
            self.config.clone(),
            self.writer.clone(),
            demux,
            self.event_tx.clone(),
        );
        let join = tokio::spawn(session.run(stop_rx));

        Some(ActiveSession {
            stop_tx,
            join,
            aux,
            handle,
        })
    }

    /// Probe once per runtime, in platform priority order; fall back to the
    /// first candidate when no probe is wired up or nothing reports support.
    async fn select_renderer_cached(&mut self) -> RendererSelection {
        if let Some(selection) = self.renderer_selection {
            return selection;
        }
        let probed = match self.probe.as_deref() {
            Some(probe) => select_renderer(probe).await,
            None => None,
        };
        let selection = probed.unwrap_or(RendererSelection {
            kind: probe_order()[0],
            hw_accel: HwAccel::PreferHardware,
        });
        self.renderer_selection = Some(selection);
        selection
    }

    /// Stop the live session (if any) and reset the port; the hot-plug
    /// watcher observes the resulting re-enumeration.
    async fn force_reset(&mut self, session: &mut Option<ActiveSession>) {
        let handle = match session.take() {
            Some(active) => {
                let handle = active.handle.clone();
                active.stop().await;
                Some(handle)
            }
            None => match device::find_dongle().await {
                Ok(Some(dev)) => match dev.open().await {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!("reset open failed: {e}");
                        None
                    }
                },
                _ => None,
            },
        };

        if let Some(handle) = handle {
            match device::reset_dongle(&handle).await {
                Ok(()) => info!("dongle reset issued"),
                Err(e) => warn!("reset failed: {e}"),
            }
        }
    }
}

async fn join_session(session: &mut Option<ActiveSession>) -> SessionOutcome {
    match session.as_mut() {
        Some(active) => match (&mut active.join).await {
            Ok(outcome) => outcome,
            Err(_) => SessionOutcome::Failed("session task panicked".into()),
        },
        None => std::future::pending().await,
    }
}

/// Audio lane task: packet routing plus the deferred nav-volume apply.
async fn audio_task(
    mut audio_rx: mpsc::Receiver<crate::protocol::frames::AudioPacket>,
    mut pipeline: AudioPipeline<Microphone>,
) {
    let mut nav_deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            maybe_packet = audio_rx.recv() => {
                let Some(packet) = maybe_packet else { break };
                if let Some(AudioAction::ApplyNavVolume { delay_ms }) =
                    pipeline.handle_packet(packet)
                {
                    nav_deadline = Some(Instant::now() + Duration::from_millis(delay_ms));
                }
            }
            _ = maybe_sleep(nav_deadline) => {
                nav_deadline = None;
                pipeline.apply_nav_volume();
            }
        }
    }
    pipeline.reset();
}

async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
