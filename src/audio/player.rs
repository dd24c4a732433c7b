use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::events::CarlinkEvent;
use crate::mic::MicControl;
use crate::protocol::frames::{AudioBody, AudioPacket};
use crate::protocol::AudioCommand;

use super::registry::{decode_type_format, AudioFormat};
use super::ring::{ring_pair, RingWriter};
use super::volume::VolumeRamp;
use super::worklet::PcmWorklet;

/// One PCM stream identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub decode_type: u8,
    pub audio_type: u8,
}

impl StreamKey {
    /// Turn-by-turn guidance streams get their own volume channel.
    pub fn is_navigation(&self) -> bool {
        matches!(self.audio_type, 2 | 3)
    }
}

/// Hand-off sent to the host's audio output when a stream first appears.
/// The worklet wraps the ring's consumer side; the host calls `render` from
/// its audio callback.
pub struct PlayerHandoff {
    pub key: StreamKey,
    pub format: AudioFormat,
    pub worklet: PcmWorklet,
}

/// Deferred work the async audio task schedules on the pipeline's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioAction {
    /// Apply the navigation volume after the given delay.
    ApplyNavVolume { delay_ms: u64 },
}

struct Player {
    writer: RingWriter,
    volume: VolumeRamp,
    format: AudioFormat,
    /// i16 conversion scratch, reused across packets.
    scratch: Vec<i16>,
}

/// Routes AudioData packets to per-stream players and in-band commands to
/// the microphone bridge.
pub struct AudioPipeline<M: MicControl> {
    players: HashMap<StreamKey, Player>,
    handoff_tx: mpsc::Sender<PlayerHandoff>,
    event_tx: mpsc::Sender<CarlinkEvent>,
    mic: M,
    /// With the dongle in audio-transfer mode the host mic stays out of the
    /// path entirely.
    audio_transfer_mode: bool,
    audio_volume: f32,
    nav_volume: f32,
    unknown_reported: HashSet<u8>,
}

impl<M: MicControl> AudioPipeline<M> {
    pub fn new(
        handoff_tx: mpsc::Sender<PlayerHandoff>,
        event_tx: mpsc::Sender<CarlinkEvent>,
        mic: M,
        audio_transfer_mode: bool,
    ) -> Self {
        Self {
            players: HashMap::new(),
            handoff_tx,
            event_tx,
            mic,
            audio_transfer_mode,
            audio_volume: 1.0,
            nav_volume: 1.0,
            unknown_reported: HashSet::new(),
        }
    }

    pub fn set_volumes(&mut self, audio: f32, nav: f32) {
        self.audio_volume = audio.clamp(0.0, 1.0);
        self.nav_volume = nav.clamp(0.0, 1.0);
    }

    pub fn mic(&self) -> &M {
        &self.mic
    }

    /// Players die with the phone; a new connection starts clean.
    pub fn reset(&mut self) {
        self.players.clear();
        self.mic.stop();
    }

    /// Route one packet. Any deferred action is returned for the owning
    /// task to schedule.
    pub fn handle_packet(&mut self, packet: AudioPacket) -> Option<AudioAction> {
        let key = StreamKey {
            decode_type: packet.decode_type,
            audio_type: packet.audio_type,
        };
        match packet.body {
            AudioBody::Pcm(data) => {
                self.handle_pcm(key, data);
                None
            }
            AudioBody::Control {
                command,
                raw_command,
                volume,
                duration_ms,
            } => {
                if volume > 0.0 {
                    self.schedule_volume(key, volume, duration_ms);
                }
                match command {
                    Some(command) => self.route_command(command),
                    None => {
                        debug!("unknown audio command {raw_command}");
                        None
                    }
                }
            }
        }
    }

    fn handle_pcm(&mut self, key: StreamKey, data: Bytes) {
        let Some(format) = decode_type_format(key.decode_type) else {
            // Unknown stream metadata: drop the stream, report once.
            if self.unknown_reported.insert(key.decode_type) {
                warn!("dropping stream with unknown decode type {}", key.decode_type);
            }
            return;
        };

        if !self.players.contains_key(&key) {
            self.create_player(key, format);
        }
        let player = self.players.get_mut(&key).expect("player just created");

        player.scratch.clear();
        player.scratch.extend(
            data.chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        );
        player
            .volume
            .apply(&mut player.scratch, format.channels as usize);

        let pushed = player.writer.push_slice(&player.scratch);
        if pushed < player.scratch.len() {
            debug!(
                "ring full on {:?}: dropped {} samples (total {})",
                key,
                player.scratch.len() - pushed,
                player.writer.dropped()
            );
        }
    }

    fn create_player(&mut self, key: StreamKey, format: AudioFormat) {
        // Half a second of buffer per stream.
        let capacity = (format.frequency as usize / 2) * format.channels as usize;
        let (writer, reader) = ring_pair(capacity);

        let initial = if key.is_navigation() {
            self.nav_volume
        } else {
            self.audio_volume
        };

        info!(
            "new audio stream {:?}: {} Hz x{} ({})",
            key, format.frequency, format.channels, format.mime
        );

        let worklet = PcmWorklet::new(reader, format.channels as usize, format.frequency);
        if self
            .handoff_tx
            .try_send(PlayerHandoff {
                key,
                format,
                worklet,
            })
            .is_err()
        {
            warn!("audio hand-off consumer missing, stream will buffer only");
        }
        let _ = self.event_tx.try_send(CarlinkEvent::AudioInfo {
            codec: format.mime,
            sample_rate: format.frequency,
            channels: format.channels,
            bit_depth: format.bit_depth,
        });

        self.players.insert(
            key,
            Player {
                writer,
                volume: VolumeRamp::new(initial),
                format,
                scratch: Vec::new(),
            },
        );
    }

    fn schedule_volume(&mut self, key: StreamKey, volume: f32, duration_ms: u32) {
        if key.is_navigation() {
            self.nav_volume = volume.clamp(0.0, 1.0);
        } else {
            self.audio_volume = volume.clamp(0.0, 1.0);
        }
        if let Some(player) = self.players.get_mut(&key) {
            let rate = player.format.frequency;
            player.volume.ramp_to(volume, duration_ms, rate);
        }
    }

    fn route_command(&mut self, command: AudioCommand) -> Option<AudioAction> {
        match command {
            AudioCommand::SiriStart | AudioCommand::PhonecallStart => {
                if self.audio_transfer_mode {
                    debug!("audio transfer mode active, leaving host mic stopped");
                } else {
                    self.mic.start();
                }
                None
            }
            AudioCommand::SiriStop | AudioCommand::PhonecallStop => {
                self.mic.stop();
                None
            }
            AudioCommand::NaviStart => {
                // Give the stream a moment to exist before the volume lands.
                Some(AudioAction::ApplyNavVolume { delay_ms: 10 })
            }
            _ => None,
        }
    }

    /// Deferred navigation volume application.
    pub fn apply_nav_volume(&mut self) {
        let nav = self.nav_volume;
        for (key, player) in self.players.iter_mut() {
            if key.is_navigation() {
                let rate = player.format.frequency;
                player.volume.ramp_to(nav, 0, rate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMic {
        running: bool,
        starts: u32,
    }

    impl FakeMic {
        fn new() -> Self {
            Self {
                running: false,
                starts: 0,
            }
        }
    }

    impl MicControl for FakeMic {
        fn start(&mut self) {
            self.running = true;
            self.starts += 1;
        }
        fn stop(&mut self) {
            self.running = false;
        }
        fn is_running(&self) -> bool {
            self.running
        }
    }

    fn pipeline(
        audio_transfer_mode: bool,
    ) -> (
        AudioPipeline<FakeMic>,
        mpsc::Receiver<PlayerHandoff>,
        mpsc::Receiver<CarlinkEvent>,
    ) {
        let (handoff_tx, handoff_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(8);
        (
            AudioPipeline::new(handoff_tx, event_tx, FakeMic::new(), audio_transfer_mode),
            handoff_rx,
            event_rx,
        )
    }

    fn pcm_packet(decode_type: u8, audio_type: u8, samples: &[i16]) -> AudioPacket {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        AudioPacket {
            decode_type,
            audio_type,
            body: AudioBody::Pcm(Bytes::from(data)),
        }
    }

    fn command_packet(command: AudioCommand) -> AudioPacket {
        AudioPacket {
            decode_type: 5,
            audio_type: 5,
            body: AudioBody::Control {
                command: Some(command),
                raw_command: command as u32,
                volume: 0.0,
                duration_ms: 0,
            },
        }
    }

    #[test]
    fn lazy_player_creation_hands_off_once() {
        let (mut pipeline, mut handoff_rx, mut event_rx) = pipeline(false);
        pipeline.handle_packet(pcm_packet(1, 1, &[100, 200]));
        pipeline.handle_packet(pcm_packet(1, 1, &[300, 400]));

        let handoff = handoff_rx.try_recv().unwrap();
        assert_eq!(
            handoff.key,
            StreamKey {
                decode_type: 1,
                audio_type: 1
            }
        );
        assert_eq!(handoff.format.frequency, 44_100);
        assert!(handoff_rx.try_recv().is_err());

        assert!(matches!(
            event_rx.try_recv().unwrap(),
            CarlinkEvent::AudioInfo {
                sample_rate: 44_100,
                channels: 2,
                ..
            }
        ));
    }

    #[test]
    fn pcm_reaches_the_ring_through_the_worklet_side() {
        let (mut pipeline, mut handoff_rx, _events) = pipeline(false);
        pipeline.handle_packet(pcm_packet(5, 1, &[10, 20, 30]));
        let handoff = handoff_rx.try_recv().unwrap();
        // decode type 5 is 16 kHz mono; three samples buffered.
        assert_eq!(handoff.worklet.sample_rate(), 16_000);
        assert_eq!(handoff.worklet.channels(), 1);
    }

    #[test]
    fn unknown_decode_type_dropped_and_reported_once() {
        let (mut pipeline, mut handoff_rx, _events) = pipeline(false);
        pipeline.handle_packet(pcm_packet(42, 1, &[1, 2]));
        pipeline.handle_packet(pcm_packet(42, 1, &[3, 4]));
        assert!(handoff_rx.try_recv().is_err());
        assert!(pipeline.players.is_empty());
        assert_eq!(pipeline.unknown_reported.len(), 1);
    }

    #[test]
    fn siri_commands_drive_the_mic() {
        let (mut pipeline, _handoffs, _events) = pipeline(false);
        assert!(!pipeline.mic().is_running());

        pipeline.handle_packet(command_packet(AudioCommand::SiriStart));
        assert!(pipeline.mic().is_running());

        pipeline.handle_packet(command_packet(AudioCommand::SiriStop));
        assert!(!pipeline.mic().is_running());
    }

    #[test]
    fn audio_transfer_mode_keeps_mic_stopped() {
        let (mut pipeline, _handoffs, _events) = pipeline(true);
        pipeline.handle_packet(command_packet(AudioCommand::SiriStart));
        assert!(!pipeline.mic().is_running());
        pipeline.handle_packet(command_packet(AudioCommand::SiriStop));
        assert!(!pipeline.mic().is_running());
    }

    #[test]
    fn phonecall_commands_also_drive_the_mic() {
        let (mut pipeline, _handoffs, _events) = pipeline(false);
        pipeline.handle_packet(command_packet(AudioCommand::PhonecallStart));
        assert!(pipeline.mic().is_running());
        pipeline.handle_packet(command_packet(AudioCommand::PhonecallStop));
        assert!(!pipeline.mic().is_running());
    }

    #[test]
    fn navi_start_defers_nav_volume() {
        let (mut pipeline, _handoffs, _events) = pipeline(false);
        let action = pipeline.handle_packet(command_packet(AudioCommand::NaviStart));
        assert_eq!(action, Some(AudioAction::ApplyNavVolume { delay_ms: 10 }));
    }

    #[test]
    fn volume_block_targets_the_right_channel() {
        let (mut pipeline, _handoffs, _events) = pipeline(false);
        // Nav stream (audio_type 2) volume applies to the nav channel.
        pipeline.handle_packet(AudioPacket {
            decode_type: 1,
            audio_type: 2,
            body: AudioBody::Control {
                command: None,
                raw_command: 0,
                volume: 0.3,
                duration_ms: 100,
            },
        });
        assert_eq!(pipeline.nav_volume, 0.3);
        assert_eq!(pipeline.audio_volume, 1.0);
    }
}
