use log::{debug, info, warn};

use crate::events::CarlinkEvent;
use crate::protocol::frames::{Message, SendMessage};
use crate::protocol::{CommandValue, FileAddress, PhoneType};
use crate::transport::DongleInfo;

use super::config::DongleConfig;

/// Session lifecycle. Only the transitions encoded in [`SessionFsm`] are
/// legal; anything else is rejected where it is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opened,
    Initialised,
    Configured,
    Streaming,
    Failed,
}

/// Instructions the state machine hands back to the driver task.
#[derive(Debug, PartialEq)]
pub enum Effect {
    Send(SendMessage),
    Emit(CarlinkEvent),
    ArmPairTimeout,
    DisarmPairTimeout,
    /// `Some(interval_ms)` starts the frame keep-alive, `None` stops it.
    FrameHeartbeat(Option<u64>),
}

/// Pure session state machine: consumes inbound messages, produces outbound
/// frames and upward events. All IO stays in the driver task, which keeps
/// every transition unit-testable.
pub struct SessionFsm {
    config: DongleConfig,
    info: DongleInfo,
    state: SessionState,
    phone_type: Option<PhoneType>,
    last_resolution: Option<(u32, u32)>,
    media_seen: bool,
    wifi_pair_sent: bool,
}

impl SessionFsm {
    pub fn new(config: DongleConfig, info: DongleInfo) -> Self {
        Self {
            config,
            info,
            state: SessionState::Opened,
            phone_type: None,
            last_resolution: None,
            media_seen: false,
            wifi_pair_sent: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &DongleConfig {
        &self.config
    }

    /// Initialisation burst sent right after the interface is claimed. The
    /// session stays in Opened until the dongle acknowledges.
    pub fn init_sequence(&self) -> Vec<Effect> {
        let c = &self.config;
        vec![
            Effect::Emit(CarlinkEvent::DongleInfo(self.info.clone())),
            Effect::Send(SendMessage::number(FileAddress::Dpi, c.dpi)),
            Effect::Send(SendMessage::Open {
                width: c.width,
                height: c.height,
                fps: c.fps,
                format: c.format,
                packet_max: c.packet_max,
                i_box_version: c.i_box_version,
                phone_work_mode: c.phone_work_mode,
            }),
            Effect::Send(SendMessage::boolean(FileAddress::NightMode, c.night_mode)),
            Effect::Send(SendMessage::number(
                FileAddress::HandDriveMode,
                c.drive_hand as u32,
            )),
            Effect::Send(SendMessage::boolean(FileAddress::ChargeMode, true)),
            Effect::Send(SendMessage::text(FileAddress::BoxName, &c.car_name)),
        ]
    }

    /// Configuration burst sent once the init sequence is acknowledged.
    fn config_sequence(&self) -> Vec<Effect> {
        let c = &self.config;
        let mut settings = c.box_settings(None);
        settings["OemName"] = c.oem_name.clone().into();

        let mut effects = vec![Effect::Send(SendMessage::BoxSettings(settings))];
        for icon in &c.icons {
            effects.push(Effect::Send(SendMessage::File {
                address: icon.address.into(),
                content: icon.content.clone(),
            }));
        }
        effects.push(Effect::Send(SendMessage::Command(CommandValue::WifiEnable)));
        effects.push(Effect::Send(SendMessage::Command(match c.wifi_band {
            super::config::WifiBand::Ghz5 => CommandValue::Wifi5g,
            super::config::WifiBand::Ghz2_4 => CommandValue::Wifi24g,
        })));
        effects.push(Effect::Send(SendMessage::Command(CommandValue::Mic)));
        effects.push(Effect::Send(SendMessage::Command(
            if c.audio_transfer_mode {
                CommandValue::AudioTransferOn
            } else {
                CommandValue::AudioTransferOff
            },
        )));
        effects
    }

    /// Feed one inbound message through the state machine.
    pub fn on_message(&mut self, message: &Message) -> Vec<Effect> {
        match message {
            Message::Phase(phase) => {
                debug!("dongle phase {phase}");
                self.on_ack()
            }
            Message::Opened(info) => {
                debug!(
                    "dongle accepted open: {}x{}@{}fps",
                    info.width, info.height, info.fps
                );
                self.on_ack()
            }
            Message::BoxInfo(settings) => self.on_box_info(settings),
            Message::Plugged { phone_type, wifi } => {
                let phone = PhoneType::from_u32(*phone_type);
                if phone.is_none() {
                    warn!("unknown phone type {phone_type}");
                }
                info!("phone plugged: {phone:?} wifi={wifi:?}");
                self.phone_type = phone;
                let mut effects = vec![Effect::Emit(CarlinkEvent::Plugged { phone_type: phone })];
                if self.state == SessionState::Streaming {
                    if let Some(interval) = phone.and_then(|p| self.config.frame_interval_for(p)) {
                        effects.push(Effect::FrameHeartbeat(Some(interval)));
                    }
                }
                effects
            }
            Message::Unplugged => {
                info!("phone unplugged");
                self.phone_type = None;
                vec![
                    Effect::FrameHeartbeat(None),
                    Effect::Emit(CarlinkEvent::Unplugged),
                ]
            }
            Message::SoftwareVersion(version) => {
                self.info.fw_version = version.clone();
                vec![Effect::Emit(CarlinkEvent::DongleInfo(self.info.clone()))]
            }
            Message::HeartBeat => Vec::new(),
            Message::VideoData(_) | Message::AudioData(_) | Message::MediaData(_) => {
                // Media payloads travel through the demux; only the arrival
                // itself matters to the state machine.
                self.observe_media()
            }
            Message::Command(_) => {
                // Routed by the demux command lane.
                Vec::new()
            }
            Message::Unknown { msg_type, payload } => {
                debug!(
                    "unknown message type {msg_type:#x} ({} bytes)",
                    payload.len()
                );
                Vec::new()
            }
        }
    }

    fn on_ack(&mut self) -> Vec<Effect> {
        match self.state {
            SessionState::Opened => {
                self.state = SessionState::Initialised;
                info!("session initialised, pushing configuration");
                self.config_sequence()
            }
            _ => Vec::new(),
        }
    }

    fn on_box_info(&mut self, settings: &serde_json::Value) -> Vec<Effect> {
        debug!("box info: {settings}");
        match self.state {
            SessionState::Initialised => {
                self.state = SessionState::Configured;
                info!("session configured, starting stream");
                // Sending the start command moves us straight into
                // Streaming; the pair timeout covers a phone that never
                // joins the dongle's network.
                self.state = SessionState::Streaming;
                vec![
                    Effect::Send(SendMessage::Command(CommandValue::WifiConnect)),
                    Effect::ArmPairTimeout,
                ]
            }
            _ => Vec::new(),
        }
    }

    /// First media delivery disarms the pair timeout.
    fn observe_media(&mut self) -> Vec<Effect> {
        if self.media_seen {
            return Vec::new();
        }
        self.media_seen = true;
        vec![Effect::DisarmPairTimeout]
    }

    /// Resolution changes surface upward; the video pipeline handles the
    /// pixels themselves.
    pub fn observe_video_geometry(&mut self, width: u32, height: u32) -> Option<Effect> {
        if self.last_resolution == Some((width, height)) {
            return None;
        }
        self.last_resolution = Some((width, height));
        Some(Effect::Emit(CarlinkEvent::Resolution { width, height }))
    }

    /// Pair timeout expiry: ask the dongle to advertise pairing, once.
    pub fn on_pair_timeout(&mut self) -> Option<Effect> {
        if self.media_seen || self.wifi_pair_sent || self.state != SessionState::Streaming {
            return None;
        }
        self.wifi_pair_sent = true;
        info!("no media within pair window, requesting wifi pairing");
        Some(Effect::Send(SendMessage::Command(CommandValue::WifiPair)))
    }

    /// Teardown burst for a graceful stop.
    pub fn stop_sequence(&mut self) -> Vec<Effect> {
        if self.state == SessionState::Closed {
            return Vec::new();
        }
        self.state = SessionState::Closed;
        vec![
            Effect::FrameHeartbeat(None),
            Effect::DisarmPairTimeout,
            Effect::Send(SendMessage::DisconnectPhone),
            Effect::Send(SendMessage::CloseDongle),
        ]
    }

    pub fn fail(&mut self, reason: &str) -> Effect {
        self.state = SessionState::Failed;
        Effect::Emit(CarlinkEvent::Failure(reason.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn fsm() -> SessionFsm {
        SessionFsm::new(
            DongleConfig::default(),
            DongleInfo {
                serial: "0001".into(),
                manufacturer: "Carlinkit".into(),
                product: "CPC200".into(),
                fw_version: "2.01".into(),
            },
        )
    }

    fn sends(effects: &[Effect]) -> Vec<&SendMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    fn drive_to_streaming(fsm: &mut SessionFsm) {
        fsm.on_message(&Message::Phase(1));
        fsm.on_message(&Message::BoxInfo(json!({})));
        assert_eq!(fsm.state(), SessionState::Streaming);
    }

    #[test]
    fn full_bring_up_path() {
        let mut fsm = fsm();
        assert_eq!(fsm.state(), SessionState::Opened);

        let init = fsm.init_sequence();
        assert!(matches!(init[0], Effect::Emit(CarlinkEvent::DongleInfo(_))));
        assert!(sends(&init)
            .iter()
            .any(|m| matches!(m, SendMessage::Open { .. })));

        let configured = fsm.on_message(&Message::Phase(2));
        assert_eq!(fsm.state(), SessionState::Initialised);
        assert!(sends(&configured)
            .iter()
            .any(|m| matches!(m, SendMessage::BoxSettings(_))));

        let started = fsm.on_message(&Message::BoxInfo(json!({"boxVersion": "3.0"})));
        assert_eq!(fsm.state(), SessionState::Streaming);
        assert!(started.contains(&Effect::Send(SendMessage::Command(
            CommandValue::WifiConnect
        ))));
        assert!(started.contains(&Effect::ArmPairTimeout));
    }

    #[test]
    fn ack_in_wrong_state_is_ignored() {
        let mut fsm = fsm();
        drive_to_streaming(&mut fsm);
        assert!(fsm.on_message(&Message::Phase(3)).is_empty());
        assert_eq!(fsm.state(), SessionState::Streaming);
    }

    #[test]
    fn box_info_before_init_does_not_transition() {
        let mut fsm = fsm();
        assert!(fsm.on_message(&Message::BoxInfo(json!({}))).is_empty());
        assert_eq!(fsm.state(), SessionState::Opened);
    }

    #[test]
    fn pair_timeout_fires_exactly_once() {
        let mut fsm = fsm();
        drive_to_streaming(&mut fsm);
        let first = fsm.on_pair_timeout();
        assert_eq!(
            first,
            Some(Effect::Send(SendMessage::Command(CommandValue::WifiPair)))
        );
        assert_eq!(fsm.on_pair_timeout(), None);
    }

    #[test]
    fn media_arrival_disarms_pair_timeout() {
        let mut fsm = fsm();
        drive_to_streaming(&mut fsm);
        let effects = fsm.on_message(&Message::AudioData(crate::protocol::AudioPacket {
            decode_type: 1,
            audio_type: 1,
            body: crate::protocol::AudioBody::Pcm(Bytes::from_static(&[0u8; 8])),
        }));
        assert!(effects.contains(&Effect::DisarmPairTimeout));
        assert_eq!(fsm.on_pair_timeout(), None);
    }

    #[test]
    fn plugged_phone_starts_frame_heartbeat_when_configured() {
        let mut fsm = fsm();
        drive_to_streaming(&mut fsm);
        let effects = fsm.on_message(&Message::Plugged {
            phone_type: PhoneType::CarPlay as u32,
            wifi: Some(1),
        });
        assert!(effects.contains(&Effect::FrameHeartbeat(Some(5000))));

        let effects = fsm.on_message(&Message::Unplugged);
        assert!(effects.contains(&Effect::FrameHeartbeat(None)));
    }

    #[test]
    fn android_auto_has_no_frame_heartbeat() {
        let mut fsm = fsm();
        drive_to_streaming(&mut fsm);
        let effects = fsm.on_message(&Message::Plugged {
            phone_type: PhoneType::AndroidAuto as u32,
            wifi: None,
        });
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::FrameHeartbeat(Some(_)))));
    }

    #[test]
    fn resolution_emitted_on_change_only() {
        let mut fsm = fsm();
        assert!(fsm.observe_video_geometry(800, 480).is_some());
        assert!(fsm.observe_video_geometry(800, 480).is_none());
        assert!(fsm.observe_video_geometry(1280, 720).is_some());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut fsm = fsm();
        drive_to_streaming(&mut fsm);
        let effects = fsm.stop_sequence();
        assert!(sends(&effects)
            .iter()
            .any(|m| matches!(m, SendMessage::CloseDongle)));
        assert_eq!(fsm.state(), SessionState::Closed);
        assert!(fsm.stop_sequence().is_empty());
    }
}
