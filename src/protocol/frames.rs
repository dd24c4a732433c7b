use bytes::{BufMut, Bytes, BytesMut};
use log::warn;
use thiserror::Error;

use super::constants::*;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("bad frame magic {0:#010x}")]
    BadMagic(u32),
    #[error("header checksum mismatch for type {msg_type:#x}: expected {expected:#010x}, found {found:#010x}")]
    BadChecksum {
        msg_type: u32,
        expected: u32,
        found: u32,
    },
    #[error("declared payload length {0} exceeds maximum frame size")]
    Oversize(u32),
    #[error("truncated payload for type {msg_type:#x}: need {need} bytes, have {have}")]
    Truncated {
        msg_type: u32,
        need: usize,
        have: usize,
    },
    #[error("malformed json payload: {0}")]
    BadJson(#[from] serde_json::Error),
}

/// Parsed 16-byte frame header.
///
/// Layout (all LE): magic, type, payload length, checksum. The checksum the
/// firmware actually verifies is the bitwise complement of the type word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub msg_type: u32,
    pub payload_len: u32,
}

impl FrameHeader {
    pub fn parse(bytes: &[u8]) -> Result<Option<Self>, ProtocolError> {
        if bytes.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != FRAME_MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }
        let msg_type = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let payload_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let checksum = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        if checksum != !msg_type {
            return Err(ProtocolError::BadChecksum {
                msg_type,
                expected: !msg_type,
                found: checksum,
            });
        }
        if payload_len as usize > MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::Oversize(payload_len));
        }
        Ok(Some(Self {
            msg_type,
            payload_len,
        }))
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[0..4].copy_from_slice(&FRAME_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&self.msg_type.to_le_bytes());
        out[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        out[12..16].copy_from_slice(&(!self.msg_type).to_le_bytes());
        out
    }
}

/// Incremental frame decoder over the bulk-in byte stream.
///
/// Bytes are appended as they arrive from the transport; complete frames are
/// popped off the front. A partial header or payload stays buffered for the
/// next read. On a malformed header one byte is dropped so the scan can
/// resynchronise on the next magic word.
#[derive(Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete frame, if any.
    pub fn next_frame(&mut self) -> Result<Option<(u32, Bytes)>, ProtocolError> {
        let header = match FrameHeader::parse(&self.buf) {
            Ok(None) => return Ok(None),
            Ok(Some(h)) => h,
            Err(e @ ProtocolError::Oversize(_)) => {
                // Reject the frame outright; the declared payload is never read.
                let _ = self.buf.split_to(FRAME_HEADER_LEN);
                return Err(e);
            }
            Err(e) => {
                // Resync: shift by one byte and let the caller retry.
                let _ = self.buf.split_to(1);
                return Err(e);
            }
        };

        let total = FRAME_HEADER_LEN + header.payload_len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }

        let mut frame = self.buf.split_to(total);
        let payload = frame.split_off(FRAME_HEADER_LEN).freeze();
        Ok(Some((header.msg_type, payload)))
    }
}

/// Echo of the Open blob the dongle returns once it accepts a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: u32,
    pub packet_max: u32,
    pub i_box_version: u32,
    pub phone_work_mode: u32,
}

#[derive(Debug, Clone)]
pub struct VideoPacket {
    pub width: u32,
    pub height: u32,
    pub flags: u32,
    pub timestamp: u32,
    /// Annex-B H.264 stream, vendor header already stripped.
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioBody {
    Control {
        command: Option<AudioCommand>,
        raw_command: u32,
        volume: f32,
        duration_ms: u32,
    },
    Pcm(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioPacket {
    pub decode_type: u8,
    pub audio_type: u8,
    pub body: AudioBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaPacket {
    Data(serde_json::Value),
    AlbumCover(Bytes),
}

/// Every inbound message the dongle can produce. Unknown tags are carried
/// through rather than dropped so upper layers can log them.
#[derive(Debug, Clone)]
pub enum Message {
    Opened(OpenInfo),
    Plugged { phone_type: u32, wifi: Option<u32> },
    Unplugged,
    Phase(u32),
    VideoData(VideoPacket),
    AudioData(AudioPacket),
    MediaData(MediaPacket),
    Command(u32),
    BoxInfo(serde_json::Value),
    SoftwareVersion(String),
    HeartBeat,
    Unknown { msg_type: u32, payload: Bytes },
}

fn need(msg_type: u32, payload: &[u8], n: usize) -> Result<(), ProtocolError> {
    if payload.len() < n {
        return Err(ProtocolError::Truncated {
            msg_type,
            need: n,
            have: payload.len(),
        });
    }
    Ok(())
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn json_from_c_string(raw: &[u8]) -> Result<serde_json::Value, ProtocolError> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    Ok(serde_json::from_slice(&raw[..end])?)
}

impl Message {
    pub fn parse(msg_type: u32, payload: Bytes) -> Result<Message, ProtocolError> {
        let Some(kind) = MessageType::from_u32(msg_type) else {
            return Ok(Message::Unknown { msg_type, payload });
        };

        match kind {
            MessageType::Open => {
                need(msg_type, &payload, 28)?;
                Ok(Message::Opened(OpenInfo {
                    width: le_u32(&payload, 0),
                    height: le_u32(&payload, 4),
                    fps: le_u32(&payload, 8),
                    format: le_u32(&payload, 12),
                    packet_max: le_u32(&payload, 16),
                    i_box_version: le_u32(&payload, 20),
                    phone_work_mode: le_u32(&payload, 24),
                }))
            }
            MessageType::Plugged => {
                need(msg_type, &payload, 4)?;
                let wifi = (payload.len() >= 8).then(|| le_u32(&payload, 4));
                Ok(Message::Plugged {
                    phone_type: le_u32(&payload, 0),
                    wifi,
                })
            }
            MessageType::Unplugged => Ok(Message::Unplugged),
            MessageType::Phase => {
                need(msg_type, &payload, 4)?;
                Ok(Message::Phase(le_u32(&payload, 0)))
            }
            MessageType::VideoData => {
                need(msg_type, &payload, VIDEO_VENDOR_HEADER_LEN)?;
                let width = le_u32(&payload, 0);
                let height = le_u32(&payload, 4);
                let flags = le_u32(&payload, 8);
                let timestamp = le_u32(&payload, 16);
                Ok(Message::VideoData(VideoPacket {
                    width,
                    height,
                    flags,
                    timestamp,
                    payload: payload.slice(VIDEO_VENDOR_HEADER_LEN..),
                }))
            }
            MessageType::AudioData => {
                need(msg_type, &payload, AUDIO_PREFIX_LEN)?;
                let decode_type = payload[0];
                let audio_type = payload[1];
                let rest = payload.slice(AUDIO_PREFIX_LEN..);
                let body = if rest.len() == AUDIO_CONTROL_BLOCK_LEN {
                    let raw_command = le_u32(&rest, 0);
                    AudioBody::Control {
                        command: AudioCommand::from_u32(raw_command),
                        raw_command,
                        volume: f32::from_le_bytes(rest[4..8].try_into().unwrap()),
                        duration_ms: le_u32(&rest, 8),
                    }
                } else {
                    AudioBody::Pcm(rest)
                };
                Ok(Message::AudioData(AudioPacket {
                    decode_type,
                    audio_type,
                    body,
                }))
            }
            MessageType::Command => {
                need(msg_type, &payload, 4)?;
                Ok(Message::Command(le_u32(&payload, 0)))
            }
            MessageType::MediaData => {
                need(msg_type, &payload, 4)?;
                let media_type = le_u32(&payload, 0);
                match media_type {
                    1 => Ok(Message::MediaData(MediaPacket::Data(json_from_c_string(
                        &payload[4..],
                    )?))),
                    3 => Ok(Message::MediaData(MediaPacket::AlbumCover(
                        payload.slice(4..),
                    ))),
                    other => {
                        warn!("unhandled media payload type {other}");
                        Ok(Message::Unknown { msg_type, payload })
                    }
                }
            }
            MessageType::BoxInfo => Ok(Message::BoxInfo(json_from_c_string(&payload)?)),
            MessageType::SoftwareVersion => {
                let end = payload.iter().position(|b| *b == 0).unwrap_or(payload.len());
                Ok(Message::SoftwareVersion(
                    String::from_utf8_lossy(&payload[..end]).into_owned(),
                ))
            }
            MessageType::HeartBeat => Ok(Message::HeartBeat),
            // Outbound-only tags looping back are surfaced, not invented.
            _ => Ok(Message::Unknown { msg_type, payload }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub action: TouchAction,
}

/// Outbound traffic categories, used by the writer queue's overflow policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendCategory {
    Control,
    Touch,
    Media,
}

/// Every outbound message the driver can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum SendMessage {
    Open {
        width: u32,
        height: u32,
        fps: u32,
        format: u32,
        packet_max: u32,
        i_box_version: u32,
        phone_work_mode: u32,
    },
    File {
        address: FileAddress,
        content: Vec<u8>,
    },
    BoxSettings(serde_json::Value),
    Command(CommandValue),
    Touch {
        x: f32,
        y: f32,
        action: TouchAction,
    },
    MultiTouch(Vec<TouchPoint>),
    Audio {
        decode_type: u8,
        audio_type: u8,
        pcm: Bytes,
    },
    HeartBeat,
    DisconnectPhone,
    CloseDongle,
}

impl SendMessage {
    /// File write carrying a little-endian u32 (DPI, hand-drive mode, ...).
    pub fn number(address: FileAddress, value: u32) -> Self {
        Self::File {
            address,
            content: value.to_le_bytes().to_vec(),
        }
    }

    /// File write carrying a boolean as a u32.
    pub fn boolean(address: FileAddress, value: bool) -> Self {
        Self::number(address, value as u32)
    }

    /// File write carrying an ASCII string.
    pub fn text(address: FileAddress, value: &str) -> Self {
        Self::File {
            address,
            content: value.as_bytes().to_vec(),
        }
    }

    pub fn msg_type(&self) -> MessageType {
        match self {
            Self::Open { .. } => MessageType::Open,
            Self::File { .. } => MessageType::SendFile,
            Self::BoxSettings(_) => MessageType::BoxSettings,
            Self::Command(_) => MessageType::Command,
            Self::Touch { .. } => MessageType::Touch,
            Self::MultiTouch(_) => MessageType::MultiTouch,
            Self::Audio { .. } => MessageType::AudioData,
            Self::HeartBeat => MessageType::HeartBeat,
            Self::DisconnectPhone => MessageType::DisconnectPhone,
            Self::CloseDongle => MessageType::CloseDongle,
        }
    }

    pub fn category(&self) -> SendCategory {
        match self {
            Self::Touch { .. } | Self::MultiTouch(_) => SendCategory::Touch,
            Self::Audio { .. } => SendCategory::Media,
            _ => SendCategory::Control,
        }
    }

    /// True for frames the writer queue may coalesce: touch snapshots in
    /// which no pointer changes state.
    pub fn is_move_only(&self) -> bool {
        match self {
            Self::Touch { action, .. } => *action == TouchAction::Move,
            Self::MultiTouch(points) => points.iter().all(|p| p.action == TouchAction::Move),
            _ => false,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Self::Open {
                width,
                height,
                fps,
                format,
                packet_max,
                i_box_version,
                phone_work_mode,
            } => {
                let mut buf = BytesMut::with_capacity(28);
                buf.put_u32_le(*width);
                buf.put_u32_le(*height);
                buf.put_u32_le(*fps);
                buf.put_u32_le(*format);
                buf.put_u32_le(*packet_max);
                buf.put_u32_le(*i_box_version);
                buf.put_u32_le(*phone_work_mode);
                buf.to_vec()
            }
            Self::File { address, content } => {
                let name = address.path().as_bytes();
                let mut buf = BytesMut::with_capacity(8 + name.len() + 1 + content.len());
                buf.put_u32_le(name.len() as u32 + 1);
                buf.put_slice(name);
                buf.put_u8(0);
                buf.put_u32_le(content.len() as u32);
                buf.put_slice(content);
                buf.to_vec()
            }
            Self::BoxSettings(settings) => {
                serde_json::to_vec(settings).unwrap_or_default()
            }
            Self::Command(value) => (*value as u32).to_le_bytes().to_vec(),
            Self::Touch { x, y, action } => {
                let mut buf = BytesMut::with_capacity(12);
                buf.put_f32_le(clamp_unit(*x));
                buf.put_f32_le(clamp_unit(*y));
                buf.put_u32_le(*action as u32);
                buf.to_vec()
            }
            Self::MultiTouch(points) => {
                let mut buf = BytesMut::with_capacity(4 + points.len() * 16);
                buf.put_u32_le(points.len() as u32);
                for p in points {
                    buf.put_u32_le(p.id);
                    buf.put_f32_le(clamp_unit(p.x));
                    buf.put_f32_le(clamp_unit(p.y));
                    buf.put_u32_le(p.action as u32);
                }
                buf.to_vec()
            }
            Self::Audio {
                decode_type,
                audio_type,
                pcm,
            } => {
                let mut buf = BytesMut::with_capacity(AUDIO_PREFIX_LEN + pcm.len());
                buf.put_u8(*decode_type);
                buf.put_u8(*audio_type);
                buf.put_u16_le(0);
                buf.put_slice(pcm);
                buf.to_vec()
            }
            Self::HeartBeat | Self::DisconnectPhone | Self::CloseDongle => Vec::new(),
        }
    }

    /// Framed wire bytes: header followed by the type-specific payload.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload();
        let header = FrameHeader {
            msg_type: self.msg_type() as u32,
            payload_len: payload.len() as u32,
        };
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&payload);
        out
    }
}

/// Out-of-range and NaN coordinates are clamped into the unit square.
fn clamp_unit(v: f32) -> f32 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(msg_type: u32, payload: &[u8]) -> Vec<u8> {
        let header = FrameHeader {
            msg_type,
            payload_len: payload.len() as u32,
        };
        let mut out = header.encode().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn header_round_trip() {
        let header = FrameHeader {
            msg_type: MessageType::VideoData as u32,
            payload_len: 512,
        };
        let encoded = header.encode();
        let parsed = FrameHeader::parse(&encoded).unwrap().unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.encode(), encoded);
    }

    #[test]
    fn truncated_header_yields_nothing_and_retains_bytes() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&FRAME_MAGIC.to_le_bytes());
        decoder.extend(&[0x06, 0x00]);
        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.buffered(), 6);
    }

    #[test]
    fn bad_checksum_resyncs_by_one_byte() {
        let mut bytes = frame_bytes(MessageType::Command as u32, &[1, 0, 0, 0]);
        bytes[12] ^= 0xFF;
        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);
        assert!(matches!(
            decoder.next_frame(),
            Err(ProtocolError::BadChecksum { .. })
        ));
        assert_eq!(decoder.buffered(), bytes.len() - 1);
    }

    #[test]
    fn oversize_frame_rejected_without_consuming_payload() {
        let mut header = FrameHeader {
            msg_type: MessageType::VideoData as u32,
            payload_len: 0,
        }
        .encode();
        header[8..12].copy_from_slice(&((MAX_FRAME_PAYLOAD as u32) + 1).to_le_bytes());
        let mut decoder = FrameDecoder::new();
        decoder.extend(&header);
        decoder.extend(&[0xEE; 32]);
        assert!(matches!(
            decoder.next_frame(),
            Err(ProtocolError::Oversize(_))
        ));
        // Only the header was consumed; trailing bytes stay for resync.
        assert_eq!(decoder.buffered(), 32);
    }

    #[test]
    fn frames_split_across_reads_reassemble() {
        let payload = [0x05, 0x00, 0x00, 0x00];
        let bytes = frame_bytes(MessageType::Command as u32, &payload);
        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes[..9]);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.extend(&bytes[9..]);
        let (msg_type, body) = decoder.next_frame().unwrap().unwrap();
        assert_eq!(msg_type, MessageType::Command as u32);
        assert_eq!(&body[..], &payload);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn touch_encoding_matches_wire_layout() {
        let msg = SendMessage::Touch {
            x: 0.25,
            y: 0.5,
            action: TouchAction::Down,
        };
        let encoded = msg.encode();
        assert_eq!(encoded.len(), FRAME_HEADER_LEN + 12);
        assert_eq!(
            &encoded[FRAME_HEADER_LEN..],
            &[
                0x00, 0x00, 0x80, 0x3E, // 0.25f LE
                0x00, 0x00, 0x00, 0x3F, // 0.5f LE
                0x00, 0x00, 0x00, 0x00, // Down = 0
            ]
        );
    }

    #[test]
    fn touch_coordinates_clamped() {
        let msg = SendMessage::Touch {
            x: f32::NAN,
            y: 7.5,
            action: TouchAction::Move,
        };
        let encoded = msg.encode();
        let x = f32::from_le_bytes(encoded[16..20].try_into().unwrap());
        let y = f32::from_le_bytes(encoded[20..24].try_into().unwrap());
        assert_eq!(x, 0.0);
        assert_eq!(y, 1.0);
    }

    #[test]
    fn audio_control_block_decodes() {
        let mut payload = vec![5u8, 5, 0, 0];
        payload.extend_from_slice(&8u32.to_le_bytes()); // SiriStart
        payload.extend_from_slice(&0.5f32.to_le_bytes());
        payload.extend_from_slice(&250u32.to_le_bytes());
        let msg = Message::parse(MessageType::AudioData as u32, Bytes::from(payload)).unwrap();
        let Message::AudioData(pkt) = msg else {
            panic!("expected audio data");
        };
        assert_eq!(pkt.decode_type, 5);
        assert_eq!(pkt.audio_type, 5);
        assert_eq!(
            pkt.body,
            AudioBody::Control {
                command: Some(AudioCommand::SiriStart),
                raw_command: 8,
                volume: 0.5,
                duration_ms: 250,
            }
        );
    }

    #[test]
    fn audio_pcm_body_decodes() {
        let mut payload = vec![1u8, 1, 0, 0];
        payload.extend(std::iter::repeat_n([0x34u8, 0x12], 64).flatten());
        let msg = Message::parse(MessageType::AudioData as u32, Bytes::from(payload)).unwrap();
        let Message::AudioData(pkt) = msg else {
            panic!("expected audio data");
        };
        let AudioBody::Pcm(pcm) = pkt.body else {
            panic!("expected pcm body");
        };
        assert_eq!(pcm.len(), 128);
    }

    #[test]
    fn video_vendor_header_stripped() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&800u32.to_le_bytes());
        payload.extend_from_slice(&480u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&6u32.to_le_bytes());
        payload.extend_from_slice(&1234u32.to_le_bytes());
        payload.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88]);
        let msg = Message::parse(MessageType::VideoData as u32, Bytes::from(payload)).unwrap();
        let Message::VideoData(pkt) = msg else {
            panic!("expected video data");
        };
        assert_eq!((pkt.width, pkt.height), (800, 480));
        assert_eq!(pkt.timestamp, 1234);
        assert_eq!(&pkt.payload[..4], &[0, 0, 0, 1]);
    }

    #[test]
    fn unknown_type_carried_through() {
        let msg = Message::parse(0x7777, Bytes::from_static(&[1, 2, 3])).unwrap();
        let Message::Unknown { msg_type, payload } = msg else {
            panic!("expected unknown");
        };
        assert_eq!(msg_type, 0x7777);
        assert_eq!(&payload[..], &[1, 2, 3]);
    }

    #[test]
    fn opened_echo_round_trips_field_wise() {
        let sent = SendMessage::Open {
            width: 1280,
            height: 720,
            fps: 30,
            format: 5,
            packet_max: 49152,
            i_box_version: 2,
            phone_work_mode: 2,
        };
        let encoded = sent.encode();
        let parsed = Message::parse(
            MessageType::Open as u32,
            Bytes::copy_from_slice(&encoded[FRAME_HEADER_LEN..]),
        )
        .unwrap();
        let Message::Opened(info) = parsed else {
            panic!("expected opened");
        };
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert_eq!(info.fps, 30);
        assert_eq!(info.packet_max, 49152);
        // Same byte length both directions.
        assert_eq!(encoded.len() - FRAME_HEADER_LEN, 28);
    }

    #[test]
    fn file_payload_layout() {
        let msg = SendMessage::number(FileAddress::Dpi, 160);
        let encoded = msg.encode();
        let payload = &encoded[FRAME_HEADER_LEN..];
        let name = FileAddress::Dpi.path().as_bytes();
        assert_eq!(
            u32::from_le_bytes(payload[0..4].try_into().unwrap()),
            name.len() as u32 + 1
        );
        assert_eq!(&payload[4..4 + name.len()], name);
        assert_eq!(payload[4 + name.len()], 0);
        let content_at = 4 + name.len() + 1;
        assert_eq!(
            u32::from_le_bytes(payload[content_at..content_at + 4].try_into().unwrap()),
            4
        );
        assert_eq!(&payload[content_at + 4..], &160u32.to_le_bytes());
    }

    #[test]
    fn media_data_json_parses() {
        let mut payload = 1u32.to_le_bytes().to_vec();
        payload.extend_from_slice(br#"{"MediaSongName":"Song","MediaSongDuration":180}"#);
        payload.push(0);
        let msg = Message::parse(MessageType::MediaData as u32, Bytes::from(payload)).unwrap();
        let Message::MediaData(MediaPacket::Data(bag)) = msg else {
            panic!("expected media bag");
        };
        assert_eq!(bag["MediaSongName"], "Song");
    }
}
