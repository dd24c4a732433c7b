/// Wire-level codec for the dongle protocol: framing, typed messages, NALU
/// helpers for the embedded H.264 stream. No IO lives here.
pub mod constants;
pub mod frames;
pub mod nalu;

pub use constants::{AudioCommand, CommandValue, FileAddress, MessageType, PhoneType, TouchAction};
pub use frames::{
    AudioBody, AudioPacket, FrameDecoder, FrameHeader, MediaPacket, Message, OpenInfo,
    ProtocolError, SendMessage, TouchPoint, VideoPacket,
};
