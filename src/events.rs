use bytes::Bytes;

use crate::driver::config::DongleConfig;
use crate::protocol::frames::{MediaPacket, TouchPoint};
use crate::protocol::{CommandValue, PhoneType, TouchAction};
use crate::transport::DongleInfo;

/// Events the core surfaces to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum CarlinkEvent {
    Plugged {
        phone_type: Option<PhoneType>,
    },
    Unplugged,
    Resolution {
        width: u32,
        height: u32,
    },
    AudioInfo {
        codec: &'static str,
        sample_rate: u32,
        channels: u16,
        bit_depth: u16,
    },
    MediaMeta(MediaState),
    Command(CommandValue),
    DongleInfo(DongleInfo),
    Failure(String),
}

/// Commands the host pushes down into the core.
#[derive(Debug, Clone)]
pub enum HostCommand {
    Start,
    Stop,
    SendKey(CommandValue),
    SendTouch {
        x: f32,
        y: f32,
        action: TouchAction,
    },
    SendMultiTouch(Vec<TouchPoint>),
    SetConfig(DongleConfig),
    ForceReset,
}

/// Merged now-playing state.
///
/// The dongle alternates between metadata bags and album art; each update
/// preserves whatever the other kind last delivered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaState {
    pub bag: serde_json::Value,
    pub image: Option<Bytes>,
}

impl MediaState {
    pub fn merge(&mut self, packet: MediaPacket) {
        match packet {
            MediaPacket::Data(update) => match (self.bag.as_object_mut(), update) {
                (Some(bag), serde_json::Value::Object(update)) => {
                    for (key, value) in update {
                        bag.insert(key, value);
                    }
                }
                (_, update) => self.bag = update,
            },
            MediaPacket::AlbumCover(image) => {
                self.image = Some(image);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn album_cover_preserves_metadata_and_vice_versa() {
        let mut state = MediaState::default();
        state.merge(MediaPacket::Data(json!({
            "MediaSongName": "Song",
            "MediaArtistName": "Artist",
        })));
        state.merge(MediaPacket::AlbumCover(Bytes::from_static(b"png")));
        assert_eq!(state.bag["MediaSongName"], "Song");
        assert_eq!(state.image.as_deref(), Some(&b"png"[..]));

        state.merge(MediaPacket::Data(json!({ "MediaSongName": "Next" })));
        assert_eq!(state.bag["MediaSongName"], "Next");
        // Partial updates keep unrelated fields and the cover.
        assert_eq!(state.bag["MediaArtistName"], "Artist");
        assert!(state.image.is_some());
    }
}
