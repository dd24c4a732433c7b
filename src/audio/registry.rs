/// PCM stream parameters keyed by the dongle's decode type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub mime: &'static str,
    pub frequency: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

const fn pcm(frequency: u32, channels: u16) -> AudioFormat {
    AudioFormat {
        mime: "audio/pcm",
        frequency,
        channels,
        bit_depth: 16,
    }
}

/// Closed mapping pinned against current Carlinkit firmware. Types outside
/// this table are dropped by the player layer.
pub fn decode_type_format(decode_type: u8) -> Option<AudioFormat> {
    Some(match decode_type {
        1 => pcm(44_100, 2),
        2 => pcm(44_100, 2),
        3 => pcm(8_000, 1),
        4 => pcm(48_000, 2),
        5 => pcm(16_000, 1),
        6 => pcm(24_000, 1),
        7 => pcm(16_000, 2),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_resolve() {
        let music = decode_type_format(1).unwrap();
        assert_eq!((music.frequency, music.channels), (44_100, 2));
        let siri = decode_type_format(5).unwrap();
        assert_eq!((siri.frequency, siri.channels), (16_000, 1));
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(decode_type_format(0).is_none());
        assert!(decode_type_format(8).is_none());
        assert!(decode_type_format(255).is_none());
    }
}
