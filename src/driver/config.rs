use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::protocol::{FileAddress, PhoneType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveHand {
    Left = 0,
    Right = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WifiBand {
    Ghz2_4,
    Ghz5,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhoneTypeConfig {
    /// Cadence of the frame keep-alive command, when this phone wants one.
    pub frame_interval_ms: Option<u64>,
}

/// Icon blob pushed to the dongle during configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconFile {
    pub address: FileAddressDef,
    pub content: Vec<u8>,
}

/// Serde-friendly mirror of [`FileAddress`] icon targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileAddressDef {
    OemIcon,
    Icon120,
    Icon180,
    Icon256,
}

impl From<FileAddressDef> for FileAddress {
    fn from(value: FileAddressDef) -> Self {
        match value {
            FileAddressDef::OemIcon => FileAddress::OemIcon,
            FileAddressDef::Icon120 => FileAddress::Icon120,
            FileAddressDef::Icon180 => FileAddress::Icon180,
            FileAddressDef::Icon256 => FileAddress::Icon256,
        }
    }
}

/// Immutable session configuration. Changing any field requires stop+start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DongleConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub dpi: u32,
    pub format: u32,
    pub i_box_version: u32,
    pub phone_work_mode: u32,
    pub packet_max: u32,
    pub night_mode: bool,
    pub drive_hand: DriveHand,
    pub media_delay_ms: u32,
    /// When set, upstream audio stays on the dongle and the host microphone
    /// is never engaged.
    pub audio_transfer_mode: bool,
    pub wifi_band: WifiBand,
    pub wifi_channel: u8,
    pub car_name: String,
    pub oem_name: String,
    pub phone_config: HashMap<PhoneType, PhoneTypeConfig>,
    pub icons: Vec<IconFile>,
}

impl Default for DongleConfig {
    fn default() -> Self {
        let mut phone_config = HashMap::new();
        phone_config.insert(
            PhoneType::CarPlay,
            PhoneTypeConfig {
                frame_interval_ms: Some(5000),
            },
        );
        phone_config.insert(
            PhoneType::AndroidAuto,
            PhoneTypeConfig {
                frame_interval_ms: None,
            },
        );

        Self {
            width: 800,
            height: 480,
            fps: 30,
            dpi: 160,
            format: 5,
            i_box_version: 2,
            phone_work_mode: 2,
            packet_max: 49152,
            night_mode: false,
            drive_hand: DriveHand::Left,
            media_delay_ms: 300,
            audio_transfer_mode: false,
            wifi_band: WifiBand::Ghz5,
            wifi_channel: 36,
            car_name: "carlink".to_string(),
            oem_name: "carlink".to_string(),
            phone_config,
            icons: Vec::new(),
        }
    }
}

impl DongleConfig {
    /// JSON blob for the BoxSettings message, field names per the firmware.
    pub fn box_settings(&self, sync_time: Option<u64>) -> serde_json::Value {
        let mut settings = serde_json::json!({
            "mediaDelay": self.media_delay_ms,
            "androidAutoSizeW": self.width,
            "androidAutoSizeH": self.height,
            "WiFiChannel": self.wifi_channel,
        });
        if let Some(epoch_secs) = sync_time {
            settings["syncTime"] = epoch_secs.into();
        }
        settings
    }

    pub fn frame_interval_for(&self, phone_type: PhoneType) -> Option<u64> {
        self.phone_config
            .get(&phone_type)
            .and_then(|c| c.frame_interval_ms)
    }
}
