//
// Frame sizing
//
pub const FRAME_MAGIC: u32 = 0x55AA_55AA;
pub const FRAME_HEADER_LEN: usize = 16; // magic(4) + type(4) + len(4) + checksum(4)
pub const MAX_FRAME_PAYLOAD: usize = 4 * 1024 * 1024;

pub const VIDEO_VENDOR_HEADER_LEN: usize = 20; // width, height, flags, length, timestamp
pub const AUDIO_PREFIX_LEN: usize = 4; // decode_type(1) + audio_type(1) + reserved(2)
pub const AUDIO_CONTROL_BLOCK_LEN: usize = 12; // command(4) + volume(4) + duration(4)

//
// Message type tags (u32 on the wire)
//
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Open = 0x01,
    Plugged = 0x02,
    Phase = 0x03,
    Unplugged = 0x04,
    Touch = 0x05,
    VideoData = 0x06,
    AudioData = 0x07,
    Command = 0x08,
    LogoType = 0x09,
    DisconnectPhone = 0x0F,
    BoxInfo = 0x14,
    CloseDongle = 0x15,
    MultiTouch = 0x17,
    BoxSettings = 0x19,
    MediaData = 0x2A,
    SendFile = 0x99,
    HeartBeat = 0xAA,
    SoftwareVersion = 0xCC,
}

impl MessageType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0x01 => Self::Open,
            0x02 => Self::Plugged,
            0x03 => Self::Phase,
            0x04 => Self::Unplugged,
            0x05 => Self::Touch,
            0x06 => Self::VideoData,
            0x07 => Self::AudioData,
            0x08 => Self::Command,
            0x09 => Self::LogoType,
            0x0F => Self::DisconnectPhone,
            0x14 => Self::BoxInfo,
            0x15 => Self::CloseDongle,
            0x17 => Self::MultiTouch,
            0x19 => Self::BoxSettings,
            0x2A => Self::MediaData,
            0x99 => Self::SendFile,
            0xAA => Self::HeartBeat,
            0xCC => Self::SoftwareVersion,
            _ => return None,
        })
    }
}

//
// Key / control commands (Command message payload)
//
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandValue {
    Invalid = 0,
    StartRecordAudio = 1,
    StopRecordAudio = 2,
    RequestHostUi = 3,
    Siri = 5,
    Mic = 7,
    Frame = 12,
    BoxMic = 15,
    EnableNightMode = 16,
    DisableNightMode = 17,
    AudioTransferOn = 22,
    AudioTransferOff = 23,
    Wifi24g = 24,
    Wifi5g = 25,
    Left = 100,
    Right = 101,
    SelectDown = 104,
    SelectUp = 105,
    Back = 106,
    Down = 114,
    Home = 200,
    Play = 201,
    Pause = 202,
    Next = 204,
    Prev = 205,
    RequestVideoFocus = 500,
    ReleaseVideoFocus = 501,
    WifiEnable = 1000,
    AutoConnectEnable = 1001,
    WifiConnect = 1002,
    ScanningDevice = 1003,
    DeviceFound = 1004,
    DeviceNotFound = 1005,
    ConnectDeviceFailed = 1006,
    BtConnected = 1007,
    BtDisconnected = 1008,
    WifiConnected = 1009,
    WifiDisconnected = 1010,
    BtPairStart = 1011,
    WifiPair = 1012,
}

impl CommandValue {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Invalid,
            1 => Self::StartRecordAudio,
            2 => Self::StopRecordAudio,
            3 => Self::RequestHostUi,
            5 => Self::Siri,
            7 => Self::Mic,
            12 => Self::Frame,
            15 => Self::BoxMic,
            16 => Self::EnableNightMode,
            17 => Self::DisableNightMode,
            22 => Self::AudioTransferOn,
            23 => Self::AudioTransferOff,
            24 => Self::Wifi24g,
            25 => Self::Wifi5g,
            100 => Self::Left,
            101 => Self::Right,
            104 => Self::SelectDown,
            105 => Self::SelectUp,
            106 => Self::Back,
            114 => Self::Down,
            200 => Self::Home,
            201 => Self::Play,
            202 => Self::Pause,
            204 => Self::Next,
            205 => Self::Prev,
            500 => Self::RequestVideoFocus,
            501 => Self::ReleaseVideoFocus,
            1000 => Self::WifiEnable,
            1001 => Self::AutoConnectEnable,
            1002 => Self::WifiConnect,
            1003 => Self::ScanningDevice,
            1004 => Self::DeviceFound,
            1005 => Self::DeviceNotFound,
            1006 => Self::ConnectDeviceFailed,
            1007 => Self::BtConnected,
            1008 => Self::BtDisconnected,
            1009 => Self::WifiConnected,
            1010 => Self::WifiDisconnected,
            1011 => Self::BtPairStart,
            1012 => Self::WifiPair,
            _ => return None,
        })
    }
}

//
// In-band audio commands (AudioData control block)
//
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AudioCommand {
    OutputStart = 1,
    OutputStop = 2,
    InputConfig = 3,
    PhonecallStart = 4,
    PhonecallStop = 5,
    NaviStart = 6,
    NaviStop = 7,
    SiriStart = 8,
    SiriStop = 9,
    MediaStart = 10,
    MediaStop = 11,
    AlertStart = 12,
    AlertStop = 13,
}

impl AudioCommand {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::OutputStart,
            2 => Self::OutputStop,
            3 => Self::InputConfig,
            4 => Self::PhonecallStart,
            5 => Self::PhonecallStop,
            6 => Self::NaviStart,
            7 => Self::NaviStop,
            8 => Self::SiriStart,
            9 => Self::SiriStop,
            10 => Self::MediaStart,
            11 => Self::MediaStop,
            12 => Self::AlertStart,
            13 => Self::AlertStop,
            _ => return None,
        })
    }
}

//
// Touch actions, shared by single- and multi-touch encodings
//
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TouchAction {
    Down = 0,
    Move = 1,
    Up = 2,
}

//
// Config-file targets for SendFile uploads
//
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAddress {
    Dpi,
    NightMode,
    HandDriveMode,
    ChargeMode,
    BoxName,
    OemIcon,
    AirplayConfig,
    Icon120,
    Icon180,
    Icon256,
    AndroidWorkMode,
}

impl FileAddress {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Dpi => "/tmp/screen_dpi",
            Self::NightMode => "/tmp/night_mode",
            Self::HandDriveMode => "/tmp/hand_drive_mode",
            Self::ChargeMode => "/tmp/charge_mode",
            Self::BoxName => "/etc/box_name",
            Self::OemIcon => "/etc/oem_icon.bmp",
            Self::AirplayConfig => "/etc/airplay.conf",
            Self::Icon120 => "/etc/icon_120x120.png",
            Self::Icon180 => "/etc/icon_180x180.png",
            Self::Icon256 => "/etc/icon_256x256.png",
            Self::AndroidWorkMode => "/etc/android_work_mode",
        }
    }
}

//
// Phone types reported by Plugged
//
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum PhoneType {
    AndroidMirror = 1,
    CarPlay = 3,
    IphoneMirror = 4,
    AndroidAuto = 5,
    HiCar = 6,
}

impl PhoneType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::AndroidMirror,
            3 => Self::CarPlay,
            4 => Self::IphoneMirror,
            5 => Self::AndroidAuto,
            6 => Self::HiCar,
            _ => return None,
        })
    }
}
