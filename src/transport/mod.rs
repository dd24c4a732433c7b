/// USB plumbing: dongle discovery, interface claim, hot-plug watching.
pub mod device;
pub mod hotplug;

use std::io;

use thiserror::Error;
use usb_async::UsbAsyncError;

pub use device::{
    DongleInfo, EndpointPair, DONGLE_PRODUCT_IDS, DONGLE_VENDOR_ID,
};
pub use hotplug::{HotplugEvent, HotplugWatcher};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no dongle present")]
    NotFound,
    #[error("device disconnected")]
    DeviceGone,
    #[error("usb i/o failed: {0}")]
    Io(#[from] io::Error),
}

impl From<UsbAsyncError> for TransportError {
    fn from(err: UsbAsyncError) -> Self {
        if err.is_device_gone() {
            TransportError::DeviceGone
        } else {
            TransportError::Io(err.into())
        }
    }
}

impl TransportError {
    /// Detach-equivalent errors trigger a reconnect instead of a failure.
    pub fn is_device_gone(&self) -> bool {
        matches!(self, TransportError::DeviceGone)
            || matches!(self, TransportError::Io(e) if e.kind() == io::ErrorKind::NotConnected)
    }
}
