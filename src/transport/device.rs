use log::{debug, info};
use usb_async::{Device, DeviceHandle, Direction, TransferType};

use super::TransportError;

pub const DONGLE_VENDOR_ID: u16 = 0x1314;
pub const DONGLE_PRODUCT_IDS: [u16; 2] = [0x1520, 0x1521];

pub fn is_dongle(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == DONGLE_VENDOR_ID && DONGLE_PRODUCT_IDS.contains(&product_id)
}

/// Claimed vendor interface with its bulk endpoint addresses.
#[derive(Debug, Clone, Copy)]
pub struct EndpointPair {
    pub interface: u8,
    pub in_ep: u8,
    pub out_ep: u8,
    pub in_wmax: u16,
}

/// Identity strings read off the device at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DongleInfo {
    pub serial: String,
    pub manufacturer: String,
    pub product: String,
    pub fw_version: String,
}

/// bcdDevice → "M.mm" firmware label.
pub(crate) fn fw_version(v: usb_async::Version) -> String {
    format!("{}.{}{}", v.major(), v.minor(), v.sub_minor())
}

/// First attached dongle, if any.
pub async fn find_dongle() -> Result<Option<Device>, TransportError> {
    for device in usb_async::devices().await? {
        let desc = match device.device_descriptor().await {
            Ok(d) => d,
            Err(_) => continue,
        };
        if is_dongle(desc.vendor_id(), desc.product_id()) {
            return Ok(Some(device));
        }
    }
    Ok(None)
}

/// Locate the vendor-specific interface carrying the bulk endpoint pair.
async fn find_vendor_interface(device: &Device) -> Result<Option<EndpointPair>, TransportError> {
    let config = match device.active_config_descriptor().await {
        Ok(cfg) => cfg,
        Err(_) => device.config_descriptor(0).await?,
    };

    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            if descriptor.class_code() != 0xFF {
                continue;
            }

            let mut pair = EndpointPair {
                interface: descriptor.interface_number(),
                in_ep: 0,
                out_ep: 0,
                in_wmax: 512,
            };

            for endpoint in descriptor.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Bulk {
                    continue;
                }
                if endpoint.direction() == Direction::In {
                    pair.in_ep = endpoint.address();
                    pair.in_wmax = endpoint.max_packet_size();
                } else {
                    pair.out_ep = endpoint.address();
                }
            }

            if pair.in_ep != 0 && pair.out_ep != 0 {
                return Ok(Some(pair));
            }
        }
    }

    Ok(None)
}

/// Open the dongle, claim its vendor interface and read its identity.
pub async fn open_dongle(
    device: &Device,
) -> Result<(DeviceHandle, EndpointPair, DongleInfo), TransportError> {
    let desc = device.device_descriptor().await?;
    let handle = device.open().await?;
    let _ = handle.set_auto_detach_kernel_driver(true).await;
    handle.set_active_configuration(1).await?;

    let pair = find_vendor_interface(device)
        .await?
        .ok_or(TransportError::NotFound)?;

    handle.claim_interface(pair.interface).await?;

    let info = DongleInfo {
        serial: handle
            .read_serial_number_string_ascii(&desc)
            .await
            .unwrap_or_default(),
        manufacturer: handle
            .read_manufacturer_string_ascii(&desc)
            .await
            .unwrap_or_default(),
        product: handle
            .read_product_string_ascii(&desc)
            .await
            .unwrap_or_default(),
        fw_version: fw_version(desc.device_version()),
    };

    info!(
        "opened dongle {:04x}:{:04x} iface={} in_ep={:#04x} out_ep={:#04x} fw={}",
        desc.vendor_id(),
        desc.product_id(),
        pair.interface,
        pair.in_ep,
        pair.out_ep,
        info.fw_version
    );

    Ok((handle, pair, info))
}

/// Port-level reset forcing re-enumeration.
///
/// A NoDevice answer mid-reset is success: the port already dropped the
/// device and it will come back through enumeration.
pub async fn reset_dongle(handle: &DeviceHandle) -> Result<(), TransportError> {
    match handle.reset().await {
        Ok(()) => Ok(()),
        Err(e) if e.is_device_gone() => {
            debug!("reset answered no-device; treating as success");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
