//! Finding servo devices on the bus
//!
//! A device matches an identity when vendor and product ID agree and, if the
//! identity carries a serial number, the serial number is identical.

use std::thread;
use std::time::{Duration, Instant};

use nusb::transfer::{Direction, EndpointType};
use nusb::{Device, DeviceInfo};
use servo_updater_core::DeviceIdentity;

use crate::error::{Result, UsbError};

/// Interval between enumeration attempts while waiting for a device
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn matches(identity: &DeviceIdentity, vid: u16, pid: u16, serial: Option<&str>) -> bool {
    if identity.vid != vid || identity.pid != pid {
        return false;
    }
    match identity.serial.as_deref() {
        Some(wanted) => serial == Some(wanted),
        None => true,
    }
}

/// All attached devices matching `identity`
pub fn find_devices(identity: &DeviceIdentity) -> Result<Vec<DeviceInfo>> {
    let devices = nusb::list_devices()
        .map_err(|e| UsbError::Enumerate(e.to_string()))?
        .filter(|info| {
            matches(
                identity,
                info.vendor_id(),
                info.product_id(),
                info.serial_number(),
            )
        })
        .collect::<Vec<_>>();

    log::trace!("{} device(s) match {}", devices.len(), identity);
    Ok(devices)
}

/// The one attached device matching `identity`
pub fn find_single(identity: &DeviceIdentity) -> Result<DeviceInfo> {
    let mut devices = find_devices(identity)?;
    match devices.len() {
        0 => Err(UsbError::DeviceNotFound(identity.to_string())),
        1 => Ok(devices.remove(0)),
        count => Err(UsbError::MultipleDevicesFound {
            vid_pid: identity.vid_pid(),
            count,
        }),
    }
}

/// Poll until a device matching `identity` is attached
///
/// Devices drop off the bus while they reboot into another bank, so a
/// missing device is retried until `timeout`. Ambiguity fails immediately.
pub fn wait_for_device(identity: &DeviceIdentity, timeout: Duration) -> Result<DeviceInfo> {
    let start = Instant::now();
    loop {
        match find_single(identity) {
            Ok(info) => {
                log::debug!(
                    "Found {} at bus {} address {} after {} ms",
                    identity,
                    info.bus_number(),
                    info.device_address(),
                    start.elapsed().as_millis()
                );
                return Ok(info);
            }
            Err(UsbError::DeviceNotFound(_)) if start.elapsed() < timeout => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(UsbError::DeviceNotFound(_)) => {
                return Err(UsbError::NotResponding {
                    vid_pid: identity.vid_pid(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            Err(e) => return Err(e),
        }
    }
}

/// Interface number with the given class triple
pub fn find_interface(info: &DeviceInfo, class: u8, subclass: u8, protocol: u8) -> Option<u8> {
    info.interfaces()
        .find(|iface| {
            iface.class() == class && iface.subclass() == subclass && iface.protocol() == protocol
        })
        .map(|iface| iface.interface_number())
}

/// Bulk IN and OUT endpoint addresses of an interface
pub fn bulk_endpoints(device: &Device, interface: u8) -> Result<(u8, u8)> {
    let config = device
        .active_configuration()
        .map_err(|e| UsbError::OpenFailed(e.to_string()))?;

    let mut in_ep = None;
    let mut out_ep = None;
    if let Some(alt) = config
        .interface_alt_settings()
        .find(|alt| alt.interface_number() == interface)
    {
        for ep in alt.endpoints() {
            if ep.transfer_type() != EndpointType::Bulk {
                continue;
            }
            match ep.direction() {
                Direction::In => {
                    in_ep.get_or_insert(ep.address());
                }
                Direction::Out => {
                    out_ep.get_or_insert(ep.address());
                }
            }
        }
    }

    match (in_ep, out_ep) {
        (Some(in_ep), Some(out_ep)) => Ok((in_ep, out_ep)),
        _ => Err(UsbError::InterfaceNotFound("bulk")),
    }
}
