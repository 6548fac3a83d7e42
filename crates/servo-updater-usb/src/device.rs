//! Update interface of a running servo
//!
//! This module provides [`UpdateDevice`], a claimed handle to the vendor
//! update interface speaking the framing in [`crate::protocol`], and the
//! [`UpdateLink`] operations the direct driver needs from it.

use std::time::Duration;

use nusb::transfer::{Queue, RequestBuffer};
use nusb::{Device, Interface};
use servo_updater_core::DeviceIdentity;
use tokio::runtime::Runtime;

use crate::discovery::{bulk_endpoints, find_interface, find_single};
use crate::error::{Result, UsbError};
use crate::protocol::*;
use crate::transfer::{block_on_timeout, runtime};

/// Upper bound on a single bulk transfer
pub const USB_TIMEOUT: Duration = Duration::from_secs(1);

/// Session operations of the update protocol
pub trait UpdateLink {
    /// Begin a session, returning the offset the device will accept
    fn start(&mut self) -> Result<u32>;

    /// Write one block of at most [`MAX_BLOCK_PAYLOAD`] bytes at `base`
    fn write_block(&mut self, base: u32, payload: &[u8]) -> Result<()>;

    /// End the session
    fn stop(&mut self) -> Result<()>;
}

pub struct UpdateDevice {
    /// USB device handle
    _device: Device,
    /// Claimed update interface
    _interface: Interface,
    /// Bulk OUT transfers
    out_queue: Queue<Vec<u8>>,
    /// Bulk IN transfers, at most one request in flight
    in_queue: Queue<RequestBuffer>,
    /// Drives transfer timeouts
    runtime: Runtime,
}

impl UpdateDevice {
    /// Open the update interface of the device matching `identity`
    pub fn open(identity: &DeviceIdentity) -> Result<Self> {
        let info = find_single(identity)?;
        let interface_num = find_interface(&info, VENDOR_CLASS, UPDATE_SUBCLASS, UPDATE_PROTOCOL)
            .ok_or(UsbError::InterfaceNotFound("update"))?;

        log::info!(
            "Opening update interface {} of {} at bus {} address {}",
            interface_num,
            identity,
            info.bus_number(),
            info.device_address()
        );

        let device = info
            .open()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?;
        let interface = device
            .detach_and_claim_interface(interface_num)
            .map_err(|e| UsbError::ClaimFailed {
                interface: interface_num,
                reason: e.to_string(),
            })?;
        let (in_ep, out_ep) = bulk_endpoints(&device, interface_num)?;

        Ok(Self {
            out_queue: interface.bulk_out_queue(out_ep),
            in_queue: interface.bulk_in_queue(in_ep),
            runtime: runtime()?,
            _device: device,
            _interface: interface,
        })
    }

    fn write_packet(&mut self, data: &[u8]) -> Result<()> {
        self.out_queue.submit(data.to_vec());

        let completion =
            block_on_timeout(&self.runtime, USB_TIMEOUT, self.out_queue.next_complete());
        let Some(completion) = completion else {
            self.out_queue.cancel_all();
            return Err(UsbError::TransferFailed(format!(
                "timeout writing {} bytes after {} ms",
                data.len(),
                USB_TIMEOUT.as_millis()
            )));
        };
        completion
            .status
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        log::trace!("USB write {} bytes", data.len());
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Vec<u8>> {
        // A request left over from a timed out read is still valid
        if self.in_queue.pending() == 0 {
            self.in_queue.submit(RequestBuffer::new(USB_PACKET_SIZE));
        }

        let completion =
            block_on_timeout(&self.runtime, USB_TIMEOUT, self.in_queue.next_complete())
                .ok_or_else(|| {
                    UsbError::TransferFailed(format!(
                        "timeout waiting for reply after {} ms",
                        USB_TIMEOUT.as_millis()
                    ))
                })?;
        completion
            .status
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        log::trace!("USB read {} bytes", completion.data.len());
        Ok(completion.data)
    }
}

impl UpdateLink for UpdateDevice {
    fn start(&mut self) -> Result<u32> {
        self.write_packet(&FrameHeader::start().to_bytes())?;
        let reply = self.read_packet()?;
        let offset = parse_start_response(&reply)?;
        log::debug!("Update session started, writable offset 0x{:08x}", offset);
        Ok(offset)
    }

    fn write_block(&mut self, base: u32, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_BLOCK_PAYLOAD {
            return Err(UsbError::InvalidResponse(format!(
                "block of {} bytes exceeds {}",
                payload.len(),
                MAX_BLOCK_PAYLOAD
            )));
        }

        let mut frame = FrameHeader::block(base, payload.len()).to_bytes().to_vec();
        frame.extend_from_slice(payload);
        for packet in frame.chunks(USB_PACKET_SIZE) {
            self.write_packet(packet)?;
        }

        let status = parse_block_status(&self.read_packet()?)?;
        if status != STATUS_SUCCESS {
            return Err(UsbError::Rejected { base, status });
        }
        log::trace!("Block 0x{:08x} ({} bytes) written", base, payload.len());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        log::debug!("Ending update session");
        self.write_packet(&UPDATE_DONE.to_be_bytes())
    }
}
