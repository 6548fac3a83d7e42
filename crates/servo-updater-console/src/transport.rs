//! Byte transports underneath a console session
//!
//! The EC console is normally a vendor bulk interface on the servo itself.
//! A serial tty (for example a pty exported by servod) works too.

use std::time::Duration;

use servo_updater_core::ConsoleError;

/// Transport trait for reading and writing console bytes
pub trait Transport {
    /// Write all of `data`
    fn write(&mut self, data: &[u8]) -> Result<(), ConsoleError>;

    /// Read with timeout
    ///
    /// Reads up to `buf.len()` bytes, waiting up to `timeout`.
    /// Returns the number of bytes read, or 0 on timeout.
    fn read_nonblock(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ConsoleError>;
}

pub mod usb {
    //! USB bulk console transport

    use super::*;
    use nusb::transfer::{Queue, RequestBuffer};
    use nusb::{Device, DeviceInfo, Interface};
    use servo_updater_usb::discovery::bulk_endpoints;
    use servo_updater_usb::transfer::{block_on_timeout, runtime};
    use tokio::runtime::Runtime;

    /// Bulk packet size of the console endpoints
    pub const CONSOLE_PACKET_SIZE: usize = 64;

    const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

    /// Console over a claimed USB interface
    ///
    /// One IN request stays queued for the life of the transport. A read
    /// that times out leaves it pending, so bytes arriving later are picked
    /// up by the next read instead of being lost with a cancelled transfer.
    pub struct UsbTransport {
        _device: Device,
        interface: Interface,
        out_ep: u8,
        in_queue: Queue<RequestBuffer>,
        /// Received bytes not yet handed to a caller
        spill: Vec<u8>,
        runtime: Runtime,
    }

    impl UsbTransport {
        /// Claim console `interface_num` on an enumerated device
        pub fn open(info: &DeviceInfo, interface_num: u8) -> Result<Self, ConsoleError> {
            let device = info
                .open()
                .map_err(|e| ConsoleError::OpenFailed(e.to_string()))?;
            let interface = device
                .detach_and_claim_interface(interface_num)
                .map_err(|e| {
                    ConsoleError::OpenFailed(format!(
                        "failed to claim interface {}: {}",
                        interface_num, e
                    ))
                })?;
            let (in_ep, out_ep) = bulk_endpoints(&device, interface_num)?;

            log::debug!(
                "Claimed console interface {} (in 0x{:02x}, out 0x{:02x})",
                interface_num,
                in_ep,
                out_ep
            );

            Ok(Self {
                in_queue: interface.bulk_in_queue(in_ep),
                runtime: runtime()?,
                spill: Vec::new(),
                _device: device,
                interface,
                out_ep,
            })
        }
    }

    /// Move as much of `spill` into `buf` as fits, keeping the rest
    pub(crate) fn take_buffered(spill: &mut Vec<u8>, buf: &mut [u8]) -> usize {
        let n = spill.len().min(buf.len());
        buf[..n].copy_from_slice(&spill[..n]);
        spill.drain(..n);
        n
    }

    impl Transport for UsbTransport {
        fn write(&mut self, data: &[u8]) -> Result<(), ConsoleError> {
            let transfer = self.interface.bulk_out(self.out_ep, data.to_vec());
            let completion = block_on_timeout(&self.runtime, WRITE_TIMEOUT, transfer)
                .ok_or_else(|| ConsoleError::Io("console write timed out".into()))?;

            completion
                .status
                .map_err(|e| ConsoleError::Io(e.to_string()))?;

            log::trace!("USB write {} bytes", data.len());
            Ok(())
        }

        fn read_nonblock(
            &mut self,
            buf: &mut [u8],
            timeout: Duration,
        ) -> Result<usize, ConsoleError> {
            if !self.spill.is_empty() {
                return Ok(take_buffered(&mut self.spill, buf));
            }

            if self.in_queue.pending() == 0 {
                self.in_queue.submit(RequestBuffer::new(CONSOLE_PACKET_SIZE));
            }

            let Some(completion) =
                block_on_timeout(&self.runtime, timeout, self.in_queue.next_complete())
            else {
                return Ok(0);
            };
            completion
                .status
                .map_err(|e| ConsoleError::Io(e.to_string()))?;

            self.spill.extend_from_slice(&completion.data);
            self.in_queue
                .submit(RequestBuffer::reuse(completion.data, CONSOLE_PACKET_SIZE));

            let n = take_buffered(&mut self.spill, buf);
            log::trace!("USB read {} bytes", n);
            Ok(n)
        }
    }

}

pub mod serial {
    //! Serial tty console transport

    use super::*;
    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::{Read, Write};

    /// Default console baud rate
    pub const DEFAULT_BAUD: u32 = 115200;

    /// Serial port transport
    pub struct SerialTransport {
        port: Box<dyn SerialPort>,
    }

    impl SerialTransport {
        /// Open a serial port with the specified baud rate
        pub fn open(device: &str, baud: Option<u32>) -> Result<Self, ConsoleError> {
            let baud_rate = baud.unwrap_or(DEFAULT_BAUD);

            let port = serialport::new(device, baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_secs(1))
                .open()
                .map_err(|e| ConsoleError::OpenFailed(format!("{}: {}", device, e)))?;

            log::info!("Opened serial console {} at {} baud", device, baud_rate);

            Ok(Self { port })
        }
    }

    impl Transport for SerialTransport {
        fn write(&mut self, data: &[u8]) -> Result<(), ConsoleError> {
            self.port
                .write_all(data)
                .and_then(|()| self.port.flush())
                .map_err(|e| ConsoleError::Io(e.to_string()))
        }

        fn read_nonblock(
            &mut self,
            buf: &mut [u8],
            timeout: Duration,
        ) -> Result<usize, ConsoleError> {
            self.port
                .set_timeout(timeout)
                .map_err(|e| ConsoleError::Io(e.to_string()))?;

            match self.port.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(ConsoleError::Io(e.to_string())),
            }
        }
    }
}
