//! EC USB update protocol constants and framing
//!
//! The update interface is a vendor bulk pipe. Every transfer begins with a
//! 12 byte big-endian frame header:
//!
//! ```text
//! +------------+--------------+------------+----------------+
//! | block_size | block_digest | block_base | payload ...    |
//! |   u32 BE   |    u32 BE    |   u32 BE   | <= 1024 bytes  |
//! +------------+--------------+------------+----------------+
//! ```
//!
//! `block_size` counts the header too. A header-only frame with zero digest
//! and base starts a session; the device answers with the offset of the bank
//! it is willing to accept. Each data block is answered with a 4 byte status.
//! The session ends with a bare `UPDATE_DONE` word.

use crate::error::{Result, UsbError};

// ===========================================================================
// USB Interface Identifiers
// ===========================================================================

/// Vendor specific interface class
pub const VENDOR_CLASS: u8 = 0xFF;

/// Subclass of the firmware update interface
pub const UPDATE_SUBCLASS: u8 = 0x53;

/// Protocol of the firmware update interface
pub const UPDATE_PROTOCOL: u8 = 0xFF;

// ===========================================================================
// Transfer Parameters
// ===========================================================================

/// Full-speed bulk packet size
pub const USB_PACKET_SIZE: usize = 64;

/// Size of the frame header
pub const FRAME_HEADER_SIZE: usize = 12;

/// Largest payload carried by one block
pub const MAX_BLOCK_PAYLOAD: usize = 1024;

/// Terminates an update session
pub const UPDATE_DONE: u32 = 0xB007_AB1E;

/// Block status meaning "written"
pub const STATUS_SUCCESS: u32 = 0;

/// Header preceding every transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub block_size: u32,
    pub block_digest: u32,
    pub block_base: u32,
}

impl FrameHeader {
    /// Header of the session start request
    pub fn start() -> Self {
        Self {
            block_size: FRAME_HEADER_SIZE as u32,
            block_digest: 0,
            block_base: 0,
        }
    }

    /// Header for `payload_len` bytes destined for `base`
    pub fn block(base: u32, payload_len: usize) -> Self {
        Self {
            block_size: (FRAME_HEADER_SIZE + payload_len) as u32,
            block_digest: 0,
            block_base: base,
        }
    }

    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.block_size.to_be_bytes());
        buf[4..8].copy_from_slice(&self.block_digest.to_be_bytes());
        buf[8..12].copy_from_slice(&self.block_base.to_be_bytes());
        buf
    }
}

fn read_word(buf: &[u8], what: &str) -> Result<u32> {
    match buf.get(0..4) {
        Some(word) => Ok(u32::from_be_bytes([word[0], word[1], word[2], word[3]])),
        None => Err(UsbError::InvalidResponse(format!(
            "{} reply is {} bytes, expected 4",
            what,
            buf.len()
        ))),
    }
}

/// Writable offset from the session start reply
pub fn parse_start_response(buf: &[u8]) -> Result<u32> {
    read_word(buf, "start")
}

/// Status word from a block reply
pub fn parse_block_status(buf: &[u8]) -> Result<u32> {
    read_word(buf, "block")
}

/// Split `data` into blocks addressed from `base`
pub fn blocks(data: &[u8], base: u32) -> impl Iterator<Item = (u32, &[u8])> {
    data.chunks(MAX_BLOCK_PAYLOAD)
        .enumerate()
        .map(move |(i, chunk)| (base + (i * MAX_BLOCK_PAYLOAD) as u32, chunk))
}
