//! servo-updater-usb - USB access to servo boards
//!
//! This crate finds servo devices on the bus and implements the direct
//! update driver used for boards running the legacy updater firmware.
//!
//! # Example
//!
//! ```ignore
//! use servo_updater_usb::{discovery, DirectFlasher};
//!
//! let info = discovery::wait_for_device(&identity, Duration::from_secs(10))?;
//! let mut flasher = DirectFlasher::new(&board, Box::new(NoProgress));
//! flasher.flash(&identity, &image)?;
//! ```

pub mod device;
pub mod direct;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod transfer;

pub use device::{UpdateDevice, UpdateLink};
pub use direct::DirectFlasher;
pub use error::{Result, UsbError};
