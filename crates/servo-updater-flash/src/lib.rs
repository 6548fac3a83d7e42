//! servo-updater-flash - Update drivers for servo-updater
//!
//! Pairs each updater generation with its driver: the direct USB driver
//! from `servo-updater-usb` for legacy firmware, and [`ExternalFlasher`]
//! for current firmware.

pub mod external;
pub mod registry;

pub use external::{ExternalFlasher, DEFAULT_TOOL};
pub use registry::flashers;
