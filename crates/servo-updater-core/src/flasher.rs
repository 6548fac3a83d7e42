//! Update driver capability
//!
//! Each updater generation has one driver. The orchestrator only sees this
//! interface and picks the driver from the classified generation.

use std::path::Path;

use crate::error::FlashError;
use crate::identity::DeviceIdentity;
use crate::version::UpdaterGeneration;

/// Pushes a firmware image to the device's running bank
pub trait Flasher {
    /// Short driver name for diagnostics
    fn name(&self) -> &'static str;

    /// Flash `image` to the device
    ///
    /// Runs to completion or failure; a started transfer is never abandoned.
    fn flash(&mut self, identity: &DeviceIdentity, image: &Path) -> Result<(), FlashError>;
}

/// Upload progress callbacks
pub trait FlashProgress {
    /// A transfer of `total` bytes to the bank at `base` is starting
    fn started(&mut self, base: u32, total: usize);

    /// `done` bytes of the current transfer have been acknowledged
    fn advanced(&mut self, done: usize);

    /// The current transfer completed
    fn finished(&mut self);
}

/// Progress sink that discards all updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl FlashProgress for NoProgress {
    fn started(&mut self, _base: u32, _total: usize) {}
    fn advanced(&mut self, _done: usize) {}
    fn finished(&mut self) {}
}

/// One driver per updater generation
pub struct FlasherSet {
    legacy: Box<dyn Flasher>,
    current: Box<dyn Flasher>,
}

impl FlasherSet {
    pub fn new(legacy: Box<dyn Flasher>, current: Box<dyn Flasher>) -> Self {
        Self { legacy, current }
    }

    /// Driver for a generation
    pub fn for_generation(&mut self, generation: UpdaterGeneration) -> &mut dyn Flasher {
        match generation {
            UpdaterGeneration::Legacy => self.legacy.as_mut(),
            UpdaterGeneration::Current => self.current.as_mut(),
        }
    }
}
