//! Driver selection per updater generation

use servo_updater_core::{BoardConfig, FlashProgress, FlasherSet, UpdaterGeneration};
use servo_updater_usb::DirectFlasher;

use crate::external::ExternalFlasher;

/// Build the driver set for a board
///
/// Legacy firmware is written directly over USB; current firmware goes
/// through the external `tool`.
pub fn flashers(board: &BoardConfig, tool: &str, progress: Box<dyn FlashProgress>) -> FlasherSet {
    log::debug!(
        "{} driver: direct, {} driver: external ({})",
        UpdaterGeneration::Legacy,
        UpdaterGeneration::Current,
        tool
    );
    FlasherSet::new(
        Box::new(DirectFlasher::new(board, progress)),
        Box::new(ExternalFlasher::new(tool)),
    )
}
