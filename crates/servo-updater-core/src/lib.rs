//! servo-updater-core - Firmware update orchestration for servo boards
//!
//! This crate holds everything about a servo update that does not touch
//! hardware directly:
//!
//! - Board configuration files and image discovery ([`config`])
//! - Image version extraction from the embedded FMAP ([`image`])
//! - Version probing and partition switching over a [`Console`]
//! - Updater generation classification ([`version`])
//! - The [`Updater`] state machine tying it all together
//!
//! Hardware access lives behind the [`ConsoleProvider`] and [`Flasher`]
//! traits, implemented by `servo-updater-console`, `servo-updater-usb` and
//! `servo-updater-flash`.
//!
//! # Example
//!
//! ```ignore
//! let files = find_files("servo_v4", None, None)?;
//! let board = BoardConfig::from_file(&files.config)?;
//! let session = UpdateSession::new(board, files.image, None);
//!
//! let mut updater = Updater::new(&mut consoles, &mut flashers, &FmapVersionReader);
//! match updater.run(&session)? {
//!     RunOutcome::NoUpdateNeeded => println!("up to date"),
//!     RunOutcome::Updated => println!("updated"),
//! }
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod flasher;
pub mod identity;
pub mod image;
pub mod orchestrator;
pub mod partition;
pub mod version;

pub use config::{find_config, find_files, BankRange, BoardConfig, ResolvedFiles};
pub use console::{probe_version, read_version, select_partition, Console, ConsoleProvider};
pub use error::{ConfigError, ConsoleError, ErrorKind, FlashError, Result, UpdateError};
pub use flasher::{FlashProgress, Flasher, FlasherSet, NoProgress};
pub use identity::DeviceIdentity;
pub use image::{FmapVersionReader, ImageVersionReader};
pub use orchestrator::{RunOutcome, Step, UpdateSession, Updater};
pub use partition::PartitionRegion;
pub use version::{classify, Classifier, FirmwareVersion, UpdaterGeneration};
