//! servo-updater-console - EC console access for servo-updater
//!
//! Implements the [`ConsoleProvider`](servo_updater_core::ConsoleProvider)
//! capability over the servo's USB console interface or a serial tty.

pub mod provider;
pub mod session;
pub mod transport;

pub use provider::{TtyConsoleProvider, UsbConsoleProvider, DEFAULT_OPEN_TIMEOUT};
pub use session::{ConsoleSession, DEFAULT_REPLY_TIMEOUT};
pub use transport::Transport;
