//! Console sessions, version probing and partition selection
//!
//! A console session is a text command channel to the device's EC console.
//! Sessions are opened right before use and closed when dropped, so a failed
//! step never leaves a stale handle behind.

use std::thread;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ConsoleError, UpdateError};
use crate::identity::DeviceIdentity;
use crate::partition::PartitionRegion;
use crate::version::FirmwareVersion;

/// Console command reporting the running firmware
pub const VERSION_COMMAND: &str = "version";

/// Pattern for the build line in the `version` reply, e.g.
/// `Build:   tigertail_v1.1.6749-74d1a312e`
pub const BUILD_PATTERN: &str = r"Build:\s+(\S+)[\r\n]+";

/// Wait after a partition switch for the device to re-enumerate
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

static BUILD_REGEX: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(BUILD_PATTERN));

/// An open text console
pub trait Console {
    /// Send a command without waiting for a reply
    fn send(&mut self, command: &str) -> Result<(), ConsoleError>;

    /// Send a command and collect output until `until` matches the
    /// accumulated text or the reply timeout expires
    ///
    /// Returns everything read, whether or not the pattern matched.
    fn send_and_collect(&mut self, command: &str, until: &Regex) -> Result<String, ConsoleError>;
}

/// Opens console sessions for a device
pub trait ConsoleProvider {
    /// Pin down the physical device for a run
    ///
    /// Implementations may fill in the serial number of the single matching
    /// device so that later sessions cannot land on a different one.
    fn resolve(&mut self, identity: &DeviceIdentity) -> Result<DeviceIdentity, ConsoleError> {
        Ok(identity.clone())
    }

    /// Open a console on the identified device
    fn open(&mut self, identity: &DeviceIdentity) -> Result<Box<dyn Console>, ConsoleError>;
}

/// Read the running firmware version from an open console
pub fn probe_version(console: &mut dyn Console) -> Result<FirmwareVersion, UpdateError> {
    let pattern = BUILD_REGEX.as_ref().map_err(|e| UpdateError::Probe {
        output: format!("bad build pattern: {}", e),
    })?;
    let output = console.send_and_collect(&format!("\r\n{}\r\n", VERSION_COMMAND), pattern)?;

    match pattern.captures(&output).and_then(|caps| caps.get(1)) {
        Some(build) => {
            let version = FirmwareVersion::new(build.as_str());
            log::debug!("Console reports build {}", version);
            Ok(version)
        }
        None => Err(UpdateError::Probe { output }),
    }
}

/// Open a console, read the running version, and close it
pub fn read_version(
    provider: &mut dyn ConsoleProvider,
    identity: &DeviceIdentity,
) -> Result<FirmwareVersion, UpdateError> {
    let mut console = provider.open(identity)?;
    probe_version(console.as_mut())
}

/// Force the device into `region`
///
/// Issues the switch command, waits `settle` for the device to come back,
/// then closes the console. Success of the switch is not checked here; the
/// next version probe confirms the device is alive.
pub fn select_partition(
    provider: &mut dyn ConsoleProvider,
    identity: &DeviceIdentity,
    region: PartitionRegion,
    settle: Duration,
) -> Result<(), UpdateError> {
    let mut console = provider.open(identity).map_err(|e| UpdateError::Selector {
        region: region.to_string(),
        reason: e.to_string(),
    })?;

    log::info!("Switching {} to {} ({})", identity, region, region.switch_command());
    console
        .send(region.switch_command())
        .map_err(|e| UpdateError::Selector {
            region: region.to_string(),
            reason: e.to_string(),
        })?;

    thread::sleep(settle);
    drop(console);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Scripted {
        reply: String,
        sent: Vec<String>,
    }

    impl Console for Scripted {
        fn send(&mut self, command: &str) -> Result<(), ConsoleError> {
            self.sent.push(command.to_string());
            Ok(())
        }

        fn send_and_collect(
            &mut self,
            command: &str,
            _until: &Regex,
        ) -> Result<String, ConsoleError> {
            self.sent.push(command.to_string());
            Ok(self.reply.clone())
        }
    }

    fn scripted(reply: &str) -> Scripted {
        Scripted {
            reply: reply.to_string(),
            sent: Vec::new(),
        }
    }

    #[test]
    fn test_probe_version() {
        let mut console = scripted(
            "> version\r\nChip:    stm stm32f07x\r\nRO:      servo_v4_v1.1.5799-aa\r\n\
             RW:      servo_v4_v1.1.5799-aa\r\nBuild:   servo_v4_v1.1.5799-aa\r\n\
             \t2017-01-01 00:00:00 @build\r\n> ",
        );
        let v = probe_version(&mut console).unwrap();
        assert_eq!(v.as_str(), "servo_v4_v1.1.5799-aa");
        assert_eq!(console.sent, vec!["\r\nversion\r\n".to_string()]);
    }

    #[test]
    fn test_probe_without_build_line() {
        let mut console = scripted("> version\r\nChip: stm\r\n");
        let err = probe_version(&mut console).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Probe);
    }

    #[test]
    fn test_probe_needs_line_end() {
        // A truncated reply may end mid-token.
        let mut console = scripted("Build:   servo_v4_v1.1");
        assert_eq!(probe_version(&mut console).unwrap_err().kind(), ErrorKind::Probe);
    }

    struct Unplugged;

    impl ConsoleProvider for Unplugged {
        fn open(&mut self, identity: &DeviceIdentity) -> Result<Box<dyn Console>, ConsoleError> {
            Err(ConsoleError::DeviceNotResponding(identity.vid_pid(), 10))
        }
    }

    #[test]
    fn test_select_unresponsive_device() {
        let id = DeviceIdentity::new(0x18d1, 0x501b, 0, None);
        let err =
            select_partition(&mut Unplugged, &id, PartitionRegion::ReadWrite, Duration::ZERO)
                .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Selector);

        let err = read_version(&mut Unplugged, &id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Console);
    }
}
