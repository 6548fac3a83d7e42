//! External update driver for current updater firmware
//!
//! Delegates the transfer to a host tool invoked as
//! `<tool> -d <vid:pid> [-S <serial>] -n <image>`.

use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use servo_updater_core::{DeviceIdentity, FlashError, Flasher};

/// Default external updater executable
pub const DEFAULT_TOOL: &str = "usb_updater2";

/// Exit codes the tool uses for a completed update
///
/// 1 and 2 report that the device already had the image in one or both
/// banks; the update still counts as done.
pub const ACCEPTED_EXIT_CODES: &[i32] = &[0, 1, 2];

/// Current generation driver
#[derive(Debug, Clone)]
pub struct ExternalFlasher {
    tool: String,
    checked: bool,
}

impl ExternalFlasher {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            checked: false,
        }
    }

    /// Make sure the tool runs at all
    pub fn check_tool(&mut self) -> Result<(), FlashError> {
        if self.checked {
            return Ok(());
        }

        let unavailable = |reason: String| FlashError::ToolUnavailable {
            tool: self.tool.clone(),
            reason,
        };
        let status = Command::new(&self.tool)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| unavailable(e.to_string()))?;
        if !status.success() {
            return Err(unavailable(describe(status)));
        }

        log::debug!("{} is available", self.tool);
        self.checked = true;
        Ok(())
    }
}

/// Arguments for flashing `image` to `identity`
pub fn command_args(identity: &DeviceIdentity, image: &Path) -> Vec<String> {
    let mut args = vec!["-d".to_string(), identity.vid_pid()];
    if let Some(serial) = &identity.serial {
        args.push("-S".to_string());
        args.push(serial.clone());
    }
    args.push("-n".to_string());
    args.push(image.display().to_string());
    args
}

/// Map the tool's exit code to a driver result
pub fn interpret_exit(command: &str, code: Option<i32>) -> Result<(), FlashError> {
    match code {
        Some(code) if ACCEPTED_EXIT_CODES.contains(&code) => {
            if code != 0 {
                log::debug!("`{}` exited with accepted code {}", command, code);
            }
            Ok(())
        }
        Some(code) => Err(FlashError::ExitCode {
            command: command.to_string(),
            code,
        }),
        None => Err(FlashError::Terminated(command.to_string())),
    }
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl Flasher for ExternalFlasher {
    fn name(&self) -> &'static str {
        "external"
    }

    fn flash(&mut self, identity: &DeviceIdentity, image: &Path) -> Result<(), FlashError> {
        self.check_tool()?;

        let args = command_args(identity, image);
        let command = format!("{} {}", self.tool, args.join(" "));
        log::info!("Running {}", command);

        let status = Command::new(&self.tool)
            .args(&args)
            .status()
            .map_err(|e: io::Error| FlashError::ToolUnavailable {
                tool: self.tool.clone(),
                reason: e.to_string(),
            })?;

        interpret_exit(&command, status.code())
    }
}
