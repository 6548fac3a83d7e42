//! Console session on top of a [`Transport`]

use std::time::{Duration, Instant};

use regex::Regex;
use servo_updater_core::{Console, ConsoleError};

use crate::transport::Transport;

/// How long to wait for a reply to match before giving up
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

const READ_SLICE: Duration = Duration::from_millis(100);
const DRAIN_SLICE: Duration = Duration::from_millis(10);
const MAX_DRAIN_READS: usize = 64;

/// Terminate a command with a line ending unless it already has one
fn frame_command(command: &str) -> String {
    if command.ends_with('\n') {
        command.to_string()
    } else {
        format!("{}\r\n", command)
    }
}

/// An open EC console
pub struct ConsoleSession {
    transport: Box<dyn Transport>,
    reply_timeout: Duration,
    label: String,
}

impl ConsoleSession {
    pub fn new(transport: Box<dyn Transport>, label: impl Into<String>) -> Self {
        let label = label.into();
        log::debug!("Console opened on {}", label);
        Self {
            transport,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            label,
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Discard output left over from before this command
    fn drain(&mut self) -> Result<(), ConsoleError> {
        let mut buf = [0u8; 64];
        for _ in 0..MAX_DRAIN_READS {
            let n = self.transport.read_nonblock(&mut buf, DRAIN_SLICE)?;
            if n == 0 {
                break;
            }
            log::trace!("Discarding {} stale console bytes", n);
        }
        Ok(())
    }
}

impl Console for ConsoleSession {
    fn send(&mut self, command: &str) -> Result<(), ConsoleError> {
        log::debug!("{} <- {:?}", self.label, command.trim());
        self.transport.write(frame_command(command).as_bytes())
    }

    fn send_and_collect(&mut self, command: &str, until: &Regex) -> Result<String, ConsoleError> {
        self.drain()?;
        self.send(command)?;

        let deadline = Instant::now() + self.reply_timeout;
        let mut output = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let now = Instant::now();
            if now >= deadline {
                log::debug!("{} reply timed out after {} bytes", self.label, output.len());
                break;
            }

            let n = self
                .transport
                .read_nonblock(&mut buf, READ_SLICE.min(deadline - now))?;
            if n == 0 {
                continue;
            }
            output.extend_from_slice(&buf[..n]);
            if until.is_match(&String::from_utf8_lossy(&output)) {
                break;
            }
        }

        let text = String::from_utf8_lossy(&output).into_owned();
        log::trace!("{} -> {:?}", self.label, text);
        Ok(text)
    }
}

impl Drop for ConsoleSession {
    fn drop(&mut self) {
        log::debug!("Console closed on {}", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct Wire {
        written: Vec<u8>,
        stale: VecDeque<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
        commands: usize,
    }

    /// Loopback transport that only answers after a command is written
    struct MockTransport(Rc<RefCell<Wire>>);

    impl Transport for MockTransport {
        fn write(&mut self, data: &[u8]) -> Result<(), ConsoleError> {
            let mut wire = self.0.borrow_mut();
            wire.written.extend_from_slice(data);
            wire.commands += 1;
            Ok(())
        }

        fn read_nonblock(
            &mut self,
            buf: &mut [u8],
            _timeout: Duration,
        ) -> Result<usize, ConsoleError> {
            let mut wire = self.0.borrow_mut();
            let chunk = if wire.commands == 0 {
                wire.stale.pop_front()
            } else {
                wire.replies.pop_front()
            };
            match chunk {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    fn session(wire: &Rc<RefCell<Wire>>) -> ConsoleSession {
        ConsoleSession::new(Box::new(MockTransport(wire.clone())), "mock")
            .with_reply_timeout(Duration::from_millis(200))
    }

    #[test]
    fn test_frame_command() {
        assert_eq!(frame_command("reboot"), "reboot\r\n");
        assert_eq!(frame_command("\r\nversion\r\n"), "\r\nversion\r\n");
    }

    #[test]
    fn test_collect_until_match() {
        let wire = Rc::new(RefCell::new(Wire::default()));
        {
            let mut w = wire.borrow_mut();
            w.stale.push_back(b"old junk\r\n".to_vec());
            w.replies.push_back(b"Chip: stm\r\nBuild:   servo_".to_vec());
            w.replies.push_back(b"v4_v2.0.1\r\n".to_vec());
            w.replies.push_back(b"never read".to_vec());
        }

        let until = Regex::new(r"Build:\s+(\S+)[\r\n]+").unwrap();
        let out = session(&wire)
            .send_and_collect("\r\nversion\r\n", &until)
            .unwrap();

        assert!(!out.contains("old junk"));
        assert!(out.ends_with("servo_v4_v2.0.1\r\n"));
        let w = wire.borrow();
        assert_eq!(w.written, b"\r\nversion\r\n");
        assert_eq!(w.replies.len(), 1);
    }

    #[test]
    fn test_collect_returns_partial_output_on_timeout() {
        let wire = Rc::new(RefCell::new(Wire::default()));
        wire.borrow_mut().replies.push_back(b"> ".to_vec());

        let until = Regex::new("Build:").unwrap();
        let out = session(&wire).send_and_collect("version", &until).unwrap();
        assert_eq!(out, "> ");
    }

    #[test]
    fn test_send_appends_line_ending() {
        let wire = Rc::new(RefCell::new(Wire::default()));
        session(&wire).send("sysjump rw").unwrap();
        assert_eq!(wire.borrow().written, b"sysjump rw\r\n");
    }
}
