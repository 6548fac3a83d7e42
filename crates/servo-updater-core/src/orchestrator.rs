//! Update orchestration state machine
//!
//! ```text
//! Probing ──(versions equal, not forced)──> NoUpdateNeeded
//!    │
//!    └─> ForceRO(initial) -> ClassifyRO -> FlashRO
//!          -> ForceRW -> ClassifyRW -> FlashRW -> ForceRO(final) -> Done
//! ```
//!
//! RO is flashed first because it is the recovery fallback if the RW flash
//! fails. The updater generation is re-derived after every switch since the
//! two banks may run firmware built for different update protocols. Every
//! failure is terminal; a later run starting again at `Probing` resumes
//! safely from whichever bank the device was left in.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::BoardConfig;
use crate::console::{read_version, select_partition, ConsoleProvider, DEFAULT_SETTLE_DELAY};
use crate::error::{Result, UpdateError};
use crate::flasher::FlasherSet;
use crate::identity::DeviceIdentity;
use crate::image::ImageVersionReader;
use crate::partition::PartitionRegion;
use crate::version::{Classifier, FirmwareVersion, UpdaterGeneration};

/// Inputs of one update run
#[derive(Debug, Clone)]
pub struct UpdateSession {
    /// Device to update
    pub identity: DeviceIdentity,
    /// Board configuration
    pub board: BoardConfig,
    /// Candidate firmware image
    pub image: PathBuf,
    /// Update even if the versions match
    pub force: bool,
    /// Reboot into RO even when no update is needed
    pub reboot_after_noop: bool,
    /// Wait after each partition switch
    pub settle: Duration,
}

impl UpdateSession {
    pub fn new(board: BoardConfig, image: PathBuf, serial: Option<String>) -> Self {
        Self {
            identity: board.identity(serial),
            board,
            image,
            force: false,
            reboot_after_noop: false,
            settle: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Successful result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Device already runs the available version
    NoUpdateNeeded,
    /// Both banks were flashed and the device is back in RO
    Updated,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUpdateNeeded => f.write_str("no-update-needed"),
            Self::Updated => f.write_str("updated"),
        }
    }
}

/// Orchestrator states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Probing,
    Select { region: PartitionRegion, last: bool },
    Classify(PartitionRegion),
    Flash {
        region: PartitionRegion,
        generation: UpdaterGeneration,
        running: FirmwareVersion,
    },
    NoUpdateNeeded,
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probing => f.write_str("Probing"),
            Self::Select {
                region: PartitionRegion::ReadOnly,
                last,
            } => write!(f, "ForceRO({})", if *last { "final" } else { "initial" }),
            Self::Select { region, .. } => write!(f, "Force{}", region),
            Self::Classify(region) => write!(f, "Classify{}", region),
            Self::Flash { region, .. } => write!(f, "Flash{}", region),
            Self::NoUpdateNeeded => f.write_str("NoUpdateNeeded"),
            Self::Done => f.write_str("Done"),
        }
    }
}

/// Drives one device through the update sequence
pub struct Updater<'a> {
    console: &'a mut dyn ConsoleProvider,
    flashers: &'a mut FlasherSet,
    images: &'a dyn ImageVersionReader,
    classifier: Classifier,
}

impl<'a> Updater<'a> {
    pub fn new(
        console: &'a mut dyn ConsoleProvider,
        flashers: &'a mut FlasherSet,
        images: &'a dyn ImageVersionReader,
    ) -> Self {
        Self {
            console,
            flashers,
            images,
            classifier: Classifier::new(),
        }
    }

    /// Run the update sequence to completion
    pub fn run(&mut self, session: &UpdateSession) -> Result<RunOutcome> {
        let identity = self.console.resolve(&session.identity)?;
        if identity != session.identity {
            log::info!("Using device {}", identity);
        }

        let mut step = Step::Probing;
        loop {
            log::debug!("State: {}", step);
            step = match step {
                Step::Probing => self.probe(&identity, session)?,
                Step::Select { region, last } => {
                    select_partition(self.console, &identity, region, session.settle)?;
                    match (region, last) {
                        (PartitionRegion::ReadOnly, true) => Step::Done,
                        (region, _) => Step::Classify(region),
                    }
                }
                Step::Classify(region) => self.classify(&identity, region)?,
                Step::Flash {
                    region,
                    generation,
                    running,
                } => {
                    let flasher = self.flashers.for_generation(generation);
                    log::info!(
                        "Flashing {} with {} driver ({} updater)",
                        region,
                        flasher.name(),
                        generation
                    );
                    flasher
                        .flash(&identity, &session.image)
                        .map_err(|e| UpdateError::from_flash(e, region, flasher.name(), &running))?;
                    match region {
                        PartitionRegion::ReadOnly => Step::Select {
                            region: PartitionRegion::ReadWrite,
                            last: false,
                        },
                        PartitionRegion::ReadWrite => Step::Select {
                            region: PartitionRegion::ReadOnly,
                            last: true,
                        },
                    }
                }
                Step::NoUpdateNeeded => {
                    log::info!("No version update needed");
                    if session.reboot_after_noop {
                        select_partition(
                            self.console,
                            &identity,
                            PartitionRegion::ReadOnly,
                            session.settle,
                        )?;
                    }
                    return Ok(RunOutcome::NoUpdateNeeded);
                }
                Step::Done => {
                    log::info!("Update complete, device left in RO");
                    return Ok(RunOutcome::Updated);
                }
            };
        }
    }

    /// Compare running and available versions
    fn probe(&mut self, identity: &DeviceIdentity, session: &UpdateSession) -> Result<Step> {
        let initial = Step::Select {
            region: PartitionRegion::ReadOnly,
            last: false,
        };
        if session.force {
            log::info!("Forced update, skipping version check");
            return Ok(initial);
        }

        let board = &session.board.board;
        let current = read_version(self.console, identity)?;
        log::info!("Current {} version is   {}", board, current);

        let available = self.images.image_version(&session.image, board)?;
        log::info!("Available {} version is {}", board, available);

        if current == available {
            return Ok(Step::NoUpdateNeeded);
        }
        log::info!("Updating to recommended version.");
        Ok(initial)
    }

    /// Re-probe after a switch and pick the updater generation
    fn classify(&mut self, identity: &DeviceIdentity, region: PartitionRegion) -> Result<Step> {
        let running = read_version(self.console, identity).map_err(|e| match e {
            UpdateError::Console(e) => UpdateError::Selector {
                region: region.to_string(),
                reason: format!("device failed to respond after switch: {}", e),
            },
            e => e,
        })?;
        let generation = self.classifier.classify(&running)?;
        log::info!("{} runs {} with the {} updater", region, running, generation);
        Ok(Step::Flash {
            region,
            generation,
            running,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::error::{ConfigError, ConsoleError, ErrorKind, FlashError};
    use crate::flasher::Flasher;
    use regex::Regex;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Probe(PartitionRegion),
        Switch(PartitionRegion),
        Flash(&'static str, PartitionRegion),
    }

    struct Device {
        bank: PartitionRegion,
        ro_version: String,
        rw_version: String,
        /// Console opens that succeed before the device vanishes
        opens_left: Option<usize>,
        events: Vec<Event>,
        opened: usize,
        closed: usize,
    }

    type Shared = Rc<RefCell<Device>>;

    fn device(ro: &str, rw: &str) -> Shared {
        Rc::new(RefCell::new(Device {
            bank: PartitionRegion::ReadWrite,
            ro_version: ro.into(),
            rw_version: rw.into(),
            opens_left: None,
            events: Vec::new(),
            opened: 0,
            closed: 0,
        }))
    }

    struct FakeConsole(Shared);

    impl Console for FakeConsole {
        fn send(&mut self, command: &str) -> std::result::Result<(), ConsoleError> {
            let mut dev = self.0.borrow_mut();
            dev.bank = match command {
                "reboot" => PartitionRegion::ReadOnly,
                "sysjump rw" => PartitionRegion::ReadWrite,
                other => panic!("unexpected command {:?}", other),
            };
            let bank = dev.bank;
            dev.events.push(Event::Switch(bank));
            Ok(())
        }

        fn send_and_collect(
            &mut self,
            command: &str,
            _until: &Regex,
        ) -> std::result::Result<String, ConsoleError> {
            assert!(command.contains("version"));
            let mut dev = self.0.borrow_mut();
            let bank = dev.bank;
            dev.events.push(Event::Probe(bank));
            let build = match bank {
                PartitionRegion::ReadOnly => dev.ro_version.clone(),
                PartitionRegion::ReadWrite => dev.rw_version.clone(),
            };
            Ok(format!("version\r\nBuild:   {}\r\n> ", build))
        }
    }

    impl Drop for FakeConsole {
        fn drop(&mut self) {
            self.0.borrow_mut().closed += 1;
        }
    }

    struct FakeProvider(Shared);

    impl ConsoleProvider for FakeProvider {
        fn resolve(
            &mut self,
            identity: &DeviceIdentity,
        ) -> std::result::Result<DeviceIdentity, ConsoleError> {
            Ok(identity.with_serial("SERVO0001"))
        }

        fn open(
            &mut self,
            identity: &DeviceIdentity,
        ) -> std::result::Result<Box<dyn Console>, ConsoleError> {
            assert_eq!(identity.serial.as_deref(), Some("SERVO0001"));
            let mut dev = self.0.borrow_mut();
            if let Some(left) = dev.opens_left.as_mut() {
                if *left == 0 {
                    return Err(ConsoleError::DeviceNotResponding(identity.vid_pid(), 10));
                }
                *left -= 1;
            }
            dev.opened += 1;
            Ok(Box::new(FakeConsole(self.0.clone())))
        }
    }

    struct FakeFlasher {
        name: &'static str,
        dev: Shared,
        fail: Option<FlashError>,
    }

    impl Flasher for FakeFlasher {
        fn name(&self) -> &'static str {
            self.name
        }

        fn flash(
            &mut self,
            _identity: &DeviceIdentity,
            image: &Path,
        ) -> std::result::Result<(), FlashError> {
            assert_eq!(image, Path::new("servo_v4.bin"));
            let mut dev = self.dev.borrow_mut();
            assert_eq!(dev.opened, dev.closed, "console left open while flashing");
            let bank = dev.bank;
            dev.events.push(Event::Flash(self.name, bank));
            match self.fail.take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    struct FixedImage(&'static str);

    impl ImageVersionReader for FixedImage {
        fn image_version(
            &self,
            _image: &Path,
            _board: &str,
        ) -> std::result::Result<FirmwareVersion, ConfigError> {
            Ok(FirmwareVersion::new(self.0))
        }
    }

    fn flashers(dev: &Shared) -> FlasherSet {
        FlasherSet::new(
            Box::new(FakeFlasher {
                name: "direct",
                dev: dev.clone(),
                fail: None,
            }),
            Box::new(FakeFlasher {
                name: "external",
                dev: dev.clone(),
                fail: None,
            }),
        )
    }

    fn session() -> UpdateSession {
        let board = BoardConfig {
            board: "servo_v4".into(),
            vid: 0x18d1,
            pid: 0x5014,
            console: 0,
            ro: None,
            rw: None,
        };
        let mut session = UpdateSession::new(board, PathBuf::from("servo_v4.bin"), None);
        session.settle = Duration::ZERO;
        session
    }

    fn run(
        dev: &Shared,
        flashers: &mut FlasherSet,
        image: &'static str,
        session: &UpdateSession,
    ) -> Result<RunOutcome> {
        let mut provider = FakeProvider(dev.clone());
        let images = FixedImage(image);
        Updater::new(&mut provider, flashers, &images).run(session)
    }

    fn events(dev: &Shared) -> Vec<Event> {
        dev.borrow().events.clone()
    }

    fn assert_consoles_closed(dev: &Shared) {
        let dev = dev.borrow();
        assert!(dev.opened > 0);
        assert_eq!(dev.opened, dev.closed);
    }

    use Event::*;
    use PartitionRegion::{ReadOnly as RO, ReadWrite as RW};

    #[test]
    fn test_no_update_needed() {
        let dev = device("servo_v4_v2.0.1", "servo_v4_v2.0.1");
        let outcome = run(&dev, &mut flashers(&dev), "servo_v4_v2.0.1", &session()).unwrap();
        assert_eq!(outcome, RunOutcome::NoUpdateNeeded);
        assert_eq!(events(&dev), vec![Probe(RW)]);
    }

    #[test]
    fn test_no_update_with_reboot() {
        let dev = device("servo_v4_v2.0.1", "servo_v4_v2.0.1");
        let mut s = session();
        s.reboot_after_noop = true;
        let outcome = run(&dev, &mut flashers(&dev), "servo_v4_v2.0.1", &s).unwrap();
        assert_eq!(outcome, RunOutcome::NoUpdateNeeded);
        assert_eq!(events(&dev), vec![Probe(RW), Switch(RO)]);
    }

    #[test]
    fn test_forced_update_runs_full_sequence() {
        let dev = device("servo_v4_v2.0.1", "servo_v4_v2.0.1");
        let mut s = session();
        s.force = true;
        let outcome = run(&dev, &mut flashers(&dev), "servo_v4_v2.0.1", &s).unwrap();
        assert_eq!(outcome, RunOutcome::Updated);
        assert_eq!(
            events(&dev),
            vec![
                Switch(RO),
                Probe(RO),
                Flash("external", RO),
                Switch(RW),
                Probe(RW),
                Flash("external", RW),
                Switch(RO),
            ]
        );
    }

    #[test]
    fn test_mixed_generation_update() {
        let dev = device("servo_v4_v1.1.5799", "servo_v4_v2.0.100");
        let outcome = run(&dev, &mut flashers(&dev), "servo_v4_v1.1.6749", &session()).unwrap();
        assert_eq!(outcome, RunOutcome::Updated);
        assert_eq!(
            events(&dev),
            vec![
                Probe(RW),
                Switch(RO),
                Probe(RO),
                Flash("direct", RO),
                Switch(RW),
                Probe(RW),
                Flash("external", RW),
                Switch(RO),
            ]
        );
        assert_eq!(dev.borrow().bank, RO);
        // initial probe, three switches and two re-probes
        assert_eq!(dev.borrow().opened, 6);
        assert_consoles_closed(&dev);
    }

    #[test]
    fn test_classification_failure_stops_before_flash() {
        let dev = device("garbage_version", "servo_v4_v2.0.1");
        let err = run(&dev, &mut flashers(&dev), "servo_v4_v2.0.2", &session()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Classification);
        assert!(err.to_string().contains("garbage_version"));
        assert!(!events(&dev).iter().any(|e| matches!(e, Flash(..))));
        assert_consoles_closed(&dev);
    }

    #[test]
    fn test_rw_flash_failure_then_resume() {
        let dev = device("servo_v4_v1.1.5799", "servo_v4_v2.0.100");
        let mut failing = FlasherSet::new(
            Box::new(FakeFlasher {
                name: "direct",
                dev: dev.clone(),
                fail: None,
            }),
            Box::new(FakeFlasher {
                name: "external",
                dev: dev.clone(),
                fail: Some(FlashError::ExitCode {
                    command: "usb_updater2".into(),
                    code: 3,
                }),
            }),
        );
        let err = run(&dev, &mut failing, "servo_v4_v1.1.6749", &session()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Flash);
        assert!(err.to_string().contains("code 3"));
        assert!(err.to_string().contains("servo_v4_v2.0.100"));
        // Nothing is rolled back; the device stays in RW.
        assert_eq!(events(&dev).last(), Some(&Flash("external", RW)));
        assert_eq!(dev.borrow().bank, RW);
        assert_consoles_closed(&dev);

        dev.borrow_mut().events.clear();
        let outcome = run(&dev, &mut flashers(&dev), "servo_v4_v1.1.6749", &session()).unwrap();
        assert_eq!(outcome, RunOutcome::Updated);
        assert_eq!(events(&dev).first(), Some(&Probe(RW)));
        assert_eq!(events(&dev).last(), Some(&Switch(RO)));
        assert_consoles_closed(&dev);
    }

    #[test]
    fn test_tool_unavailable() {
        let dev = device("servo_v4_v2.0.1", "servo_v4_v2.0.1");
        let mut set = FlasherSet::new(
            Box::new(FakeFlasher {
                name: "direct",
                dev: dev.clone(),
                fail: None,
            }),
            Box::new(FakeFlasher {
                name: "external",
                dev: dev.clone(),
                fail: Some(FlashError::ToolUnavailable {
                    tool: "usb_updater2".into(),
                    reason: "not found".into(),
                }),
            }),
        );
        let err = run(&dev, &mut set, "servo_v4_v2.0.2", &session()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolUnavailable);
    }

    #[test]
    fn test_device_lost_after_switch() {
        let dev = device("servo_v4_v2.0.1", "servo_v4_v2.0.1");
        // Initial probe and the RO switch succeed, the re-probe does not.
        dev.borrow_mut().opens_left = Some(2);
        let err = run(&dev, &mut flashers(&dev), "servo_v4_v2.0.2", &session()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Selector);
        assert!(err.to_string().contains("RO"));
        assert_consoles_closed(&dev);
    }

    #[test]
    fn test_step_names() {
        assert_eq!(Step::Select { region: RO, last: false }.to_string(), "ForceRO(initial)");
        assert_eq!(Step::Select { region: RO, last: true }.to_string(), "ForceRO(final)");
        assert_eq!(Step::Select { region: RW, last: false }.to_string(), "ForceRW");
        assert_eq!(Step::Classify(RW).to_string(), "ClassifyRW");
        assert_eq!(RunOutcome::NoUpdateNeeded.to_string(), "no-update-needed");
    }
}
