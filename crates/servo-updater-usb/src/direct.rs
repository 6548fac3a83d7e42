//! Direct update driver for legacy updater firmware
//!
//! Devices running the legacy updater take the image straight over the
//! update interface. The device tells us which bank it will accept; the
//! matching slice of the image is located from the board configuration,
//! then the image's FMAP, then by splitting the image in half.

use std::fs;
use std::path::Path;

use servo_updater_core::image::bank_from_fmap;
use servo_updater_core::{
    BankRange, BoardConfig, DeviceIdentity, FlashError, FlashProgress, Flasher, PartitionRegion,
};

use crate::device::{UpdateDevice, UpdateLink};
use crate::protocol::blocks;

/// Legacy generation driver
pub struct DirectFlasher {
    ro: Option<BankRange>,
    rw: Option<BankRange>,
    progress: Box<dyn FlashProgress>,
}

impl DirectFlasher {
    pub fn new(board: &BoardConfig, progress: Box<dyn FlashProgress>) -> Self {
        Self {
            ro: board.ro,
            rw: board.rw,
            progress,
        }
    }

    fn configured(&self, region: PartitionRegion) -> Option<BankRange> {
        match region {
            PartitionRegion::ReadOnly => self.ro,
            PartitionRegion::ReadWrite => self.rw,
        }
    }

    /// Bank of `image` starting at the device's writable `offset`
    pub fn writable_bank(&self, image: &[u8], offset: u32) -> Result<BankRange, String> {
        let known = [PartitionRegion::ReadOnly, PartitionRegion::ReadWrite]
            .into_iter()
            .filter_map(|region| {
                self.configured(region)
                    .or_else(|| bank_from_fmap(image, region))
                    .map(|bank| (region, bank))
            })
            .find(|(_, bank)| bank.offset == offset);

        let bank = match known {
            Some((region, bank)) => {
                log::debug!("Device accepts the {} bank at 0x{:08x}", region, offset);
                bank
            }
            None => {
                let half = (image.len() / 2) as u32;
                if offset == 0 {
                    BankRange { offset, size: half }
                } else if offset == half {
                    BankRange {
                        offset,
                        size: image.len() as u32 - half,
                    }
                } else {
                    return Err(format!("no bank of the image starts at 0x{:08x}", offset));
                }
            }
        };

        let end = bank.offset as u64 + bank.size as u64;
        if end > image.len() as u64 {
            return Err(format!(
                "bank 0x{:08x}+0x{:x} exceeds image size 0x{:x}",
                bank.offset,
                bank.size,
                image.len()
            ));
        }
        Ok(bank)
    }

    /// Run one update session over `link`, writing the bank it asks for
    ///
    /// A rejected block aborts the session without the closing stop word.
    pub fn transfer(
        &mut self,
        link: &mut dyn UpdateLink,
        data: &[u8],
        image: &Path,
    ) -> Result<(), FlashError> {
        let offset = link.start()?;
        let bank = self
            .writable_bank(data, offset)
            .map_err(|reason| FlashError::Image {
                path: image.to_path_buf(),
                reason,
            })?;

        let start = bank.offset as usize;
        let payload = &data[start..start + bank.size as usize];
        log::info!("Writing {} bytes to 0x{:08x}", payload.len(), bank.offset);

        self.progress.started(bank.offset, payload.len());
        let mut done = 0;
        for (base, chunk) in blocks(payload, bank.offset) {
            link.write_block(base, chunk)?;
            done += chunk.len();
            self.progress.advanced(done);
        }
        self.progress.finished();

        link.stop()?;
        Ok(())
    }
}

impl Flasher for DirectFlasher {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn flash(&mut self, identity: &DeviceIdentity, image: &Path) -> Result<(), FlashError> {
        let data = fs::read(image).map_err(|e| FlashError::Image {
            path: image.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut device = UpdateDevice::open(identity)?;
        log::info!("Flashing {} to {}", image.display(), identity);
        self.transfer(&mut device, &data, image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use servo_updater_core::NoProgress;

    use crate::error::{Result as UsbResult, UsbError};
    use crate::protocol::parse_start_response;

    #[derive(Debug, PartialEq)]
    enum Call {
        Start,
        Block(u32, usize),
        Stop,
    }

    /// Records every call and answers from a script
    struct FakeLink {
        start_reply: Vec<u8>,
        reject: Option<(u32, u32)>,
        calls: Vec<Call>,
    }

    impl FakeLink {
        fn new(start_reply: &[u8]) -> Self {
            Self {
                start_reply: start_reply.to_vec(),
                reject: None,
                calls: Vec::new(),
            }
        }
    }

    impl UpdateLink for FakeLink {
        fn start(&mut self) -> UsbResult<u32> {
            self.calls.push(Call::Start);
            parse_start_response(&self.start_reply)
        }

        fn write_block(&mut self, base: u32, payload: &[u8]) -> UsbResult<()> {
            self.calls.push(Call::Block(base, payload.len()));
            match self.reject {
                Some((at, status)) if at == base => Err(UsbError::Rejected { base, status }),
                _ => Ok(()),
            }
        }

        fn stop(&mut self) -> UsbResult<()> {
            self.calls.push(Call::Stop);
            Ok(())
        }
    }

    #[derive(Debug, PartialEq)]
    enum Tick {
        Started(u32, usize),
        Advanced(usize),
        Finished,
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Tick>>>);

    impl FlashProgress for Recorder {
        fn started(&mut self, base: u32, total: usize) {
            self.0.borrow_mut().push(Tick::Started(base, total));
        }

        fn advanced(&mut self, done: usize) {
            self.0.borrow_mut().push(Tick::Advanced(done));
        }

        fn finished(&mut self) {
            self.0.borrow_mut().push(Tick::Finished);
        }
    }

    fn recording_flasher() -> (DirectFlasher, Recorder) {
        let recorder = Recorder::default();
        let f = DirectFlasher {
            ro: None,
            rw: None,
            progress: Box::new(recorder.clone()),
        };
        (f, recorder)
    }

    #[test]
    fn test_transfer_writes_requested_bank() {
        let (mut f, recorder) = recording_flasher();
        let mut link = FakeLink::new(&0x800u32.to_be_bytes());
        let image = vec![0u8; 0x1000];

        f.transfer(&mut link, &image, Path::new("servo_v4.bin")).unwrap();

        assert_eq!(
            link.calls,
            vec![
                Call::Start,
                Call::Block(0x800, 1024),
                Call::Block(0xC00, 1024),
                Call::Stop,
            ]
        );
        assert_eq!(
            *recorder.0.borrow(),
            vec![
                Tick::Started(0x800, 0x800),
                Tick::Advanced(1024),
                Tick::Advanced(2048),
                Tick::Finished,
            ]
        );
    }

    #[test]
    fn test_rejected_block_skips_stop() {
        let (mut f, _) = recording_flasher();
        let mut link = FakeLink::new(&0x800u32.to_be_bytes());
        link.reject = Some((0xC00, 7));
        let image = vec![0u8; 0x1000];

        let err = f
            .transfer(&mut link, &image, Path::new("servo_v4.bin"))
            .unwrap_err();

        assert!(matches!(
            err,
            FlashError::Rejected {
                base: 0xC00,
                status: 7
            }
        ));
        assert_eq!(
            link.calls,
            vec![Call::Start, Call::Block(0x800, 1024), Call::Block(0xC00, 1024)]
        );
    }

    #[test]
    fn test_short_start_reply() {
        let (mut f, recorder) = recording_flasher();
        let mut link = FakeLink::new(&[0, 0]);
        let image = vec![0u8; 0x1000];

        let err = f
            .transfer(&mut link, &image, Path::new("servo_v4.bin"))
            .unwrap_err();

        assert!(matches!(err, FlashError::Transfer(_)));
        assert_eq!(link.calls, vec![Call::Start]);
        assert!(recorder.0.borrow().is_empty());
    }

    fn flasher(ro: Option<BankRange>, rw: Option<BankRange>) -> DirectFlasher {
        DirectFlasher {
            ro,
            rw,
            progress: Box::new(NoProgress),
        }
    }

    #[test]
    fn test_bank_from_config() {
        let f = flasher(
            Some(BankRange { offset: 0, size: 0x100 }),
            Some(BankRange {
                offset: 0x100,
                size: 0x200,
            }),
        );
        let image = vec![0u8; 0x400];
        assert_eq!(
            f.writable_bank(&image, 0x100).unwrap(),
            BankRange {
                offset: 0x100,
                size: 0x200
            }
        );
    }

    #[test]
    fn test_bank_from_halves() {
        let f = flasher(None, None);
        let image = vec![0u8; 0x1000];
        assert_eq!(
            f.writable_bank(&image, 0).unwrap(),
            BankRange { offset: 0, size: 0x800 }
        );
        assert_eq!(
            f.writable_bank(&image, 0x800).unwrap(),
            BankRange {
                offset: 0x800,
                size: 0x800
            }
        );
        assert!(f.writable_bank(&image, 0x400).is_err());
    }

    #[test]
    fn test_bank_beyond_image() {
        let f = flasher(
            None,
            Some(BankRange {
                offset: 0x800,
                size: 0x1000,
            }),
        );
        let err = f.writable_bank(&[0u8; 0x1000], 0x800).unwrap_err();
        assert!(err.contains("exceeds image size"));
    }
}
