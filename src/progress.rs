//! Terminal progress for direct transfers

use indicatif::{ProgressBar, ProgressStyle};
use servo_updater_core::FlashProgress;

#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl FlashProgress for BarProgress {
    fn started(&mut self, base: u32, total: usize) {
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(format!("@ 0x{:08x}", base));
        self.bar = Some(pb);
    }

    fn advanced(&mut self, done: usize) {
        if let Some(pb) = &self.bar {
            pb.set_position(done as u64);
        }
    }

    fn finished(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message("Write complete");
        }
    }
}
