use indicatif::{ProgressBar, ProgressStyle};

use super::ProgressSink;

/// Byte progress bar on stderr, sized to the recording's declared size.
pub struct BarProgress {
    bar: ProgressBar,
}
impl BarProgress {
    pub fn new(total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::with_template(
                "  {spinner:.blue} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ({eta})",
            )
            .map(|x| x.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn advance(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}
