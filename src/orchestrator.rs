use std::{io::Write, path::PathBuf, time::Duration};

use tracing::{debug, info};

use crate::{
    catalog::{build_catalog, PageFetcher},
    downloader::{download, BarProgress, StreamFetcher},
    error::RunError,
    helpers::{filename::derive_filename, size::format_size},
};

/// Waits between two consecutive downloads.
#[async_trait::async_trait]
pub trait Pacer: Send + Sync {
    async fn wait(&self);
}

/// Sleeps for a fixed interval. The device limits concurrent connections and
/// needs a moment between transfers.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

#[async_trait::async_trait]
impl Pacer for FixedDelay {
    async fn wait(&self) {
        if self.0.is_zero() {
            return;
        }

        debug!(delay = ?self.0, "Pausing before next download");
        tokio::time::sleep(self.0).await;
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub download: bool,
    /// Recordings ranked below this are listed but not downloaded.
    pub first_rank: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            download: false,
            first_rank: 1,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub recordings: usize,
    pub total_size: u64,
    pub downloaded: usize,
    pub bytes_written: u64,
}

/// Lists the catalog and, in download mode, fetches every recording in rank
/// order.
pub struct Orchestrator<'a, C: ?Sized, P: ?Sized> {
    client: &'a C,
    pacer: &'a P,
    options: RunOptions,
}
impl<'a, C, P> Orchestrator<'a, C, P>
where
    C: PageFetcher + StreamFetcher + ?Sized,
    P: Pacer + ?Sized,
{
    pub fn new(client: &'a C, pacer: &'a P, options: RunOptions) -> Self {
        Self {
            client,
            pacer,
            options,
        }
    }

    /// Report lines (totals, one entry per recording, closing notice) go to
    /// `report`; diagnostics go through `tracing`.
    #[tracing::instrument(skip_all, fields(download = self.options.download))]
    pub async fn run<W>(&self, report: &mut W) -> Result<RunSummary, RunError>
    where
        W: Write + ?Sized,
    {
        info!("Listing recordings");
        let catalog = build_catalog(self.client).await?;
        if catalog.is_empty() {
            info!("The device has no recordings");
        }

        let mut summary = RunSummary {
            recordings: catalog.len(),
            total_size: catalog.total_size(),
            ..RunSummary::default()
        };
        writeln!(report, "Total Recordings: {}", summary.recordings)?;
        writeln!(report, "Total Size: {}", format_size(summary.total_size))?;

        if self.options.download {
            tokio::fs::create_dir_all(&self.options.output_dir)
                .await
                .map_err(|source| RunError::Io {
                    path: self.options.output_dir.clone(),
                    source,
                })?;
        }

        for (rank, recording) in catalog.ranked() {
            let filename = derive_filename(recording, rank);
            writeln!(report, "#{rank:04}")?;
            writeln!(report, "{} \t {}", format_size(recording.size), filename)?;

            if rank < self.options.first_rank {
                debug!(rank, "Below first rank, skipping");
                continue;
            }
            if !self.options.download {
                continue;
            }

            if summary.downloaded > 0 {
                self.pacer.wait().await;
            }

            let destination = self.options.output_dir.join(&filename);
            let progress = BarProgress::new(recording.size);
            let written = download(self.client, recording, &destination, &progress)
                .await
                .map_err(|source| RunError::Transfer { rank, source })?;
            writeln!(report, "download complete.")?;

            summary.downloaded += 1;
            summary.bytes_written += written;
        }

        if !self.options.download {
            writeln!(
                report,
                "Nothing was downloaded; pass --download to transfer the recordings."
            )?;
        }

        info!(
            downloaded = summary.downloaded,
            bytes = summary.bytes_written,
            "Run finished"
        );

        Ok(summary)
    }
}
