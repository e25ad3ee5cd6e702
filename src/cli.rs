use std::path::PathBuf;

use clap::Parser;

use crate::orchestrator::RunOptions;

/// List the recordings on a TiVo and optionally download them.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Address of the TiVo: a host name, an IP address or a base URL.
    #[arg(short, long, env = "TIVO_ADDRESS")]
    pub address: String,

    /// Media access key of the TiVo.
    #[arg(short, long, env = "TIVO_MAK", hide_env_values = true)]
    pub mak: String,

    /// Download the recordings instead of only listing them.
    #[arg(short, long, env = "TIVODUMP_DOWNLOAD")]
    pub download: bool,

    /// Directory the recordings are written to.
    #[arg(short, long, env = "TIVODUMP_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Seconds to wait between two downloads.
    #[arg(long, env = "TIVODUMP_DELAY_SECS", default_value_t = 10)]
    pub delay_secs: u64,

    /// Rank of the first recording to download; earlier ones are only listed.
    #[arg(
        long,
        env = "TIVODUMP_FIRST_RANK",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub first_rank: u32,

    /// How often a failed page request or stream open is retried.
    #[arg(long, env = "TIVODUMP_RETRIES", default_value_t = 3)]
    pub retries: u32,
}
impl Args {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            output_dir: self.output_dir.clone(),
            download: self.download,
            first_rank: usize::try_from(self.first_rank).unwrap_or(usize::MAX),
        }
    }
}
