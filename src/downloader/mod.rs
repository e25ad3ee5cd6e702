mod progress;

use std::path::Path;

use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};
use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
};
use tracing::{debug, trace, warn};

pub use progress::BarProgress;

use crate::{
    catalog::Recording,
    error::{FetchError, TransferError},
};

/// Largest slice written (and reported) in one step.
pub const CHUNK_SIZE: usize = 32 * 1024;

pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Opens the content stream of a recording.
#[async_trait::async_trait]
pub trait StreamFetcher: Send + Sync {
    async fn fetch_stream(&self, url: &str) -> Result<ByteStream, FetchError>;
}

/// Receives byte counts as a transfer progresses.
pub trait ProgressSink {
    fn advance(&self, bytes: u64);

    fn finish(&self) {}
}

/// Stream `recording` into `destination`, returning the number of bytes written.
///
/// The file is flushed on every exit path; after a failed transfer the
/// partial file stays on disk. A byte count that differs from the declared
/// size is logged, not treated as an error.
#[tracing::instrument(skip_all, fields(title = %recording.title, path = ?destination))]
pub async fn download<F, P>(
    fetcher: &F,
    recording: &Recording,
    destination: &Path,
    progress: &P,
) -> Result<u64, TransferError>
where
    F: StreamFetcher + ?Sized,
    P: ProgressSink + ?Sized,
{
    debug!("Starting download");
    let mut stream = fetcher
        .fetch_stream(&recording.url)
        .await
        .map_err(|source| {
            progress.finish();
            TransferError::Open {
                title: recording.title.clone(),
                source,
            }
        })?;

    let io_error = |source: std::io::Error| TransferError::Io {
        path: destination.to_path_buf(),
        source,
    };

    let out_file = File::create(destination).await.map_err(|source| {
        progress.finish();
        io_error(source)
    })?;
    trace!("Created destination file");

    let mut out_file = BufWriter::with_capacity(CHUNK_SIZE, out_file);
    let mut written = 0;

    let copied = write_chunks(&mut stream, &mut out_file, &mut written, progress).await;
    let flushed = out_file.flush().await;
    progress.finish();

    match copied {
        Err(ChunkError::Stream(source)) => {
            return Err(TransferError::Stream {
                title: recording.title.clone(),
                written,
                source,
            })
        }
        Err(ChunkError::Write(source)) => return Err(io_error(source)),
        Ok(()) => {}
    }
    flushed.map_err(io_error)?;

    if written == recording.size {
        debug!(written, "Download finished");
    } else {
        warn!(
            written,
            expected = recording.size,
            "Transferred size differs from the size the device reported"
        );
    }

    Ok(written)
}

enum ChunkError {
    Stream(FetchError),
    Write(std::io::Error),
}

async fn write_chunks<W, P>(
    stream: &mut ByteStream,
    out_file: &mut W,
    written: &mut u64,
    progress: &P,
) -> Result<(), ChunkError>
where
    W: AsyncWrite + Unpin,
    P: ProgressSink + ?Sized,
{
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ChunkError::Stream)?;

        for piece in chunk.chunks(CHUNK_SIZE) {
            out_file.write_all(piece).await.map_err(ChunkError::Write)?;

            let len = piece.len() as u64;
            *written += len;
            progress.advance(len);
        }
    }

    Ok(())
}
