use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::core::config::MediaConfig;
use crate::core::error::MediaError;
use crate::ingest::spool::TempSpool;

use super::{run_tool, Remuxer};

/// `Remuxer` that moves the MP4 `moov` atom to the front with
/// `ffmpeg -movflags faststart`, copying streams without re-encoding.
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    program: String,
    timeout: Duration,
    spool_dir: PathBuf,
}

impl FfmpegRemuxer {
    pub fn new(config: &MediaConfig, spool_dir: PathBuf) -> Self {
        Self {
            program: config.ffmpeg_path.clone(),
            timeout: Duration::from_secs(config.remux_timeout_secs),
            spool_dir,
        }
    }
}

/// Argument list for a stream-copy fast-start remux of `input` into `output`.
pub fn faststart_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.as_os_str().to_owned()];
    args.extend(
        ["-c", "copy", "-movflags", "faststart", "-f", "mp4"]
            .iter()
            .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(&self, input: &Path) -> Result<TempSpool, MediaError> {
        // Dropped (and deleted) on every early return below.
        let mut output = TempSpool::reserve_in(&self.spool_dir, ".mp4")?;

        run_tool(
            "ffmpeg",
            &self.program,
            faststart_args(input, output.path()),
            self.timeout,
        )
        .await?;

        let size_bytes = output.refresh_size().await?;
        if size_bytes == 0 {
            return Err(MediaError::MissingOutput {
                path: output.path().display().to_string(),
            });
        }

        info!(size_bytes, "fast-start remux complete");
        Ok(output)
    }
}
