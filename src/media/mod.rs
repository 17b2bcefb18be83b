use std::ffi::OsString;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::core::error::MediaError;
use crate::core::types::Orientation;
use crate::ingest::spool::TempSpool;
use crate::observability::metrics as obs_metrics;

pub mod faststart;
pub mod probe;

pub use faststart::FfmpegRemuxer;
pub use probe::FfprobeInspector;

/// Longest stderr excerpt kept in a `ToolFailed` error.
const STDERR_EXCERPT_BYTES: usize = 2048;

// ---------------------------------------------------------------------------
// Media seams
// ---------------------------------------------------------------------------

/// Measured geometry of a video's primary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoGeometry {
    pub width: u32,
    pub height: u32,
}

impl VideoGeometry {
    pub fn orientation(&self) -> Orientation {
        Orientation::from_dimensions(self.width, self.height)
    }
}

/// Reads stream geometry from a media file.
#[async_trait]
pub trait MediaInspector: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<VideoGeometry, MediaError>;
}

/// Rewrites a container so its index sits at the front of the file.
///
/// Implementations must leave `input` untouched and return a new spool.
#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn remux(&self, input: &Path) -> Result<TempSpool, MediaError>;
}

// ---------------------------------------------------------------------------
// External tool runner
// ---------------------------------------------------------------------------

/// Run an external tool to completion, capturing stdout and stderr.
///
/// The child is killed if the deadline passes or the calling future is
/// dropped. A non-zero exit becomes `ToolFailed` with a stderr excerpt.
pub(crate) async fn run_tool(
    tool: &'static str,
    program: &str,
    args: Vec<OsString>,
    timeout: Duration,
) -> Result<Output, MediaError> {
    let start = Instant::now();
    let mut command = Command::new(program);
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(tool, program, "running media tool");

    let result = match tokio::time::timeout(timeout, command.output()).await {
        Err(_) => Err(MediaError::Timeout {
            tool,
            timeout_secs: timeout.as_secs(),
        }),
        Ok(Err(source)) => Err(MediaError::Spawn { tool, source }),
        Ok(Ok(output)) if !output.status.success() => Err(MediaError::ToolFailed {
            tool,
            status: output.status.to_string(),
            stderr: stderr_excerpt(&output.stderr),
        }),
        Ok(Ok(output)) => Ok(output),
    };

    obs_metrics::record_tool_duration(tool, start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        obs_metrics::inc_tool_error(tool, e.kind());
        warn!(tool, error = %e, "media tool failed");
    }
    result
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_EXCERPT_BYTES {
        return trimmed.to_string();
    }
    let mut end = STDERR_EXCERPT_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}
