use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::core::config::MediaConfig;
use crate::core::error::MediaError;

use super::{run_tool, MediaInspector, VideoGeometry};

// ---------------------------------------------------------------------------
// ffprobe output model
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Extract the primary video stream's geometry from ffprobe JSON.
///
/// Picks the first stream whose `codec_type` is `video`; when no stream
/// declares a type, the first stream carrying both dimensions is used.
pub fn parse_probe_output(stdout: &[u8]) -> Result<VideoGeometry, MediaError> {
    let parsed: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| MediaError::InvalidProbeOutput {
            reason: e.to_string(),
        })?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .or_else(|| {
            parsed
                .streams
                .iter()
                .find(|s| s.codec_type.is_none() && s.width.is_some() && s.height.is_some())
        })
        .ok_or(MediaError::NoVideoStream)?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(MediaError::InvalidGeometry { width, height });
    }

    Ok(VideoGeometry { width, height })
}

// ---------------------------------------------------------------------------
// ffprobe inspector
// ---------------------------------------------------------------------------

/// `MediaInspector` backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeInspector {
    program: String,
    timeout: Duration,
}

impl FfprobeInspector {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            program: config.ffprobe_path.clone(),
            timeout: Duration::from_secs(config.probe_timeout_secs),
        }
    }

    fn args(path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-v", "error", "-print_format", "json", "-show_streams"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(path.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl MediaInspector for FfprobeInspector {
    async fn probe(&self, path: &Path) -> Result<VideoGeometry, MediaError> {
        let output = run_tool("ffprobe", &self.program, Self::args(path), self.timeout).await?;
        let geometry = parse_probe_output(&output.stdout)?;
        info!(
            width = geometry.width,
            height = geometry.height,
            orientation = %geometry.orientation(),
            "video probed"
        );
        Ok(geometry)
    }
}
