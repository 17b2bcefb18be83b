use std::path::Path;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::error::IngestError;

// ---------------------------------------------------------------------------
// Temporary spool files
// ---------------------------------------------------------------------------

/// A process-local temporary file owned by one request.
///
/// The file is deleted when the spool is dropped, on success, error, or
/// cancellation alike.
#[derive(Debug)]
pub struct TempSpool {
    path: TempPath,
    size_bytes: u64,
}

impl TempSpool {
    /// Reserve an empty temp file in `dir`, for a tool to write into.
    pub fn reserve_in(dir: &Path, suffix: &str) -> std::io::Result<Self> {
        let path = tempfile::Builder::new()
            .prefix("tubely-")
            .suffix(suffix)
            .tempfile_in(dir)?
            .into_temp_path();
        Ok(Self {
            path,
            size_bytes: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Re-read the on-disk size after an external tool wrote the file.
    pub async fn refresh_size(&mut self) -> std::io::Result<u64> {
        self.size_bytes = tokio::fs::metadata(&self.path).await?.len();
        Ok(self.size_bytes)
    }
}

/// Write a byte stream to a fresh temp file in `dir`, chunk by chunk.
///
/// A stream that yields zero bytes is rejected with `EmptyUpload`; the temp
/// file is removed on every error path.
pub async fn spool_stream<S>(dir: &Path, mut stream: S) -> Result<TempSpool, IngestError>
where
    S: Stream<Item = Result<Bytes, IngestError>> + Unpin,
{
    let temp = NamedTempFile::new_in(dir)?;
    let path = temp.into_temp_path();

    let mut file = tokio::fs::File::create(&path).await?;
    let mut size_bytes: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        size_bytes += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    if size_bytes == 0 {
        return Err(IngestError::EmptyUpload);
    }

    debug!(path = %path.display(), size_bytes, "upload spooled");
    Ok(TempSpool { path, size_bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: Vec<&'static [u8]>) -> impl Stream<Item = Result<Bytes, IngestError>> + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_spool_writes_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let spool = spool_stream(dir.path(), chunks(vec![b"abc", b"defg"]))
            .await
            .unwrap();
        assert_eq!(spool.size_bytes(), 7);
        assert_eq!(std::fs::read(spool.path()).unwrap(), b"abcdefg");
    }

    #[tokio::test]
    async fn test_spool_deleted_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let spool = spool_stream(dir.path(), chunks(vec![b"data"])).await.unwrap();
        let path = spool.path().to_path_buf();
        assert!(path.exists());
        drop(spool);
        assert!(!path.exists());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_empty_stream_rejected_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let err = spool_stream(dir.path(), chunks(vec![])).await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyUpload));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_stream_error_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(IngestError::UploadTooLarge { max_bytes: 7 }),
        ]);
        let err = spool_stream(dir.path(), failing).await.unwrap_err();
        assert!(matches!(err, IngestError::UploadTooLarge { .. }));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_reserved_spool_refreshes_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = TempSpool::reserve_in(dir.path(), ".mp4").unwrap();
        assert_eq!(spool.size_bytes(), 0);
        std::fs::write(spool.path(), b"12345").unwrap();
        assert_eq!(spool.refresh_size().await.unwrap(), 5);
        assert!(spool.path().to_string_lossy().ends_with(".mp4"));
    }
}
