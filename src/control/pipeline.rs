use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::error::UploadError;
use crate::core::types::{Orientation, UploadKind, UserId, Video, VideoId};
use crate::ingest::asset::{asset_key, new_asset_id};
use crate::ingest::multipart::SpooledUpload;
use crate::media::{MediaInspector, Remuxer};
use crate::observability::metrics as obs_metrics;
use crate::storage::{ObjectStore, SignedUrlIssuer};

use super::repository::VideoRepository;

/// Content type of every stored video object after remux.
const REMUXED_MEDIA_TYPE: &str = "video/mp4";

/// Result of a successful video upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedVideo {
    #[serde(flatten)]
    pub video: Video,
    pub orientation: Orientation,
}

/// Upload orchestrator.
///
/// Steps run strictly in sequence with no retries:
/// ownership check, probe, remux, key derivation, store, persist, sign.
/// The record is written only after the object store accepted the file,
/// and every spool is dropped (deleted) when the call returns.
#[derive(Clone)]
pub struct UploadPipeline {
    inspector: Arc<dyn MediaInspector>,
    remuxer: Arc<dyn Remuxer>,
    store: Arc<dyn ObjectStore>,
    issuer: SignedUrlIssuer,
    repo: Arc<dyn VideoRepository>,
}

impl UploadPipeline {
    pub fn new(
        inspector: Arc<dyn MediaInspector>,
        remuxer: Arc<dyn Remuxer>,
        store: Arc<dyn ObjectStore>,
        issuer: SignedUrlIssuer,
        repo: Arc<dyn VideoRepository>,
    ) -> Self {
        Self {
            inspector,
            remuxer,
            store,
            issuer,
            repo,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn repository(&self) -> &Arc<dyn VideoRepository> {
        &self.repo
    }

    /// Load the record and check that `caller` owns it.
    ///
    /// Runs before the request body is read, so a rejected caller causes
    /// no I/O.
    pub async fn authorize(&self, video_id: VideoId, caller: UserId) -> Result<Video, UploadError> {
        let video = self.repo.get_video(video_id).await?;
        if video.user_id != caller {
            warn!(%video_id, user_id = %caller, "upload rejected: caller does not own video");
            return Err(UploadError::NotOwner {
                user_id: caller,
                video_id,
            });
        }
        Ok(video)
    }

    /// Probe, remux and store a spooled video, then point the record at it.
    pub async fn publish_video(
        &self,
        video: Video,
        upload: SpooledUpload,
    ) -> Result<UploadedVideo, UploadError> {
        let start = Instant::now();
        let kind = UploadKind::Video;
        let result = self.run_video(video, upload).await;
        record_outcome(kind, start, result.is_ok());
        result
    }

    async fn run_video(
        &self,
        mut video: Video,
        upload: SpooledUpload,
    ) -> Result<UploadedVideo, UploadError> {
        obs_metrics::record_upload_size(UploadKind::Video.as_str(), upload.spool.size_bytes());

        let geometry = self.inspector.probe(upload.spool.path()).await?;
        let orientation = geometry.orientation();

        let remuxed = self.remuxer.remux(upload.spool.path()).await?;
        drop(upload);

        let key = asset_key(Some(orientation), &new_asset_id(), REMUXED_MEDIA_TYPE);
        let reference = self
            .store
            .put(&key, remuxed.path(), REMUXED_MEDIA_TYPE)
            .await?;
        drop(remuxed);

        video.video_url = Some(reference.encode());
        let updated = self.repo.update_video(&video).await?;

        obs_metrics::inc_orientation(orientation.as_str());
        info!(
            video_id = %updated.id,
            width = geometry.width,
            height = geometry.height,
            %orientation,
            object_key = %key,
            "video published"
        );

        let video = self.sign_video(updated).await?;
        Ok(UploadedVideo { video, orientation })
    }

    /// Store a spooled thumbnail and record its public URL.
    pub async fn publish_thumbnail(
        &self,
        video: Video,
        upload: SpooledUpload,
    ) -> Result<Video, UploadError> {
        let start = Instant::now();
        let result = self.run_thumbnail(video, upload).await;
        record_outcome(UploadKind::Thumbnail, start, result.is_ok());
        result
    }

    async fn run_thumbnail(
        &self,
        mut video: Video,
        upload: SpooledUpload,
    ) -> Result<Video, UploadError> {
        obs_metrics::record_upload_size(
            UploadKind::Thumbnail.as_str(),
            upload.spool.size_bytes(),
        );

        let key = asset_key(None, &new_asset_id(), &upload.media_type);
        self.store
            .put(&key, upload.spool.path(), &upload.media_type)
            .await?;
        drop(upload);

        video.thumbnail_url = Some(self.store.public_url(&key));
        let updated = self.repo.update_video(&video).await?;
        info!(video_id = %updated.id, object_key = %key, "thumbnail published");

        self.sign_video(updated).await
    }

    /// Swap a stored reference for a fresh signed URL. No-op without one.
    pub async fn sign_video(&self, mut video: Video) -> Result<Video, UploadError> {
        if let Some(encoded) = video.video_url.take() {
            video.video_url = Some(self.issuer.issue(&encoded).await?);
        }
        Ok(video)
    }

    /// Sign every record in `videos`, failing on the first bad reference.
    pub async fn sign_videos(&self, videos: Vec<Video>) -> Result<Vec<Video>, UploadError> {
        let mut signed = Vec::with_capacity(videos.len());
        for video in videos {
            signed.push(self.sign_video(video).await?);
        }
        Ok(signed)
    }
}

fn record_outcome(kind: UploadKind, start: Instant, ok: bool) {
    let outcome = if ok { "success" } else { "failure" };
    obs_metrics::inc_upload(kind.as_str(), outcome);
    obs_metrics::record_upload_duration(kind.as_str(), start.elapsed().as_secs_f64());
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;

    use crate::control::repository::InMemoryVideoRepository;
    use crate::core::error::{IngestError, MediaError, StorageError};
    use crate::ingest::spool::{spool_stream, TempSpool};
    use crate::media::VideoGeometry;
    use crate::storage::{HmacUrlSigner, InMemoryObjectStore, StorageReference};

    /// Inspector returning a fixed geometry, or failing like a broken ffprobe.
    pub(crate) struct FakeInspector(pub Option<VideoGeometry>);

    #[async_trait]
    impl MediaInspector for FakeInspector {
        async fn probe(&self, _path: &Path) -> Result<VideoGeometry, MediaError> {
            self.0.ok_or(MediaError::NoVideoStream)
        }
    }

    /// Remuxer that copies its input into a fresh spool.
    pub(crate) struct CopyRemuxer(pub PathBuf);

    #[async_trait]
    impl Remuxer for CopyRemuxer {
        async fn remux(&self, input: &Path) -> Result<TempSpool, MediaError> {
            let mut out = TempSpool::reserve_in(&self.0, ".mp4")?;
            tokio::fs::copy(input, out.path()).await?;
            out.refresh_size().await?;
            Ok(out)
        }
    }

    /// Remuxer that opens its output spool and then fails like an ffmpeg
    /// run that wrote nothing.
    struct FailRemux(PathBuf);

    #[async_trait]
    impl Remuxer for FailRemux {
        async fn remux(&self, _input: &Path) -> Result<TempSpool, MediaError> {
            let out = TempSpool::reserve_in(&self.0, ".mp4")?;
            Err(MediaError::MissingOutput {
                path: out.path().display().to_string(),
            })
        }
    }

    /// Store whose every PUT is refused.
    struct FailStore;

    #[async_trait]
    impl ObjectStore for FailStore {
        fn backend(&self) -> &'static str {
            "fail"
        }

        fn bucket(&self) -> &str {
            "media"
        }

        async fn put(
            &self,
            key: &str,
            _local_path: &Path,
            _content_type: &str,
        ) -> Result<StorageReference, StorageError> {
            Err(StorageError::PutFailed {
                key: key.to_string(),
                reason: "access denied".to_string(),
            })
        }

        fn public_url(&self, key: &str) -> String {
            format!("http://localhost:8091/assets/media/{key}")
        }

        async fn health_check(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    struct Harness {
        pipeline: UploadPipeline,
        store: Arc<InMemoryObjectStore>,
        repo: Arc<InMemoryVideoRepository>,
        dir: tempfile::TempDir,
    }

    fn harness(geometry: Option<VideoGeometry>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let remuxer = Arc::new(CopyRemuxer(dir.path().to_path_buf()));
        harness_with(dir, geometry, remuxer, None)
    }

    /// Like `harness`, with the remuxer chosen by the caller and an optional
    /// replacement for the in-memory store.
    fn harness_with(
        dir: tempfile::TempDir,
        geometry: Option<VideoGeometry>,
        remuxer: Arc<dyn Remuxer>,
        store_override: Option<Arc<dyn ObjectStore>>,
    ) -> Harness {
        let store = Arc::new(InMemoryObjectStore::new("media", "http://localhost:8091"));
        let signer = Arc::new(HmacUrlSigner::new(b"secret", "http://localhost:8091").unwrap());
        let repo = Arc::new(InMemoryVideoRepository::new());
        let pipeline = UploadPipeline::new(
            Arc::new(FakeInspector(geometry)),
            remuxer,
            store_override.unwrap_or_else(|| store.clone() as Arc<dyn ObjectStore>),
            SignedUrlIssuer::new(signer),
            repo.clone(),
        );
        Harness {
            pipeline,
            store,
            repo,
            dir,
        }
    }

    async fn spooled(dir: &Path, media_type: &str) -> SpooledUpload {
        let body = stream::iter(vec![Ok::<_, IngestError>(Bytes::from_static(b"ftyp....moov"))]);
        SpooledUpload {
            spool: spool_stream(dir, body).await.unwrap(),
            media_type: media_type.to_string(),
        }
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    const LANDSCAPE: VideoGeometry = VideoGeometry {
        width: 1920,
        height: 1080,
    };

    #[tokio::test]
    async fn test_authorize_owner() {
        let h = harness(Some(LANDSCAPE));
        let owner = UserId::new();
        let video = h
            .repo
            .create_video(Video::new(owner, "t".into(), None))
            .await
            .unwrap();
        assert_eq!(h.pipeline.authorize(video.id, owner).await.unwrap().id, video.id);
    }

    #[tokio::test]
    async fn test_authorize_rejects_other_user() {
        let h = harness(Some(LANDSCAPE));
        let video = h
            .repo
            .create_video(Video::new(UserId::new(), "t".into(), None))
            .await
            .unwrap();
        let err = h.pipeline.authorize(video.id, UserId::new()).await.unwrap_err();
        assert!(matches!(err, UploadError::NotOwner { .. }));
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_authorize_unknown_video() {
        let h = harness(Some(LANDSCAPE));
        let err = h
            .pipeline
            .authorize(VideoId::new(), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::VideoNotFound { .. }));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_publish_landscape_video() {
        let h = harness(Some(LANDSCAPE));
        let video = h
            .repo
            .create_video(Video::new(UserId::new(), "t".into(), None))
            .await
            .unwrap();
        let upload = spooled(h.dir.path(), "video/mp4").await;

        let published = h.pipeline.publish_video(video.clone(), upload).await.unwrap();
        assert_eq!(published.orientation, Orientation::Landscape);

        let url = published.video.video_url.unwrap();
        assert!(url.starts_with("http://localhost:8091/assets/media/landscape/"));
        assert!(url.contains("signature="));

        let stored = h.repo.get_video(video.id).await.unwrap();
        let reference: StorageReference = stored.video_url.unwrap().parse().unwrap();
        assert_eq!(reference.bucket(), "media");
        assert!(reference.key().starts_with("landscape/"));
        assert!(reference.key().ends_with(".mp4"));
        assert!(h.store.exists(reference.key()).await);

        assert!(dir_is_empty(h.dir.path()));
    }

    #[tokio::test]
    async fn test_probe_failure_leaves_record_unchanged() {
        let h = harness(None);
        let video = h
            .repo
            .create_video(Video::new(UserId::new(), "t".into(), None))
            .await
            .unwrap();
        let upload = spooled(h.dir.path(), "video/mp4").await;

        let err = h.pipeline.publish_video(video.clone(), upload).await.unwrap_err();
        assert!(matches!(err, UploadError::Media(_)));
        assert_eq!(err.status_code(), 500);

        assert_eq!(h.repo.get_video(video.id).await.unwrap().video_url, None);
        assert_eq!(h.store.object_count().await, 0);
        assert!(dir_is_empty(h.dir.path()));
    }

    #[tokio::test]
    async fn test_remux_failure_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let remuxer = Arc::new(FailRemux(dir.path().to_path_buf()));
        let h = harness_with(dir, Some(LANDSCAPE), remuxer, None);
        let video = h
            .repo
            .create_video(Video::new(UserId::new(), "t".into(), None))
            .await
            .unwrap();
        let upload = spooled(h.dir.path(), "video/mp4").await;

        let err = h.pipeline.publish_video(video.clone(), upload).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Media(MediaError::MissingOutput { .. })
        ));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_code(), "processing_error");

        assert_eq!(h.repo.get_video(video.id).await.unwrap().video_url, None);
        assert_eq!(h.store.object_count().await, 0);
        assert!(dir_is_empty(h.dir.path()));
    }

    #[tokio::test]
    async fn test_store_failure_leaves_record_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let remuxer = Arc::new(CopyRemuxer(dir.path().to_path_buf()));
        let h = harness_with(dir, Some(LANDSCAPE), remuxer, Some(Arc::new(FailStore)));
        let video = h
            .repo
            .create_video(Video::new(UserId::new(), "t".into(), None))
            .await
            .unwrap();
        let upload = spooled(h.dir.path(), "video/mp4").await;

        let err = h.pipeline.publish_video(video.clone(), upload).await.unwrap_err();
        assert!(matches!(err, UploadError::Storage(StorageError::PutFailed { .. })));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_code(), "storage_error");

        assert_eq!(h.repo.get_video(video.id).await.unwrap().video_url, None);
        assert!(dir_is_empty(h.dir.path()));
    }

    #[tokio::test]
    async fn test_each_upload_gets_a_new_key() {
        let h = harness(Some(VideoGeometry {
            width: 1080,
            height: 1920,
        }));
        let video = h
            .repo
            .create_video(Video::new(UserId::new(), "t".into(), None))
            .await
            .unwrap();

        for _ in 0..2 {
            let upload = spooled(h.dir.path(), "video/mp4").await;
            let published = h.pipeline.publish_video(video.clone(), upload).await.unwrap();
            assert_eq!(published.orientation, Orientation::Portrait);
        }
        assert_eq!(h.store.object_count().await, 2);
    }

    #[tokio::test]
    async fn test_publish_thumbnail() {
        let h = harness(Some(LANDSCAPE));
        let video = h
            .repo
            .create_video(Video::new(UserId::new(), "t".into(), None))
            .await
            .unwrap();
        let upload = spooled(h.dir.path(), "image/png").await;

        let updated = h.pipeline.publish_thumbnail(video.clone(), upload).await.unwrap();
        let thumb = updated.thumbnail_url.unwrap();
        assert!(thumb.starts_with("http://localhost:8091/assets/media/"));
        assert!(thumb.ends_with(".png"));
        let key = thumb.rsplit('/').next().unwrap();
        assert!(h.store.exists(key).await);
        assert_eq!(updated.video_url, None);
        assert!(dir_is_empty(h.dir.path()));
    }

    #[tokio::test]
    async fn test_sign_video_without_reference() {
        let h = harness(Some(LANDSCAPE));
        let video = Video::new(UserId::new(), "t".into(), None);
        assert_eq!(h.pipeline.sign_video(video.clone()).await.unwrap(), video);
    }

    #[tokio::test]
    async fn test_sign_video_malformed_reference() {
        let h = harness(Some(LANDSCAPE));
        let mut video = Video::new(UserId::new(), "t".into(), None);
        video.video_url = Some("a,b,c".to_string());
        let err = h.pipeline.sign_video(video).await.unwrap_err();
        assert!(matches!(err, UploadError::Sign(_)));
    }
}
