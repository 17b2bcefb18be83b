use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::core::error::RepositoryError;
use crate::core::types::{UserId, Video, VideoId};

// ---------------------------------------------------------------------------
// VideoRepository trait
// ---------------------------------------------------------------------------

/// Metadata store for video records.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn get_video(&self, id: VideoId) -> Result<Video, RepositoryError>;

    async fn create_video(&self, video: Video) -> Result<Video, RepositoryError>;

    /// All records owned by `user_id`, newest first.
    async fn list_videos(&self, user_id: UserId) -> Result<Vec<Video>, RepositoryError>;

    /// Replace a stored record. Bumps `updated_at`.
    async fn update_video(&self, video: &Video) -> Result<Video, RepositoryError>;
}

// ---------------------------------------------------------------------------
// In-memory repository
// ---------------------------------------------------------------------------

/// In-process video record store backed by `DashMap` for lock-free
/// concurrent access.
///
/// Updates are whole-record replacements with no version check, so two
/// uploads racing on the same record resolve as last writer wins.
#[derive(Default)]
pub struct InMemoryVideoRepository {
    videos: DashMap<VideoId, Video>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self {
            videos: DashMap::new(),
        }
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn get_video(&self, id: VideoId) -> Result<Video, RepositoryError> {
        self.videos
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(RepositoryError::NotFound { video_id: id })
    }

    async fn create_video(&self, video: Video) -> Result<Video, RepositoryError> {
        if self.videos.contains_key(&video.id) {
            return Err(RepositoryError::Backend {
                reason: format!("video {} already exists", video.id),
            });
        }
        self.videos.insert(video.id, video.clone());
        info!(video_id = %video.id, user_id = %video.user_id, "video record created");
        Ok(video)
    }

    async fn list_videos(&self, user_id: UserId) -> Result<Vec<Video>, RepositoryError> {
        let mut videos: Vec<Video> = self
            .videos
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(videos)
    }

    async fn update_video(&self, video: &Video) -> Result<Video, RepositoryError> {
        let mut entry = self
            .videos
            .get_mut(&video.id)
            .ok_or(RepositoryError::NotFound { video_id: video.id })?;

        let mut updated = video.clone();
        updated.updated_at = Utc::now();
        *entry = updated.clone();
        drop(entry);

        debug!(video_id = %video.id, "video record updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(user_id: UserId, title: &str) -> Video {
        Video::new(user_id, title.to_string(), None)
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let repo = InMemoryVideoRepository::new();
        let video = repo.create_video(draft(UserId::new(), "a")).await.unwrap();
        assert_eq!(repo.get_video(video.id).await.unwrap(), video);
    }

    #[tokio::test]
    async fn test_get_unknown() {
        let repo = InMemoryVideoRepository::new();
        assert!(matches!(
            repo.get_video(VideoId::new()).await,
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let repo = InMemoryVideoRepository::new();
        let video = draft(UserId::new(), "a");
        repo.create_video(video.clone()).await.unwrap();
        assert!(repo.create_video(video).await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters_by_owner() {
        let repo = InMemoryVideoRepository::new();
        let alice = UserId::new();
        let bob = UserId::new();
        repo.create_video(draft(alice, "one")).await.unwrap();
        repo.create_video(draft(alice, "two")).await.unwrap();
        repo.create_video(draft(bob, "three")).await.unwrap();

        let listed = repo.list_videos(alice).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|v| v.user_id == alice));
        assert!(listed[0].created_at >= listed[1].created_at);
    }

    #[tokio::test]
    async fn test_update_bumps_timestamp() {
        let repo = InMemoryVideoRepository::new();
        let mut video = repo.create_video(draft(UserId::new(), "a")).await.unwrap();
        video.video_url = Some("media,landscape/x.mp4".to_string());

        let updated = repo.update_video(&video).await.unwrap();
        assert!(updated.updated_at >= video.updated_at);
        assert_eq!(
            repo.get_video(video.id).await.unwrap().video_url.as_deref(),
            Some("media,landscape/x.mp4")
        );
    }

    #[tokio::test]
    async fn test_update_unknown() {
        let repo = InMemoryVideoRepository::new();
        let video = draft(UserId::new(), "ghost");
        assert!(matches!(
            repo.update_video(&video).await,
            Err(RepositoryError::NotFound { .. })
        ));
    }
}
