use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a video record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(Uuid);

impl VideoId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for VideoId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an authenticated user, taken from the `sub` claim of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Video record
// ---------------------------------------------------------------------------

/// A video record as held by the metadata store.
///
/// `video_url` holds the persisted `"bucket,key"` storage reference while at
/// rest. Anything handed back to a client has been passed through the signed
/// URL issuer first, so the field then carries a time-limited URL instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub user_id: UserId,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
}

impl Video {
    /// Create a draft record with no media attached yet.
    pub fn new(user_id: UserId, title: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: VideoId::new(),
            created_at: now,
            updated_at: now,
            title,
            description,
            user_id,
            thumbnail_url: None,
            video_url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Orientation
// ---------------------------------------------------------------------------

/// Coarse aspect-ratio class of a video, used as the object key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
    Other,
}

impl Orientation {
    /// Classify a `width / height` ratio.
    ///
    /// Bands are open on both ends so that 16:9 (1.777...) and 9:16 (0.5625)
    /// land inside them after encoder rounding, while exact 1.7, 1.8, 0.5 and
    /// 0.6 fall through to `Other`. First match wins.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 1.7 && ratio < 1.8 {
            Orientation::Landscape
        } else if ratio > 0.5 && ratio < 0.6 {
            Orientation::Portrait
        } else {
            Orientation::Other
        }
    }

    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self::from_ratio(f64::from(width) / f64::from(height))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
            Orientation::Other => "other",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Upload kinds
// ---------------------------------------------------------------------------

const VIDEO_MEDIA_TYPES: &[&str] = &["video/mp4"];
const THUMBNAIL_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// The two things a client can upload against a video record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadKind {
    Video,
    Thumbnail,
}

impl UploadKind {
    /// Name of the multipart form field carrying the file.
    pub fn form_field(&self) -> &'static str {
        match self {
            UploadKind::Video => "video",
            UploadKind::Thumbnail => "thumbnail",
        }
    }

    /// Media types accepted for this kind, compared against the parsed essence.
    pub fn accepted_media_types(&self) -> &'static [&'static str] {
        match self {
            UploadKind::Video => VIDEO_MEDIA_TYPES,
            UploadKind::Thumbnail => THUMBNAIL_MEDIA_TYPES,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadKind::Video => "video",
            UploadKind::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
