//! Typed JSON payloads stored on a generation task.
//!
//! `options`, `task_info` and `task_result` are persisted as JSONB and are
//! always replaced wholesale. The only field-level edit is the asset URL
//! rewrite performed after media has been copied to owned storage.

use serde::{Deserialize, Serialize};

use crate::generation::MediaKind;

/// Provider-specific parameters that have no dedicated field.
pub type ExtraParams = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Submission parameters, tagged by media kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GenerationOptions {
    Image(ImageOptions),
    Video(VideoOptions),
    Music(MusicOptions),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_images: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "ExtraParams::is_empty")]
    pub extra: ExtraParams,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "ExtraParams::is_empty")]
    pub extra: ExtraParams,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MusicOptions {
    #[serde(default)]
    pub instrumental: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    #[serde(default, skip_serializing_if = "ExtraParams::is_empty")]
    pub extra: ExtraParams,
}

impl GenerationOptions {
    pub fn media_kind(&self) -> MediaKind {
        match self {
            Self::Image(_) => MediaKind::Image,
            Self::Video(_) => MediaKind::Video,
            Self::Music(_) => MediaKind::Music,
        }
    }

    /// Source image references (empty for music).
    pub fn image_urls(&self) -> &[String] {
        match self {
            Self::Image(o) => &o.image_urls,
            Self::Video(o) => &o.image_urls,
            Self::Music(_) => &[],
        }
    }

    pub fn extra(&self) -> &ExtraParams {
        match self {
            Self::Image(o) => &o.extra,
            Self::Video(o) => &o.extra,
            Self::Music(o) => &o.extra,
        }
    }
}

// ---------------------------------------------------------------------------
// Task info
// ---------------------------------------------------------------------------

/// Raw provider status snapshot, refreshed on every poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Provider's own state string (e.g. `"generating"`, `"succeeded"`).
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

impl TaskInfo {
    /// Snapshot recording a failure that happened on our side of the call.
    pub fn error(state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            progress: None,
            error_message: Some(message.into()),
            raw: serde_json::Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Task result
// ---------------------------------------------------------------------------

/// A single generated media file.
///
/// While on provider infrastructure only `url` is set. Once copied to owned
/// storage `url` points at the owned copy and the provider location is kept
/// in `provider_url` as a fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// SHA-256 of the stored bytes, set once migrated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl MediaAsset {
    /// An asset still hosted by the provider.
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// True once `url` points at owned storage.
    pub fn is_migrated(&self) -> bool {
        self.provider_url.is_some()
    }

    /// Location on provider infrastructure, whether or not migrated.
    pub fn source_url(&self) -> &str {
        self.provider_url.as_deref().unwrap_or(&self.url)
    }
}

/// Normalized provider output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub media_kind: MediaKind,
    #[serde(default)]
    pub assets: Vec<MediaAsset>,
    /// Set while assets still live on provider infrastructure and must be
    /// copied to owned storage.
    #[serde(default)]
    pub pending_migration: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl TaskResult {
    pub fn new(media_kind: MediaKind, assets: Vec<MediaAsset>) -> Self {
        Self {
            media_kind,
            assets,
            pending_migration: false,
            metadata: serde_json::Value::Null,
        }
    }

    /// URL shown to the user first: the first asset's preferred URL.
    pub fn primary_url(&self) -> Option<&str> {
        self.assets.first().map(|a| a.url.as_str())
    }

    /// Assets that still need copying to owned storage.
    pub fn unmigrated_assets(&self) -> impl Iterator<Item = &MediaAsset> {
        self.assets.iter().filter(|a| !a.is_migrated())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
