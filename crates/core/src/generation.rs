//! Generation task vocabulary: media kinds, the status machine, the credit
//! cost table and submission request validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::payload::GenerationOptions;
use crate::types::Credits;

// ---------------------------------------------------------------------------
// Media kinds
// ---------------------------------------------------------------------------

pub const MEDIA_IMAGE: &str = "image";
pub const MEDIA_VIDEO: &str = "video";
pub const MEDIA_MUSIC: &str = "music";

/// All valid media kind values.
pub const VALID_MEDIA_KINDS: &[&str] = &[MEDIA_IMAGE, MEDIA_VIDEO, MEDIA_MUSIC];

/// What a generation task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Music,
}

impl MediaKind {
    /// Return the database string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => MEDIA_IMAGE,
            Self::Video => MEDIA_VIDEO,
            Self::Music => MEDIA_MUSIC,
        }
    }

    /// Parse from a string, returning an error for unknown kinds.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            MEDIA_IMAGE => Ok(Self::Image),
            MEDIA_VIDEO => Ok(Self::Video),
            MEDIA_MUSIC => Ok(Self::Music),
            other => Err(CoreError::Validation(format!(
                "Unknown media kind: '{other}'. Valid kinds: {}",
                VALID_MEDIA_KINDS.join(", ")
            ))),
        }
    }
}

impl TryFrom<String> for MediaKind {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Task status
// ---------------------------------------------------------------------------

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";

const VALID_STATUSES: &[&str] = &[
    STATUS_PENDING,
    STATUS_PROCESSING,
    STATUS_SUCCESS,
    STATUS_FAILED,
];

/// Lifecycle status of a generation task.
///
/// Discriminants match the `status_id SMALLINT` column of
/// `generation_tasks`.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending = 1,
    Processing = 2,
    Success = 3,
    Failed = 4,
}

impl TaskStatus {
    /// Return the database status ID.
    pub fn id(self) -> i16 {
        self as i16
    }

    /// Map a database status ID back to a status.
    pub fn from_id(id: i16) -> Result<Self, CoreError> {
        match id {
            1 => Ok(Self::Pending),
            2 => Ok(Self::Processing),
            3 => Ok(Self::Success),
            4 => Ok(Self::Failed),
            other => Err(CoreError::Internal(format!(
                "Unknown generation status id {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => STATUS_PENDING,
            Self::Processing => STATUS_PROCESSING,
            Self::Success => STATUS_SUCCESS,
            Self::Failed => STATUS_FAILED,
        }
    }

    /// Parse from a string, returning an error for unknown statuses.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            STATUS_PENDING => Ok(Self::Pending),
            STATUS_PROCESSING => Ok(Self::Processing),
            STATUS_SUCCESS => Ok(Self::Success),
            STATUS_FAILED => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown task status: '{other}'. Valid statuses: {}",
                VALID_STATUSES.join(", ")
            ))),
        }
    }

    /// `success` and `failed` end a submission.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Still waiting on the provider.
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Combine the stored status with a status reported by a provider.
    ///
    /// The result never moves backwards along
    /// pending -> processing -> {success, failed}, and a terminal status
    /// is returned unchanged whatever the provider reports.
    pub fn advance(self, reported: TaskStatus) -> TaskStatus {
        match (self, reported) {
            (current, _) if current.is_terminal() => current,
            (Self::Processing, Self::Pending) => Self::Processing,
            (_, reported) => reported,
        }
    }
}

impl TryFrom<i16> for TaskStatus {
    type Error = CoreError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::from_id(value)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scenes and cost table
// ---------------------------------------------------------------------------

pub const SCENE_TEXT_TO_IMAGE: &str = "text-to-image";
pub const SCENE_IMAGE_TO_IMAGE: &str = "image-to-image";
pub const SCENE_TEXT_TO_VIDEO: &str = "text-to-video";
pub const SCENE_IMAGE_TO_VIDEO: &str = "image-to-video";
pub const SCENE_TEXT_TO_MUSIC: &str = "text-to-music";

/// Fixed credit price per (media kind, scene).
const COST_TABLE: &[(MediaKind, &str, Credits)] = &[
    (MediaKind::Image, SCENE_TEXT_TO_IMAGE, 2),
    (MediaKind::Image, SCENE_IMAGE_TO_IMAGE, 3),
    (MediaKind::Video, SCENE_TEXT_TO_VIDEO, 1),
    (MediaKind::Video, SCENE_IMAGE_TO_VIDEO, 1),
    (MediaKind::Music, SCENE_TEXT_TO_MUSIC, 10),
];

/// Look up the credit cost of a generation.
pub fn generation_cost(kind: MediaKind, scene: &str) -> Result<Credits, CoreError> {
    COST_TABLE
        .iter()
        .find(|(k, s, _)| *k == kind && *s == scene)
        .map(|(_, _, cost)| *cost)
        .ok_or_else(|| {
            let valid: Vec<&str> = COST_TABLE
                .iter()
                .filter(|(k, _, _)| *k == kind)
                .map(|(_, s, _)| *s)
                .collect();
            CoreError::Validation(format!(
                "Unknown scene '{scene}' for {kind}. Valid scenes: {}",
                valid.join(", ")
            ))
        })
}

/// Scenes that take a source image and therefore need `image_urls`.
fn scene_requires_image(scene: &str) -> bool {
    scene == SCENE_IMAGE_TO_IMAGE || scene == SCENE_IMAGE_TO_VIDEO
}

// ---------------------------------------------------------------------------
// Submission request
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/generations`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerationRequest {
    pub media_kind: MediaKind,
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    #[validate(length(min = 1, max = 128))]
    pub model: String,
    #[validate(length(min = 1, max = 64))]
    pub scene: String,
    #[validate(length(min = 1, max = 4000))]
    pub prompt: String,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    /// Validate shape and consistency and return the credit cost.
    ///
    /// Runs before any state is created.
    pub fn validate_and_price(&self) -> Result<Credits, CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation("Prompt must not be blank".into()));
        }

        if self.options.media_kind() != self.media_kind {
            return Err(CoreError::Validation(format!(
                "Options are for {} but media_kind is {}",
                self.options.media_kind(),
                self.media_kind
            )));
        }

        let cost = generation_cost(self.media_kind, &self.scene)?;

        if scene_requires_image(&self.scene) && self.options.image_urls().is_empty() {
            return Err(CoreError::Validation(format!(
                "Scene '{}' requires at least one source image",
                self.scene
            )));
        }

        Ok(cost)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
