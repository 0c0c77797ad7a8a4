//! Text helpers for "generation finished" notifications.

use crate::generation::MediaKind;
use crate::types::DbId;

/// Maximum characters of prompt shown in a notification preview.
pub const PREVIEW_MAX_CHARS: usize = 50;

/// Notification kind stored on `notifications.kind`.
pub const KIND_GENERATION_SUCCESS: &str = "generation_success";

/// Truncate `text` to [`PREVIEW_MAX_CHARS`] characters, appending an
/// ellipsis when anything was cut. Whitespace runs collapse to one space.
pub fn preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= PREVIEW_MAX_CHARS {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(PREVIEW_MAX_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Title for a successful generation.
pub fn success_title(kind: MediaKind) -> String {
    match kind {
        MediaKind::Image => "Your image is ready".to_string(),
        MediaKind::Video => "Your video is ready".to_string(),
        MediaKind::Music => "Your track is ready".to_string(),
    }
}

/// Deep link to the task's page in the web app.
pub fn task_link(app_url: &str, kind: MediaKind, task_id: DbId) -> String {
    format!("{}/my/{kind}s/{task_id}", app_url.trim_end_matches('/'))
}
