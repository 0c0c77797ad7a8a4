//! Content fingerprints and owned-storage object keys.
//!
//! Media copied to owned storage is keyed by the SHA-256 of its bytes, so a
//! second copy of the same content maps to the same object and is skipped.

use sha2::{Digest, Sha256};

use crate::generation::MediaKind;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Object key for content with the given fingerprint.
///
/// Layout: `{prefix}/{kind}/{fp[0..2]}/{fp}.{ext}`. The two-character shard
/// keeps directory listings small on filesystem backends.
pub fn object_key(prefix: &str, kind: MediaKind, fingerprint: &str, extension: &str) -> String {
    let shard = fingerprint.get(..2).unwrap_or("00");
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{kind}/{shard}/{fingerprint}.{extension}")
    } else {
        format!("{prefix}/{kind}/{shard}/{fingerprint}.{extension}")
    }
}

/// Pick a file extension from a MIME type, falling back to the URL path and
/// finally to a per-kind default.
pub fn extension_for(content_type: Option<&str>, url: &str, kind: MediaKind) -> &'static str {
    let by_mime = content_type.and_then(|ct| {
        let essence = ct.split(';').next().unwrap_or(ct).trim();
        match essence {
            "image/png" => Some("png"),
            "image/jpeg" | "image/jpg" => Some("jpg"),
            "image/webp" => Some("webp"),
            "image/gif" => Some("gif"),
            "video/mp4" => Some("mp4"),
            "video/webm" => Some("webm"),
            "video/quicktime" => Some("mov"),
            "audio/mpeg" | "audio/mp3" => Some("mp3"),
            "audio/wav" | "audio/x-wav" => Some("wav"),
            "audio/ogg" => Some("ogg"),
            _ => None,
        }
    });
    if let Some(ext) = by_mime {
        return ext;
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    let by_path = path.rsplit_once('.').and_then(|(_, ext)| {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some("png"),
            "jpg" | "jpeg" => Some("jpg"),
            "webp" => Some("webp"),
            "gif" => Some("gif"),
            "mp4" => Some("mp4"),
            "webm" => Some("webm"),
            "mov" => Some("mov"),
            "mp3" => Some("mp3"),
            "wav" => Some("wav"),
            "ogg" => Some("ogg"),
            _ => None,
        }
    });

    by_path.unwrap_or(match kind {
        MediaKind::Image => "png",
        MediaKind::Video => "mp4",
        MediaKind::Music => "mp3",
    })
}
