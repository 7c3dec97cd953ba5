use anyhow::Context;
use bytes::Bytes;
use rand::{distributions::Alphanumeric, Rng};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Placeholder shown for customers without an uploaded image. Shared by every
/// record, so it must never be deleted.
pub const DEFAULT_IMAGE: &str = "/default-images/ben.png";

pub const UPLOAD_PREFIX: &str = "/uploads/";

/// 2048 KB.
pub const MAX_IMAGE_BYTES: usize = 2048 * 1024;

const NAME_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Svg,
    Bmp,
    Webp,
}

impl ImageKind {
    /// Detects the image type from the file content, not the client-supplied name.
    pub fn sniff(body: &[u8]) -> Option<Self> {
        if body.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(Self::Png);
        }
        if body.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if body.starts_with(b"GIF87a") || body.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }
        if body.starts_with(b"BM") && body.len() > 14 {
            return Some(Self::Bmp);
        }
        if body.len() >= 12 && &body[0..4] == b"RIFF" && &body[8..12] == b"WEBP" {
            return Some(Self::Webp);
        }
        let head = &body[..body.len().min(1024)];
        let text = String::from_utf8_lossy(head).to_ascii_lowercase();
        let text = text.trim_start_matches('\u{feff}').trim_start();
        if text.starts_with('<') && text.contains("<svg") {
            return Some(Self::Svg);
        }
        None
    }

    /// Types accepted for customer profile images (jpeg, png, jpg, gif, svg).
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Gif | Self::Svg)
    }

    pub fn ext(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Svg => "svg",
            Self::Bmp => "bmp",
            Self::Webp => "webp",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Svg => "image/svg+xml",
            Self::Bmp => "image/bmp",
            Self::Webp => "image/webp",
        }
    }
}

/// A file part received from a form, before validation.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub body: Bytes,
    pub file_name: String,
}

/// An upload that passed the image rules.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub body: Bytes,
    pub file_name: String,
    pub kind: ImageKind,
}

/// True when `reference` points at an asset owned by a single record, i.e. an
/// upload rather than the shared placeholder.
pub fn is_owned_asset(reference: Option<&str>) -> bool {
    match reference {
        Some(r) => r != DEFAULT_IMAGE && asset_key(r).is_some(),
        None => false,
    }
}

/// `/uploads/<name>` → `<name>`.
pub fn asset_key(reference: &str) -> Option<&str> {
    let key = reference.strip_prefix(UPLOAD_PREFIX)?;
    if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
        return None;
    }
    Some(key)
}

fn generate_name(kind: ImageKind) -> String {
    let stem: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_LEN)
        .map(char::from)
        .collect();
    format!("{}.{}", stem, kind.ext())
}

/// Persists the upload under a generated name and returns its `/uploads/...` reference.
pub async fn store_image(st: &AppState, upload: &ImageUpload) -> anyhow::Result<String> {
    let key = generate_name(upload.kind);
    st.storage
        .put_object(&key, upload.body.clone(), upload.kind.mime())
        .await
        .with_context(|| format!("put_object {}", key))?;
    info!(%key, original = %upload.file_name, bytes = upload.body.len(), "image stored");
    Ok(format!("{}{}", UPLOAD_PREFIX, key))
}

/// Removes the asset behind `reference`. Missing assets are a no-op.
pub async fn delete_image(st: &AppState, reference: &str) -> anyhow::Result<()> {
    let Some(key) = asset_key(reference) else {
        warn!(%reference, "refusing to delete non-upload reference");
        return Ok(());
    };
    if reference == DEFAULT_IMAGE || !st.storage.exists(key).await? {
        debug!(%reference, "image already absent");
        return Ok(());
    }
    st.storage
        .delete_object(key)
        .await
        .with_context(|| format!("delete_object {}", key))?;
    info!(%reference, "image deleted");
    Ok(())
}

pub async fn image_exists(st: &AppState, reference: &str) -> anyhow::Result<bool> {
    match asset_key(reference) {
        Some(key) => st.storage.exists(key).await,
        None => Ok(false),
    }
}

/// Resolves a stored upload to a URL the browser can fetch.
pub async fn presign_upload(st: &AppState, key: &str) -> anyhow::Result<String> {
    const TTL_SECS: u64 = 10 * 60;
    st.storage
        .presign_get(key, TTL_SECS)
        .await
        .with_context(|| format!("presign url for {}", key))
}
