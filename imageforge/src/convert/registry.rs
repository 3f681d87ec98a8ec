//! Managed image registry, persisted across sessions.
//!
//! Uploaded images are staged first (original stored, not yet ready) and
//! become ready once a preview has been attached. Only ready images are
//! eligible for conversion. The registry is backed by a [`DiskStore`]
//! keyed by image id, so uploads survive restarts.

use super::types::{ConvertError, ConvertOptions, ImageFormat, StoredFile, TargetFormat, DEFAULT_QUALITY};
use crate::store::{now_ms, DiskStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A managed image and its conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedImage {
    /// Stable id: creation timestamp plus a random suffix, sortable by
    /// creation order.
    pub id: String,
    /// Original uploaded file.
    pub original: StoredFile,
    /// Low-resolution preview, present once staging finished.
    pub preview: Option<StoredFile>,
    /// Output format selection.
    pub target: TargetFormat,
    /// Encoding quality, 0-100.
    pub quality: u8,
    /// User-editable display filename.
    pub display_name: String,
    /// False until the preview exists and the original is stored.
    pub ready: bool,
}

impl ManagedImage {
    /// Format of the original file.
    pub fn current_format(&self) -> ImageFormat {
        self.original.format
    }

    /// Resolves this image's conversion options against its target
    /// format policy.
    pub fn options(&self) -> ConvertOptions {
        ConvertOptions {
            format: self.target.resolve(self.current_format()),
            quality: self.quality,
            max_dimensions: None,
        }
    }
}

/// Generates a unique image id: zero-padded milliseconds since the epoch
/// plus a random hex suffix. Lexicographic order matches creation order.
pub fn generate_id() -> String {
    format!("{:013}-{:04x}", now_ms(), rand::random::<u16>())
}

/// Validator applied to every persisted [`ManagedImage`].
pub fn validate_image(image: &ManagedImage) -> Result<(), String> {
    if image.id.is_empty() {
        return Err("image id must not be empty".to_string());
    }
    if image.quality > 100 {
        return Err(format!("quality {} out of range 0-100", image.quality));
    }
    if image.ready && image.preview.is_none() {
        return Err("ready image is missing its preview".to_string());
    }
    Ok(())
}

/// Persistent registry of managed images.
#[derive(Clone)]
pub struct ImageRegistry {
    store: DiskStore<ManagedImage>,
}

impl ImageRegistry {
    pub fn new(store: DiskStore<ManagedImage>) -> Self {
        Self { store }
    }

    /// Stages a new image: the original is persisted immediately, but
    /// the image stays not-ready until a preview is attached.
    pub async fn stage(
        &self,
        display_name: impl Into<String>,
        format: ImageFormat,
        bytes: Vec<u8>,
    ) -> Result<ManagedImage, ConvertError> {
        let display_name = display_name.into();
        let image = ManagedImage {
            id: generate_id(),
            original: StoredFile {
                name: display_name.clone(),
                format,
                bytes,
            },
            preview: None,
            target: TargetFormat::Keep,
            quality: DEFAULT_QUALITY,
            display_name,
            ready: false,
        };

        self.store.set(&image.id, image.clone()).await?;
        debug!(id = %image.id, format = %format, "image staged");
        Ok(image)
    }

    /// Attaches the generated preview and marks the image ready.
    pub async fn attach_preview(
        &self,
        id: &str,
        preview: StoredFile,
    ) -> Result<ManagedImage, ConvertError> {
        let mut image = self.get(id).await?;
        image.preview = Some(preview);
        image.ready = true;
        self.store.set(id, image.clone()).await?;
        debug!(id = %id, "image ready");
        Ok(image)
    }

    /// Fetches an image by id.
    pub async fn get(&self, id: &str) -> Result<ManagedImage, ConvertError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ConvertError::UnknownImage(id.to_string()))
    }

    /// Renames the display filename.
    pub async fn rename(&self, id: &str, display_name: impl Into<String>) -> Result<ManagedImage, ConvertError> {
        let mut image = self.get(id).await?;
        image.display_name = display_name.into();
        self.store.set(id, image.clone()).await?;
        Ok(image)
    }

    /// Sets the output format policy.
    pub async fn set_target(&self, id: &str, target: TargetFormat) -> Result<ManagedImage, ConvertError> {
        let mut image = self.get(id).await?;
        image.target = target;
        self.store.set(id, image.clone()).await?;
        Ok(image)
    }

    /// Sets the encoding quality, clamped to 100.
    pub async fn set_quality(&self, id: &str, quality: u8) -> Result<ManagedImage, ConvertError> {
        let mut image = self.get(id).await?;
        image.quality = quality.min(100);
        self.store.set(id, image.clone()).await?;
        Ok(image)
    }

    /// All images sorted by creation order.
    pub async fn list(&self) -> Result<Vec<ManagedImage>, ConvertError> {
        let mut images = self.store.get_all().await?;
        images.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(images)
    }

    /// Removes an image.
    pub async fn remove(&self, id: &str) -> Result<(), ConvertError> {
        self.store.delete(id).await?;
        Ok(())
    }
}
