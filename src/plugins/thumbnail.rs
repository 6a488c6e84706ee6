//! # Thumbnail Processor
//!
//! Preprocess-stage plugin producing a scaled preview for raster images,
//! written to `file.preview` as a JPEG data URL within the configured
//! bounds. When uploading is enabled, the process stage converts the data
//! URL back to bytes and stores it through the adapter's standalone upload
//! path under a key derived from the file id (`abc.jpg` -> `abc_thumb.jpg`),
//! recording the result in `file.thumbnail`.
//!
//! All thumbnail failures are non-fatal: a file that cannot be decoded
//! keeps moving through the pipeline without a preview. GIF and vector
//! sources are skipped, as are videos, whose frame extraction is left to
//! external plugins implementing the same hook.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;

use crate::errors::UploadResult;
use crate::models::{ThumbnailRef, TrackedFile};
use crate::plugins::{PluginContext, UploadPlugin};
use crate::utils::{data_url, is_raster_image, is_video, parse_data_url, thumbnail_key};

/// Plugin id of the thumbnail processor.
pub const THUMBNAIL_ID: &str = "thumbnail";

/// Generates scaled previews for raster images.
pub struct ThumbnailPlugin;

impl ThumbnailPlugin {
    fn render_preview(
        data: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<String, image::ImageError> {
        let img = image::load_from_memory(data)?;
        let thumb = img.thumbnail(width, height).to_rgb8();

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, quality).encode_image(&thumb)?;

        Ok(data_url("image/jpeg", &encoded))
    }
}

#[async_trait]
impl UploadPlugin for ThumbnailPlugin {
    fn id(&self) -> &str {
        THUMBNAIL_ID
    }

    async fn preprocess(
        &self,
        mut file: TrackedFile,
        ctx: &PluginContext,
    ) -> UploadResult<TrackedFile> {
        let Some(opts) = ctx.options.thumbnails.clone() else {
            return Ok(file);
        };

        if is_video(&file.mime_type) {
            tracing::debug!(
                file_id = %file.id,
                "video thumbnails require an external frame-extraction plugin"
            );
            return Ok(file);
        }

        if !is_raster_image(&file.mime_type) {
            return Ok(file);
        }

        let Some(data) = file.data().cloned() else {
            return Ok(file);
        };

        match Self::render_preview(&data, opts.width, opts.height, opts.quality) {
            Ok(preview) => file.preview = Some(preview),
            Err(err) => {
                tracing::warn!(file_id = %file.id, %err, "thumbnail generation failed");
            }
        }

        Ok(file)
    }

    async fn process(
        &self,
        mut file: TrackedFile,
        ctx: &PluginContext,
    ) -> UploadResult<TrackedFile> {
        let upload_enabled = ctx
            .options
            .thumbnails
            .as_ref()
            .map(|opts| opts.upload)
            .unwrap_or(false);
        if !upload_enabled || file.thumbnail.is_some() {
            return Ok(file);
        }

        let Some(storage) = ctx.storage.clone() else {
            return Ok(file);
        };

        let Some((mime_type, bytes)) = file.preview.as_deref().and_then(parse_data_url) else {
            return Ok(file);
        };

        let key = thumbnail_key(&file.id);
        match storage.upload_blob(bytes, &key, &mime_type).await {
            Ok(stored) => {
                file.thumbnail = Some(ThumbnailRef {
                    url: stored.url,
                    storage_key: stored.storage_key.or(Some(key)),
                });
            }
            Err(err) => {
                tracing::warn!(file_id = %file.id, %err, "thumbnail upload failed");
            }
        }

        Ok(file)
    }
}
