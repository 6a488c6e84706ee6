//! # Image Compression Processor
//!
//! Process-stage plugin recompressing raster images before upload. Sources
//! above the configured minimum size are decoded, scaled within the
//! configured bounds preserving aspect ratio, and re-encoded at the
//! configured quality and target format (`Auto` preserves the source
//! format). The file's `data`, `size` and `mime_type` are replaced, and the
//! id extension is adjusted when the format changed.
//!
//! The plugin emits a scoped `skip` event instead of transforming when the
//! source is below the threshold, uses a format the encoder does not
//! handle, or when the recompressed output is not smaller than the
//! original.

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use img_parts::jpeg::Jpeg;
use img_parts::ImageEXIF;
use serde_json::json;

use crate::config::OutputFormat;
use crate::errors::{UploadError, UploadResult};
use crate::events::EventPayload;
use crate::models::TrackedFile;
use crate::plugins::{PluginContext, UploadPlugin};
use crate::utils::{is_raster_image, replace_extension};

/// Plugin id of the compression processor.
pub const IMAGE_COMPRESSION_ID: &str = "imageCompression";

/// Resolved encoding target for one file.
struct Target {
    format: ImageFormat,
    extension: &'static str,
    mime_type: &'static str,
}

/// Recompresses raster images within configured bounds.
pub struct ImageCompressionPlugin;

impl ImageCompressionPlugin {
    fn source_target(mime_type: &str) -> Option<Target> {
        match mime_type.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Target {
                format: ImageFormat::Jpeg,
                extension: "jpg",
                mime_type: "image/jpeg",
            }),
            "image/png" => Some(Target {
                format: ImageFormat::Png,
                extension: "png",
                mime_type: "image/png",
            }),
            "image/webp" => Some(Target {
                format: ImageFormat::WebP,
                extension: "webp",
                mime_type: "image/webp",
            }),
            _ => None,
        }
    }

    fn resolve_target(mime_type: &str, requested: OutputFormat) -> Option<Target> {
        match requested {
            OutputFormat::Auto => Self::source_target(mime_type),
            OutputFormat::Jpeg => Some(Target {
                format: ImageFormat::Jpeg,
                extension: "jpg",
                mime_type: "image/jpeg",
            }),
            OutputFormat::Png => Some(Target {
                format: ImageFormat::Png,
                extension: "png",
                mime_type: "image/png",
            }),
            OutputFormat::WebP => Some(Target {
                format: ImageFormat::WebP,
                extension: "webp",
                mime_type: "image/webp",
            }),
        }
    }

    fn encode(img: &DynamicImage, target: &Target, quality: u8) -> Result<Vec<u8>, image::ImageError> {
        let mut encoded = Vec::new();

        match target.format {
            ImageFormat::Jpeg => {
                let rgb = img.to_rgb8();
                JpegEncoder::new_with_quality(&mut encoded, quality).encode_image(&rgb)?;
            }
            // PNG and (lossless) WebP encoders take no quality parameter.
            other => {
                img.write_to(&mut Cursor::new(&mut encoded), other)?;
            }
        }

        Ok(encoded)
    }

    /// Copies the EXIF segment of a JPEG source onto a recompressed JPEG.
    fn carry_exif(original: &Bytes, recompressed: Vec<u8>) -> Vec<u8> {
        let Ok(source) = Jpeg::from_bytes(original.clone()) else {
            return recompressed;
        };
        let Some(exif) = source.exif() else {
            return recompressed;
        };
        let Ok(mut output) = Jpeg::from_bytes(Bytes::from(recompressed.clone())) else {
            return recompressed;
        };

        output.set_exif(Some(exif));
        let mut carried = Vec::new();
        if output.encoder().write_to(&mut carried).is_err() {
            return recompressed;
        }
        carried
    }

    fn skip(ctx: &PluginContext, file: &TrackedFile, reason: &str) {
        ctx.emit(
            "skip",
            EventPayload::Custom(json!({ "id": file.id, "reason": reason })),
        );
    }
}

#[async_trait]
impl UploadPlugin for ImageCompressionPlugin {
    fn id(&self) -> &str {
        IMAGE_COMPRESSION_ID
    }

    async fn process(
        &self,
        mut file: TrackedFile,
        ctx: &PluginContext,
    ) -> UploadResult<TrackedFile> {
        let Some(opts) = ctx.options.image_compression.clone() else {
            return Ok(file);
        };

        if !is_raster_image(&file.mime_type) || file.data().is_none() {
            return Ok(file);
        }

        if file.size < opts.min_size_to_compress {
            Self::skip(ctx, &file, "below-min-size");
            return Ok(file);
        }

        let Some(target) = Self::resolve_target(&file.mime_type, opts.output_format) else {
            Self::skip(ctx, &file, "unsupported-format");
            return Ok(file);
        };

        let original = file.data().cloned().unwrap_or_default();
        let img = image::load_from_memory(&original).map_err(|err| UploadError::PluginFailed {
            plugin: IMAGE_COMPRESSION_ID.to_string(),
            message: format!("failed to decode `{}`: {err}", file.name),
        })?;

        let img = if img.width() > opts.max_width || img.height() > opts.max_height {
            img.thumbnail(opts.max_width, opts.max_height)
        } else {
            img
        };

        let mut encoded =
            Self::encode(&img, &target, opts.quality).map_err(|err| UploadError::PluginFailed {
                plugin: IMAGE_COMPRESSION_ID.to_string(),
                message: format!("failed to encode `{}`: {err}", file.name),
            })?;

        if opts.preserve_metadata
            && target.format == ImageFormat::Jpeg
            && file.mime_type.eq_ignore_ascii_case("image/jpeg")
        {
            encoded = Self::carry_exif(&original, encoded);
        }

        if encoded.len() as u64 >= file.size {
            Self::skip(ctx, &file, "not-smaller");
            return Ok(file);
        }

        let format_changed = !file.mime_type.eq_ignore_ascii_case(target.mime_type);
        if format_changed {
            file.id = replace_extension(&file.id, target.extension);
        }

        tracing::debug!(
            file_id = %file.id,
            before = file.size,
            after = encoded.len(),
            "recompressed image"
        );

        file.size = encoded.len() as u64;
        file.mime_type = target.mime_type.to_string();
        file.source = crate::models::FileSource::Local {
            data: Bytes::from(encoded),
        };

        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompressionOptions, ManagerOptions};
    use crate::plugins::PluginContext;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type EmitLog = Arc<Mutex<Vec<(String, Value)>>>;

    fn recording_ctx(options: ManagerOptions) -> (PluginContext, EmitLog) {
        let log: EmitLog = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let ctx = PluginContext::new(
            Vec::new(),
            Arc::new(options),
            None,
            Arc::new(move |action, payload| {
                let value = match payload {
                    EventPayload::Custom(v) => v.clone(),
                    _ => Value::Null,
                };
                sink.lock().unwrap().push((action.to_string(), value));
            }),
        );
        (ctx, log)
    }

    fn compression_options(opts: CompressionOptions) -> ManagerOptions {
        ManagerOptions {
            image_compression: Some(opts),
            ..Default::default()
        }
    }

    /// Deterministic noise; PNG barely compresses it, so downscales shrink.
    fn noise_png(side: u32) -> Vec<u8> {
        let mut state: u32 = 0x2545_f491;
        let img = image::RgbImage::from_fn(side, side, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let b = state.to_le_bytes();
            image::Rgb([b[0], b[1], b[2]])
        });
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn png_file(name: &str, payload: Vec<u8>) -> TrackedFile {
        TrackedFile::local(
            format!("1-{name}"),
            name,
            "image/png",
            Bytes::from(payload),
            None,
        )
    }

    #[tokio::test]
    async fn oversized_images_are_scaled_and_shrunk() {
        let (ctx, log) = recording_ctx(compression_options(CompressionOptions {
            max_width: 64,
            max_height: 64,
            min_size_to_compress: 1,
            ..Default::default()
        }));

        let file = png_file("noisy.png", noise_png(512));
        let before = file.size;

        let out = ImageCompressionPlugin.process(file, &ctx).await.unwrap();

        assert!(out.size < before);
        assert_eq!(out.mime_type, "image/png");
        assert!(out.id.ends_with(".png"));
        assert!(log.lock().unwrap().is_empty());

        let decoded = image::load_from_memory(out.data().unwrap()).unwrap();
        assert!(decoded.width() <= 64);
        assert!(decoded.height() <= 64);
    }

    #[tokio::test]
    async fn format_change_adjusts_mime_and_id_extension() {
        let (ctx, _log) = recording_ctx(compression_options(CompressionOptions {
            max_width: 64,
            max_height: 64,
            output_format: OutputFormat::Jpeg,
            min_size_to_compress: 1,
            ..Default::default()
        }));

        let out = ImageCompressionPlugin
            .process(png_file("noisy.png", noise_png(512)), &ctx)
            .await
            .unwrap();

        assert_eq!(out.mime_type, "image/jpeg");
        assert!(out.id.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn small_sources_emit_a_skip_event() {
        let (ctx, log) = recording_ctx(compression_options(CompressionOptions {
            min_size_to_compress: 10_000_000,
            ..Default::default()
        }));

        let file = png_file("small.png", noise_png(16));
        let before = file.size;
        let out = ImageCompressionPlugin.process(file, &ctx).await.unwrap();

        assert_eq!(out.size, before);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "skip");
        assert_eq!(log[0].1["reason"], "below-min-size");
    }

    #[tokio::test]
    async fn not_smaller_output_keeps_the_original() {
        // A solid-color PNG is near-optimal already; JPEG output is larger.
        let img = image::RgbImage::from_pixel(512, 512, image::Rgb([10, 20, 30]));
        let mut solid = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut solid), ImageFormat::Png)
            .unwrap();

        let (ctx, log) = recording_ctx(compression_options(CompressionOptions {
            output_format: OutputFormat::Jpeg,
            min_size_to_compress: 1,
            ..Default::default()
        }));

        let file = png_file("solid.png", solid);
        let before = file.size;
        let out = ImageCompressionPlugin.process(file, &ctx).await.unwrap();

        assert_eq!(out.size, before);
        assert_eq!(out.mime_type, "image/png");
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1["reason"], "not-smaller");
    }

    #[tokio::test]
    async fn undecodable_sources_fail_the_process_stage() {
        let (ctx, _log) = recording_ctx(compression_options(CompressionOptions {
            min_size_to_compress: 1,
            ..Default::default()
        }));

        let broken = png_file("broken.png", vec![0u8; 4096]);
        let err = ImageCompressionPlugin.process(broken, &ctx).await.unwrap_err();

        assert!(matches!(err, UploadError::PluginFailed { .. }));
    }

    #[tokio::test]
    async fn preserve_metadata_carries_exif_onto_jpeg_output() {
        // Build a JPEG with an EXIF segment attached.
        let mut plain = Vec::new();
        let noise = image::load_from_memory(&noise_png(256)).unwrap();
        JpegEncoder::new_with_quality(&mut plain, 100)
            .encode_image(&noise.to_rgb8())
            .unwrap();

        let exif_payload = Bytes::from_static(b"Exif\0\0fake-exif-data");
        let mut tagged = Jpeg::from_bytes(Bytes::from(plain)).unwrap();
        tagged.set_exif(Some(exif_payload.clone()));
        let mut source = Vec::new();
        tagged.encoder().write_to(&mut source).unwrap();

        let mut file = TrackedFile::local(
            "1-photo.jpg",
            "photo.jpg",
            "image/jpeg",
            Bytes::from(source),
            None,
        );
        file.size = file.data().unwrap().len() as u64;

        let (ctx, _log) = recording_ctx(compression_options(CompressionOptions {
            max_width: 64,
            max_height: 64,
            quality: 30,
            preserve_metadata: true,
            min_size_to_compress: 1,
            ..Default::default()
        }));

        let out = ImageCompressionPlugin.process(file, &ctx).await.unwrap();

        let carried = Jpeg::from_bytes(out.data().unwrap().clone())
            .unwrap()
            .exif()
            .expect("exif preserved");
        assert_eq!(carried, exif_payload);
    }
}
