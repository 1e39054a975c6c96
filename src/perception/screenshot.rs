use std::io::Cursor;

use base64::Engine as _;
use image::{ImageFormat, ImageReader};

use crate::errors::{RelayError, RelayResult};
use crate::perception::types::ScreenshotMeta;

/// A screenshot as received from the client, ready to be forwarded upstream.
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Bare base64 payload (any `data:` URL prefix removed).
    pub image_base64: String,
    pub format: Option<ImageFormat>,
    /// `None` when the payload could not be decoded; the image is still forwarded.
    pub meta: Option<ScreenshotMeta>,
}

impl Screenshot {
    /// Accepts bare base64 or a `data:image/...;base64,` URL. Never fails: an
    /// undecodable image just loses its metadata.
    pub fn from_base64(raw: &str) -> Self {
        let image_base64 = strip_data_url(raw).trim().to_string();
        let (meta, format) = match inspect(&image_base64) {
            Ok((meta, format)) => {
                tracing::debug!(
                    width = meta.width,
                    height = meta.height,
                    format = ?format,
                    "screenshot decoded"
                );
                (Some(meta), format)
            }
            Err(e) => {
                tracing::warn!(error = %e, "screenshot dimensions unavailable");
                (None, None)
            }
        };
        Self {
            image_base64,
            format,
            meta,
        }
    }

    /// Inline `data:` URL for the model request. PNG is assumed when the format is unknown.
    pub fn data_url(&self) -> String {
        let mime = self.format.map_or("image/png", |f| f.to_mime_type());
        format!("data:{mime};base64,{}", self.image_base64)
    }
}

fn strip_data_url(raw: &str) -> &str {
    match raw.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, payload)| payload),
        None => raw,
    }
}

/// Reads format and dimensions from the image header without decoding pixels.
fn inspect(image_base64: &str) -> RelayResult<(ScreenshotMeta, Option<ImageFormat>)> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(image_base64)
        .map_err(|e| RelayError::Screenshot(format!("invalid base64: {e}")))?;
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader.format();
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| RelayError::Screenshot(e.to_string()))?;
    Ok((ScreenshotMeta { width, height }, format))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_base64(width: u32, height: u32) -> String {
        let img = image::RgbImage::new(width, height);
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        base64::engine::general_purpose::STANDARD.encode(bytes.into_inner())
    }

    #[test]
    fn reads_dimensions_from_png() {
        let shot = Screenshot::from_base64(&png_base64(64, 36));
        assert_eq!(shot.meta, Some(ScreenshotMeta { width: 64, height: 36 }));
        assert_eq!(shot.format, Some(ImageFormat::Png));
        assert!(shot.data_url().starts_with("data:image/png;base64,iVBOR"));
    }

    #[test]
    fn accepts_data_url_input() {
        let raw = format!("data:image/png;base64,{}", png_base64(8, 8));
        let shot = Screenshot::from_base64(&raw);
        assert_eq!(shot.meta, Some(ScreenshotMeta { width: 8, height: 8 }));
        assert!(!shot.image_base64.starts_with("data:"));
    }

    #[test]
    fn garbage_keeps_payload_without_meta() {
        let shot = Screenshot::from_base64("not base64 at all!");
        assert_eq!(shot.meta, None);
        assert_eq!(shot.image_base64, "not base64 at all!");
        assert_eq!(shot.data_url(), "data:image/png;base64,not base64 at all!");
    }
}
