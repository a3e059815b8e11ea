use thiserror::Error;

use crate::core::config::UploadSettings;
use crate::schemas::document::{Document, MediaType};

#[derive(Debug, Error, PartialEq)]
pub(crate) enum UploadRejection {
    #[error("'{filename}' is empty.")]
    Empty { filename: String },
    #[error("'{filename}' exceeds the {limit_mb}MB upload limit.")]
    TooLarge { filename: String, limit_mb: u64 },
    #[error("'{filename}' is not a supported file type. Allowed types: {allowed}.")]
    UnsupportedType { filename: String, allowed: String },
}

impl UploadRejection {
    pub(crate) fn too_large(filename: &str, settings: &UploadSettings) -> Self {
        Self::TooLarge { filename: filename.to_string(), limit_mb: settings.max_upload_size_mb }
    }
}

/// Media type from the part's content type, falling back to the extension
/// when the content type is absent or not one we recognise.
fn resolve_media_type(filename: &str, content_type: Option<&str>) -> Option<MediaType> {
    content_type.and_then(MediaType::from_mime).or_else(|| MediaType::from_filename(filename))
}

/// Checks one file against the upload settings and wraps it as a document.
/// Shared by the HTTP upload and the offline folder run.
pub(crate) fn check_upload(
    filename: &str,
    content_type: Option<&str>,
    bytes: Vec<u8>,
    settings: &UploadSettings,
) -> Result<Document, UploadRejection> {
    if bytes.is_empty() {
        return Err(UploadRejection::Empty { filename: filename.to_string() });
    }

    if bytes.len() > settings.max_upload_bytes() {
        return Err(UploadRejection::too_large(filename, settings));
    }

    let media_type = resolve_media_type(filename, content_type)
        .filter(|media_type| settings.allowed_types.iter().any(|t| t == media_type.as_str()))
        .ok_or_else(|| UploadRejection::UnsupportedType {
            filename: filename.to_string(),
            allowed: settings.allowed_types.join(", "),
        })?;

    Ok(Document::new(filename, media_type, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(allowed: &[&str]) -> UploadSettings {
        UploadSettings {
            max_upload_size_mb: 1,
            allowed_types: allowed.iter().map(|t| t.to_string()).collect(),
            max_scripts_per_batch: 5,
        }
    }

    #[test]
    fn content_type_wins_over_extension() {
        assert_eq!(resolve_media_type("scan.bin", Some("image/png")), Some(MediaType::Png));
        assert_eq!(
            resolve_media_type("scan.pdf", Some("application/octet-stream")),
            Some(MediaType::Pdf)
        );
        assert_eq!(resolve_media_type("scan.JPG", None), Some(MediaType::Jpeg));
        assert_eq!(resolve_media_type("notes.docx", None), None);
    }

    #[test]
    fn accepts_allowed_file() {
        let document =
            check_upload("a.webp", Some("image/webp"), vec![1, 2, 3], &settings(&["webp"]))
                .expect("valid upload");
        assert_eq!(document.media_type, MediaType::Webp);
        assert_eq!(document.filename, "a.webp");
    }

    #[test]
    fn rejections_carry_their_reason() {
        let png_only = settings(&["png"]);

        assert_eq!(
            check_upload("a.png", None, Vec::new(), &png_only).err(),
            Some(UploadRejection::Empty { filename: "a.png".to_string() })
        );
        assert_eq!(
            check_upload("b.png", None, vec![0; 1024 * 1024 + 1], &png_only).err(),
            Some(UploadRejection::TooLarge { filename: "b.png".to_string(), limit_mb: 1 })
        );
        assert_eq!(
            check_upload("c.pdf", None, vec![1], &png_only).err().map(|err| err.to_string()),
            Some("'c.pdf' is not a supported file type. Allowed types: png.".to_string())
        );
    }
}
