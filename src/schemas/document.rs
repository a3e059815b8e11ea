use std::path::Path;

use serde::{Deserialize, Serialize};

/// Media types accepted for question papers, memos and scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum MediaType {
    Png,
    Jpeg,
    Webp,
    Pdf,
}

impl MediaType {
    /// Short name, as used in `ALLOWED_UPLOAD_TYPES`.
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Pdf => "pdf",
        }
    }

    pub(crate) fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Pdf => "application/pdf",
        }
    }

    pub(crate) fn is_image(self) -> bool {
        !matches!(self, Self::Pdf)
    }

    pub(crate) fn from_mime(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::Webp),
            "application/pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub(crate) fn from_extension(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub(crate) fn from_filename(filename: &str) -> Option<Self> {
        Path::new(filename).extension().and_then(|ext| ext.to_str()).and_then(Self::from_extension)
    }
}

/// An uploaded file held in memory. Never mutated once accepted.
#[derive(Debug, Clone)]
pub(crate) struct Document {
    pub(crate) filename: String,
    pub(crate) media_type: MediaType,
    pub(crate) bytes: Vec<u8>,
}

pub(crate) type QuestionPaper = Document;
pub(crate) type Memo = Document;

impl Document {
    pub(crate) fn new(filename: impl Into<String>, media_type: MediaType, bytes: Vec<u8>) -> Self {
        Self { filename: filename.into(), media_type, bytes }
    }
}

/// One learner submission. The name is the uploaded file name.
#[derive(Debug, Clone)]
pub(crate) struct ScriptInput {
    pub(crate) name: String,
    pub(crate) document: Document,
}

impl ScriptInput {
    pub(crate) fn new(document: Document) -> Self {
        Self { name: document.filename.clone(), document }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_parsing_ignores_parameters_and_case() {
        assert_eq!(MediaType::from_mime("IMAGE/PNG"), Some(MediaType::Png));
        assert_eq!(MediaType::from_mime("application/pdf; charset=binary"), Some(MediaType::Pdf));
        assert_eq!(MediaType::from_mime("image/jpg"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_mime("image/gif"), None);
    }

    #[test]
    fn filename_extension_maps_to_media_type() {
        assert_eq!(MediaType::from_filename("learner 1.JPG"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_filename("memo.pdf"), Some(MediaType::Pdf));
        assert_eq!(MediaType::from_filename("notes.docx"), None);
        assert_eq!(MediaType::from_filename("no-extension"), None);
    }
}
