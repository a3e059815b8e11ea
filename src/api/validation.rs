use validator::ValidationErrors;

use crate::api::errors::ApiError;
use crate::core::config::UploadSettings;
use crate::schemas::document::Document;
use crate::services::uploads::check_upload;

/// Field-level validator messages as one deterministic detail string.
pub(crate) fn validation_message(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter().filter_map(|e| e.message.as_ref().map(|m| m.to_string())))
        .collect();
    messages.sort();
    messages.dedup();

    if messages.is_empty() {
        "Invalid request".to_string()
    } else {
        messages.join("; ")
    }
}

/// Checks one uploaded file against the upload settings and wraps it as a
/// document.
pub(crate) fn validate_upload(
    filename: &str,
    content_type: Option<&str>,
    bytes: Vec<u8>,
    settings: &UploadSettings,
) -> Result<Document, ApiError> {
    check_upload(filename, content_type, bytes, settings)
        .map_err(|rejection| ApiError::BadRequest(rejection.to_string()))
}
