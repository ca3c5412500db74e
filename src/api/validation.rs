use std::path::Path;

use crate::api::errors::ApiError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";

/// Checks the client-declared name and type; `content_type` may be absent.
pub(crate) fn validate_archive_upload(
    filename: &str,
    content_type: Option<&str>,
    allowed_extensions: &[String],
) -> Result<String, ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("Archive must have an extension".to_string()))?;

    if !allowed_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(ApiError::BadRequest(format!("Archive extension '{extension}' is not allowed")));
    }

    if let Some(content_type) = content_type {
        let mime = content_type.trim().to_ascii_lowercase();
        if !mime_allowed_for_extension(&mime, &extension) {
            return Err(ApiError::BadRequest(format!(
                "MIME type '{mime}' does not match extension '.{extension}'"
            )));
        }
    }

    Ok(extension)
}

pub(crate) fn validate_archive_bytes(extension: &str, bytes: &[u8]) -> Result<(), ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Archive is empty".to_string()));
    }

    if extension == "zip" && !(bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC)) {
        return Err(ApiError::BadRequest("Archive is not a valid zip file".to_string()));
    }

    Ok(())
}

fn mime_allowed_for_extension(mime: &str, extension: &str) -> bool {
    match extension {
        "zip" => matches!(
            mime,
            "application/zip" | "application/x-zip-compressed" | "application/octet-stream"
        ),
        "tar" => matches!(mime, "application/x-tar" | "application/octet-stream"),
        "gz" | "tgz" => {
            matches!(mime, "application/gzip" | "application/x-gzip" | "application/octet-stream")
        }
        _ => mime == "application/octet-stream",
    }
}
