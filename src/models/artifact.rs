//! File artifacts attached to test results

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ArtifactError;

/// A file produced by a test and surfaced alongside its result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub description: Option<String>,
    pub mime_type: String,
}

impl Artifact {
    /// Create an artifact for an existing file.
    ///
    /// The MIME type is detected from the extension when not supplied.
    pub fn new(
        path: impl Into<PathBuf>,
        description: Option<String>,
        mime_type: Option<String>,
    ) -> Result<Self, ArtifactError> {
        let path = path.into();
        if !path.exists() {
            return Err(ArtifactError::NotFound(path));
        }

        let mime_type = mime_type.unwrap_or_else(|| detect_mime_type(&path).to_string());

        Ok(Self {
            path,
            description,
            mime_type,
        })
    }
}

/// Guess a MIME type from a file extension
pub fn detect_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("txt" | "log") => "text/plain",
        Some("json") => "application/json",
        Some("xml" | "trx") => "application/xml",
        Some("html" | "htm") => "text/html",
        Some("csv") => "text/csv",
        Some("md") => "text/markdown",
        Some("yaml" | "yml") => "application/yaml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}
