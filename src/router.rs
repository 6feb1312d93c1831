//! Extension to conversion strategy routing.

use crate::converter::ConversionStrategy;
use crate::error::ConversionError;
use std::sync::Arc;

/// Source format families with a conversion strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Image,
    Document,
}

impl FormatKind {
    pub const IMAGE_EXTENSIONS: &'static [&'static str] = &["jpg", "jpeg", "png"];
    pub const DOCUMENT_EXTENSIONS: &'static [&'static str] =
        &["doc", "docx", "xls", "xlsx", "txt"];

    /// Case-insensitive lookup; `None` for anything outside the fixed set.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_ascii_lowercase();
        if Self::IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(FormatKind::Image)
        } else if Self::DOCUMENT_EXTENSIONS.contains(&extension.as_str()) {
            Some(FormatKind::Document)
        } else {
            None
        }
    }

    /// MIME type for an uploaded object of a supported extension.
    pub fn content_type(extension: &str) -> &'static str {
        match extension.to_ascii_lowercase().as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "txt" => "text/plain",
            "doc" => "application/msword",
            "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "xls" => "application/vnd.ms-excel",
            "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            _ => "application/octet-stream",
        }
    }
}

/// Picks the strategy for a job's extension.
#[derive(Clone)]
pub struct FormatRouter {
    image: Arc<dyn ConversionStrategy>,
    document: Arc<dyn ConversionStrategy>,
}

impl FormatRouter {
    pub fn new(image: Arc<dyn ConversionStrategy>, document: Arc<dyn ConversionStrategy>) -> Self {
        Self { image, document }
    }

    /// Fails with `UnsupportedFormat` for unknown or missing extensions.
    pub fn select(&self, extension: Option<&str>) -> Result<Arc<dyn ConversionStrategy>, ConversionError> {
        match extension.and_then(FormatKind::from_extension) {
            Some(FormatKind::Image) => Ok(self.image.clone()),
            Some(FormatKind::Document) => Ok(self.document.clone()),
            None => Err(ConversionError::unsupported(extension)),
        }
    }
}
