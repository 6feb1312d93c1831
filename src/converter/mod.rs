//! Format-specific PDF conversion strategies.
//!
//! - [`ImageToPdfConverter`]: raster image re-encoded as a single PDF page
//! - [`DocumentToPdfConverter`]: office/text documents through an external
//!   converter process

mod document;
mod raster;

pub use document::{DocumentToPdfConverter, DEFAULT_CONVERTER_PATH, DEFAULT_CONVERTER_TIMEOUT};
pub use raster::ImageToPdfConverter;

use crate::error::ConversionError;
use async_trait::async_trait;

/// A conversion from one family of source formats to PDF bytes.
///
/// Strategies only transform bytes; they never read or write status records.
#[async_trait]
pub trait ConversionStrategy: Send + Sync {
    /// Short name used in logs and telemetry.
    fn name(&self) -> &'static str;

    /// Converts `input` (whose lower-cased extension is `extension`) to PDF.
    async fn convert(&self, input: Vec<u8>, extension: &str) -> Result<Vec<u8>, ConversionError>;
}
