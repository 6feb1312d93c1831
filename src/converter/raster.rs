//! Raster image to single-page PDF conversion.

use super::ConversionStrategy;
use crate::error::ConversionError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use tracing::info;

/// Page resolution used when laying a raster image onto a PDF page.
pub const DEFAULT_DPI: f32 = 100.0;

/// Image to PDF converter.
///
/// Decodes the raster with `image`, flattens it to RGB, and places it on a
/// page sized `pixels * 72 / dpi` points through usvg + svg2pdf.
pub struct ImageToPdfConverter {
    dpi: f32,
}

impl ImageToPdfConverter {
    /// Creates a new converter at 100 DPI.
    pub fn new() -> Self {
        Self { dpi: DEFAULT_DPI }
    }

    pub fn with_dpi(dpi: f32) -> Self {
        Self { dpi }
    }

    /// Converts encoded image bytes to PDF bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::Decode`] when the bytes are not a
    /// decodable PNG/JPEG or the image has no pixels.
    pub fn render(&self, input: &[u8]) -> Result<Vec<u8>, ConversionError> {
        let decoded = image::load_from_memory(input)
            .map_err(|e| ConversionError::Decode(e.to_string()))?;

        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(ConversionError::Decode(format!(
                "Invalid image dimensions: {}x{}",
                width, height
            )));
        }

        info!("Image decoded: {}x{} px", width, height);

        // PDF pages carry no alpha; flatten before embedding.
        let flattened = DynamicImage::ImageRgb8(decoded.to_rgb8());
        let mut png = Vec::new();
        flattened
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| ConversionError::Decode(format!("Failed to re-encode image: {}", e)))?;

        let svg = format!(
            concat!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" "#,
                r#"width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
                r#"<image x="0" y="0" width="{w}" height="{h}" xlink:href="data:image/png;base64,{data}"/>"#,
                "</svg>"
            ),
            w = width,
            h = height,
            data = STANDARD.encode(&png),
        );

        let tree = usvg::Tree::from_str(&svg, &usvg::Options::default())
            .map_err(|e| ConversionError::Decode(format!("Failed to lay out image page: {}", e)))?;

        let pdf_data = svg2pdf::to_pdf(
            &tree,
            svg2pdf::ConversionOptions::default(),
            svg2pdf::PageOptions {
                dpi: self.dpi,
                ..Default::default()
            },
        );

        info!("Image PDF complete: {} bytes", pdf_data.len());
        Ok(pdf_data)
    }
}

impl Default for ImageToPdfConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversionStrategy for ImageToPdfConverter {
    fn name(&self) -> &'static str {
        "image"
    }

    async fn convert(&self, input: Vec<u8>, _extension: &str) -> Result<Vec<u8>, ConversionError> {
        let converter = Self::with_dpi(self.dpi);
        tokio::task::spawn_blocking(move || converter.render(&input))
            .await
            .map_err(|e| ConversionError::Decode(format!("Image conversion task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn test_convert_png() {
        let converter = ImageToPdfConverter::new();
        let png = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 100, Rgba([0, 0, 255, 128]))),
            ImageFormat::Png,
        );

        let pdf = converter.render(&png).unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_convert_jpeg() {
        let converter = ImageToPdfConverter::new();
        let jpeg = encode(
            DynamicImage::ImageRgb8(image::RgbImage::from_pixel(64, 64, image::Rgb([200, 10, 10]))),
            ImageFormat::Jpeg,
        );

        let pdf = converter.render(&jpeg).unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_invalid_image() {
        let converter = ImageToPdfConverter::new();
        let result = converter.render(b"imagedata");

        assert!(matches!(result, Err(ConversionError::Decode(_))));
    }

    #[tokio::test]
    async fn test_strategy_runs_off_thread() {
        let converter = ImageToPdfConverter::new();
        let png = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]))),
            ImageFormat::Png,
        );

        let pdf = converter.convert(png, "png").await.unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }
}
