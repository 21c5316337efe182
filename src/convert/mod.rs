//! Document to page-image conversion
//!
//! Every document becomes an ordered list of PNG pages, page 1 first.
//! Raster images are a single page; PDFs are rasterized with `pdftoppm`.

use crate::error::{Error, Result};
use async_trait::async_trait;
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One rendered page
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based page number
    pub page_number: i32,
    /// PNG-encoded image
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Turns a local document into page images
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// `file_type` is the lowercase extension without a dot
    async fn to_pages(&self, path: &Path, file_type: &str) -> Result<Vec<PageImage>>;
}

/// Converter backed by the `image` crate and poppler's `pdftoppm`
pub struct PageRenderer {
    dpi: u32,
    pdftoppm: String,
}

impl PageRenderer {
    pub fn new(dpi: u32, pdftoppm: impl Into<String>) -> Self {
        Self {
            dpi,
            pdftoppm: pdftoppm.into(),
        }
    }

    async fn render_image(&self, path: &Path) -> Result<Vec<PageImage>> {
        let path = path.to_path_buf();
        let page = tokio::task::spawn_blocking(move || encode_png_page(&path, 1))
            .await
            .map_err(|e| Error::Conversion(format!("Render task failed: {}", e)))??;
        Ok(vec![page])
    }

    async fn render_pdf(&self, path: &Path) -> Result<Vec<PageImage>> {
        let out_dir = tempfile::tempdir()?;
        let prefix = out_dir.path().join("page");

        let output = tokio::process::Command::new(&self.pdftoppm)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(path)
            .arg(&prefix)
            .output()
            .await
            .map_err(|e| Error::Conversion(format!("Failed to run {}: {}", self.pdftoppm, e)))?;

        if !output.status.success() {
            return Err(Error::Conversion(format!(
                "{} failed for {}: {}",
                self.pdftoppm,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let rendered = collect_rendered_pages(out_dir.path())?;
        if rendered.is_empty() {
            return Err(Error::Conversion(format!(
                "No pages rendered for {}",
                path.display()
            )));
        }

        let pages = tokio::task::spawn_blocking(move || {
            rendered
                .into_iter()
                .map(|(page_number, file)| {
                    let bytes = std::fs::read(&file)?;
                    let (width, height) = image::image_dimensions(&file)
                        .map_err(|e| Error::Conversion(e.to_string()))?;
                    Ok(PageImage {
                        page_number,
                        bytes,
                        width,
                        height,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| Error::Conversion(format!("Render task failed: {}", e)))??;

        debug!("Rendered {} page(s) from {}", pages.len(), path.display());
        Ok(pages)
    }
}

#[async_trait]
impl DocumentConverter for PageRenderer {
    async fn to_pages(&self, path: &Path, file_type: &str) -> Result<Vec<PageImage>> {
        match file_type.to_lowercase().as_str() {
            "pdf" => self.render_pdf(path).await,
            "png" | "jpg" | "jpeg" | "bmp" | "gif" | "tif" | "tiff" | "webp" => {
                self.render_image(path).await
            }
            other => Err(Error::Conversion(format!(
                "Unsupported file type '{}' for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// Decode any supported raster and re-encode it as a PNG page
fn encode_png_page(path: &Path, page_number: i32) -> Result<PageImage> {
    let img = image::open(path)
        .map_err(|e| Error::Conversion(format!("Failed to decode {}: {}", path.display(), e)))?;

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| Error::Conversion(format!("Failed to encode page: {}", e)))?;

    Ok(PageImage {
        page_number,
        bytes,
        width: img.width(),
        height: img.height(),
    })
}

/// `pdftoppm` writes `page-1.png`, `page-02.png`, ... depending on page count
fn collect_rendered_pages(dir: &Path) -> Result<Vec<(i32, PathBuf)>> {
    let mut pages = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit_once('-'))
            .and_then(|(_, n)| n.parse::<i32>().ok());
        if let Some(number) = number {
            pages.push((number, path));
        }
    }
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_image_is_single_png_page() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("scan.jpg");
        RgbImage::from_pixel(40, 20, Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();

        let renderer = PageRenderer::new(150, "pdftoppm");
        let pages = renderer.to_pages(&path, "jpg").await.unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!((pages[0].width, pages[0].height), (40, 20));
        assert_eq!(
            image::guess_format(&pages[0].bytes).unwrap(),
            ImageFormat::Png
        );
    }

    #[tokio::test]
    async fn test_corrupt_image_is_conversion_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let renderer = PageRenderer::new(150, "pdftoppm");
        let err = renderer.to_pages(&path, "png").await.unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
        assert!(err.is_collaborator());
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let renderer = PageRenderer::new(150, "pdftoppm");
        let err = renderer
            .to_pages(Path::new("/tmp/notes.docx"), "docx")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }

    #[tokio::test]
    async fn test_missing_pdftoppm_is_conversion_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let renderer = PageRenderer::new(150, "/nonexistent/pdftoppm");
        let err = renderer.to_pages(&path, "pdf").await.unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }

    #[test]
    fn test_rendered_pages_sorted_numerically() {
        let tmp = TempDir::new().unwrap();
        for name in ["page-10.png", "page-02.png", "page-01.png", "stray.txt"] {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }

        let pages = collect_rendered_pages(tmp.path()).unwrap();
        let numbers: Vec<i32> = pages.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
    }
}
