//! HTML to PDF conversion.

use crate::services::executor::CommandExecutor;
use crate::services::metrics::PDF_RENDERS_TOTAL;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Paper size for the printed document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageFormat {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
}

impl PageFormat {
    /// Value for the CSS `@page { size }` descriptor.
    pub fn css_size(&self) -> &'static str {
        match self {
            PageFormat::A3 => "A3",
            PageFormat::A4 => "A4",
            PageFormat::A5 => "A5",
            PageFormat::Letter => "letter",
            PageFormat::Legal => "legal",
        }
    }

    /// Width and height in PostScript points.
    pub fn points(&self) -> (u32, u32) {
        match self {
            PageFormat::A3 => (842, 1191),
            PageFormat::A4 => (595, 842),
            PageFormat::A5 => (420, 595),
            PageFormat::Letter => (612, 792),
            PageFormat::Legal => (612, 1008),
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageFormat::A3 => "A3",
            PageFormat::A4 => "A4",
            PageFormat::A5 => "A5",
            PageFormat::Letter => "Letter",
            PageFormat::Legal => "Legal",
        };
        f.write_str(name)
    }
}

impl FromStr for PageFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a3" => Ok(PageFormat::A3),
            "a4" => Ok(PageFormat::A4),
            "a5" => Ok(PageFormat::A5),
            "letter" => Ok(PageFormat::Letter),
            "legal" => Ok(PageFormat::Legal),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unsupported page format '{}'",
                other
            ))),
        }
    }
}

/// Page options passed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfOptions {
    pub format: PageFormat,
    pub scale: f64,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            format: PageFormat::A4,
            scale: 1.0,
        }
    }
}

impl PdfOptions {
    pub const MIN_SCALE: f64 = 0.1;
    pub const MAX_SCALE: f64 = 2.0;

    /// Options from optional query values, falling back to `defaults`.
    pub fn resolve(
        format: Option<&str>,
        scale: Option<f64>,
        defaults: PdfOptions,
    ) -> Result<Self, AppError> {
        let format = match format {
            Some(f) if !f.trim().is_empty() => f.parse()?,
            _ => defaults.format,
        };
        let scale = scale.unwrap_or(defaults.scale);
        if !scale.is_finite() || !(Self::MIN_SCALE..=Self::MAX_SCALE).contains(&scale) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Scale must be between {} and {}",
                Self::MIN_SCALE,
                Self::MAX_SCALE
            )));
        }
        Ok(Self { format, scale })
    }
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html: &str, options: &PdfOptions) -> Result<Vec<u8>, AppError>;
    fn engine(&self) -> &'static str;
}

/// Headless Chromium `--print-to-pdf`.
pub struct ChromiumRenderer {
    binary: String,
    executor: CommandExecutor,
}

impl ChromiumRenderer {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            executor: CommandExecutor::new(timeout),
        }
    }
}

/// Put page size and zoom into the document so the engine's defaults
/// don't apply.
fn with_page_setup(html: &str, options: &PdfOptions) -> String {
    let style = format!(
        "<style>@page {{ size: {}; margin: 0; }} body {{ zoom: {}; }}</style>",
        options.format.css_size(),
        options.scale
    );
    match html.find("</head>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + style.len());
            out.push_str(&html[..pos]);
            out.push_str(&style);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{}{}", style, html),
    }
}

#[async_trait]
impl PdfRenderer for ChromiumRenderer {
    #[tracing::instrument(skip(self, html), fields(format = %options.format, scale = options.scale))]
    async fn render(&self, html: &str, options: &PdfOptions) -> Result<Vec<u8>, AppError> {
        let result = async {
            let dir = tempfile::tempdir()
                .map_err(|e| AppError::RenderError(format!("Failed to create work dir: {}", e)))?;
            let input = dir.path().join("document.html");
            let output = dir.path().join("document.pdf");

            tokio::fs::write(&input, with_page_setup(html, options))
                .await
                .map_err(|e| AppError::RenderError(format!("Failed to write HTML: {}", e)))?;

            let print_arg = format!("--print-to-pdf={}", output.display());
            let url = format!("file://{}", input.display());
            self.executor
                .execute(
                    &self.binary,
                    &[
                        "--headless",
                        "--disable-gpu",
                        "--no-sandbox",
                        "--no-pdf-header-footer",
                        "--run-all-compositor-stages-before-draw",
                        &print_arg,
                        &url,
                    ],
                    Some(dir.path()),
                )
                .await?;

            let bytes = tokio::fs::read(&output)
                .await
                .map_err(|e| AppError::RenderError(format!("No PDF produced: {}", e)))?;
            if bytes.is_empty() {
                return Err(AppError::RenderError("Engine produced an empty PDF".to_string()));
            }
            Ok::<_, AppError>(bytes)
        }
        .await;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        PDF_RENDERS_TOTAL
            .with_label_values(&[self.engine(), outcome])
            .inc();
        result
    }

    fn engine(&self) -> &'static str {
        "chromium"
    }
}

/// Renderer for tests and local development without a browser.
///
/// Produces a blank single-page PDF sized to the requested format.
pub struct MockPdfRenderer {
    render_count: AtomicU64,
}

impl MockPdfRenderer {
    pub fn new() -> Self {
        Self {
            render_count: AtomicU64::new(0),
        }
    }

    pub fn render_count(&self) -> u64 {
        self.render_count.load(Ordering::SeqCst)
    }
}

impl Default for MockPdfRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PdfRenderer for MockPdfRenderer {
    async fn render(&self, html: &str, options: &PdfOptions) -> Result<Vec<u8>, AppError> {
        self.render_count.fetch_add(1, Ordering::SeqCst);
        PDF_RENDERS_TOTAL
            .with_label_values(&[self.engine(), "success"])
            .inc();

        tracing::info!(
            html_bytes = html.len(),
            format = %options.format,
            "[MOCK] PDF would be rendered"
        );

        Ok(blank_pdf(options.format))
    }

    fn engine(&self) -> &'static str {
        "mock"
    }
}

/// Smallest well-formed PDF: catalog, page tree and one empty page.
fn blank_pdf(format: PageFormat) -> Vec<u8> {
    let (width, height) = format.points();
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] >>",
            width, height
        ),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_at = out.len();
    out.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    out.push_str("0000000000 65535 f \n");
    for offset in offsets {
        out.push_str(&format!("{:010} 00000 n \n", offset));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    ));
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("letter".parse::<PageFormat>().unwrap(), PageFormat::Letter);
        assert_eq!("A3".parse::<PageFormat>().unwrap(), PageFormat::A3);
        assert!("B5".parse::<PageFormat>().is_err());
    }

    #[test]
    fn resolve_applies_defaults_and_bounds() {
        let defaults = PdfOptions::default();
        let opts = PdfOptions::resolve(None, None, defaults).unwrap();
        assert_eq!(opts, defaults);

        let opts = PdfOptions::resolve(Some("Legal"), Some(1.5), defaults).unwrap();
        assert_eq!(opts.format, PageFormat::Legal);
        assert_eq!(opts.scale, 1.5);

        assert!(PdfOptions::resolve(None, Some(0.0), defaults).is_err());
        assert!(PdfOptions::resolve(None, Some(f64::NAN), defaults).is_err());
    }

    #[test]
    fn page_setup_goes_into_head() {
        let html = "<html><head><title>x</title></head><body></body></html>";
        let out = with_page_setup(
            html,
            &PdfOptions {
                format: PageFormat::Letter,
                scale: 0.8,
            },
        );
        let style_at = out.find("@page { size: letter").unwrap();
        assert!(style_at < out.find("</head>").unwrap());
        assert!(out.contains("zoom: 0.8"));
    }

    #[tokio::test]
    async fn mock_produces_pdf_bytes() {
        let renderer = MockPdfRenderer::new();
        let bytes = renderer
            .render("<html></html>", &PdfOptions::default())
            .await
            .unwrap();

        assert!(bytes.starts_with(b"%PDF-"));
        assert!(bytes.ends_with(b"%%EOF\n"));
        assert_eq!(renderer.render_count(), 1);
    }

    #[test]
    fn blank_pdf_xref_points_at_objects() {
        let pdf = String::from_utf8(blank_pdf(PageFormat::A4)).unwrap();
        let xref_at: usize = pdf
            .lines()
            .skip_while(|l| *l != "startxref")
            .nth(1)
            .unwrap()
            .parse()
            .unwrap();
        assert!(pdf[xref_at..].starts_with("xref"));
        assert!(pdf.contains("/MediaBox [0 0 595 842]"));
        assert!(pdf[9..].starts_with("1 0 obj"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chromium_failure_is_render_error() {
        let renderer = ChromiumRenderer::new("false", Duration::from_secs(5));
        let err = renderer
            .render("<html></html>", &PdfOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RenderError(_)));
    }
}
