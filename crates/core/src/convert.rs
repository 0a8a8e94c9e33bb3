//! PDF to image conversion.
//!
//! [`FormatConverter`] fans page rendering out over a bounded pool and keeps page order; the
//! rendering itself sits behind [`PageRasterizer`] so it can be swapped or faked.

use crate::{CoreError, CoreResult};
use rayon::prelude::*;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

/// Renders single PDF pages to PNG.
pub trait PageRasterizer: Send + Sync {
    fn page_count(&self, pdf: &[u8]) -> CoreResult<usize>;

    /// Renders page `page` (1-based) as PNG bytes.
    fn render_page(&self, pdf: &[u8], page: usize) -> CoreResult<Vec<u8>>;
}

pub struct FormatConverter {
    rasterizer: Arc<dyn PageRasterizer>,
    pool: rayon::ThreadPool,
}

impl FormatConverter {
    /// # Errors
    ///
    /// Returns `Configuration` if the worker pool cannot be created.
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, concurrency: usize) -> CoreResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("rasterize-{}", i))
            .build()
            .map_err(|e| CoreError::Configuration(format!("rasterize pool: {}", e)))?;
        Ok(Self { rasterizer, pool })
    }

    /// Converts every page of a PDF to an image, in page order.
    ///
    /// Pages are rendered in parallel. A page that fails to render is logged and left out.
    ///
    /// # Errors
    ///
    /// Returns `Conversion` only if the document itself cannot be read.
    pub fn pdf_to_images(&self, pdf: &[u8]) -> CoreResult<Vec<Vec<u8>>> {
        let pages = self.rasterizer.page_count(pdf)?;
        let rasterizer = &self.rasterizer;

        let rendered: Vec<(usize, CoreResult<Vec<u8>>)> = self.pool.install(|| {
            (1..=pages)
                .into_par_iter()
                .map(|page| (page, rasterizer.render_page(pdf, page)))
                .collect()
        });

        let images: Vec<Vec<u8>> = rendered
            .into_iter()
            .filter_map(|(page, result)| match result {
                Ok(image) => Some(image),
                Err(e) => {
                    tracing::warn!("page {} of {} dropped: {}", page, pages, e);
                    None
                }
            })
            .collect();
        tracing::debug!("converted {} of {} pages", images.len(), pages);
        Ok(images)
    }
}

/// Rasterizes with the poppler `pdftoppm` tool, one process per page.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: PathBuf,
    dpi: u32,
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pdftoppm"),
            dpi: 150,
        }
    }
}

impl PdftoppmRasterizer {
    pub fn new(program: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            program: program.into(),
            dpi: dpi.max(36),
        }
    }
}

impl PageRasterizer for PdftoppmRasterizer {
    fn page_count(&self, pdf: &[u8]) -> CoreResult<usize> {
        let document = lopdf::Document::load_mem(pdf)
            .map_err(|e| CoreError::Conversion(format!("unreadable PDF: {}", e)))?;
        Ok(document.get_pages().len())
    }

    fn render_page(&self, pdf: &[u8], page: usize) -> CoreResult<Vec<u8>> {
        let workdir = tempfile::TempDir::new()?;
        let input = workdir.path().join("input.pdf");
        let prefix = workdir.path().join("page");
        std::fs::write(&input, pdf)?;

        let output = Command::new(&self.program)
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg("-singlefile")
            .arg(&input)
            .arg(&prefix)
            .output()
            .map_err(|e| {
                CoreError::Conversion(format!("cannot run {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            return Err(CoreError::Conversion(format!(
                "{} failed on page {}: {}",
                self.program.display(),
                page,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        std::fs::read(prefix.with_extension("png")).map_err(CoreError::FileRead)
    }
}
