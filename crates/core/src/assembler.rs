//! End-to-end report generation.
//!
//! [`DocumentAssembler::generate`] runs one request through fixed stages, in order:
//!
//! 1. merge-field substitution from the bookmark map
//! 2. paragraph splitting on the question and line separators
//! 3. checklist rendering at each `[CHECKLIST_<uuid>]` anchor
//! 4. answer photos at the `[PHOTO_<uuid>]` anchors, then removal of any anchor left over,
//!    such as one sitting in a table cell
//! 5. profile-document pages at the `attachments` bookmark
//! 6. the map screenshot at `expertiseMapScreenshot`
//! 7. serialisation
//!
//! A missing anchor is logged and skipped. Any other failure aborts the request with
//! [`CoreError::GenerationFailed`] naming the stage; no partial document is returned.

use crate::bookmarks::{checklist_anchor, photo_anchor, BookmarkGenerator};
use crate::config::CoreConfig;
use crate::constants::{ATTACHMENTS_BOOKMARK, LINE_SEPARATOR, QUESTION_SEPARATOR, SCREENSHOT_TOKEN};
use crate::convert::{FormatConverter, PageRasterizer};
use crate::field_cache::FieldMetadataCache;
use crate::model::{AnswerPhoto, Examination, ProfileDocument};
use crate::photos::PhotoInserter;
use crate::render::{builtin_renderers, generation_pool, ChecklistRenderer, RenderContext};
use crate::registry::StrategyRegistry;
use crate::textgen::TextGenerator;
use crate::{CoreError, CoreResult};
use rayon::prelude::*;
use report_docx::{Alignment, Block, Document, Inline, Paragraph, Run, PAGE_CONTENT_WIDTH_EMU};
use report_files::{is_image, is_pdf, BlobStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Renderers keyed by the template names they handle, with a mandatory default.
pub type RendererRegistry = StrategyRegistry<dyn ChecklistRenderer>;

/// Wraps a stage failure so the caller sees one generation error naming the stage.
fn stage<T>(name: &'static str, result: CoreResult<T>) -> CoreResult<T> {
    result.map_err(|source| {
        tracing::error!("report generation failed at {}: {}", name, source);
        CoreError::GenerationFailed {
            stage: name,
            source: Box::new(source),
        }
    })
}

/// Assembles finished reports from a template document and an examination.
pub struct DocumentAssembler {
    cache: Arc<FieldMetadataCache>,
    renderers: RendererRegistry,
    blobs: Arc<dyn BlobStore>,
    converter: FormatConverter,
    photos: PhotoInserter,
    bookmarks: BookmarkGenerator,
    text_generator: Option<Arc<dyn TextGenerator>>,
    config: Arc<CoreConfig>,
    attachment_pool: rayon::ThreadPool,
    generation_pool: rayon::ThreadPool,
}

impl DocumentAssembler {
    /// Creates an assembler with the built-in renderers.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a worker pool cannot be built or the renderer registry is
    /// invalid.
    pub fn new(
        cache: Arc<FieldMetadataCache>,
        blobs: Arc<dyn BlobStore>,
        rasterizer: Arc<dyn PageRasterizer>,
        config: Arc<CoreConfig>,
    ) -> CoreResult<Self> {
        let renderers = RendererRegistry::build(builtin_renderers())?;
        Self::with_renderers(cache, blobs, rasterizer, config, renderers)
    }

    pub fn with_renderers(
        cache: Arc<FieldMetadataCache>,
        blobs: Arc<dyn BlobStore>,
        rasterizer: Arc<dyn PageRasterizer>,
        config: Arc<CoreConfig>,
        renderers: RendererRegistry,
    ) -> CoreResult<Self> {
        let attachment_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.attachment_fetch_concurrency())
            .thread_name(|i| format!("attachment-fetch-{}", i))
            .build()
            .map_err(|e| CoreError::Configuration(format!("attachment fetch pool: {}", e)))?;
        let generation_pool = generation_pool(&config)?;

        Ok(Self {
            converter: FormatConverter::new(rasterizer, config.rasterize_concurrency())?,
            photos: PhotoInserter::new(config.photo_fetch_concurrency())?,
            bookmarks: BookmarkGenerator::new(),
            text_generator: None,
            cache,
            renderers,
            blobs,
            config,
            attachment_pool,
            generation_pool,
        })
    }

    /// Sets the text-generation service used by renderers that write prose.
    #[must_use]
    pub fn with_text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.text_generator = Some(generator);
        self
    }

    pub fn renderers(&self) -> &RendererRegistry {
        &self.renderers
    }

    /// Generates a report, filling merge fields from the examination.
    ///
    /// # Arguments
    ///
    /// * `template` - The report template as a packaged document.
    /// * `examination` - Questions, answers, checklists and attachments to render.
    /// * `screenshot` - Optional map image for the `expertiseMapScreenshot` placeholder.
    ///
    /// # Returns
    ///
    /// The finished document as bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::GenerationFailed`] if any stage fails.
    pub fn generate(
        &self,
        template: &[u8],
        examination: &Examination,
        screenshot: Option<&[u8]>,
    ) -> CoreResult<Vec<u8>> {
        let fields = self.bookmarks.generate(examination);
        self.assemble(template, examination, &fields, screenshot)
    }

    /// Generates a report from an explicit bookmark map.
    pub fn assemble(
        &self,
        template: &[u8],
        examination: &Examination,
        fields: &HashMap<String, String>,
        screenshot: Option<&[u8]>,
    ) -> CoreResult<Vec<u8>> {
        tracing::info!(
            examination = %examination.id,
            questions = examination.questions.len(),
            "generating report"
        );

        let mut doc = stage("open", Document::open(template).map_err(CoreError::from))?;

        let substituted = doc.substitute_merge_fields(fields);
        tracing::debug!(
            "stage 1: {} fields filled, {} removed",
            substituted.resolved,
            substituted.removed
        );

        let split = doc.split_paragraphs(&[QUESTION_SEPARATOR, LINE_SEPARATOR]);
        tracing::debug!("stage 2: {} paragraphs split", split);

        let rendered = stage("checklists", self.insert_checklists(&mut doc, examination))?;
        tracing::debug!("stage 3: {} checklists rendered", rendered);

        let photos: Vec<AnswerPhoto> = examination.photos().cloned().collect();
        let inserted = stage(
            "answer photos",
            self.photos
                .insert(&mut doc, self.blobs.as_ref(), self.config.photo_bucket(), &photos),
        )?;
        tracing::debug!("stage 4: {} answer photos inserted", inserted);

        let leftover = doc.erase_tokens(&anchors(examination));
        if leftover > 0 {
            tracing::warn!("{} unresolved anchors removed from the report", leftover);
        }

        let pages = stage(
            "profile documents",
            self.insert_profile_documents(&mut doc, &examination.profile_documents),
        )?;
        tracing::debug!("stage 5: {} attachment pages inserted", pages);

        stage("screenshot", insert_screenshot(&mut doc, screenshot))?;

        let bytes = stage("serialisation", doc.to_bytes().map_err(CoreError::from))?;
        tracing::info!(
            examination = %examination.id,
            size = bytes.len(),
            "report generated"
        );
        Ok(bytes)
    }

    fn insert_checklists(&self, doc: &mut Document, examination: &Examination) -> CoreResult<usize> {
        let ctx = RenderContext {
            cache: &self.cache,
            blobs: self.blobs.as_ref(),
            lookup: examination,
            text_generator: self.text_generator.as_deref(),
            generation_pool: &self.generation_pool,
            config: &self.config,
        };

        let mut rendered = 0;
        for question in &examination.questions {
            for instance in &question.checklists {
                let anchor = checklist_anchor(instance.id);
                let Some(index) = doc.find_paragraph_containing(&anchor) else {
                    tracing::warn!(
                        "anchor {} not found in question {}, skipping",
                        anchor,
                        question.number
                    );
                    continue;
                };
                if let Some(paragraph) = doc.paragraph_mut(index) {
                    paragraph.replace_text(&anchor, "");
                }

                let template_name = self
                    .cache
                    .template_name(instance.template_id)
                    .ok_or(CoreError::UnknownTemplate(instance.template_id))?;
                let renderer = self.renderers.resolve(template_name);
                tracing::debug!("rendering checklist {} as '{}'", instance.id, template_name);
                renderer.render(&ctx, doc, instance, index)?;
                rendered += 1;
            }
        }
        Ok(rendered)
    }

    /// Replaces the `attachments` bookmark paragraph with one picture per attachment page.
    fn insert_profile_documents(
        &self,
        doc: &mut Document,
        documents: &[ProfileDocument],
    ) -> CoreResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let Some(index) = doc.find_bookmark(ATTACHMENTS_BOOKMARK) else {
            tracing::warn!(
                "no '{}' bookmark, {} profile documents left out",
                ATTACHMENTS_BOOKMARK,
                documents.len()
            );
            return Ok(0);
        };

        let blobs = self.blobs.as_ref();
        let contents: Vec<Vec<u8>> = self.attachment_pool.install(|| {
            documents
                .par_iter()
                .map(|d| -> CoreResult<Vec<u8>> {
                    Ok(blobs.get(&d.name, &d.extension, &d.bucket)?)
                })
                .collect::<CoreResult<_>>()
        })?;

        let mut pages = Vec::new();
        for (document, bytes) in documents.iter().zip(contents) {
            if is_image(&bytes) {
                pages.push(bytes);
            } else if is_pdf(&bytes) {
                pages.extend(self.converter.pdf_to_images(&bytes)?);
            } else {
                tracing::warn!(
                    "profile document {}.{} is neither an image nor a PDF, skipping",
                    document.name,
                    document.extension
                );
            }
        }

        let mut blocks = Vec::with_capacity(pages.len());
        for page in &pages {
            let drawing = doc.add_image(page, PAGE_CONTENT_WIDTH_EMU)?;
            blocks.push(Block::Paragraph(
                Paragraph::new()
                    .add_run(Run::with_drawing(drawing))
                    .align(Alignment::Center),
            ));
        }
        doc.replace(index, blocks);
        Ok(pages.len())
    }
}

/// Every checklist and photo anchor the bookmark map can place for `examination`.
fn anchors(examination: &Examination) -> Vec<String> {
    examination
        .checklists()
        .map(|c| checklist_anchor(c.id))
        .chain(examination.photos().map(|p| photo_anchor(p.id)))
        .collect()
}

/// Puts the screenshot into the paragraph holding the placeholder, after the remaining text.
///
/// Without a screenshot the placeholder is just cleared.
fn insert_screenshot(doc: &mut Document, screenshot: Option<&[u8]>) -> CoreResult<()> {
    let Some(index) = doc
        .find_paragraph_containing(SCREENSHOT_TOKEN)
        .or_else(|| doc.find_bookmark(SCREENSHOT_TOKEN))
    else {
        if screenshot.is_some() {
            tracing::warn!("no '{}' placeholder, screenshot left out", SCREENSHOT_TOKEN);
        }
        return Ok(());
    };

    let drawing = match screenshot {
        Some(bytes) => Some(doc.add_image(bytes, PAGE_CONTENT_WIDTH_EMU)?),
        None => None,
    };
    if let Some(paragraph) = doc.paragraph_mut(index) {
        paragraph.replace_text(SCREENSHOT_TOKEN, "");
        if let Some(drawing) = drawing {
            paragraph.content.push(Inline::Run(Run::with_drawing(drawing)));
        }
    }
    Ok(())
}
