//! Checklist content renderers.
//!
//! Each renderer turns one checklist instance into document blocks inserted right after an
//! anchor paragraph. Renderers are selected by template name through a
//! [`crate::RendererRegistry`]; everything a renderer needs beyond the document and the instance
//! arrives in a [`RenderContext`].

mod area;
mod compliance;
mod construction;
mod default;
mod defect;

pub use area::AreaRenderer;
pub use compliance::ComplianceRenderer;
pub use construction::ConstructionRenderer;
pub use default::DefaultRenderer;
pub use defect::DefectRenderer;

use crate::config::CoreConfig;
use crate::constants::{TABLE_WIDTH_TWIPS, TYPE_TEXT_PARAMS_KEY};
use crate::field_cache::FieldMetadataCache;
use crate::model::{ChecklistInstance, Examination};
use crate::narrative::resolve_type_text;
use crate::registry::Strategy;
use crate::textgen::TextGenerator;
use crate::{CoreError, CoreResult};
use report_docx::{
    Alignment, Block, Document, Paragraph, Run, Table, TableCell, TableRow, PAGE_CONTENT_WIDTH_EMU,
};
use report_files::{BlobStore, FileEntry, ObjectKey};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Finds a sibling checklist instance attached to the same question.
pub trait ChecklistLookup: Send + Sync {
    fn find(&self, question_id: Uuid, template_id: Uuid) -> Option<ChecklistInstance>;
}

impl ChecklistLookup for Examination {
    fn find(&self, question_id: Uuid, template_id: Uuid) -> Option<ChecklistInstance> {
        self.checklists()
            .find(|c| c.question_id == question_id && c.template_id == template_id)
            .cloned()
    }
}

impl ChecklistLookup for Vec<ChecklistInstance> {
    fn find(&self, question_id: Uuid, template_id: Uuid) -> Option<ChecklistInstance> {
        self.iter()
            .find(|c| c.question_id == question_id && c.template_id == template_id)
            .cloned()
    }
}

/// Everything a renderer may read while rendering one instance.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub cache: &'a FieldMetadataCache,
    pub blobs: &'a dyn BlobStore,
    pub lookup: &'a dyn ChecklistLookup,
    pub text_generator: Option<&'a dyn TextGenerator>,
    /// Workers for text-generation calls, sized by `text_generation_concurrency`.
    pub generation_pool: &'a rayon::ThreadPool,
    pub config: &'a CoreConfig,
}

impl<'a> RenderContext<'a> {
    pub fn label(&self, instance: &ChecklistInstance, key: &str) -> String {
        self.cache.label_or_key(instance.template_id, key)
    }

    /// The checklist of template `template_name` attached to the same question as `instance`.
    ///
    /// # Errors
    ///
    /// Returns `MissingRelatedChecklist` when there is none; narrative built without it would
    /// state wrong facts.
    pub fn related(
        &self,
        instance: &ChecklistInstance,
        template_name: &str,
    ) -> CoreResult<ChecklistInstance> {
        self.cache
            .template_id_by_name(template_name)
            .and_then(|template_id| self.lookup.find(instance.question_id, template_id))
            .ok_or_else(|| CoreError::MissingRelatedChecklist {
                template: template_name.to_string(),
                question_id: instance.question_id,
            })
    }

    /// Narrative text of the instance's template with its `type_text_params` filled in.
    pub fn type_text(&self, instance: &ChecklistInstance, data: &Map<String, Value>) -> Option<String> {
        let template = self.cache.get_type_text(instance.template_id)?;
        let empty = Map::new();
        let params = type_text_params(data).unwrap_or(&empty);
        Some(resolve_type_text(
            template,
            params,
            self.cache.get_field_label_map(instance.template_id),
        ))
    }

    pub fn text_generator(&self) -> CoreResult<&'a dyn TextGenerator> {
        self.text_generator.ok_or_else(|| {
            CoreError::Configuration("no text generation service configured".into())
        })
    }

    /// Downloads a stored checklist file.
    pub fn fetch_file(&self, entry: &FileEntry) -> CoreResult<Vec<u8>> {
        let key = ObjectKey::from_file_name(&entry.name);
        Ok(self
            .blobs
            .get(&key.name, &key.extension, self.config.checklist_bucket())?)
    }
}

/// Renders one checklist instance into the document.
pub trait ChecklistRenderer: Strategy {
    /// Inserts the rendered blocks after the block at `anchor`.
    ///
    /// Returns the index one past the last inserted block.
    ///
    /// # Errors
    ///
    /// Any error aborts generation of the whole report.
    fn render(
        &self,
        ctx: &RenderContext<'_>,
        doc: &mut Document,
        instance: &ChecklistInstance,
        anchor: usize,
    ) -> CoreResult<usize>;
}

/// All built-in renderers, the default one included.
pub fn builtin_renderers() -> Vec<Arc<dyn ChecklistRenderer>> {
    vec![
        Arc::new(DefaultRenderer),
        Arc::new(AreaRenderer),
        Arc::new(ConstructionRenderer),
        Arc::new(DefectRenderer),
        Arc::new(ComplianceRenderer),
    ]
}

/// Worker pool for text-generation calls made while rendering.
///
/// # Errors
///
/// Returns `Configuration` if the pool cannot be built.
pub fn generation_pool(config: &CoreConfig) -> CoreResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.text_generation_concurrency())
        .thread_name(|i| format!("text-generation-{}", i))
        .build()
        .map_err(|e| CoreError::Configuration(format!("text generation pool: {}", e)))
}

pub(crate) fn type_text_params(data: &Map<String, Value>) -> Option<&Map<String, Value>> {
    data.get(TYPE_TEXT_PARAMS_KEY).and_then(Value::as_object)
}

/// File entries stored under `key`, skipping anything that does not parse as one.
pub(crate) fn file_entries(value: Option<&Value>) -> Vec<FileEntry> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn bordered_table(columns: usize) -> Table {
    Table::bordered(columns, TABLE_WIDTH_TWIPS)
}

/// A bold row spanning the whole table.
pub(crate) fn title_row(text: &str, columns: usize) -> TableRow {
    TableRow::new(vec![TableCell::with_paragraph(
        Paragraph::new()
            .add_run(Run::with_text(text).bold())
            .align(Alignment::Center),
    )
    .span(columns)])
}

pub(crate) fn label_value_row(label: &str, value: &str) -> TableRow {
    TableRow::new(vec![
        TableCell::with_paragraph(Paragraph::new().add_run(Run::with_text(label).bold())),
        TableCell::with_text(value),
    ])
}

/// One justified paragraph per line of `text`.
pub(crate) fn narrative_paragraphs(text: &str) -> Vec<Block> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| Block::Paragraph(Paragraph::with_text(line).align(Alignment::Both)))
        .collect()
}

pub(crate) fn caption(text: &str) -> Paragraph {
    Paragraph::new()
        .add_run(Run::with_text(text).italic())
        .align(Alignment::Center)
}

/// Embeds each file as a centred picture paragraph; each picture is scaled to `max_width_emu`.
pub(crate) fn picture_paragraphs(
    ctx: &RenderContext<'_>,
    doc: &mut Document,
    entries: &[FileEntry],
    max_width_emu: u64,
) -> CoreResult<Vec<Paragraph>> {
    let mut paragraphs = Vec::with_capacity(entries.len());
    for entry in entries {
        let bytes = ctx.fetch_file(entry)?;
        let drawing = doc.add_image(&bytes, max_width_emu)?;
        paragraphs.push(
            Paragraph::new()
                .add_run(Run::with_drawing(drawing))
                .align(Alignment::Center),
        );
    }
    Ok(paragraphs)
}

/// Width for a picture inside one cell of a two-column table.
pub(crate) const HALF_WIDTH_EMU: u64 = PAGE_CONTENT_WIDTH_EMU / 2 - 120_000;
