//! Shared fixtures for unit tests.

use crate::config::CoreConfig;
use crate::constants::*;
use crate::field_cache::FieldMetadataCache;
use crate::model::{ChecklistInstance, Template};
use crate::render::{generation_pool, RenderContext};
use crate::textgen::TextGenerator;
use report_docx::{Document, Paragraph};
use report_files::{content_hash, BlobStore, FileEntry, MemoryBlobStore};
use serde_json::{json, Value};
use std::io::Cursor;
use tempfile::TempDir;
use uuid::Uuid;

pub(crate) const DEFAULT_ID: Uuid = Uuid::from_u128(1);
pub(crate) const AREA_ID: Uuid = Uuid::from_u128(2);
pub(crate) const LAND_PLOT_ID: Uuid = Uuid::from_u128(3);
pub(crate) const CONSTRUCTION_ID: Uuid = Uuid::from_u128(4);
pub(crate) const BUILDING_ID: Uuid = Uuid::from_u128(5);
pub(crate) const DEFECT_ID: Uuid = Uuid::from_u128(6);
pub(crate) const COMPLIANCE_ID: Uuid = Uuid::from_u128(7);
pub(crate) const QUESTION_ID: Uuid = Uuid::from_u128(100);

pub(crate) fn templates() -> Vec<Template> {
    let template = |id, name: &str, structure| Template {
        id,
        name: name.to_string(),
        structure,
    };
    vec![
        template(
            DEFAULT_ID,
            DEFAULT_TEMPLATE,
            json!({
                "metadata": {"walls": "Стены", "material": "Материал"},
                "type_text": "Обследованы стены: {{walls}}."
            }),
        ),
        template(
            AREA_ID,
            AREA_TEMPLATE,
            json!({
                "type_text": "Участок {{cadastral_number}} ({{address}}), площадь {{area}} кв. м, точки {{points_range}}."
            }),
        ),
        template(LAND_PLOT_ID, LAND_PLOT_TEMPLATE, json!({})),
        template(
            CONSTRUCTION_ID,
            CONSTRUCTION_TEMPLATE,
            json!({"metadata": {"material": "Материал"}}),
        ),
        template(BUILDING_ID, BUILDING_TEMPLATE, json!({})),
        template(
            DEFECT_ID,
            DEFECT_TEMPLATE,
            json!({
                "metadata": {"premise_photos": "Фото помещения"},
                "parameters": [
                    {"key": "walls", "name": "Стены", "fields": [
                        {"key": "crack", "name": "Трещина"}
                    ]},
                    {"key": "ceiling", "name": "Потолок"}
                ]
            }),
        ),
        template(COMPLIANCE_ID, COMPLIANCE_TEMPLATE, json!({})),
    ]
}

pub(crate) struct TestEnv {
    pub cache: FieldMetadataCache,
    pub blobs: MemoryBlobStore,
    pub config: CoreConfig,
    pub instances: Vec<ChecklistInstance>,
    pool: rayon::ThreadPool,
    _dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|c| c)
    }

    pub fn with_config(adjust: impl FnOnce(CoreConfig) -> CoreConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let config = adjust(CoreConfig::new(dir.path().to_path_buf()).unwrap());
        let pool = generation_pool(&config).unwrap();
        Self {
            cache: FieldMetadataCache::from_templates(&templates()),
            blobs: MemoryBlobStore::new(),
            config,
            instances: Vec::new(),
            pool,
            _dir: dir,
        }
    }

    pub fn instance(&self, template_id: Uuid, data: Value) -> ChecklistInstance {
        ChecklistInstance {
            id: Uuid::new_v4(),
            question_id: QUESTION_ID,
            template_id,
            data,
        }
    }

    pub fn sibling(&self, of: &ChecklistInstance, template_id: Uuid, data: Value) -> ChecklistInstance {
        ChecklistInstance {
            question_id: of.question_id,
            ..self.instance(template_id, data)
        }
    }

    pub fn ctx<'a>(&'a self, text_generator: Option<&'a dyn TextGenerator>) -> RenderContext<'a> {
        RenderContext {
            cache: &self.cache,
            blobs: &self.blobs,
            lookup: &self.instances,
            text_generator,
            generation_pool: &self.pool,
            config: &self.config,
        }
    }

    /// Stores `bytes` in the checklist bucket and returns its file entry as JSON.
    pub fn stored_file(&self, stem: &str, bytes: &[u8]) -> Value {
        let url = self
            .blobs
            .put(stem, "png", self.config.checklist_bucket(), bytes, "")
            .unwrap();
        serde_json::to_value(FileEntry {
            id: Uuid::new_v4().to_string(),
            name: format!("{}.png", stem),
            url,
            hash: content_hash(bytes),
        })
        .unwrap()
    }
}

pub(crate) fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, shade, shade]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageOutputFormat::Png)
        .unwrap();
    out
}

/// A blank document whose first block is an anchor paragraph.
pub(crate) fn anchored_doc() -> (Document, usize) {
    let mut doc = Document::blank();
    doc.push(Paragraph::with_text(""));
    (doc, 0)
}
