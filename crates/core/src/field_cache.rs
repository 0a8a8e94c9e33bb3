//! Per-template field labels and narrative templates.
//!
//! Template structures are parsed once at startup into a [`FieldMetadataCache`], which is then
//! shared read-only (`Arc<FieldMetadataCache>`) by every render. Lookups never fail: a miss reads
//! as absent or empty.
//!
//! Labels for a template come from two places in its structure:
//!
//! - the `metadata` object, mapping field keys to labels
//! - every object carrying both `key` and `name` anywhere below `parameters`
//!
//! A key present in both keeps its `metadata` label. The normative-documents key `gosts` is
//! always labelled.

use crate::constants::{GOSTS_DEFAULT_LABEL, GOSTS_KEY};
use crate::model::Template;
use crate::templates::TemplateSource;
use crate::CoreResult;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct TemplateFields {
    name: String,
    labels: BTreeMap<String, String>,
    type_text: Option<String>,
}

/// Read-only index from template id to field labels and narrative template.
#[derive(Debug, Default)]
pub struct FieldMetadataCache {
    templates: HashMap<Uuid, TemplateFields>,
    by_name: HashMap<String, Uuid>,
    empty: BTreeMap<String, String>,
}

impl FieldMetadataCache {
    /// Loads every template from `source` and indexes it.
    ///
    /// # Errors
    ///
    /// Returns whatever error the source raises; the cache is never partially built.
    pub fn init(source: &dyn TemplateSource) -> CoreResult<Self> {
        let templates = source.load_all()?;
        let cache = Self::from_templates(&templates);
        tracing::info!("field metadata cached for {} templates", cache.len());
        Ok(cache)
    }

    pub fn from_templates(templates: &[Template]) -> Self {
        let mut cache = Self::default();
        for template in templates {
            let fields = index_template(template);
            if cache.by_name.insert(template.name.clone(), template.id).is_some() {
                tracing::warn!("template name '{}' is declared more than once", template.name);
            }
            cache.templates.insert(template.id, fields);
        }
        cache
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get_field_label(&self, template_id: Uuid, key: &str) -> Option<&str> {
        self.templates
            .get(&template_id)
            .and_then(|t| t.labels.get(key))
            .map(String::as_str)
    }

    /// The label for `key`, or the key itself when the template does not label it.
    pub fn label_or_key(&self, template_id: Uuid, key: &str) -> String {
        self.get_field_label(template_id, key)
            .unwrap_or(key)
            .to_string()
    }

    /// All labels of a template, empty for an unknown template.
    pub fn get_field_label_map(&self, template_id: Uuid) -> &BTreeMap<String, String> {
        self.templates
            .get(&template_id)
            .map(|t| &t.labels)
            .unwrap_or(&self.empty)
    }

    pub fn get_type_text(&self, template_id: Uuid) -> Option<&str> {
        self.templates
            .get(&template_id)
            .and_then(|t| t.type_text.as_deref())
    }

    pub fn template_name(&self, template_id: Uuid) -> Option<&str> {
        self.templates.get(&template_id).map(|t| t.name.as_str())
    }

    pub fn template_id_by_name(&self, name: &str) -> Option<Uuid> {
        self.by_name.get(name).copied()
    }
}

fn index_template(template: &Template) -> TemplateFields {
    let mut labels = BTreeMap::new();

    if let Some(parameters) = template.structure.get("parameters") {
        collect_key_names(parameters, &mut labels);
    }

    if let Some(Value::Object(metadata)) = template.structure.get("metadata") {
        for (key, value) in metadata {
            if let Some(label) = metadata_label(value) {
                labels.insert(key.clone(), label);
            }
        }
    }

    labels
        .entry(GOSTS_KEY.to_string())
        .or_insert_with(|| GOSTS_DEFAULT_LABEL.to_string());

    let type_text = template
        .structure
        .get("type_text")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    TemplateFields {
        name: template.name.clone(),
        labels,
        type_text,
    }
}

fn metadata_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o
            .get("label")
            .or_else(|| o.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn collect_key_names(value: &Value, labels: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(object) => {
            if let (Some(Value::String(key)), Some(Value::String(name))) =
                (object.get("key"), object.get("name"))
            {
                labels.entry(key.clone()).or_insert_with(|| name.clone());
            }
            for child in object.values() {
                collect_key_names(child, labels);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_key_names(item, labels);
            }
        }
        _ => {}
    }
}
