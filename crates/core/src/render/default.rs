use super::{
    bordered_table, label_value_row, narrative_paragraphs, title_row, ChecklistRenderer,
    RenderContext,
};
use crate::constants::{DEFAULT_TEMPLATE, GOSTS_KEY, TYPE_TEXT_PARAMS_KEY};
use crate::model::ChecklistInstance;
use crate::registry::Strategy;
use crate::values::{field_lines, format_gosts, format_value, is_file_list};
use crate::CoreResult;
use report_docx::{Block, Document};
use serde_json::Value;

/// Renders any checklist as a label/value table, preceded by its narrative when the template
/// has one.
#[derive(Debug, Default)]
pub struct DefaultRenderer;

impl Strategy for DefaultRenderer {
    fn handles(&self) -> &[&'static str] {
        &[DEFAULT_TEMPLATE]
    }

    fn is_default(&self) -> bool {
        true
    }
}

impl ChecklistRenderer for DefaultRenderer {
    fn render(
        &self,
        ctx: &RenderContext<'_>,
        doc: &mut Document,
        instance: &ChecklistInstance,
        anchor: usize,
    ) -> CoreResult<usize> {
        let data = instance.data_object()?;
        let label = |key: &str| ctx.label(instance, key);

        let mut blocks = Vec::new();
        if let Some(text) = ctx.type_text(instance, &data) {
            blocks.extend(narrative_paragraphs(&text));
        }

        let title = ctx
            .cache
            .template_name(instance.template_id)
            .unwrap_or(DEFAULT_TEMPLATE);
        let mut table = bordered_table(2).add_row(title_row(title, 2));

        for (key, value) in &data {
            if key == TYPE_TEXT_PARAMS_KEY || is_file_list(value) {
                continue;
            }
            let text = match value {
                _ if key == GOSTS_KEY => format_gosts(value),
                Value::Object(fields) if !fields.contains_key("value") => {
                    field_lines(fields, &label).join("\n")
                }
                other => format_value(other, &label),
            };
            if text.is_empty() {
                continue;
            }
            table = table.add_row(label_value_row(&label(key), &text));
        }

        blocks.push(Block::Table(table));
        Ok(doc.insert_after(anchor, blocks))
    }
}
