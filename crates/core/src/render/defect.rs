use super::{
    bordered_table, file_entries, label_value_row, picture_paragraphs, title_row,
    ChecklistRenderer, RenderContext, HALF_WIDTH_EMU,
};
use crate::constants::{
    DEFECT_TEMPLATE, GOSTS_DEFAULT_LABEL, NOT_SPECIFIED, PREMISES_KEY, PREMISE_NAME_KEY,
    PREMISE_PARAMETERS_KEY, PREMISE_PHOTOS_KEY,
};
use crate::model::ChecklistInstance;
use crate::registry::Strategy;
use crate::values::{field_lines, is_file_list, text_of};
use crate::{CoreError, CoreResult};
use report_docx::{Block, Document, Paragraph, Run, TableCell, TableRow};
use serde_json::{Map, Value};

/// Finding columns read from each parameter block.
const FINDING_FIELDS: [&str; 3] = ["volume", "description", "note"];

/// Premise-by-premise defect survey.
///
/// Renders, in order: one table per premise with its photos and per-parameter findings and
/// photos, one findings table per premise, and a summary table across premises.
#[derive(Debug, Default)]
pub struct DefectRenderer;

impl Strategy for DefectRenderer {
    fn handles(&self) -> &[&'static str] {
        &[DEFECT_TEMPLATE]
    }
}

struct Premise<'d> {
    name: String,
    parameters: Vec<(&'d str, &'d Map<String, Value>)>,
    photos: Option<&'d Value>,
}

fn parse_premises<'d>(
    instance: &ChecklistInstance,
    data: &'d Map<String, Value>,
) -> CoreResult<Vec<Premise<'d>>> {
    let items = match data.get(PREMISES_KEY) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(CoreError::invalid_data(instance.id, "'premises' is not a list"));
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let premise = item.as_object().ok_or_else(|| {
                CoreError::invalid_data(instance.id, format!("premise {} is not an object", i + 1))
            })?;
            let name = text_of(premise.get(PREMISE_NAME_KEY))
                .unwrap_or_else(|| NOT_SPECIFIED.to_string());
            let keys: Vec<&str> = match premise.get(PREMISE_PARAMETERS_KEY) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(keys)) => keys.iter().filter_map(Value::as_str).collect(),
                Some(_) => {
                    return Err(CoreError::invalid_data(
                        instance.id,
                        format!("premise '{}' has malformed parameters", name),
                    ))
                }
            };
            let parameters = keys
                .into_iter()
                .filter_map(|key| premise.get(key).and_then(Value::as_object).map(|o| (key, o)))
                .collect();
            Ok(Premise {
                name,
                parameters,
                photos: premise.get(PREMISE_PHOTOS_KEY),
            })
        })
        .collect()
}

/// Rows of two pictures each; an odd last picture gets an empty neighbour.
fn photo_rows(
    ctx: &RenderContext<'_>,
    doc: &mut Document,
    value: Option<&Value>,
) -> CoreResult<Vec<TableRow>> {
    let entries = file_entries(value);
    let pictures = picture_paragraphs(ctx, doc, &entries, HALF_WIDTH_EMU)?;
    Ok(pictures
        .chunks(2)
        .map(|pair| {
            let mut cells: Vec<TableCell> =
                pair.iter().cloned().map(TableCell::with_paragraph).collect();
            if cells.len() == 1 {
                cells.push(TableCell::with_text(""));
            }
            TableRow::new(cells)
        })
        .collect())
}

fn parameter_photos(fields: &Map<String, Value>) -> Vec<&Value> {
    fields.values().filter(|v| is_file_list(v)).collect()
}

impl ChecklistRenderer for DefectRenderer {
    fn render(
        &self,
        ctx: &RenderContext<'_>,
        doc: &mut Document,
        instance: &ChecklistInstance,
        anchor: usize,
    ) -> CoreResult<usize> {
        let data = instance.data_object()?;
        let premises = parse_premises(instance, &data)?;
        let label = |key: &str| ctx.label(instance, key);

        let mut blocks: Vec<Block> = Vec::new();

        for premise in &premises {
            let mut table = bordered_table(2).add_row(title_row(&premise.name, 2));
            for row in photo_rows(ctx, doc, premise.photos)? {
                table = table.add_row(row);
            }
            for (key, fields) in &premise.parameters {
                let details: Map<String, Value> = fields
                    .iter()
                    .filter(|(k, _)| !FINDING_FIELDS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let lines = field_lines(&details, &label);
                let text = if lines.is_empty() {
                    NOT_SPECIFIED.to_string()
                } else {
                    lines.join("\n")
                };
                table = table.add_row(label_value_row(&label(key), &text));
                for photos in parameter_photos(fields) {
                    for row in photo_rows(ctx, doc, Some(photos))? {
                        table = table.add_row(row);
                    }
                }
            }
            blocks.push(Block::Table(table));
            blocks.push(Block::Paragraph(Paragraph::new()));
        }

        for premise in &premises {
            blocks.push(Block::Paragraph(
                Paragraph::new().add_run(Run::with_text(format!("Дефекты: {}", premise.name)).bold()),
            ));
            let mut table = bordered_table(4).add_row(
                TableRow::of_texts(["Конструктивный элемент", "Объём", "Описание", "Примечание"])
                    .header(),
            );
            for (key, fields) in &premise.parameters {
                let mut row = vec![label(key)];
                row.extend(
                    FINDING_FIELDS
                        .iter()
                        .map(|f| text_of(fields.get(*f)).unwrap_or_default()),
                );
                table = table.add_row(TableRow::of_texts(row));
            }
            blocks.push(Block::Table(table));
        }

        if !premises.is_empty() {
            let mut summary = bordered_table(2).add_row(title_row("Сводная ведомость дефектов", 2));
            for premise in &premises {
                let descriptions: Vec<String> = premise
                    .parameters
                    .iter()
                    .filter_map(|(key, fields)| {
                        text_of(fields.get("description")).map(|d| format!("{}: {}", label(key), d))
                    })
                    .collect();
                summary = summary.add_row(label_value_row(&premise.name, &descriptions.join("\n")));
            }
            summary = summary.add_row(label_value_row(GOSTS_DEFAULT_LABEL, ""));
            blocks.push(Block::Table(summary));
        }

        Ok(doc.insert_after(anchor, blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{anchored_doc, png, TestEnv, DEFECT_ID};
    use report_docx::Table;
    use serde_json::json;

    fn tables(doc: &Document) -> Vec<&Table> {
        doc.blocks().iter().filter_map(Block::as_table).collect()
    }

    #[test]
    fn test_premise_tables_findings_and_summary() {
        let env = TestEnv::new();
        let photos: Vec<Value> = (0..3)
            .map(|i| env.stored_file(&format!("room_{}", i), &png(4, 4, i as u8 * 40)))
            .collect();
        let crack_photo = env.stored_file("crack", &png(8, 4, 200));
        let instance = env.instance(
            DEFECT_ID,
            json!({
                "premises": [
                    {
                        "premise_name": "Кухня",
                        "premise_parameters": ["walls", "ceiling"],
                        "premise_photos": photos,
                        "walls": {
                            "crack": "наклонная",
                            "volume": "2 м²",
                            "description": "трещины штукатурки",
                            "note": "",
                            "photos": [crack_photo]
                        },
                        "ceiling": {"description": "следы протечки"}
                    },
                    {"premise_name": "Коридор", "premise_parameters": []}
                ]
            }),
        );
        let (mut doc, anchor) = anchored_doc();

        DefectRenderer
            .render(&env.ctx(None), &mut doc, &instance, anchor)
            .unwrap();

        let tables = tables(&doc);
        // 2 premise tables, 2 findings tables, 1 summary
        assert_eq!(tables.len(), 5);

        let kitchen = tables[0];
        assert_eq!(kitchen.rows[0].cells[0].text(), "Кухня");
        // 3 photos in two rows, the second padded with an empty cell
        assert!(kitchen.rows[1].cells.iter().all(|c| c.text().is_empty()));
        assert_eq!(kitchen.rows[2].cells.len(), 2);
        assert_eq!(kitchen.rows[3].cells[0].text(), "Стены");
        assert_eq!(kitchen.rows[3].cells[1].text(), "Трещина: наклонная");
        assert_eq!(kitchen.rows[5].cells[0].text(), "Потолок");
        assert_eq!(kitchen.rows[5].cells[1].text(), "не указано");
        assert_eq!(doc.image_count(), 4);

        let findings = tables[2];
        assert_eq!(findings.rows.len(), 3);
        assert_eq!(
            findings.rows[1].cells.iter().map(|c| c.text()).collect::<Vec<_>>(),
            vec!["Стены", "2 м²", "трещины штукатурки", ""]
        );

        let summary = tables[4];
        assert_eq!(summary.rows[1].cells[0].text(), "Кухня");
        assert_eq!(
            summary.rows[1].cells[1].text(),
            "Стены: трещины штукатурки\nПотолок: следы протечки"
        );
        assert_eq!(summary.rows[2].cells[1].text(), "");
        let last = summary.rows.last().unwrap();
        assert_eq!(last.cells[0].text(), "Нормативная документация");
        assert_eq!(last.cells[1].text(), "");
    }

    #[test]
    fn test_premises_must_be_a_list() {
        let env = TestEnv::new();
        let instance = env.instance(DEFECT_ID, json!({"premises": {"premise_name": "x"}}));
        let (mut doc, anchor) = anchored_doc();
        assert!(matches!(
            DefectRenderer.render(&env.ctx(None), &mut doc, &instance, anchor),
            Err(CoreError::InvalidChecklistData { .. })
        ));
    }

    #[test]
    fn test_missing_photo_fails_render() {
        let env = TestEnv::new();
        let instance = env.instance(
            DEFECT_ID,
            json!({"premises": [{
                "premise_name": "Кухня",
                "premise_photos": [{"id": "1", "name": "gone.png", "url": "u", "hash": "h"}]
            }]}),
        );
        let (mut doc, anchor) = anchored_doc();
        assert!(matches!(
            DefectRenderer.render(&env.ctx(None), &mut doc, &instance, anchor),
            Err(CoreError::BlobStore(_))
        ));
    }
}
