use super::{narrative_paragraphs, type_text_params, ChecklistRenderer, RenderContext};
use crate::constants::{
    AREA_TEMPLATE, INVALID_FORMAT, LAND_PLOT_TEMPLATE, NOT_SPECIFIED, WARNING_COLOR,
};
use crate::model::ChecklistInstance;
use crate::narrative::resolve_type_text;
use crate::registry::Strategy;
use crate::values::text_of;
use crate::CoreResult;
use report_docx::{Alignment, Block, Document, Paragraph, Run};
use serde_json::{Map, Value};

const COORDINATE_TABLE_WARNING: &str = "ВСТАВЬТЕ ТАБЛИЦУ КООРДИНАТ";

/// Largest boundary-point count spelled out as a range.
pub const MAX_BOUNDARY_POINTS: u32 = 10_000;

/// Land-plot area narrative.
///
/// The cadastral number and address are borrowed from the question's land-plot checklist; the
/// boundary is described by its point range, followed by a coloured reminder for the editor to
/// paste the coordinate table.
#[derive(Debug, Default)]
pub struct AreaRenderer;

impl Strategy for AreaRenderer {
    fn handles(&self) -> &[&'static str] {
        &[AREA_TEMPLATE]
    }
}

/// `1-2-…-N` for a count of boundary points.
///
/// Missing, blank or zero counts read as not specified; anything that is not a whole number
/// reads as an invalid format, as does a count above [`MAX_BOUNDARY_POINTS`].
pub fn point_range(count: Option<&Value>) -> String {
    let raw = match count {
        None | Some(Value::Null) => return NOT_SPECIFIED.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return INVALID_FORMAT.to_string(),
    };
    if raw.is_empty() {
        return NOT_SPECIFIED.to_string();
    }
    match raw.parse::<u32>() {
        Ok(0) => NOT_SPECIFIED.to_string(),
        Ok(n) if n > MAX_BOUNDARY_POINTS => INVALID_FORMAT.to_string(),
        Ok(n) => (1..=n)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("-"),
        Err(_) => INVALID_FORMAT.to_string(),
    }
}

fn borrowed(related: &Map<String, Value>, key: &str) -> String {
    text_of(
        type_text_params(related)
            .and_then(|p| p.get(key))
            .or_else(|| related.get(key)),
    )
    .unwrap_or_else(|| NOT_SPECIFIED.to_string())
}

impl ChecklistRenderer for AreaRenderer {
    fn render(
        &self,
        ctx: &RenderContext<'_>,
        doc: &mut Document,
        instance: &ChecklistInstance,
        anchor: usize,
    ) -> CoreResult<usize> {
        let data = instance.data_object()?;
        let related = ctx.related(instance, LAND_PLOT_TEMPLATE)?.data_object()?;

        let mut params = type_text_params(&data).cloned().unwrap_or_default();
        let range = point_range(params.get("coordinates"));
        let area = text_of(params.get("area")).unwrap_or_else(|| NOT_SPECIFIED.to_string());
        let cadastral_number = borrowed(&related, "cadastral_number");
        let address = borrowed(&related, "address");

        let text = match ctx.cache.get_type_text(instance.template_id) {
            Some(template) => {
                params.insert("cadastral_number".into(), Value::String(cadastral_number));
                params.insert("address".into(), Value::String(address));
                params.insert("points_range".into(), Value::String(range));
                resolve_type_text(
                    template,
                    &params,
                    ctx.cache.get_field_label_map(instance.template_id),
                )
            }
            None => format!(
                "Площадь земельного участка с кадастровым номером {} по адресу: {} составляет {} кв. м. \
                 Границы земельного участка определены по характерным точкам {}.",
                cadastral_number, address, area, range
            ),
        };

        let mut blocks = narrative_paragraphs(&text);
        blocks.push(Block::Paragraph(
            Paragraph::new()
                .add_run(Run::with_text(COORDINATE_TABLE_WARNING).bold().color(WARNING_COLOR))
                .align(Alignment::Center),
        ));
        Ok(doc.insert_after(anchor, blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{anchored_doc, TestEnv, AREA_ID, LAND_PLOT_ID};
    use crate::CoreError;
    use report_docx::RunItem;
    use serde_json::json;

    #[test]
    fn test_point_range() {
        assert_eq!(point_range(Some(&json!("4"))), "1-2-3-4");
        assert_eq!(point_range(Some(&json!(3))), "1-2-3");
        assert_eq!(point_range(Some(&json!("1"))), "1");
        assert_eq!(point_range(Some(&json!("0"))), "не указано");
        assert_eq!(point_range(Some(&json!(""))), "не указано");
        assert_eq!(point_range(None), "не указано");
        assert_eq!(point_range(Some(&json!("четыре"))), "неверный формат");
        assert_eq!(point_range(Some(&json!("-2"))), "неверный формат");
        assert_eq!(point_range(Some(&json!(2.5))), "неверный формат");
        assert_eq!(point_range(Some(&json!("10001"))), "неверный формат");
        assert_eq!(point_range(Some(&json!(4_294_967_295u64))), "неверный формат");
        assert_eq!(point_range(Some(&json!("99999999999"))), "неверный формат");
        assert!(point_range(Some(&json!(10_000))).ends_with("-9999-10000"));
    }

    #[test]
    fn test_renders_borrowed_narrative_and_red_warning() {
        let mut env = TestEnv::new();
        let area = env.instance(AREA_ID, json!({"type_text_params": {"area": "50", "coordinates": "4"}}));
        let plot = env.sibling(
            &area,
            LAND_PLOT_ID,
            json!({"type_text_params": {"cadastral_number": "16:50:011101:15", "address": "г. Казань"}}),
        );
        env.instances.push(plot);
        let (mut doc, anchor) = anchored_doc();

        let end = AreaRenderer
            .render(&env.ctx(None), &mut doc, &area, anchor)
            .unwrap();

        let texts: Vec<String> = doc.blocks()[anchor + 1..end]
            .iter()
            .filter_map(|b| b.as_paragraph())
            .map(|p| p.text())
            .collect();
        assert_eq!(
            texts,
            vec![
                "Участок 16:50:011101:15 (г. Казань), площадь 50 кв. м, точки 1-2-3-4.",
                "ВСТАВЬТЕ ТАБЛИЦУ КООРДИНАТ",
            ]
        );
        let warning = doc.blocks()[end - 1].as_paragraph().unwrap();
        let run = warning.runs().next().unwrap();
        let props = run.properties.as_ref().unwrap();
        let color = props.child("w:color").unwrap();
        assert_eq!(color.attr("w:val"), Some("FF0000"));
        assert!(matches!(run.content[0], RunItem::Text(_)));
    }

    #[test]
    fn test_missing_related_checklist_is_an_error() {
        let env = TestEnv::new();
        let area = env.instance(AREA_ID, json!({"type_text_params": {"area": "50"}}));
        let (mut doc, anchor) = anchored_doc();

        let err = AreaRenderer
            .render(&env.ctx(None), &mut doc, &area, anchor)
            .unwrap_err();

        assert!(matches!(err, CoreError::MissingRelatedChecklist { .. }));
        assert_eq!(doc.blocks().len(), 2);
    }
}
