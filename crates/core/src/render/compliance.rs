use super::{
    caption, file_entries, narrative_paragraphs, picture_paragraphs, ChecklistRenderer,
    RenderContext,
};
use crate::constants::{COMPLIANCE_TEMPLATE, NOT_SPECIFIED};
use crate::model::ChecklistInstance;
use crate::registry::Strategy;
use crate::values::{field_lines, is_file_list, text_of};
use crate::CoreResult;
use report_docx::{Alignment, Block, Document, Paragraph, Run, PAGE_CONTENT_WIDTH_EMU};
use serde_json::{Map, Value};

const INTRODUCTION: &str = "Для установления соответствия объекта градостроительным нормам \
                            проанализированы сведения Единого государственного реестра \
                            недвижимости, исторические спутниковые снимки территории, правила \
                            землепользования и застройки, а также границы зон с особыми условиями \
                            использования территории.";

const DEFAULT_SYNTHESIS: &str = "Совокупность изложенных сведений учтена экспертом при \
                                 формулировании ответа на поставленный вопрос.";

/// (data key, heading) of each analysis block, in output order.
const BLOCKS: [(&str, &str); 4] = [
    ("cadastral", "Сведения ЕГРН"),
    ("historical_imagery", "Исторические спутниковые снимки"),
    ("zoning", "Градостроительное зонирование"),
    ("intersection", "Пересечение с зонами с особыми условиями использования территории"),
];

/// Town-planning compliance narrative with reference images.
#[derive(Debug, Default)]
pub struct ComplianceRenderer;

impl Strategy for ComplianceRenderer {
    fn handles(&self) -> &[&'static str] {
        &[COMPLIANCE_TEMPLATE]
    }
}

fn block_summary(block: Option<&Value>, label: &dyn Fn(&str) -> String) -> String {
    let summary = match block {
        Some(Value::Object(fields)) => text_of(fields.get("summary")).or_else(|| {
            let rest: Map<String, Value> = fields
                .iter()
                .filter(|(k, v)| k.as_str() != "summary" && !is_file_list(v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let lines = field_lines(&rest, label);
            (!lines.is_empty()).then(|| lines.join("\n"))
        }),
        other => text_of(other),
    };
    summary.unwrap_or_else(|| NOT_SPECIFIED.to_string())
}

impl ChecklistRenderer for ComplianceRenderer {
    fn render(
        &self,
        ctx: &RenderContext<'_>,
        doc: &mut Document,
        instance: &ChecklistInstance,
        anchor: usize,
    ) -> CoreResult<usize> {
        let data = instance.data_object()?;
        let label = |key: &str| ctx.label(instance, key);

        let mut blocks = narrative_paragraphs(INTRODUCTION);

        for (key, heading) in BLOCKS {
            let block = data.get(key);
            blocks.push(Block::Paragraph(
                Paragraph::new().add_run(Run::with_text(heading).bold()),
            ));
            blocks.extend(narrative_paragraphs(&block_summary(block, &label)));

            let images = file_entries(block.and_then(|b| b.get("images")));
            let pictures = picture_paragraphs(ctx, doc, &images, PAGE_CONTENT_WIDTH_EMU)?;
            let count = pictures.len();
            for (i, picture) in pictures.into_iter().enumerate() {
                blocks.push(Block::Paragraph(picture));
                let text = if count == 1 {
                    heading.to_string()
                } else {
                    format!("{} ({} из {})", heading, i + 1, count)
                };
                blocks.push(Block::Paragraph(caption(&text)));
            }
        }

        let synthesis = text_of(data.get("conclusion")).unwrap_or_else(|| DEFAULT_SYNTHESIS.to_string());
        blocks.push(Block::Paragraph(
            Paragraph::with_text(synthesis).align(Alignment::Both),
        ));

        Ok(doc.insert_after(anchor, blocks))
    }
}
