use super::{bordered_table, label_value_row, title_row, ChecklistRenderer, RenderContext};
use crate::constants::{BUILDING_TEMPLATE, CONSTRUCTION_TEMPLATE, NOT_SPECIFIED};
use crate::model::ChecklistInstance;
use crate::registry::Strategy;
use crate::values::{field_lines, format_value, text_of};
use crate::CoreResult;
use rayon::prelude::*;
use report_docx::{Alignment, Block, Document, Paragraph, Run};
use serde_json::Value;

struct StructuralBlock {
    key: &'static str,
    title: &'static str,
    seed: &'static str,
    /// Whether the block is described together with facts from the building checklist.
    borrows_building_facts: bool,
}

const BLOCKS: [StructuralBlock; 5] = [
    StructuralBlock {
        key: "foundation",
        title: "Фундамент",
        seed: include_str!("../../resources/construction/foundation.txt"),
        borrows_building_facts: true,
    },
    StructuralBlock {
        key: "walls",
        title: "Стены",
        seed: include_str!("../../resources/construction/walls.txt"),
        borrows_building_facts: true,
    },
    StructuralBlock {
        key: "floors",
        title: "Перекрытия",
        seed: include_str!("../../resources/construction/floors.txt"),
        borrows_building_facts: false,
    },
    StructuralBlock {
        key: "roof",
        title: "Крыша и кровля",
        seed: include_str!("../../resources/construction/roof.txt"),
        borrows_building_facts: false,
    },
    StructuralBlock {
        key: "utilities",
        title: "Инженерные системы",
        seed: include_str!("../../resources/construction/utilities.txt"),
        borrows_building_facts: false,
    },
];

/// Building facts read from the building checklist, with their prompt labels.
const BUILDING_FACTS: [(&str, &str); 2] = [
    ("floors_count", "Этажность"),
    ("construction_year", "Год постройки"),
];

const CLOSING_NOTE: &str = "Описание конструктивных элементов составлено по результатам визуального \
                            осмотра без вскрытия конструкций и инструментального обследования.";
const CONCLUSION_PLACEHOLDER: &str = "Вывод: ______________________________________________";

/// Construction characteristics: one generated description per structural block.
#[derive(Debug, Default)]
pub struct ConstructionRenderer;

impl Strategy for ConstructionRenderer {
    fn handles(&self) -> &[&'static str] {
        &[CONSTRUCTION_TEMPLATE]
    }
}

fn prompt(seed: &str, facts: &[String]) -> String {
    format!("{}\n\nИсходные данные:\n{}", seed.trim(), facts.join("\n"))
}

impl ChecklistRenderer for ConstructionRenderer {
    fn render(
        &self,
        ctx: &RenderContext<'_>,
        doc: &mut Document,
        instance: &ChecklistInstance,
        anchor: usize,
    ) -> CoreResult<usize> {
        let data = instance.data_object()?;
        let building = ctx.related(instance, BUILDING_TEMPLATE)?.data_object()?;
        let generator = ctx.text_generator()?;
        let label = |key: &str| ctx.label(instance, key);

        let building_facts: Vec<String> = BUILDING_FACTS
            .iter()
            .filter_map(|(key, title)| {
                text_of(building.get(*key)).map(|value| format!("{}: {}", title, value))
            })
            .collect();

        let prompts: Vec<Option<String>> = BLOCKS
            .iter()
            .map(|block| {
                let mut facts = match data.get(block.key) {
                    Some(Value::Object(fields)) => field_lines(fields, &label),
                    Some(other) => {
                        let text = format_value(other, &label);
                        if text.is_empty() {
                            Vec::new()
                        } else {
                            vec![text]
                        }
                    }
                    None => Vec::new(),
                };
                if facts.is_empty() {
                    return None;
                }
                if block.borrows_building_facts {
                    facts.extend(building_facts.iter().cloned());
                }
                Some(prompt(block.seed, &facts))
            })
            .collect();

        let generated: Vec<CoreResult<String>> = ctx.generation_pool.install(|| {
            prompts
                .par_iter()
                .map(|prompt| match prompt {
                    Some(prompt) => generator.generate(prompt),
                    None => Ok(NOT_SPECIFIED.to_string()),
                })
                .collect()
        });

        let title = ctx
            .cache
            .template_name(instance.template_id)
            .unwrap_or(CONSTRUCTION_TEMPLATE);
        let mut table = bordered_table(2).add_row(title_row(title, 2));
        for (block, prose) in BLOCKS.iter().zip(generated) {
            table = table.add_row(label_value_row(block.title, &prose?));
        }

        let blocks = vec![
            Block::Table(table),
            Block::Paragraph(
                Paragraph::new()
                    .add_run(Run::with_text(CLOSING_NOTE).italic())
                    .align(Alignment::Both),
            ),
            Block::Paragraph(Paragraph::with_text(CONCLUSION_PLACEHOLDER)),
        ];
        Ok(doc.insert_after(anchor, blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{anchored_doc, TestEnv, BUILDING_ID, CONSTRUCTION_ID};
    use crate::{CoreError, CoreResult};
    use parking_lot::Mutex;
    use serde_json::json;

    fn rendered_rows(doc: &Document, anchor: usize) -> Vec<(String, String)> {
        doc.blocks()[anchor + 1].as_table().unwrap().rows[1..]
            .iter()
            .map(|r| (r.cells[0].text(), r.cells[1].text()))
            .collect()
    }

    #[test]
    fn test_each_block_is_generated_in_order() {
        let mut env = TestEnv::new();
        let instance = env.instance(
            CONSTRUCTION_ID,
            json!({
                "foundation": {"type": "ленточный"},
                "walls": {"material": "кирпич"},
                "floors": {"type": "железобетонные плиты"},
                "roof": {"covering": "металлочерепица"},
                "utilities": "электроснабжение"
            }),
        );
        let building = env.sibling(
            &instance,
            BUILDING_ID,
            json!({"floors_count": 2, "construction_year": "1985"}),
        );
        env.instances.push(building);
        let prompts = Mutex::new(Vec::new());
        let generator = |prompt: &str| -> CoreResult<String> {
            prompts.lock().push(prompt.to_string());
            let first_fact = prompt.split("Исходные данные:\n").nth(1).unwrap_or_default();
            Ok(format!("Описание: {}", first_fact.lines().next().unwrap_or_default()))
        };
        let (mut doc, anchor) = anchored_doc();

        let end = ConstructionRenderer
            .render(&env.ctx(Some(&generator)), &mut doc, &instance, anchor)
            .unwrap();

        assert_eq!(end, anchor + 4);
        assert_eq!(
            rendered_rows(&doc, anchor),
            vec![
                ("Фундамент".to_string(), "Описание: type: ленточный".to_string()),
                ("Стены".to_string(), "Описание: Материал: кирпич".to_string()),
                ("Перекрытия".to_string(), "Описание: type: железобетонные плиты".to_string()),
                ("Крыша и кровля".to_string(), "Описание: covering: металлочерепица".to_string()),
                ("Инженерные системы".to_string(), "Описание: электроснабжение".to_string()),
            ]
        );

        let prompts = prompts.into_inner();
        assert_eq!(prompts.len(), 5);
        let borrowing = prompts.iter().filter(|p| p.contains("Год постройки: 1985")).count();
        assert_eq!(borrowing, 2);
        assert!(doc.blocks()[end - 1]
            .as_paragraph()
            .unwrap()
            .text()
            .starts_with("Вывод:"));
    }

    #[test]
    fn test_block_without_data_is_not_generated() {
        let mut env = TestEnv::new();
        let instance = env.instance(CONSTRUCTION_ID, json!({"roof": {"covering": "шифер"}}));
        let building = env.sibling(&instance, BUILDING_ID, json!({}));
        env.instances.push(building);
        let generator = |_: &str| -> CoreResult<String> { Ok("текст".into()) };
        let (mut doc, anchor) = anchored_doc();

        ConstructionRenderer
            .render(&env.ctx(Some(&generator)), &mut doc, &instance, anchor)
            .unwrap();

        let rows = rendered_rows(&doc, anchor);
        assert_eq!(rows[0].1, "не указано");
        assert_eq!(rows[3].1, "текст");
    }

    #[test]
    fn test_generation_failure_aborts_render() {
        let mut env = TestEnv::new();
        let instance = env.instance(CONSTRUCTION_ID, json!({"walls": {"material": "брус"}}));
        let building = env.sibling(&instance, BUILDING_ID, json!({}));
        env.instances.push(building);
        let generator =
            |_: &str| -> CoreResult<String> { Err(CoreError::TextGeneration("timeout".into())) };
        let (mut doc, anchor) = anchored_doc();

        let err = ConstructionRenderer
            .render(&env.ctx(Some(&generator)), &mut doc, &instance, anchor)
            .unwrap_err();
        assert!(matches!(err, CoreError::TextGeneration(_)));
        assert_eq!(doc.blocks().len(), 2);
    }

    #[test]
    fn test_missing_building_checklist_is_an_error() {
        let env = TestEnv::new();
        let instance = env.instance(CONSTRUCTION_ID, json!({}));
        let generator = |_: &str| -> CoreResult<String> { Ok(String::new()) };
        let (mut doc, anchor) = anchored_doc();
        assert!(matches!(
            ConstructionRenderer.render(&env.ctx(Some(&generator)), &mut doc, &instance, anchor),
            Err(CoreError::MissingRelatedChecklist { .. })
        ));
    }

    #[test]
    fn test_generation_runs_on_the_configured_pool() {
        let mut env = TestEnv::with_config(|c| c.with_text_generation_concurrency(1));
        let instance = env.instance(
            CONSTRUCTION_ID,
            json!({"foundation": "ленточный", "walls": "кирпич", "roof": "шифер"}),
        );
        let building = env.sibling(&instance, BUILDING_ID, json!({}));
        env.instances.push(building);
        let threads = Mutex::new(Vec::new());
        let generator = |_: &str| -> CoreResult<String> {
            let name = std::thread::current().name().unwrap_or_default().to_string();
            threads.lock().push(name);
            Ok("текст".into())
        };
        let (mut doc, anchor) = anchored_doc();

        ConstructionRenderer
            .render(&env.ctx(Some(&generator)), &mut doc, &instance, anchor)
            .unwrap();

        let threads = threads.into_inner();
        assert_eq!(threads.len(), 3);
        assert!(threads.iter().all(|t| t == "text-generation-0"));
    }

    #[test]
    fn test_seeds_are_bundled() {
        assert!(BLOCKS.iter().all(|b| !b.seed.trim().is_empty()));
    }
}
