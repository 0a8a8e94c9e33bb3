//! Conversion between `w:body` markup and the typed [`Block`] model.
//!
//! Reading is lenient: anything that does not fit the model is kept as an opaque element. A
//! table whose rows carry unexpected children is kept whole, so its layout survives untouched.

use crate::media::drawing_xml;
use crate::model::{
    Block, Field, FieldCharKind, FieldForm, Inline, Paragraph, Run, RunItem, Table, TableCell,
    TableRow,
};
use crate::xml::{XmlElement, XmlNode};

pub(crate) fn blocks_from_children(children: &[XmlNode]) -> Vec<Block> {
    children
        .iter()
        .filter_map(|node| match node {
            XmlNode::Element(e) => Some(block_from_element(e)),
            _ => None,
        })
        .collect()
}

fn block_from_element(element: &XmlElement) -> Block {
    match element.name.as_str() {
        "w:p" => Block::Paragraph(paragraph_from_element(element)),
        "w:tbl" => table_from_element(element)
            .map(Block::Table)
            .unwrap_or_else(|| Block::Other(element.clone())),
        _ => Block::Other(element.clone()),
    }
}

fn paragraph_from_element(element: &XmlElement) -> Paragraph {
    let mut paragraph = Paragraph::new();
    for child in element.elements() {
        match child.name.as_str() {
            "w:pPr" => paragraph.properties = Some(child.clone()),
            "w:r" => paragraph.content.push(Inline::Run(run_from_element(child))),
            "w:fldSimple" => paragraph.content.push(Inline::Field(Field {
                form: FieldForm::Simple,
                instruction: child.attr("w:instr").unwrap_or_default().to_string(),
                run_properties: None,
                result: child
                    .elements()
                    .filter(|e| e.name == "w:r")
                    .map(run_from_element)
                    .collect(),
            })),
            "w:bookmarkStart" => paragraph.content.push(Inline::BookmarkStart {
                id: child.attr("w:id").unwrap_or_default().to_string(),
                name: child.attr("w:name").unwrap_or_default().to_string(),
            }),
            _ => paragraph.content.push(Inline::Other(child.clone())),
        }
    }
    paragraph.content = collapse_complex_fields(paragraph.content);
    paragraph
}

fn run_from_element(element: &XmlElement) -> Run {
    let mut run = Run::new();
    for child in element.elements() {
        let item = match child.name.as_str() {
            "w:rPr" => {
                run.properties = Some(child.clone());
                continue;
            }
            "w:t" => RunItem::Text(child.text_content()),
            "w:br" | "w:cr" if child.attr("w:type").map_or(true, |t| t == "textWrapping") => {
                RunItem::Break
            }
            "w:tab" => RunItem::Tab,
            "w:instrText" => RunItem::InstrText(child.text_content()),
            "w:fldChar" => match child.attr("w:fldCharType") {
                Some("begin") => RunItem::FieldChar(FieldCharKind::Begin),
                Some("separate") => RunItem::FieldChar(FieldCharKind::Separate),
                Some("end") => RunItem::FieldChar(FieldCharKind::End),
                _ => RunItem::Other(child.clone()),
            },
            _ => RunItem::Other(child.clone()),
        };
        run.content.push(item);
    }
    run
}

fn table_from_element(element: &XmlElement) -> Option<Table> {
    let mut table = Table::default();
    for child in element.elements() {
        match child.name.as_str() {
            "w:tblPr" => table.properties = Some(child.clone()),
            "w:tblGrid" => table.grid = Some(child.clone()),
            "w:tr" => table.rows.push(row_from_element(child)?),
            _ => return None,
        }
    }
    Some(table)
}

fn row_from_element(element: &XmlElement) -> Option<TableRow> {
    let mut row = TableRow::default();
    for child in element.elements() {
        match child.name.as_str() {
            "w:trPr" => row.properties = Some(child.clone()),
            "w:tc" => {
                let mut cell = TableCell::default();
                for cell_child in child.elements() {
                    if cell_child.name == "w:tcPr" {
                        cell.properties = Some(cell_child.clone());
                    } else {
                        cell.blocks.push(block_from_element(cell_child));
                    }
                }
                row.cells.push(cell);
            }
            _ => return None,
        }
    }
    Some(row)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FieldState {
    Instruction,
    Result,
}

struct PendingField {
    field: Field,
    state: FieldState,
}

/// Folds `w:fldChar` begin/separate/end sequences into [`Inline::Field`].
///
/// Nested fields and fields left open at the end of the paragraph are not collapsed; the
/// original inline content is returned unchanged in those cases.
fn collapse_complex_fields(content: Vec<Inline>) -> Vec<Inline> {
    let has_field_chars = content.iter().any(|inline| {
        matches!(inline, Inline::Run(run) if run.content.iter().any(|i| matches!(i, RunItem::FieldChar(_))))
    });
    if !has_field_chars {
        return content;
    }

    let original = content.clone();
    let mut out: Vec<Inline> = Vec::with_capacity(content.len());
    let mut pending: Option<PendingField> = None;

    for inline in content {
        let run = match inline {
            Inline::Run(run) => run,
            other => {
                out.push(other);
                continue;
            }
        };

        let mut outside = Run {
            properties: run.properties.clone(),
            content: Vec::new(),
        };
        let mut result = Run {
            properties: run.properties.clone(),
            content: Vec::new(),
        };

        for item in run.content {
            let mut begin = false;
            let mut finished = false;
            match pending.as_mut() {
                None => match item {
                    RunItem::FieldChar(FieldCharKind::Begin) => begin = true,
                    RunItem::FieldChar(_) => return original,
                    item => outside.content.push(item),
                },
                Some(p) => match item {
                    RunItem::FieldChar(FieldCharKind::Begin) => return original,
                    RunItem::FieldChar(FieldCharKind::Separate) => p.state = FieldState::Result,
                    RunItem::FieldChar(FieldCharKind::End) => {
                        if !result.content.is_empty() {
                            p.field.result.push(Run {
                                properties: result.properties.clone(),
                                content: std::mem::take(&mut result.content),
                            });
                        }
                        finished = true;
                    }
                    RunItem::InstrText(text) if p.state == FieldState::Instruction => {
                        p.field.instruction.push_str(&text);
                    }
                    item => {
                        if p.state == FieldState::Result {
                            result.content.push(item);
                        }
                    }
                },
            }

            if begin {
                if !outside.content.is_empty() {
                    out.push(Inline::Run(Run {
                        properties: outside.properties.clone(),
                        content: std::mem::take(&mut outside.content),
                    }));
                }
                pending = Some(PendingField {
                    field: Field {
                        form: FieldForm::Complex,
                        instruction: String::new(),
                        run_properties: run.properties.clone(),
                        result: Vec::new(),
                    },
                    state: FieldState::Instruction,
                });
            }
            if finished {
                if let Some(done) = pending.take() {
                    out.push(Inline::Field(done.field));
                }
            }
        }

        if let Some(p) = pending.as_mut() {
            if !result.content.is_empty() {
                p.field.result.push(result);
            }
        }
        if !outside.content.is_empty() {
            out.push(Inline::Run(outside));
        }
    }

    if pending.is_some() {
        return original;
    }
    out
}

pub(crate) fn blocks_to_nodes(blocks: &[Block]) -> Vec<XmlNode> {
    blocks
        .iter()
        .map(|block| XmlNode::Element(block_to_element(block)))
        .collect()
}

fn block_to_element(block: &Block) -> XmlElement {
    match block {
        Block::Paragraph(p) => paragraph_to_element(p),
        Block::Table(t) => table_to_element(t),
        Block::Other(e) => e.clone(),
    }
}

fn paragraph_to_element(paragraph: &Paragraph) -> XmlElement {
    let mut element = XmlElement::new("w:p");
    if let Some(props) = &paragraph.properties {
        element.children.push(XmlNode::Element(props.clone()));
    }
    for inline in &paragraph.content {
        match inline {
            Inline::Run(run) => element.children.push(XmlNode::Element(run_to_element(run))),
            Inline::Field(field) => element.children.extend(field_to_nodes(field)),
            Inline::BookmarkStart { id, name } => element.children.push(XmlNode::Element(
                XmlElement::new("w:bookmarkStart")
                    .with_attr("w:id", id.as_str())
                    .with_attr("w:name", name.as_str()),
            )),
            Inline::Other(e) => element.children.push(XmlNode::Element(e.clone())),
        }
    }
    element
}

fn field_to_nodes(field: &Field) -> Vec<XmlNode> {
    match field.form {
        FieldForm::Simple => {
            let mut simple =
                XmlElement::new("w:fldSimple").with_attr("w:instr", field.instruction.as_str());
            for run in &field.result {
                simple.children.push(XmlNode::Element(run_to_element(run)));
            }
            vec![XmlNode::Element(simple)]
        }
        FieldForm::Complex => {
            let marker = |item: RunItem| {
                XmlNode::Element(run_to_element(&Run {
                    properties: field.run_properties.clone(),
                    content: vec![item],
                }))
            };
            let mut nodes = vec![
                marker(RunItem::FieldChar(FieldCharKind::Begin)),
                marker(RunItem::InstrText(field.instruction.clone())),
                marker(RunItem::FieldChar(FieldCharKind::Separate)),
            ];
            nodes.extend(
                field
                    .result
                    .iter()
                    .map(|run| XmlNode::Element(run_to_element(run))),
            );
            nodes.push(marker(RunItem::FieldChar(FieldCharKind::End)));
            nodes
        }
    }
}

fn run_to_element(run: &Run) -> XmlElement {
    let mut element = XmlElement::new("w:r");
    if let Some(props) = &run.properties {
        element.children.push(XmlNode::Element(props.clone()));
    }
    for item in &run.content {
        let node = match item {
            RunItem::Text(text) => XmlNode::Element(
                XmlElement::new("w:t")
                    .with_attr("xml:space", "preserve")
                    .with_text(text.as_str()),
            ),
            RunItem::Break => XmlNode::Element(XmlElement::new("w:br")),
            RunItem::Tab => XmlNode::Element(XmlElement::new("w:tab")),
            RunItem::Drawing(drawing) => XmlNode::Raw(drawing_xml(drawing)),
            RunItem::FieldChar(kind) => XmlNode::Element(XmlElement::new("w:fldChar").with_attr(
                "w:fldCharType",
                match kind {
                    FieldCharKind::Begin => "begin",
                    FieldCharKind::Separate => "separate",
                    FieldCharKind::End => "end",
                },
            )),
            RunItem::InstrText(text) => XmlNode::Element(
                XmlElement::new("w:instrText")
                    .with_attr("xml:space", "preserve")
                    .with_text(text.as_str()),
            ),
            RunItem::Other(e) => XmlNode::Element(e.clone()),
        };
        element.children.push(node);
    }
    element
}

fn table_to_element(table: &Table) -> XmlElement {
    let mut element = XmlElement::new("w:tbl");
    element.children.push(XmlNode::Element(
        table
            .properties
            .clone()
            .unwrap_or_else(|| XmlElement::new("w:tblPr")),
    ));

    let grid = table.grid.clone().unwrap_or_else(|| {
        let mut grid = XmlElement::new("w:tblGrid");
        for _ in 0..table.column_count().max(1) {
            grid = grid.with_child(XmlElement::new("w:gridCol"));
        }
        grid
    });
    element.children.push(XmlNode::Element(grid));

    for row in &table.rows {
        let mut tr = XmlElement::new("w:tr");
        if let Some(props) = &row.properties {
            tr.children.push(XmlNode::Element(props.clone()));
        }
        for cell in &row.cells {
            let mut cell = cell.clone();
            cell.ensure_paragraph();
            let mut tc = XmlElement::new("w:tc");
            if let Some(props) = &cell.properties {
                tc.children.push(XmlNode::Element(props.clone()));
            }
            tc.children.extend(blocks_to_nodes(&cell.blocks));
            tr.children.push(XmlNode::Element(tc));
        }
        element.children.push(XmlNode::Element(tr));
    }
    element
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;
    use pretty_assertions::assert_eq;

    const W: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

    fn paragraph(xml: &str) -> Paragraph {
        let element = parse(&format!("<w:p {}>{}</w:p>", W, xml)).unwrap();
        paragraph_from_element(&element)
    }

    #[test]
    fn test_simple_field_is_recognised() {
        let p = paragraph(
            r#"<w:fldSimple w:instr=" MERGEFIELD city "><w:r><w:t>«city»</w:t></w:r></w:fldSimple>"#,
        );
        match &p.content[0] {
            Inline::Field(f) => {
                assert_eq!(f.form, FieldForm::Simple);
                assert_eq!(f.merge_field_name().as_deref(), Some("city"));
                assert_eq!(f.result_text(), "«city»");
            }
            other => panic!("expected field, got {:?}", other),
        }
    }

    #[test]
    fn test_complex_field_is_collapsed() {
        let p = paragraph(concat!(
            r#"<w:r><w:t>Before </w:t></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>"#,
            r#"<w:r><w:instrText> MERGEFIELD name </w:instrText></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r>"#,
            r#"<w:r><w:t>«name»</w:t></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="end"/></w:r>"#,
            r#"<w:r><w:t> after</w:t></w:r>"#,
        ));
        assert_eq!(p.content.len(), 3);
        assert_eq!(p.text(), "Before «name» after");
        match &p.content[1] {
            Inline::Field(f) => {
                assert_eq!(f.form, FieldForm::Complex);
                assert_eq!(f.merge_field_name().as_deref(), Some("name"));
            }
            other => panic!("expected field, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_field_is_left_alone() {
        let p = paragraph(concat!(
            r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>"#,
            r#"<w:r><w:instrText> MERGEFIELD name </w:instrText></w:r>"#,
        ));
        assert!(p.content.iter().all(|i| matches!(i, Inline::Run(_))));
    }

    #[test]
    fn test_complex_field_round_trips_through_markup() {
        let p = paragraph(concat!(
            r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>"#,
            r#"<w:r><w:instrText> MERGEFIELD a </w:instrText></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r>"#,
            r#"<w:r><w:t>«a»</w:t></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="end"/></w:r>"#,
        ));
        let again = paragraph_from_element(&paragraph_to_element(&p));
        assert_eq!(p, again);
    }

    #[test]
    fn test_table_with_unknown_row_children_is_opaque() {
        let element = parse(&format!(
            "<w:tbl {}><w:tr><w:sdt/></w:tr></w:tbl>",
            W
        ))
        .unwrap();
        assert!(matches!(block_from_element(&element), Block::Other(_)));
    }

    #[test]
    fn test_table_cells_keep_paragraphs() {
        let element = parse(&format!(
            "<w:tbl {}><w:tblPr/><w:tr><w:tc><w:p><w:r><w:t>x</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
            W
        ))
        .unwrap();
        let table = match block_from_element(&element) {
            Block::Table(t) => t,
            other => panic!("expected table, got {:?}", other),
        };
        assert_eq!(table.rows[0].cells[0].text(), "x");
    }
}
