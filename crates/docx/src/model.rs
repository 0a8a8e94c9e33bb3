//! Typed view of a document body.
//!
//! The body is an ordered list of [`Block`]s. Paragraphs and tables are modelled explicitly so
//! the engine can search, split and insert content; everything else is carried as an opaque
//! [`XmlElement`] and written back untouched.

use crate::xml::XmlElement;

/// Top-level or cell-level block content.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    Other(XmlElement),
}

impl Block {
    pub fn as_paragraph(&self) -> Option<&Paragraph> {
        match self {
            Block::Paragraph(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Block::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Paragraph> for Block {
    fn from(p: Paragraph) -> Self {
        Block::Paragraph(p)
    }
}

impl From<Table> for Block {
    fn from(t: Table) -> Self {
        Block::Table(t)
    }
}

/// Horizontal alignment written to `w:jc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
    Both,
}

impl Alignment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Both => "both",
        }
    }
}

/// A paragraph: optional `w:pPr` and inline content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    pub properties: Option<XmlElement>,
    pub content: Vec<Inline>,
}

/// Paragraph-level content.
#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Run(Run),
    Field(Field),
    BookmarkStart { id: String, name: String },
    Other(XmlElement),
}

/// How a field was written in the source markup, so it can be written back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldForm {
    /// `w:fldSimple`
    Simple,
    /// `w:fldChar` begin / `w:instrText` / separate / result / end
    Complex,
}

/// A field collapsed from either markup form.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub form: FieldForm,
    pub instruction: String,
    /// Run properties of the run carrying the field begin marker (complex form only).
    pub run_properties: Option<XmlElement>,
    pub result: Vec<Run>,
}

impl Field {
    /// Returns the merge-field name when this is a `MERGEFIELD` instruction.
    ///
    /// `MERGEFIELD  "client name" \* MERGEFORMAT` yields `client name`.
    pub fn merge_field_name(&self) -> Option<String> {
        let instruction = self.instruction.trim();
        let rest = instruction
            .split_once(char::is_whitespace)
            .filter(|(head, _)| head.eq_ignore_ascii_case("MERGEFIELD"))
            .map(|(_, rest)| rest.trim_start())?;

        let name = if let Some(quoted) = rest.strip_prefix('"') {
            quoted.split('"').next().unwrap_or_default()
        } else {
            rest.split_whitespace().next().unwrap_or_default()
        };

        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Text currently displayed as the field result.
    pub fn result_text(&self) -> String {
        self.result.iter().map(Run::text).collect()
    }
}

/// A run: optional `w:rPr` and run content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Run {
    pub properties: Option<XmlElement>,
    pub content: Vec<RunItem>,
}

/// Run-level content.
#[derive(Debug, Clone, PartialEq)]
pub enum RunItem {
    Text(String),
    Break,
    Tab,
    Drawing(Drawing),
    /// `w:fldChar` and `w:instrText` survive only until fields are collapsed.
    FieldChar(FieldCharKind),
    InstrText(String),
    Other(XmlElement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCharKind {
    Begin,
    Separate,
    End,
}

/// An inline picture that references an image part through a relationship id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drawing {
    pub relationship_id: String,
    pub docpr_id: u32,
    pub name: String,
    pub width_emu: u64,
    pub height_emu: u64,
}

/// A table with optional `w:tblPr`/`w:tblGrid` and its rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub properties: Option<XmlElement>,
    pub grid: Option<XmlElement>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    pub properties: Option<XmlElement>,
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableCell {
    pub properties: Option<XmlElement>,
    pub blocks: Vec<Block>,
}

impl Paragraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A paragraph holding one plain run. Newlines become line breaks.
    pub fn with_text(text: impl AsRef<str>) -> Self {
        Self::new().add_run(Run::with_text(text))
    }

    #[must_use]
    pub fn add_run(mut self, run: Run) -> Self {
        self.content.push(Inline::Run(run));
        self
    }

    #[must_use]
    pub fn add_inline(mut self, inline: Inline) -> Self {
        self.content.push(inline);
        self
    }

    /// Sets paragraph alignment, creating `w:pPr` when missing.
    #[must_use]
    pub fn align(mut self, alignment: Alignment) -> Self {
        let props = self
            .properties
            .get_or_insert_with(|| XmlElement::new("w:pPr"));
        props.children.retain(|node| {
            !matches!(node, crate::xml::XmlNode::Element(e) if e.name == "w:jc")
        });
        props.children.push(crate::xml::XmlNode::Element(
            XmlElement::new("w:jc").with_attr("w:val", alignment.as_str()),
        ));
        self
    }

    /// Visible text: run text plus the displayed result of fields.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for inline in &self.content {
            match inline {
                Inline::Run(run) => out.push_str(&run.text()),
                Inline::Field(field) => out.push_str(&field.result_text()),
                _ => {}
            }
        }
        out
    }

    /// Properties of the first run, used when rebuilding a paragraph's text.
    pub fn first_run_properties(&self) -> Option<XmlElement> {
        self.content.iter().find_map(|inline| match inline {
            Inline::Run(run) => run.properties.clone(),
            _ => None,
        })
    }

    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.content.iter().filter_map(|inline| match inline {
            Inline::Run(run) => Some(run),
            _ => None,
        })
    }

    pub fn has_drawing(&self) -> bool {
        self.runs()
            .any(|run| run.content.iter().any(|i| matches!(i, RunItem::Drawing(_))))
    }

    pub fn bookmark_names(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|inline| match inline {
            Inline::BookmarkStart { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Replaces every occurrence of `from` with `to` in the paragraph's run text.
    ///
    /// Occurrences confined to a single text item are edited in place so surrounding formatting
    /// is kept. An occurrence split across runs collapses the plain runs into one run carrying the
    /// first run's properties. Returns whether anything was replaced.
    pub fn replace_text(&mut self, from: &str, to: &str) -> bool {
        if from.is_empty() || !self.text().contains(from) {
            return false;
        }

        let mut replaced = false;
        for inline in &mut self.content {
            if let Inline::Run(run) = inline {
                for item in &mut run.content {
                    if let RunItem::Text(text) = item {
                        if text.contains(from) {
                            *text = text.replace(from, to);
                            replaced = true;
                        }
                    }
                }
            }
        }

        if self.text().contains(from) {
            let merged = self.text().replace(from, to);
            let properties = self.first_run_properties();
            self.content
                .retain(|inline| !matches!(inline, Inline::Run(_) | Inline::Field(_)));
            let mut run = Run::with_text(merged);
            run.properties = properties;
            self.content.push(Inline::Run(run));
            replaced = true;
        }

        replaced
    }
}

impl Run {
    pub fn new() -> Self {
        Self::default()
    }

    /// A run holding `text`; `\n` becomes a line break.
    pub fn with_text(text: impl AsRef<str>) -> Self {
        let mut run = Self::new();
        for (i, line) in text.as_ref().split('\n').enumerate() {
            if i > 0 {
                run.content.push(RunItem::Break);
            }
            if !line.is_empty() {
                run.content.push(RunItem::Text(line.to_string()));
            }
        }
        run
    }

    pub fn with_drawing(drawing: Drawing) -> Self {
        Self {
            properties: None,
            content: vec![RunItem::Drawing(drawing)],
        }
    }

    #[must_use]
    pub fn bold(self) -> Self {
        self.with_property(XmlElement::new("w:b"))
    }

    #[must_use]
    pub fn italic(self) -> Self {
        self.with_property(XmlElement::new("w:i"))
    }

    /// Sets the font colour as a hex RGB string such as `FF0000`.
    #[must_use]
    pub fn color(self, hex: &str) -> Self {
        self.with_property(XmlElement::new("w:color").with_attr("w:val", hex))
    }

    fn with_property(mut self, property: XmlElement) -> Self {
        let props = self
            .properties
            .get_or_insert_with(|| XmlElement::new("w:rPr"));
        props.children.retain(|node| {
            !matches!(node, crate::xml::XmlNode::Element(e) if e.name == property.name)
        });
        props.children.push(crate::xml::XmlNode::Element(property));
        self
    }

    /// Visible text; breaks and tabs read as `\n` and `\t`.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for item in &self.content {
            match item {
                RunItem::Text(t) => out.push_str(t),
                RunItem::Break => out.push('\n'),
                RunItem::Tab => out.push('\t'),
                _ => {}
            }
        }
        out
    }
}

impl Table {
    /// Creates a table with a single-line border on every edge and an even grid of `columns`.
    pub fn bordered(columns: usize, width_twips: u32) -> Self {
        let mut borders = XmlElement::new("w:tblBorders");
        for edge in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
            borders = borders.with_child(
                XmlElement::new(edge)
                    .with_attr("w:val", "single")
                    .with_attr("w:sz", "4")
                    .with_attr("w:space", "0")
                    .with_attr("w:color", "auto"),
            );
        }
        let properties = XmlElement::new("w:tblPr")
            .with_child(
                XmlElement::new("w:tblW")
                    .with_attr("w:w", width_twips.to_string())
                    .with_attr("w:type", "dxa"),
            )
            .with_child(borders)
            .with_child(XmlElement::new("w:tblLayout").with_attr("w:type", "fixed"));

        let columns = columns.max(1);
        let column_width = width_twips / columns as u32;
        let mut grid = XmlElement::new("w:tblGrid");
        for _ in 0..columns {
            grid = grid.with_child(
                XmlElement::new("w:gridCol").with_attr("w:w", column_width.to_string()),
            );
        }

        Self {
            properties: Some(properties),
            grid: Some(grid),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_row(mut self, row: TableRow) -> Self {
        self.rows.push(row);
        self
    }

    pub fn column_count(&self) -> usize {
        self.grid
            .as_ref()
            .map(|g| g.elements().filter(|e| e.name == "w:gridCol").count())
            .filter(|n| *n > 0)
            .unwrap_or_else(|| self.rows.iter().map(|r| r.cells.len()).max().unwrap_or(0))
    }
}

impl TableRow {
    pub fn new(cells: Vec<TableCell>) -> Self {
        Self {
            properties: None,
            cells,
        }
    }

    /// A row of plain-text cells.
    pub fn of_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(texts.into_iter().map(TableCell::with_text).collect())
    }

    /// Marks the row as a header row repeated on each page.
    #[must_use]
    pub fn header(mut self) -> Self {
        self.properties = Some(XmlElement::new("w:trPr").with_child(XmlElement::new("w:tblHeader")));
        self
    }
}

impl TableCell {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            properties: None,
            blocks,
        }
    }

    pub fn with_text(text: impl AsRef<str>) -> Self {
        Self::new(vec![Block::Paragraph(Paragraph::with_text(text))])
    }

    pub fn with_paragraph(paragraph: Paragraph) -> Self {
        Self::new(vec![Block::Paragraph(paragraph)])
    }

    /// Spans the cell across `columns` grid columns.
    #[must_use]
    pub fn span(mut self, columns: usize) -> Self {
        if columns > 1 {
            let props = self
                .properties
                .get_or_insert_with(|| XmlElement::new("w:tcPr"));
            props.children.push(crate::xml::XmlNode::Element(
                XmlElement::new("w:gridSpan").with_attr("w:val", columns.to_string()),
            ));
        }
        self
    }

    /// Visible text of all paragraphs in the cell, newline separated.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(Block::as_paragraph)
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every cell carries at least one paragraph in valid markup.
    pub(crate) fn ensure_paragraph(&mut self) {
        if !self
            .blocks
            .iter()
            .any(|b| matches!(b, Block::Paragraph(_)))
        {
            self.blocks.push(Block::Paragraph(Paragraph::new()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(instruction: &str) -> Field {
        Field {
            form: FieldForm::Simple,
            instruction: instruction.into(),
            run_properties: None,
            result: vec![Run::with_text("«x»")],
        }
    }

    #[test]
    fn test_merge_field_name_plain_and_quoted() {
        assert_eq!(
            field(" MERGEFIELD expertiseNumber \\* MERGEFORMAT ").merge_field_name(),
            Some("expertiseNumber".into())
        );
        assert_eq!(
            field("MERGEFIELD \"expert name\"").merge_field_name(),
            Some("expert name".into())
        );
        assert_eq!(field("PAGE").merge_field_name(), None);
        assert_eq!(field("MERGEFIELD").merge_field_name(), None);
    }

    #[test]
    fn test_run_with_text_turns_newlines_into_breaks() {
        let run = Run::with_text("a\nb");
        assert_eq!(
            run.content,
            vec![
                RunItem::Text("a".into()),
                RunItem::Break,
                RunItem::Text("b".into())
            ]
        );
        assert_eq!(run.text(), "a\nb");
    }

    #[test]
    fn test_replace_text_within_single_run() {
        let mut p = Paragraph::with_text("see [PHOTO_1] here");
        assert!(p.replace_text("[PHOTO_1]", ""));
        assert_eq!(p.text(), "see  here");
    }

    #[test]
    fn test_replace_text_across_runs() {
        let mut p = Paragraph::new()
            .add_run(Run::with_text("[CHECK").bold())
            .add_run(Run::with_text("LIST_1]"));
        assert!(p.replace_text("[CHECKLIST_1]", ""));
        assert_eq!(p.text(), "");
        assert!(!p.replace_text("absent", "x"));
    }

    #[test]
    fn test_bordered_table_column_count() {
        let table = Table::bordered(2, 9000).add_row(TableRow::of_texts(["a", "b"]));
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.rows[0].cells[1].text(), "b");
    }
}
