//! In-memory word-processing document.
//!
//! A [`Document`] owns the package parts and a typed body. Everything the report engine does to a
//! template (filling fields, splitting paragraphs, inserting tables and pictures) goes through
//! this type, and [`Document::to_bytes`] produces the finished package.

use crate::body::{blocks_from_children, blocks_to_nodes};
use crate::media::{
    add_image_relationship, ensure_default_content_type, fit_to_width, prepare_image,
};
use crate::model::{Block, Drawing, Paragraph};
use crate::package::Package;
use crate::xml::{self, XmlElement, XmlNode};
use crate::{DocxError, DocxResult};

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
const MEDIA_DIR: &str = "word/media/";
const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// First `wp:docPr` id handed to generated pictures; well above what editors assign.
const FIRST_GENERATED_DOCPR_ID: u32 = 50_000;

const BLANK_CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#
);

const BLANK_ROOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#
);

const BLANK_DOCUMENT: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
    r#"<w:body><w:sectPr><w:pgSz w:w="11906" w:h="16838"/>"#,
    r#"<w:pgMar w:top="1134" w:right="850" w:bottom="1134" w:left="1701" w:header="708" w:footer="708" w:gutter="0"/>"#,
    r#"</w:sectPr></w:body></w:document>"#
);

/// A word-processing document loaded into memory.
#[derive(Debug, Clone)]
pub struct Document {
    package: Package,
    root: XmlElement,
    body: Vec<Block>,
    relationships: XmlElement,
    content_types: XmlElement,
    next_docpr_id: u32,
}

impl Document {
    /// Opens a packaged document.
    ///
    /// # Errors
    ///
    /// Returns [`DocxError`] if the package cannot be read, a required part is missing, or the
    /// main part has no `w:body`.
    pub fn open(bytes: &[u8]) -> DocxResult<Self> {
        let package = Package::read(bytes)?;
        Self::from_package(package)
    }

    /// Creates an empty A4 document.
    pub fn blank() -> Self {
        let mut package = Package::default();
        package.put(CONTENT_TYPES_PART, BLANK_CONTENT_TYPES.as_bytes().to_vec());
        package.put("_rels/.rels", BLANK_ROOT_RELS.as_bytes().to_vec());
        package.put(DOCUMENT_PART, BLANK_DOCUMENT.as_bytes().to_vec());
        match Self::from_package(package) {
            Ok(document) => document,
            // The blank parts are constants that always parse.
            Err(e) => unreachable!("blank document parts are invalid: {}", e),
        }
    }

    fn from_package(package: Package) -> DocxResult<Self> {
        let mut root = xml::parse(package.get_str(DOCUMENT_PART)?)?;
        let body_element = body_mut(&mut root)?;
        let body = blocks_from_children(&body_element.children);
        body_element.children.clear();

        let relationships = match package.get(DOCUMENT_RELS_PART) {
            Some(_) => xml::parse(package.get_str(DOCUMENT_RELS_PART)?)?,
            None => XmlElement::new("Relationships").with_attr("xmlns", RELATIONSHIPS_NS),
        };
        let content_types = xml::parse(package.get_str(CONTENT_TYPES_PART)?)?;

        Ok(Self {
            package,
            root,
            body,
            relationships,
            content_types,
            next_docpr_id: FIRST_GENERATED_DOCPR_ID,
        })
    }

    /// Top-level body blocks in document order.
    pub fn blocks(&self) -> &[Block] {
        &self.body
    }

    pub fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.body
    }

    /// Appends a block at the end of the body, before the final section properties.
    pub fn push(&mut self, block: impl Into<Block>) {
        let at = match self.body.last() {
            Some(Block::Other(e)) if e.name == "w:sectPr" => self.body.len() - 1,
            _ => self.body.len(),
        };
        self.body.insert(at, block.into());
    }

    /// Inserts `blocks` immediately after the block at `index`, keeping their order.
    ///
    /// Returns the index one past the last inserted block.
    pub fn insert_after(&mut self, index: usize, blocks: Vec<Block>) -> usize {
        let at = (index + 1).min(self.body.len());
        let count = blocks.len();
        self.body.splice(at..at, blocks);
        at + count
    }

    /// Replaces the block at `index` with `blocks`.
    pub fn replace(&mut self, index: usize, blocks: Vec<Block>) {
        if index < self.body.len() {
            self.body.splice(index..=index, blocks);
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<Block> {
        (index < self.body.len()).then(|| self.body.remove(index))
    }

    /// Index of the first top-level paragraph matching `predicate`.
    pub fn find_paragraph(&self, predicate: impl Fn(&Paragraph) -> bool) -> Option<usize> {
        self.body
            .iter()
            .position(|b| b.as_paragraph().is_some_and(&predicate))
    }

    /// Index of the first top-level paragraph whose visible text contains `needle`.
    pub fn find_paragraph_containing(&self, needle: &str) -> Option<usize> {
        self.find_paragraph(|p| p.text().contains(needle))
    }

    /// Index of the top-level paragraph that opens the bookmark `name`.
    pub fn find_bookmark(&self, name: &str) -> Option<usize> {
        self.find_paragraph(|p| p.bookmark_names().any(|n| n == name))
    }

    pub fn paragraph_mut(&mut self, index: usize) -> Option<&mut Paragraph> {
        match self.body.get_mut(index) {
            Some(Block::Paragraph(p)) => Some(p),
            _ => None,
        }
    }

    /// Stores an image in the package and returns a drawing that references it.
    ///
    /// The picture keeps its aspect ratio and is shrunk to `max_width_emu` when wider.
    ///
    /// # Errors
    ///
    /// Returns [`DocxError::Image`] if the bytes are not a decodable image.
    pub fn add_image(&mut self, bytes: &[u8], max_width_emu: u64) -> DocxResult<Drawing> {
        let image = prepare_image(bytes)?;

        let mut index = self
            .package
            .part_names()
            .filter(|n| n.starts_with(MEDIA_DIR))
            .count()
            + 1;
        let mut part_name = format!("{}report_image{}.{}", MEDIA_DIR, index, image.extension);
        while self.package.contains(&part_name) {
            index += 1;
            part_name = format!("{}report_image{}.{}", MEDIA_DIR, index, image.extension);
        }

        let target = part_name.trim_start_matches("word/").to_string();
        let relationship_id = add_image_relationship(&mut self.relationships, &target);
        ensure_default_content_type(&mut self.content_types, image.extension, image.content_type);

        let (width_emu, height_emu) = fit_to_width(image.width_px, image.height_px, max_width_emu);
        let docpr_id = self.next_docpr_id;
        self.next_docpr_id += 1;

        self.package.put(part_name, image.bytes);
        tracing::debug!("embedded image {} as {}", index, relationship_id);

        Ok(Drawing {
            relationship_id,
            docpr_id,
            name: format!("Picture {}", docpr_id),
            width_emu,
            height_emu,
        })
    }

    /// Number of image parts stored in the package.
    pub fn image_count(&self) -> usize {
        self.package
            .part_names()
            .filter(|n| n.starts_with(MEDIA_DIR))
            .count()
    }

    /// Serialises the document back to a packaged byte sequence.
    ///
    /// # Errors
    ///
    /// Returns [`DocxError::Package`] if the archive cannot be written.
    pub fn to_bytes(&self) -> DocxResult<Vec<u8>> {
        let mut root = self.root.clone();
        body_mut(&mut root)?.children = blocks_to_nodes(&self.body);

        let mut package = self.package.clone();
        package.put(DOCUMENT_PART, xml::write_document(&root).into_bytes());
        package.put(
            DOCUMENT_RELS_PART,
            xml::write_document(&self.relationships).into_bytes(),
        );
        package.put(
            CONTENT_TYPES_PART,
            xml::write_document(&self.content_types).into_bytes(),
        );
        package.write()
    }
}

fn body_mut(root: &mut XmlElement) -> DocxResult<&mut XmlElement> {
    root.children
        .iter_mut()
        .find_map(|node| match node {
            XmlNode::Element(e) if e.name == "w:body" => Some(e),
            _ => None,
        })
        .ok_or_else(|| DocxError::Xml("main document part has no w:body".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Run, Table, TableRow};
    use image::ImageOutputFormat;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_blank_document_has_only_section_properties() {
        let doc = Document::blank();
        assert_eq!(doc.blocks().len(), 1);
        assert!(matches!(&doc.blocks()[0], Block::Other(e) if e.name == "w:sectPr"));
    }

    #[test]
    fn test_push_keeps_section_properties_last() {
        let mut doc = Document::blank();
        doc.push(Paragraph::with_text("one"));
        doc.push(Paragraph::with_text("two"));
        assert_eq!(doc.blocks().len(), 3);
        assert_eq!(doc.blocks()[1].as_paragraph().unwrap().text(), "two");
    }

    #[test]
    fn test_round_trip_preserves_paragraphs_and_tables() {
        let mut doc = Document::blank();
        doc.push(Paragraph::with_text("Заключение эксперта"));
        doc.push(Table::bordered(2, 9000).add_row(TableRow::of_texts(["a", "b"])));

        let reopened = Document::open(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(reopened.blocks().len(), 3);
        assert_eq!(
            reopened.blocks()[0].as_paragraph().unwrap().text(),
            "Заключение эксперта"
        );
        let table = reopened.blocks()[1].as_table().unwrap();
        assert_eq!(table.rows[0].cells[1].text(), "b");
    }

    #[test]
    fn test_insert_after_keeps_order() {
        let mut doc = Document::blank();
        doc.push(Paragraph::with_text("anchor"));
        let end = doc.insert_after(
            0,
            vec![
                Paragraph::with_text("first").into(),
                Paragraph::with_text("second").into(),
            ],
        );
        assert_eq!(end, 3);
        let texts: Vec<_> = doc
            .blocks()
            .iter()
            .filter_map(Block::as_paragraph)
            .map(Paragraph::text)
            .collect();
        assert_eq!(texts, vec!["anchor", "first", "second"]);
    }

    #[test]
    fn test_add_image_registers_part_and_relationship() {
        let mut doc = Document::blank();
        let drawing = doc.add_image(&png(800, 400), 3_810_000).unwrap();
        assert_eq!(drawing.width_emu, 3_810_000);
        assert_eq!(drawing.height_emu, 1_905_000);
        doc.push(Paragraph::new().add_run(Run::with_drawing(drawing)));

        let bytes = doc.to_bytes().unwrap();
        let package = Package::read(&bytes).unwrap();
        assert!(package.contains("word/media/report_image1.png"));
        assert!(package
            .get_str(DOCUMENT_RELS_PART)
            .unwrap()
            .contains("media/report_image1.png"));
        assert!(package
            .get_str(CONTENT_TYPES_PART)
            .unwrap()
            .contains("Extension=\"png\""));

        let reopened = Document::open(&bytes).unwrap();
        assert_eq!(reopened.image_count(), 1);
    }

    #[test]
    fn test_find_bookmark() {
        let mut doc = Document::blank();
        doc.push(Paragraph::with_text("intro"));
        doc.push(Paragraph::new().add_inline(crate::model::Inline::BookmarkStart {
            id: "0".into(),
            name: "attachments".into(),
        }));
        assert_eq!(doc.find_bookmark("attachments"), Some(1));
        assert_eq!(doc.find_bookmark("other"), None);
    }
}
