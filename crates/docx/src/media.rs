//! Image parts, relationships and inline drawing markup.

use crate::model::Drawing;
use crate::xml::{XmlElement, XmlNode};
use crate::{DocxError, DocxResult};
#[allow(unused_imports)]
use image::GenericImageView;
use image::{ImageFormat, ImageOutputFormat};
use std::io::Cursor;

pub(crate) const IMAGE_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// English Metric Units per pixel at 96 DPI.
pub const EMU_PER_PIXEL: u64 = 9_525;

/// Usable width of an A4 portrait page with 2 cm + 1.5 cm margins, in EMU.
pub const PAGE_CONTENT_WIDTH_EMU: u64 = 6_120_000;

/// An image ready to be stored as a package part.
#[derive(Debug, Clone)]
pub(crate) struct PreparedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
    pub content_type: &'static str,
    pub width_px: u32,
    pub height_px: u32,
}

/// Detects the image format and reads its dimensions.
///
/// PNG and JPEG are stored as-is; any other decodable format is re-encoded as PNG so every
/// consumer of the document can display it.
pub(crate) fn prepare_image(bytes: &[u8]) -> DocxResult<PreparedImage> {
    let format = image::guess_format(bytes)
        .map_err(|e| DocxError::Image(format!("unrecognised image data: {}", e)))?;

    match format {
        ImageFormat::Png | ImageFormat::Jpeg => {
            let (width_px, height_px) = image::io::Reader::with_format(Cursor::new(bytes), format)
                .into_dimensions()
                .map_err(|e| DocxError::Image(format!("cannot read image size: {}", e)))?;
            let (extension, content_type) = if format == ImageFormat::Png {
                ("png", "image/png")
            } else {
                ("jpeg", "image/jpeg")
            };
            Ok(PreparedImage {
                bytes: bytes.to_vec(),
                extension,
                content_type,
                width_px,
                height_px,
            })
        }
        _ => {
            let decoded = image::load_from_memory_with_format(bytes, format)
                .map_err(|e| DocxError::Image(format!("cannot decode image: {}", e)))?;
            let mut png = Vec::new();
            decoded
                .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
                .map_err(|e| DocxError::Image(format!("cannot encode PNG: {}", e)))?;
            Ok(PreparedImage {
                bytes: png,
                extension: "png",
                content_type: "image/png",
                width_px: decoded.width(),
                height_px: decoded.height(),
            })
        }
    }
}

/// Scales pixel dimensions to EMU, shrinking proportionally to fit `max_width_emu`.
pub fn fit_to_width(width_px: u32, height_px: u32, max_width_emu: u64) -> (u64, u64) {
    let width = u64::from(width_px.max(1)) * EMU_PER_PIXEL;
    let height = u64::from(height_px.max(1)) * EMU_PER_PIXEL;
    if max_width_emu == 0 || width <= max_width_emu {
        return (width, height);
    }
    let scaled_height = (height as u128 * max_width_emu as u128 / width as u128) as u64;
    (max_width_emu, scaled_height.max(1))
}

/// Adds an image relationship and returns its new id.
pub(crate) fn add_image_relationship(relationships: &mut XmlElement, target: &str) -> String {
    let next = relationships
        .elements()
        .filter_map(|e| e.attr("Id"))
        .filter_map(|id| id.strip_prefix("rId"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    let id = format!("rId{}", next);
    relationships.children.push(XmlNode::Element(
        XmlElement::new("Relationship")
            .with_attr("Id", id.as_str())
            .with_attr("Type", IMAGE_RELATIONSHIP_TYPE)
            .with_attr("Target", target),
    ));
    id
}

/// Makes sure `[Content_Types].xml` declares a default content type for `extension`.
pub(crate) fn ensure_default_content_type(
    types: &mut XmlElement,
    extension: &str,
    content_type: &str,
) {
    let declared = types.elements().any(|e| {
        e.name == "Default"
            && e.attr("Extension")
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
    });
    if !declared {
        types.children.insert(
            0,
            XmlNode::Element(
                XmlElement::new("Default")
                    .with_attr("Extension", extension)
                    .with_attr("ContentType", content_type),
            ),
        );
    }
}

/// Inline `w:drawing` markup for a picture. Namespaces are declared locally so the markup is
/// valid whatever the host document's root declares.
pub(crate) fn drawing_xml(drawing: &Drawing) -> String {
    let name = quick_xml::escape::escape(drawing.name.as_str());
    format!(
        concat!(
            "<w:drawing>",
            "<wp:inline xmlns:wp=\"http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing\" distT=\"0\" distB=\"0\" distL=\"0\" distR=\"0\">",
            "<wp:extent cx=\"{cx}\" cy=\"{cy}\"/>",
            "<wp:docPr id=\"{id}\" name=\"{name}\"/>",
            "<wp:cNvGraphicFramePr>",
            "<a:graphicFrameLocks xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" noChangeAspect=\"1\"/>",
            "</wp:cNvGraphicFramePr>",
            "<a:graphic xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\">",
            "<a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">",
            "<pic:pic xmlns:pic=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">",
            "<pic:nvPicPr><pic:cNvPr id=\"0\" name=\"{name}\"/><pic:cNvPicPr/></pic:nvPicPr>",
            "<pic:blipFill>",
            "<a:blip xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" r:embed=\"{rel}\"/>",
            "<a:stretch><a:fillRect/></a:stretch>",
            "</pic:blipFill>",
            "<pic:spPr>",
            "<a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>",
            "<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom>",
            "</pic:spPr>",
            "</pic:pic>",
            "</a:graphicData>",
            "</a:graphic>",
            "</wp:inline>",
            "</w:drawing>"
        ),
        cx = drawing.width_emu,
        cy = drawing.height_emu,
        id = drawing.docpr_id,
        name = name,
        rel = drawing.relationship_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbImage::new(4, 2);
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_prepare_png_keeps_bytes_and_reads_size() {
        let png = tiny_png();
        let prepared = prepare_image(&png).unwrap();
        assert_eq!(prepared.extension, "png");
        assert_eq!((prepared.width_px, prepared.height_px), (4, 2));
        assert_eq!(prepared.bytes, png);
    }

    #[test]
    fn test_prepare_rejects_non_image() {
        assert!(matches!(
            prepare_image(b"%PDF-1.7"),
            Err(DocxError::Image(_))
        ));
    }

    #[test]
    fn test_fit_to_width_scales_proportionally() {
        assert_eq!(fit_to_width(100, 50, 0), (952_500, 476_250));
        assert_eq!(fit_to_width(200, 100, 952_500), (952_500, 476_250));
    }

    #[test]
    fn test_relationship_ids_do_not_collide() {
        let mut rels = parse(
            r#"<Relationships><Relationship Id="rId1"/><Relationship Id="rId7"/></Relationships>"#,
        )
        .unwrap();
        assert_eq!(add_image_relationship(&mut rels, "media/a.png"), "rId8");
        assert_eq!(add_image_relationship(&mut rels, "media/b.png"), "rId9");
    }

    #[test]
    fn test_content_type_declared_once() {
        let mut types = parse(r#"<Types><Default Extension="PNG" ContentType="image/png"/></Types>"#)
            .unwrap();
        ensure_default_content_type(&mut types, "png", "image/png");
        ensure_default_content_type(&mut types, "jpeg", "image/jpeg");
        assert_eq!(types.elements().count(), 2);
    }

    #[test]
    fn test_drawing_markup_is_well_formed() {
        let xml = drawing_xml(&Drawing {
            relationship_id: "rId3".into(),
            docpr_id: 1001,
            name: "Фото & план".into(),
            width_emu: 10,
            height_emu: 20,
        });
        let root = parse(&xml).unwrap();
        assert_eq!(root.name, "w:drawing");
    }
}
