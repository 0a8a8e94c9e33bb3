//! # Report DOCX
//!
//! Packaged word-processing documents for the expertise report engine.
//!
//! A template produced by an office editor is opened with [`Document::open`], edited through a
//! typed body model and written back with [`Document::to_bytes`]:
//!
//! - **Body model**: [`Block`]s (paragraphs, tables, preserved markup), [`Run`]s and [`Field`]s
//! - **Merge fields**: [`Document::substitute_merge_fields`] fills `MERGEFIELD`s from a map
//! - **Splitting**: [`Document::split_paragraphs`] explodes paragraphs on control markers
//! - **Pictures**: [`Document::add_image`] stores an image part and returns a [`Drawing`]
//!
//! Markup outside this model (styles, numbering, headers, section properties, existing drawings)
//! is carried through unchanged.
//!
//! ```no_run
//! use report_docx::{Document, Paragraph};
//!
//! # fn main() -> Result<(), report_docx::DocxError> {
//! let mut doc = Document::blank();
//! doc.push(Paragraph::with_text("Заключение эксперта"));
//! let bytes = doc.to_bytes()?;
//! # Ok(())
//! # }
//! ```

mod body;
mod document;
mod fields;
mod media;
mod model;
mod package;
pub mod xml;

pub use document::Document;
pub use fields::FieldSubstitution;
pub use media::{fit_to_width, EMU_PER_PIXEL, PAGE_CONTENT_WIDTH_EMU};
pub use model::{
    Alignment, Block, Drawing, Field, FieldCharKind, FieldForm, Inline, Paragraph, Run, RunItem,
    Table, TableCell, TableRow,
};
pub use package::Package;

/// Errors raised while reading, editing or writing a document package.
#[derive(Debug, thiserror::Error)]
pub enum DocxError {
    /// The zip container could not be read or written
    #[error("package error: {0}")]
    Package(String),

    /// A part the engine relies on is absent from the package
    #[error("missing package part: {0}")]
    MissingPart(String),

    /// A part contains malformed markup
    #[error("XML error: {0}")]
    Xml(String),

    /// Image bytes could not be recognised, measured or converted
    #[error("image error: {0}")]
    Image(String),
}

/// Result type for document operations.
pub type DocxResult<T> = std::result::Result<T, DocxError>;
