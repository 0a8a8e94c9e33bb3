//! # Report Core
//!
//! Assembly of expertise reports from checklist data.
//!
//! This crate turns an examination (questions, answers, filled-in checklists and attachments)
//! into a finished word-processing document, and keeps checklist file attachments in step with
//! the blob store:
//!
//! - **Field metadata**: [`FieldMetadataCache`] indexes template labels and narratives once
//! - **Rendering**: per-template [`ChecklistRenderer`]s selected through a [`RendererRegistry`]
//! - **Assembly**: [`DocumentAssembler`] runs the generation stages end to end
//! - **Files**: [`FileDataService`] merges uploads with content-hash deduplication
//! - **Conversion**: [`FormatConverter`] rasterizes PDF pages for embedding
//!
//! Storage and text generation are collaborators behind traits ([`report_files::BlobStore`],
//! [`TextGenerator`]); configuration is resolved once into a [`CoreConfig`].

pub mod assembler;
pub mod bookmarks;
pub mod config;
pub mod constants;
pub mod convert;
mod error;
pub mod field_cache;
pub mod merge;
pub mod model;
pub mod narrative;
pub mod photos;
pub mod registry;
pub mod render;
pub mod templates;
pub mod textgen;
pub mod values;

#[cfg(test)]
mod testing;

pub use assembler::{DocumentAssembler, RendererRegistry};
pub use bookmarks::BookmarkGenerator;
pub use config::CoreConfig;
pub use convert::{FormatConverter, PageRasterizer, PdftoppmRasterizer};
pub use error::{CoreError, CoreResult};
pub use field_cache::FieldMetadataCache;
pub use merge::{FileDataMerger, FileDataService, FileLocation, MergeOutcome, UploadedFile};
pub use model::{AnswerPhoto, ChecklistInstance, Examination, ProfileDocument, Question, Template};
pub use registry::{Strategy, StrategyRegistry};
pub use render::{ChecklistLookup, ChecklistRenderer, RenderContext};
pub use templates::{FsTemplateSource, TemplateSource};
pub use textgen::{HttpTextGenerator, TextGenerator};
