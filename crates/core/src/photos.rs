//! Answer-photo insertion.
//!
//! Every run of consecutive `[PHOTO_<uuid>]` paragraphs is replaced by one two-column table with
//! the photos two per row, each captioned `Рисунок N`. Figures are numbered in document order
//! across all tables.

use crate::bookmarks::parse_photo_anchor;
use crate::constants::FIGURE_CAPTION_PREFIX;
use crate::model::AnswerPhoto;
use crate::render::{bordered_table, caption, HALF_WIDTH_EMU};
use crate::{CoreError, CoreResult};
use rayon::prelude::*;
use report_docx::{Alignment, Block, Document, Paragraph, Run, TableCell, TableRow};
use report_files::{BlobStore, ObjectKey};
use std::collections::HashMap;
use uuid::Uuid;

/// A run of adjacent anchor paragraphs: first block index and the ids in order.
#[derive(Debug)]
struct AnchorGroup {
    start: usize,
    ids: Vec<Uuid>,
}

impl AnchorGroup {
    fn end(&self) -> usize {
        self.start + self.ids.len()
    }
}

/// Fetches answer photos concurrently and lays them out at their anchors.
pub struct PhotoInserter {
    pool: rayon::ThreadPool,
}

impl PhotoInserter {
    /// # Errors
    ///
    /// Returns `Configuration` if the fetch pool cannot be built.
    pub fn new(fetch_concurrency: usize) -> CoreResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(fetch_concurrency.max(1))
            .thread_name(|i| format!("photo-fetch-{}", i))
            .build()
            .map_err(|e| CoreError::Configuration(format!("photo fetch pool: {}", e)))?;
        Ok(Self { pool })
    }

    /// Replaces photo anchors in `doc` with captioned photo tables.
    ///
    /// Anchors naming a photo not in `photos` are logged and removed.
    ///
    /// # Returns
    ///
    /// The number of photos inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if a photo cannot be fetched or is not a readable image.
    pub fn insert(
        &self,
        doc: &mut Document,
        blobs: &dyn BlobStore,
        default_bucket: &str,
        photos: &[AnswerPhoto],
    ) -> CoreResult<usize> {
        let known: HashMap<Uuid, &AnswerPhoto> = photos.iter().map(|p| (p.id, p)).collect();
        let groups = anchor_groups(doc);

        let wanted: Vec<&AnswerPhoto> = groups
            .iter()
            .flat_map(|g| g.ids.iter())
            .filter_map(|id| match known.get(id) {
                Some(photo) => Some(*photo),
                None => {
                    tracing::warn!("photo anchor {} has no matching answer photo", id);
                    None
                }
            })
            .collect();

        let images: Vec<Vec<u8>> = self.pool.install(|| {
            wanted
                .par_iter()
                .map(|photo| fetch_photo(blobs, default_bucket, photo))
                .collect::<CoreResult<_>>()
        })?;

        // Figure numbers follow document order; groups are then spliced back to front so the
        // indices of earlier groups stay valid.
        let mut images = images.into_iter();
        let mut planned = Vec::with_capacity(groups.len());
        let mut figure = 0;
        for group in &groups {
            let count = group.ids.iter().filter(|id| known.contains_key(id)).count();
            let group_images: Vec<Vec<u8>> = images.by_ref().take(count).collect();
            planned.push((group, figure, group_images));
            figure += count;
        }

        for (group, first_figure, group_images) in planned.into_iter().rev() {
            let replacement = if group_images.is_empty() {
                Vec::new()
            } else {
                vec![photo_table(doc, &group_images, first_figure)?]
            };
            doc.blocks_mut()
                .splice(group.start..group.end(), replacement);
        }

        tracing::debug!("inserted {} answer photos", figure);
        Ok(figure)
    }
}

fn fetch_photo(blobs: &dyn BlobStore, default_bucket: &str, photo: &AnswerPhoto) -> CoreResult<Vec<u8>> {
    let key = ObjectKey::from_file_name(&photo.name);
    let bucket = photo.bucket.as_deref().unwrap_or(default_bucket);
    Ok(blobs.get(&key.name, &key.extension, bucket)?)
}

fn anchor_groups(doc: &Document) -> Vec<AnchorGroup> {
    let mut groups: Vec<AnchorGroup> = Vec::new();
    for (index, block) in doc.blocks().iter().enumerate() {
        let Some(id) = block
            .as_paragraph()
            .and_then(|p| parse_photo_anchor(&p.text()))
        else {
            continue;
        };
        match groups.last_mut() {
            Some(group) if group.end() == index => group.ids.push(id),
            _ => groups.push(AnchorGroup {
                start: index,
                ids: vec![id],
            }),
        }
    }
    groups
}

fn photo_table(doc: &mut Document, images: &[Vec<u8>], first_figure: usize) -> CoreResult<Block> {
    let mut table = bordered_table(2);
    for (row, pair) in images.chunks(2).enumerate() {
        let mut cells = Vec::with_capacity(2);
        for (column, bytes) in pair.iter().enumerate() {
            let number = first_figure + row * 2 + column + 1;
            let drawing = doc.add_image(bytes, HALF_WIDTH_EMU)?;
            cells.push(TableCell::new(vec![
                Block::Paragraph(
                    Paragraph::new()
                        .add_run(Run::with_drawing(drawing))
                        .align(Alignment::Center),
                ),
                Block::Paragraph(caption(&format!("{} {}", FIGURE_CAPTION_PREFIX, number))),
            ]));
        }
        if cells.len() == 1 {
            cells.push(TableCell::with_text(""));
        }
        table = table.add_row(TableRow::new(cells));
    }
    Ok(Block::Table(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::photo_anchor;
    use crate::testing::png;
    use report_docx::Table;
    use report_files::MemoryBlobStore;

    const BUCKET: &str = "answer-photos";

    fn photo(blobs: &MemoryBlobStore, n: u128) -> AnswerPhoto {
        let name = format!("photo{}", n);
        blobs
            .put(&name, "png", BUCKET, &png(8, 6, n as u8), "")
            .unwrap();
        AnswerPhoto {
            id: Uuid::from_u128(n),
            name: format!("{}.png", name),
            bucket: None,
        }
    }

    fn doc_with(texts: &[String]) -> Document {
        let mut doc = Document::blank();
        for text in texts {
            doc.push(Paragraph::with_text(text));
        }
        doc
    }

    fn tables(doc: &Document) -> Vec<&Table> {
        doc.blocks().iter().filter_map(Block::as_table).collect()
    }

    fn captions(table: &Table) -> Vec<String> {
        table
            .rows
            .iter()
            .flat_map(|r| r.cells.iter())
            .map(|cell| cell.text().trim().to_string())
            .collect()
    }

    #[test]
    fn test_three_photos_make_two_rows_with_empty_last_cell() {
        let blobs = MemoryBlobStore::new();
        let photos: Vec<AnswerPhoto> = (1..=3).map(|n| photo(&blobs, n)).collect();
        let mut texts = vec!["Ответ".to_string()];
        texts.extend(photos.iter().map(|p| photo_anchor(p.id)));
        let mut doc = doc_with(&texts);

        let inserted = PhotoInserter::new(4)
            .unwrap()
            .insert(&mut doc, &blobs, BUCKET, &photos)
            .unwrap();

        assert_eq!(inserted, 3);
        let tables = tables(&doc);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(
            captions(tables[0]),
            vec!["Рисунок 1", "Рисунок 2", "Рисунок 3", ""]
        );
        assert_eq!(doc.image_count(), 3);
        assert_eq!(doc.blocks()[0].as_paragraph().unwrap().text(), "Ответ");
    }

    #[test]
    fn test_numbering_continues_across_groups() {
        let blobs = MemoryBlobStore::new();
        let photos: Vec<AnswerPhoto> = (1..=3).map(|n| photo(&blobs, n)).collect();
        let mut doc = doc_with(&[
            photo_anchor(photos[0].id),
            "между".to_string(),
            photo_anchor(photos[1].id),
            photo_anchor(photos[2].id),
        ]);

        PhotoInserter::new(2)
            .unwrap()
            .insert(&mut doc, &blobs, BUCKET, &photos)
            .unwrap();

        let tables = tables(&doc);
        assert_eq!(tables.len(), 2);
        assert_eq!(captions(tables[0]), vec!["Рисунок 1", ""]);
        assert_eq!(captions(tables[1]), vec!["Рисунок 2", "Рисунок 3"]);
    }

    #[test]
    fn test_unknown_anchor_is_removed() {
        let blobs = MemoryBlobStore::new();
        let known = photo(&blobs, 1);
        let mut doc = doc_with(&[
            photo_anchor(Uuid::from_u128(99)),
            photo_anchor(known.id),
            "после".to_string(),
        ]);

        let inserted = PhotoInserter::new(1)
            .unwrap()
            .insert(&mut doc, &blobs, BUCKET, &[known])
            .unwrap();

        assert_eq!(inserted, 1);
        assert!(doc.blocks()[0].as_table().is_some());
        assert_eq!(doc.blocks()[1].as_paragraph().unwrap().text(), "после");
    }

    #[test]
    fn test_missing_blob_fails() {
        let blobs = MemoryBlobStore::new();
        let ghost = AnswerPhoto {
            id: Uuid::from_u128(5),
            name: "gone.png".into(),
            bucket: Some("elsewhere".into()),
        };
        let mut doc = doc_with(&[photo_anchor(ghost.id)]);
        let result = PhotoInserter::new(1)
            .unwrap()
            .insert(&mut doc, &blobs, BUCKET, &[ghost]);
        assert!(matches!(result, Err(CoreError::BlobStore(_))));
    }
}
