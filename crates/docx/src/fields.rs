//! Merge-field substitution and marker-driven paragraph splitting.

use crate::document::Document;
use crate::model::{Block, Field, Inline, Paragraph, Run, RunItem};
use crate::xml::XmlElement;
use std::collections::HashMap;

/// Outcome of a merge-field pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldSubstitution {
    /// Fields replaced by a value.
    pub resolved: usize,
    /// Fields with no value, dropped from the output.
    pub removed: usize,
}

impl Document {
    /// Replaces every `MERGEFIELD` in the body, including table cells, with its value.
    ///
    /// A field with a value becomes a plain run carrying the field's formatting; a field whose
    /// name is not in `values` is removed so no placeholder leaks into the output. Other field
    /// types (page numbers, references) are left alone. Running the pass again is a no-op since
    /// substituted fields are no longer fields.
    pub fn substitute_merge_fields(&mut self, values: &HashMap<String, String>) -> FieldSubstitution {
        let mut outcome = FieldSubstitution::default();
        for_each_paragraph_mut(self.blocks_mut(), &mut |paragraph| {
            substitute_in_paragraph(paragraph, values, &mut outcome);
        });
        tracing::debug!(
            resolved = outcome.resolved,
            removed = outcome.removed,
            "merge fields substituted"
        );
        outcome
    }

    /// Explodes paragraphs whose text contains any of `markers` into one paragraph per
    /// non-empty segment, keeping paragraph properties, run formatting and the original order.
    /// Bookmarks, pictures and fields in a split paragraph are kept.
    ///
    /// Returns the number of paragraphs that were split.
    pub fn split_paragraphs(&mut self, markers: &[&str]) -> usize {
        split_blocks(self.blocks_mut(), markers)
    }

    /// Removes every occurrence of `tokens` from paragraph text anywhere in the body, table
    /// cells included. Paragraphs left with nothing to show are dropped.
    ///
    /// Returns the number of occurrences removed.
    pub fn erase_tokens(&mut self, tokens: &[String]) -> usize {
        erase_in_blocks(self.blocks_mut(), tokens)
    }
}

fn erase_in_blocks(blocks: &mut Vec<Block>, tokens: &[String]) -> usize {
    let mut erased = 0;
    blocks.retain_mut(|block| match block {
        Block::Paragraph(paragraph) => {
            let text = paragraph.text();
            let found: usize = tokens
                .iter()
                .filter(|t| !t.is_empty())
                .map(|t| text.matches(t.as_str()).count())
                .sum();
            if found == 0 {
                return true;
            }
            for token in tokens {
                paragraph.replace_text(token, "");
            }
            erased += found;
            trim_segment(&mut paragraph.content);
            !paragraph.content.is_empty()
        }
        Block::Table(table) => {
            for row in &mut table.rows {
                for cell in &mut row.cells {
                    erased += erase_in_blocks(&mut cell.blocks, tokens);
                    cell.ensure_paragraph();
                }
            }
            true
        }
        Block::Other(_) => true,
    });
    erased
}

fn for_each_paragraph_mut(blocks: &mut [Block], f: &mut dyn FnMut(&mut Paragraph)) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => f(p),
            Block::Table(t) => {
                for row in &mut t.rows {
                    for cell in &mut row.cells {
                        for_each_paragraph_mut(&mut cell.blocks, f);
                    }
                }
            }
            Block::Other(_) => {}
        }
    }
}

fn substitute_in_paragraph(
    paragraph: &mut Paragraph,
    values: &HashMap<String, String>,
    outcome: &mut FieldSubstitution,
) {
    if !paragraph
        .content
        .iter()
        .any(|i| matches!(i, Inline::Field(f) if f.merge_field_name().is_some()))
    {
        return;
    }

    let content = std::mem::take(&mut paragraph.content);
    for inline in content {
        let field = match inline {
            Inline::Field(field) => field,
            other => {
                paragraph.content.push(other);
                continue;
            }
        };
        let Some(name) = field.merge_field_name() else {
            paragraph.content.push(Inline::Field(field));
            continue;
        };

        match values.get(&name) {
            Some(value) => {
                let mut run = Run::with_text(value);
                run.properties = field_run_properties(&field);
                paragraph.content.push(Inline::Run(run));
                outcome.resolved += 1;
            }
            None => {
                tracing::debug!("no value for merge field {}, removing it", name);
                outcome.removed += 1;
            }
        }
    }
}

fn field_run_properties(field: &Field) -> Option<crate::xml::XmlElement> {
    field
        .result
        .iter()
        .find_map(|run| run.properties.clone())
        .or_else(|| field.run_properties.clone())
}

fn split_blocks(blocks: &mut Vec<Block>, markers: &[&str]) -> usize {
    let mut split = 0;
    let original = std::mem::take(blocks);
    for block in original {
        match block {
            Block::Paragraph(paragraph) => {
                let text = paragraph.text();
                if markers.iter().any(|m| !m.is_empty() && text.contains(m)) {
                    split += 1;
                    blocks.extend(
                        split_paragraph(&paragraph, markers)
                            .into_iter()
                            .map(Block::Paragraph),
                    );
                } else {
                    blocks.push(Block::Paragraph(paragraph));
                }
            }
            Block::Table(mut table) => {
                for row in &mut table.rows {
                    for cell in &mut row.cells {
                        split += split_blocks(&mut cell.blocks, markers);
                    }
                }
                blocks.push(Block::Table(table));
            }
            other => blocks.push(other),
        }
    }
    split
}

/// Splits `template` on every marker occurrence, run by run.
///
/// Each segment keeps the runs it covers with their own formatting. Bookmarks, drawings and
/// other fields stay in the segment they sit in; when that segment has no visible content they
/// move to the next kept segment, or to the last one at the end of the paragraph.
fn split_paragraph(template: &Paragraph, markers: &[&str]) -> Vec<Paragraph> {
    let pieces = flatten(&template.content);
    let cuts = marker_ranges(&pieces, markers);

    let mut segments: Vec<Vec<Inline>> = vec![Vec::new()];
    let mut offset = 0;
    let mut cut = 0;
    for piece in pieces {
        match piece {
            Piece::Text(properties, text) => {
                let start = offset;
                offset += text.len();
                let mut at = start;
                while at < offset {
                    match cuts.get(cut) {
                        Some(&(from, to)) if from < offset && to > at => {
                            if from > at {
                                push_item(
                                    current(&mut segments),
                                    &properties,
                                    RunItem::Text(text[at - start..from - start].to_string()),
                                );
                            }
                            if from >= at {
                                segments.push(Vec::new());
                            }
                            if to <= offset {
                                cut += 1;
                            }
                            at = to.min(offset);
                        }
                        _ => {
                            push_item(
                                current(&mut segments),
                                &properties,
                                RunItem::Text(text[at - start..].to_string()),
                            );
                            at = offset;
                        }
                    }
                }
            }
            Piece::Item(properties, item) => push_item(current(&mut segments), &properties, item),
            Piece::Inline(inline) => current(&mut segments).push(inline),
        }
    }

    let mut kept: Vec<Vec<Inline>> = Vec::new();
    let mut carried: Vec<Inline> = Vec::new();
    for mut segment in segments {
        trim_segment(&mut segment);
        if has_content(&segment) {
            let mut content = std::mem::take(&mut carried);
            content.extend(segment);
            kept.push(content);
        } else {
            carried.extend(segment);
        }
    }
    if !carried.is_empty() {
        match kept.last_mut() {
            Some(last) => last.extend(carried),
            None => kept.push(carried),
        }
    }

    kept.into_iter()
        .map(|content| Paragraph {
            properties: template.properties.clone(),
            content,
        })
        .collect()
}

/// Paragraph content flattened so marker search can cross run boundaries.
enum Piece {
    Text(Option<XmlElement>, String),
    Item(Option<XmlElement>, RunItem),
    Inline(Inline),
}

fn flatten(content: &[Inline]) -> Vec<Piece> {
    let mut pieces = Vec::new();
    for inline in content {
        match inline {
            Inline::Run(run) => {
                for item in &run.content {
                    match item {
                        RunItem::Text(text) => {
                            pieces.push(Piece::Text(run.properties.clone(), text.clone()))
                        }
                        other => pieces.push(Piece::Item(run.properties.clone(), other.clone())),
                    }
                }
            }
            other => pieces.push(Piece::Inline(other.clone())),
        }
    }
    pieces
}

/// Byte ranges of marker occurrences in the concatenated run text, left to right.
fn marker_ranges(pieces: &[Piece], markers: &[&str]) -> Vec<(usize, usize)> {
    let text: String = pieces
        .iter()
        .filter_map(|p| match p {
            Piece::Text(_, t) => Some(t.as_str()),
            _ => None,
        })
        .collect();

    let mut ranges = Vec::new();
    let mut at = 0;
    while at < text.len() {
        let rest = &text[at..];
        match markers
            .iter()
            .find(|m| !m.is_empty() && rest.starts_with(**m))
        {
            Some(marker) => {
                ranges.push((at, at + marker.len()));
                at += marker.len();
            }
            None => at += rest.chars().next().map_or(1, char::len_utf8),
        }
    }
    ranges
}

fn current(segments: &mut Vec<Vec<Inline>>) -> &mut Vec<Inline> {
    if segments.is_empty() {
        segments.push(Vec::new());
    }
    let last = segments.len() - 1;
    &mut segments[last]
}

/// Appends to the trailing run when it has the same formatting, otherwise opens a new run.
fn push_item(segment: &mut Vec<Inline>, properties: &Option<XmlElement>, item: RunItem) {
    if let Some(Inline::Run(run)) = segment.last_mut() {
        if &run.properties == properties {
            match (run.content.last_mut(), item) {
                (Some(RunItem::Text(existing)), RunItem::Text(text)) => existing.push_str(&text),
                (_, item) => run.content.push(item),
            }
            return;
        }
    }
    segment.push(Inline::Run(Run {
        properties: properties.clone(),
        content: vec![item],
    }));
}

/// Strips whitespace, breaks and tabs from both ends of a segment's run text.
fn trim_segment(segment: &mut Vec<Inline>) {
    trim_edge(segment.iter_mut(), true);
    trim_edge(segment.iter_mut().rev(), false);
    segment.retain(|inline| !matches!(inline, Inline::Run(run) if run.content.is_empty()));
}

fn trim_edge<'a>(inlines: impl Iterator<Item = &'a mut Inline>, leading: bool) {
    for inline in inlines {
        let run = match inline {
            Inline::Run(run) => run,
            Inline::Field(_) => return,
            _ => continue,
        };
        loop {
            let item = if leading {
                run.content.first_mut()
            } else {
                run.content.last_mut()
            };
            match item {
                Some(RunItem::Text(text)) => {
                    let trimmed = if leading {
                        text.trim_start()
                    } else {
                        text.trim_end()
                    };
                    if trimmed.is_empty() {
                        remove_edge(&mut run.content, leading);
                    } else {
                        *text = trimmed.to_string();
                        return;
                    }
                }
                Some(RunItem::Break | RunItem::Tab) => remove_edge(&mut run.content, leading),
                Some(_) => return,
                None => break,
            }
        }
    }
}

fn remove_edge(items: &mut Vec<RunItem>, leading: bool) {
    if leading {
        items.remove(0);
    } else {
        items.pop();
    }
}

/// Whether a segment shows anything: text, a picture or a field.
fn has_content(segment: &[Inline]) -> bool {
    segment.iter().any(|inline| match inline {
        Inline::Run(run) => run.content.iter().any(|item| {
            matches!(item, RunItem::Text(t) if !t.is_empty())
                || matches!(item, RunItem::Drawing(_))
        }),
        Inline::Field(_) => true,
        _ => false,
    })
}
