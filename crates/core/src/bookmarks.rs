//! Merge-field values for a report template.
//!
//! Examination attributes are passed through under their own names. The generated fields are:
//!
//! | Field             | Value                                                            |
//! |-------------------|------------------------------------------------------------------|
//! | `expertiseNumber` | examination number                                               |
//! | `currentDate`     | generation date, `dd.mm.yyyy`                                    |
//! | `questions`       | `N. text` per question, joined with the question separator       |
//! | `answers`         | `N. answer` then one anchor line per checklist and photo         |
//!
//! The separators survive merge-field substitution as literal text and are split into
//! paragraphs afterwards, so every question, answer line and anchor ends up in a paragraph of
//! its own.

use crate::constants::{
    CHECKLIST_ANCHOR_PREFIX, LINE_SEPARATOR, PHOTO_ANCHOR_PREFIX, QUESTION_SEPARATOR,
};
use crate::model::{Examination, Question};
use chrono::NaiveDate;
use std::collections::HashMap;
use uuid::Uuid;

pub const EXPERTISE_NUMBER_FIELD: &str = "expertiseNumber";
pub const CURRENT_DATE_FIELD: &str = "currentDate";
pub const QUESTIONS_FIELD: &str = "questions";
pub const ANSWERS_FIELD: &str = "answers";

/// `[CHECKLIST_<uuid>]`
pub fn checklist_anchor(id: Uuid) -> String {
    format!("{}{}]", CHECKLIST_ANCHOR_PREFIX, id)
}

/// `[PHOTO_<uuid>]`
pub fn photo_anchor(id: Uuid) -> String {
    format!("{}{}]", PHOTO_ANCHOR_PREFIX, id)
}

/// Parses the id out of a paragraph whose whole text is a photo anchor.
pub fn parse_photo_anchor(text: &str) -> Option<Uuid> {
    text.trim()
        .strip_prefix(PHOTO_ANCHOR_PREFIX)?
        .strip_suffix(']')
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// Builds the bookmark map for an examination.
#[derive(Debug, Clone, Default)]
pub struct BookmarkGenerator;

impl BookmarkGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Bookmark values dated today in local time.
    pub fn generate(&self, examination: &Examination) -> HashMap<String, String> {
        self.generate_on(examination, chrono::Local::now().date_naive())
    }

    pub fn generate_on(&self, examination: &Examination, date: NaiveDate) -> HashMap<String, String> {
        let mut values: HashMap<String, String> = examination
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        values.insert(EXPERTISE_NUMBER_FIELD.into(), examination.number.clone());
        values.insert(
            CURRENT_DATE_FIELD.into(),
            date.format("%d.%m.%Y").to_string(),
        );

        let mut questions: Vec<&Question> = examination.questions.iter().collect();
        questions.sort_by_key(|q| q.number);

        values.insert(
            QUESTIONS_FIELD.into(),
            questions
                .iter()
                .map(|q| format!("{}. {}", q.number, q.text.trim()))
                .collect::<Vec<_>>()
                .join(QUESTION_SEPARATOR),
        );
        values.insert(
            ANSWERS_FIELD.into(),
            questions
                .iter()
                .map(|q| answer_block(q))
                .collect::<Vec<_>>()
                .join(QUESTION_SEPARATOR),
        );

        tracing::debug!(
            "generated {} bookmarks for examination {}",
            values.len(),
            examination.id
        );
        values
    }
}

fn answer_block(question: &Question) -> String {
    let mut lines = vec![format!("{}. {}", question.number, question.answer.trim())];
    lines.extend(question.checklists.iter().map(|c| checklist_anchor(c.id)));
    lines.extend(question.photos.iter().map(|p| photo_anchor(p.id)));
    lines.join(LINE_SEPARATOR)
}
