//! Inputs of report generation and file merging.
//!
//! These records come from the metadata collaborator. Only the fields the engine reads are
//! modelled; unknown fields are ignored on deserialisation.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A checklist template: display name plus its declarative structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub structure: Value,
}

/// One filled-in checklist attached to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistInstance {
    pub id: Uuid,
    pub question_id: Uuid,
    pub template_id: Uuid,
    /// Template-specific JSON, either inline or as an encoded string.
    #[serde(default)]
    pub data: Value,
}

impl ChecklistInstance {
    pub fn new(question_id: Uuid, template_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            question_id,
            template_id,
            data: Value::Object(Map::new()),
        }
    }

    /// The instance data as an ordered JSON object.
    ///
    /// Empty data reads as an empty object. Data stored as a JSON string is decoded first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChecklistData` if the data is not a JSON object.
    pub fn data_object(&self) -> CoreResult<Map<String, Value>> {
        match &self.data {
            Value::Null => Ok(Map::new()),
            Value::Object(map) => Ok(map.clone()),
            Value::String(raw) if raw.trim().is_empty() => Ok(Map::new()),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Err(CoreError::invalid_data(self.id, "data is not a JSON object")),
                Err(e) => Err(CoreError::invalid_data(self.id, e.to_string())),
            },
            _ => Err(CoreError::invalid_data(self.id, "data is not a JSON object")),
        }
    }
}

/// A photo attached to a question's answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerPhoto {
    pub id: Uuid,
    /// Stored file name including extension.
    pub name: String,
    /// Bucket override; the configured photo bucket when absent.
    #[serde(default)]
    pub bucket: Option<String>,
}

/// A whole document attached to the examination profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub name: String,
    pub extension: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub number: u32,
    pub text: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub checklists: Vec<ChecklistInstance>,
    #[serde(default)]
    pub photos: Vec<AnswerPhoto>,
}

/// An examination with its ordered questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Examination {
    pub id: Uuid,
    pub number: String,
    /// Free-form header values, exposed to the template as merge fields of the same name.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub profile_documents: Vec<ProfileDocument>,
}

impl Examination {
    /// Every checklist instance in question order.
    pub fn checklists(&self) -> impl Iterator<Item = &ChecklistInstance> {
        self.questions.iter().flat_map(|q| q.checklists.iter())
    }

    /// Every answer photo in question order.
    pub fn photos(&self) -> impl Iterator<Item = &AnswerPhoto> {
        self.questions.iter().flat_map(|q| q.photos.iter())
    }
}
