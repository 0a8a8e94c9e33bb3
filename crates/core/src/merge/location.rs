//! Typed locations of file lists inside checklist data.

use crate::constants::{PREMISES_KEY, PREMISE_NAME_KEY, PREMISE_PARAMETERS_KEY};
use crate::render::file_entries;
use crate::values::is_file_list;
use crate::{CoreError, CoreResult};
use report_files::FileEntry;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Separator of the parts of an upload key, e.g. `kitchen__walls__photos`.
pub const KEY_SEPARATOR: &str = "__";

/// Where a list of file entries lives in checklist data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileLocation {
    /// `data[bucket]`
    Bucket { bucket: String },
    /// `data[parameter][bucket]`
    ParameterBucket { parameter: String, bucket: String },
    /// `data.premises[premise_name == premise][bucket]`
    PremiseBucket { premise: String, bucket: String },
    /// `data.premises[premise_name == premise][parameter][bucket]`
    PremiseParameterBucket {
        premise: String,
        parameter: String,
        bucket: String,
    },
}

impl FileLocation {
    pub fn bucket(&self) -> &str {
        match self {
            Self::Bucket { bucket }
            | Self::ParameterBucket { bucket, .. }
            | Self::PremiseBucket { bucket, .. }
            | Self::PremiseParameterBucket { bucket, .. } => bucket,
        }
    }

    /// The part of a stored object name that says what the file belongs to.
    pub fn name_part(&self) -> &str {
        match self {
            Self::Bucket { bucket } | Self::PremiseBucket { bucket, .. } => bucket,
            Self::ParameterBucket { parameter, .. }
            | Self::PremiseParameterBucket { parameter, .. } => parameter,
        }
    }

    /// Entries stored at this location; empty when the location does not exist yet.
    pub fn entries(&self, data: &Map<String, Value>) -> Vec<FileEntry> {
        let container = match self {
            Self::Bucket { .. } => Some(data),
            Self::ParameterBucket { parameter, .. } => {
                data.get(parameter).and_then(Value::as_object)
            }
            Self::PremiseBucket { premise, .. } => find_premise(data, premise),
            Self::PremiseParameterBucket {
                premise, parameter, ..
            } => find_premise(data, premise)
                .and_then(|p| p.get(parameter))
                .and_then(Value::as_object),
        };
        file_entries(container.and_then(|c| c.get(self.bucket())))
    }

    /// The entry list at this location, creating missing premises, parameters and lists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChecklistData` when a value on the path has the wrong shape.
    pub fn entries_mut<'a>(
        &self,
        instance_id: Uuid,
        data: &'a mut Map<String, Value>,
    ) -> CoreResult<&'a mut Vec<Value>> {
        let container = match self {
            Self::Bucket { .. } => data,
            Self::ParameterBucket { parameter, .. } => object_mut(instance_id, data, parameter)?,
            Self::PremiseBucket { premise, .. } => premise_mut(instance_id, data, premise, None)?,
            Self::PremiseParameterBucket {
                premise, parameter, ..
            } => {
                let premise = premise_mut(instance_id, data, premise, Some(parameter))?;
                object_mut(instance_id, premise, parameter)?
            }
        };
        list_mut(instance_id, container, self.bucket())
    }
}

fn find_premise<'a>(data: &'a Map<String, Value>, premise: &str) -> Option<&'a Map<String, Value>> {
    data.get(PREMISES_KEY)?
        .as_array()?
        .iter()
        .filter_map(Value::as_object)
        .find(|p| p.get(PREMISE_NAME_KEY).and_then(Value::as_str) == Some(premise))
}

fn list_mut<'a>(
    instance_id: Uuid,
    object: &'a mut Map<String, Value>,
    key: &str,
) -> CoreResult<&'a mut Vec<Value>> {
    let slot = object
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => Ok(items),
        _ => Err(CoreError::invalid_data(
            instance_id,
            format!("'{}' is not a list", key),
        )),
    }
}

fn object_mut<'a>(
    instance_id: Uuid,
    object: &'a mut Map<String, Value>,
    key: &str,
) -> CoreResult<&'a mut Map<String, Value>> {
    let slot = object
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if slot.is_null() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => Ok(map),
        _ => Err(CoreError::invalid_data(
            instance_id,
            format!("'{}' is not an object", key),
        )),
    }
}

fn premise_mut<'a>(
    instance_id: Uuid,
    data: &'a mut Map<String, Value>,
    premise: &str,
    parameter: Option<&str>,
) -> CoreResult<&'a mut Map<String, Value>> {
    let premises = list_mut(instance_id, data, PREMISES_KEY)?;
    let index = match premises
        .iter()
        .position(|p| p.get(PREMISE_NAME_KEY).and_then(Value::as_str) == Some(premise))
    {
        Some(index) => index,
        None => {
            premises.push(json!({ "premise_name": premise, "premise_parameters": [] }));
            premises.len() - 1
        }
    };
    let object = premises[index].as_object_mut().ok_or_else(|| {
        CoreError::invalid_data(instance_id, format!("premise '{}' is not an object", premise))
    })?;

    if let Some(parameter) = parameter {
        let declared = list_mut(instance_id, object, PREMISE_PARAMETERS_KEY)?;
        if !declared.iter().any(|p| p.as_str() == Some(parameter)) {
            declared.push(Value::String(parameter.to_string()));
        }
    }
    Ok(object)
}

/// Every non-empty file list in `data` with its location.
pub fn file_lists(data: &Map<String, Value>) -> Vec<(FileLocation, Vec<FileEntry>)> {
    let mut found = Vec::new();
    for (key, value) in data {
        if key == PREMISES_KEY {
            for premise in value.as_array().into_iter().flatten().filter_map(Value::as_object) {
                let Some(name) = premise.get(PREMISE_NAME_KEY).and_then(Value::as_str) else {
                    continue;
                };
                for (inner, inner_value) in premise {
                    if is_file_list(inner_value) {
                        found.push((
                            FileLocation::PremiseBucket {
                                premise: name.to_string(),
                                bucket: inner.clone(),
                            },
                            file_entries(Some(inner_value)),
                        ));
                    } else if let Value::Object(parameter) = inner_value {
                        for (bucket, list) in parameter {
                            if is_file_list(list) {
                                found.push((
                                    FileLocation::PremiseParameterBucket {
                                        premise: name.to_string(),
                                        parameter: inner.clone(),
                                        bucket: bucket.clone(),
                                    },
                                    file_entries(Some(list)),
                                ));
                            }
                        }
                    }
                }
            }
        } else if is_file_list(value) {
            found.push((
                FileLocation::Bucket {
                    bucket: key.clone(),
                },
                file_entries(Some(value)),
            ));
        } else if let Value::Object(parameter) = value {
            for (bucket, list) in parameter {
                if is_file_list(list) {
                    found.push((
                        FileLocation::ParameterBucket {
                            parameter: key.clone(),
                            bucket: bucket.clone(),
                        },
                        file_entries(Some(list)),
                    ));
                }
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, hash: &str) -> Value {
        json!({"id": name, "name": name, "url": format!("memory://b/{}", name), "hash": hash})
    }

    #[test]
    fn test_file_lists_finds_every_shape() {
        let data = json!({
            "photos": [entry("a.png", "1")],
            "walls": {"material": "кирпич", "photos": [entry("b.png", "2")]},
            "premises": [{
                "premise_name": "Кухня",
                "premise_photos": [entry("c.png", "3")],
                "ceiling": {"photos": [entry("d.png", "4")]}
            }],
            "type_text_params": {"area": "50"}
        });
        let lists = file_lists(data.as_object().unwrap());
        let locations: Vec<FileLocation> = lists.iter().map(|(l, _)| l.clone()).collect();
        assert_eq!(
            locations,
            vec![
                FileLocation::Bucket { bucket: "photos".into() },
                FileLocation::ParameterBucket {
                    parameter: "walls".into(),
                    bucket: "photos".into()
                },
                FileLocation::PremiseBucket {
                    premise: "Кухня".into(),
                    bucket: "premise_photos".into()
                },
                FileLocation::PremiseParameterBucket {
                    premise: "Кухня".into(),
                    parameter: "ceiling".into(),
                    bucket: "photos".into()
                },
            ]
        );
        assert_eq!(lists[3].1[0].name, "d.png");
    }

    #[test]
    fn test_entries_mut_creates_premise_and_declares_parameter() {
        let mut data = Map::new();
        let location = FileLocation::PremiseParameterBucket {
            premise: "Коридор".into(),
            parameter: "floor".into(),
            bucket: "photos".into(),
        };
        location
            .entries_mut(Uuid::nil(), &mut data)
            .unwrap()
            .push(entry("x.png", "9"));

        assert_eq!(
            Value::Object(data.clone()),
            json!({"premises": [{
                "premise_name": "Коридор",
                "premise_parameters": ["floor"],
                "floor": {"photos": [entry("x.png", "9")]}
            }]})
        );
        assert_eq!(location.entries(&data).len(), 1);
    }

    #[test]
    fn test_entries_mut_rejects_wrong_shape() {
        let mut data = json!({"walls": "кирпич"}).as_object().unwrap().clone();
        let location = FileLocation::ParameterBucket {
            parameter: "walls".into(),
            bucket: "photos".into(),
        };
        assert!(matches!(
            location.entries_mut(Uuid::nil(), &mut data),
            Err(CoreError::InvalidChecklistData { .. })
        ));
    }

    #[test]
    fn test_name_part() {
        let location = FileLocation::PremiseParameterBucket {
            premise: "p".into(),
            parameter: "walls".into(),
            bucket: "photos".into(),
        };
        assert_eq!(location.name_part(), "walls");
        assert_eq!(location.bucket(), "photos");
    }
}
