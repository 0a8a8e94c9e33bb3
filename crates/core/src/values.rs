//! Text formatting of checklist values.
//!
//! Checklist fields come in three shapes: a scalar, a list, or a `{value, attributes}` object
//! where `attributes` qualifies the value. Lists of file entries are never rendered as text.

use crate::constants::GOSTS_KEY;
use serde_json::{Map, Value};

/// Label resolution for attribute and field keys.
pub type LabelFn<'a> = &'a dyn Fn(&str) -> String;

/// True for a non-empty array whose items all look like stored file entries.
pub fn is_file_list(value: &Value) -> bool {
    match value {
        Value::Array(items) => {
            !items.is_empty()
                && items.iter().all(|item| {
                    item.as_object()
                        .is_some_and(|o| o.contains_key("hash") && o.contains_key("url"))
                })
        }
        _ => false,
    }
}

/// Formats a scalar, list or `{value, attributes}` value on one line.
pub fn format_value(value: &Value, label: LabelFn<'_>) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "да".to_string(),
        Value::Bool(false) => "нет".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| format_value(item, label))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(object) => format_object(object, label),
    }
}

fn format_object(object: &Map<String, Value>, label: LabelFn<'_>) -> String {
    if let Some(value) = object.get("value") {
        let main = format_value(value, label);
        let attributes = object
            .get("attributes")
            .and_then(Value::as_object)
            .map(|attrs| {
                attrs
                    .iter()
                    .filter(|(_, v)| !is_file_list(v))
                    .map(|(k, v)| (label(k), format_value(v, label)))
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        return match (main.is_empty(), attributes.is_empty()) {
            (_, true) => main,
            (true, false) => attributes.join(", "),
            (false, false) => format!("{} ({})", main, attributes.join(", ")),
        };
    }

    object
        .iter()
        .filter(|(_, v)| !is_file_list(v))
        .map(|(k, v)| (label(k), format_value(v, label)))
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Normative references, deduplicated in first-seen order and newline-joined.
pub fn format_gosts(value: &Value) -> String {
    let mut seen: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        for line in s.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !seen.iter().any(|existing| existing == line) {
                seen.push(line.to_string());
            }
        }
    };
    match value {
        Value::String(s) => push(s),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => push(s),
                    Value::Object(o) => {
                        if let Some(s) = o.get("value").or_else(|| o.get("name")).and_then(Value::as_str) {
                            push(s);
                        }
                    }
                    other => push(&other.to_string()),
                }
            }
        }
        Value::Object(o) => {
            if let Some(v) = o.get("value") {
                return format_gosts(v);
            }
        }
        _ => {}
    }
    seen.join("\n")
}

/// `label: value` lines for every renderable field of a parameter object.
pub fn field_lines(fields: &Map<String, Value>, label: LabelFn<'_>) -> Vec<String> {
    fields
        .iter()
        .filter(|(_, v)| !is_file_list(v))
        .filter_map(|(key, value)| {
            let text = if key == GOSTS_KEY {
                format_gosts(value)
            } else {
                format_value(value, label)
            };
            (!text.is_empty()).then(|| format!("{}: {}", label(key), text))
        })
        .collect()
}

/// Reads a field as text, treating numbers as their decimal form.
pub fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(o) => text_of(o.get("value")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upper(key: &str) -> String {
        key.to_uppercase()
    }

    #[test]
    fn test_scalar_and_list_shapes() {
        assert_eq!(format_value(&json!(" кирпич "), &upper), "кирпич");
        assert_eq!(format_value(&json!(12.5), &upper), "12.5");
        assert_eq!(format_value(&json!(true), &upper), "да");
        assert_eq!(format_value(&json!(["a", "", "b"]), &upper), "a, b");
    }

    #[test]
    fn test_value_with_attributes() {
        let v = json!({"value": "трещина", "attributes": {"width": "2 мм", "depth": ""}});
        assert_eq!(format_value(&v, &upper), "трещина (WIDTH: 2 мм)");
        let only_attrs = json!({"value": "", "attributes": {"width": "2 мм"}});
        assert_eq!(format_value(&only_attrs, &upper), "WIDTH: 2 мм");
    }

    #[test]
    fn test_gosts_are_deduplicated_and_newline_joined() {
        let v = json!(["СП 70.13330.2012", "ГОСТ 31937-2011", "СП 70.13330.2012\nСП 13-102-2003"]);
        assert_eq!(
            format_gosts(&v),
            "СП 70.13330.2012\nГОСТ 31937-2011\nСП 13-102-2003"
        );
    }

    #[test]
    fn test_field_lines_skip_files_and_empty_values() {
        let fields = json!({
            "material": "бетон",
            "photos": [{"id": "1", "name": "a.png", "url": "u", "hash": "h"}],
            "note": "",
            "gosts": ["A", "A"]
        });
        let lines = field_lines(fields.as_object().unwrap(), &upper);
        assert_eq!(lines, vec!["MATERIAL: бетон", "GOSTS: A"]);
    }

    #[test]
    fn test_text_of() {
        assert_eq!(text_of(Some(&json!(4))), Some("4".into()));
        assert_eq!(text_of(Some(&json!({"value": "x"}))), Some("x".into()));
        assert_eq!(text_of(Some(&json!("  "))), None);
        assert_eq!(text_of(None), None);
    }
}
