//! `{{key}}` substitution of narrative templates.

use crate::values::{format_value, LabelFn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Fills `{{name}}` placeholders from `params`.
///
/// A placeholder is first read as a field label: the parameter whose key carries that label
/// supplies the value. Otherwise it is read as a raw parameter key. Placeholders that resolve to
/// nothing stay in the text literally.
pub fn resolve_type_text(
    template: &str,
    params: &Map<String, Value>,
    labels: &BTreeMap<String, String>,
) -> String {
    let label_fn = |key: &str| labels.get(key).cloned().unwrap_or_else(|| key.to_string());
    let label: LabelFn<'_> = &label_fn;

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = after[..end].trim();
        match lookup(name, params, labels) {
            Some(value) => out.push_str(&format_value(value, label)),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn lookup<'a>(
    name: &str,
    params: &'a Map<String, Value>,
    labels: &BTreeMap<String, String>,
) -> Option<&'a Value> {
    labels
        .iter()
        .filter(|(_, label)| label.as_str() == name)
        .find_map(|(key, _)| params.get(key))
        .or_else(|| params.get(name))
        .filter(|v| !v.is_null())
}
