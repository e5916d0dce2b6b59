//! Mapping between the flat [`FormModel`] and the nested prompt document.
//!
//! Forward mapping always emits the core sections. Reverse mapping is a
//! partial merge: any field whose path is absent from the source document is
//! left as it was, so a partial AI edit lands on top of the current form.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::form::{
    split_material_realism, FieldKind, FieldSpec, FormModel, Section, FIELDS, FRAME_SECTION_KEY,
    NEGATIVE_SECTION_KEY,
};

#[derive(Debug, Error)]
pub enum DocumentParseError {
    #[error("no document content")]
    Empty,
    #[error("not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("document root must be a JSON object")]
    NotAnObject,
}

pub fn to_document(form: &FormModel) -> Value {
    let mut root = Map::new();
    for spec in FIELDS {
        let included = match spec.section {
            Section::Frame => form.frame_enabled(),
            Section::Negative => form.negative_enabled(),
            _ => true,
        };
        if !included {
            continue;
        }
        insert_at_path(&mut root, spec.path, field_document_value(form, spec));
    }
    Value::Object(root)
}

fn field_document_value(form: &FormModel, spec: &FieldSpec) -> Value {
    match spec.kind {
        FieldKind::Single | FieldKind::Frame => Value::String(form.value(spec.name).to_string()),
        FieldKind::MaterialList => Value::Array(
            split_material_realism(form.value(spec.name))
                .into_iter()
                .map(Value::String)
                .collect(),
        ),
        FieldKind::Multi => Value::Array(
            form.selected(spec.name)
                .iter()
                .cloned()
                .map(Value::String)
                .collect(),
        ),
    }
}

fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = root;
    for key in parents {
        let slot = cursor
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        cursor = next;
    }
    cursor.insert(last.to_string(), value);
}

fn lookup<'a>(root: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = root.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

pub fn apply_document(form: &mut FormModel, document: &Value) -> Result<(), DocumentParseError> {
    let root = document
        .as_object()
        .ok_or(DocumentParseError::NotAnObject)?;

    for spec in FIELDS
        .iter()
        .filter(|spec| matches!(spec.kind, FieldKind::Single | FieldKind::MaterialList))
    {
        if let Some(value) = lookup(root, spec.path) {
            set_text(form, spec, &value_as_text(value));
        }
    }

    if let Some(block) = root.get(NEGATIVE_SECTION_KEY).and_then(Value::as_object) {
        let mut any_checked = false;
        for spec in FIELDS.iter().filter(|spec| spec.kind == FieldKind::Multi) {
            let items = spec
                .path
                .last()
                .and_then(|leaf| block.get(*leaf))
                .map(value_as_list)
                .unwrap_or_default();
            any_checked |= !items.is_empty();
            if let Err(err) = form.set_selected(spec.name, items) {
                log::debug!("skipping {}: {err}", spec.name);
            }
        }
        form.set_negative_enabled(any_checked);
    }

    if let Some(block) = root.get(FRAME_SECTION_KEY).and_then(Value::as_object) {
        let leaves: Vec<(&FieldSpec, String)> = FIELDS
            .iter()
            .filter(|spec| spec.kind == FieldKind::Frame)
            .map(|spec| {
                let text = spec
                    .path
                    .last()
                    .and_then(|leaf| block.get(*leaf))
                    .map(value_as_text)
                    .unwrap_or_default();
                (spec, text)
            })
            .collect();
        let has_frame = leaves.iter().any(|(_, text)| !text.trim().is_empty());
        form.set_frame_enabled(has_frame);
        if has_frame {
            for (spec, text) in leaves {
                set_text(form, spec, &text);
            }
        }
    }

    Ok(())
}

fn set_text(form: &mut FormModel, spec: &FieldSpec, text: &str) {
    if let Err(err) = form.set_value(spec.name, text) {
        log::debug!("skipping {}: {err}", spec.name);
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_as_text)
            .filter(|item| !item.trim().is_empty())
            .collect::<Vec<String>>()
            .join(", "),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => value.to_string(),
    }
}

fn value_as_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .map(value_as_text)
            .filter(|item| !item.trim().is_empty())
            .collect(),
        other => {
            let text = value_as_text(other);
            if text.trim().is_empty() {
                Vec::new()
            } else {
                vec![text]
            }
        }
    }
}

/// Parses `text` (optionally wrapped in a code fence) and merges it into `form`.
pub fn apply_document_text(form: &mut FormModel, text: &str) -> Result<Value, DocumentParseError> {
    let document = parse_document_text(text)?;
    apply_document(form, &document)?;
    Ok(document)
}

pub fn parse_document_text(text: &str) -> Result<Value, DocumentParseError> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(DocumentParseError::Empty);
    }
    let parsed: Value = serde_json::from_str(body)?;
    if !parsed.is_object() {
        return Err(DocumentParseError::NotAnObject);
    }
    Ok(parsed)
}

pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Canonical text form: two-space indented JSON, non-ASCII kept as is.
pub fn document_text(document: &Value) -> String {
    serde_json::to_string_pretty(document).unwrap_or_else(|_| "{}".to_string())
}

pub fn is_empty_document_text(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed == "{}"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

/// A key path whose value differs between two documents.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    /// Dotted path such as `scene.environment.weather`.
    pub path: String,
    pub kind: ChangeKind,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

impl fmt::Display for DocumentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let old = describe_value(self.old.as_ref());
        let new = describe_value(self.new.as_ref());
        match self.kind {
            ChangeKind::Added => write!(f, "+ {}: {new}", self.path),
            ChangeKind::Removed => write!(f, "- {}: {old}", self.path),
            ChangeKind::Changed => write!(f, "~ {}: {old} -> {new}", self.path),
        }
    }
}

/// Lists every path added, removed or changed going from `old` to `new`.
///
/// Nested objects are compared key by key; lists are compared by their
/// comma-joined text. A non-object root counts as an empty document.
pub fn diff_documents(old: &Value, new: &Value) -> Vec<DocumentChange> {
    let empty = Map::new();
    let mut changes = Vec::new();
    compare_objects(
        old.as_object().unwrap_or(&empty),
        new.as_object().unwrap_or(&empty),
        "",
        &mut changes,
    );
    changes
}

fn compare_objects(
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    prefix: &str,
    changes: &mut Vec<DocumentChange>,
) {
    for (key, old_value) in old {
        let path = child_path(prefix, key);
        let Some(new_value) = new.get(key) else {
            changes.push(DocumentChange {
                path,
                kind: ChangeKind::Removed,
                old: Some(old_value.clone()),
                new: None,
            });
            continue;
        };
        let changed = match (old_value, new_value) {
            (Value::Object(old_child), Value::Object(new_child)) => {
                compare_objects(old_child, new_child, &path, changes);
                false
            }
            (Value::Array(old_items), Value::Array(new_items)) => {
                list_text(old_items) != list_text(new_items)
            }
            _ => old_value != new_value,
        };
        if changed {
            changes.push(DocumentChange {
                path,
                kind: ChangeKind::Changed,
                old: Some(old_value.clone()),
                new: Some(new_value.clone()),
            });
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            changes.push(DocumentChange {
                path: child_path(prefix, key),
                kind: ChangeKind::Added,
                old: None,
                new: Some(new_value.clone()),
            });
        }
    }
}

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn list_text(items: &[Value]) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<String>>()
        .join(", ")
}

fn describe_value(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::Object(_)) => "[object]".to_string(),
        Some(Value::Array(items)) => format!("[{}]", list_text(items)),
        Some(Value::String(text)) if text.is_empty() => "\"\"".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}
