use std::collections::BTreeMap;

use thiserror::Error;

use super::fields::{field_spec, FieldKind, FIELDS};
use super::frame::FrameSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("field '{0}' holds a list of checked items, not text")]
    NotText(String),
    #[error("field '{0}' holds text, not a list of checked items")]
    NotMulti(String),
}

/// Current values of every form field plus the two optional-section toggles.
///
/// Every known field is always present (text fields as `""`, multi fields as
/// an empty list) so two forms compare equal exactly when their observable
/// state matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormModel {
    values: BTreeMap<&'static str, String>,
    selections: BTreeMap<&'static str, Vec<String>>,
    frame_enabled: bool,
    negative_enabled: bool,
}

impl Default for FormModel {
    fn default() -> Self {
        Self::new()
    }
}

impl FormModel {
    pub fn new() -> Self {
        let mut values = BTreeMap::new();
        let mut selections = BTreeMap::new();
        for spec in FIELDS {
            if spec.kind.is_text() {
                values.insert(spec.name, String::new());
            } else {
                selections.insert(spec.name, Vec::new());
            }
        }
        Self {
            values,
            selections,
            frame_enabled: false,
            negative_enabled: false,
        }
    }

    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or_default()
    }

    pub fn set_value(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        let spec = field_spec(name).ok_or_else(|| FormError::UnknownField(name.to_string()))?;
        if !spec.kind.is_text() {
            return Err(FormError::NotText(name.to_string()));
        }
        let value = match spec.kind {
            FieldKind::MaterialList => normalize_material_realism(value),
            _ => value.trim().to_string(),
        };
        self.values.insert(spec.name, value);
        Ok(())
    }

    pub fn selected(&self, name: &str) -> &[String] {
        self.selections
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn set_selected<I, S>(&mut self, name: &str, items: I) -> Result<(), FormError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let spec = field_spec(name).ok_or_else(|| FormError::UnknownField(name.to_string()))?;
        if spec.kind != FieldKind::Multi {
            return Err(FormError::NotMulti(name.to_string()));
        }
        let mut checked: Vec<String> = Vec::new();
        for item in items {
            let item = item.as_ref().trim();
            if item.is_empty() || checked.iter().any(|existing| existing == item) {
                continue;
            }
            checked.push(item.to_string());
        }
        self.selections.insert(spec.name, checked);
        Ok(())
    }

    /// Checks `item` if unchecked, unchecks it otherwise. Returns the new state;
    /// a blank item is never checked.
    pub fn toggle_selected(&mut self, name: &str, item: &str) -> Result<bool, FormError> {
        let mut current = self.selected(name).to_vec();
        let item = item.trim();
        if item.is_empty() {
            self.set_selected(name, current)?;
            return Ok(false);
        }
        let checked = if let Some(idx) = current.iter().position(|existing| existing == item) {
            current.remove(idx);
            false
        } else {
            current.push(item.to_string());
            true
        };
        self.set_selected(name, current)?;
        Ok(checked)
    }

    pub fn frame(&self) -> FrameSettings {
        FrameSettings::new(
            self.value("frame_ratio"),
            self.value("frame_resolution"),
            self.value("frame_usage"),
        )
    }

    pub fn set_frame(&mut self, frame: &FrameSettings) {
        self.values.insert("frame_ratio", frame.ratio.trim().to_string());
        self.values
            .insert("frame_resolution", frame.resolution.trim().to_string());
        self.values.insert("frame_usage", frame.usage.trim().to_string());
    }

    pub fn frame_enabled(&self) -> bool {
        self.frame_enabled
    }

    pub fn set_frame_enabled(&mut self, enabled: bool) {
        self.frame_enabled = enabled;
    }

    pub fn negative_enabled(&self) -> bool {
        self.negative_enabled
    }

    pub fn set_negative_enabled(&mut self, enabled: bool) {
        self.negative_enabled = enabled;
    }

    pub fn frame_section_visible(&self) -> bool {
        self.frame_enabled
    }

    pub fn negative_section_visible(&self) -> bool {
        self.negative_enabled
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

/// Splits on commas into trimmed, non-empty tokens, falling back to the raw
/// value as a one-element list when nothing survives.
pub fn split_material_realism(raw: &str) -> Vec<String> {
    let tokens: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return vec![raw.to_string()];
    }
    tokens
}

// Stored in the exact shape the document list joins back to.
fn normalize_material_realism(raw: &str) -> String {
    let raw = raw.trim();
    if raw.split(',').all(|token| token.trim().is_empty()) {
        return raw.to_string();
    }
    split_material_realism(raw).join(", ")
}

#[cfg(test)]
mod tests {
    use super::{split_material_realism, FormError, FormModel};
    use crate::form::frame::FrameSettings;

    #[test]
    fn new_form_is_empty_with_toggles_off() {
        let form = FormModel::new();
        assert_eq!(form.value("style_mode"), "");
        assert!(form.selected("forbidden_styles").is_empty());
        assert!(!form.frame_enabled());
        assert!(!form.negative_section_visible());
    }

    #[test]
    fn setters_validate_field_kind() {
        let mut form = FormModel::new();
        assert_eq!(
            form.set_value("nope", "x"),
            Err(FormError::UnknownField("nope".to_string()))
        );
        assert_eq!(
            form.set_value("forbidden_elements", "x"),
            Err(FormError::NotText("forbidden_elements".to_string()))
        );
        assert_eq!(
            form.set_selected("mood", ["x"]),
            Err(FormError::NotMulti("mood".to_string()))
        );
    }

    #[test]
    fn values_are_trimmed_and_selections_deduped() -> anyhow::Result<()> {
        let mut form = FormModel::new();
        form.set_value("mood", "  calm ")?;
        form.set_selected("forbidden_elements", ["text", " text", "", "watermark"])?;
        assert_eq!(form.value("mood"), "calm");
        assert_eq!(form.selected("forbidden_elements"), ["text", "watermark"]);
        Ok(())
    }

    #[test]
    fn toggle_selected_flips_membership() -> anyhow::Result<()> {
        let mut form = FormModel::new();
        assert!(form.toggle_selected("forbidden_styles", "3d render")?);
        assert_eq!(form.selected("forbidden_styles"), ["3d render"]);
        assert!(!form.toggle_selected("forbidden_styles", "3d render")?);
        assert!(form.selected("forbidden_styles").is_empty());
        Ok(())
    }

    #[test]
    fn blank_toggle_checks_nothing() -> anyhow::Result<()> {
        let mut form = FormModel::new();
        assert!(!form.toggle_selected("forbidden_elements", "  ")?);
        assert!(form.selected("forbidden_elements").is_empty());
        assert_eq!(
            form.toggle_selected("mood", ""),
            Err(FormError::NotMulti("mood".to_string()))
        );
        Ok(())
    }

    #[test]
    fn material_realism_is_stored_in_joined_form() -> anyhow::Result<()> {
        let mut form = FormModel::new();
        form.set_value("material_realism", "silk,matte skin ,, glass")?;
        assert_eq!(form.value("material_realism"), "silk, matte skin, glass");
        form.set_value("material_realism", " , ")?;
        assert_eq!(form.value("material_realism"), ",");
        assert_eq!(split_material_realism("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(split_material_realism(""), vec![""]);
        Ok(())
    }

    #[test]
    fn clear_resets_every_field_and_toggle() -> anyhow::Result<()> {
        let mut form = FormModel::new();
        form.set_value("style_mode", "anime")?;
        form.set_selected("forbidden_styles", ["photo"])?;
        form.set_frame(&FrameSettings::new("16:9", "", ""));
        form.set_frame_enabled(true);
        form.set_negative_enabled(true);

        form.clear();
        assert_eq!(form, FormModel::new());
        assert!(form.frame().is_empty());
        Ok(())
    }
}
