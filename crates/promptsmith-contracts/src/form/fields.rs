#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Free-editable text backed by a mutable list of suggestions.
    Single,
    /// Single-value text that the document carries as a list of comma tokens.
    MaterialList,
    /// One of the three frame-settings values.
    Frame,
    /// Checked items from a fixed suggestion list.
    Multi,
}

impl FieldKind {
    pub fn is_text(self) -> bool {
        !matches!(self, Self::Multi)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Section {
    Base,
    Scene,
    Subject,
    Camera,
    Aesthetics,
    Frame,
    Negative,
}

impl Section {
    pub const ALL: [Section; 7] = [
        Section::Base,
        Section::Scene,
        Section::Subject,
        Section::Camera,
        Section::Aesthetics,
        Section::Frame,
        Section::Negative,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Base => "Base settings",
            Self::Scene => "Scene",
            Self::Subject => "Subject details",
            Self::Camera => "Camera & composition",
            Self::Aesthetics => "Aesthetic control",
            Self::Frame => "Frame settings",
            Self::Negative => "Negative prompt",
        }
    }

    /// Optional sections are gated by a toggle on the form.
    pub fn is_optional(self) -> bool {
        matches!(self, Self::Frame | Self::Negative)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub section: Section,
    pub path: &'static [&'static str],
}

pub const FRAME_SECTION_KEY: &str = "frame_settings";
pub const NEGATIVE_SECTION_KEY: &str = "negative_prompt";

// Display order. The mapper inserts keys in this order, which is also the
// document schema order.
pub const FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "style_mode",
        label: "Style mode",
        kind: FieldKind::Single,
        section: Section::Base,
        path: &["style_mode"],
    },
    FieldSpec {
        name: "mood",
        label: "Mood",
        kind: FieldKind::Single,
        section: Section::Base,
        path: &["mood"],
    },
    FieldSpec {
        name: "location",
        label: "Location",
        kind: FieldKind::Single,
        section: Section::Scene,
        path: &["scene", "environment", "location"],
    },
    FieldSpec {
        name: "lighting",
        label: "Lighting",
        kind: FieldKind::Single,
        section: Section::Scene,
        path: &["scene", "environment", "lighting"],
    },
    FieldSpec {
        name: "weather",
        label: "Weather",
        kind: FieldKind::Single,
        section: Section::Scene,
        path: &["scene", "environment", "weather"],
    },
    FieldSpec {
        name: "subject_overview",
        label: "Subject overview",
        kind: FieldKind::Single,
        section: Section::Scene,
        path: &["scene", "subject", "overview"],
    },
    FieldSpec {
        name: "background_description",
        label: "Background",
        kind: FieldKind::Single,
        section: Section::Scene,
        path: &["scene", "background", "description"],
    },
    FieldSpec {
        name: "depth_of_field",
        label: "Depth of field",
        kind: FieldKind::Single,
        section: Section::Scene,
        path: &["scene", "background", "depth_of_field"],
    },
    FieldSpec {
        name: "build",
        label: "Build",
        kind: FieldKind::Single,
        section: Section::Subject,
        path: &["scene", "subject", "appearance", "build"],
    },
    FieldSpec {
        name: "face",
        label: "Face",
        kind: FieldKind::Single,
        section: Section::Subject,
        path: &["scene", "subject", "appearance", "face"],
    },
    FieldSpec {
        name: "hair",
        label: "Hair",
        kind: FieldKind::Single,
        section: Section::Subject,
        path: &["scene", "subject", "appearance", "hair"],
    },
    FieldSpec {
        name: "eyes",
        label: "Eyes",
        kind: FieldKind::Single,
        section: Section::Subject,
        path: &["scene", "subject", "appearance", "eyes"],
    },
    FieldSpec {
        name: "emotion",
        label: "Emotion",
        kind: FieldKind::Single,
        section: Section::Subject,
        path: &["scene", "subject", "expression_action", "emotion"],
    },
    FieldSpec {
        name: "action",
        label: "Action",
        kind: FieldKind::Single,
        section: Section::Subject,
        path: &["scene", "subject", "expression_action", "action"],
    },
    FieldSpec {
        name: "outfit",
        label: "Outfit",
        kind: FieldKind::Single,
        section: Section::Subject,
        path: &["scene", "subject", "clothing", "outfit"],
    },
    FieldSpec {
        name: "clothing_detail",
        label: "Clothing detail",
        kind: FieldKind::Single,
        section: Section::Subject,
        path: &["scene", "subject", "clothing", "detail"],
    },
    FieldSpec {
        name: "accessories",
        label: "Accessories",
        kind: FieldKind::Single,
        section: Section::Subject,
        path: &["scene", "subject", "accessories"],
    },
    FieldSpec {
        name: "camera_angle",
        label: "Camera angle",
        kind: FieldKind::Single,
        section: Section::Camera,
        path: &["camera", "angle"],
    },
    FieldSpec {
        name: "composition",
        label: "Composition",
        kind: FieldKind::Single,
        section: Section::Camera,
        path: &["camera", "composition"],
    },
    FieldSpec {
        name: "lens",
        label: "Lens",
        kind: FieldKind::Single,
        section: Section::Camera,
        path: &["camera", "lens"],
    },
    FieldSpec {
        name: "sensor_quality",
        label: "Sensor quality",
        kind: FieldKind::Single,
        section: Section::Camera,
        path: &["camera", "sensor_quality"],
    },
    FieldSpec {
        name: "intent",
        label: "Presentation intent",
        kind: FieldKind::Single,
        section: Section::Aesthetics,
        path: &["aesthetics", "intent"],
    },
    FieldSpec {
        name: "material_realism",
        label: "Material realism",
        kind: FieldKind::MaterialList,
        section: Section::Aesthetics,
        path: &["aesthetics", "material_realism"],
    },
    FieldSpec {
        name: "tone",
        label: "Overall tone",
        kind: FieldKind::Single,
        section: Section::Aesthetics,
        path: &["aesthetics", "color_style", "tone"],
    },
    FieldSpec {
        name: "contrast",
        label: "Contrast",
        kind: FieldKind::Single,
        section: Section::Aesthetics,
        path: &["aesthetics", "color_style", "contrast"],
    },
    FieldSpec {
        name: "effects",
        label: "Special effects",
        kind: FieldKind::Single,
        section: Section::Aesthetics,
        path: &["aesthetics", "color_style", "effects"],
    },
    FieldSpec {
        name: "frame_ratio",
        label: "Ratio",
        kind: FieldKind::Frame,
        section: Section::Frame,
        path: &[FRAME_SECTION_KEY, "ratio"],
    },
    FieldSpec {
        name: "frame_resolution",
        label: "Resolution",
        kind: FieldKind::Frame,
        section: Section::Frame,
        path: &[FRAME_SECTION_KEY, "resolution"],
    },
    FieldSpec {
        name: "frame_usage",
        label: "Usage",
        kind: FieldKind::Frame,
        section: Section::Frame,
        path: &[FRAME_SECTION_KEY, "usage"],
    },
    FieldSpec {
        name: "forbidden_elements",
        label: "Forbidden elements",
        kind: FieldKind::Multi,
        section: Section::Negative,
        path: &[NEGATIVE_SECTION_KEY, "forbidden_elements"],
    },
    FieldSpec {
        name: "forbidden_styles",
        label: "Forbidden styles",
        kind: FieldKind::Multi,
        section: Section::Negative,
        path: &[NEGATIVE_SECTION_KEY, "forbidden_styles"],
    },
];

pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| spec.name == name)
}

pub fn fields_in(section: Section) -> impl Iterator<Item = &'static FieldSpec> {
    FIELDS.iter().filter(move |spec| spec.section == section)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{field_spec, fields_in, FieldKind, Section, FIELDS};

    #[test]
    fn field_names_and_paths_are_unique() {
        let names: HashSet<&str> = FIELDS.iter().map(|spec| spec.name).collect();
        assert_eq!(names.len(), FIELDS.len());
        let paths: HashSet<String> = FIELDS.iter().map(|spec| spec.path.join(".")).collect();
        assert_eq!(paths.len(), FIELDS.len());
    }

    #[test]
    fn optional_sections_hold_frame_and_multi_fields_only() {
        for spec in FIELDS {
            match spec.section {
                Section::Frame => assert_eq!(spec.kind, FieldKind::Frame),
                Section::Negative => assert_eq!(spec.kind, FieldKind::Multi),
                _ => assert!(matches!(
                    spec.kind,
                    FieldKind::Single | FieldKind::MaterialList
                )),
            }
        }
    }

    #[test]
    fn lookup_and_section_iteration() {
        let spec = field_spec("clothing_detail").unwrap();
        assert_eq!(spec.path, &["scene", "subject", "clothing", "detail"]);
        assert!(field_spec("missing").is_none());

        let camera: Vec<&str> = fields_in(Section::Camera).map(|spec| spec.name).collect();
        assert_eq!(
            camera,
            vec!["camera_angle", "composition", "lens", "sensor_quality"]
        );
    }
}
