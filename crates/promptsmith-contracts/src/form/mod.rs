mod fields;
mod frame;
mod model;

pub use fields::{
    field_spec, fields_in, FieldKind, FieldSpec, Section, FIELDS, FRAME_SECTION_KEY,
    NEGATIVE_SECTION_KEY,
};
pub use frame::{
    frame_preset, matching_preset, FramePreset, FrameSettings, FRAME_PRESETS, RATIO_OPTIONS,
    RESOLUTION_OPTIONS, USAGE_OPTIONS,
};
pub use model::{split_material_realism, FormError, FormModel};
