pub mod options;
pub mod presets;

pub use options::{OptionsMap, OptionsStore};
pub use presets::{sanitize_preset_name, PresetEntry, PresetStore};
